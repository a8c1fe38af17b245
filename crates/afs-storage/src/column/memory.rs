use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::RwLock;

use crate::column::{ColumnFamily, ColumnStore, Mutation, WriteBatch};
use crate::error::StorageResult;

type Family = BTreeMap<Vec<u8>, Vec<u8>>;

/// In-memory column store: one `BTreeMap` per column family.
///
/// Intended for tests and embedding. A single `RwLock` guards all families,
/// so a batch is applied under one write guard and is atomic to readers.
pub struct InMemoryColumnStore {
    families: RwLock<Vec<Family>>,
}

impl InMemoryColumnStore {
    pub fn new() -> Self {
        Self {
            families: RwLock::new(vec![Family::new(); ColumnFamily::ALL.len()]),
        }
    }

    /// Number of rows in one family.
    pub fn len(&self, cf: ColumnFamily) -> usize {
        self.families.read().expect("lock poisoned")[cf.index()].len()
    }

    /// Returns `true` if every family is empty.
    pub fn is_empty(&self) -> bool {
        self.families
            .read()
            .expect("lock poisoned")
            .iter()
            .all(BTreeMap::is_empty)
    }
}

impl Default for InMemoryColumnStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ColumnStore for InMemoryColumnStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    fn get(&self, cf: ColumnFamily, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        let families = self.families.read().expect("lock poisoned");
        Ok(families[cf.index()].get(key).cloned())
    }

    fn scan_prefix(
        &self,
        cf: ColumnFamily,
        prefix: &[u8],
    ) -> StorageResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let families = self.families.read().expect("lock poisoned");
        let rows = families[cf.index()]
            .range::<[u8], _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Ok(rows)
    }

    fn apply(&self, batch: WriteBatch) -> StorageResult<()> {
        let mut families = self.families.write().expect("lock poisoned");
        for mutation in batch.into_mutations() {
            match mutation {
                Mutation::Put { cf, key, value } => {
                    families[cf.index()].insert(key, value);
                }
                Mutation::Delete { cf, key } => {
                    families[cf.index()].remove(&key);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_delete() {
        let store = InMemoryColumnStore::new();
        let mut batch = WriteBatch::new();
        batch.put(ColumnFamily::Nodes, b"k".to_vec(), b"v".to_vec());
        store.apply(batch).unwrap();
        assert_eq!(store.get(ColumnFamily::Nodes, b"k").unwrap(), Some(b"v".to_vec()));
        assert_eq!(store.get(ColumnFamily::Children, b"k").unwrap(), None);

        let mut batch = WriteBatch::new();
        batch.delete(ColumnFamily::Nodes, b"k".to_vec());
        store.apply(batch).unwrap();
        assert!(!store.contains(ColumnFamily::Nodes, b"k").unwrap());
        assert!(store.is_empty());
    }

    #[test]
    fn prefix_scan_is_sorted_and_bounded() {
        let store = InMemoryColumnStore::new();
        let mut batch = WriteBatch::new();
        for key in [&b"ab2"[..], b"ab1", b"ac", b"a", b"b"] {
            batch.put(ColumnFamily::Children, key.to_vec(), vec![]);
        }
        store.apply(batch).unwrap();
        let keys = store.scan_keys(ColumnFamily::Children, b"ab").unwrap();
        assert_eq!(keys, vec![b"ab1".to_vec(), b"ab2".to_vec()]);
        assert_eq!(store.scan_keys(ColumnFamily::Children, b"").unwrap().len(), 5);
        assert_eq!(store.len(ColumnFamily::Children), 5);
    }

    #[test]
    fn later_mutation_wins() {
        let store = InMemoryColumnStore::new();
        let mut batch = WriteBatch::new();
        batch.put(ColumnFamily::Root, b"root".to_vec(), b"1".to_vec());
        batch.delete(ColumnFamily::Root, b"root".to_vec());
        batch.put(ColumnFamily::Root, b"root".to_vec(), b"2".to_vec());
        store.apply(batch).unwrap();
        assert_eq!(store.get(ColumnFamily::Root, b"root").unwrap(), Some(b"2".to_vec()));
    }
}
