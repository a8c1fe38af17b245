use afs_storage::{ColumnFamily, ColumnStore, Mutation, StorageError, StorageResult, WriteBatch};
use sled::transaction::{TransactionError, Transactional, TransactionalTree};
use sled::Tree;
use tracing::{debug, info};

use crate::config::SledConfig;

fn backend(e: sled::Error) -> StorageError {
    match e {
        sled::Error::Io(e) => StorageError::Io(e),
        other => StorageError::Backend(other.to_string()),
    }
}

/// Column store on sled: one tree per [`ColumnFamily`].
pub struct SledColumnStore {
    db: sled::Db,
    trees: Vec<Tree>,
}

impl SledColumnStore {
    pub fn open(config: &SledConfig) -> StorageResult<Self> {
        let db = sled::Config::new()
            .path(&config.path)
            .temporary(config.temporary)
            .cache_capacity(config.cache_capacity)
            .flush_every_ms(config.flush_every_ms)
            .open()
            .map_err(backend)?;
        let trees = ColumnFamily::ALL
            .iter()
            .map(|cf| db.open_tree(cf.name()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(backend)?;
        info!(
            path = %config.path.display(),
            temporary = config.temporary,
            recovered = db.was_recovered(),
            "opened sled store"
        );
        Ok(Self { db, trees })
    }

    fn tree(&self, cf: ColumnFamily) -> &Tree {
        &self.trees[cf.index()]
    }

    /// On-disk size in bytes.
    pub fn size_on_disk(&self) -> StorageResult<u64> {
        self.db.size_on_disk().map_err(backend)
    }
}

impl ColumnStore for SledColumnStore {
    fn backend_name(&self) -> &'static str {
        "sled"
    }

    fn get(&self, cf: ColumnFamily, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.tree(cf).get(key).map_err(backend)?.map(|v| v.to_vec()))
    }

    fn scan_prefix(
        &self,
        cf: ColumnFamily,
        prefix: &[u8],
    ) -> StorageResult<Vec<(Vec<u8>, Vec<u8>)>> {
        self.tree(cf)
            .scan_prefix(prefix)
            .map(|entry| {
                let (k, v) = entry.map_err(backend)?;
                Ok((k.to_vec(), v.to_vec()))
            })
            .collect()
    }

    fn scan_keys(&self, cf: ColumnFamily, prefix: &[u8]) -> StorageResult<Vec<Vec<u8>>> {
        self.tree(cf)
            .scan_prefix(prefix)
            .keys()
            .map(|k| k.map(|k| k.to_vec()).map_err(backend))
            .collect()
    }

    fn apply(&self, batch: WriteBatch) -> StorageResult<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let mutations = batch.into_mutations();
        let result: Result<(), TransactionError<StorageError>> =
            self.trees.as_slice().transaction(|trees: &Vec<TransactionalTree>| {
                for mutation in &mutations {
                    match mutation {
                        Mutation::Put { cf, key, value } => {
                            trees[cf.index()].insert(key.as_slice(), value.as_slice())?;
                        }
                        Mutation::Delete { cf, key } => {
                            trees[cf.index()].remove(key.as_slice())?;
                        }
                    }
                }
                Ok(())
            });
        match result {
            Ok(()) => {
                debug!(mutations = mutations.len(), "applied sled transaction");
                Ok(())
            }
            Err(TransactionError::Abort(e)) => Err(e),
            Err(TransactionError::Storage(e)) => Err(backend(e)),
        }
    }

    fn flush(&self) -> StorageResult<()> {
        self.db.flush().map_err(backend)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};

    use afs_storage::{AppStorage, StorageConfig};
    use afs_types::NodeGenericMetadata;

    use super::*;

    #[test]
    fn batch_is_applied_across_trees() {
        let store = SledColumnStore::open(&SledConfig::temporary()).unwrap();
        let mut batch = WriteBatch::new();
        batch.put(ColumnFamily::Nodes, b"n".to_vec(), b"1".to_vec());
        batch.put(ColumnFamily::Children, b"c1".to_vec(), b"2".to_vec());
        batch.put(ColumnFamily::Children, b"c2".to_vec(), b"3".to_vec());
        batch.delete(ColumnFamily::Children, b"c1".to_vec());
        store.apply(batch).unwrap();

        assert_eq!(store.get(ColumnFamily::Nodes, b"n").unwrap(), Some(b"1".to_vec()));
        assert_eq!(store.scan_keys(ColumnFamily::Children, b"c").unwrap(), vec![b"c2".to_vec()]);
        assert!(store.get(ColumnFamily::Root, b"n").unwrap().is_none());
    }

    #[test]
    fn data_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let sled = SledConfig::at(dir.path().join("db"));
        let (root_id, child_id) = {
            let storage = crate::open("fs", &sled, StorageConfig::default()).unwrap();
            let root = storage.create_root_node_if_not_exists("root", "folder").unwrap();
            let child = storage
                .create_node(root.id, "child", "file", "d", 1, NodeGenericMetadata::new())
                .unwrap();
            let mut w = storage.write_binary_data(child.id, "blob").unwrap();
            w.write_all(b"persisted").unwrap();
            w.close().unwrap();
            storage.close().unwrap();
            (root.id, child.id)
        };

        let storage = crate::open("fs", &sled, StorageConfig::default()).unwrap();
        let root = storage.create_root_node_if_not_exists("ignored", "folder").unwrap();
        assert_eq!(root.id, root_id);
        assert_eq!(storage.child_node(root_id, "child").unwrap().unwrap().id, child_id);
        let mut out = String::new();
        storage
            .read_binary_data(child_id, "blob")
            .unwrap()
            .unwrap()
            .read_to_string(&mut out)
            .unwrap();
        assert_eq!(out, "persisted");
    }
}

#[cfg(test)]
mod contract {
    use std::ops::Deref;

    use afs_storage::contract::{LayoutDamage, CONTRACT_CHUNK_SIZE};
    use afs_storage::StorageConfig;

    use crate::{SledAppStorage, SledConfig};

    struct Fixture {
        storage: SledAppStorage,
        _dir: tempfile::TempDir,
    }

    impl Deref for Fixture {
        type Target = SledAppStorage;

        fn deref(&self) -> &SledAppStorage {
            &self.storage
        }
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig::default().with_chunk_size(CONTRACT_CHUNK_SIZE);
        let sled = SledConfig::at(dir.path().join("db"));
        let storage = crate::open("contract", &sled, config).unwrap();
        Fixture { storage, _dir: dir }
    }

    fn damage(fixture: &Fixture) -> &dyn LayoutDamage {
        &fixture.storage
    }

    afs_storage::storage_contract_tests!(fixture());
    afs_storage::storage_repair_tests!(fixture(), damage);
}
