//! Consistency checks over the stored layout.
//!
//! Each pass scans one or more column families, reports every finding as a
//! [`FileSystemCheckIssue`] and, when repair is requested, fixes issues one
//! by one. A failed repair is logged and leaves its issue unrepaired; it
//! never aborts the pass.

use std::collections::{BTreeMap, BTreeSet};

use afs_types::{
    FileSystemCheckIssue, FileSystemCheckKind, FileSystemCheckOptions, NodeEvent, NodeId,
};
use tracing::{info, warn};

use super::dependencies::split_dependency_key;
use super::rows::{child_key, children_prefix, decode, dependency_key, ChildRow, NodeRow};
use super::ColumnAppStorage;
use crate::column::keys::KeyReader;
use crate::column::{ColumnFamily, ColumnStore, WriteBatch};
use crate::error::{StorageError, StorageResult};

pub struct ConsistencyChecker<'a, S: ColumnStore> {
    engine: &'a ColumnAppStorage<S>,
}

/// A finding plus what it takes to repair it.
struct Finding {
    issue: FileSystemCheckIssue,
    repair: Repair,
}

enum Repair {
    DeleteNode(NodeId),
    DeleteChildRow { parent: NodeId, name: String },
    DeleteOrphan { node: NodeId, missing_parent: Option<NodeId> },
    DeleteData(NodeId),
    DeleteEdge { from: NodeId, name: String, to: NodeId },
}

impl<'a, S: ColumnStore> ConsistencyChecker<'a, S> {
    pub fn new(engine: &'a ColumnAppStorage<S>) -> Self {
        Self { engine }
    }

    pub fn run(
        &self,
        options: &FileSystemCheckOptions,
    ) -> StorageResult<Vec<FileSystemCheckIssue>> {
        let mut findings = Vec::new();
        for kind in FileSystemCheckKind::ALL {
            if !options.includes(kind) {
                continue;
            }
            match kind {
                FileSystemCheckKind::ExpiredInconsistent => {
                    let cutoff = options.inconsistent_expiration.ok_or_else(|| {
                        StorageError::InvalidArgument("expired-inconsistent needs a cutoff".into())
                    })?;
                    findings.extend(self.expired_inconsistent(cutoff)?);
                }
                FileSystemCheckKind::ReferenceNotFound => {
                    findings.extend(self.references_not_found()?)
                }
                FileSystemCheckKind::OrphanNode => findings.extend(self.orphan_nodes()?),
                FileSystemCheckKind::OrphanData => findings.extend(self.orphan_data()?),
                FileSystemCheckKind::DanglingDependency => {
                    findings.extend(self.dangling_dependencies()?)
                }
            }
        }

        let mut issues = Vec::with_capacity(findings.len());
        for Finding { mut issue, repair } in findings {
            if options.repair {
                match self.repair(&repair) {
                    Ok(resolution) => issue.mark_repaired(resolution),
                    Err(e) => warn!(issue = %issue, error = %e, "repair failed"),
                }
            }
            issues.push(issue);
        }
        info!(
            issues = issues.len(),
            repaired = issues.iter().filter(|i| i.repaired).count(),
            "file system check complete"
        );
        Ok(issues)
    }

    fn nodes(&self) -> StorageResult<Vec<(NodeId, NodeRow)>> {
        self.engine
            .store
            .scan_prefix(ColumnFamily::Nodes, &[])?
            .into_iter()
            .map(|(key, value)| Ok((NodeId::from_slice(&key)?, decode(&value)?)))
            .collect()
    }

    fn expired_inconsistent(&self, cutoff: i64) -> StorageResult<Vec<Finding>> {
        let mut findings = Vec::new();
        for (id, row) in self.nodes()? {
            if !row.is_consistent() && row.modification_time < cutoff {
                let issue = FileSystemCheckIssue::new(
                    id,
                    Some(row.name.clone()),
                    FileSystemCheckKind::ExpiredInconsistent,
                    format!("inconsistent since {}", row.modification_time),
                );
                findings.push(Finding {
                    issue,
                    repair: Repair::DeleteNode(id),
                });
            }
        }
        Ok(findings)
    }

    fn references_not_found(&self) -> StorageResult<Vec<Finding>> {
        let mut findings = Vec::new();
        for (key, value) in self.engine.store.scan_prefix(ColumnFamily::Children, &[])? {
            let child: ChildRow = decode(&value)?;
            if self.engine.node_exists(child.child_id)? {
                continue;
            }
            let parent = KeyReader::new(&key).id()?;
            let name = super::rows::trailing_name(&key)?;
            let issue = FileSystemCheckIssue::new(
                child.child_id,
                Some(name.clone()),
                FileSystemCheckKind::ReferenceNotFound,
                format!("listed as child '{name}' of {parent} but has no record"),
            );
            findings.push(Finding {
                issue,
                repair: Repair::DeleteChildRow { parent, name },
            });
        }
        Ok(findings)
    }

    fn orphan_nodes(&self) -> StorageResult<Vec<Finding>> {
        let root = self.engine.root_id()?;
        let mut findings = Vec::new();
        for (id, row) in self.nodes()? {
            let (description, missing_parent) = match row.parent_id {
                None if root == Some(id) => continue,
                None => ("has no parent and is not the root".to_string(), None),
                Some(parent) if !self.engine.node_exists(parent)? => {
                    (format!("parent {parent} does not exist"), Some(parent))
                }
                Some(parent) => {
                    let key = child_key(parent, &row.name);
                    let listed = match self.engine.store.get(ColumnFamily::Children, &key)? {
                        Some(value) => decode::<ChildRow>(&value)?.child_id == id,
                        None => false,
                    };
                    if listed {
                        continue;
                    }
                    (format!("not listed among the children of {parent}"), None)
                }
            };
            let issue = FileSystemCheckIssue::new(
                id,
                Some(row.name.clone()),
                FileSystemCheckKind::OrphanNode,
                description,
            );
            findings.push(Finding {
                issue,
                repair: Repair::DeleteOrphan {
                    node: id,
                    missing_parent,
                },
            });
        }
        Ok(findings)
    }

    fn orphan_data(&self) -> StorageResult<Vec<Finding>> {
        let mut owners: BTreeMap<NodeId, BTreeSet<String>> = BTreeMap::new();
        for key in self.engine.store.scan_keys(ColumnFamily::BlobChunks, &[])? {
            let mut reader = KeyReader::new(&key);
            let id = reader.id()?;
            owners.entry(id).or_default().insert(reader.name()?);
        }
        for key in self.engine.store.scan_keys(ColumnFamily::BlobNames, &[])? {
            let id = KeyReader::new(&key).id()?;
            owners.entry(id).or_default().insert(super::rows::trailing_name(&key)?);
        }
        let mut findings = Vec::new();
        for (id, names) in owners {
            if self.engine.node_exists(id)? {
                continue;
            }
            let names: Vec<String> = names.into_iter().collect();
            let issue = FileSystemCheckIssue::new(
                id,
                None,
                FileSystemCheckKind::OrphanData,
                format!("binary data {names:?} belongs to a missing node"),
            );
            findings.push(Finding {
                issue,
                repair: Repair::DeleteData(id),
            });
        }
        Ok(findings)
    }

    fn dangling_dependencies(&self) -> StorageResult<Vec<Finding>> {
        let mut edges: BTreeSet<(NodeId, String, NodeId)> = BTreeSet::new();
        for key in self.engine.store.scan_keys(ColumnFamily::Dependencies, &[])? {
            edges.insert(split_dependency_key(&key)?);
        }
        for key in self.engine.store.scan_keys(ColumnFamily::BackwardDependencies, &[])? {
            let (to, name, from) = split_dependency_key(&key)?;
            edges.insert((from, name, to));
        }
        let mut findings = Vec::new();
        for (from, name, to) in edges {
            let from_exists = self.engine.node_exists(from)?;
            let to_exists = self.engine.node_exists(to)?;
            if from_exists && to_exists {
                continue;
            }
            let (node_id, missing) = if from_exists { (from, to) } else { (to, from) };
            let issue = FileSystemCheckIssue::new(
                node_id,
                None,
                FileSystemCheckKind::DanglingDependency,
                format!("dependency '{name}' from {from} to {to} misses node {missing}"),
            );
            findings.push(Finding {
                issue,
                repair: Repair::DeleteEdge { from, name, to },
            });
        }
        Ok(findings)
    }

    fn repair(&self, repair: &Repair) -> StorageResult<String> {
        let engine = self.engine;
        match repair {
            Repair::DeleteNode(id) => {
                if !engine.node_exists(*id)? {
                    return Ok("already deleted with an ancestor".into());
                }
                engine.remove_node(*id)?;
                Ok("node deleted".into())
            }
            Repair::DeleteChildRow { parent, name } => {
                let mut batch = WriteBatch::new();
                batch.delete(ColumnFamily::Children, child_key(*parent, name));
                engine.store.apply(batch)?;
                Ok("child reference removed".into())
            }
            Repair::DeleteOrphan { node, missing_parent } => {
                engine.remove_subtree(*node)?;
                if let Some(parent) = missing_parent {
                    let mut batch = WriteBatch::new();
                    let prefix = children_prefix(*parent);
                    for key in engine.store.scan_keys(ColumnFamily::Children, &prefix)? {
                        batch.delete(ColumnFamily::Children, key);
                    }
                    engine.store.apply(batch)?;
                }
                Ok("orphan subtree deleted".into())
            }
            Repair::DeleteData(id) => {
                let mut batch = WriteBatch::new();
                let names = engine.blob_deletions(*id, &mut batch)?;
                engine.store.apply(batch)?;
                engine.push_events(
                    names
                        .into_iter()
                        .map(|data_name| NodeEvent::NodeDataRemoved { id: *id, data_name }),
                );
                Ok("binary data deleted".into())
            }
            Repair::DeleteEdge { from, name, to } => {
                let mut batch = WriteBatch::new();
                batch.delete(ColumnFamily::Dependencies, dependency_key(*from, name, *to));
                batch.delete(ColumnFamily::BackwardDependencies, dependency_key(*to, name, *from));
                engine.store.apply(batch)?;
                Ok("dependency removed in both directions".into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use afs_types::{FileSystemCheckKind, FileSystemCheckOptions, NodeGenericMetadata, NodeId};

    use super::super::rows::{child_key, dependency_key, node_key, NodeRow};
    use crate::column::{ColumnFamily, ColumnStore, WriteBatch};
    use crate::{AppStorage, InMemoryAppStorage, StorageConfig};

    fn storage() -> InMemoryAppStorage {
        InMemoryAppStorage::in_memory("test", StorageConfig::default()).unwrap()
    }

    fn options(kind: FileSystemCheckKind, repair: bool) -> FileSystemCheckOptions {
        let builder = FileSystemCheckOptions::builder().kind(kind);
        if repair { builder.repair() } else { builder }.build().unwrap()
    }

    fn row(name: &str, parent_id: Option<NodeId>) -> NodeRow {
        NodeRow {
            name: name.into(),
            pseudo_class: "folder".into(),
            description: String::new(),
            creation_time: 0,
            modification_time: 0,
            version: 0,
            metadata: NodeGenericMetadata::new(),
            parent_id,
            consistent: Some(true),
        }
    }

    #[test]
    fn clean_tree_has_no_issues() {
        let s = storage();
        let root = s.create_root_node_if_not_exists("root", "folder").unwrap();
        let a = s.create_node(root.id, "a", "folder", "", 0, NodeGenericMetadata::new()).unwrap();
        s.set_consistent(a.id).unwrap();
        let all = FileSystemCheckOptions::builder()
            .kinds([
                FileSystemCheckKind::ReferenceNotFound,
                FileSystemCheckKind::OrphanNode,
                FileSystemCheckKind::OrphanData,
                FileSystemCheckKind::DanglingDependency,
            ])
            .build()
            .unwrap();
        assert!(s.check_file_system(&all).unwrap().is_empty());
    }

    #[test]
    fn reference_not_found_removes_only_the_child_row() {
        let s = storage();
        let root = s.create_root_node_if_not_exists("root", "folder").unwrap();
        let a = s.create_node(root.id, "a", "folder", "", 0, NodeGenericMetadata::new()).unwrap();
        let mut batch = WriteBatch::new();
        batch.delete(ColumnFamily::Nodes, node_key(a.id));
        s.store().apply(batch).unwrap();

        let report = options(FileSystemCheckKind::ReferenceNotFound, false);
        let issues = s.check_file_system(&report).unwrap();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].node_id, a.id);
        assert!(!issues[0].repaired);

        let repair = options(FileSystemCheckKind::ReferenceNotFound, true);
        let issues = s.check_file_system(&repair).unwrap();
        assert!(issues[0].repaired);
        assert!(s.child_nodes(root.id).unwrap().is_empty());
        assert!(s.node_info(root.id).is_ok());
    }

    #[test]
    fn orphan_with_fabricated_parent_is_deleted() {
        let s = storage();
        s.create_root_node_if_not_exists("root", "folder").unwrap();
        let ghost = NodeId::new();
        let orphan = NodeId::new();
        s.put_raw_node(orphan, &row("orphan", Some(ghost)), true).unwrap();
        let child = NodeId::new();
        s.put_raw_node(child, &row("child", Some(orphan)), true).unwrap();

        let issues = s.check_file_system(&options(FileSystemCheckKind::OrphanNode, true)).unwrap();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].node_id, orphan);
        assert!(issues[0].repaired);
        assert!(s.node_info(orphan).is_err());
        assert!(s.node_info(child).is_err());
        assert!(!s.store().contains(ColumnFamily::Children, &child_key(ghost, "orphan")).unwrap());
    }

    #[test]
    fn node_unlisted_by_parent_is_orphan() {
        let s = storage();
        let root = s.create_root_node_if_not_exists("root", "folder").unwrap();
        let stray = NodeId::new();
        s.put_raw_node(stray, &row("stray", Some(root.id)), false).unwrap();
        let issues = s.check_file_system(&options(FileSystemCheckKind::OrphanNode, false)).unwrap();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].node_name.as_deref(), Some("stray"));
    }

    #[test]
    fn orphan_repair_keeps_listed_sibling_of_same_name() {
        let s = storage();
        let root = s.create_root_node_if_not_exists("root", "folder").unwrap();
        let listed = s
            .create_node(root.id, "a", "folder", "", 0, NodeGenericMetadata::new())
            .unwrap();
        let stray = NodeId::new();
        s.put_raw_node(stray, &row("a", Some(root.id)), false).unwrap();

        let issues = s.check_file_system(&options(FileSystemCheckKind::OrphanNode, true)).unwrap();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].node_id, stray);
        assert!(issues[0].repaired);
        assert_eq!(s.child_node(root.id, "a").unwrap().map(|n| n.id), Some(listed.id));
        let report = options(FileSystemCheckKind::OrphanNode, false);
        assert!(s.check_file_system(&report).unwrap().is_empty());
    }

    #[test]
    fn orphan_data_is_removed() {
        let s = storage();
        let root = s.create_root_node_if_not_exists("root", "folder").unwrap();
        let a = s.create_node(root.id, "a", "file", "", 0, NodeGenericMetadata::new()).unwrap();
        let mut w = s.write_binary_data(a.id, "blob").unwrap();
        w.write_all(b"bytes").unwrap();
        w.close().unwrap();
        let mut batch = WriteBatch::new();
        batch.delete(ColumnFamily::Nodes, node_key(a.id));
        batch.delete(ColumnFamily::Children, child_key(root.id, "a"));
        s.store().apply(batch).unwrap();

        let issues = s.check_file_system(&options(FileSystemCheckKind::OrphanData, true)).unwrap();
        assert_eq!(issues.len(), 1);
        assert!(issues[0].repaired);
        assert_eq!(s.store().len(ColumnFamily::BlobChunks), 0);
        assert_eq!(s.store().len(ColumnFamily::BlobNames), 0);
        assert!(s.data_names(a.id).unwrap().is_empty());
    }

    #[test]
    fn dangling_dependency_is_removed_both_ways() {
        let s = storage();
        let root = s.create_root_node_if_not_exists("root", "folder").unwrap();
        let ghost = NodeId::new();
        let mut batch = WriteBatch::new();
        batch.put(ColumnFamily::Dependencies, dependency_key(root.id, "d", ghost), Vec::new());
        let back = dependency_key(ghost, "d", root.id);
        batch.put(ColumnFamily::BackwardDependencies, back, Vec::new());
        s.store().apply(batch).unwrap();

        let repair = options(FileSystemCheckKind::DanglingDependency, true);
        let issues = s.check_file_system(&repair).unwrap();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].node_id, root.id);
        assert_eq!(s.store().len(ColumnFamily::Dependencies), 0);
        assert_eq!(s.store().len(ColumnFamily::BackwardDependencies), 0);
    }

    #[test]
    fn expired_child_of_expired_parent_is_reported_once_deleted_once() {
        let s = storage();
        let root = s.create_root_node_if_not_exists("root", "folder").unwrap();
        let a = s.create_node(root.id, "a", "folder", "", 0, NodeGenericMetadata::new()).unwrap();
        s.create_node(a.id, "b", "folder", "", 0, NodeGenericMetadata::new()).unwrap();
        let options = FileSystemCheckOptions::builder()
            .drop_inconsistent_nodes_older_than(chrono::Utc::now() + chrono::Duration::hours(1))
            .repair()
            .build()
            .unwrap();
        let issues = s.check_file_system(&options).unwrap();
        assert_eq!(issues.len(), 2);
        assert!(issues.iter().all(|i| i.repaired));
        assert!(s.child_nodes(root.id).unwrap().is_empty());
        assert!(s.inconsistent_nodes().unwrap().is_empty());
    }
}
