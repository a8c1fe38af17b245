//! Named dependency edges, indexed in both directions.

use afs_types::{NodeDependency, NodeEvent, NodeId, NodeInfo};
use tracing::warn;

use super::rows::{dependency_key, dependency_name_prefix, node_key};
use super::ColumnAppStorage;
use crate::column::keys::KeyReader;
use crate::column::{ColumnFamily, ColumnStore, WriteBatch};
use crate::error::{StorageError, StorageResult};

/// Decode a `(a, name, b)` dependency key.
pub(crate) fn split_dependency_key(key: &[u8]) -> StorageResult<(NodeId, String, NodeId)> {
    let mut reader = KeyReader::new(key);
    Ok((reader.id()?, reader.name()?, reader.id()?))
}

impl<S: ColumnStore> ColumnAppStorage<S> {
    pub(super) fn insert_dependency(
        &self,
        from: NodeId,
        name: &str,
        to: NodeId,
    ) -> StorageResult<()> {
        if name.is_empty() {
            return Err(StorageError::InvalidArgument("dependency name must not be empty".into()));
        }
        self.flush_buffer()?;
        self.require_node(from)?;
        self.require_node(to)?;
        let mut batch = WriteBatch::new();
        batch.put(ColumnFamily::Dependencies, dependency_key(from, name, to), Vec::new());
        batch.put(ColumnFamily::BackwardDependencies, dependency_key(to, name, from), Vec::new());
        self.store.apply(batch)?;
        self.push_events([
            NodeEvent::DependencyAdded {
                id: from,
                name: name.to_string(),
            },
            NodeEvent::BackwardDependencyAdded {
                id: to,
                name: name.to_string(),
            },
        ]);
        Ok(())
    }

    pub(super) fn delete_dependency(
        &self,
        from: NodeId,
        name: &str,
        to: NodeId,
    ) -> StorageResult<()> {
        self.flush_buffer()?;
        let forward = dependency_key(from, name, to);
        let backward = dependency_key(to, name, from);
        if !self.store.contains(ColumnFamily::Dependencies, &forward)?
            && !self.store.contains(ColumnFamily::BackwardDependencies, &backward)?
        {
            return Ok(());
        }
        let mut batch = WriteBatch::new();
        batch.delete(ColumnFamily::Dependencies, forward);
        batch.delete(ColumnFamily::BackwardDependencies, backward);
        self.store.apply(batch)?;
        self.push_events([
            NodeEvent::DependencyRemoved {
                id: from,
                name: name.to_string(),
            },
            NodeEvent::BackwardDependencyRemoved {
                id: to,
                name: name.to_string(),
            },
        ]);
        Ok(())
    }

    /// Resolve an edge endpoint, logging and skipping broken references.
    fn resolve_endpoint(&self, from: NodeId, to: NodeId) -> StorageResult<Option<NodeInfo>> {
        match self.load_node(to)? {
            Some(row) => Ok(Some(row.to_info(to))),
            None => {
                warn!(error = %StorageError::BrokenReference { from, to }, "skipping dependency");
                Ok(None)
            }
        }
    }

    pub(super) fn resolve_dependencies(
        &self,
        from: NodeId,
        name: &str,
    ) -> StorageResult<Vec<NodeInfo>> {
        self.require_node(from)?;
        let mut nodes = Vec::new();
        for key in self
            .store
            .scan_keys(ColumnFamily::Dependencies, &dependency_name_prefix(from, name))?
        {
            let (_, _, to) = split_dependency_key(&key)?;
            nodes.extend(self.resolve_endpoint(from, to)?);
        }
        Ok(nodes)
    }

    pub(super) fn all_dependencies(&self, from: NodeId) -> StorageResult<Vec<NodeDependency>> {
        self.require_node(from)?;
        let mut dependencies = Vec::new();
        for key in self.store.scan_keys(ColumnFamily::Dependencies, &node_key(from))? {
            let (_, name, to) = split_dependency_key(&key)?;
            if let Some(info) = self.resolve_endpoint(from, to)? {
                dependencies.push(NodeDependency::new(name, info));
            }
        }
        Ok(dependencies)
    }

    pub(super) fn resolve_backward(&self, to: NodeId) -> StorageResult<Vec<NodeInfo>> {
        self.require_node(to)?;
        let mut nodes = Vec::new();
        for key in self.store.scan_keys(ColumnFamily::BackwardDependencies, &node_key(to))? {
            let (_, _, from) = split_dependency_key(&key)?;
            nodes.extend(self.resolve_endpoint(to, from)?);
        }
        Ok(nodes)
    }

    /// Queue removal of every edge touching `id`, in both directions.
    pub(crate) fn dependency_deletions(
        &self,
        id: NodeId,
        batch: &mut WriteBatch,
        events: &mut Vec<NodeEvent>,
    ) -> StorageResult<()> {
        let prefix = node_key(id);
        for key in self.store.scan_keys(ColumnFamily::Dependencies, &prefix)? {
            let (from, name, to) = split_dependency_key(&key)?;
            batch.delete(ColumnFamily::BackwardDependencies, dependency_key(to, &name, from));
            batch.delete(ColumnFamily::Dependencies, key);
            events.push(NodeEvent::DependencyRemoved { id: from, name: name.clone() });
            events.push(NodeEvent::BackwardDependencyRemoved { id: to, name });
        }
        for key in self.store.scan_keys(ColumnFamily::BackwardDependencies, &prefix)? {
            let (to, name, from) = split_dependency_key(&key)?;
            if from == id {
                // Self edge, already handled by the forward scan.
                continue;
            }
            batch.delete(ColumnFamily::Dependencies, dependency_key(from, &name, to));
            batch.delete(ColumnFamily::BackwardDependencies, key);
            events.push(NodeEvent::DependencyRemoved { id: from, name: name.clone() });
            events.push(NodeEvent::BackwardDependencyRemoved { id: to, name });
        }
        Ok(())
    }
}
