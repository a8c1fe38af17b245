//! Node tree: root, children, renames, moves and recursive deletion.

use afs_types::{epoch_millis, NodeEvent, NodeGenericMetadata, NodeId, NodeInfo};
use tracing::{debug, info, warn};

use super::rows::{
    child_key, children_prefix, decode, node_key, trailing_name, ChildRow, NodeRow, ROOT_KEY,
};
use super::ColumnAppStorage;
use crate::column::{ColumnFamily, ColumnStore, WriteBatch};
use crate::error::{StorageError, StorageResult};

fn validate_name(what: &str, value: &str) -> StorageResult<()> {
    if value.is_empty() {
        return Err(StorageError::InvalidArgument(format!("{what} must not be empty")));
    }
    Ok(())
}

impl<S: ColumnStore> ColumnAppStorage<S> {
    pub(crate) fn root_id(&self) -> StorageResult<Option<NodeId>> {
        self.store
            .get(ColumnFamily::Root, ROOT_KEY)?
            .map(|bytes| NodeId::from_slice(&bytes).map_err(StorageError::from))
            .transpose()
    }

    pub(super) fn root_node(&self, name: &str, pseudo_class: &str) -> StorageResult<NodeInfo> {
        validate_name("root name", name)?;
        validate_name("pseudo class", pseudo_class)?;
        self.flush_buffer()?;
        let _guard = self
            .root_lock
            .lock()
            .map_err(|_| StorageError::Backend("root lock poisoned".into()))?;
        if let Some(id) = self.root_id()? {
            return Ok(self.require_node(id)?.to_info(id));
        }

        let id = NodeId::new();
        let now = epoch_millis();
        let row = NodeRow {
            name: name.to_string(),
            pseudo_class: pseudo_class.to_string(),
            description: String::new(),
            creation_time: now,
            modification_time: now,
            version: 0,
            metadata: NodeGenericMetadata::new(),
            parent_id: None,
            consistent: Some(true),
        };
        let mut batch = WriteBatch::new();
        self.put_node(&mut batch, id, &row)?;
        batch.put(ColumnFamily::Root, ROOT_KEY.to_vec(), node_key(id));
        self.store.apply(batch)?;
        info!(root = %id, name, "created root node");
        self.push_events([
            NodeEvent::NodeCreated { id, parent_id: None },
            NodeEvent::NodeConsistent { id },
        ]);
        Ok(row.to_info(id))
    }

    pub(super) fn insert_node(
        &self,
        parent_id: NodeId,
        name: &str,
        pseudo_class: &str,
        description: &str,
        version: i32,
        metadata: NodeGenericMetadata,
    ) -> StorageResult<NodeInfo> {
        validate_name("node name", name)?;
        validate_name("pseudo class", pseudo_class)?;
        self.flush_buffer()?;
        self.require_node(parent_id)?;
        if self.store.contains(ColumnFamily::Children, &child_key(parent_id, name))? {
            return Err(StorageError::InvalidArgument(format!(
                "node {parent_id} already has a child named '{name}'"
            )));
        }

        let id = NodeId::new();
        let now = epoch_millis();
        let row = NodeRow {
            name: name.to_string(),
            pseudo_class: pseudo_class.to_string(),
            description: description.to_string(),
            creation_time: now,
            modification_time: now,
            version,
            metadata,
            parent_id: Some(parent_id),
            consistent: Some(false),
        };
        let mut batch = WriteBatch::new();
        self.put_node(&mut batch, id, &row)?;
        self.store.apply(batch)?;
        debug!(node = %id, parent = %parent_id, name, "created node");
        self.push_events([NodeEvent::NodeCreated {
            id,
            parent_id: Some(parent_id),
        }]);
        Ok(row.to_info(id))
    }

    /// Read-modify-write of one node, keeping both copies in step.
    pub(super) fn update_node<F>(&self, id: NodeId, f: F) -> StorageResult<()>
    where
        F: FnOnce(&mut NodeRow) -> NodeEvent,
    {
        self.flush_buffer()?;
        let mut row = self.require_node(id)?;
        let event = f(&mut row);
        let mut batch = WriteBatch::new();
        self.put_node(&mut batch, id, &row)?;
        self.store.apply(batch)?;
        self.push_events([event]);
        Ok(())
    }

    pub(super) fn mark_consistent(&self, id: NodeId) -> StorageResult<()> {
        self.update_node(id, |row| {
            row.consistent = Some(true);
            NodeEvent::NodeConsistent { id }
        })
    }

    pub(super) fn scan_inconsistent(&self) -> StorageResult<Vec<NodeInfo>> {
        let mut nodes = Vec::new();
        for (key, value) in self.store.scan_prefix(ColumnFamily::Nodes, &[])? {
            let row: NodeRow = decode(&value)?;
            if !row.is_consistent() {
                nodes.push(row.to_info(NodeId::from_slice(&key)?));
            }
        }
        Ok(nodes)
    }

    pub(super) fn rename(&self, id: NodeId, name: &str) -> StorageResult<()> {
        validate_name("node name", name)?;
        self.flush_buffer()?;
        let mut row = self.require_node(id)?;
        if row.name == name {
            return Ok(());
        }
        let mut batch = WriteBatch::new();
        if let Some(parent) = row.parent_id {
            if self.store.contains(ColumnFamily::Children, &child_key(parent, name))? {
                return Err(StorageError::InvalidArgument(format!(
                    "node {parent} already has a child named '{name}'"
                )));
            }
            batch.delete(ColumnFamily::Children, child_key(parent, &row.name));
        }
        row.name = name.to_string();
        self.put_node(&mut batch, id, &row)?;
        self.store.apply(batch)?;
        self.push_events([NodeEvent::NodeNameUpdated {
            id,
            name: name.to_string(),
        }]);
        Ok(())
    }

    pub(super) fn children(&self, id: NodeId) -> StorageResult<Vec<NodeInfo>> {
        self.require_node(id)?;
        self.store
            .scan_prefix(ColumnFamily::Children, &children_prefix(id))?
            .into_iter()
            .map(|(key, value)| {
                let row: ChildRow = decode(&value)?;
                Ok(row.to_info(trailing_name(&key)?))
            })
            .collect()
    }

    pub(super) fn child(&self, id: NodeId, name: &str) -> StorageResult<Option<NodeInfo>> {
        self.require_node(id)?;
        match self.store.get(ColumnFamily::Children, &child_key(id, name))? {
            Some(value) => {
                let row: ChildRow = decode(&value)?;
                Ok(Some(row.to_info(name.to_string())))
            }
            None => Ok(None),
        }
    }

    pub(super) fn parent(&self, id: NodeId) -> StorageResult<Option<NodeInfo>> {
        let Some(parent_id) = self.require_node(id)?.parent_id else {
            return Ok(None);
        };
        match self.load_node(parent_id)? {
            Some(parent) => Ok(Some(parent.to_info(parent_id))),
            None => {
                warn!(
                    error = %StorageError::BrokenReference { from: id, to: parent_id },
                    "parent pointer does not resolve"
                );
                Ok(None)
            }
        }
    }

    pub(super) fn move_node(&self, id: NodeId, new_parent_id: NodeId) -> StorageResult<()> {
        self.flush_buffer()?;
        let mut row = self.require_node(id)?;
        let Some(old_parent_id) = row.parent_id else {
            return Err(StorageError::InvalidArgument("the root node cannot be moved".into()));
        };
        self.require_node(new_parent_id)?;
        if old_parent_id == new_parent_id {
            return Ok(());
        }
        // The new parent must not be the node itself or one of its descendants.
        let mut cursor = Some(new_parent_id);
        while let Some(ancestor) = cursor {
            if ancestor == id {
                return Err(StorageError::InvalidArgument(format!(
                    "cannot move {id} under its own descendant {new_parent_id}"
                )));
            }
            cursor = self.load_node(ancestor)?.and_then(|r| r.parent_id);
        }
        if self.store.contains(ColumnFamily::Children, &child_key(new_parent_id, &row.name))? {
            return Err(StorageError::InvalidArgument(format!(
                "node {new_parent_id} already has a child named '{}'",
                row.name
            )));
        }

        let mut batch = WriteBatch::new();
        batch.delete(ColumnFamily::Children, child_key(old_parent_id, &row.name));
        row.parent_id = Some(new_parent_id);
        self.put_node(&mut batch, id, &row)?;
        self.store.apply(batch)?;
        self.push_events([NodeEvent::ParentChanged {
            id,
            old_parent_id: Some(old_parent_id),
            new_parent_id,
        }]);
        Ok(())
    }

    pub(super) fn remove_node(&self, id: NodeId) -> StorageResult<Option<NodeId>> {
        self.flush_buffer()?;
        let row = self.require_node(id)?;
        let parent_id = row.parent_id;
        self.remove_subtree(id)?;
        Ok(parent_id)
    }

    /// Pre-order deletion. Each node goes in its own batch, so a failure
    /// leaves the remaining descendants detectable as orphans.
    pub(crate) fn remove_subtree(&self, id: NodeId) -> StorageResult<()> {
        let mut stack = vec![id];
        let mut removed = 0usize;
        while let Some(current) = stack.pop() {
            let Some(row) = self.load_node(current)? else {
                continue;
            };
            let children: Vec<NodeId> = self
                .store
                .scan_prefix(ColumnFamily::Children, &children_prefix(current))?
                .into_iter()
                .map(|(_, value)| decode::<ChildRow>(&value).map(|c| c.child_id))
                .collect::<StorageResult<_>>()?;

            let mut batch = WriteBatch::new();
            let mut events = Vec::new();
            batch.delete(ColumnFamily::Nodes, node_key(current));
            if let Some(parent) = row.parent_id {
                // A same-named sibling may own the row when this node is an orphan.
                let key = child_key(parent, &row.name);
                if let Some(value) = self.store.get(ColumnFamily::Children, &key)? {
                    if decode::<ChildRow>(&value)?.child_id == current {
                        batch.delete(ColumnFamily::Children, key);
                    }
                }
            }
            if self.root_id()? == Some(current) {
                batch.delete(ColumnFamily::Root, ROOT_KEY.to_vec());
            }
            for name in self.blob_deletions(current, &mut batch)? {
                events.push(NodeEvent::NodeDataRemoved { id: current, data_name: name });
            }
            if self.series_deletions(current, &mut batch)? {
                events.push(NodeEvent::TimeSeriesCleared { id: current });
            }
            self.dependency_deletions(current, &mut batch, &mut events)?;
            self.store.apply(batch)?;

            events.insert(
                0,
                NodeEvent::NodeRemoved {
                    id: current,
                    parent_id: row.parent_id,
                },
            );
            self.push_events(events);
            removed += 1;
            stack.extend(children.into_iter().rev());
        }
        debug!(node = %id, removed, "deleted subtree");
        Ok(())
    }

    /// Store a node row as-is, bypassing validation. Used to stage damaged
    /// layouts in tests.
    #[cfg(test)]
    pub(crate) fn put_raw_node(
        &self,
        id: NodeId,
        row: &NodeRow,
        with_child_row: bool,
    ) -> StorageResult<()> {
        let mut batch = WriteBatch::new();
        batch.put(ColumnFamily::Nodes, node_key(id), super::rows::encode(row)?);
        if let (true, Some(parent)) = (with_child_row, row.parent_id) {
            let child = super::rows::encode(&row.child_row(id))?;
            batch.put(ColumnFamily::Children, child_key(parent, &row.name), child);
        }
        self.store.apply(batch)
    }
}
