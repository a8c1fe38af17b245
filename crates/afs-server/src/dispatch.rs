//! Maps protocol requests onto `AppStorage` calls.

use std::io::{Read, Write};

use afs_protocol::{StorageRequest, StorageResponse};
use afs_storage::{AppStorage, BufferedOperation, StorageResult};
use tracing::warn;

/// Execute one request against a storage. Blocking; call from a blocking
/// context.
pub fn dispatch(
    storage: &dyn AppStorage,
    request: StorageRequest,
) -> StorageResult<StorageResponse> {
    use StorageRequest as R;
    use StorageResponse as S;

    let response = match request {
        R::CreateRootNode { name, pseudo_class } => {
            S::Node(storage.create_root_node_if_not_exists(&name, &pseudo_class)?)
        }
        R::CreateNode {
            parent_id,
            name,
            pseudo_class,
            description,
            version,
            metadata,
        } => S::Node(storage.create_node(
            parent_id,
            &name,
            &pseudo_class,
            &description,
            version,
            metadata,
        )?),
        R::NodeInfo { id } => S::Node(storage.node_info(id)?),
        R::IsWritable { id } => S::Bool(storage.is_writable(id)?),
        R::IsConsistent { id } => S::Bool(storage.is_consistent(id)?),
        R::SetConsistent { id } => unit(storage.set_consistent(id)?),
        R::InconsistentNodes => S::Nodes(storage.inconsistent_nodes()?),
        R::SetDescription { id, description } => unit(storage.set_description(id, &description)?),
        R::UpdateModificationTime { id } => unit(storage.update_modification_time(id)?),
        R::RenameNode { id, name } => unit(storage.rename_node(id, &name)?),
        R::SetMetadata { id, metadata } => unit(storage.set_metadata(id, metadata)?),
        R::ChildNodes { id } => S::Nodes(storage.child_nodes(id)?),
        R::ChildNode { id, name } => S::OptionalNode(storage.child_node(id, &name)?),
        R::ParentNode { id } => S::OptionalNode(storage.parent_node(id)?),
        R::SetParentNode { id, new_parent_id } => unit(storage.set_parent_node(id, new_parent_id)?),
        R::DeleteNode { id } => S::OptionalId(storage.delete_node(id)?),

        R::ReadBinaryData { id, name } => match storage.read_binary_data(id, &name)? {
            Some(mut reader) => {
                let mut data = Vec::new();
                reader.read_to_end(&mut data)?;
                S::BinaryData(Some(data))
            }
            None => S::BinaryData(None),
        },
        R::WriteBinaryData { id, name, data } => {
            let mut writer = storage.write_binary_data(id, &name)?;
            writer.write_all(&data)?;
            writer.close()?;
            S::Unit
        }
        R::DataExists { id, name } => S::Bool(storage.data_exists(id, &name)?),
        R::DataNames { id } => S::Names(storage.data_names(id)?),
        R::RemoveData { id, name } => S::Bool(storage.remove_data(id, &name)?),

        R::ApplyBuffered { operations } => {
            apply_buffered(storage, operations)?;
            S::Unit
        }
        R::TimeSeriesNames { id } => S::Names(storage.time_series_names(id)?),
        R::TimeSeriesExists { id, name } => S::Bool(storage.time_series_exists(id, &name)?),
        R::TimeSeriesMetadata { id, names } => {
            S::Metadata(storage.time_series_metadata(id, &names)?)
        }
        R::TimeSeriesDataVersions { id, name: None } => {
            S::Versions(storage.time_series_data_versions(id)?)
        }
        R::TimeSeriesDataVersions { id, name: Some(name) } => {
            S::Versions(storage.time_series_data_versions_of(id, &name)?)
        }
        R::DoubleTimeSeriesData { id, names, version } => {
            S::DoubleData(storage.double_time_series_data(id, &names, version)?)
        }
        R::StringTimeSeriesData { id, names, version } => {
            S::StringData(storage.string_time_series_data(id, &names, version)?)
        }
        R::ClearTimeSeries { id } => unit(storage.clear_time_series(id)?),

        R::AddDependency { from, name, to } => unit(storage.add_dependency(from, &name, to)?),
        R::DependenciesNamed { from, name } => S::Nodes(storage.dependencies_named(from, &name)?),
        R::Dependencies { from } => S::Dependencies(storage.dependencies(from)?),
        R::BackwardDependencies { to } => S::Nodes(storage.backward_dependencies(to)?),
        R::RemoveDependency { from, name, to } => unit(storage.remove_dependency(from, &name, to)?),

        R::SupportedFileSystemChecks => S::CheckKinds(storage.supported_file_system_checks()),
        R::CheckFileSystem { options } => S::CheckIssues(storage.check_file_system(&options)?),
        R::Flush => unit(storage.flush()?),
    };
    Ok(response)
}

fn unit(_: ()) -> StorageResponse {
    StorageResponse::Unit
}

/// Replay a client's buffered time-series writes, then flush so they are
/// visible to every client. The first failing operation stops the replay;
/// operations before it are still flushed.
fn apply_buffered(
    storage: &dyn AppStorage,
    operations: Vec<BufferedOperation>,
) -> StorageResult<()> {
    let mut outcome = Ok(());
    for operation in operations {
        let result = match operation {
            BufferedOperation::CreateTimeSeries { node_id, metadata } => {
                storage.create_time_series(node_id, metadata)
            }
            BufferedOperation::AddDoubleData {
                node_id,
                version,
                name,
                chunks,
            } => storage.add_double_time_series_data(node_id, version, &name, chunks),
            BufferedOperation::AddStringData {
                node_id,
                version,
                name,
                chunks,
            } => storage.add_string_time_series_data(node_id, version, &name, chunks),
        };
        if let Err(e) = result {
            warn!(error = %e, "buffered operation rejected");
            outcome = Err(e);
            break;
        }
    }
    storage.flush()?;
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use afs_storage::{InMemoryAppStorage, StorageConfig, StorageError};
    use afs_types::{
        DoubleDataChunk, NodeGenericMetadata, TimeSeriesDataType, TimeSeriesIndex,
        TimeSeriesMetadata,
    };
    use std::collections::{BTreeMap, BTreeSet};

    fn storage() -> InMemoryAppStorage {
        InMemoryAppStorage::in_memory("fs", StorageConfig::default().with_chunk_size(3)).unwrap()
    }

    fn root(storage: &InMemoryAppStorage) -> afs_types::NodeInfo {
        match dispatch(
            storage,
            StorageRequest::CreateRootNode {
                name: "root".into(),
                pseudo_class: "root".into(),
            },
        )
        .unwrap()
        {
            StorageResponse::Node(info) => info,
            other => panic!("unexpected {}", other.type_name()),
        }
    }

    #[test]
    fn node_requests_reach_storage() {
        let s = storage();
        let root = root(&s);
        let created = dispatch(
            &s,
            StorageRequest::CreateNode {
                parent_id: root.id,
                name: "a".into(),
                pseudo_class: "folder".into(),
                description: String::new(),
                version: 0,
                metadata: NodeGenericMetadata::new(),
            },
        )
        .unwrap();
        let StorageResponse::Node(a) = created else {
            panic!("expected a node");
        };
        let child = StorageRequest::ChildNode {
            id: root.id,
            name: "a".into(),
        };
        assert_eq!(
            dispatch(&s, child).unwrap(),
            StorageResponse::OptionalNode(Some(a.clone()))
        );
        assert_eq!(
            dispatch(&s, StorageRequest::DeleteNode { id: a.id }).unwrap(),
            StorageResponse::OptionalId(Some(root.id))
        );
    }

    #[test]
    fn blob_requests_carry_whole_payload() {
        let s = storage();
        let root = root(&s);
        dispatch(
            &s,
            StorageRequest::WriteBinaryData {
                id: root.id,
                name: "blob".into(),
                data: b"hello world".to_vec(),
            },
        )
        .unwrap();
        let read = |name: &str| {
            let request = StorageRequest::ReadBinaryData {
                id: root.id,
                name: name.into(),
            };
            dispatch(&s, request).unwrap()
        };
        assert_eq!(
            read("blob"),
            StorageResponse::BinaryData(Some(b"hello world".to_vec()))
        );
        assert_eq!(read("none"), StorageResponse::BinaryData(None));
    }

    #[test]
    fn buffered_operations_are_visible_after_apply() {
        let s = storage();
        let root = root(&s);
        let metadata = TimeSeriesMetadata::new(
            "ts",
            TimeSeriesDataType::Double,
            BTreeMap::new(),
            TimeSeriesIndex::new(0, 20, 10).unwrap(),
        );
        dispatch(
            &s,
            StorageRequest::ApplyBuffered {
                operations: vec![
                    BufferedOperation::CreateTimeSeries { node_id: root.id, metadata },
                    BufferedOperation::AddDoubleData {
                        node_id: root.id,
                        version: 1,
                        name: "ts".into(),
                        chunks: vec![DoubleDataChunk::uncompressed(0, vec![1.0, 2.0, 3.0])],
                    },
                ],
            },
        )
        .unwrap();
        let names: BTreeSet<String> = ["ts".to_string()].into();
        let request = StorageRequest::DoubleTimeSeriesData {
            id: root.id,
            names,
            version: 1,
        };
        match dispatch(&s, request).unwrap() {
            StorageResponse::DoubleData(data) => {
                assert_eq!(data["ts"][0].values(), vec![1.0, 2.0, 3.0])
            }
            other => panic!("unexpected {}", other.type_name()),
        }
    }

    #[test]
    fn storage_errors_propagate() {
        let s = storage();
        let request = StorageRequest::NodeInfo {
            id: afs_types::NodeId::new(),
        };
        let err = dispatch(&s, request).unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }
}
