//! Remote AppFS storage backend.
//!
//! [`RemoteAppStorage`] implements `AppStorage` by sending bincode requests
//! to an `afs-server` instance. Node events stream back over a WebSocket.

pub mod client;
pub mod config;
pub mod listener;
pub mod storage;

use std::sync::Arc;

use afs_storage::{AppStorage, BackendParams, StorageRegistry};

pub use client::RpcClient;
pub use config::RemoteConfig;
pub use storage::RemoteAppStorage;

/// Register the `remote` backend. Options: `url` (required), `timeout_ms`,
/// `events`.
pub fn register(registry: &StorageRegistry) {
    registry.register(
        "remote",
        Box::new(|params: &BackendParams| {
            let config = RemoteConfig::from_params(params)?;
            Ok(Arc::new(RemoteAppStorage::connect(config)?) as Arc<dyn AppStorage>)
        }),
    );
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, BTreeSet};
    use std::net::SocketAddr;
    use std::ops::Deref;
    use std::thread::JoinHandle;
    use std::time::{Duration, Instant};

    use afs_server::{AfsServer, FileSystems, ServerConfig};
    use afs_storage::contract::{collect_events, LayoutDamage, CONTRACT_CHUNK_SIZE};
    use afs_storage::{InMemoryAppStorage, StorageConfig, StorageError};
    use afs_types::{
        DoubleDataChunk, NodeEvent, TimeSeriesDataType, TimeSeriesIndex, TimeSeriesMetadata,
    };
    use tokio::sync::oneshot;

    use super::*;

    /// A storage server on its own runtime thread, bound to an ephemeral port.
    /// It hosts one in-memory file system, "default".
    struct TestServer {
        addr: SocketAddr,
        engine: Arc<InMemoryAppStorage>,
        shutdown: Option<oneshot::Sender<()>>,
        thread: Option<JoinHandle<()>>,
    }

    impl TestServer {
        fn start() -> Self {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.set_nonblocking(true).unwrap();
            let addr = listener.local_addr().unwrap();
            let config = StorageConfig::default().with_chunk_size(CONTRACT_CHUNK_SIZE);
            let engine = Arc::new(InMemoryAppStorage::in_memory("default", config).unwrap());
            let mut file_systems = FileSystems::default();
            file_systems.insert(engine.clone()).unwrap();
            let (tx, rx) = oneshot::channel::<()>();
            let thread = std::thread::spawn(move || {
                let runtime = tokio::runtime::Builder::new_multi_thread()
                    .worker_threads(2)
                    .enable_all()
                    .build()
                    .unwrap();
                runtime.block_on(async move {
                    let server =
                        AfsServer::with_file_systems(ServerConfig::default(), file_systems);
                    let listener = tokio::net::TcpListener::from_std(listener).unwrap();
                    server
                        .serve_on(listener, async {
                            let _ = rx.await;
                        })
                        .await
                        .unwrap();
                });
            });
            Self {
                addr,
                engine,
                shutdown: Some(tx),
                thread: Some(thread),
            }
        }

        fn config(&self) -> RemoteConfig {
            RemoteConfig::new(format!("http://{}", self.addr), "default")
        }

        fn connect(&self) -> RemoteAppStorage {
            RemoteAppStorage::connect(self.config()).unwrap()
        }
    }

    impl Drop for TestServer {
        fn drop(&mut self) {
            if let Some(tx) = self.shutdown.take() {
                let _ = tx.send(());
            }
            if let Some(thread) = self.thread.take() {
                let _ = thread.join();
            }
        }
    }

    // Field order matters: the client disconnects before the server stops.
    struct Fixture {
        storage: RemoteAppStorage,
        server: TestServer,
    }

    impl Deref for Fixture {
        type Target = RemoteAppStorage;

        fn deref(&self) -> &RemoteAppStorage {
            &self.storage
        }
    }

    fn fixture() -> Fixture {
        let server = TestServer::start();
        Fixture {
            storage: server.connect(),
            server,
        }
    }

    fn damage(fixture: &Fixture) -> &dyn LayoutDamage {
        &*fixture.server.engine
    }

    mod contract {
        use super::{damage, fixture};

        afs_storage::storage_contract_tests!(fixture());
        afs_storage::storage_repair_tests!(fixture(), damage);
    }

    fn series(name: &str) -> TimeSeriesMetadata {
        TimeSeriesMetadata::new(
            name,
            TimeSeriesDataType::Double,
            BTreeMap::new(),
            TimeSeriesIndex::new(0, 10, 1).unwrap(),
        )
    }

    #[test]
    fn is_remote() {
        let f = fixture();
        assert!(f.is_remote());
        assert_eq!(f.file_system_name(), "default");
    }

    #[test]
    fn time_series_writes_stay_local_until_flush() {
        let server = TestServer::start();
        let writer = server.connect();
        let reader = server.connect();
        let root = writer.create_root_node_if_not_exists("root", "folder").unwrap();

        writer.create_time_series(root.id, series("ts")).unwrap();
        let chunk = DoubleDataChunk::uncompressed(0, vec![1.0, 2.0]);
        writer.add_double_time_series_data(root.id, 1, "ts", vec![chunk]).unwrap();
        assert!(!reader.time_series_exists(root.id, "ts").unwrap());

        writer.flush().unwrap();
        assert!(reader.time_series_exists(root.id, "ts").unwrap());
        let names: BTreeSet<String> = ["ts".to_string()].into();
        let data = reader.double_time_series_data(root.id, &names, 1).unwrap();
        assert_eq!(data["ts"][0].values(), vec![1.0, 2.0]);
    }

    #[test]
    fn rejected_buffered_writes_surface_on_flush() {
        let f = fixture();
        let root = f.create_root_node_if_not_exists("root", "folder").unwrap();
        let chunk = DoubleDataChunk::uncompressed(0, vec![1.0]);
        f.add_double_time_series_data(root.id, 1, "missing", vec![chunk]).unwrap();
        assert!(matches!(f.flush(), Err(StorageError::InvalidArgument(_))));
        // The rejected batch is gone; later flushes succeed.
        f.flush().unwrap();
    }

    #[test]
    fn events_reach_other_clients() {
        let server = TestServer::start();
        let a = server.connect();
        let b = server.connect();
        let root = a.create_root_node_if_not_exists("root", "folder").unwrap();
        a.flush().unwrap();

        let mut rx = b.events_bus().subscribe();
        a.rename_node(root.id, "renamed").unwrap();
        a.flush().unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut events = Vec::new();
        while events.is_empty() && Instant::now() < deadline {
            events.extend(
                collect_events(&mut rx, 1)
                    .into_iter()
                    .filter(|e| matches!(e, NodeEvent::NodeNameUpdated { .. })),
            );
        }
        assert_eq!(
            events,
            vec![NodeEvent::NodeNameUpdated {
                id: root.id,
                name: "renamed".into()
            }]
        );
    }

    #[test]
    fn connect_fails_without_server() {
        let addr = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap()
        };
        let mut config = RemoteConfig::new(format!("http://{addr}"), "default");
        config.timeout_ms = 500;
        assert!(matches!(RemoteAppStorage::connect(config), Err(StorageError::Backend(_))));
    }

    #[test]
    fn unknown_file_system_is_reported() {
        let server = TestServer::start();
        let mut config = server.config();
        config.file_system_name = "nope".into();
        config.events = false;
        let storage = RemoteAppStorage::connect(config).unwrap();
        assert!(matches!(storage.inconsistent_nodes(), Err(StorageError::Config(_))));
    }

    #[test]
    fn registry_builds_remote_backend() {
        let server = TestServer::start();
        let registry = StorageRegistry::new();
        register(&registry);
        let params = BackendParams::new("default", StorageConfig::default())
            .option("url", format!("http://{}", server.addr))
            .option("events", "false");
        let storage = registry.create("remote", &params).unwrap();
        assert!(storage.is_remote());
        let root = storage.create_root_node_if_not_exists("root", "folder").unwrap();
        assert_eq!(storage.node_info(root.id).unwrap(), root);
        storage.close().unwrap();
    }
}
