use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use afs_storage::StorageRegistry;
use tokio::net::TcpListener;

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::router::build_router;
use crate::state::FileSystems;

/// Storage server hosting one or more file systems.
pub struct AfsServer {
    config: ServerConfig,
    file_systems: Arc<FileSystems>,
}

impl AfsServer {
    /// Open every configured file system through `registry`.
    pub fn new(config: ServerConfig, registry: &StorageRegistry) -> ServerResult<Self> {
        let file_systems = FileSystems::open(&config, registry)?;
        Ok(Self::with_file_systems(config, file_systems))
    }

    /// Serve already opened storages.
    pub fn with_file_systems(config: ServerConfig, file_systems: FileSystems) -> Self {
        Self {
            config,
            file_systems: Arc::new(file_systems),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn file_systems(&self) -> &FileSystems {
        &self.file_systems
    }

    /// Build the router (useful for testing).
    pub fn router(&self) -> axum::Router {
        build_router(self.file_systems.clone())
    }

    /// Bind the configured address and serve until `shutdown` resolves.
    pub async fn serve(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> ServerResult<()> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        self.serve_on(listener, shutdown).await
    }

    /// Serve on an already bound listener, then close every storage.
    pub async fn serve_on(
        self,
        listener: TcpListener,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> ServerResult<()> {
        let addr: SocketAddr = listener.local_addr()?;
        tracing::info!(%addr, file_systems = ?self.file_systems.names(), "AppFS server listening");
        let result = axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| ServerError::Internal(e.to_string()));
        self.file_systems.close_all();
        tracing::info!("AppFS server stopped");
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_construction() {
        let registry = StorageRegistry::with_defaults();
        let server = AfsServer::new(ServerConfig::default(), &registry).unwrap();
        assert_eq!(server.config().bind_addr, "127.0.0.1:8090".parse().unwrap());
        assert_eq!(server.file_systems().names(), vec!["default".to_string()]);
    }

    #[tokio::test]
    async fn serve_closes_storages_on_shutdown() {
        let registry = StorageRegistry::with_defaults();
        let server = AfsServer::new(ServerConfig::default(), &registry).unwrap();
        let storage = server.file_systems().get("default").unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        server.serve_on(listener, async {}).await.unwrap();
        assert!(storage.is_closed());
    }
}
