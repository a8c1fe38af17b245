use afs_protocol::{
    endpoints, HealthResponse, StorageCodec, StorageRequest, StorageResponse, PROTOCOL_VERSION,
};
use afs_storage::{StorageError, StorageResult};
use reqwest::blocking::Client;
use tracing::{debug, trace};

use crate::config::RemoteConfig;

/// Blocking bincode RPC client for one file system.
pub struct RpcClient {
    http: Client,
    health_url: String,
    rpc_url: String,
}

impl RpcClient {
    pub fn new(config: &RemoteConfig) -> StorageResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| StorageError::Backend(format!("http client: {e}")))?;
        Ok(Self {
            http,
            health_url: format!("{}{}", config.base(), endpoints::HEALTH),
            rpc_url: format!("{}{}", config.base(), endpoints::rpc(&config.file_system_name)),
        })
    }

    /// Check the server is up and speaks our protocol version.
    pub fn health(&self) -> StorageResult<HealthResponse> {
        let body = self
            .http
            .get(&self.health_url)
            .send()
            .and_then(|r| r.error_for_status())
            .and_then(|r| r.bytes())
            .map_err(|e| StorageError::Backend(format!("{}: {e}", self.health_url)))?;
        let health: HealthResponse =
            serde_json::from_slice(&body).map_err(|e| StorageError::Serialization(e.to_string()))?;
        if health.protocol_version != PROTOCOL_VERSION {
            return Err(StorageError::Config(format!(
                "server speaks protocol {}, client speaks {PROTOCOL_VERSION}",
                health.protocol_version
            )));
        }
        debug!(url = %self.health_url, version = %health.version, "storage server is healthy");
        Ok(health)
    }

    /// Send one request. Error responses come back as `Err`.
    pub fn call(&self, request: &StorageRequest) -> StorageResult<StorageResponse> {
        trace!(request = request.type_name(), "rpc");
        let payload = StorageCodec::encode_request(request)?;
        let response = self
            .http
            .post(&self.rpc_url)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(payload)
            .send()
            .map_err(|e| StorageError::Backend(format!("{}: {e}", self.rpc_url)))?;
        let status = response.status();
        let body = response
            .bytes()
            .map_err(|e| StorageError::Backend(format!("{}: {e}", self.rpc_url)))?;
        let decoded = StorageCodec::decode_response(&body).map_err(|e| {
            StorageError::Backend(format!(
                "{} answered {status} with an unreadable body: {e}",
                self.rpc_url
            ))
        })?;
        match decoded {
            StorageResponse::Error(body) => Err(body.into()),
            other => Ok(other),
        }
    }
}
