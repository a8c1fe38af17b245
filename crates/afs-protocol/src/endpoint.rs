/// HTTP endpoint paths of the storage server.
pub mod endpoints {
    pub const HEALTH: &str = "/v1/health";
    /// Lists hosted file systems.
    pub const FILE_SYSTEMS: &str = "/v1/fs";
    pub const RPC: &str = "/v1/fs/:fs/rpc";
    /// WebSocket of bincode `NodeEventList`s. The server sends
    /// [`EVENTS_READY`] as a text message once the subscription is live.
    pub const EVENTS: &str = "/v1/fs/:fs/events";
    pub const EVENTS_READY: &str = "subscribed";

    pub fn rpc(file_system: &str) -> String {
        format!("/v1/fs/{file_system}/rpc")
    }

    pub fn events(file_system: &str) -> String {
        format!("/v1/fs/{file_system}/events")
    }
}

/// Health check response.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub protocol_version: u32,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".into(),
            version: env!("CARGO_PKG_VERSION").into(),
            protocol_version: super::message::PROTOCOL_VERSION,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_response_defaults() {
        let h = HealthResponse::default();
        assert_eq!(h.status, "ok");
        assert_eq!(h.protocol_version, 1);
    }

    #[test]
    fn per_file_system_paths() {
        assert_eq!(endpoints::rpc("prod"), "/v1/fs/prod/rpc");
        assert_eq!(endpoints::events("prod"), "/v1/fs/prod/events");
        assert_eq!(endpoints::RPC.replace(":fs", "prod"), endpoints::rpc("prod"));
    }
}
