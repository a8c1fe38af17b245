use std::sync::Arc;

use afs_protocol::{endpoints, MAX_MESSAGE_SIZE};
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::handler;
use crate::state::FileSystems;

/// Build the axum router with all storage endpoints.
pub fn build_router(file_systems: Arc<FileSystems>) -> Router {
    Router::new()
        .route(endpoints::HEALTH, get(handler::health_handler))
        .route(endpoints::FILE_SYSTEMS, get(handler::file_systems_handler))
        .route(endpoints::RPC, post(handler::rpc_handler))
        .route(endpoints::EVENTS, get(handler::events_handler))
        .layer(DefaultBodyLimit::max(MAX_MESSAGE_SIZE))
        .layer(TraceLayer::new_for_http())
        .with_state(file_systems)
}
