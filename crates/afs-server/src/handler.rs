use std::sync::Arc;

use afs_protocol::{endpoints, ErrorBody, ErrorKind, HealthResponse, StorageCodec, StorageResponse};
use afs_storage::AppStorage;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use bytes::Bytes;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::dispatch::dispatch;
use crate::state::FileSystems;

const BINCODE_CONTENT_TYPE: &str = "application/octet-stream";

/// Health check handler.
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::default())
}

/// Names of the hosted file systems.
pub async fn file_systems_handler(
    State(file_systems): State<Arc<FileSystems>>,
) -> Json<Vec<String>> {
    Json(file_systems.names())
}

/// One storage call: bincode `StorageRequest` in, bincode `StorageResponse` out.
pub async fn rpc_handler(
    State(file_systems): State<Arc<FileSystems>>,
    Path(fs): Path<String>,
    body: Bytes,
) -> Response {
    let storage = match file_systems.get(&fs) {
        Ok(storage) => storage,
        Err(e) => {
            return error_response(StatusCode::NOT_FOUND, ErrorKind::Config, e.to_string())
        }
    };
    let request = match StorageCodec::decode_request(&body) {
        Ok(request) => request,
        Err(e) => {
            let message = e.to_string();
            return error_response(StatusCode::BAD_REQUEST, ErrorKind::Serialization, message);
        }
    };
    let kind = request.type_name();
    debug!(file_system = %fs, request = kind, "rpc");

    let outcome = tokio::task::spawn_blocking(move || dispatch(storage.as_ref(), request)).await;
    let response = match outcome {
        Ok(Ok(response)) => response,
        Ok(Err(e)) => {
            debug!(file_system = %fs, request = kind, error = %e, "storage call failed");
            StorageResponse::error(&e)
        }
        Err(e) => {
            warn!(file_system = %fs, request = kind, error = %e, "storage call panicked");
            let message = e.to_string();
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, ErrorKind::Backend, message);
        }
    };
    bincode_response(StatusCode::OK, &response)
}

/// Stream the file system's event lists to a WebSocket client.
pub async fn events_handler(
    State(file_systems): State<Arc<FileSystems>>,
    Path(fs): Path<String>,
    ws: WebSocketUpgrade,
) -> Response {
    match file_systems.get(&fs) {
        Ok(storage) => ws.on_upgrade(move |socket| forward_events(socket, fs, storage)),
        Err(e) => (StatusCode::NOT_FOUND, e.to_string()).into_response(),
    }
}

async fn forward_events(mut socket: WebSocket, fs: String, storage: Arc<dyn AppStorage>) {
    let mut events = storage.events_bus().subscribe();
    if socket.send(Message::Text(endpoints::EVENTS_READY.into())).await.is_err() {
        return;
    }
    info!(file_system = %fs, "events subscriber connected");
    loop {
        tokio::select! {
            received = events.recv() => match received {
                Ok(list) => {
                    let payload = match StorageCodec::encode_events(&list) {
                        Ok(payload) => payload,
                        Err(e) => {
                            warn!(file_system = %fs, error = %e, "dropping unencodable event list");
                            continue;
                        }
                    };
                    if socket.send(Message::Binary(payload)).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(file_system = %fs, skipped, "events subscriber lagged");
                }
                Err(RecvError::Closed) => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            },
        }
    }
    info!(file_system = %fs, "events subscriber disconnected");
}

fn bincode_response(status: StatusCode, response: &StorageResponse) -> Response {
    match StorageCodec::encode_response(response) {
        Ok(payload) => {
            (status, [(header::CONTENT_TYPE, BINCODE_CONTENT_TYPE)], payload).into_response()
        }
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

fn error_response(status: StatusCode, kind: ErrorKind, message: String) -> Response {
    let body = ErrorBody {
        kind,
        message,
        node_id: None,
        target_id: None,
    };
    bincode_response(status, &StorageResponse::Error(body))
}
