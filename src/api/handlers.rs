use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::broadcast::WebSocketHub;
use crate::dispatch::{DispatchSummary, Dispatcher, StatsSnapshot};
use crate::storage::ConnectionRegistry;
use crate::vitals::ChangeBatch;

/// Application state shared across handlers
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub registry: Arc<ConnectionRegistry>,
    /// Local socket hub; `None` when an external gateway owns the sockets
    pub hub: Option<Arc<WebSocketHub>>,
}

// ============================================================================
// Health Check
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ============================================================================
// Change Feed
// ============================================================================

/// Dispatch one change-feed batch and return the delivery counters
pub async fn dispatch_events(
    State(state): State<Arc<AppState>>,
    Json(batch): Json<ChangeBatch>,
) -> Json<DispatchSummary> {
    Json(state.dispatcher.process_batch(batch.records).await)
}

// ============================================================================
// Connection Registry
// ============================================================================

#[derive(Serialize)]
pub struct ConnectionsResponse {
    pub connections: Vec<String>,
    pub count: usize,
}

pub async fn list_connections(State(state): State<Arc<AppState>>) -> Json<ConnectionsResponse> {
    let connections: Vec<String> = state.registry.list().into_iter().collect();
    Json(ConnectionsResponse {
        count: connections.len(),
        connections,
    })
}

#[derive(Deserialize)]
pub struct AddConnectionRequest {
    #[serde(alias = "connectionId")]
    pub connection_id: String,
}

#[derive(Serialize)]
pub struct AddConnectionResponse {
    pub connection_id: String,
    pub generation: u64,
}

pub async fn add_connection(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AddConnectionRequest>,
) -> Result<Json<AddConnectionResponse>, ApiError> {
    if request.connection_id.trim().is_empty() {
        return Err(ApiError::BadRequest("connection_id must not be empty".to_string()));
    }

    let generation = state
        .registry
        .add_async(&request.connection_id)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    tracing::info!(connection_id = %request.connection_id, generation, "Connection registered");

    Ok(Json(AddConnectionResponse {
        connection_id: request.connection_id,
        generation,
    }))
}

pub async fn remove_connection(
    State(state): State<Arc<AppState>>,
    Path(connection_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let removed = state
        .registry
        .remove_async(&connection_id)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    if !removed {
        return Err(ApiError::NotFound(format!(
            "Connection '{}' not found",
            connection_id
        )));
    }

    tracing::info!(connection_id = %connection_id, "Connection removed");
    Ok(Json(serde_json::json!({ "removed": connection_id })))
}

// ============================================================================
// WebSocket
// ============================================================================

pub async fn ws_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Result<Response, ApiError> {
    let hub = state.hub.clone().ok_or_else(|| {
        ApiError::Unavailable("WebSocket connections are served by the gateway".to_string())
    })?;
    let registry = Arc::clone(&state.registry);

    Ok(ws.on_upgrade(move |socket| serve_socket(socket, hub, registry)))
}

/// Pump hub messages into the socket until either side closes
async fn serve_socket(socket: WebSocket, hub: Arc<WebSocketHub>, registry: Arc<ConnectionRegistry>) {
    let connection_id = uuid::Uuid::new_v4().to_string();
    let mut outbound = hub.attach(&connection_id);

    if let Err(e) = registry.add_async(&connection_id).await {
        tracing::error!(connection_id = %connection_id, error = %e, "Failed to register socket");
        hub.detach(&connection_id);
        return;
    }
    tracing::info!(connection_id = %connection_id, "Subscriber connected");

    let (mut sink, mut inbound) = socket.split();

    let writer = tokio::spawn(async move {
        while let Some(message) = outbound.recv().await {
            let closing = matches!(message, Message::Close(_));
            if sink.send(message).await.is_err() || closing {
                break;
            }
        }
    });

    // Inbound frames carry nothing for us; read only to notice the close.
    while let Some(frame) = inbound.next().await {
        match frame {
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => {}
        }
    }

    writer.abort();
    hub.detach(&connection_id);
    if let Err(e) = registry.remove_async(&connection_id).await {
        tracing::warn!(connection_id = %connection_id, error = %e, "Failed to unregister socket");
    }
    tracing::info!(connection_id = %connection_id, "Subscriber disconnected");
}

// ============================================================================
// Stats
// ============================================================================

#[derive(Serialize)]
pub struct StatsResponse {
    pub pipeline: StatsSnapshot,
    pub registered_connections: usize,
    pub live_sockets: usize,
}

pub async fn stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    Json(StatsResponse {
        pipeline: state.dispatcher.stats().snapshot(),
        registered_connections: state.registry.len(),
        live_sockets: state.hub.as_ref().map_or(0, |hub| hub.connection_count()),
    })
}

// ============================================================================
// Error Handling
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Unavailable(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}
