//! Internal endpoints for out-of-process publishers.

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use taskpulse_core::{Event, UserId};
use tracing::info;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct PublishResponse {
    pub delivered: usize,
}

#[derive(Debug, Serialize)]
pub struct ConnectionsResponse {
    pub connections: usize,
    pub identified: Vec<UserId>,
}

/// Receive an event and broadcast it to all WebSocket clients.
pub async fn publish(
    State(state): State<AppState>,
    Json(event): Json<Event>,
) -> (StatusCode, Json<PublishResponse>) {
    info!(event = %event.kind(), task_id = event.task().id, "Received internal publish");
    let delivered = state.broadcaster.publish(&event);
    (StatusCode::OK, Json(PublishResponse { delivered }))
}

/// Report live connection counts.
pub async fn connections(State(state): State<AppState>) -> Json<ConnectionsResponse> {
    Json(ConnectionsResponse {
        connections: state.registry.len(),
        identified: state.registry.identified_users(),
    })
}
