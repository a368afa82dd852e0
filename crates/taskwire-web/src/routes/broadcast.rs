//! Broadcast endpoint.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use taskwire_core::Envelope;
use tracing::{debug, info};

use crate::auth::{authorize, bearer_token};
use crate::state::AppState;

/// Body accepted by `POST /api/broadcast`.
#[derive(Debug, Deserialize)]
pub struct BroadcastRequest {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, alias = "payload")]
    pub data: Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BroadcastResponse {
    pub delivered: usize,
}

/// Receive a change event and fan it out to every connected socket.
pub async fn broadcast(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<BroadcastRequest>,
) -> Result<(StatusCode, Json<BroadcastResponse>), (StatusCode, String)> {
    let claims = authorize(&state.signer, bearer_token(&headers))?;

    if req.kind.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Event type must not be empty".to_string()));
    }

    info!(kind = %req.kind, user_id = %claims.sub, "Received broadcast, relaying to WebSocket clients");
    let delivered = state.broadcast(Envelope::new(req.kind, req.data));
    debug!(delivered, "Active WebSocket receivers");

    Ok((StatusCode::ACCEPTED, Json(BroadcastResponse { delivered })))
}
