//! Broadcast emitter for real-time updates.
//!
//! After a mutation commits, the server tells the real-time service about it
//! with an authenticated `POST /api/broadcast`. Delivery is best-effort and
//! at-most-once: failures are logged and swallowed, never retried.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::Url;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::RealtimeConfig;
use crate::error::{TaskwireError, TaskwireResult};
use crate::event::ChangeEvent;
use crate::session::SessionUser;
use crate::token::TokenSigner;

/// Anything that can fan a change out to other sessions.
#[async_trait]
pub trait Broadcaster: Send + Sync {
    /// Best-effort delivery. Must not fail and must not panic.
    async fn broadcast(&self, session: Option<&SessionUser>, event: &ChangeEvent);
}

/// Posts change events to the real-time service over HTTP.
#[derive(Clone)]
pub struct BroadcastEmitter {
    client: reqwest::Client,
    endpoint: Url,
    signer: TokenSigner,
}

impl BroadcastEmitter {
    /// Create an emitter from configuration.
    pub fn new(config: &RealtimeConfig) -> TaskwireResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.broadcast_timeout)
            .build()?;
        let signer = TokenSigner::new(config.auth_secret.as_bytes())?;
        debug!(endpoint = %config.broadcast_url, "BroadcastEmitter initialized");
        Ok(Self {
            client,
            endpoint: config.broadcast_url.clone(),
            signer,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Sign, post and check the response. Errors are returned, not logged.
    pub async fn try_broadcast(&self, user: &SessionUser, event: &ChangeEvent) -> TaskwireResult<()> {
        let token = self.signer.mint(user)?;
        let envelope = event.to_envelope()?;
        let body = serde_json::to_vec(&envelope.to_broadcast_body())?;

        let response = self
            .client
            .post(self.endpoint.clone())
            .header(CONTENT_TYPE, "application/json")
            .header(AUTHORIZATION, format!("Bearer {}", token))
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(TaskwireError::BroadcastRejected {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl Broadcaster for BroadcastEmitter {
    async fn broadcast(&self, session: Option<&SessionUser>, event: &ChangeEvent) {
        let Some(user) = session else {
            debug!(kind = %event.kind(), "No session, skipping broadcast");
            return;
        };

        debug!(
            url = %self.endpoint,
            kind = %event.kind(),
            entity_id = event.entity_id().unwrap_or("-"),
            "Sending broadcast"
        );

        match self.try_broadcast(user, event).await {
            Ok(()) => {
                debug!(kind = %event.kind(), "Broadcast sent successfully");
            }
            Err(TaskwireError::BroadcastRejected { status, body }) => {
                warn!(
                    kind = %event.kind(),
                    status_code = status,
                    body = %body,
                    "Failed to broadcast update"
                );
            }
            Err(e) => {
                warn!(
                    kind = %event.kind(),
                    error = %e,
                    url = %self.endpoint,
                    "Error broadcasting update (real-time service may be unreachable)"
                );
            }
        }
    }
}

/// Run a broadcast as a detached task.
///
/// The caller never waits on the network; the handle is only there for
/// callers that want to join it (tests, graceful shutdown).
pub fn spawn_broadcast(
    broadcaster: Arc<dyn Broadcaster>,
    session: Option<SessionUser>,
    event: ChangeEvent,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        broadcaster.broadcast(session.as_ref(), &event).await;
    })
}
