//! Application state.

use std::sync::Arc;

use taskwire_core::{Envelope, TokenSigner};
use tokio::sync::broadcast;

/// Capacity of the fan-out channel. Slow sockets that fall further behind
/// than this skip the missed events.
pub const BROADCAST_CAPACITY: usize = 100;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub signer: Arc<TokenSigner>,
    pub tx: broadcast::Sender<Envelope>,
}

impl AppState {
    pub fn new(signer: TokenSigner) -> Self {
        let (tx, _rx) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            signer: Arc::new(signer),
            tx,
        }
    }

    /// Broadcast a message to all WebSocket clients. Returns how many
    /// sockets were subscribed at the time.
    pub fn broadcast(&self, msg: Envelope) -> usize {
        self.tx.send(msg).unwrap_or(0)
    }
}
