//! WebSocket connection manager.
//!
//! Owns at most one socket, authenticates with a token passed as the `token`
//! query parameter, keeps the link alive with periodic pings and reconnects
//! with exponential backoff after unexpected closes.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use reqwest::Url;
use taskwire_core::event::{parse_envelope, PING};
use taskwire_core::{ChangeEvent, Envelope};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, trace, warn};

use crate::connection::{Backoff, ConnectionState, ReconnectPolicy};
use crate::handlers::{HandlerSet, Subscription};

/// Interval between keep-alive pings.
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// Tunables for a [`RealtimeClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientOptions {
    pub keepalive_interval: Duration,
    pub reconnect: ReconnectPolicy,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            keepalive_interval: KEEPALIVE_INTERVAL,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

struct Shared {
    token: Option<String>,
    state: ConnectionState,
    backoff: Backoff,
    intentionally_closed: bool,
    /// Bumped on every connection attempt and every disconnect; socket
    /// tasks and reconnect timers from an older generation stand down.
    generation: u64,
    outbound: Option<mpsc::UnboundedSender<Message>>,
    shutdown: Option<oneshot::Sender<()>>,
}

struct Inner {
    url: Url,
    options: ClientOptions,
    handlers: HandlerSet,
    shared: Mutex<Shared>,
}

/// Real-time client for one session. Cheap to clone; clones share the socket.
#[derive(Clone)]
pub struct RealtimeClient {
    inner: Arc<Inner>,
}

impl RealtimeClient {
    pub fn new(url: Url) -> Self {
        Self::with_options(url, ClientOptions::default())
    }

    pub fn with_options(url: Url, options: ClientOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                url,
                options,
                handlers: HandlerSet::new(),
                shared: Mutex::new(Shared {
                    token: None,
                    state: ConnectionState::Idle,
                    backoff: Backoff::new(options.reconnect),
                    intentionally_closed: false,
                    generation: 0,
                    outbound: None,
                    shutdown: None,
                }),
            }),
        }
    }

    pub fn url(&self) -> &Url {
        &self.inner.url
    }

    /// Open the socket with `token`.
    ///
    /// A no-op while a socket is open or opening, and when `token` is empty.
    /// Calling this after reconnects were exhausted starts a fresh cycle.
    /// Must be called from within a tokio runtime.
    pub fn connect(&self, token: &str) {
        let mut shared = self.inner.lock();
        if shared.state.is_live() {
            debug!(state = ?shared.state, "WebSocket already connected");
            return;
        }
        if token.is_empty() {
            warn!("WebSocket token is empty, cannot connect");
            return;
        }

        shared.token = Some(token.to_string());
        shared.intentionally_closed = false;
        shared.backoff.reset();
        Inner::start(&self.inner, &mut shared, token);
    }

    /// Close the socket and suppress reconnection. Idempotent.
    pub fn disconnect(&self) {
        let mut shared = self.inner.lock();
        shared.intentionally_closed = true;
        shared.generation += 1;
        shared.outbound = None;
        if let Some(shutdown) = shared.shutdown.take() {
            let _ = shutdown.send(());
        }
        let previous = std::mem::replace(&mut shared.state, ConnectionState::Idle);
        if previous != ConnectionState::Idle {
            info!(previous = ?previous, "WebSocket disconnected");
        }
    }

    /// Send a message if connected; otherwise warn and drop it.
    /// Returns whether the message was queued for the socket.
    pub fn send(&self, message: &Envelope) -> bool {
        let shared = self.inner.lock();
        let Some(outbound) = shared.outbound.as_ref().filter(|_| shared.state.is_connected()) else {
            warn!(kind = %message.kind, "WebSocket is not connected, cannot send message");
            return false;
        };

        match serde_json::to_string(message) {
            Ok(text) => outbound.send(Message::Text(text)).is_ok(),
            Err(e) => {
                error!(error = %e, "Failed to serialize outbound message");
                false
            }
        }
    }

    /// Register a handler for inbound change events.
    pub fn add_message_handler<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        self.inner.handlers.add(Arc::new(handler))
    }

    pub fn is_connected(&self) -> bool {
        self.inner.lock().state.is_connected()
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.lock().state.clone()
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.lock().backoff.attempts()
    }

    pub fn handler_count(&self) -> usize {
        self.inner.handlers.len()
    }

    /// Feed a text frame through the inbound path as if the socket received it.
    #[cfg(test)]
    pub(crate) fn inject_text(&self, text: &str) {
        let _ = self.inner.handle_text(text);
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn socket_url(&self, token: &str) -> Url {
        let mut url = self.url.clone();
        url.query_pairs_mut().append_pair("token", token);
        url
    }

    /// Begin a new connection attempt. Caller holds the lock.
    fn start(this: &Arc<Self>, shared: &mut Shared, token: &str) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            error!("WebSocket connect requires a tokio runtime");
            return;
        };

        shared.generation += 1;
        shared.state = ConnectionState::Connecting;
        let generation = shared.generation;
        let url = this.socket_url(token);
        debug!(url = %this.url, generation, "Opening WebSocket");

        runtime.spawn(Self::run_socket(this.clone(), generation, url));
    }

    async fn run_socket(this: Arc<Self>, generation: u64, url: Url) {
        let stream = match connect_async(url.as_str()).await {
            Ok((stream, _response)) => stream,
            Err(e) => {
                warn!(error = %e, url = %this.url, "WebSocket error");
                Self::handle_close(&this, generation);
                return;
            }
        };
        let (mut write, mut read) = stream.split();

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Message>();
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let accepted = {
            let mut shared = this.lock();
            if shared.generation != generation || shared.intentionally_closed {
                false
            } else {
                shared.state = ConnectionState::Connected;
                shared.backoff.reset();
                shared.outbound = Some(out_tx);
                shared.shutdown = Some(shutdown_tx);
                true
            }
        };
        if !accepted {
            debug!(generation, "Connection superseded before open, closing");
            let _ = write.send(Message::Close(None)).await;
            return;
        }
        info!(url = %this.url, "WebSocket connected");

        let period = this.options.keepalive_interval;
        let mut keepalive = tokio::time::interval_at(tokio::time::Instant::now() + period, period);

        let intentional = loop {
            tokio::select! {
                _ = keepalive.tick() => {
                    let ping = serde_json::to_string(&Envelope::ping()).unwrap_or_default();
                    trace!("Sending keep-alive ping");
                    if let Err(e) = write.send(Message::Text(ping)).await {
                        warn!(error = %e, "Failed to send keep-alive");
                        break false;
                    }
                }
                Some(message) = out_rx.recv() => {
                    if let Err(e) = write.send(message).await {
                        warn!(error = %e, "WebSocket send failed");
                        break false;
                    }
                }
                _ = &mut shutdown_rx => {
                    let _ = write.send(Message::Close(None)).await;
                    break true;
                }
                frame = read.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            if let Some(reply) = this.handle_text(&text) {
                                if let Err(e) = write.send(Message::Text(reply)).await {
                                    warn!(error = %e, "Failed to answer keep-alive");
                                    break false;
                                }
                            }
                        }
                        Some(Ok(Message::Close(frame))) => {
                            info!(frame = ?frame, "WebSocket closed");
                            break false;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            warn!(error = %e, "WebSocket error");
                            break false;
                        }
                        None => break false,
                    }
                }
            }
        };

        if !intentional {
            Self::handle_close(&this, generation);
        }
    }

    /// Decode and dispatch one text frame. Returns a reply to send, if any.
    fn handle_text(&self, text: &str) -> Option<String> {
        let envelope = match parse_envelope(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                error!(error = %e, "Error parsing WebSocket message");
                return None;
            }
        };

        if envelope.is_keepalive() {
            if envelope.kind == PING {
                return serde_json::to_string(&Envelope::pong()).ok();
            }
            trace!("Received keep-alive pong");
            return None;
        }

        let event = ChangeEvent::from_envelope(envelope);
        let delivered = self.handlers.dispatch(&event);
        debug!(kind = %event.kind(), handlers = delivered, "Dispatched WebSocket message");
        None
    }

    /// React to a socket of `generation` going away.
    fn handle_close(this: &Arc<Self>, generation: u64) {
        let mut shared = this.lock();
        if shared.generation != generation {
            return;
        }
        shared.outbound = None;
        shared.shutdown = None;

        if shared.intentionally_closed {
            shared.state = ConnectionState::Idle;
            return;
        }

        match shared.backoff.next_attempt() {
            Some((attempt, delay)) => {
                info!(
                    attempt,
                    max_attempts = this.options.reconnect.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Attempting to reconnect"
                );
                shared.state = ConnectionState::Reconnecting { attempt, delay };
                let inner = this.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    Self::reconnect(&inner, generation);
                });
            }
            None => {
                error!(
                    attempts = shared.backoff.attempts(),
                    "Max reconnection attempts reached"
                );
                shared.state = ConnectionState::Exhausted;
            }
        }
    }

    fn reconnect(this: &Arc<Self>, generation: u64) {
        let mut shared = this.lock();
        if shared.generation != generation || shared.intentionally_closed {
            debug!("Reconnect cancelled");
            return;
        }
        let Some(token) = shared.token.clone() else {
            return;
        };
        Self::start(this, &mut shared, &token);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskwire_core::event::{EntityKind, PONG};

    fn client() -> RealtimeClient {
        RealtimeClient::new(Url::parse("ws://127.0.0.1:9/ws").unwrap())
    }

    #[test]
    fn test_socket_url_encodes_token() {
        let client = client();
        let url = client.inner.socket_url("a b+c");
        assert_eq!(url.as_str(), "ws://127.0.0.1:9/ws?token=a+b%2Bc");
    }

    #[test]
    fn test_empty_token_is_noop() {
        let client = client();
        client.connect("");
        assert_eq!(client.state(), ConnectionState::Idle);
    }

    #[test]
    fn test_send_while_idle_is_dropped() {
        let client = client();
        assert!(!client.send(&Envelope::ping()));
    }

    #[test]
    fn test_disconnect_is_idempotent() {
        let client = client();
        client.disconnect();
        client.disconnect();
        assert_eq!(client.state(), ConnectionState::Idle);
        assert!(!client.is_connected());
    }

    #[test]
    fn test_pong_is_not_dispatched() {
        let client = client();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _sub = client.add_message_handler(move |event| {
            sink.lock().unwrap().push(event.kind());
        });

        assert_eq!(client.inner.handle_text(r#"{"type":"pong","payload":{}}"#), None);
        assert_eq!(
            client.inner.handle_text(r#"{"type":"task_deleted","payload":{"id":"t-1"}}"#),
            None
        );
        assert_eq!(*seen.lock().unwrap(), vec!["task_deleted".to_string()]);
    }

    #[test]
    fn test_inbound_ping_gets_pong() {
        let client = client();
        let reply = client.inner.handle_text(r#"{"type":"ping","payload":{}}"#).unwrap();
        assert_eq!(parse_envelope(&reply).unwrap().kind, PONG);
    }

    #[test]
    fn test_unparseable_messages_are_dropped() {
        let client = client();
        let calls = Arc::new(Mutex::new(0));
        let counter = calls.clone();
        let _sub = client.add_message_handler(move |_| {
            *counter.lock().unwrap() += 1;
        });

        assert_eq!(client.inner.handle_text("{{{"), None);
        assert_eq!(client.inner.handle_text(r#"{"payload":{"id":"t-1"}}"#), None);
        assert_eq!(*calls.lock().unwrap(), 0);
    }

    #[test]
    fn test_known_kind_with_loose_payload_is_dispatched() {
        let client = client();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _sub = client.add_message_handler(move |event| {
            sink.lock().unwrap().push((event.kind(), event.entity()));
        });

        client.inner.handle_text(r#"{"type":"task_status_changed","payload":{"id":"t-1"}}"#);
        client.inner.handle_text(r#"{"type":"task_deleted","payload":{}}"#);

        let seen = seen.lock().unwrap().clone();
        assert_eq!(
            seen,
            vec![
                ("task_status_changed".to_string(), Some(EntityKind::Task)),
                ("task_deleted".to_string(), Some(EntityKind::Task)),
            ]
        );
    }

    #[tokio::test]
    async fn test_connect_while_connecting_is_noop() {
        let client = client();
        client.connect("token-1");
        let generation = client.inner.lock().generation;
        client.connect("token-2");
        assert_eq!(client.inner.lock().generation, generation);
        assert_eq!(client.inner.lock().token.as_deref(), Some("token-1"));
        client.disconnect();
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_after_disconnect_schedules_nothing() {
        let client = client();
        client.connect("token");
        let generation = client.inner.lock().generation;
        client.disconnect();

        Inner::handle_close(&client.inner, generation);
        assert_eq!(client.state(), ConnectionState::Idle);
        assert_eq!(client.reconnect_attempts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unexpected_close_schedules_backoff() {
        let client = client();
        let generation = {
            let mut shared = client.inner.lock();
            shared.token = Some("token".to_string());
            shared.generation = 7;
            shared.state = ConnectionState::Connected;
            shared.generation
        };

        Inner::handle_close(&client.inner, generation);
        assert_eq!(
            client.state(),
            ConnectionState::Reconnecting {
                attempt: 1,
                delay: Duration::from_millis(1000)
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_closes_follow_default_schedule_then_exhaust() {
        let client = client();
        let generation = {
            let mut shared = client.inner.lock();
            shared.token = Some("token".to_string());
            shared.state = ConnectionState::Connected;
            shared.generation
        };

        // No await in between, so none of the scheduled reconnects runs.
        let mut states = Vec::new();
        for _ in 0..6 {
            Inner::handle_close(&client.inner, generation);
            states.push(client.state());
        }

        let expected: Vec<ConnectionState> = [1000u64, 2000, 4000, 8000, 16000]
            .iter()
            .enumerate()
            .map(|(i, ms)| ConnectionState::Reconnecting {
                attempt: i as u32 + 1,
                delay: Duration::from_millis(*ms),
            })
            .chain(std::iter::once(ConnectionState::Exhausted))
            .collect();
        assert_eq!(states, expected);
        assert_eq!(client.reconnect_attempts(), 5);

        client.disconnect();
    }
}
