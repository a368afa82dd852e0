//! End-to-end tests: emitter, relay and client talking over real sockets.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use reqwest::Url;
use taskwire_client::{
    CacheScope, ClientOptions, ConnectionState, ProviderOptions, QueryCache, RealtimeClient,
    RealtimeProvider, ReconnectPolicy,
};
use taskwire_core::event::{EntityRef, TaskStatusChanged};
use taskwire_core::session::FixedSession;
use taskwire_core::task::model::{NewTask, Task, TaskChanges};
use taskwire_core::task::{TaskService, TaskStore};
use taskwire_core::{
    BroadcastEmitter, Broadcaster, ChangeEvent, RealtimeConfig, SessionUser, TaskwireError,
    TaskwireResult, TokenSigner,
};
use taskwire_web::{create_router, AppState};
use tokio::net::TcpListener;
use tokio::time::{sleep, timeout, Instant};
use tokio_tungstenite::tungstenite::{self, Message};

const SECRET: &str = "e2e-shared-secret";

struct Relay {
    addr: SocketAddr,
    state: AppState,
}

impl Relay {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = AppState::new(TokenSigner::new(SECRET.as_bytes()).unwrap());
        let app = create_router(state.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self { addr, state }
    }

    fn ws_url(&self) -> Url {
        Url::parse(&format!("ws://{}/ws", self.addr)).unwrap()
    }

    fn token(&self, user: &SessionUser) -> String {
        self.state.signer.mint(user).unwrap()
    }

    fn emitter(&self) -> BroadcastEmitter {
        let config = RealtimeConfig::new(self.ws_url().as_str(), SECRET).unwrap();
        BroadcastEmitter::new(&config).unwrap()
    }

    fn sockets(&self) -> usize {
        self.state.tx.receiver_count()
    }
}

fn alice() -> SessionUser {
    SessionUser::new("u-alice", "alice@example.com")
}

fn bob() -> SessionUser {
    SessionUser::new("u-bob", "bob@example.com")
}

async fn eventually(mut check: impl FnMut() -> bool, within: Duration) -> bool {
    let deadline = Instant::now() + within;
    loop {
        if check() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        sleep(Duration::from_millis(10)).await;
    }
}

fn fast_policy() -> ReconnectPolicy {
    ReconnectPolicy {
        max_attempts: 3,
        initial_delay: Duration::from_millis(20),
        max_delay: Duration::from_millis(80),
    }
}

fn fast_client(url: Url) -> RealtimeClient {
    RealtimeClient::with_options(
        url,
        ClientOptions {
            reconnect: fast_policy(),
            ..ClientOptions::default()
        },
    )
}

#[derive(Default)]
struct RecordingCache {
    calls: Mutex<Vec<CacheScope>>,
}

impl RecordingCache {
    fn count(&self, scope: CacheScope) -> usize {
        self.calls.lock().unwrap().iter().filter(|s| **s == scope).count()
    }
}

impl QueryCache for RecordingCache {
    fn invalidate(&self, scope: CacheScope) {
        self.calls.lock().unwrap().push(scope);
    }
}

#[derive(Default)]
struct MemoryTasks {
    tasks: tokio::sync::Mutex<HashMap<String, Task>>,
}

#[async_trait]
impl TaskStore for MemoryTasks {
    async fn create_task(&self, owner_id: &str, input: &NewTask) -> TaskwireResult<Task> {
        let mut tasks = self.tasks.lock().await;
        let now = Utc::now();
        let task = Task {
            id: format!("t-{}", tasks.len() + 1),
            user_id: owner_id.to_string(),
            title: input.title.clone(),
            description: input.description.clone(),
            status_id: input.status_id.clone(),
            priority: input.priority.clone(),
            created_at: now,
            updated_at: now,
        };
        tasks.insert(task.id.clone(), task.clone());
        Ok(task)
    }

    async fn update_task(&self, owner_id: &str, task_id: &str, changes: &TaskChanges) -> TaskwireResult<Task> {
        let mut tasks = self.tasks.lock().await;
        let task = tasks
            .get_mut(task_id)
            .filter(|t| t.user_id == owner_id)
            .ok_or_else(|| TaskwireError::TaskNotFound(task_id.to_string()))?;
        if let Some(title) = &changes.title {
            task.title = title.clone();
        }
        task.updated_at = Utc::now();
        Ok(task.clone())
    }

    async fn update_task_status(&self, owner_id: &str, task_id: &str, status_id: &str) -> TaskwireResult<Task> {
        let mut tasks = self.tasks.lock().await;
        let task = tasks
            .get_mut(task_id)
            .filter(|t| t.user_id == owner_id)
            .ok_or_else(|| TaskwireError::TaskNotFound(task_id.to_string()))?;
        task.status_id = status_id.to_string();
        task.updated_at = Utc::now();
        Ok(task.clone())
    }

    async fn delete_task(&self, owner_id: &str, task_id: &str) -> TaskwireResult<()> {
        let mut tasks = self.tasks.lock().await;
        match tasks.get(task_id) {
            Some(t) if t.user_id == owner_id => {
                tasks.remove(task_id);
                Ok(())
            }
            _ => Err(TaskwireError::TaskNotFound(task_id.to_string())),
        }
    }
}

fn status_changed(id: &str, status: &str) -> ChangeEvent {
    ChangeEvent::TaskStatusChanged(TaskStatusChanged {
        id: id.to_string(),
        status_id: status.to_string(),
    })
}

#[tokio::test]
async fn test_broadcast_without_session_never_reaches_relay() {
    let relay = Relay::start().await;
    let mut rx = relay.state.tx.subscribe();
    let emitter = relay.emitter();

    emitter.broadcast(None, &status_changed("t-1", "done")).await;

    let nothing = timeout(Duration::from_millis(200), rx.recv()).await;
    assert!(nothing.is_err(), "relay received a broadcast without a session");
}

#[tokio::test]
async fn test_emitter_delivers_signed_broadcast() {
    let relay = Relay::start().await;
    let mut rx = relay.state.tx.subscribe();
    let emitter = relay.emitter();

    emitter
        .try_broadcast(&alice(), &ChangeEvent::TaskDeleted(EntityRef::new("t-9")))
        .await
        .unwrap();

    let envelope = timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
    assert_eq!(envelope.kind, "task_deleted");
    assert_eq!(envelope.payload["id"], "t-9");
}

#[tokio::test]
async fn test_emitter_with_wrong_secret_is_rejected() {
    let relay = Relay::start().await;
    let config = RealtimeConfig::new(relay.ws_url().as_str(), "not-the-relay-secret").unwrap();
    let emitter = BroadcastEmitter::new(&config).unwrap();

    let err = emitter
        .try_broadcast(&alice(), &status_changed("t-1", "done"))
        .await
        .unwrap_err();
    assert!(matches!(err, TaskwireError::BroadcastRejected { status: 401, .. }));
}

#[tokio::test]
async fn test_socket_with_bad_token_gets_401() {
    let relay = Relay::start().await;
    let url = format!("ws://{}/ws?token=forged", relay.addr);

    match tokio_tungstenite::connect_async(url).await {
        Err(tungstenite::Error::Http(response)) => assert_eq!(response.status(), 401),
        other => panic!("expected 401 handshake failure, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn test_relay_answers_ping_with_pong() {
    let relay = Relay::start().await;
    let url = format!("ws://{}/ws?token={}", relay.addr, relay.token(&alice()));
    let (mut socket, _) = tokio_tungstenite::connect_async(url).await.unwrap();

    socket
        .send(Message::Text(r#"{"type":"ping"}"#.to_string()))
        .await
        .unwrap();

    let reply = timeout(Duration::from_secs(1), socket.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let value: serde_json::Value = serde_json::from_str(reply.to_text().unwrap()).unwrap();
    assert_eq!(value["type"], "pong");
}

#[tokio::test]
async fn test_client_close_releases_relay_subscription() {
    let relay = Relay::start().await;
    let url = format!("ws://{}/ws?token={}", relay.addr, relay.token(&alice()));
    let (mut socket, _) = tokio_tungstenite::connect_async(url).await.unwrap();
    assert!(eventually(|| relay.sockets() == 1, Duration::from_secs(2)).await);

    socket.close(None).await.unwrap();
    drop(socket);

    // No broadcast is sent, so only tearing down the forwarding half frees the receiver.
    assert!(eventually(|| relay.sockets() == 0, Duration::from_secs(2)).await);
}

#[tokio::test]
async fn test_client_holds_a_single_socket() {
    let relay = Relay::start().await;
    let client = RealtimeClient::new(relay.ws_url());
    let token = relay.token(&alice());

    client.connect(&token);
    client.connect(&token);
    assert!(eventually(|| client.is_connected(), Duration::from_secs(2)).await);

    client.connect(&token);
    sleep(Duration::from_millis(200)).await;
    assert_eq!(relay.sockets(), 1);

    client.disconnect();
}

#[tokio::test]
async fn test_disconnect_closes_socket_without_reconnecting() {
    let relay = Relay::start().await;
    let client = fast_client(relay.ws_url());

    client.connect(&relay.token(&alice()));
    assert!(eventually(|| relay.sockets() == 1, Duration::from_secs(2)).await);

    client.disconnect();
    assert_eq!(client.state(), ConnectionState::Idle);
    assert!(eventually(|| relay.sockets() == 0, Duration::from_secs(2)).await);

    sleep(Duration::from_millis(300)).await;
    assert_eq!(client.state(), ConnectionState::Idle);
    assert_eq!(relay.sockets(), 0);
    assert!(!client.send(&taskwire_core::Envelope::ping()));
}

#[tokio::test]
async fn test_client_reconnects_after_server_drop() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(Mutex::new(0usize));

    let counter = accepted.clone();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            let Ok(socket) = tokio_tungstenite::accept_async(stream).await else {
                continue;
            };
            let mut n = counter.lock().unwrap();
            *n += 1;
            if *n > 1 {
                held.push(socket);
            }
            // The first socket is dropped, which the client sees as an unexpected close.
        }
    });

    let client = fast_client(Url::parse(&format!("ws://{}/ws", addr)).unwrap());
    client.connect("any-token");

    assert!(
        eventually(
            || *accepted.lock().unwrap() >= 2 && client.is_connected(),
            Duration::from_secs(3)
        )
        .await
    );
    assert_eq!(client.reconnect_attempts(), 0);
    client.disconnect();
}

#[tokio::test]
async fn test_reconnect_gives_up_after_max_attempts() {
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let client = fast_client(Url::parse(&format!("ws://{}/ws", addr)).unwrap());

    client.connect("any-token");
    assert!(eventually(|| client.state() == ConnectionState::Exhausted, Duration::from_secs(3)).await);
    assert_eq!(client.reconnect_attempts(), 3);

    // An explicit connect starts a fresh cycle.
    client.connect("any-token");
    assert_ne!(client.state(), ConnectionState::Exhausted);
    client.disconnect();
}

#[tokio::test]
async fn test_status_change_invalidates_tasks_in_other_sessions() {
    let relay = Relay::start().await;
    let options = ProviderOptions {
        debounce_window: Duration::from_millis(500),
        ..ProviderOptions::default()
    };

    let cache_a = Arc::new(RecordingCache::default());
    let cache_b = Arc::new(RecordingCache::default());
    let mut provider_a = RealtimeProvider::with_options(relay.ws_url(), cache_a.clone(), options);
    let mut provider_b = RealtimeProvider::with_options(relay.ws_url(), cache_b.clone(), options);
    provider_a.mount(&relay.token(&alice()));
    provider_b.mount(&relay.token(&bob()));
    assert!(eventually(|| relay.sockets() == 2, Duration::from_secs(2)).await);

    let service = TaskService::new(
        Arc::new(MemoryTasks::default()),
        Arc::new(FixedSession(Some(alice()))),
        Arc::new(relay.emitter()),
    );
    let task = service
        .create_task(NewTask {
            title: "Ship relay".to_string(),
            description: None,
            status_id: "todo".to_string(),
            priority: None,
        })
        .await
        .unwrap();
    service.update_task_status(&task.id, "done").await.unwrap();

    // Both events land inside one debounce window: one refetch per session.
    assert!(
        eventually(
            || cache_b.count(CacheScope::Tasks) == 1 && cache_a.count(CacheScope::Tasks) == 1,
            Duration::from_millis(1500)
        )
        .await
    );
    sleep(Duration::from_millis(700)).await;
    assert_eq!(cache_b.count(CacheScope::Tasks), 1);
    assert_eq!(cache_b.count(CacheScope::Notes), 0);

    provider_a.dispose();
    provider_b.dispose();
    assert!(eventually(|| relay.sockets() == 0, Duration::from_secs(2)).await);
}

#[tokio::test]
async fn test_mutation_succeeds_when_relay_is_down() {
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let config = RealtimeConfig::new(&format!("ws://{}/ws", addr), SECRET).unwrap();
    let service = TaskService::new(
        Arc::new(MemoryTasks::default()),
        Arc::new(FixedSession(Some(alice()))),
        Arc::new(BroadcastEmitter::new(&config).unwrap()),
    );

    let task = service
        .create_task(NewTask {
            title: "Offline edit".to_string(),
            description: None,
            status_id: "todo".to_string(),
            priority: None,
        })
        .await
        .unwrap();
    let moved = service.update_task_status(&task.id, "done").await.unwrap();
    assert_eq!(moved.status_id, "done");
    service.delete_task(&task.id).await.unwrap();
}
