//! Taskwire Relay
//!
//! Axum-based development relay: accepts authenticated broadcasts over HTTP
//! and fans them out to every connected WebSocket client.

pub mod auth;
pub mod routes;
pub mod state;
pub mod websocket;

use axum::{
    routing::{get, post},
    Router,
};
use taskwire_core::TokenSigner;
use tokio::net::TcpListener;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub use state::AppState;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(routes::health::health))
        .route("/api/broadcast", post(routes::broadcast::broadcast))
        .route("/ws", get(websocket::ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Serve the relay on an already bound listener.
pub async fn serve(listener: TcpListener, signer: TokenSigner) -> anyhow::Result<()> {
    let app = create_router(AppState::new(signer));
    axum::serve(listener, app).await?;
    Ok(())
}

/// Run the relay.
pub async fn run_server(signer: TokenSigner, host: &str, port: u16) -> anyhow::Result<()> {
    let listener = TcpListener::bind(format!("{}:{}", host, port)).await?;
    tracing::info!("Relay listening on http://{}", listener.local_addr()?);

    serve(listener, signer).await
}
