//! Taskwire real-time client.
//!
//! A WebSocket connection manager with keep-alive and exponential-backoff
//! reconnects, plus a provider that turns inbound change events into
//! debounced cache invalidations.

pub mod client;
pub mod connection;
pub mod debounce;
pub mod handlers;
pub mod provider;

pub use client::{ClientOptions, RealtimeClient};
pub use connection::{ConnectionState, ReconnectPolicy};
pub use handlers::Subscription;
pub use provider::{CacheScope, ProviderOptions, QueryCache, RealtimeProvider};
