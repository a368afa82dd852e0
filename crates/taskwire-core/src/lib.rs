//! Taskwire Core Library
//!
//! Change events, signed real-time tokens and the server-side broadcast
//! emitter that keeps task board sessions in sync.

pub mod config;
pub mod error;
pub mod event;
pub mod notifier;
pub mod session;
pub mod task;
pub mod token;

pub use config::RealtimeConfig;
pub use error::{TaskwireError, TaskwireResult};
pub use event::{ChangeEvent, Envelope};
pub use notifier::{spawn_broadcast, BroadcastEmitter, Broadcaster};
pub use session::{SessionLookup, SessionUser};
pub use token::TokenSigner;
