//! HTTP route handlers.

pub mod broadcast;
pub mod health;
