//! Session collaborator.
//!
//! Authentication itself lives elsewhere; the real-time layer only needs to
//! know who is acting, or that nobody is.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// The authenticated user behind a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: String,
    pub email: String,
}

impl SessionUser {
    pub fn new(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
        }
    }
}

/// Resolves the current request's session.
#[async_trait]
pub trait SessionLookup: Send + Sync {
    /// Returns `None` when the request carries no valid session.
    async fn current_user(&self) -> Option<SessionUser>;
}

/// A lookup that always answers with the same user (or nobody).
///
/// Handy for CLIs and background jobs that act on behalf of a fixed identity.
#[derive(Debug, Clone, Default)]
pub struct FixedSession(pub Option<SessionUser>);

#[async_trait]
impl SessionLookup for FixedSession {
    async fn current_user(&self) -> Option<SessionUser> {
        self.0.clone()
    }
}
