//! Real-time service configuration.
//!
//! Read from the environment:
//! - `TASKWIRE_WS_URL`: WebSocket endpoint clients connect to.
//! - `TASKWIRE_BROADCAST_URL`: explicit broadcast endpoint (derived when unset).
//! - `TASKWIRE_AUTH_SECRET`: shared token signing secret. Required.
//! - `TASKWIRE_BROADCAST_TIMEOUT_SECS`: HTTP timeout for broadcasts.

use std::time::Duration;

use reqwest::Url;
use tracing::debug;

use crate::error::{TaskwireError, TaskwireResult};

/// Default WebSocket URL of the real-time service.
pub const DEFAULT_WS_URL: &str = "ws://localhost:8080/ws";

/// Default HTTP timeout applied to broadcast requests.
pub const DEFAULT_BROADCAST_TIMEOUT: Duration = Duration::from_secs(10);

pub const ENV_WS_URL: &str = "TASKWIRE_WS_URL";
pub const ENV_BROADCAST_URL: &str = "TASKWIRE_BROADCAST_URL";
pub const ENV_AUTH_SECRET: &str = "TASKWIRE_AUTH_SECRET";
pub const ENV_BROADCAST_TIMEOUT: &str = "TASKWIRE_BROADCAST_TIMEOUT_SECS";

/// Where the real-time service lives and how to authenticate with it.
#[derive(Clone)]
pub struct RealtimeConfig {
    pub ws_url: Url,
    pub broadcast_url: Url,
    pub auth_secret: String,
    pub broadcast_timeout: Duration,
}

impl RealtimeConfig {
    /// Build a config from a WebSocket URL and secret, deriving the broadcast URL.
    pub fn new(ws_url: &str, auth_secret: impl Into<String>) -> TaskwireResult<Self> {
        let ws_url = parse_url(ws_url)?;
        let broadcast_url = derive_broadcast_url(&ws_url)?;
        Self::from_parts(ws_url, broadcast_url, auth_secret.into())
    }

    /// Load from environment variables. Refuses to proceed without a secret.
    pub fn from_env() -> TaskwireResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from any key/value source using the `TASKWIRE_*` names.
    /// Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> TaskwireResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let ws_url = get(ENV_WS_URL).unwrap_or_else(|| DEFAULT_WS_URL.to_string());
        let secret = get(ENV_AUTH_SECRET).unwrap_or_default();

        let mut config = Self::new(ws_url.trim(), secret)?;

        if let Some(explicit) = get(ENV_BROADCAST_URL) {
            config = config.with_broadcast_url(explicit.trim())?;
        }

        if let Some(raw) = get(ENV_BROADCAST_TIMEOUT) {
            let secs: u64 = raw.trim().parse().map_err(|_| {
                TaskwireError::config(format!("{} must be a number of seconds, got '{}'", ENV_BROADCAST_TIMEOUT, raw))
            })?;
            config.broadcast_timeout = Duration::from_secs(secs);
        }

        debug!(
            ws_url = %config.ws_url,
            broadcast_url = %config.broadcast_url,
            "Real-time configuration loaded"
        );
        Ok(config)
    }

    /// Override the derived broadcast URL.
    pub fn with_broadcast_url(mut self, url: &str) -> TaskwireResult<Self> {
        self.broadcast_url = parse_url(url)?;
        Ok(self)
    }

    fn from_parts(ws_url: Url, broadcast_url: Url, auth_secret: String) -> TaskwireResult<Self> {
        if auth_secret.trim().is_empty() {
            return Err(TaskwireError::config(format!(
                "{} is not set; refusing to sign real-time tokens without a secret",
                ENV_AUTH_SECRET
            )));
        }
        Ok(Self {
            ws_url,
            broadcast_url,
            auth_secret,
            broadcast_timeout: DEFAULT_BROADCAST_TIMEOUT,
        })
    }
}

impl std::fmt::Debug for RealtimeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeConfig")
            .field("ws_url", &self.ws_url.as_str())
            .field("broadcast_url", &self.broadcast_url.as_str())
            .field("auth_secret", &"<redacted>")
            .field("broadcast_timeout", &self.broadcast_timeout)
            .finish()
    }
}

fn parse_url(raw: &str) -> TaskwireResult<Url> {
    Url::parse(raw).map_err(|e| TaskwireError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })
}

/// Derive the HTTP broadcast endpoint from the WebSocket endpoint.
///
/// `ws` becomes `http`, `wss` becomes `https`, and a trailing `/ws` path
/// segment becomes `/api/broadcast`. A URL without a trailing `/ws` gets
/// `/api/broadcast` appended to its path.
pub fn derive_broadcast_url(ws_url: &Url) -> TaskwireResult<Url> {
    let scheme = match ws_url.scheme() {
        "ws" | "http" => "http",
        "wss" | "https" => "https",
        other => {
            return Err(TaskwireError::InvalidUrl {
                url: ws_url.to_string(),
                reason: format!("unsupported scheme '{}'", other),
            })
        }
    };

    let mut url = ws_url.clone();
    url.set_scheme(scheme).map_err(|_| TaskwireError::InvalidUrl {
        url: ws_url.to_string(),
        reason: format!("cannot switch scheme to '{}'", scheme),
    })?;

    let path = ws_url.path().trim_end_matches('/');
    let base = path.strip_suffix("/ws").unwrap_or(path);
    url.set_path(&format!("{}/api/broadcast", base));
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}
