//! Session-scoped real-time provider.
//!
//! The provider is the one owner of a session's [`RealtimeClient`]. It is
//! built once at the application root, mounted when a session token becomes
//! available and unmounted (or disposed) when the session ends. While
//! mounted it turns inbound change events into debounced cache
//! invalidations so bursts of edits cause a single refetch.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Url;
use taskwire_core::event::EntityKind;
use taskwire_core::ChangeEvent;
use tracing::{debug, info};

use crate::client::{ClientOptions, RealtimeClient};
use crate::debounce::{Debouncer, DEFAULT_DEBOUNCE_WINDOW};
use crate::handlers::Subscription;

/// Cached query families a consumer may need to refetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheScope {
    Tasks,
    Notes,
    Applications,
}

impl From<EntityKind> for CacheScope {
    fn from(kind: EntityKind) -> Self {
        match kind {
            EntityKind::Task => CacheScope::Tasks,
            EntityKind::Note => CacheScope::Notes,
            EntityKind::Application => CacheScope::Applications,
        }
    }
}

/// The consumer's local query cache.
pub trait QueryCache: Send + Sync {
    /// Mark every cached query in `scope` stale.
    fn invalidate(&self, scope: CacheScope);
}

/// Provider tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderOptions {
    pub client: ClientOptions,
    pub debounce_window: Duration,
}

impl Default for ProviderOptions {
    fn default() -> Self {
        Self {
            client: ClientOptions::default(),
            debounce_window: DEFAULT_DEBOUNCE_WINDOW,
        }
    }
}

struct ScopeDebouncers {
    tasks: Debouncer,
    notes: Debouncer,
    applications: Debouncer,
}

impl ScopeDebouncers {
    fn spawn(window: Duration, cache: &Arc<dyn QueryCache>) -> Self {
        let action = |scope: CacheScope| -> Arc<dyn Fn() + Send + Sync> {
            let cache = cache.clone();
            Arc::new(move || {
                debug!(scope = ?scope, "Invalidating cached queries");
                cache.invalidate(scope);
            })
        };
        Self {
            tasks: Debouncer::spawn(window, action(CacheScope::Tasks)),
            notes: Debouncer::spawn(window, action(CacheScope::Notes)),
            applications: Debouncer::spawn(window, action(CacheScope::Applications)),
        }
    }

    fn trigger(&self, scope: CacheScope) {
        match scope {
            CacheScope::Tasks => self.tasks.trigger(),
            CacheScope::Notes => self.notes.trigger(),
            CacheScope::Applications => self.applications.trigger(),
        }
    }
}

struct Mounted {
    subscription: Subscription,
    // Held so pending invalidations live exactly as long as the mount.
    _debouncers: Arc<ScopeDebouncers>,
}

/// Owns the real-time connection for one session.
pub struct RealtimeProvider {
    client: RealtimeClient,
    cache: Arc<dyn QueryCache>,
    debounce_window: Duration,
    mounted: Option<Mounted>,
}

impl RealtimeProvider {
    pub fn new(url: Url, cache: Arc<dyn QueryCache>) -> Self {
        Self::with_options(url, cache, ProviderOptions::default())
    }

    pub fn with_options(url: Url, cache: Arc<dyn QueryCache>, options: ProviderOptions) -> Self {
        Self {
            client: RealtimeClient::with_options(url, options.client),
            cache,
            debounce_window: options.debounce_window,
            mounted: None,
        }
    }

    /// The underlying client, for sending or inspecting state.
    pub fn client(&self) -> &RealtimeClient {
        &self.client
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted.is_some()
    }

    /// Register the invalidation handler and connect with `token`.
    ///
    /// Mounting twice keeps the existing handler and only (re)connects.
    pub fn mount(&mut self, token: &str) {
        if self.mounted.is_none() {
            let debouncers = Arc::new(ScopeDebouncers::spawn(self.debounce_window, &self.cache));
            let dispatch = debouncers.clone();
            let subscription = self.client.add_message_handler(move |event: &ChangeEvent| {
                match event.entity() {
                    Some(kind) => dispatch.trigger(kind.into()),
                    None => info!(kind = %event.kind(), "Unknown message type"),
                }
            });
            self.mounted = Some(Mounted {
                subscription,
                _debouncers: debouncers,
            });
        }
        self.client.connect(token);
    }

    /// Remove the handler and close the socket. Idempotent.
    pub fn unmount(&mut self) {
        if let Some(mounted) = self.mounted.take() {
            mounted.subscription.unsubscribe();
        }
        self.client.disconnect();
    }

    /// Follow the session: a token mounts, `None` unmounts.
    pub fn session_changed(&mut self, token: Option<&str>) {
        match token {
            Some(token) => self.mount(token),
            None => self.unmount(),
        }
    }

    /// Tear the provider down.
    pub fn dispose(mut self) {
        self.unmount();
    }
}

impl Drop for RealtimeProvider {
    fn drop(&mut self) {
        if self.mounted.is_some() {
            self.unmount();
        }
    }
}
