//! Registry of inbound message handlers.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use taskwire_core::ChangeEvent;

/// Callback invoked for every inbound change event.
pub type MessageHandler = Arc<dyn Fn(&ChangeEvent) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    handlers: BTreeMap<u64, MessageHandler>,
}

/// Shared set of handlers. Safe to add and remove from any thread.
#[derive(Clone, Default)]
pub struct HandlerSet {
    inner: Arc<Mutex<Registry>>,
}

impl HandlerSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a handler; drop the returned [`Subscription`] with
    /// [`Subscription::unsubscribe`] to remove it.
    pub fn add(&self, handler: MessageHandler) -> Subscription {
        let mut registry = self.lock();
        registry.next_id += 1;
        let id = registry.next_id;
        registry.handlers.insert(id, handler);
        Subscription {
            id,
            registry: Arc::downgrade(&self.inner),
        }
    }

    pub fn len(&self) -> usize {
        self.lock().handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Call every handler once. Handlers run outside the lock, so they may
    /// add or remove handlers themselves.
    pub fn dispatch(&self, event: &ChangeEvent) -> usize {
        let handlers: Vec<MessageHandler> = self.lock().handlers.values().cloned().collect();
        for handler in &handlers {
            handler(event);
        }
        handlers.len()
    }
}

/// Handle returned by [`HandlerSet::add`].
#[must_use = "keep the subscription to unsubscribe later"]
pub struct Subscription {
    id: u64,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    /// Remove the handler. A no-op if the client is already gone.
    pub fn unsubscribe(self) {
        if let Some(registry) = self.registry.upgrade() {
            let mut registry = registry.lock().unwrap_or_else(|e| e.into_inner());
            registry.handlers.remove(&self.id);
        }
    }
}
