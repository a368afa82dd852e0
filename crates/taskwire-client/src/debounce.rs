//! Trailing-edge debouncer.
//!
//! Each trigger restarts the quiet window; the action runs once, after the
//! window passes with no further triggers.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::trace;

/// Default quiet window before a cache invalidation fires.
pub const DEFAULT_DEBOUNCE_WINDOW: Duration = Duration::from_millis(1000);

/// Collapses bursts of triggers into a single trailing call.
pub struct Debouncer {
    tx: mpsc::UnboundedSender<()>,
    task: JoinHandle<()>,
}

impl Debouncer {
    /// Spawn the debouncer onto the current tokio runtime.
    pub fn spawn(window: Duration, action: Arc<dyn Fn() + Send + Sync>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<()>();

        let task = tokio::spawn(async move {
            // Wait for the first trigger of a burst.
            while rx.recv().await.is_some() {
                loop {
                    tokio::select! {
                        more = rx.recv() => {
                            if more.is_none() {
                                return;
                            }
                            trace!("Debounce window restarted");
                        }
                        _ = tokio::time::sleep(window) => {
                            action();
                            break;
                        }
                    }
                }
            }
        });

        Self { tx, task }
    }

    /// Schedule the action.
    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.task.abort();
    }
}
