//! Checkpoint capability.
//!
//! The host announces "about to be suspended or migrated" by firing the
//! hub; every registered handler gets a chance to persist its state.
//! Handlers are registered explicitly and deregistered on shutdown.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::debug;

/// Something that persists its state when the hub fires.
#[async_trait]
pub trait CheckpointHandler: Send + Sync {
    /// Persist now. Errors are the handler's to log.
    async fn on_checkpoint(&self);
}

/// Handle returned by [`CheckpointHub::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CheckpointRegistration(u64);

/// Registry of checkpoint handlers.
#[derive(Default)]
pub struct CheckpointHub {
    next_id: AtomicU64,
    handlers: Mutex<Vec<(CheckpointRegistration, Arc<dyn CheckpointHandler>)>>,
}

impl std::fmt::Debug for CheckpointHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckpointHub")
            .field("handlers", &self.handler_count())
            .finish()
    }
}

impl CheckpointHub {
    /// Hub with no handlers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a handler. Keep the registration to remove it later.
    pub fn register(&self, handler: Arc<dyn CheckpointHandler>) -> CheckpointRegistration {
        let registration = CheckpointRegistration(self.next_id.fetch_add(1, Ordering::Relaxed));
        if let Ok(mut handlers) = self.handlers.lock() {
            handlers.push((registration, handler));
        }
        registration
    }

    /// Returns false when the registration was unknown.
    pub fn deregister(&self, registration: CheckpointRegistration) -> bool {
        let Ok(mut handlers) = self.handlers.lock() else {
            return false;
        };
        let before = handlers.len();
        handlers.retain(|(id, _)| *id != registration);
        handlers.len() != before
    }

    /// Number of registered handlers.
    pub fn handler_count(&self) -> usize {
        self.handlers.lock().map(|h| h.len()).unwrap_or(0)
    }

    /// Run every registered handler, in registration order.
    pub async fn fire(&self) {
        let snapshot: Vec<Arc<dyn CheckpointHandler>> = match self.handlers.lock() {
            Ok(handlers) => handlers.iter().map(|(_, h)| Arc::clone(h)).collect(),
            Err(_) => return,
        };
        debug!(handlers = snapshot.len(), "checkpoint");
        for handler in snapshot {
            handler.on_checkpoint().await;
        }
    }

    /// Fire the hub every `period` until the returned task is aborted.
    pub fn spawn_interval(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let hub = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                hub.fire().await;
            }
        })
    }
}
