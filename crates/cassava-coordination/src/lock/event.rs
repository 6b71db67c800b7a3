//! Lock event listeners
//!
//! An explicit registration table maps lock identity to listener,
//! populated at startup and resolved by direct lookup. Listener
//! failures are isolated: a panicking listener never prevents the
//! guaranteed cleanup that follows a batch operation.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::FutureExt;
use tracing::warn;

use super::model::{LockOutcomes, MultiLockRequest, RemoveFailure};

/// Completion of one batch lock call, with the original call arguments
/// for diagnostics
#[derive(Debug, Clone)]
pub struct LockCompletedEvent {
    pub request: MultiLockRequest,
    pub outcomes: LockOutcomes,
}

/// A cleanup whose result could not be confirmed as fully successful
#[derive(Debug, Clone)]
pub struct RemoveFailedEvent {
    pub name: String,
    pub store_key: String,
    pub failure: RemoveFailure,
}

/// Callback interface for lock events
#[async_trait]
pub trait LockEventListener: Send + Sync {
    /// Fired exactly once per batch call with the three outcome sets.
    /// The lock members stay held while this runs; cleanup follows
    /// regardless of what happens here.
    async fn on_completed(&self, _event: &LockCompletedEvent) {}

    /// Fired when a release or cleanup could not be confirmed. The
    /// lease may linger until natural TTL expiry.
    async fn on_remove_failed(&self, _event: &RemoveFailedEvent) {}
}

/// Registration table mapping lock name to listener
#[derive(Default)]
pub struct LockEventRegistry {
    listeners: DashMap<String, Arc<dyn LockEventListener>>,
}

impl LockEventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, lock_name: impl Into<String>, listener: Arc<dyn LockEventListener>) {
        self.listeners.insert(lock_name.into(), listener);
    }

    pub fn deregister(&self, lock_name: &str) -> bool {
        self.listeners.remove(lock_name).is_some()
    }

    fn lookup(&self, lock_name: &str) -> Option<Arc<dyn LockEventListener>> {
        self.listeners.get(lock_name).map(|e| e.value().clone())
    }

    pub(crate) async fn notify_completed(&self, lock_name: &str, event: &LockCompletedEvent) {
        if let Some(listener) = self.lookup(lock_name) {
            let outcome = AssertUnwindSafe(listener.on_completed(event))
                .catch_unwind()
                .await;
            if outcome.is_err() {
                warn!("completion listener for '{}' panicked", lock_name);
            }
        }
    }

    pub(crate) async fn notify_remove_failed(&self, lock_name: &str, event: &RemoveFailedEvent) {
        if let Some(listener) = self.lookup(lock_name) {
            let outcome = AssertUnwindSafe(listener.on_remove_failed(event))
                .catch_unwind()
                .await;
            if outcome.is_err() {
                warn!("remove-failed listener for '{}' panicked", lock_name);
            }
        }
    }
}
