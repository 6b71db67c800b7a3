//! The store operations interface consumed by the coordination core
//!
//! The trait is deliberately narrow: plain data commands the core needs
//! for bookkeeping, a conditional set-with-TTL for lock acquisition, and
//! a generic "execute atomic script" call. All cross-client atomicity is
//! delegated to the store's single-threaded scripting facility; nothing
//! here is expected to lock client-side.

use async_trait::async_trait;

use crate::script::{ScriptRequest, ScriptValue};

/// Transport and store-side errors.
///
/// `Timeout` and `ConnectionLost` are ambiguous: the operation may have
/// been applied by the store even though the client never saw the reply.
/// Callers must classify outcomes behind these errors as unknown, never
/// as failed.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("store call timed out after {0} ms")]
    Timeout(u64),

    #[error("connection lost: {0}")]
    ConnectionLost(String),

    #[error("script rejected: {0}")]
    Script(String),

    #[error("value at '{0}' has the wrong type for this operation")]
    WrongType(String),

    #[error("store client is closed")]
    Closed,
}

impl StoreError {
    /// Whether the operation's effect may have been applied despite the
    /// error. Ambiguous errors must classify as unknown outcomes.
    pub fn is_ambiguous(&self) -> bool {
        matches!(self, StoreError::Timeout(_) | StoreError::ConnectionLost(_))
    }
}

/// Narrow store interface (abstracted key-value store with hashes,
/// lists, sorted sets, and server-side atomic scripts)
#[async_trait]
pub trait StoreOps: Send + Sync {
    // Scalars
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    async fn del(&self, key: &str) -> Result<u64, StoreError>;

    /// Conditional set: write only if the key is absent, with a
    /// millisecond TTL. Returns whether the write happened.
    async fn set_nx_px(&self, key: &str, value: &str, ttl_ms: u64) -> Result<bool, StoreError>;

    // Hashes
    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, StoreError>;
    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), StoreError>;
    /// Returns the number of fields actually removed.
    async fn hdel(&self, key: &str, fields: &[String]) -> Result<u64, StoreError>;
    async fn hincrby(&self, key: &str, field: &str, delta: i64) -> Result<i64, StoreError>;

    // Lists
    async fn lindex(&self, key: &str, index: i64) -> Result<Option<String>, StoreError>;
    async fn lset(&self, key: &str, index: i64, value: &str) -> Result<(), StoreError>;
    /// Remove up to `count` elements equal to `value`; returns removed count.
    async fn lrem(&self, key: &str, count: i64, value: &str) -> Result<u64, StoreError>;

    // Sorted sets
    async fn zscore(&self, key: &str, member: &str) -> Result<Option<f64>, StoreError>;
    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<(), StoreError>;
    async fn zrem(&self, key: &str, member: &str) -> Result<u64, StoreError>;

    /// Execute an atomic server-side script
    async fn eval(&self, request: &ScriptRequest) -> Result<ScriptValue, StoreError>;
}
