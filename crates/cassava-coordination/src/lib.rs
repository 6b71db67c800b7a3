//! Cassava Coordination - distributed mutual exclusion and
//! optimistic-versioned transactions over a shared key-value store
//!
//! This crate provides:
//! - CAS script engine: atomic read-compare-write protocols per data
//!   shape, with sentinel-encoded absence and a verbose trace mode
//! - Renewal timing wheel: a background scheduler that re-extends lease
//!   deadlines before they expire
//! - Lock coordinators: single-member value locks and multi-member hash
//!   locks with three-way outcome classification and guaranteed cleanup
//! - Transaction manager: optimistic multi-version storage with
//!   commit/read/snapshot operations and caller-resolved timeouts
//!
//! Cross-client atomicity is delegated entirely to the store's
//! scripting facility; in-process synchronization protects only this
//! process's own wheel and queue structures.

pub mod cas;
pub mod config;
pub mod coordinator;
pub mod expiry;
pub mod lock;
pub mod renewal;
pub mod txn;

// Re-export commonly used types
pub use cas::{CommitCode, ScriptEngine};
pub use config::RenewalConfig;
pub use coordinator::Coordinator;
pub use expiry::ExpiryInitializer;
pub use lock::{
    LockCompletedEvent, LockEventListener, LockEventRegistry, LockOutcomes, LockReleaseResult,
    MultiLockRequest, MultiLockResult, MultiLockService, RemoveFailedEvent, ValueLockRequest,
    ValueLockResult, ValueLockService,
};
pub use renewal::{LeaseKey, RenewHandle, RenewOp, RenewTask, RenewalScheduler};
pub use txn::{
    AssumeUnknown, CommitFailure, CommitOutcomeResolver, CommitResult, ResolveContext,
    TransactionManager,
};
