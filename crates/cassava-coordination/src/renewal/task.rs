//! Renewal task model
//!
//! A task is owned exclusively by the wheel once enqueued. The caller
//! keeps only a handle to the shared `removed` flag; cancellation is
//! cooperative and lazy, swept on the task's next pass through its
//! bucket. A task may therefore still fire once concurrently with its
//! own cancellation - late renewal results are ignorable, not errors.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use cassava_common::now_millis;

/// Identifies one lock or transaction target
#[derive(Debug, Clone)]
pub struct LeaseKey {
    /// Canonical name of the lease
    pub name: String,
    /// Resolved store key
    pub store_key: String,
    /// Lease time-to-live
    pub ttl: Duration,
}

impl LeaseKey {
    pub fn new(name: impl Into<String>, store_key: impl Into<String>, ttl_ms: u64) -> Self {
        Self {
            name: name.into(),
            store_key: store_key.into(),
            ttl: Duration::from_millis(ttl_ms),
        }
    }

    pub fn ttl_ms(&self) -> u64 {
        self.ttl.as_millis() as u64
    }
}

/// How a lease is re-extended when its task fires
#[derive(Debug, Clone)]
pub enum RenewOp {
    /// The key's value must still equal the holder token; on match the
    /// key TTL is extended
    ValueLease { holder_token: String },
    /// The hash field's stored deadline must still equal the task's
    /// last-known deadline; on match the new deadline is written
    FieldDeadline { field: String },
}

/// One scheduled lease renewal
#[derive(Debug)]
pub struct RenewTask {
    pub lease: LeaseKey,
    pub op: RenewOp,
    /// Last-known lease deadline (Unix millis)
    pub deadline_ms: i64,
    /// When the lease was issued or last renewed (Unix millis)
    pub issued_at_ms: i64,
    /// Delay from issue until renewal is due
    pub renew_threshold_ms: u64,
    /// Full lease duration written on each renewal
    pub lease_ms: u64,
    /// Trace id carried into every CAS call this task makes
    pub trace_token: String,
    removed: Arc<AtomicBool>,
}

impl RenewTask {
    pub fn new(lease: LeaseKey, op: RenewOp, renew_threshold_ms: u64) -> Self {
        let now = now_millis();
        let lease_ms = lease.ttl_ms();
        Self {
            lease,
            op,
            deadline_ms: now + lease_ms as i64,
            issued_at_ms: now,
            renew_threshold_ms,
            lease_ms,
            trace_token: uuid::Uuid::new_v4().to_string(),
            removed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Handle for cooperative cancellation
    pub fn handle(&self) -> RenewHandle {
        RenewHandle {
            removed: self.removed.clone(),
        }
    }

    pub fn is_removed(&self) -> bool {
        self.removed.load(Ordering::SeqCst)
    }
}

/// Caller-side handle to a scheduled task
#[derive(Debug, Clone)]
pub struct RenewHandle {
    removed: Arc<AtomicBool>,
}

impl RenewHandle {
    /// Flag the task removed. The wheel unlinks it on the next pass
    /// through its bucket.
    pub fn cancel(&self) {
        self.removed.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.removed.load(Ordering::SeqCst)
    }
}
