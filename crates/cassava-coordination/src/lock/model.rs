//! Lock data model

use serde::{Deserialize, Serialize};

use cassava_common::OutcomeKind;

/// Store key of a single-member value lock
pub fn value_lock_key(name: &str) -> String {
    format!("cassava:lock:{}", name)
}

/// Store key of a multi-member hash lock; all members of one logical
/// lock set share this key
pub fn multi_lock_key(name: &str) -> String {
    format!("cassava:mlock:{}", name)
}

/// Value lock acquisition request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValueLockRequest {
    /// Canonical lock name
    pub name: String,
    /// Holder token; generated when absent
    #[serde(default)]
    pub holder: Option<String>,
    /// Fixed TTL in milliseconds; auto-initialized when absent
    #[serde(default)]
    pub ttl_ms: Option<u64>,
}

impl ValueLockRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            holder: None,
            ttl_ms: None,
        }
    }
}

/// Value lock acquisition result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValueLockResult {
    pub outcome: OutcomeKind,
    /// Holder token when acquired
    pub holder: Option<String>,
    /// Effective lease TTL in milliseconds
    pub ttl_ms: u64,
    pub cause: Option<String>,
}

impl ValueLockResult {
    pub fn acquired(&self) -> bool {
        self.outcome == OutcomeKind::Success
    }
}

/// Lock release result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockReleaseResult {
    pub outcome: OutcomeKind,
    pub cause: Option<String>,
}

/// Multi-member lock request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultiLockRequest {
    /// Lock set name
    pub name: String,
    /// Members to acquire, in order
    pub members: Vec<String>,
    /// Shared lease duration in milliseconds; auto-initialized when
    /// absent
    #[serde(default)]
    pub lease_ms: Option<u64>,
    /// Whether a member failure halts the batch. When halted, members
    /// not yet attempted are classified unknown.
    #[serde(default)]
    pub continue_on_failure: bool,
}

impl MultiLockRequest {
    pub fn new(name: impl Into<String>, members: Vec<String>) -> Self {
        Self {
            name: name.into(),
            members,
            lease_ms: None,
            continue_on_failure: false,
        }
    }
}

/// A member with the cause of its non-success classification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberOutcome {
    pub member: String,
    pub cause: String,
}

/// Three disjoint outcome sets of one batch operation.
///
/// Invariant: every input member appears in exactly one set. `failed`
/// only ever holds confirmed negative outcomes; anything unconfirmed or
/// unattempted goes to `unknown`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LockOutcomes {
    pub success: Vec<String>,
    pub failed: Vec<MemberOutcome>,
    pub unknown: Vec<MemberOutcome>,
}

impl LockOutcomes {
    /// Total classified members
    pub fn len(&self) -> usize {
        self.success.len() + self.failed.len() + self.unknown.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty() && self.unknown.is_empty()
    }

    /// Which set a member landed in
    pub fn outcome_of(&self, member: &str) -> Option<OutcomeKind> {
        if self.success.iter().any(|m| m == member) {
            return Some(OutcomeKind::Success);
        }
        if self.failed.iter().any(|m| m.member == member) {
            return Some(OutcomeKind::Failed);
        }
        if self.unknown.iter().any(|m| m.member == member) {
            return Some(OutcomeKind::Unknown);
        }
        None
    }
}

/// Cleanup discrepancy after a batch release
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoveFailure {
    /// Members expected to be removed
    pub expected: u64,
    /// Members the store reported removed
    pub removed: u64,
    pub cause: String,
}

/// Result of one batch lock call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultiLockResult {
    pub outcomes: LockOutcomes,
    /// Present when the guaranteed cleanup could not confirm full
    /// removal. This state is ambiguous (a genuine partial failure or a
    /// client-side timeout after the store completed) and is never
    /// retried automatically.
    pub remove_failed: Option<RemoveFailure>,
}
