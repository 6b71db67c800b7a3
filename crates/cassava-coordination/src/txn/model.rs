//! Transaction data model

use serde::{Deserialize, Serialize};

use cassava_common::OutcomeKind;

/// Store key of a transaction target
pub fn txn_key(name: &str) -> String {
    format!("cassava:txn:{}", name)
}

/// The caller's uncommitted write on one key
#[derive(Debug, Clone)]
pub struct ActiveTransaction {
    pub key: String,
    /// Version allocated for the pending write
    pub version: i64,
    /// Last value written, handed to the timeout resolver
    pub last_value: String,
    pub started_at_ms: i64,
    /// Commit attempts made so far
    pub commit_attempts: u32,
}

/// Confirmed reason a commit was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitFailure {
    /// The target version's payload was never fully written
    MissingSnapshot,
    /// The target version does not exceed the committed pointer
    StaleVersion,
}

/// Result of one commit attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitResult {
    pub outcome: OutcomeKind,
    /// Set only for confirmed rejections
    pub failure: Option<CommitFailure>,
    pub cause: Option<String>,
}

impl CommitResult {
    pub fn committed(&self) -> bool {
        self.outcome == OutcomeKind::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_txn_key() {
        assert_eq!(txn_key("cart-42"), "cassava:txn:cart-42");
    }

    #[test]
    fn test_commit_result_helpers() {
        let result = CommitResult {
            outcome: OutcomeKind::Success,
            failure: None,
            cause: None,
        };
        assert!(result.committed());

        let result = CommitResult {
            outcome: OutcomeKind::Failed,
            failure: Some(CommitFailure::StaleVersion),
            cause: None,
        };
        assert!(!result.committed());
    }
}
