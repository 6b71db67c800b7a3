//! Commit timeout resolution
//!
//! A client cannot always observe whether its own commit attempt
//! succeeded (disconnect, timeout). When that happens the manager hands
//! the decision to a caller-supplied resolver. The contract: return one
//! of success, failed, or unknown, and prefer unknown over failed when
//! evidence is incomplete - misclassifying an actually-successful
//! commit as failed is a correctness hazard, while unknown only defers
//! resolution.

use async_trait::async_trait;

use cassava_common::OutcomeKind;

/// Everything the resolver gets to decide with
#[derive(Debug, Clone)]
pub struct ResolveContext {
    pub key: String,
    /// Last value written in the active transaction, if any
    pub last_value: Option<String>,
    /// Commit attempts made on this transaction
    pub commit_attempts: u32,
    /// Time since the transaction's write
    pub elapsed_ms: i64,
    /// The ambiguous error that triggered resolution
    pub cause: String,
}

/// Caller-supplied policy for unobservable commit outcomes
#[async_trait]
pub trait CommitOutcomeResolver: Send + Sync {
    async fn resolve(&self, context: &ResolveContext) -> OutcomeKind;
}

/// Default policy: an unobservable outcome stays unknown
pub struct AssumeUnknown;

#[async_trait]
impl CommitOutcomeResolver for AssumeUnknown {
    async fn resolve(&self, _context: &ResolveContext) -> OutcomeKind {
        OutcomeKind::Unknown
    }
}
