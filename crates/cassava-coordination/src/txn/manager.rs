//! Optimistic multi-version transaction manager
//!
//! Writes allocate a strictly increasing version per key and store the
//! payload under a version-derived field; nothing is visible outside
//! the writer's context until commit. The commit script enforces the
//! snapshot-exists and monotonicity guards atomically. Reads resolve
//! through the caller's active context first (read-your-own-writes),
//! then the committed pointer. Retention of committed versions is an
//! external concern; nothing here deletes them.

use std::sync::Arc;

use dashmap::DashMap;
use metrics::counter;
use tracing::debug;
use uuid::Uuid;

use cassava_common::{OutcomeKind, TXN_SEQ_FIELD, TXN_VERSION_PREFIX, now_millis};
use cassava_store::StoreOps;

use super::model::{ActiveTransaction, CommitFailure, CommitResult, txn_key};
use super::resolver::{AssumeUnknown, CommitOutcomeResolver, ResolveContext};
use crate::cas::{CommitCode, ScriptEngine};

/// Manages per-key optimistic versions and the caller's active
/// transaction contexts
pub struct TransactionManager {
    store: Arc<dyn StoreOps>,
    engine: Arc<ScriptEngine>,
    active: DashMap<String, ActiveTransaction>,
    resolver: Arc<dyn CommitOutcomeResolver>,
}

impl TransactionManager {
    pub fn new(store: Arc<dyn StoreOps>, engine: Arc<ScriptEngine>) -> Self {
        Self::with_resolver(store, engine, Arc::new(AssumeUnknown))
    }

    pub fn with_resolver(
        store: Arc<dyn StoreOps>,
        engine: Arc<ScriptEngine>,
        resolver: Arc<dyn CommitOutcomeResolver>,
    ) -> Self {
        Self {
            store,
            engine,
            active: DashMap::new(),
            resolver,
        }
    }

    /// Write a new version of `key`. The version is allocated from the
    /// per-key sequence, the payload stored under its version-derived
    /// field, and (key, version) recorded as this caller's active
    /// transaction. Returns the allocated version.
    pub async fn write(&self, key: &str, value: &str) -> anyhow::Result<i64> {
        let store_key = txn_key(key);
        let version = self.store.hincrby(&store_key, TXN_SEQ_FIELD, 1).await?;
        let field = format!("{}{}", TXN_VERSION_PREFIX, version);
        self.store.hset(&store_key, &field, value).await?;

        self.active.insert(
            key.to_string(),
            ActiveTransaction {
                key: key.to_string(),
                version,
                last_value: value.to_string(),
                started_at_ms: now_millis(),
                commit_attempts: 0,
            },
        );
        debug!("txn '{}' wrote version {}", key, version);
        Ok(version)
    }

    /// Commit `version` of `key`
    pub async fn commit(&self, key: &str, version: i64) -> anyhow::Result<CommitResult> {
        self.commit_inner(key, version, None).await
    }

    /// Commit and set the key's TTL after success
    pub async fn commit_with_ttl(
        &self,
        key: &str,
        version: i64,
        ttl_ms: u64,
    ) -> anyhow::Result<CommitResult> {
        self.commit_inner(key, version, Some(ttl_ms)).await
    }

    async fn commit_inner(
        &self,
        key: &str,
        version: i64,
        ttl_ms: Option<u64>,
    ) -> anyhow::Result<CommitResult> {
        let store_key = txn_key(key);
        let trace = Uuid::new_v4().to_string();
        if let Some(mut txn) = self.active.get_mut(key) {
            txn.commit_attempts += 1;
        }

        let result = match self.engine.txn_commit(&store_key, version, ttl_ms, &trace).await {
            Ok(CommitCode::Committed) => CommitResult {
                outcome: OutcomeKind::Success,
                failure: None,
                cause: None,
            },
            Ok(CommitCode::MissingSnapshot) => CommitResult {
                outcome: OutcomeKind::Failed,
                failure: Some(CommitFailure::MissingSnapshot),
                cause: Some(format!("version {} has no snapshot", version)),
            },
            Ok(CommitCode::StaleVersion) => CommitResult {
                outcome: OutcomeKind::Failed,
                failure: Some(CommitFailure::StaleVersion),
                cause: Some(format!("version {} is not past the committed version", version)),
            },
            Err(error) if error.is_ambiguous() => {
                let context = self.resolve_context(key, &error.to_string());
                let outcome = self.resolver.resolve(&context).await;
                debug!(
                    "txn '{}' commit outcome unobservable ({}), resolver says {}",
                    key, error, outcome
                );
                CommitResult {
                    outcome,
                    failure: None,
                    cause: Some(error.to_string()),
                }
            }
            Err(error) => CommitResult {
                outcome: OutcomeKind::Failed,
                failure: None,
                cause: Some(error.to_string()),
            },
        };

        if result.outcome == OutcomeKind::Success {
            self.active
                .remove_if(key, |_, txn| txn.version == version);
        }
        counter!("cassava_txn_commits_total", "kind" => result.outcome.as_str()).increment(1);
        Ok(result)
    }

    /// Read `key`: the caller's active transaction version when one
    /// exists (read-your-own-writes, without consulting the committed
    /// pointer), otherwise the committed version's payload
    pub async fn read(&self, key: &str) -> anyhow::Result<Option<String>> {
        let version = self.active.get(key).map(|txn| txn.version);
        let trace = Uuid::new_v4().to_string();
        Ok(self.engine.txn_read(&txn_key(key), version, &trace).await?)
    }

    /// Read an explicit version's payload directly, bypassing version
    /// resolution (historical reads)
    pub async fn snapshot_read(&self, key: &str, version: i64) -> anyhow::Result<Option<String>> {
        let trace = Uuid::new_v4().to_string();
        Ok(self
            .engine
            .txn_read(&txn_key(key), Some(version), &trace)
            .await?)
    }

    /// Version of the caller's active transaction on `key`, if any
    pub fn active_version(&self, key: &str) -> Option<i64> {
        self.active.get(key).map(|txn| txn.version)
    }

    /// Drop the active transaction context for `key`
    pub fn clear_active(&self, key: &str) -> bool {
        self.active.remove(key).is_some()
    }

    fn resolve_context(&self, key: &str, cause: &str) -> ResolveContext {
        let (last_value, commit_attempts, elapsed_ms) = self
            .active
            .get(key)
            .map(|txn| {
                (
                    Some(txn.last_value.clone()),
                    txn.commit_attempts,
                    now_millis() - txn.started_at_ms,
                )
            })
            .unwrap_or((None, 0, 0));
        ResolveContext {
            key: key.to_string(),
            last_value,
            commit_attempts,
            elapsed_ms,
            cause: cause.to_string(),
        }
    }
}
