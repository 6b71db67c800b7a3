//! Single-member value lock
//!
//! Acquisition is a conditional set-with-TTL writing the holder token;
//! success registers a renewal task that re-extends the TTL while the
//! token still matches. Release flags the task removed, then deletes
//! the key through an owner-checked CAS. A deletion whose result cannot
//! be confirmed emits a remove-failed event: the lease may linger until
//! natural TTL expiry, which is surfaced rather than hidden.

use std::sync::Arc;

use anyhow::bail;
use dashmap::DashMap;
use metrics::counter;
use tracing::{debug, warn};
use uuid::Uuid;

use cassava_common::OutcomeKind;
use cassava_common::error::CassavaError;
use cassava_store::StoreOps;

use super::event::{LockEventRegistry, RemoveFailedEvent};
use super::model::{
    LockReleaseResult, RemoveFailure, ValueLockRequest, ValueLockResult, value_lock_key,
};
use crate::cas::ScriptEngine;
use crate::expiry::ExpiryInitializer;
use crate::renewal::{LeaseKey, RenewHandle, RenewOp, RenewTask, RenewalScheduler};

struct ActiveLease {
    handle: RenewHandle,
    holder: String,
    store_key: String,
}

/// Coordinates single-member value locks
pub struct ValueLockService {
    store: Arc<dyn StoreOps>,
    engine: Arc<ScriptEngine>,
    scheduler: Arc<RenewalScheduler>,
    registry: Arc<LockEventRegistry>,
    expiry: ExpiryInitializer,
    active: DashMap<String, ActiveLease>,
}

impl ValueLockService {
    pub fn new(
        store: Arc<dyn StoreOps>,
        engine: Arc<ScriptEngine>,
        scheduler: Arc<RenewalScheduler>,
        registry: Arc<LockEventRegistry>,
    ) -> Result<Self, CassavaError> {
        let expiry = ExpiryInitializer::from_config(scheduler.config())?;
        Ok(Self {
            store,
            engine,
            scheduler,
            registry,
            expiry,
            active: DashMap::new(),
        })
    }

    /// Acquire a lock. The outcome is three-way: an ambiguous store
    /// fault classifies as unknown, never as failed.
    pub async fn acquire(&self, request: ValueLockRequest) -> anyhow::Result<ValueLockResult> {
        if !self.scheduler.is_enabled() {
            bail!(CassavaError::RenewalDisabled);
        }
        let ttl_ms = request.ttl_ms.unwrap_or_else(|| self.expiry.draw_ttl_ms());
        let holder = request
            .holder
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let store_key = value_lock_key(&request.name);

        let acquired = match self.store.set_nx_px(&store_key, &holder, ttl_ms).await {
            Ok(acquired) => acquired,
            Err(error) => {
                let outcome = if error.is_ambiguous() {
                    OutcomeKind::Unknown
                } else {
                    OutcomeKind::Failed
                };
                counter!("cassava_value_lock_outcomes_total", "kind" => outcome.as_str())
                    .increment(1);
                return Ok(ValueLockResult {
                    outcome,
                    holder: None,
                    ttl_ms,
                    cause: Some(error.to_string()),
                });
            }
        };
        if !acquired {
            counter!("cassava_value_lock_outcomes_total", "kind" => "failed").increment(1);
            return Ok(ValueLockResult {
                outcome: OutcomeKind::Failed,
                holder: None,
                ttl_ms,
                cause: Some(CassavaError::LockHeld(request.name.clone()).to_string()),
            });
        }

        let lease = LeaseKey::new(&request.name, &store_key, ttl_ms);
        let task = RenewTask::new(
            lease,
            RenewOp::ValueLease {
                holder_token: holder.clone(),
            },
            self.expiry.renew_delay_ms(ttl_ms),
        );
        let handle = self.scheduler.schedule(task)?;
        self.active.insert(
            request.name.clone(),
            ActiveLease {
                handle,
                holder: holder.clone(),
                store_key,
            },
        );
        counter!("cassava_value_lock_outcomes_total", "kind" => "success").increment(1);
        debug!("lock '{}' acquired for {}ms", request.name, ttl_ms);

        Ok(ValueLockResult {
            outcome: OutcomeKind::Success,
            holder: Some(holder),
            ttl_ms,
            cause: None,
        })
    }

    /// Release a lock held by this service. The renewal task is flagged
    /// removed first, then the key is deleted only if the holder token
    /// still matches.
    pub async fn release(&self, name: &str) -> anyhow::Result<LockReleaseResult> {
        let Some((_, lease)) = self.active.remove(name) else {
            bail!(CassavaError::NotLockOwner(name.to_string()));
        };
        lease.handle.cancel();

        let trace = Uuid::new_v4().to_string();
        match self
            .engine
            .cas_value(&lease.store_key, Some(&lease.holder), None, &trace)
            .await
        {
            Ok(true) => Ok(LockReleaseResult {
                outcome: OutcomeKind::Success,
                cause: None,
            }),
            // confirmed negative: the lease already belongs to someone
            // else or expired, nothing of ours lingers
            Ok(false) => Ok(LockReleaseResult {
                outcome: OutcomeKind::Failed,
                cause: Some(CassavaError::NotLockOwner(name.to_string()).to_string()),
            }),
            Err(error) => {
                let outcome = if error.is_ambiguous() {
                    OutcomeKind::Unknown
                } else {
                    OutcomeKind::Failed
                };
                warn!(
                    "lock '{}' removal unconfirmed ({}), lease may linger to TTL expiry",
                    name, error
                );
                self.registry
                    .notify_remove_failed(
                        name,
                        &RemoveFailedEvent {
                            name: name.to_string(),
                            store_key: lease.store_key.clone(),
                            failure: RemoveFailure {
                                expected: 1,
                                removed: 0,
                                cause: error.to_string(),
                            },
                        },
                    )
                    .await;
                Ok(LockReleaseResult {
                    outcome,
                    cause: Some(error.to_string()),
                })
            }
        }
    }

    /// Unconditional delete of a lock key (admin operation)
    pub async fn force_release(&self, name: &str) -> anyhow::Result<bool> {
        if let Some((_, lease)) = self.active.remove(name) {
            lease.handle.cancel();
        }
        let removed = self.store.del(&value_lock_key(name)).await?;
        Ok(removed > 0)
    }

    /// Holder token of a lease this service currently tracks
    pub fn holder_of(&self, name: &str) -> Option<String> {
        self.active.get(name).map(|l| l.holder.clone())
    }
}
