//! Multi-member hash lock
//!
//! All members of one logical lock set share a single store key; each
//! member's ownership is one hash field holding a deadline. A batch
//! call acquires members in order, fires exactly one completion event
//! carrying the three outcome sets, then runs a guaranteed cleanup:
//! renewal tasks are cancelled and the successful members' fields are
//! bulk-removed even when the completion listener panics. A removal
//! count below the success count is reported through a distinct
//! remove-failed event and never retried here.

use std::sync::Arc;

use anyhow::bail;
use metrics::counter;
use tracing::{debug, warn};
use uuid::Uuid;

use cassava_common::error::CassavaError;
use cassava_common::now_millis;
use cassava_store::StoreOps;

use super::event::{LockCompletedEvent, LockEventRegistry, RemoveFailedEvent};
use super::model::{
    LockOutcomes, MemberOutcome, MultiLockRequest, MultiLockResult, RemoveFailure, multi_lock_key,
};
use crate::cas::ScriptEngine;
use crate::expiry::ExpiryInitializer;
use crate::renewal::{LeaseKey, RenewHandle, RenewOp, RenewTask, RenewalScheduler};

const NOT_ATTEMPTED: &str = "not attempted after prior failure";
const MEMBER_HELD: &str = "member held elsewhere";

/// Coordinates multi-member hash locks
pub struct MultiLockService {
    store: Arc<dyn StoreOps>,
    engine: Arc<ScriptEngine>,
    scheduler: Arc<RenewalScheduler>,
    registry: Arc<LockEventRegistry>,
    expiry: ExpiryInitializer,
}

impl MultiLockService {
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
        })
    }

    /// Acquire the batch, notify the registered listener, then release
    /// every successful member.
    pub async fn acquire(&self, request: MultiLockRequest) -> anyhow::Result<MultiLockResult> {
        if request.members.is_empty() {
            bail!(CassavaError::IllegalArgument(
                "lock members must not be empty".to_string()
            ));
        }
        if !self.scheduler.is_enabled() {
            bail!(CassavaError::RenewalDisabled);
        }

        let lease_ms = request.lease_ms.unwrap_or_else(|| self.expiry.draw_ttl_ms());
        let renew_delay_ms = self.expiry.renew_delay_ms(lease_ms);
        let store_key = multi_lock_key(&request.name);
        let trace = Uuid::new_v4().to_string();

        let mut outcomes = LockOutcomes::default();
        let mut held: Vec<RenewHandle> = Vec::new();
        let mut halted = false;

        for member in &request.members {
            if halted {
                outcomes.unknown.push(MemberOutcome {
                    member: member.clone(),
                    cause: NOT_ATTEMPTED.to_string(),
                });
                continue;
            }

            let now = now_millis();
            let deadline = now + lease_ms as i64;
            match self
                .engine
                .acquire_member_deadline(&store_key, member, deadline, now, &trace)
                .await
            {
                Ok(true) => {
                    let mut task = RenewTask::new(
                        LeaseKey::new(
                            format!("{}#{}", request.name, member),
                            &store_key,
                            lease_ms,
                        ),
                        RenewOp::FieldDeadline {
                            field: member.clone(),
                        },
                        renew_delay_ms,
                    );
                    // the renewal must compare the exact deadline the
                    // acquire script wrote
                    task.deadline_ms = deadline;
                    task.issued_at_ms = now;
                    match self.scheduler.schedule(task) {
                        Ok(handle) => held.push(handle),
                        Err(error) => {
                            warn!(
                                "member '{}' of '{}' acquired without renewal: {}",
                                member, request.name, error
                            );
                        }
                    }
                    outcomes.success.push(member.clone());
                }
                Ok(false) => {
                    outcomes.failed.push(MemberOutcome {
                        member: member.clone(),
                        cause: MEMBER_HELD.to_string(),
                    });
                    halted = !request.continue_on_failure;
                }
                Err(error) => {
                    let entry = MemberOutcome {
                        member: member.clone(),
                        cause: error.to_string(),
                    };
                    if error.is_ambiguous() {
                        outcomes.unknown.push(entry);
                    } else {
                        outcomes.failed.push(entry);
                    }
                    halted = !request.continue_on_failure;
                }
            }
        }

        counter!("cassava_multi_lock_members_total", "kind" => "success")
            .increment(outcomes.success.len() as u64);
        counter!("cassava_multi_lock_members_total", "kind" => "failed")
            .increment(outcomes.failed.len() as u64);
        counter!("cassava_multi_lock_members_total", "kind" => "unknown")
            .increment(outcomes.unknown.len() as u64);
        debug!(
            "lock set '{}': {} success, {} failed, {} unknown",
            request.name,
            outcomes.success.len(),
            outcomes.failed.len(),
            outcomes.unknown.len()
        );

        // exactly one completion event per batch call; the listener
        // runs while the members are still held
        let event = LockCompletedEvent {
            request: request.clone(),
            outcomes: outcomes.clone(),
        };
        self.registry.notify_completed(&request.name, &event).await;

        // guaranteed cleanup, independent of the listener's fate
        for handle in &held {
            handle.cancel();
        }
        let remove_failed = self.remove_members(&store_key, &outcomes.success).await;
        if let Some(failure) = &remove_failed {
            warn!(
                "lock set '{}' cleanup unconfirmed: expected {}, removed {} ({})",
                request.name, failure.expected, failure.removed, failure.cause
            );
            self.registry
                .notify_remove_failed(
                    &request.name,
                    &RemoveFailedEvent {
                        name: request.name.clone(),
                        store_key: store_key.clone(),
                        failure: failure.clone(),
                    },
                )
                .await;
        }

        Ok(MultiLockResult {
            outcomes,
            remove_failed,
        })
    }

    async fn remove_members(&self, store_key: &str, members: &[String]) -> Option<RemoveFailure> {
        if members.is_empty() {
            return None;
        }
        let expected = members.len() as u64;
        match self.store.hdel(store_key, members).await {
            Ok(removed) if removed == expected => None,
            Ok(removed) => Some(RemoveFailure {
                expected,
                removed,
                cause: "removed count below expected".to_string(),
            }),
            Err(error) => Some(RemoveFailure {
                expected,
                removed: 0,
                cause: error.to_string(),
            }),
        }
    }
}
