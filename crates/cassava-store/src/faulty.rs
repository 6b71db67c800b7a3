//! Fault-injection store wrapper
//!
//! Wraps another `StoreOps` and fails scripted calls on demand. Two
//! modes matter for outcome classification: a dropped call never reaches
//! the store, while an applied-then-failed call mimics a client-side
//! timeout after the store already executed the operation. The second
//! mode is what makes `unknown` outcomes genuinely ambiguous.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::ops::{StoreError, StoreOps};
use crate::script::{ScriptRequest, ScriptValue};

/// What happens to a call selected for failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultMode {
    /// The call never reaches the store
    Drop,
    /// The store applies the call, but the client sees the error anyway
    ApplyThenFail,
}

type Plan = Option<(FaultMode, StoreError)>;

/// Store wrapper with a per-operation failure schedule
pub struct FaultyStore {
    inner: Arc<dyn StoreOps>,
    plans: Mutex<HashMap<&'static str, VecDeque<Plan>>>,
}

impl FaultyStore {
    pub fn new(inner: Arc<dyn StoreOps>) -> Self {
        Self {
            inner,
            plans: Mutex::new(HashMap::new()),
        }
    }

    /// Let the next call to `op` pass through untouched
    pub fn pass_next(&self, op: &'static str) {
        self.plans.lock().entry(op).or_default().push_back(None);
    }

    /// Fail the next call to `op` with the given mode and error
    pub fn fail_next(&self, op: &'static str, mode: FaultMode, error: StoreError) {
        self.plans
            .lock()
            .entry(op)
            .or_default()
            .push_back(Some((mode, error)));
    }

    fn next_plan(&self, op: &'static str) -> Plan {
        self.plans
            .lock()
            .get_mut(op)
            .and_then(|queue| queue.pop_front())
            .flatten()
    }

    async fn run<T, F>(&self, op: &'static str, call: F) -> Result<T, StoreError>
    where
        F: std::future::Future<Output = Result<T, StoreError>>,
    {
        match self.next_plan(op) {
            None => call.await,
            Some((FaultMode::Drop, error)) => Err(error),
            Some((FaultMode::ApplyThenFail, error)) => {
                let _ = call.await;
                Err(error)
            }
        }
    }
}

#[async_trait]
impl StoreOps for FaultyStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.run("get", self.inner.get(key)).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.run("set", self.inner.set(key, value)).await
    }

    async fn del(&self, key: &str) -> Result<u64, StoreError> {
        self.run("del", self.inner.del(key)).await
    }

    async fn set_nx_px(&self, key: &str, value: &str, ttl_ms: u64) -> Result<bool, StoreError> {
        self.run("set_nx_px", self.inner.set_nx_px(key, value, ttl_ms))
            .await
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        self.run("hget", self.inner.hget(key, field)).await
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), StoreError> {
        self.run("hset", self.inner.hset(key, field, value)).await
    }

    async fn hdel(&self, key: &str, fields: &[String]) -> Result<u64, StoreError> {
        self.run("hdel", self.inner.hdel(key, fields)).await
    }

    async fn hincrby(&self, key: &str, field: &str, delta: i64) -> Result<i64, StoreError> {
        self.run("hincrby", self.inner.hincrby(key, field, delta))
            .await
    }

    async fn lindex(&self, key: &str, index: i64) -> Result<Option<String>, StoreError> {
        self.run("lindex", self.inner.lindex(key, index)).await
    }

    async fn lset(&self, key: &str, index: i64, value: &str) -> Result<(), StoreError> {
        self.run("lset", self.inner.lset(key, index, value)).await
    }

    async fn lrem(&self, key: &str, count: i64, value: &str) -> Result<u64, StoreError> {
        self.run("lrem", self.inner.lrem(key, count, value)).await
    }

    async fn zscore(&self, key: &str, member: &str) -> Result<Option<f64>, StoreError> {
        self.run("zscore", self.inner.zscore(key, member)).await
    }

    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<(), StoreError> {
        self.run("zadd", self.inner.zadd(key, member, score)).await
    }

    async fn zrem(&self, key: &str, member: &str) -> Result<u64, StoreError> {
        self.run("zrem", self.inner.zrem(key, member)).await
    }

    async fn eval(&self, request: &ScriptRequest) -> Result<ScriptValue, StoreError> {
        self.run("eval", self.inner.eval(request)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;

    #[tokio::test]
    async fn test_drop_never_reaches_store() {
        let inner = Arc::new(MemoryStore::new());
        let store = FaultyStore::new(inner.clone());

        store.fail_next("set", FaultMode::Drop, StoreError::Timeout(100));
        assert_eq!(store.set("k", "v").await, Err(StoreError::Timeout(100)));
        assert_eq!(inner.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_apply_then_fail_reaches_store() {
        let inner = Arc::new(MemoryStore::new());
        let store = FaultyStore::new(inner.clone());

        store.fail_next("set", FaultMode::ApplyThenFail, StoreError::Timeout(100));
        assert_eq!(store.set("k", "v").await, Err(StoreError::Timeout(100)));
        // the store executed the write even though the client saw a timeout
        assert_eq!(inner.get("k").await.unwrap(), Some("v".to_string()));
    }

    #[tokio::test]
    async fn test_schedule_order() {
        let inner = Arc::new(MemoryStore::new());
        let store = FaultyStore::new(inner);

        store.pass_next("del");
        store.fail_next("del", FaultMode::Drop, StoreError::Closed);

        assert!(store.del("a").await.is_ok());
        assert_eq!(store.del("b").await, Err(StoreError::Closed));
        // schedule exhausted: calls pass through again
        assert!(store.del("c").await.is_ok());
    }
}
