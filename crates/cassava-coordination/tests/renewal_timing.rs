//! Renewal timing and renew-vs-release interleaving

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use cassava_coordination::config::RenewalConfig;
use cassava_coordination::renewal::{LeaseKey, RenewOp, RenewTask, RenewalScheduler};
use cassava_coordination::ScriptEngine;
use cassava_store::{
    MemoryStore, ScriptKind, ScriptRequest, ScriptValue, StoreError, StoreOps,
};

/// Store wrapper that records when each script call fires, on the
/// tokio clock
struct RecordingStore {
    inner: MemoryStore,
    evals: Mutex<Vec<(ScriptKind, tokio::time::Instant)>>,
}

impl RecordingStore {
    fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            evals: Mutex::new(Vec::new()),
        }
    }

    fn eval_instants(&self, kind: ScriptKind) -> Vec<tokio::time::Instant> {
        self.evals
            .lock()
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, at)| *at)
            .collect()
    }
}

#[async_trait]
impl StoreOps for RecordingStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.inner.get(key).await
    }
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.inner.set(key, value).await
    }
    async fn del(&self, key: &str) -> Result<u64, StoreError> {
        self.inner.del(key).await
    }
    async fn set_nx_px(&self, key: &str, value: &str, ttl_ms: u64) -> Result<bool, StoreError> {
        self.inner.set_nx_px(key, value, ttl_ms).await
    }
    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        self.inner.hget(key, field).await
    }
    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), StoreError> {
        self.inner.hset(key, field, value).await
    }
    async fn hdel(&self, key: &str, fields: &[String]) -> Result<u64, StoreError> {
        self.inner.hdel(key, fields).await
    }
    async fn hincrby(&self, key: &str, field: &str, delta: i64) -> Result<i64, StoreError> {
        self.inner.hincrby(key, field, delta).await
    }
    async fn lindex(&self, key: &str, index: i64) -> Result<Option<String>, StoreError> {
        self.inner.lindex(key, index).await
    }
    async fn lset(&self, key: &str, index: i64, value: &str) -> Result<(), StoreError> {
        self.inner.lset(key, index, value).await
    }
    async fn lrem(&self, key: &str, count: i64, value: &str) -> Result<u64, StoreError> {
        self.inner.lrem(key, count, value).await
    }
    async fn zscore(&self, key: &str, member: &str) -> Result<Option<f64>, StoreError> {
        self.inner.zscore(key, member).await
    }
    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<(), StoreError> {
        self.inner.zadd(key, member, score).await
    }
    async fn zrem(&self, key: &str, member: &str) -> Result<u64, StoreError> {
        self.inner.zrem(key, member).await
    }
    async fn eval(&self, request: &ScriptRequest) -> Result<ScriptValue, StoreError> {
        self.evals
            .lock()
            .push((request.kind, tokio::time::Instant::now()));
        self.inner.eval(request).await
    }
}

fn config(tick_ms: u64, wheel: usize) -> RenewalConfig {
    RenewalConfig {
        tick_duration_ms: tick_ms,
        wheel_size: wheel,
        auto_init_base_ms: tick_ms,
        ..Default::default()
    }
}

fn field_task(threshold_ms: u64) -> RenewTask {
    let mut task = RenewTask::new(
        LeaseKey::new("batch", "cassava:mlock:batch", 1000),
        RenewOp::FieldDeadline {
            field: "member-a".to_string(),
        },
        threshold_ms,
    );
    task.deadline_ms = 1000;
    task
}

#[tokio::test(start_paused = true)]
async fn first_renewal_fires_within_one_tick_of_the_threshold() {
    let store = Arc::new(RecordingStore::new());
    let engine = Arc::new(ScriptEngine::new(store.clone(), false));
    let scheduler = RenewalScheduler::new(config(100, 8), engine).unwrap();
    scheduler.start();
    let t0 = tokio::time::Instant::now();

    store
        .hset("cassava:mlock:batch", "member-a", "1000")
        .await
        .unwrap();
    scheduler.schedule(field_task(500)).unwrap();

    tokio::time::sleep(Duration::from_millis(2000)).await;

    let renewals = store.eval_instants(ScriptKind::RenewFieldDeadline);
    assert!(!renewals.is_empty(), "no renewal fired");
    let first = renewals[0].duration_since(t0);
    assert!(
        first >= Duration::from_millis(500) && first < Duration::from_millis(600),
        "first renewal at {:?}, expected within [500ms, 600ms)",
        first
    );
    scheduler.stop();
}

#[tokio::test(start_paused = true)]
async fn threshold_beyond_one_revolution_waits_the_extra_rounds() {
    let store = Arc::new(RecordingStore::new());
    let engine = Arc::new(ScriptEngine::new(store.clone(), false));
    // wheel period is 400ms; a 900ms threshold needs two extra rounds
    let scheduler = RenewalScheduler::new(config(100, 4), engine).unwrap();
    scheduler.start();
    let t0 = tokio::time::Instant::now();

    store
        .hset("cassava:mlock:batch", "member-a", "1000")
        .await
        .unwrap();
    scheduler.schedule(field_task(900)).unwrap();

    tokio::time::sleep(Duration::from_millis(2000)).await;

    let renewals = store.eval_instants(ScriptKind::RenewFieldDeadline);
    assert!(!renewals.is_empty(), "no renewal fired");
    let first = renewals[0].duration_since(t0);
    assert!(
        first >= Duration::from_millis(900) && first < Duration::from_millis(1000),
        "first renewal at {:?}, expected within [900ms, 1000ms)",
        first
    );
    scheduler.stop();
}

#[tokio::test]
async fn renew_and_release_cannot_both_win() {
    let store = Arc::new(MemoryStore::new());
    let engine = ScriptEngine::new(store.clone(), false);

    // release wins: the late renewal observes the deleted key and backs off
    store.set_nx_px("cassava:lock:a", "holder-1", 60_000).await.unwrap();
    assert!(engine
        .cas_value("cassava:lock:a", Some("holder-1"), None, "t-release")
        .await
        .unwrap());
    assert!(!engine
        .renew_value_lease("cassava:lock:a", "holder-1", 60_000, "t-late-renew")
        .await
        .unwrap());
    assert_eq!(store.get("cassava:lock:a").await.unwrap(), None);

    // renewal wins: the release still deletes (the token is unchanged),
    // and no further renewal write lands afterwards
    store.set_nx_px("cassava:lock:b", "holder-1", 60_000).await.unwrap();
    assert!(engine
        .renew_value_lease("cassava:lock:b", "holder-1", 60_000, "t-renew")
        .await
        .unwrap());
    assert!(engine
        .cas_value("cassava:lock:b", Some("holder-1"), None, "t-release")
        .await
        .unwrap());
    assert_eq!(store.get("cassava:lock:b").await.unwrap(), None);
}

#[tokio::test]
async fn stale_deadline_renewal_backs_off_after_field_removal() {
    let store = Arc::new(MemoryStore::new());
    let engine = ScriptEngine::new(store.clone(), false);

    store.hset("cassava:mlock:batch", "m", "5000").await.unwrap();
    store
        .hdel("cassava:mlock:batch", &["m".to_string()])
        .await
        .unwrap();
    // the field is gone: a renewal that raced the removal must not
    // resurrect it
    assert!(!engine
        .renew_field_deadline("cassava:mlock:batch", "m", 5000, 9000, "t-late")
        .await
        .unwrap());
    assert_eq!(
        store.hget("cassava:mlock:batch", "m").await.unwrap(),
        None
    );
}
