//! End-to-end lock flows through the coordinator

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use cassava_common::{OutcomeKind, now_millis};
use cassava_coordination::lock::{multi_lock_key, value_lock_key};
use cassava_coordination::{
    Coordinator, LockCompletedEvent, LockEventListener, MultiLockRequest, RemoveFailedEvent,
    RenewalConfig, ValueLockRequest,
};
use cassava_store::{FaultMode, FaultyStore, MemoryStore, StoreError, StoreOps};

fn fast_config() -> RenewalConfig {
    RenewalConfig {
        tick_duration_ms: 50,
        wheel_size: 32,
        auto_init_base_ms: 500,
        ..Default::default()
    }
}

#[tokio::test]
async fn renewal_keeps_a_short_lease_alive_until_release() {
    let store = Arc::new(MemoryStore::new());
    let coordinator = Coordinator::new(store.clone(), fast_config()).unwrap();
    coordinator.start();

    let result = coordinator
        .value_locks()
        .acquire(ValueLockRequest {
            name: "orders".to_string(),
            holder: None,
            ttl_ms: Some(1000),
        })
        .await
        .unwrap();
    assert!(result.acquired());

    // well past the original TTL the lease is still held, renewed in
    // the background
    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert!(
        store.get(&value_lock_key("orders")).await.unwrap().is_some(),
        "lease expired despite renewal"
    );

    let release = coordinator.value_locks().release("orders").await.unwrap();
    assert_eq!(release.outcome, OutcomeKind::Success);
    assert_eq!(store.get(&value_lock_key("orders")).await.unwrap(), None);
    coordinator.stop();
}

#[derive(Default)]
struct CapturesEvents {
    completed: Mutex<Vec<LockCompletedEvent>>,
    remove_failed: Mutex<Vec<RemoveFailedEvent>>,
}

#[async_trait]
impl LockEventListener for CapturesEvents {
    async fn on_completed(&self, event: &LockCompletedEvent) {
        self.completed.lock().push(event.clone());
    }
    async fn on_remove_failed(&self, event: &RemoveFailedEvent) {
        self.remove_failed.lock().push(event.clone());
    }
}

#[tokio::test]
async fn batch_outcomes_reach_the_listener_with_the_original_arguments() {
    let store = Arc::new(MemoryStore::new());
    // member b held by another process
    let deadline = now_millis() + 3_600_000;
    store
        .hset(&multi_lock_key("batch"), "b", &deadline.to_string())
        .await
        .unwrap();

    let coordinator = Coordinator::new(store.clone(), fast_config()).unwrap();
    coordinator.start();
    let listener = Arc::new(CapturesEvents::default());
    coordinator.events().register("batch", listener.clone());

    let request = MultiLockRequest {
        name: "batch".to_string(),
        members: vec!["a".to_string(), "b".to_string(), "c".to_string()],
        lease_ms: Some(10_000),
        continue_on_failure: false,
    };
    let result = coordinator.multi_locks().acquire(request).await.unwrap();

    assert_eq!(result.outcomes.success, vec!["a".to_string()]);
    assert_eq!(result.outcomes.outcome_of("b"), Some(OutcomeKind::Failed));
    assert_eq!(result.outcomes.outcome_of("c"), Some(OutcomeKind::Unknown));

    let completed = listener.completed.lock();
    assert_eq!(completed.len(), 1, "exactly one completion event");
    assert_eq!(completed[0].request.members.len(), 3);
    assert!(!completed[0].request.continue_on_failure);
    assert_eq!(completed[0].outcomes.success, vec!["a".to_string()]);
    drop(completed);

    // successful member removed, foreign member untouched
    assert_eq!(
        store.hget(&multi_lock_key("batch"), "a").await.unwrap(),
        None
    );
    assert!(
        store
            .hget(&multi_lock_key("batch"), "b")
            .await
            .unwrap()
            .is_some()
    );
    coordinator.stop();
}

#[tokio::test]
async fn partial_removal_fires_the_remove_failed_event() {
    let inner = Arc::new(MemoryStore::new());
    let faulty = Arc::new(FaultyStore::new(inner.clone()));
    let coordinator = Coordinator::new(faulty.clone(), fast_config()).unwrap();
    coordinator.start();
    let listener = Arc::new(CapturesEvents::default());
    coordinator.events().register("batch", listener.clone());

    // the cleanup removal never reaches the store: a genuine partial
    // failure, members linger until their deadlines elapse
    faulty.fail_next(
        "hdel",
        FaultMode::Drop,
        StoreError::ConnectionLost("reset".to_string()),
    );

    let result = coordinator
        .multi_locks()
        .acquire(MultiLockRequest {
            name: "batch".to_string(),
            members: vec!["a".to_string(), "b".to_string()],
            lease_ms: Some(10_000),
            continue_on_failure: false,
        })
        .await
        .unwrap();

    let failure = result.remove_failed.expect("cleanup must be reported");
    assert_eq!(failure.expected, 2);
    assert_eq!(failure.removed, 0);

    let events = listener.remove_failed.lock();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].store_key, multi_lock_key("batch"));
    drop(events);

    // no retry happened: the fields are still there
    assert!(
        inner
            .hget(&multi_lock_key("batch"), "a")
            .await
            .unwrap()
            .is_some()
    );
    coordinator.stop();
}

#[tokio::test]
async fn auto_initialized_ttls_spread_over_the_configured_range() {
    let store = Arc::new(MemoryStore::new());
    let config = RenewalConfig {
        tick_duration_ms: 100,
        wheel_size: 40,
        auto_init_base_ms: 1000,
        renew_factor: 3,
        ..Default::default()
    };
    let coordinator = Coordinator::new(store.clone(), config).unwrap();
    coordinator.start();

    // base in [1000, 4000] => ttl in [1500, 6000]
    let mut ttls = Vec::new();
    for i in 0..200 {
        let name = format!("spread-{}", i);
        let result = coordinator
            .value_locks()
            .acquire(ValueLockRequest::new(&name))
            .await
            .unwrap();
        assert!(result.acquired());
        ttls.push(result.ttl_ms);
    }

    assert!(ttls.iter().all(|t| (1500..=6000).contains(t)));
    // not all draws collapse to one value
    let low = ttls.iter().filter(|t| **t < 3750).count();
    let high = ttls.len() - low;
    assert!(low > 20, "lower half underpopulated: {}", low);
    assert!(high > 20, "upper half underpopulated: {}", high);
    coordinator.stop();
}
