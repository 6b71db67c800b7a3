use std::sync::Arc;

use criterion::{Criterion, criterion_group, criterion_main};

use cassava_coordination::config::RenewalConfig;
use cassava_coordination::{ExpiryInitializer, ScriptEngine};
use cassava_store::MemoryStore;

fn bench_cas_value_round_trip(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let engine = ScriptEngine::new(Arc::new(MemoryStore::new()), false);

    c.bench_function("cas_value_set_then_delete", |b| {
        b.to_async(&runtime).iter(|| async {
            engine
                .cas_value("bench", None, Some("v"), "t-bench")
                .await
                .unwrap();
            engine
                .cas_value("bench", Some("v"), None, "t-bench")
                .await
                .unwrap();
        });
    });
}

fn bench_acquire_member_deadline(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let engine = ScriptEngine::new(Arc::new(MemoryStore::new()), false);

    c.bench_function("acquire_member_deadline", |b| {
        let mut now = 0i64;
        b.to_async(&runtime).iter(|| {
            now += 10_000;
            let engine = &engine;
            let at = now;
            async move {
                engine
                    .acquire_member_deadline("bench-lock", "member", at + 5000, at, "t-bench")
                    .await
                    .unwrap();
            }
        });
    });
}

fn bench_draw_ttl(c: &mut Criterion) {
    let config = RenewalConfig {
        tick_duration_ms: 100,
        wheel_size: 600,
        auto_init_base_ms: 10_000,
        ..Default::default()
    };
    let initializer = ExpiryInitializer::from_config(&config).unwrap();

    c.bench_function("draw_auto_ttl", |b| {
        b.iter(|| std::hint::black_box(initializer.draw_ttl_ms()));
    });
}

criterion_group!(
    benches,
    bench_cas_value_round_trip,
    bench_acquire_member_deadline,
    bench_draw_ttl
);
criterion_main!(benches);
