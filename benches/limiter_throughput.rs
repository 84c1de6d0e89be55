// Rate Limiter Performance Benchmarks
//
// This benchmark measures the fixed-window limiter under the access
// patterns the gateway sees in production.
//
// Key metrics:
// - Uncontended check latency (distinct identifiers)
// - Contended check latency (one hot identifier)
// - Sweep cost over a populated store

use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use listra_gateway::config::LimiterSettings;
use listra_gateway::gateway::limiter::{RateLimiter, RateLimiterStore};

fn settings(max_requests: u32) -> LimiterSettings {
    LimiterSettings {
        name: "generation".to_string(),
        label: "listing generation".to_string(),
        window_ms: 60_000,
        max_requests,
    }
}

/// Benchmark: checks spread over distinct identifiers
fn bench_uncontended_checks(c: &mut Criterion) {
    let limiter = RateLimiter::new(&settings(u32::MAX));
    let now = Utc::now();
    let mut i = 0u64;

    c.bench_function("limiter_uncontended_check", |b| {
        b.iter(|| {
            i += 1;
            let identifier = format!("caller-{}", i % 10_000);
            black_box(limiter.check_and_consume_at(&identifier, now));
        });
    });
}

/// Benchmark: checks against a single hot identifier
fn bench_contended_checks(c: &mut Criterion) {
    let limiter = RateLimiter::new(&settings(u32::MAX));
    let now = Utc::now();

    c.bench_function("limiter_hot_identifier_check", |b| {
        b.iter(|| {
            black_box(limiter.check_and_consume_at(black_box("hot-caller"), now));
        });
    });
}

/// Benchmark: sweep over a store with many stale records
fn bench_sweep(c: &mut Criterion) {
    c.bench_function("limiter_sweep_10k_records", |b| {
        b.iter_with_setup(
            || {
                let store = RateLimiterStore::new(&[settings(5)]).unwrap();
                let limiter = store.limiter("generation").unwrap();
                let start = Utc::now();
                for i in 0..10_000 {
                    limiter.check_and_consume_at(&format!("caller-{i}"), start);
                }
                (store, start + chrono::Duration::milliseconds(120_000))
            },
            |(store, later)| {
                black_box(store.sweep_at(later));
            },
        );
    });
}

criterion_group!(
    benches,
    bench_uncontended_checks,
    bench_contended_checks,
    bench_sweep
);
criterion_main!(benches);
