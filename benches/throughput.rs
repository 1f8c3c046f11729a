//! Throughput Benchmark for kvsession
//!
//! Measures repository operations and reaper sweeps against the in-memory
//! storage engine.

use chrono::{Duration as ChronoDuration, Utc};
use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use kvsession::reaper::{Always, Reaper};
use kvsession::session::{codec, SessionRecord, SessionRepository};
use kvsession::storage::MemoryStore;
use serde_json::json;
use std::sync::Arc;
use tokio::runtime::Runtime;

const BUCKET: &str = "_sessions";

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("tokio runtime")
}

fn record(i: u64) -> SessionRecord {
    SessionRecord::new(json!({"user": i, "roles": ["member"], "csrf": "a3f9c0de"}))
        .expiring_at(Utc::now() + ChronoDuration::hours(1))
}

/// Benchmark the record codec
fn bench_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec");
    group.throughput(Throughput::Elements(1));

    let rec = record(1);
    let encoded = codec::encode(&rec).unwrap();

    group.bench_function("encode", |b| {
        b.iter(|| codec::encode(black_box(&rec)).unwrap());
    });

    group.bench_function("decode", |b| {
        b.iter(|| codec::decode(black_box(&encoded.value)).unwrap());
    });

    let reply = serde_json::Value::Array(
        (0..1000)
            .map(|i| json!(format!("sess:{}", i % 800)))
            .collect(),
    );
    group.bench_function("decode_index_result_1000", |b| {
        b.iter(|| codec::decode_index_result(black_box(&reply)));
    });

    group.finish();
}

/// Benchmark repository set/get
fn bench_repository(c: &mut Criterion) {
    let rt = runtime();
    let repo = SessionRepository::new(Arc::new(MemoryStore::new()), BUCKET);

    let mut group = c.benchmark_group("repository");
    group.throughput(Throughput::Elements(1));

    group.bench_function("set", |b| {
        let mut i = 0u64;
        b.iter(|| {
            rt.block_on(repo.set(&format!("sess:{}", i), &record(i))).unwrap();
            i += 1;
        });
    });

    for i in 0..10_000 {
        rt.block_on(repo.set(&format!("hot:{}", i), &record(i))).unwrap();
    }

    group.bench_function("get_hit", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let got = rt.block_on(repo.get(&format!("hot:{}", i % 10_000))).unwrap();
            black_box(got);
            i += 1;
        });
    });

    group.bench_function("get_miss", |b| {
        b.iter(|| rt.block_on(repo.get(black_box("missing"))).unwrap());
    });

    group.finish();
}

/// Benchmark a full sweep over a store with a given number of expired sessions
fn bench_sweep(c: &mut Criterion) {
    let rt = runtime();

    let mut group = c.benchmark_group("sweep");

    for expired in [100u64, 1_000] {
        group.throughput(Throughput::Elements(expired));
        group.bench_function(format!("expired_{}", expired), |b| {
            b.iter_batched(
                || {
                    let repo = SessionRepository::new(Arc::new(MemoryStore::new()), BUCKET);
                    let past = Utc::now() - ChronoDuration::hours(1);
                    for i in 0..expired {
                        let rec = SessionRecord::new(json!({"i": i})).expiring_at(past);
                        rt.block_on(repo.set(&format!("sess:{}", i), &rec)).unwrap();
                        // Live sessions the sweep must leave alone
                        rt.block_on(repo.set(&format!("live:{}", i), &record(i))).unwrap();
                    }
                    Reaper::for_repository(&repo, Arc::new(Always))
                },
                |reaper| rt.block_on(reaper.sweep()).unwrap(),
                BatchSize::LargeInput,
            );
        });
    }

    group.finish();
}

criterion_group!(benches, bench_codec, bench_repository, bench_sweep);
criterion_main!(benches);
