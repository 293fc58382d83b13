//! Micro-benchmarks for StrataDB core operations.
//!
//! Uses Criterion for statistically rigorous measurement with
//! regression detection and HTML reports.
//!
//! # Running
//!
//! ```bash
//! cargo bench --bench micro              # run all micro-benchmarks
//! cargo bench --bench micro -- put       # filter by name
//! ```
//!
//! Reports are generated in `target/criterion/report/index.html`.

use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};

use stratadb::bloom::BloomFilter;
use stratadb::compaction::LeveledOptions;
use stratadb::engine::{Engine, EngineConfig};
use tempfile::TempDir;

// ------------------------------------------------------------------------------------------------
// Helpers
// ------------------------------------------------------------------------------------------------

/// Default value payload (128 bytes).
const VALUE_128B: &[u8; 128] = &[0xAB; 128];

fn make_key(i: u64) -> Vec<u8> {
    format!("key-{i:012}").into_bytes()
}

/// Engine with a large MemTable and no background workers: everything
/// stays in memory.
fn open_memtable_only(dir: &std::path::Path) -> Engine {
    Engine::open(
        dir,
        EngineConfig {
            mem_table_size: 64 * 1024 * 1024,
            cache_capacity: 100_000,
            compaction: LeveledOptions::default(),
            enable_auto_compaction: false,
        },
    )
    .expect("open")
}

// ------------------------------------------------------------------------------------------------
// Benchmarks
// ------------------------------------------------------------------------------------------------

fn bench_put(c: &mut Criterion) {
    let mut group = c.benchmark_group("put");
    group.throughput(Throughput::Elements(1));

    group.bench_function("put_128b", |b| {
        let tmp = TempDir::new().unwrap();
        let engine = open_memtable_only(tmp.path());
        let mut i = 0u64;
        b.iter(|| {
            engine
                .put(make_key(i), VALUE_128B.to_vec())
                .expect("put");
            i += 1;
        });
        engine.close().expect("close");
    });

    group.finish();
}

fn bench_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("get");
    group.throughput(Throughput::Elements(1));

    group.bench_function("get_memtable_hit", |b| {
        let tmp = TempDir::new().unwrap();
        let engine = open_memtable_only(tmp.path());
        for i in 0..10_000u64 {
            engine.put(make_key(i), VALUE_128B.to_vec()).expect("put");
        }
        let mut i = 0u64;
        b.iter(|| {
            let key = make_key(i % 10_000);
            black_box(engine.get(&key).expect("get"));
            i += 1;
        });
        engine.close().expect("close");
    });

    group.bench_function("get_sstable_hit", |b| {
        let tmp = TempDir::new().unwrap();
        let engine = open_memtable_only(tmp.path());
        for i in 0..10_000u64 {
            engine.put(make_key(i), VALUE_128B.to_vec()).expect("put");
        }
        engine.sync().expect("sync");
        let mut i = 0u64;
        b.iter(|| {
            let key = make_key(i % 10_000);
            black_box(engine.get(&key).expect("get"));
            i += 1;
        });
        engine.close().expect("close");
    });

    group.bench_function("get_absent_bloom_reject", |b| {
        let tmp = TempDir::new().unwrap();
        let engine = open_memtable_only(tmp.path());
        for i in 0..10_000u64 {
            engine.put(make_key(i), VALUE_128B.to_vec()).expect("put");
        }
        engine.sync().expect("sync");
        let mut i = 0u64;
        b.iter(|| {
            let key = format!("absent-{i:012}").into_bytes();
            black_box(engine.get(&key).expect("get"));
            i += 1;
        });
        engine.close().expect("close");
    });

    group.finish();
}

fn bench_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("scan");
    group.throughput(Throughput::Elements(100));

    group.bench_function("scan_100_of_10k", |b| {
        let tmp = TempDir::new().unwrap();
        let engine = open_memtable_only(tmp.path());
        for i in 0..10_000u64 {
            engine.put(make_key(i), VALUE_128B.to_vec()).expect("put");
        }
        engine.sync().expect("sync");
        b.iter(|| {
            let results = engine
                .scan(&make_key(4000), &make_key(4100))
                .expect("scan");
            black_box(results.len());
        });
        engine.close().expect("close");
    });

    group.finish();
}

fn bench_bloom(c: &mut Criterion) {
    let mut group = c.benchmark_group("bloom");
    group.throughput(Throughput::Elements(1));

    group.bench_function("may_contain_present", |b| {
        let mut bloom = BloomFilter::new(100_000, 0.01);
        for i in 0..100_000u64 {
            bloom.add(&make_key(i));
        }
        let mut i = 0u64;
        b.iter(|| {
            black_box(bloom.may_contain(&make_key(i % 100_000)));
            i += 1;
        });
    });

    group.bench_function("may_contain_absent", |b| {
        let mut bloom = BloomFilter::new(100_000, 0.01);
        for i in 0..100_000u64 {
            bloom.add(&make_key(i));
        }
        let mut i = 0u64;
        b.iter(|| {
            let key = format!("absent-{i:012}").into_bytes();
            black_box(bloom.may_contain(&key));
            i += 1;
        });
    });

    group.finish();
}

criterion_group!(benches, bench_put, bench_get, bench_scan, bench_bloom);
criterion_main!(benches);
