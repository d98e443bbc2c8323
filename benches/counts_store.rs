//! Counts Store Benchmarks
//!
//! - `apply_*`: updater lifecycle (begin, increment, close)
//! - `lookup_*`: snapshot page lookup plus pending delta
//! - `rotate_*`: drain, merge, write and publish
//!
//! All key choices use a fixed seed (BENCH_SEED) for reproducibility.
//!
//! ## Running
//!
//! ```bash
//! cargo bench --bench counts_store
//! cargo bench --bench counts_store -- "lookup"  # specific group
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use countsdb::{CountsConfig, CountsDeltaBatch, CountsKey, CountsStore, CounterPair};
use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::TempDir;

// =============================================================================
// Constants and Configuration
// =============================================================================

const BENCH_SEED: u64 = 0xDEADBEEF_CAFEBABE;

const LABELS: i32 = 1_000;

// =============================================================================
// Utilities - allocation happens here, outside timed loops
// =============================================================================

fn open_store(dir: &TempDir) -> CountsStore {
    CountsStore::open(CountsConfig::for_testing(dir.path())).expect("open store")
}

/// Store with one node counter per label rotated into the snapshot
fn populated_store(dir: &TempDir, labels: i32) -> CountsStore {
    let store = open_store(dir);
    let mut batch = CountsDeltaBatch::new(1);
    for label in 0..labels {
        batch.push(CountsKey::node(label), CounterPair::count(label as i64 + 1));
    }
    store.apply_transaction(&batch);
    store.rotate(1).expect("rotate");
    store
}

fn random_labels(count: usize, max: i32) -> Vec<i32> {
    let mut rng = StdRng::seed_from_u64(BENCH_SEED);
    (0..count).map(|_| rng.gen_range(0..max)).collect()
}

// =============================================================================
// apply_*
// =============================================================================

fn apply_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("apply");
    group.throughput(Throughput::Elements(1));

    for deltas in [1usize, 8, 64] {
        let temp_dir = TempDir::new().unwrap();
        let store = open_store(&temp_dir);
        let labels = random_labels(deltas, LABELS);
        let next_tx = AtomicU64::new(1);

        group.bench_with_input(BenchmarkId::new("deltas", deltas), &labels, |b, labels| {
            b.iter(|| {
                let tx = next_tx.fetch_add(1, Ordering::Relaxed);
                let mut updater = store.apply(tx);
                for &label in labels {
                    updater.increment_node_count(label, 1);
                }
                updater.close();
            })
        });
    }

    group.bench_function("contended_4_threads", |b| {
        b.iter_custom(|iters| {
            let temp_dir = TempDir::new().unwrap();
            let store = Arc::new(open_store(&temp_dir));
            let next_tx = Arc::new(AtomicU64::new(1));
            let barrier = Arc::new(Barrier::new(4));
            let per_thread = iters / 4 + 1;

            let start = std::time::Instant::now();
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    let store = Arc::clone(&store);
                    let next_tx = Arc::clone(&next_tx);
                    let barrier = Arc::clone(&barrier);
                    thread::spawn(move || {
                        barrier.wait();
                        for _ in 0..per_thread {
                            let tx = next_tx.fetch_add(1, Ordering::Relaxed);
                            let mut updater = store.apply(tx);
                            updater.increment_node_count(0, 1);
                            updater.close();
                        }
                    })
                })
                .collect();
            for handle in handles {
                handle.join().unwrap();
            }
            start.elapsed()
        })
    });

    group.finish();
}

// =============================================================================
// lookup_*
// =============================================================================

fn lookup_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("lookup");
    group.throughput(Throughput::Elements(1));

    let temp_dir = TempDir::new().unwrap();
    let store = populated_store(&temp_dir, LABELS);
    let labels = random_labels(4096, LABELS);

    group.bench_function("snapshot_hit", |b| {
        let mut i = 0;
        b.iter(|| {
            let label = labels[i % labels.len()];
            i += 1;
            black_box(store.node_count(label).unwrap())
        })
    });

    group.bench_function("absent_key", |b| {
        b.iter(|| black_box(store.node_count(LABELS + 7).unwrap()))
    });

    // Same keys, now also pending in the buffer
    let mut updater = store.apply(2);
    for label in 0..LABELS {
        updater.increment_node_count(label, 1);
    }
    updater.close();

    group.bench_function("snapshot_plus_pending", |b| {
        let mut i = 0;
        b.iter(|| {
            let label = labels[i % labels.len()];
            i += 1;
            black_box(store.node_count(label).unwrap())
        })
    });

    group.finish();
}

// =============================================================================
// rotate_*
// =============================================================================

fn rotate_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("rotate");
    group.sample_size(20);

    for keys in [100i32, 1_000, 10_000] {
        group.throughput(Throughput::Elements(keys as u64));
        group.bench_with_input(BenchmarkId::new("keys", keys), &keys, |b, &keys| {
            b.iter_batched(
                || {
                    let temp_dir = TempDir::new().unwrap();
                    let store = populated_store(&temp_dir, keys);
                    let mut updater = store.apply(2);
                    for label in (0..keys).step_by(2) {
                        updater.increment_node_count(label, 1);
                    }
                    updater.close();
                    (temp_dir, store)
                },
                |(_temp_dir, store)| black_box(store.rotate(2).unwrap()),
                BatchSize::PerIteration,
            )
        });
    }

    group.finish();
}

criterion_group!(benches, apply_benchmarks, lookup_benchmarks, rotate_benchmarks);
criterion_main!(benches);
