//! Repository operation benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::Rng;
use shardex_bench::{feed_repository, generate_items, populate};
use shardex_core::Order;

/// Benchmark saving batches of items.
fn bench_save(c: &mut Criterion) {
    let mut group = c.benchmark_group("save");

    for count in [1usize, 100, 1000] {
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            let (repo, items) = feed_repository(1);
            b.iter_batched(
                || generate_items(count, 256),
                |mut batch| populate(&repo, &items, "bench", &mut batch),
                criterion::BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

/// Benchmark point reads through the value index and the pointer index.
fn bench_point_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("point_read");
    let (repo, items) = feed_repository(1);
    let mut saved = generate_items(1000, 256);
    populate(&repo, &items, "bench", &mut saved);
    let txn = repo.create_transaction("bench").unwrap();

    for order in [Order::None, Order::Descending] {
        group.bench_with_input(BenchmarkId::from_parameter(order), &order, |b, &order| {
            let mut rng = rand::thread_rng();
            b.iter(|| {
                let probe = &saved[rng.gen_range(0..saved.len())];
                black_box(txn.try_get_entity(&items, black_box(probe), order).unwrap());
            });
        });
    }
    group.finish();
}

/// Benchmark reading the first page of a descending feed.
fn bench_feed_page(c: &mut Criterion) {
    let mut group = c.benchmark_group("feed_page");

    for page in [10usize, 100] {
        group.throughput(Throughput::Elements(page as u64));
        group.bench_with_input(BenchmarkId::from_parameter(page), &page, |b, &page| {
            let (repo, items) = feed_repository(1);
            let mut saved = generate_items(5000, 128);
            populate(&repo, &items, "bench", &mut saved);
            let txn = repo.create_transaction("bench").unwrap();

            b.iter(|| {
                let count = txn
                    .get_entities(&items, 0, Order::Descending)
                    .unwrap()
                    .take(page)
                    .count();
                black_box(count);
            });
        });
    }
    group.finish();
}

/// Benchmark saves spread across shards.
fn bench_sharded_save(c: &mut Criterion) {
    let mut group = c.benchmark_group("sharded_save");

    for shards in [1usize, 4] {
        group.bench_with_input(BenchmarkId::from_parameter(shards), &shards, |b, &shards| {
            let (repo, items) = feed_repository(shards);
            let mut scope = 0u64;
            b.iter_batched(
                || generate_items(10, 128),
                |mut batch| {
                    scope += 1;
                    populate(&repo, &items, &format!("user-{scope}"), &mut batch);
                },
                criterion::BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_save,
    bench_point_read,
    bench_feed_page,
    bench_sharded_save
);
criterion_main!(benches);
