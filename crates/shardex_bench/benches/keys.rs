//! Key codec and routing benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use shardex_core::key::{make_key, scan_start, with_tag};
use shardex_core::{scope_hash, EntityId, FieldTag, Order, ScopeKey};

fn bench_make_key(c: &mut Criterion) {
    let mut group = c.benchmark_group("make_key");
    let scope = ScopeKey::from(EntityId::new());
    let id = EntityId::new();

    for order in [Order::None, Order::Ascending, Order::Descending] {
        group.bench_with_input(BenchmarkId::from_parameter(order), &order, |b, &order| {
            b.iter(|| {
                let prefix = make_key(
                    black_box(scope.as_bytes()),
                    order,
                    Some(black_box(1_234_567)),
                    id.as_bytes(),
                )
                .unwrap();
                black_box(with_tag(&prefix, FieldTag::Body));
            });
        });
    }
    group.finish();
}

fn bench_scan_start(c: &mut Criterion) {
    let scope = ScopeKey::from("bench-scope");
    c.bench_function("scan_start", |b| {
        b.iter(|| {
            black_box(scan_start(scope.as_bytes(), Order::Descending, black_box(42)).unwrap());
        });
    });
}

fn bench_scope_hash(c: &mut Criterion) {
    let mut group = c.benchmark_group("scope_hash");
    for len in [8usize, 16, 64] {
        let scope = vec![7u8; len];
        group.bench_with_input(BenchmarkId::from_parameter(len), &scope, |b, scope| {
            b.iter(|| black_box(scope_hash(black_box(scope))));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_make_key, bench_scan_start, bench_scope_hash);
criterion_main!(benches);
