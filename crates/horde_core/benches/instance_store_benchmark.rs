//! # Instance Store Benchmark
//!
//! REQUIREMENTS:
//! - Refill 32K instances well under 1ms
//! - 0 allocations during refill
//!
//! Run with: `cargo bench --package horde_core`

#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use horde_core::{AnimationSample, BoundsMode, InstanceStore, InstanceTransform, DEFAULT_CAPACITY};

fn make_instances(count: usize) -> (Vec<InstanceTransform>, Vec<AnimationSample>) {
    (0..count)
        .map(|i| {
            let f = i as f32;
            (
                InstanceTransform::from_translation(f, 0.0, f * 0.5),
                AnimationSample::new(f / count as f32, 0.5, 0.0),
            )
        })
        .unzip()
}

/// Benchmark: append one pair at a time, as a culling system would.
fn bench_append_refill(c: &mut Criterion) {
    let mut group = c.benchmark_group("append_refill");

    for count in [1_024, 8_192, DEFAULT_CAPACITY] {
        let (transforms, samples) = make_instances(count);
        let mut store = InstanceStore::new();

        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, _| {
            b.iter(|| {
                store.clear();
                for (t, s) in transforms.iter().zip(&samples) {
                    let _ = black_box(store.append(*t, *s));
                }
                store.len()
            });
        });
    }

    group.finish();
}

/// Benchmark: bulk append of a full frame.
fn bench_append_batch(c: &mut Criterion) {
    let (transforms, samples) = make_instances(DEFAULT_CAPACITY);
    let mut store = InstanceStore::new();

    c.bench_function("append_batch_32K", |b| {
        b.iter(|| {
            store.clear();
            black_box(store.append_batch(&transforms, &samples))
        });
    });
}

/// Benchmark: computing a tight bound from a full store.
fn bench_bounds_from_instances(c: &mut Criterion) {
    let (transforms, _) = make_instances(DEFAULT_CAPACITY);
    let mode = BoundsMode::FromInstances { padding: 2.0 };

    c.bench_function("bounds_from_instances_32K", |b| {
        b.iter(|| black_box(mode.resolve(black_box(&transforms))));
    });
}

criterion_group!(
    benches,
    bench_append_refill,
    bench_append_batch,
    bench_bounds_from_instances
);
criterion_main!(benches);
