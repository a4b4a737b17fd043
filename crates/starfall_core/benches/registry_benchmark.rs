//! # Registry Benchmark
//!
//! Spawn, query and kill throughput for the sparse registry.
//!
//! Run with: `cargo bench --package starfall_core`

#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use starfall_core::components::{HitBox, Transform, Velocity};
use starfall_core::{spsc_queue, Registry};

fn populated(count: usize) -> Registry {
    let mut registry = Registry::with_capacity(count);
    registry.register_component::<Transform>().unwrap();
    registry.register_component::<Velocity>().unwrap();
    registry.register_component::<HitBox>().unwrap();
    for i in 0..count {
        #[allow(clippy::cast_precision_loss)]
        let x = i as f32;
        if i % 2 == 0 {
            registry
                .spawn_with((Transform::at(x, 0.0), Velocity::new(1.0, 0.5)))
                .unwrap();
        } else {
            registry
                .spawn_with((Transform::at(x, 0.0), HitBox::new(8.0, 8.0)))
                .unwrap();
        }
    }
    registry
}

fn bench_spawn(c: &mut Criterion) {
    let mut group = c.benchmark_group("spawn_with_bundle");
    for count in [1_000, 10_000] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.iter(|| black_box(populated(count)).alive_count());
        });
    }
    group.finish();
}

fn bench_query(c: &mut Criterion) {
    let registry = populated(10_000);
    c.bench_function("query_transform_velocity_10k", |b| {
        b.iter(|| {
            registry
                .query::<(Transform, Velocity)>()
                .unwrap()
                .map(|(_, (t, v))| t.x + v.vx)
                .sum::<f32>()
        });
    });
}

fn bench_integrate(c: &mut Criterion) {
    let mut registry = populated(10_000);
    c.bench_function("each_mut_integrate_10k", |b| {
        b.iter(|| {
            registry
                .each_mut::<Transform, Velocity, _>(|_, t, v| {
                    t.x += v.vx / 60.0;
                    t.y += v.vy / 60.0;
                })
                .unwrap();
        });
    });
}

fn bench_kill_respawn(c: &mut Criterion) {
    let mut registry = populated(10_000);
    c.bench_function("kill_respawn_cycle", |b| {
        b.iter(|| {
            let Some(victim) = registry.entity_at(0) else {
                return;
            };
            registry.kill_entity(victim);
            black_box(registry.spawn_with((Transform::default(),)).unwrap());
        });
    });
}

fn bench_spsc(c: &mut Criterion) {
    let (mut tx, mut rx) = spsc_queue::<u64>(4096);
    c.bench_function("spsc_push_pop_4096", |b| {
        b.iter(|| {
            for i in 0..4096 {
                tx.push(i);
            }
            rx.drain().sum::<u64>()
        });
    });
}

criterion_group!(
    benches,
    bench_spawn,
    bench_query,
    bench_integrate,
    bench_kill_respawn,
    bench_spsc,
);
criterion_main!(benches);
