//! # Protocol Benchmark
//!
//! Snapshot build, encode and decode costs for a full datagram.
//!
//! Run with: `cargo bench --package starfall_networking`

#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use starfall_core::components::{EntityKind, Health, NetworkId, Transform, Velocity};
use starfall_core::Registry;
use starfall_networking::protocol::{decode_snapshot, EntityRecord, PacketWriter, Snapshot};
use starfall_networking::ServerSynchronizer;

fn full_snapshot() -> Snapshot {
    let mut snapshot = Snapshot::empty(1234);
    let mut id = 0u32;
    while !snapshot.is_full() {
        #[allow(clippy::cast_precision_loss)]
        let x = id as f32;
        snapshot.push(EntityRecord {
            network_id: id,
            kind: EntityKind::Enemy,
            health: 50,
            x,
            y: 2.0 * x,
            vx: -1.0,
            vy: 0.5,
        });
        id += 1;
    }
    snapshot
}

fn bench_encode(c: &mut Criterion) {
    let snapshot = full_snapshot();
    let mut writer = PacketWriter::new();
    c.bench_function("encode_full_snapshot", |b| {
        b.iter(|| writer.encode_snapshot(black_box(&snapshot)).unwrap().len());
    });
}

fn bench_decode(c: &mut Criterion) {
    let mut writer = PacketWriter::new();
    let bytes = writer.encode_snapshot(&full_snapshot()).unwrap().to_vec();
    c.bench_function("decode_full_snapshot", |b| {
        b.iter(|| decode_snapshot(black_box(&bytes)).unwrap().entity_count);
    });
}

fn bench_build(c: &mut Criterion) {
    let mut registry = Registry::new();
    registry.register_component::<NetworkId>().unwrap();
    registry.register_component::<EntityKind>().unwrap();
    registry.register_component::<Transform>().unwrap();
    registry.register_component::<Velocity>().unwrap();
    registry.register_component::<Health>().unwrap();

    let mut sync = ServerSynchronizer::new();
    for i in 0..500u16 {
        let entity = registry
            .spawn_with((
                EntityKind::Enemy,
                Transform::at(f32::from(i), 0.0),
                Velocity::new(1.0, 0.0),
                Health::full(30),
            ))
            .unwrap();
        sync.assign(&mut registry, entity).unwrap();
    }

    c.bench_function("build_snapshot_500_entities", |b| {
        let mut tick = 0u32;
        b.iter(|| {
            tick += 1;
            sync.build_snapshot(&registry, tick).unwrap().entity_count
        });
    });
}

criterion_group!(benches, bench_encode, bench_decode, bench_build);
criterion_main!(benches);
