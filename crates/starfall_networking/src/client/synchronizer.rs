//! # Client Synchronizer
//!
//! Applies server snapshots to the client registry.
//!
//! - Snapshots whose tick is not newer than the last applied one are dropped
//! - Known network ids are overwritten in place, unknown ones are spawned
//! - Replicated components a local system removed are re-attached
//! - Entities missing from a snapshot are left alone; [`ClientSynchronizer::despawn_stale`]
//!   and [`ClientSynchronizer::forget`] remove them
//!
//! Applying either writes every record or, when a replicated component type
//! is unregistered, nothing at all.

use crate::protocol::{EntityRecord, Snapshot};
use starfall_core::components::{EntityKind, Health, NetworkId, Transform, Velocity};
use starfall_core::{EcsResult, Entity, Registry};
use std::collections::HashMap;

/// Result of [`ClientSynchronizer::apply`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The snapshot was newer and has been written to the registry.
    Applied,
    /// The snapshot was not newer than the last applied one.
    Stale,
}

#[derive(Clone, Copy, Debug)]
struct Replica {
    entity: Entity,
    /// Tick of the newest snapshot that carried this id.
    last_seen: u32,
}

/// Maps network ids to local entities and tracks the newest applied tick.
#[derive(Debug, Default)]
pub struct ClientSynchronizer {
    last_applied_tick: Option<u32>,
    replicas: HashMap<u32, Replica>,
}

impl ClientSynchronizer {
    /// Creates an empty synchronizer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Tick of the newest applied snapshot.
    #[inline]
    #[must_use]
    pub const fn last_applied_tick(&self) -> Option<u32> {
        self.last_applied_tick
    }

    /// Local entity for a network id.
    #[must_use]
    pub fn entity_for(&self, network_id: u32) -> Option<Entity> {
        self.replicas.get(&network_id).map(|replica| replica.entity)
    }

    /// Number of tracked entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.replicas.len()
    }

    /// True if no entity is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.replicas.is_empty()
    }

    /// Writes `snapshot` into `registry` if it is newer than the last one.
    ///
    /// # Errors
    ///
    /// Fails if a replicated component type is unregistered. The registry
    /// is left untouched in that case.
    pub fn apply(&mut self, registry: &mut Registry, snapshot: &Snapshot) -> EcsResult<ApplyOutcome> {
        if self.last_applied_tick.is_some_and(|last| snapshot.tick <= last) {
            tracing::trace!(tick = snapshot.tick, last = ?self.last_applied_tick, "stale snapshot");
            return Ok(ApplyOutcome::Stale);
        }
        ensure_replica_components(registry)?;

        for record in snapshot.records() {
            let entity = match self.entity_for(record.network_id) {
                Some(entity) if registry.is_alive(entity) => entity,
                _ => {
                    let entity = registry.spawn_entity();
                    registry.add_component(entity, NetworkId(record.network_id))?;
                    tracing::debug!(network_id = record.network_id, %entity, kind = ?record.kind, "replica spawned");
                    entity
                }
            };
            write_record(registry, entity, record)?;
            self.replicas.insert(
                record.network_id,
                Replica {
                    entity,
                    last_seen: snapshot.tick,
                },
            );
        }

        self.last_applied_tick = Some(snapshot.tick);
        Ok(ApplyOutcome::Applied)
    }

    /// Kills every replica not refreshed for too long.
    ///
    /// A replica is stale once the last applied tick is more than
    /// `timeout_ticks` past its last refresh, scaled by the number of
    /// snapshots the server needs to cover every tracked entity
    /// (`ceil(len / MAX_RECORDS)`). Returns the number of despawned replicas.
    pub fn despawn_stale(&mut self, registry: &mut Registry, timeout_ticks: u32) -> usize {
        let Some(now) = self.last_applied_tick else {
            return 0;
        };
        let rounds = self.replicas.len().div_ceil(Snapshot::MAX_RECORDS).max(1);
        let limit = timeout_ticks.saturating_mul(u32::try_from(rounds).unwrap_or(u32::MAX));

        let before = self.replicas.len();
        self.replicas.retain(|&network_id, replica| {
            if now.wrapping_sub(replica.last_seen) <= limit {
                return true;
            }
            registry.kill_entity(replica.entity);
            tracing::debug!(network_id, entity = %replica.entity, "stale replica despawned");
            false
        });
        before - self.replicas.len()
    }

    /// Stops tracking `network_id` and kills its local entity.
    ///
    /// Returns the entity if it was tracked.
    pub fn forget(&mut self, registry: &mut Registry, network_id: u32) -> Option<Entity> {
        let replica = self.replicas.remove(&network_id)?;
        registry.kill_entity(replica.entity);
        Some(replica.entity)
    }

    /// Drops every mapping and the applied tick, e.g. after reconnecting.
    pub fn reset(&mut self) {
        self.replicas.clear();
        self.last_applied_tick = None;
    }
}

/// Overwrites the replicated fields of `entity`, re-attaching any missing
/// component. Local-only fields (origin, hierarchy, acceleration) survive.
fn write_record(registry: &mut Registry, entity: Entity, record: &EntityRecord) -> EcsResult<()> {
    registry.add_component(entity, record.kind)?;

    if let Some(transform) = registry.try_get_mut::<Transform>(entity) {
        transform.x = record.x;
        transform.y = record.y;
    } else {
        registry.add_component(entity, Transform::at(record.x, record.y))?;
    }

    if let Some(velocity) = registry.try_get_mut::<Velocity>(entity) {
        velocity.vx = record.vx;
        velocity.vy = record.vy;
    } else {
        registry.add_component(entity, Velocity::new(record.vx, record.vy))?;
    }

    let current = u16::from(record.health);
    if let Some(health) = registry.try_get_mut::<Health>(entity) {
        health.current = current;
        health.max = health.max.max(current);
    } else {
        registry.add_component(entity, Health::full(current))?;
    }
    Ok(())
}

fn ensure_replica_components(registry: &Registry) -> EcsResult<()> {
    registry.components::<NetworkId>()?;
    registry.components::<EntityKind>()?;
    registry.components::<Transform>()?;
    registry.components::<Velocity>()?;
    registry.components::<Health>()?;
    Ok(())
}

/// Registers every component a replica carries.
///
/// # Errors
///
/// Fails if one of them is already registered.
pub fn register_replica_components(registry: &mut Registry) -> EcsResult<()> {
    registry.register_component::<NetworkId>()?;
    registry.register_component::<EntityKind>()?;
    registry.register_component::<Transform>()?;
    registry.register_component::<Velocity>()?;
    registry.register_component::<Health>()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> Registry {
        let mut r = Registry::new();
        register_replica_components(&mut r).unwrap();
        r
    }

    fn record(network_id: u32, x: f32) -> EntityRecord {
        EntityRecord {
            network_id,
            kind: EntityKind::Enemy,
            health: 40,
            x,
            y: 2.0,
            vx: -1.0,
            vy: 0.0,
        }
    }

    fn snapshot(tick: u32, records: &[EntityRecord]) -> Snapshot {
        let mut s = Snapshot::empty(tick);
        for r in records {
            assert!(s.push(*r));
        }
        s
    }

    #[test]
    fn test_unknown_entities_are_spawned() {
        let mut r = registry();
        let mut sync = ClientSynchronizer::new();
        let outcome = sync.apply(&mut r, &snapshot(5, &[record(7, 1.0), record(8, 3.0)])).unwrap();

        assert_eq!(outcome, ApplyOutcome::Applied);
        assert_eq!(sync.last_applied_tick(), Some(5));
        assert_eq!(r.alive_count(), 2);
        let e = sync.entity_for(8).unwrap();
        assert!((r.component::<Transform>(e).x - 3.0).abs() < f32::EPSILON);
        assert_eq!(r.component::<Health>(e).current, 40);
        assert_eq!(r.component::<EntityKind>(e), &EntityKind::Enemy);
    }

    #[test]
    fn test_stale_snapshots_are_dropped() {
        let mut r = registry();
        let mut sync = ClientSynchronizer::new();
        sync.apply(&mut r, &snapshot(10, &[record(1, 1.0)])).unwrap();

        for tick in [10, 9, 0] {
            let outcome = sync.apply(&mut r, &snapshot(tick, &[record(1, 99.0)])).unwrap();
            assert_eq!(outcome, ApplyOutcome::Stale);
        }
        let e = sync.entity_for(1).unwrap();
        assert!((r.component::<Transform>(e).x - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_applying_twice_equals_once() {
        let s = snapshot(3, &[record(1, 1.0), record(2, 2.0)]);

        let mut once = registry();
        let mut sync_once = ClientSynchronizer::new();
        sync_once.apply(&mut once, &s).unwrap();

        let mut twice = registry();
        let mut sync_twice = ClientSynchronizer::new();
        sync_twice.apply(&mut twice, &s).unwrap();
        sync_twice.apply(&mut twice, &s).unwrap();

        assert_eq!(once.alive_count(), twice.alive_count());
        for id in [1, 2] {
            let a = sync_once.entity_for(id).unwrap();
            let b = sync_twice.entity_for(id).unwrap();
            assert_eq!(once.component::<Transform>(a), twice.component::<Transform>(b));
            assert_eq!(once.component::<Velocity>(a), twice.component::<Velocity>(b));
        }
    }

    #[test]
    fn test_missing_entities_are_kept_until_forgotten() {
        let mut r = registry();
        let mut sync = ClientSynchronizer::new();
        sync.apply(&mut r, &snapshot(1, &[record(1, 1.0), record(2, 2.0)])).unwrap();
        sync.apply(&mut r, &snapshot(2, &[record(1, 1.5)])).unwrap();
        assert_eq!(r.alive_count(), 2);

        let gone = sync.forget(&mut r, 2).unwrap();
        assert!(!r.is_alive(gone));
        assert!(sync.forget(&mut r, 2).is_none());

        // A later record with the same id spawns a fresh replica.
        sync.apply(&mut r, &snapshot(3, &[record(2, 5.0)])).unwrap();
        assert_ne!(sync.entity_for(2), Some(gone));
    }

    #[test]
    fn test_removed_component_is_reattached() {
        let mut r = registry();
        let mut sync = ClientSynchronizer::new();
        sync.apply(&mut r, &snapshot(1, &[record(1, 1.0), record(2, 2.0)])).unwrap();
        let dying = sync.entity_for(2).unwrap();
        r.remove_component::<Health>(dying).unwrap();

        let outcome = sync.apply(&mut r, &snapshot(2, &[record(1, 10.0), record(2, 20.0)])).unwrap();
        assert_eq!(outcome, ApplyOutcome::Applied);
        assert_eq!(sync.last_applied_tick(), Some(2));
        assert!((r.component::<Transform>(dying).x - 20.0).abs() < f32::EPSILON);
        assert_eq!(r.component::<Health>(dying).current, 40);
    }

    #[test]
    fn test_unregistered_component_leaves_registry_untouched() {
        let mut r = Registry::new();
        r.register_component::<NetworkId>().unwrap();
        r.register_component::<EntityKind>().unwrap();
        r.register_component::<Transform>().unwrap();
        let mut sync = ClientSynchronizer::new();

        assert!(sync.apply(&mut r, &snapshot(1, &[record(1, 1.0)])).is_err());
        assert_eq!(r.alive_count(), 0);
        assert!(sync.is_empty());
        assert_eq!(sync.last_applied_tick(), None);
    }

    #[test]
    fn test_local_transform_fields_survive() {
        let mut r = registry();
        let mut sync = ClientSynchronizer::new();
        sync.apply(&mut r, &snapshot(1, &[record(1, 1.0)])).unwrap();
        let e = sync.entity_for(1).unwrap();
        r.get_component_mut::<Transform>(e).unwrap().rotation = 90.0;

        sync.apply(&mut r, &snapshot(2, &[record(1, 3.0)])).unwrap();
        let t = r.component::<Transform>(e);
        assert!((t.x - 3.0).abs() < f32::EPSILON);
        assert!((t.rotation - 90.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_unrefreshed_replicas_are_despawned() {
        let mut r = registry();
        let mut sync = ClientSynchronizer::new();
        sync.apply(&mut r, &snapshot(1, &[record(1, 1.0), record(2, 2.0)])).unwrap();
        let departed = sync.entity_for(2).unwrap();

        for tick in 2..=11 {
            sync.apply(&mut r, &snapshot(tick, &[record(1, 1.0)])).unwrap();
            assert_eq!(sync.despawn_stale(&mut r, 10), 0, "tick {tick}");
        }
        sync.apply(&mut r, &snapshot(12, &[record(1, 1.0)])).unwrap();
        assert_eq!(sync.despawn_stale(&mut r, 10), 1);
        assert!(!r.is_alive(departed));
        assert_eq!(sync.entity_for(2), None);
        assert!(sync.entity_for(1).is_some());
    }

    #[test]
    fn test_staleness_scales_with_round_robin() {
        let mut r = registry();
        let mut sync = ClientSynchronizer::new();
        // Two full snapshots cover 132 ids, so a pass takes two ticks.
        let first: Vec<EntityRecord> = (0..66).map(|id| record(id, 0.0)).collect();
        let second: Vec<EntityRecord> = (66..132).map(|id| record(id, 0.0)).collect();
        sync.apply(&mut r, &snapshot(1, &first)).unwrap();
        sync.apply(&mut r, &snapshot(2, &second)).unwrap();

        // Only the second half keeps being refreshed.
        for tick in 3..=11 {
            sync.apply(&mut r, &snapshot(tick, &second)).unwrap();
        }
        assert_eq!(sync.despawn_stale(&mut r, 5), 0);
        sync.apply(&mut r, &snapshot(12, &second)).unwrap();
        assert_eq!(sync.despawn_stale(&mut r, 5), 66);
        assert_eq!(sync.len(), 66);
    }
}
