//! # Server Synchronizer
//!
//! Turns registry state into one [`Snapshot`] per tick.
//!
//! ## Design
//!
//! - An entity is replicated once it carries a [`NetworkId`], an
//!   [`EntityKind`] and a [`Transform`]; velocity and health are optional
//! - Network ids come from a counter, so a client never mistakes a new entity
//!   for a dead one that shared its local index. The counter restarts at 1
//!   only after `u32::MAX` assignments, with a warning
//! - When more entities are replicated than fit in one datagram, a cursor
//!   rotates through them so every entity is refreshed within
//!   `ceil(n / MAX_RECORDS)` ticks

use crate::protocol::{EntityRecord, Snapshot};
use starfall_core::components::{EntityKind, Health, NetworkId, Transform, Velocity};
use starfall_core::{EcsResult, Entity, Registry};

/// Builds per-tick snapshots.
#[derive(Debug)]
pub struct ServerSynchronizer {
    next_network_id: u32,
    assigned: u64,
    cursor: usize,
}

impl Default for ServerSynchronizer {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerSynchronizer {
    /// Creates a synchronizer. The first network id handed out is 1.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            next_network_id: 1,
            assigned: 0,
            cursor: 0,
        }
    }

    /// Gives `entity` a fresh network id.
    ///
    /// # Errors
    ///
    /// Fails if `NetworkId` is unregistered or `entity` is dead.
    pub fn assign(&mut self, registry: &mut Registry, entity: Entity) -> EcsResult<NetworkId> {
        let id = NetworkId(self.next_network_id);
        registry.add_component(entity, id)?;
        self.assigned += 1;
        self.next_network_id = if let Some(next) = self.next_network_id.checked_add(1) {
            next
        } else {
            tracing::warn!(assigned = self.assigned, "network id space exhausted, restarting at 1");
            1
        };
        Ok(id)
    }

    /// Number of network ids handed out so far.
    #[must_use]
    pub const fn assigned(&self) -> u64 {
        self.assigned
    }

    /// Serializes the replicated entities for `tick`.
    ///
    /// # Errors
    ///
    /// Fails if a replicated component type is unregistered.
    pub fn build_snapshot(&mut self, registry: &Registry, tick: u32) -> EcsResult<Snapshot> {
        let query = registry.query::<(NetworkId, EntityKind, Transform)>()?;
        let total = query.clone().count();

        let start = if total > Snapshot::MAX_RECORDS {
            self.cursor % total
        } else {
            0
        };

        let mut snapshot = Snapshot::empty(tick);
        let rotated = query.clone().skip(start).chain(query.take(start));
        for (entity, (network_id, kind, transform)) in rotated {
            let velocity = registry.try_get::<Velocity>(entity).copied().unwrap_or_default();
            let health = registry.try_get::<Health>(entity).map_or(0, Health::wire_value);
            let record = EntityRecord {
                network_id: network_id.0,
                kind: *kind,
                health,
                x: transform.x,
                y: transform.y,
                vx: velocity.vx,
                vy: velocity.vy,
            };
            if !snapshot.push(record) {
                break;
            }
        }

        if total > Snapshot::MAX_RECORDS {
            self.cursor = (start + Snapshot::MAX_RECORDS) % total;
        } else {
            self.cursor = 0;
        }
        Ok(snapshot)
    }
}
