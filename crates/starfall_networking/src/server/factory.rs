//! # Actor Factory
//!
//! Maps an actor tag to the set of components a new entity starts with.
//! The simulation only ever calls [`ComponentSet::insert_into`], which in
//! turn only calls `add_component`; where the tags come from (code, data
//! files) is the factory's business.

use super::systems::{FIRE_INTERVAL, PROJECTILE_DAMAGE};
use starfall_core::components::{
    EntityKind, Health, HitBox, InputState, PlayerControlled, Projectile, Transform, Velocity, Weapon,
};
use starfall_core::{Component, EcsResult, Entity, Registry};

type Inserter = Box<dyn FnOnce(&mut Registry, Entity) -> EcsResult<()> + Send>;

/// A type-erased list of components to attach to one entity.
#[derive(Default)]
pub struct ComponentSet {
    inserters: Vec<Inserter>,
}

impl std::fmt::Debug for ComponentSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentSet")
            .field("components", &self.inserters.len())
            .finish()
    }
}

impl ComponentSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: adds one component.
    #[must_use]
    pub fn with<C: Component>(mut self, component: C) -> Self {
        self.inserters.push(Box::new(move |registry: &mut Registry, entity: Entity| {
            registry.add_component(entity, component)
        }));
        self
    }

    /// Number of components in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inserters.len()
    }

    /// True if the set holds no component.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inserters.is_empty()
    }

    /// Attaches every component to `entity`, in insertion order.
    ///
    /// # Errors
    ///
    /// Stops at the first unregistered component type or dead entity.
    pub fn insert_into(self, registry: &mut Registry, entity: Entity) -> EcsResult<()> {
        for insert in self.inserters {
            insert(registry, entity)?;
        }
        Ok(())
    }
}

/// Builds component sets from actor tags.
pub trait ActorFactory: Send {
    /// Components for `tag`, or `None` for an unknown tag.
    fn build(&self, tag: &str) -> Option<ComponentSet>;
}

/// Built-in actors.
///
/// | Tag | Kind | Health | Hit box |
/// |---|---|---|---|
/// | `player` | Player | 100 | 32 x 32 |
/// | `enemy` | Enemy | 30 | 48 x 48 |
/// | `projectile` | Projectile | 1 | 8 x 8 |
///
/// Players also get a [`Weapon`]. Projectiles start hostile; the server
/// sets the owner when a player fires.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultActorFactory;

impl ActorFactory for DefaultActorFactory {
    fn build(&self, tag: &str) -> Option<ComponentSet> {
        let base = ComponentSet::new()
            .with(Transform::default())
            .with(Velocity::default());
        let set = match tag {
            "player" => base
                .with(EntityKind::Player)
                .with(Health::full(100))
                .with(HitBox::new(32.0, 32.0))
                .with(InputState::default())
                .with(Weapon::with_interval(FIRE_INTERVAL)),
            "enemy" => base
                .with(EntityKind::Enemy)
                .with(Health::full(30))
                .with(HitBox::new(48.0, 48.0)),
            "projectile" => base
                .with(EntityKind::Projectile)
                .with(Health::full(1))
                .with(HitBox::new(8.0, 8.0))
                .with(Projectile {
                    damage: PROJECTILE_DAMAGE,
                    owner: None,
                }),
            _ => return None,
        };
        Some(set)
    }
}

/// Spawns a player ship for `player_id` at `spawn`.
///
/// Returns `None` if the factory has no `"player"` actor.
///
/// # Errors
///
/// Registry failures while attaching components; the entity is killed.
pub fn spawn_player(
    registry: &mut Registry,
    factory: &dyn ActorFactory,
    player_id: u8,
    spawn: Transform,
) -> EcsResult<Option<Entity>> {
    let Some(set) = factory.build("player") else {
        return Ok(None);
    };
    let entity = registry.spawn_entity();
    let attached = set
        .with(spawn)
        .with(PlayerControlled { player_id })
        .insert_into(registry, entity);
    if let Err(err) = attached {
        registry.kill_entity(entity);
        return Err(err);
    }
    Ok(Some(entity))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> Registry {
        let mut r = Registry::new();
        r.register_component::<Transform>().unwrap();
        r.register_component::<Velocity>().unwrap();
        r.register_component::<EntityKind>().unwrap();
        r.register_component::<Health>().unwrap();
        r.register_component::<HitBox>().unwrap();
        r.register_component::<InputState>().unwrap();
        r.register_component::<PlayerControlled>().unwrap();
        r.register_component::<Weapon>().unwrap();
        r.register_component::<Projectile>().unwrap();
        r
    }

    #[test]
    fn test_known_tags() {
        let factory = DefaultActorFactory;
        for tag in ["player", "enemy", "projectile"] {
            assert!(factory.build(tag).is_some_and(|set| !set.is_empty()), "{tag}");
        }
        assert!(factory.build("dragon").is_none());
    }

    #[test]
    fn test_later_components_overwrite() {
        let mut r = registry();
        let e = r.spawn_entity();
        ComponentSet::new()
            .with(Health::full(5))
            .with(Health::full(9))
            .insert_into(&mut r, e)
            .unwrap();
        assert_eq!(r.component::<Health>(e).max, 9);
    }

    #[test]
    fn test_spawn_player() {
        let mut r = registry();
        let e = spawn_player(&mut r, &DefaultActorFactory, 3, Transform::at(10.0, 20.0))
            .unwrap()
            .unwrap();
        assert_eq!(r.component::<EntityKind>(e), &EntityKind::Player);
        assert_eq!(r.component::<PlayerControlled>(e).player_id, 3);
        assert!(r.has_component::<Weapon>(e));
        assert!((r.component::<Transform>(e).x - 10.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_unregistered_component_kills_entity() {
        let mut r = Registry::new();
        r.register_component::<Transform>().unwrap();
        assert!(spawn_player(&mut r, &DefaultActorFactory, 1, Transform::default()).is_err());
        assert_eq!(r.alive_count(), 0);
    }
}
