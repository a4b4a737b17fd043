//! # Gameplay Systems
//!
//! Plain functions run once per tick on the server registry, in this order:
//!
//! 1. [`apply_input`] - held keys set player velocity
//! 2. [`fire_weapons`] - the fire button's press edge queues a shot
//! 3. [`integrate`] - acceleration into velocity, velocity into position
//! 4. [`clamp_players`] - keep player ships inside the playfield
//! 5. [`resolve_hits`] - projectiles damage what they overlap
//! 6. [`despawn_offscreen`] - drop everything but players once out of range
//!
//! Scratch vectors live in [`HitBuffers`] and are reused across ticks.

use starfall_core::components::{
    Health, HitBox, InputState, PlayerControlled, Projectile, Transform, Velocity, Weapon,
};
use starfall_core::{is_colliding, EcsResult, Entity, Registry, Vec2};

/// Player ship speed, in units per second.
pub const PLAYER_SPEED: f32 = 300.0;

/// Projectile speed, in units per second.
pub const PROJECTILE_SPEED: f32 = 800.0;

/// Hit points a player shot removes.
pub const PROJECTILE_DAMAGE: u16 = 10;

/// Seconds between two player shots.
pub const FIRE_INTERVAL: f32 = 0.25;

/// Distance past the playfield edge at which non-players are despawned.
pub const DESPAWN_MARGIN: f32 = 150.0;

/// Rectangle players are confined to, `[0, width] x [0, height]`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Playfield {
    /// Width in world units.
    pub width: f32,
    /// Height in world units.
    pub height: f32,
}

impl Playfield {
    /// Creates a playfield.
    #[must_use]
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    /// True if `point` lies inside the playfield grown by `margin` on every side.
    #[must_use]
    pub fn contains(&self, point: Vec2, margin: f32) -> bool {
        (-margin..=self.width + margin).contains(&point.x) && (-margin..=self.height + margin).contains(&point.y)
    }
}

/// Scratch space for [`resolve_hits`] and [`despawn_offscreen`].
#[derive(Debug, Default)]
pub struct HitBuffers {
    spent: Vec<Entity>,
    hits: Vec<(Entity, u16)>,
    doomed: Vec<Entity>,
}

impl HitBuffers {
    /// Creates empty buffers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn clear(&mut self) {
        self.spent.clear();
        self.hits.clear();
        self.doomed.clear();
    }
}

/// Sets the velocity of every entity carrying an [`InputState`].
///
/// # Errors
///
/// Fails if either component type is unregistered.
pub fn apply_input(registry: &mut Registry) -> EcsResult<()> {
    registry.each_mut::<Velocity, InputState, _>(|_, velocity, input| {
        let direction = input.direction() * PLAYER_SPEED;
        velocity.vx = direction.x;
        velocity.vy = direction.y;
    })
}

/// Ticks weapon cooldowns and collects the entities that fire this tick.
///
/// A shot needs the fire button newly pressed and the cooldown elapsed;
/// holding the button does not auto-fire. `shooters` is cleared first.
///
/// # Errors
///
/// Fails if either component type is unregistered.
pub fn fire_weapons(registry: &mut Registry, dt: f32, shooters: &mut Vec<Entity>) -> EcsResult<()> {
    shooters.clear();
    registry.each_mut::<Weapon, InputState, _>(|entity, weapon, input| {
        if weapon.cooldown > 0.0 {
            weapon.cooldown -= dt;
        }
        if input.shoot && !weapon.was_firing && weapon.cooldown <= 0.0 {
            weapon.cooldown = weapon.cooldown_max;
            shooters.push(entity);
        }
        weapon.was_firing = input.shoot;
    })
}

/// Semi-implicit Euler step over `dt` seconds.
///
/// # Errors
///
/// Fails if either component type is unregistered.
pub fn integrate(registry: &mut Registry, dt: f32) -> EcsResult<()> {
    for (_, velocity) in registry.components_mut::<Velocity>()?.iter_mut() {
        velocity.vx += velocity.ax * dt;
        velocity.vy += velocity.ay * dt;
    }
    registry.each_mut::<Transform, Velocity, _>(|_, transform, velocity| {
        transform.x += velocity.vx * dt;
        transform.y += velocity.vy * dt;
    })
}

/// Clamps every player-controlled transform into `playfield`.
///
/// # Errors
///
/// Fails if either component type is unregistered.
pub fn clamp_players(registry: &mut Registry, playfield: Playfield) -> EcsResult<()> {
    registry.each_mut::<Transform, PlayerControlled, _>(|_, transform, _| {
        transform.x = transform.x.clamp(0.0, playfield.width);
        transform.y = transform.y.clamp(0.0, playfield.height);
    })
}

/// Applies projectile hits and kills what they destroy.
///
/// Friendly projectiles only hit non-players, hostile ones only hit players.
/// A projectile is spent by its first hit. Targets whose health reaches zero
/// are killed along with every spent projectile.
///
/// Returns the number of killed entities.
///
/// # Errors
///
/// Fails if a component type involved is unregistered.
pub fn resolve_hits(registry: &mut Registry, buffers: &mut HitBuffers) -> EcsResult<usize> {
    buffers.clear();

    let bullets = registry.query::<(Projectile, Transform, HitBox)>()?;
    for (target, (_, transform, hitbox)) in registry.query::<(Health, Transform, HitBox)>()? {
        if registry.has_component::<Projectile>(target) {
            continue;
        }
        let is_player = registry.has_component::<PlayerControlled>(target);
        for (bullet, (projectile, bullet_transform, bullet_hitbox)) in bullets.clone() {
            if projectile.is_friendly() == is_player || buffers.spent.contains(&bullet) {
                continue;
            }
            if is_colliding(transform, hitbox, bullet_transform, bullet_hitbox) {
                buffers.spent.push(bullet);
                buffers.hits.push((target, projectile.damage));
            }
        }
    }

    for &(target, damage) in &buffers.hits {
        let health = registry.get_component_mut::<Health>(target)?;
        health.damage(damage);
        if health.is_depleted() && !buffers.doomed.contains(&target) {
            buffers.doomed.push(target);
            tracing::debug!(%target, "destroyed");
        }
    }
    buffers.doomed.extend_from_slice(&buffers.spent);
    for &entity in &buffers.doomed {
        registry.kill_entity(entity);
    }
    Ok(buffers.doomed.len())
}

/// Kills every non-player entity that left the playfield by more than
/// [`DESPAWN_MARGIN`].
///
/// Returns the number of killed entities.
///
/// # Errors
///
/// Fails if [`Transform`] or [`PlayerControlled`] is unregistered.
pub fn despawn_offscreen(registry: &mut Registry, playfield: Playfield, buffers: &mut HitBuffers) -> EcsResult<usize> {
    buffers.clear();
    // Unregistered would make every entity look like a non-player.
    registry.components::<PlayerControlled>()?;
    for (entity, (transform,)) in registry.query::<(Transform,)>()? {
        if !registry.has_component::<PlayerControlled>(entity) && !playfield.contains(transform.position(), DESPAWN_MARGIN) {
            buffers.doomed.push(entity);
        }
    }
    for &entity in &buffers.doomed {
        registry.kill_entity(entity);
    }
    Ok(buffers.doomed.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> Registry {
        let mut r = Registry::new();
        r.register_component::<Transform>().unwrap();
        r.register_component::<Velocity>().unwrap();
        r.register_component::<InputState>().unwrap();
        r.register_component::<PlayerControlled>().unwrap();
        r.register_component::<Weapon>().unwrap();
        r.register_component::<Health>().unwrap();
        r.register_component::<HitBox>().unwrap();
        r.register_component::<Projectile>().unwrap();
        r
    }

    fn bullet(r: &mut Registry, x: f32, owner: Option<u8>) -> Entity {
        r.spawn_with((
            Transform::at(x, 100.0),
            HitBox::new(8.0, 8.0),
            Projectile {
                damage: PROJECTILE_DAMAGE,
                owner,
            },
        ))
        .unwrap()
    }

    fn target(r: &mut Registry, x: f32, hp: u16) -> Entity {
        r.spawn_with((Transform::at(x, 100.0), HitBox::new(48.0, 48.0), Health::full(hp)))
            .unwrap()
    }

    #[test]
    fn test_input_drives_velocity() {
        let mut r = registry();
        let ship = r
            .spawn_with((
                Velocity::default(),
                InputState {
                    right: true,
                    ..InputState::default()
                },
            ))
            .unwrap();

        apply_input(&mut r).unwrap();
        let v = r.component::<Velocity>(ship);
        assert!((v.vx - PLAYER_SPEED).abs() < 1e-3);
        assert!(v.vy.abs() < 1e-6);
    }

    #[test]
    fn test_integration_uses_acceleration() {
        let mut r = registry();
        let rock = r
            .spawn_with((
                Transform::at(0.0, 0.0),
                Velocity {
                    vx: 10.0,
                    vy: 0.0,
                    ax: 0.0,
                    ay: 20.0,
                },
            ))
            .unwrap();

        integrate(&mut r, 0.5).unwrap();
        let t = r.component::<Transform>(rock);
        assert!((t.x - 5.0).abs() < 1e-4);
        assert!((t.y - 5.0).abs() < 1e-4);
        assert!((r.component::<Velocity>(rock).vy - 10.0).abs() < 1e-4);
    }

    #[test]
    fn test_only_players_are_clamped() {
        let mut r = registry();
        let player = r
            .spawn_with((Transform::at(-50.0, 5000.0), PlayerControlled { player_id: 1 }))
            .unwrap();
        let enemy = r.spawn_with((Transform::at(-50.0, 5000.0),)).unwrap();

        clamp_players(&mut r, Playfield::new(800.0, 600.0)).unwrap();
        assert_eq!(r.component::<Transform>(player).position(), starfall_core::Vec2::new(0.0, 600.0));
        assert!((r.component::<Transform>(enemy).x + 50.0).abs() < 1e-6);
    }

    #[test]
    fn test_fire_on_press_edge_with_cooldown() {
        let mut r = registry();
        let ship = r
            .spawn_with((
                Weapon::with_interval(FIRE_INTERVAL),
                InputState {
                    shoot: true,
                    ..InputState::default()
                },
            ))
            .unwrap();
        let mut shooters = Vec::new();

        fire_weapons(&mut r, 0.1, &mut shooters).unwrap();
        assert_eq!(shooters, vec![ship]);

        // Held button: no auto-fire.
        fire_weapons(&mut r, 0.1, &mut shooters).unwrap();
        assert!(shooters.is_empty());

        // Released and pressed again inside the cooldown.
        r.get_component_mut::<InputState>(ship).unwrap().shoot = false;
        fire_weapons(&mut r, 0.01, &mut shooters).unwrap();
        r.get_component_mut::<InputState>(ship).unwrap().shoot = true;
        fire_weapons(&mut r, 0.01, &mut shooters).unwrap();
        assert!(shooters.is_empty());

        // Cooldown over.
        r.get_component_mut::<InputState>(ship).unwrap().shoot = false;
        fire_weapons(&mut r, 0.2, &mut shooters).unwrap();
        r.get_component_mut::<InputState>(ship).unwrap().shoot = true;
        fire_weapons(&mut r, 0.01, &mut shooters).unwrap();
        assert_eq!(shooters, vec![ship]);
    }

    #[test]
    fn test_hit_damages_and_spends_projectile() {
        let mut r = registry();
        let enemy = target(&mut r, 100.0, 30);
        let shot = bullet(&mut r, 110.0, Some(1));
        let miss = bullet(&mut r, 400.0, Some(1));
        let mut buffers = HitBuffers::new();

        assert_eq!(resolve_hits(&mut r, &mut buffers).unwrap(), 1);
        assert!(!r.is_alive(shot));
        assert!(r.is_alive(miss));
        assert_eq!(r.component::<Health>(enemy).current, 30 - PROJECTILE_DAMAGE);
    }

    #[test]
    fn test_depleted_target_is_killed() {
        let mut r = registry();
        let enemy = target(&mut r, 100.0, 15);
        let first = bullet(&mut r, 100.0, Some(1));
        let second = bullet(&mut r, 105.0, Some(2));
        let mut buffers = HitBuffers::new();

        assert_eq!(resolve_hits(&mut r, &mut buffers).unwrap(), 3);
        for gone in [enemy, first, second] {
            assert!(!r.is_alive(gone));
        }
    }

    #[test]
    fn test_no_friendly_fire() {
        let mut r = registry();
        let ship = target(&mut r, 100.0, 100);
        r.add_component(ship, PlayerControlled { player_id: 1 }).unwrap();
        let own = bullet(&mut r, 100.0, Some(1));
        let mut buffers = HitBuffers::new();

        assert_eq!(resolve_hits(&mut r, &mut buffers).unwrap(), 0);
        assert!(r.is_alive(own));
        assert_eq!(r.component::<Health>(ship).current, 100);

        let hostile = bullet(&mut r, 100.0, None);
        assert_eq!(resolve_hits(&mut r, &mut buffers).unwrap(), 1);
        assert!(!r.is_alive(hostile));
        assert_eq!(r.component::<Health>(ship).current, 100 - PROJECTILE_DAMAGE);
    }

    #[test]
    fn test_offscreen_non_players_are_despawned() {
        let mut r = registry();
        let field = Playfield::new(800.0, 600.0);
        let far_right = r.spawn_with((Transform::at(800.0 + DESPAWN_MARGIN + 1.0, 300.0),)).unwrap();
        let far_left = r.spawn_with((Transform::at(-DESPAWN_MARGIN - 1.0, 300.0),)).unwrap();
        let near_edge = r.spawn_with((Transform::at(-DESPAWN_MARGIN + 1.0, 300.0),)).unwrap();
        let player = r
            .spawn_with((Transform::at(-1000.0, 300.0), PlayerControlled { player_id: 1 }))
            .unwrap();
        let mut buffers = HitBuffers::new();

        assert_eq!(despawn_offscreen(&mut r, field, &mut buffers).unwrap(), 2);
        assert!(!r.is_alive(far_right));
        assert!(!r.is_alive(far_left));
        assert!(r.is_alive(near_edge));
        assert!(r.is_alive(player));
    }
}
