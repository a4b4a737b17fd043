//! # Gameplay Components
//!
//! Plain data attached to entities by the server and the client.
//!
//! | Component | Replicated | Notes |
//! |---|---|---|
//! | [`Transform`] | position | origin + hierarchy stay local |
//! | [`Velocity`] | `vx`, `vy` | acceleration stays local |
//! | [`Health`] | `current` | clamped to `u8` on the wire |
//! | [`EntityKind`] | yes | snapshot type tag |
//! | [`NetworkId`] | yes | stable across ticks |
//! | [`HitBox`] | no | AABB only |
//! | [`Weapon`] | no | server-side fire state |
//! | [`Projectile`] | no | damage + owner |

use crate::ecs::Entity;
use crate::math::Vec2;

/// Anchor of a transform relative to its hit box.
///
/// Anchors resolve to an offset proportional to the hit box size; a custom
/// origin is an absolute offset and overrides any anchor.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum Origin {
    /// Position is the top-left corner.
    TopLeft,
    /// Position is the middle of the top edge.
    TopCenter,
    /// Position is the top-right corner.
    TopRight,
    /// Position is the middle of the left edge.
    LeftCenter,
    /// Position is the center of the box.
    #[default]
    Center,
    /// Position is the middle of the right edge.
    RightCenter,
    /// Position is the bottom-left corner.
    BottomLeft,
    /// Position is the middle of the bottom edge.
    BottomCenter,
    /// Position is the bottom-right corner.
    BottomRight,
    /// Position sits at this point inside the box.
    Custom(Vec2),
}

impl Origin {
    /// Returns the anchor point inside a box of `size`, measured from its
    /// top-left corner.
    #[must_use]
    pub fn anchor(self, size: Vec2) -> Vec2 {
        let (w, h) = (size.x, size.y);
        match self {
            Self::TopLeft => Vec2::ZERO,
            Self::TopCenter => Vec2::new(w / 2.0, 0.0),
            Self::TopRight => Vec2::new(w, 0.0),
            Self::LeftCenter => Vec2::new(0.0, h / 2.0),
            Self::Center => Vec2::new(w / 2.0, h / 2.0),
            Self::RightCenter => Vec2::new(w, h / 2.0),
            Self::BottomLeft => Vec2::new(0.0, h),
            Self::BottomCenter => Vec2::new(w / 2.0, h),
            Self::BottomRight => Vec2::new(w, h),
            Self::Custom(point) => point,
        }
    }

    /// Offset from the transform position to the box's top-left corner.
    #[inline]
    #[must_use]
    pub fn offset(self, size: Vec2) -> Vec2 {
        -self.anchor(size)
    }
}

/// Position, orientation and hierarchy of an entity.
#[derive(Clone, Debug, PartialEq)]
pub struct Transform {
    /// World X position.
    pub x: f32,
    /// World Y position.
    pub y: f32,
    /// Rotation in degrees.
    pub rotation: f32,
    /// Non-uniform scale.
    pub scale: Vec2,
    /// Anchor of `(x, y)` relative to the hit box.
    pub origin: Origin,
    /// Parent entity, if any. Must reference a live entity.
    pub parent: Option<Entity>,
    /// Children whose `parent` points back at this entity.
    pub children: Vec<Entity>,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            rotation: 0.0,
            scale: Vec2::ONE,
            origin: Origin::Center,
            parent: None,
            children: Vec::new(),
        }
    }
}

impl Transform {
    /// Creates a transform at `(x, y)` with unit scale and centered origin.
    #[must_use]
    pub fn at(x: f32, y: f32) -> Self {
        Self {
            x,
            y,
            ..Self::default()
        }
    }

    /// Builder: sets the scale.
    #[must_use]
    pub fn with_scale(mut self, scale: Vec2) -> Self {
        self.scale = scale;
        self
    }

    /// Builder: sets the origin.
    #[must_use]
    pub fn with_origin(mut self, origin: Origin) -> Self {
        self.origin = origin;
        self
    }

    /// Position as a vector.
    #[inline]
    #[must_use]
    pub fn position(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }
}

/// Linear velocity and acceleration, in units per second.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Velocity {
    /// X velocity.
    pub vx: f32,
    /// Y velocity.
    pub vy: f32,
    /// X acceleration.
    pub ax: f32,
    /// Y acceleration.
    pub ay: f32,
}

impl Velocity {
    /// Creates a velocity with no acceleration.
    #[inline]
    #[must_use]
    pub const fn new(vx: f32, vy: f32) -> Self {
        Self {
            vx,
            vy,
            ax: 0.0,
            ay: 0.0,
        }
    }
}

/// Axis-aligned collision box.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HitBox {
    /// Box width.
    pub width: f32,
    /// Box height.
    pub height: f32,
    /// Extra offset applied after the origin offset.
    pub offset: Vec2,
    /// Multiply size and offsets by the transform's `|scale|`.
    pub scale_with_transform: bool,
}

impl HitBox {
    /// Creates a box that scales with its transform.
    #[inline]
    #[must_use]
    pub const fn new(width: f32, height: f32) -> Self {
        Self {
            width,
            height,
            offset: Vec2::ZERO,
            scale_with_transform: true,
        }
    }

    /// Unscaled size.
    #[inline]
    #[must_use]
    pub const fn size(&self) -> Vec2 {
        Vec2::new(self.width, self.height)
    }
}

/// Hit points.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Health {
    /// Current hit points.
    pub current: u16,
    /// Maximum hit points.
    pub max: u16,
}

impl Health {
    /// Full health.
    #[inline]
    #[must_use]
    pub const fn full(max: u16) -> Self {
        Self { current: max, max }
    }

    /// Removes `amount` hit points, stopping at zero.
    #[inline]
    pub fn damage(&mut self, amount: u16) {
        self.current = self.current.saturating_sub(amount);
    }

    /// True once no hit points are left.
    #[inline]
    #[must_use]
    pub const fn is_depleted(&self) -> bool {
        self.current == 0
    }

    /// Health value as sent on the wire.
    #[inline]
    #[must_use]
    pub fn wire_value(&self) -> u8 {
        u8::try_from(self.current).unwrap_or(u8::MAX)
    }
}

/// Type tag carried in snapshot records.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EntityKind {
    /// A player ship.
    Player = 0,
    /// A hostile.
    Enemy = 1,
    /// A bullet or missile.
    Projectile = 2,
}

impl EntityKind {
    /// Parses a wire tag.
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Player),
            1 => Some(Self::Enemy),
            2 => Some(Self::Projectile),
            _ => None,
        }
    }
}

/// Identifier shared by server and clients for a replicated entity.
///
/// Independent of the local [`Entity`] so that index recycling on either side
/// never confuses the other.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NetworkId(pub u32);

/// Marks an entity as driven by a connected player.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlayerControlled {
    /// Owning player (1-based).
    pub player_id: u8,
}

/// Directional and fire buttons held by a player this tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct InputState {
    /// Move up.
    pub up: bool,
    /// Move down.
    pub down: bool,
    /// Move left.
    pub left: bool,
    /// Move right.
    pub right: bool,
    /// Fire.
    pub shoot: bool,
}

impl InputState {
    /// Unit direction implied by the held keys (opposing keys cancel).
    #[must_use]
    pub fn direction(&self) -> Vec2 {
        let axis = |neg: bool, pos: bool| f32::from(u8::from(pos)) - f32::from(u8::from(neg));
        let dir = Vec2::new(axis(self.left, self.right), axis(self.up, self.down));
        let len = dir.length();
        if len > 0.0 {
            dir * (1.0 / len)
        } else {
            dir
        }
    }
}

/// Fire state of a player ship.
///
/// Shots trigger on the press edge of the fire button and are rate limited
/// by `cooldown`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Weapon {
    /// Seconds until the next shot is allowed.
    pub cooldown: f32,
    /// Cooldown restarted by every shot, in seconds.
    pub cooldown_max: f32,
    /// Fire button state seen on the previous tick.
    pub was_firing: bool,
}

impl Weapon {
    /// A ready weapon with the given fire interval.
    #[inline]
    #[must_use]
    pub const fn with_interval(cooldown_max: f32) -> Self {
        Self {
            cooldown: 0.0,
            cooldown_max,
            was_firing: false,
        }
    }
}

/// Damage carried by a bullet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Projectile {
    /// Hit points removed from whatever it hits.
    pub damage: u16,
    /// Player that fired it, `None` for hostile fire.
    pub owner: Option<u8>,
}

impl Projectile {
    /// True for shots fired by a player.
    #[inline]
    #[must_use]
    pub const fn is_friendly(&self) -> bool {
        self.owner.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_offsets() {
        let size = Vec2::new(10.0, 20.0);
        assert_eq!(Origin::TopLeft.offset(size), Vec2::new(0.0, 0.0));
        assert_eq!(Origin::Center.offset(size), Vec2::new(-5.0, -10.0));
        assert_eq!(Origin::BottomRight.offset(size), Vec2::new(-10.0, -20.0));
        assert_eq!(Origin::RightCenter.offset(size), Vec2::new(-10.0, -10.0));
        assert_eq!(
            Origin::Custom(Vec2::new(3.0, 4.0)).offset(size),
            Vec2::new(-3.0, -4.0)
        );
    }

    #[test]
    fn test_transform_defaults() {
        let t = Transform::at(1.0, 2.0);
        assert_eq!(t.scale, Vec2::ONE);
        assert_eq!(t.origin, Origin::Center);
        assert!(t.parent.is_none());
        assert!(t.children.is_empty());
    }

    #[test]
    fn test_input_direction() {
        let idle = InputState::default();
        assert_eq!(idle.direction(), Vec2::ZERO);

        let up = InputState {
            up: true,
            ..InputState::default()
        };
        assert_eq!(up.direction(), Vec2::new(0.0, -1.0));

        let cancelled = InputState {
            left: true,
            right: true,
            ..InputState::default()
        };
        assert_eq!(cancelled.direction(), Vec2::ZERO);

        let diagonal = InputState {
            down: true,
            right: true,
            ..InputState::default()
        };
        assert!((diagonal.direction().length() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_health_wire_value_saturates() {
        assert_eq!(Health::full(100).wire_value(), 100);
        assert_eq!(Health::full(1000).wire_value(), 255);
    }

    #[test]
    fn test_entity_kind_tags() {
        for kind in [EntityKind::Player, EntityKind::Enemy, EntityKind::Projectile] {
            assert_eq!(EntityKind::from_u8(kind as u8), Some(kind));
        }
        assert_eq!(EntityKind::from_u8(3), None);
    }

    #[test]
    fn test_damage_stops_at_zero() {
        let mut health = Health::full(30);
        health.damage(10);
        assert_eq!(health.current, 20);
        assert!(!health.is_depleted());
        health.damage(500);
        assert_eq!(health.current, 0);
        assert!(health.is_depleted());
    }

    #[test]
    fn test_weapon_starts_ready() {
        let weapon = Weapon::with_interval(0.25);
        assert!(weapon.cooldown <= 0.0);
        assert!(!weapon.was_firing);
        assert!(Projectile { damage: 10, owner: Some(1) }.is_friendly());
        assert!(!Projectile { damage: 10, owner: None }.is_friendly());
    }
}
