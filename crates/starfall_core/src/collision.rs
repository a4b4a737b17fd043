//! # AABB Collision
//!
//! Overlap tests between `(Transform, HitBox)` pairs.
//!
//! The world box of an entity is built as:
//!
//! ```text
//!   factor = |transform.scale|  if hitbox.scale_with_transform, else (1, 1)
//!   min    = position + (origin.offset(size) + hitbox.offset) * factor
//!   max    = min + size * factor
//! ```
//!
//! Touching edges do not count as a collision.

use crate::components::{HitBox, Transform};
use crate::math::Vec2;

/// Axis-aligned box in world space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    /// Top-left corner.
    pub min: Vec2,
    /// Bottom-right corner.
    pub max: Vec2,
}

impl Aabb {
    /// Computes the world box of an entity.
    #[must_use]
    pub fn from_parts(transform: &Transform, hitbox: &HitBox) -> Self {
        let factor = if hitbox.scale_with_transform {
            transform.scale.abs()
        } else {
            Vec2::ONE
        };
        let size = hitbox.size();
        let offset = (transform.origin.offset(size) + hitbox.offset).scaled(factor);
        let min = transform.position() + offset;
        Self {
            min,
            max: min + size.scaled(factor),
        }
    }

    /// Strict overlap test.
    #[inline]
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.min.x < other.max.x
            && self.max.x > other.min.x
            && self.min.y < other.max.y
            && self.max.y > other.min.y
    }
}

/// Returns true when the two entities' boxes overlap. Symmetric.
#[must_use]
pub fn is_colliding(
    transform_a: &Transform,
    hitbox_a: &HitBox,
    transform_b: &Transform,
    hitbox_b: &HitBox,
) -> bool {
    Aabb::from_parts(transform_a, hitbox_a).overlaps(&Aabb::from_parts(transform_b, hitbox_b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::Origin;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_overlap_then_separate() {
        let a = Transform::at(0.0, 0.0);
        let hb = HitBox::new(10.0, 10.0);

        assert!(is_colliding(&a, &hb, &Transform::at(5.0, 5.0), &hb));
        assert!(!is_colliding(&a, &hb, &Transform::at(20.0, 20.0), &hb));
    }

    #[test]
    fn test_touching_edges_do_not_collide() {
        let hb = HitBox::new(10.0, 10.0);
        let a = Transform::at(0.0, 0.0).with_origin(Origin::TopLeft);
        let b = Transform::at(10.0, 0.0).with_origin(Origin::TopLeft);
        assert!(!is_colliding(&a, &hb, &b, &hb));
    }

    #[test]
    fn test_scale_applies_only_when_requested() {
        let a = Transform::at(0.0, 0.0)
            .with_origin(Origin::TopLeft)
            .with_scale(Vec2::new(-3.0, 3.0));
        let b = Transform::at(25.0, 25.0).with_origin(Origin::TopLeft);
        let scaled = HitBox::new(10.0, 10.0);
        let fixed = HitBox {
            scale_with_transform: false,
            ..scaled
        };
        let small = HitBox::new(1.0, 1.0);

        assert!(is_colliding(&a, &scaled, &b, &small));
        assert!(!is_colliding(&a, &fixed, &b, &small));
    }

    #[test]
    fn test_hitbox_offset_shifts_box() {
        let hb = HitBox {
            offset: Vec2::new(100.0, 0.0),
            ..HitBox::new(10.0, 10.0)
        };
        let a = Transform::at(0.0, 0.0);
        let plain = HitBox::new(10.0, 10.0);
        assert!(!is_colliding(&a, &hb, &Transform::at(0.0, 0.0), &plain));
        assert!(is_colliding(&a, &hb, &Transform::at(100.0, 0.0), &plain));
    }

    #[test]
    fn test_collision_is_symmetric() {
        let mut rng = StdRng::seed_from_u64(0x5EED);
        let origins = [
            Origin::TopLeft,
            Origin::Center,
            Origin::BottomRight,
            Origin::Custom(Vec2::new(2.0, 7.0)),
        ];
        let random = |rng: &mut StdRng| {
            let t = Transform::at(rng.gen_range(-50.0..50.0), rng.gen_range(-50.0..50.0))
                .with_scale(Vec2::new(rng.gen_range(-2.0..2.0), rng.gen_range(-2.0..2.0)))
                .with_origin(origins[rng.gen_range(0..origins.len())]);
            let hb = HitBox {
                scale_with_transform: rng.gen(),
                ..HitBox::new(rng.gen_range(1.0..30.0), rng.gen_range(1.0..30.0))
            };
            (t, hb)
        };
        for _ in 0..2_000 {
            let (ta, ha) = random(&mut rng);
            let (tb, hb) = random(&mut rng);
            assert_eq!(
                is_colliding(&ta, &ha, &tb, &hb),
                is_colliding(&tb, &hb, &ta, &ha)
            );
        }
    }
}
