//! Rigid-body data for the 2D pipeline.
//!
//! A [`Body`] is the per-tick working view of one entity's physics state,
//! loaded from the ECS columns at the top of the physics step and written
//! back at the end. The pipeline itself keeps no state between ticks --
//! everything that must survive (including the sleep timer) lives in
//! synchronized component data, which is what lets rollback restore
//! reproduce physics bit-exactly.

use cadence_ecs::entity::EntityId;
use cadence_ecs::fixed::{fixed_mul, Fixed};
use cadence_ecs::vec::FixedVec2;

// ---------------------------------------------------------------------------
// Shape and body type
// ---------------------------------------------------------------------------

/// Collider shape. Boxes are axis-aligned; there is no rotated-box support
/// in the 2D pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape2D {
    Circle { radius: Fixed },
    Box { half_w: Fixed, half_h: Fixed },
}

impl Shape2D {
    /// Wire tag stored in the `shape` column.
    pub fn tag(self) -> u8 {
        match self {
            Shape2D::Circle { .. } => 0,
            Shape2D::Box { .. } => 1,
        }
    }
}

/// How the solver treats a body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyType {
    /// Immovable, infinite mass.
    Static,
    /// Moved by game logic; collides but receives no impulses.
    Kinematic,
    /// Fully simulated.
    Dynamic,
}

impl BodyType {
    pub fn tag(self) -> u8 {
        match self {
            BodyType::Static => 0,
            BodyType::Kinematic => 1,
            BodyType::Dynamic => 2,
        }
    }

    pub fn from_tag(tag: u8) -> Self {
        match tag {
            1 => BodyType::Kinematic,
            2 => BodyType::Dynamic,
            _ => BodyType::Static,
        }
    }
}

// ---------------------------------------------------------------------------
// Body
// ---------------------------------------------------------------------------

/// Working state of one rigid body for the duration of a physics step.
#[derive(Debug, Clone)]
pub struct Body {
    /// Owning entity.
    pub owner: EntityId,
    /// Stable label: iteration, pairing, and handler ordering are pure
    /// functions of the set of labels, never of body slot indices.
    pub label: String,
    /// Owning entity's type name, the key for collision handlers.
    pub type_name: String,
    pub shape: Shape2D,
    pub body_type: BodyType,
    pub position: FixedVec2,
    pub angle: Fixed,
    pub velocity: FixedVec2,
    pub angular_velocity: Fixed,
    pub inv_mass: Fixed,
    pub inv_inertia: Fixed,
    pub restitution: Fixed,
    pub friction: Fixed,
    /// Collision filter: this body's layer bits.
    pub layer: u8,
    /// Collision filter: layers this body collides with.
    pub mask: u8,
    pub sensor: bool,
    pub lock_rotation: bool,
    pub sleeping: bool,
    pub sleep_timer: u8,
    pub linear_damping: Fixed,
    pub angular_damping: Fixed,
}

impl Body {
    /// Whether the solver may move this body.
    pub fn is_dynamic(&self) -> bool {
        self.body_type == BodyType::Dynamic
    }

    /// Effective inverse mass: zero unless dynamic.
    pub fn effective_inv_mass(&self) -> Fixed {
        if self.is_dynamic() {
            self.inv_mass
        } else {
            0
        }
    }

    /// Layer/mask gate: both directions must agree.
    pub fn can_collide_with(&self, other: &Body) -> bool {
        (self.layer & other.mask) != 0 && (other.layer & self.mask) != 0
    }

    /// World-space AABB as (min, max).
    pub fn aabb(&self) -> (FixedVec2, FixedVec2) {
        let (hx, hy) = match self.shape {
            Shape2D::Circle { radius } => (radius, radius),
            Shape2D::Box { half_w, half_h } => (half_w, half_h),
        };
        (
            FixedVec2::new(
                self.position.x.wrapping_sub(hx),
                self.position.y.wrapping_sub(hy),
            ),
            FixedVec2::new(
                self.position.x.wrapping_add(hx),
                self.position.y.wrapping_add(hy),
            ),
        )
    }

    /// The shape's bounding diameter, for broad-phase cell sizing checks.
    pub fn extent(&self) -> Fixed {
        match self.shape {
            Shape2D::Circle { radius } => radius.wrapping_add(radius),
            Shape2D::Box { half_w, half_h } => {
                let w = half_w.wrapping_add(half_w);
                let h = half_h.wrapping_add(half_h);
                if w > h {
                    w
                } else {
                    h
                }
            }
        }
    }

    /// Clear sleep state (any impulse or velocity change does this).
    pub fn wake(&mut self) {
        self.sleeping = false;
        self.sleep_timer = 0;
    }

    /// Squared speed, for clamps and sleep checks.
    pub fn speed_squared(&self) -> Fixed {
        self.velocity.length_squared()
    }

    /// Squared angular speed.
    pub fn spin_squared(&self) -> Fixed {
        fixed_mul(self.angular_velocity, self.angular_velocity)
    }
}

/// AABB overlap gate used before precise narrow-phase tests.
pub fn aabb_overlap(a: &Body, b: &Body) -> bool {
    let (amin, amax) = a.aabb();
    let (bmin, bmax) = b.aabb();
    amin.x <= bmax.x && amax.x >= bmin.x && amin.y <= bmax.y && amax.y >= bmin.y
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_ecs::fixed::to_fixed;

    fn circle_at(x: f32, y: f32, r: f32) -> Body {
        Body {
            owner: EntityId::new(0, 0),
            label: "test".to_owned(),
            type_name: "test".to_owned(),
            shape: Shape2D::Circle {
                radius: to_fixed(r),
            },
            body_type: BodyType::Dynamic,
            position: FixedVec2::new(to_fixed(x), to_fixed(y)),
            angle: 0,
            velocity: FixedVec2::ZERO,
            angular_velocity: 0,
            inv_mass: to_fixed(1.0),
            inv_inertia: to_fixed(1.0),
            restitution: 0,
            friction: 0,
            layer: 1,
            mask: 0xFF,
            sensor: false,
            lock_rotation: false,
            sleeping: false,
            sleep_timer: 0,
            linear_damping: 0,
            angular_damping: 0,
        }
    }

    #[test]
    fn aabb_bounds_circle() {
        let b = circle_at(10.0, -5.0, 2.0);
        let (min, max) = b.aabb();
        assert_eq!(min.x, to_fixed(8.0));
        assert_eq!(max.y, to_fixed(-3.0));
    }

    #[test]
    fn aabb_overlap_gate() {
        let a = circle_at(0.0, 0.0, 1.0);
        let b = circle_at(1.5, 0.0, 1.0);
        let c = circle_at(5.0, 0.0, 1.0);
        assert!(aabb_overlap(&a, &b));
        assert!(!aabb_overlap(&a, &c));
    }

    #[test]
    fn layer_mask_must_agree_both_ways() {
        let mut a = circle_at(0.0, 0.0, 1.0);
        let mut b = circle_at(0.0, 0.0, 1.0);
        assert!(a.can_collide_with(&b));
        a.layer = 0b01;
        b.mask = 0b10;
        assert!(!a.can_collide_with(&b));
        b.mask = 0b01;
        assert!(a.can_collide_with(&b));
        b.layer = 0b10;
        a.mask = 0b01;
        assert!(!a.can_collide_with(&b));
    }

    #[test]
    fn effective_inv_mass_zero_unless_dynamic() {
        let mut b = circle_at(0.0, 0.0, 1.0);
        assert_eq!(b.effective_inv_mass(), to_fixed(1.0));
        b.body_type = BodyType::Kinematic;
        assert_eq!(b.effective_inv_mass(), 0);
        b.body_type = BodyType::Static;
        assert_eq!(b.effective_inv_mass(), 0);
    }

    #[test]
    fn body_type_tags_round_trip() {
        for ty in [BodyType::Static, BodyType::Kinematic, BodyType::Dynamic] {
            assert_eq!(BodyType::from_tag(ty.tag()), ty);
        }
    }
}
