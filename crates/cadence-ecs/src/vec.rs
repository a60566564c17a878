//! Fixed-point vector and quaternion primitives.
//!
//! Direct compositions of the Q16.16 operations in [`crate::fixed`]. The
//! only branch anywhere in this module is the zero-magnitude check in the
//! normalize functions, which return the zero value rather than divide by
//! zero.

use std::fmt;
use std::ops::{Add, Neg, Sub};

use serde::{Deserialize, Serialize};

use crate::fixed::{
    fixed_clamp, fixed_div, fixed_mul, fixed_sqrt, to_float, Fixed, FIXED_HALF, FIXED_ONE,
    FIXED_SHIFT,
};

// ---------------------------------------------------------------------------
// FixedVec2
// ---------------------------------------------------------------------------

/// 2D vector with Q16.16 components.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct FixedVec2 {
    pub x: Fixed,
    pub y: Fixed,
}

impl FixedVec2 {
    pub const ZERO: Self = Self { x: 0, y: 0 };
    pub const RIGHT: Self = Self { x: FIXED_ONE, y: 0 };
    pub const UP: Self = Self { x: 0, y: FIXED_ONE };

    #[inline]
    pub const fn new(x: Fixed, y: Fixed) -> Self {
        Self { x, y }
    }

    #[inline]
    pub const fn from_ints(x: i32, y: i32) -> Self {
        Self {
            x: x << FIXED_SHIFT,
            y: y << FIXED_SHIFT,
        }
    }

    #[inline]
    pub fn add(self, other: Self) -> Self {
        Self {
            x: self.x.wrapping_add(other.x),
            y: self.y.wrapping_add(other.y),
        }
    }

    #[inline]
    pub fn sub(self, other: Self) -> Self {
        Self {
            x: self.x.wrapping_sub(other.x),
            y: self.y.wrapping_sub(other.y),
        }
    }

    #[inline]
    pub fn scale(self, scalar: Fixed) -> Self {
        Self {
            x: fixed_mul(self.x, scalar),
            y: fixed_mul(self.y, scalar),
        }
    }

    #[inline]
    pub fn div_scalar(self, scalar: Fixed) -> Self {
        Self {
            x: fixed_div(self.x, scalar),
            y: fixed_div(self.y, scalar),
        }
    }

    /// Squared length. Prefer this over [`length`](Self::length) for
    /// comparisons; it skips the sqrt.
    #[inline]
    pub fn length_squared(self) -> Fixed {
        fixed_mul(self.x, self.x).wrapping_add(fixed_mul(self.y, self.y))
    }

    #[inline]
    pub fn length(self) -> Fixed {
        fixed_sqrt(self.length_squared())
    }

    #[inline]
    pub fn distance_squared(self, other: Self) -> Fixed {
        self.sub(other).length_squared()
    }

    #[inline]
    pub fn distance(self, other: Self) -> Fixed {
        fixed_sqrt(self.distance_squared(other))
    }

    /// Unit-length copy, or [`ZERO`](Self::ZERO) when the length is zero.
    #[inline]
    pub fn normalize(self) -> Self {
        let len = self.length();
        if len == 0 {
            return Self::ZERO;
        }
        self.div_scalar(len)
    }

    #[inline]
    pub fn dot(self, other: Self) -> Fixed {
        fixed_mul(self.x, other.x).wrapping_add(fixed_mul(self.y, other.y))
    }

    /// Scalar 2D cross product (z of the 3D cross).
    #[inline]
    pub fn cross(self, other: Self) -> Fixed {
        fixed_mul(self.x, other.y).wrapping_sub(fixed_mul(self.y, other.x))
    }

    /// Rotate 90 degrees counter-clockwise.
    #[inline]
    pub fn perpendicular(self) -> Self {
        Self {
            x: self.y.wrapping_neg(),
            y: self.x,
        }
    }

    #[inline]
    pub fn lerp(self, other: Self, t: Fixed) -> Self {
        self.add(other.sub(self).scale(t))
    }

    #[inline]
    pub fn clamp(self, min: Fixed, max: Fixed) -> Self {
        Self {
            x: fixed_clamp(self.x, min, max),
            y: fixed_clamp(self.y, min, max),
        }
    }

    /// Float pair for rendering.
    #[inline]
    pub fn to_floats(self) -> (f32, f32) {
        (to_float(self.x), to_float(self.y))
    }
}

impl Add for FixedVec2 {
    type Output = Self;
    #[inline]
    fn add(self, rhs: Self) -> Self {
        FixedVec2::add(self, rhs)
    }
}

impl Sub for FixedVec2 {
    type Output = Self;
    #[inline]
    fn sub(self, rhs: Self) -> Self {
        FixedVec2::sub(self, rhs)
    }
}

impl Neg for FixedVec2 {
    type Output = Self;
    #[inline]
    fn neg(self) -> Self {
        Self {
            x: self.x.wrapping_neg(),
            y: self.y.wrapping_neg(),
        }
    }
}

impl fmt::Debug for FixedVec2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (x, y) = self.to_floats();
        write!(f, "Vec2({x:.3}, {y:.3})")
    }
}

// ---------------------------------------------------------------------------
// FixedVec3
// ---------------------------------------------------------------------------

/// 3D vector with Q16.16 components.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct FixedVec3 {
    pub x: Fixed,
    pub y: Fixed,
    pub z: Fixed,
}

impl FixedVec3 {
    pub const ZERO: Self = Self { x: 0, y: 0, z: 0 };

    #[inline]
    pub const fn new(x: Fixed, y: Fixed, z: Fixed) -> Self {
        Self { x, y, z }
    }

    #[inline]
    pub fn add(self, other: Self) -> Self {
        Self {
            x: self.x.wrapping_add(other.x),
            y: self.y.wrapping_add(other.y),
            z: self.z.wrapping_add(other.z),
        }
    }

    #[inline]
    pub fn sub(self, other: Self) -> Self {
        Self {
            x: self.x.wrapping_sub(other.x),
            y: self.y.wrapping_sub(other.y),
            z: self.z.wrapping_sub(other.z),
        }
    }

    #[inline]
    pub fn scale(self, scalar: Fixed) -> Self {
        Self {
            x: fixed_mul(self.x, scalar),
            y: fixed_mul(self.y, scalar),
            z: fixed_mul(self.z, scalar),
        }
    }

    #[inline]
    pub fn length_squared(self) -> Fixed {
        fixed_mul(self.x, self.x)
            .wrapping_add(fixed_mul(self.y, self.y))
            .wrapping_add(fixed_mul(self.z, self.z))
    }

    #[inline]
    pub fn length(self) -> Fixed {
        fixed_sqrt(self.length_squared())
    }

    #[inline]
    pub fn normalize(self) -> Self {
        let len = self.length();
        if len == 0 {
            return Self::ZERO;
        }
        Self {
            x: fixed_div(self.x, len),
            y: fixed_div(self.y, len),
            z: fixed_div(self.z, len),
        }
    }

    #[inline]
    pub fn dot(self, other: Self) -> Fixed {
        fixed_mul(self.x, other.x)
            .wrapping_add(fixed_mul(self.y, other.y))
            .wrapping_add(fixed_mul(self.z, other.z))
    }

    #[inline]
    pub fn cross(self, other: Self) -> Self {
        Self {
            x: fixed_mul(self.y, other.z).wrapping_sub(fixed_mul(self.z, other.y)),
            y: fixed_mul(self.z, other.x).wrapping_sub(fixed_mul(self.x, other.z)),
            z: fixed_mul(self.x, other.y).wrapping_sub(fixed_mul(self.y, other.x)),
        }
    }

    #[inline]
    pub fn lerp(self, other: Self, t: Fixed) -> Self {
        self.add(other.sub(self).scale(t))
    }
}

impl Add for FixedVec3 {
    type Output = Self;
    #[inline]
    fn add(self, rhs: Self) -> Self {
        FixedVec3::add(self, rhs)
    }
}

impl Sub for FixedVec3 {
    type Output = Self;
    #[inline]
    fn sub(self, rhs: Self) -> Self {
        FixedVec3::sub(self, rhs)
    }
}

impl Neg for FixedVec3 {
    type Output = Self;
    #[inline]
    fn neg(self) -> Self {
        Self {
            x: self.x.wrapping_neg(),
            y: self.y.wrapping_neg(),
            z: self.z.wrapping_neg(),
        }
    }
}

impl fmt::Debug for FixedVec3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Vec3({:.3}, {:.3}, {:.3})",
            to_float(self.x),
            to_float(self.y),
            to_float(self.z)
        )
    }
}

// ---------------------------------------------------------------------------
// FixedQuat
// ---------------------------------------------------------------------------

/// Quaternion with Q16.16 components, used by 3D-facing collaborators.
///
/// Angles follow the crate's turns convention (`FIXED_ONE` = one full
/// revolution).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FixedQuat {
    pub x: Fixed,
    pub y: Fixed,
    pub z: Fixed,
    pub w: Fixed,
}

impl FixedQuat {
    pub const IDENTITY: Self = Self {
        x: 0,
        y: 0,
        z: 0,
        w: FIXED_ONE,
    };

    #[inline]
    pub const fn new(x: Fixed, y: Fixed, z: Fixed, w: Fixed) -> Self {
        Self { x, y, z, w }
    }

    /// Rotation of `angle` turns around `axis` (need not be normalized).
    pub fn from_axis_angle(axis: FixedVec3, angle: Fixed) -> Self {
        let axis = axis.normalize();
        if axis == FixedVec3::ZERO {
            return Self::IDENTITY;
        }
        let half = fixed_mul(angle, FIXED_HALF);
        let s = crate::fixed::fixed_sin(half);
        let c = crate::fixed::fixed_cos(half);
        Self {
            x: fixed_mul(axis.x, s),
            y: fixed_mul(axis.y, s),
            z: fixed_mul(axis.z, s),
            w: c,
        }
    }

    /// Hamilton product `self * other`.
    pub fn mul(self, o: Self) -> Self {
        Self {
            x: fixed_mul(self.w, o.x)
                .wrapping_add(fixed_mul(self.x, o.w))
                .wrapping_add(fixed_mul(self.y, o.z))
                .wrapping_sub(fixed_mul(self.z, o.y)),
            y: fixed_mul(self.w, o.y)
                .wrapping_sub(fixed_mul(self.x, o.z))
                .wrapping_add(fixed_mul(self.y, o.w))
                .wrapping_add(fixed_mul(self.z, o.x)),
            z: fixed_mul(self.w, o.z)
                .wrapping_add(fixed_mul(self.x, o.y))
                .wrapping_sub(fixed_mul(self.y, o.x))
                .wrapping_add(fixed_mul(self.z, o.w)),
            w: fixed_mul(self.w, o.w)
                .wrapping_sub(fixed_mul(self.x, o.x))
                .wrapping_sub(fixed_mul(self.y, o.y))
                .wrapping_sub(fixed_mul(self.z, o.z)),
        }
    }

    #[inline]
    pub fn conjugate(self) -> Self {
        Self {
            x: self.x.wrapping_neg(),
            y: self.y.wrapping_neg(),
            z: self.z.wrapping_neg(),
            w: self.w,
        }
    }

    pub fn length_squared(self) -> Fixed {
        fixed_mul(self.x, self.x)
            .wrapping_add(fixed_mul(self.y, self.y))
            .wrapping_add(fixed_mul(self.z, self.z))
            .wrapping_add(fixed_mul(self.w, self.w))
    }

    /// Unit-length copy, or identity when the length is zero.
    pub fn normalize(self) -> Self {
        let len = fixed_sqrt(self.length_squared());
        if len == 0 {
            return Self::IDENTITY;
        }
        Self {
            x: fixed_div(self.x, len),
            y: fixed_div(self.y, len),
            z: fixed_div(self.z, len),
            w: fixed_div(self.w, len),
        }
    }

    /// Rotate a vector: `q * v * q^-1` for unit quaternions.
    pub fn rotate(self, v: FixedVec3) -> FixedVec3 {
        // t = 2 * (q.xyz x v); v' = v + w*t + q.xyz x t
        let qv = FixedVec3::new(self.x, self.y, self.z);
        let t = qv.cross(v).scale(2 << FIXED_SHIFT);
        v.add(t.scale(self.w)).add(qv.cross(t))
    }
}

impl Default for FixedQuat {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl fmt::Debug for FixedQuat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Quat({:.3}, {:.3}, {:.3}, {:.3})",
            to_float(self.x),
            to_float(self.y),
            to_float(self.z),
            to_float(self.w)
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed::to_fixed;

    #[test]
    fn vec2_add_sub() {
        let a = FixedVec2::new(to_fixed(3.0), to_fixed(4.0));
        let b = FixedVec2::new(to_fixed(1.0), to_fixed(2.0));
        assert_eq!((a + b).x, to_fixed(4.0));
        assert_eq!((a - b).y, to_fixed(2.0));
    }

    #[test]
    fn vec2_length_345() {
        let v = FixedVec2::new(to_fixed(3.0), to_fixed(4.0));
        assert_eq!(v.length_squared(), to_fixed(25.0));
        assert!((v.length() - to_fixed(5.0)).abs() <= 4);
    }

    #[test]
    fn vec2_normalize() {
        let v = FixedVec2::new(to_fixed(3.0), to_fixed(4.0)).normalize();
        assert!((v.length() - FIXED_ONE).abs() <= 200);
        assert_eq!(FixedVec2::ZERO.normalize(), FixedVec2::ZERO);
    }

    #[test]
    fn vec2_dot_cross() {
        let a = FixedVec2::new(to_fixed(2.0), to_fixed(3.0));
        let b = FixedVec2::new(to_fixed(4.0), to_fixed(5.0));
        assert_eq!(a.dot(b), to_fixed(23.0));
        assert_eq!(a.cross(b), to_fixed(-2.0));
        assert_eq!(FixedVec2::RIGHT.cross(FixedVec2::UP), FIXED_ONE);
    }

    #[test]
    fn vec2_perpendicular_is_ccw() {
        assert_eq!(FixedVec2::RIGHT.perpendicular(), FixedVec2::UP);
    }

    #[test]
    fn vec3_cross_handedness() {
        let x = FixedVec3::new(FIXED_ONE, 0, 0);
        let y = FixedVec3::new(0, FIXED_ONE, 0);
        assert_eq!(x.cross(y), FixedVec3::new(0, 0, FIXED_ONE));
    }

    #[test]
    fn vec3_normalize_zero() {
        assert_eq!(FixedVec3::ZERO.normalize(), FixedVec3::ZERO);
    }

    #[test]
    fn quat_identity_rotation() {
        let v = FixedVec3::new(to_fixed(1.0), to_fixed(2.0), to_fixed(3.0));
        assert_eq!(FixedQuat::IDENTITY.rotate(v), v);
    }

    #[test]
    fn quat_quarter_turn_about_z() {
        let q = FixedQuat::from_axis_angle(FixedVec3::new(0, 0, FIXED_ONE), FIXED_ONE / 4);
        let v = FixedVec3::new(FIXED_ONE, 0, 0);
        let r = q.rotate(v);
        // x axis rotates onto y axis (within fixed-point tolerance).
        assert!(r.x.abs() <= 200, "x: {}", r.x);
        assert!((r.y - FIXED_ONE).abs() <= 200, "y: {}", r.y);
        assert!(r.z.abs() <= 200);
    }

    #[test]
    fn quat_mul_identity() {
        let q = FixedQuat::from_axis_angle(FixedVec3::new(0, FIXED_ONE, 0), FIXED_ONE / 8);
        let r = q.mul(FixedQuat::IDENTITY);
        assert_eq!(r, q);
    }

    #[test]
    fn quat_normalize_zero_gives_identity() {
        let q = FixedQuat::new(0, 0, 0, 0);
        assert_eq!(q.normalize(), FixedQuat::IDENTITY);
    }
}
