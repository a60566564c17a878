//! Q16.16 fixed-point arithmetic.
//!
//! Every number the simulation touches is a `Fixed`: a 32-bit signed
//! integer with 16 fractional bits (1.0 = 65536). All operations here are
//! pure integer functions of their input bits -- no host floating point is
//! consulted anywhere on a simulation path, which is what makes two peers
//! on different hardware agree byte-for-byte.
//!
//! Floats appear in exactly two places: [`to_fixed`] at configuration /
//! spawn-prop boundaries, and [`to_float`] for rendering. Neither is legal
//! inside a tick.
//!
//! # Angles
//!
//! Trigonometry works in *turns*, not radians: `FIXED_ONE` is one full
//! revolution. This makes angle wrapping a single mask (`angle & 0xFFFF`)
//! and the sine-table index derivation a shift instead of a division by
//! 2*pi.

use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Sub};

/// Q16.16 fixed-point number stored as `i32`.
pub type Fixed = i32;

/// Number of fractional bits.
pub const FIXED_SHIFT: i32 = 16;

/// 1.0 in fixed-point.
pub const FIXED_ONE: Fixed = 1 << FIXED_SHIFT;

/// 0.5 in fixed-point.
pub const FIXED_HALF: Fixed = FIXED_ONE >> 1;

/// Simulation timestep: 1/60 second = round(65536 / 60).
pub const FIXED_DT: Fixed = 1092;

/// A quarter turn (90 degrees) in the turns angle convention.
pub const QUARTER_TURN: Fixed = FIXED_ONE >> 2;

/// A half turn (180 degrees).
pub const HALF_TURN: Fixed = FIXED_ONE >> 1;

// ---------------------------------------------------------------------------
// Conversions
// ---------------------------------------------------------------------------

/// Convert a float to fixed-point, rounding half to even.
///
/// This is the single conversion point for the whole engine: component
/// defaults, spawn props, and configuration all pass through here so every
/// peer derives the same bits from the same nominal value.
#[inline]
pub fn to_fixed(f: f32) -> Fixed {
    (f * FIXED_ONE as f32).round_ties_even() as Fixed
}

/// Convert fixed-point to a float. Render-side only; the result must never
/// flow back into simulation state.
#[inline]
pub fn to_float(x: Fixed) -> f32 {
    x as f32 / FIXED_ONE as f32
}

// ---------------------------------------------------------------------------
// Core arithmetic
// ---------------------------------------------------------------------------

/// Fixed-point multiply via a widened 64-bit intermediate.
///
/// The narrowing back to 32 bits wraps with two's-complement semantics;
/// overflow is defined, not checked.
#[inline]
pub fn fixed_mul(a: Fixed, b: Fixed) -> Fixed {
    (((a as i64) * (b as i64)) >> FIXED_SHIFT) as Fixed
}

/// Fixed-point divide via a widened 64-bit intermediate.
///
/// Division by zero does not panic: it saturates to `i32::MAX` carrying the
/// sign of `a`. Raycast-style callers that divide by near-zero direction
/// components rely on getting a huge-but-finite answer here.
#[inline]
pub fn fixed_div(a: Fixed, b: Fixed) -> Fixed {
    if b == 0 {
        return if a < 0 { -i32::MAX } else { i32::MAX };
    }
    (((a as i64) << FIXED_SHIFT) / b as i64) as Fixed
}

/// Absolute value (wrapping on `i32::MIN`).
#[inline]
pub fn fixed_abs(x: Fixed) -> Fixed {
    if x < 0 {
        x.wrapping_neg()
    } else {
        x
    }
}

#[inline]
pub fn fixed_min(a: Fixed, b: Fixed) -> Fixed {
    if a < b {
        a
    } else {
        b
    }
}

#[inline]
pub fn fixed_max(a: Fixed, b: Fixed) -> Fixed {
    if a > b {
        a
    } else {
        b
    }
}

#[inline]
pub fn fixed_clamp(x: Fixed, min: Fixed, max: Fixed) -> Fixed {
    fixed_max(min, fixed_min(max, x))
}

/// Linear interpolation `a + (b - a) * t` with `t` in fixed-point.
#[inline]
pub fn fixed_lerp(a: Fixed, b: Fixed, t: Fixed) -> Fixed {
    a.wrapping_add(fixed_mul(b.wrapping_sub(a), t))
}

/// Floor to the nearest whole unit, as a plain integer.
///
/// Arithmetic shift rounds toward negative infinity, which is exactly the
/// floor the spatial hash wants for negative coordinates.
#[inline]
pub fn fixed_floor_to_int(x: Fixed) -> i32 {
    x >> FIXED_SHIFT
}

/// Square root by Newton-Raphson on the raw integers.
///
/// Seeded with `(x >> 1) | 1` and run for exactly 8 iterations so the
/// result is a pure function of the input bits. Non-positive inputs
/// return 0.
pub fn fixed_sqrt(x: Fixed) -> Fixed {
    if x <= 0 {
        return 0;
    }
    let mut guess = (x >> 1) | 1;
    for _ in 0..8 {
        let quotient = fixed_div(x, guess);
        guess = (guess.wrapping_add(quotient)) >> 1;
        if guess == 0 {
            guess = 1;
        }
    }
    guess
}

// ---------------------------------------------------------------------------
// Trigonometry
// ---------------------------------------------------------------------------
//
// The quarter-wave sine table is generated at compile time by the standard
// three-term recurrence
//
//     s[k+1] = 2 * cos(step) * s[k] - s[k-1]
//
// evaluated in Q30 with i64 intermediates, where `step` is 1/4096 of a
// turn. The two Q30 seed constants below *define* the table: any
// independent implementation using the same constants and the same
// truncating shift reproduces the same 1024 bytes-for-bytes entries.

/// cos(2*pi/4096) in Q30.
const STEP_COS_Q30: i64 = 1_073_740_561;

/// sin(2*pi/4096) in Q30.
const STEP_SIN_Q30: i64 = 1_647_099;

/// Entries of the table: sin at k/4096 turn for k in 0..1024, in Q16.16.
const SIN_TABLE_LEN: usize = 1024;

const fn make_sin_table() -> [i32; SIN_TABLE_LEN] {
    let mut table = [0i32; SIN_TABLE_LEN];
    let mut prev: i64 = 0; // s[0] = sin(0)
    let mut cur: i64 = STEP_SIN_Q30; // s[1]
    table[0] = 0;
    let mut k = 1;
    while k < SIN_TABLE_LEN {
        // Round Q30 down to Q16.
        table[k] = ((cur + (1 << 13)) >> 14) as i32;
        let next = ((2 * STEP_COS_Q30 * cur) >> 30) - prev;
        prev = cur;
        cur = next;
        k += 1;
    }
    table
}

static SIN_TABLE: [i32; SIN_TABLE_LEN] = make_sin_table();

/// Table lookup with quadrant symmetry for a full-wave index in 0..=4096.
#[inline]
fn sin_at(i: u32) -> i32 {
    let i = i & 0xFFF; // 4096 positions per turn
    let quadrant = i >> 10;
    let j = (i & 0x3FF) as usize;
    match quadrant {
        0 => SIN_TABLE[j],
        1 => {
            if j == 0 {
                FIXED_ONE
            } else {
                SIN_TABLE[SIN_TABLE_LEN - j]
            }
        }
        2 => -SIN_TABLE[j],
        _ => {
            if j == 0 {
                -FIXED_ONE
            } else {
                -SIN_TABLE[SIN_TABLE_LEN - j]
            }
        }
    }
}

/// Sine of an angle in turns (`FIXED_ONE` = one revolution).
///
/// The 16 fractional bits of the wrapped angle split into a 12-bit table
/// index and 4 bits of linear interpolation between adjacent entries.
pub fn fixed_sin(angle: Fixed) -> Fixed {
    let phase = (angle & 0xFFFF) as u32;
    let index = phase >> 4;
    let t = ((phase & 0xF) << 12) as i32; // remaining 4 bits widened to Q16
    let a = sin_at(index);
    let b = sin_at(index + 1);
    a.wrapping_add(fixed_mul(b.wrapping_sub(a), t))
}

/// Cosine of an angle in turns.
#[inline]
pub fn fixed_cos(angle: Fixed) -> Fixed {
    fixed_sin(angle.wrapping_add(QUARTER_TURN))
}

// Polynomial arctangent constants, in turns Q16.16:
// atan(z) ~= z*pi/4 - z*(z - 1)*(0.2447 + 0.0663*z)   [radians, 0 <= z <= 1]
// rescaled by 1/(2*pi).
const ATAN_A: Fixed = 8192; // 0.125 turn = pi/4 rad
const ATAN_B: Fixed = 2552; // 0.2447 rad in turns
const ATAN_C: Fixed = 692; // 0.0663 rad in turns

/// Arctangent of `z` in [0, FIXED_ONE], result in turns [0, 1/8].
#[inline]
fn atan_unit(z: Fixed) -> Fixed {
    let correction = fixed_mul(fixed_mul(z, FIXED_ONE - z), ATAN_B + fixed_mul(ATAN_C, z));
    fixed_mul(z, ATAN_A) + correction
}

/// Four-quadrant arctangent, returning turns in `(-1/2, 1/2]`.
///
/// Octant-reduced polynomial approximation; the maximum error is a few
/// hundredths of a degree, and identical on every platform. `(0, 0)`
/// returns 0.
pub fn fixed_atan2(y: Fixed, x: Fixed) -> Fixed {
    if x == 0 && y == 0 {
        return 0;
    }
    let ax = fixed_abs(x);
    let ay = fixed_abs(y);
    // First-octant angle from the smaller/larger ratio.
    let base = if ay <= ax {
        atan_unit(fixed_div(ay, ax))
    } else {
        QUARTER_TURN - atan_unit(fixed_div(ax, ay))
    };
    // Mirror into the proper quadrant.
    let unsigned = if x >= 0 { base } else { HALF_TURN - base };
    if y >= 0 {
        unsigned
    } else {
        -unsigned
    }
}

// ---------------------------------------------------------------------------
// FixedNum wrapper
// ---------------------------------------------------------------------------

/// Operator-overloaded wrapper around [`Fixed`] for code that prefers
/// expression syntax over the `fixed_*` free functions.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct FixedNum(pub Fixed);

impl FixedNum {
    pub const ZERO: Self = Self(0);
    pub const ONE: Self = Self(FIXED_ONE);

    #[inline]
    pub const fn from_raw(raw: Fixed) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn from_int(i: i32) -> Self {
        Self(i << FIXED_SHIFT)
    }

    #[inline]
    pub const fn raw(self) -> Fixed {
        self.0
    }

    #[inline]
    pub fn abs(self) -> Self {
        Self(fixed_abs(self.0))
    }

    #[inline]
    pub fn sqrt(self) -> Self {
        Self(fixed_sqrt(self.0))
    }

    #[inline]
    pub fn to_float(self) -> f32 {
        to_float(self.0)
    }
}

impl Add for FixedNum {
    type Output = Self;
    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self(self.0.wrapping_add(rhs.0))
    }
}

impl Sub for FixedNum {
    type Output = Self;
    #[inline]
    fn sub(self, rhs: Self) -> Self {
        Self(self.0.wrapping_sub(rhs.0))
    }
}

impl Mul for FixedNum {
    type Output = Self;
    #[inline]
    fn mul(self, rhs: Self) -> Self {
        Self(fixed_mul(self.0, rhs.0))
    }
}

impl Div for FixedNum {
    type Output = Self;
    #[inline]
    fn div(self, rhs: Self) -> Self {
        Self(fixed_div(self.0, rhs.0))
    }
}

impl Neg for FixedNum {
    type Output = Self;
    #[inline]
    fn neg(self) -> Self {
        Self(self.0.wrapping_neg())
    }
}

impl fmt::Debug for FixedNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fixed({:.4})", self.to_float())
    }
}

impl fmt::Display for FixedNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4}", self.to_float())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constants() {
        assert_eq!(FIXED_ONE, 65536);
        assert_eq!(FIXED_HALF, 32768);
        assert_eq!(FIXED_DT, 1092);
    }

    #[test]
    fn conversion_round_trip() {
        for &v in &[0.0f32, 1.0, -1.0, 0.5, 2.75, -3.125, 100.0, -0.0001] {
            let fx = to_fixed(v);
            let back = to_float(fx);
            assert!(
                (back - v).abs() <= 1.0 / 65536.0,
                "round trip of {v} drifted: {back}"
            );
        }
    }

    #[test]
    fn conversion_rounds_ties_to_even() {
        // 0.5/65536 is exactly representable and ties: round to even.
        assert_eq!(to_fixed(1.5 / 65536.0), 2);
        assert_eq!(to_fixed(2.5 / 65536.0), 2);
    }

    #[test]
    fn mul_basics() {
        assert_eq!(fixed_mul(to_fixed(2.0), to_fixed(3.0)), to_fixed(6.0));
        assert_eq!(fixed_mul(FIXED_HALF, FIXED_HALF), to_fixed(0.25));
        assert_eq!(fixed_mul(to_fixed(-2.0), to_fixed(3.0)), to_fixed(-6.0));
    }

    #[test]
    fn div_basics() {
        assert_eq!(fixed_div(to_fixed(6.0), to_fixed(2.0)), to_fixed(3.0));
        assert_eq!(fixed_div(FIXED_ONE, to_fixed(4.0)), to_fixed(0.25));
    }

    #[test]
    fn div_by_zero_saturates_with_dividend_sign() {
        assert_eq!(fixed_div(FIXED_ONE, 0), i32::MAX);
        assert_eq!(fixed_div(-FIXED_ONE, 0), -i32::MAX);
        assert_eq!(fixed_div(0, 0), i32::MAX);
    }

    #[test]
    fn sqrt_bounds() {
        // sqrt(2) within +-2 raw units of the true value.
        let got = fixed_sqrt(to_fixed(2.0));
        let expected = to_fixed(1.414_213_56);
        assert!(
            (got - expected).abs() <= 2,
            "sqrt(2): got {got}, expected ~{expected}"
        );

        assert_eq!(fixed_sqrt(0), 0);
        assert_eq!(fixed_sqrt(to_fixed(-1.0)), 0);
        assert!((fixed_sqrt(to_fixed(4.0)) - to_fixed(2.0)).abs() <= 2);
        assert!((fixed_sqrt(FIXED_ONE) - FIXED_ONE).abs() <= 2);
    }

    #[test]
    fn sin_cardinal_angles() {
        assert_eq!(fixed_sin(0), 0);
        assert!((fixed_sin(QUARTER_TURN) - FIXED_ONE).abs() <= 2);
        assert!(fixed_sin(HALF_TURN).abs() <= 2);
        assert!((fixed_sin(HALF_TURN + QUARTER_TURN) + FIXED_ONE).abs() <= 2);
    }

    #[test]
    fn cos_cardinal_angles() {
        assert!((fixed_cos(0) - FIXED_ONE).abs() <= 2);
        assert!(fixed_cos(QUARTER_TURN).abs() <= 2);
        assert!((fixed_cos(HALF_TURN) + FIXED_ONE).abs() <= 2);
    }

    #[test]
    fn sin_known_values() {
        // sin(1/8 turn) = sqrt(2)/2.
        let got = fixed_sin(FIXED_ONE / 8);
        let expected = to_fixed(0.707_106_78);
        assert!(
            (got - expected).abs() <= 8,
            "sin(1/8 turn): got {got}, expected ~{expected}"
        );
        // sin(1/12 turn) = 0.5.
        let got = fixed_sin(FIXED_ONE / 12);
        assert!((got - FIXED_HALF).abs() <= 16, "sin(30deg): got {got}");
    }

    #[test]
    fn sin_wraps_and_negates() {
        // Negative angles wrap to the same phase.
        assert_eq!(fixed_sin(-QUARTER_TURN), fixed_sin(-QUARTER_TURN + FIXED_ONE));
        assert_eq!(fixed_sin(FIXED_ONE + 1234), fixed_sin(1234));
    }

    #[test]
    fn atan2_cardinal_directions() {
        assert_eq!(fixed_atan2(0, 0), 0);
        assert_eq!(fixed_atan2(0, FIXED_ONE), 0);
        assert!((fixed_atan2(FIXED_ONE, 0) - QUARTER_TURN).abs() <= 4);
        assert!((fixed_atan2(0, -FIXED_ONE) - HALF_TURN).abs() <= 4);
        assert!((fixed_atan2(-FIXED_ONE, 0) + QUARTER_TURN).abs() <= 4);
    }

    #[test]
    fn atan2_diagonals() {
        // 45 degrees = 1/8 turn.
        let got = fixed_atan2(FIXED_ONE, FIXED_ONE);
        assert!((got - FIXED_ONE / 8).abs() <= 16, "atan2(1,1): got {got}");
        let got = fixed_atan2(-FIXED_ONE, FIXED_ONE);
        assert!((got + FIXED_ONE / 8).abs() <= 16);
    }

    #[test]
    fn atan2_matches_sin_cos() {
        // Walk angles around the circle; atan2(sin, cos) should recover them.
        for i in 1..16 {
            let angle = (FIXED_ONE / 16) * i - HALF_TURN + 1024;
            let recovered = fixed_atan2(fixed_sin(angle), fixed_cos(angle));
            let mut diff = (recovered.wrapping_sub(angle)) & 0xFFFF;
            if diff > FIXED_HALF {
                diff = FIXED_ONE - diff;
            }
            // Polynomial + table interpolation error stays well under a
            // tenth of a degree.
            assert!(diff <= 48, "angle {angle}: recovered {recovered}");
        }
    }

    #[test]
    fn ops_are_pure() {
        let a = 12_345_678;
        let b = -87_654_321;
        for _ in 0..100 {
            assert_eq!(fixed_mul(a, b), fixed_mul(a, b));
            assert_eq!(fixed_div(a, b), fixed_div(a, b));
            assert_eq!(fixed_sqrt(a), fixed_sqrt(a));
            assert_eq!(fixed_sin(a), fixed_sin(a));
        }
    }

    #[test]
    fn wrapper_ops() {
        let a = FixedNum::from_int(5);
        let b = FixedNum::from_int(3);
        assert_eq!((a + b).raw(), to_fixed(8.0));
        assert_eq!((a - b).raw(), to_fixed(2.0));
        assert_eq!((a * b).raw(), to_fixed(15.0));
        assert_eq!((a / b).raw(), fixed_div(to_fixed(5.0), to_fixed(3.0)));
        assert_eq!((-a).raw(), to_fixed(-5.0));
    }

    #[test]
    fn floor_to_int_rounds_toward_negative_infinity() {
        assert_eq!(fixed_floor_to_int(to_fixed(2.75)), 2);
        assert_eq!(fixed_floor_to_int(to_fixed(-0.25)), -1);
        assert_eq!(fixed_floor_to_int(to_fixed(-2.0)), -2);
    }
}
