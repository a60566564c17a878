//! Seeded simulation PRNG.
//!
//! Xorshift128+ over two 32-bit state words. Two peers seeded identically
//! draw identical sequences on any platform, and the two words travel in
//! every snapshot so a restored world continues the exact same stream.
//!
//! Simulation code must draw all randomness from the world's [`SimRng`];
//! the host RNG is off-limits during a tick (the determinism guard in the
//! engine crate warns when it is touched anyway).

use serde::{Deserialize, Serialize};

use crate::fixed::Fixed;

/// Deterministic xorshift128+ generator.
///
/// The recurrence, with all ops wrapping on `u32`:
///
/// ```text
/// x = s0; y = s1;
/// s0 = y;
/// x ^= x << 23; x ^= x >> 17; x ^= y; x ^= y >> 26;
/// s1 = x;
/// output = s0 + s1
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimRng {
    s0: u32,
    s1: u32,
}

/// 32-bit splitmix-style mix used to expand a seed into state words.
#[inline]
fn splitmix32(state: &mut u32) -> u32 {
    *state = state.wrapping_add(0x9E37_79B9);
    let mut z = *state;
    z = (z ^ (z >> 16)).wrapping_mul(0x85EB_CA6B);
    z = (z ^ (z >> 13)).wrapping_mul(0xC2B2_AE35);
    z ^ (z >> 16)
}

impl SimRng {
    /// Create a generator from a 32-bit seed.
    ///
    /// The seed is expanded through [`splitmix32`] so that nearby seeds
    /// still diverge immediately; an all-zero expansion is nudged to keep
    /// xorshift out of its fixed point.
    pub fn new(seed: u32) -> Self {
        let mut s = seed;
        let s0 = splitmix32(&mut s);
        let s1 = splitmix32(&mut s);
        if s0 == 0 && s1 == 0 {
            Self { s0: 1, s1: 1 }
        } else {
            Self { s0, s1 }
        }
    }

    /// Next 32 bits of the stream.
    #[inline]
    pub fn next_u32(&mut self) -> u32 {
        let mut x = self.s0;
        let y = self.s1;
        self.s0 = y;
        x ^= x << 23;
        x ^= x >> 17;
        x ^= y;
        x ^= y >> 26;
        self.s1 = x;
        self.s0.wrapping_add(self.s1)
    }

    /// Uniform integer in `[0, max)`. `max == 0` returns 0.
    #[inline]
    pub fn next_below(&mut self, max: u32) -> u32 {
        if max == 0 {
            return 0;
        }
        // Scale through a 64-bit product rather than modulo; bias is below
        // 2^-32 and the cost is one widening multiply.
        ((self.next_u32() as u64 * max as u64) >> 32) as u32
    }

    /// Uniform integer in `[min, max]`.
    #[inline]
    pub fn next_range(&mut self, min: i32, max: i32) -> i32 {
        if min >= max {
            return min;
        }
        let span = (max as i64 - min as i64 + 1) as u32;
        min.wrapping_add(self.next_below(span) as i32)
    }

    /// Uniform fixed-point value in `[0, max)`.
    #[inline]
    pub fn next_fixed(&mut self, max: Fixed) -> Fixed {
        if max <= 0 {
            return 0;
        }
        ((self.next_u32() as i64 * max as i64) >> 32) as Fixed
    }

    /// Uniform float in `[0, 1)`. Render-side convenience only -- the
    /// result must never feed back into synchronized state.
    #[inline]
    pub fn next_unit_f32(&mut self) -> f32 {
        (self.next_u32() >> 8) as f32 / (1u32 << 24) as f32
    }

    /// The two state words, for snapshots.
    #[inline]
    pub fn state(&self) -> [u32; 2] {
        [self.s0, self.s1]
    }

    /// Restore from snapshotted state words.
    #[inline]
    pub fn set_state(&mut self, state: [u32; 2]) {
        self.s0 = state[0];
        self.s1 = state[1];
    }

    /// Construct directly from state words (snapshot decode path).
    #[inline]
    pub fn from_state(state: [u32; 2]) -> Self {
        Self {
            s0: state[0],
            s1: state[1],
        }
    }
}

impl Default for SimRng {
    fn default() -> Self {
        Self::new(0)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_sequence() {
        let mut a = SimRng::new(12345);
        let mut b = SimRng::new(12345);
        for _ in 0..1000 {
            assert_eq!(a.next_u32(), b.next_u32());
        }
    }

    #[test]
    fn different_seeds_diverge() {
        let mut a = SimRng::new(1);
        let mut b = SimRng::new(2);
        assert_ne!(a.next_u32(), b.next_u32());
    }

    #[test]
    fn state_checkpoint_resumes_stream() {
        let mut rng = SimRng::new(5555);
        for _ in 0..50 {
            rng.next_u32();
        }
        let saved = rng.state();
        let expected: Vec<u32> = (0..10).map(|_| rng.next_u32()).collect();
        rng.set_state(saved);
        for e in expected {
            assert_eq!(rng.next_u32(), e);
        }
    }

    #[test]
    fn next_below_bounds() {
        let mut rng = SimRng::new(99);
        for _ in 0..1000 {
            assert!(rng.next_below(100) < 100);
        }
        assert_eq!(rng.next_below(0), 0);
        assert_eq!(rng.next_below(1), 0);
    }

    #[test]
    fn next_range_bounds() {
        let mut rng = SimRng::new(7);
        for _ in 0..1000 {
            let v = rng.next_range(-10, 10);
            assert!((-10..=10).contains(&v));
        }
        assert_eq!(rng.next_range(5, 5), 5);
    }

    #[test]
    fn next_fixed_bounds() {
        let mut rng = SimRng::new(31337);
        let max = crate::fixed::to_fixed(100.0);
        for _ in 0..1000 {
            let v = rng.next_fixed(max);
            assert!(v >= 0 && v < max);
        }
        assert_eq!(rng.next_fixed(0), 0);
        assert_eq!(rng.next_fixed(-1), 0);
    }

    #[test]
    fn zero_seed_is_not_stuck() {
        let mut rng = SimRng::new(0);
        let a = rng.next_u32();
        let b = rng.next_u32();
        assert!(a != 0 || b != 0);
    }

    #[test]
    fn known_values_regression() {
        // Frozen outputs: if these change, recorded replays and cross-peer
        // seeds break.
        let mut rng = SimRng::from_state([0xDEAD_BEEF, 0x0123_4567]);
        let first = rng.next_u32();
        let again = SimRng::from_state([0xDEAD_BEEF, 0x0123_4567]).next_u32();
        assert_eq!(first, again);
        // Recurrence check by hand for one step.
        let mut x: u32 = 0xDEAD_BEEF;
        let y: u32 = 0x0123_4567;
        x ^= x << 23;
        x ^= x >> 17;
        x ^= y;
        x ^= y >> 26;
        assert_eq!(first, y.wrapping_add(x));
    }
}
