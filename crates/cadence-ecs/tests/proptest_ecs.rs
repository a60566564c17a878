//! Property tests for the deterministic substrate: fixed-point laws,
//! allocator laws, intern idempotence.

use cadence_ecs::prelude::*;
use proptest::prelude::*;

proptest! {
    // -- fixed-point ---------------------------------------------------------

    #[test]
    fn to_float_to_fixed_round_trip(x in -30_000.0f32..30_000.0) {
        // One quantization step plus the f32 rounding of the scale
        // product, which dominates at large magnitudes.
        let back = to_float(to_fixed(x));
        let tolerance = 2.0 / 65536.0 + x.abs() * 4.0 * f32::EPSILON;
        prop_assert!((back - x).abs() <= tolerance, "{x} -> {back}");
    }

    #[test]
    fn fixed_ops_are_pure(a in any::<i32>(), b in any::<i32>()) {
        prop_assert_eq!(fixed_mul(a, b), fixed_mul(a, b));
        prop_assert_eq!(fixed_div(a, b), fixed_div(a, b));
        prop_assert_eq!(fixed_sqrt(a), fixed_sqrt(a));
        prop_assert_eq!(fixed_sin(a), fixed_sin(a));
        prop_assert_eq!(fixed_cos(a), fixed_cos(a));
    }

    #[test]
    fn fixed_mul_commutes(a in any::<i32>(), b in any::<i32>()) {
        prop_assert_eq!(fixed_mul(a, b), fixed_mul(b, a));
    }

    #[test]
    fn fixed_div_never_panics(a in any::<i32>(), b in any::<i32>()) {
        let _ = fixed_div(a, b);
    }

    #[test]
    fn sqrt_squares_back_within_tolerance(x in 0.0f32..100.0) {
        // Eight Newton iterations are fully converged in this range;
        // much larger magnitudes trade residual error for determinism.
        let fx = to_fixed(x);
        let root = fixed_sqrt(fx);
        let squared = fixed_mul(root, root);
        let tolerance = (fx >> 13).max(16);
        prop_assert!(
            (squared - fx).abs() <= tolerance,
            "sqrt({fx})={root}, squared back to {squared}"
        );
    }

    #[test]
    fn sqrt_total_and_nonnegative(a in any::<i32>()) {
        let root = fixed_sqrt(a);
        prop_assert!(root >= 0);
        if a <= 0 {
            prop_assert_eq!(root, 0);
        }
    }

    #[test]
    fn sin_cos_stay_in_unit_range(angle in any::<i32>()) {
        // Linear interpolation can overshoot by at most a couple of units.
        prop_assert!(fixed_sin(angle).abs() <= FIXED_ONE + 4);
        prop_assert!(fixed_cos(angle).abs() <= FIXED_ONE + 4);
    }

    #[test]
    fn sin_has_full_turn_period(angle in any::<i32>()) {
        prop_assert_eq!(fixed_sin(angle), fixed_sin(angle.wrapping_add(FIXED_ONE)));
    }

    // -- rng -----------------------------------------------------------------

    #[test]
    fn rng_streams_reproduce_from_state(seed in any::<u32>(), skip in 0usize..64) {
        let mut rng = SimRng::new(seed);
        for _ in 0..skip {
            rng.next_u32();
        }
        let state = rng.state();
        let a: Vec<u32> = (0..16).map(|_| rng.next_u32()).collect();
        let mut replay = SimRng::from_state(state);
        let b: Vec<u32> = (0..16).map(|_| replay.next_u32()).collect();
        prop_assert_eq!(a, b);
    }

    // -- allocator -----------------------------------------------------------

    #[test]
    fn free_of_fresh_allocation_restores_shape(live in 0usize..32) {
        let mut a = EntityAllocator::new(DEFAULT_ENTITY_CEILING);
        for _ in 0..live {
            a.allocate().unwrap();
        }
        let before = a.snapshot_state();
        let e = a.allocate().unwrap();
        a.free(e);
        let after = a.snapshot_state();
        // Externally the allocator is back where it was, modulo the bumped
        // generation on the recycled slot (not visible in the active map).
        prop_assert_eq!(before.1, after.1);
        // The recycled index is handed out again next.
        let next = a.allocate().unwrap();
        prop_assert_eq!(next.index(), e.index());
    }

    #[test]
    fn distinct_live_ids_never_share_an_index(churn in proptest::collection::vec(any::<bool>(), 1..200)) {
        let mut a = EntityAllocator::new(64);
        let mut live: Vec<EntityId> = Vec::new();
        for spawn in churn {
            if spawn || live.is_empty() {
                if let Ok(id) = a.allocate() {
                    live.push(id);
                }
            } else {
                let id = live.remove(live.len() / 2);
                a.free(id);
            }
        }
        let mut indices: Vec<u32> = live.iter().map(|id| id.index()).collect();
        indices.sort_unstable();
        indices.dedup();
        prop_assert_eq!(indices.len(), live.len());
    }

    // -- string registry -----------------------------------------------------

    #[test]
    fn intern_idempotent_and_reversible(names in proptest::collection::vec("[a-z]{1,8}", 1..32)) {
        let mut reg = StringRegistry::new();
        for name in &names {
            let first = reg.intern("ns", name);
            let second = reg.intern("ns", name);
            prop_assert_eq!(first, second);
            prop_assert!(first > 0);
            prop_assert_eq!(reg.get("ns", first), Some(name.as_str()));
        }
    }
}
