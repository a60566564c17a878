//! Advisory determinism guard.
//!
//! Rust offers no way to intercept `std::time` or OS entropy behind a
//! caller's back, so the guard takes the wrapper-accessor form: game and
//! engine code read host time and entropy through the functions here, and
//! while a simulation frame is executing with the guard installed, each
//! distinct source logs a one-shot warning. The values still flow -- the
//! guard diagnoses determinism leaks, it does not enforce anything.
//!
//! Install/uninstall is clean and idempotent, and scoped to the calling
//! thread (the simulation is single-threaded by contract).

use std::cell::Cell;
use std::time::{SystemTime, UNIX_EPOCH};

thread_local! {
    static INSTALLED: Cell<bool> = const { Cell::new(false) };
    static SIMULATING: Cell<bool> = const { Cell::new(false) };
    /// One bit per warned symbol, reset on install.
    static WARNED: Cell<u8> = const { Cell::new(0) };
}

const WARN_WALL_CLOCK: u8 = 1 << 0;
const WARN_MONOTONIC: u8 = 1 << 1;
const WARN_ENTROPY: u8 = 1 << 2;

// ---------------------------------------------------------------------------
// DeterminismGuard
// ---------------------------------------------------------------------------

/// RAII handle for the installed guard. Dropping it uninstalls.
#[derive(Debug)]
pub struct DeterminismGuard {
    _private: (),
}

impl DeterminismGuard {
    /// Install the guard on this thread. Re-installing resets the
    /// warned-symbol set.
    pub fn install() -> Self {
        INSTALLED.with(|flag| flag.set(true));
        WARNED.with(|bits| bits.set(0));
        Self { _private: () }
    }

    /// Explicit uninstall (dropping the handle does the same).
    pub fn uninstall(self) {
        drop(self);
    }

    pub fn is_installed() -> bool {
        INSTALLED.with(Cell::get)
    }
}

impl Drop for DeterminismGuard {
    fn drop(&mut self) {
        INSTALLED.with(|flag| flag.set(false));
    }
}

// ---------------------------------------------------------------------------
// Simulation scope
// ---------------------------------------------------------------------------

/// RAII marker for "a simulation frame is executing on this thread".
pub struct SimulationScope {
    was_simulating: bool,
}

/// Enter the simulation scope (held by the session for the duration of a
/// frame's phases).
pub fn simulation_scope() -> SimulationScope {
    let was_simulating = SIMULATING.with(|flag| flag.replace(true));
    SimulationScope { was_simulating }
}

impl Drop for SimulationScope {
    fn drop(&mut self) {
        let was = self.was_simulating;
        SIMULATING.with(|flag| flag.set(was));
    }
}

fn check(symbol_bit: u8, symbol: &str) {
    let active = INSTALLED.with(Cell::get) && SIMULATING.with(Cell::get);
    if !active {
        return;
    }
    let already = WARNED.with(|bits| {
        let value = bits.get();
        bits.set(value | symbol_bit);
        value & symbol_bit != 0
    });
    if !already {
        tracing::warn!(
            symbol,
            "non-deterministic host source read during simulation; peers will drift"
        );
    }
}

// ---------------------------------------------------------------------------
// Guarded host accessors
// ---------------------------------------------------------------------------

/// Wall-clock milliseconds since the Unix epoch. Never legal inside a
/// tick; the guard warns once when it happens anyway.
pub fn wall_clock_ms() -> u64 {
    check(WARN_WALL_CLOCK, "wall_clock");
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Monotonic nanoseconds from an arbitrary origin (profiling only).
pub fn monotonic_nanos() -> u64 {
    check(WARN_MONOTONIC, "monotonic_clock");
    use std::time::Instant;
    use std::sync::OnceLock;
    static ORIGIN: OnceLock<Instant> = OnceLock::new();
    let origin = *ORIGIN.get_or_init(Instant::now);
    Instant::now().duration_since(origin).as_nanos() as u64
}

/// A dollop of OS-seeded entropy. Simulation randomness must come from
/// the world's seeded PRNG instead.
pub fn entropy_u64() -> u64 {
    check(WARN_ENTROPY, "host_entropy");
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hasher};
    let mut hasher = RandomState::new().build_hasher();
    hasher.write_u64(0);
    hasher.finish()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
