//! The six-phase system scheduler.
//!
//! Systems register against a [`Phase`] with an `order` and optional
//! client/server gating. Within a phase, systems run in ascending order,
//! ties broken by registration sequence -- a stable, fully deterministic
//! ordering that both peers reproduce as long as they register the same
//! systems in the same order at startup.
//!
//! Systems are plain closures over `&mut World`. They must not re-enter the
//! scheduler: while a phase runs, the scheduler is detached from the world,
//! so a system has no scheduler to call into.

use crate::world::{World, WorldRole};

// ---------------------------------------------------------------------------
// Phase
// ---------------------------------------------------------------------------

/// The fixed tick phases, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    Input,
    Update,
    PrePhysics,
    Physics,
    PostPhysics,
    /// Client-only; skipped entirely on servers.
    Render,
}

/// All phases in execution order.
pub const PHASE_ORDER: [Phase; 6] = [
    Phase::Input,
    Phase::Update,
    Phase::PrePhysics,
    Phase::Physics,
    Phase::PostPhysics,
    Phase::Render,
];

// ---------------------------------------------------------------------------
// SystemOptions
// ---------------------------------------------------------------------------

/// Registration options for one system.
#[derive(Debug, Clone, Copy)]
pub struct SystemOptions {
    /// Ascending execution position within the phase.
    pub order: i32,
    /// Run when the world is a client.
    pub client: bool,
    /// Run when the world is a server.
    pub server: bool,
}

impl Default for SystemOptions {
    fn default() -> Self {
        Self {
            order: 0,
            client: true,
            server: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// A system closure. Runs to completion synchronously; never suspends.
pub type SystemFn = Box<dyn FnMut(&mut World)>;

struct RegisteredSystem {
    name: String,
    phase: Phase,
    order: i32,
    /// Registration sequence, the stable tie-breaker.
    seq: u32,
    client: bool,
    server: bool,
    func: SystemFn,
}

impl std::fmt::Debug for RegisteredSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredSystem")
            .field("name", &self.name)
            .field("phase", &self.phase)
            .field("order", &self.order)
            .field("seq", &self.seq)
            .finish()
    }
}

/// Registry and runner for phased systems.
#[derive(Debug, Default)]
pub struct Scheduler {
    systems: Vec<RegisteredSystem>,
    next_seq: u32,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a system.
    ///
    /// # Panics
    ///
    /// Panics if a system with the same name is already registered.
    pub fn add_system(
        &mut self,
        name: &str,
        phase: Phase,
        options: SystemOptions,
        func: impl FnMut(&mut World) + 'static,
    ) {
        assert!(
            !self.systems.iter().any(|s| s.name == name),
            "duplicate system name: {name:?}"
        );
        let seq = self.next_seq;
        self.next_seq += 1;
        self.systems.push(RegisteredSystem {
            name: name.to_owned(),
            phase,
            order: options.order,
            seq,
            client: options.client,
            server: options.server,
            func: Box::new(func),
        });
        // Keep the vector in execution order so run_phase is a scan.
        self.systems
            .sort_by_key(|s| (s.phase, s.order, s.seq));
    }

    /// Run every eligible system of one phase against the world.
    pub fn run_phase(&mut self, phase: Phase, world: &mut World) {
        let role = world.role();
        for system in &mut self.systems {
            if system.phase != phase {
                continue;
            }
            let eligible = match role {
                WorldRole::Client => system.client,
                WorldRole::Server => system.server,
            };
            if !eligible {
                continue;
            }
            (system.func)(world);
        }
    }

    /// Run all phases in declared order. `Render` is skipped on servers.
    pub fn run_all(&mut self, world: &mut World) {
        for phase in PHASE_ORDER {
            if phase == Phase::Render && world.role() == WorldRole::Server {
                continue;
            }
            self.run_phase(phase, world);
        }
    }

    pub fn system_count(&self) -> usize {
        self.systems.len()
    }

    /// Names in execution order (diagnostics, tests).
    pub fn system_names(&self) -> Vec<&str> {
        self.systems.iter().map(|s| s.name.as_str()).collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
