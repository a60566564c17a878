//! Cadence Engine -- rollback netcode and deterministic 2D physics over
//! the [`cadence_ecs`] simulation substrate.
//!
//! The ECS crate guarantees that one world advances deterministically;
//! this crate makes a *fleet* of worlds agree:
//!
//! - [`input`]: per-frame, per-client history of confirmed vs predicted
//!   input payloads.
//! - [`rollback`]: a bounded ring of encoded snapshots keyed by frame.
//! - [`session`]: the client-side prediction loop -- predict ticks ahead
//!   of the authority, detect mispredictions by state hash, roll back and
//!   resimulate.
//! - [`physics`]: the Q16.16 2D physics pipeline (spatial-hash broad
//!   phase, circle/box narrow phase, impulse response, sleeping) run at
//!   the scheduler's `physics` phase.
//! - [`guard`]: advisory interception of host clocks and entropy during
//!   simulation.

#![deny(unsafe_code)]

pub mod guard;
pub mod input;
pub mod physics;
pub mod rollback;
pub mod session;

use cadence_ecs::SimError;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by the netcode layer.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The frame needed for a rollback is older than the snapshot ring.
    /// Callers typically respond by requesting a fresh snapshot from the
    /// authority.
    #[error("rollback window exceeded: frame {frame} predates the oldest retained snapshot {oldest:?}")]
    RollbackWindowExceeded { frame: u64, oldest: Option<u64> },

    /// An underlying simulation-core failure.
    #[error(transparent)]
    World(#[from] SimError),
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::guard::DeterminismGuard;
    pub use crate::input::InputHistory;
    pub use crate::physics::{
        BodyType, CollisionEvent, PhysicsComponents, PhysicsConfig, PhysicsWorld2D, Shape2D,
    };
    pub use crate::rollback::RollbackBuffer;
    pub use crate::session::{Misprediction, Session};
    pub use crate::EngineError;
    pub use cadence_ecs::prelude::*;
}
