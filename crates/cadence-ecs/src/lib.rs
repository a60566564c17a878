//! Cadence ECS -- the deterministic simulation substrate of a
//! lockstep-with-rollback multiplayer engine.
//!
//! Given the same initial state and the same ordered per-client inputs,
//! a world advances to byte-identical results on every peer, on any
//! hardware. The pieces that make that true:
//!
//! - **Q16.16 fixed-point numerics** ([`fixed`], [`vec`]) -- no host
//!   floating point anywhere on a simulation path.
//! - **Seeded PRNG** ([`rng`]) carried inside the world and serialized
//!   into snapshots.
//! - **Runtime component schemas over SoA storage** ([`storage`]) with a
//!   presence bitmap and flat per-field columns.
//! - **Sorted secondary indices with snapshot iterators** ([`query`]) so
//!   every observable iteration order is ascending by entity id.
//! - **A six-phase scheduler** ([`schedule`]) with stable system ordering
//!   and client/server gating.
//! - **The [`world::World`] orchestrator** with the canonical tick
//!   pipeline and the xxh32 synchronized [`world::World::state_hash`].
//! - **The schema-compressed binary snapshot codec** ([`snapshot`]) used
//!   for late-join bootstrap and the rollback ring.
//!
//! # Quick start
//!
//! ```
//! use cadence_ecs::prelude::*;
//!
//! let mut world = World::new(WorldConfig::default());
//! let transform = world.define_component(
//!     ComponentDef::new("transform2d")
//!         .field_fixed("x", 0.0)
//!         .field_fixed("y", 0.0),
//! );
//! world.define_entity(EntityTypeDef::new("ball").component(transform));
//!
//! let ball = world.spawn("ball", &[("x", FieldValue::Float(100.0))]).unwrap();
//! world.add_system("drift", Phase::Update, SystemOptions::default(), move |w| {
//!     let x = w.get_i32(ball, transform, "x").unwrap();
//!     w.set_i32(ball, transform, "x", x + FIXED_ONE).unwrap();
//! });
//!
//! world.tick(1, &Default::default());
//! assert_eq!(world.get_float(ball, transform, "x").unwrap(), 101.0);
//! ```

#![deny(unsafe_code)]

pub mod entity;
pub mod facade;
pub mod fixed;
pub mod hash;
pub mod query;
pub mod rng;
pub mod schedule;
pub mod snapshot;
pub mod storage;
pub mod strings;
pub mod vec;
pub mod world;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by simulation-core operations.
///
/// Programmer-error kinds (`InvalidEntityId`, `ComponentAbsent`,
/// `DuplicateComponent`) fail loudly and leave the world consistent;
/// `InvalidSnapshot` aborts a decode before any mutation; recoverable
/// snapshot conditions (unknown entity types) are logged and skipped
/// rather than surfaced here.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    /// The entity allocator is at its configured ceiling.
    #[error("entity capacity exceeded (ceiling {ceiling})")]
    CapacityExceeded { ceiling: u32 },

    /// A spawn referenced an entity type that was never registered.
    #[error("unknown entity type '{name}'")]
    UnknownEntityType { name: String },

    /// An accessor touched a component the entity does not carry.
    #[error("entity {entity:?} does not have component '{component}'")]
    ComponentAbsent {
        entity: entity::EntityId,
        component: String,
    },

    /// A runtime add of a component that is already present.
    #[error("component '{component}' already present on entity {entity:?}")]
    DuplicateComponent {
        entity: entity::EntityId,
        component: String,
    },

    /// An operation on a stale id (generation mismatch) or dead entity.
    #[error("invalid or stale entity id {entity:?}")]
    InvalidEntityId { entity: entity::EntityId },

    /// Malformed snapshot bytes, version mismatch, or inconsistent lengths.
    #[error("invalid snapshot: {details}")]
    InvalidSnapshot { details: String },
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::entity::{EntityAllocator, EntityId, DEFAULT_ENTITY_CEILING};
    pub use crate::facade::{EntityMut, EntityRef, InterpolationBuffer};
    pub use crate::fixed::{
        fixed_abs, fixed_atan2, fixed_clamp, fixed_cos, fixed_div, fixed_lerp, fixed_max,
        fixed_min, fixed_mul, fixed_sin, fixed_sqrt, to_fixed, to_float, Fixed, FixedNum,
        FIXED_DT, FIXED_HALF, FIXED_ONE,
    };
    pub use crate::hash::StateHasher;
    pub use crate::query::{EntityIter, QueryIndex};
    pub use crate::rng::SimRng;
    pub use crate::schedule::{Phase, Scheduler, SystemOptions};
    pub use crate::snapshot::{SnapshotReport, SNAPSHOT_VERSION};
    pub use crate::storage::{ComponentDef, ComponentId, FieldId, FieldType, FieldValue};
    pub use crate::strings::StringRegistry;
    pub use crate::vec::{FixedQuat, FixedVec2, FixedVec3};
    pub use crate::world::{EntityTypeDef, World, WorldConfig, WorldRole};
    pub use crate::SimError;
}

// ---------------------------------------------------------------------------
// Integration tests
// ---------------------------------------------------------------------------
