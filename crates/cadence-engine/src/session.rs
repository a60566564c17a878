//! Client-side prediction and resimulation.
//!
//! A [`Session`] owns the world, the physics pipeline, the snapshot ring,
//! and the input history, and drives the rollback netcode dance:
//!
//! 1. Each local frame is ticked ahead of the authority with predicted
//!    inputs, snapshotted into the ring, and remembered as a pending
//!    prediction `{frame, inputs, post_tick_hash}`.
//! 2. When the authority confirms a frame's inputs, the session re-derives
//!    that frame from the nearest earlier snapshot and compares state
//!    hashes. A match silently discards the prediction; a mismatch is a
//!    *misprediction*: the rollback callback fires and every frame after
//!    the confirmed one is resimulated from history (confirmed inputs
//!    where known, surviving predictions elsewhere).
//!
//! When the snapshot the correction needs has aged out of the ring, the
//! session surfaces [`EngineError::RollbackWindowExceeded`]; the caller
//! typically answers by requesting a fresh snapshot from the authority and
//! [`Session::bootstrap_from_snapshot`].

use std::collections::BTreeMap;

use cadence_ecs::schedule::Phase;
use cadence_ecs::snapshot::SnapshotReport;
use cadence_ecs::world::World;

use crate::input::{FrameInputs, InputHistory};
use crate::physics::{PhysicsConfig, PhysicsWorld2D};
use crate::rollback::RollbackBuffer;
use crate::EngineError;

// ---------------------------------------------------------------------------
// Misprediction
// ---------------------------------------------------------------------------

/// Evidence of a rolled-back frame: the hash the client predicted against
/// the hash the confirmed inputs produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Misprediction {
    pub frame: u64,
    pub predicted_hash: u32,
    pub confirmed_hash: u32,
}

/// A pending prediction awaiting confirmation.
#[derive(Debug, Clone)]
struct Prediction {
    frame: u64,
    /// The full input map the frame was ticked with.
    inputs: BTreeMap<i32, Vec<u8>>,
    post_tick_hash: u32,
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// World + physics + rollback machinery for one peer.
pub struct Session {
    world: World,
    physics: PhysicsWorld2D,
    rollback: RollbackBuffer,
    history: InputHistory,
    predictions: Vec<Prediction>,
    on_misprediction: Option<Box<dyn FnMut(&Misprediction)>>,
}

impl Session {
    /// Wrap a world. Physics components are defined on it here, so call
    /// this before registering entity types that reference them.
    pub fn new(mut world: World, physics_config: PhysicsConfig) -> Self {
        let physics = PhysicsWorld2D::new(&mut world, physics_config);
        let mut session = Self {
            world,
            physics,
            rollback: RollbackBuffer::default(),
            history: InputHistory::default(),
            predictions: Vec::new(),
            on_misprediction: None,
        };
        // Seed the ring so the very first confirmation has a base state.
        session.rollback.save(&session.world, session.world.frame());
        session
    }

    // -- accessors -----------------------------------------------------------

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn physics(&self) -> &PhysicsWorld2D {
        &self.physics
    }

    pub fn physics_mut(&mut self) -> &mut PhysicsWorld2D {
        &mut self.physics
    }

    pub fn history(&self) -> &InputHistory {
        &self.history
    }

    pub fn frame(&self) -> u64 {
        self.world.frame()
    }

    pub fn state_hash(&self) -> u32 {
        self.world.state_hash()
    }

    pub fn pending_predictions(&self) -> usize {
        self.predictions.len()
    }

    /// Install the rollback callback, invoked once per misprediction
    /// before resimulation begins.
    pub fn on_misprediction(&mut self, callback: impl FnMut(&Misprediction) + 'static) {
        self.on_misprediction = Some(Box::new(callback));
    }

    /// Clear sleep state on every physics body.
    ///
    /// Sleep bookkeeping is synchronized component data, so this is a
    /// *simulation event*: every peer must apply it on the same frame (a
    /// quake, a global impulse) or their hashes diverge. Restores never
    /// call it -- a snapshot already carries exact sleep state, and waking
    /// on one peer only would manufacture the very asymmetry sleeping is
    /// not allowed to cause.
    pub fn wake_all_bodies(&mut self) {
        self.physics.wake_all(&mut self.world);
    }

    // -- frame execution -----------------------------------------------------

    /// One canonical frame: sim phases with the physics pipeline at the
    /// head of the `physics` phase.
    fn run_frame(&mut self, frame: u64, inputs: &BTreeMap<i32, Vec<u8>>) {
        let _sim = crate::guard::simulation_scope();
        self.world.begin_tick(frame, inputs);
        self.world.run_phase(Phase::Input);
        self.world.run_phase(Phase::Update);
        self.world.run_phase(Phase::PrePhysics);
        self.physics.step(&mut self.world);
        self.world.run_phase(Phase::Physics);
        self.world.run_phase(Phase::PostPhysics);
        self.world.end_tick();
    }

    /// Record a predicted input for `frame` without ticking (several
    /// clients' worth can be recorded before one [`advance`](Self::advance)).
    pub fn record_input(&mut self, frame: u64, client: i32, input: Vec<u8>) {
        self.history.set_input(frame, client, input);
    }

    /// Record the local client's input for `frame` and tick it
    /// predictively.
    pub fn predict_tick(&mut self, frame: u64, local_client: i32, input: Vec<u8>) {
        self.history.set_input(frame, local_client, input);
        self.advance(frame);
    }

    /// Tick `frame` with whatever the history holds for it, snapshot the
    /// result, and remember the prediction.
    pub fn advance(&mut self, frame: u64) {
        let inputs = self.history.replay_inputs(frame);
        self.run_frame(frame, &inputs);
        self.rollback.save(&self.world, frame);
        self.predictions.push(Prediction {
            frame,
            inputs,
            post_tick_hash: self.world.state_hash(),
        });
    }

    // -- confirmation --------------------------------------------------------

    /// Apply the authority's inputs for `frame`.
    ///
    /// Returns `Ok(None)` when the prediction held (or none existed) and
    /// `Ok(Some(_))` after a rollback-and-resimulate. The world always
    /// ends back at the frame it was on when this was called (or at
    /// `frame`, if the session had no prediction and was behind).
    pub fn confirm_server_frame(
        &mut self,
        frame: u64,
        confirmed: BTreeMap<i32, Vec<u8>>,
    ) -> Result<Option<Misprediction>, EngineError> {
        self.history.confirm_frame(frame, confirmed.clone());

        let Some(position) = self.predictions.iter().position(|p| p.frame == frame) else {
            // Never predicted this frame: a pure follower tick.
            self.run_frame(frame, &confirmed);
            self.rollback.save(&self.world, frame);
            return Ok(None);
        };
        let prediction = self.predictions.remove(position);

        // Identical inputs reproduce identical state by determinism; skip
        // the restore entirely.
        if prediction.inputs == confirmed {
            self.discard_through(frame);
            return Ok(None);
        }

        // Re-derive frame `frame` from the nearest retained snapshot.
        let current = self.world.frame();
        let target = frame.saturating_sub(1);
        let base = self
            .rollback
            .latest_at_or_before(target)
            .ok_or(EngineError::RollbackWindowExceeded {
                frame: target,
                oldest: self.rollback.oldest(),
            })?;
        self.rollback.restore(&mut self.world, base)?;
        for f in (base + 1)..=frame {
            let inputs = self.history.replay_inputs(f);
            self.run_frame(f, &inputs);
        }
        let confirmed_hash = self.world.state_hash();
        self.rollback.save(&self.world, frame);

        let outcome = if confirmed_hash == prediction.post_tick_hash {
            None
        } else {
            let misprediction = Misprediction {
                frame,
                predicted_hash: prediction.post_tick_hash,
                confirmed_hash,
            };
            if let Some(callback) = &mut self.on_misprediction {
                callback(&misprediction);
            }
            Some(misprediction)
        };

        // Resimulate back to the present regardless: the world currently
        // sits at `frame`, and later predictions must be rebased onto the
        // corrected timeline.
        for f in (frame + 1)..=current {
            let inputs = self.history.replay_inputs(f);
            self.run_frame(f, &inputs);
            self.rollback.save(&self.world, f);
            let hash = self.world.state_hash();
            if let Some(pending) = self.predictions.iter_mut().find(|p| p.frame == f) {
                pending.inputs = inputs;
                pending.post_tick_hash = hash;
            }
        }

        self.discard_through(frame);
        Ok(outcome)
    }

    fn discard_through(&mut self, frame: u64) {
        self.predictions.retain(|p| p.frame > frame);
        self.history.prune(frame);
    }

    // -- late join -----------------------------------------------------------

    /// Adopt an authority snapshot wholesale: decode it, reset the ring
    /// around it, drop pending predictions, and optionally adopt a
    /// transferred input history.
    pub fn bootstrap_from_snapshot(
        &mut self,
        bytes: &[u8],
        history: Option<BTreeMap<u64, FrameInputs>>,
    ) -> Result<SnapshotReport, EngineError> {
        let report = self.world.decode_snapshot(bytes)?;
        self.rollback.clear();
        self.rollback.save(&self.world, self.world.frame());
        self.predictions.clear();
        if let Some(state) = history {
            self.history.set_state(state);
        }
        Ok(report)
    }

    /// Replay from the current frame up to `to_frame` using recorded
    /// history (late-join catch-up).
    pub fn catch_up(&mut self, to_frame: u64) {
        let from = self.world.frame() + 1;
        for frame in from..=to_frame {
            self.advance(frame);
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("frame", &self.world.frame())
            .field("pending_predictions", &self.predictions.len())
            .field("rollback_frames", &self.rollback.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
