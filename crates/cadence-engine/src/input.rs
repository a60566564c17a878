//! Per-frame, per-client input history.
//!
//! The history distinguishes *predicted* inputs (what this client guessed
//! or locally sampled) from *confirmed* inputs (what the authority settled
//! on for a frame). Resimulation after a rollback replays confirmed inputs
//! where they exist and falls back to the surviving predictions elsewhere.
//!
//! Everything iterates in ascending frame order, and within a frame in
//! ascending clientId order -- the resimulation determinism contract.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Default retention, in frames (two seconds at 60 Hz).
pub const DEFAULT_HISTORY_FRAMES: usize = 120;

/// Inputs recorded for one frame.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameInputs {
    /// Whether the authority has settled this frame.
    pub confirmed: bool,
    /// clientId -> opaque payload, ascending by clientId.
    pub inputs: BTreeMap<i32, Vec<u8>>,
}

/// Bounded store of recent frames.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputHistory {
    capacity: usize,
    frames: BTreeMap<u64, FrameInputs>,
}

impl InputHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            frames: BTreeMap::new(),
        }
    }

    /// Record a locally predicted input. Ignored if the frame is already
    /// confirmed -- authoritative data never regresses to a guess.
    pub fn set_input(&mut self, frame: u64, client_id: i32, data: Vec<u8>) {
        let entry = self.frames.entry(frame).or_default();
        if entry.confirmed {
            return;
        }
        entry.inputs.insert(client_id, data);
        self.evict_overflow();
    }

    /// Replace a frame's contents with the authority's inputs and mark it
    /// confirmed.
    pub fn confirm_frame(&mut self, frame: u64, inputs: BTreeMap<i32, Vec<u8>>) {
        self.frames.insert(
            frame,
            FrameInputs {
                confirmed: true,
                inputs,
            },
        );
        self.evict_overflow();
    }

    pub fn is_confirmed(&self, frame: u64) -> bool {
        self.frames.get(&frame).is_some_and(|f| f.confirmed)
    }

    /// The recorded inputs for one frame, if any.
    pub fn get(&self, frame: u64) -> Option<&FrameInputs> {
        self.frames.get(&frame)
    }

    /// The inputs to replay for `frame`: confirmed where available, the
    /// surviving prediction otherwise, empty when nothing was recorded.
    pub fn replay_inputs(&self, frame: u64) -> BTreeMap<i32, Vec<u8>> {
        self.frames
            .get(&frame)
            .map(|f| f.inputs.clone())
            .unwrap_or_default()
    }

    /// Frames in `[from, to]`, ascending.
    pub fn range(&self, from: u64, to: u64) -> Vec<(u64, &FrameInputs)> {
        self.frames
            .range(from..=to)
            .map(|(&frame, inputs)| (frame, inputs))
            .collect()
    }

    /// Drop every frame strictly before `frame`.
    pub fn prune(&mut self, frame: u64) {
        self.frames = self.frames.split_off(&frame);
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn oldest_frame(&self) -> Option<u64> {
        self.frames.keys().next().copied()
    }

    pub fn newest_frame(&self) -> Option<u64> {
        self.frames.keys().next_back().copied()
    }

    /// Serializable state for late-joiner transfer.
    pub fn get_state(&self) -> BTreeMap<u64, FrameInputs> {
        self.frames.clone()
    }

    /// Adopt a transferred state wholesale.
    pub fn set_state(&mut self, state: BTreeMap<u64, FrameInputs>) {
        self.frames = state;
        self.evict_overflow();
    }

    fn evict_overflow(&mut self) {
        while self.frames.len() > self.capacity {
            let oldest = *self.frames.keys().next().expect("non-empty map");
            self.frames.remove(&oldest);
        }
    }
}

impl Default for InputHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_FRAMES)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
