//! Bounded ring of encoded world snapshots, keyed by frame.
//!
//! Each entry is the full Format v4 byte blob for the world *after* that
//! frame was ticked. The prediction loop saves one per predicted tick and
//! restores the newest entry at or before a rollback target; anything
//! older than the ring is gone, which surfaces as
//! [`EngineError::RollbackWindowExceeded`].

use std::collections::BTreeMap;

use cadence_ecs::snapshot::SnapshotReport;
use cadence_ecs::world::World;

use crate::EngineError;

/// Default ring capacity, in frames (one second at 60 Hz).
pub const DEFAULT_ROLLBACK_FRAMES: usize = 60;

/// Frame-keyed snapshot ring.
#[derive(Debug)]
pub struct RollbackBuffer {
    capacity: usize,
    snapshots: BTreeMap<u64, Vec<u8>>,
}

impl RollbackBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            snapshots: BTreeMap::new(),
        }
    }

    /// Encode the world and store it under `frame`, evicting the oldest
    /// entries beyond capacity.
    pub fn save(&mut self, world: &World, frame: u64) {
        self.snapshots.insert(frame, world.encode_snapshot(frame));
        while self.snapshots.len() > self.capacity {
            let oldest = *self.snapshots.keys().next().expect("non-empty map");
            self.snapshots.remove(&oldest);
        }
    }

    /// Restore the world to exactly `frame`.
    pub fn restore(&self, world: &mut World, frame: u64) -> Result<SnapshotReport, EngineError> {
        let bytes = self
            .snapshots
            .get(&frame)
            .ok_or(EngineError::RollbackWindowExceeded {
                frame,
                oldest: self.oldest(),
            })?;
        world.decode_snapshot(bytes).map_err(EngineError::from)
    }

    /// The newest retained frame at or before `frame`, if any.
    pub fn latest_at_or_before(&self, frame: u64) -> Option<u64> {
        self.snapshots.range(..=frame).next_back().map(|(&f, _)| f)
    }

    pub fn contains(&self, frame: u64) -> bool {
        self.snapshots.contains_key(&frame)
    }

    pub fn oldest(&self) -> Option<u64> {
        self.snapshots.keys().next().copied()
    }

    pub fn newest(&self) -> Option<u64> {
        self.snapshots.keys().next_back().copied()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Drop everything (fresh-snapshot bootstrap).
    pub fn clear(&mut self) {
        self.snapshots.clear();
    }
}

impl Default for RollbackBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_ROLLBACK_FRAMES)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
