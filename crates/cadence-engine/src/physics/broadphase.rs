//! Spatial-hash broad phase.
//!
//! Bodies are bucketed by the cell containing their center. With the cell
//! size at least the largest body diameter, any overlapping pair sits in
//! the same or adjacent cells, so candidate pairs are: all `(i < j)` within
//! a cell, plus every cross pair against the `+x`, `+y`, `+x+y`, and
//! `-x+y` neighbors. Those four offsets cover each unordered cell
//! adjacency exactly once, which is what guarantees each candidate pair is
//! visited exactly once.
//!
//! The cell key packs the two 16-bit-masked cell coordinates:
//! `((cx & 0xFFFF) << 16) | (cy & 0xFFFF)`. Coordinates more than 2^16
//! cells apart can alias into one bucket; the narrow phase discards those
//! spurious candidates.

use std::collections::BTreeMap;

use cadence_ecs::fixed::Fixed;
use cadence_ecs::vec::FixedVec2;

/// Default cell size: 64 units.
pub const DEFAULT_CELL_SIZE: Fixed = 64 << 16;

/// One broad-phase generation; rebuilt every physics step.
#[derive(Debug)]
pub struct SpatialHashGrid {
    cell_size: Fixed,
    /// Cell key -> body indices in insertion order.
    cells: BTreeMap<u32, Vec<usize>>,
}

/// Pack masked cell coordinates into the hash key.
#[inline]
pub fn cell_key(cx: i32, cy: i32) -> u32 {
    ((cx as u32 & 0xFFFF) << 16) | (cy as u32 & 0xFFFF)
}

/// Neighbor key at a masked offset from an existing key.
#[inline]
fn offset_key(key: u32, dx: i32, dy: i32) -> u32 {
    let cx = (key >> 16) as i32;
    let cy = (key & 0xFFFF) as i32;
    cell_key(cx.wrapping_add(dx), cy.wrapping_add(dy))
}

impl SpatialHashGrid {
    pub fn new(cell_size: Fixed) -> Self {
        Self {
            cell_size,
            cells: BTreeMap::new(),
        }
    }

    /// Cell coordinate for one axis: `floor(v / cell_size)` with true
    /// floor semantics for negative coordinates.
    #[inline]
    fn cell_coord(&self, v: Fixed) -> i32 {
        (v as i64).div_euclid(self.cell_size as i64) as i32
    }

    /// Insert a body index at its center position.
    pub fn insert(&mut self, index: usize, position: FixedVec2) {
        let key = cell_key(self.cell_coord(position.x), self.cell_coord(position.y));
        self.cells.entry(key).or_default().push(index);
    }

    /// Visit every candidate pair exactly once, in a deterministic order:
    /// cells ascending by key, in-cell pairs before neighbor pairs.
    pub fn for_each_pair(&self, mut f: impl FnMut(usize, usize)) {
        for (&key, items) in &self.cells {
            for i in 0..items.len() {
                for j in (i + 1)..items.len() {
                    f(items[i], items[j]);
                }
            }
            for (dx, dy) in [(1, 0), (0, 1), (1, 1), (-1, 1)] {
                if let Some(neighbors) = self.cells.get(&offset_key(key, dx, dy)) {
                    for &a in items {
                        for &b in neighbors {
                            f(a, b);
                        }
                    }
                }
            }
        }
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    pub fn clear(&mut self) {
        self.cells.clear();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
