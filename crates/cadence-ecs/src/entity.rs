//! Entity identifiers and generational allocation.
//!
//! An [`EntityId`] is a 32-bit handle: the low 20 bits are the index, the
//! high 12 bits are a generation counter wrapping modulo 2^12. The top bit
//! of the *index field* (bit 19) is the reserved local-only marker: ids
//! from the local allocator always carry it, so a raw id is enough to
//! exclude an entity from snapshots and the state hash, and the
//! generation field stays fully intact for both allocators. Each
//! allocator therefore addresses up to 2^19 - 1 ordinals below the
//! marker, far above any practical ceiling.
//!
//! Freeing bumps the generation for the index, which makes any handle that
//! outlived its entity detectably stale. The free list is kept in strictly
//! ascending index order and allocation always takes the smallest free
//! index -- entity ids are part of the synchronized state, so every peer
//! must recycle indices identically.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::SimError;

/// Number of index bits in an id.
pub const INDEX_BITS: u32 = 20;

/// Mask for the index portion.
pub const INDEX_MASK: u32 = (1 << INDEX_BITS) - 1;

/// Mask for the 12-bit generation field.
pub const GENERATION_MASK: u32 = 0xFFF;

/// Generations wrap modulo 2^12.
const GENERATION_WRAP: u32 = GENERATION_MASK + 1;

/// The local-entity marker: the top bit of the index field (bit 19).
pub const LOCAL_BIT: u32 = 1 << (INDEX_BITS - 1);

/// Mask for the allocator-relative part of the index (marker stripped).
pub const ORDINAL_MASK: u32 = LOCAL_BIT - 1;

/// Default entity ceiling when no configuration overrides it.
pub const DEFAULT_ENTITY_CEILING: u32 = 10_000;

// ---------------------------------------------------------------------------
// EntityId
// ---------------------------------------------------------------------------

/// A generational entity identifier.
///
/// Layout: `[generation: 12 | local: 1 | ordinal: 19]` -- the local marker
/// is the top bit of the 20-bit index field.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(u32);

impl EntityId {
    /// Compose an id from an index (marker included, if any) and a
    /// generation.
    #[inline]
    pub fn new(index: u32, generation: u32) -> Self {
        Self(((generation & GENERATION_MASK) << INDEX_BITS) | (index & INDEX_MASK))
    }

    /// The index field (low 20 bits, local marker included).
    #[inline]
    pub fn index(self) -> u32 {
        self.0 & INDEX_MASK
    }

    /// The allocator-relative index with the local marker stripped.
    #[inline]
    pub fn ordinal(self) -> u32 {
        self.0 & ORDINAL_MASK
    }

    /// The generation field (high 12 bits).
    #[inline]
    pub fn generation(self) -> u32 {
        (self.0 >> INDEX_BITS) & GENERATION_MASK
    }

    /// Whether this id came from the local-only allocator.
    #[inline]
    pub fn is_local(self) -> bool {
        self.0 & LOCAL_BIT != 0
    }

    #[inline]
    pub fn to_raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_local() {
            write!(f, "EntityId(local {}v{})", self.ordinal(), self.generation())
        } else {
            write!(f, "EntityId({}v{})", self.index(), self.generation())
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_local() {
            write!(f, "local {}v{}", self.ordinal(), self.generation())
        } else {
            write!(f, "{}v{}", self.index(), self.generation())
        }
    }
}

// ---------------------------------------------------------------------------
// EntityAllocator
// ---------------------------------------------------------------------------

/// Allocates and recycles [`EntityId`]s with generational tracking.
///
/// One instance serves synchronized entities; a second, constructed with
/// [`new_local`](Self::new_local), serves local-only entities and stamps
/// [`LOCAL_BIT`] into every id it produces.
#[derive(Debug, Clone)]
pub struct EntityAllocator {
    /// Current 12-bit generation for each index slot.
    generations: Vec<u32>,
    /// Whether the slot currently holds a live entity.
    active: Vec<bool>,
    /// Recyclable indices in strictly ascending order.
    free: Vec<u32>,
    /// One past the highest index ever handed out.
    next_index: u32,
    /// Hard cap on concurrent entities.
    ceiling: u32,
    /// Whether produced ids carry the local marker.
    local: bool,
}

impl EntityAllocator {
    /// Allocator for synchronized entities.
    pub fn new(ceiling: u32) -> Self {
        assert!(
            ceiling <= LOCAL_BIT,
            "entity ceiling {ceiling} exceeds the index space below the local marker"
        );
        Self {
            generations: Vec::new(),
            active: Vec::new(),
            free: Vec::new(),
            next_index: 0,
            ceiling,
            local: false,
        }
    }

    /// Allocator for local-only entities.
    pub fn new_local(ceiling: u32) -> Self {
        Self {
            local: true,
            ..Self::new(ceiling)
        }
    }

    #[inline]
    fn compose(&self, ordinal: u32) -> EntityId {
        let gen = self.generations[ordinal as usize];
        let raw = ((gen & GENERATION_MASK) << INDEX_BITS) | ordinal;
        if self.local {
            EntityId::from_raw(raw | LOCAL_BIT)
        } else {
            EntityId::from_raw(raw)
        }
    }

    fn grow_to(&mut self, index: u32) {
        let needed = index as usize + 1;
        if self.generations.len() < needed {
            self.generations.resize(needed, 0);
            self.active.resize(needed, false);
        }
    }

    /// Allocate a fresh id: smallest free index first, then the next
    /// untouched index below the ceiling.
    pub fn allocate(&mut self) -> Result<EntityId, SimError> {
        if let Some(&index) = self.free.first() {
            self.free.remove(0);
            self.active[index as usize] = true;
            return Ok(self.compose(index));
        }
        if self.next_index >= self.ceiling {
            return Err(SimError::CapacityExceeded {
                ceiling: self.ceiling,
            });
        }
        let index = self.next_index;
        self.next_index += 1;
        self.grow_to(index);
        self.active[index as usize] = true;
        Ok(self.compose(index))
    }

    /// Free an id. A stale generation is a silent no-op (returns `false`).
    ///
    /// On success the slot's generation is bumped (mod 2^12) and the
    /// index re-enters the free list at its sorted position.
    pub fn free(&mut self, id: EntityId) -> bool {
        if !self.is_valid(id) {
            return false;
        }
        let ordinal = id.ordinal();
        self.active[ordinal as usize] = false;
        self.generations[ordinal as usize] =
            (self.generations[ordinal as usize] + 1) % GENERATION_WRAP;
        let pos = self.free.partition_point(|&i| i < ordinal);
        self.free.insert(pos, ordinal);
        true
    }

    /// Claim a specific id, as handed out by another peer.
    ///
    /// Snapshot restore must recreate entities under their original ids so
    /// that external references (camera targets, collision handlers) stay
    /// valid. The index is marked active, its generation is taken from the
    /// id, and it is removed from the free list if present. Indices skipped
    /// over become free.
    pub fn allocate_specific(&mut self, id: EntityId) -> Result<(), SimError> {
        if id.is_local() != self.local {
            return Err(SimError::InvalidEntityId { entity: id });
        }
        let ordinal = id.ordinal();
        if ordinal >= self.ceiling {
            return Err(SimError::CapacityExceeded {
                ceiling: self.ceiling,
            });
        }
        self.grow_to(ordinal);
        // Any brand-new indices below this one become allocatable.
        while self.next_index < ordinal {
            let skipped = self.next_index;
            let pos = self.free.partition_point(|&i| i < skipped);
            self.free.insert(pos, skipped);
            self.next_index += 1;
        }
        if self.next_index == ordinal {
            self.next_index = ordinal + 1;
        }
        if let Ok(pos) = self.free.binary_search(&ordinal) {
            self.free.remove(pos);
        }
        self.active[ordinal as usize] = true;
        self.generations[ordinal as usize] = id.generation() & GENERATION_MASK;
        Ok(())
    }

    /// Whether `id` names a live entity of this allocator.
    pub fn is_valid(&self, id: EntityId) -> bool {
        if id.is_local() != self.local {
            return false;
        }
        let ordinal = id.ordinal() as usize;
        ordinal < self.active.len()
            && self.active[ordinal]
            && self.compose(id.ordinal()) == id
    }

    /// Live entity count.
    pub fn active_count(&self) -> usize {
        self.active.iter().filter(|&&a| a).count()
    }

    /// All live ids in ascending order.
    pub fn active_ids(&self) -> Vec<EntityId> {
        (0..self.generations.len() as u32)
            .filter(|&i| self.active[i as usize])
            .map(|i| self.compose(i))
            .collect()
    }

    pub fn ceiling(&self) -> u32 {
        self.ceiling
    }

    pub fn next_index(&self) -> u32 {
        self.next_index
    }

    /// Minimal snapshot state: `next_index` plus the active index ->
    /// generation map. The free list is the complement of the active set
    /// over `[0, next_index)` and is rebuilt on restore.
    pub fn snapshot_state(&self) -> (u32, BTreeMap<u32, u32>) {
        let mut gens = BTreeMap::new();
        for i in 0..self.generations.len() as u32 {
            if self.active[i as usize] {
                gens.insert(i, self.generations[i as usize]);
            }
        }
        (self.next_index, gens)
    }

    /// Rebuild the allocator from its minimal snapshot state.
    pub fn restore(&mut self, next_index: u32, active_generations: &BTreeMap<u32, u32>) {
        self.generations.clear();
        self.active.clear();
        self.free.clear();
        self.next_index = next_index;
        if next_index > 0 {
            self.grow_to(next_index - 1);
        }
        for (&index, &gen) in active_generations {
            self.grow_to(index);
            self.active[index as usize] = true;
            self.generations[index as usize] = gen & GENERATION_MASK;
        }
        for i in 0..next_index {
            if !self.active[i as usize] {
                self.free.push(i);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn alloc() -> EntityAllocator {
        EntityAllocator::new(DEFAULT_ENTITY_CEILING)
    }

    #[test]
    fn allocate_unique_ascending_indices() {
        let mut a = alloc();
        let ids: Vec<EntityId> = (0..100).map(|_| a.allocate().unwrap()).collect();
        for (i, id) in ids.iter().enumerate() {
            assert_eq!(id.index(), i as u32);
            assert_eq!(id.generation(), 0);
            assert!(!id.is_local());
        }
    }

    #[test]
    fn free_then_allocate_reuses_smallest_index() {
        let mut a = alloc();
        let ids: Vec<EntityId> = (0..5).map(|_| a.allocate().unwrap()).collect();
        a.free(ids[3]);
        a.free(ids[1]);
        // Smallest freed index comes back first, with a bumped generation.
        let e = a.allocate().unwrap();
        assert_eq!(e.index(), 1);
        assert_eq!(e.generation(), 1);
        let e = a.allocate().unwrap();
        assert_eq!(e.index(), 3);
    }

    #[test]
    fn stale_id_is_invalid_and_free_is_noop() {
        let mut a = alloc();
        let e = a.allocate().unwrap();
        assert!(a.is_valid(e));
        assert!(a.free(e));
        assert!(!a.is_valid(e));
        assert!(!a.free(e), "double free must be a no-op");
        let recycled = a.allocate().unwrap();
        assert_eq!(recycled.index(), e.index());
        assert!(!a.is_valid(e), "old handle stays stale after recycle");
        assert!(a.is_valid(recycled));
    }

    #[test]
    fn ceiling_is_enforced() {
        let mut a = EntityAllocator::new(4);
        for _ in 0..4 {
            a.allocate().unwrap();
        }
        match a.allocate() {
            Err(SimError::CapacityExceeded { ceiling }) => assert_eq!(ceiling, 4),
            other => panic!("expected CapacityExceeded, got {other:?}"),
        }
    }

    #[test]
    fn free_returns_capacity() {
        let mut a = EntityAllocator::new(2);
        let e0 = a.allocate().unwrap();
        let _e1 = a.allocate().unwrap();
        assert!(a.allocate().is_err());
        a.free(e0);
        assert!(a.allocate().is_ok());
    }

    #[test]
    fn generation_wraps_mod_4096_without_live_aliasing() {
        let mut a = alloc();
        let first = a.allocate().unwrap();
        a.free(first);
        // Recycle the same index through a full generation cycle.
        let mut max_generation = 0;
        let mut seen_zero_again = false;
        for _ in 0..0x1000 {
            let e = a.allocate().unwrap();
            assert_eq!(e.index(), first.index());
            max_generation = max_generation.max(e.generation());
            if e.generation() == 0 {
                seen_zero_again = true;
                // The original handle is live again only now, by wrap.
                assert!(a.is_valid(e));
            }
            a.free(e);
        }
        // The full 12-bit range is used before wrapping.
        assert_eq!(max_generation, 0xFFF);
        assert!(seen_zero_again, "generation should wrap around");
    }

    #[test]
    fn local_allocator_marks_ids() {
        let mut local = EntityAllocator::new_local(100);
        let e = local.allocate().unwrap();
        assert!(e.is_local());
        assert!(local.is_valid(e));
        // A synced allocator refuses local ids outright.
        let synced = alloc();
        assert!(!synced.is_valid(e));
    }

    #[test]
    fn allocate_specific_claims_and_backfills() {
        let mut a = alloc();
        let id = EntityId::new(5, 7);
        a.allocate_specific(id).unwrap();
        assert!(a.is_valid(id));
        // Indices 0..5 became free; fresh allocation starts from 0.
        let e = a.allocate().unwrap();
        assert_eq!(e.index(), 0);
        assert_eq!(a.next_index(), 6);
    }

    #[test]
    fn allocate_specific_removes_from_free_list() {
        let mut a = alloc();
        let ids: Vec<EntityId> = (0..3).map(|_| a.allocate().unwrap()).collect();
        a.free(ids[1]);
        a.allocate_specific(EntityId::new(1, 4)).unwrap();
        // Index 1 is taken again; a fresh allocation moves on to index 3.
        let e = a.allocate().unwrap();
        assert_eq!(e.index(), 3);
    }

    #[test]
    fn snapshot_state_round_trip() {
        let mut a = alloc();
        let ids: Vec<EntityId> = (0..6).map(|_| a.allocate().unwrap()).collect();
        a.free(ids[2]);
        a.free(ids[4]);

        let (next_index, gens) = a.snapshot_state();
        let mut b = alloc();
        b.restore(next_index, &gens);

        assert_eq!(b.next_index(), a.next_index());
        assert_eq!(b.active_ids(), a.active_ids());
        // Both allocators hand out the same next id.
        assert_eq!(a.allocate().unwrap(), b.allocate().unwrap());
    }

    #[test]
    fn active_ids_sorted_ascending() {
        let mut a = alloc();
        for _ in 0..10 {
            a.allocate().unwrap();
        }
        let ids = a.active_ids();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
    }
}
