//! Secondary indices and snapshot-semantics iteration.
//!
//! The [`QueryIndex`] keeps three incrementally-maintained indices over the
//! live entity set: type name -> sorted id set, component -> sorted id set,
//! and clientId -> id (unique). Sorted sets (`BTreeSet`) are load-bearing:
//! every sequence game code can observe must be ascending by entity id, so
//! hash-map iteration order never leaks into the simulation.
//!
//! Iterators *snapshot* the matching ids when they are created: the id list
//! is copied out of the index, so game code is free to spawn and destroy
//! entities mid-traversal without invalidating anything. An id whose entity
//! was destroyed after the copy is simply skipped by the caller's liveness
//! check (see `World::each_alive`).

use std::collections::{BTreeMap, BTreeSet};

use crate::entity::EntityId;
use crate::storage::ComponentId;

// ---------------------------------------------------------------------------
// EntityIter
// ---------------------------------------------------------------------------

/// An iterator over a list of entity ids captured at creation time.
///
/// Holds no borrow into the world or its indices.
#[derive(Debug, Clone)]
pub struct EntityIter {
    ids: Vec<EntityId>,
    pos: usize,
}

impl EntityIter {
    pub(crate) fn new(ids: Vec<EntityId>) -> Self {
        Self { ids, pos: 0 }
    }

    /// Remaining ids without consuming the iterator.
    pub fn as_slice(&self) -> &[EntityId] {
        &self.ids[self.pos..]
    }

    /// Total ids captured at construction.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl Iterator for EntityIter {
    type Item = EntityId;

    fn next(&mut self) -> Option<EntityId> {
        let id = self.ids.get(self.pos).copied();
        self.pos += 1;
        id
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let rest = self.ids.len() - self.pos.min(self.ids.len());
        (rest, Some(rest))
    }
}

// ---------------------------------------------------------------------------
// QueryIndex
// ---------------------------------------------------------------------------

/// The three secondary indices, maintained by the world on every spawn,
/// destroy, and component add/remove.
#[derive(Debug, Clone, Default)]
pub struct QueryIndex {
    by_type: BTreeMap<String, BTreeSet<EntityId>>,
    by_component: BTreeMap<ComponentId, BTreeSet<EntityId>>,
    by_client: BTreeMap<i32, EntityId>,
}

impl QueryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    // -- maintenance ---------------------------------------------------------

    pub(crate) fn insert_type(&mut self, type_name: &str, id: EntityId) {
        self.by_type.entry(type_name.to_owned()).or_default().insert(id);
    }

    pub(crate) fn remove_type(&mut self, type_name: &str, id: EntityId) {
        if let Some(set) = self.by_type.get_mut(type_name) {
            set.remove(&id);
            if set.is_empty() {
                self.by_type.remove(type_name);
            }
        }
    }

    pub(crate) fn insert_component(&mut self, component: ComponentId, id: EntityId) {
        self.by_component.entry(component).or_default().insert(id);
    }

    pub(crate) fn remove_component(&mut self, component: ComponentId, id: EntityId) {
        if let Some(set) = self.by_component.get_mut(&component) {
            set.remove(&id);
        }
    }

    pub(crate) fn insert_client(&mut self, client_id: i32, id: EntityId) {
        self.by_client.insert(client_id, id);
    }

    pub(crate) fn remove_client(&mut self, client_id: i32, id: EntityId) {
        // Only remove if the mapping still points at this entity; a later
        // spawn may have reclaimed the clientId.
        if self.by_client.get(&client_id) == Some(&id) {
            self.by_client.remove(&client_id);
        }
    }

    pub(crate) fn clear(&mut self) {
        self.by_type.clear();
        self.by_component.clear();
        self.by_client.clear();
    }

    // -- queries -------------------------------------------------------------

    /// All entities of one type, ascending by id.
    pub fn by_type(&self, type_name: &str) -> EntityIter {
        EntityIter::new(
            self.by_type
                .get(type_name)
                .map(|set| set.iter().copied().collect())
                .unwrap_or_default(),
        )
    }

    /// All entities carrying every listed component, ascending by id.
    ///
    /// Scans the smallest of the k component sets and keeps ids present in
    /// all the others.
    pub fn by_components(&self, components: &[ComponentId]) -> EntityIter {
        let Some(sets) = components
            .iter()
            .map(|c| self.by_component.get(c))
            .collect::<Option<Vec<_>>>()
        else {
            return EntityIter::new(Vec::new());
        };
        if sets.is_empty() {
            return EntityIter::new(Vec::new());
        }
        let smallest = sets
            .iter()
            .enumerate()
            .min_by_key(|(_, s)| s.len())
            .map(|(i, _)| i)
            .unwrap_or(0);
        let ids = sets[smallest]
            .iter()
            .copied()
            .filter(|id| {
                sets.iter()
                    .enumerate()
                    .all(|(i, s)| i == smallest || s.contains(id))
            })
            .collect();
        EntityIter::new(ids)
    }

    /// Entities of `type_name` carrying every listed component.
    pub fn query(&self, type_name: &str, components: &[ComponentId]) -> EntityIter {
        let Some(type_set) = self.by_type.get(type_name) else {
            return EntityIter::new(Vec::new());
        };
        let Some(sets) = components
            .iter()
            .map(|c| self.by_component.get(c))
            .collect::<Option<Vec<_>>>()
        else {
            return EntityIter::new(Vec::new());
        };
        let ids = type_set
            .iter()
            .copied()
            .filter(|id| sets.iter().all(|s| s.contains(id)))
            .collect();
        EntityIter::new(ids)
    }

    /// The unique entity bound to a clientId, if any. O(log n).
    pub fn by_client_id(&self, client_id: i32) -> Option<EntityId> {
        self.by_client.get(&client_id).copied()
    }

    /// Ids of every indexed entity of any type, ascending.
    pub fn all_typed(&self) -> EntityIter {
        let mut ids: BTreeSet<EntityId> = BTreeSet::new();
        for set in self.by_type.values() {
            ids.extend(set.iter().copied());
        }
        EntityIter::new(ids.into_iter().collect())
    }

    /// Membership count for one component set (diagnostics, tests).
    pub fn component_count(&self, component: ComponentId) -> usize {
        self.by_component.get(&component).map_or(0, BTreeSet::len)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
