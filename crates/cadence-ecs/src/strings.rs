//! Namespaced string interning with deterministic id allocation.
//!
//! Entity type names, component names, and any other string the simulation
//! wants to compare or hash cheaply are interned here into positive `i32`
//! ids. Ids are handed out in first-intern order per namespace, so two
//! peers agree on every id as long as their first-intern events happen in
//! the same order -- which is guaranteed when interning happens during
//! deterministic simulation phases or world setup.
//!
//! The full registry state rides in every snapshot so a late joiner adopts
//! the authority's exact tables.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// StringRegistry
// ---------------------------------------------------------------------------

/// Per-namespace bijection `string <-> i32` with ids starting at 1.
#[derive(Debug, Clone, Default)]
pub struct StringRegistry {
    namespaces: BTreeMap<String, Namespace>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Namespace {
    by_name: BTreeMap<String, i32>,
    by_id: BTreeMap<i32, String>,
    next_id: i32,
}

impl Namespace {
    fn new() -> Self {
        Self {
            by_name: BTreeMap::new(),
            by_id: BTreeMap::new(),
            next_id: 1,
        }
    }
}

/// Serializable registry state for the snapshot meta header.
///
/// `BTreeMap`s keep the JSON canonical.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RegistryState {
    /// namespace -> (string -> id)
    pub tables: BTreeMap<String, BTreeMap<String, i32>>,
    /// namespace -> next id to hand out
    pub next_ids: BTreeMap<String, i32>,
}

impl StringRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern `value` in `namespace`, returning its id.
    ///
    /// Idempotent: re-interning an existing string returns the id it was
    /// first assigned.
    pub fn intern(&mut self, namespace: &str, value: &str) -> i32 {
        let ns = self
            .namespaces
            .entry(namespace.to_owned())
            .or_insert_with(Namespace::new);
        if let Some(&id) = ns.by_name.get(value) {
            return id;
        }
        let id = ns.next_id;
        ns.next_id += 1;
        ns.by_name.insert(value.to_owned(), id);
        ns.by_id.insert(id, value.to_owned());
        id
    }

    /// Reverse lookup: the string for `id`, if assigned.
    pub fn get(&self, namespace: &str, id: i32) -> Option<&str> {
        self.namespaces
            .get(namespace)?
            .by_id
            .get(&id)
            .map(String::as_str)
    }

    /// Forward lookup without interning.
    pub fn lookup(&self, namespace: &str, value: &str) -> Option<i32> {
        self.namespaces.get(namespace)?.by_name.get(value).copied()
    }

    /// Number of interned strings in `namespace`.
    pub fn len(&self, namespace: &str) -> usize {
        self.namespaces.get(namespace).map_or(0, |ns| ns.by_name.len())
    }

    pub fn is_empty(&self, namespace: &str) -> bool {
        self.len(namespace) == 0
    }

    /// Capture the full registry state for a snapshot.
    pub fn state(&self) -> RegistryState {
        let mut tables = BTreeMap::new();
        let mut next_ids = BTreeMap::new();
        for (name, ns) in &self.namespaces {
            tables.insert(name.clone(), ns.by_name.clone());
            next_ids.insert(name.clone(), ns.next_id);
        }
        RegistryState { tables, next_ids }
    }

    /// Replace all tables with a snapshotted state.
    pub fn restore(&mut self, state: &RegistryState) {
        self.namespaces.clear();
        for (name, table) in &state.tables {
            let mut ns = Namespace::new();
            for (value, &id) in table {
                ns.by_name.insert(value.clone(), id);
                ns.by_id.insert(id, value.clone());
            }
            ns.next_id = state.next_ids.get(name).copied().unwrap_or_else(|| {
                table.values().max().map_or(1, |max| max + 1)
            });
            self.namespaces.insert(name.clone(), ns);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
