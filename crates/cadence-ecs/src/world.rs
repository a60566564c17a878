//! The [`World`]: owner of every piece of simulation state.
//!
//! The world ties the allocators, component stores, string registry, PRNG,
//! query index, scheduler, and input registry into one tick pipeline. All
//! state that feeds [`World::state_hash`] is mutated only through `&mut
//! World` methods, on the tick thread -- there is no interior mutability
//! and no parallelism inside a tick.
//!
//! # Tick recipe
//!
//! [`World::tick`] runs the canonical frame:
//!
//! 1. set the frame counter and route inputs to clients with live entities;
//! 2. raise the `simulating` flag;
//! 3. run `input`, `update`, `prePhysics`, `physics`, `postPhysics`;
//! 4. drop the flag and, on clients, run `render`;
//! 5. clear the per-tick input registry (unless preservation is on).
//!
//! Systems receive `&mut World`; while they run the scheduler is detached
//! from the world, which is what makes the borrow legal and re-entry a
//! structural impossibility.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::entity::{EntityAllocator, EntityId, DEFAULT_ENTITY_CEILING};
use crate::fixed::{Fixed, FIXED_DT};
use crate::hash::StateHasher;
use crate::query::{EntityIter, QueryIndex};
use crate::rng::SimRng;
use crate::schedule::{Phase, Scheduler, SystemOptions, PHASE_ORDER};
use crate::storage::{ComponentDef, ComponentId, ComponentStore, FieldId, FieldValue};
use crate::strings::StringRegistry;
use crate::SimError;

/// String-registry namespace for entity type names.
pub const NS_ENTITY_TYPES: &str = "entity_types";

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Whether this world instance is the authority or a predicting client.
/// Gates `render`-phase execution and per-system eligibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorldRole {
    Client,
    Server,
}

/// World construction parameters.
#[derive(Debug, Clone)]
pub struct WorldConfig {
    pub role: WorldRole,
    /// Hard cap on concurrent entities; storage arrays are sized to this.
    pub entity_ceiling: u32,
    /// Seed for the simulation PRNG.
    pub seed: u32,
    /// Fixed timestep, Q16.16 seconds.
    pub dt: Fixed,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            role: WorldRole::Client,
            entity_ceiling: DEFAULT_ENTITY_CEILING,
            seed: 0,
            dt: FIXED_DT,
        }
    }
}

// ---------------------------------------------------------------------------
// Entity type definitions
// ---------------------------------------------------------------------------

/// Hook invoked for each restored entity after a snapshot decode has placed
/// its component data.
pub type RestoreHook = fn(&mut World, EntityId);

/// A registered entity type: ordered component list, per-type default
/// overrides, an optional synchronization filter, and an optional restore
/// hook.
#[derive(Clone)]
pub struct EntityTypeDef {
    name: String,
    components: Vec<ComponentId>,
    overrides: BTreeMap<ComponentId, BTreeMap<String, FieldValue>>,
    /// `None` = every sync component synchronizes; `Some(list)` restricts
    /// to the listed components; an empty list marks the type local-only.
    sync_filter: Option<Vec<ComponentId>>,
    restore_hook: Option<RestoreHook>,
    /// Prop name -> (component, field), first component in declaration
    /// order wins. Built at registration.
    prop_map: BTreeMap<String, (ComponentId, FieldId)>,
}

impl std::fmt::Debug for EntityTypeDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityTypeDef")
            .field("name", &self.name)
            .field("components", &self.components)
            .field("local_only", &self.is_local_only())
            .finish()
    }
}

impl EntityTypeDef {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            components: Vec::new(),
            overrides: BTreeMap::new(),
            sync_filter: None,
            restore_hook: None,
            prop_map: BTreeMap::new(),
        }
    }

    /// Append a component to the ordered list.
    pub fn component(mut self, component: ComponentId) -> Self {
        assert!(
            !self.components.contains(&component),
            "component listed twice on entity type {:?}",
            self.name
        );
        self.components.push(component);
        self
    }

    /// Override one field's default for this entity type.
    pub fn override_field(mut self, component: ComponentId, field: &str, value: FieldValue) -> Self {
        self.overrides
            .entry(component)
            .or_default()
            .insert(field.to_owned(), value);
        self
    }

    /// Restrict synchronization to the listed components.
    pub fn sync_only(mut self, components: &[ComponentId]) -> Self {
        self.sync_filter = Some(components.to_vec());
        self
    }

    /// Mark the whole type local-only: ids come from the local allocator
    /// and nothing about these entities enters snapshots or the hash.
    pub fn local_only(mut self) -> Self {
        self.sync_filter = Some(Vec::new());
        self
    }

    pub fn on_restore(mut self, hook: RestoreHook) -> Self {
        self.restore_hook = Some(hook);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn components(&self) -> &[ComponentId] {
        &self.components
    }

    pub fn is_local_only(&self) -> bool {
        matches!(&self.sync_filter, Some(list) if list.is_empty())
    }

    /// Whether `component` synchronizes for entities of this type.
    pub fn syncs_component(&self, component: ComponentId) -> bool {
        match &self.sync_filter {
            None => true,
            Some(list) => list.contains(&component),
        }
    }

    pub fn restore_hook(&self) -> Option<RestoreHook> {
        self.restore_hook
    }
}

// ---------------------------------------------------------------------------
// Entity metadata
// ---------------------------------------------------------------------------

/// Per-entity record: type name, live component list, optional client
/// binding.
#[derive(Debug, Clone)]
pub struct EntityMeta {
    type_name: String,
    components: Vec<ComponentId>,
    client_id: Option<i32>,
}

impl EntityMeta {
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Components in declaration order, runtime additions appended.
    pub fn components(&self) -> &[ComponentId] {
        &self.components
    }

    pub fn client_id(&self) -> Option<i32> {
        self.client_id
    }
}

// ---------------------------------------------------------------------------
// World
// ---------------------------------------------------------------------------

pub struct World {
    config: WorldConfig,
    allocator: EntityAllocator,
    local_allocator: EntityAllocator,
    strings: StringRegistry,
    rng: SimRng,
    frame: u64,
    stores: Vec<ComponentStore>,
    component_by_name: BTreeMap<String, ComponentId>,
    entity_defs: BTreeMap<String, EntityTypeDef>,
    entities: BTreeMap<EntityId, EntityMeta>,
    index: QueryIndex,
    scheduler: Scheduler,
    inputs: BTreeMap<i32, Vec<u8>>,
    preserve_inputs: bool,
    simulating: bool,
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("frame", &self.frame)
            .field("entities", &self.entities.len())
            .field("components", &self.stores.len())
            .finish()
    }
}

impl World {
    pub fn new(config: WorldConfig) -> Self {
        let ceiling = config.entity_ceiling;
        Self {
            allocator: EntityAllocator::new(ceiling),
            local_allocator: EntityAllocator::new_local(ceiling),
            strings: StringRegistry::new(),
            rng: SimRng::new(config.seed),
            frame: 0,
            stores: Vec::new(),
            component_by_name: BTreeMap::new(),
            entity_defs: BTreeMap::new(),
            entities: BTreeMap::new(),
            index: QueryIndex::new(),
            scheduler: Scheduler::new(),
            inputs: BTreeMap::new(),
            preserve_inputs: false,
            simulating: false,
            config,
        }
    }

    // -- configuration accessors ---------------------------------------------

    pub fn role(&self) -> WorldRole {
        self.config.role
    }

    pub fn dt(&self) -> Fixed {
        self.config.dt
    }

    pub fn entity_ceiling(&self) -> u32 {
        self.config.entity_ceiling
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub(crate) fn set_frame(&mut self, frame: u64) {
        self.frame = frame;
    }

    /// Whether a tick is currently executing phases.
    pub fn is_simulating(&self) -> bool {
        self.simulating
    }

    pub fn rng(&self) -> &SimRng {
        &self.rng
    }

    pub fn rng_mut(&mut self) -> &mut SimRng {
        &mut self.rng
    }

    pub(crate) fn set_rng(&mut self, rng: SimRng) {
        self.rng = rng;
    }

    pub fn strings(&self) -> &StringRegistry {
        &self.strings
    }

    pub fn strings_mut(&mut self) -> &mut StringRegistry {
        &mut self.strings
    }

    // -- component definition ------------------------------------------------

    /// Define a component schema. Components are defined once, at startup.
    ///
    /// # Panics
    ///
    /// Panics if the name is already taken -- redefining a schema mid-run
    /// would desynchronize every peer.
    pub fn define_component(&mut self, def: ComponentDef) -> ComponentId {
        assert!(
            !self.component_by_name.contains_key(&def.name),
            "component name {:?} is already defined",
            def.name
        );
        let id = ComponentId(self.stores.len() as u32);
        self.component_by_name.insert(def.name.clone(), id);
        // Columns carry two slot ranges: synchronized entities in
        // [0, ceiling), local-only entities in [ceiling, 2 * ceiling).
        // See slot_of.
        self.stores
            .push(ComponentStore::new(def, self.config.entity_ceiling * 2));
        id
    }

    pub fn component_id(&self, name: &str) -> Option<ComponentId> {
        self.component_by_name.get(name).copied()
    }

    pub fn store(&self, component: ComponentId) -> &ComponentStore {
        &self.stores[component.0 as usize]
    }

    pub fn store_mut(&mut self, component: ComponentId) -> &mut ComponentStore {
        &mut self.stores[component.0 as usize]
    }

    pub fn stores(&self) -> &[ComponentStore] {
        &self.stores
    }

    // -- entity type definition ----------------------------------------------

    /// Register an entity type. Idempotent: re-registering an existing name
    /// keeps the first definition.
    pub fn define_entity(&mut self, mut def: EntityTypeDef) {
        if self.entity_defs.contains_key(&def.name) {
            return;
        }
        for &component in &def.components {
            assert!(
                (component.0 as usize) < self.stores.len(),
                "entity type {:?} references an undefined component",
                def.name
            );
        }
        // Build the prop-name map: first component in declaration order
        // claims each field name.
        for &component in &def.components {
            let store = &self.stores[component.0 as usize];
            for field_def in &store.def().fields {
                let field = store.field(&field_def.name).expect("field just listed");
                def.prop_map
                    .entry(field_def.name.clone())
                    .or_insert((component, field));
            }
        }
        self.strings.intern(NS_ENTITY_TYPES, &def.name);
        self.entity_defs.insert(def.name.clone(), def);
    }

    pub fn entity_def(&self, type_name: &str) -> Option<&EntityTypeDef> {
        self.entity_defs.get(type_name)
    }

    // -- entity lifecycle ----------------------------------------------------

    /// Spawn an entity of a registered type with optional spawn props.
    pub fn spawn(&mut self, type_name: &str, props: &[(&str, FieldValue)]) -> Result<EntityId, SimError> {
        self.spawn_inner(type_name, None, None, props)
    }

    /// Spawn an entity bound to a clientId (inputs route to it).
    pub fn spawn_for_client(
        &mut self,
        type_name: &str,
        client_id: i32,
        props: &[(&str, FieldValue)],
    ) -> Result<EntityId, SimError> {
        self.spawn_inner(type_name, None, Some(client_id), props)
    }

    /// Spawn under a specific id (snapshot restore path). The id's local
    /// bit must match the type's locality.
    pub fn spawn_with_id(
        &mut self,
        type_name: &str,
        id: EntityId,
        client_id: Option<i32>,
        props: &[(&str, FieldValue)],
    ) -> Result<EntityId, SimError> {
        self.spawn_inner(type_name, Some(id), client_id, props)
    }

    fn spawn_inner(
        &mut self,
        type_name: &str,
        forced_id: Option<EntityId>,
        client_id: Option<i32>,
        props: &[(&str, FieldValue)],
    ) -> Result<EntityId, SimError> {
        let def = self
            .entity_defs
            .get(type_name)
            .ok_or_else(|| SimError::UnknownEntityType {
                name: type_name.to_owned(),
            })?
            .clone();

        let local = def.is_local_only();
        let id = match forced_id {
            Some(id) => {
                if id.is_local() != local {
                    return Err(SimError::InvalidEntityId { entity: id });
                }
                let allocator = if local {
                    &mut self.local_allocator
                } else {
                    &mut self.allocator
                };
                allocator.allocate_specific(id)?;
                id
            }
            None => {
                if local {
                    self.local_allocator.allocate()?
                } else {
                    self.allocator.allocate()?
                }
            }
        };
        let slot = self.slot_of(id);

        // Initialize storage: defaults, then per-type overrides, then props.
        for &component in &def.components {
            let store = &mut self.stores[component.0 as usize];
            store.set_present(slot);
            store.initialize_defaults(slot);
            if let Some(overrides) = def.overrides.get(&component) {
                for (field_name, &value) in overrides {
                    if let Some(field) = store.field(field_name) {
                        store.write(field, slot, value);
                    }
                }
            }
        }
        for &(name, value) in props {
            match def.prop_map.get(name) {
                Some(&(component, field)) => {
                    self.stores[component.0 as usize].write(field, slot, value);
                }
                None => {
                    tracing::warn!(type_name, prop = name, "spawn prop matches no field; ignored");
                }
            }
        }

        // Indices and metadata.
        self.index.insert_type(type_name, id);
        for &component in &def.components {
            self.index.insert_component(component, id);
        }
        if let Some(client) = client_id {
            self.index.insert_client(client, id);
        }
        self.entities.insert(
            id,
            EntityMeta {
                type_name: type_name.to_owned(),
                components: def.components.clone(),
                client_id,
            },
        );
        Ok(id)
    }

    /// Destroy an entity. Fails on a stale or unknown id; on success all
    /// presence bits, indices, and the allocator slot are released.
    pub fn destroy(&mut self, id: EntityId) -> Result<(), SimError> {
        if !self.is_alive(id) {
            return Err(SimError::InvalidEntityId { entity: id });
        }
        let meta = self
            .entities
            .remove(&id)
            .ok_or(SimError::InvalidEntityId { entity: id })?;
        let slot = self.slot_of(id);
        for &component in &meta.components {
            self.stores[component.0 as usize].clear_present(slot);
            self.index.remove_component(component, id);
        }
        self.index.remove_type(&meta.type_name, id);
        if let Some(client) = meta.client_id {
            self.index.remove_client(client, id);
        }
        if id.is_local() {
            self.local_allocator.free(id);
        } else {
            self.allocator.free(id);
        }
        Ok(())
    }

    pub fn is_alive(&self, id: EntityId) -> bool {
        if id.is_local() {
            self.local_allocator.is_valid(id)
        } else {
            self.allocator.is_valid(id)
        }
    }

    /// The entity's column slot. The two allocators hand out overlapping
    /// ordinals, so local entities live in the upper half of every store.
    /// Synchronized entities keep `slot == index`, which the snapshot
    /// codec relies on.
    #[inline]
    pub fn slot_of(&self, id: EntityId) -> u32 {
        if id.is_local() {
            id.ordinal() + self.config.entity_ceiling
        } else {
            id.ordinal()
        }
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn entity_meta(&self, id: EntityId) -> Option<&EntityMeta> {
        self.entities.get(&id)
    }

    /// All live entities, ascending by raw id.
    pub fn all_entities(&self) -> EntityIter {
        EntityIter::new(self.entities.keys().copied().collect())
    }

    /// Live synchronized entities, ascending by id.
    pub fn synced_entities(&self) -> EntityIter {
        EntityIter::new(
            self.entities
                .keys()
                .copied()
                .filter(|id| !id.is_local())
                .collect(),
        )
    }

    // -- runtime component add/remove ----------------------------------------

    /// Add a component to a live entity, initialized from schema defaults.
    pub fn add_component(&mut self, id: EntityId, component: ComponentId) -> Result<(), SimError> {
        if !self.is_alive(id) {
            return Err(SimError::InvalidEntityId { entity: id });
        }
        let slot = self.slot_of(id);
        let store = &mut self.stores[component.0 as usize];
        if store.has(slot) {
            return Err(SimError::DuplicateComponent {
                entity: id,
                component: store.name().to_owned(),
            });
        }
        store.set_present(slot);
        store.initialize_defaults(slot);
        self.index.insert_component(component, id);
        self.entities
            .get_mut(&id)
            .expect("alive entity has metadata")
            .components
            .push(component);
        Ok(())
    }

    /// Remove a component from a live entity.
    pub fn remove_component(&mut self, id: EntityId, component: ComponentId) -> Result<(), SimError> {
        if !self.is_alive(id) {
            return Err(SimError::InvalidEntityId { entity: id });
        }
        let slot = self.slot_of(id);
        let store = &mut self.stores[component.0 as usize];
        if !store.has(slot) {
            return Err(SimError::ComponentAbsent {
                entity: id,
                component: store.name().to_owned(),
            });
        }
        store.clear_present(slot);
        self.index.remove_component(component, id);
        let meta = self.entities.get_mut(&id).expect("alive entity has metadata");
        meta.components.retain(|&c| c != component);
        Ok(())
    }

    pub fn has_component(&self, id: EntityId, component: ComponentId) -> bool {
        self.is_alive(id) && self.store(component).has(self.slot_of(id))
    }

    // -- field access --------------------------------------------------------

    fn checked_field(
        &self,
        id: EntityId,
        component: ComponentId,
        field: &str,
    ) -> Result<FieldId, SimError> {
        if !self.is_alive(id) {
            return Err(SimError::InvalidEntityId { entity: id });
        }
        let store = self.store(component);
        if !store.has(self.slot_of(id)) {
            return Err(SimError::ComponentAbsent {
                entity: id,
                component: store.name().to_owned(),
            });
        }
        store.field(field).ok_or_else(|| SimError::ComponentAbsent {
            entity: id,
            component: format!("{}.{}", store.name(), field),
        })
    }

    /// Read a field's raw fixed/int value.
    pub fn get_i32(&self, id: EntityId, component: ComponentId, field: &str) -> Result<i32, SimError> {
        let f = self.checked_field(id, component, field)?;
        Ok(self.store(component).get_i32(f, self.slot_of(id)))
    }

    pub fn set_i32(
        &mut self,
        id: EntityId,
        component: ComponentId,
        field: &str,
        value: i32,
    ) -> Result<(), SimError> {
        let f = self.checked_field(id, component, field)?;
        let slot = self.slot_of(id);
        self.store_mut(component).set_i32(f, slot, value);
        Ok(())
    }

    /// Read a fixed-point field through the float lens (render-side).
    pub fn get_float(
        &self,
        id: EntityId,
        component: ComponentId,
        field: &str,
    ) -> Result<f32, SimError> {
        let f = self.checked_field(id, component, field)?;
        Ok(self.store(component).get_float(f, self.slot_of(id)))
    }

    pub fn set_float(
        &mut self,
        id: EntityId,
        component: ComponentId,
        field: &str,
        value: f32,
    ) -> Result<(), SimError> {
        let f = self.checked_field(id, component, field)?;
        let slot = self.slot_of(id);
        self.store_mut(component).set_float(f, slot, value);
        Ok(())
    }

    pub fn get_bool(
        &self,
        id: EntityId,
        component: ComponentId,
        field: &str,
    ) -> Result<bool, SimError> {
        let f = self.checked_field(id, component, field)?;
        Ok(self.store(component).get_bool(f, self.slot_of(id)))
    }

    pub fn set_bool(
        &mut self,
        id: EntityId,
        component: ComponentId,
        field: &str,
        value: bool,
    ) -> Result<(), SimError> {
        let f = self.checked_field(id, component, field)?;
        let slot = self.slot_of(id);
        self.store_mut(component).set_bool(f, slot, value);
        Ok(())
    }

    // -- queries -------------------------------------------------------------

    pub fn by_type(&self, type_name: &str) -> EntityIter {
        self.index.by_type(type_name)
    }

    pub fn by_components(&self, components: &[ComponentId]) -> EntityIter {
        self.index.by_components(components)
    }

    pub fn query(&self, type_name: &str, components: &[ComponentId]) -> EntityIter {
        self.index.query(type_name, components)
    }

    pub fn by_client_id(&self, client_id: i32) -> Option<EntityId> {
        self.index.by_client_id(client_id)
    }

    /// Drive `f` over every id the iterator captured that is still alive
    /// when its turn comes. The standard way to mutate during traversal.
    pub fn each_alive(&mut self, iter: EntityIter, mut f: impl FnMut(&mut World, EntityId)) {
        for id in iter {
            if self.is_alive(id) {
                f(self, id);
            }
        }
    }

    // -- systems and phases --------------------------------------------------

    /// Register a system on the world's scheduler.
    pub fn add_system(
        &mut self,
        name: &str,
        phase: Phase,
        options: SystemOptions,
        func: impl FnMut(&mut World) + 'static,
    ) {
        self.scheduler.add_system(name, phase, options, func);
    }

    /// Run one phase. The scheduler is detached for the duration, so
    /// systems cannot re-enter it.
    pub fn run_phase(&mut self, phase: Phase) {
        let mut scheduler = std::mem::take(&mut self.scheduler);
        scheduler.run_phase(phase, self);
        self.scheduler = scheduler;
    }

    // -- inputs --------------------------------------------------------------

    /// The raw input payload routed to `client_id` this tick, if any.
    pub fn input_for(&self, client_id: i32) -> Option<&[u8]> {
        self.inputs.get(&client_id).map(Vec::as_slice)
    }

    /// All routed inputs this tick, ascending by clientId.
    pub fn inputs(&self) -> &BTreeMap<i32, Vec<u8>> {
        &self.inputs
    }

    /// Keep the input registry across ticks (held-key input schemes).
    pub fn preserve_inputs(&mut self, preserve: bool) {
        self.preserve_inputs = preserve;
    }

    /// Replace the input registry wholesale (snapshot decode path).
    pub(crate) fn restore_inputs(&mut self, inputs: BTreeMap<i32, Vec<u8>>) {
        self.inputs = inputs;
    }

    // -- the tick ------------------------------------------------------------

    /// Open a frame: set the counter, route inputs, raise the simulating
    /// flag. Callers that interleave external pipelines between phases
    /// (the engine's physics step) use this with [`run_phase`] and
    /// [`end_tick`](Self::end_tick); everyone else calls [`tick`](Self::tick).
    pub fn begin_tick(&mut self, frame: u64, inputs: &BTreeMap<i32, Vec<u8>>) {
        self.frame = frame;
        for (&client, payload) in inputs {
            if self.index.by_client_id(client).is_some_and(|e| self.is_alive(e)) {
                self.inputs.insert(client, payload.clone());
            }
        }
        self.simulating = true;
    }

    /// Close a frame: drop the simulating flag, run `render` on clients,
    /// clear the input registry (unless preservation is on).
    pub fn end_tick(&mut self) {
        self.simulating = false;
        if self.config.role == WorldRole::Client {
            self.run_phase(Phase::Render);
        }
        if !self.preserve_inputs {
            self.inputs.clear();
        }
    }

    /// Advance one frame with the given per-client inputs.
    ///
    /// Inputs whose client has no live entity are dropped silently; the
    /// rest are visible to systems via [`input_for`](Self::input_for) for
    /// the duration of the tick.
    pub fn tick(&mut self, frame: u64, inputs: &BTreeMap<i32, Vec<u8>>) {
        self.begin_tick(frame, inputs);
        for phase in [
            Phase::Input,
            Phase::Update,
            Phase::PrePhysics,
            Phase::Physics,
            Phase::PostPhysics,
        ] {
            self.run_phase(phase);
        }
        self.end_tick();
    }

    /// Run every phase once without frame bookkeeping (setup/testing).
    pub fn run_all_phases(&mut self) {
        for phase in PHASE_ORDER {
            if phase == Phase::Render && self.config.role == WorldRole::Server {
                continue;
            }
            self.run_phase(phase);
        }
    }

    // -- state hash ----------------------------------------------------------

    /// xxh32 digest of the synchronized state.
    ///
    /// Covers active synchronized entities in ascending id order; per
    /// entity, the raw id, then for each synchronized component of its
    /// *type's declared list* (in declaration order) the raw `i32` slot
    /// contents of its synchronized fields in ascending lexicographic
    /// field-name order. Local entities, `sync = false` components,
    /// filtered components, and `f32` fields never contribute.
    ///
    /// The type-declared set (not the entity's runtime component list) is
    /// the synchronized surface: it is exactly what the snapshot codec
    /// carries, so decoding a snapshot always reproduces this hash. A
    /// component removed at runtime contributes its schema defaults; a
    /// component added at runtime is local-only state.
    pub fn state_hash(&self) -> u32 {
        let mut hasher = StateHasher::new();
        for (&id, meta) in &self.entities {
            if id.is_local() {
                continue;
            }
            let Some(def) = self.entity_defs.get(&meta.type_name) else {
                continue;
            };
            hasher.write_u32(id.to_raw());
            for &component in def.components() {
                let store = self.store(component);
                if !store.is_sync() || !def.syncs_component(component) {
                    continue;
                }
                let slot = self.slot_of(id);
                let present = store.has(slot);
                for &field in store.sync_fields() {
                    let value = if present {
                        store.raw_slot(field, slot)
                    } else {
                        store.default_raw(field)
                    };
                    hasher.write_i32(value);
                }
            }
        }
        hasher.finish()
    }

    // -- snapshot support (used by the codec) --------------------------------

    pub(crate) fn allocator(&self) -> &EntityAllocator {
        &self.allocator
    }

    pub(crate) fn allocator_mut(&mut self) -> &mut EntityAllocator {
        &mut self.allocator
    }

    pub(crate) fn entities_map(&self) -> &BTreeMap<EntityId, EntityMeta> {
        &self.entities
    }

    /// Drop all synchronized entities and their index entries; local
    /// entities, schemas, and systems survive. The allocator is left for
    /// the caller to rebuild so restored ids can be claimed explicitly.
    pub(crate) fn clear_synced_entities(&mut self) {
        let synced: Vec<EntityId> = self
            .entities
            .keys()
            .copied()
            .filter(|id| !id.is_local())
            .collect();
        for id in synced {
            let meta = self.entities.remove(&id).expect("listed id present");
            let slot = id.index(); // synced entities: slot == index
            for &component in &meta.components {
                self.stores[component.0 as usize].clear_present(slot);
                self.index.remove_component(component, id);
            }
            self.index.remove_type(&meta.type_name, id);
            if let Some(client) = meta.client_id {
                self.index.remove_client(client, id);
            }
        }
        self.inputs.clear();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
