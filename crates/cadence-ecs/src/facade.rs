//! Ergonomic entity views and render interpolation.
//!
//! [`EntityRef`] and [`EntityMut`] are small value types carrying an entity
//! id plus a borrow of the world, validated once at construction. They are
//! meant to be created, used within a scope, and discarded -- nothing is
//! pooled or cached.
//!
//! [`InterpolationBuffer`] records previous positions during `prePhysics`
//! so that `render`-phase code on clients can draw entities between the
//! last two simulated states.

use std::collections::BTreeMap;

use crate::entity::EntityId;
use crate::fixed::{fixed_lerp, Fixed};
use crate::storage::{ComponentId, FieldValue};
use crate::world::World;
use crate::SimError;

// ---------------------------------------------------------------------------
// EntityRef / EntityMut
// ---------------------------------------------------------------------------

/// Read-only view of one live entity.
#[derive(Clone, Copy)]
pub struct EntityRef<'w> {
    world: &'w World,
    id: EntityId,
}

impl<'w> EntityRef<'w> {
    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn type_name(&self) -> &str {
        self.world
            .entity_meta(self.id)
            .map(|m| m.type_name())
            .unwrap_or("")
    }

    pub fn client_id(&self) -> Option<i32> {
        self.world.entity_meta(self.id).and_then(|m| m.client_id())
    }

    pub fn has(&self, component: ComponentId) -> bool {
        self.world.has_component(self.id, component)
    }

    pub fn get_i32(&self, component: ComponentId, field: &str) -> Result<i32, SimError> {
        self.world.get_i32(self.id, component, field)
    }

    pub fn get_float(&self, component: ComponentId, field: &str) -> Result<f32, SimError> {
        self.world.get_float(self.id, component, field)
    }

    pub fn get_bool(&self, component: ComponentId, field: &str) -> Result<bool, SimError> {
        self.world.get_bool(self.id, component, field)
    }
}

/// Mutable view of one live entity.
pub struct EntityMut<'w> {
    world: &'w mut World,
    id: EntityId,
}

impl<'w> EntityMut<'w> {
    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn get_i32(&self, component: ComponentId, field: &str) -> Result<i32, SimError> {
        self.world.get_i32(self.id, component, field)
    }

    pub fn set_i32(&mut self, component: ComponentId, field: &str, value: i32) -> Result<(), SimError> {
        self.world.set_i32(self.id, component, field, value)
    }

    pub fn set_float(&mut self, component: ComponentId, field: &str, value: f32) -> Result<(), SimError> {
        self.world.set_float(self.id, component, field, value)
    }

    pub fn set_bool(&mut self, component: ComponentId, field: &str, value: bool) -> Result<(), SimError> {
        self.world.set_bool(self.id, component, field, value)
    }

    /// Write any prop-style value through the column's coercion rules.
    pub fn set(&mut self, component: ComponentId, field: &str, value: FieldValue) -> Result<(), SimError> {
        // Route through the checked path for validity, then the raw write.
        self.world.get_i32(self.id, component, field)?;
        let slot = self.world.slot_of(self.id);
        let store = self.world.store_mut(component);
        let f = store.field(field).expect("field checked above");
        store.write(f, slot, value);
        Ok(())
    }
}

impl World {
    /// A validated read-only view. Fails on stale ids.
    pub fn entity(&self, id: EntityId) -> Result<EntityRef<'_>, SimError> {
        if !self.is_alive(id) {
            return Err(SimError::InvalidEntityId { entity: id });
        }
        Ok(EntityRef { world: self, id })
    }

    /// A validated mutable view. Fails on stale ids.
    pub fn entity_mut(&mut self, id: EntityId) -> Result<EntityMut<'_>, SimError> {
        if !self.is_alive(id) {
            return Err(SimError::InvalidEntityId { entity: id });
        }
        Ok(EntityMut { world: self, id })
    }
}

// ---------------------------------------------------------------------------
// InterpolationBuffer
// ---------------------------------------------------------------------------

/// Previous-position record for one entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterpolationRecord {
    pub x: Fixed,
    pub y: Fixed,
    pub angle: Fixed,
}

/// Captures positions in `prePhysics` and lerps them for rendering.
///
/// Bound to one transform-like component that carries `x` and `y` fields
/// (and optionally `angle`). State here is render-side only; it is not
/// part of any snapshot or hash.
#[derive(Debug)]
pub struct InterpolationBuffer {
    component: ComponentId,
    prev: BTreeMap<EntityId, InterpolationRecord>,
}

impl InterpolationBuffer {
    /// Bind to a component; it must declare `x` and `y` fields.
    pub fn new(world: &World, component: ComponentId) -> Self {
        let store = world.store(component);
        assert!(
            store.field("x").is_some() && store.field("y").is_some(),
            "interpolation component {:?} must declare x and y fields",
            store.name()
        );
        Self {
            component,
            prev: BTreeMap::new(),
        }
    }

    /// Record the current position of every entity carrying the bound
    /// component. Call once per tick, from `prePhysics`.
    pub fn capture(&mut self, world: &World) {
        self.prev.clear();
        let store = world.store(self.component);
        let x = store.field("x").expect("validated at construction");
        let y = store.field("y").expect("validated at construction");
        let angle = store.field("angle");
        for id in world.by_components(&[self.component]) {
            if !world.is_alive(id) {
                continue;
            }
            let i = world.slot_of(id);
            self.prev.insert(
                id,
                InterpolationRecord {
                    x: store.get_i32(x, i),
                    y: store.get_i32(y, i),
                    angle: angle.map_or(0, |a| store.get_i32(a, i)),
                },
            );
        }
    }

    /// Previous-frame record, if the entity existed last capture.
    pub fn previous(&self, id: EntityId) -> Option<InterpolationRecord> {
        self.prev.get(&id).copied()
    }

    /// Position blended between the last captured state and the current
    /// one. `alpha` is fixed-point in `[0, 1]`; entities that appeared
    /// since the last capture return their current position unblended.
    pub fn sample(&self, world: &World, id: EntityId, alpha: Fixed) -> Option<(Fixed, Fixed)> {
        if !world.is_alive(id) {
            return None;
        }
        let slot = world.slot_of(id);
        let store = world.store(self.component);
        if !store.has(slot) {
            return None;
        }
        let x = store.field("x")?;
        let y = store.field("y")?;
        let cur_x = store.get_i32(x, slot);
        let cur_y = store.get_i32(y, slot);
        match self.prev.get(&id) {
            Some(rec) => Some((
                fixed_lerp(rec.x, cur_x, alpha),
                fixed_lerp(rec.y, cur_y, alpha),
            )),
            None => Some((cur_x, cur_y)),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
