//! Component schemas and Structure-of-Arrays storage.
//!
//! Components here are *data*, not Rust types: a [`ComponentDef`] is a
//! named, immutable schema of fields defined at startup, and a
//! [`ComponentStore`] holds one flat column per field plus a per-entity
//! presence bitmap, all sized to the world's slot capacity (a ceiling's
//! worth of synchronized slots plus a ceiling's worth of local-only
//! slots). Systems that walk one field of many entities touch a single
//! contiguous array.
//!
//! Field types are deliberately tiny: `i32` (Q16.16 fixed), `u8`, `bool`
//! (stored in a `u8` column), and `f32`. An `f32` field is allowed only as
//! render-side scratch -- it never enters snapshots or the state hash, and
//! declaring one on a synchronized component logs a warning at definition
//! time.
//!
//! Invariants: a set presence bit implies every column slot was initialized
//! from defaults or spawn props; a clear bit means the slot contents are
//! stale and must never be observed.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::fixed::{to_fixed, to_float, Fixed};

// ---------------------------------------------------------------------------
// Field model
// ---------------------------------------------------------------------------

/// The storable field types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// Q16.16 fixed-point (the default numeric type).
    I32,
    U8,
    /// Stored in a `u8` column.
    Bool,
    /// Non-deterministic; excluded from synchronized state.
    F32,
}

impl FieldType {
    /// Bytes per element in the snapshot body.
    pub fn wire_bytes(self) -> usize {
        match self {
            FieldType::I32 => 4,
            FieldType::U8 | FieldType::Bool => 1,
            FieldType::F32 => 0,
        }
    }
}

/// A value for defaults and spawn props.
///
/// `Float` is the ergonomic spelling for fixed-point fields: it converts
/// through [`to_fixed`] exactly once, at write time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue {
    I32(i32),
    U8(u8),
    Bool(bool),
    Float(f32),
}

impl FieldValue {
    fn as_i32(self) -> i32 {
        match self {
            FieldValue::I32(v) => v,
            FieldValue::U8(v) => v as i32,
            FieldValue::Bool(v) => v as i32,
            FieldValue::Float(v) => to_fixed(v),
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            FieldValue::I32(v) => v as u8,
            FieldValue::U8(v) => v,
            FieldValue::Bool(v) => v as u8,
            FieldValue::Float(v) => v as u8,
        }
    }

    fn as_f32(self) -> f32 {
        match self {
            FieldValue::I32(v) => to_float(v),
            FieldValue::U8(v) => v as f32,
            FieldValue::Bool(v) => v as u8 as f32,
            FieldValue::Float(v) => v,
        }
    }
}

/// One field of a component schema.
#[derive(Debug, Clone)]
pub struct FieldDef {
    pub name: String,
    pub ty: FieldType,
    pub default: FieldValue,
}

// ---------------------------------------------------------------------------
// Handles
// ---------------------------------------------------------------------------

/// Stable handle for a defined component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ComponentId(pub(crate) u32);

impl ComponentId {
    #[inline]
    pub fn to_raw(self) -> u32 {
        self.0
    }
}

/// Handle for a field within one component, resolved at definition time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FieldId(pub(crate) u16);

// ---------------------------------------------------------------------------
// ComponentDef
// ---------------------------------------------------------------------------

/// An immutable component schema, built once at startup.
#[derive(Debug, Clone)]
pub struct ComponentDef {
    pub name: String,
    /// Whether this component participates in snapshots, the state hash,
    /// and rollback.
    pub sync: bool,
    pub fields: Vec<FieldDef>,
}

impl ComponentDef {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            sync: true,
            fields: Vec::new(),
        }
    }

    /// Mark the component local-only (excluded from synchronized state).
    pub fn local(mut self) -> Self {
        self.sync = false;
        self
    }

    fn push_field(mut self, name: &str, ty: FieldType, default: FieldValue) -> Self {
        assert!(
            !self.fields.iter().any(|f| f.name == name),
            "duplicate field name {name:?} on component {:?}",
            self.name
        );
        assert!(
            self.fields.len() < u16::MAX as usize,
            "too many fields on component {:?}",
            self.name
        );
        self.fields.push(FieldDef {
            name: name.to_owned(),
            ty,
            default,
        });
        self
    }

    /// A Q16.16 field with a float-spelled default.
    pub fn field_fixed(self, name: &str, default: f32) -> Self {
        self.push_field(name, FieldType::I32, FieldValue::Float(default))
    }

    /// A Q16.16 field with a raw fixed default.
    pub fn field_raw(self, name: &str, default: Fixed) -> Self {
        self.push_field(name, FieldType::I32, FieldValue::I32(default))
    }

    pub fn field_u8(self, name: &str, default: u8) -> Self {
        self.push_field(name, FieldType::U8, FieldValue::U8(default))
    }

    pub fn field_bool(self, name: &str, default: bool) -> Self {
        self.push_field(name, FieldType::Bool, FieldValue::Bool(default))
    }

    /// Explicit opt-in for a float field; never synchronized.
    pub fn field_f32(self, name: &str, default: f32) -> Self {
        self.push_field(name, FieldType::F32, FieldValue::Float(default))
    }
}

// ---------------------------------------------------------------------------
// Columns
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Column {
    I32(Vec<i32>),
    U8(Vec<u8>),
    F32(Vec<f32>),
}

impl Column {
    fn for_type(ty: FieldType, slots: usize) -> Self {
        match ty {
            FieldType::I32 => Column::I32(vec![0; slots]),
            FieldType::U8 | FieldType::Bool => Column::U8(vec![0; slots]),
            FieldType::F32 => Column::F32(vec![0.0; slots]),
        }
    }
}

// ---------------------------------------------------------------------------
// ComponentStore
// ---------------------------------------------------------------------------

/// SoA storage for one component definition, shared by every entity type
/// that lists the component.
#[derive(Debug, Clone)]
pub struct ComponentStore {
    def: ComponentDef,
    field_by_name: BTreeMap<String, FieldId>,
    /// One bit per potential entity index.
    presence: Vec<u32>,
    columns: Vec<Column>,
    /// Synchronized fields in ascending lexicographic name order, cached
    /// for the state hash and the snapshot codec.
    sync_fields: Vec<FieldId>,
}

impl ComponentStore {
    pub fn new(def: ComponentDef, slots: u32) -> Self {
        let slots = slots as usize;
        if def.sync && def.fields.iter().any(|f| f.ty == FieldType::F32) {
            tracing::warn!(
                component = %def.name,
                "synchronized component declares f32 fields; they are \
                 excluded from snapshots and the state hash"
            );
        }
        let field_by_name = def
            .fields
            .iter()
            .enumerate()
            .map(|(i, f)| (f.name.clone(), FieldId(i as u16)))
            .collect();
        let columns = def
            .fields
            .iter()
            .map(|f| Column::for_type(f.ty, slots))
            .collect();
        let mut sync_fields: Vec<FieldId> = def
            .fields
            .iter()
            .enumerate()
            .filter(|(_, f)| f.ty != FieldType::F32)
            .map(|(i, _)| FieldId(i as u16))
            .collect();
        sync_fields.sort_by(|a, b| {
            def.fields[a.0 as usize]
                .name
                .cmp(&def.fields[b.0 as usize].name)
        });
        Self {
            def,
            field_by_name,
            presence: vec![0; slots.div_ceil(32)],
            columns,
            sync_fields,
        }
    }

    pub fn def(&self) -> &ComponentDef {
        &self.def
    }

    pub fn name(&self) -> &str {
        &self.def.name
    }

    pub fn is_sync(&self) -> bool {
        self.def.sync
    }

    /// Resolve a field handle by name.
    pub fn field(&self, name: &str) -> Option<FieldId> {
        self.field_by_name.get(name).copied()
    }

    pub fn field_def(&self, field: FieldId) -> &FieldDef {
        &self.def.fields[field.0 as usize]
    }

    /// Synchronized fields in ascending lexicographic name order.
    pub fn sync_fields(&self) -> &[FieldId] {
        &self.sync_fields
    }

    // -- presence bitmap ----------------------------------------------------

    #[inline]
    pub fn has(&self, index: u32) -> bool {
        let word = (index >> 5) as usize;
        word < self.presence.len() && self.presence[word] & (1 << (index & 31)) != 0
    }

    #[inline]
    pub(crate) fn set_present(&mut self, index: u32) {
        self.presence[(index >> 5) as usize] |= 1 << (index & 31);
    }

    #[inline]
    pub(crate) fn clear_present(&mut self, index: u32) {
        self.presence[(index >> 5) as usize] &= !(1 << (index & 31));
    }

    /// Raw bitmap words (for the snapshot entity mask style of scan).
    pub fn presence_words(&self) -> &[u32] {
        &self.presence
    }

    /// Write every column slot at `index` from the schema defaults.
    pub fn initialize_defaults(&mut self, index: u32) {
        for f in 0..self.def.fields.len() {
            let default = self.def.fields[f].default;
            self.write(FieldId(f as u16), index, default);
        }
    }

    // -- typed access --------------------------------------------------------

    /// Store a value, coercing through the column's type.
    pub fn write(&mut self, field: FieldId, index: u32, value: FieldValue) {
        let i = index as usize;
        match &mut self.columns[field.0 as usize] {
            Column::I32(col) => col[i] = value.as_i32(),
            Column::U8(col) => col[i] = value.as_u8(),
            Column::F32(col) => col[i] = value.as_f32(),
        }
    }

    #[inline]
    pub fn get_i32(&self, field: FieldId, index: u32) -> i32 {
        match &self.columns[field.0 as usize] {
            Column::I32(col) => col[index as usize],
            Column::U8(col) => col[index as usize] as i32,
            Column::F32(col) => col[index as usize] as i32,
        }
    }

    #[inline]
    pub fn set_i32(&mut self, field: FieldId, index: u32, value: i32) {
        self.write(field, index, FieldValue::I32(value));
    }

    #[inline]
    pub fn get_u8(&self, field: FieldId, index: u32) -> u8 {
        match &self.columns[field.0 as usize] {
            Column::U8(col) => col[index as usize],
            Column::I32(col) => col[index as usize] as u8,
            Column::F32(col) => col[index as usize] as u8,
        }
    }

    #[inline]
    pub fn set_u8(&mut self, field: FieldId, index: u32, value: u8) {
        self.write(field, index, FieldValue::U8(value));
    }

    #[inline]
    pub fn get_bool(&self, field: FieldId, index: u32) -> bool {
        self.get_u8(field, index) != 0
    }

    #[inline]
    pub fn set_bool(&mut self, field: FieldId, index: u32, value: bool) {
        self.write(field, index, FieldValue::Bool(value));
    }

    /// Fixed-point field read through the float convenience lens.
    #[inline]
    pub fn get_float(&self, field: FieldId, index: u32) -> f32 {
        match &self.columns[field.0 as usize] {
            Column::I32(col) => to_float(col[index as usize]),
            Column::U8(col) => col[index as usize] as f32,
            Column::F32(col) => col[index as usize],
        }
    }

    /// Fixed-point field write through the float convenience lens.
    #[inline]
    pub fn set_float(&mut self, field: FieldId, index: u32, value: f32) {
        self.write(field, index, FieldValue::Float(value));
    }

    /// Raw slot contents as `i32`, the unit of the state hash and snapshot
    /// body. `u8`/`bool` widen; `f32` fields are not representable here and
    /// must be filtered by the caller via [`sync_fields`](Self::sync_fields).
    #[inline]
    pub fn raw_slot(&self, field: FieldId, index: u32) -> i32 {
        match &self.columns[field.0 as usize] {
            Column::I32(col) => col[index as usize],
            Column::U8(col) => col[index as usize] as i32,
            Column::F32(_) => 0,
        }
    }

    /// The schema default as a raw `i32` slot value.
    pub fn default_raw(&self, field: FieldId) -> i32 {
        match self.def.fields[field.0 as usize].ty {
            FieldType::F32 => 0,
            _ => self.def.fields[field.0 as usize].default.as_i32(),
        }
    }

    /// Inverse of [`raw_slot`](Self::raw_slot) for the snapshot decoder.
    #[inline]
    pub fn set_raw_slot(&mut self, field: FieldId, index: u32, value: i32) {
        match &mut self.columns[field.0 as usize] {
            Column::I32(col) => col[index as usize] = value,
            Column::U8(col) => col[index as usize] = value as u8,
            Column::F32(_) => {}
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
