//! Snapshot codec: schema-compressed binary Format v4.
//!
//! A snapshot is the synchronized subset of world state -- entities and
//! their synced component columns, plus the allocator, string registry, and
//! PRNG -- in a self-describing little-endian framing:
//!
//! ```text
//! u32 meta_len | meta (canonical JSON) | u32 mask_len | presence mask |
//! packed column values, one section per listed component
//! ```
//!
//! The meta header carries the per-entity-type schema (ordered component
//! names with ordered, typed field names), so field names are sent once per
//! snapshot rather than per entity: body size is `O(entities x fields x
//! wire bytes)`. The header also embeds the sender's xxh32 state hash and a
//! BLAKE3 digest of the body, both checked by the decoder.
//!
//! Decode validates everything it can -- magic, version, digest, lengths,
//! allocator consistency -- *before* touching the world; a malformed
//! snapshot leaves the world unmodified. Entities of types this world never
//! registered are skipped with a warning and reported, not fatal.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::entity::EntityId;
use crate::storage::{ComponentId, FieldType};
use crate::strings::RegistryState;
use crate::world::World;
use crate::SimError;

/// Snapshot format magic.
pub const SNAPSHOT_MAGIC: &str = "CADS";

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 4;

// ---------------------------------------------------------------------------
// Meta header types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AllocatorMeta {
    next_index: u32,
    /// Active index -> generation. The free list is the complement over
    /// `[0, next_index)`.
    generations: BTreeMap<u32, u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FieldMeta {
    name: String,
    ty: FieldType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ComponentSchemaMeta {
    component: String,
    fields: Vec<FieldMeta>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct EntityRecord {
    id: u32,
    #[serde(rename = "type")]
    type_name: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    client_id: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SnapshotMeta {
    magic: String,
    version: u32,
    frame: u64,
    seq: u64,
    /// Sender's xxh32 synchronized-state hash at encode time.
    state_hash: u32,
    /// BLAKE3 hex digest of everything after the meta block.
    body_digest: String,
    allocator: AllocatorMeta,
    strings: RegistryState,
    rng: [u32; 2],
    /// Entity type -> ordered synced component schemas.
    schema: BTreeMap<String, Vec<ComponentSchemaMeta>>,
    /// Active synchronized entities, ascending by id.
    entities: Vec<EntityRecord>,
    /// Component section order in the body.
    components: Vec<String>,
    /// Per-client opaque input payloads at encode time.
    #[serde(default)]
    inputs: BTreeMap<i32, Vec<u8>>,
}

/// What a successful decode did.
#[derive(Debug, Clone)]
pub struct SnapshotReport {
    pub frame: u64,
    pub seq: u64,
    /// Whether the restored world's state hash equals the sender's.
    /// Always true unless entities were skipped.
    pub state_hash_matches: bool,
    /// Type names of entities skipped because this world never registered
    /// them.
    pub skipped_types: Vec<String>,
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

fn push_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}

impl World {
    /// Synced component schemas for one entity type, in declaration order.
    fn type_schema(&self, type_name: &str) -> Vec<ComponentSchemaMeta> {
        let Some(def) = self.entity_def(type_name) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for &component in def.components() {
            let store = self.store(component);
            if !store.is_sync() || !def.syncs_component(component) {
                continue;
            }
            let fields = store
                .sync_fields()
                .iter()
                .map(|&f| {
                    let fd = store.field_def(f);
                    FieldMeta {
                        name: fd.name.clone(),
                        ty: fd.ty,
                    }
                })
                .collect();
            out.push(ComponentSchemaMeta {
                component: store.name().to_owned(),
                fields,
            });
        }
        out
    }

    /// Encode the synchronized world state as a Format v4 snapshot.
    pub fn encode_snapshot(&self, seq: u64) -> Vec<u8> {
        // Entity records, ascending by id.
        let mut records = Vec::new();
        let mut schema: BTreeMap<String, Vec<ComponentSchemaMeta>> = BTreeMap::new();
        for (&id, meta) in self.entities_map() {
            if id.is_local() {
                continue;
            }
            records.push(EntityRecord {
                id: id.to_raw(),
                type_name: meta.type_name().to_owned(),
                client_id: meta.client_id(),
            });
            schema
                .entry(meta.type_name().to_owned())
                .or_insert_with(|| self.type_schema(meta.type_name()));
        }

        // Component section order: ascending by name over every component
        // any present type synchronizes.
        let components: Vec<String> = schema
            .values()
            .flatten()
            .map(|c| c.component.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        // Presence mask over entity indices, one bit per index.
        let (next_index, generations) = self.allocator().snapshot_state();
        let mut mask = vec![0u8; (next_index as usize).div_ceil(8)];
        for record in &records {
            let index = EntityId::from_raw(record.id).index();
            mask[(index >> 3) as usize] |= 1 << (index & 7);
        }

        // Packed column sections: per component, per entity ascending,
        // fields in schema order.
        let mut columns = Vec::new();
        for component_name in &components {
            let component = self
                .component_id(component_name)
                .expect("schema lists only defined components");
            let store = self.store(component);
            for record in &records {
                let type_schema = &schema[&record.type_name];
                let Some(entry) = type_schema.iter().find(|c| &c.component == component_name)
                else {
                    continue;
                };
                let index = EntityId::from_raw(record.id).index();
                let present = store.has(index);
                for field_meta in &entry.fields {
                    let field = store.field(&field_meta.name).expect("own schema");
                    // A type-declared component removed at runtime encodes
                    // its schema defaults, matching the state hash rule.
                    let raw = if present {
                        store.raw_slot(field, index)
                    } else {
                        store.default_raw(field)
                    };
                    match field_meta.ty.wire_bytes() {
                        4 => columns.extend_from_slice(&raw.to_le_bytes()),
                        1 => columns.push(raw as u8),
                        _ => {}
                    }
                }
            }
        }

        // Body = mask frame + columns; digested as one unit.
        let mut body = Vec::with_capacity(4 + mask.len() + columns.len());
        push_u32(&mut body, mask.len() as u32);
        body.extend_from_slice(&mask);
        body.extend_from_slice(&columns);

        let meta = SnapshotMeta {
            magic: SNAPSHOT_MAGIC.to_owned(),
            version: SNAPSHOT_VERSION,
            frame: self.frame(),
            seq,
            state_hash: self.state_hash(),
            body_digest: blake3::hash(&body).to_hex().to_string(),
            allocator: AllocatorMeta {
                next_index,
                generations,
            },
            strings: self.strings().state(),
            rng: self.rng().state(),
            schema,
            entities: records,
            components,
            inputs: self.inputs().clone(),
        };
        let meta_bytes = serde_json::to_vec(&meta).expect("snapshot meta is always serializable");

        let mut out = Vec::with_capacity(4 + meta_bytes.len() + body.len());
        push_u32(&mut out, meta_bytes.len() as u32);
        out.extend_from_slice(&meta_bytes);
        out.extend_from_slice(&body);
        out
    }
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

fn invalid(details: impl Into<String>) -> SimError {
    SimError::InvalidSnapshot {
        details: details.into(),
    }
}

fn read_u32(bytes: &[u8], at: usize) -> Result<u32, SimError> {
    bytes
        .get(at..at + 4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or_else(|| invalid("truncated length prefix"))
}

/// One pending column write, resolved during validation.
struct PendingWrite {
    entity: EntityId,
    component: ComponentId,
    field_name: String,
    value: i32,
}

impl World {
    /// Decode a Format v4 snapshot into this world.
    ///
    /// All structural validation happens before any mutation; on error the
    /// world is untouched. Entities whose type is not registered here are
    /// skipped with a warning (their bytes are consumed using the schema in
    /// the header) and listed in the report.
    pub fn decode_snapshot(&mut self, bytes: &[u8]) -> Result<SnapshotReport, SimError> {
        // -- frame parsing ----------------------------------------------------
        let meta_len = read_u32(bytes, 0)? as usize;
        let meta_end = 4usize
            .checked_add(meta_len)
            .filter(|&end| end <= bytes.len())
            .ok_or_else(|| invalid("meta length exceeds snapshot size"))?;
        let meta: SnapshotMeta = serde_json::from_slice(&bytes[4..meta_end])
            .map_err(|e| invalid(format!("meta header is not valid JSON: {e}")))?;

        if meta.magic != SNAPSHOT_MAGIC {
            return Err(invalid(format!("bad magic {:?}", meta.magic)));
        }
        if meta.version != SNAPSHOT_VERSION {
            return Err(invalid(format!(
                "unsupported snapshot version {} (expected {SNAPSHOT_VERSION})",
                meta.version
            )));
        }

        let body = &bytes[meta_end..];
        let digest = blake3::hash(body).to_hex().to_string();
        if digest != meta.body_digest {
            return Err(invalid("body digest mismatch (corrupt or tampered)"));
        }

        let mask_len = read_u32(body, 0)? as usize;
        let mask_end = 4usize
            .checked_add(mask_len)
            .filter(|&end| end <= body.len())
            .ok_or_else(|| invalid("mask length exceeds snapshot size"))?;
        let mask = &body[4..mask_end];
        let columns = &body[mask_end..];

        // -- allocator / entity consistency -----------------------------------
        let mut entity_indices = BTreeSet::new();
        let mut last_id: Option<u32> = None;
        for record in &meta.entities {
            if let Some(prev) = last_id {
                if record.id <= prev {
                    return Err(invalid("entity records are not ascending by id"));
                }
            }
            last_id = Some(record.id);
            let id = EntityId::from_raw(record.id);
            if id.is_local() {
                return Err(invalid("snapshot contains a local-only entity id"));
            }
            if id.index() >= meta.allocator.next_index {
                return Err(invalid(format!(
                    "entity index {} beyond allocator next_index {}",
                    id.index(),
                    meta.allocator.next_index
                )));
            }
            match meta.allocator.generations.get(&id.index()) {
                Some(&gen) if gen == id.generation() => {}
                Some(_) => return Err(invalid("entity generation disagrees with allocator")),
                None => return Err(invalid("entity index not active in allocator")),
            }
            if !entity_indices.insert(id.index()) {
                return Err(invalid("duplicate entity index"));
            }
        }
        if entity_indices.len() != meta.allocator.generations.len() {
            return Err(invalid(
                "allocator active set does not match entity records",
            ));
        }
        if meta.allocator.next_index > self.entity_ceiling() {
            return Err(invalid("allocator next_index exceeds this world's ceiling"));
        }

        // Mask must mark exactly the active entity indices.
        if mask.len() != (meta.allocator.next_index as usize).div_ceil(8) {
            return Err(invalid("mask length disagrees with allocator next_index"));
        }
        for index in 0..meta.allocator.next_index {
            let bit = mask[(index >> 3) as usize] & (1 << (index & 7)) != 0;
            if bit != entity_indices.contains(&index) {
                return Err(invalid(format!("presence mask bit {index} inconsistent")));
            }
        }

        // -- column walk: resolve writes, measure lengths ----------------------
        let mut writes: Vec<PendingWrite> = Vec::new();
        let mut skipped_types: BTreeSet<String> = BTreeSet::new();
        let mut cursor = 0usize;

        for component_name in &meta.components {
            let local_component = self.component_id(component_name);
            for record in &meta.entities {
                let type_schema = meta
                    .schema
                    .get(&record.type_name)
                    .ok_or_else(|| invalid(format!("type {:?} missing from schema", record.type_name)))?;
                let Some(entry) = type_schema.iter().find(|c| &c.component == component_name)
                else {
                    continue;
                };
                let type_known = self.entity_def(&record.type_name).is_some();
                if !type_known {
                    skipped_types.insert(record.type_name.clone());
                }
                for field_meta in &entry.fields {
                    let width = field_meta.ty.wire_bytes();
                    let slice = columns
                        .get(cursor..cursor + width)
                        .ok_or_else(|| invalid("column section truncated"))?;
                    let value = match width {
                        4 => i32::from_le_bytes([slice[0], slice[1], slice[2], slice[3]]),
                        1 => slice[0] as i32,
                        _ => 0,
                    };
                    cursor += width;
                    if !type_known {
                        continue;
                    }
                    let Some(component) = local_component else {
                        return Err(invalid(format!(
                            "component {component_name:?} used by known type {:?} is not defined here",
                            record.type_name
                        )));
                    };
                    if self.store(component).field(&field_meta.name).is_none() {
                        tracing::warn!(
                            component = component_name.as_str(),
                            field = field_meta.name.as_str(),
                            "snapshot field unknown to this schema; value dropped"
                        );
                        continue;
                    }
                    writes.push(PendingWrite {
                        entity: EntityId::from_raw(record.id),
                        component,
                        field_name: field_meta.name.clone(),
                        value,
                    });
                }
            }
        }
        if cursor != columns.len() {
            return Err(invalid(format!(
                "column section has {} trailing bytes",
                columns.len() - cursor
            )));
        }

        // -- mutation ----------------------------------------------------------
        self.clear_synced_entities();
        self.allocator_mut()
            .restore(meta.allocator.next_index, &meta.allocator.generations);
        self.strings_mut().restore(&meta.strings);
        self.set_rng(crate::rng::SimRng::from_state(meta.rng));
        self.set_frame(meta.frame);

        let mut hooks: Vec<(crate::world::RestoreHook, EntityId)> = Vec::new();
        for record in &meta.entities {
            let id = EntityId::from_raw(record.id);
            let Some(def) = self.entity_def(&record.type_name) else {
                tracing::warn!(
                    type_name = record.type_name.as_str(),
                    id = record.id,
                    "snapshot entity type not registered; entity skipped"
                );
                continue;
            };
            let hook = def.restore_hook();
            self.spawn_with_id(&record.type_name, id, record.client_id, &[])?;
            if let Some(hook) = hook {
                hooks.push((hook, id));
            }
        }

        for write in &writes {
            let store = self.store_mut(write.component);
            let field = store.field(&write.field_name).expect("validated above");
            // Synchronized entities keep slot == index.
            store.set_raw_slot(field, write.entity.index(), write.value);
        }

        for (hook, id) in hooks {
            hook(self, id);
        }

        // Restored inputs re-enter the registry exactly as sent.
        self.restore_inputs(meta.inputs.clone());

        let state_hash_matches = if skipped_types.is_empty() {
            let restored = self.state_hash();
            if restored != meta.state_hash {
                tracing::warn!(
                    expected = meta.state_hash,
                    actual = restored,
                    "restored state hash differs from sender"
                );
                false
            } else {
                true
            }
        } else {
            false
        };

        Ok(SnapshotReport {
            frame: meta.frame,
            seq: meta.seq,
            state_hash_matches,
            skipped_types: skipped_types.into_iter().collect(),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed::to_fixed;
    use crate::storage::{ComponentDef, FieldValue};
    use crate::world::{EntityTypeDef, WorldConfig};

    fn build_world() -> World {
        let mut world = World::new(WorldConfig::default());
        let transform = world.define_component(
            ComponentDef::new("transform2d")
                .field_fixed("x", 0.0)
                .field_fixed("y", 0.0),
        );
        let body = world.define_component(
            ComponentDef::new("body2d")
                .field_fixed("vx", 0.0)
                .field_fixed("vy", 0.0)
                .field_u8("body_type", 2),
        );
        world.define_entity(
            EntityTypeDef::new("ball")
                .component(transform)
                .component(body),
        );
        world.define_entity(EntityTypeDef::new("wall").component(transform));
        world
    }

    #[test]
    fn round_trip_preserves_state_hash() {
        let mut a = build_world();
        a.spawn("ball", &[("x", FieldValue::Float(100.0)), ("vx", FieldValue::Float(1.0))])
            .unwrap();
        a.spawn("wall", &[("y", FieldValue::Float(-3.0))]).unwrap();
        a.rng_mut().next_u32();

        let snapshot = a.encode_snapshot(17);

        let mut b = build_world();
        let report = b.decode_snapshot(&snapshot).unwrap();
        assert!(report.state_hash_matches);
        assert!(report.skipped_types.is_empty());
        assert_eq!(report.seq, 17);
        assert_eq!(b.state_hash(), a.state_hash());
        assert_eq!(b.rng().state(), a.rng().state());
        assert_eq!(b.entity_count(), a.entity_count());
    }

    #[test]
    fn entity_ids_and_values_survive() {
        let mut a = build_world();
        let destroyed = a.spawn("wall", &[]).unwrap();
        let ball = a
            .spawn_for_client("ball", 7, &[("x", FieldValue::Float(12.5))])
            .unwrap();
        a.destroy(destroyed).unwrap();

        let snapshot = a.encode_snapshot(0);
        let mut b = build_world();
        b.decode_snapshot(&snapshot).unwrap();

        assert!(b.is_alive(ball));
        assert_eq!(b.by_client_id(7), Some(ball));
        let transform = b.component_id("transform2d").unwrap();
        assert_eq!(b.get_i32(ball, transform, "x").unwrap(), to_fixed(12.5));
        // The freed index is recycled identically on both sides.
        assert_eq!(
            a.spawn("wall", &[]).unwrap(),
            b.spawn("wall", &[]).unwrap()
        );
    }

    #[test]
    fn zero_entity_snapshot_round_trips() {
        let a = build_world();
        let snapshot = a.encode_snapshot(1);
        let mut b = build_world();
        let report = b.decode_snapshot(&snapshot).unwrap();
        assert!(report.state_hash_matches);
        assert_eq!(b.entity_count(), 0);
        assert_eq!(b.state_hash(), a.state_hash());
    }

    #[test]
    fn unknown_entity_type_is_skipped_not_fatal() {
        let mut a = build_world();
        let extra = a.define_component(ComponentDef::new("exotic").field_fixed("q", 1.0));
        a.define_entity(EntityTypeDef::new("alien").component(extra));
        a.spawn("alien", &[]).unwrap();
        a.spawn("ball", &[("x", FieldValue::Float(5.0))]).unwrap();

        // Receiver knows the component but never registered the type.
        let mut b = build_world();
        b.define_component(ComponentDef::new("exotic").field_fixed("q", 1.0));

        let report = b.decode_snapshot(&a.encode_snapshot(0)).unwrap();
        assert_eq!(report.skipped_types, vec!["alien".to_owned()]);
        assert!(!report.state_hash_matches);
        // The ball still made it through intact.
        assert_eq!(b.by_type("ball").count(), 1);
        let ball = b.by_type("ball").next().unwrap();
        let transform = b.component_id("transform2d").unwrap();
        assert_eq!(b.get_i32(ball, transform, "x").unwrap(), to_fixed(5.0));
    }

    #[test]
    fn corrupt_body_rejected_without_mutation() {
        let mut a = build_world();
        a.spawn("ball", &[]).unwrap();
        let mut snapshot = a.encode_snapshot(0);
        let last = snapshot.len() - 1;
        snapshot[last] ^= 0xFF;

        let mut b = build_world();
        let before = b.spawn("wall", &[]).unwrap();
        let err = b.decode_snapshot(&snapshot).unwrap_err();
        assert!(matches!(err, SimError::InvalidSnapshot { .. }));
        // The failed decode left the world alone.
        assert!(b.is_alive(before));
        assert_eq!(b.entity_count(), 1);
    }

    #[test]
    fn truncated_and_garbage_inputs_rejected() {
        let mut b = build_world();
        assert!(b.decode_snapshot(&[]).is_err());
        assert!(b.decode_snapshot(&[1, 2, 3]).is_err());
        assert!(b.decode_snapshot(&[255u8; 64]).is_err());
    }

    #[test]
    fn version_mismatch_rejected() {
        let a = build_world();
        let snapshot = a.encode_snapshot(0);
        // Parse out the meta, bump the version, re-frame.
        let meta_len = u32::from_le_bytes(snapshot[0..4].try_into().unwrap()) as usize;
        let mut meta: serde_json::Value =
            serde_json::from_slice(&snapshot[4..4 + meta_len]).unwrap();
        meta["version"] = serde_json::json!(3);
        let meta_bytes = serde_json::to_vec(&meta).unwrap();
        let mut forged = Vec::new();
        forged.extend_from_slice(&(meta_bytes.len() as u32).to_le_bytes());
        forged.extend_from_slice(&meta_bytes);
        forged.extend_from_slice(&snapshot[4 + meta_len..]);

        let mut b = build_world();
        let err = b.decode_snapshot(&forged).unwrap_err();
        assert!(matches!(err, SimError::InvalidSnapshot { .. }));
    }

    #[test]
    fn local_entities_stay_out_of_snapshots() {
        let mut a = build_world();
        let scratch = a.define_component(ComponentDef::new("fx").local().field_fixed("t", 0.0));
        a.define_entity(EntityTypeDef::new("puff").component(scratch).local_only());
        a.spawn("puff", &[]).unwrap();
        a.spawn("ball", &[]).unwrap();

        let snapshot = a.encode_snapshot(0);
        let mut b = build_world();
        b.decode_snapshot(&snapshot).unwrap();
        assert_eq!(b.entity_count(), 1);
        assert_eq!(b.by_type("puff").count(), 0);
    }

    #[test]
    fn string_registry_travels() {
        let mut a = build_world();
        a.strings_mut().intern("ui", "scoreboard");
        a.strings_mut().intern("ui", "minimap");
        let snapshot = a.encode_snapshot(0);

        let mut b = build_world();
        b.decode_snapshot(&snapshot).unwrap();
        assert_eq!(b.strings().lookup("ui", "minimap"), Some(2));
    }

    #[test]
    fn size_scales_with_entities_not_names() {
        let mut a = build_world();
        a.spawn("ball", &[]).unwrap();
        let one = a.encode_snapshot(0).len();
        for _ in 0..9 {
            a.spawn("ball", &[]).unwrap();
        }
        let ten = a.encode_snapshot(0).len();
        // Nine more entities at 4 synced i32 fields + 1 u8 each, plus their
        // meta records; the schema itself is not repeated.
        assert!(ten - one < 9 * 120, "snapshot grew too fast: {one} -> {ten}");
    }
}
