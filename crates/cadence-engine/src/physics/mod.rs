//! Deterministic 2D physics pipeline.
//!
//! [`PhysicsWorld2D`] runs one physics step per tick at the scheduler's
//! `physics` phase: load bodies from ECS columns, integrate velocities,
//! broad phase, narrow phase, response, position integration, sleep
//! bookkeeping, write back, then dispatch collision handlers.
//!
//! Two properties carry the determinism contract:
//!
//! - the pipeline holds **no state between ticks** -- every scrap of body
//!   state (down to the sleep timer) lives in synchronized component
//!   columns, so a restored snapshot reproduces physics bit-exactly;
//! - every iteration order -- bodies, candidate pairs, responses, handler
//!   invocations -- is a pure function of the set of body *labels*,
//!   which are themselves derived from entity type names and ids.

pub mod body;
pub mod broadphase;
pub mod narrowphase;
pub mod solver;

use cadence_ecs::entity::EntityId;
use cadence_ecs::fixed::{to_fixed, Fixed};
use cadence_ecs::storage::{ComponentDef, ComponentId, FieldId};
use cadence_ecs::vec::FixedVec2;
use cadence_ecs::world::World;

pub use body::{Body, BodyType, Shape2D};
pub use broadphase::{SpatialHashGrid, DEFAULT_CELL_SIZE};
pub use narrowphase::Contact;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tuning constants for the pipeline. Every value is part of the
/// synchronized behavior: peers must share a configuration.
#[derive(Debug, Clone)]
pub struct PhysicsConfig {
    pub gravity: FixedVec2,
    /// Broad-phase cell size; must be at least the largest body diameter.
    pub cell_size: Fixed,
    /// Penetration tolerated before positional correction kicks in.
    pub slop: Fixed,
    /// Fraction of excess penetration corrected per tick.
    pub correction: Fixed,
    /// Speed under which a body accumulates sleep frames.
    pub sleep_threshold: Fixed,
    /// Consecutive quiet frames before a body sleeps.
    pub sleep_frames: u8,
    /// Linear speed snapped to zero at integration.
    pub linear_clamp: Fixed,
    /// Angular speed snapped to zero at integration.
    pub angular_clamp: Fixed,
    /// Closing speed under which contacts resolve inelastically.
    pub restitution_threshold: Fixed,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            gravity: FixedVec2::ZERO,
            cell_size: DEFAULT_CELL_SIZE,
            slop: to_fixed(0.01),
            correction: to_fixed(0.6),
            sleep_threshold: to_fixed(0.12),
            sleep_frames: 20,
            linear_clamp: to_fixed(0.05),
            angular_clamp: to_fixed(0.01),
            restitution_threshold: to_fixed(1.0),
        }
    }
}

// ---------------------------------------------------------------------------
// Component schemas
// ---------------------------------------------------------------------------

/// Handles for the physics component pair.
#[derive(Debug, Clone, Copy)]
pub struct PhysicsComponents {
    pub transform: ComponentId,
    pub body: ComponentId,
}

/// Define (or look up) the `transform2d` and `body2d` schemas.
///
/// Idempotent so that engine setup and game setup can both call it.
pub fn register_physics_components(world: &mut World) -> PhysicsComponents {
    let transform = match world.component_id("transform2d") {
        Some(id) => id,
        None => world.define_component(
            ComponentDef::new("transform2d")
                .field_fixed("x", 0.0)
                .field_fixed("y", 0.0)
                .field_fixed("angle", 0.0),
        ),
    };
    let body = match world.component_id("body2d") {
        Some(id) => id,
        None => world.define_component(
            ComponentDef::new("body2d")
                .field_fixed("vx", 0.0)
                .field_fixed("vy", 0.0)
                .field_fixed("angular_velocity", 0.0)
                .field_u8("shape", 0)
                .field_fixed("radius", 0.5)
                .field_fixed("half_w", 0.5)
                .field_fixed("half_h", 0.5)
                .field_u8("body_type", BodyType::Dynamic.tag())
                .field_fixed("inv_mass", 1.0)
                .field_fixed("inv_inertia", 1.0)
                .field_fixed("restitution", 0.0)
                .field_fixed("friction", 0.0)
                .field_u8("layer", 1)
                .field_u8("mask", 0xFF)
                .field_bool("sensor", false)
                .field_bool("lock_rotation", false)
                .field_bool("sleeping", false)
                .field_u8("sleep_timer", 0)
                .field_fixed("linear_damping", 0.0)
                .field_fixed("angular_damping", 0.0),
        ),
    };
    PhysicsComponents { transform, body }
}

// ---------------------------------------------------------------------------
// Collision events and handlers
// ---------------------------------------------------------------------------

/// A collision (or sensor overlap) reported to game code.
#[derive(Debug, Clone)]
pub struct CollisionEvent {
    pub a: EntityId,
    pub b: EntityId,
    pub a_type: String,
    pub b_type: String,
    /// Unit normal from `a` toward `b`.
    pub normal: FixedVec2,
    pub penetration: Fixed,
    /// Representative contact point.
    pub contact: FixedVec2,
    /// True when either side is a sensor (no physical response happened).
    pub sensor: bool,
}

impl CollisionEvent {
    /// The same event from the other body's point of view.
    pub fn swapped(&self) -> Self {
        Self {
            a: self.b,
            b: self.a,
            a_type: self.b_type.clone(),
            b_type: self.a_type.clone(),
            normal: -self.normal,
            penetration: self.penetration,
            contact: self.contact,
            sensor: self.sensor,
        }
    }
}

type CollisionHandler = Box<dyn FnMut(&mut World, &CollisionEvent)>;

struct HandlerEntry {
    a_type: String,
    b_type: String,
    handler: CollisionHandler,
}

// ---------------------------------------------------------------------------
// Cached field handles
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
struct TransformFields {
    x: FieldId,
    y: FieldId,
    angle: FieldId,
}

#[derive(Debug, Clone, Copy)]
struct BodyFields {
    vx: FieldId,
    vy: FieldId,
    angular_velocity: FieldId,
    shape: FieldId,
    radius: FieldId,
    half_w: FieldId,
    half_h: FieldId,
    body_type: FieldId,
    inv_mass: FieldId,
    inv_inertia: FieldId,
    restitution: FieldId,
    friction: FieldId,
    layer: FieldId,
    mask: FieldId,
    sensor: FieldId,
    lock_rotation: FieldId,
    sleeping: FieldId,
    sleep_timer: FieldId,
    linear_damping: FieldId,
    angular_damping: FieldId,
}

// ---------------------------------------------------------------------------
// PhysicsWorld2D
// ---------------------------------------------------------------------------

/// The 2D pipeline. Owns configuration and collision handlers; body state
/// lives entirely in the world's component columns.
pub struct PhysicsWorld2D {
    config: PhysicsConfig,
    components: PhysicsComponents,
    transform_fields: TransformFields,
    body_fields: BodyFields,
    handlers: Vec<HandlerEntry>,
}

impl PhysicsWorld2D {
    /// Create the pipeline, defining the physics components if needed.
    pub fn new(world: &mut World, config: PhysicsConfig) -> Self {
        let components = register_physics_components(world);
        let t = world.store(components.transform);
        let transform_fields = TransformFields {
            x: t.field("x").expect("transform2d schema"),
            y: t.field("y").expect("transform2d schema"),
            angle: t.field("angle").expect("transform2d schema"),
        };
        let b = world.store(components.body);
        let field = |name: &str| b.field(name).expect("body2d schema");
        let body_fields = BodyFields {
            vx: field("vx"),
            vy: field("vy"),
            angular_velocity: field("angular_velocity"),
            shape: field("shape"),
            radius: field("radius"),
            half_w: field("half_w"),
            half_h: field("half_h"),
            body_type: field("body_type"),
            inv_mass: field("inv_mass"),
            inv_inertia: field("inv_inertia"),
            restitution: field("restitution"),
            friction: field("friction"),
            layer: field("layer"),
            mask: field("mask"),
            sensor: field("sensor"),
            lock_rotation: field("lock_rotation"),
            sleeping: field("sleeping"),
            sleep_timer: field("sleep_timer"),
            linear_damping: field("linear_damping"),
            angular_damping: field("angular_damping"),
        };
        Self {
            config,
            components,
            transform_fields,
            body_fields,
            handlers: Vec::new(),
        }
    }

    pub fn config(&self) -> &PhysicsConfig {
        &self.config
    }

    pub fn components(&self) -> PhysicsComponents {
        self.components
    }

    /// Register a collision handler for an entity-type pair.
    ///
    /// For `a_type != b_type` the swapped-argument direction is synthesized
    /// automatically; for a same-type pair the handler fires twice per
    /// collision, once per argument order.
    pub fn on_collision(
        &mut self,
        a_type: &str,
        b_type: &str,
        handler: impl FnMut(&mut World, &CollisionEvent) + 'static,
    ) {
        self.handlers.push(HandlerEntry {
            a_type: a_type.to_owned(),
            b_type: b_type.to_owned(),
            handler: Box::new(handler),
        });
    }

    // -- ECS load / store ----------------------------------------------------

    fn load_bodies(&self, world: &World) -> Vec<Body> {
        let mut bodies = Vec::new();
        let t = world.store(self.components.transform);
        let b = world.store(self.components.body);
        let tf = self.transform_fields;
        let bf = self.body_fields;
        for id in world.by_components(&[self.components.transform, self.components.body]) {
            if !world.is_alive(id) {
                continue;
            }
            let Some(meta) = world.entity_meta(id) else {
                continue;
            };
            let i = world.slot_of(id);
            let shape = if b.get_u8(bf.shape, i) == 1 {
                Shape2D::Box {
                    half_w: b.get_i32(bf.half_w, i),
                    half_h: b.get_i32(bf.half_h, i),
                }
            } else {
                Shape2D::Circle {
                    radius: b.get_i32(bf.radius, i),
                }
            };
            bodies.push(Body {
                owner: id,
                label: format!("{}:{:010}", meta.type_name(), id.to_raw()),
                type_name: meta.type_name().to_owned(),
                shape,
                body_type: BodyType::from_tag(b.get_u8(bf.body_type, i)),
                position: FixedVec2::new(t.get_i32(tf.x, i), t.get_i32(tf.y, i)),
                angle: t.get_i32(tf.angle, i),
                velocity: FixedVec2::new(b.get_i32(bf.vx, i), b.get_i32(bf.vy, i)),
                angular_velocity: b.get_i32(bf.angular_velocity, i),
                inv_mass: b.get_i32(bf.inv_mass, i),
                inv_inertia: b.get_i32(bf.inv_inertia, i),
                restitution: b.get_i32(bf.restitution, i),
                friction: b.get_i32(bf.friction, i),
                layer: b.get_u8(bf.layer, i),
                mask: b.get_u8(bf.mask, i),
                sensor: b.get_bool(bf.sensor, i),
                lock_rotation: b.get_bool(bf.lock_rotation, i),
                sleeping: b.get_bool(bf.sleeping, i),
                sleep_timer: b.get_u8(bf.sleep_timer, i),
                linear_damping: b.get_i32(bf.linear_damping, i),
                angular_damping: b.get_i32(bf.angular_damping, i),
            });
        }
        bodies.sort_by(|a, b| a.label.cmp(&b.label));
        bodies
    }

    fn store_bodies(&self, world: &mut World, bodies: &[Body]) {
        let tf = self.transform_fields;
        let bf = self.body_fields;
        for body in bodies {
            if !world.is_alive(body.owner) {
                continue;
            }
            let i = world.slot_of(body.owner);
            let t = world.store_mut(self.components.transform);
            t.set_i32(tf.x, i, body.position.x);
            t.set_i32(tf.y, i, body.position.y);
            t.set_i32(tf.angle, i, body.angle);
            let b = world.store_mut(self.components.body);
            b.set_i32(bf.vx, i, body.velocity.x);
            b.set_i32(bf.vy, i, body.velocity.y);
            b.set_i32(bf.angular_velocity, i, body.angular_velocity);
            b.set_bool(bf.sleeping, i, body.sleeping);
            b.set_u8(bf.sleep_timer, i, body.sleep_timer);
        }
    }

    /// Clear sleep state on every body.
    ///
    /// Sleep bookkeeping is synchronized component data, so this is a
    /// simulation event that every peer must apply on the same frame
    /// (see `Session::wake_all_bodies`). Snapshot restore does not call
    /// it: restored columns already carry exact sleep state, and waking
    /// on one peer only would desynchronize the fleet.
    pub fn wake_all(&self, world: &mut World) {
        let bf = self.body_fields;
        let ids: Vec<EntityId> = world.by_components(&[self.components.body]).collect();
        for id in ids {
            if !world.is_alive(id) {
                continue;
            }
            let slot = world.slot_of(id);
            let b = world.store_mut(self.components.body);
            b.set_bool(bf.sleeping, slot, false);
            b.set_u8(bf.sleep_timer, slot, 0);
        }
    }

    // -- the step ------------------------------------------------------------

    /// Run one physics step against the world. Call from the `physics`
    /// phase, once per tick.
    pub fn step(&mut self, world: &mut World) {
        let dt = world.dt();
        let mut bodies = self.load_bodies(world);
        if bodies.is_empty() {
            return;
        }

        // 1. Integrate velocities (label order).
        solver::integrate_velocities(&mut bodies, self.config.gravity, dt);

        // 2. Broad phase.
        let mut grid = SpatialHashGrid::new(self.config.cell_size);
        for (index, body) in bodies.iter().enumerate() {
            grid.insert(index, body.position);
        }

        // 3. Narrow phase over candidate pairs.
        let mut contacts: Vec<Contact> = Vec::new();
        grid.for_each_pair(|a, b| {
            let (ba, bb) = (&bodies[a], &bodies[b]);
            // A pair with no side able to move this frame (static or
            // asleep on both ends) generates nothing; re-processing it
            // would keep nudging settled stacks awake.
            let a_inert = ba.body_type == BodyType::Static || ba.sleeping;
            let b_inert = bb.body_type == BodyType::Static || bb.sleeping;
            if a_inert && b_inert {
                return;
            }
            if !ba.can_collide_with(bb) {
                return;
            }
            if let Some(contact) = narrowphase::collide(&bodies, a, b) {
                contacts.push(contact);
            }
        });

        // 4. Deterministic response/callback order: orient each pair so
        //    labelA <= labelB, then sort by (labelA, labelB).
        for contact in &mut contacts {
            if bodies[contact.a].label > bodies[contact.b].label {
                std::mem::swap(&mut contact.a, &mut contact.b);
                contact.normal = -contact.normal;
            }
        }
        contacts.sort_by(|lhs, rhs| {
            (&bodies[lhs.a].label, &bodies[lhs.b].label)
                .cmp(&(&bodies[rhs.a].label, &bodies[rhs.b].label))
        });

        // 5. Response (sensors emit events only).
        let mut events = Vec::with_capacity(contacts.len());
        for contact in &contacts {
            let sensor = bodies[contact.a].sensor || bodies[contact.b].sensor;
            events.push(CollisionEvent {
                a: bodies[contact.a].owner,
                b: bodies[contact.b].owner,
                a_type: bodies[contact.a].type_name.clone(),
                b_type: bodies[contact.b].type_name.clone(),
                normal: contact.normal,
                penetration: contact.penetration,
                contact: narrowphase::manifold_center(&contact.points),
                sensor,
            });
            if sensor {
                continue;
            }
            solver::positional_correction(
                &mut bodies,
                contact,
                self.config.slop,
                self.config.correction,
            );
            solver::apply_impulses(&mut bodies, contact, self.config.restitution_threshold);
        }

        // 6. Integrate positions; 7. sleep bookkeeping.
        solver::integrate_positions(
            &mut bodies,
            dt,
            self.config.linear_clamp,
            self.config.angular_clamp,
        );
        solver::update_sleep(&mut bodies, self.config.sleep_threshold, self.config.sleep_frames);

        // 8. Write back, then hand events to game code (handlers may
        //    mutate the world freely, including despawns).
        self.store_bodies(world, &bodies);
        self.dispatch(world, &events);
    }

    fn dispatch(&mut self, world: &mut World, events: &[CollisionEvent]) {
        for event in events {
            for entry in &mut self.handlers {
                if entry.a_type == event.a_type && entry.b_type == event.b_type {
                    (entry.handler)(world, event);
                    if event.a_type == event.b_type {
                        (entry.handler)(world, &event.swapped());
                    }
                } else if entry.a_type == event.b_type && entry.b_type == event.a_type {
                    (entry.handler)(world, &event.swapped());
                }
            }
        }
    }
}

impl std::fmt::Debug for PhysicsWorld2D {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhysicsWorld2D")
            .field("config", &self.config)
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
