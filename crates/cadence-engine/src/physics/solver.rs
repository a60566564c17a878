//! Velocity integration, contact response, and sleep bookkeeping.
//!
//! Response is the classic two-part scheme: a positional correction that
//! bleeds off penetration beyond a small slop, and a restitution impulse
//! along the contact normal with Coulomb friction along the tangent. All
//! of it is straight-line Q16.16 arithmetic; the only divisions are by the
//! summed inverse masses and the manifold size.

use cadence_ecs::fixed::{fixed_div, fixed_mul, Fixed, FIXED_ONE};
use cadence_ecs::vec::FixedVec2;

use super::body::Body;
use super::narrowphase::Contact;

// ---------------------------------------------------------------------------
// Integration
// ---------------------------------------------------------------------------

/// Step 1 of the pipeline: gravity and damping for awake dynamic bodies.
/// `bodies` must already be in label order.
pub fn integrate_velocities(bodies: &mut [Body], gravity: FixedVec2, dt: Fixed) {
    for body in bodies.iter_mut() {
        if !body.is_dynamic() || body.sleeping {
            continue;
        }
        body.velocity = body.velocity.add(gravity.scale(dt));
        let linear_keep = FIXED_ONE.wrapping_sub(body.linear_damping);
        body.velocity = body.velocity.scale(linear_keep);
        let angular_keep = FIXED_ONE.wrapping_sub(body.angular_damping);
        body.angular_velocity = fixed_mul(body.angular_velocity, angular_keep);
    }
}

/// Step 6: sub-threshold velocity clamps and Euler position update.
pub fn integrate_positions(
    bodies: &mut [Body],
    dt: Fixed,
    linear_clamp: Fixed,
    angular_clamp: Fixed,
) {
    let linear_clamp_sq = fixed_mul(linear_clamp, linear_clamp);
    let angular_clamp_sq = fixed_mul(angular_clamp, angular_clamp);
    for body in bodies.iter_mut() {
        if body.sleeping || !matches!(body.body_type, super::body::BodyType::Dynamic | super::body::BodyType::Kinematic) {
            continue;
        }
        if body.is_dynamic() {
            if body.speed_squared() < linear_clamp_sq {
                body.velocity = FixedVec2::ZERO;
            }
            if body.spin_squared() < angular_clamp_sq {
                body.angular_velocity = 0;
            }
        }
        body.position = body.position.add(body.velocity.scale(dt));
        if !body.lock_rotation {
            body.angle = body.angle.wrapping_add(fixed_mul(body.angular_velocity, dt));
        }
    }
}

/// Step 7: sleep detection for dynamic bodies.
///
/// A body whose linear and angular speeds have stayed under the threshold
/// for `frames_required` consecutive frames goes to sleep with zeroed
/// velocities. Non-zero impulses wake bodies in [`apply_impulses`].
pub fn update_sleep(bodies: &mut [Body], threshold: Fixed, frames_required: u8) {
    let threshold_sq = fixed_mul(threshold, threshold);
    for body in bodies.iter_mut() {
        if !body.is_dynamic() || body.sleeping {
            continue;
        }
        if body.speed_squared() < threshold_sq && body.spin_squared() < threshold_sq {
            body.sleep_timer = body.sleep_timer.saturating_add(1);
            if body.sleep_timer >= frames_required {
                body.sleeping = true;
                body.velocity = FixedVec2::ZERO;
                body.angular_velocity = 0;
            }
        } else {
            body.sleep_timer = 0;
        }
    }
}

// ---------------------------------------------------------------------------
// Contact response
// ---------------------------------------------------------------------------

/// Step 5a: push the pair apart along the normal.
///
/// Only the penetration beyond `slop` is corrected, scaled by `factor`,
/// split equally between two movable bodies or applied fully to the only
/// movable side. Corrections are positional nudges, not impulses: they do
/// not wake anyone, or resting stacks could never accumulate sleep frames.
pub fn positional_correction(bodies: &mut [Body], contact: &Contact, slop: Fixed, factor: Fixed) {
    let excess = contact.penetration.wrapping_sub(slop);
    if excess <= 0 {
        return;
    }
    let total = fixed_mul(excess, factor);
    let a_movable = bodies[contact.a].is_dynamic();
    let b_movable = bodies[contact.b].is_dynamic();
    let (share_a, share_b) = match (a_movable, b_movable) {
        (true, true) => (total >> 1, total >> 1),
        (true, false) => (total, 0),
        (false, true) => (0, total),
        (false, false) => return,
    };
    if share_a > 0 {
        let a = &mut bodies[contact.a];
        a.position = a.position.sub(contact.normal.scale(share_a));
    }
    if share_b > 0 {
        let b = &mut bodies[contact.b];
        b.position = b.position.add(contact.normal.scale(share_b));
    }
}

/// Step 5b: restitution impulse plus Coulomb friction.
///
/// `j = -(1 + e) * (rel_vel . n) / (inv_mass_a + inv_mass_b)`, with `e`
/// the bouncier of the two restitutions, distributed evenly across the
/// manifold points; friction along the tangent uses `mu = min(fa, fb)`
/// clamped to `mu * |j|`. Closing speeds under `restitution_threshold`
/// resolve inelastically, so gravity-fed resting contacts settle instead
/// of micro-bouncing forever.
pub fn apply_impulses(bodies: &mut [Body], contact: &Contact, restitution_threshold: Fixed) {
    let inv_a = bodies[contact.a].effective_inv_mass();
    let inv_b = bodies[contact.b].effective_inv_mass();
    let inv_sum = inv_a.wrapping_add(inv_b);
    if inv_sum == 0 {
        return;
    }

    let normal = contact.normal;
    let rel = bodies[contact.b].velocity.sub(bodies[contact.a].velocity);
    let along_normal = rel.dot(normal);
    if along_normal > 0 {
        // Already separating.
        return;
    }

    let restitution = if -along_normal < restitution_threshold {
        0
    } else {
        bodies[contact.a].restitution.max(bodies[contact.b].restitution)
    };
    let j = fixed_div(
        fixed_mul(-(FIXED_ONE.wrapping_add(restitution)), along_normal),
        inv_sum,
    );

    // Even distribution over the manifold; for axis-aligned shapes the
    // per-point impulses share one direction, so the sum is exact.
    let point_count = contact.points.len().max(1) as i32;
    let j_per_point = j / point_count;
    for _ in 0..point_count {
        let impulse = normal.scale(j_per_point);
        let a = &mut bodies[contact.a];
        a.velocity = a.velocity.sub(impulse.scale(inv_a));
        let b = &mut bodies[contact.b];
        b.velocity = b.velocity.add(impulse.scale(inv_b));
    }

    // Friction along the tangent, Coulomb-clamped by the normal impulse.
    let tangent = normal.perpendicular();
    let rel = bodies[contact.b].velocity.sub(bodies[contact.a].velocity);
    let along_tangent = rel.dot(tangent);
    let mut jt = fixed_div(-along_tangent, inv_sum);
    let mu = bodies[contact.a].friction.min(bodies[contact.b].friction);
    let limit = fixed_mul(mu, j.wrapping_abs());
    if jt > limit {
        jt = limit;
    } else if jt < -limit {
        jt = -limit;
    }
    if jt != 0 {
        let impulse = tangent.scale(jt);
        let a = &mut bodies[contact.a];
        a.velocity = a.velocity.sub(impulse.scale(inv_a));
        let b = &mut bodies[contact.b];
        b.velocity = b.velocity.add(impulse.scale(inv_b));
    }

    // A real impulse pulls a sleeper back into the simulation. Awake
    // bodies are left alone: their sleep timers answer to the velocity
    // check in `update_sleep`, and resting-contact impulses (gravity fed
    // in, cancelled right back out) must not hold a stack awake forever.
    if j != 0 || jt != 0 {
        if bodies[contact.a].sleeping {
            bodies[contact.a].wake();
        }
        if bodies[contact.b].sleeping {
            bodies[contact.b].wake();
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
