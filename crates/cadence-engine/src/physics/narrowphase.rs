//! Narrow-phase contact generation.
//!
//! Candidate pairs that pass the AABB gate get a precise test per shape
//! pair. Contact normals always point from body A toward body B; the
//! solver pushes A along `-normal` and B along `+normal`.
//!
//! - circle-circle: center distance against summed radii.
//! - box-box: SAT on the two cardinal axes (boxes are axis-aligned); the
//!   minimum-overlap axis picks the normal, and the overlap rectangle's
//!   corners form a manifold of up to four points.
//! - circle-box: circle center clamped to the box bounds; a center inside
//!   the box resolves against its nearest face.

use cadence_ecs::fixed::{fixed_mul, fixed_sqrt, Fixed, FIXED_ONE};
use cadence_ecs::vec::FixedVec2;

use super::body::{aabb_overlap, Body, Shape2D};

/// A contact between two bodies, indices into the step's body vector.
#[derive(Debug, Clone)]
pub struct Contact {
    pub a: usize,
    pub b: usize,
    /// Unit normal from A toward B.
    pub normal: FixedVec2,
    pub penetration: Fixed,
    /// Contact manifold, one to four points.
    pub points: Vec<FixedVec2>,
}

/// Raw geometric result before body indices are attached.
struct Overlap {
    normal: FixedVec2,
    penetration: Fixed,
    points: Vec<FixedVec2>,
}

/// Run the precise test for one candidate pair. `None` when the shapes do
/// not actually overlap (or only touch exactly).
pub fn collide(bodies: &[Body], a: usize, b: usize) -> Option<Contact> {
    let (ba, bb) = (&bodies[a], &bodies[b]);
    if !aabb_overlap(ba, bb) {
        return None;
    }
    let overlap = match (ba.shape, bb.shape) {
        (Shape2D::Circle { radius: ra }, Shape2D::Circle { radius: rb }) => {
            circle_circle(ba.position, ra, bb.position, rb)
        }
        (Shape2D::Box { half_w: aw, half_h: ah }, Shape2D::Box { half_w: bw, half_h: bh }) => {
            box_box(ba.position, aw, ah, bb.position, bw, bh)
        }
        (Shape2D::Circle { radius }, Shape2D::Box { half_w, half_h }) => {
            // Computed box-relative; flip so the normal runs A (circle) -> B (box).
            circle_box(ba.position, radius, bb.position, half_w, half_h).map(|mut o| {
                o.normal = -o.normal;
                o
            })
        }
        (Shape2D::Box { half_w, half_h }, Shape2D::Circle { radius }) => {
            circle_box(bb.position, radius, ba.position, half_w, half_h)
        }
    }?;
    Some(Contact {
        a,
        b,
        normal: overlap.normal,
        penetration: overlap.penetration,
        points: overlap.points,
    })
}

// ---------------------------------------------------------------------------
// Shape pair tests
// ---------------------------------------------------------------------------

fn circle_circle(pa: FixedVec2, ra: Fixed, pb: FixedVec2, rb: Fixed) -> Option<Overlap> {
    let delta = pb.sub(pa);
    let combined = ra.wrapping_add(rb);
    let dist_sq = delta.length_squared();
    if dist_sq >= fixed_mul(combined, combined) {
        return None;
    }
    let dist = fixed_sqrt(dist_sq);
    // Coincident centers: arbitrary but fixed separation axis.
    let normal = if dist == 0 {
        FixedVec2::RIGHT
    } else {
        delta.div_scalar(dist)
    };
    let penetration = combined.wrapping_sub(dist);
    let point = pa.add(normal.scale(ra));
    Some(Overlap {
        normal,
        penetration,
        points: vec![point],
    })
}

fn box_box(
    pa: FixedVec2,
    aw: Fixed,
    ah: Fixed,
    pb: FixedVec2,
    bw: Fixed,
    bh: Fixed,
) -> Option<Overlap> {
    let dx = pb.x.wrapping_sub(pa.x);
    let dy = pb.y.wrapping_sub(pa.y);
    let overlap_x = aw.wrapping_add(bw).wrapping_sub(dx.wrapping_abs());
    if overlap_x <= 0 {
        return None;
    }
    let overlap_y = ah.wrapping_add(bh).wrapping_sub(dy.wrapping_abs());
    if overlap_y <= 0 {
        return None;
    }

    // Minimum-overlap axis picks the separation normal.
    let (normal, penetration) = if overlap_x < overlap_y {
        let sign = if dx >= 0 { FIXED_ONE } else { -FIXED_ONE };
        (FixedVec2::new(sign, 0), overlap_x)
    } else {
        let sign = if dy >= 0 { FIXED_ONE } else { -FIXED_ONE };
        (FixedVec2::new(0, sign), overlap_y)
    };

    // Manifold: corners of the overlap rectangle, deduplicated when the
    // rectangle collapses to an edge or point.
    let min_x = (pa.x.wrapping_sub(aw)).max(pb.x.wrapping_sub(bw));
    let max_x = (pa.x.wrapping_add(aw)).min(pb.x.wrapping_add(bw));
    let min_y = (pa.y.wrapping_sub(ah)).max(pb.y.wrapping_sub(bh));
    let max_y = (pa.y.wrapping_add(ah)).min(pb.y.wrapping_add(bh));
    let mut points = Vec::with_capacity(4);
    for &(x, y) in &[(min_x, min_y), (max_x, min_y), (min_x, max_y), (max_x, max_y)] {
        let p = FixedVec2::new(x, y);
        if !points.contains(&p) {
            points.push(p);
        }
    }

    Some(Overlap {
        normal,
        penetration,
        points,
    })
}

/// Circle against box; the returned normal points from the box toward the
/// circle (the caller flips it as needed).
fn circle_box(
    circle: FixedVec2,
    radius: Fixed,
    box_pos: FixedVec2,
    half_w: Fixed,
    half_h: Fixed,
) -> Option<Overlap> {
    let min = FixedVec2::new(box_pos.x.wrapping_sub(half_w), box_pos.y.wrapping_sub(half_h));
    let max = FixedVec2::new(box_pos.x.wrapping_add(half_w), box_pos.y.wrapping_add(half_h));
    let clamped = FixedVec2::new(
        circle.x.clamp(min.x, max.x),
        circle.y.clamp(min.y, max.y),
    );

    let inside = clamped == circle;
    if !inside {
        let delta = circle.sub(clamped);
        let dist_sq = delta.length_squared();
        if dist_sq >= fixed_mul(radius, radius) {
            return None;
        }
        let dist = fixed_sqrt(dist_sq);
        let normal = if dist == 0 {
            FixedVec2::RIGHT
        } else {
            delta.div_scalar(dist)
        };
        let penetration = radius.wrapping_sub(dist);
        // Contact point on the circle surface along the (inward) normal.
        let point = circle.sub(normal.scale(radius));
        return Some(Overlap {
            normal,
            penetration,
            points: vec![point],
        });
    }

    // Center inside the box: resolve against the nearest face.
    let to_right = max.x.wrapping_sub(circle.x);
    let to_left = circle.x.wrapping_sub(min.x);
    let to_top = max.y.wrapping_sub(circle.y);
    let to_bottom = circle.y.wrapping_sub(min.y);
    let mut face_distance = to_right;
    let mut normal = FixedVec2::RIGHT;
    if to_left < face_distance {
        face_distance = to_left;
        normal = FixedVec2::new(-FIXED_ONE, 0);
    }
    if to_top < face_distance {
        face_distance = to_top;
        normal = FixedVec2::UP;
    }
    if to_bottom < face_distance {
        face_distance = to_bottom;
        normal = FixedVec2::new(0, -FIXED_ONE);
    }
    let penetration = face_distance.wrapping_add(radius);
    let point = circle.add(normal.scale(radius));
    Some(Overlap {
        normal,
        penetration,
        points: vec![point],
    })
}

/// Closing speed of B relative to A along the contact normal; negative
/// means approaching.
pub fn relative_normal_speed(contact: &Contact, bodies: &[Body]) -> Fixed {
    let rel = bodies[contact.b].velocity.sub(bodies[contact.a].velocity);
    rel.dot(contact.normal)
}

/// Midpoint of a manifold (event reporting).
pub fn manifold_center(points: &[FixedVec2]) -> FixedVec2 {
    match points.len() {
        0 => FixedVec2::ZERO,
        1 => points[0],
        n => {
            let mut sum = FixedVec2::ZERO;
            for p in points {
                sum = sum.add(*p);
            }
            sum.div_scalar((n as i32) << 16)
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
