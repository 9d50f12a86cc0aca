//! Narrow-phase geometric tests shared by the native backend and the host
//! reference device
//!
//! Every test returns the penetration vector that separates the *first*
//! shape from the second (`None` when the shapes do not overlap), so a
//! positive result can be applied directly as a push on the first collider.
//! Box tests operate in 2D (x/y); sphere positions carry z but only x/y
//! participate, except in the gravity force which is fully 3D.

use crate::foundation::math::{float_eq_zero, Vec2, Vec3, Vec4};

/// Signed penetration along one axis.
///
/// Zero means separated; otherwise the magnitude is the overlap and the sign
/// encodes which side `[min1, max1]` lies on.
pub fn overlap(min0: f32, max0: f32, min1: f32, max1: f32) -> f32 {
    if min1 > max0 || max1 < min0 {
        0.0
    } else if max0 > max1 {
        min0 - max1
    } else {
        max0 - min1
    }
}

/// Broad-phase pre-check: bounding circles around `c0` and `c1` intersect.
pub fn radius_check(c0: Vec2, r0: f32, c1: Vec2, r1: f32) -> bool {
    (c1 - c0).magnitude_squared() < (r0 + r1) * (r0 + r1)
}

/// Exact AABB-AABB test.
///
/// Separate-axis overlap on x then y; the contact normal is the axis of
/// smaller absolute overlap, negated and scaled by that overlap. The `<=`
/// comparison makes x win ties because it is evaluated first.
pub fn aabb_overlap(bl0: Vec2, tr0: Vec2, bl1: Vec2, tr1: Vec2) -> Option<Vec3> {
    let xo = overlap(bl0.x, tr0.x, bl1.x, tr1.x);
    if float_eq_zero(xo) {
        return None;
    }
    let yo = overlap(bl0.y, tr0.y, bl1.y, tr1.y);
    if float_eq_zero(yo) {
        return None;
    }
    Some(if xo.abs() <= yo.abs() {
        Vec3::new(-xo, 0.0, 0.0)
    } else {
        Vec3::new(0.0, -yo, 0.0)
    })
}

/// Lightweight oriented-box view for the SAT test.
///
/// `bl`/`tr` are the unrotated world-space corners; the rotation applies
/// about `center`.
#[derive(Debug, Clone, Copy)]
pub struct Obb {
    /// World-space center
    pub center: Vec2,
    /// Unrotated world-space bottom-left corner
    pub bl: Vec2,
    /// Unrotated world-space top-right corner
    pub tr: Vec2,
    /// Cosine of the rotation about `center`
    pub cos: f32,
    /// Sine of the rotation about `center`
    pub sin: f32,
}

impl Obb {
    /// View an axis-aligned box as an unrotated OBB
    pub fn axis_aligned(center: Vec2, bl: Vec2, tr: Vec2) -> Self {
        Self {
            center,
            bl,
            tr,
            cos: 1.0,
            sin: 0.0,
        }
    }

    // Box corners relative to the center, rotated into world orientation.
    fn corners(&self) -> [Vec2; 4] {
        let bl = self.bl - self.center;
        let tr = self.tr - self.center;
        [
            self.rotate(bl),
            self.rotate(Vec2::new(tr.x, bl.y)),
            self.rotate(tr),
            self.rotate(Vec2::new(bl.x, tr.y)),
        ]
    }

    fn rotate(&self, v: Vec2) -> Vec2 {
        Vec2::new(self.cos * v.x - self.sin * v.y, self.sin * v.x + self.cos * v.y)
    }

    fn rotate_inv(&self, v: Vec2) -> Vec2 {
        Vec2::new(self.cos * v.x + self.sin * v.y, -self.sin * v.x + self.cos * v.y)
    }
}

// One direction of the SAT test: project b1's corners into b0's local frame
// and run the axis-overlap test against b0's extents there. Returns the
// world-space penetration separating b0 from b1 along one of b0's axes.
fn obb_axis_overlap(b0: &Obb, b1: &Obb) -> Option<Vec3> {
    let mut min = Vec2::new(f32::INFINITY, f32::INFINITY);
    let mut max = Vec2::new(f32::NEG_INFINITY, f32::NEG_INFINITY);
    for corner in b1.corners() {
        let q = b0.rotate_inv(corner + b1.center - b0.center);
        min = min.inf(&q);
        max = max.sup(&q);
    }
    let bl = b0.bl - b0.center;
    let tr = b0.tr - b0.center;
    let xo = overlap(bl.x, tr.x, min.x, max.x);
    if float_eq_zero(xo) {
        return None;
    }
    let yo = overlap(bl.y, tr.y, min.y, max.y);
    if float_eq_zero(yo) {
        return None;
    }
    let local = if xo.abs() <= yo.abs() {
        Vec2::new(-xo, 0.0)
    } else {
        Vec2::new(0.0, -yo)
    };
    let world = b0.rotate(local);
    Some(Vec3::new(world.x, world.y, 0.0))
}

/// Separating-axis test between two oriented boxes.
///
/// Runs the axis-overlap test in both boxes' local frames (two candidate
/// axes per box) and keeps the candidate with smaller penetration depth. A
/// zero overlap in either frame means a separating axis exists.
pub fn obb_overlap(b0: &Obb, b1: &Obb) -> Option<Vec3> {
    let v0 = obb_axis_overlap(b0, b1)?;
    let v1 = -obb_axis_overlap(b1, b0)?;
    Some(if v0.magnitude_squared() <= v1.magnitude_squared() {
        v0
    } else {
        v1
    })
}

/// Exact sphere-sphere test, in 2D.
///
/// `None` when separated or when the centers coincide exactly (the contact
/// direction is undefined there).
pub fn sphere_overlap(pos0: Vec3, r0: f32, pos1: Vec3, r1: f32) -> Option<Vec3> {
    let d = pos0.xy() - pos1.xy();
    let d2 = d.magnitude_squared();
    let sum = r0 + r1;
    if d2 >= sum * sum || d2 == 0.0 {
        return None;
    }
    let dist = d2.sqrt();
    let v = d * ((sum - dist) / dist);
    Some(Vec3::new(v.x, v.y, 0.0))
}

/// Exact box-sphere test via closest point.
///
/// Returns the vector separating the box from the sphere. A sphere center
/// inside the box falls back to the axis-overlap test against the sphere's
/// bounding square.
pub fn box_sphere_overlap(bl: Vec2, tr: Vec2, sphere_pos: Vec2, r: f32) -> Option<Vec3> {
    let closest = Vec2::new(
        sphere_pos.x.clamp(bl.x, tr.x),
        sphere_pos.y.clamp(bl.y, tr.y),
    );
    let d = closest - sphere_pos;
    let d2 = d.magnitude_squared();
    if d2 == 0.0 {
        // Center inside the box.
        let r_v = Vec2::new(r, r);
        return aabb_overlap(bl, tr, sphere_pos - r_v, sphere_pos + r_v);
    }
    if d2 >= r * r {
        return None;
    }
    let dist = d2.sqrt();
    let depth = r - dist;
    if float_eq_zero(depth) {
        return None;
    }
    let v = d * (depth / dist);
    Some(Vec3::new(v.x, v.y, 0.0))
}

/// Exact oriented-box-sphere test: rotates the sphere center into the box's
/// local frame, runs the axis-aligned test there, and rotates the result
/// back.
pub fn obb_sphere_overlap(b: &Obb, sphere_pos: Vec2, r: f32) -> Option<Vec3> {
    let local_pos = b.rotate_inv(sphere_pos - b.center);
    let v = box_sphere_overlap(b.bl - b.center, b.tr - b.center, local_pos, r)?;
    let world = b.rotate(v.xy());
    Some(Vec3::new(world.x, world.y, 0.0))
}

/// Exact sphere-half-space test.
///
/// The penetration depth is `r - (dot(n, p) + d)`; a sphere exactly tangent
/// to the plane does not collide.
pub fn sphere_plane_overlap(pos: Vec3, r: f32, abcd: Vec4) -> Option<Vec3> {
    let n = abcd.xyz();
    let depth = r - (n.dot(&pos) + abcd.w);
    if depth <= 0.0 || float_eq_zero(depth) {
        return None;
    }
    Some(n * depth)
}

/// Inverse-square gravitational force exerted on a body at `pos` by a well.
///
/// `None` beyond the well's cutoff or at zero distance. The force points
/// from the body toward the well: `d * G * m_well * m_body / |d|^3`.
pub fn gravity_force(
    g: f32,
    pos: Vec3,
    mass: f32,
    well_pos: Vec3,
    well_mass: f32,
    max_distance2: f32,
) -> Option<Vec3> {
    let d = well_pos - pos;
    let d2 = d.magnitude_squared();
    if d2 > max_distance2 || d2 == 0.0 {
        return None;
    }
    Some(d * (g * well_mass * mass / (d2 * d2.sqrt())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn vec3_eq(a: Vec3, b: Vec3) {
        assert_relative_eq!(a.x, b.x, epsilon = 1e-6);
        assert_relative_eq!(a.y, b.y, epsilon = 1e-6);
        assert_relative_eq!(a.z, b.z, epsilon = 1e-6);
    }

    #[test]
    fn overlap_separated() {
        assert_eq!(overlap(0.0, 1.0, 2.0, 3.0), 0.0);
        assert_eq!(overlap(2.0, 3.0, 0.0, 1.0), 0.0);
    }

    #[test]
    fn overlap_signs() {
        // [min1, max1] to the right
        assert_eq!(overlap(0.0, 1.0, 0.5, 1.5), 0.5);
        // [min1, max1] to the left
        assert_eq!(overlap(0.5, 1.5, 0.0, 1.0), -0.5);
    }

    #[test]
    fn aabb_overlap_within_tolerance_is_separation() {
        let v = aabb_overlap(
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(1.0 - f32::EPSILON, 0.0),
            Vec2::new(2.0, 1.0),
        );
        assert!(v.is_none());
    }

    #[test]
    fn aabb_tie_break_prefers_x() {
        // Equal x and y overlap: x axis must win.
        let v = aabb_overlap(
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(0.5, 0.5),
            Vec2::new(1.5, 1.5),
        )
        .unwrap();
        vec3_eq(v, Vec3::new(-0.5, 0.0, 0.0));
    }

    #[test]
    fn obb_matches_aabb_at_zero_rotation() {
        let cases = [
            (Vec2::new(0.5, 0.0), true),
            (Vec2::new(1.5, 0.0), false),
            (Vec2::new(0.0, 0.75), true),
            (Vec2::new(0.0, 1.5), false),
        ];
        for (off, collides) in cases {
            let bl0 = Vec2::new(0.0, 0.0);
            let tr0 = Vec2::new(1.0, 1.0);
            let bl1 = bl0 + off;
            let tr1 = tr0 + off;
            let b0 = Obb::axis_aligned((bl0 + tr0) / 2.0, bl0, tr0);
            let b1 = Obb::axis_aligned((bl1 + tr1) / 2.0, bl1, tr1);
            let aabb = aabb_overlap(bl0, tr0, bl1, tr1);
            let obb = obb_overlap(&b0, &b1);
            assert_eq!(aabb.is_some(), collides);
            assert_eq!(obb.is_some(), collides);
            if let (Some(a), Some(o)) = (aabb, obb) {
                vec3_eq(a, o);
            }
        }
    }

    #[test]
    fn obb_rotated_quarter_turn() {
        // A 1x2 box rotated 90 degrees acts as a 2x1 box.
        let b0 = Obb {
            center: Vec2::new(1.0, 0.5),
            bl: Vec2::new(0.5, -0.5),
            tr: Vec2::new(1.5, 1.5),
            cos: 0.0,
            sin: 1.0,
        };
        let b1 = Obb {
            center: Vec2::new(-0.5, 0.5),
            bl: Vec2::new(-1.0, -0.5),
            tr: Vec2::new(0.0, 1.5),
            cos: 0.0,
            sin: 1.0,
        };
        let v = obb_overlap(&b0, &b1).unwrap();
        vec3_eq(v, Vec3::new(0.5, 0.0, 0.0));
    }

    #[test]
    fn sphere_axis_contact() {
        let v = sphere_overlap(
            Vec3::new(1.5, 1.5, 0.0),
            0.5,
            Vec3::new(1.0, 1.5, 0.0),
            0.5,
        )
        .unwrap();
        vec3_eq(v, Vec3::new(0.5, 0.0, 0.0));
    }

    #[test]
    fn sphere_coincident_centers_skipped() {
        assert!(sphere_overlap(Vec3::zeros(), 0.5, Vec3::zeros(), 0.5).is_none());
    }

    #[test]
    fn sphere_touching_is_no_contact() {
        assert!(sphere_overlap(
            Vec3::new(0.0, 0.0, 0.0),
            0.5,
            Vec3::new(1.0, 0.0, 0.0),
            0.5
        )
        .is_none());
    }

    #[test]
    fn box_sphere_side_contact() {
        // Sphere to the left of a unit box, overlapping by 0.15.
        let v = box_sphere_overlap(
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(-0.6, 0.5),
            0.75,
        )
        .unwrap();
        vec3_eq(v, Vec3::new(0.15, 0.0, 0.0));
    }

    #[test]
    fn box_sphere_separated_diagonal() {
        // Near the corner the closest-point distance exceeds the radius even
        // though the bounding boxes overlap.
        assert!(box_sphere_overlap(
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(1.4, 1.4),
            0.5
        )
        .is_none());
    }

    #[test]
    fn sphere_plane_cases() {
        let up = Vec4::new(0.0, 1.0, 0.0, -1.0);
        assert!(sphere_plane_overlap(Vec3::new(0.0, 1.5, 0.0), 0.5, up).is_none());
        let v = sphere_plane_overlap(Vec3::new(0.0, 1.25, 0.0), 0.5, up).unwrap();
        vec3_eq(v, Vec3::new(0.0, 0.25, 0.0));
        let v = sphere_plane_overlap(Vec3::new(0.0, 0.5, 0.0), 0.5, up).unwrap();
        vec3_eq(v, Vec3::new(0.0, 1.0, 0.0));
    }

    #[test]
    fn gravity_force_and_cutoff() {
        const G: f32 = 6.674e-11;
        let well = Vec3::new(1.0, 1.0, 0.0);
        let v = gravity_force(G, Vec3::new(2.0, 1.0, 0.0), 1.0, well, 1.0, 1.0).unwrap();
        vec3_eq(v, Vec3::new(-G, 0.0, 0.0));
        // Mass scales the force linearly.
        let v = gravity_force(G, Vec3::new(2.0, 1.0, 0.0), 2.0, well, 1.0, 1.0).unwrap();
        vec3_eq(v, Vec3::new(-2.0 * G, 0.0, 0.0));
        // Beyond the cutoff.
        assert!(gravity_force(G, Vec3::new(3.0, 1.0, 0.0), 1.0, well, 1.0, 1.0).is_none());
    }
}
