//! Native (host-side) collision backend
//!
//! Stateless per tick: every `check` call is a self-contained sweep over the
//! input arrays. Same-type tests run first (AABB, oriented box, sphere,
//! plane), then the gravity pass, then the cross-type tests. Once the
//! collision output fills up the rest of the sweep is abandoned; results
//! already found are kept and a warning is the only externally visible
//! effect.

use std::time::Instant;

use crate::colliders::{ColliderBody, GravityCollider, SphereCollider};
use crate::foundation::math::Vec3;
use crate::foundation::time::Timing;

use super::primitives::{
    aabb_overlap, box_sphere_overlap, gravity_force, obb_overlap, obb_sphere_overlap,
    radius_check, sphere_overlap, sphere_plane_overlap, Obb,
};
use super::{add_collision, pair_mut, Backend, BackendError, Input, Output, Stage};

/// Width of the sphere-sphere batch, matching the device's SIMD lane count.
const SPHERE_LANES: usize = 4;

/// Pure host-side backend using SIMD-batched pairwise tests
#[derive(Debug)]
pub struct NativeBackend {
    epoch: Instant,
}

impl Default for NativeBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeBackend {
    /// Create a native backend
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }

    fn now(&self) -> u64 {
        u64::try_from(self.epoch.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }

    // Runs one stage, recording its wall-clock span. Returns false once the
    // output is full and the sweep must stop.
    fn stage(
        &self,
        output: &mut Output,
        stage: Stage,
        f: impl FnOnce(&mut Output) -> bool,
    ) -> bool {
        let start = self.now();
        let ok = f(output);
        let end = self.now();
        output.stats.record_span(stage, start, end);
        ok
    }
}

impl Backend for NativeBackend {
    fn check(
        &mut self,
        _timing: &Timing,
        input: &mut Input,
        output: &mut Output,
    ) -> Result<(), BackendError> {
        output.stats.clear();
        let sweep_start = self.now();
        let _ = self.stage(output, Stage::AabbExec, |o| check_aabb(input.aabb, o))
            && self.stage(output, Stage::BbExec, |o| check_bb(input.bb, o))
            && self.stage(output, Stage::SphereExec, |o| check_sphere(input.sphere, o))
            && check_plane(input.plane)
            && self.stage(output, Stage::SphereGravityExec, |o| check_gravity(input, o))
            && self.stage(output, Stage::AabbBbExec, |o| {
                check_aabb_bb(input.aabb, input.bb, o)
            })
            && self.stage(output, Stage::AabbSphereExec, |o| {
                check_aabb_sphere(input.aabb, input.sphere, o)
            })
            && self.stage(output, Stage::BbSphereExec, |o| {
                check_bb_sphere(input.bb, input.sphere, o)
            })
            && self.stage(output, Stage::SpherePlaneExec, |o| {
                check_sphere_plane(input.sphere, input.plane, o)
            });
        let sweep_end = self.now();
        output.stats.record_span(Stage::Counters, sweep_start, sweep_end);
        output.stats.backfill_skipped();
        Ok(())
    }
}

fn check_aabb(s: &mut [crate::colliders::AabbCollider], out: &mut Output) -> bool {
    for i in 0..s.len() {
        for j in i + 1..s.len() {
            let (c0, c1) = (&s[i], &s[j]);
            if !radius_check(c0.center, c0.radius, c1.center, c1.radius) {
                continue;
            }
            let Some(v) = aabb_overlap(c0.bl, c0.tr, c1.bl, c1.tr) else {
                continue;
            };
            let (c0, c1) = pair_mut(s, i, j);
            if !add_collision(c0, c1, v, out) {
                return false;
            }
        }
    }
    true
}

fn check_bb(s: &mut [crate::colliders::BbCollider], out: &mut Output) -> bool {
    for i in 0..s.len() {
        for j in i + 1..s.len() {
            let (c0, c1) = (&s[i], &s[j]);
            if !radius_check(c0.center, c0.radius, c1.center, c1.radius) {
                continue;
            }
            let b0 = Obb {
                center: c0.center,
                bl: c0.bl,
                tr: c0.tr,
                cos: c0.cos,
                sin: c0.sin,
            };
            let b1 = Obb {
                center: c1.center,
                bl: c1.bl,
                tr: c1.tr,
                cos: c1.cos,
                sin: c1.sin,
            };
            let Some(v) = obb_overlap(&b0, &b1) else {
                continue;
            };
            let (c0, c1) = pair_mut(s, i, j);
            if !add_collision(c0, c1, v, out) {
                return false;
            }
        }
    }
    true
}

// Sphere-sphere tests in batches of SPHERE_LANES upper-triangle candidates,
// with a scalar tail. The lane math is laid out so the compiler can keep it
// in vector registers.
fn check_sphere(s: &mut [SphereCollider], out: &mut Output) -> bool {
    let n = s.len();
    for i in 0..n {
        let mut j = i + 1;
        while j + SPHERE_LANES <= n {
            let mut dx = [0.0f32; SPHERE_LANES];
            let mut dy = [0.0f32; SPHERE_LANES];
            let mut d2 = [0.0f32; SPHERE_LANES];
            let mut sum = [0.0f32; SPHERE_LANES];
            for l in 0..SPHERE_LANES {
                let c1 = &s[j + l];
                dx[l] = s[i].pos.x - c1.pos.x;
                dy[l] = s[i].pos.y - c1.pos.y;
                d2[l] = dx[l] * dx[l] + dy[l] * dy[l];
                sum[l] = s[i].radius + c1.radius;
            }
            for l in 0..SPHERE_LANES {
                if d2[l] >= sum[l] * sum[l] || d2[l] == 0.0 {
                    continue;
                }
                let dist = d2[l].sqrt();
                let f = (sum[l] - dist) / dist;
                let v = Vec3::new(dx[l] * f, dy[l] * f, 0.0);
                let (c0, c1) = pair_mut(s, i, j + l);
                if !add_collision(c0, c1, v, out) {
                    return false;
                }
            }
            j += SPHERE_LANES;
        }
        while j < n {
            let (c0, c1) = (&s[i], &s[j]);
            if let Some(v) = sphere_overlap(c0.pos, c0.radius, c1.pos, c1.radius) {
                let (c0, c1) = pair_mut(s, i, j);
                if !add_collision(c0, c1, v, out) {
                    return false;
                }
            }
            j += 1;
        }
    }
    true
}

// Plane-plane collision was never implemented upstream; the pairs are
// ignored rather than guessed at.
fn check_plane(_s: &mut [crate::colliders::PlaneCollider]) -> bool {
    true
}

// Gravity pass: every non-gravity collider against every well, plus the
// wells among themselves (upper triangle). Emitted as pseudo-collisions so
// resolution applies them uniformly.
fn check_gravity(input: &mut Input, out: &mut Output) -> bool {
    fn bodies_vs_wells(
        bodies: &mut [impl ColliderBody],
        wells: &mut [GravityCollider],
        out: &mut Output,
    ) -> bool {
        for c in bodies.iter_mut() {
            for w in wells.iter_mut() {
                let Some(f) =
                    gravity_force(GravityCollider::G, c.pos(), c.mass(), w.pos, w.mass, w.max_distance2)
                else {
                    continue;
                };
                if !add_collision(c, w, f, out) {
                    return false;
                }
            }
        }
        true
    }

    if !bodies_vs_wells(input.aabb, input.gravity, out)
        || !bodies_vs_wells(input.bb, input.gravity, out)
        || !bodies_vs_wells(input.sphere, input.gravity, out)
        || !bodies_vs_wells(input.plane, input.gravity, out)
    {
        return false;
    }
    let wells = &mut *input.gravity;
    for i in 0..wells.len() {
        for j in i + 1..wells.len() {
            let (w0, w1) = (&wells[i], &wells[j]);
            let Some(f) = gravity_force(
                GravityCollider::G,
                w0.pos,
                w0.mass,
                w1.pos,
                w1.mass,
                w1.max_distance2,
            ) else {
                continue;
            };
            let (w0, w1) = pair_mut(wells, i, j);
            if !add_collision(w0, w1, f, out) {
                return false;
            }
        }
    }
    true
}

fn check_aabb_bb(
    aabb: &mut [crate::colliders::AabbCollider],
    bb: &mut [crate::colliders::BbCollider],
    out: &mut Output,
) -> bool {
    for c0 in aabb.iter_mut() {
        for c1 in bb.iter_mut() {
            if !radius_check(c0.center, c0.radius, c1.center, c1.radius) {
                continue;
            }
            let b0 = Obb::axis_aligned(c0.center, c0.bl, c0.tr);
            let b1 = Obb {
                center: c1.center,
                bl: c1.bl,
                tr: c1.tr,
                cos: c1.cos,
                sin: c1.sin,
            };
            let Some(v) = obb_overlap(&b0, &b1) else {
                continue;
            };
            if !add_collision(c0, c1, v, out) {
                return false;
            }
        }
    }
    true
}

fn check_aabb_sphere(
    aabb: &mut [crate::colliders::AabbCollider],
    sphere: &mut [SphereCollider],
    out: &mut Output,
) -> bool {
    for c0 in aabb.iter_mut() {
        for c1 in sphere.iter_mut() {
            if !radius_check(c0.center, c0.radius, c1.pos.xy(), c1.radius) {
                continue;
            }
            let Some(v) = box_sphere_overlap(c0.bl, c0.tr, c1.pos.xy(), c1.radius) else {
                continue;
            };
            if !add_collision(c0, c1, v, out) {
                return false;
            }
        }
    }
    true
}

fn check_bb_sphere(
    bb: &mut [crate::colliders::BbCollider],
    sphere: &mut [SphereCollider],
    out: &mut Output,
) -> bool {
    for c0 in bb.iter_mut() {
        for c1 in sphere.iter_mut() {
            if !radius_check(c0.center, c0.radius, c1.pos.xy(), c1.radius) {
                continue;
            }
            let b0 = Obb {
                center: c0.center,
                bl: c0.bl,
                tr: c0.tr,
                cos: c0.cos,
                sin: c0.sin,
            };
            let Some(v) = obb_sphere_overlap(&b0, c1.pos.xy(), c1.radius) else {
                continue;
            };
            if !add_collision(c0, c1, v, out) {
                return false;
            }
        }
    }
    true
}

fn check_sphere_plane(
    sphere: &mut [SphereCollider],
    plane: &mut [crate::colliders::PlaneCollider],
    out: &mut Output,
) -> bool {
    for c0 in sphere.iter_mut() {
        for c1 in plane.iter_mut() {
            let Some(v) = sphere_plane_overlap(c0.pos, c0.radius, c1.abcd) else {
                continue;
            };
            if !add_collision(c0, c1, v, out) {
                return false;
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use approx::assert_relative_eq;

    use crate::backend::Collision;
    use crate::colliders::{
        self, AabbCollider, BbCollider, ColliderFlags, GravityCollider, PlaneCollider,
        SphereCollider,
    };
    use crate::foundation::math::{Vec2, Vec4};

    use super::*;

    #[derive(Default)]
    struct Scene {
        aabb: Vec<AabbCollider>,
        bb: Vec<BbCollider>,
        sphere: Vec<SphereCollider>,
        plane: Vec<PlaneCollider>,
        gravity: Vec<GravityCollider>,
    }

    impl Scene {
        fn check(&mut self, max_collisions: usize) -> Output {
            colliders::update_aabbs(&mut self.aabb);
            colliders::update_bbs(&mut self.bb);
            colliders::update_spheres(&mut self.sphere);
            colliders::update_planes(&mut self.plane);
            colliders::update_gravity(&mut self.gravity);
            let mut output = Output::new();
            output.set_max_collisions(max_collisions);
            let mut input = Input {
                aabb: &mut self.aabb,
                bb: &mut self.bb,
                sphere: &mut self.sphere,
                plane: &mut self.plane,
                gravity: &mut self.gravity,
            };
            NativeBackend::new()
                .check(&Timing::new(Duration::ZERO), &mut input, &mut output)
                .unwrap();
            output
        }
    }

    fn aabb_at(x: f32, y: f32) -> AabbCollider {
        let mut c = AabbCollider::new(Vec2::new(-1.0, -1.0), Vec2::new(1.0, 1.0));
        c.pos = Vec3::new(x, y, 0.0);
        c.mass = 1.0;
        c
    }

    fn sphere_at(x: f32, y: f32, r: f32) -> SphereCollider {
        let mut c = SphereCollider::new(Vec3::new(x, y, 0.0), r);
        c.mass = 1.0;
        c
    }

    fn single(output: &Output) -> Collision {
        assert_eq!(output.collisions.len(), 1);
        output.collisions[0]
    }

    #[test]
    fn aabb_overlapping_pair() {
        let mut scene = Scene {
            aabb: vec![aabb_at(0.0, 0.0), aabb_at(1.5, 0.0)],
            ..Scene::default()
        };
        let out = scene.check(16);
        let c = single(&out);
        assert_relative_eq!(c.normal.x, -1.0, epsilon = 1e-6);
        assert_relative_eq!(c.length, 0.5, epsilon = 1e-6);
        assert!(scene.aabb[0].flags.contains(ColliderFlags::COLLIDING));
        assert!(scene.aabb[1].flags.contains(ColliderFlags::COLLIDING));
    }

    #[test]
    fn aabb_separated_pair() {
        let mut scene = Scene {
            aabb: vec![aabb_at(0.0, 0.0), aabb_at(3.0, 0.0)],
            ..Scene::default()
        };
        let out = scene.check(16);
        assert!(out.collisions.is_empty());
        assert!(!scene.aabb[0].flags.contains(ColliderFlags::COLLIDING));
    }

    #[test]
    fn bb_rotated_pair() {
        // Two 1x2 boxes rotated a quarter turn act as 2x1 boxes overlapping
        // by 0.5 on x.
        let rel_bl = Vec2::new(-0.5, -1.0);
        let rel_tr = Vec2::new(0.5, 1.0);
        let mut b0 = BbCollider::with_rotation(rel_bl, rel_tr, std::f32::consts::FRAC_PI_2);
        b0.pos = Vec3::new(1.0, 0.5, 0.0);
        b0.mass = 1.0;
        let mut b1 = BbCollider::with_rotation(rel_bl, rel_tr, std::f32::consts::FRAC_PI_2);
        b1.pos = Vec3::new(-0.5, 0.5, 0.0);
        b1.mass = 1.0;
        let mut scene = Scene {
            bb: vec![b0, b1],
            ..Scene::default()
        };
        let c = single(&scene.check(16));
        assert_relative_eq!(c.normal.x, 1.0, epsilon = 1e-5);
        assert_relative_eq!(c.normal.y, 0.0, epsilon = 1e-5);
        assert_relative_eq!(c.length, 0.5, epsilon = 1e-5);
    }

    #[test]
    fn sphere_batch_finds_single_pair() {
        // Six spheres exercise both the batched lanes and the scalar tail.
        let mut scene = Scene {
            sphere: vec![
                sphere_at(0.0, 0.0, 0.5),
                sphere_at(0.5, 0.0, 0.5),
                sphere_at(10.0, 0.0, 0.5),
                sphere_at(20.0, 0.0, 0.5),
                sphere_at(30.0, 0.0, 0.5),
                sphere_at(40.0, 0.0, 0.5),
            ],
            ..Scene::default()
        };
        let c = single(&scene.check(16));
        assert_relative_eq!(c.normal.x, -1.0, epsilon = 1e-6);
        assert_relative_eq!(c.length, 0.5, epsilon = 1e-6);
    }

    #[test]
    fn sphere_plane_contact() {
        let mut plane = PlaneCollider::new(Vec3::zeros(), Vec4::new(0.0, 1.0, 0.0, 0.0));
        plane.mass = f32::INFINITY;
        let mut scene = Scene {
            sphere: vec![sphere_at(0.0, 0.25, 0.5)],
            plane: vec![plane],
            ..Scene::default()
        };
        let c = single(&scene.check(16));
        assert_relative_eq!(c.normal.y, 1.0, epsilon = 1e-6);
        assert_relative_eq!(c.length, 0.25, epsilon = 1e-6);
    }

    #[test]
    fn gravity_pulls_sphere_toward_well() {
        let mut scene = Scene {
            sphere: vec![sphere_at(2.0, 1.0, 0.1)],
            gravity: vec![GravityCollider::new(Vec3::new(1.0, 1.0, 0.0), 1.0, 1.0)],
            ..Scene::default()
        };
        let c = single(&scene.check(16));
        assert_relative_eq!(c.normal.x, -1.0, epsilon = 1e-6);
        assert_relative_eq!(c.length, GravityCollider::G, epsilon = 1e-15);
    }

    #[test]
    fn gravity_wells_attract_each_other() {
        let mut scene = Scene {
            gravity: vec![
                GravityCollider::new(Vec3::zeros(), 1.0e3, 1.0),
                GravityCollider::new(Vec3::new(0.5, 0.0, 0.0), 1.0e3, 1.0),
            ],
            ..Scene::default()
        };
        let c = single(&scene.check(16));
        assert_relative_eq!(c.normal.x, 1.0, epsilon = 1e-6);
        assert_relative_eq!(c.length, GravityCollider::G * 1.0e6 / 0.25, epsilon = 1e-9);
    }

    #[test]
    fn aabb_sphere_contact() {
        let mut scene = Scene {
            aabb: vec![aabb_at(0.0, 0.0)],
            sphere: vec![sphere_at(1.5, 0.0, 0.75)],
            ..Scene::default()
        };
        let c = single(&scene.check(16));
        assert_relative_eq!(c.normal.x, -1.0, epsilon = 1e-6);
        assert_relative_eq!(c.length, 0.25, epsilon = 1e-6);
    }

    #[test]
    fn infinite_mass_pair_sets_flags_without_record() {
        let mut a = aabb_at(0.0, 0.0);
        a.mass = f32::INFINITY;
        let mut b = aabb_at(1.5, 0.0);
        b.mass = f32::INFINITY;
        let mut scene = Scene {
            aabb: vec![a, b],
            ..Scene::default()
        };
        let out = scene.check(16);
        assert!(out.collisions.is_empty());
        assert!(scene.aabb[0].flags.contains(ColliderFlags::COLLIDING));
        assert!(scene.aabb[1].flags.contains(ColliderFlags::COLLIDING));
    }

    #[test]
    fn output_capacity_bounds_the_sweep() {
        // Four mutually overlapping spheres produce six candidate pairs.
        let mut scene = Scene {
            sphere: vec![
                sphere_at(0.0, 0.0, 1.0),
                sphere_at(0.1, 0.0, 1.0),
                sphere_at(0.0, 0.1, 1.0),
                sphere_at(0.1, 0.1, 1.0),
            ],
            ..Scene::default()
        };
        let out = scene.check(3);
        assert_eq!(out.collisions.len(), 3);
    }

    #[test]
    fn repeated_checks_are_idempotent() {
        let mut scene = Scene {
            aabb: vec![aabb_at(0.0, 0.0), aabb_at(1.5, 0.0)],
            sphere: vec![sphere_at(0.0, 3.0, 0.5), sphere_at(0.5, 3.0, 0.5)],
            ..Scene::default()
        };
        let first = scene.check(16).collisions.len();
        let second = scene.check(16).collisions.len();
        assert_eq!(first, 2);
        assert_eq!(first, second);
    }

    #[test]
    fn stats_cover_every_stage() {
        let mut scene = Scene {
            aabb: vec![aabb_at(0.0, 0.0), aabb_at(1.5, 0.0)],
            ..Scene::default()
        };
        let out = scene.check(16);
        let sweep = out.stats.get(Stage::Counters);
        assert!(sweep[3] >= sweep[0]);
        // Device-only copy stages are back-filled, never zero.
        for stage in Stage::ALL {
            assert_ne!(out.stats.get(stage), [0; 4], "{}", stage.name());
        }
    }
}
