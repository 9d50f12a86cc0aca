//! Collider registry and per-tick check/resolve cycle
//!
//! [`Colliders`] is the single point of mutation for the five typed collider
//! arrays. It owns the capacity limits, the collision output buffer, and the
//! active [`Backend`], and drives the per-tick cycle: refresh derived
//! fields, dispatch the backend sweep, then resolve the results against an
//! [`EntityStore`].

use std::error::Error;

use log::{error, warn};

use crate::backend::{Backend, BackendError, Collision, CollisionStats, Input, Output};
use crate::colliders::{
    self, AabbCollider, BbCollider, ColliderBody, ColliderFlags, ColliderHandle, ColliderKind,
    GravityCollider, PlaneCollider, SphereCollider,
};
use crate::entity::{EntityKey, EntityStore};
use crate::foundation::math::Vec3;
use crate::foundation::time::Timing;

/// Callback invoked for collisions involving a `TRIGGER` collider
pub type CollisionHook =
    Box<dyn FnMut(EntityKey, EntityKey, Vec3) -> Result<(), Box<dyn Error>>>;

/// Typed collider registry and engine front end
#[derive(Default)]
pub struct Colliders {
    check: bool,
    resolve: bool,
    // capacity changes made before a backend is installed are replayed on
    // installation
    max_colliders_updated: bool,
    max_collisions_updated: bool,
    max_colliders: usize,
    aabb: Vec<AabbCollider>,
    bb: Vec<BbCollider>,
    sphere: Vec<SphereCollider>,
    plane: Vec<PlaneCollider>,
    gravity: Vec<GravityCollider>,
    output: Output,
    backend: Option<Box<dyn Backend>>,
    on_collision: Option<CollisionHook>,
}

impl Colliders {
    /// Create an empty registry with checking and resolution enabled
    pub fn new() -> Self {
        Self {
            check: true,
            resolve: true,
            ..Self::default()
        }
    }

    /// Whether collision checking is enabled
    pub fn check(&self) -> bool {
        self.check
    }

    /// Enable or disable collision checking
    pub fn set_check(&mut self, check: bool) {
        self.check = check;
    }

    /// Whether collision resolution is enabled
    pub fn resolve(&self) -> bool {
        self.resolve
    }

    /// Enable or disable collision resolution
    pub fn set_resolve(&mut self, resolve: bool) {
        self.resolve = resolve;
    }

    /// Capacity of each typed collider array
    pub fn max_colliders(&self) -> usize {
        self.max_colliders
    }

    /// Capacity of the collision output buffer
    pub fn max_collisions(&self) -> usize {
        self.output.max_collisions()
    }

    /// Whether a backend is installed
    pub fn has_backend(&self) -> bool {
        self.backend.is_some()
    }

    /// The axis-aligned box colliders
    pub fn aabb(&self) -> &[AabbCollider] {
        &self.aabb
    }

    /// Mutable view of the axis-aligned box colliders
    pub fn aabb_mut(&mut self) -> &mut [AabbCollider] {
        &mut self.aabb
    }

    /// The oriented box colliders
    pub fn bb(&self) -> &[BbCollider] {
        &self.bb
    }

    /// Mutable view of the oriented box colliders
    pub fn bb_mut(&mut self) -> &mut [BbCollider] {
        &mut self.bb
    }

    /// The sphere colliders
    pub fn sphere(&self) -> &[SphereCollider] {
        &self.sphere
    }

    /// Mutable view of the sphere colliders
    pub fn sphere_mut(&mut self) -> &mut [SphereCollider] {
        &mut self.sphere
    }

    /// The plane colliders
    pub fn plane(&self) -> &[PlaneCollider] {
        &self.plane
    }

    /// Mutable view of the plane colliders
    pub fn plane_mut(&mut self) -> &mut [PlaneCollider] {
        &mut self.plane
    }

    /// The gravity wells
    pub fn gravity(&self) -> &[GravityCollider] {
        &self.gravity
    }

    /// Mutable view of the gravity wells
    pub fn gravity_mut(&mut self) -> &mut [GravityCollider] {
        &mut self.gravity
    }

    /// Collisions found by the last check
    pub fn collisions(&self) -> &[Collision] {
        &self.output.collisions
    }

    /// Timing stats of the last check
    pub fn stats(&self) -> &CollisionStats {
        &self.output.stats
    }

    /// Install the trigger notification hook
    pub fn set_on_collision(&mut self, hook: Option<CollisionHook>) {
        self.on_collision = hook;
    }

    /// Resize the five collider arrays.
    ///
    /// Growing keeps every element; shrinking drops elements past the new
    /// capacity. The change propagates to the backend immediately when one
    /// is installed, otherwise on installation.
    pub fn set_max_colliders(&mut self, n: usize) -> Result<(), BackendError> {
        self.max_colliders = n;
        self.aabb.truncate(n);
        self.aabb.reserve(n - self.aabb.len());
        self.bb.truncate(n);
        self.bb.reserve(n - self.bb.len());
        self.sphere.truncate(n);
        self.sphere.reserve(n - self.sphere.len());
        self.plane.truncate(n);
        self.plane.reserve(n - self.plane.len());
        self.gravity.truncate(n);
        self.gravity.reserve(n - self.gravity.len());
        self.max_colliders_updated = true;
        if let Some(b) = &mut self.backend {
            b.set_max_colliders(n)?;
            self.max_colliders_updated = false;
        }
        Ok(())
    }

    /// Resize the collision output buffer
    pub fn set_max_collisions(&mut self, n: usize) -> Result<(), BackendError> {
        self.output.set_max_collisions(n);
        self.max_collisions_updated = true;
        if let Some(b) = &mut self.backend {
            b.set_max_collisions(n)?;
            self.max_collisions_updated = false;
        }
        Ok(())
    }

    /// Install a backend, running its `init` and propagating the current
    /// capacities.
    ///
    /// Fails closed: on any error no backend is installed.
    pub fn set_backend(&mut self, mut backend: Box<dyn Backend>) -> Result<(), BackendError> {
        self.backend = None;
        backend.init()?;
        backend.set_max_colliders(self.max_colliders)?;
        backend.set_max_collisions(self.output.max_collisions())?;
        self.max_colliders_updated = false;
        self.max_collisions_updated = false;
        self.backend = Some(backend);
        Ok(())
    }

    fn at_capacity(&self, kind: ColliderKind, len: usize) -> bool {
        if len < self.max_colliders {
            return false;
        }
        warn!("cannot add more {kind:?} colliders (max: {})", self.max_colliders);
        true
    }

    /// Add an axis-aligned box collider owned by `entity`
    pub fn add_aabb(&mut self, entity: EntityKey, mut c: AabbCollider) -> Option<ColliderHandle> {
        if self.at_capacity(ColliderKind::Aabb, self.aabb.len()) {
            return None;
        }
        c.entity = entity;
        self.aabb.push(c);
        Some(ColliderHandle {
            kind: ColliderKind::Aabb,
            index: self.aabb.len() - 1,
        })
    }

    /// Add an oriented box collider owned by `entity`
    pub fn add_bb(&mut self, entity: EntityKey, mut c: BbCollider) -> Option<ColliderHandle> {
        if self.at_capacity(ColliderKind::Bb, self.bb.len()) {
            return None;
        }
        c.entity = entity;
        self.bb.push(c);
        Some(ColliderHandle {
            kind: ColliderKind::Bb,
            index: self.bb.len() - 1,
        })
    }

    /// Add a sphere collider owned by `entity`
    pub fn add_sphere(
        &mut self,
        entity: EntityKey,
        mut c: SphereCollider,
    ) -> Option<ColliderHandle> {
        if self.at_capacity(ColliderKind::Sphere, self.sphere.len()) {
            return None;
        }
        c.entity = entity;
        self.sphere.push(c);
        Some(ColliderHandle {
            kind: ColliderKind::Sphere,
            index: self.sphere.len() - 1,
        })
    }

    /// Add a plane collider owned by `entity`
    pub fn add_plane(&mut self, entity: EntityKey, mut c: PlaneCollider) -> Option<ColliderHandle> {
        if self.at_capacity(ColliderKind::Plane, self.plane.len()) {
            return None;
        }
        c.entity = entity;
        self.plane.push(c);
        Some(ColliderHandle {
            kind: ColliderKind::Plane,
            index: self.plane.len() - 1,
        })
    }

    /// Add a gravity well owned by `entity`
    pub fn add_gravity(
        &mut self,
        entity: EntityKey,
        mut c: GravityCollider,
    ) -> Option<ColliderHandle> {
        if self.at_capacity(ColliderKind::Gravity, self.gravity.len()) {
            return None;
        }
        c.entity = entity;
        self.gravity.push(c);
        Some(ColliderHandle {
            kind: ColliderKind::Gravity,
            index: self.gravity.len() - 1,
        })
    }

    /// Remove a collider by handle.
    ///
    /// Swap-removal: the last element of the array moves into the vacated
    /// slot and its owner's back-reference is repaired through `entities`.
    pub fn remove(&mut self, entities: &mut dyn EntityStore, handle: ColliderHandle) {
        fn swap_remove<T: ColliderBody>(
            v: &mut Vec<T>,
            entities: &mut dyn EntityStore,
            handle: ColliderHandle,
        ) {
            debug_assert!(handle.index < v.len());
            if handle.index >= v.len() {
                return;
            }
            v.swap_remove(handle.index);
            if let Some(moved) = v.get(handle.index) {
                entities.set_collider(moved.entity(), Some(handle));
            }
        }
        match handle.kind {
            ColliderKind::Aabb => swap_remove(&mut self.aabb, entities, handle),
            ColliderKind::Bb => swap_remove(&mut self.bb, entities, handle),
            ColliderKind::Sphere => swap_remove(&mut self.sphere, entities, handle),
            ColliderKind::Plane => swap_remove(&mut self.plane, entities, handle),
            ColliderKind::Gravity => swap_remove(&mut self.gravity, entities, handle),
        }
    }

    /// Remove every collider and the previous tick's collisions
    pub fn clear(&mut self) {
        self.aabb.clear();
        self.bb.clear();
        self.sphere.clear();
        self.plane.clear();
        self.gravity.clear();
        self.output.clear_collisions();
    }

    /// Run one collision check.
    ///
    /// Always refreshes derived collider fields and invalidates the previous
    /// tick's collisions; the backend sweep itself is skipped when checking
    /// is disabled or no backend is installed.
    pub fn check_collisions(&mut self, timing: &Timing) -> Result<(), BackendError> {
        colliders::update_aabbs(&mut self.aabb);
        colliders::update_bbs(&mut self.bb);
        colliders::update_spheres(&mut self.sphere);
        colliders::update_planes(&mut self.plane);
        colliders::update_gravity(&mut self.gravity);
        self.output.clear_collisions();
        if !self.check {
            return Ok(());
        }
        let Some(backend) = &mut self.backend else {
            return Ok(());
        };
        if self.max_colliders_updated {
            backend.set_max_colliders(self.max_colliders)?;
            self.max_colliders_updated = false;
        }
        if self.max_collisions_updated {
            backend.set_max_collisions(self.output.max_collisions())?;
            self.max_collisions_updated = false;
        }
        let mut input = Input {
            aabb: &mut self.aabb,
            bb: &mut self.bb,
            sphere: &mut self.sphere,
            plane: &mut self.plane,
            gravity: &mut self.gravity,
        };
        backend.check(timing, &mut input, &mut self.output)
    }

    /// Apply the last check's collisions to the entities.
    ///
    /// Solid pairs are pushed apart along the contact normal by
    /// mass-weighted shares; collisions involving a `TRIGGER` collider are
    /// then reported through the hook. Hook failures are logged and do not
    /// abort the remaining notifications.
    pub fn resolve_collisions(&mut self, entities: &mut dyn EntityStore) {
        if !self.resolve || self.output.collisions.is_empty() {
            return;
        }
        let solid = ColliderFlags::SOLID;
        for c in &self.output.collisions {
            if !(c.flags0.contains(solid) && c.flags1.contains(solid)) {
                continue;
            }
            let (s0, s1) = push_shares(c.mass0, c.mass1);
            let force = c.force();
            if s0 != 0.0 {
                entities.translate(c.entity0, force * s0);
            }
            if s1 != 0.0 {
                entities.translate(c.entity1, -force * s1);
            }
        }
        let Some(hook) = &mut self.on_collision else {
            return;
        };
        let trigger = ColliderFlags::TRIGGER;
        for c in &self.output.collisions {
            if !(c.flags0 | c.flags1).contains(trigger) {
                continue;
            }
            if let Err(e) = hook(c.entity0, c.entity1, c.force()) {
                error!("collision hook failed: {e}");
            }
        }
    }
}

// Mass-weighted push shares for a solid pair. An infinite mass on one side
// pins it and gives the other side the whole push; both infinite never
// reaches here (no record is emitted for those pairs).
fn push_shares(m0: f32, m1: f32) -> (f32, f32) {
    let total = m0 + m1;
    if total == 0.0 {
        return (0.0, 0.0);
    }
    let s0 = if m1.is_infinite() { 1.0 } else { m1 / total };
    let s1 = if m0.is_infinite() { 1.0 } else { m0 / total };
    (s0, s1)
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::time::Duration;

    use approx::assert_relative_eq;

    use crate::backend::native::NativeBackend;
    use crate::entity::EntityWorld;
    use crate::foundation::math::Vec2;

    use super::*;

    fn registry(max_colliders: usize, max_collisions: usize) -> Colliders {
        let mut c = Colliders::new();
        c.set_max_colliders(max_colliders).unwrap();
        c.set_max_collisions(max_collisions).unwrap();
        c.set_backend(Box::new(NativeBackend::new())).unwrap();
        c
    }

    fn solid_aabb(x: f32, mass: f32) -> AabbCollider {
        let mut c = AabbCollider::new(Vec2::new(-1.0, -1.0), Vec2::new(1.0, 1.0));
        c.pos = Vec3::new(x, 0.0, 0.0);
        c.mass = mass;
        c.flags = ColliderFlags::SOLID;
        c
    }

    #[test]
    fn add_rejects_over_capacity() {
        let mut world = EntityWorld::new();
        let mut reg = registry(1, 4);
        let e = world.spawn(Vec3::zeros());
        assert!(reg.add_aabb(e, AabbCollider::default()).is_some());
        assert!(reg.add_aabb(e, AabbCollider::default()).is_none());
        // other arrays have their own capacity
        assert!(reg.add_sphere(e, SphereCollider::default()).is_some());
    }

    #[test]
    fn remove_repairs_moved_back_reference() {
        let mut world = EntityWorld::new();
        let mut reg = registry(4, 4);
        let e0 = world.spawn(Vec3::zeros());
        let e1 = world.spawn(Vec3::zeros());
        let h0 = reg.add_aabb(e0, AabbCollider::default()).unwrap();
        let h1 = reg.add_aabb(e1, AabbCollider::default()).unwrap();
        world.set_collider(e0, Some(h0));
        world.set_collider(e1, Some(h1));
        reg.remove(&mut world, h0);
        // e1's collider moved into slot 0 and its back-reference follows
        assert_eq!(reg.aabb().len(), 1);
        assert_eq!(reg.aabb()[0].entity, e1);
        assert_eq!(world.collider(e1), Some(h0));
    }

    #[test]
    fn check_without_backend_is_a_no_op() {
        let mut reg = Colliders::new();
        reg.set_max_colliders(4).unwrap();
        reg.set_max_collisions(4).unwrap();
        let e = EntityWorld::new().spawn(Vec3::zeros());
        reg.add_aabb(e, solid_aabb(0.0, 1.0));
        reg.add_aabb(e, solid_aabb(1.5, 1.0));
        reg.check_collisions(&Timing::new(Duration::ZERO)).unwrap();
        assert!(reg.collisions().is_empty());
    }

    #[test]
    fn solid_pair_is_pushed_apart_by_mass_share() {
        let mut world = EntityWorld::new();
        let mut reg = registry(4, 4);
        let e0 = world.spawn(Vec3::zeros());
        let e1 = world.spawn(Vec3::new(1.5, 0.0, 0.0));
        reg.add_aabb(e0, solid_aabb(0.0, 1.0));
        reg.add_aabb(e1, solid_aabb(1.5, 3.0));
        reg.check_collisions(&Timing::new(Duration::ZERO)).unwrap();
        assert_eq!(reg.collisions().len(), 1);
        reg.resolve_collisions(&mut world);
        // penetration 0.5 along -x; shares 3/4 and 1/4
        let p0 = world.position(e0).unwrap();
        let p1 = world.position(e1).unwrap();
        assert_relative_eq!(p0.x, -0.375, epsilon = 1e-6);
        assert_relative_eq!(p1.x, 1.5 + 0.125, epsilon = 1e-6);
    }

    #[test]
    fn infinite_mass_side_takes_no_push() {
        let mut world = EntityWorld::new();
        let mut reg = registry(4, 4);
        let e0 = world.spawn(Vec3::zeros());
        let e1 = world.spawn(Vec3::new(1.5, 0.0, 0.0));
        reg.add_aabb(e0, solid_aabb(0.0, 1.0));
        reg.add_aabb(e1, solid_aabb(1.5, f32::INFINITY));
        reg.check_collisions(&Timing::new(Duration::ZERO)).unwrap();
        reg.resolve_collisions(&mut world);
        assert_relative_eq!(world.position(e0).unwrap().x, -0.5, epsilon = 1e-6);
        assert_relative_eq!(world.position(e1).unwrap().x, 1.5, epsilon = 1e-6);
    }

    #[test]
    fn trigger_hook_sees_trigger_collisions() {
        let mut world = EntityWorld::new();
        let mut reg = registry(4, 4);
        let e0 = world.spawn(Vec3::zeros());
        let e1 = world.spawn(Vec3::new(1.5, 0.0, 0.0));
        let mut trigger = solid_aabb(0.0, 1.0);
        trigger.flags = ColliderFlags::TRIGGER;
        reg.add_aabb(e0, trigger);
        reg.add_aabb(e1, solid_aabb(1.5, 1.0));
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        reg.set_on_collision(Some(Box::new(move |a, b, force| {
            sink.borrow_mut().push((a, b, force));
            Ok(())
        })));
        reg.check_collisions(&Timing::new(Duration::ZERO)).unwrap();
        reg.resolve_collisions(&mut world);
        let seen = seen.borrow();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, e0);
        assert_eq!(seen[0].1, e1);
        assert_relative_eq!(seen[0].2.x, -0.5, epsilon = 1e-6);
    }

    #[test]
    fn clear_drops_colliders_and_collisions() {
        let mut world = EntityWorld::new();
        let mut reg = registry(4, 4);
        let e = world.spawn(Vec3::zeros());
        reg.add_aabb(e, solid_aabb(0.0, 1.0));
        reg.add_aabb(e, solid_aabb(1.5, 1.0));
        reg.check_collisions(&Timing::new(Duration::ZERO)).unwrap();
        assert!(!reg.collisions().is_empty());
        reg.clear();
        assert!(reg.aabb().is_empty());
        assert!(reg.collisions().is_empty());
    }

    #[test]
    fn capacity_change_reaches_backend_installed_later() {
        let mut reg = Colliders::new();
        reg.set_max_colliders(8).unwrap();
        reg.set_max_collisions(8).unwrap();
        reg.set_backend(Box::new(NativeBackend::new())).unwrap();
        let mut world = EntityWorld::new();
        let e = world.spawn(Vec3::zeros());
        reg.add_aabb(e, solid_aabb(0.0, 1.0));
        reg.add_aabb(e, solid_aabb(1.5, 1.0));
        reg.check_collisions(&Timing::new(Duration::ZERO)).unwrap();
        assert_eq!(reg.collisions().len(), 1);
    }

    #[test]
    fn disabled_check_keeps_arrays_but_finds_nothing() {
        let mut world = EntityWorld::new();
        let mut reg = registry(4, 4);
        let e = world.spawn(Vec3::zeros());
        reg.add_aabb(e, solid_aabb(0.0, 1.0));
        reg.add_aabb(e, solid_aabb(1.5, 1.0));
        reg.set_check(false);
        reg.check_collisions(&Timing::new(Duration::ZERO)).unwrap();
        assert!(reg.collisions().is_empty());
        assert_eq!(reg.aabb().len(), 2);
    }
}
