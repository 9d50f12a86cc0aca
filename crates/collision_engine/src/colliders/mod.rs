//! Typed collider records
//!
//! Five plain geometric value types managed by the
//! [`Colliders`](crate::registry::Colliders) registry: axis-aligned box,
//! oriented box, sphere, half-space plane, and gravity well. Each record
//! carries a back-reference to its owning entity, a mass (infinite meaning
//! immovable), and a flag set.
//!
//! Boxes store their authoritative extents relative to `pos`
//! (`rel_center`/`rel_bl`/`rel_tr`) and cache the world-space
//! `center`/`bl`/`tr` plus a bounding radius. The cached fields degrade under
//! incremental position mutation, so an update pre-pass
//! ([`update_aabbs`] and friends) recomputes them from the authoritative
//! fields at the start of every check.

pub mod desc;

use bitflags::bitflags;

use crate::entity::EntityKey;
use crate::foundation::math::{Vec2, Vec3, Vec4};

pub use desc::{BoxExtent, ColliderDesc};

bitflags! {
    /// Per-collider behavior flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ColliderFlags: u8 {
        /// Set for the duration of a tick on any collider that overlapped
        /// something, for animation/VFX use. Cleared by the update pre-pass.
        const COLLIDING = 1 << 0;
        /// Overlaps are reported to the external collision hook.
        const TRIGGER = 1 << 1;
        /// Participates in mass-weighted impulse resolution.
        const SOLID = 1 << 2;
    }
}

/// Which typed registry array a collider lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColliderKind {
    /// Axis-aligned box
    Aabb,
    /// Oriented box
    Bb,
    /// Sphere
    Sphere,
    /// Half-space plane
    Plane,
    /// Gravity well
    Gravity,
}

/// Handle to a collider slot in the registry's typed arrays.
///
/// Swap-removal relocates the last element of an array, so a handle is only
/// stable until the next `remove` on the same kind; the registry repairs the
/// relocated element's owning entity when that happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColliderHandle {
    /// The typed array the collider lives in
    pub kind: ColliderKind,
    /// Index into that array
    pub index: usize,
}

/// Access to the fields shared by every collider type
pub trait ColliderBody {
    /// The owning entity
    fn entity(&self) -> EntityKey;
    /// Collider mass (`f32::INFINITY` meaning immovable)
    fn mass(&self) -> f32;
    /// Current flag set
    fn flags(&self) -> ColliderFlags;
    /// Mutable flag set
    fn flags_mut(&mut self) -> &mut ColliderFlags;
    /// World position of the collider origin
    fn pos(&self) -> Vec3;
}

macro_rules! impl_collider_body {
    ($t:ty) => {
        impl ColliderBody for $t {
            fn entity(&self) -> EntityKey {
                self.entity
            }
            fn mass(&self) -> f32 {
                self.mass
            }
            fn flags(&self) -> ColliderFlags {
                self.flags
            }
            fn flags_mut(&mut self) -> &mut ColliderFlags {
                &mut self.flags
            }
            fn pos(&self) -> Vec3 {
                self.pos
            }
        }
    };
}

/// Axis-aligned box collider
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AabbCollider {
    /// Owning entity
    pub entity: EntityKey,
    /// World position of the collider origin
    pub pos: Vec3,
    /// Mass (`f32::INFINITY` meaning immovable)
    pub mass: f32,
    /// Behavior flags
    pub flags: ColliderFlags,
    /// Box center relative to `pos`
    pub rel_center: Vec2,
    /// Bottom-left corner relative to `pos`
    pub rel_bl: Vec2,
    /// Top-right corner relative to `pos`
    pub rel_tr: Vec2,
    /// World-space center (derived each tick)
    pub center: Vec2,
    /// World-space bottom-left corner (derived each tick)
    pub bl: Vec2,
    /// World-space top-right corner (derived each tick)
    pub tr: Vec2,
    /// Bounding radius for the broad-phase pre-check (max half-diagonal)
    pub radius: f32,
}

impl Default for AabbCollider {
    fn default() -> Self {
        Self {
            entity: EntityKey::default(),
            pos: Vec3::zeros(),
            mass: 0.0,
            flags: ColliderFlags::empty(),
            rel_center: Vec2::zeros(),
            rel_bl: Vec2::zeros(),
            rel_tr: Vec2::zeros(),
            center: Vec2::zeros(),
            bl: Vec2::zeros(),
            tr: Vec2::zeros(),
            radius: 0.0,
        }
    }
}

impl AabbCollider {
    /// Create a box spanning `bl..tr` relative to the collider position
    pub fn new(bl: Vec2, tr: Vec2) -> Self {
        let mut c = Self::default();
        c.set_box(bl, tr);
        c
    }

    /// Set the box extents and recompute the cached bounding radius
    pub fn set_box(&mut self, bl: Vec2, tr: Vec2) {
        let hs = (tr - bl) / 2.0;
        self.rel_center = bl + hs;
        self.rel_bl = bl;
        self.rel_tr = tr;
        self.radius = hs.magnitude();
    }
}

impl_collider_body!(AabbCollider);

/// Oriented box collider
///
/// The rotation is stored as a precomputed cosine/sine pair, not an angle;
/// it rotates the box about its center.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BbCollider {
    /// Owning entity
    pub entity: EntityKey,
    /// World position of the collider origin
    pub pos: Vec3,
    /// Mass (`f32::INFINITY` meaning immovable)
    pub mass: f32,
    /// Behavior flags
    pub flags: ColliderFlags,
    /// Box center relative to `pos`
    pub rel_center: Vec2,
    /// Bottom-left corner relative to `pos`, before rotation
    pub rel_bl: Vec2,
    /// Top-right corner relative to `pos`, before rotation
    pub rel_tr: Vec2,
    /// World-space center (derived each tick)
    pub center: Vec2,
    /// World-space bottom-left corner, before rotation (derived each tick)
    pub bl: Vec2,
    /// World-space top-right corner, before rotation (derived each tick)
    pub tr: Vec2,
    /// Bounding radius for the broad-phase pre-check
    pub radius: f32,
    /// Cosine of the rotation about the box center
    pub cos: f32,
    /// Sine of the rotation about the box center
    pub sin: f32,
}

impl Default for BbCollider {
    fn default() -> Self {
        Self {
            entity: EntityKey::default(),
            pos: Vec3::zeros(),
            mass: 0.0,
            flags: ColliderFlags::empty(),
            rel_center: Vec2::zeros(),
            rel_bl: Vec2::zeros(),
            rel_tr: Vec2::zeros(),
            center: Vec2::zeros(),
            bl: Vec2::zeros(),
            tr: Vec2::zeros(),
            radius: 0.0,
            cos: 1.0,
            sin: 0.0,
        }
    }
}

impl BbCollider {
    /// Create an oriented box spanning `bl..tr` with the given rotation
    pub fn new(bl: Vec2, tr: Vec2, cos: f32, sin: f32) -> Self {
        let mut c = Self::default();
        c.set_box(bl, tr);
        c.cos = cos;
        c.sin = sin;
        c
    }

    /// Create an oriented box from a rotation angle in radians
    pub fn with_rotation(bl: Vec2, tr: Vec2, angle: f32) -> Self {
        Self::new(bl, tr, angle.cos(), angle.sin())
    }

    /// Set the box extents and recompute the cached bounding radius
    pub fn set_box(&mut self, bl: Vec2, tr: Vec2) {
        let hs = (tr - bl) / 2.0;
        self.rel_center = bl + hs;
        self.rel_bl = bl;
        self.rel_tr = tr;
        self.radius = hs.magnitude();
    }
}

impl_collider_body!(BbCollider);

/// Sphere collider
///
/// Only x/y participate in the 2D narrow-phase tests; z is carried through
/// for the gravity pass and for callers that track depth.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SphereCollider {
    /// Owning entity
    pub entity: EntityKey,
    /// World position of the sphere center
    pub pos: Vec3,
    /// Mass (`f32::INFINITY` meaning immovable)
    pub mass: f32,
    /// Behavior flags
    pub flags: ColliderFlags,
    /// Sphere radius
    pub radius: f32,
}

impl Default for SphereCollider {
    fn default() -> Self {
        Self {
            entity: EntityKey::default(),
            pos: Vec3::zeros(),
            mass: 0.0,
            flags: ColliderFlags::empty(),
            radius: 0.0,
        }
    }
}

impl SphereCollider {
    /// Create a sphere at the given position
    pub fn new(pos: Vec3, radius: f32) -> Self {
        Self {
            pos,
            radius,
            ..Self::default()
        }
    }
}

impl_collider_body!(SphereCollider);

/// Half-space plane collider: `dot(n, p) + d >= 0` is outside.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaneCollider {
    /// Owning entity
    pub entity: EntityKey,
    /// World position the plane passes through
    pub pos: Vec3,
    /// Mass (`f32::INFINITY` meaning immovable)
    pub mass: f32,
    /// Behavior flags
    pub flags: ColliderFlags,
    /// Implicit plane coefficients; `d` is recomputed from `pos` each tick
    pub abcd: Vec4,
}

impl Default for PlaneCollider {
    fn default() -> Self {
        Self {
            entity: EntityKey::default(),
            pos: Vec3::zeros(),
            mass: 0.0,
            flags: ColliderFlags::empty(),
            abcd: Vec4::zeros(),
        }
    }
}

impl PlaneCollider {
    /// Create a plane through `pos` with the given coefficients
    pub fn new(pos: Vec3, abcd: Vec4) -> Self {
        Self {
            pos,
            abcd,
            ..Self::default()
        }
    }
}

impl_collider_body!(PlaneCollider);

/// Gravity well: an attraction source, not a rigid collider.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GravityCollider {
    /// Owning entity
    pub entity: EntityKey,
    /// World position of the well
    pub pos: Vec3,
    /// Mass of the well
    pub mass: f32,
    /// Behavior flags
    pub flags: ColliderFlags,
    /// Squared cutoff distance beyond which the well exerts no force
    pub max_distance2: f32,
}

impl Default for GravityCollider {
    fn default() -> Self {
        Self {
            entity: EntityKey::default(),
            pos: Vec3::zeros(),
            mass: 0.0,
            flags: ColliderFlags::empty(),
            max_distance2: 0.0,
        }
    }
}

impl GravityCollider {
    /// Gravitational constant
    pub const G: f32 = 6.674e-11;

    /// Create a well at `pos` with the given mass and cutoff distance
    pub fn new(pos: Vec3, mass: f32, max_distance: f32) -> Self {
        Self {
            pos,
            mass,
            max_distance2: max_distance * max_distance,
            ..Self::default()
        }
    }
}

impl_collider_body!(GravityCollider);

fn update_box_fields(
    pos: Vec3,
    rel_center: Vec2,
    rel_bl: Vec2,
    rel_tr: Vec2,
    center: &mut Vec2,
    bl: &mut Vec2,
    tr: &mut Vec2,
) {
    let p = pos.xy();
    *center = p + rel_center;
    *bl = p + rel_bl;
    *tr = p + rel_tr;
}

/// Update pre-pass for AABB colliders: clears `COLLIDING` and recomputes the
/// world-space corners from `pos` and the authoritative relative extents.
pub fn update_aabbs(s: &mut [AabbCollider]) {
    for c in s {
        c.flags.remove(ColliderFlags::COLLIDING);
        update_box_fields(
            c.pos,
            c.rel_center,
            c.rel_bl,
            c.rel_tr,
            &mut c.center,
            &mut c.bl,
            &mut c.tr,
        );
    }
}

/// Update pre-pass for oriented-box colliders.
pub fn update_bbs(s: &mut [BbCollider]) {
    for c in s {
        c.flags.remove(ColliderFlags::COLLIDING);
        update_box_fields(
            c.pos,
            c.rel_center,
            c.rel_bl,
            c.rel_tr,
            &mut c.center,
            &mut c.bl,
            &mut c.tr,
        );
    }
}

/// Update pre-pass for sphere colliders.
pub fn update_spheres(s: &mut [SphereCollider]) {
    for c in s {
        c.flags.remove(ColliderFlags::COLLIDING);
    }
}

/// Update pre-pass for plane colliders: re-derives `d` so the plane passes
/// through `pos` with the stored normal.
pub fn update_planes(s: &mut [PlaneCollider]) {
    for c in s {
        c.flags.remove(ColliderFlags::COLLIDING);
        c.abcd.w = -c.abcd.xyz().dot(&c.pos);
    }
}

/// Update pre-pass for gravity wells.
pub fn update_gravity(s: &mut [GravityCollider]) {
    for c in s {
        c.flags.remove(ColliderFlags::COLLIDING);
    }
}
