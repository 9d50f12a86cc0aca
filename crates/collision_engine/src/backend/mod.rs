//! Collision backend interface and data model
//!
//! A [`Backend`] receives borrowed views of the registry's typed collider
//! arrays ([`Input`]) once per tick and fills an [`Output`] with the
//! collisions it found plus per-stage timing stats. Two implementations are
//! provided: [`native::NativeBackend`] runs the pairwise tests on the host,
//! [`compute::ComputeBackend`] offloads them to a device-compute runtime.
//!
//! Backends must not retain pointers into the input past a `check` call; the
//! views are only valid for its duration.

pub mod compute;
pub mod layout;
pub mod native;
pub mod primitives;
pub mod stats;

use log::warn;
use thiserror::Error;

use crate::colliders::{
    AabbCollider, BbCollider, ColliderBody, ColliderFlags, GravityCollider, PlaneCollider,
    SphereCollider,
};
use crate::compute::ComputeError;
use crate::entity::EntityKey;
use crate::foundation::math::Vec3;
use crate::foundation::time::Timing;

pub use stats::{CollisionStats, Stage};

/// A collision found between two colliders, at most one per ordered pair per
/// tick. The contact force is `normal * length`.
#[derive(Debug, Clone, Copy)]
pub struct Collision {
    /// Owner of the first collider
    pub entity0: EntityKey,
    /// Owner of the second collider
    pub entity1: EntityKey,
    /// Mass of the first collider at detection time
    pub mass0: f32,
    /// Mass of the second collider at detection time
    pub mass1: f32,
    /// Flags of the first collider at detection time
    pub flags0: ColliderFlags,
    /// Flags of the second collider at detection time
    pub flags1: ColliderFlags,
    /// Unit contact normal, pointing from the second collider toward the first
    pub normal: Vec3,
    /// Separation length along the normal
    pub length: f32,
}

impl Collision {
    /// The contact force / minimum translation vector
    pub fn force(&self) -> Vec3 {
        self.normal * self.length
    }
}

/// Borrowed views of the registry's typed collider arrays for one check.
///
/// Mutable because backends set the `COLLIDING` flag on overlapping
/// colliders.
pub struct Input<'a> {
    /// Axis-aligned box colliders
    pub aabb: &'a mut [AabbCollider],
    /// Oriented box colliders
    pub bb: &'a mut [BbCollider],
    /// Sphere colliders
    pub sphere: &'a mut [SphereCollider],
    /// Plane colliders
    pub plane: &'a mut [PlaneCollider],
    /// Gravity wells
    pub gravity: &'a mut [GravityCollider],
}

/// Collision output buffer, owned by the registry and refilled every tick.
#[derive(Debug, Default)]
pub struct Output {
    /// Per-stage timing stats for the last check
    pub stats: CollisionStats,
    /// Collisions found by the last check
    pub collisions: Vec<Collision>,
    max_collisions: usize,
}

impl Output {
    /// Create an empty output buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// The capacity bound on `collisions`.
    ///
    /// Held explicitly: `Vec` may over-allocate, so its capacity cannot serve
    /// as the bound.
    pub fn max_collisions(&self) -> usize {
        self.max_collisions
    }

    /// Resize the output buffer; existing records beyond the new bound are
    /// dropped.
    pub fn set_max_collisions(&mut self, n: usize) {
        self.max_collisions = n;
        self.collisions.truncate(n);
        let len = self.collisions.len();
        self.collisions.reserve(n - len);
    }

    /// Whether the output buffer is full
    pub fn is_full(&self) -> bool {
        self.collisions.len() >= self.max_collisions
    }

    /// Invalidate the previous tick's collisions
    pub fn clear_collisions(&mut self) {
        self.collisions.clear();
    }
}

// Shared terminal step of every successful narrow-phase test. Sets
// `COLLIDING` on both sides, suppresses the record (but not the flags) when
// both masses are infinite, and returns false when the output is full so the
// caller can abandon the sweep.
pub(crate) fn add_collision(
    c0: &mut impl ColliderBody,
    c1: &mut impl ColliderBody,
    v: Vec3,
    out: &mut Output,
) -> bool {
    c0.flags_mut().insert(ColliderFlags::COLLIDING);
    c1.flags_mut().insert(ColliderFlags::COLLIDING);
    if c0.mass().is_infinite() && c1.mass().is_infinite() {
        return true;
    }
    if out.is_full() {
        warn!("too many collisions");
        return false;
    }
    let length = v.magnitude();
    if length == 0.0 {
        return true;
    }
    out.collisions.push(Collision {
        entity0: c0.entity(),
        entity1: c1.entity(),
        mass0: c0.mass(),
        mass1: c1.mass(),
        flags0: c0.flags(),
        flags1: c1.flags(),
        normal: v / length,
        length,
    });
    true
}

// Two distinct mutable references into one slice, i < j.
pub(crate) fn pair_mut<T>(s: &mut [T], i: usize, j: usize) -> (&mut T, &mut T) {
    debug_assert!(i < j);
    let (head, tail) = s.split_at_mut(j);
    (&mut head[i], &mut tail[0])
}

/// Errors surfaced by backend operations.
///
/// A failed operation aborts the current sweep or capacity change; it never
/// panics. Capacity exhaustion of the collision output is not an error, only
/// a logged warning.
#[derive(Debug, Error)]
pub enum BackendError {
    /// A device-compute operation failed
    #[error("device error: {0}")]
    Compute(#[from] ComputeError),
    /// `check` was called before device buffers were allocated
    #[error("backend buffers not allocated (set_max_colliders/set_max_collisions not called)")]
    NotReady,
}

/// Capability contract implemented by collision backends
pub trait Backend {
    /// One-time initialization (e.g. device program compilation)
    fn init(&mut self) -> Result<(), BackendError> {
        Ok(())
    }

    /// (Re)allocate per-collider storage; previous device contents are
    /// discarded
    fn set_max_colliders(&mut self, _n: usize) -> Result<(), BackendError> {
        Ok(())
    }

    /// (Re)allocate per-collision storage; previous device contents are
    /// discarded
    fn set_max_collisions(&mut self, _n: usize) -> Result<(), BackendError> {
        Ok(())
    }

    /// Run one full collision sweep over the input, appending to
    /// `output.collisions` and filling `output.stats`
    fn check(
        &mut self,
        timing: &Timing,
        input: &mut Input,
        output: &mut Output,
    ) -> Result<(), BackendError>;
}
