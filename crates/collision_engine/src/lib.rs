//! # Collision Engine
//!
//! A typed collision detection and resolution engine with pluggable
//! backends.
//!
//! ## Features
//!
//! - **Typed registry**: five collider kinds (AABB, oriented box, sphere,
//!   plane, gravity well) in dense per-kind arrays
//! - **Native backend**: pairwise tests on the host with batched sphere
//!   lanes
//! - **Compute backend**: device-offloaded kernels over an asynchronous
//!   event graph, with an in-process host device for platforms without one
//! - **Resolution**: mass-weighted impulse pushes and trigger callbacks
//! - **Profiling**: per-stage timestamps for every sweep
//!
//! ## Quick Start
//!
//! ```rust
//! use collision_engine::prelude::*;
//! use std::time::Duration;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut world = EntityWorld::new();
//!     let mut colliders = Colliders::new();
//!     colliders.set_max_colliders(64)?;
//!     colliders.set_max_collisions(64)?;
//!     colliders.set_backend(Box::new(NativeBackend::new()))?;
//!
//!     let player = world.spawn(Vec3::zeros());
//!     let mut sphere = SphereCollider::new(Vec3::zeros(), 0.5);
//!     sphere.mass = 1.0;
//!     sphere.flags = ColliderFlags::SOLID;
//!     colliders.add_sphere(player, sphere);
//!
//!     colliders.check_collisions(&Timing::new(Duration::from_millis(16)))?;
//!     colliders.resolve_collisions(&mut world);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod backend;
pub mod colliders;
pub mod compute;
pub mod config;
pub mod entity;
pub mod foundation;
pub mod registry;

pub use backend::{
    compute::ComputeBackend, native::NativeBackend, Backend, BackendError, Collision,
    CollisionStats, Input, Output, Stage,
};
pub use colliders::{
    AabbCollider, BbCollider, ColliderBody, ColliderFlags, ColliderHandle, ColliderKind,
    GravityCollider, PlaneCollider, SphereCollider,
};
pub use compute::host::HostDevice;
pub use entity::{EntityKey, EntityStore, EntityWorld};
pub use registry::{CollisionHook, Colliders};

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        backend::{native::NativeBackend, Backend, Collision},
        colliders::{
            desc::ColliderDesc, AabbCollider, BbCollider, ColliderFlags, ColliderHandle,
            GravityCollider, PlaneCollider, SphereCollider,
        },
        compute::host::HostDevice,
        config::{CollisionConfig, Config},
        entity::{EntityKey, EntityStore, EntityWorld},
        foundation::{
            math::{Vec2, Vec3, Vec4},
            time::{Timer, Timing},
        },
        registry::Colliders,
        ComputeBackend,
    };
}
