//! Declarative collider descriptions
//!
//! Serde-friendly records for building colliders from RON or TOML data
//! files, mirroring the constructor arguments of the typed colliders. The
//! box extent can be given as a single half-size, a width/height pair, or
//! explicit corners.

use serde::{Deserialize, Serialize};

use crate::foundation::math::{Vec2, Vec3, Vec4};

use super::{
    AabbCollider, BbCollider, ColliderFlags, GravityCollider, PlaneCollider, SphereCollider,
};

/// Box extents, in the collider's local frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BoxExtent {
    /// A square of side `s` centered on the entity
    Size(f32),
    /// A `w x h` box centered on the entity
    Extents([f32; 2]),
    /// Explicit `[bl_x, bl_y, tr_x, tr_y]` corners
    Corners([f32; 4]),
}

impl BoxExtent {
    /// The local bottom-left and top-right corners
    pub fn corners(self) -> (Vec2, Vec2) {
        match self {
            Self::Size(s) => {
                let h = s / 2.0;
                (Vec2::new(-h, -h), Vec2::new(h, h))
            }
            Self::Extents([w, h]) => {
                let (hw, hh) = (w / 2.0, h / 2.0);
                (Vec2::new(-hw, -hh), Vec2::new(hw, hh))
            }
            Self::Corners([blx, bly, trx, try_]) => (Vec2::new(blx, bly), Vec2::new(trx, try_)),
        }
    }
}

fn default_mass() -> f32 {
    1.0
}

/// A declarative collider record
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ColliderDesc {
    /// Axis-aligned box
    Aabb {
        /// Local box extents
        bb: BoxExtent,
        /// Mass, `inf` for immovable
        #[serde(default = "default_mass")]
        m: f32,
        /// Participates in resolution
        #[serde(default)]
        solid: bool,
        /// Reported to the trigger hook
        #[serde(default)]
        trigger: bool,
    },
    /// Oriented box
    Bb {
        /// Local box extents
        bb: BoxExtent,
        /// Rotation about the center, radians
        #[serde(default)]
        rot: f32,
        /// Mass, `inf` for immovable
        #[serde(default = "default_mass")]
        m: f32,
        /// Participates in resolution
        #[serde(default)]
        solid: bool,
        /// Reported to the trigger hook
        #[serde(default)]
        trigger: bool,
    },
    /// Sphere
    Sphere {
        /// Radius
        r: f32,
        /// Mass, `inf` for immovable
        #[serde(default = "default_mass")]
        m: f32,
        /// Participates in resolution
        #[serde(default)]
        solid: bool,
        /// Reported to the trigger hook
        #[serde(default)]
        trigger: bool,
    },
    /// Half-space boundary
    Plane {
        /// Outward normal, normalized at load time
        n: [f32; 3],
        /// Mass, `inf` for immovable
        #[serde(default = "default_mass")]
        m: f32,
        /// Participates in resolution
        #[serde(default)]
        solid: bool,
        /// Reported to the trigger hook
        #[serde(default)]
        trigger: bool,
    },
    /// Gravity well
    Gravity {
        /// Cut-off distance for the force
        max_distance: f32,
        /// Well mass
        #[serde(default = "default_mass")]
        m: f32,
        /// Participates in resolution
        #[serde(default)]
        solid: bool,
        /// Reported to the trigger hook
        #[serde(default)]
        trigger: bool,
    },
}

fn desc_flags(solid: bool, trigger: bool) -> ColliderFlags {
    let mut flags = ColliderFlags::empty();
    flags.set(ColliderFlags::SOLID, solid);
    flags.set(ColliderFlags::TRIGGER, trigger);
    flags
}

impl ColliderDesc {
    /// The collider's mass
    pub fn mass(&self) -> f32 {
        match *self {
            Self::Aabb { m, .. }
            | Self::Bb { m, .. }
            | Self::Sphere { m, .. }
            | Self::Plane { m, .. }
            | Self::Gravity { m, .. } => m,
        }
    }

    /// The flags implied by the record
    pub fn flags(&self) -> ColliderFlags {
        match *self {
            Self::Aabb { solid, trigger, .. }
            | Self::Bb { solid, trigger, .. }
            | Self::Sphere { solid, trigger, .. }
            | Self::Plane { solid, trigger, .. }
            | Self::Gravity { solid, trigger, .. } => desc_flags(solid, trigger),
        }
    }
}

impl From<&ColliderDesc> for Option<AabbCollider> {
    fn from(desc: &ColliderDesc) -> Self {
        let ColliderDesc::Aabb { bb, m, .. } = *desc else {
            return None;
        };
        let (bl, tr) = bb.corners();
        let mut c = AabbCollider::new(bl, tr);
        c.mass = m;
        c.flags = desc.flags();
        Some(c)
    }
}

impl From<&ColliderDesc> for Option<BbCollider> {
    fn from(desc: &ColliderDesc) -> Self {
        let ColliderDesc::Bb { bb, rot, m, .. } = *desc else {
            return None;
        };
        let (bl, tr) = bb.corners();
        let mut c = BbCollider::with_rotation(bl, tr, rot);
        c.mass = m;
        c.flags = desc.flags();
        Some(c)
    }
}

impl From<&ColliderDesc> for Option<SphereCollider> {
    fn from(desc: &ColliderDesc) -> Self {
        let ColliderDesc::Sphere { r, m, .. } = *desc else {
            return None;
        };
        let mut c = SphereCollider::new(Vec3::zeros(), r);
        c.mass = m;
        c.flags = desc.flags();
        Some(c)
    }
}

impl From<&ColliderDesc> for Option<PlaneCollider> {
    fn from(desc: &ColliderDesc) -> Self {
        let ColliderDesc::Plane { n, m, .. } = *desc else {
            return None;
        };
        let normal = Vec3::new(n[0], n[1], n[2]).normalize();
        let mut c = PlaneCollider::new(Vec3::zeros(), Vec4::new(normal.x, normal.y, normal.z, 0.0));
        c.mass = m;
        c.flags = desc.flags();
        Some(c)
    }
}

impl From<&ColliderDesc> for Option<GravityCollider> {
    fn from(desc: &ColliderDesc) -> Self {
        let ColliderDesc::Gravity { max_distance, m, .. } = *desc else {
            return None;
        };
        let mut c = GravityCollider::new(Vec3::zeros(), m, max_distance);
        c.flags = desc.flags();
        Some(c)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extent_forms() {
        let (bl, tr) = BoxExtent::Size(2.0).corners();
        assert_eq!((bl, tr), (Vec2::new(-1.0, -1.0), Vec2::new(1.0, 1.0)));
        let (bl, tr) = BoxExtent::Extents([2.0, 4.0]).corners();
        assert_eq!((bl, tr), (Vec2::new(-1.0, -2.0), Vec2::new(1.0, 2.0)));
        let (bl, tr) = BoxExtent::Corners([0.0, 0.0, 1.0, 2.0]).corners();
        assert_eq!((bl, tr), (Vec2::new(0.0, 0.0), Vec2::new(1.0, 2.0)));
    }

    #[test]
    fn ron_round_trip() {
        let desc: ColliderDesc =
            ron::from_str(r#"{"type": "aabb", "bb": 2.0, "m": inf, "solid": true}"#).unwrap();
        let ColliderDesc::Aabb { m, solid, trigger, .. } = desc else {
            panic!("wrong variant: {desc:?}");
        };
        assert!(m.is_infinite());
        assert!(solid);
        assert!(!trigger);
        let c = Option::<AabbCollider>::from(&desc).unwrap();
        assert!(c.flags.contains(ColliderFlags::SOLID));
        assert_eq!(c.rel_tr - c.rel_bl, Vec2::new(2.0, 2.0));
    }

    #[test]
    fn sphere_desc_defaults() {
        let desc: ColliderDesc =
            ron::from_str(r#"{"type": "sphere", "r": 0.5}"#).unwrap();
        let c = Option::<SphereCollider>::from(&desc).unwrap();
        assert_eq!(c.radius, 0.5);
        assert_eq!(c.mass, 1.0);
        assert!(c.flags.is_empty());
    }
}
