//! Binary layout of collider and collision records as seen by the device
//!
//! Every struct the kernels operate on is packed by hand into native-endian
//! bytes, with the offsets pinned by constants and checked in tests. The
//! compute backend stages host colliders through these functions, and the
//! kernel source declares matching packed structs.

use crate::colliders::{AabbCollider, BbCollider, PlaneCollider};
use crate::foundation::math::Vec3;

/// Size in bytes of a device collision record
pub const COLLISION_SIZE: usize = 32;
/// Offset of the first collider index in a collision record
pub const COLLISION_I0: usize = 16;
/// Offset of the second collider index in a collision record
pub const COLLISION_I1: usize = 20;

/// Size in bytes of a device AABB collider
pub const AABB_SIZE: usize = 32;
/// Size in bytes of a device oriented-box collider
pub const BB_SIZE: usize = 40;
/// Offset of the rotation cosine in a device oriented-box collider
pub const BB_COS: usize = 28;
/// Offset of the rotation sine in a device oriented-box collider
pub const BB_SIN: usize = 32;

/// Size in bytes of a device sphere collider
pub const SPHERE_SIZE: usize = 32;
/// Offset of the position in a device sphere collider
pub const SPHERE_POS: usize = 0;
/// Offset of the mass in a device sphere collider
pub const SPHERE_MASS: usize = 16;
/// Offset of the radius in a device sphere collider
pub const SPHERE_RADIUS: usize = 20;

/// Size in bytes of a device plane collider
pub const PLANE_SIZE: usize = 16;

/// Size in bytes of a device gravity collider
pub const GRAVITY_SIZE: usize = 32;
/// Offset of the position in a device gravity collider
pub const GRAVITY_POS: usize = 0;
/// Offset of the mass in a device gravity collider
pub const GRAVITY_MASS: usize = 16;
/// Offset of the squared cut-off distance in a device gravity collider
pub const GRAVITY_MAX_DISTANCE2: usize = 20;

/// Pair-type discriminant, also the counter slot index on the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum PairType {
    /// AABB vs AABB
    Aabb = 0,
    /// Oriented box vs oriented box
    Bb,
    /// Sphere vs sphere
    Sphere,
    /// AABB vs oriented box
    AabbBb,
    /// AABB vs sphere
    AabbSphere,
    /// Oriented box vs sphere
    BbSphere,
    /// Sphere vs plane
    SpherePlane,
    /// Sphere vs gravity well
    SphereGravity,
}

/// Number of pair types, one device counter each
pub const N_PAIR_TYPES: usize = 8;
/// Size in bytes of the device counter buffer
pub const COUNTERS_BYTES: usize = N_PAIR_TYPES * 4;

/// A collision record read back from the device
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviceCollision {
    /// Penetration vector, `w` unused
    pub v: [f32; 4],
    /// Index of the first collider in its input array
    pub i0: u32,
    /// Index of the second collider in its input array
    pub i1: u32,
}

impl DeviceCollision {
    /// Penetration vector as a `Vec3`
    pub fn vec(&self) -> Vec3 {
        Vec3::new(self.v[0], self.v[1], self.v[2])
    }
}

fn put_f32(buf: &mut [u8], off: usize, v: f32) {
    buf[off..off + 4].copy_from_slice(&v.to_ne_bytes());
}

fn get_f32(buf: &[u8], off: usize) -> f32 {
    f32::from_ne_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]])
}

fn get_u32(buf: &[u8], off: usize) -> u32 {
    u32::from_ne_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]])
}

/// Read a single `u32` counter value from a device byte buffer
pub fn read_u32(buf: &[u8], off: usize) -> u32 {
    get_u32(buf, off)
}

/// Read a single `f32` field from a device byte buffer
pub fn read_f32(buf: &[u8], off: usize) -> f32 {
    get_f32(buf, off)
}

/// Pack AABB colliders into device records
pub fn pack_aabbs(colliders: &[AabbCollider]) -> Vec<u8> {
    let mut out = vec![0u8; colliders.len() * AABB_SIZE];
    for (c, rec) in colliders.iter().zip(out.chunks_exact_mut(AABB_SIZE)) {
        put_f32(rec, 0, c.center.x);
        put_f32(rec, 4, c.center.y);
        put_f32(rec, 8, c.bl.x);
        put_f32(rec, 12, c.bl.y);
        put_f32(rec, 16, c.tr.x);
        put_f32(rec, 20, c.tr.y);
        put_f32(rec, 24, c.radius);
    }
    out
}

/// Pack oriented-box colliders into device records
pub fn pack_bbs(colliders: &[BbCollider]) -> Vec<u8> {
    let mut out = vec![0u8; colliders.len() * BB_SIZE];
    for (c, rec) in colliders.iter().zip(out.chunks_exact_mut(BB_SIZE)) {
        put_f32(rec, 0, c.center.x);
        put_f32(rec, 4, c.center.y);
        put_f32(rec, 8, c.bl.x);
        put_f32(rec, 12, c.bl.y);
        put_f32(rec, 16, c.tr.x);
        put_f32(rec, 20, c.tr.y);
        put_f32(rec, 24, c.radius);
        put_f32(rec, BB_COS, c.cos);
        put_f32(rec, BB_SIN, c.sin);
    }
    out
}

/// Pack plane colliders into device records
pub fn pack_planes(colliders: &[PlaneCollider]) -> Vec<u8> {
    let mut out = vec![0u8; colliders.len() * PLANE_SIZE];
    for (c, rec) in colliders.iter().zip(out.chunks_exact_mut(PLANE_SIZE)) {
        put_f32(rec, 0, c.abcd.x);
        put_f32(rec, 4, c.abcd.y);
        put_f32(rec, 8, c.abcd.z);
        put_f32(rec, 12, c.abcd.w);
    }
    out
}

/// Pack a `Vec3` position as a 16-byte `float4` field
pub fn pack_pos4(pos: Vec3) -> [u8; 16] {
    let mut rec = [0u8; 16];
    put_f32(&mut rec, 0, pos.x);
    put_f32(&mut rec, 4, pos.y);
    put_f32(&mut rec, 8, pos.z);
    rec
}

/// Unpack collision records read back from the device
pub fn unpack_collisions(buf: &[u8]) -> impl Iterator<Item = DeviceCollision> + '_ {
    buf.chunks_exact(COLLISION_SIZE).map(|rec| DeviceCollision {
        v: [
            get_f32(rec, 0),
            get_f32(rec, 4),
            get_f32(rec, 8),
            get_f32(rec, 12),
        ],
        i0: get_u32(rec, COLLISION_I0),
        i1: get_u32(rec, COLLISION_I1),
    })
}

/// Pack a collision record, used by host-side device emulation
pub fn pack_collision(buf: &mut [u8], v: Vec3, i0: u32, i1: u32) {
    put_f32(buf, 0, v.x);
    put_f32(buf, 4, v.y);
    put_f32(buf, 8, v.z);
    put_f32(buf, 12, 0.0);
    buf[COLLISION_I0..COLLISION_I0 + 4].copy_from_slice(&i0.to_ne_bytes());
    buf[COLLISION_I1..COLLISION_I1 + 4].copy_from_slice(&i1.to_ne_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::{Vec2, Vec3, Vec4};

    #[test]
    fn aabb_record_offsets() {
        let mut c = AabbCollider::new(Vec2::new(-1.0, -2.0), Vec2::new(3.0, 4.0));
        c.pos = Vec3::new(10.0, 20.0, 0.0);
        crate::colliders::update_aabbs(std::slice::from_mut(&mut c));
        let buf = pack_aabbs(&[c]);
        assert_eq!(buf.len(), AABB_SIZE);
        assert_eq!(get_f32(&buf, 0), c.center.x);
        assert_eq!(get_f32(&buf, 4), c.center.y);
        assert_eq!(get_f32(&buf, 8), c.bl.x);
        assert_eq!(get_f32(&buf, 16), c.tr.x);
        assert_eq!(get_f32(&buf, 24), c.radius);
    }

    #[test]
    fn bb_record_offsets() {
        let c = BbCollider::with_rotation(
            Vec2::new(-0.5, -0.5),
            Vec2::new(0.5, 0.5),
            std::f32::consts::FRAC_PI_4,
        );
        let buf = pack_bbs(&[c]);
        assert_eq!(buf.len(), BB_SIZE);
        assert_eq!(get_f32(&buf, BB_COS), c.cos);
        assert_eq!(get_f32(&buf, BB_SIN), c.sin);
    }

    #[test]
    fn plane_record() {
        let c = PlaneCollider {
            abcd: Vec4::new(0.0, 1.0, 0.0, -2.0),
            ..PlaneCollider::default()
        };
        let buf = pack_planes(&[c]);
        assert_eq!(buf.len(), PLANE_SIZE);
        assert_eq!(get_f32(&buf, 12), -2.0);
    }

    #[test]
    fn collision_round_trip() {
        let mut buf = vec![0u8; COLLISION_SIZE];
        pack_collision(&mut buf, Vec3::new(1.0, -2.0, 0.5), 3, 7);
        let c = unpack_collisions(&buf).next().unwrap();
        assert_eq!(c.vec(), Vec3::new(1.0, -2.0, 0.5));
        assert_eq!(c.i0, 3);
        assert_eq!(c.i1, 7);
    }

    #[test]
    fn counter_slots() {
        assert_eq!(PairType::Aabb as usize, 0);
        assert_eq!(PairType::SphereGravity as usize, 7);
        assert_eq!(COUNTERS_BYTES, 32);
    }
}
