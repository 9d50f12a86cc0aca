//! In-process compute device
//!
//! Implements [`Compute`] entirely on the host: buffers are byte vectors,
//! "asynchronous" operations complete before returning, and the collision
//! kernels are dispatched by name to plain Rust implementations of the same
//! record layouts the OpenCL source declares. Used on platforms without a
//! device and to test the compute backend.

use std::collections::HashMap;
use std::time::Instant;

use crate::backend::layout::{
    self, read_f32, read_u32, PairType, AABB_SIZE, BB_COS, BB_SIN, BB_SIZE, COLLISION_SIZE,
    GRAVITY_MASS, GRAVITY_MAX_DISTANCE2, GRAVITY_POS, PLANE_SIZE, SPHERE_MASS, SPHERE_POS,
    SPHERE_RADIUS, SPHERE_SIZE,
};
use crate::backend::primitives::{
    aabb_overlap, box_sphere_overlap, gravity_force, obb_overlap, obb_sphere_overlap,
    sphere_overlap, sphere_plane_overlap, Obb,
};
use crate::colliders::GravityCollider;
use crate::foundation::math::{Vec2, Vec3, Vec4};

use super::{
    Buffer, Compute, ComputeError, DeviceLimits, Event, KernelArg, MappedBuffer, MemFlag,
    ProfInfo, Program,
};

/// Host-side [`Compute`] implementation
#[derive(Debug)]
pub struct HostDevice {
    epoch: Instant,
    next_handle: u32,
    buffers: HashMap<u32, Vec<u8>>,
    programs: HashMap<u32, ()>,
    events: HashMap<u32, [u64; 4]>,
}

impl Default for HostDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl HostDevice {
    /// Create a host device
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
            next_handle: 1,
            buffers: HashMap::new(),
            programs: HashMap::new(),
            events: HashMap::new(),
        }
    }

    fn now(&self) -> u64 {
        u64::try_from(self.epoch.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }

    fn handle(&mut self) -> u32 {
        let h = self.next_handle;
        self.next_handle += 1;
        h
    }

    // Every operation completes synchronously; queued/submit/start collapse
    // onto the same timestamp.
    fn finish_event(&mut self, start: u64) -> Event {
        let end = self.now();
        let h = self.handle();
        self.events.insert(h, [start, start, start, end]);
        Event(h)
    }

    fn buffer(&self, buffer: Buffer) -> Result<&Vec<u8>, ComputeError> {
        self.buffers
            .get(&buffer.0)
            .ok_or(ComputeError::InvalidHandle(buffer.0))
    }

    fn check_range(size: usize, offset: usize, len: usize) -> Result<(), ComputeError> {
        if offset + len > size {
            return Err(ComputeError::OutOfBounds { offset, len, size });
        }
        Ok(())
    }

    fn arg_buffer(
        kernel: &str,
        args: &[KernelArg],
        i: usize,
    ) -> Result<Buffer, ComputeError> {
        match args.get(i) {
            Some(KernelArg::Buffer(b)) => Ok(*b),
            _ => Err(ComputeError::ArgMismatch {
                kernel: kernel.to_owned(),
                msg: format!("argument {i} must be a buffer"),
            }),
        }
    }

    fn arg_u32(kernel: &str, args: &[KernelArg], i: usize) -> Result<u32, ComputeError> {
        match args.get(i) {
            Some(KernelArg::U32(v)) => Ok(*v),
            _ => Err(ComputeError::ArgMismatch {
                kernel: kernel.to_owned(),
                msg: format!("argument {i} must be a u32"),
            }),
        }
    }

    // Appends the found records to the pair type's collision buffer and adds
    // the full candidate count to its counter, mirroring the device's
    // atomic-increment-then-bounds-check pattern.
    fn commit(
        &mut self,
        kernel: &str,
        args: &[KernelArg],
        counter_arg: usize,
        slot: PairType,
        max_collisions: u32,
        found: &[(Vec3, u32, u32)],
    ) -> Result<(), ComputeError> {
        let counters = Self::arg_buffer(kernel, args, counter_arg)?;
        let collisions = Self::arg_buffer(kernel, args, counter_arg + 1)?;
        let off = slot as usize * 4;
        let buf = self
            .buffers
            .get_mut(&counters.0)
            .ok_or(ComputeError::InvalidHandle(counters.0))?;
        Self::check_range(buf.len(), off, 4)?;
        let base = read_u32(buf, off);
        let total = base + u32::try_from(found.len()).unwrap_or(u32::MAX);
        buf[off..off + 4].copy_from_slice(&total.to_ne_bytes());
        let out = self
            .buffers
            .get_mut(&collisions.0)
            .ok_or(ComputeError::InvalidHandle(collisions.0))?;
        for (k, (v, i0, i1)) in found.iter().enumerate() {
            let idx = base as usize + k;
            if idx >= max_collisions as usize {
                break;
            }
            let rec = idx * COLLISION_SIZE;
            Self::check_range(out.len(), rec, COLLISION_SIZE)?;
            layout::pack_collision(&mut out[rec..rec + COLLISION_SIZE], *v, *i0, *i1);
        }
        Ok(())
    }

    // Argument convention: `max_collisions`, the element count(s), the input
    // buffer(s), the counter buffer, the collision record buffer, in that
    // order, matching the kernel signatures in kernels.cl.
    fn dispatch(&mut self, kernel: &str, args: &[KernelArg]) -> Result<(), ComputeError> {
        let max = Self::arg_u32(kernel, args, 0)?;
        let n0 = Self::arg_u32(kernel, args, 1)? as usize;
        match kernel {
            "aabb_collision" => {
                let mut aabbs = unpack_aabbs(self.arg(kernel, args, 2)?);
                aabbs.truncate(n0);
                let mut found = Vec::new();
                for i in 0..aabbs.len() {
                    for j in i + 1..aabbs.len() {
                        if let Some(v) =
                            aabb_overlap(aabbs[i].bl, aabbs[i].tr, aabbs[j].bl, aabbs[j].tr)
                        {
                            found.push((v, i as u32, j as u32));
                        }
                    }
                }
                self.commit(kernel, args, 3, PairType::Aabb, max, &found)
            }
            "bb_collision" => {
                let mut bbs = unpack_bbs(self.arg(kernel, args, 2)?);
                bbs.truncate(n0);
                let mut found = Vec::new();
                for i in 0..bbs.len() {
                    for j in i + 1..bbs.len() {
                        if let Some(v) = obb_overlap(&bbs[i], &bbs[j]) {
                            found.push((v, i as u32, j as u32));
                        }
                    }
                }
                self.commit(kernel, args, 3, PairType::Bb, max, &found)
            }
            "sphere_collision" => {
                let mut spheres = unpack_spheres(self.arg(kernel, args, 2)?);
                spheres.truncate(n0);
                let mut found = Vec::new();
                for i in 0..spheres.len() {
                    for j in i + 1..spheres.len() {
                        let (s0, s1) = (&spheres[i], &spheres[j]);
                        if let Some(v) = sphere_overlap(s0.pos, s0.radius, s1.pos, s1.radius) {
                            found.push((v, i as u32, j as u32));
                        }
                    }
                }
                self.commit(kernel, args, 3, PairType::Sphere, max, &found)
            }
            "aabb_bb_collision" => {
                let n1 = Self::arg_u32(kernel, args, 2)? as usize;
                let mut aabbs = unpack_aabbs(self.arg(kernel, args, 3)?);
                aabbs.truncate(n0);
                let mut bbs = unpack_bbs(self.arg(kernel, args, 4)?);
                bbs.truncate(n1);
                let mut found = Vec::new();
                for (i, a) in aabbs.iter().enumerate() {
                    for (j, b) in bbs.iter().enumerate() {
                        if let Some(v) = obb_overlap(a, b) {
                            found.push((v, i as u32, j as u32));
                        }
                    }
                }
                self.commit(kernel, args, 5, PairType::AabbBb, max, &found)
            }
            "aabb_sphere_collision" => {
                let n1 = Self::arg_u32(kernel, args, 2)? as usize;
                let mut aabbs = unpack_aabbs(self.arg(kernel, args, 3)?);
                aabbs.truncate(n0);
                let mut spheres = unpack_spheres(self.arg(kernel, args, 4)?);
                spheres.truncate(n1);
                let mut found = Vec::new();
                for (i, a) in aabbs.iter().enumerate() {
                    for (j, s) in spheres.iter().enumerate() {
                        if let Some(v) = box_sphere_overlap(a.bl, a.tr, s.pos.xy(), s.radius) {
                            found.push((v, i as u32, j as u32));
                        }
                    }
                }
                self.commit(kernel, args, 5, PairType::AabbSphere, max, &found)
            }
            "bb_sphere_collision" => {
                let n1 = Self::arg_u32(kernel, args, 2)? as usize;
                let mut bbs = unpack_bbs(self.arg(kernel, args, 3)?);
                bbs.truncate(n0);
                let mut spheres = unpack_spheres(self.arg(kernel, args, 4)?);
                spheres.truncate(n1);
                let mut found = Vec::new();
                for (i, b) in bbs.iter().enumerate() {
                    for (j, s) in spheres.iter().enumerate() {
                        if let Some(v) = obb_sphere_overlap(b, s.pos.xy(), s.radius) {
                            found.push((v, i as u32, j as u32));
                        }
                    }
                }
                self.commit(kernel, args, 5, PairType::BbSphere, max, &found)
            }
            "sphere_plane_collision" => {
                let n1 = Self::arg_u32(kernel, args, 2)? as usize;
                let mut spheres = unpack_spheres(self.arg(kernel, args, 3)?);
                spheres.truncate(n0);
                let mut planes = unpack_planes(self.arg(kernel, args, 4)?);
                planes.truncate(n1);
                let mut found = Vec::new();
                for (i, s) in spheres.iter().enumerate() {
                    for (j, p) in planes.iter().enumerate() {
                        if let Some(v) = sphere_plane_overlap(s.pos, s.radius, *p) {
                            found.push((v, i as u32, j as u32));
                        }
                    }
                }
                self.commit(kernel, args, 5, PairType::SpherePlane, max, &found)
            }
            "sphere_gravity_collision" => {
                let n1 = Self::arg_u32(kernel, args, 2)? as usize;
                let mut spheres = unpack_spheres(self.arg(kernel, args, 3)?);
                spheres.truncate(n0);
                let mut wells = unpack_gravity(self.arg(kernel, args, 4)?);
                wells.truncate(n1);
                let mut found = Vec::new();
                for (i, s) in spheres.iter().enumerate() {
                    for (j, w) in wells.iter().enumerate() {
                        if let Some(f) = gravity_force(
                            GravityCollider::G,
                            s.pos,
                            s.mass,
                            w.pos,
                            w.mass,
                            w.max_distance2,
                        ) {
                            found.push((f, i as u32, j as u32));
                        }
                    }
                }
                self.commit(kernel, args, 5, PairType::SphereGravity, max, &found)
            }
            _ => Err(ComputeError::UnknownKernel(kernel.to_owned())),
        }
    }

    fn arg(&self, kernel: &str, args: &[KernelArg], i: usize) -> Result<Vec<u8>, ComputeError> {
        let b = Self::arg_buffer(kernel, args, i)?;
        Ok(self.buffer(b)?.clone())
    }
}

struct DeviceSphere {
    pos: Vec3,
    mass: f32,
    radius: f32,
}

struct DeviceGravity {
    pos: Vec3,
    mass: f32,
    max_distance2: f32,
}

fn unpack_aabbs(buf: Vec<u8>) -> Vec<Obb> {
    buf.chunks_exact(AABB_SIZE)
        .map(|rec| {
            Obb::axis_aligned(
                Vec2::new(read_f32(rec, 0), read_f32(rec, 4)),
                Vec2::new(read_f32(rec, 8), read_f32(rec, 12)),
                Vec2::new(read_f32(rec, 16), read_f32(rec, 20)),
            )
        })
        .collect()
}

fn unpack_bbs(buf: Vec<u8>) -> Vec<Obb> {
    buf.chunks_exact(BB_SIZE)
        .map(|rec| Obb {
            center: Vec2::new(read_f32(rec, 0), read_f32(rec, 4)),
            bl: Vec2::new(read_f32(rec, 8), read_f32(rec, 12)),
            tr: Vec2::new(read_f32(rec, 16), read_f32(rec, 20)),
            cos: read_f32(rec, BB_COS),
            sin: read_f32(rec, BB_SIN),
        })
        .collect()
}

fn unpack_spheres(buf: Vec<u8>) -> Vec<DeviceSphere> {
    buf.chunks_exact(SPHERE_SIZE)
        .map(|rec| DeviceSphere {
            pos: Vec3::new(
                read_f32(rec, SPHERE_POS),
                read_f32(rec, SPHERE_POS + 4),
                read_f32(rec, SPHERE_POS + 8),
            ),
            mass: read_f32(rec, SPHERE_MASS),
            radius: read_f32(rec, SPHERE_RADIUS),
        })
        .collect()
}

fn unpack_planes(buf: Vec<u8>) -> Vec<Vec4> {
    buf.chunks_exact(PLANE_SIZE)
        .map(|rec| {
            Vec4::new(
                read_f32(rec, 0),
                read_f32(rec, 4),
                read_f32(rec, 8),
                read_f32(rec, 12),
            )
        })
        .collect()
}

fn unpack_gravity(buf: Vec<u8>) -> Vec<DeviceGravity> {
    buf.chunks_exact(layout::GRAVITY_SIZE)
        .map(|rec| DeviceGravity {
            pos: Vec3::new(
                read_f32(rec, GRAVITY_POS),
                read_f32(rec, GRAVITY_POS + 4),
                read_f32(rec, GRAVITY_POS + 8),
            ),
            mass: read_f32(rec, GRAVITY_MASS),
            max_distance2: read_f32(rec, GRAVITY_MAX_DISTANCE2),
        })
        .collect()
}

impl Compute for HostDevice {
    fn limits(&self) -> DeviceLimits {
        DeviceLimits {
            max_work_group_size: 256,
        }
    }

    fn create_program(&mut self, _source: &str, _options: &str) -> Result<Program, ComputeError> {
        // Kernels are dispatched by name; the source only matters to real
        // devices.
        let h = self.handle();
        self.programs.insert(h, ());
        Ok(Program(h))
    }

    fn release_program(&mut self, program: Program) -> Result<(), ComputeError> {
        self.programs
            .remove(&program.0)
            .ok_or(ComputeError::InvalidHandle(program.0))?;
        Ok(())
    }

    fn create_buffer(&mut self, _flags: MemFlag, size: usize) -> Result<Buffer, ComputeError> {
        let h = self.handle();
        self.buffers.insert(h, vec![0u8; size]);
        Ok(Buffer(h))
    }

    fn release_buffer(&mut self, buffer: Buffer) -> Result<(), ComputeError> {
        self.buffers
            .remove(&buffer.0)
            .ok_or(ComputeError::InvalidHandle(buffer.0))?;
        Ok(())
    }

    fn fill_buffer(
        &mut self,
        buffer: Buffer,
        offset: usize,
        len: usize,
        value: u8,
        _wait: &[Event],
    ) -> Result<Event, ComputeError> {
        let start = self.now();
        let buf = self
            .buffers
            .get_mut(&buffer.0)
            .ok_or(ComputeError::InvalidHandle(buffer.0))?;
        Self::check_range(buf.len(), offset, len)?;
        buf[offset..offset + len].fill(value);
        Ok(self.finish_event(start))
    }

    fn write_buffer(
        &mut self,
        buffer: Buffer,
        offset: usize,
        data: &[u8],
        _wait: &[Event],
    ) -> Result<Event, ComputeError> {
        let start = self.now();
        let buf = self
            .buffers
            .get_mut(&buffer.0)
            .ok_or(ComputeError::InvalidHandle(buffer.0))?;
        Self::check_range(buf.len(), offset, data.len())?;
        buf[offset..offset + data.len()].copy_from_slice(data);
        Ok(self.finish_event(start))
    }

    fn write_buffer_rect(
        &mut self,
        buffer: Buffer,
        offset: usize,
        elem_size: usize,
        dst_stride: usize,
        src_stride: usize,
        data: &[u8],
        count: usize,
        _wait: &[Event],
    ) -> Result<Event, ComputeError> {
        let start = self.now();
        let buf = self
            .buffers
            .get_mut(&buffer.0)
            .ok_or(ComputeError::InvalidHandle(buffer.0))?;
        if count > 0 {
            Self::check_range(buf.len(), offset + (count - 1) * dst_stride, elem_size)?;
            Self::check_range(data.len(), (count - 1) * src_stride, elem_size)?;
        }
        for k in 0..count {
            let src = k * src_stride;
            let dst = offset + k * dst_stride;
            buf[dst..dst + elem_size].copy_from_slice(&data[src..src + elem_size]);
        }
        Ok(self.finish_event(start))
    }

    fn read_buffer(
        &mut self,
        buffer: Buffer,
        offset: usize,
        out: &mut [u8],
        _wait: &[Event],
    ) -> Result<(), ComputeError> {
        let buf = self.buffer(buffer)?;
        Self::check_range(buf.len(), offset, out.len())?;
        out.copy_from_slice(&buf[offset..offset + out.len()]);
        Ok(())
    }

    fn map_buffer(
        &mut self,
        buffer: Buffer,
        offset: usize,
        len: usize,
        _wait: &[Event],
    ) -> Result<MappedBuffer, ComputeError> {
        let buf = self.buffer(buffer)?;
        Self::check_range(buf.len(), offset, len)?;
        Ok(MappedBuffer {
            buffer,
            bytes: buf[offset..offset + len].to_vec(),
        })
    }

    fn unmap_buffer(&mut self, mapped: MappedBuffer) -> Result<(), ComputeError> {
        self.buffer(mapped.buffer)?;
        Ok(())
    }

    fn execute(
        &mut self,
        program: Program,
        kernel: &str,
        _global: &[usize],
        _local: &[usize],
        _wait: &[Event],
        args: &[KernelArg],
    ) -> Result<Event, ComputeError> {
        if !self.programs.contains_key(&program.0) {
            return Err(ComputeError::InvalidHandle(program.0));
        }
        let start = self.now();
        self.dispatch(kernel, args)?;
        Ok(self.finish_event(start))
    }

    fn prof_info(&self, event: Event, info: ProfInfo) -> Result<u64, ComputeError> {
        self.events
            .get(&event.0)
            .map(|ts| ts[info as usize])
            .ok_or(ComputeError::InvalidHandle(event.0))
    }

    fn release_events(&mut self, events: &[Event]) -> Result<(), ComputeError> {
        for e in events {
            self.events
                .remove(&e.0)
                .ok_or(ComputeError::InvalidHandle(e.0))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_lifecycle() {
        let mut dev = HostDevice::new();
        let b = dev.create_buffer(MemFlag::READ_WRITE, 16).unwrap();
        dev.write_buffer(b, 4, &[1, 2, 3, 4], &[]).unwrap();
        let mut out = [0u8; 4];
        dev.read_buffer(b, 4, &mut out, &[]).unwrap();
        assert_eq!(out, [1, 2, 3, 4]);
        dev.release_buffer(b).unwrap();
        assert!(matches!(
            dev.read_buffer(b, 0, &mut out, &[]),
            Err(ComputeError::InvalidHandle(_))
        ));
    }

    #[test]
    fn out_of_bounds_write() {
        let mut dev = HostDevice::new();
        let b = dev.create_buffer(MemFlag::READ_WRITE, 8).unwrap();
        assert!(matches!(
            dev.write_buffer(b, 6, &[0u8; 4], &[]),
            Err(ComputeError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn rect_write_strides_fields() {
        let mut dev = HostDevice::new();
        let b = dev.create_buffer(MemFlag::READ_WRITE, 32).unwrap();
        // two 4-byte fields at offset 4 of two 16-byte records
        let data = [10u8, 11, 12, 13, 20, 21, 22, 23];
        dev.write_buffer_rect(b, 4, 4, 16, 4, &data, 2, &[]).unwrap();
        let mut out = [0u8; 32];
        dev.read_buffer(b, 0, &mut out, &[]).unwrap();
        assert_eq!(&out[4..8], &[10, 11, 12, 13]);
        assert_eq!(&out[20..24], &[20, 21, 22, 23]);
    }

    #[test]
    fn unknown_kernel_is_an_error() {
        let mut dev = HostDevice::new();
        let p = dev.create_program("", "").unwrap();
        assert!(matches!(
            dev.execute(
                p,
                "nope",
                &[1],
                &[1],
                &[],
                &[KernelArg::U32(1), KernelArg::U32(0)]
            ),
            Err(ComputeError::UnknownKernel(_))
        ));
    }

    #[test]
    fn prof_info_is_monotonic() {
        let mut dev = HostDevice::new();
        let b = dev.create_buffer(MemFlag::READ_WRITE, 4).unwrap();
        let e = dev.fill_buffer(b, 0, 4, 0, &[]).unwrap();
        let start = dev.prof_info(e, ProfInfo::Start).unwrap();
        let end = dev.prof_info(e, ProfInfo::End).unwrap();
        assert!(start <= end);
        dev.release_events(&[e]).unwrap();
        assert!(dev.prof_info(e, ProfInfo::Queued).is_err());
    }
}
