//! Device-offload collision backend
//!
//! Packs the collider arrays into device buffers, launches one kernel per
//! pair type with an event graph ordering copies before launches, and reads
//! the per-type collision records back into the shared [`Output`]. Generic
//! over [`Compute`] so the same backend drives a real device or the
//! in-process [`crate::compute::host::HostDevice`].
//!
//! Only spheres participate in the gravity pass on the device; the other
//! collider types fall outside the kernel set, matching the packed record
//! formats in [`layout`].

use log::warn;

use crate::colliders::ColliderBody;
use crate::compute::{Buffer, Compute, Event, KernelArg, MemFlag, ProfInfo, Program};
use crate::foundation::time::Timing;

use super::layout::{
    self, pack_aabbs, pack_bbs, pack_planes, pack_pos4, unpack_collisions, PairType, AABB_SIZE,
    BB_SIZE, COLLISION_SIZE, COUNTERS_BYTES, GRAVITY_MASS, GRAVITY_MAX_DISTANCE2, GRAVITY_POS,
    GRAVITY_SIZE, N_PAIR_TYPES, PLANE_SIZE, SPHERE_MASS, SPHERE_POS, SPHERE_RADIUS, SPHERE_SIZE,
};
use super::{add_collision, pair_mut, Backend, BackendError, Input, Output, Stage};

/// Kernel source shared with real OpenCL devices.
const KERNELS: &str = include_str!("kernels.cl");

/// Collision backend that offloads the pairwise tests to a compute device
pub struct ComputeBackend<D> {
    device: D,
    prog: Option<Program>,
    colliders: Option<ColliderBuffers>,
    collisions: Option<CollisionBuffers>,
    max_colliders: usize,
    max_collisions: usize,
    max_wg_size: usize,
    // all events created since the last release, freed in bulk after each
    // sweep
    events: Vec<Event>,
}

#[derive(Clone, Copy)]
struct ColliderBuffers {
    aabb: Buffer,
    bb: Buffer,
    sphere: Buffer,
    plane: Buffer,
    gravity: Buffer,
}

#[derive(Clone, Copy)]
struct CollisionBuffers {
    counters: Buffer,
    records: [Buffer; N_PAIR_TYPES],
}

impl<D: Compute> ComputeBackend<D> {
    /// Create a backend on top of `device`
    pub fn new(device: D) -> Self {
        Self {
            device,
            prog: None,
            colliders: None,
            collisions: None,
            max_colliders: 0,
            max_collisions: 0,
            max_wg_size: 1,
            events: Vec::new(),
        }
    }

    /// The underlying device
    pub fn device(&self) -> &D {
        &self.device
    }

    // Global work size for an n-item dimension, rounded up to a full work
    // group; kernels guard against the overshoot.
    fn global(&self, n: usize) -> usize {
        if n < self.max_wg_size {
            n
        } else {
            n.div_ceil(self.max_wg_size) * self.max_wg_size
        }
    }
}

// One sweep's worth of event bookkeeping: the event recorded for each stats
// stage, if that stage ran.
type StageEvents = [Option<Event>; Stage::COUNT];

impl<D: Compute> Backend for ComputeBackend<D> {
    fn init(&mut self) -> Result<(), BackendError> {
        self.max_wg_size = self.device.limits().max_work_group_size.max(1);
        if let Some(p) = self.prog.take() {
            self.device.release_program(p)?;
        }
        self.prog = Some(self.device.create_program(KERNELS, "-Werror")?);
        Ok(())
    }

    fn set_max_colliders(&mut self, n: usize) -> Result<(), BackendError> {
        if let Some(b) = self.colliders.take() {
            for buf in [b.aabb, b.bb, b.sphere, b.plane, b.gravity] {
                self.device.release_buffer(buf)?;
            }
        }
        self.max_colliders = n;
        let flags = MemFlag::READ_ONLY;
        self.colliders = Some(ColliderBuffers {
            aabb: self.device.create_buffer(flags, n.max(1) * AABB_SIZE)?,
            bb: self.device.create_buffer(flags, n.max(1) * BB_SIZE)?,
            sphere: self.device.create_buffer(flags, n.max(1) * SPHERE_SIZE)?,
            plane: self.device.create_buffer(flags, n.max(1) * PLANE_SIZE)?,
            gravity: self.device.create_buffer(flags, n.max(1) * GRAVITY_SIZE)?,
        });
        Ok(())
    }

    fn set_max_collisions(&mut self, n: usize) -> Result<(), BackendError> {
        if let Some(b) = self.collisions.take() {
            self.device.release_buffer(b.counters)?;
            for buf in b.records {
                self.device.release_buffer(buf)?;
            }
        }
        self.max_collisions = n;
        let counters = self
            .device
            .create_buffer(MemFlag::READ_WRITE, COUNTERS_BYTES)?;
        let mut records = [Buffer(0); N_PAIR_TYPES];
        for r in &mut records {
            *r = self
                .device
                .create_buffer(MemFlag::READ_WRITE, n.max(1) * COLLISION_SIZE)?;
        }
        self.collisions = Some(CollisionBuffers { counters, records });
        Ok(())
    }

    fn check(
        &mut self,
        _timing: &Timing,
        input: &mut Input,
        output: &mut Output,
    ) -> Result<(), BackendError> {
        output.stats.clear();
        let result = self.sweep(input, output);
        let events = std::mem::take(&mut self.events);
        self.device.release_events(&events)?;
        result
    }
}

impl<D: Compute> ComputeBackend<D> {
    fn sweep(&mut self, input: &mut Input, output: &mut Output) -> Result<(), BackendError> {
        let prog = self.prog.ok_or(BackendError::NotReady)?;
        let (Some(colliders), Some(collisions)) = (self.colliders, self.collisions) else {
            return Err(BackendError::NotReady);
        };
        let max = u32::try_from(self.max_collisions).unwrap_or(u32::MAX);
        let n_aabb = input.aabb.len().min(self.max_colliders);
        let n_bb = input.bb.len().min(self.max_colliders);
        let n_sphere = input.sphere.len().min(self.max_colliders);
        let n_plane = input.plane.len().min(self.max_colliders);
        let n_gravity = input.gravity.len().min(self.max_colliders);
        let g_aabb = self.global(n_aabb);
        let g_bb = self.global(n_bb);
        let g_sphere = self.global(n_sphere);
        let g_plane = self.global(n_plane);
        let g_gravity = self.global(n_gravity);

        let mut stages: StageEvents = [None; Stage::COUNT];
        let mut record = |stage: Stage, ev: Event, events: &mut Vec<Event>| {
            stages[stage.index()] = Some(ev);
            events.push(ev);
        };

        // all counters reset to zero; every launch waits on this
        let counters_ev = self
            .device
            .fill_buffer(collisions.counters, 0, COUNTERS_BYTES, 0, &[])?;
        record(Stage::Counters, counters_ev, &mut self.events);

        // host-to-device copies
        let aabb_ev = if n_aabb > 0 {
            let ev = self.device.write_buffer(
                colliders.aabb,
                0,
                &pack_aabbs(&input.aabb[..n_aabb]),
                &[],
            )?;
            record(Stage::AabbCopy, ev, &mut self.events);
            Some(ev)
        } else {
            None
        };
        let bb_ev = if n_bb > 0 {
            let ev =
                self.device
                    .write_buffer(colliders.bb, 0, &pack_bbs(&input.bb[..n_bb]), &[])?;
            record(Stage::BbCopy, ev, &mut self.events);
            Some(ev)
        } else {
            None
        };
        let sphere_evs = if n_sphere > 0 {
            let spheres = &input.sphere[..n_sphere];
            let pos: Vec<u8> = spheres
                .iter()
                .flat_map(|s| pack_pos4(s.pos))
                .collect();
            let radius: Vec<f32> = spheres.iter().map(|s| s.radius).collect();
            let mass: Vec<f32> = spheres.iter().map(ColliderBody::mass).collect();
            let pos_ev = self.device.write_buffer_rect(
                colliders.sphere,
                SPHERE_POS,
                16,
                SPHERE_SIZE,
                16,
                &pos,
                n_sphere,
                &[],
            )?;
            record(Stage::SpherePos, pos_ev, &mut self.events);
            let radius_ev = self.device.write_buffer_rect(
                colliders.sphere,
                SPHERE_RADIUS,
                4,
                SPHERE_SIZE,
                4,
                bytemuck::cast_slice(&radius),
                n_sphere,
                &[],
            )?;
            record(Stage::SphereRadius, radius_ev, &mut self.events);
            let mass_ev = self.device.write_buffer_rect(
                colliders.sphere,
                SPHERE_MASS,
                4,
                SPHERE_SIZE,
                4,
                bytemuck::cast_slice(&mass),
                n_sphere,
                &[],
            )?;
            record(Stage::SphereMass, mass_ev, &mut self.events);
            vec![pos_ev, radius_ev, mass_ev]
        } else {
            Vec::new()
        };
        let plane_ev = if n_plane > 0 {
            let ev = self.device.write_buffer(
                colliders.plane,
                0,
                &pack_planes(&input.plane[..n_plane]),
                &[],
            )?;
            record(Stage::PlaneCopy, ev, &mut self.events);
            Some(ev)
        } else {
            None
        };
        let gravity_evs = if n_gravity > 0 {
            let wells = &input.gravity[..n_gravity];
            let pos: Vec<u8> = wells.iter().flat_map(|w| pack_pos4(w.pos)).collect();
            let mass: Vec<f32> = wells.iter().map(|w| w.mass).collect();
            let max_d2: Vec<f32> = wells.iter().map(|w| w.max_distance2).collect();
            let pos_ev = self.device.write_buffer_rect(
                colliders.gravity,
                GRAVITY_POS,
                16,
                GRAVITY_SIZE,
                16,
                &pos,
                n_gravity,
                &[],
            )?;
            record(Stage::GravityPos, pos_ev, &mut self.events);
            let mass_ev = self.device.write_buffer_rect(
                colliders.gravity,
                GRAVITY_MASS,
                4,
                GRAVITY_SIZE,
                4,
                bytemuck::cast_slice(&mass),
                n_gravity,
                &[],
            )?;
            record(Stage::GravityMass, mass_ev, &mut self.events);
            let max_ev = self.device.write_buffer_rect(
                colliders.gravity,
                GRAVITY_MAX_DISTANCE2,
                4,
                GRAVITY_SIZE,
                4,
                bytemuck::cast_slice(&max_d2),
                n_gravity,
                &[],
            )?;
            record(Stage::GravityMaxDistance2, max_ev, &mut self.events);
            vec![pos_ev, mass_ev, max_ev]
        } else {
            Vec::new()
        };

        // kernel launches, each ordered after the counter reset and the
        // copies it reads
        let mut wait = Vec::with_capacity(8);
        let mut launch = |this: &mut Self,
                          stage: Stage,
                          kernel: &str,
                          global: &[usize],
                          deps: &[Option<Event>],
                          extra: &[&[Event]],
                          args: &[KernelArg]|
         -> Result<Option<Event>, BackendError> {
            wait.clear();
            wait.push(counters_ev);
            wait.extend(deps.iter().flatten());
            for evs in extra {
                wait.extend_from_slice(evs);
            }
            let ev = this
                .device
                .execute(prog, kernel, global, &[], &wait, args)?;
            this.events.push(ev);
            stages[stage.index()] = Some(ev);
            Ok(Some(ev))
        };

        let aabb_exec = if n_aabb > 1 {
            launch(
                self,
                Stage::AabbExec,
                "aabb_collision",
                &[g_aabb, g_aabb],
                &[aabb_ev],
                &[],
                &[
                    KernelArg::U32(max),
                    KernelArg::U32(u32::try_from(n_aabb).unwrap_or(0)),
                    KernelArg::Buffer(colliders.aabb),
                    KernelArg::Buffer(collisions.counters),
                    KernelArg::Buffer(collisions.records[PairType::Aabb as usize]),
                ],
            )?
        } else {
            None
        };
        let bb_exec = if n_bb > 1 {
            launch(
                self,
                Stage::BbExec,
                "bb_collision",
                &[g_bb, g_bb],
                &[bb_ev],
                &[],
                &[
                    KernelArg::U32(max),
                    KernelArg::U32(u32::try_from(n_bb).unwrap_or(0)),
                    KernelArg::Buffer(colliders.bb),
                    KernelArg::Buffer(collisions.counters),
                    KernelArg::Buffer(collisions.records[PairType::Bb as usize]),
                ],
            )?
        } else {
            None
        };
        let sphere_exec = if n_sphere > 1 {
            launch(
                self,
                Stage::SphereExec,
                "sphere_collision",
                &[g_sphere, g_sphere],
                &[],
                &[&sphere_evs],
                &[
                    KernelArg::U32(max),
                    KernelArg::U32(u32::try_from(n_sphere).unwrap_or(0)),
                    KernelArg::Buffer(colliders.sphere),
                    KernelArg::Buffer(collisions.counters),
                    KernelArg::Buffer(collisions.records[PairType::Sphere as usize]),
                ],
            )?
        } else {
            None
        };
        let aabb_bb_exec = if n_aabb > 0 && n_bb > 0 {
            launch(
                self,
                Stage::AabbBbExec,
                "aabb_bb_collision",
                &[g_aabb, g_bb],
                &[aabb_ev, bb_ev],
                &[],
                &[
                    KernelArg::U32(max),
                    KernelArg::U32(u32::try_from(n_aabb).unwrap_or(0)),
                    KernelArg::U32(u32::try_from(n_bb).unwrap_or(0)),
                    KernelArg::Buffer(colliders.aabb),
                    KernelArg::Buffer(colliders.bb),
                    KernelArg::Buffer(collisions.counters),
                    KernelArg::Buffer(collisions.records[PairType::AabbBb as usize]),
                ],
            )?
        } else {
            None
        };
        let aabb_sphere_exec = if n_aabb > 0 && n_sphere > 0 {
            launch(
                self,
                Stage::AabbSphereExec,
                "aabb_sphere_collision",
                &[g_aabb, g_sphere],
                &[aabb_ev],
                &[&sphere_evs],
                &[
                    KernelArg::U32(max),
                    KernelArg::U32(u32::try_from(n_aabb).unwrap_or(0)),
                    KernelArg::U32(u32::try_from(n_sphere).unwrap_or(0)),
                    KernelArg::Buffer(colliders.aabb),
                    KernelArg::Buffer(colliders.sphere),
                    KernelArg::Buffer(collisions.counters),
                    KernelArg::Buffer(collisions.records[PairType::AabbSphere as usize]),
                ],
            )?
        } else {
            None
        };
        let bb_sphere_exec = if n_bb > 0 && n_sphere > 0 {
            launch(
                self,
                Stage::BbSphereExec,
                "bb_sphere_collision",
                &[g_bb, g_sphere],
                &[bb_ev],
                &[&sphere_evs],
                &[
                    KernelArg::U32(max),
                    KernelArg::U32(u32::try_from(n_bb).unwrap_or(0)),
                    KernelArg::U32(u32::try_from(n_sphere).unwrap_or(0)),
                    KernelArg::Buffer(colliders.bb),
                    KernelArg::Buffer(colliders.sphere),
                    KernelArg::Buffer(collisions.counters),
                    KernelArg::Buffer(collisions.records[PairType::BbSphere as usize]),
                ],
            )?
        } else {
            None
        };
        let sphere_plane_exec = if n_sphere > 0 && n_plane > 0 {
            launch(
                self,
                Stage::SpherePlaneExec,
                "sphere_plane_collision",
                &[g_sphere, g_plane],
                &[plane_ev],
                &[&sphere_evs],
                &[
                    KernelArg::U32(max),
                    KernelArg::U32(u32::try_from(n_sphere).unwrap_or(0)),
                    KernelArg::U32(u32::try_from(n_plane).unwrap_or(0)),
                    KernelArg::Buffer(colliders.sphere),
                    KernelArg::Buffer(colliders.plane),
                    KernelArg::Buffer(collisions.counters),
                    KernelArg::Buffer(collisions.records[PairType::SpherePlane as usize]),
                ],
            )?
        } else {
            None
        };
        let sphere_gravity_exec = if n_sphere > 0 && n_gravity > 0 {
            launch(
                self,
                Stage::SphereGravityExec,
                "sphere_gravity_collision",
                &[g_sphere, g_gravity],
                &[],
                &[&sphere_evs, &gravity_evs],
                &[
                    KernelArg::U32(max),
                    KernelArg::U32(u32::try_from(n_sphere).unwrap_or(0)),
                    KernelArg::U32(u32::try_from(n_gravity).unwrap_or(0)),
                    KernelArg::Buffer(colliders.sphere),
                    KernelArg::Buffer(colliders.gravity),
                    KernelArg::Buffer(collisions.counters),
                    KernelArg::Buffer(collisions.records[PairType::SphereGravity as usize]),
                ],
            )?
        } else {
            None
        };

        // device-to-host read-back, per pair type
        self.read_back(
            &collisions,
            PairType::Aabb,
            aabb_exec,
            input,
            output,
            |out, dc, input| {
                let (i0, i1) = (dc.i0 as usize, dc.i1 as usize);
                let (c0, c1) = pair_mut(input.aabb, i0, i1);
                add_collision(c0, c1, dc.vec(), out);
            },
        )?;
        self.read_back(&collisions, PairType::Bb, bb_exec, input, output, |out, dc, input| {
            let (c0, c1) = pair_mut(input.bb, dc.i0 as usize, dc.i1 as usize);
            add_collision(c0, c1, dc.vec(), out);
        })?;
        self.read_back(
            &collisions,
            PairType::Sphere,
            sphere_exec,
            input,
            output,
            |out, dc, input| {
                let (c0, c1) = pair_mut(input.sphere, dc.i0 as usize, dc.i1 as usize);
                add_collision(c0, c1, dc.vec(), out);
            },
        )?;
        self.read_back(
            &collisions,
            PairType::AabbBb,
            aabb_bb_exec,
            input,
            output,
            |out, dc, input| {
                add_collision(
                    &mut input.aabb[dc.i0 as usize],
                    &mut input.bb[dc.i1 as usize],
                    dc.vec(),
                    out,
                );
            },
        )?;
        self.read_back(
            &collisions,
            PairType::AabbSphere,
            aabb_sphere_exec,
            input,
            output,
            |out, dc, input| {
                add_collision(
                    &mut input.aabb[dc.i0 as usize],
                    &mut input.sphere[dc.i1 as usize],
                    dc.vec(),
                    out,
                );
            },
        )?;
        self.read_back(
            &collisions,
            PairType::BbSphere,
            bb_sphere_exec,
            input,
            output,
            |out, dc, input| {
                add_collision(
                    &mut input.bb[dc.i0 as usize],
                    &mut input.sphere[dc.i1 as usize],
                    dc.vec(),
                    out,
                );
            },
        )?;
        self.read_back(
            &collisions,
            PairType::SpherePlane,
            sphere_plane_exec,
            input,
            output,
            |out, dc, input| {
                add_collision(
                    &mut input.sphere[dc.i0 as usize],
                    &mut input.plane[dc.i1 as usize],
                    dc.vec(),
                    out,
                );
            },
        )?;
        self.read_back(
            &collisions,
            PairType::SphereGravity,
            sphere_gravity_exec,
            input,
            output,
            |out, dc, input| {
                add_collision(
                    &mut input.sphere[dc.i0 as usize],
                    &mut input.gravity[dc.i1 as usize],
                    dc.vec(),
                    out,
                );
            },
        )?;

        // profiling timestamps for every stage that ran
        for stage in Stage::ALL {
            if let Some(ev) = stages[stage.index()] {
                output.stats.set(
                    stage,
                    [
                        self.device.prof_info(ev, ProfInfo::Queued)?,
                        self.device.prof_info(ev, ProfInfo::Submit)?,
                        self.device.prof_info(ev, ProfInfo::Start)?,
                        self.device.prof_info(ev, ProfInfo::End)?,
                    ],
                );
            }
        }
        output.stats.backfill_skipped();
        Ok(())
    }

    // Reads one pair type's counter and records, mapping device indices back
    // onto the host collider arrays.
    fn read_back(
        &mut self,
        collisions: &CollisionBuffers,
        pair: PairType,
        exec: Option<Event>,
        input: &mut Input,
        output: &mut Output,
        mut apply: impl FnMut(&mut Output, layout::DeviceCollision, &mut Input),
    ) -> Result<(), BackendError> {
        let Some(exec) = exec else {
            return Ok(());
        };
        let mut counter = [0u8; 4];
        self.device.read_buffer(
            collisions.counters,
            pair as usize * 4,
            &mut counter,
            &[exec],
        )?;
        let found = u32::from_ne_bytes(counter) as usize;
        if found == 0 {
            return Ok(());
        }
        let n = if found > self.max_collisions {
            warn!("too many collisions");
            self.max_collisions
        } else {
            found
        };
        let mapped = self.device.map_buffer(
            collisions.records[pair as usize],
            0,
            n * COLLISION_SIZE,
            &[exec],
        )?;
        let records: Vec<_> = unpack_collisions(&mapped).collect();
        self.device.unmap_buffer(mapped)?;
        for dc in records {
            apply(output, dc, input);
        }
        Ok(())
    }
}
