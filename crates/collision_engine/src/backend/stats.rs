//! Per-stage timing stats for a collision sweep
//!
//! Every sweep reports four timestamps (queued, submitted, start, end) for
//! each declared [`Stage`]. The compute backend fills them from device event
//! profiling; the native backend measures wall-clock spans and back-fills the
//! queue timestamps from the start. Stages that did not run in a sweep are
//! back-filled with the minimum timestamp observed elsewhere, so consumers
//! always see monotonic, comparable values for every stage.

/// Number of profiling timestamps per stage: queued, submitted, start, end
pub const PROF_FIELDS: usize = 4;

/// Stages of a collision sweep, in read-back order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Zeroing of the per-pair-type counter buffer
    Counters,
    /// AABB collider upload
    AabbCopy,
    /// AABB-AABB kernel
    AabbExec,
    /// Oriented-box collider upload
    BbCopy,
    /// BB-BB kernel
    BbExec,
    /// Sphere position upload
    SpherePos,
    /// Sphere radius upload
    SphereRadius,
    /// Sphere mass upload
    SphereMass,
    /// Sphere-sphere kernel
    SphereExec,
    /// Plane coefficient upload
    PlaneCopy,
    /// Gravity-well position upload
    GravityPos,
    /// Gravity-well mass upload
    GravityMass,
    /// Gravity-well cutoff upload
    GravityMaxDistance2,
    /// AABB-BB kernel
    AabbBbExec,
    /// AABB-sphere kernel
    AabbSphereExec,
    /// BB-sphere kernel
    BbSphereExec,
    /// Sphere-plane kernel
    SpherePlaneExec,
    /// Sphere-gravity kernel
    SphereGravityExec,
}

impl Stage {
    /// Number of declared stages
    pub const COUNT: usize = 18;

    /// All stages, in read-back order
    pub const ALL: [Stage; Stage::COUNT] = [
        Stage::Counters,
        Stage::AabbCopy,
        Stage::AabbExec,
        Stage::BbCopy,
        Stage::BbExec,
        Stage::SpherePos,
        Stage::SphereRadius,
        Stage::SphereMass,
        Stage::SphereExec,
        Stage::PlaneCopy,
        Stage::GravityPos,
        Stage::GravityMass,
        Stage::GravityMaxDistance2,
        Stage::AabbBbExec,
        Stage::AabbSphereExec,
        Stage::BbSphereExec,
        Stage::SpherePlaneExec,
        Stage::SphereGravityExec,
    ];

    /// Stable display name of the stage
    pub fn name(self) -> &'static str {
        match self {
            Stage::Counters => "counters",
            Stage::AabbCopy => "aabb_copy",
            Stage::AabbExec => "aabb_exec",
            Stage::BbCopy => "bb_copy",
            Stage::BbExec => "bb_exec",
            Stage::SpherePos => "sphere_pos",
            Stage::SphereRadius => "sphere_radius",
            Stage::SphereMass => "sphere_mass",
            Stage::SphereExec => "sphere_exec",
            Stage::PlaneCopy => "plane_copy",
            Stage::GravityPos => "gravity_pos",
            Stage::GravityMass => "gravity_mass",
            Stage::GravityMaxDistance2 => "gravity_max_distance2",
            Stage::AabbBbExec => "aabb_bb_exec",
            Stage::AabbSphereExec => "aabb_sphere_exec",
            Stage::BbSphereExec => "bb_sphere_exec",
            Stage::SpherePlaneExec => "sphere_plane_exec",
            Stage::SphereGravityExec => "sphere_gravity_exec",
        }
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

/// Fixed-size block of per-stage profiling timestamps
#[derive(Debug, Clone, Copy)]
pub struct CollisionStats {
    values: [[u64; PROF_FIELDS]; Stage::COUNT],
}

impl Default for CollisionStats {
    fn default() -> Self {
        Self {
            values: [[0; PROF_FIELDS]; Stage::COUNT],
        }
    }
}

impl CollisionStats {
    /// Create a zeroed stats block
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset all timestamps to zero
    pub fn clear(&mut self) {
        self.values = [[0; PROF_FIELDS]; Stage::COUNT];
    }

    /// The `[queued, submitted, start, end]` timestamps for a stage
    pub fn get(&self, stage: Stage) -> [u64; PROF_FIELDS] {
        self.values[stage.index()]
    }

    /// Set all four timestamps for a stage
    pub fn set(&mut self, stage: Stage, values: [u64; PROF_FIELDS]) {
        self.values[stage.index()] = values;
    }

    /// Record a host-side span: queued and submitted are back-filled from the
    /// start timestamp.
    pub fn record_span(&mut self, stage: Stage, start: u64, end: u64) {
        self.set(stage, [start, start, start, end]);
    }

    /// Back-fill stages that did not run with the minimum timestamp observed
    /// elsewhere, keeping every stage monotonic and comparable.
    pub fn backfill_skipped(&mut self) {
        let min = self
            .values
            .iter()
            .flatten()
            .copied()
            .filter(|&v| v != 0)
            .min()
            .unwrap_or(0);
        for row in &mut self.values {
            if row.iter().all(|&v| v == 0) {
                *row = [min; PROF_FIELDS];
            }
        }
    }

    /// Iterate over `(stage, timestamps)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (Stage, [u64; PROF_FIELDS])> + '_ {
        Stage::ALL.iter().map(move |&s| (s, self.get(s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_names_are_unique() {
        for (i, a) in Stage::ALL.iter().enumerate() {
            for b in &Stage::ALL[i + 1..] {
                assert_ne!(a.name(), b.name());
            }
        }
    }

    #[test]
    fn stage_indices_match_declaration_order() {
        for (i, stage) in Stage::ALL.iter().enumerate() {
            assert_eq!(stage.index(), i);
        }
    }

    #[test]
    fn backfill_uses_minimum_observed() {
        let mut stats = CollisionStats::new();
        stats.set(Stage::AabbExec, [30, 40, 50, 60]);
        stats.set(Stage::Counters, [20, 25, 26, 27]);
        stats.backfill_skipped();
        assert_eq!(stats.get(Stage::BbExec), [20; PROF_FIELDS]);
        assert_eq!(stats.get(Stage::AabbExec), [30, 40, 50, 60]);
    }

    #[test]
    fn record_span_backfills_queue_fields() {
        let mut stats = CollisionStats::new();
        stats.record_span(Stage::SphereExec, 5, 9);
        assert_eq!(stats.get(Stage::SphereExec), [5, 5, 5, 9]);
    }
}
