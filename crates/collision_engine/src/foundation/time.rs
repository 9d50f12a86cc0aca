//! Time management utilities

use std::time::{Duration, Instant};

/// Per-tick timing snapshot handed to the collision backends.
#[derive(Debug, Clone, Copy, Default)]
pub struct Timing {
    /// Duration of the last frame
    pub delta: Duration,
}

impl Timing {
    /// Create a timing snapshot for a frame of the given duration
    pub fn new(delta: Duration) -> Self {
        Self { delta }
    }

    /// Get the last frame duration in seconds
    pub fn delta_secs(&self) -> f32 {
        self.delta.as_secs_f32()
    }
}

/// High-precision timer for frame timing
pub struct Timer {
    last_frame: Instant,
    delta_time: Duration,
    frame_count: u64,
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

impl Timer {
    /// Create a new timer
    pub fn new() -> Self {
        Self {
            last_frame: Instant::now(),
            delta_time: Duration::ZERO,
            frame_count: 0,
        }
    }

    /// Update the timer (should be called once per frame)
    pub fn update(&mut self) {
        let now = Instant::now();
        self.delta_time = now.duration_since(self.last_frame);
        self.last_frame = now;
        self.frame_count += 1;
    }

    /// Get a timing snapshot for the current frame
    pub fn timing(&self) -> Timing {
        Timing::new(self.delta_time)
    }

    /// Get the current frame count
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }
}
