//! Frame timing and pacing

use std::time::{Duration, Instant};

/// High-precision timer for frame timing
pub struct Timer {
    last_frame: Instant,
    delta_time: f32,
    total_time: f32,
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
            delta_time: 0.0,
            total_time: 0.0,
            frame_count: 0,
        }
    }

    /// Update the timer (should be called once per frame)
    pub fn update(&mut self) {
        let now = Instant::now();
        self.delta_time = now.duration_since(self.last_frame).as_secs_f32();
        self.total_time += self.delta_time;
        self.last_frame = now;
        self.frame_count += 1;
    }

    /// Get the time since the last frame in seconds
    pub fn delta_time(&self) -> f32 {
        self.delta_time
    }

    /// Get the current frame count
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Get the average FPS since timer creation
    pub fn average_fps(&self) -> f32 {
        if self.total_time > 0.0 {
            self.frame_count as f32 / self.total_time
        } else {
            0.0
        }
    }
}

/// Caps the loop at a maximum frame rate
///
/// The pacer only ever sleeps for the remainder of the current frame slot. A
/// frame that already overran its slot (a cache miss hitch, a slow camera)
/// starts the next one immediately, and the slot clock is re-anchored so the
/// loop does not try to "catch up" with a burst of short frames.
#[derive(Debug)]
pub struct FramePacer {
    min_interval: Duration,
    frame_start: Option<Instant>,
}

impl FramePacer {
    /// Create a pacer for the given maximum frames per second
    pub fn new(max_fps: u32) -> Self {
        let min_interval = if max_fps == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(1.0 / f64::from(max_fps))
        };
        Self {
            min_interval,
            frame_start: None,
        }
    }

    /// Minimum interval between two frame starts
    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Mark the start of a frame
    pub fn begin_frame(&mut self) {
        self.frame_start = Some(Instant::now());
    }

    /// How long the caller should sleep before starting the next frame
    pub fn remaining(&self) -> Duration {
        match self.frame_start {
            Some(start) => self.min_interval.saturating_sub(start.elapsed()),
            None => Duration::ZERO,
        }
    }

    /// Sleep for whatever remains of the current frame slot
    pub fn wait_for_next_frame(&self) {
        let remaining = self.remaining();
        if !remaining.is_zero() {
            std::thread::sleep(remaining);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pacer_interval() {
        let pacer = FramePacer::new(50);
        assert_eq!(pacer.min_interval(), Duration::from_millis(20));
        assert_eq!(pacer.remaining(), Duration::ZERO);
    }

    #[test]
    fn test_pacer_remaining_is_bounded() {
        let mut pacer = FramePacer::new(10);
        pacer.begin_frame();
        assert!(pacer.remaining() <= Duration::from_millis(100));
    }

    #[test]
    fn test_unlimited_pacer_never_waits() {
        let mut pacer = FramePacer::new(0);
        pacer.begin_frame();
        assert_eq!(pacer.remaining(), Duration::ZERO);
    }

    #[test]
    fn test_timer_counts_frames() {
        let mut timer = Timer::new();
        timer.update();
        timer.update();
        assert_eq!(timer.frame_count(), 2);
        assert!(timer.delta_time() >= 0.0);
    }
}
