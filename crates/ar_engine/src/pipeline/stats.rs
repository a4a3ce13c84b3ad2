//! Frame loop counters

use std::fmt;

/// Counters kept by the frame loop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Frames acquired from the source
    pub frames_processed: u64,
    /// Frames in which the tracked marker was found
    pub frames_with_marker: u64,
    /// Frames presented with the model drawn
    pub frames_rendered: u64,
    /// Acquisitions that timed out
    pub timeouts: u64,
    /// Frames skipped because detection faulted
    pub detection_faults: u64,
    /// Frames dropped by an exit request before presentation
    pub frames_discarded: u64,
}

impl FrameStats {
    /// Share of processed frames with a marker
    pub fn detection_rate(&self) -> f32 {
        if self.frames_processed == 0 {
            0.0
        } else {
            self.frames_with_marker as f32 / self.frames_processed as f32
        }
    }
}

impl fmt::Display for FrameStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} frames, {} with marker ({:.0}%), {} rendered, {} timeouts, {} detection faults, {} discarded",
            self.frames_processed,
            self.frames_with_marker,
            self.detection_rate() * 100.0,
            self.frames_rendered,
            self.timeouts,
            self.detection_faults,
            self.frames_discarded
        )
    }
}
