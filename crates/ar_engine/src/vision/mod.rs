//! Vision side of the pipeline
//!
//! Frames come in through [`FrameSource`], markers are found by a
//! [`MarkerDetector`], and [`MarkerPoseEstimator`] turns the tracked marker's
//! corners into a camera-space pose using [`CameraIntrinsics`].

pub mod detector;
pub mod frame;
pub mod homography;
pub mod intrinsics;
pub mod pose;

pub use detector::{
    DetectedMarker, DetectionError, DetectionLog, MarkerDetector, MarkerDictionary, ReplayDetector,
};
pub use frame::{Frame, FramePoll, FrameSource, FrameSourceError, ImageSequenceSource};
pub use intrinsics::{CalibrationFile, CalibrationMismatch, CameraIntrinsics, Distortion};
pub use pose::{MarkerPose, MarkerPoseEstimator, PoseError};
