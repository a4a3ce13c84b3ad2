//! Marker pose estimation
//!
//! Turns the four detected corners of one square marker into a rigid
//! camera-from-marker transform. The solve is a planar homography on
//! undistorted normalized coordinates, decomposed into rotation and
//! translation and projected back onto SO(3).
//!
//! Poses are in the vision camera frame: X right, Y down, Z forward. The
//! marker's own frame has its origin at the marker centre, X towards the
//! right edge, Y towards the top edge and Z out of the printed face.
//!
//! Every call is independent of the previous ones. There is no smoothing.

use std::time::Instant;

use thiserror::Error;

use super::detector::{DetectedMarker, DetectionError, MarkerDetector, MarkerDictionary};
use super::frame::Frame;
use super::homography;
use super::intrinsics::{CalibrationMismatch, CameraIntrinsics};
use crate::core::config::MarkerConfig;
use crate::foundation::math::{utils, Mat3d, Point2d, Vec3d};

/// Minimum area of any corner triangle relative to the squared longest
/// corner distance. Quads flatter than this are treated as collinear.
const MIN_TRIANGLE_RATIO: f64 = 1e-3;

/// Pose of one marker in one frame
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerPose {
    /// Id of the tracked marker
    pub marker_id: u32,
    /// Camera-from-marker rotation
    pub rotation: Mat3d,
    /// Marker centre in camera coordinates, in the marker size's units
    pub translation: Vec3d,
    /// Index of the frame the pose was measured on
    pub frame_index: u64,
    /// Capture time of that frame
    pub captured_at: Instant,
}

/// Estimation errors
///
/// A frame without a usable marker is `Ok(None)`, never an error.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PoseError {
    /// Frame resolution differs from the calibration
    #[error(transparent)]
    CalibrationMismatch(#[from] CalibrationMismatch),

    /// The detection primitive faulted
    #[error(transparent)]
    Detection(#[from] DetectionError),
}

/// Corner positions in the marker frame, matching detector corner order
pub fn marker_object_points(marker_size: f64) -> [[f64; 2]; 4] {
    let h = marker_size * 0.5;
    [[-h, h], [h, h], [h, -h], [-h, -h]]
}

/// Pick the single marker to track
///
/// Only ids in `dictionary` count, and only `tracked_id` when one is set.
/// Among the rest the highest confidence wins; ties go to the earlier
/// detection.
pub fn select_marker<'a>(
    detections: &'a [DetectedMarker],
    dictionary: &MarkerDictionary,
    tracked_id: Option<u32>,
) -> Option<&'a DetectedMarker> {
    detections
        .iter()
        .filter(|m| dictionary.contains(m.id))
        .filter(|m| tracked_id.map_or(true, |id| m.id == id))
        .fold(None, |best: Option<&DetectedMarker>, m| match best {
            Some(b) if b.confidence >= m.confidence => Some(b),
            _ => Some(m),
        })
}

/// Whether the corner quad is too flat, self-intersecting or non-finite to
/// support a pose
pub fn is_degenerate(corners: &[[f64; 2]; 4]) -> bool {
    if corners.iter().flatten().any(|v| !v.is_finite()) {
        return true;
    }

    let mut longest_sq = 0.0_f64;
    for i in 0..4 {
        for j in (i + 1)..4 {
            let dx = corners[i][0] - corners[j][0];
            let dy = corners[i][1] - corners[j][1];
            longest_sq = longest_sq.max(dx * dx + dy * dy);
        }
    }
    if longest_sq < 1e-12 {
        return true;
    }

    let mut orientation = 0.0;
    for i in 0..4 {
        let area = utils::cross2(corners[i], corners[(i + 1) % 4], corners[(i + 2) % 4]);
        if area.abs() / longest_sq < MIN_TRIANGLE_RATIO {
            return true;
        }
        // A convex quad turns the same way at every corner
        if orientation == 0.0 {
            orientation = area.signum();
        } else if area.signum() != orientation {
            return true;
        }
    }
    false
}

/// Solve the camera-from-marker pose for one corner quad
///
/// Returns `None` for degenerate quads and for solutions that are not
/// finite or place the marker behind the camera.
pub fn solve_planar_pose(
    corners: &[[f64; 2]; 4],
    intrinsics: &CameraIntrinsics,
    marker_size: f64,
) -> Option<(Mat3d, Vec3d)> {
    if is_degenerate(corners) || !(marker_size.is_finite() && marker_size > 0.0) {
        return None;
    }

    let image: Vec<[f64; 2]> = corners
        .iter()
        .map(|c| {
            let n = intrinsics.normalize(Point2d::new(c[0], c[1]));
            [n.x, n.y]
        })
        .collect();
    let h = homography::estimate(&marker_object_points(marker_size), &image).ok()?;

    let h1 = h.column(0).into_owned();
    let h2 = h.column(1).into_owned();
    let h3 = h.column(2).into_owned();
    let norm = h1.norm() + h2.norm();
    if norm < 1e-12 {
        return None;
    }

    let mut lambda = 2.0 / norm;
    if h3.z * lambda < 0.0 {
        lambda = -lambda;
    }
    let r1 = h1 * lambda;
    let r2 = h2 * lambda;
    let r3 = r1.cross(&r2);
    let translation = h3 * lambda;

    let rough = Mat3d::from_columns(&[r1, r2, r3]);
    let svd = rough.svd(true, true);
    let (mut u, v_t) = (svd.u?, svd.v_t?);
    let mut rotation = u * v_t;
    if rotation.determinant() < 0.0 {
        u.column_mut(2).neg_mut();
        rotation = u * v_t;
    }

    let finite = rotation.iter().chain(translation.iter()).all(|v| v.is_finite());
    if !finite || translation.z <= 0.0 {
        return None;
    }
    Some((rotation, translation))
}

/// RMS pixel distance between the detected corners and the pose's
/// reprojection of the marker corners
pub fn reprojection_rms(
    corners: &[[f64; 2]; 4],
    rotation: &Mat3d,
    translation: &Vec3d,
    intrinsics: &CameraIntrinsics,
    marker_size: f64,
) -> Option<f64> {
    let mut sum_sq = 0.0;
    for (object, observed) in marker_object_points(marker_size).iter().zip(corners) {
        let camera = rotation * Vec3d::new(object[0], object[1], 0.0) + translation;
        let projected = intrinsics.project(&camera)?;
        sum_sq += (projected.x - observed[0]).powi(2) + (projected.y - observed[1]).powi(2);
    }
    Some((sum_sq / 4.0).sqrt())
}

/// Per-frame single-marker pose estimator
///
/// Owns the detection primitive. Holds no per-frame state.
pub struct MarkerPoseEstimator {
    detector: Box<dyn MarkerDetector>,
    tracked_id: Option<u32>,
    max_reprojection_error: f64,
}

impl MarkerPoseEstimator {
    /// Default reprojection acceptance threshold in pixels
    pub const DEFAULT_MAX_REPROJECTION_ERROR: f64 = 4.0;

    /// Estimator tracking the best marker of any id
    pub fn new(detector: Box<dyn MarkerDetector>) -> Self {
        Self {
            detector,
            tracked_id: None,
            max_reprojection_error: Self::DEFAULT_MAX_REPROJECTION_ERROR,
        }
    }

    /// Estimator configured from the marker section
    pub fn from_config(detector: Box<dyn MarkerDetector>, config: &MarkerConfig) -> Self {
        Self::new(detector)
            .with_tracked_id(config.tracked_id)
            .with_max_reprojection_error(config.max_reprojection_error)
    }

    /// Restrict tracking to one marker id
    pub fn with_tracked_id(mut self, tracked_id: Option<u32>) -> Self {
        self.tracked_id = tracked_id;
        self
    }

    /// Reject poses whose corner reprojection RMS exceeds `pixels`
    pub fn with_max_reprojection_error(mut self, pixels: f64) -> Self {
        self.max_reprojection_error = pixels;
        self
    }

    /// Estimate the pose of the tracked marker in `frame`
    ///
    /// `Ok(None)` covers every "nothing usable" outcome: no detections, no
    /// matching id, a degenerate quad, or a poor fit.
    pub fn estimate(
        &mut self,
        frame: &Frame,
        intrinsics: &CameraIntrinsics,
        marker_size: f64,
        dictionary: &MarkerDictionary,
    ) -> Result<Option<MarkerPose>, PoseError> {
        intrinsics.check_frame(frame.width(), frame.height())?;

        let detections = self.detector.detect_markers(frame, dictionary)?;
        let Some(marker) = select_marker(&detections, dictionary, self.tracked_id) else {
            log::trace!("Frame {}: no tracked marker", frame.index());
            return Ok(None);
        };
        if detections.len() > 1 {
            log::trace!(
                "Frame {}: tracking marker {} of {} detections",
                frame.index(),
                marker.id,
                detections.len()
            );
        }

        let Some((rotation, translation)) =
            solve_planar_pose(&marker.corners, intrinsics, marker_size)
        else {
            log::debug!("Frame {}: marker {} is degenerate", frame.index(), marker.id);
            return Ok(None);
        };

        match reprojection_rms(&marker.corners, &rotation, &translation, intrinsics, marker_size) {
            Some(rms) if rms <= self.max_reprojection_error => Ok(Some(MarkerPose {
                marker_id: marker.id,
                rotation,
                translation,
                frame_index: frame.index(),
                captured_at: frame.captured_at(),
            })),
            rms => {
                log::debug!(
                    "Frame {}: marker {} rejected, reprojection error {:?}",
                    frame.index(),
                    marker.id,
                    rms
                );
                Ok(None)
            }
        }
    }

    /// Release the detection backend
    pub fn release(&mut self) {
        self.detector.release();
    }
}
