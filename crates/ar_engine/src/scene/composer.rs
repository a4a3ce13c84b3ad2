//! Per-frame transform composition
//!
//! ```text
//! FinalTransform = projection * view * [R | t] * S(scale) * T(offset)
//! ```
//!
//! `[R | t]` is the marker pose in the vision camera frame, `view` flips it
//! into the render camera frame, and the user's scale and offset act in the
//! marker's local frame in that order.

use nalgebra::Translation3;

use crate::foundation::math::{Mat3, Mat4, Mat4Ext, Vec3};
use crate::vision::{CameraIntrinsics, MarkerPose};

use super::transform_state::TransformState;

/// Model-to-clip matrix for one frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FinalTransform(Mat4);

impl FinalTransform {
    /// Wrap a matrix
    pub fn new(matrix: Mat4) -> Self {
        Self(matrix)
    }

    /// The matrix
    pub fn matrix(&self) -> &Mat4 {
        &self.0
    }
}

/// Combines marker pose, user transform and camera projection
#[derive(Debug, Default)]
pub struct SceneComposer {
    projection: Option<(CameraIntrinsics, Mat4)>,
}

impl SceneComposer {
    /// Composer with no projection built yet
    pub fn new() -> Self {
        Self::default()
    }

    /// Final transform for this frame, or `None` when there is no pose
    pub fn compose(
        &mut self,
        pose: Option<&MarkerPose>,
        transform: &TransformState,
        intrinsics: &CameraIntrinsics,
    ) -> Option<FinalTransform> {
        let pose = pose?;
        let projection = self.projection(intrinsics);
        let view = Mat4::vision_to_render();
        let model = Self::model_matrix(pose, transform);
        Some(FinalTransform(projection * view * model))
    }

    /// Marker pose followed by the user scale, then the user offset
    pub fn model_matrix(pose: &MarkerPose, transform: &TransformState) -> Mat4 {
        let rotation: Mat3 = pose.rotation.cast::<f32>();
        let translation: Vec3 = pose.translation.cast::<f32>();
        let marker = Mat4::from_rotation_translation(&rotation, &translation);
        let scale = Mat4::new_scaling(transform.scale);
        let offset = Translation3::from(transform.offset).to_homogeneous();
        marker * scale * offset
    }

    fn projection(&mut self, intrinsics: &CameraIntrinsics) -> Mat4 {
        if let Some((cached, matrix)) = &self.projection {
            if cached == intrinsics {
                return *matrix;
            }
        }
        let matrix = intrinsics.projection_matrix();
        log::debug!("Built projection for {:?}", intrinsics.resolution());
        self.projection = Some((intrinsics.clone(), matrix));
        matrix
    }
}
