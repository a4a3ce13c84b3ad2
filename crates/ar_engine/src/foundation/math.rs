//! Math utilities and types
//!
//! Rendering math runs in `f32` (what the graphics backend consumes), vision
//! math runs in `f64` (the pose solve is the numerically sensitive step).

pub use nalgebra::{Matrix3, Matrix4, Point2, Vector2, Vector3, Vector4};

/// 3D vector type (render side)
pub type Vec3 = Vector3<f32>;

/// 4D vector type (render side)
pub type Vec4 = Vector4<f32>;

/// 3x3 matrix type (render side)
pub type Mat3 = Matrix3<f32>;

/// 4x4 matrix type (render side)
pub type Mat4 = Matrix4<f32>;

/// 2D vector type (vision side)
pub type Vec2d = Vector2<f64>;

/// 3D vector type (vision side)
pub type Vec3d = Vector3<f64>;

/// 3x3 matrix type (vision side)
pub type Mat3d = Matrix3<f64>;

/// 2D image point in pixels (vision side)
pub type Point2d = Point2<f64>;

/// Math constants
pub mod constants {
    /// Degrees to radians conversion factor
    pub const DEG_TO_RAD: f64 = std::f64::consts::PI / 180.0;
}

/// Math utility functions
pub mod utils {
    use super::constants;

    /// Convert degrees to radians
    pub fn deg_to_rad(degrees: f64) -> f64 {
        degrees * constants::DEG_TO_RAD
    }

    /// Clamp a value between min and max
    ///
    /// Unlike `f32::clamp` this never panics on an inverted range; the
    /// configuration layer rejects those before they get here.
    pub fn clamp(value: f32, min: f32, max: f32) -> f32 {
        if value < min {
            min
        } else if value > max {
            max
        } else {
            value
        }
    }

    /// Twice the signed area of the triangle `(a, b, c)`
    pub fn cross2(a: [f64; 2], b: [f64; 2], c: [f64; 2]) -> f64 {
        (b[0] - a[0]) * (c[1] - a[1]) - (b[1] - a[1]) * (c[0] - a[0])
    }
}

/// Extension trait for Mat4 with the transforms the AR pipeline needs
pub trait Mat4Ext {
    /// Build a rigid transform from a rotation and a translation
    fn from_rotation_translation(rotation: &Mat3, translation: &Vec3) -> Mat4;

    /// OpenGL-style projection built directly from pinhole intrinsics
    ///
    /// Maps camera-space points (render convention, looking down -Z) so that
    /// a point which projects to pixel `(u, v)` under the intrinsics lands on
    /// the same spot of a `width x height` viewport. Depth maps to [-1, 1].
    fn projection_from_intrinsics(
        fx: f64,
        fy: f64,
        cx: f64,
        cy: f64,
        width: f64,
        height: f64,
        near: f64,
        far: f64,
    ) -> Mat4;

    /// Axis flip from the vision camera frame (X right, Y down, Z forward)
    /// into the render camera frame (X right, Y up, looking down -Z)
    fn vision_to_render() -> Mat4;
}

impl Mat4Ext for Mat4 {
    fn from_rotation_translation(rotation: &Mat3, translation: &Vec3) -> Mat4 {
        let mut result = rotation.to_homogeneous();
        result[(0, 3)] = translation.x;
        result[(1, 3)] = translation.y;
        result[(2, 3)] = translation.z;
        result
    }

    fn projection_from_intrinsics(
        fx: f64,
        fy: f64,
        cx: f64,
        cy: f64,
        width: f64,
        height: f64,
        near: f64,
        far: f64,
    ) -> Mat4 {
        // Computed in f64 and narrowed once so repeated builds are bit-identical
        let mut p = Matrix4::<f64>::zeros();
        p[(0, 0)] = 2.0 * fx / width;
        p[(1, 1)] = 2.0 * fy / height;
        p[(0, 2)] = 1.0 - 2.0 * cx / width;
        p[(1, 2)] = 2.0 * cy / height - 1.0;
        p[(2, 2)] = -(far + near) / (far - near);
        p[(2, 3)] = -(2.0 * far * near) / (far - near);
        p[(3, 2)] = -1.0;
        p.cast::<f32>()
    }

    fn vision_to_render() -> Mat4 {
        Mat4::from_diagonal(&Vec4::new(1.0, -1.0, -1.0, 1.0))
    }
}
