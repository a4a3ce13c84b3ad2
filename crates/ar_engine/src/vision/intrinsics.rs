//! Pinhole camera intrinsics and lens distortion

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{Config, ConfigError};
use crate::core::config::{ApplicationConfig, ProjectionConfig};
use crate::foundation::math::{utils, Mat3d, Mat4, Mat4Ext, Point2d, Vec2d, Vec3d};

/// Frame resolution does not match what the intrinsics were built for
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Calibration mismatch: intrinsics are for {expected:?}, frame is {actual:?}")]
pub struct CalibrationMismatch {
    /// Resolution the intrinsics describe
    pub expected: (u32, u32),
    /// Resolution of the offending frame
    pub actual: (u32, u32),
}

/// Brown-Conrady distortion coefficients in OpenCV order
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[allow(missing_docs)]
pub struct Distortion {
    pub k1: f64,
    pub k2: f64,
    pub p1: f64,
    pub p2: f64,
    pub k3: f64,
}

impl Distortion {
    /// Build from an OpenCV coefficient list `[k1, k2, p1, p2, k3, ...]`
    ///
    /// Missing trailing entries are zero. Rational and thin-prism terms
    /// beyond `k3` are ignored.
    pub fn from_coefficients(coeffs: &[f64]) -> Self {
        let at = |i: usize| coeffs.get(i).copied().unwrap_or(0.0);
        if coeffs.len() > 5 {
            log::warn!(
                "Ignoring {} distortion coefficients beyond k3",
                coeffs.len() - 5
            );
        }
        Self {
            k1: at(0),
            k2: at(1),
            p1: at(2),
            p2: at(3),
            k3: at(4),
        }
    }

    /// Whether every coefficient is zero
    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }

    /// Apply the forward model to a normalized point
    pub fn distort(&self, p: Vec2d) -> Vec2d {
        let (x, y) = (p.x, p.y);
        let r2 = x * x + y * y;
        let radial = 1.0 + r2 * (self.k1 + r2 * (self.k2 + r2 * self.k3));
        Vec2d::new(
            x * radial + 2.0 * self.p1 * x * y + self.p2 * (r2 + 2.0 * x * x),
            y * radial + self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * x * y,
        )
    }

    /// Invert the forward model by fixed-point iteration
    pub fn undistort(&self, distorted: Vec2d) -> Vec2d {
        const ITERATIONS: usize = 20;

        if self.is_zero() {
            return distorted;
        }

        let mut p = distorted;
        for _ in 0..ITERATIONS {
            let (x, y) = (p.x, p.y);
            let r2 = x * x + y * y;
            let inv_radial = 1.0 / (1.0 + r2 * (self.k1 + r2 * (self.k2 + r2 * self.k3)));
            let dx = 2.0 * self.p1 * x * y + self.p2 * (r2 + 2.0 * x * x);
            let dy = self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * x * y;
            let next = Vec2d::new((distorted.x - dx) * inv_radial, (distorted.y - dy) * inv_radial);
            if !(next.x.is_finite() && next.y.is_finite()) {
                break;
            }
            p = next;
        }
        p
    }
}

/// Calibration file contents
///
/// ```toml
/// matrix = [[900.0, 0.0, 640.0], [0.0, 900.0, 360.0], [0.0, 0.0, 1.0]]
/// dist_coeffs = [0.1, -0.05, 0.0, 0.0, 0.0]
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationFile {
    /// Row-major 3x3 camera matrix
    pub matrix: [[f64; 3]; 3],
    /// OpenCV distortion coefficients
    pub dist_coeffs: Vec<f64>,
}

impl Default for CalibrationFile {
    fn default() -> Self {
        Self {
            matrix: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            dist_coeffs: Vec::new(),
        }
    }
}

impl Config for CalibrationFile {}

/// Intrinsic camera parameters for one frame resolution
#[derive(Debug, Clone, PartialEq)]
pub struct CameraIntrinsics {
    fx: f64,
    fy: f64,
    cx: f64,
    cy: f64,
    distortion: Distortion,
    width: u32,
    height: u32,
    near: f64,
    far: f64,
}

impl CameraIntrinsics {
    /// Distortion-free intrinsics from a vertical field of view
    ///
    /// Principal point at the image centre, square pixels.
    pub fn from_fov(width: u32, height: u32, fov_degrees: f64, near: f64, far: f64) -> Self {
        let fy = f64::from(height) * 0.5 / (utils::deg_to_rad(fov_degrees) * 0.5).tan();
        Self {
            fx: fy,
            fy,
            cx: f64::from(width) * 0.5,
            cy: f64::from(height) * 0.5,
            distortion: Distortion::default(),
            width,
            height,
            near,
            far,
        }
    }

    /// Intrinsics from an explicit calibration
    pub fn from_calibration(
        calibration: &CalibrationFile,
        width: u32,
        height: u32,
        near: f64,
        far: f64,
    ) -> Result<Self, ConfigError> {
        let m = calibration.matrix;
        let (fx, fy, cx, cy) = (m[0][0], m[1][1], m[0][2], m[1][2]);
        if !(fx.is_finite() && fy.is_finite() && fx > 0.0 && fy > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "Camera matrix focal lengths must be positive, got fx={fx} fy={fy}"
            )));
        }
        if !(cx.is_finite() && cy.is_finite()) {
            return Err(ConfigError::Invalid("Camera matrix principal point is not finite".into()));
        }
        if calibration.dist_coeffs.iter().any(|c| !c.is_finite()) {
            return Err(ConfigError::Invalid("Distortion coefficients must be finite".into()));
        }

        Ok(Self {
            fx,
            fy,
            cx,
            cy,
            distortion: Distortion::from_coefficients(&calibration.dist_coeffs),
            width,
            height,
            near,
            far,
        })
    }

    /// Resolve intrinsics for the configured display size
    ///
    /// Loads the calibration file when one is configured, otherwise derives
    /// them from the projection field of view.
    pub fn from_config(config: &ApplicationConfig) -> Result<Self, ConfigError> {
        let (width, height) = (config.display.window_width, config.display.window_height);
        let ProjectionConfig {
            fov_degrees,
            near,
            far,
        } = config.projection;

        match &config.camera.calibration_path {
            Some(path) => {
                let calibration = CalibrationFile::load_from_file(path)?;
                log::info!("Loaded camera calibration from {:?}", path);
                Self::from_calibration(&calibration, width, height, near, far)
            }
            None => {
                log::info!("No calibration file; using {fov_degrees} degree field of view");
                Ok(Self::from_fov(width, height, fov_degrees, near, far))
            }
        }
    }

    /// Frame resolution these intrinsics describe
    pub fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Check a frame resolution against the calibration
    pub fn check_frame(&self, width: u32, height: u32) -> Result<(), CalibrationMismatch> {
        if (width, height) == (self.width, self.height) {
            Ok(())
        } else {
            Err(CalibrationMismatch {
                expected: self.resolution(),
                actual: (width, height),
            })
        }
    }

    /// The 3x3 camera matrix
    pub fn camera_matrix(&self) -> Mat3d {
        Mat3d::new(self.fx, 0.0, self.cx, 0.0, self.fy, self.cy, 0.0, 0.0, 1.0)
    }

    /// Lens distortion
    pub fn distortion(&self) -> &Distortion {
        &self.distortion
    }

    /// Near and far clip distances
    pub fn clip_planes(&self) -> (f64, f64) {
        (self.near, self.far)
    }

    /// Render projection matching these intrinsics
    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::projection_from_intrinsics(
            self.fx,
            self.fy,
            self.cx,
            self.cy,
            f64::from(self.width),
            f64::from(self.height),
            self.near,
            self.far,
        )
    }

    /// Pixel to undistorted normalized image coordinates
    pub fn normalize(&self, pixel: Point2d) -> Vec2d {
        let distorted = Vec2d::new((pixel.x - self.cx) / self.fx, (pixel.y - self.cy) / self.fy);
        self.distortion.undistort(distorted)
    }

    /// Project a camera-space point to pixels, applying distortion
    ///
    /// Returns `None` for points on or behind the image plane.
    pub fn project(&self, point: &Vec3d) -> Option<Point2d> {
        if point.z <= f64::EPSILON {
            return None;
        }
        let d = self.distortion.distort(Vec2d::new(point.x / point.z, point.y / point.z));
        Some(Point2d::new(self.fx * d.x + self.cx, self.fy * d.y + self.cy))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn calibrated() -> CameraIntrinsics {
        let calibration = CalibrationFile {
            matrix: [[900.0, 0.0, 630.0], [0.0, 880.0, 370.0], [0.0, 0.0, 1.0]],
            dist_coeffs: vec![-0.12, 0.05, 0.001, -0.0005, 0.0],
        };
        CameraIntrinsics::from_calibration(&calibration, 1280, 720, 0.01, 100.0).unwrap()
    }

    #[test]
    fn test_fov_intrinsics_centre_principal_point() {
        let k = CameraIntrinsics::from_fov(1280, 720, 37.0, 0.01, 1000.0);
        let m = k.camera_matrix();
        assert_relative_eq!(m[(0, 2)], 640.0);
        assert_relative_eq!(m[(1, 2)], 360.0);
        assert_relative_eq!(m[(0, 0)], m[(1, 1)]);
        // Top edge of the image sits at half the field of view
        let half = utils::deg_to_rad(18.5).tan();
        let top = k.project(&Vec3d::new(0.0, -half, 1.0)).unwrap();
        assert_relative_eq!(top.y, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_undistort_inverts_distort() {
        let k = calibrated();
        let camera_point = Vec3d::new(0.21, -0.13, 1.0);
        let pixel = k.project(&camera_point).unwrap();
        let normalized = k.normalize(pixel);
        assert_relative_eq!(normalized.x, 0.21, epsilon = 1e-9);
        assert_relative_eq!(normalized.y, -0.13, epsilon = 1e-9);
    }

    #[test]
    fn test_check_frame() {
        let k = calibrated();
        assert!(k.check_frame(1280, 720).is_ok());
        assert_eq!(
            k.check_frame(640, 480),
            Err(CalibrationMismatch {
                expected: (1280, 720),
                actual: (640, 480),
            })
        );
    }

    #[test]
    fn test_rejects_non_positive_focal_length() {
        let calibration = CalibrationFile {
            matrix: [[0.0, 0.0, 640.0], [0.0, 900.0, 360.0], [0.0, 0.0, 1.0]],
            dist_coeffs: vec![],
        };
        assert!(CameraIntrinsics::from_calibration(&calibration, 1280, 720, 0.01, 100.0).is_err());
    }

    #[test]
    fn test_calibration_file_requires_both_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("calib.toml");
        std::fs::write(&path, "matrix = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]\n")
            .unwrap();
        assert!(matches!(
            CalibrationFile::load_from_file(&path),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_from_config_prefers_calibration_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("calib.ron");
        let calibration = CalibrationFile {
            matrix: [[1000.0, 0.0, 640.0], [0.0, 1000.0, 360.0], [0.0, 0.0, 1.0]],
            dist_coeffs: vec![0.0; 5],
        };
        calibration.save_to_file(&path).unwrap();

        let mut config = ApplicationConfig::default();
        config.camera.calibration_path = Some(path);
        let k = CameraIntrinsics::from_config(&config).unwrap();
        assert_relative_eq!(k.camera_matrix()[(0, 0)], 1000.0);
        assert_eq!(k.resolution(), (1280, 720));
    }
}
