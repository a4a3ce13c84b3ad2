//! # Unified Configuration System
//!
//! Every recognised option of the AR pipeline lives here, grouped by the
//! subsystem that reads it. The whole tree is built once at startup and passed
//! down by reference; nothing reads configuration from global state.
//!
//! ## Configuration Categories
//!
//! - **Engine**: logging
//! - **Display**: window size and title
//! - **Camera**: device index, frame timeout, calibration file
//! - **Marker**: physical size, dictionary, tracking policy
//! - **Projection**: field of view and clip planes
//! - **Performance**: frame-rate cap and asset cache capacity
//! - **Lighting**: light coefficients and position
//! - **Controls**: scale bounds and keyboard step sizes
//! - **Models**: the model catalogue

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub use crate::config::{Config, ConfigError};
use crate::assets::ModelCatalog;
use crate::vision::MarkerDictionary;

/// # Engine Configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Log level used when `RUST_LOG` is not set
    pub log_level: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// # Display Configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Window width in pixels; also the expected camera frame width
    pub window_width: u32,
    /// Window height in pixels; also the expected camera frame height
    pub window_height: u32,
    /// Window title
    pub window_title: String,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            window_width: 1280,
            window_height: 720,
            window_title: "AR Application".to_string(),
        }
    }
}

/// # Camera Configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Capture device index
    pub device_index: u32,
    /// How long a frame request may block before the previous frame is re-presented
    pub frame_timeout_ms: u64,
    /// Optional calibration file (TOML or RON with `matrix` and `dist_coeffs`)
    pub calibration_path: Option<PathBuf>,
}

impl CameraConfig {
    /// Frame acquisition timeout
    pub fn frame_timeout(&self) -> Duration {
        Duration::from_millis(self.frame_timeout_ms)
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device_index: 0,
            frame_timeout_ms: 50,
            calibration_path: None,
        }
    }
}

/// # Marker Configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkerConfig {
    /// Physical side length of the printed marker in metres
    pub size: f64,
    /// Dictionary name, e.g. `DICT_5X5_100`
    pub dictionary: String,
    /// Only track this marker id; `None` tracks the best detection of any id
    pub tracked_id: Option<u32>,
    /// Poses whose corner reprojection RMS exceeds this (pixels) are rejected
    pub max_reprojection_error: f64,
}

impl MarkerConfig {
    /// Parse the configured dictionary name
    pub fn dictionary(&self) -> Result<MarkerDictionary, ConfigError> {
        MarkerDictionary::from_str(&self.dictionary).map_err(ConfigError::Invalid)
    }
}

impl Default for MarkerConfig {
    fn default() -> Self {
        Self {
            size: 0.16,
            dictionary: "DICT_5X5_100".to_string(),
            tracked_id: None,
            max_reprojection_error: 4.0,
        }
    }
}

/// # Projection Configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectionConfig {
    /// Vertical field of view in degrees, used when no calibration is supplied
    pub fov_degrees: f64,
    /// Near clip plane distance
    pub near: f64,
    /// Far clip plane distance
    pub far: f64,
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self {
            fov_degrees: 37.0,
            near: 0.01,
            far: 1000.0,
        }
    }
}

/// # Performance Configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    /// Frame-rate cap for the main loop
    pub max_fps: u32,
    /// Maximum number of models resident in the asset cache
    pub asset_cache_capacity: usize,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            max_fps: 60,
            asset_cache_capacity: 50,
        }
    }
}

/// # Lighting Configuration
///
/// RGBA coefficients for the single scene light, plus its homogeneous position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightingConfig {
    /// Ambient light colour
    pub ambient: [f32; 4],
    /// Diffuse light colour
    pub diffuse: [f32; 4],
    /// Specular light colour
    pub specular: [f32; 4],
    /// Light position (w = 1 for a point light, 0 for directional)
    pub position: [f32; 4],
}

impl Default for LightingConfig {
    fn default() -> Self {
        Self {
            ambient: [0.3, 0.3, 0.3, 1.0],
            diffuse: [0.8, 0.8, 0.8, 1.0],
            specular: [0.6, 0.6, 0.6, 1.0],
            position: [0.0, 0.0, 10.0, 1.0],
        }
    }
}

/// # Controls Configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlsConfig {
    /// Lower bound for the user scale factor
    pub min_scale: f32,
    /// Upper bound for the user scale factor
    pub max_scale: f32,
    /// Scale delta applied per scale key press
    pub scale_step: f32,
    /// Offset delta applied per movement key press
    pub translate_step: f32,
}

impl Default for ControlsConfig {
    fn default() -> Self {
        Self {
            min_scale: 0.1,
            max_scale: 10.0,
            scale_step: 0.1,
            translate_step: 0.01,
        }
    }
}

/// # Complete Application Configuration
///
/// Top-level configuration that encompasses all pipeline subsystems.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Engine core configuration
    pub engine: EngineConfig,
    /// Display configuration
    pub display: DisplayConfig,
    /// Camera configuration
    pub camera: CameraConfig,
    /// Marker configuration
    pub marker: MarkerConfig,
    /// Projection configuration
    pub projection: ProjectionConfig,
    /// Performance configuration
    pub performance: PerformanceConfig,
    /// Lighting configuration
    pub lighting: LightingConfig,
    /// Controls configuration
    pub controls: ControlsConfig,
    /// Model catalogue
    pub models: ModelCatalog,
}

impl ApplicationConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.display.window_width == 0 || self.display.window_height == 0 {
            return Err(ConfigError::Invalid("Window size must be non-zero".to_string()));
        }

        if !(self.marker.size.is_finite() && self.marker.size > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "Marker size must be positive, got {}",
                self.marker.size
            )));
        }
        self.marker.dictionary()?;
        if !(self.marker.max_reprojection_error > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "max_reprojection_error must be positive, got {}",
                self.marker.max_reprojection_error
            )));
        }

        let projection = &self.projection;
        let planes_ordered = projection.near > 0.0 && projection.near < projection.far;
        if !(planes_ordered && projection.far.is_finite()) {
            return Err(ConfigError::Invalid(format!(
                "Clip planes must satisfy 0 < near < far, got near={} far={}",
                projection.near, projection.far
            )));
        }
        if !(projection.fov_degrees > 0.0 && projection.fov_degrees < 180.0) {
            return Err(ConfigError::Invalid(format!(
                "Field of view must be within (0, 180) degrees, got {}",
                projection.fov_degrees
            )));
        }

        if self.performance.max_fps == 0 {
            return Err(ConfigError::Invalid("max_fps must be at least 1".to_string()));
        }
        if self.performance.asset_cache_capacity == 0 {
            return Err(ConfigError::Invalid(
                "asset_cache_capacity must be at least 1".to_string(),
            ));
        }

        let controls = &self.controls;
        if !(controls.min_scale > 0.0 && controls.min_scale <= controls.max_scale) {
            return Err(ConfigError::Invalid(format!(
                "Scale bounds must satisfy 0 < min_scale <= max_scale, got [{}, {}]",
                controls.min_scale, controls.max_scale
            )));
        }

        Ok(())
    }
}

impl Config for ApplicationConfig {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ApplicationConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.performance.max_fps, 60);
        assert_eq!(config.performance.asset_cache_capacity, 50);
        assert_eq!(config.marker.size, 0.16);
    }

    #[test]
    fn test_rejects_inverted_clip_planes() {
        let mut config = ApplicationConfig::default();
        config.projection.near = 10.0;
        config.projection.far = 1.0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        config.projection.near = 0.01;
        config.projection.far = f64::INFINITY;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_rejects_non_positive_reprojection_error() {
        for bad in [0.0, -1.0, f64::NAN] {
            let mut config = ApplicationConfig::default();
            config.marker.max_reprojection_error = bad;
            assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))), "{bad}");
        }
    }

    #[test]
    fn test_rejects_bad_scale_bounds() {
        let mut config = ApplicationConfig::default();
        config.controls.min_scale = 3.0;
        config.controls.max_scale = 2.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_unknown_dictionary() {
        let mut config = ApplicationConfig::default();
        config.marker.dictionary = "DICT_BOGUS".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ar.toml");
        std::fs::write(&path, "[marker]\nsize = 0.05\n\n[performance]\nmax_fps = 30\n").unwrap();

        let config = ApplicationConfig::load_from_file(&path).unwrap();
        assert_eq!(config.marker.size, 0.05);
        assert_eq!(config.performance.max_fps, 30);
        assert_eq!(config.performance.asset_cache_capacity, 50);
        assert_eq!(config.projection, ProjectionConfig::default());
    }

    #[test]
    fn test_ron_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ar.ron");
        let mut config = ApplicationConfig::default();
        config.controls.max_scale = 2.0;

        config.save_to_file(&path).unwrap();
        let loaded = ApplicationConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_unsupported_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ar.yaml");
        std::fs::write(&path, "marker: {}").unwrap();
        assert!(matches!(
            ApplicationConfig::load_from_file(&path),
            Err(ConfigError::UnsupportedFormat(_))
        ));
    }
}
