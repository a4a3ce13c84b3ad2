//! # Core Engine Module
//!
//! Shared abstractions that the other subsystems depend on. Today that is the
//! unified configuration tree; foundation utilities are re-exported for
//! convenience.

pub mod config;

pub use crate::foundation;

pub use config::{
    ApplicationConfig, CameraConfig, Config, ConfigError, ControlsConfig, DisplayConfig,
    EngineConfig, LightingConfig, MarkerConfig, PerformanceConfig, ProjectionConfig,
};
