//! User-controlled model transform
//!
//! Scale, offset and the lighting toggle the user edits from the keyboard.
//! Knows nothing about the marker; the composer combines the two.

use crate::core::config::ControlsConfig;
use crate::foundation::math::{utils, Vec3};

/// Model-local axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    /// X
    X,
    /// Y
    Y,
    /// Z
    Z,
}

impl Axis {
    fn index(self) -> usize {
        match self {
            Self::X => 0,
            Self::Y => 1,
            Self::Z => 2,
        }
    }
}

/// Edits applied to the transform state
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TransformCommand {
    /// Add to the scale factor, saturating at the configured bounds
    ScaleBy(f32),
    /// Add to the offset along one axis
    TranslateBy(Axis, f32),
    /// Flip lighting for the model
    ToggleLighting,
    /// Back to the default state
    Reset,
}

/// Immutable snapshot of the user's transform
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformState {
    /// Uniform scale factor
    pub scale: f32,
    /// Offset in the scaled model frame
    pub offset: Vec3,
    /// Whether the model is drawn lit
    pub lighting_enabled: bool,
}

impl Default for TransformState {
    fn default() -> Self {
        Self {
            scale: 1.0,
            offset: Vec3::zeros(),
            lighting_enabled: true,
        }
    }
}

/// Owner of the live transform state
#[derive(Debug, Clone)]
pub struct TransformControls {
    state: TransformState,
    default: TransformState,
    min_scale: f32,
    max_scale: f32,
}

impl TransformControls {
    /// Controls bounded to `[min_scale, max_scale]`
    ///
    /// The default scale of 1.0 is clamped into the bounds as well, so
    /// `Reset` always lands inside them.
    pub fn new(min_scale: f32, max_scale: f32) -> Self {
        let default = TransformState {
            scale: utils::clamp(1.0, min_scale, max_scale),
            ..TransformState::default()
        };
        Self {
            state: default,
            default,
            min_scale,
            max_scale,
        }
    }

    /// Controls using the configured scale bounds
    pub fn from_config(config: &ControlsConfig) -> Self {
        Self::new(config.min_scale, config.max_scale)
    }

    /// Scale bounds
    pub fn scale_bounds(&self) -> (f32, f32) {
        (self.min_scale, self.max_scale)
    }

    /// Apply one command
    pub fn apply_command(&mut self, command: TransformCommand) {
        match command {
            TransformCommand::ScaleBy(delta) => {
                if !delta.is_finite() {
                    log::warn!("Ignoring non-finite scale delta {}", delta);
                    return;
                }
                self.state.scale =
                    utils::clamp(self.state.scale + delta, self.min_scale, self.max_scale);
                log::info!("Scale: {:.4}", self.state.scale);
            }
            TransformCommand::TranslateBy(axis, delta) => {
                if !delta.is_finite() {
                    log::warn!("Ignoring non-finite translation delta {}", delta);
                    return;
                }
                self.state.offset[axis.index()] += delta;
                log::info!(
                    "Translation {:?}: {:.3}",
                    axis,
                    self.state.offset[axis.index()]
                );
            }
            TransformCommand::ToggleLighting => {
                self.state.lighting_enabled = !self.state.lighting_enabled;
                log::info!(
                    "Lighting {}",
                    if self.state.lighting_enabled { "enabled" } else { "disabled" }
                );
            }
            TransformCommand::Reset => {
                self.state = self.default;
                log::info!("Reset to defaults");
            }
        }
    }

    /// Copy of the current state
    pub fn snapshot(&self) -> TransformState {
        self.state
    }
}

impl Default for TransformControls {
    fn default() -> Self {
        Self::from_config(&ControlsConfig::default())
    }
}
