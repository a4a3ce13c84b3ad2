//! Scene composition
//!
//! [`TransformControls`] holds what the user edits; [`SceneComposer`] fuses it
//! with the marker pose and the camera projection into a [`FinalTransform`].

pub mod composer;
pub mod transform_state;

pub use composer::{FinalTransform, SceneComposer};
pub use transform_state::{Axis, TransformCommand, TransformControls, TransformState};
