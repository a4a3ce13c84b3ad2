//! Rendering
//!
//! The [`GraphicsBackend`] trait is the seam to the 3D API. [`RenderSubmitter`]
//! turns a final transform plus resident assets into backend calls, caching
//! one draw list per model and material set. [`RecordingBackend`] is a
//! headless backend that records what it was asked to do.

pub mod backend;
pub mod recording;
pub mod submitter;

pub use backend::{DrawListHandle, GraphicsBackend, TextureHandle};
pub use recording::{BackendCommand, FailurePoint, RecordingBackend, RenderState, SharedRecording};
pub use submitter::{DrawListKey, RenderSubmitter};

/// Rendering errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RenderError {
    /// Backend could not be set up
    #[error("Renderer initialization failed: {0}")]
    InitializationFailed(String),

    /// A draw or present call failed
    #[error("Rendering failed: {0}")]
    RenderingFailed(String),

    /// A texture or draw list could not be created
    #[error("Resource creation failed: {0}")]
    ResourceCreationFailed(String),

    /// The render target is gone
    #[error("Device lost: {0}")]
    DeviceLost(String),
}

/// Result type for rendering operations
pub type RenderResult<T> = Result<T, RenderError>;
