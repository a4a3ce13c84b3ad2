//! # AR Engine
//!
//! Marker-based augmented reality: find a fiducial marker in each camera
//! frame, estimate its pose, and draw a cached 3D model on top of it.
//!
//! ## Features
//!
//! - **Pose Estimation**: homography-based marker pose with lens undistortion
//! - **Asset Caching**: bounded LRU cache of OBJ/MTL models with pinning
//! - **Scene Composition**: projection, pose and user transform in one matrix
//! - **Backend Agnostic**: drawing goes through the [`render::GraphicsBackend`] trait
//! - **Keyboard Control**: scale, offset, lighting and model switching
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ar_engine::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ApplicationConfig::load_from_file("ar.toml")?;
//!     let intrinsics = CameraIntrinsics::from_config(&config)?;
//!
//!     let collaborators = Collaborators {
//!         frame_source: Box::new(ImageSequenceSource::open("frames")?),
//!         detector: Box::new(ReplayDetector::from_file("frames/detections.ron")?),
//!         geometry_loader: Box::new(ObjLoader::new()),
//!         material_loader: Box::new(MtlLoader::new()),
//!         backend: Box::new(RecordingBackend::headless()),
//!     };
//!
//!     let mut pipeline = ArPipeline::new(&config, intrinsics, collaborators)?;
//!     pipeline.start("fox")?;
//!     let stats = pipeline.run(None)?;
//!     println!("{stats}");
//!     Ok(())
//! }
//! ```

pub mod core;

pub mod assets;
pub mod config;
pub mod foundation;
pub mod input;
pub mod pipeline;
pub mod render;
pub mod scene;
pub mod vision;

pub use pipeline::{ArPipeline, Collaborators, FrameOutcome, FrameStats, PipelineError, PipelineState};

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        assets::{
            AssetCache, GeometryLoader, MaterialLoader, ModelCatalog, ModelEntry, MtlLoader,
            ObjLoader,
        },
        config::Config,
        core::config::ApplicationConfig,
        foundation::math::{Mat4, Vec3},
        input::{Command, CommandSender, Key, KeyBindings},
        render::{GraphicsBackend, RecordingBackend, RenderError},
        scene::{FinalTransform, TransformCommand, TransformState},
        vision::{
            CameraIntrinsics, FrameSource, ImageSequenceSource, MarkerDetector, MarkerPose,
            ReplayDetector,
        },
        ArPipeline, Collaborators, FrameOutcome, FrameStats, PipelineError, PipelineState,
    };
}
