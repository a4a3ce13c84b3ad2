//! AR pipeline orchestration
//!
//! One thread drives each frame strictly in order:
//!
//! ```text
//! drain commands -> acquire frame -> estimate pose -> cache lookup
//!     -> compose transform -> draw background (+ model) -> present
//! ```
//!
//! The model being displayed is pinned in the asset cache. A model switch
//! only records the requested identifier; the next frame's cache lookup loads
//! it, and only then is the previous model unpinned for good.

mod stats;

#[cfg(test)]
mod tests;

pub use stats::FrameStats;

use std::time::Duration;

use thiserror::Error;

use crate::assets::{AssetCache, AssetLoadError, CachedAsset, GeometryLoader, MaterialLoader};
use crate::core::config::{ApplicationConfig, ConfigError, LightingConfig};
use crate::foundation::time::{FramePacer, Timer};
use crate::input::{Command, CommandQueue, CommandSender};
use crate::render::{GraphicsBackend, RenderError, RenderSubmitter};
use crate::scene::{FinalTransform, SceneComposer, TransformControls, TransformState};
use crate::vision::{
    CalibrationMismatch, CameraIntrinsics, DetectionError, Frame, FramePoll, FrameSource,
    FrameSourceError, MarkerDetector, MarkerDictionary, MarkerPoseEstimator, PoseError,
};

/// Pipeline lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Built, not started
    Idle,
    /// Processing frames
    Running,
    /// Resources released; terminal
    ShuttingDown,
}

/// Pipeline errors
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The detection primitive faulted
    #[error("Detection backend error: {0}")]
    DetectionBackend(#[from] DetectionError),

    /// Frames do not match the camera calibration
    #[error(transparent)]
    CalibrationMismatch(#[from] CalibrationMismatch),

    /// A model could not be loaded and there is nothing to fall back to
    #[error(transparent)]
    AssetLoad(#[from] AssetLoadError),

    /// The render target is unusable
    #[error("Graphics backend error: {0}")]
    GraphicsBackend(#[from] RenderError),

    /// The camera is absent or faulted
    #[error("Frame source error: {0}")]
    FrameSource(#[from] FrameSourceError),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Operation not valid in the current state
    #[error("Pipeline is {actual:?}, expected {expected:?}")]
    InvalidState {
        /// State the operation needs
        expected: PipelineState,
        /// State the pipeline is in
        actual: PipelineState,
    },
}

impl From<PoseError> for PipelineError {
    fn from(error: PoseError) -> Self {
        match error {
            PoseError::CalibrationMismatch(e) => Self::CalibrationMismatch(e),
            PoseError::Detection(e) => Self::DetectionBackend(e),
        }
    }
}

/// What one iteration of the frame loop did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Background and model presented
    Rendered,
    /// Background presented, no usable marker
    NoMarker,
    /// Detection faulted; nothing drawn this frame
    DetectionFault,
    /// No frame in time; previous image presented again
    Timeout,
    /// Exit arrived mid-frame; the frame was dropped unpresented
    Aborted,
    /// Exit command processed before the frame started
    Stopped,
    /// The frame source ended
    Closed,
}

/// External collaborators the pipeline drives
pub struct Collaborators {
    /// Camera or file-backed frames
    pub frame_source: Box<dyn FrameSource>,
    /// Marker detection primitive
    pub detector: Box<dyn MarkerDetector>,
    /// Model geometry loader
    pub geometry_loader: Box<dyn GeometryLoader>,
    /// Material library loader
    pub material_loader: Box<dyn MaterialLoader>,
    /// 3D submission backend
    pub backend: Box<dyn GraphicsBackend>,
}

/// The frame loop and everything it owns
pub struct ArPipeline {
    state: PipelineState,
    source: Box<dyn FrameSource>,
    estimator: MarkerPoseEstimator,
    intrinsics: CameraIntrinsics,
    dictionary: MarkerDictionary,
    marker_size: f64,
    frame_timeout: Duration,
    lighting: LightingConfig,
    cache: AssetCache,
    composer: SceneComposer,
    submitter: RenderSubmitter,
    controls: TransformControls,
    commands: CommandQueue,
    requested_model: Option<String>,
    displayed_model: Option<String>,
    pacer: FramePacer,
    timer: Timer,
    stats: FrameStats,
}

impl ArPipeline {
    /// Build an idle pipeline
    ///
    /// `intrinsics` must describe the frames `collaborators.frame_source`
    /// delivers; that is checked by [`ArPipeline::start`].
    pub fn new(
        config: &ApplicationConfig,
        intrinsics: CameraIntrinsics,
        collaborators: Collaborators,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        let dictionary = config.marker.dictionary()?;

        let Collaborators {
            frame_source,
            detector,
            geometry_loader,
            material_loader,
            backend,
        } = collaborators;

        log::info!(
            "AR pipeline: {} markers of {} m, cache capacity {}, {} fps max",
            dictionary,
            config.marker.size,
            config.performance.asset_cache_capacity,
            config.performance.max_fps
        );

        Ok(Self {
            state: PipelineState::Idle,
            source: frame_source,
            estimator: MarkerPoseEstimator::from_config(detector, &config.marker),
            intrinsics,
            dictionary,
            marker_size: config.marker.size,
            frame_timeout: config.camera.frame_timeout(),
            lighting: config.lighting.clone(),
            cache: AssetCache::new(
                config.models.clone(),
                geometry_loader,
                material_loader,
                config.performance.asset_cache_capacity,
            ),
            composer: SceneComposer::new(),
            submitter: RenderSubmitter::new(backend),
            controls: TransformControls::from_config(&config.controls),
            commands: CommandQueue::new(),
            requested_model: None,
            displayed_model: None,
            pacer: FramePacer::new(config.performance.max_fps),
            timer: Timer::new(),
            stats: FrameStats::default(),
        })
    }

    /// Check calibration, set up lighting, load the first model, then run
    ///
    /// Any failure here is a startup failure: resources are released and
    /// the pipeline ends in `ShuttingDown` without ever running.
    pub fn start(&mut self, initial_model: &str) -> Result<(), PipelineError> {
        self.expect_state(PipelineState::Idle)?;
        log::info!("Starting AR pipeline with model '{}'", initial_model);

        if let Err(e) = self.prepare(initial_model) {
            log::error!("Startup failed: {}", e);
            self.stop();
            return Err(e);
        }

        self.state = PipelineState::Running;
        Ok(())
    }

    fn prepare(&mut self, initial_model: &str) -> Result<(), PipelineError> {
        let (width, height) = self.source.resolution();
        self.intrinsics.check_frame(width, height)?;

        self.submitter
            .backend_mut()
            .configure_lighting(&self.lighting)?;

        self.cache
            .get(initial_model, self.submitter.backend_mut())?;
        self.cache.pin(initial_model);
        self.requested_model = Some(initial_model.to_string());
        self.displayed_model = Some(initial_model.to_string());
        Ok(())
    }

    /// Apply a command immediately
    ///
    /// Transform edits take effect on the next composition; a model switch is
    /// picked up by the next frame's cache lookup; `Exit` stops the pipeline.
    pub fn handle_command(&mut self, command: Command) {
        match command {
            Command::Transform(command) => self.controls.apply_command(command),
            Command::SwitchModel(identifier) => {
                log::info!("Switching to model '{}'", identifier);
                self.requested_model = Some(identifier);
            }
            Command::Exit => {
                log::info!("Exit requested");
                self.stop();
            }
        }
    }

    /// Handle for producers on other threads
    pub fn command_sender(&self) -> CommandSender {
        self.commands.sender()
    }

    /// Run one frame
    pub fn run_frame(&mut self) -> Result<FrameOutcome, PipelineError> {
        self.expect_state(PipelineState::Running)?;
        self.pacer.begin_frame();

        for command in self.commands.drain() {
            self.handle_command(command);
        }
        if self.state != PipelineState::Running {
            return Ok(FrameOutcome::Stopped);
        }

        let frame = match self.source.next_frame(self.frame_timeout) {
            Ok(FramePoll::Frame(frame)) => frame,
            Ok(FramePoll::Timeout) => {
                self.stats.timeouts += 1;
                log::trace!("Frame timeout; presenting previous image");
                return match self.submitter.backend_mut().present_previous() {
                    Ok(()) => Ok(FrameOutcome::Timeout),
                    Err(e) => Err(self.fatal(e.into())),
                };
            }
            Ok(FramePoll::Closed) => {
                log::info!("Frame source closed");
                self.stop();
                return Ok(FrameOutcome::Closed);
            }
            Err(e) => return Err(self.fatal(e.into())),
        };
        self.stats.frames_processed += 1;

        let pose = match self.estimator.estimate(
            &frame,
            &self.intrinsics,
            self.marker_size,
            &self.dictionary,
        ) {
            Ok(pose) => pose,
            Err(PoseError::Detection(e)) => {
                self.stats.detection_faults += 1;
                log::warn!("Frame {}: {}", frame.index(), e);
                return Ok(FrameOutcome::DetectionFault);
            }
            Err(e) => return Err(self.fatal(e.into())),
        };
        if pose.is_some() {
            self.stats.frames_with_marker += 1;
        }

        let asset = match self.resolve_model() {
            Ok(asset) => asset,
            Err(e) => return Err(self.fatal(e)),
        };

        let snapshot = self.controls.snapshot();
        let transform = self
            .composer
            .compose(pose.as_ref(), &snapshot, &self.intrinsics);

        let outcome = match self.draw(&frame, transform.as_ref(), &asset, &snapshot) {
            Ok(outcome) => outcome,
            Err(e) => {
                self.submitter.backend_mut().discard_frame();
                return Err(self.fatal(e.into()));
            }
        };

        self.timer.update();
        Ok(outcome)
    }

    fn draw(
        &mut self,
        frame: &Frame,
        transform: Option<&FinalTransform>,
        asset: &CachedAsset,
        snapshot: &TransformState,
    ) -> Result<FrameOutcome, RenderError> {
        self.submitter.backend_mut().begin_frame()?;
        self.submitter.backend_mut().draw_background(frame)?;

        if let Some(transform) = transform {
            self.submitter.submit(
                transform,
                &asset.model,
                &asset.materials,
                snapshot.lighting_enabled,
            )?;
        }

        if self.commands.abort_requested() {
            self.submitter.backend_mut().discard_frame();
            self.stats.frames_discarded += 1;
            log::debug!("Frame {} dropped by exit request", frame.index());
            self.stop();
            return Ok(FrameOutcome::Aborted);
        }

        self.submitter.backend_mut().present()?;
        if transform.is_some() {
            self.stats.frames_rendered += 1;
            Ok(FrameOutcome::Rendered)
        } else {
            Ok(FrameOutcome::NoMarker)
        }
    }

    /// Cached asset for this frame, following a pending model switch
    fn resolve_model(&mut self) -> Result<CachedAsset, PipelineError> {
        if self.requested_model != self.displayed_model {
            if let Some(requested) = self.requested_model.clone() {
                self.switch_model(&requested)?;
            }
        }

        let Some(displayed) = self.displayed_model.clone() else {
            return Err(PipelineError::InvalidState {
                expected: PipelineState::Running,
                actual: self.state,
            });
        };
        let asset = self.cache.get(&displayed, self.submitter.backend_mut())?;
        for identifier in self.cache.take_evicted() {
            self.submitter.invalidate(&identifier);
        }
        Ok(asset)
    }

    fn switch_model(&mut self, requested: &str) -> Result<(), PipelineError> {
        let previous = self.displayed_model.clone();
        if let Some(previous) = &previous {
            self.cache.unpin(previous);
        }

        match self.cache.get(requested, self.submitter.backend_mut()) {
            Ok(_) => {
                self.cache.pin(requested);
                self.displayed_model = Some(requested.to_string());
                log::info!("Now displaying '{}'", requested);
                Ok(())
            }
            Err(e) => match previous {
                Some(previous) => {
                    log::warn!("{}; keeping '{}'", e, previous);
                    self.cache.pin(&previous);
                    self.requested_model = Some(previous);
                    Ok(())
                }
                None => Err(e.into()),
            },
        }
    }

    /// Run until the pipeline stops or `max_frames` frames have run
    pub fn run(&mut self, max_frames: Option<u64>) -> Result<FrameStats, PipelineError> {
        let mut iterations = 0u64;
        while self.state == PipelineState::Running {
            if max_frames.is_some_and(|max| iterations >= max) {
                break;
            }
            self.run_frame()?;
            iterations += 1;
            self.pacer.wait_for_next_frame();
        }
        Ok(self.stats)
    }

    /// Release every resource; safe to call any number of times
    pub fn stop(&mut self) {
        if self.state == PipelineState::ShuttingDown {
            return;
        }
        self.state = PipelineState::ShuttingDown;

        self.submitter.release_all();
        self.cache.release_all(self.submitter.backend_mut());
        self.estimator.release();
        self.source.release();

        log::info!("AR pipeline stopped: {}", self.stats);
        if self.timer.frame_count() > 0 {
            log::info!("Average frame rate: {:.1} fps", self.timer.average_fps());
        }
    }

    /// Change the asset cache capacity at runtime
    pub fn set_cache_capacity(&mut self, capacity: usize) {
        self.cache.configure(capacity, self.submitter.backend_mut());
        for identifier in self.cache.take_evicted() {
            self.submitter.invalidate(&identifier);
        }
    }

    fn fatal(&mut self, error: PipelineError) -> PipelineError {
        log::error!("{}", error);
        self.stop();
        error
    }

    fn expect_state(&self, expected: PipelineState) -> Result<(), PipelineError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(PipelineError::InvalidState {
                expected,
                actual: self.state,
            })
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Counters so far
    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    /// Model currently drawn
    pub fn displayed_model(&self) -> Option<&str> {
        self.displayed_model.as_deref()
    }

    /// Current user transform
    pub fn transform(&self) -> TransformState {
        self.controls.snapshot()
    }

    /// The asset cache
    pub fn cache(&self) -> &AssetCache {
        &self.cache
    }

    /// The render submitter
    pub fn submitter(&self) -> &RenderSubmitter {
        &self.submitter
    }
}

impl Drop for ArPipeline {
    fn drop(&mut self) {
        self.stop();
    }
}
