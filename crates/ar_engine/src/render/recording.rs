//! Headless graphics backend
//!
//! Keeps real handle bookkeeping (textures and draw lists live in slot maps)
//! and records every call instead of touching a GPU. Offline runs use it to
//! exercise the whole pipeline; tests assert on the recorded command stream
//! and on how many resources are still alive.

use std::cell::{Ref, RefCell, RefMut};
use std::collections::HashMap;
use std::rc::Rc;

use bitflags::bitflags;
use slotmap::SlotMap;

use crate::assets::{MaterialAsset, ModelAsset, TexturePixels};
use crate::core::config::LightingConfig;
use crate::foundation::math::Mat4;
use crate::vision::Frame;

use super::backend::{DrawListHandle, GraphicsBackend, TextureHandle};
use super::{RenderError, RenderResult};

bitflags! {
    /// Fixed-function state bits
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct RenderState: u8 {
        /// Lighting stage enabled
        const LIGHTING   = 1 << 0;
        /// Depth testing enabled
        const DEPTH_TEST = 1 << 1;
        /// 2D texturing enabled
        const TEXTURE_2D = 1 << 2;
    }
}

impl Default for RenderState {
    fn default() -> Self {
        Self::LIGHTING | Self::DEPTH_TEST | Self::TEXTURE_2D
    }
}

/// One recorded backend call
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCommand {
    /// Light parameters pushed
    ConfigureLighting,
    /// Texture uploaded
    UploadTexture {
        /// New handle
        handle: TextureHandle,
        /// Width in pixels
        width: u32,
        /// Height in pixels
        height: u32,
    },
    /// Texture freed
    ReleaseTexture(TextureHandle),
    /// Draw list compiled
    CompileDrawList {
        /// New handle
        handle: DrawListHandle,
        /// Model identifier
        identifier: String,
    },
    /// Draw list freed
    ReleaseDrawList(DrawListHandle),
    /// Global lighting switched
    SetLighting(bool),
    /// Frame started
    BeginFrame,
    /// Camera image drawn
    DrawBackground {
        /// Source frame index
        frame_index: u64,
        /// State in effect while drawing
        state: RenderState,
    },
    /// Draw list replayed
    CallDrawList {
        /// Draw list
        handle: DrawListHandle,
        /// Model-to-clip transform
        transform: Mat4,
        /// State in effect while drawing
        state: RenderState,
    },
    /// Geometry drawn without a draw list
    DrawImmediate {
        /// Model identifier
        identifier: String,
        /// Model-to-clip transform
        transform: Mat4,
        /// State in effect while drawing
        state: RenderState,
    },
    /// Frame presented
    Present,
    /// Previous image presented again
    PresentPrevious,
    /// Frame dropped
    DiscardFrame,
}

/// Calls that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailurePoint {
    /// `upload_texture`
    UploadTexture,
    /// `compile_draw_list`
    CompileDrawList,
    /// `call_draw_list` and `draw_immediate`
    Draw,
    /// `present` and `present_previous`
    Present,
}

/// Recording graphics backend
#[derive(Debug)]
pub struct RecordingBackend {
    textures: SlotMap<TextureHandle, (u32, u32)>,
    draw_lists: SlotMap<DrawListHandle, String>,
    state: RenderState,
    lighting: Option<LightingConfig>,
    frame_open: bool,
    frames_presented: u64,
    draw_lists_supported: bool,
    failures: HashMap<FailurePoint, usize>,
    commands: Vec<BackendCommand>,
    recording: bool,
}

impl Default for RecordingBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingBackend {
    /// Backend with draw-list support
    pub fn new() -> Self {
        Self {
            textures: SlotMap::with_key(),
            draw_lists: SlotMap::with_key(),
            state: RenderState::default(),
            lighting: None,
            frame_open: false,
            frames_presented: 0,
            draw_lists_supported: true,
            failures: HashMap::new(),
            commands: Vec::new(),
            recording: true,
        }
    }

    /// Backend that only supports immediate submission
    pub fn without_draw_lists() -> Self {
        Self {
            draw_lists_supported: false,
            ..Self::new()
        }
    }

    /// Backend that keeps handle bookkeeping and counters but no command log
    ///
    /// For long-running sessions where nothing reads the log.
    pub fn headless() -> Self {
        Self {
            recording: false,
            ..Self::new()
        }
    }

    /// Make `point` fail after `successes` more successful calls
    pub fn fail_at(&mut self, point: FailurePoint, successes: usize) {
        self.failures.insert(point, successes);
    }

    /// Everything recorded so far
    pub fn commands(&self) -> &[BackendCommand] {
        &self.commands
    }

    /// Drain the recorded commands
    pub fn take_commands(&mut self) -> Vec<BackendCommand> {
        std::mem::take(&mut self.commands)
    }

    /// Textures uploaded and not yet released
    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    /// Draw lists compiled and not yet released
    pub fn live_draw_lists(&self) -> usize {
        self.draw_lists.len()
    }

    /// Frames presented (including re-presents)
    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    /// Current fixed-function state
    pub fn state(&self) -> RenderState {
        self.state
    }

    /// Light parameters last pushed
    pub fn lighting_config(&self) -> Option<&LightingConfig> {
        self.lighting.as_ref()
    }

    fn check(&mut self, point: FailurePoint) -> RenderResult<()> {
        match self.failures.get_mut(&point) {
            Some(0) => Err(match point {
                FailurePoint::UploadTexture | FailurePoint::CompileDrawList => {
                    RenderError::ResourceCreationFailed(format!("injected failure at {point:?}"))
                }
                FailurePoint::Draw => RenderError::RenderingFailed("injected draw failure".into()),
                FailurePoint::Present => RenderError::DeviceLost("injected present failure".into()),
            }),
            Some(remaining) => {
                *remaining -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn record(&mut self, command: BackendCommand) {
        if self.recording {
            self.commands.push(command);
        }
    }

    fn require_frame(&self, call: &str) -> RenderResult<()> {
        if self.frame_open {
            Ok(())
        } else {
            Err(RenderError::RenderingFailed(format!("{call} outside of a frame")))
        }
    }
}

impl GraphicsBackend for RecordingBackend {
    fn configure_lighting(&mut self, lighting: &LightingConfig) -> RenderResult<()> {
        self.lighting = Some(lighting.clone());
        self.record(BackendCommand::ConfigureLighting);
        Ok(())
    }

    fn upload_texture(&mut self, pixels: &TexturePixels) -> RenderResult<TextureHandle> {
        self.check(FailurePoint::UploadTexture)?;
        let expected = pixels.width as usize * pixels.height as usize * 4;
        if pixels.rgba.len() != expected {
            return Err(RenderError::ResourceCreationFailed(format!(
                "texture {:?} has {} bytes, expected {}",
                pixels.path,
                pixels.rgba.len(),
                expected
            )));
        }

        let handle = self.textures.insert((pixels.width, pixels.height));
        self.record(BackendCommand::UploadTexture {
            handle,
            width: pixels.width,
            height: pixels.height,
        });
        Ok(handle)
    }

    fn release_texture(&mut self, handle: TextureHandle) {
        if self.textures.remove(handle).is_some() {
            self.record(BackendCommand::ReleaseTexture(handle));
        }
    }

    fn compile_draw_list(
        &mut self,
        model: &ModelAsset,
        materials: &[MaterialAsset],
    ) -> RenderResult<DrawListHandle> {
        if !self.draw_lists_supported {
            return Err(RenderError::ResourceCreationFailed(
                "draw lists not supported".to_string(),
            ));
        }
        self.check(FailurePoint::CompileDrawList)?;
        if let Some(texture) = materials
            .iter()
            .filter_map(|m| m.texture)
            .find(|t| !self.textures.contains_key(*t))
        {
            return Err(RenderError::ResourceCreationFailed(format!(
                "draw list references released texture {texture:?}"
            )));
        }

        let handle = self.draw_lists.insert(model.identifier().to_string());
        self.record(BackendCommand::CompileDrawList {
            handle,
            identifier: model.identifier().to_string(),
        });
        Ok(handle)
    }

    fn release_draw_list(&mut self, handle: DrawListHandle) {
        if self.draw_lists.remove(handle).is_some() {
            self.record(BackendCommand::ReleaseDrawList(handle));
        }
    }

    fn lighting_enabled(&self) -> bool {
        self.state.contains(RenderState::LIGHTING)
    }

    fn set_lighting(&mut self, enabled: bool) {
        self.state.set(RenderState::LIGHTING, enabled);
        self.record(BackendCommand::SetLighting(enabled));
    }

    fn begin_frame(&mut self) -> RenderResult<()> {
        if self.frame_open {
            return Err(RenderError::RenderingFailed(
                "begin_frame while a frame is open".to_string(),
            ));
        }
        self.frame_open = true;
        self.record(BackendCommand::BeginFrame);
        Ok(())
    }

    fn draw_background(&mut self, frame: &Frame) -> RenderResult<()> {
        self.require_frame("draw_background")?;
        let saved = self.state;
        self.state.remove(RenderState::DEPTH_TEST | RenderState::LIGHTING);
        self.state.insert(RenderState::TEXTURE_2D);
        self.record(BackendCommand::DrawBackground {
            frame_index: frame.index(),
            state: self.state,
        });
        self.state = saved;
        Ok(())
    }

    fn call_draw_list(&mut self, handle: DrawListHandle, transform: &Mat4) -> RenderResult<()> {
        self.require_frame("call_draw_list")?;
        self.check(FailurePoint::Draw)?;
        if !self.draw_lists.contains_key(handle) {
            return Err(RenderError::RenderingFailed(format!(
                "unknown draw list {handle:?}"
            )));
        }
        self.record(BackendCommand::CallDrawList {
            handle,
            transform: *transform,
            state: self.state,
        });
        Ok(())
    }

    fn present(&mut self) -> RenderResult<()> {
        self.require_frame("present")?;
        self.check(FailurePoint::Present)?;
        self.frame_open = false;
        self.frames_presented += 1;
        self.record(BackendCommand::Present);
        Ok(())
    }

    fn present_previous(&mut self) -> RenderResult<()> {
        self.check(FailurePoint::Present)?;
        self.frames_presented += 1;
        self.record(BackendCommand::PresentPrevious);
        Ok(())
    }

    fn discard_frame(&mut self) {
        if self.frame_open {
            self.frame_open = false;
            self.record(BackendCommand::DiscardFrame);
        }
    }

    fn supports_draw_lists(&self) -> bool {
        self.draw_lists_supported
    }

    fn draw_immediate(
        &mut self,
        model: &ModelAsset,
        _materials: &[MaterialAsset],
        transform: &Mat4,
    ) -> RenderResult<()> {
        self.require_frame("draw_immediate")?;
        self.check(FailurePoint::Draw)?;
        self.record(BackendCommand::DrawImmediate {
            identifier: model.identifier().to_string(),
            transform: *transform,
            state: self.state,
        });
        Ok(())
    }
}

/// A [`RecordingBackend`] that stays observable after being handed to the
/// pipeline; clones share the same backend
#[derive(Debug, Clone, Default)]
pub struct SharedRecording(Rc<RefCell<RecordingBackend>>);

impl SharedRecording {
    /// Share `backend`
    pub fn new(backend: RecordingBackend) -> Self {
        Self(Rc::new(RefCell::new(backend)))
    }

    /// Inspect the backend
    pub fn borrow(&self) -> Ref<'_, RecordingBackend> {
        self.0.borrow()
    }

    /// Reconfigure the backend
    pub fn borrow_mut(&self) -> RefMut<'_, RecordingBackend> {
        self.0.borrow_mut()
    }
}

impl GraphicsBackend for SharedRecording {
    fn configure_lighting(&mut self, lighting: &LightingConfig) -> RenderResult<()> {
        self.0.borrow_mut().configure_lighting(lighting)
    }

    fn upload_texture(&mut self, pixels: &TexturePixels) -> RenderResult<TextureHandle> {
        self.0.borrow_mut().upload_texture(pixels)
    }

    fn release_texture(&mut self, handle: TextureHandle) {
        self.0.borrow_mut().release_texture(handle);
    }

    fn compile_draw_list(
        &mut self,
        model: &ModelAsset,
        materials: &[MaterialAsset],
    ) -> RenderResult<DrawListHandle> {
        self.0.borrow_mut().compile_draw_list(model, materials)
    }

    fn release_draw_list(&mut self, handle: DrawListHandle) {
        self.0.borrow_mut().release_draw_list(handle);
    }

    fn lighting_enabled(&self) -> bool {
        self.0.borrow().lighting_enabled()
    }

    fn set_lighting(&mut self, enabled: bool) {
        self.0.borrow_mut().set_lighting(enabled);
    }

    fn begin_frame(&mut self) -> RenderResult<()> {
        self.0.borrow_mut().begin_frame()
    }

    fn draw_background(&mut self, frame: &Frame) -> RenderResult<()> {
        self.0.borrow_mut().draw_background(frame)
    }

    fn call_draw_list(&mut self, handle: DrawListHandle, transform: &Mat4) -> RenderResult<()> {
        self.0.borrow_mut().call_draw_list(handle, transform)
    }

    fn present(&mut self) -> RenderResult<()> {
        self.0.borrow_mut().present()
    }

    fn present_previous(&mut self) -> RenderResult<()> {
        self.0.borrow_mut().present_previous()
    }

    fn discard_frame(&mut self) {
        self.0.borrow_mut().discard_frame();
    }

    fn supports_draw_lists(&self) -> bool {
        self.0.borrow().supports_draw_lists()
    }

    fn draw_immediate(
        &mut self,
        model: &ModelAsset,
        materials: &[MaterialAsset],
        transform: &Mat4,
    ) -> RenderResult<()> {
        self.0.borrow_mut().draw_immediate(model, materials, transform)
    }
}
