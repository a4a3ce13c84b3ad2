//! Graphics backend seam
//!
//! Everything the pipeline needs from a 3D API: texture upload, cached draw
//! lists, a lighting toggle, the camera background and presentation. The
//! backend is not reentrant; it is driven from the orchestrator thread only.

use crate::assets::{MaterialAsset, ModelAsset, TexturePixels};
use crate::core::config::LightingConfig;
use crate::foundation::math::Mat4;
use crate::vision::Frame;

use super::RenderResult;

slotmap::new_key_type! {
    /// Handle to an uploaded texture
    pub struct TextureHandle;

    /// Handle to a compiled draw list (display list)
    pub struct DrawListHandle;
}

/// Retained/immediate-mode 3D submission
pub trait GraphicsBackend {
    /// Push light coefficients and position
    fn configure_lighting(&mut self, lighting: &LightingConfig) -> RenderResult<()>;

    /// Upload RGBA8 pixels
    fn upload_texture(&mut self, pixels: &TexturePixels) -> RenderResult<TextureHandle>;

    /// Free an uploaded texture; unknown handles are ignored
    fn release_texture(&mut self, handle: TextureHandle);

    /// Record a model's draw calls into a reusable list
    fn compile_draw_list(
        &mut self,
        model: &ModelAsset,
        materials: &[MaterialAsset],
    ) -> RenderResult<DrawListHandle>;

    /// Free a draw list; unknown handles are ignored
    fn release_draw_list(&mut self, handle: DrawListHandle);

    /// Current global lighting state
    fn lighting_enabled(&self) -> bool;

    /// Set the global lighting state
    fn set_lighting(&mut self, enabled: bool);

    /// Start a new frame
    fn begin_frame(&mut self) -> RenderResult<()>;

    /// Draw the camera image full screen behind everything else
    fn draw_background(&mut self, frame: &Frame) -> RenderResult<()>;

    /// Replay a draw list under `transform` (model-to-clip)
    fn call_draw_list(&mut self, handle: DrawListHandle, transform: &Mat4) -> RenderResult<()>;

    /// Present the frame begun by `begin_frame`
    fn present(&mut self) -> RenderResult<()>;

    /// Present the last presented image again
    fn present_previous(&mut self) -> RenderResult<()>;

    /// Drop the frame begun by `begin_frame` without presenting it
    fn discard_frame(&mut self);

    /// Whether `compile_draw_list` is available
    fn supports_draw_lists(&self) -> bool {
        true
    }

    /// Submit geometry directly, for backends without draw lists
    fn draw_immediate(
        &mut self,
        model: &ModelAsset,
        materials: &[MaterialAsset],
        transform: &Mat4,
    ) -> RenderResult<()>;
}
