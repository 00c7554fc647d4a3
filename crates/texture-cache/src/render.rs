//! Render-side boundary of the cache.

use cvcam_core::SurfaceEvent;

use crate::backend::TextureBackend;
use crate::cache::{TextureCache, TextureHandle};

/// Something that draws the cache's current texture onto a surface.
pub trait Renderer<B: TextureBackend> {
    /// Draw the current texture and return the handle that was drawn.
    /// `None` when nothing has been published yet, or there is no surface
    /// to draw on.
    fn draw_current(&mut self, cache: &TextureCache<B>) -> anyhow::Result<Option<TextureHandle>>;

    /// Surface lifecycle notification. Texture invalidation on
    /// [`SurfaceEvent::Destroyed`] is done by the caller, not the renderer.
    fn surface_event(&mut self, event: SurfaceEvent);
}
