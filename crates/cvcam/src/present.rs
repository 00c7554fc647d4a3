//! Render side: drive a [`Renderer`] against the shared cache.

use std::sync::Arc;

use cvcam_core::SurfaceEvent;
use texture_cache::{Renderer, TextureBackend, TextureCache, TextureHandle};
use tracing::{debug, trace};

/// Owns a renderer and the cache it draws from, and keeps the cache in step
/// with the surface lifecycle.
pub struct Presenter<R, B: TextureBackend> {
    renderer: R,
    cache: Arc<TextureCache<B>>,
    frames_drawn: u64,
    last_sequence: Option<u64>,
}

impl<R, B> Presenter<R, B>
where
    R: Renderer<B>,
    B: TextureBackend,
{
    pub fn new(renderer: R, cache: Arc<TextureCache<B>>) -> Self {
        Self {
            renderer,
            cache,
            frames_drawn: 0,
            last_sequence: None,
        }
    }

    /// Draw the current texture. `Ok(false)` when nothing was drawn.
    pub fn present(&mut self) -> anyhow::Result<bool> {
        let Some(handle) = self.renderer.draw_current(&self.cache)? else {
            return Ok(false);
        };
        self.frames_drawn += 1;
        self.last_sequence = Some(handle.sequence);
        Ok(true)
    }

    /// Forward `event` to the renderer. On [`SurfaceEvent::Destroyed`] every
    /// cached texture is invalidated as well.
    pub fn surface_event(&mut self, event: SurfaceEvent) {
        self.renderer.surface_event(event);
        if event.invalidates_textures() {
            debug!("surface destroyed, invalidating texture cache");
            self.cache.invalidate_all();
            self.last_sequence = None;
        }
    }

    pub fn frames_drawn(&self) -> u64 {
        self.frames_drawn
    }

    pub fn last_sequence(&self) -> Option<u64> {
        self.last_sequence
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn cache(&self) -> &Arc<TextureCache<B>> {
        &self.cache
    }
}

/// Renderer without a surface: samples the current texture and records
/// what it would have drawn.
#[derive(Debug, Default)]
pub struct HeadlessRenderer {
    surface: Option<(u32, u32)>,
    last: Option<TextureHandle>,
}

impl HeadlessRenderer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            surface: Some((width, height)),
            last: None,
        }
    }

    pub fn surface_size(&self) -> Option<(u32, u32)> {
        self.surface
    }

    /// Handle of the last texture drawn.
    pub fn last_drawn(&self) -> Option<TextureHandle> {
        self.last
    }
}

impl<B: TextureBackend> Renderer<B> for HeadlessRenderer {
    fn draw_current(&mut self, cache: &TextureCache<B>) -> anyhow::Result<Option<TextureHandle>> {
        if self.surface.is_none() {
            return Ok(None);
        }
        let drawn = cache.read_current(|handle, _| *handle);
        if let Some(handle) = drawn {
            trace!(slot = handle.slot, sequence = handle.sequence, "headless draw");
            self.last = Some(handle);
        }
        Ok(drawn)
    }

    fn surface_event(&mut self, event: SurfaceEvent) {
        self.surface = event.size();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cvcam_core::{PixelFormat, ProcessedImage};
    use texture_cache::HostBackend;

    #[test]
    fn destroyed_surface_invalidates_cache() {
        let cache = Arc::new(TextureCache::new(HostBackend::new()));
        let mut presenter = Presenter::new(HeadlessRenderer::new(64, 64), cache.clone());
        assert!(!presenter.present().unwrap());

        cache
            .publish(ProcessedImage::filled(2, 2, PixelFormat::Rgb8, 1))
            .unwrap();
        assert!(presenter.present().unwrap());
        assert_eq!(presenter.last_sequence(), Some(0));

        presenter.surface_event(SurfaceEvent::Destroyed);
        assert!(cache.current_texture().is_none());
        assert_eq!(cache.resident_images(), 0);
        assert!(!presenter.present().unwrap());

        presenter.surface_event(SurfaceEvent::Created { width: 32, height: 32 });
        cache
            .publish(ProcessedImage::filled(2, 2, PixelFormat::Rgb8, 2))
            .unwrap();
        assert!(presenter.present().unwrap());
        assert_eq!(presenter.renderer().surface_size(), Some((32, 32)));
        assert_eq!(presenter.last_sequence(), Some(1));
        assert_eq!(presenter.frames_drawn(), 2);
    }

    /// Publishes a newer image right after drawing, the way a producer
    /// thread can between a draw and the presenter's bookkeeping.
    struct RacingRenderer;

    impl Renderer<HostBackend> for RacingRenderer {
        fn draw_current(
            &mut self,
            cache: &TextureCache<HostBackend>,
        ) -> anyhow::Result<Option<TextureHandle>> {
            let drawn = cache.read_current(|handle, _| *handle);
            cache.publish(ProcessedImage::filled(2, 2, PixelFormat::Rgb8, 9))?;
            Ok(drawn)
        }

        fn surface_event(&mut self, _event: SurfaceEvent) {}
    }

    #[test]
    fn last_sequence_is_the_drawn_texture() {
        let cache = Arc::new(TextureCache::new(HostBackend::new()));
        cache
            .publish(ProcessedImage::filled(2, 2, PixelFormat::Rgb8, 1))
            .unwrap();
        let mut presenter = Presenter::new(RacingRenderer, cache.clone());

        assert!(presenter.present().unwrap());
        assert_eq!(presenter.last_sequence(), Some(0));
        assert_eq!(cache.current_texture().unwrap().sequence, 1);
    }
}
