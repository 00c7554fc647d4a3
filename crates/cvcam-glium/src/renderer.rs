use std::fmt::{Debug, Formatter};
use std::rc::Rc;

use anyhow::{anyhow, Context as _};
use cvcam_core::{PixelFormat, SurfaceEvent};
use glium::backend::Context;
use glium::texture::{Dimensions, MipmapsOption, UncompressedFloatFormat};
use glium::uniforms::MagnifySamplerFilter;
use glium::{Frame, Surface, Texture2d};
use texture_cache::gl_texture::GlTextureBackend;
use texture_cache::{Renderer, TextureCache, TextureHandle};
use tracing::{debug, trace, warn};

use crate::gl_backend::HostGlBackend;
use crate::glsl::{best_glsl_version, GlslVersion};

fn glium_format(format: PixelFormat) -> UncompressedFloatFormat {
    match format {
        PixelFormat::Rgb8 | PixelFormat::Bgr8 => UncompressedFloatFormat::U8U8U8,
        PixelFormat::Bgra8 => UncompressedFloatFormat::U8U8U8U8,
        PixelFormat::Gray8 => UncompressedFloatFormat::U8,
    }
}

/// Draws the current cache texture into the host's default framebuffer,
/// stretched to the surface.
pub struct GliumRenderer {
    pub ctx: Rc<Context>,
    backend: Rc<HostGlBackend>,
    glsl: Option<GlslVersion>,
    surface: Option<(u32, u32)>,
}

impl Debug for GliumRenderer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GliumRenderer")
            .field("glsl", &self.glsl)
            .field("surface", &self.surface)
            .finish()
    }
}

impl GliumRenderer {
    /// Wrap the GL context that is current on this thread.
    ///
    /// # Safety
    ///
    /// A GL context must be current and stay current on this thread for
    /// every later call.
    pub unsafe fn new(size: (u32, u32)) -> anyhow::Result<Self> {
        let backend = Rc::new(HostGlBackend::new(size));
        let ctx = Context::new(
            backend.clone(),
            false,
            glium::debug::DebugCallbackBehavior::Ignore,
        )
        .map_err(|err| anyhow!("incompatible OpenGL context: {err:?}"))?;

        debug!("OPENGL_VERSION {}", ctx.get_opengl_version_string());
        let glsl = best_glsl_version(&*ctx);
        match glsl {
            Some(version) => debug!(?version, "GLSL target"),
            None => warn!("no supported GLSL version"),
        }

        Ok(Self {
            ctx,
            backend,
            glsl,
            surface: Some(size),
        })
    }

    pub fn glsl_version(&self) -> Option<GlslVersion> {
        self.glsl
    }
}

impl Renderer<GlTextureBackend> for GliumRenderer {
    fn draw_current(
        &mut self,
        cache: &TextureCache<GlTextureBackend>,
    ) -> anyhow::Result<Option<TextureHandle>> {
        let Some(size) = self.surface else {
            return Ok(None);
        };

        // The host may have touched GL state since the last draw.
        unsafe { self.ctx.rebuild(self.backend.clone()) }
            .map_err(|err| anyhow!("rebuilding glium context: {err:?}"))?;

        let drawn = cache.read_current(|handle, texture| -> anyhow::Result<TextureHandle> {
            let source = unsafe {
                Texture2d::from_id(
                    &self.ctx,
                    glium_format(handle.format),
                    texture.name(),
                    false,
                    MipmapsOption::NoMipmap,
                    Dimensions::Texture2d {
                        width: handle.width,
                        height: handle.height,
                    },
                )
            };

            let mut frame = Frame::new(self.ctx.clone(), size);
            frame.clear_color(0.0, 0.0, 0.0, 1.0);
            source.as_surface().fill(&frame, MagnifySamplerFilter::Linear);
            frame.finish().context("finishing frame")?;

            trace!(slot = handle.slot, sequence = handle.sequence, ?size, "drew texture");
            Ok(*handle)
        });

        drawn.transpose()
    }

    fn surface_event(&mut self, event: SurfaceEvent) {
        debug!(?event, "surface event");
        match event {
            SurfaceEvent::Created { width, height } | SurfaceEvent::Resized { width, height } => {
                self.backend.set_size((width, height));
                self.surface = Some((width, height));
            }
            SurfaceEvent::Destroyed => self.surface = None,
        }
    }
}
