//! [`GlTextureBackend`]: `TexImage2D` storage plus `TexSubImage2D` uploads,
//! fenced so an upload is complete before the cache publishes it.

use std::ffi::c_void;
use std::ptr;

use cvcam_core::{PixelFormat, ProcessedImage};
use gl::types::{GLenum, GLint, GLsizei, GLuint};
use tracing::{debug, error};

use crate::backend::{BackendError, TextureBackend};

const NAME: &str = "gl";

/// Drain `glGetError`, logging every pending error. Returns the first one.
pub fn check_gl_error(what: &str) -> Result<(), BackendError> {
    let mut first = None;
    loop {
        let code = unsafe { gl::GetError() };
        if code == gl::NO_ERROR {
            break;
        }
        error!("GL error 0x{code:04X} after {what}");
        if first.is_none() {
            first = Some(code);
        }
    }
    match first {
        Some(code) => Err(BackendError::new(NAME, format!("GL error 0x{code:04X} after {what}"))
            .with_code(code)),
        None => Ok(()),
    }
}

/// `(internal format, pixel format)` for a [`PixelFormat`].
fn gl_formats(format: PixelFormat) -> (GLenum, GLenum) {
    match format {
        PixelFormat::Rgb8 => (gl::RGB8, gl::RGB),
        PixelFormat::Bgr8 => (gl::RGB8, gl::BGR),
        PixelFormat::Bgra8 => (gl::RGBA8, gl::BGRA),
        PixelFormat::Gray8 => (gl::R8, gl::RED),
    }
}

/// A GL texture name with the geometry it was allocated with.
#[derive(Debug)]
pub struct GlTexture {
    name: GLuint,
    width: u32,
    height: u32,
    format: PixelFormat,
}

impl GlTexture {
    pub fn name(&self) -> GLuint {
        self.name
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }
}

/// Allocates and uploads `GL_TEXTURE_2D` textures.
///
/// Every call must happen with the target GL context current. Function
/// pointers must already be loaded (e.g. by `cvcam-glium`).
#[derive(Debug)]
pub struct GlTextureBackend {
    filter: GLenum,
}

impl Default for GlTextureBackend {
    fn default() -> Self {
        Self::new(true)
    }
}

impl GlTextureBackend {
    /// `bilinear` selects `GL_LINEAR` over `GL_NEAREST` sampling.
    pub fn new(bilinear: bool) -> Self {
        Self {
            filter: if bilinear { gl::LINEAR } else { gl::NEAREST },
        }
    }

    fn wait_for_upload() {
        unsafe {
            let fence = gl::FenceSync(gl::SYNC_GPU_COMMANDS_COMPLETE, 0);
            if fence.is_null() {
                gl::Finish();
                return;
            }
            gl::ClientWaitSync(fence, gl::SYNC_FLUSH_COMMANDS_BIT, u64::MAX);
            gl::DeleteSync(fence);
        }
    }
}

impl TextureBackend for GlTextureBackend {
    type Texture = GlTexture;

    fn name(&self) -> &'static str {
        NAME
    }

    fn allocate(
        &mut self,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<GlTexture, BackendError> {
        let (internal, pixel) = gl_formats(format);
        // Stale errors from the host would otherwise be blamed on us.
        while unsafe { gl::GetError() } != gl::NO_ERROR {}

        let mut name: GLuint = 0;
        unsafe {
            gl::GenTextures(1, &mut name);
            gl::BindTexture(gl::TEXTURE_2D, name);
            gl::TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_MIN_FILTER, self.filter as GLint);
            gl::TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_MAG_FILTER, self.filter as GLint);
            gl::TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_WRAP_S, gl::CLAMP_TO_EDGE as GLint);
            gl::TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_WRAP_T, gl::CLAMP_TO_EDGE as GLint);
            if format == PixelFormat::Gray8 {
                gl::TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_SWIZZLE_G, gl::RED as GLint);
                gl::TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_SWIZZLE_B, gl::RED as GLint);
            }
            gl::TexImage2D(
                gl::TEXTURE_2D,
                0,
                internal as GLint,
                width as GLsizei,
                height as GLsizei,
                0,
                pixel,
                gl::UNSIGNED_BYTE,
                ptr::null(),
            );
            gl::BindTexture(gl::TEXTURE_2D, 0);
        }

        if let Err(err) = check_gl_error("glTexImage2D") {
            unsafe { gl::DeleteTextures(1, &name) };
            return Err(err);
        }

        debug!(name, width, height, ?format, "allocated GL texture");
        Ok(GlTexture {
            name,
            width,
            height,
            format,
        })
    }

    fn upload(
        &mut self,
        texture: &mut GlTexture,
        image: &ProcessedImage,
    ) -> Result<(), BackendError> {
        let (_, pixel) = gl_formats(texture.format);
        unsafe {
            gl::BindTexture(gl::TEXTURE_2D, texture.name);
            gl::PixelStorei(gl::UNPACK_ALIGNMENT, 1);
            gl::PixelStorei(gl::UNPACK_ROW_LENGTH, 0);
            gl::TexSubImage2D(
                gl::TEXTURE_2D,
                0,
                0,
                0,
                texture.width as GLsizei,
                texture.height as GLsizei,
                pixel,
                gl::UNSIGNED_BYTE,
                image.data().as_ptr() as *const c_void,
            );
            gl::PixelStorei(gl::UNPACK_ALIGNMENT, 4);
            gl::BindTexture(gl::TEXTURE_2D, 0);
        }
        check_gl_error("glTexSubImage2D")?;
        Self::wait_for_upload();
        Ok(())
    }

    fn release(&mut self, texture: GlTexture) {
        if texture.name != 0 {
            unsafe {
                gl::DeleteTextures(1, &texture.name);
            }
            debug!(name = texture.name, "deleted GL texture");
        }
    }

    fn raw_handle(texture: &GlTexture) -> u64 {
        texture.name as u64
    }
}
