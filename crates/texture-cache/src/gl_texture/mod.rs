//! OpenGL texture backend.
//!
//! Textures are plain `GL_TEXTURE_2D` objects in whatever context is current
//! on the calling thread. The cache, its producer and the renderer sampling
//! the textures must share that context (or a share group).

mod backend;

pub use backend::{check_gl_error, GlTexture, GlTextureBackend};
