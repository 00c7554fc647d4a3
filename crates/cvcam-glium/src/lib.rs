//! Draw a [`texture_cache::TextureCache`] of GL textures with glium.
//!
//! [`GliumRenderer`] wraps whatever GL context the window layer (an
//! `NSOpenGLView`, a GLFW window, ...) has made current and samples the
//! cache's current texture into the default framebuffer.
//!
//! ### Warning
//!
//! glium is told the context is always current. Only use the renderer from
//! the thread that owns the context.

mod gl_backend;
pub mod glsl;
mod renderer;

pub use gl_backend::load_gl;
pub use renderer::GliumRenderer;
