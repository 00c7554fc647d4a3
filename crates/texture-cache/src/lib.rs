//! Ring-buffered GPU texture cache.
//!
//! [`TextureCache`] keeps a small fixed ring of texture slots. The producer
//! uploads each processed image into the next slot and only then publishes
//! it as current, so the render side always samples a fully uploaded texture
//! while the next one is being written.
//!
//! Texture storage is provided by a [`TextureBackend`]:
//!
//! - [`host::HostBackend`] keeps textures in CPU memory (headless runs,
//!   tests, read-back).
//! - [`gl_texture::GlTextureBackend`] uploads into OpenGL 2D textures.
//! - `metal::MetalTextureBackend` (macOS) uploads into `MTLTexture`s.

pub mod backend;
pub mod cache;
pub mod gl_texture;
pub mod host;
pub mod render;

#[cfg(target_os = "macos")]
pub mod metal;

pub use backend::{BackendError, TextureBackend};
pub use cache::{
    CacheError, PublishError, TextureCache, TextureHandle, DEFAULT_CACHE_SIZE,
};
pub use host::{HostBackend, HostTexture};
pub use render::Renderer;
