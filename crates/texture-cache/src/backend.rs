//! Common interface for texture storage.

use cvcam_core::{PixelFormat, ProcessedImage};
use thiserror::Error;

/// A texture backend failed to allocate or upload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{backend} backend: {message}")]
pub struct BackendError {
    pub backend: &'static str,
    pub message: String,
    /// Native error code (e.g. the `glGetError` value), when there is one.
    pub code: Option<u32>,
}

impl BackendError {
    pub fn new(backend: &'static str, message: impl Into<String>) -> Self {
        Self {
            backend,
            message: message.into(),
            code: None,
        }
    }

    pub fn with_code(mut self, code: u32) -> Self {
        self.code = Some(code);
        self
    }
}

/// Storage for the textures held in a [`TextureCache`](crate::TextureCache).
///
/// Implementations exist for CPU memory ([`HostBackend`](crate::HostBackend)),
/// OpenGL and Metal (macOS).
///
/// The cache only ever calls a backend from inside its writer lock, so
/// implementations need no internal synchronisation. Backends tied to a
/// graphics context (OpenGL) must only be driven from the thread that has
/// that context current.
pub trait TextureBackend: Send {
    /// Backend-owned texture object stored in a cache slot.
    type Texture: Send + Sync;

    /// Short name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Allocate storage for a `width` x `height` texture in `format`.
    fn allocate(
        &mut self,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<Self::Texture, BackendError>;

    /// Copy `image` into `texture`. The image has already been validated and
    /// matches the texture's dimensions and format.
    ///
    /// When this returns `Ok` the upload must be complete from the point of
    /// view of any consumer of the texture.
    fn upload(
        &mut self,
        texture: &mut Self::Texture,
        image: &ProcessedImage,
    ) -> Result<(), BackendError>;

    /// Free the texture's storage.
    fn release(&mut self, texture: Self::Texture);

    /// Opaque numeric handle handed to renderers (GL texture name, Metal
    /// texture pointer, host id).
    fn raw_handle(texture: &Self::Texture) -> u64;
}
