//! CPU-memory texture backend.
//!
//! Textures are plain byte buffers. Used for headless runs and for reading
//! pixels back in tests. An optional byte budget makes allocation fail the
//! way a GPU running out of memory would.

use cvcam_core::{PixelFormat, ProcessedImage};
use tracing::debug;

use crate::backend::{BackendError, TextureBackend};

const NAME: &str = "host";

/// A texture living in CPU memory.
#[derive(Debug)]
pub struct HostTexture {
    id: u64,
    width: u32,
    height: u32,
    format: PixelFormat,
    pixels: Vec<u8>,
}

impl HostTexture {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Pixels as last uploaded.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }
}

#[derive(Debug, Default)]
pub struct HostBackend {
    next_id: u64,
    budget: Option<usize>,
    allocated_bytes: usize,
    live_textures: usize,
}

impl HostBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail allocations that would take total texture memory above `bytes`.
    ///
    /// During reallocation the replacement is allocated before the old
    /// texture is released, so the budget must fit both for a moment.
    pub fn with_budget(bytes: usize) -> Self {
        Self {
            budget: Some(bytes),
            ..Self::default()
        }
    }

    pub fn allocated_bytes(&self) -> usize {
        self.allocated_bytes
    }

    pub fn live_textures(&self) -> usize {
        self.live_textures
    }
}

impl TextureBackend for HostBackend {
    type Texture = HostTexture;

    fn name(&self) -> &'static str {
        NAME
    }

    fn allocate(
        &mut self,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<HostTexture, BackendError> {
        let bytes = format
            .buffer_len(width, height)
            .ok_or_else(|| BackendError::new(NAME, format!("{width}x{height} overflows")))?;

        if let Some(budget) = self.budget {
            if self.allocated_bytes + bytes > budget {
                return Err(BackendError::new(
                    NAME,
                    format!(
                        "allocating {bytes} bytes exceeds budget ({} of {budget} in use)",
                        self.allocated_bytes
                    ),
                ));
            }
        }

        self.next_id += 1;
        self.allocated_bytes += bytes;
        self.live_textures += 1;
        debug!(id = self.next_id, width, height, ?format, "allocated host texture");

        Ok(HostTexture {
            id: self.next_id,
            width,
            height,
            format,
            pixels: vec![0; bytes],
        })
    }

    fn upload(
        &mut self,
        texture: &mut HostTexture,
        image: &ProcessedImage,
    ) -> Result<(), BackendError> {
        if image.dimensions() != texture.dimensions() || image.format() != texture.format {
            return Err(BackendError::new(
                NAME,
                format!(
                    "image {:?} {:?} does not fit texture {:?} {:?}",
                    image.dimensions(),
                    image.format(),
                    texture.dimensions(),
                    texture.format
                ),
            ));
        }
        texture.pixels.copy_from_slice(image.data());
        Ok(())
    }

    fn release(&mut self, texture: HostTexture) {
        self.allocated_bytes -= texture.pixels.len();
        self.live_textures -= 1;
        debug!(id = texture.id, "released host texture");
    }

    fn raw_handle(texture: &HostTexture) -> u64 {
        texture.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_limits_allocation() {
        // One 4x4 RGB texture (48 bytes) fits, a second does not.
        let mut backend = HostBackend::with_budget(95);
        let texture = backend.allocate(4, 4, PixelFormat::Rgb8).unwrap();
        assert_eq!(backend.allocated_bytes(), 48);
        assert!(backend.allocate(4, 4, PixelFormat::Rgb8).is_err());

        backend.release(texture);
        assert_eq!(backend.allocated_bytes(), 0);
        assert_eq!(backend.live_textures(), 0);
        assert!(backend.allocate(4, 4, PixelFormat::Rgb8).is_ok());
    }

    #[test]
    fn upload_rejects_mismatched_image() {
        let mut backend = HostBackend::new();
        let mut texture = backend.allocate(2, 2, PixelFormat::Rgb8).unwrap();
        let image = ProcessedImage::filled(3, 2, PixelFormat::Rgb8, 1);
        assert!(backend.upload(&mut texture, &image).is_err());

        let image = ProcessedImage::filled(2, 2, PixelFormat::Rgb8, 9);
        backend.upload(&mut texture, &image).unwrap();
        assert_eq!(texture.pixels(), image.data());
    }
}
