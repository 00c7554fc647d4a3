//! [`MetalTextureBackend`]: CPU uploads into `MTLTexture`s via
//! `replaceRegion`.
//!
//! Metal has no 24-bit formats, so RGB and BGR images are widened to four
//! bytes per pixel in a reusable staging buffer before the copy.

use std::ffi::c_void;
use std::ptr::NonNull;

use cvcam_core::{PixelFormat, ProcessedImage};
use objc2::rc::Retained;
use objc2::runtime::ProtocolObject;
use objc2_metal::{
    MTLDevice, MTLOrigin, MTLPixelFormat, MTLRegion, MTLSize, MTLStorageMode, MTLTexture,
    MTLTextureDescriptor, MTLTextureType, MTLTextureUsage,
};
use tracing::debug;

use crate::backend::{BackendError, TextureBackend};
use crate::metal::device::MetalDevice;

const NAME: &str = "metal";

fn metal_format(format: PixelFormat) -> (MTLPixelFormat, usize) {
    match format {
        PixelFormat::Rgb8 => (MTLPixelFormat::RGBA8Unorm, 4),
        PixelFormat::Bgr8 | PixelFormat::Bgra8 => (MTLPixelFormat::BGRA8Unorm, 4),
        PixelFormat::Gray8 => (MTLPixelFormat::R8Unorm, 1),
    }
}

pub struct MetalTexture {
    texture: Retained<ProtocolObject<dyn MTLTexture>>,
    width: u32,
    height: u32,
    format: PixelFormat,
}

// SAFETY: MTLTexture objects may be used from any thread; the cache only
// writes a texture while holding its slot exclusively.
unsafe impl Send for MetalTexture {}
unsafe impl Sync for MetalTexture {}

impl MetalTexture {
    pub fn texture(&self) -> &ProtocolObject<dyn MTLTexture> {
        &self.texture
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

pub struct MetalTextureBackend {
    device: MetalDevice,
    staging: Vec<u8>,
}

// SAFETY: MTLDevice is thread safe; the staging buffer is only touched from
// inside the cache's writer lock.
unsafe impl Send for MetalTextureBackend {}

impl MetalTextureBackend {
    pub fn new(device: MetalDevice) -> Self {
        Self {
            device,
            staging: Vec::new(),
        }
    }

    /// Widen 3-byte pixels to 4 bytes with opaque alpha, keeping channel
    /// order.
    fn widen(&mut self, data: &[u8]) -> &[u8] {
        self.staging.clear();
        self.staging.reserve(data.len() / 3 * 4);
        for px in data.chunks_exact(3) {
            self.staging.extend_from_slice(&[px[0], px[1], px[2], 255]);
        }
        &self.staging
    }
}

impl TextureBackend for MetalTextureBackend {
    type Texture = MetalTexture;

    fn name(&self) -> &'static str {
        NAME
    }

    fn allocate(
        &mut self,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<MetalTexture, BackendError> {
        let (pixel_format, _) = metal_format(format);
        let desc = MTLTextureDescriptor::new();
        desc.setTextureType(MTLTextureType::Type2D);
        desc.setPixelFormat(pixel_format);
        unsafe {
            desc.setWidth(width as usize);
            desc.setHeight(height as usize);
        }
        desc.setStorageMode(MTLStorageMode::Managed);
        desc.setUsage(MTLTextureUsage::ShaderRead);

        let texture = self
            .device
            .device()
            .newTextureWithDescriptor(&desc)
            .ok_or_else(|| {
                BackendError::new(
                    NAME,
                    format!("newTextureWithDescriptor failed for {width}x{height} {pixel_format:?}"),
                )
            })?;

        debug!(width, height, ?format, "allocated Metal texture");
        Ok(MetalTexture {
            texture,
            width,
            height,
            format,
        })
    }

    fn upload(
        &mut self,
        texture: &mut MetalTexture,
        image: &ProcessedImage,
    ) -> Result<(), BackendError> {
        let (_, bytes_per_pixel) = metal_format(texture.format);
        let width = texture.width as usize;
        let height = texture.height as usize;

        let bytes: &[u8] = match texture.format {
            PixelFormat::Rgb8 | PixelFormat::Bgr8 => self.widen(image.data()),
            PixelFormat::Bgra8 | PixelFormat::Gray8 => image.data(),
        };
        let pixels = NonNull::new(bytes.as_ptr() as *mut c_void)
            .ok_or_else(|| BackendError::new(NAME, "empty pixel buffer"))?;

        let region = MTLRegion {
            origin: MTLOrigin { x: 0, y: 0, z: 0 },
            size: MTLSize {
                width,
                height,
                depth: 1,
            },
        };
        // SAFETY: `bytes` holds `height` rows of `width * bytes_per_pixel`
        // bytes and outlives the call, which copies synchronously.
        unsafe {
            texture.texture.replaceRegion_mipmapLevel_withBytes_bytesPerRow(
                region,
                0,
                pixels,
                width * bytes_per_pixel,
            );
        }
        Ok(())
    }

    fn release(&mut self, texture: MetalTexture) {
        // Reference counted; dropping the last retain frees the storage.
        drop(texture);
    }

    fn raw_handle(texture: &MetalTexture) -> u64 {
        Retained::as_ptr(&texture.texture) as *const c_void as usize as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TextureCache;

    #[test]
    fn publishes_into_metal_textures() {
        let Some(device) = MetalDevice::new() else {
            // No GPU on this machine (e.g. a headless VM).
            return;
        };
        let cache = TextureCache::new(MetalTextureBackend::new(device));

        let rgb = cache
            .publish(ProcessedImage::filled(8, 4, PixelFormat::Rgb8, 10))
            .unwrap();
        let gray = cache
            .publish(ProcessedImage::filled(3, 3, PixelFormat::Gray8, 20))
            .unwrap();
        assert_ne!(rgb.raw, 0);
        assert_eq!(gray.dimensions(), (3, 3));

        let dims = cache
            .read_current(|_, texture| {
                texture.dimensions()
            })
            .unwrap();
        assert_eq!(dims, (3, 3));
    }

    #[test]
    fn widen_adds_opaque_alpha() {
        let Some(device) = MetalDevice::new() else {
            return;
        };
        let mut backend = MetalTextureBackend::new(device);
        assert_eq!(backend.widen(&[1, 2, 3, 4, 5, 6]), &[1, 2, 3, 255, 4, 5, 6, 255]);
    }
}
