//! Filter output images.

use thiserror::Error;

use crate::format::PixelFormat;

/// Why an image cannot be uploaded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImageError {
    #[error("image has a zero dimension ({width}x{height})")]
    ZeroDimension { width: u32, height: u32 },
    #[error("image buffer is {actual} bytes, expected {expected}")]
    LengthMismatch { expected: usize, actual: usize },
    #[error("image dimensions {width}x{height} overflow the address space")]
    TooLarge { width: u32, height: u32 },
}

/// A newly allocated image produced by a filter.
///
/// The pixel buffer is uniquely owned. Handing the image to the texture
/// cache moves it; the cache drops it when its slot is reused or
/// invalidated.
///
/// Construction does not validate the geometry, filters are external code and
/// the cache checks every image at publish time with [`validate`](Self::validate).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedImage {
    width: u32,
    height: u32,
    format: PixelFormat,
    data: Box<[u8]>,
}

impl ProcessedImage {
    pub fn new(width: u32, height: u32, format: PixelFormat, data: impl Into<Box<[u8]>>) -> Self {
        Self {
            width,
            height,
            format,
            data: data.into(),
        }
    }

    /// An RGB8 image, the format every registered filter produces.
    pub fn rgb(width: u32, height: u32, data: impl Into<Box<[u8]>>) -> Self {
        Self::new(width, height, PixelFormat::Rgb8, data)
    }

    /// Image of the given size with every byte set to `value`.
    pub fn filled(width: u32, height: u32, format: PixelFormat, value: u8) -> Self {
        let len = format.buffer_len(width, height).unwrap_or(0);
        Self::new(width, height, format, vec![value; len])
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Box<[u8]> {
        self.data
    }

    pub fn stride(&self) -> usize {
        self.width as usize * self.format.bytes_per_pixel()
    }

    pub fn validate(&self) -> Result<(), ImageError> {
        if self.width == 0 || self.height == 0 {
            return Err(ImageError::ZeroDimension {
                width: self.width,
                height: self.height,
            });
        }
        let expected = self
            .format
            .buffer_len(self.width, self.height)
            .ok_or(ImageError::TooLarge {
                width: self.width,
                height: self.height,
            })?;
        if expected != self.data.len() {
            return Err(ImageError::LengthMismatch {
                expected,
                actual: self.data.len(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_short_buffer() {
        let image = ProcessedImage::rgb(4, 4, vec![0u8; 3]);
        assert_eq!(
            image.validate(),
            Err(ImageError::LengthMismatch {
                expected: 48,
                actual: 3
            })
        );
    }

    #[test]
    fn rejects_zero_dimension() {
        let image = ProcessedImage::rgb(0, 4, Vec::new());
        assert!(matches!(
            image.validate(),
            Err(ImageError::ZeroDimension { width: 0, height: 4 })
        ));
    }

    #[test]
    fn accepts_packed_buffer() {
        let image = ProcessedImage::filled(2, 3, PixelFormat::Bgra8, 7);
        assert_eq!(image.validate(), Ok(()));
        assert_eq!(image.stride(), 8);
        assert!(image.data().iter().all(|&b| b == 7));
    }

    #[test]
    fn into_data_hands_back_the_buffer() {
        let image = ProcessedImage::rgb(1, 2, vec![1, 2, 3, 4, 5, 6]);
        let data = image.into_data();
        assert_eq!(&*data, &[1, 2, 3, 4, 5, 6]);
    }
}
