//! Pixel formats understood by sources, filters and texture backends.

use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::FromPrimitive;

/// Packed 8-bit pixel layouts.
///
/// Discriminants are the CoreVideo FourCC codes so capture layers can map a
/// `kCVPixelFormatType_*` value straight to a [`PixelFormat`] with
/// [`PixelFormat::from_fourcc`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive, ToPrimitive)]
#[repr(u32)]
pub enum PixelFormat {
    /// 'RGB ' packed, three bytes per pixel.
    Rgb8 = 0x0000_0018,
    /// 'BGR ', three bytes per pixel.
    Bgr8 = 0x3234_4247,
    /// 'BGRA' (`kCVPixelFormatType_32BGRA`), four bytes per pixel.
    Bgra8 = 0x4247_5241,
    /// 'L008' single-channel luminance.
    Gray8 = 0x4C30_3038,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgb8 | PixelFormat::Bgr8 => 3,
            PixelFormat::Bgra8 => 4,
            PixelFormat::Gray8 => 1,
        }
    }

    /// Look up a format by its CoreVideo FourCC code.
    pub fn from_fourcc(code: u32) -> Option<Self> {
        Self::from_u32(code)
    }

    pub fn fourcc(self) -> u32 {
        self as u32
    }

    /// Number of bytes a tightly packed `width` x `height` image needs, or
    /// `None` on overflow.
    pub fn buffer_len(self, width: u32, height: u32) -> Option<usize> {
        (width as usize)
            .checked_mul(height as usize)?
            .checked_mul(self.bytes_per_pixel())
    }
}

impl std::str::FromStr for PixelFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "rgb" | "rgb8" => Ok(PixelFormat::Rgb8),
            "bgr" | "bgr8" => Ok(PixelFormat::Bgr8),
            "bgra" | "bgra8" => Ok(PixelFormat::Bgra8),
            "gray" | "grey" | "gray8" => Ok(PixelFormat::Gray8),
            other => Err(format!("unknown pixel format '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fourcc_lookup() {
        assert_eq!(PixelFormat::from_fourcc(0x4247_5241), Some(PixelFormat::Bgra8));
        assert_eq!(PixelFormat::from_fourcc(0xDEAD_BEEF), None);
        assert_eq!(PixelFormat::Gray8.fourcc(), 0x4C30_3038);
    }

    #[test]
    fn buffer_len_checks_overflow() {
        assert_eq!(PixelFormat::Rgb8.buffer_len(4, 4), Some(48));
        assert_eq!(PixelFormat::Bgra8.buffer_len(1280, 720), Some(1280 * 720 * 4));
        if usize::BITS == 32 {
            assert_eq!(PixelFormat::Bgra8.buffer_len(u32::MAX, u32::MAX), None);
        }
    }

    #[test]
    fn parses_names() {
        assert_eq!("BGRA".parse::<PixelFormat>(), Ok(PixelFormat::Bgra8));
        assert_eq!("grey".parse::<PixelFormat>(), Ok(PixelFormat::Gray8));
        assert!("yuv420".parse::<PixelFormat>().is_err());
    }
}
