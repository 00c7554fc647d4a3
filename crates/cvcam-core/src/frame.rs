//! Decoded capture frames.

use std::time::Duration;

use crate::format::PixelFormat;

/// One decoded capture buffer.
///
/// Frames belong to the capture layer. Filters only ever see `&Frame` for the
/// duration of a single transform call.
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub data: Vec<u8>,
    /// Capture time relative to the start of the source.
    pub timestamp: Duration,
    /// Monotonically increasing per source, starting at 0.
    pub sequence: u64,
}

impl Frame {
    pub fn new(
        width: u32,
        height: u32,
        format: PixelFormat,
        data: Vec<u8>,
        timestamp: Duration,
        sequence: u64,
    ) -> Self {
        Self {
            width,
            height,
            format,
            data,
            timestamp,
            sequence,
        }
    }

    /// Bytes per row of the tightly packed buffer.
    pub fn stride(&self) -> usize {
        self.width as usize * self.format.bytes_per_pixel()
    }

    /// Whether the buffer is non-empty and matches the declared geometry.
    pub fn is_well_formed(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.format.buffer_len(self.width, self.height) == Some(self.data.len())
    }
}
