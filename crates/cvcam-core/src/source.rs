//! Frame sources.
//!
//! Real camera capture is platform glue outside this repository; anything
//! that can hand out decoded frames implements [`FrameSource`].
//! [`TestPatternSource`] stands in for a camera in headless runs and tests.

use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info};

use crate::format::PixelFormat;
use crate::frame::Frame;

/// Default capture geometry, matching a 1280x720 capture preset.
pub const DEFAULT_WIDTH: u32 = 1280;
pub const DEFAULT_HEIGHT: u32 = 720;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("frame source has no more frames")]
    Exhausted,
    #[error("capture failed: {0}")]
    Capture(String),
}

/// Supplies decoded frames at the device cadence.
pub trait FrameSource: Send {
    /// Next frame, or `Ok(None)` once the stream has ended.
    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError>;

    /// Short human readable description for logs.
    fn describe(&self) -> String;
}

/// Deterministic synthetic source.
///
/// Produces a diagonal gradient that scrolls by one pixel per frame, so
/// consecutive frames differ and every frame is reproducible from its
/// sequence number.
#[derive(Debug, Clone)]
pub struct TestPatternSource {
    width: u32,
    height: u32,
    format: PixelFormat,
    frame_limit: Option<u64>,
    frame_interval: Option<Duration>,
    produced: u64,
    started_at: Option<Instant>,
    last_frame_at: Option<Instant>,
}

impl Default for TestPatternSource {
    fn default() -> Self {
        Self::new(DEFAULT_WIDTH, DEFAULT_HEIGHT, PixelFormat::Bgra8)
    }
}

impl TestPatternSource {
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            width,
            height,
            format,
            frame_limit: None,
            frame_interval: None,
            produced: 0,
            started_at: None,
            last_frame_at: None,
        }
    }

    /// Stop after `limit` frames.
    pub fn with_frame_limit(mut self, limit: u64) -> Self {
        self.frame_limit = Some(limit);
        self
    }

    /// Pace delivery to `fps` frames per second. Zero disables pacing.
    pub fn with_frame_rate(mut self, fps: u32) -> Self {
        self.frame_interval = (fps > 0).then(|| Duration::from_secs(1) / fps);
        self
    }

    pub fn frames_produced(&self) -> u64 {
        self.produced
    }

    /// Pixel value of channel `c` at (`x`, `y`) in frame `sequence`.
    pub fn sample(sequence: u64, x: u32, y: u32, c: usize) -> u8 {
        let base = (x as u64 + y as u64 + sequence) as u8;
        match c {
            0 => base,
            1 => base.wrapping_mul(3),
            2 => 255 - base,
            _ => 255,
        }
    }

    fn render(&self, sequence: u64) -> Vec<u8> {
        let bpp = self.format.bytes_per_pixel();
        let mut data = Vec::with_capacity(self.width as usize * self.height as usize * bpp);
        for y in 0..self.height {
            for x in 0..self.width {
                for c in 0..bpp {
                    data.push(Self::sample(sequence, x, y, c));
                }
            }
        }
        data
    }

    fn pace(&mut self) {
        if let (Some(interval), Some(last)) = (self.frame_interval, self.last_frame_at) {
            let elapsed = last.elapsed();
            if elapsed < interval {
                std::thread::sleep(interval - elapsed);
            }
        }
        self.last_frame_at = Some(Instant::now());
    }
}

impl FrameSource for TestPatternSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        if self.frame_limit.is_some_and(|limit| self.produced >= limit) {
            debug!(produced = self.produced, "test pattern exhausted");
            return Ok(None);
        }

        let started_at = *self.started_at.get_or_insert_with(|| {
            info!(
                width = self.width,
                height = self.height,
                format = ?self.format,
                "test pattern source started"
            );
            Instant::now()
        });

        self.pace();

        let sequence = self.produced;
        let frame = Frame::new(
            self.width,
            self.height,
            self.format,
            self.render(sequence),
            started_at.elapsed(),
            sequence,
        );
        self.produced += 1;
        Ok(Some(frame))
    }

    fn describe(&self) -> String {
        format!(
            "test-pattern {}x{} {:?}",
            self.width, self.height, self.format
        )
    }
}
