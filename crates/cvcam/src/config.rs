//! Command line configuration.
//!
//! [`CaptureCliArgs`] is what clap parses; [`CaptureConfig`] is the
//! validated form the pipeline and the binary work with.

use std::time::Duration;

use anyhow::{bail, Result};
use clap::Args;
use cvcam_core::source::{DEFAULT_HEIGHT, DEFAULT_WIDTH};
use cvcam_core::{FrameProcessor, PixelFormat, PASSTHROUGH};
use texture_cache::DEFAULT_CACHE_SIZE;

use crate::filters;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CaptureConfig {
    /// Filter applied to every frame.
    pub filter: String,
    pub width: u32,
    pub height: u32,
    /// Layout of the frames the source produces.
    pub format: PixelFormat,
    /// Number of texture slots in the ring.
    pub cache_size: usize,
    /// Stop after this many frames. Runs until interrupted when `None`.
    pub frame_limit: Option<u64>,
    /// Source frame rate; `None` captures as fast as possible.
    pub fps: Option<u32>,
    /// How often the render side samples the cache.
    pub render_interval: Duration,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            filter: PASSTHROUGH.to_string(),
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            format: PixelFormat::Bgra8,
            cache_size: DEFAULT_CACHE_SIZE,
            frame_limit: None,
            fps: Some(30),
            render_interval: Duration::from_millis(16),
        }
    }
}

/// Capture and rendering flags.
#[derive(Debug, Args)]
pub struct CaptureCliArgs {
    /// Filter to run on each frame (see --list-filters).
    #[arg(long, short = 'f', default_value = PASSTHROUGH)]
    pub filter: String,
    /// Capture width in pixels.
    #[arg(long, value_name = "PX", default_value_t = DEFAULT_WIDTH)]
    pub width: u32,
    /// Capture height in pixels.
    #[arg(long, value_name = "PX", default_value_t = DEFAULT_HEIGHT)]
    pub height: u32,
    /// Source pixel format: rgb, bgr, bgra or gray.
    #[arg(long, value_name = "FORMAT", default_value = "bgra")]
    pub format: PixelFormat,
    /// Texture slots in the cache ring (at least 2).
    #[arg(long = "cache-size", value_name = "N", default_value_t = DEFAULT_CACHE_SIZE)]
    pub cache_size: usize,
    /// Stop after N frames.
    #[arg(long = "frames", value_name = "N")]
    pub frame_limit: Option<u64>,
    /// Source frame rate. 0 captures as fast as possible.
    #[arg(long, value_name = "FPS", default_value_t = 30)]
    pub fps: u32,
    /// Milliseconds between render samples.
    #[arg(long = "render-interval", value_name = "MS", default_value_t = 16)]
    pub render_interval_ms: u64,
}

impl TryFrom<CaptureCliArgs> for CaptureConfig {
    type Error = anyhow::Error;

    fn try_from(args: CaptureCliArgs) -> Result<Self> {
        if args.width == 0 || args.height == 0 {
            bail!("Capture width and height must be positive integers");
        }
        if args.format.buffer_len(args.width, args.height).is_none() {
            bail!("{}x{} frames do not fit in memory", args.width, args.height);
        }

        if args.cache_size < 2 {
            bail!("--cache-size must be at least 2, got {}", args.cache_size);
        }

        let registry = filters::registry();
        if !registry.supports(&args.filter) {
            bail!(
                "Unknown filter '{}'. Available: {}",
                args.filter,
                registry.operations().join(", ")
            );
        }

        if args.render_interval_ms == 0 {
            bail!("--render-interval must be at least 1 ms");
        }

        if args.frame_limit == Some(0) {
            bail!("--frames must be at least 1");
        }

        Ok(Self {
            filter: args.filter,
            width: args.width,
            height: args.height,
            format: args.format,
            cache_size: args.cache_size,
            frame_limit: args.frame_limit,
            fps: (args.fps > 0).then_some(args.fps),
            render_interval: Duration::from_millis(args.render_interval_ms),
        })
    }
}
