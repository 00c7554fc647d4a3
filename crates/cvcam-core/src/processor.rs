//! Named filter dispatch.
//!
//! The pipeline treats every filter the same way: one borrowed [`Frame`] in,
//! one newly allocated [`ProcessedImage`] out. [`FilterRegistry`] is the
//! default [`FrameProcessor`]; it always carries [`PASSTHROUGH`] and accepts
//! any number of additional filters (the OpenCV set lives in the `cvcam`
//! crate behind the `opencv` feature).

use std::collections::BTreeMap;

use thiserror::Error;
use tracing::debug;

use crate::format::PixelFormat;
use crate::frame::Frame;
use crate::image::ProcessedImage;

/// Name of the built-in copy filter.
pub const PASSTHROUGH: &str = "passthrough";

/// Failure surfaced from the filter boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProcessError {
    #[error("unsupported operation '{0}'")]
    UnsupportedOperation(String),
    #[error("processing failed: {0}")]
    ProcessingError(String),
}

impl ProcessError {
    pub fn processing(err: impl std::fmt::Display) -> Self {
        ProcessError::ProcessingError(err.to_string())
    }
}

/// The capability the pipeline depends on.
pub trait FrameProcessor: Send {
    fn transform(&mut self, name: &str, frame: &Frame) -> Result<ProcessedImage, ProcessError>;

    /// Names accepted by [`transform`](Self::transform).
    fn operations(&self) -> Vec<String>;

    fn supports(&self, name: &str) -> bool {
        self.operations().iter().any(|op| op == name)
    }
}

/// A single image transform.
///
/// Implementations must return a new image in [`PixelFormat::Rgb8`]. Any
/// state a filter keeps between frames (e.g. previous frame for optical
/// flow) lives in the implementor.
pub trait Filter: Send {
    fn apply(&mut self, frame: &Frame) -> Result<ProcessedImage, ProcessError>;
}

impl<F> Filter for F
where
    F: FnMut(&Frame) -> Result<ProcessedImage, ProcessError> + Send,
{
    fn apply(&mut self, frame: &Frame) -> Result<ProcessedImage, ProcessError> {
        self(frame)
    }
}

/// Registry of named filters.
pub struct FilterRegistry {
    filters: BTreeMap<String, Box<dyn Filter>>,
}

impl std::fmt::Debug for FilterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterRegistry")
            .field("operations", &self.filters.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Default for FilterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FilterRegistry {
    /// Registry with only [`PASSTHROUGH`] registered.
    pub fn new() -> Self {
        let mut registry = Self {
            filters: BTreeMap::new(),
        };
        registry.register(PASSTHROUGH, passthrough);
        registry
    }

    /// Register `filter` under `name`, replacing any previous filter with
    /// that name.
    pub fn register(&mut self, name: impl Into<String>, filter: impl Filter + 'static) {
        let name = name.into();
        debug!(%name, "registering filter");
        self.filters.insert(name, Box::new(filter));
    }
}

impl FrameProcessor for FilterRegistry {
    fn transform(&mut self, name: &str, frame: &Frame) -> Result<ProcessedImage, ProcessError> {
        let filter = self
            .filters
            .get_mut(name)
            .ok_or_else(|| ProcessError::UnsupportedOperation(name.to_string()))?;
        if !frame.is_well_formed() {
            return Err(ProcessError::ProcessingError(format!(
                "malformed {:?} frame {}x{} with {} bytes",
                frame.format,
                frame.width,
                frame.height,
                frame.data.len()
            )));
        }
        filter.apply(frame)
    }

    fn operations(&self) -> Vec<String> {
        self.filters.keys().cloned().collect()
    }

    fn supports(&self, name: &str) -> bool {
        self.filters.contains_key(name)
    }
}

/// Copy `frame` into a new RGB8 image.
pub fn passthrough(frame: &Frame) -> Result<ProcessedImage, ProcessError> {
    Ok(ProcessedImage::rgb(frame.width, frame.height, to_rgb(frame)))
}

/// Convert any supported frame layout to packed RGB8.
pub fn to_rgb(frame: &Frame) -> Vec<u8> {
    let pixels = frame.width as usize * frame.height as usize;
    let mut out = Vec::with_capacity(pixels * 3);
    match frame.format {
        PixelFormat::Rgb8 => out.extend_from_slice(&frame.data),
        PixelFormat::Bgr8 => {
            for px in frame.data.chunks_exact(3) {
                out.extend_from_slice(&[px[2], px[1], px[0]]);
            }
        }
        PixelFormat::Bgra8 => {
            for px in frame.data.chunks_exact(4) {
                out.extend_from_slice(&[px[2], px[1], px[0]]);
            }
        }
        PixelFormat::Gray8 => {
            for &v in &frame.data {
                out.extend_from_slice(&[v, v, v]);
            }
        }
    }
    out
}
