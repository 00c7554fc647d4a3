//! Shared types for the cvcam capture pipeline.
//!
//! This crate defines the data that flows between the external collaborators
//! of the pipeline and the texture cache:
//!
//! - [`Frame`] is a decoded capture buffer, borrowed by processors.
//! - [`ProcessedImage`] is the uniquely owned output of a filter, moved into
//!   the texture cache on publish.
//! - [`FrameProcessor`] / [`FilterRegistry`] dispatch named filters.
//! - [`FrameSource`] supplies frames; [`TestPatternSource`] is a synthetic
//!   source for headless runs and tests.
//! - [`SurfaceEvent`] carries render-surface lifecycle notifications.

pub mod format;
pub mod frame;
pub mod image;
pub mod logging;
pub mod processor;
pub mod source;
pub mod surface;

pub use format::PixelFormat;
pub use frame::Frame;
pub use image::{ImageError, ProcessedImage};
pub use processor::{Filter, FilterRegistry, FrameProcessor, ProcessError, PASSTHROUGH};
pub use source::{FrameSource, SourceError, TestPatternSource};
pub use surface::SurfaceEvent;
