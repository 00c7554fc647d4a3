//! Capture → filter → texture cache pipeline.
//!
//! [`pipeline::Pipeline`] runs the producer side: it pulls frames from a
//! [`cvcam_core::FrameSource`], runs the configured filter and publishes the
//! result into a shared [`texture_cache::TextureCache`]. The render side
//! draws through a [`present::Presenter`], which also invalidates the cache
//! when the surface goes away.

pub mod config;
pub mod filters;
pub mod pipeline;
pub mod present;

pub use config::{CaptureCliArgs, CaptureConfig};
pub use pipeline::{
    DropReason, Pipeline, PipelineHandle, PipelineObserver, PipelineStats, StopHandle,
    TracingObserver,
};
pub use present::{HeadlessRenderer, Presenter};
