//! Producer side: capture, filter, publish.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::anyhow;
use cvcam_core::{FrameProcessor, FrameSource, ProcessError, SourceError};
use texture_cache::{PublishError, TextureBackend, TextureCache, TextureHandle};
use thiserror::Error;
use tracing::{debug, info, trace, warn};

/// Why a captured frame never became the current texture.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DropReason {
    #[error(transparent)]
    Processing(#[from] ProcessError),
    #[error(transparent)]
    Publish(#[from] PublishError),
}

/// Receives per-frame outcomes from the producer loop.
///
/// Called on the producer thread; keep it cheap.
pub trait PipelineObserver: Send {
    fn frame_published(&mut self, _frame_sequence: u64, _handle: &TextureHandle) {}

    fn frame_dropped(&mut self, frame_sequence: u64, reason: &DropReason);
}

/// Logs drops with `warn!` and publishes with `trace!`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl PipelineObserver for TracingObserver {
    fn frame_published(&mut self, frame_sequence: u64, handle: &TextureHandle) {
        trace!(frame_sequence, slot = handle.slot, texture_sequence = handle.sequence, "published");
    }

    fn frame_dropped(&mut self, frame_sequence: u64, reason: &DropReason) {
        warn!(frame_sequence, "dropped frame: {reason}");
    }
}

/// Counters of a running or finished pipeline.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PipelineStats {
    pub captured: u64,
    pub published: u64,
    pub dropped_processing: u64,
    pub dropped_publish: u64,
}

impl PipelineStats {
    pub fn dropped(&self) -> u64 {
        self.dropped_processing + self.dropped_publish
    }
}

#[derive(Debug, Default)]
struct Counters {
    captured: AtomicU64,
    published: AtomicU64,
    dropped_processing: AtomicU64,
    dropped_publish: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> PipelineStats {
        PipelineStats {
            captured: self.captured.load(Ordering::Relaxed),
            published: self.published.load(Ordering::Relaxed),
            dropped_processing: self.dropped_processing.load(Ordering::Relaxed),
            dropped_publish: self.dropped_publish.load(Ordering::Relaxed),
        }
    }
}

/// Cloneable handle that stops a pipeline and reads its counters from
/// another thread.
#[derive(Debug, Clone)]
pub struct StopHandle {
    stop: Arc<AtomicBool>,
    counters: Arc<Counters>,
}

impl StopHandle {
    /// Ask the producer loop to return after the frame in flight.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> PipelineStats {
        self.counters.snapshot()
    }
}

pub struct Pipeline<S, P, B: TextureBackend> {
    source: S,
    processor: P,
    filter: String,
    cache: Arc<TextureCache<B>>,
    observer: Box<dyn PipelineObserver>,
    handle: StopHandle,
}

impl<S, P, B> Pipeline<S, P, B>
where
    S: FrameSource,
    P: FrameProcessor,
    B: TextureBackend,
{
    pub fn new(
        source: S,
        processor: P,
        filter: impl Into<String>,
        cache: Arc<TextureCache<B>>,
    ) -> Self {
        let filter = filter.into();
        if !processor.supports(&filter) {
            warn!(%filter, "filter is not registered, every frame will be dropped");
        }
        Self {
            source,
            processor,
            filter,
            cache,
            observer: Box::new(TracingObserver),
            handle: StopHandle {
                stop: Arc::new(AtomicBool::new(false)),
                counters: Arc::new(Counters::default()),
            },
        }
    }

    pub fn with_observer(mut self, observer: impl PipelineObserver + 'static) -> Self {
        self.observer = Box::new(observer);
        self
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.handle.clone()
    }

    pub fn stats(&self) -> PipelineStats {
        self.handle.stats()
    }

    pub fn cache(&self) -> &Arc<TextureCache<B>> {
        &self.cache
    }

    /// Process one frame.
    ///
    /// Returns `Ok(false)` once the source has ended. Processing and publish
    /// failures drop the frame, are reported to the observer and still
    /// return `Ok(true)`.
    pub fn tick(&mut self) -> Result<bool, SourceError> {
        let frame = match self.source.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) | Err(SourceError::Exhausted) => return Ok(false),
            Err(err) => return Err(err),
        };
        let counters = &self.handle.counters;
        counters.captured.fetch_add(1, Ordering::Relaxed);

        let image = match self.processor.transform(&self.filter, &frame) {
            Ok(image) => image,
            Err(err) => {
                counters.dropped_processing.fetch_add(1, Ordering::Relaxed);
                self.observer.frame_dropped(frame.sequence, &err.into());
                return Ok(true);
            }
        };

        match self.cache.publish(image) {
            Ok(handle) => {
                counters.published.fetch_add(1, Ordering::Relaxed);
                self.observer.frame_published(frame.sequence, &handle);
            }
            Err(err) => {
                counters.dropped_publish.fetch_add(1, Ordering::Relaxed);
                self.observer.frame_dropped(frame.sequence, &err.into());
            }
        }
        Ok(true)
    }

    /// Run until the source ends or [`StopHandle::stop`] is called.
    pub fn run(&mut self) -> Result<PipelineStats, SourceError> {
        info!(source = %self.source.describe(), filter = %self.filter, "pipeline started");
        while !self.handle.is_stopped() {
            if !self.tick()? {
                debug!("source ended");
                break;
            }
        }
        let stats = self.stats();
        info!(?stats, "pipeline finished");
        Ok(stats)
    }
}

impl<S, P, B> Pipeline<S, P, B>
where
    S: FrameSource + 'static,
    P: FrameProcessor + 'static,
    B: TextureBackend + 'static,
{
    /// Run the pipeline on a named producer thread.
    pub fn spawn(mut self) -> std::io::Result<PipelineHandle> {
        let handle = self.stop_handle();
        let thread = thread::Builder::new()
            .name("cvcam-producer".into())
            .spawn(move || self.run())?;
        Ok(PipelineHandle { handle, thread })
    }
}

/// A pipeline running on its own thread.
pub struct PipelineHandle {
    handle: StopHandle,
    thread: JoinHandle<Result<PipelineStats, SourceError>>,
}

impl PipelineHandle {
    pub fn stop_handle(&self) -> &StopHandle {
        &self.handle
    }

    pub fn stats(&self) -> PipelineStats {
        self.handle.stats()
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait for the producer to return.
    pub fn join(self) -> anyhow::Result<PipelineStats> {
        let stats = self
            .thread
            .join()
            .map_err(|_| anyhow!("producer thread panicked"))??;
        Ok(stats)
    }

    pub fn stop_and_join(self) -> anyhow::Result<PipelineStats> {
        self.handle.stop();
        self.join()
    }
}
