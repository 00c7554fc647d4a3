use std::sync::{Arc, Mutex};

use cvcam::{DropReason, HeadlessRenderer, Pipeline, PipelineObserver, Presenter};
use cvcam_core::{
    FilterRegistry, Frame, PixelFormat, ProcessError, ProcessedImage, TestPatternSource,
};
use texture_cache::{HostBackend, PublishError, TextureCache, TextureHandle};

#[derive(Clone, Default)]
struct Recorder {
    published: Arc<Mutex<Vec<u64>>>,
    dropped: Arc<Mutex<Vec<(u64, DropReason)>>>,
}

impl PipelineObserver for Recorder {
    fn frame_published(&mut self, frame_sequence: u64, _handle: &TextureHandle) {
        self.published.lock().unwrap().push(frame_sequence);
    }

    fn frame_dropped(&mut self, frame_sequence: u64, reason: &DropReason) {
        self.dropped.lock().unwrap().push((frame_sequence, reason.clone()));
    }
}

#[test]
fn passthrough_uploads_rgb_pixels() {
    let cache = Arc::new(TextureCache::new(HostBackend::new()));
    let source = TestPatternSource::new(8, 4, PixelFormat::Bgra8).with_frame_limit(10);
    let mut pipeline = Pipeline::new(source, FilterRegistry::new(), "passthrough", cache.clone());

    let stats = pipeline.run().unwrap();
    assert_eq!(stats.captured, 10);
    assert_eq!(stats.published, 10);
    assert_eq!(stats.dropped(), 0);

    let pixels = cache
        .read_current(|handle, texture| {
            assert_eq!(handle.sequence, 9);
            assert_eq!(handle.dimensions(), (8, 4));
            assert_eq!(handle.format, PixelFormat::Rgb8);
            texture.pixels().to_vec()
        })
        .unwrap();

    // BGRA source: channel 2 is red, channel 0 is blue.
    for (i, px) in pixels.chunks_exact(3).enumerate() {
        let (x, y) = ((i % 8) as u32, (i / 8) as u32);
        assert_eq!(px[0], TestPatternSource::sample(9, x, y, 2));
        assert_eq!(px[1], TestPatternSource::sample(9, x, y, 1));
        assert_eq!(px[2], TestPatternSource::sample(9, x, y, 0));
    }
}

#[test]
fn dropped_frames_reach_observer() {
    let cache = Arc::new(TextureCache::new(HostBackend::new()));
    let source = TestPatternSource::new(4, 4, PixelFormat::Rgb8).with_frame_limit(6);

    let mut registry = FilterRegistry::new();
    registry.register("flaky", |frame: &Frame| -> Result<ProcessedImage, ProcessError> {
        match frame.sequence {
            1 => Err(ProcessError::ProcessingError("no corners".into())),
            // Short buffer; rejected by the cache.
            3 => Ok(ProcessedImage::rgb(4, 4, vec![0; 3])),
            seq => Ok(ProcessedImage::filled(4, 4, PixelFormat::Rgb8, seq as u8)),
        }
    });

    let recorder = Recorder::default();
    let mut pipeline =
        Pipeline::new(source, registry, "flaky", cache.clone()).with_observer(recorder.clone());
    let stats = pipeline.run().unwrap();

    assert_eq!(stats.captured, 6);
    assert_eq!(stats.published, 4);
    assert_eq!(stats.dropped_processing, 1);
    assert_eq!(stats.dropped_publish, 1);
    assert_eq!(*recorder.published.lock().unwrap(), vec![0, 2, 4, 5]);

    let dropped = recorder.dropped.lock().unwrap();
    assert_eq!(dropped.len(), 2);
    assert_eq!(
        dropped[0],
        (1, DropReason::Processing(ProcessError::ProcessingError("no corners".into())))
    );
    assert!(matches!(
        dropped[1],
        (3, DropReason::Publish(PublishError::InvalidImage(_)))
    ));

    let current = cache.current_texture().unwrap();
    assert_eq!(current.sequence, 3);
    let value = cache.read_current(|_, texture| texture.pixels()[0]).unwrap();
    assert_eq!(value, 5);
}

#[test]
fn unknown_filter_drops_every_frame() {
    let cache = Arc::new(TextureCache::new(HostBackend::new()));
    let source = TestPatternSource::new(4, 4, PixelFormat::Rgb8).with_frame_limit(3);
    let recorder = Recorder::default();
    let mut pipeline = Pipeline::new(source, FilterRegistry::new(), "sepia", cache.clone())
        .with_observer(recorder.clone());

    let stats = pipeline.run().unwrap();
    assert_eq!(stats.dropped_processing, 3);
    assert!(cache.current_texture().is_none());
    assert!(recorder
        .dropped
        .lock()
        .unwrap()
        .iter()
        .all(|(_, reason)| *reason
            == DropReason::Processing(ProcessError::UnsupportedOperation("sepia".into()))));
}

#[test]
fn allocation_failure_keeps_previous_texture() {
    // Room for three 4x4 RGB textures, nothing larger.
    let cache = Arc::new(TextureCache::new(HostBackend::with_budget(48 * 3)));
    let source = TestPatternSource::new(4, 4, PixelFormat::Rgb8).with_frame_limit(5);

    let mut registry = FilterRegistry::new();
    registry.register("grow", |frame: &Frame| -> Result<ProcessedImage, ProcessError> {
        let side = if frame.sequence == 4 { 64 } else { 4 };
        Ok(ProcessedImage::filled(side, side, PixelFormat::Rgb8, frame.sequence as u8))
    });

    let mut pipeline = Pipeline::new(source, registry, "grow", cache.clone());
    let stats = pipeline.run().unwrap();
    assert_eq!(stats.published, 4);
    assert_eq!(stats.dropped_publish, 1);

    let (handle, value) = cache
        .read_current(|handle, texture| (*handle, texture.pixels()[0]))
        .unwrap();
    assert_eq!(handle.dimensions(), (4, 4));
    assert_eq!(handle.sequence, 3);
    assert_eq!(value, 3);
}

#[test]
fn spawned_producer_with_concurrent_presenter() {
    let cache = Arc::new(TextureCache::new(HostBackend::new()));
    let source = TestPatternSource::new(16, 8, PixelFormat::Bgr8).with_frame_limit(300);
    let producer = Pipeline::new(source, FilterRegistry::new(), "passthrough", cache.clone())
        .spawn()
        .unwrap();

    let mut presenter = Presenter::new(HeadlessRenderer::new(16, 8), cache.clone());
    let mut last = None;
    while !producer.is_finished() {
        if presenter.present().unwrap() {
            let seq = presenter.renderer().last_drawn().unwrap().sequence;
            assert!(last.map_or(true, |prev| seq >= prev), "went backwards");
            last = Some(seq);
        }
    }

    let stats = producer.join().unwrap();
    assert_eq!(stats.published, 300);
    assert!(presenter.present().unwrap());
    assert_eq!(presenter.last_sequence(), Some(299));
}

#[test]
fn stop_handle_ends_spawned_producer() {
    let cache = Arc::new(TextureCache::new(HostBackend::new()));
    let source = TestPatternSource::new(4, 4, PixelFormat::Gray8).with_frame_rate(1000);
    let producer = Pipeline::new(source, FilterRegistry::new(), "passthrough", cache.clone())
        .spawn()
        .unwrap();

    while cache.current_texture().is_none() {
        std::thread::yield_now();
    }
    let stats = producer.stop_and_join().unwrap();
    assert!(stats.published >= 1);
    assert_eq!(cache.published_count(), stats.published);
}
