//! Headless cvcam: a synthetic camera through a filter into a CPU-backed
//! texture cache, sampled from the main thread at the render interval.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::Parser;
use cvcam::{filters, CaptureCliArgs, CaptureConfig, HeadlessRenderer, Pipeline, Presenter};
use cvcam_core::{FrameProcessor, SurfaceEvent, TestPatternSource};
use texture_cache::{HostBackend, TextureCache};
use tracing::info;

const STATS_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Parser)]
#[command(name = "cvcam", about = "Run camera frames through a filter into a texture cache")]
struct Cli {
    #[command(flatten)]
    capture: CaptureCliArgs,
    /// Print the available filters and exit.
    #[arg(long)]
    list_filters: bool,
    /// Log filter used when RUST_LOG is unset.
    #[arg(long, default_value = "info")]
    log: String,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("{err:?}");
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    cvcam_core::logging::init(&cli.log);

    if cli.list_filters {
        for name in filters::registry().operations() {
            println!("{name}");
        }
        return Ok(());
    }

    let config = CaptureConfig::try_from(cli.capture)?;
    info!(?config, "starting");

    let cache = Arc::new(
        TextureCache::with_capacity(HostBackend::new(), config.cache_size)
            .context("creating texture cache")?,
    );

    let mut source = TestPatternSource::new(config.width, config.height, config.format);
    if let Some(limit) = config.frame_limit {
        source = source.with_frame_limit(limit);
    }
    if let Some(fps) = config.fps {
        source = source.with_frame_rate(fps);
    }

    let producer = Pipeline::new(source, filters::registry(), config.filter.clone(), cache.clone())
        .spawn()
        .context("spawning producer thread")?;

    let mut presenter = Presenter::new(HeadlessRenderer::default(), cache);
    presenter.surface_event(SurfaceEvent::Created {
        width: config.width,
        height: config.height,
    });

    let mut last_report = Instant::now();
    while !producer.is_finished() {
        presenter.present()?;
        if last_report.elapsed() >= STATS_INTERVAL {
            let stats = producer.stats();
            info!(
                captured = stats.captured,
                published = stats.published,
                dropped = stats.dropped(),
                drawn = presenter.frames_drawn(),
                "running"
            );
            last_report = Instant::now();
        }
        thread::sleep(config.render_interval);
    }
    presenter.present()?;

    let stats = producer.join()?;
    info!(
        captured = stats.captured,
        published = stats.published,
        dropped_processing = stats.dropped_processing,
        dropped_publish = stats.dropped_publish,
        drawn = presenter.frames_drawn(),
        last_sequence = ?presenter.last_sequence(),
        "done"
    );

    presenter.surface_event(SurfaceEvent::Destroyed);
    Ok(())
}
