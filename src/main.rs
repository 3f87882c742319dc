// src/main.rs

use anyhow::Result;
use lane_tracker::pipeline::{LanePipeline, MetricsSummary};
use lane_tracker::types::Config;
use lane_tracker::video_processor::{InputSource, VideoProcessor};
use std::path::Path;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let config_path = Config::resolve_path(std::env::args().nth(1));
    let loaded = if Path::new(&config_path).exists() {
        Some(Config::load(&config_path)?)
    } else {
        None
    };
    let config = loaded.clone().unwrap_or_default();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("🛣️ Lane Boundary Tracker Starting");
    match loaded {
        Some(_) => info!("✓ Configuration loaded from {}", config_path),
        None => warn!("⚠️  {} not found, using defaults", config_path),
    }

    info!(
        "Geometry: {:.4} m/px (y), {:.5} m/px (x), per-line rounding: {}",
        config.geometry.scale.ym_per_pix,
        config.geometry.scale.xm_per_pix,
        config.geometry.per_line_rounding
    );

    let mut pipeline = LanePipeline::new(config.clone())?;
    let video_processor = VideoProcessor::new(config.clone());
    let inputs = video_processor.find_inputs()?;

    if inputs.is_empty() {
        error!("No inputs found in {}", config.video.input_dir);
        return Ok(());
    }

    for (idx, input) in inputs.iter().enumerate() {
        info!("========================================");
        info!(
            "Processing input {}/{}: {}",
            idx + 1,
            inputs.len(),
            input.path.display()
        );
        info!("========================================");

        match process_input(input, &mut pipeline, &video_processor) {
            Ok(stats) => log_summary(&stats),
            Err(e) => error!("Failed to process {}: {:#}", input.path.display(), e),
        }
    }

    Ok(())
}

fn process_input(
    input: &InputSource,
    pipeline: &mut LanePipeline,
    video_processor: &VideoProcessor,
) -> Result<MetricsSummary> {
    pipeline.start_stream(&input.name())?;

    let mut source = video_processor.open(input)?;
    let total = source.frame_count();
    let (width, height) = pipeline.perspective().image_size();
    let mut sink = video_processor.create_sink(input, width, height, source.fps())?;

    while let Some(frame) = source.next_frame()? {
        let processed = match pipeline.process_frame(&frame) {
            Ok(processed) => processed,
            Err(e) => {
                warn!("Skipping frame {}: {:#}", frame.index, e);
                pipeline.skip_frame();
                continue;
            }
        };

        if let Some(sink) = sink.as_mut() {
            sink.write_frame(&processed.annotated)?;
        }

        if frame.index > 0 && frame.index % 100 == 0 {
            match total {
                Some(total) => info!(
                    "Progress: {}/{} ({:.1}%)",
                    frame.index,
                    total,
                    100.0 * frame.index as f64 / total.max(1) as f64
                ),
                None => info!("Progress: {} frames", frame.index),
            }
        }
    }

    if let Some(sink) = sink.as_mut() {
        sink.finish()?;
    }
    pipeline.finish_stream()
}

fn log_summary(stats: &MetricsSummary) {
    info!("✓ Input processed");
    info!("  Total frames: {}", stats.total_frames);
    info!(
        "  Frames with geometry: {} ({:.1}%)",
        stats.frames_with_geometry,
        100.0 * stats.geometry_rate
    );
    info!(
        "  Searches: {} window, {} targeted",
        stats.window_searches, stats.targeted_searches
    );
    if stats.tracking_losses > 0 {
        warn!("  Tracking losses: {}", stats.tracking_losses);
    }
    if stats.held_overlays > 0 {
        info!("  Held overlays: {}", stats.held_overlays);
    }
    if stats.skipped_frames > 0 {
        warn!("  Skipped frames: {}", stats.skipped_frames);
    }
    info!("  Processing Speed: {:.1} FPS", stats.avg_fps);
}
