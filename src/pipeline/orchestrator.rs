// src/pipeline/orchestrator.rs
//
// Per-frame driver:
//
//   Frame ─→ undistort ─→ binarize ─→ warp_mask ─→ LaneTracker::process
//                │                                      │
//                │                               both fits valid?
//                │                                 yes │        no
//                │                        geometry::measure   hold_last_overlay?
//                └────────────→ OverlayProjector::render ◀──────┘
//
// One pipeline serves many streams; `start_stream` resets everything that
// must not leak between inputs (tracker state, held overlay, counters).

use std::path::Path;

use anyhow::Result;
use image::RgbImage;
use tracing::{info, warn};

use crate::debug::{visualize_search, StageDumper};
use crate::lane::{measure, LaneTracker, LineFit, TrackingMode};
use crate::preprocessing::calibration::resolve_calibration;
use crate::preprocessing::{binarize, PerspectiveTransform, Undistorter};
use crate::road_overlay::OverlayProjector;
use crate::types::{Config, Frame};

use super::frame_context::ProcessedFrame;
use super::measurement_log::MeasurementLog;
use super::metrics::{MetricsSummary, PipelineMetrics};

/// Last pair that produced geometry, kept for `hold_last_overlay`.
#[derive(Debug, Clone, Copy)]
struct HeldLane {
    left: LineFit,
    right: LineFit,
}

pub struct LanePipeline {
    config: Config,
    undistorter: Undistorter,
    perspective: PerspectiveTransform,
    tracker: LaneTracker,
    overlay: OverlayProjector,
    metrics: PipelineMetrics,
    held: Option<HeldLane>,
    stream: String,
    dumper: Option<StageDumper>,
    measurements: Option<MeasurementLog>,
}

impl LanePipeline {
    pub fn new(config: Config) -> Result<Self> {
        let perspective = PerspectiveTransform::from_config(&config.perspective)?;
        let (width, height) = perspective.image_size();

        let undistorter = match resolve_calibration(&config.calibration)? {
            Some(calibration) => Undistorter::new(&calibration, width, height),
            None => {
                warn!("⚠️  No camera calibration available; frames are not undistorted");
                Undistorter::identity(width, height)
            }
        };

        let overlay = OverlayProjector::new(config.overlay.clone())?;
        let measurements = config
            .video
            .measurements_path
            .as_deref()
            .map(|p| MeasurementLog::open(Path::new(p)))
            .transpose()?;
        let tracker = LaneTracker::new(config.lane.clone());

        info!(
            "✓ Lane pipeline ready: {}x{}, {} windows, margin {}px, min {}px",
            width,
            height,
            config.lane.window.windows,
            config.lane.window.margin,
            config.lane.window.min_pixels
        );

        Ok(Self {
            config,
            undistorter,
            perspective,
            tracker,
            overlay,
            metrics: PipelineMetrics::new(),
            held: None,
            stream: String::new(),
            dumper: None,
            measurements,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn tracker(&self) -> &LaneTracker {
        &self.tracker
    }

    pub fn perspective(&self) -> &PerspectiveTransform {
        &self.perspective
    }

    pub fn metrics(&self) -> &PipelineMetrics {
        &self.metrics
    }

    /// Begin an independent input. Tracker, held overlay and counters reset.
    pub fn start_stream(&mut self, name: &str) -> Result<()> {
        self.tracker.reset();
        self.held = None;
        self.metrics = PipelineMetrics::new();
        self.stream = name.to_string();
        self.dumper = match &self.config.debug.dump_dir {
            Some(root) => Some(StageDumper::new(
                Path::new(root),
                name,
                self.config.debug.every_n,
            )?),
            None => None,
        };
        Ok(())
    }

    /// End the current input and return its counters.
    pub fn finish_stream(&mut self) -> Result<MetricsSummary> {
        if let Some(log) = self.measurements.as_mut() {
            log.flush()?;
        }
        Ok(self.metrics.summary())
    }

    /// Note a frame the caller could not deliver. The tracker is not touched.
    pub fn skip_frame(&mut self) {
        self.metrics.record_skip();
    }

    pub fn process_frame(&mut self, frame: &Frame) -> Result<ProcessedFrame> {
        let expected = self.perspective.image_size();
        anyhow::ensure!(
            frame.image.dimensions() == expected,
            "frame {} is {}x{}, pipeline expects {}x{}",
            frame.index,
            frame.width(),
            frame.height(),
            expected.0,
            expected.1
        );

        let undistorted = self.undistorter.undistort(&frame.image)?;
        let (color_binary, mask) = binarize(&undistorted, &self.config.threshold);
        let warped = self.perspective.warp_mask(&mask);

        let previous_mode = self.tracker.mode();
        let outcome = self.tracker.process(&warped);

        let geometry = outcome.fits().map(|(left, right)| {
            measure(
                left,
                right,
                outcome.bases.center_offset_px,
                warped.height(),
                &self.config.geometry,
            )
        });

        let (annotated, held_overlay) = match (outcome.fits(), geometry) {
            (Some((left, right)), Some(geometry)) => {
                self.held = Some(HeldLane {
                    left: *left,
                    right: *right,
                });
                let out = self.overlay.render(
                    &undistorted,
                    left,
                    right,
                    Some(&geometry),
                    &self.perspective,
                );
                (out, false)
            }
            _ => self.fallback_overlay(&undistorted),
        };

        if previous_mode == TrackingMode::Tracking && outcome.mode == TrackingMode::Searching {
            warn!(
                "⚠️  {} frame {}: lane lost, re-running window search",
                self.stream, frame.index
            );
        }

        self.metrics
            .record(&outcome, geometry.is_some(), held_overlay);

        let processed = ProcessedFrame {
            frame_index: frame.index,
            timestamp_ms: frame.timestamp_ms,
            annotated,
            geometry,
            outcome,
            held_overlay,
        };

        if let Some(log) = self.measurements.as_mut() {
            log.append(&processed.record(&self.stream))?;
        }

        if let Some(dumper) = &self.dumper {
            if dumper.wants(frame.index) {
                dumper.dump(frame.index, "binary", &color_binary)?;
                dumper.dump(
                    frame.index,
                    "search",
                    &visualize_search(&warped, &processed.outcome),
                )?;
                dumper.dump(frame.index, "overlay", &processed.annotated)?;
            }
        }

        Ok(processed)
    }

    /// Held lanes are drawn without labels; their curvature and offset
    /// belong to an earlier frame.
    fn fallback_overlay(&self, undistorted: &RgbImage) -> (RgbImage, bool) {
        match (&self.held, self.config.overlay.hold_last_overlay) {
            (Some(held), true) => (
                self.overlay.render(
                    undistorted,
                    &held.left,
                    &held.right,
                    None,
                    &self.perspective,
                ),
                true,
            ),
            _ => (undistorted.clone(), false),
        }
    }
}
