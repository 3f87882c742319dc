// src/pipeline/metrics.rs
//
// Per-stream counters. Reset at the start of every input and summarized
// when it ends.

use std::time::Instant;

use crate::lane::{SearchKind, TrackOutcome, TrackingMode};

#[derive(Debug, Clone)]
pub struct PipelineMetrics {
    pub total_frames: u64,
    pub frames_with_geometry: u64,
    pub window_searches: u64,
    pub targeted_searches: u64,
    /// TRACKING → SEARCHING transitions.
    pub tracking_losses: u64,
    pub held_overlays: u64,
    pub skipped_frames: u64,
    pub started_at: Instant,
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            total_frames: 0,
            frames_with_geometry: 0,
            window_searches: 0,
            targeted_searches: 0,
            tracking_losses: 0,
            held_overlays: 0,
            skipped_frames: 0,
            started_at: Instant::now(),
        }
    }

    pub fn record(&mut self, outcome: &TrackOutcome, has_geometry: bool, held_overlay: bool) {
        self.total_frames += 1;
        match outcome.search {
            SearchKind::Window => self.window_searches += 1,
            SearchKind::Targeted => {
                self.targeted_searches += 1;
                if outcome.mode == TrackingMode::Searching {
                    self.tracking_losses += 1;
                }
            }
        }
        if has_geometry {
            self.frames_with_geometry += 1;
        }
        if held_overlay {
            self.held_overlays += 1;
        }
    }

    pub fn record_skip(&mut self) {
        self.skipped_frames += 1;
    }

    pub fn fps(&self) -> f64 {
        let elapsed = self.started_at.elapsed().as_secs_f64();
        if elapsed > 0.01 {
            self.total_frames as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            total_frames: self.total_frames,
            frames_with_geometry: self.frames_with_geometry,
            geometry_rate: self.frames_with_geometry as f64 / self.total_frames.max(1) as f64,
            window_searches: self.window_searches,
            targeted_searches: self.targeted_searches,
            tracking_losses: self.tracking_losses,
            held_overlays: self.held_overlays,
            skipped_frames: self.skipped_frames,
            avg_fps: self.fps(),
            elapsed_secs: self.started_at.elapsed().as_secs_f64(),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSummary {
    pub total_frames: u64,
    pub frames_with_geometry: u64,
    pub geometry_rate: f64,
    pub window_searches: u64,
    pub targeted_searches: u64,
    pub tracking_losses: u64,
    pub held_overlays: u64,
    pub skipped_frames: u64,
    pub avg_fps: f64,
    pub elapsed_secs: f64,
}
