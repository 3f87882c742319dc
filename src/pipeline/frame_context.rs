// src/pipeline/frame_context.rs
//
// Everything the pipeline produced for one frame, plus the flat record
// written to the measurement log.

use image::RgbImage;
use serde::Serialize;

use crate::lane::{LaneGeometry, TrackOutcome};

#[derive(Debug, Clone)]
pub struct ProcessedFrame {
    pub frame_index: u64,
    pub timestamp_ms: f64,
    /// Undistorted frame with the lane overlay (or unannotated when the
    /// frame produced no geometry and no overlay was held).
    pub annotated: RgbImage,
    pub geometry: Option<LaneGeometry>,
    pub outcome: TrackOutcome,
    /// The overlay shows the last good lane, not this frame's.
    pub held_overlay: bool,
}

impl ProcessedFrame {
    pub fn has_geometry(&self) -> bool {
        self.geometry.is_some()
    }

    pub fn record(&self, stream: &str) -> MeasurementRecord {
        let outcome = &self.outcome;
        MeasurementRecord {
            stream: stream.to_string(),
            frame_index: self.frame_index,
            timestamp_ms: self.timestamp_ms,
            search: outcome.search.as_str(),
            mode: outcome.mode.as_str(),
            left_coeffs: outcome.left.is_valid().then_some(outcome.left.coeffs),
            right_coeffs: outcome.right.is_valid().then_some(outcome.right.coeffs),
            left_rejection: outcome.left.rejection.map(|r| r.to_string()),
            right_rejection: outcome.right.rejection.map(|r| r.to_string()),
            center_offset_px: outcome.bases.center_offset_px,
            geometry: self.geometry,
            held_overlay: self.held_overlay,
        }
    }
}

/// One line of the JSON-lines measurement log.
#[derive(Debug, Clone, Serialize)]
pub struct MeasurementRecord {
    pub stream: String,
    pub frame_index: u64,
    pub timestamp_ms: f64,
    pub search: &'static str,
    pub mode: &'static str,
    pub left_coeffs: Option<[f64; 3]>,
    pub right_coeffs: Option<[f64; 3]>,
    pub left_rejection: Option<String>,
    pub right_rejection: Option<String>,
    pub center_offset_px: f64,
    pub geometry: Option<LaneGeometry>,
    pub held_overlay: bool,
}
