// src/lane/tracker.rs
//
// Two-mode lane tracker.
//
//   SEARCHING ──(both fits valid)──▶ TRACKING
//       ▲                               │
//       └──────(either fit invalid)─────┘
//
// SEARCHING runs the sliding-window search, TRACKING runs the targeted search
// around the stored fits. Stored fits are replaced only as a pair and cleared
// as a pair; geometry needs both lines, so a single surviving line is never
// kept. State commits at the end of `process`, so a caller that drops a
// frame before calling it leaves the tracker untouched.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::mask::{BinaryMask, LaneBases, PixelSet};
use super::polynomial::{
    fit_line, validate_pair, FitConfig, FitRejection, LineFit, ValidationConfig,
};
use super::targeted_search::{targeted_search, TargetedSearchConfig};
use super::window_search::{window_search, SearchWindow, WindowSearchConfig};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LaneConfig {
    pub window: WindowSearchConfig,
    pub targeted: TargetedSearchConfig,
    pub fit: FitConfig,
    pub validation: ValidationConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum TrackingMode {
    /// No usable prior fit; next frame runs the window search.
    #[default]
    Searching,
    /// Valid prior pair; next frame runs the targeted search.
    Tracking,
}

impl TrackingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Searching => "SEARCHING",
            Self::Tracking => "TRACKING",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SearchKind {
    Window,
    Targeted,
}

impl SearchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Window => "WINDOW",
            Self::Targeted => "TARGETED",
        }
    }
}

/// Last-known-good fits for one stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackerState {
    pub mode: TrackingMode,
    pub left: Option<LineFit>,
    pub right: Option<LineFit>,
}

impl TrackerState {
    fn prior_pair(&self) -> Option<(LineFit, LineFit)> {
        match (self.mode, self.left, self.right) {
            (TrackingMode::Tracking, Some(l), Some(r)) => Some((l, r)),
            _ => None,
        }
    }
}

/// What happened on one frame.
#[derive(Debug, Clone)]
pub struct TrackOutcome {
    pub frame_index: u64,
    pub search: SearchKind,
    pub left: LineFit,
    pub right: LineFit,
    pub bases: LaneBases,
    /// Pixels assigned to each line by the search.
    pub left_pixels: PixelSet,
    pub right_pixels: PixelSet,
    /// Windows visited by the window search (empty for targeted frames).
    pub windows: Vec<SearchWindow>,
    /// Mode the tracker is in after this frame.
    pub mode: TrackingMode,
}

impl TrackOutcome {
    /// Both fits, when both are valid.
    pub fn fits(&self) -> Option<(&LineFit, &LineFit)> {
        (self.left.is_valid() && self.right.is_valid()).then_some((&self.left, &self.right))
    }
}

/// Per-stream tracker. Create one per video; call `reset` between streams.
#[derive(Debug, Clone)]
pub struct LaneTracker {
    config: LaneConfig,
    state: TrackerState,
    frames_processed: u64,
}

impl LaneTracker {
    pub fn new(config: LaneConfig) -> Self {
        Self {
            config,
            state: TrackerState::default(),
            frames_processed: 0,
        }
    }

    pub fn config(&self) -> &LaneConfig {
        &self.config
    }

    pub fn state(&self) -> &TrackerState {
        &self.state
    }

    pub fn mode(&self) -> TrackingMode {
        self.state.mode
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    /// Back to SEARCHING with no stored fits.
    pub fn reset(&mut self) {
        self.state = TrackerState::default();
        self.frames_processed = 0;
    }

    /// Search, fit, validate and commit one frame.
    pub fn process(&mut self, mask: &BinaryMask) -> TrackOutcome {
        let frame_index = self.frames_processed;

        let (search, result) = match self.state.prior_pair() {
            Some((prior_left, prior_right)) => (
                SearchKind::Targeted,
                targeted_search(mask, &prior_left, &prior_right, &self.config.targeted),
            ),
            None => (
                SearchKind::Window,
                window_search(mask, &self.config.window),
            ),
        };

        let mut left = fit_line(&result.left, &self.config.fit);
        let mut right = fit_line(&result.right, &self.config.fit);

        if left.is_valid() && right.is_valid() {
            if let Err(rejection) =
                validate_pair(&left, &right, mask.height(), &self.config.validation)
            {
                left = left.rejected(FitRejection::Pair(rejection));
                right = right.rejected(FitRejection::Pair(rejection));
            }
        }

        let previous = self.state.mode;
        self.state = if left.is_valid() && right.is_valid() {
            TrackerState {
                mode: TrackingMode::Tracking,
                left: Some(left),
                right: Some(right),
            }
        } else {
            TrackerState::default()
        };
        self.frames_processed += 1;

        if previous != self.state.mode {
            info!(
                "🛣️ Frame {}: {} → {} ({} search)",
                frame_index,
                previous.as_str(),
                self.state.mode.as_str(),
                search.as_str()
            );
        }
        if let Some(reason) = left.rejection.or(right.rejection) {
            debug!(
                "Frame {}: fits rejected (L: {}, R: {}), first reason: {}",
                frame_index,
                left.rejection.map_or("ok", |r| r.as_str()),
                right.rejection.map_or("ok", |r| r.as_str()),
                reason
            );
        } else {
            debug!(
                "Frame {}: L A={:.3e} ({} px, rmse {:.1}) R A={:.3e} ({} px, rmse {:.1})",
                frame_index,
                left.coeffs[0],
                left.samples,
                left.rmse_px,
                right.coeffs[0],
                right.samples,
                right.rmse_px
            );
        }

        TrackOutcome {
            frame_index,
            search,
            left,
            right,
            bases: result.bases,
            left_pixels: result.left,
            right_pixels: result.right,
            windows: result.windows,
            mode: self.state.mode,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Two 8px-wide straight lines, `spacing` apart, centred on the image.
    fn lane_mask(width: usize, height: usize, left: usize, spacing: usize) -> BinaryMask {
        BinaryMask::from_fn(width, height, |x, _| {
            (left..left + 8).contains(&x) || (left + spacing..left + spacing + 8).contains(&x)
        })
    }

    #[test]
    fn test_starts_searching() {
        let tracker = LaneTracker::new(LaneConfig::default());
        assert_eq!(tracker.mode(), TrackingMode::Searching);
        assert!(tracker.state().left.is_none());
        assert!(tracker.state().right.is_none());
    }

    #[test]
    fn test_valid_frame_switches_to_targeted_search() {
        let mut tracker = LaneTracker::new(LaneConfig::default());
        let mask = lane_mask(1280, 720, 286, 700);

        let first = tracker.process(&mask);
        assert_eq!(first.search, SearchKind::Window);
        assert!(first.fits().is_some());
        assert_eq!(tracker.mode(), TrackingMode::Tracking);

        let second = tracker.process(&mask);
        assert_eq!(second.search, SearchKind::Targeted);
        assert_eq!(second.mode, TrackingMode::Tracking);
    }

    #[test]
    fn test_all_zero_mask_falls_back_to_window_search() {
        let mut tracker = LaneTracker::new(LaneConfig::default());
        let lanes = lane_mask(1280, 720, 286, 700);
        let empty = BinaryMask::new(1280, 720);

        tracker.process(&lanes);
        assert_eq!(tracker.mode(), TrackingMode::Tracking);

        let lost = tracker.process(&empty);
        assert_eq!(lost.search, SearchKind::Targeted);
        assert!(matches!(
            lost.left.rejection,
            Some(FitRejection::InsufficientPixels { found: 0, .. })
        ));
        assert!(matches!(
            lost.right.rejection,
            Some(FitRejection::InsufficientPixels { found: 0, .. })
        ));
        assert_eq!(tracker.mode(), TrackingMode::Searching);
        assert!(tracker.state().left.is_none());

        let next = tracker.process(&lanes);
        assert_eq!(next.search, SearchKind::Window);
    }

    #[test]
    fn test_one_bad_line_clears_both() {
        let mut tracker = LaneTracker::new(LaneConfig::default());
        tracker.process(&lane_mask(1280, 720, 286, 700));

        // Right line gone
        let left_only = BinaryMask::from_fn(1280, 720, |x, _| (286..294).contains(&x));
        let outcome = tracker.process(&left_only);
        assert!(outcome.left.is_valid());
        assert!(!outcome.right.is_valid());
        assert_eq!(tracker.state(), &TrackerState::default());
    }

    #[test]
    fn test_implausible_width_rejects_pair() {
        let mut tracker = LaneTracker::new(LaneConfig::default());
        let narrow = lane_mask(1280, 720, 500, 250);
        let outcome = tracker.process(&narrow);

        assert!(matches!(
            outcome.left.rejection,
            Some(FitRejection::Pair(_))
        ));
        assert_eq!(tracker.mode(), TrackingMode::Searching);
    }

    #[test]
    fn test_transition_law_over_sequence() {
        let mut tracker = LaneTracker::new(LaneConfig::default());
        let good = lane_mask(1280, 720, 286, 700);
        let bad = BinaryMask::new(1280, 720);
        let sequence = [&good, &good, &bad, &bad, &good, &bad, &good, &good];

        let mut previous_valid: Option<bool> = None;
        for mask in sequence {
            let outcome = tracker.process(mask);
            match previous_valid {
                Some(true) => assert_eq!(outcome.search, SearchKind::Targeted),
                _ => assert_eq!(outcome.search, SearchKind::Window),
            }
            previous_valid = Some(outcome.fits().is_some());
        }
    }

    #[test]
    fn test_reset_forgets_fits() {
        let mut tracker = LaneTracker::new(LaneConfig::default());
        tracker.process(&lane_mask(1280, 720, 286, 700));
        tracker.reset();
        assert_eq!(tracker.mode(), TrackingMode::Searching);
        assert_eq!(tracker.frames_processed(), 0);
        let outcome = tracker.process(&lane_mask(1280, 720, 286, 700));
        assert_eq!(outcome.search, SearchKind::Window);
    }
}
