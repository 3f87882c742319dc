// src/lane/mod.rs
//
// Lane boundary tracking engine.
//
// Signal flow per frame:
//   BinaryMask ─┬→ window_search   (SEARCHING) ─┐
//               └→ targeted_search (TRACKING)  ─┼→ polynomial::fit_line ×2
//                                               │   → validate_pair
//                                               └→ tracker (commit) → geometry::measure
//
// Orchestrated by tracker::LaneTracker; everything here is pure and
// infallible, failures are carried as FitRejection values.

pub mod geometry;
pub mod mask;
pub mod polynomial;
pub mod targeted_search;
pub mod tracker;
pub mod window_search;

// Re-export public APIs
pub use geometry::{measure, plot_rows, GeometryConfig, LaneGeometry, MetricScale};
pub use mask::{BinaryMask, LaneBases, PixelSet};
pub use polynomial::{
    fit_line, fit_quadratic, validate_pair, FitConfig, FitRejection, LineFit, PairRejection,
    ValidationConfig,
};
pub use targeted_search::{targeted_search, TargetedSearchConfig};
pub use tracker::{LaneConfig, LaneTracker, SearchKind, TrackOutcome, TrackerState, TrackingMode};
pub use window_search::{window_search, LineSide, SearchResult, SearchWindow, WindowSearchConfig};
