// src/preprocessing.rs
//
// Per-frame image preparation ahead of the lane engine:
//   raw RGB → calibration::Undistorter → threshold::binarize → perspective::warp_mask
//
// All three are stateless once constructed. Resampling goes through
// imageproc's `warp_into_with`, driven by each stage's own pixel mapping.

pub mod calibration;
pub mod perspective;
pub mod threshold;

pub use calibration::{CalibrationConfig, CameraCalibration, Undistorter};
pub use perspective::{PerspectiveConfig, PerspectiveTransform};
pub use threshold::{binarize, ThresholdConfig};

/// Pre-image for output pixels with no source. Lies outside every image, so
/// both nearest and bilinear interpolation fall back to the default pixel.
pub(crate) const UNMAPPED: (f32, f32) = (-1.0, -1.0);
