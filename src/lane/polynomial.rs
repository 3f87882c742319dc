// src/lane/polynomial.rs
//
// Quadratic lane model x = A·y² + B·y + C in warped pixel space.
//
// Fitting:
//   - y is centred and scaled to [-1, 1] before building the normal
//     equations, then the coefficients are mapped back to raw pixel y.
//     Raw y reaches ~720, so y⁴ sums would otherwise span ~12 orders of
//     magnitude and lose the low coefficients.
//   - Too few samples or too few distinct rows produce an invalid LineFit,
//     never an error.
//
// Validation:
//   - Per line: sample count and distinct rows (here).
//   - Per pair: lane width at the bottom row and curvature sign agreement
//     (`validate_pair`). A failed pair check invalidates both lines.

use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use super::geometry::MetricScale;
use super::mask::PixelSet;

/// A quadratic is underdetermined below this many samples.
pub const MIN_QUADRATIC_SAMPLES: usize = 3;

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FitConfig {
    /// Minimum pixels per line. Values below 3 are raised to 3.
    pub min_samples: usize,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self { min_samples: 50 }
    }
}

impl FitConfig {
    pub fn effective_min_samples(&self) -> usize {
        self.min_samples.max(MIN_QUADRATIC_SAMPLES)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Enables the pair checks below. Per-line checks always run.
    pub enabled: bool,
    /// Lane width in warped pixels that `xm_per_pix` was calibrated against.
    pub expected_lane_width_px: f64,
    /// Accepted relative deviation from `expected_lane_width_px`.
    pub lane_width_tolerance: f64,
    /// Opposite curvature signs are rejected only when both |A| exceed this.
    pub curvature_sign_min: f64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            expected_lane_width_px: 700.0,
            lane_width_tolerance: 0.35,
            curvature_sign_min: 4e-4,
        }
    }
}

// ============================================================================
// TYPES
// ============================================================================

/// Why a pair of otherwise valid fits was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum PairRejection {
    LaneWidth { width_px: f64 },
    CurvatureSignMismatch { left_a: f64, right_a: f64 },
}

/// Why a LineFit is invalid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum FitRejection {
    InsufficientPixels { found: usize, required: usize },
    DegenerateRows { distinct_rows: usize },
    Singular,
    Pair(PairRejection),
}

impl FitRejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InsufficientPixels { .. } => "INSUFFICIENT_PIXELS",
            Self::DegenerateRows { .. } => "DEGENERATE_ROWS",
            Self::Singular => "SINGULAR",
            Self::Pair(PairRejection::LaneWidth { .. }) => "LANE_WIDTH",
            Self::Pair(PairRejection::CurvatureSignMismatch { .. }) => "CURVATURE_SIGN",
        }
    }
}

impl fmt::Display for FitRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InsufficientPixels { found, required } => {
                write!(f, "insufficient pixels ({found} < {required})")
            }
            Self::DegenerateRows { distinct_rows } => {
                write!(f, "only {distinct_rows} distinct rows")
            }
            Self::Singular => write!(f, "singular normal equations"),
            Self::Pair(PairRejection::LaneWidth { width_px }) => {
                write!(f, "implausible lane width {width_px:.0}px")
            }
            Self::Pair(PairRejection::CurvatureSignMismatch { left_a, right_a }) => {
                write!(f, "curvature signs disagree (L={left_a:.2e}, R={right_a:.2e})")
            }
        }
    }
}

/// Quadratic fit for one lane line: x = A·y² + B·y + C, raw pixel y.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LineFit {
    /// [A, B, C]
    pub coeffs: [f64; 3],
    /// Pixels used for the fit.
    pub samples: usize,
    /// RMS horizontal residual in pixels.
    pub rmse_px: f64,
    /// Set when the fit must not be used.
    pub rejection: Option<FitRejection>,
}

impl LineFit {
    /// A valid fit with known coefficients and no residual information.
    pub fn from_coefficients(coeffs: [f64; 3], samples: usize) -> Self {
        Self {
            coeffs,
            samples,
            rmse_px: 0.0,
            rejection: None,
        }
    }

    pub fn invalid(samples: usize, rejection: FitRejection) -> Self {
        Self {
            coeffs: [0.0; 3],
            samples,
            rmse_px: 0.0,
            rejection: Some(rejection),
        }
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.rejection.is_none()
    }

    /// Same coefficients, marked invalid.
    pub fn rejected(mut self, rejection: FitRejection) -> Self {
        self.rejection = Some(rejection);
        self
    }

    #[inline]
    pub fn x_at(&self, y: f64) -> f64 {
        let [a, b, c] = self.coeffs;
        a * y * y + b * y + c
    }

    /// Fit evaluated at every row 0..height.
    pub fn sample_rows(&self, height: usize) -> Vec<f64> {
        (0..height).map(|y| self.x_at(y as f64)).collect()
    }

    /// Re-fit in metric space: rows 0..height are evaluated through this fit,
    /// scaled by `scale`, and fitted again. Returns [A, B, C] in meters.
    pub fn metric_coefficients(&self, height: usize, scale: &MetricScale) -> Option<[f64; 3]> {
        let samples: Vec<(f64, f64)> = (0..height)
            .map(|y| {
                let yf = y as f64;
                (yf * scale.ym_per_pix, self.x_at(yf) * scale.xm_per_pix)
            })
            .collect();
        fit_quadratic(&samples).map(|q| q.coeffs)
    }
}

// ============================================================================
// LEAST SQUARES
// ============================================================================

/// Result of a raw quadratic least-squares solve.
#[derive(Debug, Clone, Copy)]
pub struct Quadratic {
    pub coeffs: [f64; 3],
    pub rmse: f64,
}

/// Least-squares x(y) = A·y² + B·y + C over (y, x) samples.
///
/// Returns None for fewer than 3 samples, a zero y-span, or a singular
/// system.
pub fn fit_quadratic(samples: &[(f64, f64)]) -> Option<Quadratic> {
    if samples.len() < MIN_QUADRATIC_SAMPLES {
        return None;
    }

    let y_min = samples.iter().map(|s| s.0).fold(f64::INFINITY, f64::min);
    let y_max = samples.iter().map(|s| s.0).fold(f64::NEG_INFINITY, f64::max);
    let half_span = (y_max - y_min) / 2.0;
    if !half_span.is_finite() || half_span <= f64::EPSILON {
        return None;
    }
    let mid = (y_max + y_min) / 2.0;

    // Power sums of normalized t and the x-weighted sums.
    let mut s = [0.0f64; 5];
    let mut t_x = [0.0f64; 3];
    for &(y, x) in samples {
        let t = (y - mid) / half_span;
        let t2 = t * t;
        s[0] += 1.0;
        s[1] += t;
        s[2] += t2;
        s[3] += t2 * t;
        s[4] += t2 * t2;
        t_x[0] += x;
        t_x[1] += x * t;
        t_x[2] += x * t2;
    }

    let normal = Matrix3::new(
        s[4], s[3], s[2], //
        s[3], s[2], s[1], //
        s[2], s[1], s[0],
    );
    let rhs = Vector3::new(t_x[2], t_x[1], t_x[0]);
    let sol = normal.lu().solve(&rhs)?;
    let (a_t, b_t, c_t) = (sol[0], sol[1], sol[2]);

    // x = a_t·t² + b_t·t + c_t with t = (y − mid) / half_span
    let inv = 1.0 / half_span;
    let inv2 = inv * inv;
    let a = a_t * inv2;
    let b = b_t * inv - 2.0 * a_t * mid * inv2;
    let c = a_t * mid * mid * inv2 - b_t * mid * inv + c_t;

    if !(a.is_finite() && b.is_finite() && c.is_finite()) {
        return None;
    }

    let sse: f64 = samples
        .iter()
        .map(|&(y, x)| {
            let r = x - (a * y * y + b * y + c);
            r * r
        })
        .sum();

    Some(Quadratic {
        coeffs: [a, b, c],
        rmse: (sse / samples.len() as f64).sqrt(),
    })
}

/// Fit one line's pixel set, enforcing the per-line preconditions.
pub fn fit_line(pixels: &PixelSet, config: &FitConfig) -> LineFit {
    let required = config.effective_min_samples();
    let found = pixels.len();

    if found < required {
        return LineFit::invalid(found, FitRejection::InsufficientPixels { found, required });
    }

    let distinct_rows = pixels.distinct_rows();
    if distinct_rows < MIN_QUADRATIC_SAMPLES {
        return LineFit::invalid(found, FitRejection::DegenerateRows { distinct_rows });
    }

    match fit_quadratic(&pixels.samples()) {
        Some(q) => LineFit {
            coeffs: q.coeffs,
            samples: found,
            rmse_px: q.rmse,
            rejection: None,
        },
        None => {
            debug!("📐 Singular lane fit over {} pixels", found);
            LineFit::invalid(found, FitRejection::Singular)
        }
    }
}

/// Pair sanity checks on two individually valid fits.
pub fn validate_pair(
    left: &LineFit,
    right: &LineFit,
    image_height: usize,
    config: &ValidationConfig,
) -> Result<(), PairRejection> {
    if !config.enabled {
        return Ok(());
    }

    let y_bottom = image_height.saturating_sub(1) as f64;
    let width_px = right.x_at(y_bottom) - left.x_at(y_bottom);
    let min_width = config.expected_lane_width_px * (1.0 - config.lane_width_tolerance);
    let max_width = config.expected_lane_width_px * (1.0 + config.lane_width_tolerance);
    if !(min_width..=max_width).contains(&width_px) {
        return Err(PairRejection::LaneWidth { width_px });
    }

    let left_a = left.coeffs[0];
    let right_a = right.coeffs[0];
    if left_a.signum() != right_a.signum()
        && left_a.abs() > config.curvature_sign_min
        && right_a.abs() > config.curvature_sign_min
    {
        return Err(PairRejection::CurvatureSignMismatch { left_a, right_a });
    }

    Ok(())
}
