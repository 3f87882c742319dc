// src/lane/geometry.rs
//
// Pixel fits → physical lane geometry.
//
// Radius of curvature for x = A·y² + B·y + C at y₀:
//   R = (1 + (2A·y₀ + B)²)^1.5 / |2A|
// evaluated at the bottom row, nearest the vehicle. The metric radius comes
// from re-fitting the sampled curve in meters (see LineFit::metric_coefficients)
// so both use the same MetricScale.

use serde::{Deserialize, Serialize};

use super::polynomial::LineFit;

/// Meters per warped pixel. Defaults assume a 30 m longitudinal span over
/// 720 rows and a 3.7 m lane over 700 columns.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricScale {
    pub ym_per_pix: f64,
    pub xm_per_pix: f64,
}

impl Default for MetricScale {
    fn default() -> Self {
        Self {
            ym_per_pix: 30.0 / 720.0,
            xm_per_pix: 3.7 / 700.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeometryConfig {
    pub scale: MetricScale,
    /// |2A| (metric) below which a line counts as straight.
    pub straight_epsilon: f64,
    /// Radii are clamped to this; straight lines report it.
    pub max_radius_km: f64,
    /// Round each line's radius before averaging instead of rounding the mean.
    pub per_line_rounding: bool,
}

impl Default for GeometryConfig {
    fn default() -> Self {
        Self {
            scale: MetricScale::default(),
            straight_epsilon: 1e-5,
            max_radius_km: 100.0,
            per_line_rounding: false,
        }
    }
}

/// Per-frame lane measurements.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LaneGeometry {
    /// Mean of left and right radii, one decimal.
    pub radius_of_curvature_km: f64,
    /// Vehicle offset from lane center, one decimal. Positive when the lane
    /// center lies right of the image center (vehicle left of center).
    pub lateral_offset_cm: f64,
    pub left_radius_km: f64,
    pub right_radius_km: f64,
    pub left_radius_px: Option<f64>,
    pub right_radius_px: Option<f64>,
    /// Both lines below the straight threshold.
    pub straight: bool,
}

impl LaneGeometry {
    pub fn curvature_label(&self) -> String {
        if self.straight {
            format!("Radius of Curvature = straight (>{:.1}km)", self.radius_of_curvature_km)
        } else {
            format!("Radius of Curvature = {:.1}(km)", self.radius_of_curvature_km)
        }
    }

    pub fn offset_label(&self) -> String {
        let side = if self.lateral_offset_cm > 0.0 {
            "left"
        } else {
            "right"
        };
        format!(
            "Vehicle is {:.1}cm {} of center",
            self.lateral_offset_cm.abs(),
            side
        )
    }
}

/// Radius of curvature at `y_eval`. None when |2A| is below `straight_epsilon`.
pub fn radius_of_curvature(coeffs: [f64; 3], y_eval: f64, straight_epsilon: f64) -> Option<f64> {
    let [a, b, _] = coeffs;
    let two_a = 2.0 * a;
    if !two_a.is_finite() || two_a.abs() < straight_epsilon.max(f64::MIN_POSITIVE) {
        return None;
    }
    let slope = two_a * y_eval + b;
    Some((1.0 + slope * slope).powf(1.5) / two_a.abs())
}

/// Lateral offset in centimeters, unrounded.
pub fn offset_cm(center_offset_px: f64, scale: &MetricScale) -> f64 {
    center_offset_px * scale.xm_per_pix * 100.0
}

/// Row coordinates 0..height as f64, the y-axis of the overlay polygon.
pub fn plot_rows(height: usize) -> Vec<f64> {
    (0..height).map(|y| y as f64).collect()
}

#[inline]
fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

struct LineRadius {
    km: f64,
    px: Option<f64>,
    straight: bool,
}

fn line_radius(fit: &LineFit, image_height: usize, config: &GeometryConfig) -> LineRadius {
    let y_eval = image_height.saturating_sub(1) as f64;
    let px = radius_of_curvature(fit.coeffs, y_eval, f64::MIN_POSITIVE);

    let metric = fit
        .metric_coefficients(image_height, &config.scale)
        .and_then(|m| {
            radius_of_curvature(m, y_eval * config.scale.ym_per_pix, config.straight_epsilon)
        });

    match metric {
        Some(r) if r / 1000.0 < config.max_radius_km => LineRadius {
            km: r / 1000.0,
            px,
            straight: false,
        },
        _ => LineRadius {
            km: config.max_radius_km,
            px,
            straight: true,
        },
    }
}

/// Curvature and offset for a validated pair of fits.
pub fn measure(
    left: &LineFit,
    right: &LineFit,
    center_offset_px: f64,
    image_height: usize,
    config: &GeometryConfig,
) -> LaneGeometry {
    let l = line_radius(left, image_height, config);
    let r = line_radius(right, image_height, config);

    let radius_of_curvature_km = if config.per_line_rounding {
        (round1(l.km) + round1(r.km)) / 2.0
    } else {
        round1((l.km + r.km) / 2.0)
    };

    LaneGeometry {
        radius_of_curvature_km,
        lateral_offset_cm: round1(offset_cm(center_offset_px, &config.scale)),
        left_radius_km: l.km,
        right_radius_km: r.km,
        left_radius_px: l.px,
        right_radius_px: r.px,
        straight: l.straight && r.straight,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fit(a: f64, b: f64, c: f64) -> LineFit {
        LineFit::from_coefficients([a, b, c], 1000)
    }

    #[test]
    fn test_radius_formula() {
        // Circle-like: A = 1/(2R) with zero slope at y₀ = 0
        let r = radius_of_curvature([0.005, 0.0, 0.0], 0.0, 1e-9).unwrap();
        assert!((r - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_curvature_never_divides() {
        assert!(radius_of_curvature([0.0, 0.3, 10.0], 719.0, 0.0).is_none());
        assert!(radius_of_curvature([1e-9, 0.0, 0.0], 0.0, 1e-5).is_none());
    }

    #[test]
    fn test_straight_lane_reports_straight() {
        let g = measure(
            &fit(0.0, 0.0, 300.0),
            &fit(0.0, 0.0, 1000.0),
            10.0,
            720,
            &GeometryConfig::default(),
        );
        assert!(g.straight);
        assert!(g.radius_of_curvature_km > 10.0);
        assert!(g.curvature_label().contains("straight"));
    }

    #[test]
    fn test_sharp_curve_is_small_and_positive() {
        let g = measure(
            &fit(2e-3, -1.0, 500.0),
            &fit(2e-3, -1.0, 1200.0),
            0.0,
            720,
            &GeometryConfig::default(),
        );
        assert!(!g.straight);
        assert!(g.radius_of_curvature_km > 0.0);
        assert!(g.radius_of_curvature_km < 1.0, "R = {}", g.radius_of_curvature_km);
        assert!(g.left_radius_px.unwrap() > 0.0);
    }

    #[test]
    fn test_curvature_sign_does_not_change_radius() {
        let config = GeometryConfig::default();
        let pos = measure(&fit(5e-4, 0.0, 300.0), &fit(5e-4, 0.0, 1000.0), 0.0, 720, &config);
        let neg = measure(&fit(-5e-4, 0.0, 300.0), &fit(-5e-4, 0.0, 1000.0), 0.0, 720, &config);
        assert!((pos.radius_of_curvature_km - neg.radius_of_curvature_km).abs() < 1e-9);
    }

    #[test]
    fn test_offset_is_linear_in_pixels() {
        let config = GeometryConfig::default();
        let xm = config.scale.xm_per_pix;
        let base = offset_cm(12.0, &config.scale);
        let shifted = offset_cm(12.0 + 35.0, &config.scale);
        assert!((shifted - base - 35.0 * xm * 100.0).abs() < 1e-12);

        let g = measure(&fit(0.0, 0.0, 300.0), &fit(0.0, 0.0, 1000.0), 35.0, 720, &config);
        assert!((g.lateral_offset_cm - 18.5).abs() < 1e-9);
        assert!(g.offset_label().contains("left"));
    }

    #[test]
    fn test_rounding_modes() {
        // Radii chosen so rounding before and after averaging differ:
        // metric A for R = 1.249 km and R = 1.349 km, zero slope at y₀.
        let config = GeometryConfig::default();
        let s = config.scale;
        let px_a = |r_m: f64| s.ym_per_pix * s.ym_per_pix / (2.0 * r_m * s.xm_per_pix);
        let y0 = 719.0;
        let make = |r_m: f64, c: f64| {
            let a = px_a(r_m);
            fit(a, -2.0 * a * y0, c)
        };
        let left = make(1_249.0, 300.0);
        let right = make(1_349.0, 1000.0);

        let averaged = measure(&left, &right, 0.0, 720, &config);
        let per_line = measure(
            &left,
            &right,
            0.0,
            720,
            &GeometryConfig {
                per_line_rounding: true,
                ..GeometryConfig::default()
            },
        );
        // 1.249 and 1.349 → mean 1.299 → 1.3; per line 1.2 and 1.3 → 1.25
        assert!((averaged.radius_of_curvature_km - 1.3).abs() < 1e-9);
        assert!((per_line.radius_of_curvature_km - 1.25).abs() < 1e-9);
    }
}
