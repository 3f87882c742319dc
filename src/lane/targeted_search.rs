// src/lane/targeted_search.rs
//
// Search around the previous frame's curves. Every active pixel is tested
// against both prior fits evaluated at its row; no histogram seeding and no
// windowing. The histogram bases are still computed so the lateral offset
// does not depend on a possibly stale fit.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::mask::{BinaryMask, LaneBases, PixelSet};
use super::polynomial::LineFit;
use super::window_search::SearchResult;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetedSearchConfig {
    /// Accepted horizontal distance from the prior curve, in pixels.
    pub margin: f64,
}

impl Default for TargetedSearchConfig {
    fn default() -> Self {
        Self { margin: 100.0 }
    }
}

pub fn targeted_search(
    mask: &BinaryMask,
    prior_left: &LineFit,
    prior_right: &LineFit,
    config: &TargetedSearchConfig,
) -> SearchResult {
    let bases = LaneBases::from_mask(mask);
    let mut left = PixelSet::default();
    let mut right = PixelSet::default();

    for y in 0..mask.height() {
        let yf = y as f64;
        let left_x = prior_left.x_at(yf);
        let right_x = prior_right.x_at(yf);

        for x in mask.active_in_row(y) {
            let xf = x as f64;
            if (xf - left_x).abs() < config.margin {
                left.push(x, y);
            }
            if (xf - right_x).abs() < config.margin {
                right.push(x, y);
            }
        }
    }

    debug!(
        "Targeted search: pixels L={} R={} (margin {:.0}px)",
        left.len(),
        right.len(),
        config.margin
    );

    SearchResult {
        left,
        right,
        bases,
        windows: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fit(a: f64, b: f64, c: f64) -> LineFit {
        LineFit::from_coefficients([a, b, c], 100)
    }

    #[test]
    fn test_collects_pixels_near_prior_curves() {
        let mask = BinaryMask::from_fn(400, 100, |x, _| x == 50 || x == 160 || x == 300);
        let config = TargetedSearchConfig { margin: 20.0 };
        let result = targeted_search(&mask, &fit(0.0, 0.0, 55.0), &fit(0.0, 0.0, 295.0), &config);

        assert_eq!(result.left.len(), 100);
        assert!(result.left.iter().all(|(x, _)| x == 50));
        assert_eq!(result.right.len(), 100);
        assert!(result.right.iter().all(|(x, _)| x == 300));
        assert!(result.windows.is_empty());
    }

    #[test]
    fn test_margin_is_exclusive() {
        let mask = BinaryMask::from_fn(200, 10, |x, _| x == 30 || x == 130);
        let config = TargetedSearchConfig { margin: 10.0 };
        // Both lines sit exactly `margin` away from the prior curves.
        let result = targeted_search(&mask, &fit(0.0, 0.0, 40.0), &fit(0.0, 0.0, 140.0), &config);
        assert!(result.left.is_empty());
        assert!(result.right.is_empty());
    }

    #[test]
    fn test_follows_curved_prior() {
        // x = 1e-3 * y^2 + 100 evaluated per row
        let mask = BinaryMask::from_fn(400, 200, |x, y| {
            let expected = (1e-3 * (y * y) as f64 + 100.0).round() as usize;
            x == expected
        });
        let config = TargetedSearchConfig { margin: 5.0 };
        let result = targeted_search(&mask, &fit(1e-3, 0.0, 100.0), &fit(0.0, 0.0, 380.0), &config);
        assert_eq!(result.left.len(), 200);
        assert!(result.right.is_empty());
    }

    #[test]
    fn test_is_deterministic_and_offset_independent_of_fits() {
        let mask = BinaryMask::from_fn(640, 360, |x, y| (x * 3 + y * 5) % 11 == 0);
        let config = TargetedSearchConfig::default();
        let a = targeted_search(&mask, &fit(0.0, 0.0, 150.0), &fit(0.0, 0.0, 450.0), &config);
        let b = targeted_search(&mask, &fit(0.0, 0.0, 150.0), &fit(0.0, 0.0, 450.0), &config);
        let c = targeted_search(&mask, &fit(0.0, 0.0, 10.0), &fit(0.0, 0.0, 600.0), &config);
        assert_eq!(a.left, b.left);
        assert_eq!(a.right, b.right);
        assert_eq!(a.bases, c.bases);
    }
}
