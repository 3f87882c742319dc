// src/lane/window_search.rs
//
// Full search used when no prior fit is available.
//
// The bottom-half column histogram seeds one x position per line. The image
// is then cut into `windows` horizontal bands, walked bottom to top. In each
// band a window of ±margin around the current x collects active pixels; when
// the window holds more than `min_pixels`, the next band is recentered on
// their mean x. Empty bands leave the center where it was.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::mask::{BinaryMask, LaneBases, PixelSet};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowSearchConfig {
    /// Number of horizontal bands stacked from bottom to top.
    pub windows: usize,
    /// Half-width of each window in pixels.
    pub margin: usize,
    /// Pixels a window must exceed before the next band is recentered.
    pub min_pixels: usize,
}

impl Default for WindowSearchConfig {
    fn default() -> Self {
        Self {
            windows: 9,
            margin: 100,
            min_pixels: 50,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LineSide {
    Left,
    Right,
}

impl LineSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Left => "LEFT",
            Self::Right => "RIGHT",
        }
    }
}

/// One window visited by the scan. Bounds are half-open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchWindow {
    pub side: LineSide,
    pub x_low: usize,
    pub x_high: usize,
    pub y_low: usize,
    pub y_high: usize,
    pub pixel_count: usize,
}

/// Output shared by both search strategies.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub left: PixelSet,
    pub right: PixelSet,
    pub bases: LaneBases,
    /// Windows visited; empty for the targeted search.
    pub windows: Vec<SearchWindow>,
}

pub fn window_search(mask: &BinaryMask, config: &WindowSearchConfig) -> SearchResult {
    let bases = LaneBases::from_mask(mask);
    let n_windows = config.windows.max(1);
    let window_height = mask.height() / n_windows;

    let mut result = SearchResult {
        left: PixelSet::default(),
        right: PixelSet::default(),
        bases,
        windows: Vec::with_capacity(n_windows * 2),
    };

    if window_height == 0 {
        debug!(
            "Window search skipped: mask height {} < {} windows",
            mask.height(),
            n_windows
        );
        return result;
    }

    let mut left_current = bases.left_x;
    let mut right_current = bases.right_x;

    for band in 0..n_windows {
        let y_high = mask.height() - band * window_height;
        let y_low = y_high - window_height;

        for (side, current, set) in [
            (LineSide::Left, &mut left_current, &mut result.left),
            (LineSide::Right, &mut right_current, &mut result.right),
        ] {
            let mut window = SearchWindow {
                side,
                x_low: current.saturating_sub(config.margin),
                x_high: (*current + config.margin).min(mask.width()),
                y_low,
                y_high,
                pixel_count: 0,
            };
            let sum_x = collect_window(mask, &mut window, set);
            if window.pixel_count > config.min_pixels {
                *current = sum_x / window.pixel_count;
            }
            result.windows.push(window);
        }
    }

    debug!(
        "Window search: bases L={} R={}, pixels L={} R={}",
        bases.left_x,
        bases.right_x,
        result.left.len(),
        result.right.len()
    );

    result
}

/// Push the window's active pixels into `out`, record their count on the
/// window and return the sum of their x positions.
fn collect_window(mask: &BinaryMask, window: &mut SearchWindow, out: &mut PixelSet) -> usize {
    let mut sum_x = 0usize;

    for y in window.y_low..window.y_high {
        for x in mask.active_in_row(y) {
            if x < window.x_low {
                continue;
            }
            if x >= window.x_high {
                break;
            }
            out.push(x, y);
            window.pixel_count += 1;
            sum_x += x;
        }
    }

    sum_x
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vertical_lines(width: usize, height: usize, left: usize, right: usize) -> BinaryMask {
        BinaryMask::from_fn(width, height, |x, _| {
            (left..left + 4).contains(&x) || (right..right + 4).contains(&x)
        })
    }

    #[test]
    fn test_finds_both_vertical_lines() {
        let mask = vertical_lines(400, 180, 80, 300);
        let result = window_search(&mask, &WindowSearchConfig::default());

        assert_eq!(result.bases.left_x, 80);
        assert_eq!(result.bases.right_x, 300);
        assert_eq!(result.left.len(), 4 * 180);
        assert_eq!(result.right.len(), 4 * 180);
        assert!(result.left.iter().all(|(x, _)| (80..84).contains(&x)));
        assert_eq!(result.windows.len(), 18);
    }

    #[test]
    fn test_window_recenters_on_slanted_line() {
        // Line drifts 1px right every 2 rows going up; margin 20 would lose
        // it without recentering.
        let height = 180;
        let mask = BinaryMask::from_fn(300, height, |x, y| {
            let center = 60 + (height - 1 - y) / 2;
            x + 2 >= center && x <= center + 2
        });
        let config = WindowSearchConfig {
            windows: 9,
            margin: 20,
            min_pixels: 10,
        };
        let result = window_search(&mask, &config);

        assert_eq!(result.left.distinct_rows(), height);
        assert_eq!(result.left.len(), mask.count_active());
    }

    #[test]
    fn test_empty_bands_keep_center() {
        // Dashed line: only every other band has paint.
        let mask = BinaryMask::from_fn(400, 180, |x, y| (100..104).contains(&x) && (y / 20) % 2 == 0);
        let result = window_search(&mask, &WindowSearchConfig::default());

        let left_windows: Vec<_> = result
            .windows
            .iter()
            .filter(|w| w.side == LineSide::Left)
            .collect();
        assert!(left_windows.iter().any(|w| w.pixel_count == 0));
        assert!(left_windows.iter().all(|w| w.x_low <= 1));
        assert_eq!(result.left.len(), mask.count_active());
    }

    #[test]
    fn test_all_zero_mask_yields_empty_sets() {
        let mask = BinaryMask::new(1280, 720);
        let result = window_search(&mask, &WindowSearchConfig::default());
        assert!(result.left.is_empty());
        assert!(result.right.is_empty());
    }

    #[test]
    fn test_is_deterministic() {
        let mask = BinaryMask::from_fn(640, 360, |x, y| (x * 7 + y * 13) % 17 == 0);
        let config = WindowSearchConfig::default();
        let a = window_search(&mask, &config);
        let b = window_search(&mask, &config);
        assert_eq!(a.left, b.left);
        assert_eq!(a.right, b.right);
        assert_eq!(a.windows, b.windows);
    }
}
