// tests/common/mod.rs
//
// Synthetic masks and frames shared by the scenario tests. Noise is a fixed
// hash of (row, sample, salt) so every run sees the same pixels.

#![allow(dead_code)]

use image::{Rgb, RgbImage};
use lane_tracker::lane::BinaryMask;
use lane_tracker::preprocessing::PerspectiveTransform;

pub const WIDTH: usize = 1280;
pub const HEIGHT: usize = 720;

/// Deterministic value in [-50, 50].
pub fn noise(y: usize, k: usize, salt: usize) -> i64 {
    let h = (y as u64).wrapping_mul(73_856_093)
        ^ (k as u64).wrapping_mul(19_349_663)
        ^ (salt as u64).wrapping_mul(83_492_791);
    (h % 101) as i64 - 50
}

/// Two curves x = c + a·y², `per_row` noisy pixels per row each.
pub fn noisy_lane_mask(a: f64, left_c: f64, right_c: f64, per_row: usize) -> BinaryMask {
    let mut mask = BinaryMask::new(WIDTH, HEIGHT);
    for y in 0..HEIGHT {
        for k in 0..per_row {
            for (salt, c) in [(1, left_c), (2, right_c)] {
                let x = (c + a * (y * y) as f64).round() as i64 + noise(y, k, salt);
                if (0..WIDTH as i64).contains(&x) {
                    mask.set(x as usize, y, true);
                }
            }
        }
    }
    mask
}

/// Two 8px-wide vertical lines starting at `left` and `left + spacing`,
/// shifted right by `shift`.
pub fn straight_lane_mask(left: usize, spacing: usize, shift: usize) -> BinaryMask {
    let l = left + shift;
    let r = left + spacing + shift;
    BinaryMask::from_fn(WIDTH, HEIGHT, |x, _| {
        (l..l + 8).contains(&x) || (r..r + 8).contains(&x)
    })
}

/// Camera-space frame whose bird's-eye view holds yellow lane lines at
/// warped columns `left_x` and `right_x` on black asphalt.
pub fn synthetic_road_frame(perspective: &PerspectiveTransform, left_x: u32, right_x: u32) -> RgbImage {
    let (ww, wh) = perspective.warped_size();
    let warped = RgbImage::from_fn(ww, wh, |x, _| {
        let on_line = (left_x.saturating_sub(4)..left_x + 4).contains(&x)
            || (right_x.saturating_sub(4)..right_x + 4).contains(&x);
        if on_line {
            Rgb([255, 210, 0])
        } else {
            Rgb([0, 0, 0])
        }
    });
    perspective.unwarp_rgb(&warped)
}

pub fn dark_frame() -> RgbImage {
    RgbImage::from_pixel(WIDTH as u32, HEIGHT as u32, Rgb([20, 20, 20]))
}
