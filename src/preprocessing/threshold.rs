// src/preprocessing/threshold.rs
//
// Undistorted RGB frame → binary lane-marking mask.
//
//   gradient = |∂L/∂x| (HLS lightness, Sobel 3x3) scaled to 0..255, in sobel_x
//   color    = HLS saturation in s_channel AND HSV value in v_channel
//   mask     = gradient OR color
//
// The visualization stacks (0, gradient, color) so each source can be told
// apart in debug dumps.

use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::gradients::horizontal_sobel;
use serde::{Deserialize, Serialize};

use crate::lane::BinaryMask;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    /// Inclusive range on the scaled horizontal gradient.
    pub sobel_x: [u8; 2],
    /// Inclusive range on HLS saturation (0..255).
    pub s_channel: [u8; 2],
    /// Inclusive range on HSV value (0..255).
    pub v_channel: [u8; 2],
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            sobel_x: [20, 100],
            s_channel: [100, 255],
            v_channel: [50, 255],
        }
    }
}

#[inline]
fn in_range(v: u8, range: [u8; 2]) -> bool {
    v >= range[0] && v <= range[1]
}

/// Convert RGB to HLS.
/// Returns (H: 0-360, L: 0-255, S: 0-255).
#[inline]
pub fn rgb_to_hls(r: f32, g: f32, b: f32) -> (f32, f32, f32) {
    let r_n = r / 255.0;
    let g_n = g / 255.0;
    let b_n = b / 255.0;

    let max = r_n.max(g_n).max(b_n);
    let min = r_n.min(g_n).min(b_n);
    let delta = max - min;
    let l = (max + min) / 2.0;

    if delta < 1e-6 {
        return (0.0, l * 255.0, 0.0);
    }

    let s = if l <= 0.5 {
        delta / (max + min)
    } else {
        delta / (2.0 - max - min)
    };

    let h = if (max - r_n).abs() < 1e-6 {
        60.0 * (((g_n - b_n) / delta) % 6.0)
    } else if (max - g_n).abs() < 1e-6 {
        60.0 * (((b_n - r_n) / delta) + 2.0)
    } else {
        60.0 * (((r_n - g_n) / delta) + 4.0)
    };
    let h = if h < 0.0 { h + 360.0 } else { h };

    (h, l * 255.0, s * 255.0)
}

/// Convert RGB to HSV.
/// Returns (H: 0-360, S: 0-100, V: 0-255).
#[inline]
pub fn rgb_to_hsv(r: f32, g: f32, b: f32) -> (f32, f32, f32) {
    let r_n = r / 255.0;
    let g_n = g / 255.0;
    let b_n = b / 255.0;

    let max = r_n.max(g_n).max(b_n);
    let min = r_n.min(g_n).min(b_n);
    let delta = max - min;

    let h = if delta < 1e-6 {
        0.0
    } else if (max - r_n).abs() < 1e-6 {
        60.0 * (((g_n - b_n) / delta) % 6.0)
    } else if (max - g_n).abs() < 1e-6 {
        60.0 * (((b_n - r_n) / delta) + 2.0)
    } else {
        60.0 * (((r_n - g_n) / delta) + 4.0)
    };
    let h = if h < 0.0 { h + 360.0 } else { h };

    let s = if max < 1e-6 { 0.0 } else { (delta / max) * 100.0 };

    (h, s, max * 255.0)
}

/// Absolute horizontal gradient of `gray`, scaled so the strongest edge is 255.
/// A flat image yields all zeros.
pub fn scaled_sobel_x(gray: &GrayImage) -> GrayImage {
    let gradient = horizontal_sobel(gray);
    let max = gradient
        .pixels()
        .map(|p| p.0[0].unsigned_abs())
        .max()
        .unwrap_or(0);

    let (w, h) = gray.dimensions();
    if max == 0 {
        return GrayImage::new(w, h);
    }
    GrayImage::from_fn(w, h, |x, y| {
        let g = gradient.get_pixel(x, y).0[0].unsigned_abs() as f32;
        Luma([(255.0 * g / max as f32) as u8])
    })
}

/// Binarize an undistorted frame. Returns the (0, gradient, color)
/// visualization and the combined mask.
pub fn binarize(image: &RgbImage, config: &ThresholdConfig) -> (RgbImage, BinaryMask) {
    let (w, h) = image.dimensions();
    let n = (w * h) as usize;

    let mut lightness = GrayImage::new(w, h);
    let mut color = vec![false; n];

    for (x, y, px) in image.enumerate_pixels() {
        let [r, g, b] = px.0;
        let (r, g, b) = (r as f32, g as f32, b as f32);
        let (_, l, s) = rgb_to_hls(r, g, b);
        let (_, _, v) = rgb_to_hsv(r, g, b);

        lightness.put_pixel(x, y, Luma([l.round() as u8]));
        color[(y * w + x) as usize] =
            in_range(s.round() as u8, config.s_channel) && in_range(v.round() as u8, config.v_channel);
    }

    let sobel = scaled_sobel_x(&lightness);

    let mut viz = RgbImage::new(w, h);
    let mask = BinaryMask::from_fn(w as usize, h as usize, |x, y| {
        let gradient = in_range(sobel.get_pixel(x as u32, y as u32).0[0], config.sobel_x);
        let colored = color[y * w as usize + x];
        viz.put_pixel(
            x as u32,
            y as u32,
            Rgb([0, if gradient { 255 } else { 0 }, if colored { 255 } else { 0 }]),
        );
        gradient || colored
    });

    (viz, mask)
}
