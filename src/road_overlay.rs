// src/road_overlay.rs
//
// Lane area projection back onto the camera frame.
//
//   warped canvas (black)
//     └→ fill polygon: left curve top→bottom, right curve bottom→top
//        └→ PerspectiveTransform::unwarp_rgb
//           └→ out = undistorted + blend_weight · projected   (saturating)
//              └→ curvature / offset labels
//
// Labels use the bundled DejaVu Sans unless `font_path` overrides it.
// The polygon is built from the fitted curves sampled at every warped row,
// so it follows the lane even where the mask had gaps.

use ab_glyph::{FontArc, PxScale};
use anyhow::{Context, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_polygon_mut, draw_text_mut};
use imageproc::map::map_colors2;
use imageproc::point::Point;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::lane::{LaneGeometry, LineFit};
use crate::preprocessing::PerspectiveTransform;

// ============================================================================
// CONFIGURATION
// ============================================================================

const BUNDLED_FONT: &[u8] = include_bytes!("../assets/fonts/DejaVuSans.ttf");

/// Colors used for lane rendering (RGB).
pub mod colors {
    pub const LANE_FILL: [u8; 3] = [0, 255, 0];
    pub const LABEL_TEXT: [u8; 3] = [255, 255, 255];
    pub const LEFT_PIXELS: [u8; 3] = [255, 0, 0];
    pub const RIGHT_PIXELS: [u8; 3] = [0, 0, 255];
    pub const SEARCH_WINDOW: [u8; 3] = [0, 255, 0];
    pub const FIT_CURVE: [u8; 3] = [255, 255, 0];
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    /// Weight of the projected lane layer added on top of the frame.
    pub blend_weight: f32,
    pub fill_color: [u8; 3],
    pub text_color: [u8; 3],
    /// TrueType/OpenType font replacing the bundled one.
    pub font_path: Option<String>,
    pub text_scale: f32,
    /// Top-left corner of the first label line.
    pub text_origin: [i32; 2],
    pub line_spacing: i32,
    /// Re-render the last good lane when a frame yields no geometry.
    pub hold_last_overlay: bool,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            blend_weight: 0.3,
            fill_color: colors::LANE_FILL,
            text_color: colors::LABEL_TEXT,
            font_path: None,
            text_scale: 36.0,
            text_origin: [50, 30],
            line_spacing: 50,
            hold_last_overlay: false,
        }
    }
}

// ============================================================================
// POLYGON
// ============================================================================

/// Closed lane polygon in warped coordinates: down the left curve, back up
/// the right one. Consecutive duplicates are dropped and the ring is left
/// open, so the result is directly drawable.
pub fn lane_polygon(left_fitx: &[f64], right_fitx: &[f64], ploty: &[f64]) -> Vec<Point<i32>> {
    let n = ploty.len().min(left_fitx.len()).min(right_fitx.len());
    let mut points: Vec<Point<i32>> = Vec::with_capacity(2 * n);

    for i in 0..n {
        points.push(Point::new(left_fitx[i] as i32, ploty[i] as i32));
    }
    for i in (0..n).rev() {
        points.push(Point::new(right_fitx[i] as i32, ploty[i] as i32));
    }

    points.dedup();
    while points.len() > 1 && points.first() == points.last() {
        points.pop();
    }
    points
}

/// `base + weight · layer` per channel, saturating at 255. Both images must
/// have the same dimensions.
pub fn blend_additive(base: &RgbImage, layer: &RgbImage, weight: f32) -> RgbImage {
    map_colors2(base, layer, |b: Rgb<u8>, l: Rgb<u8>| {
        Rgb(std::array::from_fn(|c| {
            (b.0[c] as f32 + weight * l.0[c] as f32).round().min(255.0) as u8
        }))
    })
}

// ============================================================================
// PROJECTOR
// ============================================================================

pub struct OverlayProjector {
    config: OverlayConfig,
    font: FontArc,
}

impl OverlayProjector {
    pub fn new(config: OverlayConfig) -> Result<Self> {
        let font = match &config.font_path {
            Some(path) => {
                let bytes = std::fs::read(path)
                    .with_context(|| format!("Failed to read font: {}", path))?;
                let font = FontArc::try_from_vec(bytes)
                    .map_err(|e| anyhow::anyhow!("Invalid font {}: {}", path, e))?;
                info!("🔤 Overlay font loaded from {}", path);
                font
            }
            None => FontArc::try_from_slice(BUNDLED_FONT)
                .map_err(|e| anyhow::anyhow!("Invalid bundled font: {}", e))?,
        };
        Ok(Self { config, font })
    }

    pub fn config(&self) -> &OverlayConfig {
        &self.config
    }

    /// Fill the lane between two fits in the warped view and project it
    /// onto `undistorted`. Labels are drawn when `geometry` is given.
    pub fn render(
        &self,
        undistorted: &RgbImage,
        left: &LineFit,
        right: &LineFit,
        geometry: Option<&LaneGeometry>,
        perspective: &PerspectiveTransform,
    ) -> RgbImage {
        let (ww, wh) = perspective.warped_size();
        let ploty = crate::lane::plot_rows(wh as usize);
        let left_fitx = left.sample_rows(wh as usize);
        let right_fitx = right.sample_rows(wh as usize);

        let mut canvas = RgbImage::new(ww, wh);
        let polygon = lane_polygon(&left_fitx, &right_fitx, &ploty);
        if polygon.len() >= 3 {
            draw_polygon_mut(&mut canvas, &polygon, Rgb(self.config.fill_color));
        }

        let projected = perspective.unwarp_rgb(&canvas);
        let mut out = blend_additive(undistorted, &projected, self.config.blend_weight);

        if let Some(geometry) = geometry {
            self.draw_labels(&mut out, geometry);
        }
        out
    }

    fn draw_labels(&self, out: &mut RgbImage, geometry: &LaneGeometry) {
        let scale = PxScale::from(self.config.text_scale);
        let color = Rgb(self.config.text_color);
        let [x, y] = self.config.text_origin;

        let lines = [geometry.curvature_label(), geometry.offset_label()];
        for (i, text) in lines.iter().enumerate() {
            draw_text_mut(
                out,
                color,
                x,
                y + i as i32 * self.config.line_spacing,
                scale,
                &self.font,
                text,
            );
        }
    }
}
