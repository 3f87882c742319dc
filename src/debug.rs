// src/debug.rs
//
// Search visualization and per-stage image dumps.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use tracing::debug;

use crate::lane::{BinaryMask, TrackOutcome};
use crate::road_overlay::colors;

/// Warped mask with the search drawn on top: left pixels red, right pixels
/// blue, windows green, fitted curves yellow.
pub fn visualize_search(mask: &BinaryMask, outcome: &TrackOutcome) -> RgbImage {
    let gray = mask.to_gray_image();
    let mut viz = RgbImage::from_fn(gray.width(), gray.height(), |x, y| {
        let v = gray.get_pixel(x, y).0[0];
        Rgb([v, v, v])
    });

    for (x, y) in outcome.left_pixels.iter() {
        viz.put_pixel(x as u32, y as u32, Rgb(colors::LEFT_PIXELS));
    }
    for (x, y) in outcome.right_pixels.iter() {
        viz.put_pixel(x as u32, y as u32, Rgb(colors::RIGHT_PIXELS));
    }

    for window in &outcome.windows {
        let w = window.x_high.saturating_sub(window.x_low) as u32;
        let h = window.y_high.saturating_sub(window.y_low) as u32;
        if w == 0 || h == 0 {
            continue;
        }
        draw_hollow_rect_mut(
            &mut viz,
            Rect::at(window.x_low as i32, window.y_low as i32).of_size(w, h),
            Rgb(colors::SEARCH_WINDOW),
        );
    }

    let (width, height) = (viz.width() as f64, viz.height());
    for fit in [&outcome.left, &outcome.right] {
        if !fit.is_valid() {
            continue;
        }
        for y in 0..height {
            let x = fit.x_at(y as f64).round();
            if x >= 0.0 && x < width {
                viz.put_pixel(x as u32, y, Rgb(colors::FIT_CURVE));
            }
        }
    }

    viz
}

/// Writes stage images for every `every_n`-th frame into one directory per stream.
pub struct StageDumper {
    dir: PathBuf,
    every_n: u64,
}

impl StageDumper {
    pub fn new(root: &Path, stream: &str, every_n: u64) -> Result<Self> {
        let dir = root.join(stream);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create debug dir: {}", dir.display()))?;
        Ok(Self {
            dir,
            every_n: every_n.max(1),
        })
    }

    pub fn wants(&self, frame_index: u64) -> bool {
        frame_index % self.every_n == 0
    }

    pub fn dump(&self, frame_index: u64, stage: &str, image: &RgbImage) -> Result<()> {
        let path = self.dir.join(format!("{:06}_{}.png", frame_index, stage));
        image
            .save(&path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        debug!("Dumped {}", path.display());
        Ok(())
    }
}
