// src/preprocessing/perspective.rs
//
// Bird's-eye warp between the camera image and the top-down lane view.
//
// The homography H maps image → warped; it is solved once from four point
// correspondences (DLT with h₃₃ = 1). Images are resampled with imageproc's
// `warp_into_with`, each output pixel pulled from its pre-image under the
// opposite direction. Points on the far side of the horizon project with the
// opposite sign of w and are treated as unmapped.

use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::geometric_transformations::{warp_into_with, Interpolation};
use nalgebra::{Matrix3, SMatrix, SVector, Vector3};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::UNMAPPED;
use crate::lane::BinaryMask;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PerspectiveConfig {
    /// Road trapezoid in the camera image: top-left, bottom-left, bottom-right, top-right.
    pub src: [[f64; 2]; 4],
    /// Where those corners land in the warped view.
    pub dst: [[f64; 2]; 4],
    pub image_width: u32,
    pub image_height: u32,
    pub warped_width: u32,
    pub warped_height: u32,
}

impl Default for PerspectiveConfig {
    fn default() -> Self {
        Self {
            src: [[585.0, 460.0], [203.0, 720.0], [1127.0, 720.0], [695.0, 460.0]],
            dst: [[320.0, 0.0], [320.0, 720.0], [960.0, 720.0], [960.0, 0.0]],
            image_width: 1280,
            image_height: 720,
            warped_width: 1280,
            warped_height: 720,
        }
    }
}

/// Solve the homography taking each `src[i]` to `dst[i]`.
pub fn compute_homography(src: &[[f64; 2]; 4], dst: &[[f64; 2]; 4]) -> Option<Matrix3<f64>> {
    if has_collinear_triple(src) || has_collinear_triple(dst) {
        return None;
    }

    let mut a = SMatrix::<f64, 8, 8>::zeros();
    let mut b = SVector::<f64, 8>::zeros();

    for i in 0..4 {
        let [x, y] = src[i];
        let [u, v] = dst[i];
        let r = 2 * i;

        a[(r, 0)] = x;
        a[(r, 1)] = y;
        a[(r, 2)] = 1.0;
        a[(r, 6)] = -u * x;
        a[(r, 7)] = -u * y;
        b[r] = u;

        a[(r + 1, 3)] = x;
        a[(r + 1, 4)] = y;
        a[(r + 1, 5)] = 1.0;
        a[(r + 1, 6)] = -v * x;
        a[(r + 1, 7)] = -v * y;
        b[r + 1] = v;
    }

    let h = a.lu().solve(&b)?;
    if h.iter().any(|v| !v.is_finite()) {
        return None;
    }
    Some(Matrix3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], 1.0))
}

fn has_collinear_triple(points: &[[f64; 2]; 4]) -> bool {
    const TRIPLES: [(usize, usize, usize); 4] = [(0, 1, 2), (0, 1, 3), (0, 2, 3), (1, 2, 3)];
    TRIPLES.iter().any(|&(i, j, k)| {
        let (a, b, c) = (points[i], points[j], points[k]);
        let cross = (b[0] - a[0]) * (c[1] - a[1]) - (b[1] - a[1]) * (c[0] - a[0]);
        cross.abs() < 1e-6
    })
}

/// One projection direction: matrix plus the sign w takes inside the quad.
#[derive(Debug, Clone, Copy)]
struct Projection {
    matrix: Matrix3<f64>,
    w_sign: f64,
}

impl Projection {
    fn new(matrix: Matrix3<f64>, quad: &[[f64; 2]; 4]) -> Self {
        let cx = quad.iter().map(|p| p[0]).sum::<f64>() / 4.0;
        let cy = quad.iter().map(|p| p[1]).sum::<f64>() / 4.0;
        let w = (matrix * Vector3::new(cx, cy, 1.0)).z;
        Self {
            matrix,
            w_sign: if w < 0.0 { -1.0 } else { 1.0 },
        }
    }

    fn apply(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        let p = self.matrix * Vector3::new(x, y, 1.0);
        if p.z * self.w_sign <= 1e-12 {
            return None;
        }
        Some((p.x / p.z, p.y / p.z))
    }

    /// Mapping for `warp_into_with`: output pixel → pre-image.
    fn pre_image(&self, x: f32, y: f32) -> (f32, f32) {
        match self.apply(x as f64, y as f64) {
            Some((sx, sy)) => (sx as f32, sy as f32),
            None => UNMAPPED,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PerspectiveTransform {
    forward: Projection,
    inverse: Projection,
    image_size: (u32, u32),
    warped_size: (u32, u32),
}

impl PerspectiveTransform {
    pub fn from_config(config: &PerspectiveConfig) -> anyhow::Result<Self> {
        Self::from_points(
            &config.src,
            &config.dst,
            (config.image_width, config.image_height),
            (config.warped_width, config.warped_height),
        )
    }

    pub fn from_points(
        src: &[[f64; 2]; 4],
        dst: &[[f64; 2]; 4],
        image_size: (u32, u32),
        warped_size: (u32, u32),
    ) -> anyhow::Result<Self> {
        anyhow::ensure!(
            image_size.0 > 0 && image_size.1 > 0 && warped_size.0 > 0 && warped_size.1 > 0,
            "perspective sizes must be non-zero (image {:?}, warped {:?})",
            image_size,
            warped_size
        );
        let matrix = compute_homography(src, dst)
            .ok_or_else(|| anyhow::anyhow!("degenerate perspective points: {:?} → {:?}", src, dst))?;
        let inverse = matrix
            .try_inverse()
            .ok_or_else(|| anyhow::anyhow!("perspective homography is not invertible"))?;

        let forward = Projection::new(matrix, src);
        let inverse = Projection::new(inverse, dst);

        debug!(
            "Perspective transform ready: {}x{} ↔ {}x{}",
            image_size.0, image_size.1, warped_size.0, warped_size.1
        );

        Ok(Self {
            forward,
            inverse,
            image_size,
            warped_size,
        })
    }

    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.forward.matrix
    }

    pub fn image_size(&self) -> (u32, u32) {
        self.image_size
    }

    pub fn warped_size(&self) -> (u32, u32) {
        self.warped_size
    }

    /// Image point → warped point.
    pub fn transform_point(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        self.forward.apply(x, y)
    }

    /// Warped point → image point.
    pub fn inverse_transform_point(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        self.inverse.apply(x, y)
    }

    /// Nearest-neighbour warp of a binary mask into the top-down view.
    pub fn warp_mask(&self, mask: &BinaryMask) -> BinaryMask {
        let mut warped = GrayImage::new(self.warped_size.0, self.warped_size.1);
        warp_into_with(
            &mask.to_gray_image(),
            |x, y| self.inverse.pre_image(x, y),
            Interpolation::Nearest,
            Luma([0]),
            &mut warped,
        );
        BinaryMask::from_gray_image(&warped)
    }

    pub fn warp_rgb(&self, image: &RgbImage) -> RgbImage {
        let mut warped = RgbImage::new(self.warped_size.0, self.warped_size.1);
        warp_into_with(
            image,
            |x, y| self.inverse.pre_image(x, y),
            Interpolation::Bilinear,
            Rgb([0, 0, 0]),
            &mut warped,
        );
        warped
    }

    /// Warped view back into camera coordinates.
    pub fn unwarp_rgb(&self, warped: &RgbImage) -> RgbImage {
        let mut out = RgbImage::new(self.image_size.0, self.image_size.1);
        warp_into_with(
            warped,
            |x, y| self.forward.pre_image(x, y),
            Interpolation::Bilinear,
            Rgb([0, 0, 0]),
            &mut out,
        );
        out
    }
}
