// src/lane/mask.rs
//
// Single-channel bird's-eye mask and the pixel sets extracted from it.
//
// Coordinate system:
//   - x grows to the right, y grows downward (row index)
//   - the bottom row (y = height - 1) is the one nearest the vehicle

use anyhow::{bail, Result};
use image::GrayImage;

/// Rectified top-down binary mask. Any non-zero byte is an active pixel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryMask {
    width: usize,
    height: usize,
    data: Vec<u8>,
}

impl BinaryMask {
    /// All-inactive mask of the given size.
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![0; width * height],
        }
    }

    /// Wrap a row-major byte buffer.
    pub fn from_raw(width: usize, height: usize, data: Vec<u8>) -> Result<Self> {
        if data.len() != width * height {
            bail!(
                "mask buffer has {} bytes, expected {}x{} = {}",
                data.len(),
                width,
                height,
                width * height
            );
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn from_fn(width: usize, height: usize, mut f: impl FnMut(usize, usize) -> bool) -> Self {
        let mut mask = Self::new(width, height);
        for y in 0..height {
            for x in 0..width {
                if f(x, y) {
                    mask.data[y * width + x] = 1;
                }
            }
        }
        mask
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn is_active(&self, x: usize, y: usize) -> bool {
        x < self.width && y < self.height && self.data[y * self.width + x] != 0
    }

    /// Mark a pixel active or inactive. Out-of-bounds writes are ignored.
    pub fn set(&mut self, x: usize, y: usize, active: bool) {
        if x < self.width && y < self.height {
            self.data[y * self.width + x] = u8::from(active);
        }
    }

    pub fn count_active(&self) -> usize {
        self.data.iter().filter(|&&v| v != 0).count()
    }

    /// Active pixels as (x, y), row-major order.
    pub fn active_pixels(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        let width = self.width.max(1);
        self.data
            .iter()
            .enumerate()
            .filter(|&(_, &v)| v != 0)
            .map(move |(idx, _)| (idx % width, idx / width))
    }

    /// Active pixels of a single row, ascending x.
    pub fn active_in_row(&self, y: usize) -> impl Iterator<Item = usize> + '_ {
        let row: &[u8] = if y < self.height {
            &self.data[y * self.width..(y + 1) * self.width]
        } else {
            &[]
        };
        row.iter()
            .enumerate()
            .filter(|&(_, &v)| v != 0)
            .map(|(x, _)| x)
    }

    /// Per-column count of active pixels over rows `from_row..height`.
    pub fn column_histogram(&self, from_row: usize) -> Vec<u32> {
        let mut histogram = vec![0u32; self.width];
        for y in from_row.min(self.height)..self.height {
            for x in self.active_in_row(y) {
                histogram[x] += 1;
            }
        }
        histogram
    }

    /// Any non-zero gray level becomes an active pixel.
    pub fn from_gray_image(image: &GrayImage) -> Self {
        Self {
            width: image.width() as usize,
            height: image.height() as usize,
            data: image.as_raw().iter().map(|&v| u8::from(v != 0)).collect(),
        }
    }

    /// 0/255 grayscale rendering for debug and resampling.
    pub fn to_gray_image(&self) -> GrayImage {
        GrayImage::from_fn(self.width as u32, self.height as u32, |x, y| {
            let v = if self.is_active(x as usize, y as usize) {
                255
            } else {
                0
            };
            image::Luma([v])
        })
    }
}

/// Histogram-derived base positions of both lines at the bottom of the mask.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct LaneBases {
    pub left_x: usize,
    pub right_x: usize,
    /// Midpoint of the two bases minus the image midpoint, in pixels.
    /// Positive when the lane center lies right of the image center.
    pub center_offset_px: f64,
}

impl LaneBases {
    /// Peak columns of the bottom-half histogram on each side of `width / 2`.
    pub fn from_mask(mask: &BinaryMask) -> Self {
        let histogram = mask.column_histogram(mask.height() / 2);
        let midpoint = mask.width() / 2;

        let left_x = argmax(&histogram[..midpoint]);
        let right_x = midpoint + argmax(&histogram[midpoint..]);

        Self {
            left_x,
            right_x,
            center_offset_px: (left_x + right_x) as f64 / 2.0 - midpoint as f64,
        }
    }
}

/// Index of the first maximum; 0 for an empty slice.
fn argmax(values: &[u32]) -> usize {
    let mut best_idx = 0;
    let mut best = 0u32;
    for (idx, &v) in values.iter().enumerate() {
        if v > best {
            best = v;
            best_idx = idx;
        }
    }
    best_idx
}

/// Pixels attributed to one lane line in one frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PixelSet {
    points: Vec<(usize, usize)>,
}

impl PixelSet {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            points: Vec::with_capacity(capacity),
        }
    }

    #[inline]
    pub fn push(&mut self, x: usize, y: usize) {
        self.points.push((x, y));
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// (x, y) pairs.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.points.iter().copied()
    }

    /// Number of distinct rows covered by the set.
    pub fn distinct_rows(&self) -> usize {
        let mut rows: Vec<usize> = self.points.iter().map(|p| p.1).collect();
        rows.sort_unstable();
        rows.dedup();
        rows.len()
    }

    /// Samples as (y, x) in f64, the orientation the quadratic model uses.
    pub fn samples(&self) -> Vec<(f64, f64)> {
        self.points
            .iter()
            .map(|&(x, y)| (y as f64, x as f64))
            .collect()
    }
}

impl FromIterator<(usize, usize)> for PixelSet {
    fn from_iter<I: IntoIterator<Item = (usize, usize)>>(iter: I) -> Self {
        Self {
            points: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_raw_rejects_wrong_length() {
        assert!(BinaryMask::from_raw(4, 4, vec![0; 15]).is_err());
        assert!(BinaryMask::from_raw(4, 4, vec![0; 16]).is_ok());
    }

    #[test]
    fn test_gray_image_conversion_normalizes() {
        let mask = BinaryMask::from_fn(5, 3, |x, y| x == y);
        let gray = mask.to_gray_image();
        assert_eq!(gray.get_pixel(1, 1).0, [255]);
        assert_eq!(BinaryMask::from_gray_image(&gray), mask);
    }

    #[test]
    fn test_histogram_counts_bottom_half_only() {
        let mut mask = BinaryMask::new(8, 10);
        mask.set(2, 1, true); // top half, ignored
        mask.set(2, 6, true);
        mask.set(2, 9, true);
        mask.set(5, 7, true);

        let hist = mask.column_histogram(5);
        assert_eq!(hist[2], 2);
        assert_eq!(hist[5], 1);
        assert_eq!(hist.iter().sum::<u32>(), 3);
    }

    #[test]
    fn test_bases_and_center_offset() {
        let mask = BinaryMask::from_fn(100, 40, |x, y| y >= 20 && (x == 20 || x == 70));
        let bases = LaneBases::from_mask(&mask);
        assert_eq!(bases.left_x, 20);
        assert_eq!(bases.right_x, 70);
        assert!((bases.center_offset_px - (45.0 - 50.0)).abs() < 1e-12);
    }

    #[test]
    fn test_empty_mask_bases_default_to_half_starts() {
        let mask = BinaryMask::new(100, 40);
        let bases = LaneBases::from_mask(&mask);
        assert_eq!(bases.left_x, 0);
        assert_eq!(bases.right_x, 50);
    }

    #[test]
    fn test_active_pixels_row_major() {
        let mut mask = BinaryMask::new(3, 3);
        mask.set(2, 0, true);
        mask.set(0, 2, true);
        mask.set(1, 1, true);
        let px: Vec<_> = mask.active_pixels().collect();
        assert_eq!(px, vec![(2, 0), (1, 1), (0, 2)]);
        assert_eq!(mask.count_active(), 3);
    }

    #[test]
    fn test_distinct_rows() {
        let set: PixelSet = vec![(1, 1), (2, 1), (3, 4)].into_iter().collect();
        assert_eq!(set.distinct_rows(), 2);
        assert_eq!(set.samples()[2], (4.0, 3.0));
    }
}
