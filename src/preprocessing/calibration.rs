// src/preprocessing/calibration.rs
//
// Lens undistortion with the Brown-Conrady model:
//
//   r² = x² + y²
//   x_d = x·(1 + k1·r² + k2·r⁴ + k3·r⁶) + 2·p1·x·y + p2·(r² + 2x²)
//   y_d = y·(1 + k1·r² + k2·r⁴ + k3·r⁶) + p1·(r² + 2y²) + 2·p2·x·y
//
// Every pixel of the undistorted output is pulled from where its ray lands
// in the distorted input, resampled bilinearly by imageproc. Chessboard calibration (OpenCV) is
// only available with the `opencv` feature; otherwise intrinsics come from
// the config or a calibration file.

use std::path::Path;

use anyhow::{Context, Result};
use image::{Rgb, RgbImage};
use imageproc::geometric_transformations::{warp_into_with, Interpolation};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Intrinsics given inline; takes precedence over `camera_file`.
    pub camera: Option<CameraCalibration>,
    /// YAML or JSON file holding a `CameraCalibration`.
    pub camera_file: Option<String>,
    /// Directory of chessboard photos, used when no intrinsics are available
    /// and the `opencv` feature is enabled. The result is saved to
    /// `camera_file` when that is set.
    pub chessboard_dir: Option<String>,
    /// Inner corners per chessboard row / column.
    pub chessboard_cols: i32,
    pub chessboard_rows: i32,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            camera: None,
            camera_file: None,
            chessboard_dir: None,
            chessboard_cols: 9,
            chessboard_rows: 6,
        }
    }
}

/// Pinhole intrinsics plus distortion coefficients.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraCalibration {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
    #[serde(default)]
    pub k1: f64,
    #[serde(default)]
    pub k2: f64,
    #[serde(default)]
    pub p1: f64,
    #[serde(default)]
    pub p2: f64,
    #[serde(default)]
    pub k3: f64,
}

impl CameraCalibration {
    /// No distortion, principal point at the image center.
    pub fn pinhole(width: u32, height: u32, focal: f64) -> Self {
        Self {
            fx: focal,
            fy: focal,
            cx: (width as f64 - 1.0) / 2.0,
            cy: (height as f64 - 1.0) / 2.0,
            k1: 0.0,
            k2: 0.0,
            p1: 0.0,
            p2: 0.0,
            k3: 0.0,
        }
    }

    pub fn is_distortion_free(&self) -> bool {
        [self.k1, self.k2, self.p1, self.p2, self.k3]
            .iter()
            .all(|c| *c == 0.0)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read calibration file: {}", path.display()))?;
        let calibration: Self = if has_extension(path, "json") {
            serde_json::from_str(&text)
                .with_context(|| format!("Invalid calibration JSON: {}", path.display()))?
        } else {
            serde_yaml::from_str(&text)
                .with_context(|| format!("Invalid calibration YAML: {}", path.display()))?
        };
        anyhow::ensure!(
            calibration.fx > 0.0 && calibration.fy > 0.0,
            "calibration {} has non-positive focal length",
            path.display()
        );
        info!("📷 Loaded camera calibration from {}", path.display());
        Ok(calibration)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let text = if has_extension(path, "json") {
            serde_json::to_string_pretty(self)?
        } else {
            serde_yaml::to_string(self)?
        };
        std::fs::write(path, text)
            .with_context(|| format!("Failed to write calibration file: {}", path.display()))?;
        info!("💾 Saved camera calibration to {}", path.display());
        Ok(())
    }

    /// Apply the distortion model to a normalized image coordinate.
    pub fn distort_normalized(&self, x: f64, y: f64) -> (f64, f64) {
        let r2 = x * x + y * y;
        let radial = 1.0 + self.k1 * r2 + self.k2 * r2 * r2 + self.k3 * r2 * r2 * r2;
        let xd = x * radial + 2.0 * self.p1 * x * y + self.p2 * (r2 + 2.0 * x * x);
        let yd = y * radial + self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * x * y;
        (xd, yd)
    }

    /// Undistorted pixel → distorted pixel.
    pub fn distort_pixel(&self, u: f64, v: f64) -> (f64, f64) {
        let x = (u - self.cx) / self.fx;
        let y = (v - self.cy) / self.fy;
        let (xd, yd) = self.distort_normalized(x, y);
        (xd * self.fx + self.cx, yd * self.fy + self.cy)
    }
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case(ext))
        .unwrap_or(false)
}

/// Undistortion for one frame size.
#[derive(Debug, Clone)]
pub struct Undistorter {
    width: u32,
    height: u32,
    /// None when the calibration has no distortion terms.
    calibration: Option<CameraCalibration>,
}

impl Undistorter {
    pub fn new(calibration: &CameraCalibration, width: u32, height: u32) -> Self {
        let calibration = (!calibration.is_distortion_free()).then_some(*calibration);
        debug!(
            "Undistorter {}x{} ready (identity: {})",
            width,
            height,
            calibration.is_none()
        );
        Self {
            width,
            height,
            calibration,
        }
    }

    /// Pass-through undistorter for uncalibrated streams.
    pub fn identity(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            calibration: None,
        }
    }

    pub fn is_identity(&self) -> bool {
        self.calibration.is_none()
    }

    pub fn undistort(&self, image: &RgbImage) -> Result<RgbImage> {
        anyhow::ensure!(
            image.dimensions() == (self.width, self.height),
            "frame is {}x{}, undistorter expects {}x{}",
            image.width(),
            image.height(),
            self.width,
            self.height
        );
        let Some(calibration) = &self.calibration else {
            return Ok(image.clone());
        };

        let mut out = RgbImage::new(self.width, self.height);
        warp_into_with(
            image,
            |u, v| {
                let (xd, yd) = calibration.distort_pixel(u as f64, v as f64);
                (xd as f32, yd as f32)
            },
            Interpolation::Bilinear,
            Rgb([0, 0, 0]),
            &mut out,
        );
        Ok(out)
    }
}

/// Resolve intrinsics from config: inline, then file, then chessboards.
/// Returns None when the stream should run uncalibrated.
pub fn resolve_calibration(config: &CalibrationConfig) -> Result<Option<CameraCalibration>> {
    if let Some(camera) = config.camera {
        return Ok(Some(camera));
    }
    if let Some(file) = &config.camera_file {
        let path = Path::new(file);
        if path.exists() {
            return CameraCalibration::load(path).map(Some);
        }
    }
    if let Some(dir) = &config.chessboard_dir {
        return calibrate_dir(config, Path::new(dir)).map(Some);
    }
    Ok(None)
}

#[cfg(feature = "opencv")]
fn calibrate_dir(config: &CalibrationConfig, dir: &Path) -> Result<CameraCalibration> {
    let calibration =
        calibrate_from_chessboards(dir, config.chessboard_cols, config.chessboard_rows)?;
    if let Some(file) = &config.camera_file {
        calibration.save(Path::new(file))?;
    }
    Ok(calibration)
}

#[cfg(not(feature = "opencv"))]
fn calibrate_dir(_config: &CalibrationConfig, dir: &Path) -> Result<CameraCalibration> {
    anyhow::bail!(
        "chessboard calibration of {} requires the `opencv` feature",
        dir.display()
    )
}

/// Calibrate from every chessboard photo in `dir` (cols × rows inner corners).
#[cfg(feature = "opencv")]
pub fn calibrate_from_chessboards(dir: &Path, cols: i32, rows: i32) -> Result<CameraCalibration> {
    use opencv::{
        calib3d,
        core::{Mat, Point2f, Point3f, Size, TermCriteria, TermCriteria_Type, Vector},
        imgcodecs, imgproc,
        prelude::*,
    };
    use tracing::warn;
    use walkdir::WalkDir;

    let pattern = Size::new(cols, rows);
    let board: Vector<Point3f> = (0..rows)
        .flat_map(|r| (0..cols).map(move |c| Point3f::new(c as f32, r as f32, 0.0)))
        .collect();

    let mut object_points: Vector<Vector<Point3f>> = Vector::new();
    let mut image_points: Vector<Vector<Point2f>> = Vector::new();
    let mut image_size: Option<Size> = None;

    for entry in WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if !crate::video_processor::is_image_file(path) {
            continue;
        }
        let Some(path_str) = path.to_str() else {
            continue;
        };

        let img = imgcodecs::imread(path_str, imgcodecs::IMREAD_COLOR)?;
        if img.empty() {
            warn!("Could not decode {}", path.display());
            continue;
        }
        let mut gray = Mat::default();
        imgproc::cvt_color(&img, &mut gray, imgproc::COLOR_BGR2GRAY, 0)?;

        let mut corners: Vector<Point2f> = Vector::new();
        let found = calib3d::find_chessboard_corners(
            &gray,
            pattern,
            &mut corners,
            calib3d::CALIB_CB_ADAPTIVE_THRESH + calib3d::CALIB_CB_NORMALIZE_IMAGE,
        )?;
        if !found {
            warn!("Chessboard not found in {}", path.display());
            continue;
        }

        object_points.push(board.clone());
        image_points.push(corners);
        image_size = Some(gray.size()?);
    }

    let Some(size) = image_size else {
        anyhow::bail!("no chessboard pattern found in {}", dir.display());
    };

    let mut camera_matrix = Mat::default();
    let mut dist_coeffs = Mat::default();
    let mut rvecs: Vector<Mat> = Vector::new();
    let mut tvecs: Vector<Mat> = Vector::new();
    let criteria = TermCriteria::new(
        TermCriteria_Type::COUNT as i32 + TermCriteria_Type::EPS as i32,
        30,
        f64::EPSILON,
    )?;
    let rms = calib3d::calibrate_camera(
        &object_points,
        &image_points,
        size,
        &mut camera_matrix,
        &mut dist_coeffs,
        &mut rvecs,
        &mut tvecs,
        0,
        criteria,
    )?;

    let k = |r: i32, c: i32| -> Result<f64> { Ok(*camera_matrix.at_2d::<f64>(r, c)?) };
    let d = |i: i32| -> Result<f64> { Ok(*dist_coeffs.at_2d::<f64>(0, i)?) };

    let calibration = CameraCalibration {
        fx: k(0, 0)?,
        fy: k(1, 1)?,
        cx: k(0, 2)?,
        cy: k(1, 2)?,
        k1: d(0)?,
        k2: d(1)?,
        p1: d(2)?,
        p2: d(3)?,
        k3: d(4)?,
    };
    info!(
        "📷 Calibrated from {} chessboard views in {} (rms {:.3}px)",
        object_points.len(),
        dir.display(),
        rms
    );
    Ok(calibration)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_distortion_is_identity() {
        let cal = CameraCalibration::pinhole(40, 30, 50.0);
        let undistorter = Undistorter::new(&cal, 40, 30);
        assert!(undistorter.is_identity());

        let img = RgbImage::from_fn(40, 30, |x, y| Rgb([x as u8, y as u8, 9]));
        assert_eq!(undistorter.undistort(&img).unwrap(), img);
    }

    #[test]
    fn test_radial_distortion_scales_outward() {
        let cal = CameraCalibration {
            k1: 0.1,
            ..CameraCalibration::pinhole(100, 100, 100.0)
        };
        let (xd, yd) = cal.distort_normalized(0.5, 0.0);
        assert!((xd - 0.5 * (1.0 + 0.1 * 0.25)).abs() < 1e-12);
        assert_eq!(yd, 0.0);

        // Principal point is a fixed point
        let (u, v) = cal.distort_pixel(cal.cx, cal.cy);
        assert!((u - cal.cx).abs() < 1e-12 && (v - cal.cy).abs() < 1e-12);
    }

    #[test]
    fn test_barrel_correction_keeps_center_and_blanks_corners() {
        let cal = CameraCalibration {
            k1: 0.5,
            ..CameraCalibration::pinhole(101, 101, 100.0)
        };
        let undistorter = Undistorter::new(&cal, 101, 101);
        assert!(!undistorter.is_identity());

        let img = RgbImage::from_fn(101, 101, |x, y| Rgb([x as u8, y as u8, 200]));
        let out = undistorter.undistort(&img).unwrap();
        assert_eq!(out.get_pixel(50, 50), img.get_pixel(50, 50));
        // (0, 0) pulls from (-12.5, -12.5), outside the input.
        assert_eq!(out.get_pixel(0, 0).0, [0, 0, 0]);
    }

    #[test]
    fn test_undistort_rejects_wrong_size() {
        let undistorter = Undistorter::identity(10, 10);
        assert!(undistorter.undistort(&RgbImage::new(12, 10)).is_err());
    }

    #[test]
    fn test_calibration_file_round_trip() {
        let dir = std::env::temp_dir().join(format!("lane-tracker-cal-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let cal = CameraCalibration {
            k1: -0.24,
            k2: 0.1,
            p1: 1e-3,
            ..CameraCalibration::pinhole(1280, 720, 1150.0)
        };

        for name in ["camera.yaml", "camera.json"] {
            let path = dir.join(name);
            cal.save(&path).unwrap();
            assert_eq!(CameraCalibration::load(&path).unwrap(), cal);
        }
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_resolve_prefers_inline() {
        let cal = CameraCalibration::pinhole(10, 10, 5.0);
        let config = CalibrationConfig {
            camera: Some(cal),
            camera_file: Some("/nonexistent/camera.yaml".into()),
            ..CalibrationConfig::default()
        };
        assert_eq!(resolve_calibration(&config).unwrap(), Some(cal));
        assert_eq!(resolve_calibration(&CalibrationConfig::default()).unwrap(), None);
    }
}
