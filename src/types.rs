use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::lane::{GeometryConfig, LaneConfig};
use crate::preprocessing::{CalibrationConfig, PerspectiveConfig, ThresholdConfig};
use crate::road_overlay::OverlayConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub video: VideoConfig,
    pub calibration: CalibrationConfig,
    pub threshold: ThresholdConfig,
    pub perspective: PerspectiveConfig,
    pub lane: LaneConfig,
    pub geometry: GeometryConfig,
    pub overlay: OverlayConfig,
    pub logging: LoggingConfig,
    pub debug: DebugConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    pub input_dir: String,
    pub output_dir: String,
    pub save_annotated: bool,
    /// JSON-lines file receiving one measurement record per frame.
    pub measurements_path: Option<String>,
    /// Frame rate assumed for image sequences (timestamps only).
    pub sequence_fps: f64,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            input_dir: "input".to_string(),
            output_dir: "output".to_string(),
            save_annotated: true,
            measurements_path: None,
            sequence_fps: 25.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "lane_tracker=info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    /// Stage images are written here when set.
    pub dump_dir: Option<String>,
    pub every_n: u64,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            dump_dir: None,
            every_n: 25,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Frame {
    pub image: RgbImage,
    pub index: u64,
    pub timestamp_ms: f64,
}

impl Frame {
    pub fn new(image: RgbImage, index: u64, timestamp_ms: f64) -> Self {
        Self {
            image,
            index,
            timestamp_ms,
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}
