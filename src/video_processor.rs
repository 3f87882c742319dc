// src/video_processor.rs

use crate::types::{Config, Frame};
use anyhow::{Context, Result};
use image::RgbImage;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];
const VIDEO_EXTENSIONS: [&str; 4] = ["mp4", "avi", "mov", "mkv"];

fn extension_in(path: &Path, list: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| list.iter().any(|x| x.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

pub fn is_image_file(path: &Path) -> bool {
    path.is_file() && extension_in(path, &IMAGE_EXTENSIONS)
}

pub fn is_video_file(path: &Path) -> bool {
    path.is_file() && extension_in(path, &VIDEO_EXTENSIONS)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    /// Directory of still frames, ordered by file name.
    ImageSequence,
    Video,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputSource {
    pub path: PathBuf,
    pub kind: InputKind,
}

impl InputSource {
    /// Stream name used for output and debug directories.
    pub fn name(&self) -> String {
        let stem = match self.kind {
            InputKind::ImageSequence => self.path.file_name(),
            InputKind::Video => self.path.file_stem(),
        };
        stem.map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "stream".to_string())
    }
}

/// Pull-based frame producer for one stream.
pub trait FrameSource {
    fn next_frame(&mut self) -> Result<Option<Frame>>;
    fn fps(&self) -> f64;
    /// Total frames when known up front.
    fn frame_count(&self) -> Option<u64>;
}

/// Consumer of annotated frames for one stream.
pub trait FrameSink {
    fn write_frame(&mut self, image: &RgbImage) -> Result<()>;
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

pub struct VideoProcessor {
    config: Config,
}

impl VideoProcessor {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Every image-sequence directory and video file under `video.input_dir`.
    pub fn find_inputs(&self) -> Result<Vec<InputSource>> {
        let root = Path::new(&self.config.video.input_dir);
        anyhow::ensure!(
            root.is_dir(),
            "input directory does not exist: {}",
            root.display()
        );

        let mut sequences: BTreeSet<PathBuf> = BTreeSet::new();
        let mut videos: Vec<PathBuf> = Vec::new();

        for entry in WalkDir::new(root)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if is_image_file(path) {
                if let Some(parent) = path.parent() {
                    sequences.insert(parent.to_path_buf());
                }
            } else if is_video_file(path) {
                if cfg!(feature = "opencv") {
                    videos.push(path.to_path_buf());
                } else {
                    warn!(
                        "Skipping {} (video input requires the `opencv` feature)",
                        path.display()
                    );
                }
            }
        }

        let inputs: Vec<InputSource> = sequences
            .into_iter()
            .map(|path| InputSource {
                path,
                kind: InputKind::ImageSequence,
            })
            .chain(videos.into_iter().map(|path| InputSource {
                path,
                kind: InputKind::Video,
            }))
            .collect();

        info!("Found {} input(s)", inputs.len());
        Ok(inputs)
    }

    pub fn open(&self, input: &InputSource) -> Result<Box<dyn FrameSource>> {
        match input.kind {
            InputKind::ImageSequence => Ok(Box::new(ImageSequenceReader::open(
                &input.path,
                self.config.video.sequence_fps,
            )?)),
            #[cfg(feature = "opencv")]
            InputKind::Video => Ok(Box::new(opencv_io::VideoReader::open(&input.path)?)),
            #[cfg(not(feature = "opencv"))]
            InputKind::Video => anyhow::bail!(
                "cannot open {}: video input requires the `opencv` feature",
                input.path.display()
            ),
        }
    }

    /// Sink for annotated frames, or None when `save_annotated` is off.
    pub fn create_sink(
        &self,
        input: &InputSource,
        width: u32,
        height: u32,
        fps: f64,
    ) -> Result<Option<Box<dyn FrameSink>>> {
        if !self.config.video.save_annotated {
            return Ok(None);
        }
        let output_dir = PathBuf::from(&self.config.video.output_dir);
        std::fs::create_dir_all(&output_dir).with_context(|| {
            format!("Failed to create output dir: {}", output_dir.display())
        })?;

        match input.kind {
            InputKind::ImageSequence => {
                let dir = output_dir.join(input.name());
                info!("Output frames: {}", dir.display());
                Ok(Some(Box::new(ImageSequenceWriter::create(&dir)?)))
            }
            #[cfg(feature = "opencv")]
            InputKind::Video => {
                let path = output_dir.join(format!("{}_annotated.mp4", input.name()));
                info!("Output video: {}", path.display());
                Ok(Some(Box::new(opencv_io::VideoWriter::create(
                    &path, width, height, fps,
                )?)))
            }
            #[cfg(not(feature = "opencv"))]
            InputKind::Video => {
                let _ = (width, height, fps);
                anyhow::bail!(
                    "cannot write {}: video output requires the `opencv` feature",
                    input.path.display()
                )
            }
        }
    }
}

// ============================================================================
// IMAGE SEQUENCES
// ============================================================================

pub struct ImageSequenceReader {
    frames: Vec<PathBuf>,
    next: usize,
    fps: f64,
}

impl ImageSequenceReader {
    pub fn open(dir: &Path, fps: f64) -> Result<Self> {
        let mut frames: Vec<PathBuf> = std::fs::read_dir(dir)
            .with_context(|| format!("Failed to list {}", dir.display()))?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| is_image_file(p))
            .collect();
        frames.sort();
        anyhow::ensure!(!frames.is_empty(), "no frames in {}", dir.display());

        info!(
            "Opening sequence: {} ({} frames @ {:.1} FPS)",
            dir.display(),
            frames.len(),
            fps
        );
        Ok(Self {
            frames,
            next: 0,
            fps: if fps > 0.0 { fps } else { 25.0 },
        })
    }
}

impl FrameSource for ImageSequenceReader {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let Some(path) = self.frames.get(self.next) else {
            return Ok(None);
        };
        let image = image::open(path)
            .with_context(|| format!("Failed to decode {}", path.display()))?
            .to_rgb8();
        let index = self.next as u64;
        self.next += 1;
        Ok(Some(Frame::new(
            image,
            index,
            index as f64 / self.fps * 1000.0,
        )))
    }

    fn fps(&self) -> f64 {
        self.fps
    }

    fn frame_count(&self) -> Option<u64> {
        Some(self.frames.len() as u64)
    }
}

pub struct ImageSequenceWriter {
    dir: PathBuf,
    next: u64,
}

impl ImageSequenceWriter {
    pub fn create(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        Ok(Self {
            dir: dir.to_path_buf(),
            next: 0,
        })
    }
}

impl FrameSink for ImageSequenceWriter {
    fn write_frame(&mut self, image: &RgbImage) -> Result<()> {
        let path = self.dir.join(format!("{:06}.png", self.next));
        image
            .save(&path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        self.next += 1;
        Ok(())
    }
}

// ============================================================================
// VIDEO FILES (OpenCV)
// ============================================================================

#[cfg(feature = "opencv")]
mod opencv_io {
    use super::{FrameSink, FrameSource};
    use crate::types::Frame;
    use anyhow::{Context, Result};
    use image::RgbImage;
    use opencv::{
        core::{self, Mat},
        imgproc,
        prelude::*,
        videoio::{self, VideoCapture, VideoCaptureTrait, VideoCaptureTraitConst},
    };
    use std::path::Path;
    use tracing::info;

    pub struct VideoReader {
        cap: VideoCapture,
        fps: f64,
        total_frames: i64,
        current_frame: u64,
    }

    impl VideoReader {
        pub fn open(path: &Path) -> Result<Self> {
            info!("Opening video: {}", path.display());
            let path_str = path
                .to_str()
                .with_context(|| format!("non-UTF-8 path: {}", path.display()))?;

            let cap = VideoCapture::from_file(path_str, videoio::CAP_ANY)?;
            if !cap.is_opened()? {
                anyhow::bail!("Failed to open video file: {}", path.display());
            }

            let fps = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FPS)?;
            let total_frames =
                VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FRAME_COUNT)? as i64;
            let width = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FRAME_WIDTH)? as i32;
            let height = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FRAME_HEIGHT)? as i32;

            info!(
                "Video properties: {}x{} @ {:.1} FPS, {} frames",
                width, height, fps, total_frames
            );

            Ok(Self {
                cap,
                fps: if fps > 0.0 { fps } else { 25.0 },
                total_frames,
                current_frame: 0,
            })
        }
    }

    impl FrameSource for VideoReader {
        fn next_frame(&mut self) -> Result<Option<Frame>> {
            let mut mat = Mat::default();
            if !VideoCaptureTrait::read(&mut self.cap, &mut mat)? || mat.empty() {
                return Ok(None);
            }

            let mut rgb_mat = Mat::default();
            imgproc::cvt_color(&mat, &mut rgb_mat, imgproc::COLOR_BGR2RGB, 0)?;
            let (width, height) = (rgb_mat.cols() as u32, rgb_mat.rows() as u32);
            let data = rgb_mat.data_bytes()?.to_vec();
            let image = RgbImage::from_raw(width, height, data)
                .context("decoded frame has unexpected buffer size")?;

            let index = self.current_frame;
            self.current_frame += 1;
            Ok(Some(Frame::new(
                image,
                index,
                index as f64 / self.fps * 1000.0,
            )))
        }

        fn fps(&self) -> f64 {
            self.fps
        }

        fn frame_count(&self) -> Option<u64> {
            (self.total_frames > 0).then_some(self.total_frames as u64)
        }
    }

    pub struct VideoWriter {
        writer: videoio::VideoWriter,
    }

    impl VideoWriter {
        pub fn create(path: &Path, width: u32, height: u32, fps: f64) -> Result<Self> {
            let path_str = path
                .to_str()
                .with_context(|| format!("non-UTF-8 path: {}", path.display()))?;
            let fourcc = videoio::VideoWriter::fourcc('m', 'p', '4', 'v')?;
            let writer = videoio::VideoWriter::new(
                path_str,
                fourcc,
                fps,
                core::Size::new(width as i32, height as i32),
                true,
            )?;
            Ok(Self { writer })
        }
    }

    impl FrameSink for VideoWriter {
        fn write_frame(&mut self, image: &RgbImage) -> Result<()> {
            let mat = Mat::from_slice(image.as_raw())?;
            let mat = mat.reshape(3, image.height() as i32)?;
            let mut bgr_mat = Mat::default();
            imgproc::cvt_color(&mat, &mut bgr_mat, imgproc::COLOR_RGB2BGR, 0)?;
            self.writer.write(&bgr_mat)?;
            Ok(())
        }

        fn finish(&mut self) -> Result<()> {
            self.writer.release()?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn scratch_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("lane-tracker-{}-{}", tag, std::process::id()));
        std::fs::remove_dir_all(&dir).ok();
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_finds_sequences_per_directory() {
        let root = scratch_dir("inputs");
        for clip in ["b_clip", "a_clip"] {
            let dir = root.join(clip);
            std::fs::create_dir_all(&dir).unwrap();
            for i in 0..2 {
                RgbImage::new(4, 4)
                    .save(dir.join(format!("{:03}.png", i)))
                    .unwrap();
            }
        }
        std::fs::write(root.join("notes.txt"), "ignored").unwrap();

        let config = Config {
            video: crate::types::VideoConfig {
                input_dir: root.to_string_lossy().to_string(),
                ..Default::default()
            },
            ..Default::default()
        };
        let inputs = VideoProcessor::new(config).find_inputs().unwrap();
        assert_eq!(inputs.len(), 2);
        assert_eq!(inputs[0].name(), "a_clip");
        assert_eq!(inputs[1].name(), "b_clip");
        assert!(inputs.iter().all(|i| i.kind == InputKind::ImageSequence));
        std::fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn test_sequence_round_trip_in_order() {
        let root = scratch_dir("seq");
        let mut writer = ImageSequenceWriter::create(&root).unwrap();
        for shade in [10u8, 20, 30] {
            writer
                .write_frame(&RgbImage::from_pixel(3, 2, Rgb([shade, 0, 0])))
                .unwrap();
        }

        let mut reader = ImageSequenceReader::open(&root, 10.0).unwrap();
        assert_eq!(reader.frame_count(), Some(3));
        let mut shades = Vec::new();
        while let Some(frame) = reader.next_frame().unwrap() {
            assert!((frame.timestamp_ms - frame.index as f64 * 100.0).abs() < 1e-9);
            shades.push(frame.image.get_pixel(0, 0).0[0]);
        }
        assert_eq!(shades, vec![10, 20, 30]);
        std::fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn test_missing_input_dir_is_an_error() {
        let config = Config {
            video: crate::types::VideoConfig {
                input_dir: "/nonexistent/lane-tracker-input".into(),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(VideoProcessor::new(config).find_inputs().is_err());
    }
}
