// src/lib.rs
//
// Lane boundary tracking for forward-facing road video.

pub mod config;
pub mod debug;
pub mod lane;
pub mod pipeline;
pub mod preprocessing;
pub mod road_overlay;
pub mod types;
pub mod video_processor;

pub use lane::{BinaryMask, LaneGeometry, LaneTracker, TrackOutcome, TrackingMode};
pub use pipeline::{LanePipeline, ProcessedFrame};
pub use types::{Config, Frame};
