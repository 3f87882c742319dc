// src/pipeline/mod.rs

pub mod frame_context;
pub mod measurement_log;
pub mod metrics;
pub mod orchestrator;

pub use frame_context::{MeasurementRecord, ProcessedFrame};
pub use measurement_log::MeasurementLog;
pub use metrics::{MetricsSummary, PipelineMetrics};
pub use orchestrator::LanePipeline;
