// src/pipeline/measurement_log.rs
//
// Append-only JSON-lines sink for per-frame measurements.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;

use super::frame_context::MeasurementRecord;

pub struct MeasurementLog {
    path: PathBuf,
    writer: BufWriter<File>,
    lines: u64,
}

impl MeasurementLog {
    /// Opens `path` for appending, creating parent directories.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open measurement log: {}", path.display()))?;
        info!("📝 Measurements → {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            lines: 0,
        })
    }

    pub fn append(&mut self, record: &MeasurementRecord) -> Result<()> {
        let json_line = serde_json::to_string(record)?;
        writeln!(self.writer, "{}", json_line)?;
        self.lines += 1;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer
            .flush()
            .with_context(|| format!("Failed to flush {}", self.path.display()))
    }

    pub fn lines_written(&self) -> u64 {
        self.lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(frame_index: u64) -> MeasurementRecord {
        MeasurementRecord {
            stream: "clip".into(),
            frame_index,
            timestamp_ms: frame_index as f64 * 40.0,
            search: "WINDOW",
            mode: "SEARCHING",
            left_coeffs: None,
            right_coeffs: Some([1e-4, -0.2, 900.0]),
            left_rejection: Some("insufficient pixels".into()),
            right_rejection: None,
            center_offset_px: -12.5,
            geometry: None,
            held_overlay: false,
        }
    }

    #[test]
    fn test_writes_one_json_object_per_line() {
        let dir = std::env::temp_dir().join(format!("lane-tracker-log-{}", std::process::id()));
        let path = dir.join("measurements.jsonl");
        std::fs::remove_file(&path).ok();

        let mut log = MeasurementLog::open(&path).unwrap();
        log.append(&record(0)).unwrap();
        log.append(&record(1)).unwrap();
        log.flush().unwrap();
        assert_eq!(log.lines_written(), 2);

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(parsed["frame_index"], 1);
        assert_eq!(parsed["left_coeffs"], serde_json::Value::Null);
        assert_eq!(parsed["center_offset_px"], -12.5);
        std::fs::remove_dir_all(&dir).ok();
    }
}
