use crate::types::Config;
use anyhow::{Context, Result};
use std::fs;

/// Environment variable overriding the configuration path.
pub const CONFIG_ENV: &str = "LANE_TRACKER_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;
        Self::from_yaml(&contents).with_context(|| format!("Invalid config file: {}", path))
    }

    pub fn from_yaml(contents: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// First CLI argument, then `LANE_TRACKER_CONFIG`, then `config.yaml`.
    pub fn resolve_path(cli_arg: Option<String>) -> String {
        cli_arg
            .or_else(|| std::env::var(CONFIG_ENV).ok())
            .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string())
    }

    fn validate(&self) -> Result<()> {
        let window = &self.lane.window;
        anyhow::ensure!(window.windows > 0, "lane.window.windows must be > 0");
        anyhow::ensure!(
            self.lane.targeted.margin > 0.0,
            "lane.targeted.margin must be > 0"
        );
        let scale = &self.geometry.scale;
        anyhow::ensure!(
            scale.xm_per_pix > 0.0 && scale.ym_per_pix > 0.0,
            "geometry.scale must be positive"
        );
        anyhow::ensure!(
            (0.0..=1.0).contains(&self.overlay.blend_weight),
            "overlay.blend_weight must be within [0, 1]"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_yaml_gives_defaults() {
        let config = Config::from_yaml("{}").unwrap();
        assert_eq!(config.lane.window.windows, 9);
        assert_eq!(config.lane.window.margin, 100);
        assert_eq!(config.lane.window.min_pixels, 50);
        assert_eq!(config.lane.targeted.margin, 100.0);
        assert!(!config.geometry.per_line_rounding);
        assert!((config.overlay.blend_weight - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_partial_sections_merge_with_defaults() {
        let yaml = r#"
video:
  input_dir: clips
lane:
  window:
    margin: 80
geometry:
  per_line_rounding: true
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.video.input_dir, "clips");
        assert_eq!(config.video.output_dir, "output");
        assert_eq!(config.lane.window.margin, 80);
        assert_eq!(config.lane.window.windows, 9);
        assert!(config.geometry.per_line_rounding);
    }

    #[test]
    fn test_rejects_zero_windows() {
        let yaml = "lane:\n  window:\n    windows: 0\n";
        assert!(Config::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_cli_argument_wins() {
        assert_eq!(
            Config::resolve_path(Some("custom.yaml".into())),
            "custom.yaml"
        );
    }
}
