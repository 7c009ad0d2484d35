use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::label::LabelMode;
use crate::playback::{DEFAULT_FPS, DEFAULT_SPEEDS};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelerConfig {
    /// Base playback frames per second
    pub fps: f64,
    /// Playback speed multipliers, slowest first
    pub speeds: Vec<f64>,
    /// Label file name used inside the frame directory when no path is given
    pub labels_file_name: String,
    pub mode: LabelMode,
    /// Minimum time between two auto-saves, "0s" saves on every change
    #[serde(with = "humantime_serde")]
    pub autosave_debounce: Duration,
}

impl Default for LabelerConfig {
    fn default() -> Self {
        Self {
            fps: DEFAULT_FPS,
            speeds: DEFAULT_SPEEDS.to_vec(),
            labels_file_name: "labels.json".to_string(),
            mode: LabelMode::Exclusive,
            autosave_debounce: Duration::ZERO,
        }
    }
}

impl LabelerConfig {
    /// Loads the user config, falling back to defaults when it is missing or
    /// cannot be parsed.
    pub fn load() -> Self {
        Self::load_from(Self::config_path())
    }

    pub fn load_from(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            log::info!("No config file at {}, using defaults", path.display());
            return Self::default();
        }

        let parsed = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at {}", path.display()))
            .and_then(|content| {
                serde_json::from_str::<Self>(&content)
                    .with_context(|| format!("Failed to parse config file at {}", path.display()))
            });
        match parsed {
            Ok(config) => {
                log::info!("Loaded config from {}", path.display());
                config
            }
            Err(e) => {
                log::warn!("{e:#}, using defaults");
                Self::default()
            }
        }
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("frame-labeler")
            .join("config.json")
    }

    /// Where the labels of `frame_dir` live when no explicit path is given.
    pub fn labels_path(&self, frame_dir: &Path) -> PathBuf {
        frame_dir.join(&self.labels_file_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = LabelerConfig::default();
        assert_eq!(config.fps, 5.0);
        assert_eq!(config.speeds, vec![1.0, 1.5, 2.0]);
        assert_eq!(config.mode, LabelMode::Exclusive);
        assert_eq!(config.autosave_debounce, Duration::ZERO);
        assert_eq!(
            config.labels_path(Path::new("/frames")),
            Path::new("/frames/labels.json")
        );
    }

    #[test]
    fn partial_config_fills_defaults() {
        let config: LabelerConfig =
            serde_json::from_str(r#"{ "fps": 12.5, "autosave_debounce": "2s 500ms", "mode": "multi" }"#)
                .expect("Failed to parse partial config");
        assert_eq!(config.fps, 12.5);
        assert_eq!(config.autosave_debounce, Duration::from_millis(2500));
        assert_eq!(config.mode, LabelMode::Multi);
        assert_eq!(config.labels_file_name, "labels.json");
    }

    #[test]
    fn written_config_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = LabelerConfig {
            fps: 24.0,
            autosave_debounce: Duration::from_secs(1),
            ..Default::default()
        };
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, serde_json::to_string_pretty(&config).unwrap()).unwrap();
        assert_eq!(LabelerConfig::load_from(&path), config);
    }

    #[test]
    fn broken_config_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ fps: ").unwrap();
        assert_eq!(LabelerConfig::load_from(&path), LabelerConfig::default());
        assert_eq!(
            LabelerConfig::load_from(dir.path().join("missing.json")),
            LabelerConfig::default()
        );
    }
}
