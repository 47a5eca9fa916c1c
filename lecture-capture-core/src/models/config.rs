use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::CaptureError;

/// What `start()` does when a session is already starting or recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusyStartPolicy {
    /// Fail with `AlreadyRecording` and leave the running session untouched.
    #[default]
    Reject,
    /// Force-reset the running session, discarding its audio, and start fresh.
    Replace,
}

/// Recorder configuration.
///
/// Loaded from `recorder.toml`; every field has a default so a partial file
/// (or no file at all) is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// Directory receiving recordings, the sequence counter and `temp/`.
    pub recordings_dir: PathBuf,

    /// Output files are named `<prefix>_<seq>_<timestamp>.wav`.
    pub filename_prefix: String,

    /// Case-insensitive device-name fragments identifying a loopback input.
    pub loopback_keywords: Vec<String>,

    /// Bounded wait for the capture worker on `stop()`.
    pub stop_join_timeout_ms: u64,

    /// Bounded wait for the capture worker on force-reset.
    pub reset_join_timeout_ms: u64,

    /// How long `start()` waits for the worker to open its streams.
    pub stream_open_timeout_ms: u64,

    pub busy_start: BusyStartPolicy,

    /// Write `<recording>.metadata.json` next to each finalized file.
    pub write_metadata: bool,
}

impl RecorderConfig {
    const APP_NAME: &'static str = "lecture-recorder";

    /// `<config dir>/lecture-recorder/recorder.toml`.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME)
            .join("recorder.toml")
    }

    fn default_recordings_dir() -> PathBuf {
        dirs::document_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("recordings")
    }

    /// Load from `path`, falling back to defaults when the file is missing.
    pub fn load_or_default(path: &Path) -> Result<Self, CaptureError> {
        if !path.exists() {
            log::info!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path)
            .map_err(|e| CaptureError::Configuration(format!("failed to read {}: {}", path.display(), e)))?;
        let config: Self = toml::from_str(&text)
            .map_err(|e| CaptureError::Configuration(format!("failed to parse {}: {}", path.display(), e)))?;
        config.validate().map_err(CaptureError::Configuration)?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), CaptureError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| CaptureError::Configuration(format!("failed to create {}: {}", parent.display(), e)))?;
        }
        let text = toml::to_string_pretty(self)
            .map_err(|e| CaptureError::Configuration(format!("failed to serialize config: {}", e)))?;
        fs::write(path, text)
            .map_err(|e| CaptureError::Configuration(format!("failed to write {}: {}", path.display(), e)))
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.filename_prefix.trim().is_empty() {
            return Err("filename prefix must not be empty".into());
        }
        if self.loopback_keywords.iter().all(|k| k.trim().is_empty()) {
            return Err("at least one loopback keyword is required".into());
        }
        if self.stop_join_timeout_ms == 0 || self.reset_join_timeout_ms == 0 || self.stream_open_timeout_ms == 0 {
            return Err("timeouts must be positive".into());
        }
        Ok(())
    }

    pub fn counter_path(&self) -> PathBuf {
        self.recordings_dir.join("sequence_counter.json")
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.recordings_dir.join("temp")
    }

    pub fn stop_join_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_join_timeout_ms)
    }

    pub fn reset_join_timeout(&self) -> Duration {
        Duration::from_millis(self.reset_join_timeout_ms)
    }

    pub fn stream_open_timeout(&self) -> Duration {
        Duration::from_millis(self.stream_open_timeout_ms)
    }
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            recordings_dir: Self::default_recordings_dir(),
            filename_prefix: "lecture".into(),
            loopback_keywords: vec![
                "stereo mix".into(),
                "what u hear".into(),
                "what you hear".into(),
                "loopback".into(),
            ],
            stop_join_timeout_ms: 5_000,
            reset_join_timeout_ms: 1_000,
            stream_open_timeout_ms: 5_000,
            busy_start: BusyStartPolicy::Reject,
            write_metadata: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn defaults_are_valid() {
        let config = RecorderConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.busy_start, BusyStartPolicy::Reject);
        assert!(config.loopback_keywords.contains(&"stereo mix".to_string()));
        assert!(config.counter_path().ends_with("sequence_counter.json"));
    }

    #[test]
    fn rejects_zero_timeout() {
        let config = RecorderConfig {
            stop_join_timeout_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_blank_keywords() {
        let config = RecorderConfig {
            loopback_keywords: vec!["  ".into()],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let config = RecorderConfig::load_or_default(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, RecorderConfig::default());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("recorder.toml");
        fs::write(&path, "filename_prefix = \"cours\"\nbusy_start = \"replace\"\n").unwrap();

        let config = RecorderConfig::load_or_default(&path).unwrap();
        assert_eq!(config.filename_prefix, "cours");
        assert_eq!(config.busy_start, BusyStartPolicy::Replace);
        assert_eq!(config.stop_join_timeout_ms, 5_000);
    }

    #[test]
    fn save_then_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("recorder.toml");
        let config = RecorderConfig {
            recordings_dir: dir.path().join("out"),
            reset_join_timeout_ms: 250,
            ..Default::default()
        };
        config.save(&path).unwrap();
        assert_eq!(RecorderConfig::load_or_default(&path).unwrap(), config);
    }

    #[test]
    fn invalid_toml_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("recorder.toml");
        fs::write(&path, "stop_join_timeout_ms = \"soon\"").unwrap();
        assert!(matches!(
            RecorderConfig::load_or_default(&path),
            Err(CaptureError::Configuration(_))
        ));
    }
}
