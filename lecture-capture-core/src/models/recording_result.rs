use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::audio_models::DeviceNames;
use super::error::CaptureError;
use super::state::SessionPhase;

/// Returned by a successful `start()`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StartReport {
    pub message: String,
    pub start_time: DateTime<Utc>,
    pub sequence_number: u64,
    pub filename: String,
    pub devices: DeviceNames,
}

/// Returned by `stop()`. Never an error: failures are reported in `error`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StopReport {
    pub message: String,
    pub filename: Option<String>,
    pub duration_seconds: f64,
    pub file_size_bytes: u64,
    pub checksum: Option<String>,
    pub error: Option<String>,
}

impl StopReport {
    pub fn nothing_recording() -> Self {
        Self::empty("No recording was in progress", None)
    }

    pub fn nothing_captured(fault: Option<&CaptureError>) -> Self {
        Self::empty("Recording stopped but no audio was captured", fault.map(ToString::to_string))
    }

    pub fn save_failed(err: &CaptureError) -> Self {
        Self::empty("Error saving audio file", Some(err.to_string()))
    }

    pub fn saved(path: &Path, sink: &SinkReport, fault: Option<&CaptureError>) -> Self {
        let message = if fault.is_some() {
            "Recording stopped after a capture fault; partial audio saved"
        } else {
            "Recording stopped successfully"
        };
        Self {
            message: message.into(),
            filename: Some(path.to_string_lossy().into_owned()),
            duration_seconds: round_centis(sink.duration_secs),
            file_size_bytes: sink.file_size,
            checksum: Some(sink.checksum.clone()),
            error: fault.map(ToString::to_string),
        }
    }

    fn empty(message: &str, error: Option<String>) -> Self {
        Self {
            message: message.into(),
            filename: None,
            duration_seconds: 0.0,
            file_size_bytes: 0,
            checksum: None,
            error,
        }
    }
}

/// Non-blocking snapshot of the recorder.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordingStatus {
    pub recording: bool,
    pub state: SessionPhase,
    pub duration_seconds: f64,
    pub filename: Option<String>,
    pub sequence_number: Option<u64>,
    pub chunks_captured: usize,
    pub error: Option<String>,
}

impl RecordingStatus {
    pub fn idle() -> Self {
        Self {
            recording: false,
            state: SessionPhase::Idle,
            duration_seconds: 0.0,
            filename: None,
            sequence_number: None,
            chunks_captured: 0,
            error: None,
        }
    }
}

/// Returned by `cleanup()`; always success-shaped.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CleanupReport {
    pub message: String,
    pub recording: bool,
    pub clean: bool,
    pub devices: DeviceNames,
}

/// What `AudioSink::write` produced.
#[derive(Debug, Clone, PartialEq)]
pub struct SinkReport {
    pub file_size: u64,
    pub data_bytes: u64,
    pub total_frames: u64,
    pub duration_secs: f64,
    pub checksum: String,
}

/// JSON sidecar written next to a finalized recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingMetadata {
    pub id: String,
    pub sequence_number: u64,
    pub file_path: String,
    pub duration_seconds: f64,
    pub file_size_bytes: u64,
    pub checksum: String,
    pub created_at: String,
    pub devices: DeviceNames,
}

impl RecordingMetadata {
    pub fn new(sequence_number: u64, path: &Path, sink: &SinkReport, devices: DeviceNames) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            sequence_number,
            file_path: path.to_string_lossy().into_owned(),
            duration_seconds: round_centis(sink.duration_secs),
            file_size_bytes: sink.file_size,
            checksum: sink.checksum.clone(),
            created_at: Utc::now().to_rfc3339(),
            devices,
        }
    }
}

pub(crate) fn round_centis(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn sink() -> SinkReport {
        SinkReport {
            file_size: 4140,
            data_bytes: 4096,
            total_frames: 1024,
            duration_secs: 1024.0 / 44_100.0,
            checksum: "ab".repeat(32),
        }
    }

    #[test]
    fn nothing_recording_is_zeroed() {
        let report = StopReport::nothing_recording();
        assert_eq!(report.duration_seconds, 0.0);
        assert_eq!(report.file_size_bytes, 0);
        assert!(report.filename.is_none());
        assert!(report.error.is_none());
    }

    #[test]
    fn saved_rounds_duration() {
        let path = PathBuf::from("/tmp/lecture_1.wav");
        let report = StopReport::saved(&path, &sink(), None);
        assert_eq!(report.duration_seconds, 0.02);
        assert_eq!(report.file_size_bytes, 4140);
        assert_eq!(report.message, "Recording stopped successfully");
    }

    #[test]
    fn saved_after_fault_carries_error() {
        let path = PathBuf::from("/tmp/lecture_1.wav");
        let fault = CaptureError::StreamRead("device unplugged".into());
        let report = StopReport::saved(&path, &sink(), Some(&fault));
        assert_eq!(report.error.as_deref(), Some(fault.to_string().as_str()));
    }

    #[test]
    fn status_serializes_phase_lowercase() {
        let json = serde_json::to_value(RecordingStatus::idle()).unwrap();
        assert_eq!(json["state"], "idle");
        assert_eq!(json["recording"], false);
        assert!(json["filename"].is_null());
    }

    #[test]
    fn metadata_roundtrips_through_json() {
        let metadata = RecordingMetadata::new(7, Path::new("/tmp/x.wav"), &sink(), DeviceNames::default());
        let json = serde_json::to_string(&metadata).unwrap();
        let back: RecordingMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(back, metadata);
        assert_eq!(back.sequence_number, 7);
        assert_eq!(back.duration_seconds, 0.02);
    }

    #[test]
    fn metadata_keeps_unrounded_floats_exact() {
        let mut metadata = RecordingMetadata::new(1, Path::new("/tmp/y.wav"), &sink(), DeviceNames::default());
        metadata.duration_seconds = 1024.0 / 44_100.0;
        let json = serde_json::to_string(&metadata).unwrap();
        let back: RecordingMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(back.duration_seconds.to_bits(), metadata.duration_seconds.to_bits());
    }
}
