use std::fs;
use std::path::{Path, PathBuf};

use crate::models::error::CaptureError;
use crate::models::recording_result::RecordingMetadata;

/// `lecture_3_....wav` → `lecture_3_....metadata.json`
pub fn metadata_path(recording_path: &Path) -> PathBuf {
    recording_path.with_extension("metadata.json")
}

/// Write recording metadata as a JSON sidecar file.
pub fn write_metadata(metadata: &RecordingMetadata, recording_path: &Path) -> Result<(), CaptureError> {
    let json = serde_json::to_string_pretty(metadata)
        .map_err(|e| CaptureError::IoWrite(format!("failed to serialize metadata: {}", e)))?;
    fs::write(metadata_path(recording_path), json)
        .map_err(|e| CaptureError::IoWrite(format!("failed to write metadata: {}", e)))?;
    Ok(())
}

/// Read recording metadata from a JSON sidecar file.
pub fn read_metadata(recording_path: &Path) -> Result<RecordingMetadata, CaptureError> {
    let json = fs::read_to_string(metadata_path(recording_path)).map_err(|_| CaptureError::NoRecordingAvailable)?;
    serde_json::from_str(&json).map_err(|e| CaptureError::IoWrite(format!("failed to parse metadata: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::audio_models::DeviceNames;
    use crate::models::recording_result::SinkReport;
    use tempfile::tempdir;

    #[test]
    fn sidecar_sits_next_to_recording() {
        let dir = tempdir().unwrap();
        let recording = dir.path().join("lecture_2_2026-01-05_09-00-00.wav");
        let sink = SinkReport {
            file_size: 44 + 8,
            data_bytes: 8,
            total_frames: 2,
            duration_secs: 2.0 / 44_100.0,
            checksum: "00".repeat(32),
        };
        let devices = DeviceNames {
            loopback: Some("Stereo Mix".into()),
            microphone: None,
        };
        let metadata = RecordingMetadata::new(2, &recording, &sink, devices);

        write_metadata(&metadata, &recording).unwrap();

        assert!(dir.path().join("lecture_2_2026-01-05_09-00-00.metadata.json").exists());
        assert_eq!(read_metadata(&recording).unwrap(), metadata);
    }

    #[test]
    fn missing_sidecar() {
        let dir = tempdir().unwrap();
        assert_eq!(
            read_metadata(&dir.path().join("nope.wav")),
            Err(CaptureError::NoRecordingAvailable)
        );
    }
}
