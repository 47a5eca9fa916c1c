use std::fs;
use std::path::{Path, PathBuf};

use crate::models::error::CaptureError;

/// A temporary copy of a finalized recording, served instead of the original
/// so the original stays intact for later downloads.
///
/// The copy is deleted when this value is dropped, i.e. once the response
/// that streamed it has completed.
#[derive(Debug)]
pub struct DownloadCopy {
    path: PathBuf,
    filename: String,
}

impl DownloadCopy {
    /// Copy `source` into `temp_dir` under a unique name.
    pub fn create(source: &Path, temp_dir: &Path) -> Result<Self, CaptureError> {
        if !source.is_file() {
            return Err(CaptureError::NoRecordingAvailable);
        }
        let filename = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or(CaptureError::NoRecordingAvailable)?;

        fs::create_dir_all(temp_dir)
            .map_err(|e| CaptureError::IoWrite(format!("failed to create temp directory: {}", e)))?;
        let path = temp_dir.join(format!("{}_{}", uuid::Uuid::new_v4().simple(), filename));
        fs::copy(source, &path).map_err(|e| CaptureError::IoWrite(format!("failed to copy recording: {}", e)))?;
        log::info!("Recording copied to temp location: {}", path.display());

        Ok(Self { path, filename })
    }

    /// Location of the temporary copy.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Name the client should save the file as.
    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn media_type(&self) -> &'static str {
        "audio/wav"
    }

    /// `attachment; filename*=UTF-8''<percent-encoded name>` (RFC 5987).
    pub fn content_disposition(&self) -> String {
        format!("attachment; filename*=UTF-8''{}", encode_rfc5987(&self.filename))
    }

    pub fn read_bytes(&self) -> Result<Vec<u8>, CaptureError> {
        fs::read(&self.path).map_err(|e| CaptureError::IoWrite(format!("failed to read temp copy: {}", e)))
    }
}

impl Drop for DownloadCopy {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => log::info!("Cleaned up temp file: {}", self.path.display()),
            Err(e) => log::error!("Error cleaning up temp file {}: {}", self.path.display(), e),
        }
    }
}

fn encode_rfc5987(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'!' | b'#' | b'$' | b'&' | b'+' | b'-' | b'.' | b'^' | b'_'
            | b'`' | b'|' | b'~' => out.push(byte as char),
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn copy_is_removed_on_drop_and_original_kept() {
        let dir = tempdir().unwrap();
        let original = dir.path().join("lecture_4_2026-03-02_10-15-00.wav");
        fs::write(&original, b"RIFF....WAVE").unwrap();
        let temp_dir = dir.path().join("temp");

        let copy = DownloadCopy::create(&original, &temp_dir).unwrap();
        let copy_path = copy.path().to_path_buf();
        assert!(copy_path.starts_with(&temp_dir));
        assert_eq!(copy.filename(), "lecture_4_2026-03-02_10-15-00.wav");
        assert_eq!(copy.read_bytes().unwrap(), b"RIFF....WAVE");

        drop(copy);
        assert!(!copy_path.exists());
        assert!(original.exists());
    }

    #[test]
    fn two_copies_do_not_collide() {
        let dir = tempdir().unwrap();
        let original = dir.path().join("a.wav");
        fs::write(&original, b"data").unwrap();
        let first = DownloadCopy::create(&original, dir.path()).unwrap();
        let second = DownloadCopy::create(&original, dir.path()).unwrap();
        assert_ne!(first.path(), second.path());
    }

    #[test]
    fn missing_source() {
        let dir = tempdir().unwrap();
        let result = DownloadCopy::create(&dir.path().join("gone.wav"), dir.path());
        assert!(matches!(result, Err(CaptureError::NoRecordingAvailable)));
    }

    #[test]
    fn content_disposition_encodes_non_token_bytes() {
        assert_eq!(encode_rfc5987("lecture_1_2026-01-01.wav"), "lecture_1_2026-01-01.wav");
        assert_eq!(encode_rfc5987("cours é 1.wav"), "cours%20%C3%A9%201.wav");
    }
}
