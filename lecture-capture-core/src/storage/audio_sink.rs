use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::models::audio_models::{AudioFormat, PcmChunk};
use crate::models::error::CaptureError;
use crate::models::recording_result::SinkReport;
use crate::processing::wav_format::{self, WAV_HEADER_SIZE};

/// Serializes captured PCM chunks into a WAV file.
///
/// ## File Format
/// ```text
/// [44-byte WAV header]
/// [chunk 0][chunk 1]...[chunk n]   raw 16-bit PCM, in capture order
/// ```
///
/// The SHA-256 checksum is computed over the bytes as they are written.
#[derive(Debug, Clone, Copy, Default)]
pub struct AudioSink;

impl AudioSink {
    /// Write `chunks` to `path` as a complete WAV file.
    ///
    /// Fails with `EmptyRecording` when there is nothing to write and
    /// `IoWrite` on any filesystem error. On success the file exists, is
    /// non-empty, and declares `total_frames / sample_rate` seconds.
    pub fn write(path: &Path, format: &AudioFormat, chunks: &[PcmChunk]) -> Result<SinkReport, CaptureError> {
        let data_bytes: u64 = chunks.iter().map(|c| c.len() as u64).sum();
        if data_bytes == 0 {
            return Err(CaptureError::EmptyRecording);
        }
        let data_size = u32::try_from(data_bytes)
            .ok()
            .filter(|size| *size <= u32::MAX - 36)
            .ok_or_else(|| CaptureError::IoWrite(format!("{} bytes exceeds the WAV size limit", data_bytes)))?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| CaptureError::IoWrite(format!("failed to create directory: {}", e)))?;
        }

        let file = File::create(path).map_err(|e| CaptureError::IoWrite(format!("failed to create file: {}", e)))?;
        let mut out = BufWriter::new(file);
        let mut hasher = Sha256::new();

        let header = wav_format::generate_wav_header(format, data_size);
        write_hashed(&mut out, &mut hasher, &header)?;
        for chunk in chunks {
            write_hashed(&mut out, &mut hasher, chunk)?;
        }

        let file = out
            .into_inner()
            .map_err(|e| CaptureError::IoWrite(format!("flush failed: {}", e.error())))?;
        file.sync_all()
            .map_err(|e| CaptureError::IoWrite(format!("sync failed: {}", e)))?;
        drop(file);

        let file_size = fs::metadata(path)
            .map_err(|e| CaptureError::IoWrite(format!("file was not created: {}", e)))?
            .len();
        let expected = WAV_HEADER_SIZE as u64 + data_bytes;
        if file_size != expected {
            return Err(CaptureError::IoWrite(format!(
                "file size mismatch: expected {} bytes, found {}",
                expected, file_size
            )));
        }

        let total_frames = format.frames_in(data_bytes);
        log::info!(
            "Audio file saved: {} ({} bytes, {} frames)",
            path.display(),
            file_size,
            total_frames
        );

        Ok(SinkReport {
            file_size,
            data_bytes,
            total_frames,
            duration_secs: format.duration_secs(data_bytes),
            checksum: hex_encode(&hasher.finalize()),
        })
    }
}

fn write_hashed(out: &mut impl Write, hasher: &mut Sha256, data: &[u8]) -> Result<(), CaptureError> {
    out.write_all(data)
        .map_err(|e| CaptureError::IoWrite(format!("write failed: {}", e)))?;
    hasher.update(data);
    Ok(())
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
