use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::models::error::CaptureError;

#[derive(Debug, Serialize, Deserialize)]
struct CounterRecord {
    counter: u64,
}

/// Persisted, monotonically increasing recording number.
///
/// Stored as `{"counter": n}`. Every [`next`](Self::next) call re-reads the
/// file, increments, and atomically replaces it (write temp + rename) before
/// the number is handed out, so numbers survive restarts and are never reused.
#[derive(Debug)]
pub struct SequenceCounter {
    path: PathBuf,
    current: u64,
}

impl SequenceCounter {
    /// Load the counter at `path`. A missing file starts at 0.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, CaptureError> {
        let path = path.into();
        let current = read_counter(&path)?;
        log::debug!("Sequence counter at {} = {}", path.display(), current);
        Ok(Self { path, current })
    }

    /// A counter at `path` that has not been read yet.
    /// [`next`](Self::next) fails for as long as the file is unusable.
    pub fn deferred(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            current: 0,
        }
    }

    /// Last number handed out (0 if none yet).
    pub fn current(&self) -> u64 {
        self.current
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Increment, persist, and return the new number.
    pub fn next(&mut self) -> Result<u64, CaptureError> {
        let on_disk = read_counter(&self.path)?;
        let next = self
            .current
            .max(on_disk)
            .checked_add(1)
            .ok_or_else(|| CaptureError::FilenameGeneration("sequence counter overflow".into()))?;
        write_counter(&self.path, next)?;
        self.current = next;
        Ok(next)
    }
}

fn read_counter(path: &Path) -> Result<u64, CaptureError> {
    if !path.exists() {
        return Ok(0);
    }
    let text = fs::read_to_string(path)
        .map_err(|e| CaptureError::FilenameGeneration(format!("failed to read counter: {}", e)))?;
    let record: CounterRecord = serde_json::from_str(&text)
        .map_err(|e| CaptureError::FilenameGeneration(format!("corrupt counter file: {}", e)))?;
    Ok(record.counter)
}

fn write_counter(path: &Path, counter: u64) -> Result<(), CaptureError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| CaptureError::FilenameGeneration(format!("failed to create directory: {}", e)))?;
    }
    let json = serde_json::to_vec(&CounterRecord { counter })
        .map_err(|e| CaptureError::FilenameGeneration(format!("failed to serialize counter: {}", e)))?;

    let tmp = path.with_extension("json.tmp");
    let persist = || -> std::io::Result<()> {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(&json)?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    };
    persist().map_err(|e| {
        let _ = fs::remove_file(&tmp);
        CaptureError::FilenameGeneration(format!("failed to persist counter: {}", e))
    })
}
