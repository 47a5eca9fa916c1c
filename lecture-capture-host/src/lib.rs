//! # lecture-capture-host
//!
//! cpal backend for lecture-capture-core.
//!
//! Provides:
//! - `CpalBackend`: `AudioBackend` over cpal's default host, one owner thread per stream
//! - `DeviceEnumerator`: input device listing with default-device detection
//!
//! ## Usage
//! ```ignore
//! use std::sync::Arc;
//! use lecture_capture_core::{Recorder, RecorderConfig};
//! use lecture_capture_host::CpalBackend;
//!
//! let recorder = Recorder::new(RecorderConfig::default(), Arc::new(CpalBackend::new()))?;
//! let started = recorder.start()?;
//! ```

pub mod cpal_backend;
pub mod device_enumerator;

pub use cpal_backend::CpalBackend;
pub use device_enumerator::DeviceEnumerator;
