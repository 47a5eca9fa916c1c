//! # lecture-capture-core
//!
//! Platform-agnostic core of the lecture recorder.
//!
//! Captures system audio (a loopback input such as "Stereo Mix") and the
//! default microphone at the same time, sums them into one 16-bit stereo
//! 44.1 kHz stream, and writes a WAV file named after a persisted sequence
//! number. Host audio I/O sits behind the [`AudioBackend`] trait; the cpal
//! implementation lives in `lecture-capture-host`.
//!
//! ## Architecture
//!
//! ```text
//! lecture-capture-core (this crate)
//! ├── traits/       ← AudioBackend, StreamHandle
//! ├── devices/      ← DeviceCatalog (loopback / microphone classification)
//! ├── models/       ← CaptureError, CaptureState, RecorderConfig, reports
//! ├── processing/   ← StreamMixer, WAV header generation
//! ├── session/      ← Recorder facade, capture worker
//! └── storage/      ← AudioSink, SequenceCounter, metadata, DownloadCopy
//! ```

pub mod devices;
pub mod models;
pub mod processing;
pub mod session;
pub mod storage;
pub mod traits;

// Re-export key types at crate root for convenience.
pub use devices::device_catalog::DeviceCatalog;
pub use models::audio_models::{AudioDeviceDescriptor, AudioFormat, DeviceNames, DeviceSelection, PcmChunk};
pub use models::config::{BusyStartPolicy, RecorderConfig};
pub use models::error::CaptureError;
pub use models::recording_result::{CleanupReport, RecordingMetadata, RecordingStatus, StartReport, StopReport};
pub use models::state::{CaptureState, SessionPhase};
pub use processing::stream_mixer::StreamMixer;
pub use session::recorder::{Recorder, StopSignal};
pub use storage::audio_sink::AudioSink;
pub use storage::download::DownloadCopy;
pub use storage::sequence_counter::SequenceCounter;
pub use traits::audio_backend::{AudioBackend, StreamHandle};
