use thiserror::Error;

/// Errors that can occur while capturing or finalizing a lecture recording.
///
/// Failures inside the capture worker never cross the thread boundary as
/// panics; they are stored on the session and surfaced by the next
/// `status()`/`stop()` call.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("device enumeration failed: {0}")]
    DeviceEnumeration(String),

    #[error("no audio recording devices available; enable Stereo Mix or a microphone")]
    NoDeviceAvailable,

    #[error("failed to open audio stream: {0}")]
    StreamOpen(String),

    #[error("failed to read audio stream: {0}")]
    StreamRead(String),

    #[error("no audio data to save")]
    EmptyRecording,

    #[error("failed to write audio file: {0}")]
    IoWrite(String),

    #[error("could not generate output filename: {0}")]
    FilenameGeneration(String),

    #[error("a recording is already in progress")]
    AlreadyRecording,

    #[error("no recording file found")]
    NoRecordingAvailable,

    #[error("invalid configuration: {0}")]
    Configuration(String),
}

impl CaptureError {
    /// Stable machine-readable identifier for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::DeviceEnumeration(_) => "device_enumeration_failed",
            Self::NoDeviceAvailable => "no_device_available",
            Self::StreamOpen(_) => "stream_open_failed",
            Self::StreamRead(_) => "stream_read_failed",
            Self::EmptyRecording => "empty_recording",
            Self::IoWrite(_) => "io_write_failed",
            Self::FilenameGeneration(_) => "filename_generation_failed",
            Self::AlreadyRecording => "already_recording",
            Self::NoRecordingAvailable => "no_recording_available",
            Self::Configuration(_) => "invalid_configuration",
        }
    }

    /// HTTP status a request handler should answer with.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::NoDeviceAvailable | Self::Configuration(_) => 400,
            Self::NoRecordingAvailable => 404,
            Self::AlreadyRecording => 409,
            _ => 500,
        }
    }
}
