use crate::models::audio_models::{AudioDeviceDescriptor, AudioFormat, PcmChunk};
use crate::models::error::CaptureError;

/// Opaque handle to a stream opened by an [`AudioBackend`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamHandle(u64);

impl StreamHandle {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Host audio I/O capability.
///
/// Shared between the controller and the capture worker, so every method
/// takes `&self` and implementations synchronize internally. A stream may be
/// closed from the controller while the worker is blocked in `read`; the
/// read must then return `StreamRead` promptly.
///
/// Implemented by:
/// - `CpalBackend` (lecture-capture-host)
/// - a scripted fake in this crate's tests
pub trait AudioBackend: Send + Sync {
    /// All input-capable endpoints currently known to the host.
    fn enumerate_devices(&self) -> Result<Vec<AudioDeviceDescriptor>, CaptureError>;

    /// Open an input stream on `device` in exactly `format`.
    fn open_stream(&self, device: &AudioDeviceDescriptor, format: &AudioFormat) -> Result<StreamHandle, CaptureError>;

    /// Block until `frames` frames are available and return them as PCM bytes.
    ///
    /// Bounded by roughly one chunk period plus a backend-defined timeout.
    fn read(&self, stream: StreamHandle, frames: usize) -> Result<PcmChunk, CaptureError>;

    /// Stop and release a stream. Closing an already-closed handle is `Ok`.
    fn close(&self, stream: StreamHandle) -> Result<(), CaptureError>;
}
