use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::models::audio_models::{AudioFormat, DeviceSelection, PcmChunk};
use crate::models::error::CaptureError;
use crate::models::recording_result::{round_centis, RecordingStatus};
use crate::models::state::{CaptureState, SessionPhase};
use crate::processing::stream_mixer::StreamMixer;
use crate::traits::audio_backend::{AudioBackend, StreamHandle};

/// State shared between the controller and the capture worker.
///
/// The worker is the only writer of `chunks`; the controller owns state
/// transitions other than `Starting → Recording` and `→ Faulted`.
pub(crate) struct SessionShared {
    running: AtomicBool,
    // Set once the worker thread has returned, however it returned.
    exited: AtomicBool,
    state: Mutex<CaptureState>,
    chunks: Mutex<Vec<PcmChunk>>,
    streams: Mutex<Vec<StreamHandle>>,
    recording_since: Mutex<Option<Instant>>,
    sequence_number: u64,
    output_path: PathBuf,
    started_at: DateTime<Utc>,
}

impl SessionShared {
    fn new(sequence_number: u64, output_path: PathBuf) -> Self {
        Self {
            running: AtomicBool::new(true),
            exited: AtomicBool::new(false),
            state: Mutex::new(CaptureState::Starting),
            chunks: Mutex::new(Vec::new()),
            streams: Mutex::new(Vec::new()),
            recording_since: Mutex::new(None),
            sequence_number,
            output_path,
            started_at: Utc::now(),
        }
    }

    pub fn state(&self) -> CaptureState {
        self.state.lock().clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Cooperative stop: honored by the worker at the next chunk boundary.
    pub fn request_stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// The worker thread has finished; no more chunks will be appended.
    pub fn has_exited(&self) -> bool {
        self.exited.load(Ordering::SeqCst)
    }

    /// A stop was requested through the flag alone and `stop()` has not
    /// yet collected the session.
    pub fn stop_pending(&self) -> bool {
        !self.is_running() && self.state.lock().is_recording()
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.lock().len()
    }

    fn set_state(&self, new_state: CaptureState) {
        let mut state = self.state.lock();
        log::debug!("Session #{}: {:?} -> {:?}", self.sequence_number, *state, new_state);
        *state = new_state;
    }

    /// `Starting → Recording`, only if nothing else moved the session meanwhile.
    fn begin_recording(&self) -> bool {
        let mut state = self.state.lock();
        if !matches!(*state, CaptureState::Starting) || !self.is_running() {
            return false;
        }
        *self.recording_since.lock() = Some(Instant::now());
        *state = CaptureState::Recording;
        true
    }

    /// Record a failure and halt the loop. The first fault wins.
    fn fault(&self, error: CaptureError) {
        self.request_stop();
        let mut state = self.state.lock();
        if !state.is_faulted() {
            log::error!("Session #{} faulted: {}", self.sequence_number, error);
            *state = CaptureState::Faulted(error);
        }
    }

    /// Register an opened stream, or close it straight away if the session
    /// was stopped while it was opening.
    fn adopt_stream(&self, backend: &dyn AudioBackend, handle: StreamHandle) -> Option<StreamHandle> {
        let mut streams = self.streams.lock();
        if !self.is_running() {
            drop(streams);
            let _ = backend.close(handle);
            return None;
        }
        streams.push(handle);
        Some(handle)
    }

    /// Close every registered stream. Idempotent; returns false if any close failed.
    fn close_streams(&self, backend: &dyn AudioBackend) -> bool {
        let streams = std::mem::take(&mut *self.streams.lock());
        let mut clean = true;
        for stream in streams {
            log::debug!("Closing audio stream {}", stream.id());
            if let Err(e) = backend.close(stream) {
                log::error!("Error closing stream {}: {}", stream.id(), e);
                clean = false;
            }
        }
        clean
    }

    fn take_chunks(&self) -> Vec<PcmChunk> {
        std::mem::take(&mut *self.chunks.lock())
    }

    fn elapsed_secs(&self) -> f64 {
        if !self.state.lock().is_recording() {
            return 0.0;
        }
        self.recording_since
            .lock()
            .map(|since| since.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }

    pub fn status(&self) -> RecordingStatus {
        let state = self.state();
        let phase = match state {
            CaptureState::Recording if !self.is_running() => SessionPhase::Stopping,
            _ => state.phase(),
        };
        RecordingStatus {
            recording: state.is_recording() && !self.has_exited(),
            state: phase,
            duration_seconds: round_centis(self.elapsed_secs()),
            filename: Some(self.output_path.to_string_lossy().into_owned()),
            sequence_number: Some(self.sequence_number),
            chunks_captured: self.chunk_count(),
            error: state.fault().map(ToString::to_string),
        }
    }
}

/// What `stop()` salvaged from a session.
pub(crate) struct Captured {
    pub chunks: Vec<PcmChunk>,
    pub fault: Option<CaptureError>,
}

struct CaptureWorker {
    handle: thread::JoinHandle<()>,
    // Disconnects when the worker thread exits, however it exits.
    done: mpsc::Receiver<()>,
}

impl CaptureWorker {
    /// Wait up to `timeout` for the worker to exit. Returns false if it was
    /// abandoned; an abandoned thread is detached, never killed.
    fn join(self, timeout: Duration) -> bool {
        match self.done.recv_timeout(timeout) {
            Err(mpsc::RecvTimeoutError::Timeout) => {
                log::warn!("Capture worker did not exit within {:?}; abandoning it", timeout);
                false
            }
            _ => {
                if self.handle.join().is_err() {
                    log::error!("Capture worker panicked");
                }
                true
            }
        }
    }
}

/// Marks the worker exited, and moves the session to `Faulted` if the
/// worker unwinds.
struct ExitGuard(Arc<SessionShared>);

impl Drop for ExitGuard {
    fn drop(&mut self) {
        if thread::panicking() {
            self.0.fault(CaptureError::StreamRead("capture worker panicked".into()));
        }
        self.0.exited.store(true, Ordering::SeqCst);
    }
}

/// One recording: its devices, capture worker, and accumulated audio.
pub(crate) struct RecordingSession {
    shared: Arc<SessionShared>,
    devices: DeviceSelection,
    worker: Option<CaptureWorker>,
    ready: Option<mpsc::Receiver<Result<(), CaptureError>>>,
}

impl RecordingSession {
    /// Spawn the capture worker. The session starts in `Starting`; call
    /// [`wait_until_recording`](Self::wait_until_recording) to learn whether
    /// any stream opened.
    pub fn spawn(
        backend: Arc<dyn AudioBackend>,
        devices: DeviceSelection,
        format: AudioFormat,
        sequence_number: u64,
        output_path: PathBuf,
    ) -> Result<Self, CaptureError> {
        let shared = Arc::new(SessionShared::new(sequence_number, output_path));
        let (ready_tx, ready_rx) = mpsc::sync_channel(1);
        let (done_tx, done_rx) = mpsc::channel::<()>();

        let worker_shared = Arc::clone(&shared);
        let worker_devices = devices.clone();
        let handle = thread::Builder::new()
            .name(format!("lecture-capture-{}", sequence_number))
            .spawn(move || {
                let _done = done_tx;
                let _guard = ExitGuard(Arc::clone(&worker_shared));
                run_capture(backend.as_ref(), &worker_shared, &worker_devices, &format, ready_tx);
            })
            .map_err(|e| CaptureError::StreamOpen(format!("failed to spawn capture thread: {}", e)))?;

        log::info!("Recording thread started for session #{}", sequence_number);
        Ok(Self {
            shared,
            devices,
            worker: Some(CaptureWorker { handle, done: done_rx }),
            ready: Some(ready_rx),
        })
    }

    /// Block until the worker reports its streams open (→ `Recording`) or
    /// fails to open any (→ `Faulted`, `StreamOpen`).
    pub fn wait_until_recording(&mut self, timeout: Duration) -> Result<(), CaptureError> {
        let Some(ready) = self.ready.take() else {
            return match self.shared.state() {
                CaptureState::Faulted(err) => Err(err),
                _ => Ok(()),
            };
        };
        match ready.recv_timeout(timeout) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                let err = CaptureError::StreamOpen(format!("audio streams did not open within {:?}", timeout));
                self.shared.fault(err.clone());
                Err(err)
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                let err = self
                    .shared
                    .state()
                    .fault()
                    .cloned()
                    .unwrap_or_else(|| CaptureError::StreamOpen("capture worker exited during start".into()));
                self.shared.fault(err.clone());
                Err(err)
            }
        }
    }

    pub fn shared(&self) -> &Arc<SessionShared> {
        &self.shared
    }

    pub fn state(&self) -> CaptureState {
        self.shared.state()
    }

    pub fn devices(&self) -> &DeviceSelection {
        &self.devices
    }

    pub fn sequence_number(&self) -> u64 {
        self.shared.sequence_number
    }

    pub fn output_path(&self) -> &Path {
        &self.shared.output_path
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.shared.started_at
    }

    /// `Recording → Stopping`: signal the worker, wait up to `timeout`, close
    /// streams, and hand back whatever was captured. A faulted session keeps
    /// its fault so the caller can report it.
    pub fn stop(&mut self, backend: &dyn AudioBackend, timeout: Duration) -> Captured {
        let fault = self.shared.state().fault().cloned();
        if fault.is_none() {
            self.shared.set_state(CaptureState::Stopping);
        }
        self.shared.request_stop();

        if let Some(worker) = self.worker.take() {
            if !worker.join(timeout) {
                log::warn!("Proceeding with audio captured so far");
            }
        }
        self.shared.close_streams(backend);

        Captured {
            chunks: self.shared.take_chunks(),
            fault,
        }
    }

    /// Mark a stopped session finished.
    pub fn finish(&self) {
        if !self.shared.state().is_faulted() {
            self.shared.set_state(CaptureState::Idle);
        }
    }

    /// Unconditional teardown from any state; always ends `Idle`.
    ///
    /// Returns false when some step (join, stream close) did not complete
    /// cleanly. Such failures are logged, never propagated.
    pub fn force_reset(&mut self, backend: &dyn AudioBackend, timeout: Duration) -> bool {
        self.shared.request_stop();
        self.ready = None;

        let joined = self.worker.take().map_or(true, |worker| worker.join(timeout));
        let closed = self.shared.close_streams(backend);
        let discarded = self.shared.take_chunks().len();
        if discarded > 0 {
            log::warn!("Discarded {} unsaved chunks of session #{}", discarded, self.shared.sequence_number);
        }
        *self.shared.recording_since.lock() = None;
        self.shared.set_state(CaptureState::Idle);
        joined && closed
    }
}

fn run_capture(
    backend: &dyn AudioBackend,
    shared: &SessionShared,
    devices: &DeviceSelection,
    format: &AudioFormat,
    ready: mpsc::SyncSender<Result<(), CaptureError>>,
) {
    log::info!("Opening audio streams");
    let loopback = devices
        .loopback
        .as_ref()
        .and_then(|device| open_source(backend, shared, device, format, "loopback"));
    let microphone = devices
        .microphone
        .as_ref()
        .and_then(|device| open_source(backend, shared, device, format, "microphone"));

    if loopback.is_none() && microphone.is_none() {
        let err = CaptureError::StreamOpen("failed to open any audio streams; check your audio devices".into());
        shared.fault(err.clone());
        let _ = ready.send(Err(err));
        return;
    }

    if !shared.begin_recording() {
        shared.close_streams(backend);
        return;
    }
    let _ = ready.send(Ok(()));
    drop(ready);

    log::info!("Starting audio capture loop");
    while shared.is_running() {
        match read_mixed(backend, loopback, microphone, format) {
            Ok(mixed) => shared.chunks.lock().push(mixed),
            Err(e) => {
                if shared.is_running() {
                    shared.fault(e);
                }
                break;
            }
        }
    }

    shared.close_streams(backend);
    log::info!(
        "Capture loop for session #{} ended after {} chunks",
        shared.sequence_number,
        shared.chunk_count()
    );
}

fn open_source(
    backend: &dyn AudioBackend,
    shared: &SessionShared,
    device: &crate::models::audio_models::AudioDeviceDescriptor,
    format: &AudioFormat,
    role: &str,
) -> Option<StreamHandle> {
    match backend.open_stream(device, format) {
        Ok(handle) => {
            log::info!("{} stream opened on {}", role, device.name);
            shared.adopt_stream(backend, handle)
        }
        Err(e) => {
            log::error!("Error opening {} stream on {}: {}; using silence", role, device.name, e);
            None
        }
    }
}

/// One loop iteration: a chunk from each source (silence if absent), mixed.
fn read_mixed(
    backend: &dyn AudioBackend,
    loopback: Option<StreamHandle>,
    microphone: Option<StreamHandle>,
    format: &AudioFormat,
) -> Result<PcmChunk, CaptureError> {
    let system = match loopback {
        Some(stream) => backend.read(stream, format.chunk_frames)?,
        None => format.silence(),
    };
    let voice = match microphone {
        Some(stream) => backend.read(stream, format.chunk_frames)?,
        None => format.silence(),
    };
    Ok(StreamMixer::mix(&system, &voice))
}
