use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Local;
use parking_lot::{Mutex, RwLock};

use super::recording::{Captured, RecordingSession, SessionShared};
use crate::devices::device_catalog::DeviceCatalog;
use crate::models::audio_models::{AudioFormat, DeviceSelection};
use crate::models::config::{BusyStartPolicy, RecorderConfig};
use crate::models::error::CaptureError;
use crate::models::recording_result::{CleanupReport, RecordingMetadata, RecordingStatus, StartReport, StopReport};
use crate::storage::audio_sink::AudioSink;
use crate::storage::download::DownloadCopy;
use crate::storage::metadata::write_metadata;
use crate::storage::sequence_counter::SequenceCounter;
use crate::traits::audio_backend::AudioBackend;

type CurrentSession = Arc<RwLock<Option<Arc<SessionShared>>>>;

/// Cooperative stop request, e.g. from a hotkey listener.
///
/// Clears the running flag of whatever session is active when triggered;
/// the capture loop exits at its next chunk boundary. The captured audio is
/// written by the next [`Recorder::stop`], [`Recorder::start`],
/// [`Recorder::cleanup`] or [`Recorder::download_last`] call, whichever
/// comes first.
#[derive(Clone)]
pub struct StopSignal {
    current: CurrentSession,
}

impl StopSignal {
    /// Returns false when no session was active.
    pub fn trigger(&self) -> bool {
        match self.current.read().as_ref() {
            Some(session) => {
                log::info!("Stop requested");
                session.request_stop();
                true
            }
            None => false,
        }
    }
}

struct Control {
    session: Option<RecordingSession>,
    counter: SequenceCounter,
    devices: DeviceSelection,
    last_recording: Option<PathBuf>,
}

struct ResetOutcome {
    clean: bool,
    devices: Result<DeviceSelection, CaptureError>,
}

/// The recording controller.
///
/// Owns at most one [`RecordingSession`] at a time and serializes
/// start/stop/cleanup behind one lock. [`status`](Self::status) reads a
/// separate snapshot and never waits on those operations.
///
/// ```text
///            start()                   worker opened ≥1 stream
///   Idle ──────────────▶ Starting ──────────────────────────▶ Recording
///    ▲                      │ no stream opened                   │ stop()
///    │                      ▼                                    ▼
///    │◀──── force reset ─ Faulted ◀── read error ──────────── Stopping
///    │                                                           │
///    └───────────────────────── file finalized ◀─────────────────┘
/// ```
pub struct Recorder {
    backend: Arc<dyn AudioBackend>,
    config: RecorderConfig,
    catalog: DeviceCatalog,
    format: AudioFormat,
    control: Mutex<Control>,
    current: CurrentSession,
}

impl Recorder {
    /// Build a recorder over `backend`.
    ///
    /// Creates the recordings directory and loads the sequence counter.
    /// An unreadable counter or a failed initial device enumeration is
    /// logged, not fatal; `start()` reads the counter and enumerates again.
    pub fn new(config: RecorderConfig, backend: Arc<dyn AudioBackend>) -> Result<Self, CaptureError> {
        config.validate().map_err(CaptureError::Configuration)?;
        fs::create_dir_all(&config.recordings_dir).map_err(|e| {
            CaptureError::IoWrite(format!(
                "failed to create recordings directory {}: {}",
                config.recordings_dir.display(),
                e
            ))
        })?;

        let counter = SequenceCounter::load(config.counter_path()).unwrap_or_else(|e| {
            log::error!("Error loading sequence counter: {}", e);
            SequenceCounter::deferred(config.counter_path())
        });
        let catalog = DeviceCatalog::new(&config.loopback_keywords);
        let devices = catalog.select(backend.as_ref()).unwrap_or_else(|e| {
            log::error!("Error initializing audio devices: {}", e);
            DeviceSelection::default()
        });
        log::info!(
            "Recorder ready: recordings in {}, last recording #{}",
            config.recordings_dir.display(),
            counter.current()
        );

        Ok(Self {
            backend,
            config,
            catalog,
            format: AudioFormat::LECTURE,
            control: Mutex::new(Control {
                session: None,
                counter,
                devices,
                last_recording: None,
            }),
            current: Arc::new(RwLock::new(None)),
        })
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    /// Begin a new recording.
    ///
    /// Always force-resets leftover state first, then re-enumerates devices,
    /// allocates the next sequence number and waits for the capture worker
    /// to open its streams.
    pub fn start(&self) -> Result<StartReport, CaptureError> {
        log::info!("Starting recording");
        let mut control = self.control.lock();
        self.collect_signalled_locked(&mut control);

        if let Some(session) = &control.session {
            if session.state().is_busy() {
                match self.config.busy_start {
                    BusyStartPolicy::Reject => {
                        log::warn!("Recording #{} already in progress", session.sequence_number());
                        return Err(CaptureError::AlreadyRecording);
                    }
                    BusyStartPolicy::Replace => {
                        log::warn!("Discarding in-progress recording #{}", session.sequence_number());
                    }
                }
            }
        }

        let devices = self.reset_locked(&mut control).devices?;
        if devices.is_empty() {
            log::error!("No audio devices available");
            return Err(CaptureError::NoDeviceAvailable);
        }

        let sequence_number = control.counter.next()?;
        let filename = format!(
            "{}_{}_{}.wav",
            self.config.filename_prefix,
            sequence_number,
            Local::now().format("%Y-%m-%d_%H-%M-%S")
        );
        let output_path = self.config.recordings_dir.join(&filename);

        let mut session = RecordingSession::spawn(
            Arc::clone(&self.backend),
            devices.clone(),
            self.format,
            sequence_number,
            output_path,
        )?;
        *self.current.write() = Some(Arc::clone(session.shared()));
        let opened = session.wait_until_recording(self.config.stream_open_timeout());
        let start_time = session.started_at();
        control.session = Some(session);
        opened?;

        log::info!("Recording #{} started: {}", sequence_number, filename);
        Ok(StartReport {
            message: "Recording started successfully".into(),
            start_time,
            sequence_number,
            filename,
            devices: devices.names(),
        })
    }

    /// Stop the active recording and finalize its WAV file.
    ///
    /// Never fails: problems are carried in the report. A faulted session
    /// still has its captured audio written before it is force-reset.
    pub fn stop(&self) -> StopReport {
        log::info!("Stopping recording");
        let mut control = self.control.lock();
        self.stop_locked(&mut control)
    }

    fn stop_locked(&self, control: &mut Control) -> StopReport {
        let Some(mut session) = control.session.take() else {
            log::warn!("No recording in progress");
            return StopReport::nothing_recording();
        };

        let captured = session.stop(self.backend.as_ref(), self.config.stop_join_timeout());
        let faulted = captured.fault.is_some();
        let report = self.finalize(control, &session, captured);

        if faulted {
            control.session = Some(session);
            self.reset_locked(control);
        } else {
            session.finish();
            *self.current.write() = None;
        }
        report
    }

    /// Finalize a session whose capture loop was halted by a [`StopSignal`].
    fn collect_signalled_locked(&self, control: &mut Control) {
        let pending = control
            .session
            .as_ref()
            .is_some_and(|session| session.shared().stop_pending());
        if pending {
            log::info!("Saving recording stopped by stop signal");
            let report = self.stop_locked(control);
            log::info!("{}", report.message);
        }
    }

    fn finalize(&self, control: &mut Control, session: &RecordingSession, captured: Captured) -> StopReport {
        let fault = captured.fault.as_ref();
        if captured.chunks.is_empty() {
            log::warn!("No audio data was captured");
            return StopReport::nothing_captured(fault);
        }

        let path = session.output_path();
        log::info!("Saving {} chunks to {}", captured.chunks.len(), path.display());
        let sink = match AudioSink::write(path, &self.format, &captured.chunks) {
            Ok(sink) => sink,
            Err(e) => {
                log::error!("Error saving audio file: {}", e);
                return StopReport::save_failed(&e);
            }
        };
        control.last_recording = Some(path.to_path_buf());

        if self.config.write_metadata {
            let metadata = RecordingMetadata::new(session.sequence_number(), path, &sink, session.devices().names());
            if let Err(e) = write_metadata(&metadata, path) {
                log::error!("Error writing recording metadata: {}", e);
            }
        }

        log::info!(
            "Recording stopped. Duration: {:.2} seconds, File size: {} bytes",
            sink.duration_secs,
            sink.file_size
        );
        StopReport::saved(path, &sink, fault)
    }

    /// Snapshot of the current session. Never blocks on start/stop/cleanup.
    pub fn status(&self) -> RecordingStatus {
        self.current
            .read()
            .as_ref()
            .map_or_else(RecordingStatus::idle, |session| session.status())
    }

    /// Force-reset and re-enumerate devices. Always succeeds; `clean` is
    /// false when some teardown step failed.
    pub fn cleanup(&self) -> CleanupReport {
        log::info!("Cleaning up recorder");
        let mut control = self.control.lock();
        self.collect_signalled_locked(&mut control);
        let outcome = self.reset_locked(&mut control);
        let clean = outcome.clean && outcome.devices.is_ok();
        CleanupReport {
            message: if clean {
                "Recorder cleaned up successfully".into()
            } else {
                "Recorder cleaned up with some non-critical errors".into()
            },
            recording: false,
            clean,
            devices: control.devices.names(),
        }
    }

    /// Return to `Idle` from any state, discarding unsaved audio.
    pub fn force_reset(&self) -> bool {
        let mut control = self.control.lock();
        self.reset_locked(&mut control).clean
    }

    fn reset_locked(&self, control: &mut Control) -> ResetOutcome {
        log::info!("Force resetting all recording states");
        let clean = match control.session.take() {
            Some(mut session) => session.force_reset(self.backend.as_ref(), self.config.reset_join_timeout()),
            None => true,
        };
        *self.current.write() = None;

        let devices = self.catalog.select(self.backend.as_ref());
        control.devices = match &devices {
            Ok(selection) => selection.clone(),
            Err(e) => {
                log::error!("Error re-enumerating devices during force reset: {}", e);
                DeviceSelection::default()
            }
        };
        log::info!("Force reset completed");
        ResetOutcome { clean, devices }
    }

    pub fn stop_signal(&self) -> StopSignal {
        StopSignal {
            current: Arc::clone(&self.current),
        }
    }

    /// Devices found by the most recent enumeration.
    pub fn devices(&self) -> DeviceSelection {
        self.control.lock().devices.clone()
    }

    /// Path of the most recently finalized recording, if any.
    pub fn last_recording(&self) -> Option<PathBuf> {
        self.control.lock().last_recording.clone()
    }

    /// Copy the most recent recording into `temp/` for serving. The copy is
    /// removed when the returned value is dropped.
    pub fn download_last(&self) -> Result<DownloadCopy, CaptureError> {
        let source = {
            let mut control = self.control.lock();
            self.collect_signalled_locked(&mut control);
            control.last_recording.clone()
        }
        .ok_or(CaptureError::NoRecordingAvailable)?;
        if !source.is_file() {
            log::error!("Recording file no longer exists: {}", source.display());
            return Err(CaptureError::NoRecordingAvailable);
        }
        DownloadCopy::create(&source, &self.config.temp_dir())
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        let mut control = self.control.lock();
        if let Some(mut session) = control.session.take() {
            log::info!("Releasing recorder resources");
            session.force_reset(self.backend.as_ref(), self.config.reset_join_timeout());
        }
        *self.current.write() = None;
    }
}
