//! cpal implementation of [`AudioBackend`].
//!
//! `cpal::Stream` is not `Send` on every platform, so each open stream is
//! built, played and dropped on its own owner thread. The data callback
//! converts samples to i16 and hands them to `read` through a bounded queue.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{SampleFormat, SampleRate, SupportedStreamConfigRange};
use parking_lot::Mutex;

use lecture_capture_core::models::audio_models::{AudioDeviceDescriptor, AudioFormat, PcmChunk};
use lecture_capture_core::models::error::CaptureError;
use lecture_capture_core::processing::stream_mixer::StreamMixer;
use lecture_capture_core::traits::audio_backend::{AudioBackend, StreamHandle};

use crate::device_enumerator::DeviceEnumerator;

/// Callback buffers held between the audio thread and `read`.
const QUEUE_DEPTH: usize = 64;
const OPEN_TIMEOUT: Duration = Duration::from_secs(5);
const READ_TIMEOUT: Duration = Duration::from_secs(2);

type Fault = Arc<Mutex<Option<String>>>;

struct SlotReader {
    samples: Receiver<Vec<i16>>,
    pending: VecDeque<i16>,
}

struct StreamSlot {
    device_name: String,
    channels: u16,
    reader: Mutex<SlotReader>,
    fault: Fault,
    // Dropping the sender releases the owner thread, which drops the stream.
    close_tx: Mutex<Option<mpsc::Sender<()>>>,
    owner: Mutex<Option<thread::JoinHandle<()>>>,
}

/// Host audio through cpal's default host.
pub struct CpalBackend {
    enumerator: DeviceEnumerator,
    streams: Mutex<HashMap<u64, Arc<StreamSlot>>>,
    next_id: AtomicU64,
    read_timeout: Duration,
}

impl CpalBackend {
    pub fn new() -> Self {
        let enumerator = DeviceEnumerator::new();
        log::info!("Using audio host {}", enumerator.host_name());
        Self {
            enumerator,
            streams: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            read_timeout: READ_TIMEOUT,
        }
    }

    fn slot(&self, stream: StreamHandle) -> Result<Arc<StreamSlot>, CaptureError> {
        self.streams
            .lock()
            .get(&stream.id())
            .cloned()
            .ok_or_else(|| CaptureError::StreamRead(format!("stream {} is closed", stream.id())))
    }
}

impl Default for CpalBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioBackend for CpalBackend {
    fn enumerate_devices(&self) -> Result<Vec<AudioDeviceDescriptor>, CaptureError> {
        self.enumerator.list_input_devices()
    }

    fn open_stream(&self, device: &AudioDeviceDescriptor, format: &AudioFormat) -> Result<StreamHandle, CaptureError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (sample_tx, sample_rx) = mpsc::sync_channel::<Vec<i16>>(QUEUE_DEPTH);
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), CaptureError>>();
        let (close_tx, close_rx) = mpsc::channel::<()>();
        let fault: Fault = Arc::new(Mutex::new(None));

        let enumerator = self.enumerator;
        let descriptor = device.clone();
        let format = *format;
        let stream_fault = Arc::clone(&fault);
        let owner = thread::Builder::new()
            .name(format!("cpal-input-{}", id))
            .spawn(move || {
                let stream = match build_stream(&enumerator, &descriptor, &format, sample_tx, stream_fault) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(CaptureError::StreamOpen(format!("failed to start stream: {}", e))));
                    return;
                }
                let _ = ready_tx.send(Ok(()));
                // Blocks until close() drops the sender.
                let _ = close_rx.recv();
                drop(stream);
                log::debug!("Input stream on {} released", descriptor.name);
            })
            .map_err(|e| CaptureError::StreamOpen(format!("failed to spawn stream thread: {}", e)))?;

        match ready_rx.recv_timeout(OPEN_TIMEOUT) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = owner.join();
                return Err(e);
            }
            Err(_) => {
                drop(close_tx);
                return Err(CaptureError::StreamOpen(format!(
                    "timed out opening input stream on {}",
                    device.name
                )));
            }
        }

        log::info!(
            "Opened input stream {} on {} ({} ch @ {} Hz)",
            id,
            device.name,
            format.channels,
            format.sample_rate
        );
        self.streams.lock().insert(
            id,
            Arc::new(StreamSlot {
                device_name: device.name.clone(),
                channels: format.channels,
                reader: Mutex::new(SlotReader {
                    samples: sample_rx,
                    pending: VecDeque::new(),
                }),
                fault,
                close_tx: Mutex::new(Some(close_tx)),
                owner: Mutex::new(Some(owner)),
            }),
        );
        Ok(StreamHandle::new(id))
    }

    fn read(&self, stream: StreamHandle, frames: usize) -> Result<PcmChunk, CaptureError> {
        let slot = self.slot(stream)?;
        let wanted = frames * slot.channels as usize;
        let mut reader = slot.reader.lock();
        let SlotReader { samples, pending } = &mut *reader;
        let chunk = take_samples(samples, pending, wanted, &slot.fault, self.read_timeout)
            .map_err(|e| CaptureError::StreamRead(format!("{}: {}", slot.device_name, e)))?;
        Ok(StreamMixer::to_bytes(&chunk))
    }

    fn close(&self, stream: StreamHandle) -> Result<(), CaptureError> {
        let Some(slot) = self.streams.lock().remove(&stream.id()) else {
            return Ok(());
        };
        slot.close_tx.lock().take();
        let owner = slot.owner.lock().take();
        if let Some(owner) = owner {
            if owner.join().is_err() {
                return Err(CaptureError::StreamRead(format!(
                    "stream thread for {} panicked",
                    slot.device_name
                )));
            }
        }
        log::debug!("Closed input stream {} on {}", stream.id(), slot.device_name);
        Ok(())
    }
}

impl Drop for CpalBackend {
    fn drop(&mut self) {
        let ids: Vec<u64> = self.streams.lock().keys().copied().collect();
        for id in ids {
            if let Err(e) = self.close(StreamHandle::new(id)) {
                log::error!("Error closing stream {} on shutdown: {}", id, e);
            }
        }
    }
}

fn build_stream(
    enumerator: &DeviceEnumerator,
    descriptor: &AudioDeviceDescriptor,
    format: &AudioFormat,
    sink: SyncSender<Vec<i16>>,
    fault: Fault,
) -> Result<cpal::Stream, CaptureError> {
    let device = enumerator.find_device(descriptor)?;
    let ranges: Vec<SupportedStreamConfigRange> = device
        .supported_input_configs()
        .map_err(|e| CaptureError::StreamOpen(format!("failed to query {}: {}", descriptor.name, e)))?
        .collect();
    let range = choose_config(&ranges, format).ok_or_else(|| {
        CaptureError::StreamOpen(format!(
            "{} cannot capture {} ch / {} Hz / 16-bit",
            descriptor.name, format.channels, format.sample_rate
        ))
    })?;
    let supported = range.with_sample_rate(SampleRate(format.sample_rate));
    let sample_format = supported.sample_format();
    let config = supported.config();

    let name = descriptor.name.clone();
    let on_error = move |err: cpal::StreamError| {
        log::error!("Audio stream error on {}: {}", name, err);
        fault.lock().get_or_insert_with(|| err.to_string());
    };

    let stream = match sample_format {
        SampleFormat::I16 => device.build_input_stream(
            &config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| forward(&sink, data.to_vec()),
            on_error,
            None,
        ),
        SampleFormat::F32 => device.build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                forward(&sink, data.iter().copied().map(f32_to_i16).collect())
            },
            on_error,
            None,
        ),
        other => {
            return Err(CaptureError::StreamOpen(format!("unsupported sample format {:?}", other)));
        }
    };
    stream.map_err(|e| CaptureError::StreamOpen(format!("failed to build stream on {}: {}", descriptor.name, e)))
}

/// Pick a config range with the requested channel count that covers the
/// requested rate, preferring native i16 over f32.
fn choose_config(ranges: &[SupportedStreamConfigRange], format: &AudioFormat) -> Option<SupportedStreamConfigRange> {
    let rate = SampleRate(format.sample_rate);
    ranges
        .iter()
        .filter(|r| r.channels() == format.channels)
        .filter(|r| r.min_sample_rate() <= rate && rate <= r.max_sample_rate())
        .filter_map(|r| match r.sample_format() {
            SampleFormat::I16 => Some((0, r)),
            SampleFormat::F32 => Some((1, r)),
            _ => None,
        })
        .min_by_key(|(rank, _)| *rank)
        .map(|(_, r)| r.clone())
}

fn forward(sink: &SyncSender<Vec<i16>>, samples: Vec<i16>) {
    if let Err(TrySendError::Full(dropped)) = sink.try_send(samples) {
        log::warn!("Capture queue full; dropped {} samples", dropped.len());
    }
}

/// Negative samples scale by 32768 so -1.0 reaches `i16::MIN`.
fn f32_to_i16(sample: f32) -> i16 {
    let sample = sample.clamp(-1.0, 1.0);
    if sample < 0.0 {
        (sample * 32_768.0) as i16
    } else {
        (sample * i16::MAX as f32) as i16
    }
}

/// Fill `pending` from the callback queue until `wanted` samples are
/// available, then hand exactly that many back.
fn take_samples(
    samples: &Receiver<Vec<i16>>,
    pending: &mut VecDeque<i16>,
    wanted: usize,
    fault: &Fault,
    timeout: Duration,
) -> Result<Vec<i16>, String> {
    while pending.len() < wanted {
        if let Some(err) = fault.lock().clone() {
            return Err(err);
        }
        match samples.recv_timeout(timeout) {
            Ok(buffer) => pending.extend(buffer),
            Err(RecvTimeoutError::Timeout) => return Err(format!("no audio delivered for {:?}", timeout)),
            Err(RecvTimeoutError::Disconnected) => return Err("stream closed".into()),
        }
    }
    Ok(pending.drain(..wanted).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cpal::SupportedBufferSize;

    fn range(channels: u16, min: u32, max: u32, format: SampleFormat) -> SupportedStreamConfigRange {
        SupportedStreamConfigRange::new(
            channels,
            SampleRate(min),
            SampleRate(max),
            SupportedBufferSize::Unknown,
            format,
        )
    }

    #[test]
    fn prefers_i16_when_both_fit() {
        let ranges = vec![
            range(2, 8_000, 192_000, SampleFormat::F32),
            range(2, 44_100, 48_000, SampleFormat::I16),
        ];
        let chosen = choose_config(&ranges, &AudioFormat::LECTURE).unwrap();
        assert_eq!(chosen.sample_format(), SampleFormat::I16);
    }

    #[test]
    fn rejects_wrong_channels_rate_or_format() {
        let ranges = vec![
            range(1, 8_000, 192_000, SampleFormat::I16),
            range(2, 48_000, 48_000, SampleFormat::I16),
            range(2, 8_000, 192_000, SampleFormat::U8),
        ];
        assert!(choose_config(&ranges, &AudioFormat::LECTURE).is_none());
    }

    #[test]
    fn float_samples_are_clamped_and_scaled() {
        assert_eq!(f32_to_i16(0.0), 0);
        assert_eq!(f32_to_i16(1.0), i16::MAX);
        assert_eq!(f32_to_i16(-1.0), i16::MIN);
        assert_eq!(f32_to_i16(4.2), i16::MAX);
        assert_eq!(f32_to_i16(-7.0), i16::MIN);
        assert_eq!(f32_to_i16(0.5), 16383);
        assert_eq!(f32_to_i16(-0.5), -16384);
    }

    #[test]
    fn take_samples_regroups_callback_buffers() {
        let (tx, rx) = mpsc::sync_channel(8);
        tx.send(vec![1, 2, 3]).unwrap();
        tx.send(vec![4, 5, 6, 7]).unwrap();
        let fault: Fault = Arc::default();
        let mut pending = VecDeque::new();

        let first = take_samples(&rx, &mut pending, 4, &fault, Duration::from_millis(50)).unwrap();
        assert_eq!(first, vec![1, 2, 3, 4]);
        assert_eq!(pending, VecDeque::from(vec![5, 6, 7]));

        tx.send(vec![8]).unwrap();
        let second = take_samples(&rx, &mut pending, 4, &fault, Duration::from_millis(50)).unwrap();
        assert_eq!(second, vec![5, 6, 7, 8]);
        assert!(pending.is_empty());
    }

    #[test]
    fn take_samples_reports_latched_fault() {
        let (_tx, rx) = mpsc::sync_channel::<Vec<i16>>(1);
        let fault: Fault = Arc::new(Mutex::new(Some("device unplugged".into())));
        let result = take_samples(&rx, &mut VecDeque::new(), 2, &fault, Duration::from_millis(50));
        assert_eq!(result, Err("device unplugged".to_string()));
    }

    #[test]
    fn take_samples_times_out_and_detects_close() {
        let fault: Fault = Arc::default();
        let (tx, rx) = mpsc::sync_channel::<Vec<i16>>(1);
        let timed_out = take_samples(&rx, &mut VecDeque::new(), 2, &fault, Duration::from_millis(10));
        assert!(timed_out.unwrap_err().starts_with("no audio delivered"));

        drop(tx);
        let closed = take_samples(&rx, &mut VecDeque::new(), 2, &fault, Duration::from_millis(10));
        assert_eq!(closed, Err("stream closed".to_string()));
    }

    #[test]
    fn full_queue_drops_newest_buffer() {
        let (tx, rx) = mpsc::sync_channel(1);
        forward(&tx, vec![1]);
        forward(&tx, vec![2]);
        assert_eq!(rx.try_recv().unwrap(), vec![1]);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn closing_unknown_stream_is_ok() {
        let backend = CpalBackend {
            enumerator: DeviceEnumerator::new(),
            streams: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            read_timeout: READ_TIMEOUT,
        };
        assert!(backend.close(StreamHandle::new(42)).is_ok());
        assert!(matches!(
            backend.read(StreamHandle::new(42), 16),
            Err(CaptureError::StreamRead(_))
        ));
    }
}
