//! Scripted in-memory backend for exercising the session state machine
//! without audio hardware.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use crate::models::audio_models::{AudioDeviceDescriptor, AudioFormat, PcmChunk};
use crate::models::error::CaptureError;
use crate::processing::stream_mixer::StreamMixer;
use crate::traits::audio_backend::{AudioBackend, StreamHandle};

#[derive(Debug, Clone)]
pub(crate) struct FakeDevice {
    pub descriptor: AudioDeviceDescriptor,
    /// Every sample of every chunk read from this device.
    pub sample: i16,
    pub fail_open: bool,
    /// Reads beyond this count fail with `StreamRead`.
    pub fail_after_reads: Option<usize>,
    /// Reads block until the stream is closed.
    pub hang: bool,
    pub read_delay: Duration,
}

impl FakeDevice {
    pub fn loopback(index: usize, sample: i16) -> Self {
        Self::new(index, "Stereo Mix (Realtek High Definition Audio)", false, sample)
    }

    pub fn microphone(index: usize, sample: i16) -> Self {
        Self::new(index, "Microphone Array (USB)", true, sample)
    }

    pub fn new(index: usize, name: &str, is_default: bool, sample: i16) -> Self {
        Self {
            descriptor: AudioDeviceDescriptor {
                index,
                name: name.into(),
                max_input_channels: 2,
                is_default,
            },
            sample,
            fail_open: false,
            fail_after_reads: None,
            hang: false,
            read_delay: Duration::from_millis(1),
        }
    }

    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    pub fn failing_after(mut self, reads: usize) -> Self {
        self.fail_after_reads = Some(reads);
        self
    }

    pub fn hanging(mut self) -> Self {
        self.hang = true;
        self
    }
}

struct OpenStream {
    device: usize,
    reads: usize,
}

#[derive(Default)]
pub(crate) struct FakeBackend {
    devices: Mutex<Vec<FakeDevice>>,
    fail_enumeration: AtomicBool,
    next_id: AtomicU64,
    streams: Mutex<HashMap<u64, OpenStream>>,
    opened: Mutex<Vec<usize>>,
}

impl FakeBackend {
    pub fn new(devices: Vec<FakeDevice>) -> Self {
        Self {
            devices: Mutex::new(devices),
            ..Default::default()
        }
    }

    pub fn set_devices(&self, devices: Vec<FakeDevice>) {
        *self.devices.lock() = devices;
    }

    pub fn set_enumeration_failure(&self, fail: bool) {
        self.fail_enumeration.store(fail, Ordering::SeqCst);
    }

    /// Streams currently open.
    pub fn open_count(&self) -> usize {
        self.streams.lock().len()
    }

    /// Device indexes of every successful open, in order.
    pub fn opened_devices(&self) -> Vec<usize> {
        self.opened.lock().clone()
    }

    fn device(&self, index: usize) -> Option<FakeDevice> {
        self.devices.lock().iter().find(|d| d.descriptor.index == index).cloned()
    }

    fn is_open(&self, stream: StreamHandle) -> bool {
        self.streams.lock().contains_key(&stream.id())
    }
}

impl AudioBackend for FakeBackend {
    fn enumerate_devices(&self) -> Result<Vec<AudioDeviceDescriptor>, CaptureError> {
        if self.fail_enumeration.load(Ordering::SeqCst) {
            return Err(CaptureError::DeviceEnumeration("fake host unavailable".into()));
        }
        Ok(self.devices.lock().iter().map(|d| d.descriptor.clone()).collect())
    }

    fn open_stream(&self, device: &AudioDeviceDescriptor, _format: &AudioFormat) -> Result<StreamHandle, CaptureError> {
        let fake = self
            .device(device.index)
            .ok_or_else(|| CaptureError::StreamOpen(format!("no device {}", device.index)))?;
        if fake.fail_open {
            return Err(CaptureError::StreamOpen(format!("{} refused to open", device.name)));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.streams.lock().insert(
            id,
            OpenStream {
                device: device.index,
                reads: 0,
            },
        );
        self.opened.lock().push(device.index);
        Ok(StreamHandle::new(id))
    }

    fn read(&self, stream: StreamHandle, frames: usize) -> Result<PcmChunk, CaptureError> {
        let (device, reads) = {
            let mut streams = self.streams.lock();
            let open = streams
                .get_mut(&stream.id())
                .ok_or_else(|| CaptureError::StreamRead("stream closed".into()))?;
            open.reads += 1;
            (open.device, open.reads)
        };
        let fake = self
            .device(device)
            .ok_or_else(|| CaptureError::StreamRead("device removed".into()))?;

        if fake.hang {
            while self.is_open(stream) {
                thread::sleep(Duration::from_millis(2));
            }
            return Err(CaptureError::StreamRead("stream closed".into()));
        }
        if fake.fail_after_reads.is_some_and(|limit| reads > limit) {
            return Err(CaptureError::StreamRead(format!("{} disconnected", fake.descriptor.name)));
        }
        thread::sleep(fake.read_delay);
        Ok(StreamMixer::to_bytes(&vec![fake.sample; frames * 2]))
    }

    fn close(&self, stream: StreamHandle) -> Result<(), CaptureError> {
        self.streams.lock().remove(&stream.id());
        Ok(())
    }
}
