use serde::{Deserialize, Serialize};

/// Raw interleaved little-endian i16 PCM, one capture-loop read.
pub type PcmChunk = Vec<u8>;

/// Fixed PCM format both capture streams are opened with.
///
/// Both sources share this exact format so every mixed chunk is
/// frame-aligned and byte-length identical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    pub chunk_frames: usize,
}

impl AudioFormat {
    /// 44.1 kHz, stereo, 16-bit signed, 1024-frame chunks.
    pub const LECTURE: Self = Self {
        channels: 2,
        sample_rate: 44_100,
        bits_per_sample: 16,
        chunk_frames: 1024,
    };

    pub fn bytes_per_sample(&self) -> usize {
        self.bits_per_sample as usize / 8
    }

    pub fn bytes_per_frame(&self) -> usize {
        self.channels as usize * self.bytes_per_sample()
    }

    /// Size in bytes of one full chunk.
    pub fn chunk_bytes(&self) -> usize {
        self.chunk_frames * self.bytes_per_frame()
    }

    /// Zero-filled chunk standing in for an absent source.
    pub fn silence(&self) -> PcmChunk {
        vec![0u8; self.chunk_bytes()]
    }

    pub fn frames_in(&self, byte_len: u64) -> u64 {
        byte_len / self.bytes_per_frame() as u64
    }

    /// Playback duration of `byte_len` bytes of PCM in this format.
    pub fn duration_secs(&self, byte_len: u64) -> f64 {
        self.frames_in(byte_len) as f64 / self.sample_rate as f64
    }
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self::LECTURE
    }
}

/// An input endpoint as seen at enumeration time.
///
/// Immutable snapshot; re-queried on every session start because device
/// topology can change between sessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioDeviceDescriptor {
    /// Opaque backend handle for reopening the device.
    pub index: usize,
    pub name: String,
    pub max_input_channels: u16,
    pub is_default: bool,
}

impl AudioDeviceDescriptor {
    pub fn is_input(&self) -> bool {
        self.max_input_channels > 0
    }
}

/// The devices chosen for one session. Either side may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceSelection {
    pub loopback: Option<AudioDeviceDescriptor>,
    pub microphone: Option<AudioDeviceDescriptor>,
}

impl DeviceSelection {
    pub fn is_empty(&self) -> bool {
        self.loopback.is_none() && self.microphone.is_none()
    }

    pub fn names(&self) -> DeviceNames {
        DeviceNames {
            loopback: self.loopback.as_ref().map(|d| d.name.clone()),
            microphone: self.microphone.as_ref().map(|d| d.name.clone()),
        }
    }
}

/// Device names as reported to API callers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceNames {
    pub loopback: Option<String>,
    pub microphone: Option<String>,
}
