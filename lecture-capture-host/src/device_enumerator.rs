//! Input device enumeration via cpal's default host.
//!
//! Device indexes are positions in the host's input device list at
//! enumeration time. They are only stable until devices are plugged or
//! unplugged, so lookups confirm the name as well.

use cpal::traits::{DeviceTrait, HostTrait};

use lecture_capture_core::models::audio_models::AudioDeviceDescriptor;
use lecture_capture_core::models::error::CaptureError;

#[derive(Debug, Clone, Copy, Default)]
pub struct DeviceEnumerator;

impl DeviceEnumerator {
    pub fn new() -> Self {
        Self
    }

    /// Name of the audio host in use (WASAPI, ALSA, CoreAudio, ...).
    pub fn host_name(&self) -> &'static str {
        cpal::default_host().id().name()
    }

    /// List every input device with its channel count and default flag.
    pub fn list_input_devices(&self) -> Result<Vec<AudioDeviceDescriptor>, CaptureError> {
        let host = cpal::default_host();
        let default_name = host.default_input_device().and_then(|d| d.name().ok());
        let devices = host
            .input_devices()
            .map_err(|e| CaptureError::DeviceEnumeration(e.to_string()))?;

        let descriptors = devices
            .enumerate()
            .map(|(index, device)| {
                let name = device.name().unwrap_or_else(|_| format!("Input device {}", index));
                AudioDeviceDescriptor {
                    index,
                    is_default: default_name.as_deref() == Some(name.as_str()),
                    max_input_channels: max_input_channels(&device),
                    name,
                }
            })
            .collect();
        Ok(descriptors)
    }

    /// Resolve a descriptor back to a live cpal device.
    ///
    /// Prefers the device at the recorded index when its name still
    /// matches, otherwise the first device with that name.
    pub fn find_device(&self, descriptor: &AudioDeviceDescriptor) -> Result<cpal::Device, CaptureError> {
        let host = cpal::default_host();
        let devices: Vec<cpal::Device> = host
            .input_devices()
            .map_err(|e| CaptureError::DeviceEnumeration(e.to_string()))?
            .collect();
        let names: Vec<Option<String>> = devices.iter().map(|d| d.name().ok()).collect();

        let position = match_position(&names, descriptor).ok_or_else(|| {
            CaptureError::StreamOpen(format!("input device '{}' is no longer available", descriptor.name))
        })?;
        devices
            .into_iter()
            .nth(position)
            .ok_or_else(|| CaptureError::StreamOpen(format!("input device '{}' disappeared", descriptor.name)))
    }
}

fn max_input_channels(device: &cpal::Device) -> u16 {
    match device.supported_input_configs() {
        Ok(configs) => configs.map(|c| c.channels()).max().unwrap_or(0),
        Err(e) => {
            log::debug!("Could not query input configs: {}", e);
            device.default_input_config().map(|c| c.channels()).unwrap_or(0)
        }
    }
}

fn match_position(names: &[Option<String>], descriptor: &AudioDeviceDescriptor) -> Option<usize> {
    let same_name = |name: &Option<String>| name.as_deref() == Some(descriptor.name.as_str());
    if names.get(descriptor.index).is_some_and(same_name) {
        return Some(descriptor.index);
    }
    names.iter().position(same_name)
}
