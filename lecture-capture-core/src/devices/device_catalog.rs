//! Input device discovery and classification.
//!
//! Splits the host's input endpoints into the loopback ("Stereo Mix") source
//! and the default microphone using name heuristics and default-device
//! metadata.

use crate::models::audio_models::{AudioDeviceDescriptor, DeviceSelection};
use crate::models::error::CaptureError;
use crate::traits::audio_backend::AudioBackend;

#[derive(Debug, Clone)]
pub struct DeviceCatalog {
    loopback_keywords: Vec<String>,
}

impl DeviceCatalog {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let loopback_keywords = keywords
            .into_iter()
            .map(|k| k.as_ref().trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        Self { loopback_keywords }
    }

    /// Every input-capable endpoint the backend reports.
    pub fn enumerate_devices(&self, backend: &dyn AudioBackend) -> Result<Vec<AudioDeviceDescriptor>, CaptureError> {
        let devices: Vec<_> = backend
            .enumerate_devices()?
            .into_iter()
            .filter(AudioDeviceDescriptor::is_input)
            .collect();
        for device in &devices {
            log::debug!(
                "Input device {}: {} ({} channels{})",
                device.index,
                device.name,
                device.max_input_channels,
                if device.is_default { ", default" } else { "" }
            );
        }
        Ok(devices)
    }

    pub fn is_loopback_name(&self, name: &str) -> bool {
        let name = name.to_lowercase();
        self.loopback_keywords.iter().any(|k| name.contains(k.as_str()))
    }

    /// First input device whose name matches a loopback keyword.
    pub fn find_loopback_device(&self, devices: &[AudioDeviceDescriptor]) -> Option<AudioDeviceDescriptor> {
        devices
            .iter()
            .find(|d| d.is_input() && self.is_loopback_name(&d.name))
            .cloned()
    }

    /// The host's default input device, if it has at least one channel.
    pub fn find_default_microphone(devices: &[AudioDeviceDescriptor]) -> Option<AudioDeviceDescriptor> {
        devices.iter().find(|d| d.is_default && d.is_input()).cloned()
    }

    /// Classify `devices` into the pair a session records from.
    ///
    /// When the default input *is* the loopback device it is only used once,
    /// as loopback.
    pub fn classify(&self, devices: &[AudioDeviceDescriptor]) -> DeviceSelection {
        let loopback = self.find_loopback_device(devices);
        let microphone = Self::find_default_microphone(devices)
            .filter(|mic| loopback.as_ref().map_or(true, |lb| lb.index != mic.index));
        DeviceSelection { loopback, microphone }
    }

    /// Enumerate and classify in one step.
    pub fn select(&self, backend: &dyn AudioBackend) -> Result<DeviceSelection, CaptureError> {
        let devices = self.enumerate_devices(backend)?;
        let selection = self.classify(&devices);
        log_selection(&selection);
        Ok(selection)
    }
}

fn log_selection(selection: &DeviceSelection) {
    match &selection.loopback {
        Some(device) => log::info!("Found loopback device: {}", device.name),
        None => {
            log::warn!("Stereo Mix device not found. System audio will not be recorded.");
            log::info!(
                "To enable it on Windows: Sound settings > Sound Control Panel > Recording, \
                 show disabled devices, then enable 'Stereo Mix'"
            );
        }
    }
    match &selection.microphone {
        Some(device) => log::info!("Found microphone device: {}", device.name),
        None => log::warn!("No microphone device found. Voice will not be recorded."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::fake_backend::{FakeBackend, FakeDevice};

    fn device(index: usize, name: &str, channels: u16, is_default: bool) -> AudioDeviceDescriptor {
        AudioDeviceDescriptor {
            index,
            name: name.into(),
            max_input_channels: channels,
            is_default,
        }
    }

    fn catalog() -> DeviceCatalog {
        DeviceCatalog::new(["Stereo Mix", "what u hear", "what you hear", "loopback"])
    }

    #[test]
    fn loopback_match_is_case_insensitive() {
        let devices = vec![
            device(0, "Microphone (Realtek)", 2, true),
            device(1, "STEREO MIX (Realtek)", 2, false),
            device(2, "Loopback Audio", 2, false),
        ];
        assert_eq!(catalog().find_loopback_device(&devices).map(|d| d.index), Some(1));
    }

    #[test]
    fn loopback_skips_output_only_devices() {
        let devices = vec![device(0, "Stereo Mix", 0, false), device(1, "What U Hear", 2, false)];
        assert_eq!(catalog().find_loopback_device(&devices).map(|d| d.index), Some(1));
    }

    #[test]
    fn loopback_absent_is_none() {
        let devices = vec![device(0, "Headset Microphone", 1, true)];
        assert_eq!(catalog().find_loopback_device(&devices), None);
    }

    #[test]
    fn default_microphone_requires_input_channels() {
        let devices = vec![device(0, "Speakers", 0, true), device(1, "Webcam Mic", 1, false)];
        assert_eq!(DeviceCatalog::find_default_microphone(&devices), None);

        let devices = vec![device(0, "Webcam Mic", 1, false), device(1, "Headset", 1, true)];
        assert_eq!(DeviceCatalog::find_default_microphone(&devices).map(|d| d.index), Some(1));
    }

    #[test]
    fn default_input_that_is_loopback_is_used_once() {
        let devices = vec![device(4, "Stereo Mix", 2, true)];
        let selection = catalog().classify(&devices);
        assert_eq!(selection.loopback.map(|d| d.index), Some(4));
        assert_eq!(selection.microphone, None);
    }

    #[test]
    fn blank_keywords_are_ignored() {
        let catalog = DeviceCatalog::new(["", "  ", "monitor of"]);
        assert!(catalog.is_loopback_name("Monitor of Built-in Audio"));
        assert!(!catalog.is_loopback_name("Built-in Microphone"));
    }

    #[test]
    fn select_reads_from_backend() {
        let backend = FakeBackend::new(vec![FakeDevice::microphone(0, 1), FakeDevice::loopback(1, 1)]);
        let selection = catalog().select(&backend).unwrap();
        assert_eq!(selection.loopback.map(|d| d.index), Some(1));
        assert_eq!(selection.microphone.map(|d| d.index), Some(0));
    }

    #[test]
    fn enumeration_failure_propagates() {
        let backend = FakeBackend::new(vec![]);
        backend.set_enumeration_failure(true);
        assert!(matches!(
            catalog().select(&backend),
            Err(CaptureError::DeviceEnumeration(_))
        ));
    }
}
