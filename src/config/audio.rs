// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::str::FromStr;

use serde::Deserialize;

use super::error::ConfigError;
use crate::audio::{Endianness, SampleEncoding, SampleFormat};

/// Device name that selects the null device.
pub const NULL_DEVICE: &str = "null";

/// Device name that selects the host's default output device.
pub const DEFAULT_DEVICE: &str = "default";

const DEFAULT_CHANNELS: u16 = 2;

/// How to choose the cpal stream buffer size. Affects latency vs underrun tolerance.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamBufferSize {
    /// Use the backend's default (may be high latency on some systems).
    Default,
    /// Use the device's minimum supported period size.
    Min,
    /// Use a fixed size in frames.
    Fixed(u32),
}

impl FromStr for StreamBufferSize {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "default" => Ok(StreamBufferSize::Default),
            "min" => Ok(StreamBufferSize::Min),
            other => other
                .parse::<u32>()
                .ok()
                .filter(|frames| *frames > 0)
                .map(StreamBufferSize::Fixed)
                .ok_or_else(|| {
                    ConfigError::invalid(
                        "stream_buffer_size",
                        format!("expected default, min or a frame count, got {}", other),
                    )
                }),
        }
    }
}

/// Parsed `device_settings`: comma separated `key=value` pairs, for example
/// `host=alsa`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeviceSettings {
    host: Option<String>,
}

impl DeviceSettings {
    /// The cpal host to open the device on, matched case-insensitively.
    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }
}

impl FromStr for DeviceSettings {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut settings = DeviceSettings::default();
        for pair in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let Some((key, value)) = pair.split_once('=') else {
                return Err(ConfigError::invalid(
                    "device_settings",
                    format!("expected key=value, got {}", pair),
                ));
            };
            let value = value.trim();
            if value.is_empty() {
                return Err(ConfigError::invalid(
                    "device_settings",
                    format!("missing value for {}", key.trim()),
                ));
            }
            match key.trim().to_lowercase().as_str() {
                "host" => settings.host = Some(value.to_string()),
                other => {
                    return Err(ConfigError::invalid(
                        "device_settings",
                        format!("unknown setting {}", other),
                    ))
                }
            }
        }
        Ok(settings)
    }
}

/// A YAML representation of the audio device configuration.
#[derive(Deserialize, Clone, Debug)]
pub struct Audio {
    /// The audio device name. "null" selects the null device, "default" the host default.
    #[serde(default = "default_device")]
    device: String,

    /// Per-device settings, only consulted when the device is opened. See [`DeviceSettings`].
    device_settings: Option<String>,

    /// Number of device output channels (default: 2).
    channels: Option<u16>,

    /// Device sample format (default: "float").
    sample_format: Option<String>,

    /// Device bits per sample (default: 32).
    bits_per_sample: Option<u16>,

    /// Byte order for integer/float conversion: "little", "big" or "native" (default).
    endianness: Option<String>,

    /// cpal stream buffer: "default", "min", or a number of frames. When unset,
    /// the engine period size is used.
    stream_buffer_size: Option<String>,

    /// Whether to open the device's input for capture (default: false).
    capture: Option<bool>,
}

fn default_device() -> String {
    DEFAULT_DEVICE.to_string()
}

impl Default for Audio {
    fn default() -> Self {
        Audio::new(DEFAULT_DEVICE)
    }
}

impl Audio {
    /// New will create a new Audio configuration.
    pub fn new(device: &str) -> Audio {
        Audio {
            device: device.to_string(),
            device_settings: None,
            channels: None,
            sample_format: None,
            bits_per_sample: None,
            endianness: None,
            stream_buffer_size: None,
            capture: None,
        }
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn is_null_device(&self) -> bool {
        self.device.eq_ignore_ascii_case(NULL_DEVICE)
    }

    pub fn is_default_device(&self) -> bool {
        self.device.eq_ignore_ascii_case(DEFAULT_DEVICE)
    }

    pub fn device_settings(&self) -> Option<&str> {
        self.device_settings.as_deref()
    }

    /// Parses `device_settings`, empty when unset.
    pub fn parsed_device_settings(&self) -> Result<DeviceSettings, ConfigError> {
        self.device_settings
            .as_deref()
            .map(DeviceSettings::from_str)
            .transpose()
            .map(Option::unwrap_or_default)
    }

    pub fn channels(&self) -> u16 {
        self.channels.unwrap_or(DEFAULT_CHANNELS).max(1)
    }

    pub fn capture(&self) -> bool {
        self.capture.unwrap_or(false)
    }

    /// The preferred device sample encoding (default: native float).
    pub fn encoding(&self) -> Result<SampleEncoding, ConfigError> {
        let sample_format = match self.sample_format.as_deref() {
            Some(format) => SampleFormat::from_str(format)
                .map_err(|e| ConfigError::invalid("sample_format", e.to_string()))?,
            None => SampleFormat::Float,
        };
        let endianness = match self.endianness.as_deref() {
            None | Some("native") => Endianness::native(),
            Some("little") => Endianness::Little,
            Some("big") => Endianness::Big,
            Some(other) => {
                return Err(ConfigError::invalid(
                    "endianness",
                    format!("unsupported byte order: {}", other),
                ))
            }
        };
        SampleEncoding::new(sample_format, self.bits_per_sample.unwrap_or(32), endianness)
            .map_err(|e| ConfigError::invalid("bits_per_sample", e.to_string()))
    }

    /// Returns the stream buffer size choice for cpal, None to use the period size.
    pub fn stream_buffer_size(&self) -> Result<Option<StreamBufferSize>, ConfigError> {
        self.stream_buffer_size
            .as_deref()
            .map(StreamBufferSize::from_str)
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let audio = Audio::new("null");
        assert!(audio.is_null_device());
        assert!(!audio.is_default_device());
        assert_eq!(2, audio.channels());
        assert!(!audio.capture());
        assert!(audio.encoding().unwrap().is_native_float());
        assert_eq!(None, audio.stream_buffer_size().unwrap());
    }

    #[test]
    fn test_stream_buffer_size_parse() {
        assert_eq!(StreamBufferSize::Min, "min".parse().unwrap());
        assert_eq!(StreamBufferSize::Default, "default".parse().unwrap());
        assert_eq!(StreamBufferSize::Fixed(512), "512".parse().unwrap());
        assert!("0".parse::<StreamBufferSize>().is_err());
        assert!("huge".parse::<StreamBufferSize>().is_err());
    }

    #[test]
    fn test_device_settings_parse() {
        let settings: DeviceSettings = "host=ALSA".parse().unwrap();
        assert_eq!(Some("ALSA"), settings.host());
        let settings: DeviceSettings = " host = jack , ".parse().unwrap();
        assert_eq!(Some("jack"), settings.host());
        assert_eq!(DeviceSettings::default(), "".parse().unwrap());

        assert!("host".parse::<DeviceSettings>().is_err());
        assert!("host=".parse::<DeviceSettings>().is_err());
        assert!("latency=5".parse::<DeviceSettings>().is_err());
    }

    #[test]
    fn test_device_settings_from_yaml() {
        let audio: Audio =
            serde_yml::from_str("device: Speakers
device_settings: host=coreaudio
").unwrap();
        assert_eq!(Some("host=coreaudio"), audio.device_settings());
        assert_eq!(Some("coreaudio"), audio.parsed_device_settings().unwrap().host());

        let plain = Audio::new("Speakers");
        assert_eq!(None, plain.parsed_device_settings().unwrap().host());

        let bad: Audio = serde_yml::from_str("device: Speakers
device_settings: bogus
").unwrap();
        assert!(bad.parsed_device_settings().is_err());
    }

    #[test]
    fn test_encoding_from_yaml() {
        let audio: Audio = serde_yml::from_str(
            "device: hw\nsample_format: int\nbits_per_sample: 16\nendianness: big\n",
        )
        .unwrap();
        let encoding = audio.encoding().unwrap();
        assert_eq!(SampleFormat::Int, encoding.sample_format);
        assert_eq!(16, encoding.bits_per_sample);
        assert_eq!(Endianness::Big, encoding.endianness);

        let bad: Audio = serde_yml::from_str("device: hw\nbits_per_sample: 24\nsample_format: int\n").unwrap();
        assert!(bad.encoding().is_err());
    }
}
