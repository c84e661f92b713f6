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
/// Error types for opening and running audio devices.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("Audio device not found: {0}")]
    NotFound(String),

    #[error("No default output device available")]
    NoDefaultDevice,

    #[error("Audio host not found: {0}")]
    HostNotFound(String),

    #[error("Invalid device settings: {0}")]
    Settings(String),

    #[error("Unsupported sample encoding: {0}")]
    UnsupportedFormat(String),

    #[error("Device {device} does not support {channels} channels at {sample_rate}Hz")]
    UnsupportedConfig {
        device: String,
        channels: u16,
        sample_rate: u32,
    },

    #[error("Audio host unavailable: {0}")]
    HostUnavailable(#[from] cpal::HostUnavailable),

    #[error("Failed to enumerate devices: {0}")]
    Devices(#[from] cpal::DevicesError),

    #[error("Failed to read device name: {0}")]
    DeviceName(#[from] cpal::DeviceNameError),

    #[error("Failed to query stream configurations: {0}")]
    SupportedConfigs(#[from] cpal::SupportedStreamConfigsError),

    #[error("Failed to query default stream configuration: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("Failed to build stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("Failed to start stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error("Unable to build engine: {0}")]
    Engine(Box<dyn std::error::Error + Send + Sync>),

    #[error("Output thread failed: {0}")]
    Thread(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
