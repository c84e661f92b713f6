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
//! Device side: the pull contract, the output driver and the devices that
//! host it.

use std::fmt;
use std::sync::Arc;

use tracing::error;

use crate::config::EngineConfig;

mod capture;
pub mod cpal;
mod driver;
mod engine;
mod error;
mod format;
pub mod null;
mod period;
mod thread_priority;

pub use capture::CaptureRing;
pub use driver::{DeviceRingState, DriverControl, OutputDriver, PlayState};
pub use engine::AudioEngine;
pub use error::DeviceError;
pub use format::{map_channel, Endianness, SampleEncoding, SampleFormat};
pub use period::{is_silent, Frame, PeriodBuffer, CHANNELS, SILENCE, SILENCE_THRESHOLD};
pub use thread_priority::{
    callback_thread_priority, configure_audio_thread_priority, rt_audio_enabled,
};

/// An open output device hosting an [`OutputDriver`].
pub trait Device: fmt::Display + Send {
    fn name(&self) -> &str;

    fn control(&self) -> &DriverControl;

    /// The ring captured input is pushed into, when the device captures.
    fn capture(&self) -> Option<&Arc<CaptureRing>>;

    fn supports_capture(&self) -> bool {
        self.capture().is_some()
    }

    fn start(&self) {
        self.control().start();
    }

    fn pause(&self) {
        self.control().pause();
    }

    fn stop(&self) {
        self.control().stop();
    }
}

/// Lists output devices known to cpal.
pub fn list_devices() -> Result<Vec<self::cpal::DeviceInfo>, DeviceError> {
    self::cpal::list()
}

/// Opens the configured device. The engine is built by `make_engine` once the
/// device knows whether it can capture. If the device cannot be opened the
/// failure is logged and a null device runs a freshly built engine instead.
pub fn open_device<E, F, Er>(
    config: &EngineConfig,
    mut make_engine: F,
) -> Result<Box<dyn Device>, DeviceError>
where
    E: AudioEngine + 'static,
    F: FnMut(Option<Arc<CaptureRing>>) -> Result<E, Er>,
    Er: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let audio = config.audio();
    if !audio.is_null_device() {
        match self::cpal::Device::open(config, &mut make_engine) {
            Ok(device) => return Ok(Box::new(device)),
            Err(e) => error!(
                device = audio.device(),
                err = %e,
                "Unable to open audio device, falling back to the null device"
            ),
        }
    }
    let engine = make_engine(None).map_err(|e| DeviceError::Engine(e.into()))?;
    Ok(Box::new(null::Device::open(
        audio.device(),
        engine,
        audio.channels(),
    )?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Audio;

    struct Silence;

    impl AudioEngine for Silence {
        fn frames_per_period(&self) -> usize {
            32
        }

        fn sample_rate(&self) -> u32 {
            44100
        }

        fn master_gain(&self) -> f32 {
            1.0
        }

        fn pull(&mut self, period: &mut PeriodBuffer) -> usize {
            period.silence();
            period.len()
        }
    }

    #[test]
    fn test_null_device_selected() {
        let config = EngineConfig::default().with_audio(Audio::new("null"));
        let mut built = 0;
        let device = open_device(&config, |capture| {
            assert!(capture.is_none());
            built += 1;
            Ok::<_, DeviceError>(Silence)
        })
        .unwrap();
        assert_eq!(1, built);
        assert_eq!("null", device.name());
        assert!(!device.supports_capture());
        assert_eq!(PlayState::Stopped, device.control().state());
    }

    #[test]
    fn test_engine_build_failure_is_reported() {
        let config = EngineConfig::default().with_audio(Audio::new("null"));
        let result = open_device(&config, |_| Err::<Silence, _>(DeviceError::NoDefaultDevice));
        assert!(matches!(result, Err(DeviceError::Engine(_))));
    }
}
