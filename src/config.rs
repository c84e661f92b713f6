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
//! YAML configuration for the engine and the persisted settings surface of
//! sampler instruments and effects.

use serde::de::DeserializeOwned;
use serde::Serialize;

mod audio;
mod effect;
mod engine;
mod error;
mod sampler;

pub use audio::{Audio, DeviceSettings, StreamBufferSize, DEFAULT_DEVICE, NULL_DEVICE};
pub use effect::{EffectConfig, EffectKind, EffectSettings};
pub use engine::EngineConfig;
pub use error::ConfigError;
pub use sampler::SamplerSettings;

/// Parses persisted settings, e.g. a [`SamplerSettings`] block saved with a project.
pub fn parse_settings<T: DeserializeOwned>(yaml: &str) -> Result<T, ConfigError> {
    Ok(serde_yml::from_str(yaml)?)
}

/// Serializes persisted settings to YAML.
pub fn settings_to_yaml<T: Serialize>(settings: &T) -> Result<String, ConfigError> {
    Ok(serde_yml::to_string(settings)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::AutoQuitDecay;
    use crate::samples::{Interpolation, LoopMode};

    #[test]
    fn test_settings_round_trip() {
        let sampler = SamplerSettings::default()
            .with_points(0.1, 0.8, 0.4)
            .with_loop_mode(LoopMode::PingPong)
            .with_interpolation(Interpolation::Sinc)
            .with_amplification(150.0);
        let yaml = settings_to_yaml(&sampler).unwrap();
        let parsed: SamplerSettings = parse_settings(&yaml).unwrap();
        assert_eq!(sampler, parsed);

        let effect = EffectSettings::new(false, 0.5, 0.1, AutoQuitDecay::Millis(300.0));
        let parsed: EffectSettings = parse_settings(&settings_to_yaml(&effect).unwrap()).unwrap();
        assert_eq!(effect, parsed);
    }

    #[test]
    fn test_parse_error() {
        assert!(matches!(
            parse_settings::<EffectSettings>("wet: [1, 2]"),
            Err(ConfigError::Yaml(_))
        ));
    }
}
