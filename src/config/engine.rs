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
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use config::{Config, File, FileFormat};
use duration_string::DurationString;
use serde::Deserialize;

use super::audio::Audio;
use super::effect::EffectConfig;
use super::error::ConfigError;
use super::sampler::SamplerSettings;
use crate::effects::EffectContext;
use crate::resample::Quality;

const DEFAULT_SAMPLE_RATE: u32 = 44100;
const DEFAULT_FRAMES_PER_PERIOD: usize = 256;
const DEFAULT_MAX_VOICES: usize = 32;
const DEFAULT_RELEASE: Duration = Duration::from_millis(10);

/// The top level engine configuration.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct EngineConfig {
    /// Output device selection and format.
    #[serde(default)]
    audio: Audio,

    /// Engine sample rate (default: 44100).
    sample_rate: Option<u32>,

    /// Frames produced per pull (default: 256).
    frames_per_period: Option<usize>,

    /// Gain applied by the driver as frames are copied out (default: 1.0).
    master_gain: Option<f32>,

    /// Polyphony limit (default: 32).
    max_voices: Option<usize>,

    /// Release tail applied on note off, e.g. "10ms".
    release: Option<String>,

    /// Process effects every period even after their output decays (default: false).
    keep_effects_running: Option<bool>,

    /// Quality used when bridging effects to a fixed internal rate (default: linear).
    resample_quality: Option<String>,

    /// Mix captured input into the output (default: false).
    monitor_input: Option<bool>,

    /// Initial sampler state.
    #[serde(default)]
    sampler: SamplerSettings,

    /// Effect chain, processed in order.
    #[serde(default)]
    effects: Vec<EffectConfig>,
}

impl EngineConfig {
    /// Loads and validates a YAML configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config: EngineConfig = Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parses and validates a YAML document.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Checks values that cannot be corrected silently.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_rate() == 0 {
            return Err(ConfigError::invalid("sample_rate", "must be positive"));
        }
        if self.frames_per_period() == 0 {
            return Err(ConfigError::invalid("frames_per_period", "must be positive"));
        }
        if !self.master_gain().is_finite() || self.master_gain() < 0.0 {
            return Err(ConfigError::invalid(
                "master_gain",
                format!("must be a non-negative number, got {}", self.master_gain()),
            ));
        }
        if self.max_voices() == 0 {
            return Err(ConfigError::invalid("max_voices", "must be at least 1"));
        }
        self.audio.encoding()?;
        self.audio.stream_buffer_size()?;
        self.release()?;
        self.resample_quality()?;
        for effect in &self.effects {
            effect.delay()?;
        }
        Ok(())
    }

    pub fn audio(&self) -> &Audio {
        &self.audio
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE)
    }

    pub fn frames_per_period(&self) -> usize {
        self.frames_per_period.unwrap_or(DEFAULT_FRAMES_PER_PERIOD)
    }

    pub fn master_gain(&self) -> f32 {
        self.master_gain.unwrap_or(1.0)
    }

    pub fn max_voices(&self) -> usize {
        self.max_voices.unwrap_or(DEFAULT_MAX_VOICES)
    }

    /// Returns the release tail (default: 10ms).
    pub fn release(&self) -> Result<Duration, ConfigError> {
        match &self.release {
            Some(release) => DurationString::from_string(release.clone())
                .map(Into::into)
                .map_err(|e| ConfigError::Duration {
                    value: release.clone(),
                    reason: e.to_string(),
                }),
            None => Ok(DEFAULT_RELEASE),
        }
    }

    /// The release tail in engine frames.
    pub fn release_frames(&self) -> Result<usize, ConfigError> {
        Ok((self.release()?.as_secs_f64() * self.sample_rate() as f64).round() as usize)
    }

    pub fn keep_effects_running(&self) -> bool {
        self.keep_effects_running.unwrap_or(false)
    }

    pub fn resample_quality(&self) -> Result<Quality, ConfigError> {
        match self.resample_quality.as_deref() {
            Some(quality) => Quality::from_str(quality)
                .map_err(|e| ConfigError::invalid("resample_quality", e.to_string())),
            None => Ok(Quality::default()),
        }
    }

    pub fn monitor_input(&self) -> bool {
        self.monitor_input.unwrap_or(false)
    }

    pub fn sampler(&self) -> &SamplerSettings {
        &self.sampler
    }

    pub fn effects(&self) -> &[EffectConfig] {
        &self.effects
    }

    /// The parameters effects are built against.
    pub fn effect_context(&self) -> EffectContext {
        EffectContext {
            sample_rate: self.sample_rate(),
            frames_per_period: self.frames_per_period(),
            keep_running: self.keep_effects_running(),
        }
    }

    pub fn with_audio(mut self, audio: Audio) -> Self {
        self.audio = audio;
        self
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = Some(sample_rate);
        self
    }

    pub fn with_frames_per_period(mut self, frames_per_period: usize) -> Self {
        self.frames_per_period = Some(frames_per_period);
        self
    }

    pub fn with_effects(mut self, effects: Vec<EffectConfig>) -> Self {
        self.effects = effects;
        self
    }

    pub fn with_monitor_input(mut self, monitor_input: bool) -> Self {
        self.monitor_input = Some(monitor_input);
        self
    }
}
