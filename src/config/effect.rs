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
use std::time::Duration;

use duration_string::DurationString;
use serde::{Deserialize, Serialize};

use super::error::ConfigError;
use crate::effects::{AutoQuitDecay, Bitcrush, Dsp, Echo, Effect, EffectContext, Gain};

fn default_on() -> bool {
    true
}

fn default_wet() -> f32 {
    1.0
}

/// Persisted state of one effect slot.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq)]
pub struct EffectSettings {
    #[serde(default = "default_on")]
    on: bool,

    #[serde(default = "default_wet")]
    wet: f32,

    #[serde(default)]
    gate: f32,

    /// Milliseconds, or `{ bpm, beats }` for a tempo-synced decay.
    #[serde(default)]
    autoquit: AutoQuitDecay,
}

impl Default for EffectSettings {
    fn default() -> Self {
        Self {
            on: default_on(),
            wet: default_wet(),
            gate: 0.0,
            autoquit: AutoQuitDecay::default(),
        }
    }
}

impl EffectSettings {
    pub fn new(enabled: bool, wet: f32, gate: f32, decay: AutoQuitDecay) -> Self {
        Self {
            on: enabled,
            wet,
            gate,
            autoquit: decay,
        }
    }

    pub fn enabled(&self) -> bool {
        self.on
    }

    pub fn wet(&self) -> f32 {
        self.wet
    }

    pub fn gate(&self) -> f32 {
        self.gate
    }

    pub fn decay(&self) -> AutoQuitDecay {
        self.autoquit
    }
}

/// The built-in DSP unit an effect slot runs.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EffectKind {
    Gain,
    Echo,
    Bitcrush,
}

/// A YAML representation of one effect in the chain.
#[derive(Deserialize, Clone, Debug)]
pub struct EffectConfig {
    kind: EffectKind,

    /// Linear gain for `gain` (default: 1.0).
    gain: Option<f32>,

    /// Delay time for `echo`, e.g. "250ms" (default: 250ms).
    delay: Option<String>,

    /// Feedback for `echo` (default: 0.4).
    feedback: Option<f32>,

    /// Internal rate for `bitcrush` (default: 11025).
    rate: Option<u32>,

    /// Bit depth for `bitcrush` (default: 8).
    bits: Option<u8>,

    #[serde(default)]
    settings: EffectSettings,
}

const DEFAULT_ECHO_DELAY: Duration = Duration::from_millis(250);

impl EffectConfig {
    pub fn new(kind: EffectKind) -> Self {
        Self {
            kind,
            gain: None,
            delay: None,
            feedback: None,
            rate: None,
            bits: None,
            settings: EffectSettings::default(),
        }
    }

    pub fn kind(&self) -> EffectKind {
        self.kind
    }

    pub fn settings(&self) -> &EffectSettings {
        &self.settings
    }

    /// Returns the echo delay (default: 250ms).
    pub fn delay(&self) -> Result<Duration, ConfigError> {
        match &self.delay {
            Some(delay) => DurationString::from_string(delay.clone())
                .map(Into::into)
                .map_err(|e| ConfigError::Duration {
                    value: delay.clone(),
                    reason: e.to_string(),
                }),
            None => Ok(DEFAULT_ECHO_DELAY),
        }
    }

    fn dsp(&self, sample_rate: u32) -> Result<Box<dyn Dsp>, ConfigError> {
        Ok(match self.kind {
            EffectKind::Gain => Box::new(Gain::new(self.gain.unwrap_or(1.0))),
            EffectKind::Echo => {
                let delay_frames = (self.delay()?.as_secs_f64() * sample_rate as f64).round() as usize;
                Box::new(Echo::new(delay_frames, self.feedback.unwrap_or(0.4)))
            }
            EffectKind::Bitcrush => {
                let rate = self.rate.unwrap_or(11025);
                if rate == 0 {
                    return Err(ConfigError::invalid("rate", "bitcrush rate must be positive"));
                }
                Box::new(Bitcrush::new(rate, self.bits.unwrap_or(8)))
            }
        })
    }

    /// Builds the effect for the given engine context.
    pub fn build(&self, context: EffectContext) -> Result<Effect, ConfigError> {
        let dsp = self.dsp(context.sample_rate)?;
        Ok(Effect::with_settings(dsp, context, &self.settings))
    }
}
