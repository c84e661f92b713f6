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
use serde::{Deserialize, Serialize};

use crate::samples::{Interpolation, LoopMode};

fn default_amplification() -> f32 {
    100.0
}

fn default_end() -> f32 {
    1.0
}

/// Persisted state of a sample player.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct SamplerSettings {
    /// Label of the sample source. Loading it is up to the caller.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    src: Option<String>,

    #[serde(default)]
    reversed: bool,

    #[serde(rename = "looped", default)]
    loop_mode: LoopMode,

    /// Amplification in percent.
    #[serde(rename = "amp", default = "default_amplification")]
    amplification: f32,

    #[serde(rename = "sframe", default)]
    start: f32,

    #[serde(rename = "eframe", default = "default_end")]
    end: f32,

    /// Falls back to the start point when missing.
    #[serde(rename = "lframe", default, skip_serializing_if = "Option::is_none")]
    loopback: Option<f32>,

    #[serde(default)]
    stutter: bool,

    #[serde(rename = "interp", default)]
    interpolation: Interpolation,
}

impl Default for SamplerSettings {
    fn default() -> Self {
        Self {
            src: None,
            reversed: false,
            loop_mode: LoopMode::Off,
            amplification: default_amplification(),
            start: 0.0,
            end: default_end(),
            loopback: None,
            stutter: false,
            interpolation: Interpolation::Linear,
        }
    }
}

impl SamplerSettings {
    pub fn src(&self) -> Option<&str> {
        self.src.as_deref()
    }

    pub fn reversed(&self) -> bool {
        self.reversed
    }

    pub fn loop_mode(&self) -> LoopMode {
        self.loop_mode
    }

    pub fn amplification(&self) -> f32 {
        self.amplification
    }

    pub fn start_point(&self) -> f32 {
        self.start
    }

    pub fn end_point(&self) -> f32 {
        self.end
    }

    pub fn loop_point(&self) -> f32 {
        self.loopback.unwrap_or(self.start)
    }

    pub fn stutter(&self) -> bool {
        self.stutter
    }

    pub fn interpolation(&self) -> Interpolation {
        self.interpolation
    }

    pub fn with_src(mut self, src: &str) -> Self {
        self.src = Some(src.to_string());
        self
    }

    pub fn with_points(mut self, start: f32, end: f32, loopback: f32) -> Self {
        self.start = start;
        self.end = end;
        self.loopback = Some(loopback);
        self
    }

    pub fn with_amplification(mut self, percent: f32) -> Self {
        self.amplification = percent;
        self
    }

    pub fn with_reversed(mut self, reversed: bool) -> Self {
        self.reversed = reversed;
        self
    }

    pub fn with_loop_mode(mut self, loop_mode: LoopMode) -> Self {
        self.loop_mode = loop_mode;
        self
    }

    pub fn with_interpolation(mut self, interpolation: Interpolation) -> Self {
        self.interpolation = interpolation;
        self
    }

    pub fn with_stutter(mut self, stutter: bool) -> Self {
        self.stutter = stutter;
        self
    }
}
