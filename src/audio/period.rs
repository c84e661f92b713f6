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
use std::ops::{Deref, DerefMut};

/// The engine renders interleaved stereo.
pub const CHANNELS: usize = 2;

/// One stereo frame of float samples, nominally in [-1, 1].
pub type Frame = [f32; CHANNELS];

pub const SILENCE: Frame = [0.0; CHANNELS];

/// Absolute sample values at or below this are treated as silence.
pub const SILENCE_THRESHOLD: f32 = 1.0e-10;

/// Fixed-size block of frames the engine produces per pull.
#[derive(Debug, Clone, PartialEq)]
pub struct PeriodBuffer {
    frames: Vec<Frame>,
}

impl PeriodBuffer {
    pub fn new(frames_per_period: usize) -> Self {
        Self {
            frames: vec![SILENCE; frames_per_period],
        }
    }

    pub fn silence(&mut self) {
        self.frames.fill(SILENCE);
    }

    pub fn is_silent(&self) -> bool {
        is_silent(&self.frames)
    }
}

impl Deref for PeriodBuffer {
    type Target = [Frame];

    fn deref(&self) -> &Self::Target {
        &self.frames
    }
}

impl DerefMut for PeriodBuffer {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.frames
    }
}

/// True when every sample in the block is below the silence threshold.
pub fn is_silent(frames: &[Frame]) -> bool {
    frames
        .iter()
        .all(|f| f[0].abs() <= SILENCE_THRESHOLD && f[1].abs() <= SILENCE_THRESHOLD)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_period_buffer_silence() {
        let mut period = PeriodBuffer::new(4);
        assert_eq!(4, period.len());
        assert!(period.is_silent());

        period[2] = [0.25, -0.25];
        assert!(!period.is_silent());

        period.silence();
        assert!(period.is_silent());
    }
}
