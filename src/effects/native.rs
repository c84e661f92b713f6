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
//! Built-in DSP units.

use super::effect::Dsp;
use crate::audio::{Frame, SILENCE};

/// Scales every sample by a constant.
#[derive(Debug, Clone)]
pub struct Gain {
    gain: f32,
}

impl Gain {
    pub fn new(gain: f32) -> Self {
        Self { gain }
    }
}

impl Dsp for Gain {
    fn name(&self) -> &str {
        "gain"
    }

    fn process(&mut self, frames: &mut [Frame], _sample_rate: u32) {
        for frame in frames.iter_mut() {
            frame[0] *= self.gain;
            frame[1] *= self.gain;
        }
    }
}

/// Feedback delay with a preallocated line.
#[derive(Debug, Clone)]
pub struct Echo {
    line: Vec<Frame>,
    position: usize,
    feedback: f32,
}

impl Echo {
    /// A zero-length delay produces a unit that reports itself as not okay.
    pub fn new(delay_frames: usize, feedback: f32) -> Self {
        Self {
            line: vec![SILENCE; delay_frames],
            position: 0,
            feedback: feedback.clamp(0.0, 0.99),
        }
    }

    pub fn delay_frames(&self) -> usize {
        self.line.len()
    }
}

impl Dsp for Echo {
    fn name(&self) -> &str {
        "echo"
    }

    fn process(&mut self, frames: &mut [Frame], _sample_rate: u32) {
        let len = self.line.len();
        if len == 0 {
            return;
        }
        for frame in frames.iter_mut() {
            let delayed = self.line[self.position];
            let out = [frame[0] + delayed[0], frame[1] + delayed[1]];
            self.line[self.position] = [out[0] * self.feedback, out[1] * self.feedback];
            *frame = out;
            self.position = (self.position + 1) % len;
        }
    }

    fn is_okay(&self) -> bool {
        !self.line.is_empty()
    }

    fn reset(&mut self) {
        self.line.fill(SILENCE);
        self.position = 0;
    }
}

/// Quantizes samples to a reduced bit depth at its own fixed rate.
#[derive(Debug, Clone)]
pub struct Bitcrush {
    rate: u32,
    levels: f32,
}

impl Bitcrush {
    pub fn new(rate: u32, bits: u8) -> Self {
        let bits = bits.clamp(1, 24);
        Self {
            rate,
            levels: (1u32 << (bits - 1)) as f32,
        }
    }
}

impl Dsp for Bitcrush {
    fn name(&self) -> &str {
        "bitcrush"
    }

    fn process(&mut self, frames: &mut [Frame], _sample_rate: u32) {
        for frame in frames.iter_mut() {
            frame[0] = (frame[0] * self.levels).round() / self.levels;
            frame[1] = (frame[1] * self.levels).round() / self.levels;
        }
    }

    fn fixed_sample_rate(&self) -> Option<u32> {
        Some(self.rate)
    }

    fn is_okay(&self) -> bool {
        self.rate > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::calculate_rms;

    #[test]
    fn test_gain() {
        let mut gain = Gain::new(2.0);
        let mut frames = vec![[0.25, -0.5]];
        gain.process(&mut frames, 44100);
        assert_eq!([0.5, -1.0], frames[0]);

        let mut frames = vec![[0.5, 0.5]; 64];
        Gain::new(0.5).process(&mut frames, 44100);
        assert!((calculate_rms(&frames) - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_echo_repeats_with_feedback() {
        let mut echo = Echo::new(4, 0.5);
        let mut frames = vec![SILENCE; 12];
        frames[0] = [1.0, 1.0];
        echo.process(&mut frames, 44100);
        assert_eq!([1.0, 1.0], frames[0]);
        assert_eq!([0.5, 0.5], frames[4]);
        assert_eq!([0.25, 0.25], frames[8]);
        assert_eq!(SILENCE, frames[5]);

        echo.reset();
        let mut frames = vec![SILENCE; 8];
        echo.process(&mut frames, 44100);
        assert!(frames.iter().all(|f| *f == SILENCE));
    }

    #[test]
    fn test_zero_length_echo_is_not_okay() {
        assert!(!Echo::new(0, 0.5).is_okay());
    }

    #[test]
    fn test_bitcrush_quantizes() {
        let mut crush = Bitcrush::new(22050, 2);
        let mut frames = vec![[0.3, -0.8]];
        crush.process(&mut frames, 22050);
        assert_eq!([0.5, -1.0], frames[0]);
        assert_eq!(Some(22050), crush.fixed_sample_rate());
    }
}
