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
use std::sync::Arc;

use crate::audio::{Frame, SILENCE};

/// Decoded stereo audio shared between the control and audio threads. Never
/// mutated once built.
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    frames: Arc<[Frame]>,
    sample_rate: u32,
}

impl SampleBuffer {
    pub fn new(frames: Vec<Frame>, sample_rate: u32) -> Self {
        Self {
            frames: frames.into(),
            sample_rate,
        }
    }

    /// Duplicates a mono signal onto both channels.
    pub fn from_mono(samples: &[f32], sample_rate: u32) -> Self {
        Self::new(samples.iter().map(|&s| [s, s]).collect(), sample_rate)
    }

    pub fn empty(sample_rate: u32) -> Self {
        Self::new(Vec::new(), sample_rate)
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

/// A sample as a player sees it: the shared buffer plus amplification, direction
/// and the derived playback points.
///
/// Reversal and amplification are applied when frames are read, so the buffer
/// stays untouched and flipping direction is free.
#[derive(Debug, Clone)]
pub struct Sample {
    buffer: SampleBuffer,
    amplification: f32,
    reversed: bool,
    start_frame: i64,
    end_frame: i64,
    loop_start_frame: i64,
    loop_end_frame: i64,
}

impl Sample {
    pub fn new(buffer: SampleBuffer) -> Self {
        let end = buffer.frame_count() as i64;
        Self {
            buffer,
            amplification: 1.0,
            reversed: false,
            start_frame: 0,
            end_frame: end,
            loop_start_frame: 0,
            loop_end_frame: end,
        }
    }

    pub fn buffer(&self) -> &SampleBuffer {
        &self.buffer
    }

    /// Swaps in new audio, resetting the points to cover all of it.
    pub fn set_buffer(&mut self, buffer: SampleBuffer) -> SampleBuffer {
        let end = buffer.frame_count() as i64;
        let old = std::mem::replace(&mut self.buffer, buffer);
        self.set_all_point_frames(0, end, 0, end);
        old
    }

    pub fn frame_count(&self) -> usize {
        self.buffer.frame_count()
    }

    pub fn sample_rate(&self) -> u32 {
        self.buffer.sample_rate()
    }

    pub fn amplification(&self) -> f32 {
        self.amplification
    }

    pub fn set_amplification(&mut self, amplification: f32) {
        self.amplification = amplification;
    }

    pub fn reversed(&self) -> bool {
        self.reversed
    }

    pub fn set_reversed(&mut self, reversed: bool) {
        self.reversed = reversed;
    }

    pub fn start_frame(&self) -> i64 {
        self.start_frame
    }

    pub fn end_frame(&self) -> i64 {
        self.end_frame
    }

    pub fn loop_start_frame(&self) -> i64 {
        self.loop_start_frame
    }

    pub fn loop_end_frame(&self) -> i64 {
        self.loop_end_frame
    }

    pub fn set_all_point_frames(&mut self, start: i64, end: i64, loop_start: i64, loop_end: i64) {
        self.start_frame = start;
        self.end_frame = end;
        self.loop_start_frame = loop_start;
        self.loop_end_frame = loop_end;
    }

    /// Samples of one frame or less are never played.
    pub fn is_playable(&self) -> bool {
        self.frame_count() > 1 && self.end_frame > self.start_frame
    }

    /// Reads a frame with reversal and amplification applied. Indices outside
    /// the buffer read as silence.
    #[inline]
    pub fn read(&self, index: i64) -> Frame {
        let len = self.frames_len();
        if index < 0 || index >= len {
            return SILENCE;
        }
        let physical = if self.reversed { len - 1 - index } else { index };
        let frame = self.buffer.frames()[physical as usize];
        [
            frame[0] * self.amplification,
            frame[1] * self.amplification,
        ]
    }

    #[inline]
    fn frames_len(&self) -> i64 {
        self.buffer.frame_count() as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::index_ramp;

    #[test]
    fn test_read_applies_reversal_and_amplification() {
        let mut sample = Sample::new(SampleBuffer::new(index_ramp(4), 44100));
        assert_eq!([2.0, 2.0], sample.read(2));

        sample.set_reversed(true);
        assert_eq!([3.0, 3.0], sample.read(0));
        assert_eq!([0.0, 0.0], sample.read(3));

        sample.set_amplification(0.5);
        assert_eq!([1.5, 1.5], sample.read(0));
    }

    #[test]
    fn test_read_out_of_range_is_silent() {
        let sample = Sample::new(SampleBuffer::new(vec![[1.0, 1.0]; 4], 44100));
        assert_eq!(SILENCE, sample.read(-1));
        assert_eq!(SILENCE, sample.read(4));
    }

    #[test]
    fn test_playable() {
        assert!(!Sample::new(SampleBuffer::empty(44100)).is_playable());
        assert!(!Sample::new(SampleBuffer::from_mono(&[0.5], 44100)).is_playable());
        assert!(Sample::new(SampleBuffer::from_mono(&[0.5, 0.5], 44100)).is_playable());
    }

    #[test]
    fn test_set_buffer_resets_points() {
        let mut sample = Sample::new(SampleBuffer::new(index_ramp(10), 44100));
        sample.set_all_point_frames(2, 8, 4, 8);
        let old = sample.set_buffer(SampleBuffer::new(index_ramp(20), 48000));
        assert_eq!(10, old.frame_count());
        assert_eq!((0, 20, 0, 20), (
            sample.start_frame(),
            sample.end_frame(),
            sample.loop_start_frame(),
            sample.loop_end_frame()
        ));
        assert_eq!(48000, sample.sample_rate());
    }
}
