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
//! Start, end and loopback points as fractions of the sample length.
//!
//! Every edit is normalized so that `start < end` and `start <= loop < end` hold
//! both as fractions and after conversion to frame indices.

/// Frame indices derived from a [`SamplePointSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointFrames {
    pub start: i64,
    pub end: i64,
    pub loopback: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SamplePointSet {
    start: f32,
    end: f32,
    loopback: f32,
    /// Smallest step between two points, one frame of the current sample.
    nudge: f32,
}

impl Default for SamplePointSet {
    fn default() -> Self {
        Self::new(0)
    }
}

impl SamplePointSet {
    pub fn new(sample_frames: usize) -> Self {
        Self {
            start: 0.0,
            end: 1.0,
            loopback: 0.0,
            nudge: nudge_for(sample_frames),
        }
    }

    /// Builds a point set from stored fractions, normalizing as if each was edited.
    pub fn from_fractions(sample_frames: usize, start: f32, end: f32, loopback: f32) -> Self {
        let mut points = Self::new(sample_frames);
        points.start = clamp_unit(start);
        points.end = clamp_unit(end);
        points.loopback = clamp_unit(loopback);
        points.edges_changed();
        points.loop_changed();
        points
    }

    pub fn start(&self) -> f32 {
        self.start
    }

    pub fn end(&self) -> f32 {
        self.end
    }

    pub fn loopback(&self) -> f32 {
        self.loopback
    }

    /// Rescales the nudge step for a new sample length.
    pub fn set_sample_frames(&mut self, sample_frames: usize) {
        self.nudge = nudge_for(sample_frames);
        self.edges_changed();
    }

    pub fn set_start(&mut self, value: f32) {
        self.start = clamp_unit(value);
        self.edges_changed();
    }

    pub fn set_end(&mut self, value: f32) {
        self.end = clamp_unit(value);
        self.edges_changed();
    }

    pub fn set_loopback(&mut self, value: f32) {
        self.loopback = clamp_unit(value);
        self.loop_changed();
    }

    /// Start or end moved: order them, keep them apart, pull the loop inside.
    fn edges_changed(&mut self) {
        if self.start > self.end {
            std::mem::swap(&mut self.start, &mut self.end);
        }
        if self.end - self.start < self.nudge {
            if self.start + self.nudge <= 1.0 {
                self.end = self.start + self.nudge;
            } else {
                self.end = 1.0;
                self.start = (1.0 - self.nudge).max(0.0);
            }
        }
        self.loopback = self
            .loopback
            .clamp(self.start, (self.end - self.nudge).max(self.start));
    }

    /// Loop moved: push the edges out to contain it.
    fn loop_changed(&mut self) {
        if self.loopback >= self.end {
            self.end = self.loopback + self.nudge;
            if self.end > 1.0 {
                self.end = 1.0;
                self.loopback = (1.0 - self.nudge).max(0.0);
            }
        }
        if self.loopback < self.start {
            self.start = self.loopback;
        }
        self.edges_changed();
    }

    /// Converts to frame indices for a sample of `sample_frames` frames.
    ///
    /// Truncation can collapse points that were one nudge apart, so the integer
    /// ordering is enforced again here.
    pub fn frames(&self, sample_frames: usize) -> PointFrames {
        let len = sample_frames as i64;
        if len == 0 {
            return PointFrames {
                start: 0,
                end: 0,
                loopback: 0,
            };
        }
        let to_frame = |fraction: f32| (fraction as f64 * len as f64) as i64;
        let end = to_frame(self.end).clamp(1, len);
        let start = to_frame(self.start).clamp(0, end - 1);
        let loopback = to_frame(self.loopback).clamp(start, end - 1);
        PointFrames {
            start,
            end,
            loopback,
        }
    }
}

fn nudge_for(sample_frames: usize) -> f32 {
    if sample_frames == 0 {
        0.001
    } else {
        (1.0 / sample_frames as f32).min(0.001)
    }
}

fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use rand::Rng;

    use super::*;

    fn assert_ordered(points: &SamplePointSet, frames: usize) {
        assert!(points.start() < points.end(), "{:?}", points);
        assert!(points.start() <= points.loopback(), "{:?}", points);
        assert!(points.loopback() < points.end(), "{:?}", points);

        let f = points.frames(frames);
        assert!(f.start < f.end, "{:?} {:?}", points, f);
        assert!(f.start <= f.loopback && f.loopback < f.end, "{:?} {:?}", points, f);
        assert!(f.end <= frames as i64);
    }

    #[test]
    fn test_default_covers_whole_sample() {
        let points = SamplePointSet::new(1000);
        assert_eq!(
            PointFrames {
                start: 0,
                end: 1000,
                loopback: 0
            },
            points.frames(1000)
        );
    }

    #[test]
    fn test_start_past_end_swaps() {
        let mut points = SamplePointSet::new(1000);
        points.set_end(0.5);
        points.set_start(0.8);
        assert_eq!(0.5, points.start());
        assert_eq!(0.8, points.end());
        assert_eq!(0.5, points.loopback());
    }

    #[test]
    fn test_equal_start_and_end_nudged_apart() {
        let mut points = SamplePointSet::new(1000);
        points.set_end(0.5);
        points.set_start(0.5);
        assert!(points.end() > points.start());

        let mut points = SamplePointSet::new(1000);
        points.set_start(1.0);
        assert!(points.start() < 1.0);
        assert_eq!(1.0, points.end());
    }

    #[test]
    fn test_loop_past_end_moves_end() {
        let mut points = SamplePointSet::new(1000);
        points.set_end(0.5);
        points.set_loopback(0.7);
        assert!((points.loopback() - 0.7).abs() < 1e-5);
        assert!(points.end() > 0.7);

        points.set_loopback(1.0);
        assert_eq!(1.0, points.end());
        assert!(points.loopback() < 1.0);
    }

    #[test]
    fn test_loop_before_start_moves_start() {
        let mut points = SamplePointSet::new(1000);
        points.set_start(0.4);
        points.set_loopback(0.2);
        assert_eq!(0.2, points.start());
        assert_eq!(0.2, points.loopback());
    }

    #[test]
    fn test_from_fractions_normalizes() {
        let points = SamplePointSet::from_fractions(100, 0.9, 0.1, 0.95);
        assert_ordered(&points, 100);
    }

    #[test]
    fn test_random_edits_keep_ordering() {
        let mut rng = rand::thread_rng();
        for _ in 0..50 {
            let frames = rng.gen_range(2..5000);
            let mut points = SamplePointSet::new(frames);
            for _ in 0..200 {
                let value: f32 = rng.gen_range(-0.1..1.1);
                match rng.gen_range(0..3) {
                    0 => points.set_start(value),
                    1 => points.set_end(value),
                    _ => points.set_loopback(value),
                }
                assert_ordered(&points, frames);
            }
        }
    }
}
