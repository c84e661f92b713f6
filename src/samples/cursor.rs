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
//! Per-voice read position over a [`Sample`].
//!
//! The cursor steps through the sample one frame at a time in its current
//! direction and resolves the boundary rules of the loop mode after every step,
//! so a stored index is always inside `[start, end]`. When the voice plays at a
//! pitch other than the sample's own, the stepped frames are fed through a
//! [`Resampler`] that lives as long as the cursor. The resampler is either handed
//! in already built, see [`PlaybackCursor::parked`], or created on first use.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::buffer::Sample;
use crate::audio::{Frame, SILENCE};
use crate::resample::{Quality, Resampler};

/// Ratios this close to 1 read frames directly.
const UNITY_EPSILON: f64 = 1.0e-9;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum LoopMode {
    #[default]
    Off,
    On,
    PingPong,
}

impl TryFrom<u8> for LoopMode {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(LoopMode::Off),
            1 => Ok(LoopMode::On),
            2 => Ok(LoopMode::PingPong),
            _ => Err(format!("unsupported loop mode: {}", value)),
        }
    }
}

impl From<LoopMode> for u8 {
    fn from(mode: LoopMode) -> Self {
        match mode {
            LoopMode::Off => 0,
            LoopMode::On => 1,
            LoopMode::PingPong => 2,
        }
    }
}

impl fmt::Display for LoopMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LoopMode::Off => "off",
            LoopMode::On => "on",
            LoopMode::PingPong => "ping-pong",
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Direction {
    #[default]
    Forward,
    Backward,
}

impl Direction {
    fn step(self) -> i64 {
        match self {
            Direction::Forward => 1,
            Direction::Backward => -1,
        }
    }
}

/// Mutable read state for one voice.
#[derive(Debug)]
pub struct PlaybackCursor {
    frame_index: i64,
    direction: Direction,
    quality: Quality,
    resampler: Option<Box<Resampler>>,
    /// The last render went through the resampler.
    resampling: bool,
    exhausted: bool,
    started: bool,
}

impl PlaybackCursor {
    pub fn new(quality: Quality) -> Self {
        Self::starting_at(0, Direction::Forward, quality)
    }

    pub fn starting_at(frame_index: i64, direction: Direction, quality: Quality) -> Self {
        Self {
            frame_index,
            direction,
            quality,
            resampler: None,
            resampling: false,
            exhausted: false,
            started: true,
        }
    }

    /// A cursor holding a resampler built off the audio thread. It has no
    /// position until [`PlaybackCursor::start`].
    pub fn parked(resampler: Box<Resampler>) -> Self {
        Self {
            quality: resampler.quality(),
            resampler: Some(resampler),
            started: false,
            ..Self::new(Quality::default())
        }
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Positions a parked cursor. A held resampler of another quality is dropped
    /// and rebuilt on first use.
    pub fn start(&mut self, frame_index: i64, direction: Direction, quality: Quality) {
        if self.resampler.as_ref().is_some_and(|r| r.quality() != quality) {
            self.resampler = None;
        }
        if let Some(resampler) = self.resampler.as_mut() {
            resampler.reset();
        }
        self.frame_index = frame_index;
        self.direction = direction;
        self.quality = quality;
        self.resampling = false;
        self.exhausted = false;
        self.started = true;
    }

    pub fn frame_index(&self) -> i64 {
        self.frame_index
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Loop-off playback ran off the end in the current direction and the
    /// resampler has nothing left to play.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted && self.resampler.as_ref().map_or(true, |r| r.is_idle())
    }

    /// Renders `out.len()` frames of `sample` at `ratio` output frames per sample
    /// frame. Frames that cannot be produced are silent.
    ///
    /// Returns false when nothing could be played because the sample is not
    /// playable or loop-off playback already ended. After the end the
    /// resampler's buffered frames and filter tail are still played out.
    pub fn render(
        &mut self,
        sample: &Sample,
        out: &mut [Frame],
        ratio: f64,
        loop_mode: LoopMode,
    ) -> bool {
        if !sample.is_playable() || out.is_empty() {
            out.fill(SILENCE);
            return false;
        }
        if loop_mode != LoopMode::Off {
            self.exhausted = false;
        }

        self.frame_index = self
            .frame_index
            .clamp(sample.start_frame(), sample.end_frame());
        resolve_boundary(
            sample,
            &mut self.frame_index,
            &mut self.direction,
            &mut self.exhausted,
            loop_mode,
        );
        if self.exhausted {
            let written = match self.resampler.as_mut() {
                Some(resampler) if self.resampling && !resampler.is_idle() => {
                    resampler.process(out, |_| 0)
                }
                _ => 0,
            };
            out[written..].fill(SILENCE);
            return written > 0;
        }

        let written = if (ratio - 1.0).abs() < UNITY_EPSILON {
            if self.resampling {
                self.resampling = false;
                if let Some(resampler) = self.resampler.as_mut() {
                    resampler.reset();
                }
            }
            read_frames(
                sample,
                &mut self.frame_index,
                &mut self.direction,
                &mut self.exhausted,
                out,
                loop_mode,
            )
        } else {
            self.render_resampled(sample, out, ratio, loop_mode)
        };
        out[written..].fill(SILENCE);
        true
    }

    fn render_resampled(
        &mut self,
        sample: &Sample,
        out: &mut [Frame],
        ratio: f64,
        loop_mode: LoopMode,
    ) -> usize {
        let Self {
            frame_index,
            direction,
            quality,
            resampler,
            resampling,
            exhausted,
            ..
        } = self;

        *resampling = true;
        if let Some(existing) = resampler.as_mut() {
            if existing.set_ratio(ratio).is_err() {
                *resampler = None;
            }
        }
        if resampler.is_none() {
            *resampler = Resampler::new(*quality, ratio).ok().map(Box::new);
        }
        let Some(resampler) = resampler.as_mut() else {
            return 0;
        };

        resampler.process(out, |buf| {
            read_frames(sample, frame_index, direction, exhausted, buf, loop_mode)
        })
    }
}

/// Applies the boundary rule for the current direction and loop mode.
fn resolve_boundary(
    sample: &Sample,
    index: &mut i64,
    direction: &mut Direction,
    exhausted: &mut bool,
    loop_mode: LoopMode,
) {
    let start = sample.start_frame();
    let end = sample.end_frame();
    let loop_start = sample.loop_start_frame();
    let loop_end = sample.loop_end_frame();

    match (loop_mode, *direction) {
        (LoopMode::Off, Direction::Forward) => {
            if *index >= end {
                *index = end;
                *exhausted = true;
            }
        }
        (LoopMode::Off, Direction::Backward) => {
            if *index < start {
                *index = start;
                *exhausted = true;
            }
        }
        (LoopMode::On, Direction::Forward) => {
            if *index >= loop_end {
                *index = loop_start;
            }
        }
        (LoopMode::On, Direction::Backward) => {
            if *index < loop_start {
                *index = loop_end - 1;
            }
        }
        (LoopMode::PingPong, Direction::Forward) => {
            if *index >= loop_end {
                *direction = Direction::Backward;
                *index = (loop_end - 2).max(loop_start);
            }
        }
        (LoopMode::PingPong, Direction::Backward) => {
            if *index < loop_start {
                *direction = Direction::Forward;
                *index = (loop_start + 1).min(loop_end - 1);
            }
        }
    }
}

/// Reads frames at the sample's own rate until `dst` is full or loop-off
/// playback runs out. Returns the number of frames written.
fn read_frames(
    sample: &Sample,
    index: &mut i64,
    direction: &mut Direction,
    exhausted: &mut bool,
    dst: &mut [Frame],
    loop_mode: LoopMode,
) -> usize {
    let mut written = 0;
    while written < dst.len() && !*exhausted {
        dst[written] = sample.read(*index);
        written += 1;
        *index += direction.step();
        resolve_boundary(sample, index, direction, exhausted, loop_mode);
    }
    written
}
