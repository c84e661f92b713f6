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
//! The sample-playing instrument.
//!
//! A [`SamplePlayer`] owns one [`Sample`] and the user-facing controls around
//! it. Each note gets its own [`PlaybackCursor`], created on the note's first
//! render. With stutter enabled, a new note resumes where the previous one
//! stopped instead of at the start point.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::buffer::{Sample, SampleBuffer};
use super::cursor::{Direction, LoopMode, PlaybackCursor};
use super::points::SamplePointSet;
use crate::audio::{Frame, SILENCE};
use crate::config::SamplerSettings;
use crate::resample::Quality;

/// Notes below this frequency reset the stutter position instead of sounding.
pub const STUTTER_RESET_FREQUENCY: f32 = 20.0;

/// Frequency at which the sample plays at its own pitch.
pub const DEFAULT_BASE_FREQUENCY: f32 = 440.0;

/// Largest amplification, in percent.
pub const MAX_AMPLIFICATION_PERCENT: f32 = 500.0;

/// Interpolation used when a note plays at a pitch other than the sample's own.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Interpolation {
    None,
    #[default]
    Linear,
    Sinc,
}

impl Interpolation {
    pub fn quality(self) -> Quality {
        match self {
            Interpolation::None => Quality::Point,
            Interpolation::Linear => Quality::Linear,
            Interpolation::Sinc => Quality::Sinc,
        }
    }
}

impl TryFrom<u8> for Interpolation {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Interpolation::None),
            1 => Ok(Interpolation::Linear),
            2 => Ok(Interpolation::Sinc),
            _ => Err(format!("unsupported interpolation: {}", value)),
        }
    }
}

impl From<Interpolation> for u8 {
    fn from(interpolation: Interpolation) -> Self {
        match interpolation {
            Interpolation::None => 0,
            Interpolation::Linear => 1,
            Interpolation::Sinc => 2,
        }
    }
}

/// Where the next stutter note starts. Shared by all voices of one player and
/// only touched on the audio thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StutterCursor {
    next_start_frame: i64,
    next_direction: Direction,
}

impl StutterCursor {
    pub fn new(start_frame: i64) -> Self {
        Self {
            next_start_frame: start_frame,
            next_direction: Direction::Forward,
        }
    }

    pub fn next_start_frame(&self) -> i64 {
        self.next_start_frame
    }

    pub fn next_direction(&self) -> Direction {
        self.next_direction
    }

    fn reset(&mut self, start_frame: i64) {
        self.next_start_frame = start_frame;
        self.next_direction = Direction::Forward;
    }

    fn save(&mut self, cursor: &PlaybackCursor) {
        self.next_start_frame = cursor.frame_index();
        self.next_direction = cursor.direction();
    }
}

/// Anything that renders a note into a block of frames.
pub trait Instrument: Send {
    /// Renders `out.len()` frames for a note at `frequency`. `cursor` is the
    /// note's own playback state, created on first use. Returns whether anything
    /// was rendered.
    fn play_note(
        &mut self,
        cursor: &mut Option<PlaybackCursor>,
        frequency: f32,
        out: &mut [Frame],
    ) -> bool;

    /// Whether notes end on their own, without a note-off.
    fn is_one_shot(&self) -> bool {
        false
    }
}

pub struct SamplePlayer {
    sample: Sample,
    points: SamplePointSet,
    amplification_percent: f32,
    loop_mode: LoopMode,
    interpolation: Interpolation,
    stutter: bool,
    stutter_cursor: StutterCursor,
    base_frequency: f32,
    engine_rate: u32,
}

impl fmt::Debug for SamplePlayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SamplePlayer")
            .field("frames", &self.sample.frame_count())
            .field("sample_rate", &self.sample.sample_rate())
            .field("loop_mode", &self.loop_mode)
            .field("interpolation", &self.interpolation)
            .field("stutter", &self.stutter)
            .finish()
    }
}

impl SamplePlayer {
    pub fn new(buffer: SampleBuffer, engine_rate: u32) -> Self {
        let frames = buffer.frame_count();
        let mut player = Self {
            sample: Sample::new(buffer),
            points: SamplePointSet::new(frames),
            amplification_percent: 100.0,
            loop_mode: LoopMode::Off,
            interpolation: Interpolation::Linear,
            stutter: false,
            stutter_cursor: StutterCursor::new(0),
            base_frequency: DEFAULT_BASE_FREQUENCY,
            engine_rate,
        };
        player.points_changed();
        player
    }

    /// Restores a player from persisted settings.
    pub fn from_settings(buffer: SampleBuffer, settings: &SamplerSettings, engine_rate: u32) -> Self {
        let mut player = Self::new(buffer, engine_rate);
        player.apply_settings(settings);
        player
    }

    pub fn apply_settings(&mut self, settings: &SamplerSettings) {
        self.points = SamplePointSet::from_fractions(
            self.sample.frame_count(),
            settings.start_point(),
            settings.end_point(),
            settings.loop_point(),
        );
        self.set_amplification(settings.amplification());
        self.sample.set_reversed(settings.reversed());
        self.loop_mode = settings.loop_mode();
        self.interpolation = settings.interpolation();
        self.stutter = settings.stutter();
        self.points_changed();
    }

    /// Snapshot of the controls for persistence.
    pub fn settings(&self) -> SamplerSettings {
        SamplerSettings::default()
            .with_points(self.points.start(), self.points.end(), self.points.loopback())
            .with_amplification(self.amplification_percent)
            .with_reversed(self.sample.reversed())
            .with_loop_mode(self.loop_mode)
            .with_interpolation(self.interpolation)
            .with_stutter(self.stutter)
    }

    pub fn sample(&self) -> &Sample {
        &self.sample
    }

    /// Replaces the audio. Points keep their fractions and are re-derived for
    /// the new length. Returns the old buffer so the caller decides where it is
    /// freed.
    pub fn set_sample(&mut self, buffer: SampleBuffer) -> SampleBuffer {
        let old = self.sample.set_buffer(buffer);
        self.points.set_sample_frames(self.sample.frame_count());
        self.points_changed();
        old
    }

    pub fn points(&self) -> &SamplePointSet {
        &self.points
    }

    pub fn set_start_point(&mut self, value: f32) {
        self.points.set_start(value);
        self.points_changed();
    }

    pub fn set_end_point(&mut self, value: f32) {
        self.points.set_end(value);
        self.points_changed();
    }

    pub fn set_loop_point(&mut self, value: f32) {
        self.points.set_loopback(value);
        self.points_changed();
    }

    pub fn amplification_percent(&self) -> f32 {
        self.amplification_percent
    }

    /// Amplification in percent, 100 leaves the sample unchanged.
    pub fn set_amplification(&mut self, percent: f32) {
        self.amplification_percent = percent.clamp(0.0, MAX_AMPLIFICATION_PERCENT);
        self.sample
            .set_amplification(self.amplification_percent / 100.0);
    }

    pub fn reversed(&self) -> bool {
        self.sample.reversed()
    }

    pub fn set_reversed(&mut self, reversed: bool) {
        self.sample.set_reversed(reversed);
        self.points_changed();
    }

    pub fn loop_mode(&self) -> LoopMode {
        self.loop_mode
    }

    pub fn set_loop_mode(&mut self, loop_mode: LoopMode) {
        self.loop_mode = loop_mode;
    }

    pub fn interpolation(&self) -> Interpolation {
        self.interpolation
    }

    /// Applies to notes started after the change.
    pub fn set_interpolation(&mut self, interpolation: Interpolation) {
        self.interpolation = interpolation;
    }

    pub fn stutter(&self) -> bool {
        self.stutter
    }

    pub fn set_stutter(&mut self, stutter: bool) {
        self.stutter = stutter;
        self.stutter_cursor.reset(self.sample.start_frame());
    }

    pub fn stutter_cursor(&self) -> &StutterCursor {
        &self.stutter_cursor
    }

    pub fn base_frequency(&self) -> f32 {
        self.base_frequency
    }

    pub fn set_base_frequency(&mut self, frequency: f32) {
        if frequency > 0.0 {
            self.base_frequency = frequency;
        }
    }

    pub fn engine_rate(&self) -> u32 {
        self.engine_rate
    }

    /// Re-derives frame points from the fractions and restarts stutter.
    fn points_changed(&mut self) {
        let frames = self.points.frames(self.sample.frame_count());
        self.sample
            .set_all_point_frames(frames.start, frames.end, frames.loopback, frames.end);
        self.stutter_cursor.reset(frames.start);
        debug!(
            start = frames.start,
            end = frames.end,
            loopback = frames.loopback,
            "Sample points changed"
        );
    }

    /// Output frames per sample frame for a note at `frequency`.
    pub fn resampling_ratio(&self, frequency: f32) -> f64 {
        let sample_rate = self.sample.sample_rate().max(1) as f64;
        self.engine_rate as f64 * self.base_frequency as f64
            / frequency.max(f32::MIN_POSITIVE) as f64
            / sample_rate
    }

    /// Length of a note at `frequency` in engine frames, or `None` when looping
    /// makes it indefinite.
    pub fn beat_len(&self, frequency: f32) -> Option<u64> {
        if self.loop_mode != LoopMode::Off || frequency <= 0.0 {
            return None;
        }
        let start = self.sample.start_frame();
        let end = self.sample.end_frame();
        let next = self.stutter_cursor.next_start_frame();
        let effective_start = if next >= end { start } else { next.max(start) };
        let frames = (end - effective_start).max(0) as f64;
        Some((frames * self.resampling_ratio(frequency)).floor() as u64)
    }

    fn stutter_needs_restart(&self) -> bool {
        let next = self.stutter_cursor.next_start_frame();
        match self.stutter_cursor.next_direction() {
            Direction::Forward => next >= self.sample.end_frame(),
            Direction::Backward => {
                self.loop_mode == LoopMode::Off && next <= self.sample.start_frame()
            }
        }
    }
}

impl Instrument for SamplePlayer {
    fn play_note(
        &mut self,
        cursor: &mut Option<PlaybackCursor>,
        frequency: f32,
        out: &mut [Frame],
    ) -> bool {
        if self.stutter && frequency < STUTTER_RESET_FREQUENCY {
            self.stutter_cursor.reset(self.sample.start_frame());
            out.fill(SILENCE);
            return false;
        }

        if !cursor.as_ref().is_some_and(|c| c.is_started()) {
            if self.stutter && self.stutter_needs_restart() {
                self.stutter_cursor.reset(self.sample.start_frame());
            }
            let (start, direction) = if self.stutter {
                (
                    self.stutter_cursor.next_start_frame(),
                    self.stutter_cursor.next_direction(),
                )
            } else {
                (self.sample.start_frame(), Direction::Forward)
            };
            let quality = self.interpolation.quality();
            match cursor.as_mut() {
                Some(parked) => parked.start(start, direction, quality),
                None => *cursor = Some(PlaybackCursor::starting_at(start, direction, quality)),
            }
        }
        let Some(cursor) = cursor.as_mut() else {
            out.fill(SILENCE);
            return false;
        };

        let ratio = self.resampling_ratio(frequency);
        let played = cursor.render(&self.sample, out, ratio, self.loop_mode);
        if self.stutter {
            self.stutter_cursor.save(cursor);
        }
        played
    }

    fn is_one_shot(&self) -> bool {
        self.loop_mode == LoopMode::Off
    }
}
