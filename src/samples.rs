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
//! Sample playback.
//!
//! This module provides:
//! - Shared sample buffers and their playback points
//! - Per-voice cursors with loop, ping-pong and reverse playback
//! - The sample player instrument with stutter and beat length
//! - Voice management with a polyphony limit

mod buffer;
mod cursor;
mod player;
mod points;
mod voice;

pub use buffer::{Sample, SampleBuffer};
pub use cursor::{Direction, LoopMode, PlaybackCursor};
pub use player::{
    Instrument, Interpolation, SamplePlayer, StutterCursor, DEFAULT_BASE_FREQUENCY,
    MAX_AMPLIFICATION_PERCENT, STUTTER_RESET_FREQUENCY,
};
pub use points::{PointFrames, SamplePointSet};
pub use voice::{NoteVoice, VoiceManager};
