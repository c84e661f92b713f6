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
//! Voice management for polyphonic sample playback.
//!
//! Handles voice allocation, stealing, note-off release and retirement.

use tracing::{debug, warn};

use super::cursor::PlaybackCursor;
use super::player::Instrument;
use crate::audio::Frame;
use crate::resample::Resampler;

/// One sounding note and its playback state.
#[derive(Debug)]
pub struct NoteVoice {
    /// Caller-assigned note ID, used to match note-offs.
    id: u64,
    frequency: f32,
    /// Monotonic start order, the lowest is stolen first.
    sequence: u64,
    cursor: Option<PlaybackCursor>,
    /// Frames of release fade left after note-off, None while held.
    release_remaining: Option<usize>,
    release_frames: usize,
    finished: bool,
}

impl NoteVoice {
    pub fn new(id: u64, frequency: f32) -> Self {
        Self {
            id,
            frequency,
            sequence: 0,
            cursor: None,
            release_remaining: None,
            release_frames: 0,
            finished: false,
        }
    }

    /// Hands the voice a resampler built off the audio thread.
    pub fn with_resampler(mut self, resampler: Option<Box<Resampler>>) -> Self {
        self.cursor = resampler.map(PlaybackCursor::parked);
        self
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn frequency(&self) -> f32 {
        self.frequency
    }

    pub fn cursor(&self) -> Option<&PlaybackCursor> {
        self.cursor.as_ref()
    }

    pub fn is_released(&self) -> bool {
        self.release_remaining.is_some()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Starts a linear fade over `release_frames`. A zero release ends the voice
    /// at the next render.
    pub fn note_off(&mut self, release_frames: usize) {
        if self.release_remaining.is_none() {
            self.release_frames = release_frames;
            self.release_remaining = Some(release_frames);
        }
    }

    /// Renders into `scratch` and mixes the result into `out`.
    pub fn render<I: Instrument + ?Sized>(
        &mut self,
        instrument: &mut I,
        out: &mut [Frame],
        scratch: &mut [Frame],
    ) {
        if self.finished {
            return;
        }
        if self.release_remaining == Some(0) {
            self.finished = true;
            return;
        }

        let len = out.len().min(scratch.len());
        let scratch = &mut scratch[..len];
        instrument.play_note(&mut self.cursor, self.frequency, scratch);

        for (dst, src) in out.iter_mut().zip(scratch.iter()) {
            let gain = match self.release_remaining.as_mut() {
                Some(remaining) => {
                    if *remaining == 0 {
                        0.0
                    } else {
                        let gain = *remaining as f32 / self.release_frames as f32;
                        *remaining -= 1;
                        gain
                    }
                }
                None => 1.0,
            };
            dst[0] += src[0] * gain;
            dst[1] += src[1] * gain;
        }

        let exhausted = self.cursor.as_ref().is_some_and(|c| c.is_exhausted());
        if exhausted || self.release_remaining == Some(0) {
            self.finished = true;
        }
    }
}

/// Manages active voices for sample playback.
pub struct VoiceManager {
    /// Active voices. Capacity is reserved up front so adding never allocates.
    voices: Vec<NoteVoice>,
    /// Global maximum voices limit.
    max_voices: usize,
    next_sequence: u64,
}

impl VoiceManager {
    pub fn new(max_voices: usize) -> Self {
        let max_voices = max_voices.max(1);
        Self {
            voices: Vec::with_capacity(max_voices),
            max_voices,
            next_sequence: 0,
        }
    }

    /// Adds a new voice, stealing the oldest if the limit is reached. The stolen
    /// voice is returned so the caller can release it off the audio thread.
    pub fn add_voice(&mut self, mut voice: NoteVoice) -> Option<NoteVoice> {
        let mut stolen = None;
        if self.voices.len() >= self.max_voices {
            if let Some(oldest) = self
                .voices
                .iter()
                .enumerate()
                .min_by_key(|(_, v)| v.sequence)
                .map(|(i, _)| i)
            {
                let voice = self.voices.swap_remove(oldest);
                warn!(
                    max_voices = self.max_voices,
                    stolen = voice.id,
                    "Voice limit reached, stealing oldest"
                );
                stolen = Some(voice);
            }
        }

        voice.sequence = self.next_sequence;
        self.next_sequence += 1;
        self.voices.push(voice);
        stolen
    }

    /// Starts the release of every held voice with the given note ID.
    pub fn handle_note_off(&mut self, id: u64, release_frames: usize) -> usize {
        let mut released = 0;
        for voice in self.voices.iter_mut().filter(|v| v.id == id && !v.is_released()) {
            voice.note_off(release_frames);
            released += 1;
        }
        if released == 0 {
            debug!(id, "Note off for unknown voice");
        }
        released
    }

    /// Sums all voices into `out`.
    pub fn render<I: Instrument + ?Sized>(
        &mut self,
        instrument: &mut I,
        out: &mut [Frame],
        scratch: &mut [Frame],
    ) {
        for voice in self.voices.iter_mut() {
            voice.render(instrument, out, scratch);
        }
    }

    /// Removes finished voices, handing each to `retire`.
    pub fn retire_finished<F>(&mut self, mut retire: F) -> usize
    where
        F: FnMut(NoteVoice),
    {
        let mut retired = 0;
        let mut i = 0;
        while i < self.voices.len() {
            if self.voices[i].is_finished() {
                retire(self.voices.swap_remove(i));
                retired += 1;
            } else {
                i += 1;
            }
        }
        retired
    }

    /// The most recently started voice.
    pub fn latest(&self) -> Option<&NoteVoice> {
        self.voices.iter().max_by_key(|v| v.sequence)
    }

    /// Returns the current number of active voices.
    pub fn active_count(&self) -> usize {
        self.voices.len()
    }

    /// Removes every voice, handing each to `retire`.
    pub fn clear<F>(&mut self, mut retire: F)
    where
        F: FnMut(NoteVoice),
    {
        while let Some(voice) = self.voices.pop() {
            retire(voice);
        }
    }
}

impl std::fmt::Debug for VoiceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoiceManager")
            .field("active_voices", &self.voices.len())
            .field("max_voices", &self.max_voices)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::SILENCE;
    use crate::samples::{LoopMode, SampleBuffer, SamplePlayer};

    fn looping_player() -> SamplePlayer {
        let mut player = SamplePlayer::new(SampleBuffer::new(vec![[0.5, 0.5]; 1000], 44100), 44100);
        player.set_loop_mode(LoopMode::On);
        player
    }

    #[test]
    fn test_voice_manager_global_limit() {
        let mut manager = VoiceManager::new(3);
        for id in 1..=3 {
            assert!(manager.add_voice(NoteVoice::new(id, 440.0)).is_none());
        }

        let stolen = manager.add_voice(NoteVoice::new(4, 440.0));
        assert_eq!(Some(1), stolen.map(|v| v.id()));
        assert_eq!(3, manager.active_count());

        let stolen = manager.add_voice(NoteVoice::new(5, 440.0));
        assert_eq!(Some(2), stolen.map(|v| v.id()));
    }

    #[test]
    fn test_held_voice_sums_into_output() {
        let mut player = looping_player();
        let mut manager = VoiceManager::new(4);
        manager.add_voice(NoteVoice::new(1, 440.0));
        manager.add_voice(NoteVoice::new(2, 440.0));

        let mut out = vec![SILENCE; 64];
        let mut scratch = vec![SILENCE; 64];
        manager.render(&mut player, &mut out, &mut scratch);
        assert!(out.iter().all(|f| (f[0] - 1.0).abs() < 1e-6));
    }

    #[test]
    fn test_note_off_fades_and_retires() {
        let mut player = looping_player();
        let mut manager = VoiceManager::new(4);
        manager.add_voice(NoteVoice::new(7, 440.0));
        assert_eq!(1, manager.handle_note_off(7, 100));
        assert_eq!(0, manager.handle_note_off(7, 100));

        let mut out = vec![SILENCE; 64];
        let mut scratch = vec![SILENCE; 64];
        manager.render(&mut player, &mut out, &mut scratch);
        assert!((out[0][0] - 0.5).abs() < 1e-6);
        assert!(out[63][0] < out[0][0]);
        assert_eq!(0, manager.retire_finished(|_| {}));

        out.fill(SILENCE);
        manager.render(&mut player, &mut out, &mut scratch);
        assert!(out[36..].iter().all(|f| *f == SILENCE));

        let mut retired = Vec::new();
        assert_eq!(1, manager.retire_finished(|v| retired.push(v.id())));
        assert_eq!(vec![7], retired);
        assert_eq!(0, manager.active_count());
    }

    #[test]
    fn test_exhausted_voice_retires() {
        let mut player = SamplePlayer::new(SampleBuffer::new(vec![[0.5, 0.5]; 50], 44100), 44100);
        let mut manager = VoiceManager::new(4);
        manager.add_voice(NoteVoice::new(1, 440.0));

        let mut out = vec![SILENCE; 64];
        let mut scratch = vec![SILENCE; 64];
        manager.render(&mut player, &mut out, &mut scratch);
        assert_eq!(1, manager.retire_finished(|_| {}));
    }

    #[test]
    fn test_prepared_voice_plays_pitched() {
        let mut player = looping_player();
        let mut manager = VoiceManager::new(4);
        let resampler = Resampler::new(player.interpolation().quality(), 1.0).unwrap();
        let voice = NoteVoice::new(1, 880.0).with_resampler(Some(Box::new(resampler)));
        assert!(voice.cursor().is_some_and(|c| !c.is_started()));
        manager.add_voice(voice);

        let mut out = vec![SILENCE; 256];
        let mut scratch = vec![SILENCE; 256];
        for _ in 0..4 {
            out.fill(SILENCE);
            manager.render(&mut player, &mut out, &mut scratch);
        }
        assert!(manager.latest().and_then(|v| v.cursor()).is_some_and(|c| c.is_started()));
        assert!(out.iter().all(|f| (f[0] - 0.5).abs() < 1e-3));
    }

    #[test]
    fn test_clear() {
        let mut manager = VoiceManager::new(4);
        manager.add_voice(NoteVoice::new(1, 440.0));
        manager.add_voice(NoteVoice::new(2, 440.0));
        let mut count = 0;
        manager.clear(|_| count += 1);
        assert_eq!(2, count);
        assert_eq!(0, manager.active_count());
    }
}
