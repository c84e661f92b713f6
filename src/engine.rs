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
//! The sampler engine: note voices rendered through one sample player, mixed
//! with monitored input and run through an effect chain, one period per pull.
//!
//! Control threads talk to the engine through an [`EngineHandle`]. Commands are
//! applied at the top of the next period. Anything the audio thread retires
//! (voices, effects, sample buffers) is sent back on a garbage queue so it is
//! freed on the control side.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender, TrySendError};
use tracing::{debug, info};

use crate::audio::{is_silent, AudioEngine, CaptureRing, Frame, PeriodBuffer, SILENCE};
use crate::config::{ConfigError, EngineConfig, SamplerSettings};
use crate::effects::{AutoQuitDecay, Effect, EffectChain};
use crate::resample::Resampler;
use crate::samples::{Interpolation, LoopMode, NoteVoice, SampleBuffer, SamplePlayer, VoiceManager};
use crate::util::AtomicF32;

/// Commands queued per period before senders see a full queue.
pub const COMMAND_QUEUE_CAPACITY: usize = 1024;

/// Retired objects waiting for the control thread.
pub const GARBAGE_QUEUE_CAPACITY: usize = 1024;

/// Largest effect chain the engine will hold.
pub const MAX_EFFECTS: usize = 16;

/// Errors reported to control threads.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Engine command queue is full")]
    QueueFull,

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// A change applied by the audio thread at the next period boundary.
#[derive(Debug)]
pub enum Command {
    /// `resampler` is built by the sender so pitched playback does not allocate
    /// on the audio thread.
    NoteOn {
        id: u64,
        frequency: f32,
        resampler: Option<Box<Resampler>>,
    },
    NoteOff { id: u64 },
    StopAll,
    /// Replaces the sample. Sounding voices are stopped.
    SetSample(SampleBuffer),
    ApplySamplerSettings(Box<SamplerSettings>),
    SetStartPoint(f32),
    SetEndPoint(f32),
    SetLoopPoint(f32),
    SetAmplification(f32),
    SetReversed(bool),
    SetLoopMode(LoopMode),
    SetInterpolation(Interpolation),
    SetStutter(bool),
    SetBaseFrequency(f32),
    AddEffect(Box<Effect>),
    RemoveEffect(usize),
    SetEffectEnabled { index: usize, enabled: bool },
    SetEffectWet { index: usize, wet: f32 },
    SetEffectGate { index: usize, gate: f32 },
    SetEffectDecay { index: usize, decay: AutoQuitDecay },
    SetKeepEffectsRunning(bool),
    SetMonitorInput(bool),
    /// Every following pull reports end of stream.
    Finish,
}

/// Something the audio thread no longer needs.
#[derive(Debug)]
pub enum Garbage {
    Voice(NoteVoice),
    Effect(Box<Effect>),
    Sample(SampleBuffer),
    Settings(Box<SamplerSettings>),
}

/// State the engine publishes for control threads.
#[derive(Debug)]
struct EngineShared {
    master_gain: AtomicF32,
    /// Frame index of the most recently started voice, 0 when silent.
    position: AtomicI64,
    active_voices: AtomicUsize,
    effects_running: AtomicBool,
    /// Garbage the audio thread had to drop itself because the queue was full.
    dropped_garbage: AtomicU64,
    finished: AtomicBool,
    /// The player's interpolation as a `u8` code, for building resamplers ahead.
    interpolation: AtomicU8,
}

/// Cloneable control-side handle to a [`SamplerEngine`].
#[derive(Clone)]
pub struct EngineHandle {
    commands: Sender<Command>,
    command_rx: Receiver<Command>,
    garbage_tx: Sender<Garbage>,
    garbage: Receiver<Garbage>,
    shared: Arc<EngineShared>,
}

impl fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineHandle")
            .field("pending_commands", &self.commands.len())
            .field("pending_garbage", &self.garbage.len())
            .field("shared", &self.shared)
            .finish()
    }
}

impl Default for EngineHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineHandle {
    pub fn new() -> Self {
        let (commands, command_rx) = crossbeam_channel::bounded(COMMAND_QUEUE_CAPACITY);
        let (garbage_tx, garbage) = crossbeam_channel::bounded(GARBAGE_QUEUE_CAPACITY);
        Self {
            commands,
            command_rx,
            garbage_tx,
            garbage,
            shared: Arc::new(EngineShared {
                master_gain: AtomicF32::new(1.0),
                position: AtomicI64::new(0),
                active_voices: AtomicUsize::new(0),
                effects_running: AtomicBool::new(false),
                dropped_garbage: AtomicU64::new(0),
                finished: AtomicBool::new(false),
                interpolation: AtomicU8::new(u8::from(Interpolation::default())),
            }),
        }
    }

    /// Queues a command without blocking.
    pub fn send(&self, command: Command) -> Result<(), EngineError> {
        self.commands.try_send(command).map_err(|e| match e {
            TrySendError::Full(_) | TrySendError::Disconnected(_) => EngineError::QueueFull,
        })
    }

    pub fn note_on(&self, id: u64, frequency: f32) -> Result<(), EngineError> {
        let quality = Interpolation::try_from(self.shared.interpolation.load(Ordering::Relaxed))
            .map(|i| i.quality())
            .unwrap_or_default();
        let resampler = Resampler::new(quality, 1.0).ok().map(Box::new);
        self.send(Command::NoteOn {
            id,
            frequency,
            resampler,
        })
    }

    pub fn note_off(&self, id: u64) -> Result<(), EngineError> {
        self.send(Command::NoteOff { id })
    }

    pub fn stop_all(&self) -> Result<(), EngineError> {
        self.send(Command::StopAll)
    }

    pub fn finish(&self) -> Result<(), EngineError> {
        self.send(Command::Finish)
    }

    /// Builds an effect on this thread and queues it for the chain.
    pub fn add_effect(&self, effect: Effect) -> Result<(), EngineError> {
        self.send(Command::AddEffect(Box::new(effect)))
    }

    /// Takes effect at the next copy to the device.
    pub fn set_master_gain(&self, gain: f32) {
        self.shared.master_gain.store(gain.max(0.0));
    }

    pub fn master_gain(&self) -> f32 {
        self.shared.master_gain.load()
    }

    /// Playback position for waveform cursors.
    pub fn position(&self) -> i64 {
        self.shared.position.load(Ordering::Relaxed)
    }

    pub fn active_voices(&self) -> usize {
        self.shared.active_voices.load(Ordering::Relaxed)
    }

    pub fn effects_running(&self) -> bool {
        self.shared.effects_running.load(Ordering::Relaxed)
    }

    pub fn is_finished(&self) -> bool {
        self.shared.finished.load(Ordering::Acquire)
    }

    pub fn dropped_garbage(&self) -> u64 {
        self.shared.dropped_garbage.load(Ordering::Relaxed)
    }

    /// Frees everything the audio thread has retired. Call periodically from a
    /// control thread.
    pub fn collect_garbage(&self) -> usize {
        let mut collected = 0;
        for garbage in self.garbage.try_iter() {
            if let Garbage::Effect(effect) = &garbage {
                debug!(effect = effect.name(), "Freeing removed effect");
            }
            drop(garbage);
            collected += 1;
        }
        collected
    }
}

/// Renders periods for the output driver.
pub struct SamplerEngine {
    sample_rate: u32,
    frames_per_period: usize,
    release_frames: usize,
    player: SamplePlayer,
    voices: VoiceManager,
    chain: EffectChain,
    effects_running: bool,
    scratch: Vec<Frame>,
    capture: Option<Arc<CaptureRing>>,
    capture_buffer: Vec<Frame>,
    monitor_input: bool,
    commands: Receiver<Command>,
    garbage: Sender<Garbage>,
    shared: Arc<EngineShared>,
    finished: bool,
}

impl fmt::Debug for SamplerEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SamplerEngine")
            .field("sample_rate", &self.sample_rate)
            .field("frames_per_period", &self.frames_per_period)
            .field("player", &self.player)
            .field("voices", &self.voices)
            .field("effects", &self.chain.len())
            .field("capture", &self.capture.is_some())
            .field("finished", &self.finished)
            .finish()
    }
}

impl SamplerEngine {
    /// Builds an engine and its effect chain from configuration. Runs on a
    /// control thread; everything the audio thread needs is allocated here.
    pub fn new(
        config: &EngineConfig,
        player: SamplePlayer,
        handle: &EngineHandle,
    ) -> Result<Self, EngineError> {
        let frames_per_period = config.frames_per_period();
        let context = config.effect_context();
        let mut chain = EffectChain::with_capacity(MAX_EFFECTS);
        for effect in config.effects() {
            let effect = effect.build(context)?;
            info!(
                effect = effect.name(),
                wet = effect.wet(),
                okay = effect.is_okay(),
                "Adding effect"
            );
            if chain.push(Box::new(effect)).is_err() {
                return Err(ConfigError::Invalid {
                    field: "effects",
                    reason: format!("at most {} effects are supported", MAX_EFFECTS),
                }
                .into());
            }
        }

        handle.set_master_gain(config.master_gain());
        handle
            .shared
            .interpolation
            .store(u8::from(player.interpolation()), Ordering::Relaxed);
        Ok(Self {
            sample_rate: config.sample_rate(),
            frames_per_period,
            release_frames: config.release_frames()?,
            player,
            voices: VoiceManager::new(config.max_voices()),
            chain,
            effects_running: true,
            scratch: vec![SILENCE; frames_per_period],
            capture: None,
            capture_buffer: vec![SILENCE; frames_per_period],
            monitor_input: config.monitor_input(),
            commands: handle.command_rx.clone(),
            garbage: handle.garbage_tx.clone(),
            shared: handle.shared.clone(),
            finished: false,
        })
    }

    /// Reads captured input from `capture` every period.
    pub fn with_capture(mut self, capture: Option<Arc<CaptureRing>>) -> Self {
        self.capture = capture;
        self
    }

    pub fn player(&self) -> &SamplePlayer {
        &self.player
    }

    pub fn chain(&self) -> &EffectChain {
        &self.chain
    }

    fn retire(&self, garbage: Garbage) {
        if let Err(TrySendError::Full(garbage) | TrySendError::Disconnected(garbage)) =
            self.garbage.try_send(garbage)
        {
            self.shared.dropped_garbage.fetch_add(1, Ordering::Relaxed);
            drop(garbage);
        }
    }

    fn stop_voices(&mut self) {
        let garbage = &self.garbage;
        let shared = &self.shared;
        self.voices.clear(|voice| {
            if garbage.try_send(Garbage::Voice(voice)).is_err() {
                shared.dropped_garbage.fetch_add(1, Ordering::Relaxed);
            }
        });
    }

    fn apply(&mut self, command: Command) {
        match command {
            Command::NoteOn {
                id,
                frequency,
                resampler,
            } => {
                let voice = NoteVoice::new(id, frequency).with_resampler(resampler);
                if let Some(stolen) = self.voices.add_voice(voice) {
                    self.retire(Garbage::Voice(stolen));
                }
            }
            Command::NoteOff { id } => {
                self.voices.handle_note_off(id, self.release_frames);
            }
            Command::StopAll => self.stop_voices(),
            Command::SetSample(buffer) => {
                self.stop_voices();
                let old = self.player.set_sample(buffer);
                self.retire(Garbage::Sample(old));
            }
            Command::ApplySamplerSettings(settings) => {
                self.player.apply_settings(&settings);
                self.publish_interpolation();
                self.retire(Garbage::Settings(settings));
            }
            Command::SetStartPoint(value) => self.player.set_start_point(value),
            Command::SetEndPoint(value) => self.player.set_end_point(value),
            Command::SetLoopPoint(value) => self.player.set_loop_point(value),
            Command::SetAmplification(percent) => self.player.set_amplification(percent),
            Command::SetReversed(reversed) => self.player.set_reversed(reversed),
            Command::SetLoopMode(mode) => self.player.set_loop_mode(mode),
            Command::SetInterpolation(interpolation) => {
                self.player.set_interpolation(interpolation);
                self.publish_interpolation();
            }
            Command::SetStutter(stutter) => self.player.set_stutter(stutter),
            Command::SetBaseFrequency(frequency) => self.player.set_base_frequency(frequency),
            Command::AddEffect(effect) => match self.chain.push(effect) {
                Ok(()) => self.effects_running = true,
                Err(effect) => self.retire(Garbage::Effect(effect)),
            },
            Command::RemoveEffect(index) => {
                if let Some(effect) = self.chain.remove(index) {
                    self.retire(Garbage::Effect(effect));
                }
            }
            Command::SetEffectEnabled { index, enabled } => {
                if let Some(effect) = self.chain.get_mut(index) {
                    effect.set_enabled(enabled);
                }
            }
            Command::SetEffectWet { index, wet } => {
                if let Some(effect) = self.chain.get_mut(index) {
                    effect.set_wet(wet);
                }
            }
            Command::SetEffectGate { index, gate } => {
                if let Some(effect) = self.chain.get_mut(index) {
                    effect.set_gate(gate);
                }
            }
            Command::SetEffectDecay { index, decay } => {
                if let Some(effect) = self.chain.get_mut(index) {
                    effect.set_decay(decay);
                }
            }
            Command::SetKeepEffectsRunning(keep_running) => {
                for effect in self.chain.iter_mut() {
                    effect.set_keep_running(keep_running);
                }
            }
            Command::SetMonitorInput(monitor) => self.monitor_input = monitor,
            Command::Finish => {
                self.finished = true;
                self.shared.finished.store(true, Ordering::Release);
            }
        }
    }

    fn drain_capture(&mut self, period: &mut [Frame]) {
        let Some(capture) = self.capture.as_ref() else {
            return;
        };
        let len = period.len().min(self.capture_buffer.len());
        let read = capture.read(&mut self.capture_buffer[..len]);
        if self.monitor_input {
            for (out, input) in period.iter_mut().zip(self.capture_buffer[..read].iter()) {
                out[0] += input[0];
                out[1] += input[1];
            }
        }
    }

    fn publish_interpolation(&self) {
        self.shared
            .interpolation
            .store(u8::from(self.player.interpolation()), Ordering::Relaxed);
    }

    fn publish(&self) {
        let position = self
            .voices
            .latest()
            .and_then(|voice| voice.cursor())
            .map(|cursor| cursor.frame_index())
            .unwrap_or(0);
        self.shared.position.store(position, Ordering::Relaxed);
        self.shared
            .active_voices
            .store(self.voices.active_count(), Ordering::Relaxed);
        self.shared
            .effects_running
            .store(self.effects_running, Ordering::Relaxed);
    }
}

impl AudioEngine for SamplerEngine {
    fn frames_per_period(&self) -> usize {
        self.frames_per_period
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn master_gain(&self) -> f32 {
        self.shared.master_gain.load()
    }

    fn pull(&mut self, period: &mut PeriodBuffer) -> usize {
        while !self.finished {
            match self.commands.try_recv() {
                Ok(command) => self.apply(command),
                Err(_) => break,
            }
        }
        if self.finished {
            return 0;
        }

        period.silence();
        let frames: &mut [Frame] = period;
        self.voices.render(&mut self.player, frames, &mut self.scratch);

        let garbage = &self.garbage;
        let shared = &self.shared;
        self.voices.retire_finished(|voice| {
            if garbage.try_send(Garbage::Voice(voice)).is_err() {
                shared.dropped_garbage.fetch_add(1, Ordering::Relaxed);
            }
        });

        self.drain_capture(frames);

        if self.effects_running || !is_silent(frames) {
            self.effects_running = self.chain.process(frames);
        }

        self.publish();
        frames.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EffectConfig;
    use crate::effects::Gain;

    fn config() -> EngineConfig {
        EngineConfig::default().with_frames_per_period(64)
    }

    fn player() -> SamplePlayer {
        SamplePlayer::new(SampleBuffer::new(vec![[0.5, 0.5]; 1000], 44100), 44100)
    }

    fn engine(config: &EngineConfig) -> (SamplerEngine, EngineHandle) {
        let handle = EngineHandle::new();
        let engine = SamplerEngine::new(config, player(), &handle).unwrap();
        (engine, handle)
    }

    #[test]
    fn test_silent_until_note_on() {
        let (mut engine, handle) = engine(&config());
        let mut period = PeriodBuffer::new(64);
        assert_eq!(64, engine.pull(&mut period));
        assert!(period.is_silent());

        handle.note_on(1, 440.0).unwrap();
        assert_eq!(64, engine.pull(&mut period));
        assert!(period.iter().all(|f| *f == [0.5, 0.5]));
        assert_eq!(1, handle.active_voices());
        assert_eq!(64, handle.position());
    }

    #[test]
    fn test_note_on_prepares_resampler_for_interpolation() {
        let (mut engine, handle) = engine(&config());
        handle
            .send(Command::SetInterpolation(Interpolation::Sinc))
            .unwrap();
        let mut period = PeriodBuffer::new(64);
        engine.pull(&mut period);

        handle.note_on(1, 220.0).unwrap();
        let Ok(Command::NoteOn {
            resampler: Some(resampler),
            ..
        }) = handle.command_rx.try_recv()
        else {
            panic!("expected a note-on with a resampler");
        };
        assert_eq!(crate::resample::Quality::Sinc, resampler.quality());
    }

    #[test]
    fn test_pitched_note_plays_through_prepared_resampler() {
        let (mut engine, handle) = engine(&config());
        handle.send(Command::SetLoopMode(LoopMode::On)).unwrap();
        handle.note_on(1, 880.0).unwrap();

        let mut period = PeriodBuffer::new(64);
        for _ in 0..8 {
            engine.pull(&mut period);
        }
        assert!(period.iter().all(|f| (f[0] - 0.5).abs() < 1e-3));
    }

    #[test]
    fn test_one_shot_voice_retires_to_garbage() {
        let (mut engine, handle) = engine(&config());
        handle.note_on(1, 440.0).unwrap();

        let mut period = PeriodBuffer::new(64);
        let mut non_silent = 0;
        for _ in 0..20 {
            engine.pull(&mut period);
            non_silent += period.iter().filter(|f| f[0] != 0.0).count();
        }
        assert_eq!(1000, non_silent);
        assert_eq!(0, handle.active_voices());
        assert_eq!(0, handle.position());
        assert_eq!(1, handle.collect_garbage());
    }

    #[test]
    fn test_note_off_releases() {
        let (mut engine, handle) = engine(&config());
        handle.send(Command::SetLoopMode(LoopMode::On)).unwrap();
        handle.note_on(3, 440.0).unwrap();

        let mut period = PeriodBuffer::new(64);
        engine.pull(&mut period);
        handle.note_off(3).unwrap();
        // 10ms at 44.1kHz is 441 frames.
        for _ in 0..8 {
            engine.pull(&mut period);
        }
        assert_eq!(0, handle.active_voices());
        assert!(period.is_silent());
    }

    #[test]
    fn test_stop_all_and_finish() {
        let (mut engine, handle) = engine(&config());
        handle.send(Command::SetLoopMode(LoopMode::On)).unwrap();
        handle.note_on(1, 440.0).unwrap();
        handle.note_on(2, 220.0).unwrap();

        let mut period = PeriodBuffer::new(64);
        engine.pull(&mut period);
        assert_eq!(2, handle.active_voices());

        handle.stop_all().unwrap();
        engine.pull(&mut period);
        assert!(period.is_silent());
        assert_eq!(2, handle.collect_garbage());

        handle.finish().unwrap();
        assert_eq!(0, engine.pull(&mut period));
        assert!(handle.is_finished());
        assert_eq!(0, engine.pull(&mut period));
    }

    #[test]
    fn test_effects_from_config() {
        let gain: EffectConfig = serde_yml::from_str("kind: gain\ngain: 0.5\n").unwrap();
        let config = config().with_effects(vec![gain]);
        let (mut engine, handle) = engine(&config);
        assert_eq!(1, engine.chain().len());

        handle.note_on(1, 440.0).unwrap();
        let mut period = PeriodBuffer::new(64);
        engine.pull(&mut period);
        assert!(period.iter().all(|f| (f[0] - 0.25).abs() < 1e-6));
        assert!(handle.effects_running());

        handle.send(Command::SetEffectWet { index: 0, wet: 0.0 }).unwrap();
        engine.pull(&mut period);
        assert!(period.iter().all(|f| (f[0] - 0.5).abs() < 1e-6));

        handle.send(Command::RemoveEffect(0)).unwrap();
        engine.pull(&mut period);
        assert_eq!(0, engine.chain().len());
        assert_eq!(1, handle.collect_garbage());
    }

    #[test]
    fn test_add_effect_at_runtime() {
        let (mut engine, handle) = engine(&config());
        let context = config().effect_context();
        handle
            .add_effect(Effect::new(Box::new(Gain::new(2.0)), context))
            .unwrap();
        handle.note_on(1, 440.0).unwrap();

        let mut period = PeriodBuffer::new(64);
        engine.pull(&mut period);
        assert_eq!(1, engine.chain().len());
        assert!(period.iter().all(|f| (f[0] - 1.0).abs() < 1e-6));
        assert_eq!(0, handle.collect_garbage());
    }

    #[test]
    fn test_master_gain_is_shared() {
        let config = config();
        let (engine, handle) = engine(&config);
        assert_eq!(1.0, engine.master_gain());
        handle.set_master_gain(0.25);
        assert_eq!(0.25, engine.master_gain());
    }

    #[test]
    fn test_monitored_capture_is_mixed() {
        let config = config().with_monitor_input(true);
        let handle = EngineHandle::new();
        let ring = Arc::new(CaptureRing::new(256));
        let mut engine = SamplerEngine::new(&config, player(), &handle)
            .unwrap()
            .with_capture(Some(ring.clone()));

        ring.write(&[[0.125, -0.125]; 64]);
        let mut period = PeriodBuffer::new(64);
        engine.pull(&mut period);
        assert!(period.iter().all(|f| *f == [0.125, -0.125]));
        assert_eq!(0, ring.available());

        handle.send(Command::SetMonitorInput(false)).unwrap();
        ring.write(&[[0.125, -0.125]; 64]);
        engine.pull(&mut period);
        assert!(period.is_silent());
        assert_eq!(0, ring.available());
    }

    #[test]
    fn test_queue_full() {
        let handle = EngineHandle::new();
        for _ in 0..COMMAND_QUEUE_CAPACITY {
            handle.note_off(1).unwrap();
        }
        assert!(matches!(handle.note_off(1), Err(EngineError::QueueFull)));
    }
}
