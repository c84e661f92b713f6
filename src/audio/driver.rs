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
//! The device side of the pull model. A driver owns the engine and is invoked
//! by the platform with buffers whose size has nothing to do with the engine's
//! period, so it keeps a cursor into the most recently pulled period.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::engine::AudioEngine;
use super::format::{map_channel, SampleEncoding};
use super::period::PeriodBuffer;

/// Whether the driver pulls from the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PlayState {
    Stopped = 0,
    Playing = 1,
    Paused = 2,
}

impl PlayState {
    fn from_u8(value: u8) -> PlayState {
        match value {
            1 => PlayState::Playing,
            2 => PlayState::Paused,
            _ => PlayState::Stopped,
        }
    }
}

impl fmt::Display for PlayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PlayState::Stopped => "stopped",
            PlayState::Playing => "playing",
            PlayState::Paused => "paused",
        };
        write!(f, "{}", name)
    }
}

struct Shared {
    /// Held for the whole of every callback invocation and around every play
    /// state change.
    callback_lock: Mutex<()>,
    state: AtomicU8,
    underrun: AtomicBool,
    /// Set on stopped -> playing so the next callback starts from a fresh period.
    reset_ring: AtomicBool,
    periods: AtomicU64,
}

/// Thread-safe handle for starting, pausing and stopping a driver.
#[derive(Clone)]
pub struct DriverControl {
    shared: Arc<Shared>,
}

impl fmt::Debug for DriverControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverControl")
            .field("state", &self.state())
            .field("underrun", &self.shared.underrun.load(Ordering::Relaxed))
            .field("periods", &self.periods_pulled())
            .finish()
    }
}

impl Default for DriverControl {
    fn default() -> Self {
        Self::new()
    }
}

impl DriverControl {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                callback_lock: Mutex::new(()),
                state: AtomicU8::new(PlayState::Stopped as u8),
                underrun: AtomicBool::new(false),
                reset_ring: AtomicBool::new(false),
                periods: AtomicU64::new(0),
            }),
        }
    }

    pub fn state(&self) -> PlayState {
        PlayState::from_u8(self.shared.state.load(Ordering::Acquire))
    }

    pub fn is_playing(&self) -> bool {
        self.state() == PlayState::Playing
    }

    pub fn start(&self) {
        self.set_state(PlayState::Playing);
    }

    pub fn pause(&self) {
        self.set_state(PlayState::Paused);
    }

    pub fn stop(&self) {
        self.set_state(PlayState::Stopped);
    }

    /// Waits out any in-flight callback, then flips the state.
    fn set_state(&self, state: PlayState) {
        let _guard = self.shared.callback_lock.lock();
        let previous = PlayState::from_u8(self.shared.state.swap(state as u8, Ordering::AcqRel));
        if previous == PlayState::Stopped && state == PlayState::Playing {
            self.shared.reset_ring.store(true, Ordering::Release);
        }
    }

    /// Returns true once after the engine ran dry.
    pub fn take_underrun(&self) -> bool {
        self.shared.underrun.swap(false, Ordering::AcqRel)
    }

    /// Number of periods pulled from the engine so far.
    pub fn periods_pulled(&self) -> u64 {
        self.shared.periods.load(Ordering::Relaxed)
    }
}

/// Cursor state into the most recently pulled period.
#[derive(Debug)]
pub struct DeviceRingState {
    period: PeriodBuffer,
    /// Frames produced by the last pull.
    frames: usize,
    frame_cursor: usize,
    /// The last period in device encoding, for the byte path.
    encoded: Vec<u8>,
    encoded_len: usize,
    byte_cursor: usize,
}

impl DeviceRingState {
    fn new(frames_per_period: usize, encoding: &SampleEncoding, channels: usize) -> Self {
        Self {
            period: PeriodBuffer::new(frames_per_period),
            frames: 0,
            frame_cursor: 0,
            encoded: vec![0; encoding.buffer_len(frames_per_period, channels)],
            encoded_len: 0,
            byte_cursor: 0,
        }
    }

    fn reset(&mut self) {
        self.frames = 0;
        self.frame_cursor = 0;
        self.encoded_len = 0;
        self.byte_cursor = 0;
    }

    pub fn frame_cursor(&self) -> usize {
        self.frame_cursor
    }

    pub fn byte_cursor(&self) -> usize {
        self.byte_cursor
    }
}

/// Adapts an [`AudioEngine`] to device callbacks.
pub struct OutputDriver<E: AudioEngine> {
    engine: E,
    control: DriverControl,
    channels: usize,
    encoding: SampleEncoding,
    ring: DeviceRingState,
}

impl<E: AudioEngine> fmt::Debug for OutputDriver<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputDriver")
            .field("control", &self.control)
            .field("channels", &self.channels)
            .field("encoding", &self.encoding)
            .finish()
    }
}

impl<E: AudioEngine> OutputDriver<E> {
    /// Creates a driver for a device with `channels` output channels. The
    /// encoding only matters for [`OutputDriver::fill_bytes`].
    pub fn new(engine: E, channels: u16, encoding: SampleEncoding, control: DriverControl) -> Self {
        let channels = channels.max(1) as usize;
        let ring = DeviceRingState::new(engine.frames_per_period().max(1), &encoding, channels);
        Self {
            engine,
            control,
            channels,
            encoding,
            ring,
        }
    }

    pub fn control(&self) -> &DriverControl {
        &self.control
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn encoding(&self) -> SampleEncoding {
        self.encoding
    }

    pub fn ring(&self) -> &DeviceRingState {
        &self.ring
    }

    /// Pulls the next period. False means the engine ran dry and the driver has
    /// stopped itself.
    fn pull_period(&mut self) -> bool {
        let produced = self.engine.pull(&mut self.ring.period);
        if produced == 0 {
            self.control
                .shared
                .state
                .store(PlayState::Stopped as u8, Ordering::Release);
            self.control.shared.underrun.store(true, Ordering::Release);
            self.ring.reset();
            return false;
        }
        self.control.shared.periods.fetch_add(1, Ordering::Relaxed);
        self.ring.frames = produced.min(self.ring.period.len());
        self.ring.frame_cursor = 0;
        true
    }

    /// Returns true when the callback should pull from the engine.
    fn begin_callback(&mut self) -> bool {
        if self.control.shared.reset_ring.swap(false, Ordering::AcqRel) {
            self.ring.reset();
        }
        self.control.state() == PlayState::Playing
    }

    /// Fills an interleaved device buffer of typed samples.
    pub fn fill<T>(&mut self, data: &mut [T])
    where
        T: cpal::Sample + cpal::FromSample<f32>,
    {
        let shared = Arc::clone(&self.control.shared);
        let _guard = shared.callback_lock.lock();

        if !self.begin_callback() {
            data.fill(T::EQUILIBRIUM);
            return;
        }

        let channels = self.channels;
        let total_frames = data.len() / channels;
        let mut written = 0;
        while written < total_frames {
            if self.ring.frame_cursor >= self.ring.frames && !self.pull_period() {
                data[written * channels..].fill(T::EQUILIBRIUM);
                return;
            }

            let gain = self.engine.master_gain();
            let count = (self.ring.frames - self.ring.frame_cursor).min(total_frames - written);
            let source = &self.ring.period[self.ring.frame_cursor..self.ring.frame_cursor + count];
            let dest = &mut data[written * channels..(written + count) * channels];
            for (frame, out) in source.iter().zip(dest.chunks_exact_mut(channels)) {
                for (ch, sample) in out.iter_mut().enumerate() {
                    *sample = T::from_sample(map_channel(frame, ch, channels) * gain);
                }
            }

            written += count;
            self.ring.frame_cursor += count;
            if self.ring.frame_cursor >= self.ring.frames {
                self.ring.frame_cursor = self.ring.frames;
            }
        }
        data[total_frames * channels..].fill(T::EQUILIBRIUM);
    }

    /// Fills a raw device buffer in the driver's sample encoding. The request
    /// may end in the middle of a frame; the remainder is delivered next call.
    pub fn fill_bytes(&mut self, data: &mut [u8]) {
        let shared = Arc::clone(&self.control.shared);
        let _guard = shared.callback_lock.lock();

        if !self.begin_callback() {
            data.fill(0);
            return;
        }

        let mut written = 0;
        while written < data.len() {
            if self.ring.byte_cursor >= self.ring.encoded_len {
                if !self.pull_period() {
                    data[written..].fill(0);
                    return;
                }
                let gain = self.engine.master_gain();
                let frames = &self.ring.period[..self.ring.frames];
                self.ring.encoded_len =
                    self.encoding
                        .encode(frames, gain, self.channels, &mut self.ring.encoded);
                self.ring.byte_cursor = 0;
                self.ring.frame_cursor = self.ring.frames;
            }

            let count = (self.ring.encoded_len - self.ring.byte_cursor).min(data.len() - written);
            data[written..written + count].copy_from_slice(
                &self.ring.encoded[self.ring.byte_cursor..self.ring.byte_cursor + count],
            );
            written += count;
            self.ring.byte_cursor += count;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use rand::Rng;

    use super::*;
    use crate::audio::{Endianness, SampleFormat, SILENCE};

    /// Emits a running sample counter on both channels.
    struct CounterEngine {
        frames_per_period: usize,
        next: u32,
        periods_left: Option<usize>,
        pulls: Arc<AtomicUsize>,
        gain: f32,
    }

    impl CounterEngine {
        fn new(frames_per_period: usize) -> Self {
            Self {
                frames_per_period,
                next: 1,
                periods_left: None,
                pulls: Arc::new(AtomicUsize::new(0)),
                gain: 1.0,
            }
        }
    }

    impl AudioEngine for CounterEngine {
        fn frames_per_period(&self) -> usize {
            self.frames_per_period
        }

        fn sample_rate(&self) -> u32 {
            44100
        }

        fn master_gain(&self) -> f32 {
            self.gain
        }

        fn pull(&mut self, period: &mut PeriodBuffer) -> usize {
            self.pulls.fetch_add(1, Ordering::Relaxed);
            if let Some(left) = self.periods_left.as_mut() {
                if *left == 0 {
                    return 0;
                }
                *left -= 1;
            }
            for frame in period.iter_mut() {
                *frame = [self.next as f32, self.next as f32];
                self.next += 1;
            }
            period.len()
        }
    }

    fn new_driver(engine: CounterEngine, channels: u16) -> OutputDriver<CounterEngine> {
        OutputDriver::new(engine, channels, SampleEncoding::default(), DriverControl::new())
    }

    #[test]
    fn test_stopped_driver_never_pulls() {
        let engine = CounterEngine::new(64);
        let pulls = engine.pulls.clone();
        let mut driver = new_driver(engine, 2);

        let mut data = vec![1.0f32; 300];
        driver.fill(&mut data);
        assert!(data.iter().all(|s| *s == 0.0));
        assert_eq!(0, pulls.load(Ordering::Relaxed));

        driver.control().pause();
        let mut bytes = vec![7u8; 33];
        driver.fill_bytes(&mut bytes);
        assert!(bytes.iter().all(|b| *b == 0));
        assert_eq!(0, pulls.load(Ordering::Relaxed));
    }

    #[test]
    fn test_odd_requests_span_periods_without_loss() {
        let mut driver = new_driver(CounterEngine::new(64), 2);
        driver.control().start();

        let mut rng = rand::thread_rng();
        let mut expected = 1.0f32;
        for _ in 0..200 {
            let frames = rng.gen_range(1..=150);
            let mut data = vec![0.0f32; frames * 2];
            driver.fill(&mut data);
            for frame in data.chunks_exact(2) {
                assert_eq!(expected, frame[0]);
                assert_eq!(expected, frame[1]);
                expected += 1.0;
            }
        }
        assert_eq!(driver.control().periods_pulled(), ((expected as u64 - 1) + 63) / 64);
    }

    #[test]
    fn test_byte_requests_split_inside_frames() {
        let encoding = SampleEncoding::new(SampleFormat::Float, 32, Endianness::Big).unwrap();
        let mut driver = OutputDriver::new(CounterEngine::new(48), 2, encoding, DriverControl::new());
        driver.control().start();

        let mut rng = rand::thread_rng();
        let mut stream = Vec::new();
        while stream.len() < 48 * 8 * 20 {
            let mut data = vec![0u8; rng.gen_range(1..=500)];
            driver.fill_bytes(&mut data);
            stream.extend_from_slice(&data);
        }

        let samples: Vec<f32> = stream
            .chunks_exact(4)
            .map(|b| f32::from_be_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        for (i, pair) in samples.chunks_exact(2).enumerate() {
            assert_eq!((i + 1) as f32, pair[0]);
            assert_eq!((i + 1) as f32, pair[1]);
        }
    }

    #[test]
    fn test_master_gain_applied_on_copy() {
        let mut engine = CounterEngine::new(16);
        engine.gain = 0.5;
        let mut driver = new_driver(engine, 2);
        driver.control().start();

        let mut data = vec![0.0f32; 8];
        driver.fill(&mut data);
        assert_eq!(vec![0.5, 0.5, 1.0, 1.0, 1.5, 1.5, 2.0, 2.0], data);

        driver.engine_mut().gain = 2.0;
        driver.fill(&mut data);
        assert_eq!(vec![10.0, 10.0, 12.0, 12.0, 14.0, 14.0, 16.0, 16.0], data);
    }

    #[test]
    fn test_underrun_stops_and_fills_silence() {
        let mut engine = CounterEngine::new(32);
        engine.periods_left = Some(1);
        let pulls = engine.pulls.clone();
        let mut driver = new_driver(engine, 2);
        driver.control().start();

        let mut data = vec![9.0f32; 100 * 2];
        driver.fill(&mut data);
        assert_eq!(32.0, data[31 * 2]);
        assert!(data[32 * 2..].iter().all(|s| *s == 0.0));
        assert_eq!(PlayState::Stopped, driver.control().state());
        assert!(driver.control().take_underrun());
        assert!(!driver.control().take_underrun());

        let before = pulls.load(Ordering::Relaxed);
        driver.fill(&mut data);
        assert_eq!(before, pulls.load(Ordering::Relaxed));
    }

    #[test]
    fn test_pause_keeps_position() {
        let mut driver = new_driver(CounterEngine::new(16), 2);
        driver.control().start();

        let mut data = vec![0.0f32; 10];
        driver.fill(&mut data);
        assert_eq!(5.0, data[8]);

        driver.control().pause();
        driver.fill(&mut data);
        assert!(data.iter().all(|s| *s == 0.0));

        driver.control().start();
        driver.fill(&mut data);
        assert_eq!(6.0, data[0]);

        // Stop then start discards the rest of the period.
        driver.control().stop();
        driver.control().start();
        driver.fill(&mut data);
        assert_eq!(17.0, data[0]);
        assert_eq!(5, driver.ring().frame_cursor());
    }

    #[test]
    fn test_channel_mapping() {
        let mut driver = new_driver(CounterEngine::new(8), 1);
        driver.control().start();
        let mut mono = vec![0i16; 3];
        driver.fill(&mut mono);
        assert!(mono.iter().all(|s| *s == i16::MAX));

        let mut driver = new_driver(CounterEngine::new(8), 4);
        driver.control().start();
        let mut quad = vec![0.0f32; 8];
        driver.fill(&mut quad);
        assert_eq!(vec![1.0, 1.0, 0.0, 0.0, 2.0, 2.0, 0.0, 0.0], quad);
        assert_eq!(SILENCE, [quad[2], quad[3]]);
    }
}
