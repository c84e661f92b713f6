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
//! Auto-quit gating: an effect whose output stays below its gate for long
//! enough stops being processed until new input arrives.

use serde::{Deserialize, Serialize};

use crate::audio::Frame;

/// Summarizes one period of output as a single level.
pub type GateLevelFn = fn(&[Frame]) -> f64;

/// Mean over frames of the summed squared channel values.
pub fn mean_square_level(frames: &[Frame]) -> f64 {
    if frames.is_empty() {
        return 0.0;
    }
    let sum: f64 = frames
        .iter()
        .map(|f| (f[0] as f64).powi(2) + (f[1] as f64).powi(2))
        .sum();
    sum / frames.len() as f64
}

/// Level a period must exceed to count as audible: the gate knob squared, scaled
/// by the number of channels the effect processes.
pub fn gate_threshold(gate: f32, processors: u16) -> f64 {
    (gate as f64).powi(2) * processors.max(1) as f64
}

/// Number of quiet periods tolerated before the effect stops:
/// `1 + floor(sample_rate * decay_ms / 1000 / frames_per_period)`.
pub fn auto_quit_threshold_buffers(sample_rate: u32, decay_ms: f32, frames_per_period: usize) -> u64 {
    let decay_frames = (sample_rate as f64 * decay_ms.max(0.0) as f64 / 1000.0).floor() as u64;
    1 + decay_frames / frames_per_period.max(1) as u64
}

/// Decay time before an idle effect stops, in milliseconds or synced to tempo.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AutoQuitDecay {
    Millis(f32),
    Synced { bpm: f32, beats: f32 },
}

impl Default for AutoQuitDecay {
    fn default() -> Self {
        AutoQuitDecay::Millis(1.0)
    }
}

impl AutoQuitDecay {
    pub fn millis(&self) -> f32 {
        match *self {
            AutoQuitDecay::Millis(ms) => ms.max(0.0),
            AutoQuitDecay::Synced { bpm, beats } if bpm > 0.0 => (beats * 60_000.0 / bpm).max(0.0),
            AutoQuitDecay::Synced { .. } => 0.0,
        }
    }
}

/// Running flag plus the quiet-period counter behind it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateState {
    running: bool,
    quiet_buffer_count: u64,
    auto_quit_threshold_buffers: u64,
}

impl GateState {
    pub fn new(auto_quit_threshold_buffers: u64) -> Self {
        Self {
            running: true,
            quiet_buffer_count: 0,
            auto_quit_threshold_buffers: auto_quit_threshold_buffers.max(1),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn quiet_buffer_count(&self) -> u64 {
        self.quiet_buffer_count
    }

    pub fn auto_quit_threshold_buffers(&self) -> u64 {
        self.auto_quit_threshold_buffers
    }

    pub fn set_auto_quit_threshold_buffers(&mut self, buffers: u64) {
        self.auto_quit_threshold_buffers = buffers.max(1);
    }

    /// Arms the effect for the next period.
    pub fn start_running(&mut self) {
        self.quiet_buffer_count = 0;
        self.running = true;
    }

    pub fn stop_running(&mut self) {
        self.running = false;
    }

    /// Feeds one period's level. The effect stops once the threshold number of
    /// consecutive quiet periods has been seen.
    pub fn check(&mut self, level: f64, threshold: f64) {
        if level - threshold <= f64::from(f32::EPSILON) {
            self.quiet_buffer_count += 1;
            if self.quiet_buffer_count >= self.auto_quit_threshold_buffers {
                self.running = false;
                self.quiet_buffer_count = 0;
            }
        } else {
            self.quiet_buffer_count = 0;
            self.running = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_quit_threshold() {
        assert_eq!(18, auto_quit_threshold_buffers(44100, 100.0, 256));
        assert_eq!(1, auto_quit_threshold_buffers(44100, 1.0, 256));
        assert_eq!(1, auto_quit_threshold_buffers(48000, 0.0, 64));
        assert_eq!(188, auto_quit_threshold_buffers(48000, 1000.0, 256));
    }

    #[test]
    fn test_synced_decay() {
        let decay = AutoQuitDecay::Synced {
            bpm: 120.0,
            beats: 2.0,
        };
        assert_eq!(1000.0, decay.millis());
        assert_eq!(0.0, AutoQuitDecay::Synced { bpm: 0.0, beats: 1.0 }.millis());
        assert_eq!(250.0, AutoQuitDecay::Millis(250.0).millis());
    }

    #[test]
    fn test_decay_yaml_forms() {
        let ms: AutoQuitDecay = serde_yml::from_str("100").unwrap();
        assert_eq!(AutoQuitDecay::Millis(100.0), ms);
        let synced: AutoQuitDecay = serde_yml::from_str("bpm: 90\nbeats: 4\n").unwrap();
        assert_eq!(
            AutoQuitDecay::Synced {
                bpm: 90.0,
                beats: 4.0
            },
            synced
        );
    }

    #[test]
    fn test_levels() {
        assert_eq!(0.0, mean_square_level(&[]));
        assert!((mean_square_level(&[[0.5, 0.5], [0.0, 0.0]]) - 0.25).abs() < 1e-12);
        assert!((gate_threshold(0.1, 2) - 0.02).abs() < 1e-9);
    }

    #[test]
    fn test_gate_stops_after_threshold_quiet_periods() {
        let mut gate = GateState::new(18);
        for period in 1..=17 {
            gate.check(0.0, 0.0);
            assert!(gate.is_running(), "stopped early at period {}", period);
        }
        gate.check(0.0, 0.0);
        assert!(!gate.is_running());
        assert_eq!(0, gate.quiet_buffer_count());
    }

    #[test]
    fn test_loud_period_resets_count() {
        let mut gate = GateState::new(3);
        gate.check(0.0, 0.0);
        gate.check(0.0, 0.0);
        gate.check(1.0, 0.0);
        assert_eq!(0, gate.quiet_buffer_count());
        gate.check(0.0, 0.0);
        gate.check(0.0, 0.0);
        assert!(gate.is_running());

        gate.stop_running();
        gate.start_running();
        assert!(gate.is_running());
        assert_eq!(0, gate.quiet_buffer_count());
    }
}
