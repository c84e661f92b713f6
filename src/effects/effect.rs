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
//! The contract around one DSP unit: enable toggle, auto-quit gating, wet/dry
//! blend and bridging to a fixed internal sample rate.

use std::fmt;

use tracing::warn;

use super::gate::{
    auto_quit_threshold_buffers, gate_threshold, mean_square_level, AutoQuitDecay, GateLevelFn,
    GateState,
};
use crate::audio::{is_silent, Frame, CHANNELS, SILENCE};
use crate::config::EffectSettings;
use crate::resample::{Quality, ResampleError, Resampler, CHUNK_FRAMES};

/// A DSP function that processes a block of frames in place.
pub trait Dsp: Send {
    fn name(&self) -> &str;

    fn process(&mut self, frames: &mut [Frame], sample_rate: u32);

    /// The rate this DSP must run at, if it cannot follow the engine's.
    fn fixed_sample_rate(&self) -> Option<u32> {
        None
    }

    /// False when the unit failed to initialize and must never be run.
    fn is_okay(&self) -> bool {
        true
    }

    /// Clears internal state such as delay lines.
    fn reset(&mut self) {}
}

/// Engine-wide parameters an effect is built against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EffectContext {
    pub sample_rate: u32,
    pub frames_per_period: usize,
    /// Run even when the gate says the output has decayed.
    pub keep_running: bool,
}

/// Carries periods to and from a DSP that runs at its own rate.
struct RateBridge {
    internal_rate: u32,
    /// Silence queued on the return path.
    primed: usize,
    down: Resampler,
    up: Resampler,
    internal: Vec<Frame>,
    /// Ring holding the dry signal back by the round trip through the DSP.
    dry_delay: Vec<Frame>,
    dry_pos: usize,
}

impl RateBridge {
    fn new(engine_rate: u32, internal_rate: u32, frames_per_period: usize) -> Result<Self, ResampleError> {
        let down = Resampler::with_rates(Quality::Linear, engine_rate, internal_rate)?;
        let mut up = Resampler::with_rates(Quality::Linear, internal_rate, engine_rate)?;

        // Both directions hold back up to a chunk of input. Priming the return
        // path with that much silence keeps a full period available every call.
        let ratio = engine_rate as f64 / internal_rate as f64;
        let primed = frames_per_period + CHUNK_FRAMES + (CHUNK_FRAMES as f64 * ratio).ceil() as usize;
        up.prime(primed);

        // Filter delays of both directions, in engine frames.
        let round_trip =
            primed + up.output_delay() + (down.output_delay() as f64 * ratio).round() as usize;

        let internal_len = (frames_per_period as f64 / ratio).ceil() as usize + 2 * CHUNK_FRAMES;
        Ok(Self {
            internal_rate,
            primed,
            down,
            up,
            internal: vec![SILENCE; internal_len],
            dry_delay: vec![SILENCE; round_trip],
            dry_pos: 0,
        })
    }

    /// Frames between a period entering the bridge and leaving it.
    fn latency(&self) -> usize {
        self.dry_delay.len()
    }

    fn reset(&mut self) {
        self.down.reset();
        self.up.reset();
        self.up.prime(self.primed);
        self.dry_delay.fill(SILENCE);
        self.dry_pos = 0;
    }

    /// Swaps `dry` through the delay ring so it lines up with the wet output.
    fn delay_dry(&mut self, dry: &mut [Frame]) {
        let len = self.dry_delay.len();
        if len == 0 {
            return;
        }
        for frame in dry {
            std::mem::swap(frame, &mut self.dry_delay[self.dry_pos]);
            self.dry_pos = (self.dry_pos + 1) % len;
        }
    }

    fn process(&mut self, dsp: &mut dyn Dsp, frames: &mut [Frame]) {
        self.down.push(frames);
        let n = self.down.drain(&mut self.internal);
        dsp.process(&mut self.internal[..n], self.internal_rate);
        self.up.push(&self.internal[..n]);
        let got = self.up.drain(frames);
        frames[got..].fill(SILENCE);
    }
}

/// One effect slot.
pub struct Effect {
    dsp: Box<dyn Dsp>,
    enabled: bool,
    okay: bool,
    keep_running: bool,
    wet: f32,
    gate: f32,
    decay: AutoQuitDecay,
    processors: u16,
    gate_state: GateState,
    level_fn: GateLevelFn,
    context: EffectContext,
    dry: Vec<Frame>,
    bridge: Option<RateBridge>,
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("dsp", &self.dsp.name())
            .field("enabled", &self.enabled)
            .field("okay", &self.okay)
            .field("running", &self.gate_state.is_running())
            .field("wet", &self.wet)
            .field("gate", &self.gate)
            .field("bridged", &self.bridge.is_some())
            .finish()
    }
}

impl Effect {
    /// Wraps `dsp` for the given engine context. Allocates everything the
    /// effect needs, so this belongs on the control thread.
    pub fn new(dsp: Box<dyn Dsp>, context: EffectContext) -> Self {
        let mut okay = dsp.is_okay();
        let bridge = match dsp.fixed_sample_rate() {
            Some(rate) if rate != context.sample_rate => {
                match RateBridge::new(context.sample_rate, rate, context.frames_per_period) {
                    Ok(bridge) => Some(bridge),
                    Err(e) => {
                        warn!(
                            effect = dsp.name(),
                            error = %e,
                            internal_rate = rate,
                            "Effect cannot bridge to its internal rate, disabling"
                        );
                        okay = false;
                        None
                    }
                }
            }
            _ => None,
        };

        let decay = AutoQuitDecay::default();
        Self {
            dsp,
            enabled: true,
            okay,
            keep_running: context.keep_running,
            wet: 1.0,
            gate: 0.0,
            decay,
            processors: CHANNELS as u16,
            gate_state: GateState::new(auto_quit_threshold_buffers(
                context.sample_rate,
                decay.millis(),
                context.frames_per_period,
            )),
            level_fn: mean_square_level,
            context,
            dry: vec![SILENCE; context.frames_per_period],
            bridge,
        }
    }

    /// Wraps `dsp` and applies persisted settings.
    pub fn with_settings(dsp: Box<dyn Dsp>, context: EffectContext, settings: &EffectSettings) -> Self {
        let mut effect = Self::new(dsp, context);
        effect.apply_settings(settings);
        effect
    }

    pub fn apply_settings(&mut self, settings: &EffectSettings) {
        self.set_enabled(settings.enabled());
        self.set_wet(settings.wet());
        self.set_gate(settings.gate());
        self.set_decay(settings.decay());
    }

    pub fn settings(&self) -> EffectSettings {
        EffectSettings::new(self.enabled, self.wet, self.gate, self.decay)
    }

    pub fn name(&self) -> &str {
        self.dsp.name()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_okay(&self) -> bool {
        self.okay
    }

    pub fn is_running(&self) -> bool {
        self.gate_state.is_running()
    }

    pub fn keep_running(&self) -> bool {
        self.keep_running
    }

    /// Process every period regardless of the gate.
    pub fn set_keep_running(&mut self, keep_running: bool) {
        self.keep_running = keep_running;
    }

    pub fn wet(&self) -> f32 {
        self.wet
    }

    pub fn set_wet(&mut self, wet: f32) {
        self.wet = wet.clamp(0.0, 1.0);
    }

    pub fn gate(&self) -> f32 {
        self.gate
    }

    pub fn set_gate(&mut self, gate: f32) {
        self.gate = gate.clamp(0.0, 1.0);
    }

    pub fn decay(&self) -> AutoQuitDecay {
        self.decay
    }

    pub fn set_decay(&mut self, decay: AutoQuitDecay) {
        self.decay = decay;
        self.gate_state
            .set_auto_quit_threshold_buffers(auto_quit_threshold_buffers(
                self.context.sample_rate,
                decay.millis(),
                self.context.frames_per_period,
            ));
    }

    /// Number of channels the DSP runs on, scales the gate threshold.
    pub fn set_processors(&mut self, processors: u16) {
        self.processors = processors.max(1);
    }

    /// Replaces the function that summarizes a period for the gate.
    pub fn set_gate_level_fn(&mut self, level_fn: GateLevelFn) {
        self.level_fn = level_fn;
    }

    pub fn gate_state(&self) -> &GateState {
        &self.gate_state
    }

    pub fn start_running(&mut self) {
        self.gate_state.start_running();
    }

    /// Frames the wet output trails the input by, 0 unless the DSP runs at its
    /// own rate. The dry signal is delayed to match.
    pub fn latency(&self) -> usize {
        self.bridge.as_ref().map_or(0, |bridge| bridge.latency())
    }

    /// Runs the effect on `frames` in place. Returns whether the effect is still
    /// running afterwards. Disabled, broken or auto-bypassed effects leave the
    /// frames untouched.
    pub fn process(&mut self, frames: &mut [Frame]) -> bool {
        if !self.enabled || !self.okay {
            return false;
        }
        if !self.gate_state.is_running() && !is_silent(frames) {
            self.gate_state.start_running();
        }
        if !self.gate_state.is_running() && !self.keep_running {
            return false;
        }

        let len = frames.len().min(self.dry.len());
        let frames = &mut frames[..len];
        self.dry[..len].copy_from_slice(frames);

        match self.bridge.as_mut() {
            Some(bridge) => {
                bridge.delay_dry(&mut self.dry[..len]);
                bridge.process(self.dsp.as_mut(), frames);
            }
            None => self.dsp.process(frames, self.context.sample_rate),
        }

        let wet = self.wet;
        let dry_gain = 1.0 - wet;
        for (out, dry) in frames.iter_mut().zip(self.dry.iter()) {
            out[0] = dry[0] * dry_gain + out[0] * wet;
            out[1] = dry[1] * dry_gain + out[1] * wet;
        }

        if !self.keep_running {
            let level = (self.level_fn)(frames);
            self.gate_state
                .check(level, gate_threshold(self.gate, self.processors));
        }
        self.gate_state.is_running()
    }

    /// Drops DSP state and re-arms the gate.
    pub fn reset(&mut self) {
        self.dsp.reset();
        self.gate_state.start_running();
        if let Some(bridge) = self.bridge.as_mut() {
            bridge.reset();
        }
    }
}
