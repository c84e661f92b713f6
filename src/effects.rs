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
//! Effect processing: the per-effect contract, auto-quit gating and chains.

mod chain;
mod effect;
mod gate;
mod native;

pub use chain::EffectChain;
pub use effect::{Dsp, Effect, EffectContext};
pub use gate::{
    auto_quit_threshold_buffers, gate_threshold, mean_square_level, AutoQuitDecay, GateLevelFn,
    GateState,
};
pub use native::{Bitcrush, Echo, Gain};
