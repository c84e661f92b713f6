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
//! Real-time sample playback and effect rendering with a pull-based device driver.
//!
//! The audio thread pulls one period at a time from an [`audio::AudioEngine`].
//! [`engine::SamplerEngine`] renders note voices through a [`samples::SamplePlayer`],
//! runs the result through an [`effects::EffectChain`] and hands the period to
//! the [`audio::OutputDriver`], which slices it into whatever request sizes the
//! device asks for.

pub mod audio;
pub mod config;
pub mod effects;
pub mod engine;
pub mod resample;
pub mod samples;
pub mod util;

#[cfg(test)]
mod test;
