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
use super::period::{PeriodBuffer, CHANNELS};

/// The single entry point a device driver uses to get audio from the engine.
///
/// All methods are called from the device callback thread. The scalar accessors
/// are sampled once per period.
pub trait AudioEngine: Send {
    fn frames_per_period(&self) -> usize;

    fn sample_rate(&self) -> u32;

    fn channel_count(&self) -> usize {
        CHANNELS
    }

    fn master_gain(&self) -> f32;

    /// Renders the next period into `period`. Returns the number of frames
    /// produced: 0 signals end of stream or underrun, anything else means the
    /// whole period was filled.
    fn pull(&mut self, period: &mut PeriodBuffer) -> usize;
}

impl<E: AudioEngine + ?Sized> AudioEngine for Box<E> {
    fn frames_per_period(&self) -> usize {
        (**self).frames_per_period()
    }

    fn sample_rate(&self) -> u32 {
        (**self).sample_rate()
    }

    fn channel_count(&self) -> usize {
        (**self).channel_count()
    }

    fn master_gain(&self) -> f32 {
        (**self).master_gain()
    }

    fn pull(&mut self, period: &mut PeriodBuffer) -> usize {
        (**self).pull(period)
    }
}
