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
use std::{fmt, str::FromStr};

use super::error::DeviceError;
use super::period::Frame;

/// Sample format enumeration for device output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    /// Integer samples (16 or 32 bit).
    Int,
    /// Floating point samples (32 bit).
    Float,
}

impl FromStr for SampleFormat {
    type Err = DeviceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "float" | "Float" => Ok(SampleFormat::Float),
            "int" | "Int" => Ok(SampleFormat::Int),
            _ => Err(DeviceError::UnsupportedFormat(format!(
                "unsupported sample format: {}",
                s
            ))),
        }
    }
}

impl SampleFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            SampleFormat::Float => "float",
            SampleFormat::Int => "int",
        }
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endianness {
    Little,
    Big,
}

impl Endianness {
    pub const fn native() -> Self {
        if cfg!(target_endian = "big") {
            Endianness::Big
        } else {
            Endianness::Little
        }
    }
}

/// How samples are laid out in a device byte buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleEncoding {
    pub sample_format: SampleFormat,
    pub bits_per_sample: u16,
    pub endianness: Endianness,
}

impl Default for SampleEncoding {
    /// The engine's own representation: 32-bit float in system byte order.
    fn default() -> Self {
        Self {
            sample_format: SampleFormat::Float,
            bits_per_sample: 32,
            endianness: Endianness::native(),
        }
    }
}

impl fmt::Display for SampleEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let endian = match self.endianness {
            Endianness::Little => "le",
            Endianness::Big => "be",
        };
        write!(f, "{}{}{}", self.sample_format, self.bits_per_sample, endian)
    }
}

impl SampleEncoding {
    pub fn new(
        sample_format: SampleFormat,
        bits_per_sample: u16,
        endianness: Endianness,
    ) -> Result<Self, DeviceError> {
        match (sample_format, bits_per_sample) {
            (SampleFormat::Float, 32) | (SampleFormat::Int, 16) | (SampleFormat::Int, 32) => {
                Ok(Self {
                    sample_format,
                    bits_per_sample,
                    endianness,
                })
            }
            _ => Err(DeviceError::UnsupportedFormat(format!(
                "{} at {} bits",
                sample_format, bits_per_sample
            ))),
        }
    }

    pub fn bytes_per_sample(&self) -> usize {
        self.bits_per_sample as usize / 8
    }

    /// True when frames can go to the device without conversion.
    pub fn is_native_float(&self) -> bool {
        *self == Self::default()
    }

    pub fn to_cpal(&self) -> cpal::SampleFormat {
        match (self.sample_format, self.bits_per_sample) {
            (SampleFormat::Int, 16) => cpal::SampleFormat::I16,
            (SampleFormat::Int, _) => cpal::SampleFormat::I32,
            (SampleFormat::Float, _) => cpal::SampleFormat::F32,
        }
    }

    /// Maps a cpal stream format onto an encoding in system byte order.
    pub fn from_cpal(format: cpal::SampleFormat) -> Option<Self> {
        let (sample_format, bits) = match format {
            cpal::SampleFormat::F32 => (SampleFormat::Float, 32),
            cpal::SampleFormat::I16 => (SampleFormat::Int, 16),
            cpal::SampleFormat::I32 => (SampleFormat::Int, 32),
            _ => return None,
        };
        Self::new(sample_format, bits, Endianness::native()).ok()
    }

    /// Bytes needed for `frames` frames on a device with `channels` channels.
    pub fn buffer_len(&self, frames: usize, channels: usize) -> usize {
        frames * channels * self.bytes_per_sample()
    }

    /// Encodes `frames` with `gain` applied into `out`, mapping the stereo pair
    /// onto `channels` device channels. Returns the number of bytes written;
    /// frames that do not fit are dropped.
    pub fn encode(&self, frames: &[Frame], gain: f32, channels: usize, out: &mut [u8]) -> usize {
        let width = self.bytes_per_sample();
        let frame_bytes = width * channels;
        if frame_bytes == 0 {
            return 0;
        }
        let count = frames.len().min(out.len() / frame_bytes);
        let mut offset = 0;
        for frame in &frames[..count] {
            for ch in 0..channels {
                let sample = map_channel(frame, ch, channels) * gain;
                self.write_sample(sample, &mut out[offset..offset + width]);
                offset += width;
            }
        }
        offset
    }

    #[inline]
    fn write_sample(&self, sample: f32, out: &mut [u8]) {
        let little = self.endianness == Endianness::Little;
        match (self.sample_format, self.bits_per_sample) {
            (SampleFormat::Int, 16) => {
                let v = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
                out.copy_from_slice(&if little { v.to_le_bytes() } else { v.to_be_bytes() });
            }
            (SampleFormat::Int, _) => {
                let v = (sample.clamp(-1.0, 1.0) as f64 * i32::MAX as f64) as i32;
                out.copy_from_slice(&if little { v.to_le_bytes() } else { v.to_be_bytes() });
            }
            (SampleFormat::Float, _) => {
                out.copy_from_slice(&if little {
                    sample.to_le_bytes()
                } else {
                    sample.to_be_bytes()
                });
            }
        }
    }
}

/// Sample for device channel `ch`. Mono devices get the average, extra
/// channels beyond the stereo pair are silent.
#[inline]
pub fn map_channel(frame: &Frame, ch: usize, channels: usize) -> f32 {
    match (channels, ch) {
        (1, _) => (frame[0] + frame[1]) * 0.5,
        (_, 0) => frame[0],
        (_, 1) => frame[1],
        _ => 0.0,
    }
}
