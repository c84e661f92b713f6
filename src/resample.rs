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
//! Sample-rate conversion between blocks of stereo frames.
//!
//! A [`Resampler`] keeps its filter state across calls so a stream can be fed
//! incrementally. It either pulls input on demand through a closure (playback
//! cursors) or accepts pushed input and buffers the output (effect bridging).
//! [`convert_block`] handles one-shot conversion of a whole block.

use std::{fmt, str::FromStr};

use rubato::Resampler as _;
use rubato::{
    FastFixedIn, PolynomialDegree, SincFixedIn, SincInterpolationParameters,
    SincInterpolationType, WindowFunction,
};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::audio::{Frame, CHANNELS, SILENCE};

/// Input block size handed to rubato on each streaming step.
pub const CHUNK_FRAMES: usize = 64;

/// How far the ratio may drift from its initial value before the resampler is rebuilt.
const MAX_RATIO_RELATIVE: f64 = 8.0;

/// The FIFO is compacted once this many frames have been read from its front.
const COMPACT_THRESHOLD: usize = 4096;

#[derive(Debug, thiserror::Error)]
pub enum ResampleError {
    #[error("invalid resampling ratio {0}")]
    InvalidRatio(f64),

    #[error("invalid sample rates {source_rate}Hz -> {target_rate}Hz")]
    InvalidRates { source_rate: u32, target_rate: u32 },

    #[error("failed to construct resampler: {0}")]
    Construction(#[from] rubato::ResamplerConstructionError),

    #[error("resampling failed: {0}")]
    Process(#[from] rubato::ResampleError),
}

/// Interpolation quality. Point and linear use polynomial interpolation, sinc uses
/// a windowed sinc filter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    Point,
    #[default]
    Linear,
    Sinc,
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Quality::Point => "point",
            Quality::Linear => "linear",
            Quality::Sinc => "sinc",
        })
    }
}

impl FromStr for Quality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "point" | "nearest" | "none" => Ok(Quality::Point),
            "linear" => Ok(Quality::Linear),
            "sinc" => Ok(Quality::Sinc),
            _ => Err(format!("unsupported resample quality: {}", s)),
        }
    }
}

/// The rubato resampler behind a [`Resampler`].
enum Inner {
    Fast(FastFixedIn<f32>),
    Sinc(Box<SincFixedIn<f32>>),
}

macro_rules! with_inner {
    ($inner:expr, $r:ident => $body:expr) => {
        match $inner {
            Inner::Fast($r) => $body,
            Inner::Sinc($r) => $body,
        }
    };
}

impl Inner {
    fn build(quality: Quality, ratio: f64, chunk_frames: usize) -> Result<Self, ResampleError> {
        if !ratio.is_finite() || ratio <= 0.0 {
            return Err(ResampleError::InvalidRatio(ratio));
        }
        Ok(match quality {
            Quality::Point => Inner::Fast(FastFixedIn::<f32>::new(
                ratio,
                MAX_RATIO_RELATIVE,
                PolynomialDegree::Nearest,
                chunk_frames,
                CHANNELS,
            )?),
            Quality::Linear => Inner::Fast(FastFixedIn::<f32>::new(
                ratio,
                MAX_RATIO_RELATIVE,
                PolynomialDegree::Linear,
                chunk_frames,
                CHANNELS,
            )?),
            Quality::Sinc => {
                let params = SincInterpolationParameters {
                    sinc_len: 128,
                    f_cutoff: 0.95,
                    oversampling_factor: 128,
                    interpolation: SincInterpolationType::Linear,
                    window: WindowFunction::BlackmanHarris2,
                };
                Inner::Sinc(Box::new(SincFixedIn::<f32>::new(
                    ratio,
                    MAX_RATIO_RELATIVE,
                    params,
                    chunk_frames,
                    CHANNELS,
                )?))
            }
        })
    }

    fn input_frames_next(&self) -> usize {
        with_inner!(self, r => r.input_frames_next())
    }

    fn output_frames_next(&self) -> usize {
        with_inner!(self, r => r.output_frames_next())
    }

    fn output_delay(&self) -> usize {
        with_inner!(self, r => r.output_delay())
    }

    fn output_buffer(&self) -> Vec<Vec<f32>> {
        with_inner!(self, r => r.output_buffer_allocate(true))
    }

    fn set_ratio(&mut self, ratio: f64) -> Result<(), rubato::ResampleError> {
        with_inner!(self, r => r.set_resample_ratio(ratio, false))
    }

    fn reset(&mut self) {
        with_inner!(self, r => r.reset())
    }

    fn process(
        &mut self,
        input: &[Vec<f32>],
        output: &mut [Vec<f32>],
    ) -> Result<(usize, usize), rubato::ResampleError> {
        with_inner!(self, r => r.process_into_buffer(input, output, None))
    }

    /// Processes a short final block, or zeros when `input` is None.
    fn process_partial(
        &mut self,
        input: Option<&[Vec<f32>]>,
        output: &mut [Vec<f32>],
    ) -> Result<(usize, usize), rubato::ResampleError> {
        with_inner!(self, r => r.process_partial_into_buffer(input, output, None))
    }
}

/// Sliding-window input buffer (planar).
struct PlanarInputBuffer {
    channels: Vec<Vec<f32>>,
}

impl PlanarInputBuffer {
    fn with_capacity(frames: usize) -> Self {
        Self {
            channels: (0..CHANNELS).map(|_| Vec::with_capacity(frames)).collect(),
        }
    }

    fn len(&self) -> usize {
        self.channels.first().map(|c| c.len()).unwrap_or(0)
    }

    fn push_frames(&mut self, frames: &[Frame]) {
        for (ch_idx, ch) in self.channels.iter_mut().enumerate() {
            ch.extend(frames.iter().map(|f| f[ch_idx]));
        }
    }

    fn drain_frames(&mut self, n: usize) {
        for ch in &mut self.channels {
            ch.drain(0..n.min(ch.len()));
        }
    }

    fn clear(&mut self) {
        for ch in &mut self.channels {
            ch.clear();
        }
    }
}

/// Planar FIFO of converted frames waiting to be read.
struct PlanarOutputFifo {
    channels: Vec<Vec<f32>>,
    read_pos: usize,
}

impl PlanarOutputFifo {
    fn with_capacity(frames: usize) -> Self {
        Self {
            channels: (0..CHANNELS).map(|_| Vec::with_capacity(frames)).collect(),
            read_pos: 0,
        }
    }

    fn available_frames(&self) -> usize {
        self.channels
            .first()
            .map(|c| c.len().saturating_sub(self.read_pos))
            .unwrap_or(0)
    }

    fn push_planar(&mut self, per_channel: &[Vec<f32>], num_frames: usize) {
        for (ch_idx, ch) in self.channels.iter_mut().enumerate() {
            if let Some(src) = per_channel.get(ch_idx) {
                ch.extend_from_slice(&src[..num_frames.min(src.len())]);
            }
        }
    }

    fn push_silence(&mut self, num_frames: usize) {
        for ch in &mut self.channels {
            ch.resize(ch.len() + num_frames, 0.0);
        }
    }

    /// Interleaves up to `out.len()` frames into `out`, returns the count written.
    fn drain_into(&mut self, out: &mut [Frame]) -> usize {
        let to_copy = self.available_frames().min(out.len());
        for (i, frame) in out[..to_copy].iter_mut().enumerate() {
            for (ch_idx, sample) in frame.iter_mut().enumerate() {
                *sample = self.channels[ch_idx][self.read_pos + i];
            }
        }
        self.read_pos += to_copy;

        if self.available_frames() == 0 {
            self.clear();
        } else if self.read_pos > COMPACT_THRESHOLD {
            for ch in &mut self.channels {
                ch.drain(..self.read_pos);
            }
            self.read_pos = 0;
        }
        to_copy
    }

    fn clear(&mut self) {
        for ch in &mut self.channels {
            ch.clear();
        }
        self.read_pos = 0;
    }
}

/// Streaming stereo resampler with persistent filter state.
pub struct Resampler {
    inner: Inner,
    quality: Quality,
    ratio: f64,
    /// Output frames of filter delay still owed after the source ended.
    tail: usize,
    /// Input was pulled since the source last ended.
    fed: bool,
    input: PlanarInputBuffer,
    output: PlanarOutputFifo,
    /// Reused rubato output buffer.
    scratch: Vec<Vec<f32>>,
    /// Reused interleaved buffer the pull closure fills.
    feed: Vec<Frame>,
}

impl fmt::Debug for Resampler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resampler")
            .field("quality", &self.quality)
            .field("ratio", &self.ratio)
            .field("pending_input", &self.input.len())
            .field("buffered_output", &self.output.available_frames())
            .finish()
    }
}

impl Resampler {
    /// Creates a resampler producing `ratio` output frames per input frame.
    pub fn new(quality: Quality, ratio: f64) -> Result<Self, ResampleError> {
        let inner = Inner::build(quality, ratio, CHUNK_FRAMES)?;
        let scratch = inner.output_buffer();
        let capacity = scratch.first().map(|c| c.len()).unwrap_or(0) * 2;
        Ok(Self {
            inner,
            quality,
            ratio,
            tail: 0,
            fed: false,
            input: PlanarInputBuffer::with_capacity(CHUNK_FRAMES * 2),
            output: PlanarOutputFifo::with_capacity(capacity),
            scratch,
            feed: vec![SILENCE; CHUNK_FRAMES],
        })
    }

    /// Creates a resampler converting from `source_rate` to `target_rate`.
    pub fn with_rates(
        quality: Quality,
        source_rate: u32,
        target_rate: u32,
    ) -> Result<Self, ResampleError> {
        if source_rate == 0 || target_rate == 0 {
            return Err(ResampleError::InvalidRates {
                source_rate,
                target_rate,
            });
        }
        Self::new(quality, target_rate as f64 / source_rate as f64)
    }

    pub fn quality(&self) -> Quality {
        self.quality
    }

    pub fn ratio(&self) -> f64 {
        self.ratio
    }

    /// Changes the conversion ratio, keeping filter state when rubato allows it.
    pub fn set_ratio(&mut self, ratio: f64) -> Result<(), ResampleError> {
        if ratio == self.ratio {
            return Ok(());
        }
        if !ratio.is_finite() || ratio <= 0.0 {
            return Err(ResampleError::InvalidRatio(ratio));
        }
        if self.inner.set_ratio(ratio).is_err() {
            // Outside the range this instance was built for.
            self.inner = Inner::build(self.quality, ratio, CHUNK_FRAMES)?;
            self.scratch = self.inner.output_buffer();
            self.input.clear();
        }
        self.ratio = ratio;
        Ok(())
    }

    /// Converted frames buffered and ready to drain.
    pub fn available(&self) -> usize {
        self.output.available_frames()
    }

    /// Delay of the filter, in output frames.
    pub fn output_delay(&self) -> usize {
        self.inner.output_delay()
    }

    /// Nothing is buffered and no filter tail is owed.
    pub fn is_idle(&self) -> bool {
        self.input.len() == 0 && self.output.available_frames() == 0 && self.tail == 0
    }

    /// Queues `frames` of silence ahead of any converted output.
    pub fn prime(&mut self, frames: usize) {
        self.output.push_silence(frames);
    }

    /// Drops buffered input and output and clears the filter state.
    pub fn reset(&mut self) {
        self.inner.reset();
        self.input.clear();
        self.output.clear();
        self.tail = 0;
        self.fed = false;
    }

    /// Fills `out` with converted frames, pulling source frames through `pull` as
    /// needed. `pull` returns how many frames it wrote; returning 0 marks the end
    /// of the source for this call, after which pending input and the filter
    /// delay are flushed. Output that does not fit stays buffered for the next
    /// call, see [`Resampler::is_idle`].
    ///
    /// Returns the number of frames written. A conversion failure drops the
    /// resampler state and yields 0.
    pub fn process<F>(&mut self, out: &mut [Frame], mut pull: F) -> usize
    where
        F: FnMut(&mut [Frame]) -> usize,
    {
        let mut written = 0;
        let mut source_done = false;
        while written < out.len() {
            written += self.output.drain_into(&mut out[written..]);
            if written >= out.len() {
                break;
            }
            match self.fill_output(&mut pull, &mut source_done) {
                Ok(true) => {}
                Ok(false) => break,
                Err(_) => {
                    self.reset();
                    return 0;
                }
            }
        }
        written
    }

    /// Runs one conversion step. Returns false when no further progress is possible.
    fn fill_output<F>(&mut self, pull: &mut F, source_done: &mut bool) -> Result<bool, ResampleError>
    where
        F: FnMut(&mut [Frame]) -> usize,
    {
        let needed = self.inner.input_frames_next();
        while !*source_done && self.input.len() < needed {
            let want = (needed - self.input.len()).min(self.feed.len());
            let got = pull(&mut self.feed[..want]).min(want);
            if got == 0 {
                *source_done = true;
                if self.fed {
                    self.fed = false;
                    self.tail = self.inner.output_delay();
                }
                break;
            }
            self.input.push_frames(&self.feed[..got]);
            self.fed = true;
        }

        if self.input.len() >= needed {
            let (used, produced) = self.inner.process(&self.input.channels, &mut self.scratch)?;
            self.input.drain_frames(used);
            self.output.push_planar(&self.scratch, produced);
            return Ok(used > 0 || produced > 0);
        }

        if *source_done && self.input.len() > 0 {
            let remaining = self.input.len();
            let (_, produced) = self
                .inner
                .process_partial(Some(self.input.channels.as_slice()), &mut self.scratch)?;
            self.input.clear();
            self.output.push_planar(&self.scratch, produced);
            // The zero padding already carried part of the delay out.
            let real = (remaining as f64 * self.ratio).ceil() as usize;
            self.tail = (real + self.tail).saturating_sub(produced);
            return Ok(produced > 0 || self.tail > 0);
        }

        if *source_done && self.tail > 0 {
            let (_, produced) = self.inner.process_partial(None, &mut self.scratch)?;
            let keep = produced.min(self.tail);
            self.output.push_planar(&self.scratch, keep);
            self.tail = if produced == 0 { 0 } else { self.tail - keep };
            return Ok(keep > 0);
        }

        Ok(false)
    }

    /// Accepts input frames and converts every complete chunk into the output FIFO.
    /// Returns the number of frames produced. A conversion failure drops the
    /// resampler state and yields 0.
    pub fn push(&mut self, frames: &[Frame]) -> usize {
        self.input.push_frames(frames);
        let mut produced_total = 0;
        loop {
            let needed = self.inner.input_frames_next();
            if self.input.len() < needed {
                break;
            }
            match self.inner.process(&self.input.channels, &mut self.scratch) {
                Ok((used, produced)) => {
                    self.input.drain_frames(used);
                    self.output.push_planar(&self.scratch, produced);
                    produced_total += produced;
                    if used == 0 {
                        break;
                    }
                }
                Err(_) => {
                    self.reset();
                    return 0;
                }
            }
        }
        produced_total
    }

    /// Moves buffered output into `out`, returns the count written.
    pub fn drain(&mut self, out: &mut [Frame]) -> usize {
        self.output.drain_into(out)
    }
}

/// Number of frames a block of `input_frames` becomes when converted.
pub fn expected_frames(input_frames: usize, source_rate: u32, target_rate: u32) -> usize {
    if source_rate == 0 {
        return 0;
    }
    (input_frames as f64 * target_rate as f64 / source_rate as f64).round() as usize
}

/// Converts a whole block in one shot. The result holds
/// `round(len * target_rate / source_rate)` frames, or none if conversion failed.
pub fn convert_block(
    input: &[Frame],
    source_rate: u32,
    target_rate: u32,
    quality: Quality,
) -> Vec<Frame> {
    match try_convert_block(input, source_rate, target_rate, quality) {
        Ok(frames) => frames,
        Err(e) => {
            warn!(
                error = %e,
                source_rate,
                target_rate,
                frames = input.len(),
                "Block conversion failed"
            );
            Vec::new()
        }
    }
}

/// Like [`convert_block`] but reports failures.
pub fn try_convert_block(
    input: &[Frame],
    source_rate: u32,
    target_rate: u32,
    quality: Quality,
) -> Result<Vec<Frame>, ResampleError> {
    if source_rate == 0 || target_rate == 0 {
        return Err(ResampleError::InvalidRates {
            source_rate,
            target_rate,
        });
    }
    if input.is_empty() {
        return Ok(Vec::new());
    }
    if source_rate == target_rate {
        return Ok(input.to_vec());
    }

    let target = expected_frames(input.len(), source_rate, target_rate);
    let ratio = target_rate as f64 / source_rate as f64;
    let mut inner = Inner::build(quality, ratio, CHUNK_FRAMES)?;
    let delay = inner.output_delay();
    let wanted = delay + target;

    let mut planar = PlanarInputBuffer::with_capacity(input.len());
    planar.push_frames(input);
    let mut scratch = inner.output_buffer();
    let chunk_out = scratch.first().map_or(0, |c| c.len());
    let mut collected = PlanarOutputFifo::with_capacity(wanted + chunk_out);

    while planar.len() >= inner.input_frames_next() {
        let (used, produced) = inner.process(&planar.channels, &mut scratch)?;
        planar.drain_frames(used);
        collected.push_planar(&scratch, produced);
        if used == 0 {
            break;
        }
    }
    if planar.len() > 0 {
        let (_, produced) =
            inner.process_partial(Some(planar.channels.as_slice()), &mut scratch)?;
        collected.push_planar(&scratch, produced);
    }

    // Flush the filter delay line with zeros until the whole block is out.
    let per_flush = inner.output_frames_next().max(1);
    let max_flushes = 2 * (wanted / per_flush) + 4;
    let mut flushes = 0;
    while collected.available_frames() < wanted && flushes < max_flushes {
        let (_, produced) = inner.process_partial(None, &mut scratch)?;
        collected.push_planar(&scratch, produced);
        flushes += 1;
    }

    let mut all = vec![SILENCE; collected.available_frames()];
    collected.drain_into(&mut all);
    let mut result: Vec<Frame> = all.into_iter().skip(delay).take(target).collect();
    result.resize(target, SILENCE);
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(len: usize, freq: f32, rate: u32) -> Vec<Frame> {
        (0..len)
            .map(|i| {
                let s = (2.0 * std::f32::consts::PI * freq * i as f32 / rate as f32).sin() * 0.5;
                [s, s]
            })
            .collect()
    }

    #[test]
    fn test_quality_from_str() {
        assert_eq!(Quality::Point, "point".parse().unwrap());
        assert_eq!(Quality::Linear, "LINEAR".parse().unwrap());
        assert_eq!(Quality::Sinc, "sinc".parse().unwrap());
        assert!("cubic".parse::<Quality>().is_err());
    }

    #[test]
    fn test_invalid_ratio() {
        assert!(matches!(
            Resampler::new(Quality::Linear, 0.0),
            Err(ResampleError::InvalidRatio(_))
        ));
        assert!(Resampler::with_rates(Quality::Linear, 0, 48000).is_err());
    }

    #[test]
    fn test_convert_block_frame_counts() {
        let input = sine(1000, 440.0, 44100);
        for quality in [Quality::Point, Quality::Linear, Quality::Sinc] {
            let up = convert_block(&input, 44100, 48000, quality);
            assert_eq!(expected_frames(1000, 44100, 48000), up.len(), "{}", quality);

            let down = convert_block(&input, 48000, 22050, quality);
            assert_eq!(expected_frames(1000, 48000, 22050), down.len(), "{}", quality);
        }
    }

    #[test]
    fn test_convert_block_equal_rates_is_identity() {
        let input = sine(300, 440.0, 44100);
        assert_eq!(input, convert_block(&input, 44100, 44100, Quality::Sinc));
        assert!(convert_block(&[], 44100, 48000, Quality::Linear).is_empty());
    }

    #[test]
    fn test_convert_block_round_trip_length() {
        for quality in [Quality::Point, Quality::Linear] {
            for n in [1, 2, 3, 7, 101, 4410] {
                let input = sine(n, 220.0, 44100);
                let there = convert_block(&input, 44100, 32000, quality);
                let back = convert_block(&there, 32000, 44100, quality);
                assert!(
                    back.len().abs_diff(n) <= 1,
                    "{} n={} got {} frames",
                    quality,
                    n,
                    back.len()
                );
            }
        }
    }

    #[test]
    fn test_convert_block_short_sinc_blocks_keep_content() {
        for n in [10, 50, 200, 1000] {
            let out = convert_block(&vec![[0.5, 0.5]; n], 44100, 48000, Quality::Sinc);
            assert_eq!(expected_frames(n, 44100, 48000), out.len());
            let audible = out.iter().filter(|f| f[0].abs() > 0.1).count();
            assert!(
                audible * 10 >= out.len() * 8,
                "n={} audible={} of {}",
                n,
                audible,
                out.len()
            );

            // Away from the block edges the level is preserved.
            let edge = out.len() / 4;
            for frame in &out[edge..out.len() - edge] {
                assert!((frame[0] - 0.5).abs() < 0.15, "n={} frame={:?}", n, frame);
            }
        }
    }

    #[test]
    fn test_streaming_flushes_tail_across_small_calls() {
        // The whole converted source comes out regardless of how it is read.
        for quality in [Quality::Point, Quality::Linear] {
            let mut counts = Vec::new();
            for period in [64usize, 256] {
                let mut resampler = Resampler::new(quality, 2.0).unwrap();
                let mut remaining = 1000usize;
                let mut audible = 0;
                let mut out = vec![SILENCE; period];
                for _ in 0..100 {
                    let n = resampler.process(&mut out, |buf| {
                        let count = buf.len().min(remaining);
                        buf[..count].fill([0.5, 0.5]);
                        remaining -= count;
                        count
                    });
                    audible += out[..n].iter().filter(|f| f[0].abs() > 1e-3).count();
                }
                assert!(resampler.is_idle());
                counts.push(audible);
            }
            assert!(counts[0].abs_diff(counts[1]) <= 2, "{} {:?}", quality, counts);
            assert!((1990..=2010).contains(&counts[0]), "{} {:?}", quality, counts);
        }
    }

    #[test]
    fn test_reset_clears_buffers() {
        let mut resampler = Resampler::new(Quality::Sinc, 1.5).unwrap();
        resampler.prime(10);
        resampler.push(&[[0.5, 0.5]; 200]);
        assert!(!resampler.is_idle());
        resampler.reset();
        assert!(resampler.is_idle());
        assert_eq!(0, resampler.available());

        resampler.push(&[[0.5, 0.5]; 200]);
        assert!(resampler.available() > 0);
    }

    #[test]
    fn test_streaming_preserves_dc() {
        let mut resampler = Resampler::new(Quality::Linear, 0.5).unwrap();
        let mut out = vec![SILENCE; 512];
        let mut produced = 0;
        for _ in 0..4 {
            produced = resampler.process(&mut out, |buf| {
                buf.fill([0.5, -0.5]);
                buf.len()
            });
        }
        assert_eq!(512, produced);
        for frame in &out {
            assert!((frame[0] - 0.5).abs() < 1e-3);
            assert!((frame[1] + 0.5).abs() < 1e-3);
        }
    }

    #[test]
    fn test_streaming_rate_matches_ratio() {
        let mut resampler = Resampler::new(Quality::Point, 2.0).unwrap();
        let mut pulled = 0usize;
        let mut out = vec![SILENCE; 1024];
        for _ in 0..8 {
            let n = resampler.process(&mut out, |buf| {
                pulled += buf.len();
                buf.fill([0.1, 0.1]);
                buf.len()
            });
            assert_eq!(1024, n);
        }
        // Roughly half as many input frames as output frames, plus one chunk of lookahead.
        let expected = 8 * 1024 / 2;
        assert!(pulled + CHUNK_FRAMES >= expected && pulled <= expected + 2 * CHUNK_FRAMES);
    }

    #[test]
    fn test_streaming_exhausted_source() {
        let mut resampler = Resampler::new(Quality::Linear, 1.5).unwrap();
        let mut remaining = 100usize;
        let mut out = vec![SILENCE; 4096];
        let n = resampler.process(&mut out, |buf| {
            let count = buf.len().min(remaining);
            buf[..count].fill([0.2, 0.2]);
            remaining -= count;
            count
        });
        assert!(n > 0 && n < 4096);
        assert_eq!(0, resampler.process(&mut out, |_| 0));
    }

    #[test]
    fn test_push_and_drain() {
        let mut resampler = Resampler::new(Quality::Linear, 0.5).unwrap();
        resampler.prime(10);
        assert_eq!(10, resampler.available());

        let block = vec![[0.3, 0.3]; 256];
        let produced = resampler.push(&block);
        assert!(produced >= 100 && produced <= 132);
        assert_eq!(10 + produced, resampler.available());

        let mut out = vec![SILENCE; 10];
        assert_eq!(10, resampler.drain(&mut out));
        assert!(out.iter().all(|f| *f == SILENCE));

        resampler.reset();
        assert_eq!(0, resampler.available());
    }

    #[test]
    fn test_set_ratio_out_of_range_rebuilds() {
        let mut resampler = Resampler::new(Quality::Linear, 1.0).unwrap();
        resampler.set_ratio(1.2).unwrap();
        assert_eq!(1.2, resampler.ratio());
        resampler.set_ratio(40.0).unwrap();
        assert_eq!(40.0, resampler.ratio());
        assert!(resampler.set_ratio(f64::NAN).is_err());
    }
}
