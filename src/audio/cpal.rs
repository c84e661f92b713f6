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
use std::fmt;
use std::sync::Arc;
use std::thread;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::Sender;
use tracing::{error, info, span, warn, Level};

use super::capture::CaptureRing;
use super::driver::{DriverControl, OutputDriver};
use super::engine::AudioEngine;
use super::error::DeviceError;
use super::format::SampleEncoding;
use super::period::{Frame, SILENCE};
use super::thread_priority::{
    callback_thread_priority, configure_audio_thread_priority, rt_audio_enabled,
};
use crate::config::{DeviceSettings, EngineConfig, StreamBufferSize};

/// Frames converted per step in the input callback.
const CAPTURE_CHUNK_FRAMES: usize = 256;

/// Capture ring length in engine periods.
const CAPTURE_RING_PERIODS: usize = 16;

/// An output device as seen when listing.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub name: String,
    pub host: String,
    pub max_channels: u16,
    pub has_input: bool,
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (Channels={}{}) ({})",
            self.name,
            self.max_channels,
            if self.has_input { ", Input" } else { "" },
            self.host
        )
    }
}

/// A cpal output stream, plus an input stream when capture was requested and
/// the host offers one. The streams live on a dedicated thread since cpal
/// streams cannot move between threads.
pub struct Device {
    name: String,
    host_id: cpal::HostId,
    channels: u16,
    encoding: SampleEncoding,
    control: DriverControl,
    capture: Option<Arc<CaptureRing>>,
    shutdown: Option<Sender<()>>,
    output_thread: Option<thread::JoinHandle<()>>,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (Channels={}, Format={}) ({})",
            self.name,
            self.channels,
            self.encoding,
            self.host_id.name()
        )
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        self.control.stop();
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(thread) = self.output_thread.take() {
            let _ = thread.join();
        }
    }
}

/// Lists cpal output devices across all hosts.
pub fn list() -> Result<Vec<DeviceInfo>, DeviceError> {
    // Suppress noisy output here.
    let _shh_stdout = shh::stdout()?;
    let _shh_stderr = shh::stderr()?;

    let mut devices = Vec::new();
    for host_id in cpal::available_hosts() {
        let host_devices = match cpal::host_from_id(host_id)?.devices() {
            Ok(host_devices) => host_devices,
            Err(e) => {
                error!(
                    err = e.to_string(),
                    host = host_id.name(),
                    "Unable to list devices for host"
                );
                continue;
            }
        };

        for device in host_devices {
            let Ok(output_configs) = device.supported_output_configs() else {
                continue;
            };
            let max_channels = output_configs.map(|c| c.channels()).max().unwrap_or(0);
            if max_channels == 0 {
                continue;
            }
            let has_input = device
                .supported_input_configs()
                .map(|mut configs| configs.next().is_some())
                .unwrap_or(false);
            devices.push(DeviceInfo {
                name: device.name()?,
                host: host_id.name().to_string(),
                max_channels,
                has_input,
            });
        }
    }

    devices.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(devices)
}

/// Hosts to search, narrowed to one when the device settings name a host.
fn select_hosts(
    available: Vec<cpal::HostId>,
    settings: &DeviceSettings,
) -> Result<Vec<cpal::HostId>, DeviceError> {
    let Some(wanted) = settings.host() else {
        return Ok(available);
    };
    available
        .into_iter()
        .find(|id| id.name().eq_ignore_ascii_case(wanted))
        .map(|id| vec![id])
        .ok_or_else(|| DeviceError::HostNotFound(wanted.to_string()))
}

/// Finds the configured output device.
fn find_device(
    name: &str,
    default: bool,
    settings: &DeviceSettings,
) -> Result<(cpal::HostId, cpal::Device), DeviceError> {
    if default {
        let host = match settings.host() {
            Some(_) => {
                let hosts = select_hosts(cpal::available_hosts(), settings)?;
                match hosts.first() {
                    Some(id) => cpal::host_from_id(*id)?,
                    None => cpal::default_host(),
                }
            }
            None => cpal::default_host(),
        };
        let device = host
            .default_output_device()
            .ok_or(DeviceError::NoDefaultDevice)?;
        return Ok((host.id(), device));
    }

    let hosts = select_hosts(cpal::available_hosts(), settings)?;
    let _shh_stdout = shh::stdout()?;
    let _shh_stderr = shh::stderr()?;
    for host_id in hosts {
        let Ok(devices) = cpal::host_from_id(host_id)?.devices() else {
            continue;
        };
        for device in devices {
            if device.name().map(|n| n.trim() == name).unwrap_or(false) {
                return Ok((host_id, device));
            }
        }
    }
    Err(DeviceError::NotFound(name.to_string()))
}

/// Picks the first encoding, in preference order, that the device can open
/// with the requested channels and rate.
fn choose_output(
    device: &cpal::Device,
    name: &str,
    channels: u16,
    sample_rate: u32,
    preferred: SampleEncoding,
) -> Result<(SampleEncoding, cpal::SupportedStreamConfigRange), DeviceError> {
    let configs: Vec<cpal::SupportedStreamConfigRange> = device
        .supported_output_configs()?
        .filter(|c| {
            c.channels() == channels
                && c.min_sample_rate().0 <= sample_rate
                && sample_rate <= c.max_sample_rate().0
        })
        .collect();

    let mut candidates = vec![preferred, SampleEncoding::default()];
    candidates.extend(
        [cpal::SampleFormat::I32, cpal::SampleFormat::I16]
            .into_iter()
            .filter_map(SampleEncoding::from_cpal),
    );

    for encoding in candidates {
        if let Some(range) = configs
            .iter()
            .find(|c| c.sample_format() == encoding.to_cpal())
        {
            return Ok((encoding, range.clone()));
        }
    }
    Err(DeviceError::UnsupportedConfig {
        device: name.to_string(),
        channels,
        sample_rate,
    })
}

fn buffer_size(
    choice: Option<StreamBufferSize>,
    frames_per_period: usize,
    range: &cpal::SupportedStreamConfigRange,
) -> cpal::BufferSize {
    match choice {
        None => cpal::BufferSize::Fixed(frames_per_period as u32),
        Some(StreamBufferSize::Default) => cpal::BufferSize::Default,
        Some(StreamBufferSize::Min) => match range.buffer_size() {
            cpal::SupportedBufferSize::Range { min, .. } => cpal::BufferSize::Fixed(*min),
            cpal::SupportedBufferSize::Unknown => cpal::BufferSize::Default,
        },
        Some(StreamBufferSize::Fixed(frames)) => cpal::BufferSize::Fixed(frames),
    }
}

/// Finds a float input config at the engine rate.
fn capture_config(
    host_id: cpal::HostId,
    sample_rate: u32,
) -> Option<(cpal::Device, cpal::StreamConfig)> {
    let host = cpal::host_from_id(host_id).ok()?;
    let device = host.default_input_device()?;
    let range = device.supported_input_configs().ok()?.find(|c| {
        c.sample_format() == cpal::SampleFormat::F32
            && c.min_sample_rate().0 <= sample_rate
            && sample_rate <= c.max_sample_rate().0
    })?;
    Some((
        device,
        range.with_sample_rate(cpal::SampleRate(sample_rate)).config(),
    ))
}

fn build_typed_output<E, T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut driver: OutputDriver<E>,
) -> Result<cpal::Stream, DeviceError>
where
    E: AudioEngine + 'static,
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    let priority = callback_thread_priority();
    let rt_audio = rt_audio_enabled();
    let mut priority_set = false;
    Ok(device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            configure_audio_thread_priority(priority, rt_audio, &mut priority_set);
            driver.fill(data);
        },
        |err| error!(err = %err, "CPAL output stream error"),
        None,
    )?)
}

fn build_output<E: AudioEngine + 'static>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    driver: OutputDriver<E>,
) -> Result<cpal::Stream, DeviceError> {
    let encoding = driver.encoding();
    if encoding.endianness != super::format::Endianness::native() {
        // Typed streams are always in system byte order, so hand cpal the bytes.
        let priority = callback_thread_priority();
        let rt_audio = rt_audio_enabled();
        let mut priority_set = false;
        let mut driver = driver;
        return Ok(device.build_output_stream_raw(
            config,
            encoding.to_cpal(),
            move |data: &mut cpal::Data, _: &cpal::OutputCallbackInfo| {
                configure_audio_thread_priority(priority, rt_audio, &mut priority_set);
                driver.fill_bytes(data.bytes_mut());
            },
            |err| error!(err = %err, "CPAL output stream error"),
            None,
        )?);
    }

    match encoding.to_cpal() {
        cpal::SampleFormat::I16 => build_typed_output::<E, i16>(device, config, driver),
        cpal::SampleFormat::I32 => build_typed_output::<E, i32>(device, config, driver),
        _ => build_typed_output::<E, f32>(device, config, driver),
    }
}

fn build_input(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    ring: Arc<CaptureRing>,
) -> Result<cpal::Stream, DeviceError> {
    let channels = config.channels.max(1) as usize;
    let mut scratch: Vec<Frame> = vec![SILENCE; CAPTURE_CHUNK_FRAMES];
    Ok(device.build_input_stream(
        config,
        move |data: &[f32], _: &cpal::InputCallbackInfo| {
            for chunk in data.chunks(CAPTURE_CHUNK_FRAMES * channels) {
                let frames = chunk.len() / channels;
                for (frame, samples) in scratch.iter_mut().zip(chunk.chunks_exact(channels)) {
                    *frame = if channels == 1 {
                        [samples[0], samples[0]]
                    } else {
                        [samples[0], samples[1]]
                    };
                }
                ring.write(&scratch[..frames]);
            }
        },
        |err| error!(err = %err, "CPAL input stream error"),
        None,
    )?)
}

impl Device {
    /// Opens the configured device and starts its streams. The engine is built
    /// once the capture capability is known. The driver starts stopped.
    pub fn open<E, F, Er>(config: &EngineConfig, make_engine: &mut F) -> Result<Device, DeviceError>
    where
        E: AudioEngine + 'static,
        F: FnMut(Option<Arc<CaptureRing>>) -> Result<E, Er>,
        Er: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let span = span!(Level::INFO, "open device (cpal)");
        let _enter = span.enter();

        let audio = config.audio();
        let preferred = audio
            .encoding()
            .map_err(|e| DeviceError::UnsupportedFormat(e.to_string()))?;
        let settings = audio
            .parsed_device_settings()
            .map_err(|e| DeviceError::Settings(e.to_string()))?;
        let (host_id, device) = find_device(audio.device(), audio.is_default_device(), &settings)?;
        let name = device.name()?;
        let channels = audio.channels();
        let sample_rate = config.sample_rate();

        let (encoding, range) = choose_output(&device, &name, channels, sample_rate, preferred)?;
        let stream_buffer_size = audio
            .stream_buffer_size()
            .map_err(|e| DeviceError::UnsupportedFormat(e.to_string()))?;
        let stream_config = cpal::StreamConfig {
            channels,
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size: buffer_size(stream_buffer_size, config.frames_per_period(), &range),
        };

        let input = if audio.capture() {
            let input = capture_config(host_id, sample_rate);
            if input.is_none() {
                warn!(device = name, sample_rate, "No float input at the engine rate, capture disabled");
            }
            input
        } else {
            None
        };
        let capture = input.as_ref().map(|_| {
            Arc::new(CaptureRing::new(
                config.frames_per_period() * CAPTURE_RING_PERIODS,
            ))
        });

        let control = DriverControl::new();
        let engine = make_engine(capture.clone()).map_err(|e| DeviceError::Engine(e.into()))?;
        let driver = OutputDriver::new(engine, channels, encoding, control.clone());

        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<bool, DeviceError>>(1);
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(1);
        let input_ring = capture.clone();
        let output_thread = thread::Builder::new()
            .name("samplerack-output".to_string())
            .spawn(move || {
                let output = match build_output(&device, &stream_config, driver)
                    .and_then(|stream| stream.play().map(|_| stream).map_err(DeviceError::from))
                {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                let input = match (input, input_ring) {
                    (Some((input_device, input_config)), Some(ring)) => {
                        match build_input(&input_device, &input_config, ring)
                            .and_then(|stream| stream.play().map(|_| stream).map_err(DeviceError::from))
                        {
                            Ok(stream) => Some(stream),
                            Err(e) => {
                                warn!(err = %e, "Unable to start capture stream");
                                None
                            }
                        }
                    }
                    _ => None,
                };

                let _ = ready_tx.send(Ok(input.is_some()));

                // Keep the streams alive until the device is dropped.
                let _ = shutdown_rx.recv();
                drop(input);
                drop(output);
            })?;

        let capturing = ready_rx.recv().map_err(|_| {
            DeviceError::Thread("output thread exited before reporting readiness".to_string())
        })??;

        info!(
            device = name,
            host = host_id.name(),
            channels,
            sample_rate,
            format = %encoding,
            capture = capturing,
            "Opened output device"
        );

        Ok(Device {
            name,
            host_id,
            channels,
            encoding,
            control,
            capture: if capturing { capture } else { None },
            shutdown: Some(shutdown_tx),
            output_thread: Some(output_thread),
        })
    }

    pub fn encoding(&self) -> SampleEncoding {
        self.encoding
    }
}

impl super::Device for Device {
    fn name(&self) -> &str {
        &self.name
    }

    fn control(&self) -> &DriverControl {
        &self.control
    }

    fn capture(&self) -> Option<&Arc<CaptureRing>> {
        self.capture.as_ref()
    }
}
