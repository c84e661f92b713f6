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
use std::error::Error;
use std::f32::consts::TAU;
use std::path::Path;
use std::time::{Duration, Instant};

use clap::{crate_version, Parser, Subcommand};
use duration_string::DurationString;
use samplerack::audio::{self, PlayState};
use samplerack::config::EngineConfig;
use samplerack::engine::{EngineHandle, SamplerEngine};
use samplerack::samples::{SampleBuffer, SamplePlayer};
use samplerack::util::{duration_minutes_seconds, frames_to_duration};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Pitches of the demo arpeggio, in Hz.
const ARPEGGIO: [f32; 4] = [440.0, 554.37, 659.25, 880.0];

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A real-time sample playback engine with an effect chain."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lists the output devices available on this machine.
    Devices {},
    /// Plays a generated test tone through the configured engine.
    Play {
        /// The path to the engine configuration.
        config: String,
        /// How long to play for, in seconds.
        #[arg(short, long, default_value_t = 5)]
        seconds: u64,
        /// How long each note is held, e.g. 250ms.
        #[arg(short, long, default_value = "250ms")]
        note_length: String,
    },
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Devices {} => {
            let devices = audio::list_devices()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        Commands::Play {
            config,
            seconds,
            note_length,
        } => {
            let note_length: Duration = DurationString::from_string(note_length)?.into();
            play(Path::new(&config), Duration::from_secs(seconds), note_length)?;
        }
    }

    Ok(())
}

/// A one second plucked tone at 440 Hz, which is the player's base pitch.
fn test_tone(sample_rate: u32) -> SampleBuffer {
    let len = sample_rate as usize;
    let samples: Vec<f32> = (0..len)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            (TAU * 440.0 * t).sin() * (-4.0 * t).exp() * 0.5
        })
        .collect();
    SampleBuffer::from_mono(&samples, sample_rate)
}

fn play(path: &Path, length: Duration, note_length: Duration) -> Result<(), Box<dyn Error>> {
    let config = EngineConfig::load(path)?;
    let buffer = test_tone(config.sample_rate());
    let handle = EngineHandle::new();

    let device = audio::open_device(&config, |capture| {
        let player = SamplePlayer::from_settings(buffer.clone(), config.sampler(), config.sample_rate());
        SamplerEngine::new(&config, player, &handle).map(|engine| engine.with_capture(capture))
    })?;
    info!(
        device = %device,
        capture = device.supports_capture(),
        "Playing test tone"
    );

    device.start();
    let started = Instant::now();
    let mut note: u64 = 0;
    while started.elapsed() < length {
        if note > 0 {
            handle.note_off(note)?;
        }
        note += 1;
        let frequency = ARPEGGIO[(note as usize - 1) % ARPEGGIO.len()];
        handle.note_on(note, frequency)?;

        spin_sleep::sleep(note_length);

        handle.collect_garbage();
        if device.control().take_underrun() {
            warn!(device = %device, "Engine ran dry");
        }
        if device.control().state() != PlayState::Playing {
            break;
        }
    }

    handle.stop_all()?;
    spin_sleep::sleep(config.release()?);
    handle.finish()?;

    let deadline = Instant::now() + Duration::from_secs(1);
    while device.control().state() == PlayState::Playing && Instant::now() < deadline {
        spin_sleep::sleep(Duration::from_millis(10));
    }
    device.stop();
    handle.collect_garbage();

    let periods = device.control().periods_pulled();
    let rendered = frames_to_duration(
        periods * config.frames_per_period() as u64,
        config.sample_rate(),
    );
    info!(
        periods,
        rendered = %duration_minutes_seconds(rendered),
        position = handle.position(),
        dropped_garbage = handle.dropped_garbage(),
        "Done"
    );
    Ok(())
}
