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
use std::time::{Duration, Instant};

use crossbeam_channel::{Sender, TryRecvError};
use tracing::{info, span, Level};

use super::capture::CaptureRing;
use super::driver::{DriverControl, OutputDriver};
use super::engine::AudioEngine;
use super::error::DeviceError;
use super::format::SampleEncoding;

/// A device without hardware. A thread pulls periods at the engine's rate and
/// discards them.
pub struct Device {
    name: String,
    channels: u16,
    control: DriverControl,
    shutdown: Option<Sender<()>>,
    thread: Option<thread::JoinHandle<()>>,
}

impl Device {
    /// Starts the pacing thread. The driver stays stopped until started.
    pub fn open<E: AudioEngine + 'static>(
        name: &str,
        engine: E,
        channels: u16,
    ) -> Result<Device, DeviceError> {
        let span = span!(Level::INFO, "open device (null)");
        let _enter = span.enter();

        let control = DriverControl::new();
        let period = Duration::from_secs_f64(
            engine.frames_per_period().max(1) as f64 / engine.sample_rate().max(1) as f64,
        );
        let mut buffer = vec![0.0f32; engine.frames_per_period().max(1) * channels.max(1) as usize];
        let mut driver = OutputDriver::new(engine, channels, SampleEncoding::default(), control.clone());

        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(1);
        let thread = thread::Builder::new()
            .name("samplerack-null".to_string())
            .spawn(move || {
                let mut deadline = Instant::now();
                loop {
                    match shutdown_rx.try_recv() {
                        Err(TryRecvError::Empty) => {}
                        _ => return,
                    }
                    driver.fill(&mut buffer);

                    deadline += period;
                    let now = Instant::now();
                    if deadline > now {
                        spin_sleep::sleep(deadline - now);
                    } else {
                        deadline = now;
                    }
                }
            })?;

        info!(
            device = name,
            channels,
            period_us = period.as_micros() as u64,
            "Opened null device"
        );
        Ok(Device {
            name: name.to_string(),
            channels,
            control,
            shutdown: Some(shutdown_tx),
            thread: Some(thread),
        })
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        self.control.stop();
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
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
        None
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Null, Channels={})", self.name, self.channels)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::audio::{Device as _, PeriodBuffer, PlayState};
    use crate::test::eventually;

    struct CountingEngine {
        pulls: Arc<AtomicUsize>,
        limit: usize,
    }

    impl AudioEngine for CountingEngine {
        fn frames_per_period(&self) -> usize {
            64
        }

        fn sample_rate(&self) -> u32 {
            48000
        }

        fn master_gain(&self) -> f32 {
            1.0
        }

        fn pull(&mut self, period: &mut PeriodBuffer) -> usize {
            let pulls = self.pulls.fetch_add(1, Ordering::Relaxed) + 1;
            if pulls > self.limit {
                return 0;
            }
            period.silence();
            period.len()
        }
    }

    #[test]
    fn test_paces_pulls_until_underrun() {
        let pulls = Arc::new(AtomicUsize::new(0));
        let device = Device::open(
            "null",
            CountingEngine {
                pulls: pulls.clone(),
                limit: 20,
            },
            2,
        )
        .unwrap();
        assert!(!device.supports_capture());

        thread::sleep(Duration::from_millis(20));
        assert_eq!(0, pulls.load(Ordering::Relaxed));

        device.start();
        eventually(
            || device.control().state() == PlayState::Stopped,
            "null device never ran dry",
        );
        assert!(device.control().take_underrun());
        assert_eq!(21, pulls.load(Ordering::Relaxed));
        assert_eq!(20, device.control().periods_pulled());
    }
}
