//! Software backend with no hardware behind it.
//!
//! Each started device runs a timer thread that invokes the data callback once
//! per period: capture devices deliver silence, playback devices discard what
//! they are given. Useful on machines without audio hardware and in tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::diagnostics::backend_log::{LogHandle, LogLevel};
use crate::models::error::ErrorCode;
use crate::models::format::Direction;
use crate::session::factory::DEFAULT_SAMPLE_RATE;
use crate::traits::backend::{
    AudioBackend, BackendContext, BackendDevice, DataCallback, DeviceConfig, NegotiatedFormat,
};

/// Timer-driven backend. Periods default to 10 ms.
#[derive(Debug, Clone)]
pub struct NullBackend {
    period: Duration,
}

impl NullBackend {
    pub fn new() -> Self {
        Self {
            period: Duration::from_millis(10),
        }
    }

    pub fn with_period(period: Duration) -> Self {
        Self { period }
    }
}

impl Default for NullBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioBackend for NullBackend {
    fn name(&self) -> &str {
        "null"
    }

    fn open_context(&self, log: Option<LogHandle>) -> Result<Box<dyn BackendContext>, ErrorCode> {
        if let Some(log) = &log {
            log.post(LogLevel::Debug, "null context initialized");
        }
        Ok(Box::new(NullContext {
            period: self.period,
            log,
        }))
    }
}

struct NullContext {
    period: Duration,
    log: Option<LogHandle>,
}

impl BackendContext for NullContext {
    fn open_device(&mut self, config: &DeviceConfig) -> Result<Box<dyn BackendDevice>, ErrorCode> {
        if !config.format.is_known() || config.channels == 0 {
            post(&self.log, LogLevel::Error, "null device needs a known format and channel count");
            return Err(ErrorCode::FormatNotSupported);
        }

        let sample_rate = if config.sample_rate == 0 {
            DEFAULT_SAMPLE_RATE
        } else {
            config.sample_rate
        };
        let period_size_in_frames = ((sample_rate as u128 * self.period.as_micros()) / 1_000_000).max(1) as u32;

        Ok(Box::new(NullDevice {
            direction: config.direction,
            negotiated: NegotiatedFormat {
                format: config.format,
                channels: config.channels,
                sample_rate,
                period_size_in_frames,
            },
            period: self.period,
            log: self.log.clone(),
            callback: None,
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
        }))
    }
}

struct NullDevice {
    direction: Direction,
    negotiated: NegotiatedFormat,
    period: Duration,
    log: Option<LogHandle>,
    callback: Option<Box<dyn DataCallback>>,
    running: Arc<AtomicBool>,
    worker: Option<thread::JoinHandle<Box<dyn DataCallback>>>,
}

impl BackendDevice for NullDevice {
    fn negotiated(&self) -> NegotiatedFormat {
        self.negotiated
    }

    fn bind(&mut self, callback: Box<dyn DataCallback>) -> Result<(), ErrorCode> {
        if self.worker.is_some() {
            post(&self.log, LogLevel::Error, "cannot bind a callback while the device is running");
            return Err(ErrorCode::InvalidOperation);
        }
        self.callback = Some(callback);
        Ok(())
    }

    fn start(&mut self) -> Result<(), ErrorCode> {
        if self.worker.is_some() {
            return Ok(());
        }
        let Some(callback) = self.callback.take() else {
            post(&self.log, LogLevel::Error, "no data callback bound");
            return Err(ErrorCode::InvalidOperation);
        };

        self.running.store(true, Ordering::Release);
        let running = Arc::clone(&self.running);
        let direction = self.direction;
        let negotiated = self.negotiated;
        let period = self.period;

        let spawned = thread::Builder::new()
            .name(format!("null-{:?}", direction).to_lowercase())
            .spawn(move || run_device(running, direction, negotiated, period, callback));

        match spawned {
            Ok(handle) => {
                self.worker = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::Release);
                post(
                    &self.log,
                    LogLevel::Error,
                    &format!("failed to spawn null device thread: {}", e),
                );
                Err(ErrorCode::FailedToStartBackendDevice)
            }
        }
    }

    fn stop(&mut self) -> Result<(), ErrorCode> {
        let Some(handle) = self.worker.take() else {
            return Ok(());
        };
        self.running.store(false, Ordering::Release);
        match handle.join() {
            Ok(callback) => self.callback = Some(callback),
            Err(_) => post(&self.log, LogLevel::Warning, "null device thread panicked"),
        }
        Ok(())
    }
}

impl Drop for NullDevice {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// Device thread: one callback per period until `running` clears.
fn run_device(
    running: Arc<AtomicBool>,
    direction: Direction,
    negotiated: NegotiatedFormat,
    period: Duration,
    mut callback: Box<dyn DataCallback>,
) -> Box<dyn DataCallback> {
    let frames = negotiated.period_size_in_frames;
    let frame_size = negotiated.format.bytes_per_sample() * negotiated.channels as usize;
    let mut buffer = vec![negotiated.format.silence_byte(); frames as usize * frame_size];
    let mut deadline = Instant::now();

    while running.load(Ordering::Acquire) {
        match direction {
            Direction::Capture => callback.process(None, Some(&buffer), frames),
            Direction::Playback => callback.process(Some(&mut buffer), None, frames),
        }

        deadline += period;
        match deadline.checked_duration_since(Instant::now()) {
            Some(wait) => thread::sleep(wait),
            None => deadline = Instant::now(),
        }
    }

    callback
}

fn post(backend_log: &Option<LogHandle>, level: LogLevel, message: &str) {
    if let Some(handle) = backend_log {
        handle.post(level, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::format::SampleFormat;
    use std::sync::atomic::AtomicU32;

    struct Counting {
        calls: Arc<AtomicU32>,
    }

    impl DataCallback for Counting {
        fn process(&mut self, output: Option<&mut [u8]>, input: Option<&[u8]>, frame_count: u32) {
            assert!(frame_count > 0);
            assert!(output.is_some() != input.is_some());
            self.calls.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn open(direction: Direction) -> Box<dyn BackendDevice> {
        let mut context = NullBackend::with_period(Duration::from_millis(2))
            .open_context(None)
            .unwrap();
        context
            .open_device(&DeviceConfig {
                direction,
                format: SampleFormat::F32,
                channels: 2,
                sample_rate: 0,
            })
            .unwrap()
    }

    #[test]
    fn negotiates_requested_format_and_default_rate() {
        let device = open(Direction::Capture);
        let negotiated = device.negotiated();
        assert_eq!(negotiated.format, SampleFormat::F32);
        assert_eq!(negotiated.channels, 2);
        assert_eq!(negotiated.sample_rate, 48000);
        assert_eq!(negotiated.period_size_in_frames, 96);
    }

    #[test]
    fn start_without_callback_fails() {
        let mut device = open(Direction::Playback);
        assert_eq!(device.start(), Err(ErrorCode::InvalidOperation));
    }

    #[test]
    fn callback_runs_only_between_start_and_stop() {
        let calls = Arc::new(AtomicU32::new(0));
        let mut device = open(Direction::Capture);
        device
            .bind(Box::new(Counting {
                calls: Arc::clone(&calls),
            }))
            .unwrap();

        device.start().unwrap();
        thread::sleep(Duration::from_millis(30));
        device.stop().unwrap();

        let after_stop = calls.load(Ordering::Relaxed);
        assert!(after_stop > 0);
        thread::sleep(Duration::from_millis(10));
        assert_eq!(calls.load(Ordering::Relaxed), after_stop);

        // The callback came back from the worker, so the device can restart.
        device.start().unwrap();
        device.stop().unwrap();
    }

    #[test]
    fn rejects_unknown_format() {
        let mut context = NullBackend::new().open_context(None).unwrap();
        let result = context.open_device(&DeviceConfig {
            direction: Direction::Capture,
            format: SampleFormat::Unknown,
            channels: 1,
            sample_rate: 48000,
        });
        assert_eq!(result.err(), Some(ErrorCode::FormatNotSupported));
    }
}
