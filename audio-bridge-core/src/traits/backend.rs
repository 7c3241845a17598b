use crate::diagnostics::backend_log::{BackendLog, LogHandle};
use crate::models::error::ErrorCode;
use crate::models::format::{Direction, SampleFormat};

/// Realtime data callback bound to a backend device.
///
/// Invoked on a thread owned by the backend, at a cadence and block size the
/// backend chooses. Implementations must not block, allocate, or log.
///
/// - Capture devices pass `input` holding `frame_count` frames and no `output`.
/// - Playback devices pass `output` with room for `frame_count` frames and no
///   `input`; every byte of `output` must be written before returning.
pub trait DataCallback: Send {
    fn process(&mut self, output: Option<&mut [u8]>, input: Option<&[u8]>, frame_count: u32);
}

/// Parameters requested when opening a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceConfig {
    pub direction: Direction,
    pub format: SampleFormat,
    pub channels: u32,
    /// 0 lets the backend use the device's native rate.
    pub sample_rate: u32,
}

/// Stream parameters the backend settled on. Zero / `Unknown` fields mean the
/// backend could not report that value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NegotiatedFormat {
    pub format: SampleFormat,
    pub channels: u32,
    pub sample_rate: u32,
    pub period_size_in_frames: u32,
}

/// Platform audio backend: entry point for opening logs and contexts.
///
/// Implemented by:
/// - `NullBackend` (software timer device, no hardware)
/// - `WasapiBackend` (Windows, in `audio-bridge-windows`)
pub trait AudioBackend: Send + Sync {
    /// Short identifier used in log lines.
    fn name(&self) -> &str;

    /// Open a log object scoped to one session.
    fn open_log(&self) -> Result<BackendLog, ErrorCode> {
        Ok(BackendLog::new())
    }

    /// Open a backend context. Events about the context and every device it
    /// opens are posted to `log` when present.
    fn open_context(&self, log: Option<LogHandle>) -> Result<Box<dyn BackendContext>, ErrorCode>;
}

/// An initialized backend context. Must outlive every device it opened.
pub trait BackendContext: Send {
    /// Open the default device for `config.direction`, negotiating the
    /// closest stream format the device supports.
    fn open_device(&mut self, config: &DeviceConfig) -> Result<Box<dyn BackendDevice>, ErrorCode>;
}

/// An opened, stopped device.
///
/// A device never invokes its callback unless it is started, and `stop` does
/// not return until the callback can no longer run. `start` and `stop` must
/// not be called from inside the callback. Dropping a running device stops it
/// first.
pub trait BackendDevice: Send {
    fn negotiated(&self) -> NegotiatedFormat;

    /// Install the realtime callback. Only legal while stopped; replaces any
    /// callback bound earlier.
    fn bind(&mut self, callback: Box<dyn DataCallback>) -> Result<(), ErrorCode>;

    /// Begin invoking the callback. Fails with `InvalidOperation` if no
    /// callback is bound.
    fn start(&mut self) -> Result<(), ErrorCode>;

    /// Stop invoking the callback, blocking until it has quiesced.
    fn stop(&mut self) -> Result<(), ErrorCode>;
}
