use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use crate::diagnostics::backend_log::{BackendLog, LogLevel};
use crate::diagnostics::capture::DiagnosticCapture;
use crate::diagnostics::error_state::ErrorState;
use crate::models::config::SessionConfig;
use crate::models::error::{ErrorCode, SessionError};
use crate::models::format::{Direction, SampleFormat, StreamFormat};
use crate::processing::ring_buffer::frame_ring_buffer;
use crate::traits::backend::{AudioBackend, BackendContext, BackendDevice, DeviceConfig};

use super::capture::CaptureSession;
use super::core::{CoreParts, SessionCore};
use super::playback::PlaybackSession;
use super::realtime::{CaptureHandler, PlaybackHandler};

/// Sample rate assumed when neither the caller nor the backend names one.
pub const DEFAULT_SAMPLE_RATE: u32 = 48000;

/// Smallest buffer the default sizing policy produces, in frames.
pub const MIN_DEFAULT_BUFFER_FRAMES: u32 = 1024;

/// Default ring buffer size in frames.
///
/// Four device periods when the backend reports a period; otherwise about
/// 50 ms of audio, never below 1024 frames nor above one second.
pub fn default_buffer_size(sample_rate: u32, period_size_in_frames: u32) -> u32 {
    if period_size_in_frames != 0 {
        return period_size_in_frames.saturating_mul(4);
    }
    let sample_rate = if sample_rate == 0 {
        DEFAULT_SAMPLE_RATE
    } else {
        sample_rate
    };
    (sample_rate / 20).min(sample_rate).max(MIN_DEFAULT_BUFFER_FRAMES)
}

/// Everything a session owns before its ring buffer is attached.
///
/// Field order is drop order: a failure after this point releases the device,
/// then the context, then the log registration.
struct OpenedDevice {
    device: Box<dyn BackendDevice>,
    context: Box<dyn BackendContext>,
    log: Option<BackendLog>,
    diagnostics: Arc<DiagnosticCapture>,
    initial_error: ErrorState,
    format: StreamFormat,
    buffer_size_in_frames: u32,
}

impl OpenedDevice {
    fn fail(&self, code: ErrorCode, fallback: &str) -> SessionError {
        failure(&self.diagnostics, code, fallback)
    }

    fn into_core(self, direction: Direction, backend_name: &str) -> SessionCore {
        SessionCore::new(CoreParts {
            device: self.device,
            context: self.context,
            log: self.log,
            diagnostics: self.diagnostics,
            error: self.initial_error,
            direction,
            format: self.format,
            buffer_size_in_frames: self.buffer_size_in_frames,
            backend_name: backend_name.to_string(),
        })
    }
}

fn failure(diagnostics: &DiagnosticCapture, code: ErrorCode, fallback: &str) -> SessionError {
    let mut state = ErrorState::new();
    state.set_failure(code, Some(fallback), diagnostics);
    log::warn!("session creation failed: {}", state.message());
    SessionError::new(code, state.message())
}

/// Builds capture and playback sessions on top of one audio backend.
pub struct SessionFactory<B: AudioBackend> {
    backend: B,
}

impl<B: AudioBackend> SessionFactory<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Open a microphone session.
    ///
    /// Defaults: `F32` samples, 1 channel, the device's native rate, and a
    /// buffer from [`default_buffer_size`].
    pub fn create_capture(&self, config: SessionConfig) -> Result<CaptureSession, SessionError> {
        let mut opened = self.open_device(Direction::Capture, &config)?;

        let frame_size = opened.format.bytes_per_frame();
        let (producer, consumer) = frame_ring_buffer(frame_size, opened.buffer_size_in_frames as usize)
            .map_err(|code| opened.fail(code, "failed to allocate ring buffer"))?;

        let dropped_frames = Arc::new(AtomicU64::new(0));
        let handler = CaptureHandler::new(producer, Arc::clone(&dropped_frames));

        opened.diagnostics.clear();
        opened
            .device
            .bind(Box::new(handler))
            .map_err(|code| opened.fail(code, "failed to bind data callback"))?;

        let core = opened.into_core(Direction::Capture, self.backend.name());
        Ok(CaptureSession::new(consumer, dropped_frames, core))
    }

    /// Open a speaker session.
    ///
    /// Defaults: `F32` samples, 2 channels, the device's native rate, and a
    /// buffer from [`default_buffer_size`].
    pub fn create_playback(&self, config: SessionConfig) -> Result<PlaybackSession, SessionError> {
        let mut opened = self.open_device(Direction::Playback, &config)?;

        let frame_size = opened.format.bytes_per_frame();
        let (producer, consumer) = frame_ring_buffer(frame_size, opened.buffer_size_in_frames as usize)
            .map_err(|code| opened.fail(code, "failed to allocate ring buffer"))?;

        let underrun_frames = Arc::new(AtomicU64::new(0));
        let handler = PlaybackHandler::new(consumer, opened.format.format, Arc::clone(&underrun_frames));

        opened.diagnostics.clear();
        opened
            .device
            .bind(Box::new(handler))
            .map_err(|code| opened.fail(code, "failed to bind data callback"))?;

        let core = opened.into_core(Direction::Playback, self.backend.name());
        Ok(PlaybackSession::new(producer, underrun_frames, core))
    }

    /// Open diagnostics, log, context, and device, then settle the stream
    /// format and buffer size. Every `?` releases what was opened before it.
    fn open_device(&self, direction: Direction, config: &SessionConfig) -> Result<OpenedDevice, SessionError> {
        config
            .validate()
            .map_err(|message| SessionError::new(ErrorCode::InvalidArgs, message))?;

        let diagnostics = Arc::new(DiagnosticCapture::new());
        let mut initial_error = ErrorState::new();

        let backend_log = match self.backend.open_log() {
            Ok(backend_log) => {
                let sink = Arc::clone(&diagnostics);
                let registered = backend_log.register_callback(Arc::new(move |level: LogLevel, message: &str| {
                    sink.store(level, message);
                }));
                match registered {
                    Ok(()) => Some(backend_log),
                    Err(code) => {
                        initial_error.set_failure(code, Some("failed to register backend log callback"), &diagnostics);
                        log::warn!("{}; continuing without backend diagnostics", initial_error.message());
                        None
                    }
                }
            }
            Err(code) => {
                initial_error.set_failure(code, Some("failed to open backend log"), &diagnostics);
                log::warn!("{}; continuing without backend diagnostics", initial_error.message());
                None
            }
        };

        // Each backend call only answers for what it posted itself.
        diagnostics.clear();
        let mut context = self
            .backend
            .open_context(backend_log.as_ref().map(BackendLog::handle))
            .map_err(|code| failure(&diagnostics, code, "failed to initialize backend context"))?;

        let requested = DeviceConfig {
            direction,
            format: if config.format.is_known() {
                config.format
            } else {
                SampleFormat::F32
            },
            channels: if config.channels == 0 {
                direction.default_channels()
            } else {
                config.channels
            },
            sample_rate: config.sample_rate,
        };

        diagnostics.clear();
        let device = context
            .open_device(&requested)
            .map_err(|code| failure(&diagnostics, code, "failed to open device"))?;
        diagnostics.clear();

        let negotiated = device.negotiated();
        let format = StreamFormat {
            format: if negotiated.format.is_known() {
                negotiated.format
            } else {
                requested.format
            },
            channels: if negotiated.channels != 0 {
                negotiated.channels
            } else {
                requested.channels
            },
            sample_rate: if negotiated.sample_rate != 0 {
                negotiated.sample_rate
            } else if requested.sample_rate != 0 {
                requested.sample_rate
            } else {
                DEFAULT_SAMPLE_RATE
            },
        };
        if format.bytes_per_frame() == 0 {
            return Err(failure(
                &diagnostics,
                ErrorCode::FormatNotSupported,
                "device negotiated a zero-sized frame",
            ));
        }

        let buffer_size_in_frames = if config.buffer_size_in_frames != 0 {
            config.buffer_size_in_frames
        } else {
            default_buffer_size(format.sample_rate, negotiated.period_size_in_frames)
        };

        log::info!(
            "{:?} device opened on {}: {:?} x{} @ {} Hz, {} frame buffer",
            direction,
            self.backend.name(),
            format.format,
            format.channels,
            format.sample_rate,
            buffer_size_in_frames
        );

        Ok(OpenedDevice {
            device,
            context,
            log: backend_log,
            diagnostics,
            initial_error,
            format,
            buffer_size_in_frames,
        })
    }
}
