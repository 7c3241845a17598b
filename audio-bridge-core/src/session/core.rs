use std::sync::Arc;

use crate::diagnostics::backend_log::BackendLog;
use crate::diagnostics::capture::DiagnosticCapture;
use crate::diagnostics::error_state::ErrorState;
use crate::models::error::ErrorCode;
use crate::models::format::{Direction, StreamFormat};
use crate::models::state::SessionState;
use crate::traits::backend::{BackendContext, BackendDevice, DataCallback};

/// Backend resources and bookkeeping common to capture and playback sessions.
///
/// Fields drop in declaration order, which is the reverse of the order they
/// were opened in: device, then context, then log registration, then the
/// diagnostic slot the log fed.
pub(crate) struct SessionCore {
    device: Box<dyn BackendDevice>,
    _context: Box<dyn BackendContext>,
    _log: Option<BackendLog>,
    diagnostics: Arc<DiagnosticCapture>,

    error: ErrorState,
    state: SessionState,
    direction: Direction,
    format: StreamFormat,
    buffer_size_in_frames: u32,
    backend_name: String,
}

pub(crate) struct CoreParts {
    pub device: Box<dyn BackendDevice>,
    pub context: Box<dyn BackendContext>,
    pub log: Option<BackendLog>,
    pub diagnostics: Arc<DiagnosticCapture>,
    pub error: ErrorState,
    pub direction: Direction,
    pub format: StreamFormat,
    pub buffer_size_in_frames: u32,
    pub backend_name: String,
}

impl SessionCore {
    pub(crate) fn new(parts: CoreParts) -> Self {
        Self {
            device: parts.device,
            _context: parts.context,
            _log: parts.log,
            diagnostics: parts.diagnostics,
            error: parts.error,
            state: SessionState::Stopped,
            direction: parts.direction,
            format: parts.format,
            buffer_size_in_frames: parts.buffer_size_in_frames,
            backend_name: parts.backend_name,
        }
    }

    pub(crate) fn start(&mut self) -> Result<(), ErrorCode> {
        if self.state.is_running() {
            self.error.set_success();
            return Ok(());
        }

        self.diagnostics.clear();
        match self.device.start() {
            Ok(()) => {
                self.state = SessionState::Running;
                self.error.set_success();
                log::info!("{:?} session started on {}", self.direction, self.backend_name);
                Ok(())
            }
            Err(code) => {
                self.error
                    .set_failure(code, Some("failed to start device"), &self.diagnostics);
                log::warn!(
                    "{:?} session failed to start: {}",
                    self.direction,
                    self.error.message()
                );
                Err(code)
            }
        }
    }

    pub(crate) fn stop(&mut self) -> Result<(), ErrorCode> {
        if self.state.is_stopped() {
            self.error.set_success();
            return Ok(());
        }

        self.diagnostics.clear();
        match self.device.stop() {
            Ok(()) => {
                self.state = SessionState::Stopped;
                self.error.set_success();
                log::info!("{:?} session stopped", self.direction);
                Ok(())
            }
            Err(code) => {
                self.error
                    .set_failure(code, Some("failed to stop device"), &self.diagnostics);
                log::warn!(
                    "{:?} session failed to stop: {}",
                    self.direction,
                    self.error.message()
                );
                Err(code)
            }
        }
    }

    /// Hand a replacement data callback to the stopped device. The old one is
    /// dropped by the device.
    pub(crate) fn rebind(&mut self, callback: Box<dyn DataCallback>) -> Result<(), ErrorCode> {
        debug_assert!(self.state.is_stopped(), "rebind while running");
        self.diagnostics.clear();
        self.device.bind(callback).map_err(|code| {
            self.error
                .set_failure(code, Some("failed to bind data callback"), &self.diagnostics);
            code
        })
    }

    /// Record a failure that no backend call was involved in.
    pub(crate) fn set_rejected(&mut self, code: ErrorCode, message: &str) {
        self.error.set_rejected(code, message);
    }

    /// Stop if running. Called once before the backend resources drop.
    pub(crate) fn shutdown(&mut self) {
        if self.state.is_running() && self.stop().is_err() {
            log::warn!(
                "{:?} session destroyed while the device refused to stop",
                self.direction
            );
        }
    }

    /// Validate a read/write request against the negotiated frame size.
    ///
    /// Records `InvalidArgs` and returns `false` when the buffer is empty, the
    /// count is zero, or the buffer cannot hold `frame_count` frames.
    pub(crate) fn check_io_request(&mut self, buffer_len: usize, frame_count: usize, what: &str) -> bool {
        let needed = frame_count.checked_mul(self.format.bytes_per_frame());
        let valid = buffer_len != 0 && frame_count != 0 && needed.is_some_and(|n| n <= buffer_len);
        if !valid {
            let message = format!(
                "{} buffer of {} bytes cannot hold {} frames of {} bytes",
                what,
                buffer_len,
                frame_count,
                self.format.bytes_per_frame()
            );
            self.error.set_rejected(ErrorCode::InvalidArgs, &message);
        }
        valid
    }

    /// Check that a typed sample slice matches the negotiated sample width.
    pub(crate) fn check_sample_width(&mut self, width: usize) -> bool {
        let expected = self.format.format.bytes_per_sample();
        if width != expected {
            let message = format!(
                "sample type is {} bytes wide but the session negotiated {:?} ({} bytes)",
                width, self.format.format, expected
            );
            self.error.set_rejected(ErrorCode::InvalidArgs, &message);
            return false;
        }
        true
    }

    pub(crate) fn set_success(&mut self) {
        self.error.set_success();
    }

    pub(crate) fn state(&self) -> SessionState {
        self.state
    }

    pub(crate) fn format(&self) -> StreamFormat {
        self.format
    }

    pub(crate) fn buffer_size_in_frames(&self) -> u32 {
        self.buffer_size_in_frames
    }

    pub(crate) fn last_result(&self) -> Result<(), ErrorCode> {
        self.error.result()
    }

    pub(crate) fn last_error_message(&self) -> &str {
        self.error.message()
    }

    pub(crate) fn direction(&self) -> Direction {
        self.direction
    }
}
