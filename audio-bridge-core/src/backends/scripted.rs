//! In-process backend whose failures, negotiated format, and callback timing
//! are controlled by the test through a shared [`Script`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::diagnostics::backend_log::{BackendLog, LogHandle, LogLevel};
use crate::models::error::ErrorCode;
use crate::traits::backend::{
    AudioBackend, BackendContext, BackendDevice, DataCallback, DeviceConfig, NegotiatedFormat,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Step {
    OpenLog,
    RegisterLog,
    OpenContext,
    OpenDevice,
    Bind,
    Start,
    Stop,
}

struct Failure {
    step: Step,
    code: ErrorCode,
    diagnostic: Option<String>,
}

#[derive(Default)]
pub(crate) struct Script {
    failures: Mutex<Vec<Failure>>,
    warnings: Mutex<Vec<(Step, String)>>,
    negotiated: Mutex<Option<NegotiatedFormat>>,
    events: Mutex<Vec<String>>,
    callback: Mutex<Option<Box<dyn DataCallback>>>,
    running: AtomicBool,
}

impl Script {
    pub(crate) fn fail(&self, step: Step, code: ErrorCode) {
        self.failures.lock().push(Failure {
            step,
            code,
            diagnostic: None,
        });
    }

    /// Fail `step` with `code`, posting `diagnostic` to the backend log first.
    pub(crate) fn fail_with_diagnostic(&self, step: Step, code: ErrorCode, diagnostic: &str) {
        self.failures.lock().push(Failure {
            step,
            code,
            diagnostic: Some(diagnostic.to_string()),
        });
    }

    /// Post `message` as a warning whenever `step` runs, successful or not.
    pub(crate) fn warn_on(&self, step: Step, message: &str) {
        self.warnings.lock().push((step, message.to_string()));
    }

    pub(crate) fn clear_failures(&self) {
        self.failures.lock().clear();
    }

    pub(crate) fn negotiate(&self, format: NegotiatedFormat) {
        *self.negotiated.lock() = Some(format);
    }

    pub(crate) fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    pub(crate) fn count(&self, event: &str) -> usize {
        self.events.lock().iter().filter(|e| e.as_str() == event).count()
    }

    /// Run one capture callback. Returns `false` if the device is not running.
    pub(crate) fn drive_capture(&self, input: &[u8], frame_count: u32) -> bool {
        if !self.running.load(Ordering::Acquire) {
            return false;
        }
        match self.callback.lock().as_mut() {
            Some(callback) => {
                callback.process(None, Some(input), frame_count);
                true
            }
            None => false,
        }
    }

    /// Run one playback callback over a buffer pre-filled with `0xAA`.
    pub(crate) fn drive_playback(&self, frame_count: u32, frame_size: usize) -> Option<Vec<u8>> {
        if !self.running.load(Ordering::Acquire) {
            return None;
        }
        let mut output = vec![0xAA; frame_count as usize * frame_size];
        self.callback
            .lock()
            .as_mut()?
            .process(Some(&mut output), None, frame_count);
        Some(output)
    }

    fn record(&self, event: impl Into<String>) {
        self.events.lock().push(event.into());
    }

    /// Check whether `step` is scripted to fail, posting its diagnostic.
    fn check(&self, step: Step, log: Option<&LogHandle>) -> Result<(), ErrorCode> {
        if let Some(log) = log {
            for (_, message) in self.warnings.lock().iter().filter(|(s, _)| *s == step) {
                log.post(LogLevel::Warning, message);
            }
        }

        let failures = self.failures.lock();
        let Some(failure) = failures.iter().find(|f| f.step == step) else {
            return Ok(());
        };
        if let (Some(log), Some(message)) = (log, failure.diagnostic.as_deref()) {
            log.post(LogLevel::Error, message);
        }
        Err(failure.code)
    }
}

pub(crate) struct ScriptedBackend {
    script: Arc<Script>,
}

impl ScriptedBackend {
    pub(crate) fn new() -> (Self, Arc<Script>) {
        let script = Arc::new(Script::default());
        (
            Self {
                script: Arc::clone(&script),
            },
            script,
        )
    }
}

impl AudioBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    fn open_log(&self) -> Result<BackendLog, ErrorCode> {
        self.script.record("open log");
        self.script.check(Step::OpenLog, None)?;

        let log = BackendLog::new();
        if self.script.check(Step::RegisterLog, None).is_err() {
            // Occupy the slot so the session's registration is refused.
            log.register_callback(Arc::new(|_: LogLevel, _: &str| {}))?;
        }
        Ok(log)
    }

    fn open_context(&self, log: Option<LogHandle>) -> Result<Box<dyn BackendContext>, ErrorCode> {
        self.script.record(if log.is_some() {
            "open context"
        } else {
            "open context without log"
        });
        self.script.check(Step::OpenContext, log.as_ref())?;
        Ok(Box::new(ScriptedContext {
            script: Arc::clone(&self.script),
            log,
        }))
    }
}

struct ScriptedContext {
    script: Arc<Script>,
    log: Option<LogHandle>,
}

impl BackendContext for ScriptedContext {
    fn open_device(&mut self, config: &DeviceConfig) -> Result<Box<dyn BackendDevice>, ErrorCode> {
        self.script.record(format!(
            "open device {:?} {:?} x{} @ {}",
            config.direction, config.format, config.channels, config.sample_rate
        ));
        self.script.check(Step::OpenDevice, self.log.as_ref())?;

        let negotiated = self.script.negotiated.lock().unwrap_or(NegotiatedFormat {
            format: config.format,
            channels: config.channels,
            sample_rate: config.sample_rate,
            period_size_in_frames: 0,
        });
        Ok(Box::new(ScriptedDevice {
            script: Arc::clone(&self.script),
            log: self.log.clone(),
            negotiated,
        }))
    }
}

impl Drop for ScriptedContext {
    fn drop(&mut self) {
        let attached = self.log.as_ref().is_some_and(LogHandle::has_callback);
        self.script
            .record(format!("drop context (log attached: {})", attached));
    }
}

struct ScriptedDevice {
    script: Arc<Script>,
    log: Option<LogHandle>,
    negotiated: NegotiatedFormat,
}

impl BackendDevice for ScriptedDevice {
    fn negotiated(&self) -> NegotiatedFormat {
        self.negotiated
    }

    fn bind(&mut self, callback: Box<dyn DataCallback>) -> Result<(), ErrorCode> {
        self.script.record("bind");
        self.script.check(Step::Bind, self.log.as_ref())?;
        *self.script.callback.lock() = Some(callback);
        Ok(())
    }

    fn start(&mut self) -> Result<(), ErrorCode> {
        self.script.record("start");
        self.script.check(Step::Start, self.log.as_ref())?;
        if self.script.callback.lock().is_none() {
            return Err(ErrorCode::InvalidOperation);
        }
        self.script.running.store(true, Ordering::Release);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), ErrorCode> {
        self.script.record("stop");
        self.script.check(Step::Stop, self.log.as_ref())?;
        self.script.running.store(false, Ordering::Release);
        Ok(())
    }
}

impl Drop for ScriptedDevice {
    fn drop(&mut self) {
        self.script.running.store(false, Ordering::Release);
        self.script.callback.lock().take();
        self.script.record("drop device");
    }
}
