//! Per-session backend log object.
//!
//! Each session owns one [`BackendLog`]. The backend posts events through a
//! [`LogHandle`]; every event goes to the `log` facade under the
//! `audio_backend` target and to the callback registered on the log, if any.
//! Dropping the `BackendLog` unregisters the callback, so events posted by a
//! backend that outlives its session go nowhere.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::models::error::ErrorCode;

/// Severity of a backend log event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl From<LogLevel> for log::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => log::Level::Debug,
            LogLevel::Info => log::Level::Info,
            LogLevel::Warning => log::Level::Warn,
            LogLevel::Error => log::Level::Error,
        }
    }
}

/// Receiver of backend log events.
pub type LogCallback = Arc<dyn Fn(LogLevel, &str) + Send + Sync + 'static>;

#[derive(Default)]
struct LogShared {
    callback: RwLock<Option<LogCallback>>,
}

/// Log object scoped to one session.
#[derive(Default)]
pub struct BackendLog {
    shared: Arc<LogShared>,
}

impl BackendLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach `callback`. Only one callback may be registered at a time.
    pub fn register_callback(&self, callback: LogCallback) -> Result<(), ErrorCode> {
        let mut slot = self.shared.callback.write();
        if slot.is_some() {
            return Err(ErrorCode::InvalidOperation);
        }
        *slot = Some(callback);
        Ok(())
    }

    pub fn unregister_callback(&self) {
        self.shared.callback.write().take();
    }

    /// Handle the backend uses to post events into this log.
    pub fn handle(&self) -> LogHandle {
        LogHandle {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl Drop for BackendLog {
    fn drop(&mut self) {
        self.unregister_callback();
    }
}

/// Cloneable posting end of a [`BackendLog`].
#[derive(Clone)]
pub struct LogHandle {
    shared: Arc<LogShared>,
}

impl LogHandle {
    pub fn post(&self, level: LogLevel, message: &str) {
        log::log!(target: "audio_backend", log::Level::from(level), "{}", message);
        if let Some(callback) = self.shared.callback.read().as_ref() {
            callback(level, message);
        }
    }

    pub fn has_callback(&self) -> bool {
        self.shared.callback.read().is_some()
    }
}
