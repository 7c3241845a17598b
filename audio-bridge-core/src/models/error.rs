use thiserror::Error;

/// Result codes reported by sessions and audio backends.
///
/// `Display` yields the generic description of the code, which is the last
/// resort when neither a captured diagnostic nor a call-specific message is
/// available. Success is `Ok(())`; there is no success variant.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    #[error("unknown error")]
    Generic,

    #[error("invalid argument")]
    InvalidArgs,

    #[error("invalid operation")]
    InvalidOperation,

    #[error("out of memory")]
    OutOfMemory,

    #[error("format not supported")]
    FormatNotSupported,

    #[error("no backend available")]
    NoBackend,

    #[error("no device available")]
    NoDevice,

    #[error("access denied")]
    AccessDenied,

    #[error("device busy")]
    DeviceBusy,

    #[error("failed to initialize backend")]
    FailedToInitBackend,

    #[error("failed to open backend device")]
    FailedToOpenBackendDevice,

    #[error("failed to start backend device")]
    FailedToStartBackendDevice,

    #[error("failed to stop backend device")]
    FailedToStopBackendDevice,
}

/// Construction failure returned by the session factory.
///
/// Carries the code of the step that failed and the best available message
/// for it; all partially opened resources have been released by the time
/// this value reaches the caller.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct SessionError {
    pub code: ErrorCode,
    pub message: String,
}

impl SessionError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl From<ErrorCode> for SessionError {
    fn from(code: ErrorCode) -> Self {
        Self {
            code,
            message: code.to_string(),
        }
    }
}
