use crate::models::error::ErrorCode;

use super::capture::DiagnosticCapture;

/// Result of the last operation on a session, with a readable message.
///
/// Success always carries an empty message; a failure always carries a
/// non-empty one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorState {
    code: Option<ErrorCode>,
    message: String,
}

impl ErrorState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_success(&mut self) {
        self.code = None;
        self.message.clear();
    }

    /// Record a failure.
    ///
    /// The message is, in order of preference: a diagnostic the backend posted
    /// while the failing call ran, `fallback` describing the call, or the
    /// generic description of `code`.
    pub fn set_failure(&mut self, code: ErrorCode, fallback: Option<&str>, diagnostics: &DiagnosticCapture) {
        self.code = Some(code);
        if diagnostics.take_into(&mut self.message) && !self.message.is_empty() {
            return;
        }
        self.message.clear();
        match fallback.filter(|text| !text.is_empty()) {
            Some(text) => self.message.push_str(text),
            None => self.message.push_str(&code.to_string()),
        }
    }

    /// Record a failure the caller caused, with an explicit message. Backend
    /// diagnostics are left pending since they do not describe this failure.
    pub fn set_rejected(&mut self, code: ErrorCode, message: &str) {
        self.code = Some(code);
        self.message.clear();
        if message.is_empty() {
            self.message.push_str(&code.to_string());
        } else {
            self.message.push_str(message);
        }
    }

    pub fn result(&self) -> Result<(), ErrorCode> {
        match self.code {
            Some(code) => Err(code),
            None => Ok(()),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}
