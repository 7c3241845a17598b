use super::backend_log::LogLevel;
use super::spin_lock::SpinLock;

/// Longest diagnostic kept, in bytes. Longer messages are cut at a char boundary.
pub const MAX_DIAGNOSTIC_LEN: usize = 256;

struct Slot {
    pending: bool,
    len: usize,
    bytes: [u8; MAX_DIAGNOSTIC_LEN],
}

/// Most recent warning-or-worse message posted by the backend.
///
/// Turns asynchronous backend log output into something a failing call can
/// attach to its error state. One slot only: a newer message replaces an
/// unread older one. `store` never allocates, so it may run on the realtime
/// thread.
pub struct DiagnosticCapture {
    slot: SpinLock<Slot>,
}

impl DiagnosticCapture {
    pub fn new() -> Self {
        Self {
            slot: SpinLock::new(Slot {
                pending: false,
                len: 0,
                bytes: [0; MAX_DIAGNOSTIC_LEN],
            }),
        }
    }

    /// Record `message` if `level` is at least `Warning`; otherwise ignore it.
    pub fn store(&self, level: LogLevel, message: &str) {
        if level < LogLevel::Warning {
            return;
        }

        let mut len = message.len().min(MAX_DIAGNOSTIC_LEN);
        while !message.is_char_boundary(len) {
            len -= 1;
        }

        let mut slot = self.slot.lock();
        slot.bytes[..len].copy_from_slice(&message.as_bytes()[..len]);
        slot.len = len;
        slot.pending = true;
    }

    /// Move a pending message into `out`, replacing its contents.
    ///
    /// Returns `false` and leaves `out` alone if nothing is pending.
    pub fn take_into(&self, out: &mut String) -> bool {
        let mut slot = self.slot.lock();
        if !slot.pending {
            return false;
        }
        slot.pending = false;
        let len = slot.len;
        out.clear();
        // `store` only ever copies whole UTF-8 prefixes.
        out.push_str(std::str::from_utf8(&slot.bytes[..len]).unwrap_or_default());
        true
    }

    #[cfg(test)]
    pub(crate) fn take(&self) -> Option<String> {
        let mut message = String::new();
        self.take_into(&mut message).then_some(message)
    }

    /// Drop any pending message.
    pub fn clear(&self) {
        self.slot.lock().pending = false;
    }

    #[cfg(test)]
    pub(crate) fn has_pending(&self) -> bool {
        self.slot.lock().pending
    }
}

impl Default for DiagnosticCapture {
    fn default() -> Self {
        Self::new()
    }
}
