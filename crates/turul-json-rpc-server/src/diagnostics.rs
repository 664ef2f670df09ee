//! Last-error record for host-side diagnostics.
//!
//! Internal failures (accept, read, write, buffer growth, malformed input,
//! handler panics) are stored here so the embedding application can inspect
//! what went wrong after the fact. Protocol errors sent to clients are not
//! recorded unless they also tear down a connection.

use std::fmt;
use std::io;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::ServerError;

/// The most recent internal failure observed by a server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorRecord {
    /// OS error number, or -1 for failures that did not come from the OS
    pub code: i32,
    /// Short tag naming the failing step, e.g. `"read"` or `"accept"`
    pub cause: String,
    pub message: String,
}

impl ErrorRecord {
    pub fn new(code: i32, cause: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code,
            cause: cause.into(),
            message: message.into(),
        }
    }

    pub fn from_io(cause: impl Into<String>, err: &io::Error) -> Self {
        Self::new(err.raw_os_error().unwrap_or(-1), cause, err.to_string())
    }
}

impl From<&ServerError> for ErrorRecord {
    fn from(err: &ServerError) -> Self {
        Self::new(err.code(), err.cause(), err.to_string())
    }
}

impl fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.cause, self.code, self.message)
    }
}

/// Shared slot holding the last [`ErrorRecord`]; overwritten on each failure
#[derive(Debug, Clone, Default)]
pub(crate) struct ErrorSlot(Arc<Mutex<Option<ErrorRecord>>>);

impl ErrorSlot {
    pub(crate) fn set(&self, record: ErrorRecord) {
        *self.0.lock() = Some(record);
    }

    pub(crate) fn get(&self) -> Option<ErrorRecord> {
        self.0.lock().clone()
    }

    pub(crate) fn clear(&self) {
        *self.0.lock() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_overwrites_and_clears() {
        let slot = ErrorSlot::default();
        assert_eq!(slot.get(), None);

        slot.set(ErrorRecord::new(-1, "read", "first"));
        slot.set(ErrorRecord::new(-1, "accept", "second"));
        assert_eq!(slot.get().map(|r| r.cause), Some("accept".to_string()));

        slot.clear();
        assert_eq!(slot.get(), None);
    }

    #[test]
    fn test_record_from_io_error() {
        let err = io::Error::from_raw_os_error(104);
        let record = ErrorRecord::from_io("read", &err);
        assert_eq!(record.code, 104);
        assert_eq!(record.cause, "read");
    }

    #[test]
    fn test_record_from_server_error() {
        let err = ServerError::RuntimeNotOwned;
        let record = ErrorRecord::from(&err);
        assert_eq!(record.code, -1);
        assert_eq!(record.cause, "runtime");
        assert_eq!(record.to_string(), format!("runtime (-1): {}", err));
    }
}
