//! Handler error with a recoverability flag.
//!
//! The event queue redelivers an event only when the handler failed with a
//! recoverable error; unrecoverable errors (malformed key, unknown file) are
//! logged and dropped from the queue's point of view.

use std::fmt;

#[derive(Debug)]
pub struct ScanTaskError {
    recoverable: bool,
    source: anyhow::Error,
}

impl ScanTaskError {
    /// An error worth redelivering for: store unreachable, engine retry
    /// budget not yet exhausted, and similar transient conditions.
    pub fn recoverable(source: anyhow::Error) -> Self {
        Self {
            recoverable: true,
            source,
        }
    }

    /// An error that redelivery cannot fix.
    pub fn unrecoverable(source: anyhow::Error) -> Self {
        Self {
            recoverable: false,
            source,
        }
    }

    pub fn is_recoverable(&self) -> bool {
        self.recoverable
    }
}

impl fmt::Display for ScanTaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)
    }
}

impl std::error::Error for ScanTaskError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.source.as_ref())
    }
}
