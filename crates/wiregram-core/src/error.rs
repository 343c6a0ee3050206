//! Error strata shared by the runtime and the driver.
//!
//! `MissingData` is not user-visible: the runtime catches it, suspends
//! the activation, and retries after the stream grows. Everything else
//! surfaces to the host, either after a failed resynchronization
//! (recoverable) or immediately (fatal).

use crate::location::Location;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// Input did not match the grammar. Recoverable at a `&synchronize`
    /// boundary.
    #[error("parse error at input offset {offset}: {reason}")]
    Recoverable {
        reason: String,
        offset: u64,
        location: Option<Location>,
    },

    /// More bytes are required and the stream is not frozen. Internal
    /// suspension signal.
    #[error("missing data at input offset {offset}")]
    MissingData { offset: u64 },

    /// A typed conversion failed.
    #[error("value out of range: {0}")]
    OutOfRange(String),

    /// A user-level `&requires` check failed.
    #[error("assertion failed: {0}")]
    AssertionFailure(String),

    /// A sink was connected or fed inconsistently with its typing.
    #[error("context mismatch: {0}")]
    ContextMismatch(String),

    /// Append on a frozen stream.
    #[error("stream is frozen")]
    Frozen,

    /// A bug, or use of the runtime after `done()`.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ParseError {
    pub fn recoverable(reason: impl Into<String>, offset: u64) -> Self {
        ParseError::Recoverable {
            reason: reason.into(),
            offset,
            location: None,
        }
    }

    pub fn with_location(self, location: Location) -> Self {
        match self {
            ParseError::Recoverable { reason, offset, .. } => ParseError::Recoverable {
                reason,
                offset,
                location: Some(location),
            },
            other => other,
        }
    }

    /// True for errors a `&synchronize` region may recover from.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ParseError::Recoverable { .. })
    }

    pub fn is_missing_data(&self) -> bool {
        matches!(self, ParseError::MissingData { .. })
    }

    /// True for errors that latch the driver into a failed state.
    pub fn is_fatal(&self) -> bool {
        !self.is_recoverable() && !self.is_missing_data()
    }
}

pub type Result<T> = std::result::Result<T, ParseError>;
