//! Error taxonomy shared by every component.
//!
//! Each module keeps its own `thiserror` enum; `ErrorKind` is the coarse
//! classification callers use to decide between rejecting, retrying and
//! forcing a draft to completion.

use serde::{Deserialize, Serialize};

/// Coarse error classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Illegal slot or malformed input; no state change
    Validation,
    /// Not your turn, slot filled, room full, already entered
    Conflict,
    /// Insufficient balance or budget
    ResourceExhausted,
    /// Lock held or transaction serialization failure; retryable
    ConcurrencyBusy,
    /// Structural invariant violated on read
    CorruptedState,
    /// Anything unexpected
    Fatal,
}

impl ErrorKind {
    /// Whether a caller may retry the same request unchanged
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::ConcurrencyBusy)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Validation => write!(f, "validation"),
            ErrorKind::Conflict => write!(f, "conflict"),
            ErrorKind::ResourceExhausted => write!(f, "resource_exhausted"),
            ErrorKind::ConcurrencyBusy => write!(f, "concurrency_busy"),
            ErrorKind::CorruptedState => write!(f, "corrupted_state"),
            ErrorKind::Fatal => write!(f, "fatal"),
        }
    }
}
