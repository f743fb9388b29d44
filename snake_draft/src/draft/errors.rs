//! Draft error types.

use super::models::{Position, RosterSlot};
use crate::{db::StoreError, errors::ErrorKind};
use thiserror::Error;

/// Errors raised by the draft scheduler, store and rules
#[derive(Debug, Error)]
pub enum DraftError {
    #[error("Room not found: {0}")]
    RoomNotFound(i64),

    #[error("No draft state for room {0}")]
    DraftNotFound(i64),

    #[error("Draft for room {0} is not active")]
    DraftNotActive(i64),

    #[error("Room {room_id} not ready: {entries}/{capacity} entries")]
    NotReady {
        room_id: i64,
        entries: usize,
        capacity: usize,
    },

    #[error("Draft for room {0} already launched")]
    AlreadyLaunched(i64),

    #[error("Not your turn")]
    NotYourTurn,

    #[error("User is not drafting in this room")]
    NotInDraft,

    #[error("Player {0} is not available")]
    PlayerUnavailable(String),

    #[error("A {position} cannot fill the {slot} slot")]
    IllegalSlot { position: Position, slot: RosterSlot },

    #[error("Roster slot {0} is already filled")]
    SlotFilled(RosterSlot),

    #[error("Insufficient budget: price {price}, remaining {budget}")]
    InsufficientBudget { price: i64, budget: i64 },

    #[error("A pick is already being processed for this user")]
    PickInFlight,

    #[error("Corrupted draft state: {0}")]
    CorruptedState(String),

    #[error("Board generation failed: {0}")]
    Board(String),

    #[error("Draft actor for room {0} has stopped")]
    RoomClosed(i64),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

impl DraftError {
    /// Classify the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            DraftError::RoomNotFound(_)
            | DraftError::DraftNotFound(_)
            | DraftError::NotInDraft
            | DraftError::IllegalSlot { .. } => ErrorKind::Validation,
            DraftError::DraftNotActive(_)
            | DraftError::NotReady { .. }
            | DraftError::AlreadyLaunched(_)
            | DraftError::NotYourTurn
            | DraftError::PlayerUnavailable(_)
            | DraftError::SlotFilled(_)
            | DraftError::RoomClosed(_) => ErrorKind::Conflict,
            DraftError::InsufficientBudget { .. } => ErrorKind::ResourceExhausted,
            DraftError::PickInFlight => ErrorKind::ConcurrencyBusy,
            DraftError::CorruptedState(_) => ErrorKind::CorruptedState,
            DraftError::Board(_) => ErrorKind::Fatal,
            DraftError::Store(e) if e.is_retryable() => ErrorKind::ConcurrencyBusy,
            DraftError::Store(_) => ErrorKind::Fatal,
        }
    }

    /// Whether the pick or action may be retried unchanged
    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }

    /// Get a client-safe error message
    pub fn client_message(&self) -> String {
        match self {
            DraftError::Store(e) => e.client_message(),
            DraftError::CorruptedState(_) | DraftError::Board(_) => {
                "Internal server error".to_string()
            }
            _ => self.to_string(),
        }
    }
}

/// Result type for draft operations
pub type DraftResult<T> = Result<T, DraftError>;
