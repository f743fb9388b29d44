//! Contest admission error types.

use crate::{db::StoreError, errors::ErrorKind};
use thiserror::Error;

/// Errors raised by admission, withdrawal and matchmaking
#[derive(Debug, Error)]
pub enum ContestError {
    #[error("Contest not found: {0}")]
    NotFound(i64),

    #[error("Entry not found: {0}")]
    EntryNotFound(i64),

    #[error("Room not found: {0}")]
    RoomNotFound(i64),

    #[error("Account not found for user {0}")]
    AccountNotFound(i64),

    #[error("Contest {0} is not open for entries")]
    NotOpen(i64),

    #[error("Contest {0} is full")]
    Full(i64),

    #[error("Insufficient balance: have {balance}, entry fee {fee}")]
    InsufficientBalance { balance: i64, fee: i64 },

    #[error("Already entered contest {0}")]
    AlreadyEntered(i64),

    #[error("Entry limit of {limit} reached for contest {contest_id}")]
    EntryLimitReached { contest_id: i64, limit: i64 },

    #[error("Already waiting in {0} unfilled rooms")]
    TooManyUnfilledRooms(i64),

    #[error("Another request for this contest is in progress")]
    LockBusy,

    #[error("Entry {0} can no longer be withdrawn")]
    NotWithdrawable(i64),

    #[error("No room with free capacity after {0} attempts")]
    NoRoomAvailable(usize),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

impl ContestError {
    /// Classify the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            ContestError::NotFound(_)
            | ContestError::EntryNotFound(_)
            | ContestError::RoomNotFound(_)
            | ContestError::AccountNotFound(_) => ErrorKind::Validation,
            ContestError::NotOpen(_)
            | ContestError::AlreadyEntered(_)
            | ContestError::NotWithdrawable(_) => ErrorKind::Conflict,
            ContestError::Full(_)
            | ContestError::InsufficientBalance { .. }
            | ContestError::EntryLimitReached { .. }
            | ContestError::TooManyUnfilledRooms(_) => ErrorKind::ResourceExhausted,
            ContestError::LockBusy | ContestError::NoRoomAvailable(_) => {
                ErrorKind::ConcurrencyBusy
            }
            ContestError::Store(e) if e.is_retryable() => ErrorKind::ConcurrencyBusy,
            ContestError::Store(_) => ErrorKind::Fatal,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }

    /// Get a client-safe error message
    pub fn client_message(&self) -> String {
        match self {
            ContestError::Store(e) => e.client_message(),
            _ => self.to_string(),
        }
    }
}

/// Result type for contest operations
pub type ContestResult<T> = Result<T, ContestError>;
