//! Contest, room and entry models.

use crate::draft::models::{Participant, Roster};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Contest ID type
pub type ContestId = i64;

/// Entry ID type
pub type EntryId = i64;

/// Default number of drafters per room
pub const ROOM_CAPACITY: usize = 5;

/// How a contest fills
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContestType {
    /// One room; a replacement contest is provisioned when it fills
    SingleRoom,
    /// Many rooms up to `max_entries`
    MultiRoom,
}

impl std::fmt::Display for ContestType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContestType::SingleRoom => write!(f, "single_room"),
            ContestType::MultiRoom => write!(f, "multi_room"),
        }
    }
}

impl std::str::FromStr for ContestType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "single_room" => Ok(ContestType::SingleRoom),
            "multi_room" => Ok(ContestType::MultiRoom),
            other => Err(format!("unknown contest type: {other}")),
        }
    }
}

/// Contest status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContestStatus {
    Open,
    Closed,
    Completed,
}

impl std::fmt::Display for ContestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContestStatus::Open => write!(f, "open"),
            ContestStatus::Closed => write!(f, "closed"),
            ContestStatus::Completed => write!(f, "completed"),
        }
    }
}

impl std::str::FromStr for ContestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(ContestStatus::Open),
            "closed" => Ok(ContestStatus::Closed),
            "completed" => Ok(ContestStatus::Completed),
            other => Err(format!("unknown contest status: {other}")),
        }
    }
}

/// Contest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contest {
    pub id: ContestId,
    pub name: String,
    pub contest_type: ContestType,
    pub status: ContestStatus,
    pub entry_fee: i64,
    /// Total entries across all rooms
    pub max_entries: i64,
    pub current_entries: i64,
    pub room_capacity: usize,
    pub max_entries_per_user: i64,
    pub created_at: DateTime<Utc>,
}

impl Contest {
    pub fn is_full(&self) -> bool {
        self.current_entries >= self.max_entries
    }
}

/// Parameters for creating a contest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewContest {
    pub name: String,
    pub contest_type: ContestType,
    pub entry_fee: i64,
    pub max_entries: i64,
    pub room_capacity: usize,
    pub max_entries_per_user: i64,
}

impl NewContest {
    /// A single five-seat room
    pub fn single_room(name: impl Into<String>, entry_fee: i64) -> Self {
        Self {
            name: name.into(),
            contest_type: ContestType::SingleRoom,
            entry_fee,
            max_entries: ROOM_CAPACITY as i64,
            room_capacity: ROOM_CAPACITY,
            max_entries_per_user: 1,
        }
    }

    /// `rooms` five-seat rooms under one contest
    pub fn multi_room(name: impl Into<String>, entry_fee: i64, rooms: i64, per_user: i64) -> Self {
        Self {
            name: name.into(),
            contest_type: ContestType::MultiRoom,
            entry_fee,
            max_entries: rooms * ROOM_CAPACITY as i64,
            room_capacity: ROOM_CAPACITY,
            max_entries_per_user: per_user,
        }
    }

    /// Fresh copy of a filled single-room contest
    pub fn replacement_for(contest: &Contest) -> Self {
        Self {
            name: contest.name.clone(),
            contest_type: contest.contest_type,
            entry_fee: contest.entry_fee,
            max_entries: contest.max_entries,
            room_capacity: contest.room_capacity,
            max_entries_per_user: contest.max_entries_per_user,
        }
    }
}

/// Room lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomStatus {
    Waiting,
    Ready,
    Drafting,
    Completed,
}

impl RoomStatus {
    /// Whether the room's draft has not started yet
    pub fn is_pre_draft(self) -> bool {
        matches!(self, RoomStatus::Waiting | RoomStatus::Ready)
    }
}

impl std::fmt::Display for RoomStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RoomStatus::Waiting => write!(f, "waiting"),
            RoomStatus::Ready => write!(f, "ready"),
            RoomStatus::Drafting => write!(f, "drafting"),
            RoomStatus::Completed => write!(f, "completed"),
        }
    }
}

impl std::str::FromStr for RoomStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "waiting" => Ok(RoomStatus::Waiting),
            "ready" => Ok(RoomStatus::Ready),
            "drafting" => Ok(RoomStatus::Drafting),
            "completed" => Ok(RoomStatus::Completed),
            other => Err(format!("unknown room status: {other}")),
        }
    }
}

/// A fixed-capacity drafting room within a contest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContestRoom {
    pub id: i64,
    pub contest_id: ContestId,
    pub room_number: i32,
    pub capacity: usize,
    pub status: RoomStatus,
    pub created_at: DateTime<Utc>,
    pub launched_at: Option<DateTime<Utc>>,
}

/// Entry status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Pending,
    Drafting,
    Completed,
    Cancelled,
}

impl EntryStatus {
    /// Entries that count toward room occupancy
    pub fn is_active(self) -> bool {
        self != EntryStatus::Cancelled
    }
}

impl std::fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntryStatus::Pending => write!(f, "pending"),
            EntryStatus::Drafting => write!(f, "drafting"),
            EntryStatus::Completed => write!(f, "completed"),
            EntryStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for EntryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(EntryStatus::Pending),
            "drafting" => Ok(EntryStatus::Drafting),
            "completed" => Ok(EntryStatus::Completed),
            "cancelled" => Ok(EntryStatus::Cancelled),
            other => Err(format!("unknown entry status: {other}")),
        }
    }
}

/// A user's paid seat in a contest room
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub id: EntryId,
    pub contest_id: ContestId,
    pub room_id: i64,
    pub user_id: i64,
    pub username: String,
    /// Seat in [0, capacity); `None` only in damaged rows awaiting repair
    pub draft_position: Option<u32>,
    pub fee_paid: i64,
    pub status: EntryStatus,
    /// Final roster, set at finalize
    pub roster: Option<Roster>,
    pub created_at: DateTime<Utc>,
}

impl Entry {
    pub fn participant(&self) -> Participant {
        Participant {
            entry_id: self.id,
            user_id: self.user_id,
            username: self.username.clone(),
            draft_position: self.draft_position.unwrap_or(u32::MAX),
        }
    }
}

/// Parameters for inserting an entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEntry {
    pub contest_id: ContestId,
    pub room_id: i64,
    pub user_id: i64,
    pub username: String,
    pub draft_position: u32,
    pub fee_paid: i64,
}

/// Derived lineup record written at finalize
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lineup {
    pub entry_id: EntryId,
    pub contest_id: ContestId,
    pub room_id: i64,
    pub user_id: i64,
    pub roster: Roster,
    pub total_spent: i64,
    pub created_at: DateTime<Utc>,
}

/// Result of a successful admission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Admission {
    pub entry_id: EntryId,
    pub contest_id: ContestId,
    pub room_id: i64,
    pub draft_position: u32,
    pub new_balance: i64,
    /// Whether this admission filled the room
    pub room_full: bool,
}

/// Result of a successful withdrawal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Withdrawal {
    pub entry_id: EntryId,
    pub refunded: i64,
    pub new_balance: i64,
}

/// Ledger posting applied inside a contest transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerPosting {
    pub user_id: i64,
    pub contest_id: Option<ContestId>,
    /// Signed amount: negative debits, positive credits
    pub amount: i64,
    pub entry_type: crate::wallet::EntryType,
    pub idempotency_key: String,
    pub description: Option<String>,
}
