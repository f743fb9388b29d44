//! Wallet data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A user's spendable balance, as seen under a row lock
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAccount {
    pub user_id: i64,
    pub balance: i64,
}

/// Wallet ledger entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: i64,
    pub user_id: i64,
    pub contest_id: Option<i64>,
    pub amount: i64,
    pub balance_after: i64,
    pub direction: EntryDirection,
    pub entry_type: EntryType,
    pub idempotency_key: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Entry direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryDirection {
    Debit,
    Credit,
}

impl std::fmt::Display for EntryDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntryDirection::Debit => write!(f, "debit"),
            EntryDirection::Credit => write!(f, "credit"),
        }
    }
}

/// Entry type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    EntryFee,
    Refund,
    CompletionBonus,
}

impl EntryType {
    /// Ledger direction implied by the entry type
    pub fn direction(self) -> EntryDirection {
        match self {
            EntryType::EntryFee => EntryDirection::Debit,
            EntryType::Refund | EntryType::CompletionBonus => EntryDirection::Credit,
        }
    }

    /// Idempotency key for this entry type applied to a contest entry
    pub fn idempotency_key(self, entry_id: i64) -> String {
        format!("{self}_{entry_id}")
    }
}

impl std::fmt::Display for EntryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntryType::EntryFee => write!(f, "entry_fee"),
            EntryType::Refund => write!(f, "refund"),
            EntryType::CompletionBonus => write!(f, "completion_bonus"),
        }
    }
}

impl std::str::FromStr for EntryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "entry_fee" => Ok(EntryType::EntryFee),
            "refund" => Ok(EntryType::Refund),
            "completion_bonus" => Ok(EntryType::CompletionBonus),
            other => Err(format!("unknown ledger entry type: {other}")),
        }
    }
}
