//! Wallet ledger types.
//!
//! Contest entry fees, withdrawal refunds and draft completion bonuses move
//! balance through the same double-entry style ledger: every balance change is
//! written together with a `wallet_entries` row carrying a unique idempotency
//! key, inside the transaction that changed the balance.

pub mod models;

pub use models::{EntryDirection, EntryType, LedgerEntry, UserAccount};
