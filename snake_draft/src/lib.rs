//! # Snake Draft
//!
//! A contest engine for fixed-capacity "snake draft" rooms: five drafters
//! share a price-tiered player board and take turns picking under a per-team
//! budget, with timeouts, auto-pick and recovery from partial failures.
//!
//! ## Architecture
//!
//! - **Admission**: entering a contest takes a short (contest, user) lock and
//!   runs one serializable transaction that debits the fee, assigns a room
//!   seat and records the entry
//! - **Matchmaking**: fullest eligible room first, re-verified under a row
//!   lock, with a new room allocated when nothing qualifies
//! - **Scheduling**: each drafting room is owned by an actor task fed through
//!   an mpsc inbox; turn timers, manual picks and recovery all arrive as
//!   messages, so a room's draft has exactly one writer
//! - **State**: draft documents are stored as expiring JSON and repaired on
//!   read when their team list is damaged
//! - **Sweep**: a periodic pass launches full rooms that never launched and
//!   resumes rooms whose timer was lost
//!
//! ## Core Modules
//!
//! - [`contest`]: admission, withdrawal and room matchmaking
//! - [`draft`]: board, rules, auto-pick, room actors, scheduler and store
//! - [`db`]: connection pool, storage errors, timeouts and expiring locks
//! - [`wallet`]: ledger entry types
//! - [`engine`]: facade tying everything together
//!
//! ## Example
//!
//! ```no_run
//! use snake_draft::{
//!     DraftEngine, EngineConfig,
//!     contest::{MemoryContestRepository, NewContest},
//!     draft::{BroadcastHub, PricedBoardGenerator},
//! };
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let repo = MemoryContestRepository::new();
//! repo.create_account(1, 100).await;
//! let engine = DraftEngine::in_memory(
//!     repo,
//!     Arc::new(BroadcastHub::new()),
//!     Arc::new(PricedBoardGenerator::synthetic(3)),
//!     EngineConfig::default(),
//! );
//! let contest = engine
//!     .repository()
//!     .create_contest(&NewContest::single_room("Sunday Main", 10))
//!     .await?;
//! let admission = engine.enter(contest.id, 1, "alice").await?;
//! println!("seat {} in room {}", admission.draft_position, admission.room_id);
//! # Ok(())
//! # }
//! ```

/// Contest admission, withdrawal and matchmaking.
pub mod contest;

/// Database access and storage primitives.
pub mod db;

/// Draft execution: rules, actors, scheduling and state.
pub mod draft;

/// Engine facade.
pub mod engine;

/// Shared error classification.
pub mod errors;

/// Wallet ledger types.
pub mod wallet;

pub use engine::{DraftEngine, EngineConfig, RoomStatusSnapshot};
pub use errors::ErrorKind;
