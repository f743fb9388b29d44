//! Snake draft execution.
//!
//! A full room is launched by the [`DraftScheduler`], which persists a
//! [`DraftInstance`] and hands the room to a [`DraftActor`]. The actor owns
//! the turn state machine: countdowns, per-turn timers with a grace period,
//! manual and automatic picks, and finalization. Draft documents live in a
//! [`DraftStore`] so a restarted process, or the [`StallSweeper`], can resume
//! any room.

pub mod actor;
pub mod autopick;
pub mod board;
pub mod config;
pub mod errors;
pub mod events;
pub mod finalize;
pub mod messages;
pub mod models;
pub mod rules;
pub mod scheduler;
pub mod store;
pub mod sweep;
pub mod timer;

pub use actor::{DraftActor, DraftHandle, SKIP_BUDGET_EXHAUSTED, SKIP_NO_LEGAL_PLAYER};
pub use autopick::{Selection, select_pick};
pub use board::{BoardGenerator, PoolPlayer, PricedBoardGenerator};
pub use config::DraftConfig;
pub use errors::{DraftError, DraftResult};
pub use events::{Audience, BroadcastHub, CountdownStage, DraftEvent, Envelope, EventSink};
pub use finalize::{DraftFinalizer, FinalizeSummary};
pub use messages::{DraftMessage, DraftPhase};
pub use models::{
    Board, DraftInstance, DraftStatus, Participant, Pick, Player, Position, Preselection, ROUNDS,
    RoomId, Roster, RosterSlot, STARTING_BUDGET, Team, TurnMeta, snake_order,
};
pub use scheduler::{DraftRegistry, DraftScheduler};
pub use store::{DraftStateBackend, DraftStore, MemoryDraftBackend, ParticipantSource, PgDraftBackend};
pub use sweep::{StallSweeper, SweepReport};
pub use timer::{TimerKind, TurnTimers};
