//! Room actor message types.

use super::errors::DraftResult;
use super::events::CountdownStage;
use super::models::{Pick, RosterSlot};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

/// Messages processed by a room's draft actor
#[derive(Debug)]
pub enum DraftMessage {
    /// Start the launch countdown
    Begin,

    /// Rebuild timing from persisted state after a restart or stall
    Resume,

    /// Internal: a countdown finished
    CountdownElapsed { stage: CountdownStage },

    /// Manual pick by a drafter
    SubmitPick {
        user_id: i64,
        player_id: String,
        slot: RosterSlot,
        response: oneshot::Sender<DraftResult<Pick>>,
    },

    /// Acting drafter asks the system to pick for them
    AutoPick {
        user_id: i64,
        response: oneshot::Sender<DraftResult<Pick>>,
    },

    /// Queue a preferred player for auto-pick
    Preselect {
        user_id: i64,
        player_id: String,
        slot: Option<RosterSlot>,
        response: oneshot::Sender<DraftResult<()>>,
    },

    /// Internal: the pick limit for `turn` expired
    DeadlineElapsed { turn: usize },

    /// Internal: the grace period for `turn` expired
    GraceElapsed { turn: usize },

    /// Current phase
    GetPhase {
        response: oneshot::Sender<DraftPhase>,
    },

    /// Stop the actor, leaving persisted state for recovery
    Close,
}

/// Per-room draft phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum DraftPhase {
    /// Launch or first-turn countdown running
    Countdown { stage: CountdownStage },
    /// Waiting for the acting drafter
    AwaitingPick { turn: usize },
    /// Limit expired; a manual pick still wins until grace ends
    Grace { turn: usize },
    /// Between turns, or waiting to be resumed
    Resolving,
    Completed,
}

impl DraftPhase {
    /// Turn currently open for picks, if any
    pub fn open_turn(self) -> Option<usize> {
        match self {
            DraftPhase::AwaitingPick { turn } | DraftPhase::Grace { turn } => Some(turn),
            _ => None,
        }
    }
}
