//! Pick legality: the single predicate shared by manual picks and auto-pick.

use super::errors::{DraftError, DraftResult};
use super::models::{DraftInstance, Player, RosterSlot, Team};

/// Check a candidate against a team without consulting turn order.
///
/// Legality uses `original_position` only; the board label is ignored.
pub fn check_candidate(team: &Team, player: &Player, slot: RosterSlot) -> DraftResult<()> {
    if player.drafted {
        return Err(DraftError::PlayerUnavailable(player.id.clone()));
    }
    if !slot.accepts(player.original_position) {
        return Err(DraftError::IllegalSlot {
            position: player.original_position,
            slot,
        });
    }
    if !team.roster.is_empty_slot(slot) {
        return Err(DraftError::SlotFilled(slot));
    }
    if player.price > team.budget {
        return Err(DraftError::InsufficientBudget {
            price: player.price,
            budget: team.budget,
        });
    }
    Ok(())
}

/// Whether `player` may legally go into `slot` for `team`
pub fn is_legal(team: &Team, player: &Player, slot: RosterSlot) -> bool {
    check_candidate(team, player, slot).is_ok()
}

/// Full pick validation: turn ownership plus candidate checks.
pub fn validate_pick(
    draft: &DraftInstance,
    team_index: usize,
    player_id: &str,
    slot: RosterSlot,
) -> DraftResult<()> {
    if draft.acting_team_index() != Some(team_index) {
        return Err(DraftError::NotYourTurn);
    }
    let team = draft.teams.get(team_index).ok_or(DraftError::NotInDraft)?;
    let player = draft
        .board
        .find(player_id)
        .ok_or_else(|| DraftError::PlayerUnavailable(player_id.to_string()))?;

    check_candidate(team, player, slot)
}
