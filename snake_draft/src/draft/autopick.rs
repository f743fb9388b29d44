//! Auto-pick selection.

use super::models::{Board, Player, RosterSlot, Team};
use super::rules;

/// A player and the slot the selector would place them in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub player_id: String,
    pub slot: RosterSlot,
}

/// Choose the best legal, affordable player for the team's first fillable slot.
///
/// Empty slots are visited in QB, RB, WR, TE, FLEX order. Within a slot the
/// most expensive candidate wins, ties going to the earliest in board order.
/// Returns `None` when no empty slot has a legal candidate.
pub fn select_pick(board: &Board, team: &Team) -> Option<Selection> {
    for slot in team.roster.empty_slots() {
        let mut best: Option<&Player> = None;
        for player in board.available() {
            if !rules::is_legal(team, player, slot) {
                continue;
            }
            if best.is_none_or(|b| player.price > b.price) {
                best = Some(player);
            }
        }

        if let Some(player) = best {
            return Some(Selection {
                player_id: player.id.clone(),
                slot,
            });
        }
    }
    None
}
