//! Draft completion.

use super::config::DraftConfig;
use super::errors::{DraftError, DraftResult};
use super::events::{DraftEvent, EventSink};
use super::models::{DraftInstance, DraftStatus, RoomId};
use super::store::DraftStore;
use super::timer::TurnTimers;
use crate::contest::{ContestRepository, RoomStatus};
use chrono::Utc;
use std::sync::Arc;

/// What a finalize pass changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FinalizeSummary {
    pub lineups_created: usize,
    pub bonuses_awarded: usize,
    /// Whether this pass moved the draft to completed
    pub newly_completed: bool,
}

/// Persists results of a finished draft. Safe to run more than once.
#[derive(Clone)]
pub struct DraftFinalizer {
    repo: Arc<dyn ContestRepository>,
    store: DraftStore,
    events: Arc<dyn EventSink>,
    timers: TurnTimers,
    completion_bonus: i64,
}

impl DraftFinalizer {
    pub fn new(
        repo: Arc<dyn ContestRepository>,
        store: DraftStore,
        events: Arc<dyn EventSink>,
        timers: TurnTimers,
        config: &DraftConfig,
    ) -> Self {
        Self {
            repo,
            store,
            events,
            timers,
            completion_bonus: config.completion_bonus,
        }
    }

    /// Complete a room's draft.
    ///
    /// With no draft document the room is completed from its entries alone,
    /// with empty rosters.
    pub async fn finalize(
        &self,
        room_id: RoomId,
        draft: Option<DraftInstance>,
    ) -> DraftResult<FinalizeSummary> {
        self.timers.cancel(room_id);

        let room = self
            .repo
            .get_room(room_id)
            .await?
            .ok_or(DraftError::RoomNotFound(room_id))?;

        let mut summary = FinalizeSummary::default();
        let mut draft = draft;
        if let Some(d) = draft.as_mut()
            && d.status != DraftStatus::Completed
        {
            d.complete(Utc::now());
            self.store.put(d).await?;
            summary.newly_completed = true;
        }
        if draft.is_none() {
            log::warn!("Room {} has no draft state, completing from entries", room_id);
        }

        let entries = self.repo.room_entries(room_id).await?;
        let mut bonuses_changed = false;
        for entry in &entries {
            let roster = draft
                .as_ref()
                .and_then(|d| d.teams.iter().find(|t| t.entry_id == entry.id))
                .map(|t| t.roster.clone())
                .unwrap_or_default();

            if self.repo.complete_entry(entry.id, &roster).await? {
                summary.lineups_created += 1;
            }
            if self.completion_bonus > 0 {
                if self
                    .repo
                    .award_completion_bonus(entry, self.completion_bonus)
                    .await?
                {
                    summary.bonuses_awarded += 1;
                }
                // Mirrors the once-per-entry ledger posting
                if let Some(team) = draft
                    .as_mut()
                    .and_then(|d| d.teams.iter_mut().find(|t| t.entry_id == entry.id))
                    && team.bonus != self.completion_bonus
                {
                    team.bonus = self.completion_bonus;
                    bonuses_changed = true;
                }
            }
        }
        if bonuses_changed && let Some(d) = draft.as_ref() {
            self.store.put(d).await?;
        }

        if room.status != RoomStatus::Completed {
            self.repo
                .set_room_status(room_id, RoomStatus::Completed)
                .await?;
            summary.newly_completed = true;
        }
        self.store.clear_turn(room_id).await?;

        if summary.newly_completed || summary.lineups_created > 0 {
            let (teams, total_picks) = draft
                .as_ref()
                .map(|d| (d.teams.clone(), d.picks.len()))
                .unwrap_or_default();
            self.events
                .publish_room(
                    room_id,
                    DraftEvent::DraftComplete {
                        room_id,
                        teams,
                        total_picks,
                    },
                )
                .await;
        }
        self.events.release_room(room_id).await;

        let visible = self.repo.resync_contest_entries(room.contest_id).await?;
        log::info!(
            "Room {} finalized: {} lineups, {} bonuses, contest {} has {} entries",
            room_id,
            summary.lineups_created,
            summary.bonuses_awarded,
            room.contest_id,
            visible
        );

        Ok(summary)
    }
}
