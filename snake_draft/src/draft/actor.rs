//! Room draft actor.
//!
//! Each drafting room is owned by one actor task that consumes an mpsc
//! inbox. All writes to the room's draft document happen here, so turn
//! state has a single writer without further locking.

use super::{
    autopick::{self, Selection},
    config::DraftConfig,
    errors::{DraftError, DraftResult},
    events::{CountdownStage, DraftEvent, EventSink},
    finalize::DraftFinalizer,
    messages::{DraftMessage, DraftPhase},
    models::{DraftInstance, DraftStatus, Pick, Preselection, RoomId, RosterSlot, TurnMeta},
    rules,
    store::DraftStore,
    timer::TurnTimers,
};
use crate::errors::ErrorKind;
use chrono::Utc;
use std::{sync::Arc, time::Duration};
use tokio::sync::{mpsc, oneshot};

/// Inbox depth per room
const INBOX_CAPACITY: usize = 64;

/// Reason recorded on a skipped pick when the team cannot afford anyone
pub const SKIP_BUDGET_EXHAUSTED: &str = "budget exhausted";

/// Reason recorded on a skipped pick when no empty slot has a legal player
pub const SKIP_NO_LEGAL_PLAYER: &str = "no legal player available";

/// Draft actor handle for sending messages
#[derive(Clone, Debug)]
pub struct DraftHandle {
    sender: mpsc::Sender<DraftMessage>,
    room_id: RoomId,
}

impl DraftHandle {
    pub fn new(sender: mpsc::Sender<DraftMessage>, room_id: RoomId) -> Self {
        Self { sender, room_id }
    }

    pub fn room_id(&self) -> RoomId {
        self.room_id
    }

    /// Send a message to the room
    pub async fn send(&self, message: DraftMessage) -> DraftResult<()> {
        self.sender
            .send(message)
            .await
            .map_err(|_| DraftError::RoomClosed(self.room_id))
    }

    /// Send a request and wait for the room's answer
    pub async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> DraftMessage,
    ) -> DraftResult<T> {
        let (tx, rx) = oneshot::channel();
        self.send(build(tx)).await?;
        rx.await.map_err(|_| DraftError::RoomClosed(self.room_id))
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Whether both handles address the same actor instance
    pub fn same_actor(&self, other: &DraftHandle) -> bool {
        self.sender.same_channel(&other.sender)
    }
}

/// Shared collaborators of every room actor
#[derive(Clone)]
pub struct ActorContext {
    pub store: DraftStore,
    pub events: Arc<dyn EventSink>,
    pub timers: TurnTimers,
    pub finalizer: DraftFinalizer,
    pub config: Arc<DraftConfig>,
}

/// Actor driving one room's draft
pub struct DraftActor {
    room_id: RoomId,
    ctx: ActorContext,
    inbox: mpsc::Receiver<DraftMessage>,
    handle: DraftHandle,
    phase: DraftPhase,
}

impl DraftActor {
    /// Create an actor for a freshly launched room. Send `Begin` to start.
    pub fn launched(room_id: RoomId, ctx: ActorContext) -> (Self, DraftHandle) {
        Self::with_phase(
            room_id,
            ctx,
            DraftPhase::Countdown {
                stage: CountdownStage::Launch,
            },
        )
    }

    /// Create an actor for a room recovered from storage. Send `Resume`.
    pub fn recovered(room_id: RoomId, ctx: ActorContext) -> (Self, DraftHandle) {
        Self::with_phase(room_id, ctx, DraftPhase::Resolving)
    }

    fn with_phase(room_id: RoomId, ctx: ActorContext, phase: DraftPhase) -> (Self, DraftHandle) {
        let (sender, inbox) = mpsc::channel(INBOX_CAPACITY);
        let handle = DraftHandle::new(sender, room_id);
        let actor = Self {
            room_id,
            ctx,
            inbox,
            handle: handle.clone(),
            phase,
        };
        (actor, handle)
    }

    /// Run the actor event loop
    pub async fn run(mut self) {
        log::info!("Draft room {} actor starting", self.room_id);

        while let Some(message) = self.inbox.recv().await {
            if matches!(message, DraftMessage::Close) {
                break;
            }
            self.handle_message(message).await;
            if self.phase == DraftPhase::Completed {
                break;
            }
        }

        log::info!("Draft room {} actor stopped ({:?})", self.room_id, self.phase);
    }

    async fn handle_message(&mut self, message: DraftMessage) {
        match message {
            DraftMessage::Begin => {
                let result = self.begin().await;
                self.settle(result).await;
            }

            DraftMessage::Resume => {
                let result = self.resume().await;
                self.settle(result).await;
            }

            DraftMessage::CountdownElapsed { stage } => {
                let result = self.countdown_elapsed(stage).await;
                self.settle(result).await;
            }

            DraftMessage::SubmitPick {
                user_id,
                player_id,
                slot,
                response,
            } => {
                let result = self.submit_pick(user_id, &player_id, slot).await;
                let result = self.check_pick_failure(result).await;
                let _ = response.send(result);
            }

            DraftMessage::AutoPick { user_id, response } => {
                let result = self.requested_auto_pick(user_id).await;
                let result = self.check_pick_failure(result).await;
                let _ = response.send(result);
            }

            DraftMessage::Preselect {
                user_id,
                player_id,
                slot,
                response,
            } => {
                let result = self.preselect(user_id, player_id, slot).await;
                let _ = response.send(result);
            }

            DraftMessage::DeadlineElapsed { turn } => {
                if self.phase == (DraftPhase::AwaitingPick { turn }) {
                    log::debug!("Room {}: turn {} entered grace", self.room_id, turn);
                    self.phase = DraftPhase::Grace { turn };
                } else {
                    log::debug!("Room {}: stale deadline for turn {}", self.room_id, turn);
                }
            }

            DraftMessage::GraceElapsed { turn } => {
                if self.phase.open_turn() == Some(turn) {
                    let result = self.auto_pick(turn).await.map(|_| ());
                    self.settle(result).await;
                } else {
                    log::debug!("Room {}: turn {} already resolved", self.room_id, turn);
                }
            }

            DraftMessage::GetPhase { response } => {
                let _ = response.send(self.phase);
            }

            DraftMessage::Close => {}
        }
    }

    /// Timer and recovery paths never surface errors: anything unexpected
    /// forces the draft to completion
    async fn settle(&mut self, result: DraftResult<()>) {
        if let Err(e) = result {
            log::error!("Room {}: draft failed, forcing completion: {}", self.room_id, e);
            self.force_complete().await;
        }
    }

    /// Picks report their error to the caller; storage or corruption
    /// failures also end the draft
    async fn check_pick_failure<T>(&mut self, result: DraftResult<T>) -> DraftResult<T> {
        if let Err(e) = &result
            && matches!(e.kind(), ErrorKind::Fatal | ErrorKind::CorruptedState)
        {
            log::error!("Room {}: pick failed, forcing completion: {}", self.room_id, e);
            self.force_complete().await;
        }
        result
    }

    async fn begin(&mut self) -> DraftResult<()> {
        let launching = DraftPhase::Countdown {
            stage: CountdownStage::Launch,
        };
        if self.phase != launching || self.ctx.timers.is_armed(self.room_id) {
            return Ok(());
        }
        self.start_countdown(CountdownStage::Launch, self.ctx.config.launch_countdown_secs)
            .await;
        Ok(())
    }

    async fn start_countdown(&mut self, stage: CountdownStage, seconds: u64) {
        self.phase = DraftPhase::Countdown { stage };
        self.ctx
            .events
            .publish_room(
                self.room_id,
                DraftEvent::DraftCountdown {
                    room_id: self.room_id,
                    stage,
                    seconds,
                },
            )
            .await;
        self.ctx.timers.arm_countdown(
            self.room_id,
            stage,
            Duration::from_secs(seconds),
            self.handle.clone(),
        );
    }

    async fn countdown_elapsed(&mut self, stage: CountdownStage) -> DraftResult<()> {
        if self.phase != (DraftPhase::Countdown { stage }) {
            return Ok(());
        }

        match stage {
            CountdownStage::Launch => {
                let draft = self.ctx.store.require(self.room_id).await?;
                self.ctx
                    .events
                    .publish_room(
                        self.room_id,
                        DraftEvent::DraftStarting {
                            room_id: self.room_id,
                            board: draft.board,
                            teams: draft.teams,
                            draft_order: draft.draft_order,
                        },
                    )
                    .await;
                self.start_countdown(
                    CountdownStage::FirstTurn,
                    self.ctx.config.first_turn_countdown_secs,
                )
                .await;
                Ok(())
            }
            CountdownStage::FirstTurn => self.advance_turn().await,
        }
    }

    /// Open the next turn, or finalize once the order is exhausted
    async fn advance_turn(&mut self) -> DraftResult<()> {
        let draft = self.ctx.store.require(self.room_id).await?;
        if draft.status == DraftStatus::Completed || draft.order_exhausted() {
            return self.finalize(Some(draft)).await;
        }

        let team_index = draft.acting_team_index().ok_or_else(|| {
            DraftError::CorruptedState(format!(
                "room {}: turn {} has no acting team",
                self.room_id, draft.current_turn
            ))
        })?;
        let team = &draft.teams[team_index];
        let limit_secs = self.ctx.config.limit_for_budget(team.budget);

        let meta = TurnMeta {
            room_id: self.room_id,
            turn: draft.current_turn,
            user_id: team.user_id,
            started_at: Utc::now(),
            limit_secs,
        };
        self.ctx.store.put_turn(&meta).await?;

        let event = DraftEvent::DraftTurn {
            room_id: self.room_id,
            turn: draft.current_turn,
            round: draft.round(),
            team_index,
            user_id: team.user_id,
            username: team.username.clone(),
            budget: team.budget,
            limit_secs,
        };
        self.ctx.events.publish_room(self.room_id, event.clone()).await;
        self.ctx.events.publish_user(team.user_id, event).await;

        self.arm_turn(draft.current_turn, Duration::from_secs(limit_secs));
        Ok(())
    }

    fn arm_turn(&mut self, turn: usize, limit: Duration) {
        self.ctx.timers.arm_turn(
            self.room_id,
            turn,
            limit,
            self.ctx.config.grace(),
            self.handle.clone(),
        );
        self.phase = DraftPhase::AwaitingPick { turn };
    }

    async fn submit_pick(
        &mut self,
        user_id: i64,
        player_id: &str,
        slot: RosterSlot,
    ) -> DraftResult<Pick> {
        if self.phase.open_turn().is_none() {
            return Err(DraftError::DraftNotActive(self.room_id));
        }
        let mut draft = self.ctx.store.require(self.room_id).await?;
        let team_index = draft
            .team_index_for_user(user_id)
            .ok_or(DraftError::NotInDraft)?;

        self.commit_pick(&mut draft, team_index, player_id, slot, false)
            .await
    }

    /// Acting drafter asked for an auto-pick
    async fn requested_auto_pick(&mut self, user_id: i64) -> DraftResult<Pick> {
        let Some(turn) = self.phase.open_turn() else {
            return Err(DraftError::DraftNotActive(self.room_id));
        };
        let draft = self.ctx.store.require(self.room_id).await?;
        let acting = draft.acting_team().map(|t| t.user_id);
        if draft.team_index_for_user(user_id).is_none() {
            return Err(DraftError::NotInDraft);
        }
        if acting != Some(user_id) {
            return Err(DraftError::NotYourTurn);
        }
        self.auto_pick(turn).await
    }

    /// Pick for the acting team: a still-legal preselection first, then the
    /// selector, else a skipped turn
    async fn auto_pick(&mut self, turn: usize) -> DraftResult<Pick> {
        self.phase = DraftPhase::Resolving;
        let mut draft = self.ctx.store.require(self.room_id).await?;
        if draft.current_turn != turn {
            return Err(DraftError::CorruptedState(format!(
                "room {}: auto-pick for turn {} but draft is at turn {}",
                self.room_id, turn, draft.current_turn
            )));
        }
        let team_index = draft.acting_team_index().ok_or_else(|| {
            DraftError::CorruptedState(format!("room {}: no acting team", self.room_id))
        })?;
        let team = &draft.teams[team_index];

        let selection = preselected(&draft, team_index)
            .or_else(|| autopick::select_pick(&draft.board, team));

        match selection {
            Some(Selection { player_id, slot }) => {
                log::debug!(
                    "Room {}: auto-picking {} into {} for team {}",
                    self.room_id,
                    player_id,
                    slot,
                    team_index
                );
                self.commit_pick(&mut draft, team_index, &player_id, slot, true)
                    .await
            }
            None => {
                let reason = if team.budget <= 0 {
                    SKIP_BUDGET_EXHAUSTED
                } else {
                    SKIP_NO_LEGAL_PLAYER
                };
                let user_id = team.user_id;
                let pick = draft.record_skip(team_index, reason, Utc::now());
                self.ctx.store.put(&draft).await?;
                self.ctx.timers.cancel(self.room_id);

                log::info!(
                    "Room {}: turn {} skipped for user {} ({})",
                    self.room_id,
                    turn,
                    user_id,
                    reason
                );
                self.ctx
                    .events
                    .publish_room(
                        self.room_id,
                        DraftEvent::TurnSkipped {
                            room_id: self.room_id,
                            turn,
                            user_id,
                            reason: reason.to_string(),
                        },
                    )
                    .await;

                self.advance_turn().await?;
                Ok(pick)
            }
        }
    }

    /// Validate and apply a pick, persist, announce and move on
    async fn commit_pick(
        &mut self,
        draft: &mut DraftInstance,
        team_index: usize,
        player_id: &str,
        slot: RosterSlot,
        is_auto_pick: bool,
    ) -> DraftResult<Pick> {
        let pick = draft.apply_pick(team_index, player_id, slot, is_auto_pick, Utc::now())?;
        let board = &draft.board;
        draft
            .preselections
            .retain(|_, pre| board.find(&pre.player_id).is_some_and(|p| !p.drafted));
        let user_id = draft.teams[team_index].user_id;

        self.phase = DraftPhase::Resolving;
        self.ctx.store.put(draft).await?;
        self.ctx.timers.cancel(self.room_id);

        log::info!(
            "Room {}: pick {} by user {} ({}{})",
            self.room_id,
            pick.pick_number,
            user_id,
            player_id,
            if is_auto_pick { ", auto" } else { "" }
        );
        self.ctx
            .events
            .publish_room(
                self.room_id,
                DraftEvent::PlayerPicked {
                    room_id: self.room_id,
                    user_id,
                    pick: pick.clone(),
                },
            )
            .await;

        self.advance_turn().await?;
        Ok(pick)
    }

    async fn preselect(
        &mut self,
        user_id: i64,
        player_id: String,
        slot: Option<RosterSlot>,
    ) -> DraftResult<()> {
        if self.phase == DraftPhase::Completed {
            return Err(DraftError::DraftNotActive(self.room_id));
        }
        let room_id = self.room_id;
        self.ctx
            .store
            .update(room_id, |draft| {
                if draft.status != DraftStatus::Active {
                    return Err(DraftError::DraftNotActive(room_id));
                }
                if draft.team_index_for_user(user_id).is_none() {
                    return Err(DraftError::NotInDraft);
                }
                let player = draft
                    .board
                    .find(&player_id)
                    .filter(|p| !p.drafted)
                    .ok_or_else(|| DraftError::PlayerUnavailable(player_id.clone()))?;
                if let Some(slot) = slot
                    && !slot.accepts(player.original_position)
                {
                    return Err(DraftError::IllegalSlot {
                        position: player.original_position,
                        slot,
                    });
                }
                draft
                    .preselections
                    .insert(user_id, Preselection { player_id, slot });
                Ok(())
            })
            .await
    }

    /// Rebuild timing after a restart or a missed timer
    async fn resume(&mut self) -> DraftResult<()> {
        if self.ctx.timers.is_armed(self.room_id) {
            return Ok(());
        }
        match self.phase {
            DraftPhase::Completed => return Ok(()),
            DraftPhase::Countdown { stage } => {
                self.ctx.timers.arm_countdown(
                    self.room_id,
                    stage,
                    Duration::ZERO,
                    self.handle.clone(),
                );
                return Ok(());
            }
            _ => {}
        }

        let Some(draft) = self.ctx.store.get(self.room_id).await? else {
            return self.finalize(None).await;
        };
        if draft.status == DraftStatus::Completed || draft.order_exhausted() {
            return self.finalize(Some(draft)).await;
        }

        match self.ctx.store.get_turn(self.room_id).await? {
            Some(meta) if meta.turn == draft.current_turn => {
                let elapsed = meta.elapsed(Utc::now());
                let limit = Duration::from_secs(meta.limit_secs);
                if elapsed > limit + self.ctx.config.stall_buffer() {
                    log::warn!(
                        "Room {}: turn {} stalled for {:?}, auto-picking",
                        self.room_id,
                        meta.turn,
                        elapsed
                    );
                    self.auto_pick(meta.turn).await.map(|_| ())
                } else {
                    log::info!(
                        "Room {}: resuming turn {} with {:?} left",
                        self.room_id,
                        meta.turn,
                        limit.saturating_sub(elapsed)
                    );
                    self.arm_turn(meta.turn, limit.saturating_sub(elapsed));
                    Ok(())
                }
            }
            _ => {
                log::info!(
                    "Room {}: no timing for turn {}, starting it fresh",
                    self.room_id,
                    draft.current_turn
                );
                self.advance_turn().await
            }
        }
    }

    async fn finalize(&mut self, draft: Option<DraftInstance>) -> DraftResult<()> {
        self.ctx.finalizer.finalize(self.room_id, draft).await?;
        self.phase = DraftPhase::Completed;
        Ok(())
    }

    async fn force_complete(&mut self) {
        self.ctx.timers.cancel(self.room_id);
        let draft = self.ctx.store.get(self.room_id).await.ok().flatten();
        if let Err(e) = self.ctx.finalizer.finalize(self.room_id, draft).await {
            log::error!("Room {}: forced completion failed: {}", self.room_id, e);
        }
        self.phase = DraftPhase::Completed;
    }
}

/// The acting team's queued choice, if it is still legal
fn preselected(draft: &DraftInstance, team_index: usize) -> Option<Selection> {
    let team = draft.teams.get(team_index)?;
    let pre = draft.preselections.get(&team.user_id)?;
    let player = draft.board.find(&pre.player_id)?;

    let slots = match pre.slot {
        Some(slot) => vec![slot],
        None => team.roster.empty_slots(),
    };
    slots
        .into_iter()
        .find(|slot| rules::is_legal(team, player, *slot))
        .map(|slot| Selection {
            player_id: player.id.clone(),
            slot,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::draft::models::{Board, Participant, Player, Position};

    fn player(id: &str, position: Position, price: i64) -> Player {
        Player {
            id: id.to_string(),
            name: id.to_string(),
            team: "NYJ".to_string(),
            position: position.to_string(),
            original_position: position,
            price,
            drafted: false,
            drafted_by: None,
        }
    }

    fn draft() -> DraftInstance {
        let board = Board::new(vec![vec![
            player("qb5", Position::Qb, 5),
            player("rb2", Position::Rb, 2),
        ]]);
        let participants = vec![Participant {
            entry_id: 1,
            user_id: 9,
            username: "solo".to_string(),
            draft_position: 0,
        }];
        DraftInstance::new(1, 1, board, participants, 15)
    }

    #[test]
    fn test_preselection_with_open_slot_uses_first_legal() {
        let mut d = draft();
        d.preselections.insert(
            9,
            Preselection {
                player_id: "rb2".to_string(),
                slot: None,
            },
        );
        assert_eq!(
            preselected(&d, 0),
            Some(Selection {
                player_id: "rb2".to_string(),
                slot: RosterSlot::Rb
            })
        );
    }

    #[test]
    fn test_illegal_preselection_is_ignored() {
        let mut d = draft();
        d.teams[0].budget = 1;
        d.preselections.insert(
            9,
            Preselection {
                player_id: "qb5".to_string(),
                slot: Some(RosterSlot::Qb),
            },
        );
        assert_eq!(preselected(&d, 0), None);
    }

    #[test]
    fn test_no_preselection() {
        assert_eq!(preselected(&draft(), 0), None);
    }
}
