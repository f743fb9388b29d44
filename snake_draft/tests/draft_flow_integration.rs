//! Integration tests for the draft lifecycle.
//!
//! Every test runs on a paused tokio clock so countdowns, turn limits and
//! grace periods elapse instantly. With default timing a filled room
//! launches after 1s, counts down for 5s + 3s and opens turn 0 at t=9s.

use async_trait::async_trait;
use serde_json::Value;
use snake_draft::contest::{
    Admission, ContestRepository, EntryStatus, MemoryContestRepository, NewContest, RoomStatus,
};
use snake_draft::db::{MemoryLockManager, StoreError, StoreResult, lock::pick_key};
use snake_draft::draft::{
    BroadcastHub, CountdownStage, DraftConfig, DraftError, DraftEvent, DraftInstance, DraftPhase,
    DraftStateBackend, DraftStatus, Envelope, MemoryDraftBackend, Player, Position,
    PricedBoardGenerator, ROUNDS, RoomId, RosterSlot, SKIP_BUDGET_EXHAUSTED, STARTING_BUDGET,
    TurnMeta, select_pick,
};
use snake_draft::{DraftEngine, EngineConfig};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::sleep;

const FEE: i64 = 10;
const BALANCE: i64 = 100;
const TEAMS: usize = 5;

/// Just after turn 0 opens
const FIRST_TURN_OPEN: Duration = Duration::from_secs(10);
/// Long enough for any default-timed draft to finish
const WHOLE_DRAFT: Duration = Duration::from_secs(2_000);

struct Harness {
    engine: DraftEngine,
    repo: MemoryContestRepository,
    backend: Arc<MemoryDraftBackend>,
    locks: Arc<MemoryLockManager>,
    hub: Arc<BroadcastHub>,
}

/// Helper to create an engine over in-memory storage with funded users
async fn setup(config: EngineConfig) -> Harness {
    let repo = MemoryContestRepository::new();
    for user_id in 1..=TEAMS as i64 {
        repo.create_account(user_id, BALANCE).await;
    }
    let backend = Arc::new(MemoryDraftBackend::new());
    let locks = Arc::new(MemoryLockManager::new());
    let hub = Arc::new(BroadcastHub::new());
    let engine = engine_over(&repo, &backend, &locks, &hub, config);

    Harness {
        engine,
        repo,
        backend,
        locks,
        hub,
    }
}

/// Build another engine on the same storage, as a restarted process would
fn engine_over(
    repo: &MemoryContestRepository,
    backend: &Arc<MemoryDraftBackend>,
    locks: &Arc<MemoryLockManager>,
    hub: &Arc<BroadcastHub>,
    config: EngineConfig,
) -> DraftEngine {
    DraftEngine::new(
        Arc::new(repo.clone()),
        backend.clone(),
        locks.clone(),
        hub.clone(),
        Arc::new(PricedBoardGenerator::synthetic(3)),
        config,
    )
}

/// Helper to fill a single-room contest, returning its room
async fn fill_room(h: &Harness) -> (RoomId, Vec<Admission>) {
    let contest = h
        .repo
        .create_contest(&NewContest::single_room("Thursday Night", FEE))
        .await
        .expect("Failed to create contest");

    let mut admissions = Vec::new();
    for user_id in 1..=TEAMS as i64 {
        admissions.push(
            h.engine
                .enter(contest.id, user_id, &format!("user{user_id}"))
                .await
                .expect("Admission should succeed"),
        );
    }
    (admissions[0].room_id, admissions)
}

async fn draft(h: &Harness, room_id: RoomId) -> DraftInstance {
    h.engine
        .room_status(room_id)
        .await
        .unwrap()
        .draft
        .expect("Room should have a draft")
}

async fn phase(h: &Harness, room_id: RoomId) -> Option<DraftPhase> {
    h.engine.room_status(room_id).await.unwrap().phase
}

fn acting_user(draft: &DraftInstance) -> i64 {
    draft.acting_team().unwrap().user_id
}

/// User acting on the turn after the current one
fn next_user(draft: &DraftInstance) -> i64 {
    let index = draft.draft_order[draft.current_turn + 1];
    draft.teams[index].user_id
}

fn drain(feed: &mut broadcast::Receiver<Envelope>) -> Vec<DraftEvent> {
    let mut events = Vec::new();
    while let Ok(envelope) = feed.try_recv() {
        events.push(envelope.event);
    }
    events
}

fn cheapest(draft: &DraftInstance) -> Player {
    draft
        .board
        .available()
        .min_by_key(|p| p.price)
        .cloned()
        .unwrap()
}

fn any_qb(draft: &DraftInstance) -> Player {
    draft
        .board
        .available()
        .find(|p| p.original_position == Position::Qb)
        .cloned()
        .unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_unattended_draft_runs_to_completion() {
    let h = setup(EngineConfig::default()).await;
    let mut feed = h.hub.subscribe_all();
    let (room_id, admissions) = fill_room(&h).await;

    sleep(WHOLE_DRAFT).await;

    let draft = draft(&h, room_id).await;
    assert_eq!(draft.status, DraftStatus::Completed);
    assert!(draft.completed_at.is_some());
    assert_eq!(draft.picks.len(), TEAMS * ROUNDS);
    assert!(draft.picks.iter().all(|p| p.is_auto_pick || p.skipped));

    for team in &draft.teams {
        assert!(team.budget >= 0);
        assert_eq!(team.budget, STARTING_BUDGET - team.roster.total_spent());
        assert_eq!(team.bonus, 100);
        if let Some(flex) = team.roster.get(RosterSlot::Flex) {
            assert_ne!(flex.original_position, Position::Qb);
        }
    }

    let room = h.repo.get_room(room_id).await.unwrap().unwrap();
    assert_eq!(room.status, RoomStatus::Completed);
    assert!(h.engine.scheduler().active_rooms().is_empty());
    assert_eq!(phase(&h, room_id).await, None);

    for admission in &admissions {
        let entry = h.repo.get_entry(admission.entry_id).await.unwrap().unwrap();
        assert_eq!(entry.status, EntryStatus::Completed);
        let lineup = h.repo.lineup(admission.entry_id).await.unwrap().unwrap();
        let team = draft
            .teams
            .iter()
            .find(|t| t.entry_id == admission.entry_id)
            .unwrap();
        assert_eq!(lineup.roster, team.roster);
        assert_eq!(lineup.total_spent, team.roster.total_spent());
        assert_eq!(
            h.repo.get_balance(entry.user_id).await.unwrap(),
            Some(BALANCE - FEE + 100)
        );
    }

    let events = drain(&mut feed);
    let names: Vec<&str> = events.iter().map(|e| e.name()).collect();
    let start = names.iter().position(|n| *n == "draft_countdown").unwrap();
    assert_eq!(
        &names[start..start + 3],
        &["draft_countdown", "draft_starting", "draft_countdown"]
    );
    assert!(matches!(
        events[start + 2],
        DraftEvent::DraftCountdown {
            stage: CountdownStage::FirstTurn,
            seconds: 3,
            ..
        }
    ));
    let resolved = events
        .iter()
        .filter(|e| matches!(e, DraftEvent::PlayerPicked { .. } | DraftEvent::TurnSkipped { .. }))
        .count();
    assert_eq!(resolved, TEAMS * ROUNDS);
    assert_eq!(names.iter().filter(|n| **n == "draft_complete").count(), 1);
    assert_eq!(names.last(), Some(&"draft_complete"));
    match events.last() {
        Some(DraftEvent::DraftComplete { teams, .. }) => {
            assert!(teams.iter().all(|t| t.bonus == 100));
        }
        other => panic!("Expected draft_complete, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_budget_gets_quick_skips() {
    let mut config = EngineConfig::default();
    config.draft.starting_budget = 1;
    let h = setup(config).await;
    let mut feed = h.hub.subscribe_all();
    let (room_id, _) = fill_room(&h).await;

    sleep(WHOLE_DRAFT).await;

    let draft = draft(&h, room_id).await;
    assert_eq!(draft.status, DraftStatus::Completed);

    // Everyone buys one price-1 player, then has nothing left to spend
    let (made, skipped): (Vec<_>, Vec<_>) = draft.picks.iter().partition(|p| !p.skipped);
    assert_eq!(made.len(), TEAMS);
    assert!(made.iter().all(|p| p.player.as_ref().unwrap().price == 1));
    assert_eq!(skipped.len(), TEAMS * (ROUNDS - 1));
    assert!(
        skipped
            .iter()
            .all(|p| p.reason.as_deref() == Some(SKIP_BUDGET_EXHAUSTED))
    );
    assert!(draft.teams.iter().all(|t| t.budget == 0));

    let events = drain(&mut feed);
    let limits: Vec<(i64, u64)> = events
        .iter()
        .filter_map(|e| match e {
            DraftEvent::DraftTurn {
                budget, limit_secs, ..
            } => Some((*budget, *limit_secs)),
            _ => None,
        })
        .collect();
    assert!(!limits.is_empty());
    for (budget, limit) in limits {
        let expected = if budget <= 0 { 3 } else { 30 };
        assert_eq!(limit, expected);
    }
}

#[tokio::test(start_paused = true)]
async fn test_manual_pick_wins_during_grace() {
    let h = setup(EngineConfig::default()).await;
    let (room_id, _) = fill_room(&h).await;

    // Turn 0 opens at t=9s, its 30s limit runs out at t=39s and grace ends at t=41s
    sleep(Duration::from_secs(40)).await;
    assert_eq!(phase(&h, room_id).await, Some(DraftPhase::Grace { turn: 0 }));

    let before = draft(&h, room_id).await;
    let user_id = acting_user(&before);
    let choice = select_pick(&before.board, before.acting_team().unwrap()).unwrap();

    let pick = h
        .engine
        .handle_pick(room_id, user_id, &choice.player_id, choice.slot)
        .await
        .expect("Pick in grace should be accepted");
    assert!(!pick.is_auto_pick);
    assert_eq!(pick.pick_number, 1);
    assert_eq!(pick.roster_slot, Some(choice.slot));

    // The grace timer for turn 0 must not fire an auto-pick on turn 1
    sleep(Duration::from_secs(5)).await;
    let after = draft(&h, room_id).await;
    assert_eq!(after.picks.len(), 1);
    assert_eq!(after.current_turn, 1);
    assert_eq!(phase(&h, room_id).await, Some(DraftPhase::AwaitingPick { turn: 1 }));

    h.engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_rejected_pick_keeps_turn_open() {
    let h = setup(EngineConfig::default()).await;
    let (room_id, _) = fill_room(&h).await;
    sleep(FIRST_TURN_OPEN).await;

    let draft_before = draft(&h, room_id).await;
    let acting = acting_user(&draft_before);
    let waiting = next_user(&draft_before);
    let qb = any_qb(&draft_before);

    assert!(matches!(
        h.engine.handle_pick(room_id, waiting, &qb.id, RosterSlot::Qb).await,
        Err(DraftError::NotYourTurn)
    ));
    assert!(matches!(
        h.engine.handle_pick(room_id, 99, &qb.id, RosterSlot::Qb).await,
        Err(DraftError::NotInDraft)
    ));
    assert!(matches!(
        h.engine.handle_pick(room_id, acting, "nobody", RosterSlot::Qb).await,
        Err(DraftError::PlayerUnavailable(_))
    ));
    assert!(matches!(
        h.engine.handle_pick(room_id, acting, &qb.id, RosterSlot::Flex).await,
        Err(DraftError::IllegalSlot { .. })
    ));

    assert_eq!(phase(&h, room_id).await, Some(DraftPhase::AwaitingPick { turn: 0 }));
    let unchanged = draft(&h, room_id).await;
    assert!(unchanged.picks.is_empty());
    assert_eq!(unchanged.board, draft_before.board);
    assert!(!h.locks.is_held(&snake_draft::db::lock::pick_key(room_id, acting)).await);

    // The same drafter can still pick legally
    let pick = h
        .engine
        .handle_pick(room_id, acting, &qb.id, RosterSlot::Qb)
        .await
        .unwrap();
    assert_eq!(pick.player.unwrap().id, qb.id);

    // Drafted players are gone for everyone
    assert!(matches!(
        h.engine.handle_pick(room_id, waiting, &qb.id, RosterSlot::Qb).await,
        Err(DraftError::PlayerUnavailable(_))
    ));

    h.engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_submission_is_collapsed() {
    let h = setup(EngineConfig::default()).await;
    let (room_id, _) = fill_room(&h).await;
    sleep(FIRST_TURN_OPEN).await;

    let opening = draft(&h, room_id).await;
    let user_id = acting_user(&opening);
    let choice = select_pick(&opening.board, opening.acting_team().unwrap()).unwrap();

    // The same pick sent from two devices at once
    let (a, b) = tokio::join!(
        h.engine
            .handle_pick(room_id, user_id, &choice.player_id, choice.slot),
        h.engine
            .handle_pick(room_id, user_id, &choice.player_id, choice.slot),
    );
    let (pick, err) = match (a, b) {
        (Ok(pick), Err(err)) | (Err(err), Ok(pick)) => (pick, err),
        other => panic!("Expected one pick and one rejection, got {other:?}"),
    };
    assert_eq!(pick.pick_number, 1);
    assert!(matches!(err, DraftError::PickInFlight));
    assert!(err.is_retryable());

    let after = draft(&h, room_id).await;
    assert_eq!(after.picks.len(), 1);
    assert_eq!(after.current_turn, 1);
    assert!(!h.locks.is_held(&pick_key(room_id, user_id)).await);

    // With the token released, a resubmission is judged on its own merits
    assert!(matches!(
        h.engine
            .handle_pick(room_id, user_id, &choice.player_id, choice.slot)
            .await,
        Err(DraftError::NotYourTurn)
    ));

    h.engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_requested_auto_pick_honours_preselection() {
    let h = setup(EngineConfig::default()).await;
    let (room_id, _) = fill_room(&h).await;
    sleep(FIRST_TURN_OPEN).await;

    let opening = draft(&h, room_id).await;
    let acting = acting_user(&opening);
    let waiting = next_user(&opening);
    let queued = cheapest(&opening);
    let qb = any_qb(&opening);

    assert!(matches!(
        h.engine.preselect(room_id, waiting, &qb.id, Some(RosterSlot::Rb)).await,
        Err(DraftError::IllegalSlot { .. })
    ));
    assert!(matches!(
        h.engine.preselect(room_id, 99, &queued.id, None).await,
        Err(DraftError::NotInDraft)
    ));
    h.engine
        .preselect(room_id, waiting, &queued.id, None)
        .await
        .unwrap();

    assert!(matches!(
        h.engine.handle_auto_pick(room_id, waiting).await,
        Err(DraftError::NotYourTurn)
    ));
    assert!(matches!(
        h.engine.handle_auto_pick(room_id, 99).await,
        Err(DraftError::NotInDraft)
    ));

    // Without a preselection the selector takes the most expensive player
    let first = h.engine.handle_auto_pick(room_id, acting).await.unwrap();
    assert!(first.is_auto_pick);
    assert_eq!(first.player.unwrap().price, 5);

    let second = h.engine.handle_auto_pick(room_id, waiting).await.unwrap();
    assert!(second.is_auto_pick);
    assert_eq!(second.player.unwrap().id, queued.id);

    let after = draft(&h, room_id).await;
    assert!(!after.preselections.contains_key(&waiting));
    assert_eq!(phase(&h, room_id).await, Some(DraftPhase::AwaitingPick { turn: 2 }));

    // Drafted players cannot be queued
    assert!(matches!(
        h.engine.preselect(room_id, acting, &queued.id, None).await,
        Err(DraftError::PlayerUnavailable(_))
    ));

    h.engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_launch_preconditions() {
    let h = setup(EngineConfig::default()).await;

    assert!(matches!(
        h.engine.launch(404).await,
        Err(DraftError::RoomNotFound(404))
    ));

    let contest = h
        .repo
        .create_contest(&NewContest::single_room("Half Empty", FEE))
        .await
        .unwrap();
    let admission = h.engine.enter(contest.id, 1, "user1").await.unwrap();
    assert!(matches!(
        h.engine.launch(admission.room_id).await,
        Err(DraftError::NotReady {
            entries: 1,
            capacity: 5,
            ..
        })
    ));
    assert!(matches!(
        h.engine.handle_pick(admission.room_id, 1, "qb-5-0", RosterSlot::Qb).await,
        Err(DraftError::DraftNotFound(_))
    ));
    assert!(h.engine.scheduler().active_rooms().is_empty());

    let (room_id, _) = fill_room(&h).await;
    sleep(Duration::from_secs(2)).await;
    assert!(matches!(
        h.engine.launch(room_id).await,
        Err(DraftError::AlreadyLaunched(_))
    ));
    assert_eq!(h.engine.scheduler().active_rooms(), vec![room_id]);
    assert!(matches!(
        phase(&h, room_id).await,
        Some(DraftPhase::Countdown {
            stage: CountdownStage::Launch
        })
    ));

    h.engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_finalize_twice_is_idempotent() {
    let h = setup(EngineConfig::default()).await;
    let (room_id, admissions) = fill_room(&h).await;
    sleep(WHOLE_DRAFT).await;

    let summary = h.engine.finalize(room_id).await.unwrap();
    assert!(!summary.newly_completed);
    assert_eq!(summary.lineups_created, 0);
    assert_eq!(summary.bonuses_awarded, 0);

    for admission in &admissions {
        let user_id = h
            .repo
            .get_entry(admission.entry_id)
            .await
            .unwrap()
            .unwrap()
            .user_id;
        assert_eq!(
            h.repo.get_balance(user_id).await.unwrap(),
            Some(BALANCE - FEE + 100)
        );
    }

    // The accumulator is not topped up again
    let draft = draft(&h, room_id).await;
    assert!(draft.teams.iter().all(|t| t.bonus == 100));
    assert!(matches!(
        h.engine
            .handle_auto_pick(room_id, draft.teams[0].user_id)
            .await,
        Err(DraftError::DraftNotActive(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_finalize_stops_a_running_draft() {
    let h = setup(EngineConfig::default()).await;
    let (room_id, _) = fill_room(&h).await;
    sleep(FIRST_TURN_OPEN).await;

    let summary = h.engine.finalize(room_id).await.unwrap();
    assert!(summary.newly_completed);
    assert_eq!(summary.lineups_created, TEAMS);

    sleep(Duration::from_secs(60)).await;
    let draft = draft(&h, room_id).await;
    assert_eq!(draft.status, DraftStatus::Completed);
    assert!(draft.picks.is_empty());
    assert!(h.engine.scheduler().active_rooms().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_restarted_engine_resumes_open_turn() {
    let h = setup(EngineConfig::default()).await;
    let (room_id, _) = fill_room(&h).await;
    sleep(FIRST_TURN_OPEN).await;
    h.engine.shutdown().await;

    let restarted = engine_over(&h.repo, &h.backend, &h.locks, &h.hub, EngineConfig::default());
    let report = restarted.sweep_once().await;
    assert_eq!(report.recovered, vec![room_id]);
    assert!(report.launched.is_empty());

    // The phase query queues behind the resume
    let phase = restarted.scheduler().phase(room_id).await;
    assert_eq!(phase, Some(DraftPhase::AwaitingPick { turn: 0 }));
    let status = restarted.room_status(room_id).await.unwrap();
    assert!(status.draft.unwrap().picks.is_empty());

    // A live actor is left alone by the next sweep
    let report = restarted.sweep_once().await;
    assert!(report.recovered.is_empty());

    sleep(WHOLE_DRAFT).await;
    let status = restarted.room_status(room_id).await.unwrap();
    assert_eq!(status.draft.unwrap().status, DraftStatus::Completed);
    assert_eq!(status.room.status, RoomStatus::Completed);
}

#[tokio::test(start_paused = true)]
async fn test_stalled_turn_is_auto_picked_on_recovery() {
    let h = setup(EngineConfig::default()).await;
    let (room_id, _) = fill_room(&h).await;
    sleep(FIRST_TURN_OPEN).await;
    h.engine.shutdown().await;

    // Turn 0 started a minute ago, past its limit plus the stall buffer
    let store = h.engine.scheduler().store();
    let mut meta = store.get_turn(room_id).await.unwrap().unwrap();
    assert_eq!(meta.turn, 0);
    meta.started_at -= chrono::Duration::seconds(60);
    store.put_turn(&meta).await.unwrap();

    let restarted = engine_over(&h.repo, &h.backend, &h.locks, &h.hub, EngineConfig::default());
    let report = restarted.sweep_once().await;
    assert_eq!(report.recovered, vec![room_id]);

    let phase = restarted.scheduler().phase(room_id).await;
    assert_eq!(phase, Some(DraftPhase::AwaitingPick { turn: 1 }));
    let status = restarted.room_status(room_id).await.unwrap();
    let draft = status.draft.unwrap();
    assert_eq!(draft.picks.len(), 1);
    assert!(draft.picks[0].is_auto_pick);
    assert_eq!(status.turn.unwrap().turn, 1);

    restarted.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_sweep_launches_full_room_missed_at_fill_time() {
    let mut config = EngineConfig::default();
    // Push the automatic launch far beyond the test
    config.draft.launch_delay_secs = 10_000;
    let h = setup(config).await;
    let (room_id, _) = fill_room(&h).await;

    let report = h.engine.sweep_once().await;
    assert_eq!(report.launched, vec![room_id]);

    sleep(FIRST_TURN_OPEN).await;
    assert_eq!(phase(&h, room_id).await, Some(DraftPhase::AwaitingPick { turn: 0 }));

    h.engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_custom_draft_timing() {
    let config = EngineConfig {
        draft: DraftConfig {
            turn_limit_secs: 5,
            grace_secs: 1,
            launch_countdown_secs: 1,
            first_turn_countdown_secs: 1,
            ..DraftConfig::default()
        },
        ..EngineConfig::default()
    };
    let h = setup(config).await;
    let (room_id, _) = fill_room(&h).await;

    // Launch at 1s, countdowns end at 3s, every auto-picked turn takes 6s
    sleep(Duration::from_secs(3 + 6 * (TEAMS * ROUNDS) as u64 + 1)).await;
    let draft = draft(&h, room_id).await;
    assert_eq!(draft.status, DraftStatus::Completed);
    assert_eq!(draft.picks.len(), TEAMS * ROUNDS);
}

/// Draft backend whose first document write fails
#[derive(Default)]
struct FailFirstSave {
    inner: MemoryDraftBackend,
    failed: AtomicBool,
}

#[async_trait]
impl DraftStateBackend for FailFirstSave {
    async fn load(&self, room_id: RoomId) -> StoreResult<Option<Value>> {
        self.inner.load(room_id).await
    }

    async fn save(&self, room_id: RoomId, document: &Value, ttl: Duration) -> StoreResult<()> {
        if !self.failed.swap(true, Ordering::SeqCst) {
            return Err(StoreError::Timeout(Duration::from_secs(5)));
        }
        self.inner.save(room_id, document, ttl).await
    }

    async fn delete(&self, room_id: RoomId) -> StoreResult<()> {
        self.inner.delete(room_id).await
    }

    async fn load_turn(&self, room_id: RoomId) -> StoreResult<Option<TurnMeta>> {
        self.inner.load_turn(room_id).await
    }

    async fn save_turn(&self, meta: &TurnMeta, ttl: Duration) -> StoreResult<()> {
        self.inner.save_turn(meta, ttl).await
    }

    async fn delete_turn(&self, room_id: RoomId) -> StoreResult<()> {
        self.inner.delete_turn(room_id).await
    }
}

#[tokio::test(start_paused = true)]
async fn test_failed_launch_releases_room_for_sweep() {
    let repo = MemoryContestRepository::new();
    for user_id in 1..=TEAMS as i64 {
        repo.create_account(user_id, BALANCE).await;
    }
    let engine = DraftEngine::new(
        Arc::new(repo.clone()),
        Arc::new(FailFirstSave::default()),
        Arc::new(MemoryLockManager::new()),
        Arc::new(BroadcastHub::new()),
        Arc::new(PricedBoardGenerator::synthetic(3)),
        EngineConfig::default(),
    );

    let contest = repo
        .create_contest(&NewContest::single_room("Flaky Store", FEE))
        .await
        .unwrap();
    let mut room_id = 0;
    for user_id in 1..=TEAMS as i64 {
        room_id = engine
            .enter(contest.id, user_id, &format!("user{user_id}"))
            .await
            .unwrap()
            .room_id;
    }

    // The automatic launch hits the failing write and gives the room back
    sleep(Duration::from_secs(2)).await;
    let status = engine.room_status(room_id).await.unwrap();
    assert_eq!(status.room.status, RoomStatus::Ready);
    assert!(status.draft.is_none());
    assert!(status.entries.iter().all(|e| e.status == EntryStatus::Pending));
    assert!(engine.scheduler().active_rooms().is_empty());

    let report = engine.sweep_once().await;
    assert_eq!(report.launched, vec![room_id]);

    sleep(FIRST_TURN_OPEN).await;
    assert_eq!(
        engine.scheduler().phase(room_id).await,
        Some(DraftPhase::AwaitingPick { turn: 0 })
    );

    sleep(WHOLE_DRAFT).await;
    let status = engine.room_status(room_id).await.unwrap();
    assert_eq!(status.room.status, RoomStatus::Completed);
    assert_eq!(status.draft.unwrap().status, DraftStatus::Completed);
}
