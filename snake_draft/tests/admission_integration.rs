//! Integration tests for contest admission, withdrawal and room matchmaking.
//!
//! Runs the full engine over in-memory storage: fee debits and refunds,
//! capacity and per-user limits, concurrent entry at the capacity boundary
//! and lazy draft position repair. The clock is paused, so a filled room
//! only launches in tests that sleep past the launch delay.

use futures_util::future::join_all;
use snake_draft::contest::{
    ContestError, ContestRepository, ContestStatus, MemoryContestRepository, NewContest,
    RoomStatus,
};
use snake_draft::db::{LockManager, MemoryLockManager, lock::admission_key};
use snake_draft::draft::{
    BroadcastHub, DraftError, DraftEvent, MemoryDraftBackend, PricedBoardGenerator,
};
use snake_draft::wallet::EntryType;
use snake_draft::{DraftEngine, EngineConfig, ErrorKind};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

const FEE: i64 = 10;
const BALANCE: i64 = 100;

struct Harness {
    engine: DraftEngine,
    repo: MemoryContestRepository,
    locks: Arc<MemoryLockManager>,
    hub: Arc<BroadcastHub>,
}

/// Helper to create an engine over in-memory storage with funded users 1..=users
async fn setup(users: i64) -> Harness {
    let repo = MemoryContestRepository::new();
    for user_id in 1..=users {
        repo.create_account(user_id, BALANCE).await;
    }
    let locks = Arc::new(MemoryLockManager::new());
    let hub = Arc::new(BroadcastHub::new());

    let engine = DraftEngine::new(
        Arc::new(repo.clone()),
        Arc::new(MemoryDraftBackend::new()),
        locks.clone(),
        hub.clone(),
        Arc::new(PricedBoardGenerator::synthetic(3)),
        EngineConfig::default(),
    );

    Harness {
        engine,
        repo,
        locks,
        hub,
    }
}

async fn single_room(h: &Harness) -> i64 {
    h.repo
        .create_contest(&NewContest::single_room("Sunday Main", FEE))
        .await
        .expect("Failed to create contest")
        .id
}

fn username(user_id: i64) -> String {
    format!("user{user_id}")
}

#[tokio::test(start_paused = true)]
async fn test_sequential_entries_fill_room() {
    let h = setup(5).await;
    let contest_id = single_room(&h).await;
    let mut feed = h.hub.subscribe_all();

    let mut positions = Vec::new();
    let mut room_ids = BTreeSet::new();
    for user_id in 1..=5 {
        let admission = h
            .engine
            .enter(contest_id, user_id, &username(user_id))
            .await
            .expect("Admission should succeed");

        assert_eq!(admission.new_balance, BALANCE - FEE);
        assert_eq!(admission.room_full, user_id == 5);
        positions.push(admission.draft_position);
        room_ids.insert(admission.room_id);
    }

    assert_eq!(positions, vec![0, 1, 2, 3, 4]);
    assert_eq!(room_ids.len(), 1);

    let room_id = *room_ids.iter().next().unwrap();
    let room = h.repo.get_room(room_id).await.unwrap().unwrap();
    assert_eq!(room.status, RoomStatus::Ready);

    let contest = h.repo.get_contest(contest_id).await.unwrap().unwrap();
    assert_eq!(contest.current_entries, 5);
    assert_eq!(contest.status, ContestStatus::Closed);

    // A filled single-room contest is replaced by a fresh open copy
    let contests = h.repo.contests().await;
    assert_eq!(contests.len(), 2);
    assert!(
        contests
            .iter()
            .any(|c| c.id != contest_id && c.status == ContestStatus::Open)
    );

    let mut joined = 0;
    while let Ok(envelope) = feed.try_recv() {
        if let DraftEvent::RoomJoined { entries, capacity, .. } = envelope.event {
            joined += 1;
            assert_eq!(capacity, 5);
            assert_eq!(entries, joined);
        }
    }
    assert_eq!(joined, 5);
}

#[tokio::test(start_paused = true)]
async fn test_fee_is_recorded_in_ledger() {
    let h = setup(1).await;
    let contest_id = single_room(&h).await;

    let admission = h.engine.enter(contest_id, 1, "alice").await.unwrap();

    assert_eq!(h.repo.get_balance(1).await.unwrap(), Some(BALANCE - FEE));
    let ledger = h.repo.ledger_entries(1).await.unwrap();
    assert_eq!(ledger.len(), 1);
    assert_eq!(ledger[0].entry_type, EntryType::EntryFee);
    assert_eq!(ledger[0].amount, FEE);
    assert_eq!(ledger[0].balance_after, BALANCE - FEE);
    assert_eq!(
        ledger[0].idempotency_key,
        EntryType::EntryFee.idempotency_key(admission.entry_id)
    );
}

#[tokio::test(start_paused = true)]
async fn test_admission_failures_leave_no_trace() {
    let h = setup(2).await;
    h.repo.create_account(3, FEE - 1).await;
    let contest_id = single_room(&h).await;

    assert!(matches!(
        h.engine.enter(999, 1, "alice").await,
        Err(ContestError::NotFound(999))
    ));
    assert!(matches!(
        h.engine.enter(contest_id, 42, "ghost").await,
        Err(ContestError::AccountNotFound(42))
    ));

    let err = h.engine.enter(contest_id, 3, "broke").await.unwrap_err();
    assert!(matches!(
        err,
        ContestError::InsufficientBalance { balance: 9, fee: 10 }
    ));
    assert_eq!(err.kind(), ErrorKind::ResourceExhausted);
    assert!(!err.is_retryable());

    h.engine.enter(contest_id, 1, "alice").await.unwrap();
    let err = h.engine.enter(contest_id, 1, "alice").await.unwrap_err();
    assert!(matches!(err, ContestError::AlreadyEntered(id) if id == contest_id));

    // Only the one successful admission touched state
    let contest = h.repo.get_contest(contest_id).await.unwrap().unwrap();
    assert_eq!(contest.current_entries, 1);
    assert_eq!(h.repo.get_balance(1).await.unwrap(), Some(BALANCE - FEE));
    assert_eq!(h.repo.get_balance(3).await.unwrap(), Some(FEE - 1));
    assert!(h.repo.ledger_entries(3).await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_closed_contest_rejects_entry() {
    let h = setup(6).await;
    let contest_id = single_room(&h).await;
    for user_id in 1..=5 {
        h.engine
            .enter(contest_id, user_id, &username(user_id))
            .await
            .unwrap();
    }

    let err = h.engine.enter(contest_id, 6, "late").await.unwrap_err();
    assert!(matches!(err, ContestError::NotOpen(_)));
    assert_eq!(h.repo.get_balance(6).await.unwrap(), Some(BALANCE));
}

#[tokio::test(start_paused = true)]
async fn test_held_lock_is_retryable_busy() {
    let h = setup(1).await;
    let contest_id = single_room(&h).await;

    let token = h
        .locks
        .try_acquire(&admission_key(contest_id, 1), Duration::from_secs(10))
        .await
        .unwrap()
        .expect("Lock should be free");

    let err = h.engine.enter(contest_id, 1, "alice").await.unwrap_err();
    assert!(matches!(err, ContestError::LockBusy));
    assert!(err.is_retryable());

    h.locks.release(&token).await.unwrap();
    assert!(h.engine.enter(contest_id, 1, "alice").await.is_ok());
    assert!(!h.locks.is_held(&admission_key(contest_id, 1)).await);
}

#[tokio::test(start_paused = true)]
async fn test_multi_room_contest_fills_rooms_in_order() {
    let h = setup(10).await;
    let contest = h
        .repo
        .create_contest(&NewContest::multi_room("Weekly", FEE, 2, 1))
        .await
        .unwrap();

    for user_id in 1..=10 {
        h.engine
            .enter(contest.id, user_id, &username(user_id))
            .await
            .unwrap();
    }

    let rooms = h.repo.list_rooms(contest.id).await.unwrap();
    assert_eq!(rooms.len(), 2);
    assert_eq!(
        rooms.iter().map(|r| r.room_number).collect::<Vec<_>>(),
        vec![1, 2]
    );

    for room in rooms {
        let entries = h.repo.room_entries(room.id).await.unwrap();
        let positions: BTreeSet<u32> = entries.iter().filter_map(|e| e.draft_position).collect();
        assert_eq!(positions, (0..5).collect());
        assert_eq!(room.status, RoomStatus::Ready);
    }
}

#[tokio::test(start_paused = true)]
async fn test_per_user_limits() {
    let h = setup(1).await;
    let contest = h
        .repo
        .create_contest(&NewContest::multi_room("Grinder", 1, 4, 2))
        .await
        .unwrap();

    // A user never shares a room with themselves
    let first = h.engine.enter(contest.id, 1, "alice").await.unwrap();
    let second = h.engine.enter(contest.id, 1, "alice").await.unwrap();
    assert_ne!(first.room_id, second.room_id);

    let err = h.engine.enter(contest.id, 1, "alice").await.unwrap_err();
    assert!(matches!(
        err,
        ContestError::EntryLimitReached { limit: 2, .. }
    ));
}

#[tokio::test(start_paused = true)]
async fn test_unfilled_room_limit() {
    let h = setup(1).await;
    let contest = h
        .repo
        .create_contest(&NewContest::multi_room("Grinder", 1, 4, 4))
        .await
        .unwrap();

    for _ in 0..3 {
        h.engine.enter(contest.id, 1, "alice").await.unwrap();
    }

    let err = h.engine.enter(contest.id, 1, "alice").await.unwrap_err();
    assert!(matches!(err, ContestError::TooManyUnfilledRooms(3)));
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_entries_at_capacity_launch_once() {
    let h = setup(8).await;
    let contest_id = single_room(&h).await;

    let attempts = (1..=8).map(|user_id| {
        let engine = h.engine.clone();
        async move { engine.enter(contest_id, user_id, &username(user_id)).await }
    });
    let results = join_all(attempts).await;

    let admitted: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(admitted.len(), 5);
    for rejected in results.iter().filter_map(|r| r.as_ref().err()) {
        assert!(
            matches!(rejected, ContestError::NotOpen(_) | ContestError::Full(_)),
            "unexpected rejection: {rejected:?}"
        );
    }

    let positions: BTreeSet<u32> = admitted.iter().map(|a| a.draft_position).collect();
    assert_eq!(positions, (0..5).collect());
    assert_eq!(admitted.iter().filter(|a| a.room_full).count(), 1);

    let room_id = admitted[0].room_id;
    tokio::time::sleep(Duration::from_secs(2)).await;

    let room = h.repo.get_room(room_id).await.unwrap().unwrap();
    assert_eq!(room.status, RoomStatus::Drafting);
    assert!(matches!(
        h.engine.launch(room_id).await,
        Err(DraftError::AlreadyLaunched(_))
    ));

    // Rejected users were never charged
    for (i, result) in results.iter().enumerate() {
        let expected = if result.is_ok() { BALANCE - FEE } else { BALANCE };
        assert_eq!(h.repo.get_balance(i as i64 + 1).await.unwrap(), Some(expected));
    }

    h.engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_withdraw_refunds_and_frees_seat() {
    let h = setup(6).await;
    let contest_id = single_room(&h).await;

    let mut admissions = Vec::new();
    for user_id in 1..=5 {
        admissions.push(
            h.engine
                .enter(contest_id, user_id, &username(user_id))
                .await
                .unwrap(),
        );
    }
    let leaving = &admissions[2];
    let room_id = leaving.room_id;

    let withdrawal = h.engine.withdraw(leaving.entry_id, 3).await.unwrap();
    assert_eq!(withdrawal.refunded, FEE);
    assert_eq!(withdrawal.new_balance, BALANCE);

    let ledger = h.repo.ledger_entries(3).await.unwrap();
    assert_eq!(
        ledger.iter().map(|e| e.entry_type).collect::<Vec<_>>(),
        vec![EntryType::EntryFee, EntryType::Refund]
    );

    let room = h.repo.get_room(room_id).await.unwrap().unwrap();
    assert_eq!(room.status, RoomStatus::Waiting);
    let contest = h.repo.get_contest(contest_id).await.unwrap().unwrap();
    assert_eq!(contest.status, ContestStatus::Open);
    assert_eq!(contest.current_entries, 4);

    // The freed seat is reused
    let replacement = h.engine.enter(contest_id, 6, "sixth").await.unwrap();
    assert_eq!(replacement.room_id, room_id);
    assert_eq!(replacement.draft_position, leaving.draft_position);

    // A cancelled entry cannot be withdrawn twice
    assert!(matches!(
        h.engine.withdraw(leaving.entry_id, 3).await,
        Err(ContestError::NotWithdrawable(_))
    ));
    assert!(matches!(
        h.engine.withdraw(leaving.entry_id, 4).await,
        Err(ContestError::EntryNotFound(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_withdraw_after_launch_rejected() {
    let h = setup(5).await;
    let contest_id = single_room(&h).await;
    let mut entry_id = 0;
    for user_id in 1..=5 {
        entry_id = h
            .engine
            .enter(contest_id, user_id, &username(user_id))
            .await
            .unwrap()
            .entry_id;
    }

    tokio::time::sleep(Duration::from_secs(2)).await;

    let err = h.engine.withdraw(entry_id, 5).await.unwrap_err();
    assert!(matches!(err, ContestError::NotWithdrawable(_)));
    assert_eq!(h.repo.get_balance(5).await.unwrap(), Some(BALANCE - FEE));

    h.engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_room_status_repairs_positions() {
    let h = setup(3).await;
    let contest_id = single_room(&h).await;
    let mut entries = Vec::new();
    for user_id in 1..=3 {
        entries.push(
            h.engine
                .enter(contest_id, user_id, &username(user_id))
                .await
                .unwrap(),
        );
    }
    let room_id = entries[0].room_id;

    // Simulate historical damage: one unassigned, one duplicate
    h.repo.force_entry_position(entries[0].entry_id, None).await;
    h.repo.force_entry_position(entries[2].entry_id, Some(1)).await;

    let status = h.engine.room_status(room_id).await.unwrap();
    let positions: Vec<Option<u32>> = status.entries.iter().map(|e| e.draft_position).collect();
    assert_eq!(positions, vec![Some(0), Some(1), Some(2)]);
    assert!(status.draft.is_none());
    assert!(status.phase.is_none());

    // The repair was persisted
    let stored = h.repo.room_entries(room_id).await.unwrap();
    let stored: BTreeSet<u32> = stored.iter().filter_map(|e| e.draft_position).collect();
    assert_eq!(stored, (0..3).collect());
}
