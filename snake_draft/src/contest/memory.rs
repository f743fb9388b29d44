//! In-memory contest repository.
//!
//! Transactions take the whole state behind one async mutex and work on a
//! copy that replaces the original on commit, so they are trivially
//! serializable. Used by `--memory` mode and tests.

use super::models::{
    Contest, ContestId, ContestRoom, ContestStatus, Entry, EntryId, EntryStatus, LedgerPosting,
    Lineup, NewContest, NewEntry, RoomStatus,
};
use super::repository::{ContestRepository, ContestTx};
use crate::db::{StoreError, StoreResult};
use crate::draft::models::Roster;
use crate::wallet::{EntryType, LedgerEntry, UserAccount};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    contests: BTreeMap<ContestId, Contest>,
    rooms: BTreeMap<i64, ContestRoom>,
    entries: BTreeMap<EntryId, Entry>,
    accounts: BTreeMap<i64, UserAccount>,
    ledger: Vec<LedgerEntry>,
    lineups: BTreeMap<EntryId, Lineup>,
    next_id: i64,
}

impl MemoryState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn insert_contest(&mut self, new: &NewContest) -> Contest {
        let contest = Contest {
            id: self.next_id(),
            name: new.name.clone(),
            contest_type: new.contest_type,
            status: ContestStatus::Open,
            entry_fee: new.entry_fee,
            max_entries: new.max_entries,
            current_entries: 0,
            room_capacity: new.room_capacity,
            max_entries_per_user: new.max_entries_per_user,
            created_at: Utc::now(),
        };
        self.contests.insert(contest.id, contest.clone());
        contest
    }

    fn rooms_of(&self, contest_id: ContestId) -> Vec<ContestRoom> {
        let mut rooms: Vec<_> = self
            .rooms
            .values()
            .filter(|r| r.contest_id == contest_id)
            .cloned()
            .collect();
        rooms.sort_by_key(|r| r.room_number);
        rooms
    }

    fn room_entries(&self, room_id: i64) -> Vec<Entry> {
        self.entries
            .values()
            .filter(|e| e.room_id == room_id && e.status.is_active())
            .cloned()
            .collect()
    }

    fn post_ledger(&mut self, posting: &LedgerPosting) -> StoreResult<Option<i64>> {
        if self
            .ledger
            .iter()
            .any(|e| e.idempotency_key == posting.idempotency_key)
        {
            return Ok(None);
        }

        let account = self
            .accounts
            .get_mut(&posting.user_id)
            .ok_or(StoreError::Database(sqlx::Error::RowNotFound))?;
        if account.balance + posting.amount < 0 {
            return Err(StoreError::Database(sqlx::Error::RowNotFound));
        }
        account.balance += posting.amount;
        let balance_after = account.balance;

        let id = self.next_id();
        self.ledger.push(LedgerEntry {
            id,
            user_id: posting.user_id,
            contest_id: posting.contest_id,
            amount: posting.amount,
            balance_after,
            direction: posting.entry_type.direction(),
            entry_type: posting.entry_type,
            idempotency_key: posting.idempotency_key.clone(),
            description: posting.description.clone(),
            created_at: Utc::now(),
        });

        Ok(Some(balance_after))
    }
}

/// In-memory [`ContestRepository`]
#[derive(Clone, Default)]
pub struct MemoryContestRepository {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryContestRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or overwrite a wallet
    pub async fn create_account(&self, user_id: i64, balance: i64) {
        self.state
            .lock()
            .await
            .accounts
            .insert(user_id, UserAccount { user_id, balance });
    }

    /// Overwrite an entry's stored draft position
    pub async fn force_entry_position(&self, entry_id: EntryId, position: Option<u32>) {
        if let Some(entry) = self.state.lock().await.entries.get_mut(&entry_id) {
            entry.draft_position = position;
        }
    }

    /// All contests, oldest first
    pub async fn contests(&self) -> Vec<Contest> {
        self.state.lock().await.contests.values().cloned().collect()
    }
}

/// Transaction over a working copy of the state
pub struct MemoryContestTx {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
}

#[async_trait]
impl ContestTx for MemoryContestTx {
    async fn lock_contest(&mut self, contest_id: ContestId) -> StoreResult<Option<Contest>> {
        Ok(self.working.contests.get(&contest_id).cloned())
    }

    async fn lock_account(&mut self, user_id: i64) -> StoreResult<Option<UserAccount>> {
        Ok(self.working.accounts.get(&user_id).cloned())
    }

    async fn count_user_entries(
        &mut self,
        contest_id: ContestId,
        user_id: i64,
    ) -> StoreResult<i64> {
        Ok(self
            .working
            .entries
            .values()
            .filter(|e| e.contest_id == contest_id && e.user_id == user_id && e.status.is_active())
            .count() as i64)
    }

    async fn count_unfilled_rooms_for_user(
        &mut self,
        contest_id: ContestId,
        user_id: i64,
    ) -> StoreResult<i64> {
        let mut rooms: Vec<i64> = self
            .working
            .entries
            .values()
            .filter(|e| {
                e.contest_id == contest_id
                    && e.user_id == user_id
                    && e.status == EntryStatus::Pending
                    && self
                        .working
                        .rooms
                        .get(&e.room_id)
                        .is_some_and(|r| r.status == RoomStatus::Waiting)
            })
            .map(|e| e.room_id)
            .collect();
        rooms.sort_unstable();
        rooms.dedup();
        Ok(rooms.len() as i64)
    }

    async fn list_rooms(&mut self, contest_id: ContestId) -> StoreResult<Vec<ContestRoom>> {
        Ok(self.working.rooms_of(contest_id))
    }

    async fn lock_room(&mut self, room_id: i64) -> StoreResult<Option<ContestRoom>> {
        Ok(self.working.rooms.get(&room_id).cloned())
    }

    async fn room_entries(&mut self, room_id: i64) -> StoreResult<Vec<Entry>> {
        Ok(self.working.room_entries(room_id))
    }

    async fn create_room(
        &mut self,
        contest_id: ContestId,
        room_number: i32,
        capacity: usize,
    ) -> StoreResult<ContestRoom> {
        let room = ContestRoom {
            id: self.working.next_id(),
            contest_id,
            room_number,
            capacity,
            status: RoomStatus::Waiting,
            created_at: Utc::now(),
            launched_at: None,
        };
        self.working.rooms.insert(room.id, room.clone());
        Ok(room)
    }

    async fn set_room_status(&mut self, room_id: i64, status: RoomStatus) -> StoreResult<()> {
        if let Some(room) = self.working.rooms.get_mut(&room_id) {
            room.status = status;
        }
        Ok(())
    }

    async fn insert_entry(&mut self, new: &NewEntry) -> StoreResult<Entry> {
        let entry = Entry {
            id: self.working.next_id(),
            contest_id: new.contest_id,
            room_id: new.room_id,
            user_id: new.user_id,
            username: new.username.clone(),
            draft_position: Some(new.draft_position),
            fee_paid: new.fee_paid,
            status: EntryStatus::Pending,
            roster: None,
            created_at: Utc::now(),
        };
        self.working.entries.insert(entry.id, entry.clone());
        Ok(entry)
    }

    async fn lock_entry(&mut self, entry_id: EntryId) -> StoreResult<Option<Entry>> {
        Ok(self.working.entries.get(&entry_id).cloned())
    }

    async fn set_entry_status(&mut self, entry_id: EntryId, status: EntryStatus) -> StoreResult<()> {
        if let Some(entry) = self.working.entries.get_mut(&entry_id) {
            entry.status = status;
        }
        Ok(())
    }

    async fn set_entry_position(&mut self, entry_id: EntryId, position: u32) -> StoreResult<()> {
        if let Some(entry) = self.working.entries.get_mut(&entry_id) {
            entry.draft_position = Some(position);
        }
        Ok(())
    }

    async fn post_ledger(&mut self, posting: &LedgerPosting) -> StoreResult<Option<i64>> {
        self.working.post_ledger(posting)
    }

    async fn update_contest_entries(
        &mut self,
        contest_id: ContestId,
        current_entries: i64,
        status: ContestStatus,
    ) -> StoreResult<()> {
        if let Some(contest) = self.working.contests.get_mut(&contest_id) {
            contest.current_entries = current_entries;
            contest.status = status;
        }
        Ok(())
    }

    async fn insert_contest(&mut self, contest: &NewContest) -> StoreResult<Contest> {
        Ok(self.working.insert_contest(contest))
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let MemoryContestTx { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        Ok(())
    }
}

#[async_trait]
impl ContestRepository for MemoryContestRepository {
    async fn begin(&self) -> StoreResult<Box<dyn ContestTx>> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryContestTx { guard, working }))
    }

    async fn create_contest(&self, contest: &NewContest) -> StoreResult<Contest> {
        Ok(self.state.lock().await.insert_contest(contest))
    }

    async fn get_contest(&self, contest_id: ContestId) -> StoreResult<Option<Contest>> {
        Ok(self.state.lock().await.contests.get(&contest_id).cloned())
    }

    async fn get_room(&self, room_id: i64) -> StoreResult<Option<ContestRoom>> {
        Ok(self.state.lock().await.rooms.get(&room_id).cloned())
    }

    async fn list_rooms(&self, contest_id: ContestId) -> StoreResult<Vec<ContestRoom>> {
        Ok(self.state.lock().await.rooms_of(contest_id))
    }

    async fn get_entry(&self, entry_id: EntryId) -> StoreResult<Option<Entry>> {
        Ok(self.state.lock().await.entries.get(&entry_id).cloned())
    }

    async fn room_entries(&self, room_id: i64) -> StoreResult<Vec<Entry>> {
        Ok(self.state.lock().await.room_entries(room_id))
    }

    async fn set_entry_positions(&self, updates: &[(EntryId, u32)]) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        for (entry_id, position) in updates {
            if let Some(entry) = state.entries.get_mut(entry_id) {
                entry.draft_position = Some(*position);
            }
        }
        Ok(())
    }

    async fn claim_room_for_draft(&self, room_id: i64) -> StoreResult<bool> {
        let mut state = self.state.lock().await;
        match state.rooms.get_mut(&room_id) {
            Some(room) if room.status.is_pre_draft() => {
                room.status = RoomStatus::Drafting;
                room.launched_at = Some(Utc::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_entries_drafting(&self, room_id: i64) -> StoreResult<u64> {
        let mut state = self.state.lock().await;
        let mut changed = 0;
        for entry in state.entries.values_mut() {
            if entry.room_id == room_id && entry.status == EntryStatus::Pending {
                entry.status = EntryStatus::Drafting;
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn set_room_status(&self, room_id: i64, status: RoomStatus) -> StoreResult<()> {
        if let Some(room) = self.state.lock().await.rooms.get_mut(&room_id) {
            room.status = status;
        }
        Ok(())
    }

    async fn complete_entry(&self, entry_id: EntryId, roster: &Roster) -> StoreResult<bool> {
        let mut state = self.state.lock().await;
        let entry = state
            .entries
            .get_mut(&entry_id)
            .ok_or(StoreError::Database(sqlx::Error::RowNotFound))?;
        entry.status = EntryStatus::Completed;
        entry.roster = Some(roster.clone());
        let lineup = Lineup {
            entry_id,
            contest_id: entry.contest_id,
            room_id: entry.room_id,
            user_id: entry.user_id,
            roster: roster.clone(),
            total_spent: roster.total_spent(),
            created_at: Utc::now(),
        };

        if state.lineups.contains_key(&entry_id) {
            return Ok(false);
        }
        state.lineups.insert(entry_id, lineup);
        Ok(true)
    }

    async fn award_completion_bonus(&self, entry: &Entry, amount: i64) -> StoreResult<bool> {
        let mut state = self.state.lock().await;
        let posted = state.post_ledger(&LedgerPosting {
            user_id: entry.user_id,
            contest_id: Some(entry.contest_id),
            amount,
            entry_type: EntryType::CompletionBonus,
            idempotency_key: EntryType::CompletionBonus.idempotency_key(entry.id),
            description: Some(format!("Draft completed in room {}", entry.room_id)),
        })?;
        Ok(posted.is_some())
    }

    async fn resync_contest_entries(&self, contest_id: ContestId) -> StoreResult<i64> {
        let mut state = self.state.lock().await;
        let count = state
            .entries
            .values()
            .filter(|e| e.contest_id == contest_id && e.status.is_active())
            .count() as i64;
        if let Some(contest) = state.contests.get_mut(&contest_id) {
            contest.current_entries = count;
        }
        Ok(count)
    }

    async fn drafting_rooms(&self) -> StoreResult<Vec<i64>> {
        let state = self.state.lock().await;
        let mut rooms: Vec<i64> = state
            .entries
            .values()
            .filter(|e| e.status == EntryStatus::Drafting)
            .map(|e| e.room_id)
            .collect();
        rooms.sort_unstable();
        rooms.dedup();
        Ok(rooms)
    }

    async fn full_unlaunched_rooms(&self) -> StoreResult<Vec<i64>> {
        let state = self.state.lock().await;
        Ok(state
            .rooms
            .values()
            .filter(|r| r.status.is_pre_draft() && state.room_entries(r.id).len() >= r.capacity)
            .map(|r| r.id)
            .collect())
    }

    async fn get_balance(&self, user_id: i64) -> StoreResult<Option<i64>> {
        Ok(self
            .state
            .lock()
            .await
            .accounts
            .get(&user_id)
            .map(|a| a.balance))
    }

    async fn lineup(&self, entry_id: EntryId) -> StoreResult<Option<Lineup>> {
        Ok(self.state.lock().await.lineups.get(&entry_id).cloned())
    }

    async fn ledger_entries(&self, user_id: i64) -> StoreResult<Vec<LedgerEntry>> {
        Ok(self
            .state
            .lock()
            .await
            .ledger
            .iter()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect())
    }
}
