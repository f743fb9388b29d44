//! Room matchmaking.
//!
//! Assignment runs in two phases inside the admission transaction. The scan
//! phase reads every room of the contest and ranks those that could take
//! the user. The lock-and-verify phase row-locks candidates one at a time
//! and re-checks them, moving to the next candidate on conflict. When no
//! candidate survives within the retry budget a new room is allocated.

use super::errors::{ContestError, ContestResult};
use super::models::{Contest, ContestRoom, Entry, EntryId};
use super::repository::{ContestRepository, ContestTx};
use std::cmp::Reverse;

/// A room considered during the scan phase
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub room_id: i64,
    pub room_number: i32,
    pub active_entries: usize,
}

/// Chosen room and seat
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomAssignment {
    pub room_id: i64,
    pub room_number: i32,
    pub draft_position: u32,
    /// Active entries in the room after this assignment
    pub occupancy: usize,
    pub capacity: usize,
}

impl RoomAssignment {
    pub fn is_full(&self) -> bool {
        self.occupancy >= self.capacity
    }
}

/// Finds or creates a room with a free seat
#[derive(Debug, Clone)]
pub struct RoomMatchmaker {
    max_attempts: usize,
}

impl RoomMatchmaker {
    pub fn new(max_attempts: usize) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    /// Assign `user_id` a room and draft position in `contest`
    pub async fn assign(
        &self,
        tx: &mut dyn ContestTx,
        contest: &Contest,
        user_id: i64,
    ) -> ContestResult<RoomAssignment> {
        let candidates = self.scan(tx, contest, user_id).await?;

        for candidate in candidates.iter().take(self.max_attempts) {
            if let Some(assignment) = self.lock_and_verify(tx, candidate, user_id).await? {
                return Ok(assignment);
            }
            log::debug!(
                "Room {} no longer fits user {}, trying next candidate",
                candidate.room_id,
                user_id
            );
        }

        self.allocate_room(tx, contest).await
    }

    /// Scan phase: rank rooms that could take the user
    pub async fn scan(
        &self,
        tx: &mut dyn ContestTx,
        contest: &Contest,
        user_id: i64,
    ) -> ContestResult<Vec<Candidate>> {
        let rooms = tx.list_rooms(contest.id).await?;
        let mut candidates = Vec::new();

        for room in rooms.into_iter().filter(|r| r.status.is_pre_draft()) {
            let entries = tx.room_entries(room.id).await?;
            if entries.len() >= room.capacity || entries.iter().any(|e| e.user_id == user_id) {
                continue;
            }
            candidates.push(Candidate {
                room_id: room.id,
                room_number: room.room_number,
                active_entries: entries.len(),
            });
        }

        Ok(rank_candidates(candidates))
    }

    /// Lock-and-verify phase: re-check one candidate under a row lock
    async fn lock_and_verify(
        &self,
        tx: &mut dyn ContestTx,
        candidate: &Candidate,
        user_id: i64,
    ) -> ContestResult<Option<RoomAssignment>> {
        let Some(room) = tx.lock_room(candidate.room_id).await? else {
            return Ok(None);
        };
        if !room.status.is_pre_draft() {
            return Ok(None);
        }

        let mut entries = tx.room_entries(room.id).await?;
        if entries.len() >= room.capacity || entries.iter().any(|e| e.user_id == user_id) {
            return Ok(None);
        }

        let repairs = repair_positions(&entries, room.capacity);
        if !repairs.is_empty() {
            log::warn!(
                "Repairing {} draft positions in room {} before assignment",
                repairs.len(),
                room.id
            );
            for (entry_id, position) in &repairs {
                tx.set_entry_position(*entry_id, *position).await?;
            }
            apply_repairs(&mut entries, &repairs);
        }

        let Some(position) = lowest_free_position(&entries, room.capacity) else {
            return Ok(None);
        };

        Ok(Some(RoomAssignment {
            room_id: room.id,
            room_number: room.room_number,
            draft_position: position,
            occupancy: entries.len() + 1,
            capacity: room.capacity,
        }))
    }

    /// Fallback: open the next room of the contest
    async fn allocate_room(
        &self,
        tx: &mut dyn ContestTx,
        contest: &Contest,
    ) -> ContestResult<RoomAssignment> {
        let rooms = tx.list_rooms(contest.id).await?;
        let max_rooms = (contest.max_entries as usize).div_ceil(contest.room_capacity.max(1));
        if rooms.len() >= max_rooms {
            return Err(ContestError::NoRoomAvailable(self.max_attempts));
        }

        let room_number = next_room_number(&rooms);
        let room = tx
            .create_room(contest.id, room_number, contest.room_capacity)
            .await?;
        log::info!(
            "Allocated room {} (#{}) for contest {}",
            room.id,
            room.room_number,
            contest.id
        );

        Ok(RoomAssignment {
            room_id: room.id,
            room_number: room.room_number,
            draft_position: 0,
            occupancy: 1,
            capacity: room.capacity,
        })
    }
}

/// Fullest rooms first, then lowest room number
pub fn rank_candidates(mut candidates: Vec<Candidate>) -> Vec<Candidate> {
    candidates.sort_by_key(|c| (Reverse(c.active_entries), c.room_number));
    candidates
}

/// Lowest seat in `[0, capacity)` not held by an active entry
pub fn lowest_free_position(entries: &[Entry], capacity: usize) -> Option<u32> {
    (0..capacity as u32).find(|pos| !entries.iter().any(|e| e.draft_position == Some(*pos)))
}

/// Position changes needed to make a room's seats distinct and in range.
///
/// Empty when the room is consistent. Otherwise active entries are
/// renumbered in entry order and only changed seats are returned.
pub fn repair_positions(entries: &[Entry], capacity: usize) -> Vec<(EntryId, u32)> {
    let mut seen = Vec::with_capacity(entries.len());
    let consistent = entries.iter().all(|e| match e.draft_position {
        Some(pos) if (pos as usize) < capacity && !seen.contains(&pos) => {
            seen.push(pos);
            true
        }
        _ => false,
    });
    if consistent {
        return Vec::new();
    }

    let mut ordered: Vec<&Entry> = entries.iter().collect();
    ordered.sort_by_key(|e| e.id);
    ordered
        .into_iter()
        .enumerate()
        .filter(|(idx, e)| e.draft_position != Some(*idx as u32))
        .map(|(idx, e)| (e.id, idx as u32))
        .collect()
}

fn apply_repairs(entries: &mut [Entry], repairs: &[(EntryId, u32)]) {
    for (entry_id, position) in repairs {
        if let Some(entry) = entries.iter_mut().find(|e| e.id == *entry_id) {
            entry.draft_position = Some(*position);
        }
    }
}

fn next_room_number(rooms: &[ContestRoom]) -> i32 {
    rooms.iter().map(|r| r.room_number).max().unwrap_or(0) + 1
}

/// Load a room's active entries, repairing seat numbers if needed
pub async fn repaired_room_entries(
    repo: &dyn ContestRepository,
    room_id: i64,
    capacity: usize,
) -> ContestResult<Vec<Entry>> {
    let mut entries = repo.room_entries(room_id).await?;
    let repairs = repair_positions(&entries, capacity);
    if !repairs.is_empty() {
        log::warn!(
            "Repairing {} draft positions in room {}",
            repairs.len(),
            room_id
        );
        repo.set_entry_positions(&repairs).await?;
        apply_repairs(&mut entries, &repairs);
    }
    Ok(entries)
}
