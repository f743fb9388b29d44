//! Contest storage: repository traits and the PostgreSQL implementation.

use super::models::{
    Contest, ContestId, ContestRoom, ContestStatus, Entry, EntryId, EntryStatus, LedgerPosting,
    Lineup, NewContest, NewEntry, RoomStatus,
};
use crate::db::{StoreError, StoreResult, timeouts::with_default_timeout};
use crate::draft::models::{Participant, Roster};
use crate::draft::store::ParticipantSource;
use crate::wallet::{EntryType, LedgerEntry, UserAccount};
use async_trait::async_trait;
use sqlx::{PgExecutor, PgPool, Postgres, Row, Transaction, postgres::PgRow, types::Json};
use std::sync::Arc;

/// Operations available inside a serializable admission transaction.
///
/// `lock_*` methods take a row lock held until commit or rollback.
#[async_trait]
pub trait ContestTx: Send {
    async fn lock_contest(&mut self, contest_id: ContestId) -> StoreResult<Option<Contest>>;

    async fn lock_account(&mut self, user_id: i64) -> StoreResult<Option<UserAccount>>;

    /// Active entries the user holds in the contest
    async fn count_user_entries(&mut self, contest_id: ContestId, user_id: i64)
    -> StoreResult<i64>;

    /// Rooms still filling in which the user holds a pending entry
    async fn count_unfilled_rooms_for_user(
        &mut self,
        contest_id: ContestId,
        user_id: i64,
    ) -> StoreResult<i64>;

    async fn list_rooms(&mut self, contest_id: ContestId) -> StoreResult<Vec<ContestRoom>>;

    async fn lock_room(&mut self, room_id: i64) -> StoreResult<Option<ContestRoom>>;

    /// Active entries in a room, oldest first
    async fn room_entries(&mut self, room_id: i64) -> StoreResult<Vec<Entry>>;

    async fn create_room(
        &mut self,
        contest_id: ContestId,
        room_number: i32,
        capacity: usize,
    ) -> StoreResult<ContestRoom>;

    async fn set_room_status(&mut self, room_id: i64, status: RoomStatus) -> StoreResult<()>;

    async fn insert_entry(&mut self, entry: &NewEntry) -> StoreResult<Entry>;

    async fn lock_entry(&mut self, entry_id: EntryId) -> StoreResult<Option<Entry>>;

    async fn set_entry_status(&mut self, entry_id: EntryId, status: EntryStatus) -> StoreResult<()>;

    async fn set_entry_position(&mut self, entry_id: EntryId, position: u32) -> StoreResult<()>;

    /// Apply a ledger posting and return the new balance, or `None` if a
    /// posting with the same idempotency key already exists
    async fn post_ledger(&mut self, posting: &LedgerPosting) -> StoreResult<Option<i64>>;

    async fn update_contest_entries(
        &mut self,
        contest_id: ContestId,
        current_entries: i64,
        status: ContestStatus,
    ) -> StoreResult<()>;

    async fn insert_contest(&mut self, contest: &NewContest) -> StoreResult<Contest>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;

    async fn rollback(self: Box<Self>) -> StoreResult<()>;
}

/// Contest storage used by admission, matchmaking and the draft scheduler
#[async_trait]
pub trait ContestRepository: Send + Sync {
    /// Open a serializable transaction
    async fn begin(&self) -> StoreResult<Box<dyn ContestTx>>;

    async fn create_contest(&self, contest: &NewContest) -> StoreResult<Contest>;

    async fn get_contest(&self, contest_id: ContestId) -> StoreResult<Option<Contest>>;

    async fn get_room(&self, room_id: i64) -> StoreResult<Option<ContestRoom>>;

    async fn list_rooms(&self, contest_id: ContestId) -> StoreResult<Vec<ContestRoom>>;

    async fn get_entry(&self, entry_id: EntryId) -> StoreResult<Option<Entry>>;

    /// Active entries in a room, oldest first
    async fn room_entries(&self, room_id: i64) -> StoreResult<Vec<Entry>>;

    async fn set_entry_positions(&self, updates: &[(EntryId, u32)]) -> StoreResult<()>;

    /// Move a room from waiting/ready to drafting. Returns false if another
    /// caller already did.
    async fn claim_room_for_draft(&self, room_id: i64) -> StoreResult<bool>;

    /// Move a room's pending entries to drafting
    async fn mark_entries_drafting(&self, room_id: i64) -> StoreResult<u64>;

    async fn set_room_status(&self, room_id: i64, status: RoomStatus) -> StoreResult<()>;

    /// Store the final roster and lineup. Returns false if the lineup
    /// already existed.
    async fn complete_entry(&self, entry_id: EntryId, roster: &Roster) -> StoreResult<bool>;

    /// Credit the one-time completion bonus. Returns false if already paid.
    async fn award_completion_bonus(&self, entry: &Entry, amount: i64) -> StoreResult<bool>;

    /// Recount active entries and store the count on the contest
    async fn resync_contest_entries(&self, contest_id: ContestId) -> StoreResult<i64>;

    /// Rooms that have entries in drafting status
    async fn drafting_rooms(&self) -> StoreResult<Vec<i64>>;

    /// Rooms at capacity whose draft has not been claimed
    async fn full_unlaunched_rooms(&self) -> StoreResult<Vec<i64>>;

    async fn get_balance(&self, user_id: i64) -> StoreResult<Option<i64>>;

    async fn lineup(&self, entry_id: EntryId) -> StoreResult<Option<Lineup>>;

    async fn ledger_entries(&self, user_id: i64) -> StoreResult<Vec<LedgerEntry>>;
}

/// Supplies a room's entries to the draft store's repair path
pub struct RoomParticipants(pub Arc<dyn ContestRepository>);

#[async_trait]
impl ParticipantSource for RoomParticipants {
    async fn participants(&self, room_id: i64) -> StoreResult<Vec<Participant>> {
        let entries = self.0.room_entries(room_id).await?;
        Ok(entries.iter().map(Entry::participant).collect())
    }
}

macro_rules! contest_select {
    () => {
        "SELECT id, name, contest_type, status, entry_fee, max_entries, current_entries, \
         room_capacity, max_entries_per_user, created_at FROM contests WHERE id = $1"
    };
}

macro_rules! room_columns {
    () => {
        "id, contest_id, room_number, capacity, status, created_at, launched_at"
    };
}

macro_rules! entry_columns {
    () => {
        "id, contest_id, room_id, user_id, username, draft_position, fee_paid, status, roster, created_at"
    };
}

fn decode<T>(value: String) -> StoreResult<T>
where
    T: std::str::FromStr<Err = String>,
{
    value
        .parse()
        .map_err(|e: String| StoreError::from(sqlx::Error::Decode(e.into())))
}

fn contest_row(row: &PgRow) -> StoreResult<Contest> {
    Ok(Contest {
        id: row.get("id"),
        name: row.get("name"),
        contest_type: decode(row.get("contest_type"))?,
        status: decode(row.get("status"))?,
        entry_fee: row.get("entry_fee"),
        max_entries: row.get("max_entries"),
        current_entries: row.get("current_entries"),
        room_capacity: row.get::<i32, _>("room_capacity") as usize,
        max_entries_per_user: row.get("max_entries_per_user"),
        created_at: row.get("created_at"),
    })
}

fn room_row(row: &PgRow) -> StoreResult<ContestRoom> {
    Ok(ContestRoom {
        id: row.get("id"),
        contest_id: row.get("contest_id"),
        room_number: row.get("room_number"),
        capacity: row.get::<i32, _>("capacity") as usize,
        status: decode(row.get("status"))?,
        created_at: row.get("created_at"),
        launched_at: row.get("launched_at"),
    })
}

fn entry_row(row: &PgRow) -> StoreResult<Entry> {
    Ok(Entry {
        id: row.get("id"),
        contest_id: row.get("contest_id"),
        room_id: row.get("room_id"),
        user_id: row.get("user_id"),
        username: row.get("username"),
        draft_position: row
            .get::<Option<i32>, _>("draft_position")
            .map(|p| p as u32),
        fee_paid: row.get("fee_paid"),
        status: decode(row.get("status"))?,
        roster: row
            .get::<Option<Json<Roster>>, _>("roster")
            .map(|json| json.0),
        created_at: row.get("created_at"),
    })
}

async fn fetch_contest<'e, E: PgExecutor<'e>>(
    exec: E,
    contest_id: ContestId,
    lock: bool,
) -> StoreResult<Option<Contest>> {
    let sql = if lock {
        concat!(contest_select!(), " FOR UPDATE")
    } else {
        contest_select!()
    };
    let row = sqlx::query(sql)
        .bind(contest_id)
        .fetch_optional(exec)
        .await?;
    row.as_ref().map(contest_row).transpose()
}

async fn fetch_room<'e, E: PgExecutor<'e>>(
    exec: E,
    room_id: i64,
    lock: bool,
) -> StoreResult<Option<ContestRoom>> {
    let sql = if lock {
        concat!("SELECT ", room_columns!(), " FROM contest_rooms WHERE id = $1 FOR UPDATE")
    } else {
        concat!("SELECT ", room_columns!(), " FROM contest_rooms WHERE id = $1")
    };
    let row = sqlx::query(sql).bind(room_id).fetch_optional(exec).await?;
    row.as_ref().map(room_row).transpose()
}

async fn fetch_rooms<'e, E: PgExecutor<'e>>(
    exec: E,
    contest_id: ContestId,
) -> StoreResult<Vec<ContestRoom>> {
    let rows = sqlx::query(concat!(
        "SELECT ",
        room_columns!(),
        " FROM contest_rooms WHERE contest_id = $1 ORDER BY room_number"
    ))
    .bind(contest_id)
    .fetch_all(exec)
    .await?;
    rows.iter().map(room_row).collect()
}

async fn fetch_entry<'e, E: PgExecutor<'e>>(
    exec: E,
    entry_id: EntryId,
    lock: bool,
) -> StoreResult<Option<Entry>> {
    let sql = if lock {
        concat!("SELECT ", entry_columns!(), " FROM contest_entries WHERE id = $1 FOR UPDATE")
    } else {
        concat!("SELECT ", entry_columns!(), " FROM contest_entries WHERE id = $1")
    };
    let row = sqlx::query(sql).bind(entry_id).fetch_optional(exec).await?;
    row.as_ref().map(entry_row).transpose()
}

async fn fetch_room_entries<'e, E: PgExecutor<'e>>(
    exec: E,
    room_id: i64,
) -> StoreResult<Vec<Entry>> {
    let rows = sqlx::query(concat!(
        "SELECT ",
        entry_columns!(),
        " FROM contest_entries WHERE room_id = $1 AND status <> 'cancelled' ORDER BY id"
    ))
    .bind(room_id)
    .fetch_all(exec)
    .await?;
    rows.iter().map(entry_row).collect()
}

async fn insert_contest_row<'e, E: PgExecutor<'e>>(
    exec: E,
    contest: &NewContest,
) -> StoreResult<Contest> {
    let row = sqlx::query(
        r#"
        INSERT INTO contests (name, contest_type, status, entry_fee, max_entries,
                              current_entries, room_capacity, max_entries_per_user)
        VALUES ($1, $2, 'open', $3, $4, 0, $5, $6)
        RETURNING id, name, contest_type, status, entry_fee, max_entries, current_entries,
                  room_capacity, max_entries_per_user, created_at
        "#,
    )
    .bind(&contest.name)
    .bind(contest.contest_type.to_string())
    .bind(contest.entry_fee)
    .bind(contest.max_entries)
    .bind(contest.room_capacity as i32)
    .bind(contest.max_entries_per_user)
    .fetch_one(exec)
    .await?;
    contest_row(&row)
}

/// Apply a ledger posting on an open transaction
async fn post_ledger_tx(
    tx: &mut Transaction<'static, Postgres>,
    posting: &LedgerPosting,
) -> StoreResult<Option<i64>> {
    let existing = sqlx::query("SELECT id FROM wallet_entries WHERE idempotency_key = $1")
        .bind(&posting.idempotency_key)
        .fetch_optional(&mut **tx)
        .await?;
    if existing.is_some() {
        return Ok(None);
    }

    let balance_row = sqlx::query(
        "UPDATE wallets
         SET balance = balance + $1, updated_at = NOW()
         WHERE user_id = $2 AND balance + $1 >= 0
         RETURNING balance",
    )
    .bind(posting.amount)
    .bind(posting.user_id)
    .fetch_optional(&mut **tx)
    .await?
    .ok_or(StoreError::Database(sqlx::Error::RowNotFound))?;
    let balance_after: i64 = balance_row.get("balance");

    sqlx::query(
        r#"
        INSERT INTO wallet_entries
            (user_id, contest_id, amount, balance_after, direction, entry_type,
             idempotency_key, description)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(posting.user_id)
    .bind(posting.contest_id)
    .bind(posting.amount)
    .bind(balance_after)
    .bind(posting.entry_type.direction().to_string())
    .bind(posting.entry_type.to_string())
    .bind(&posting.idempotency_key)
    .bind(&posting.description)
    .execute(&mut **tx)
    .await?;

    Ok(Some(balance_after))
}

/// Serializable PostgreSQL transaction
pub struct PgContestTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl ContestTx for PgContestTx {
    async fn lock_contest(&mut self, contest_id: ContestId) -> StoreResult<Option<Contest>> {
        fetch_contest(&mut *self.tx, contest_id, true).await
    }

    async fn lock_account(&mut self, user_id: i64) -> StoreResult<Option<UserAccount>> {
        let row = sqlx::query("SELECT user_id, balance FROM wallets WHERE user_id = $1 FOR UPDATE")
            .bind(user_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row.map(|r| UserAccount {
            user_id: r.get("user_id"),
            balance: r.get("balance"),
        }))
    }

    async fn count_user_entries(
        &mut self,
        contest_id: ContestId,
        user_id: i64,
    ) -> StoreResult<i64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM contest_entries
             WHERE contest_id = $1 AND user_id = $2 AND status <> 'cancelled'",
        )
        .bind(contest_id)
        .bind(user_id)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(row.get("n"))
    }

    async fn count_unfilled_rooms_for_user(
        &mut self,
        contest_id: ContestId,
        user_id: i64,
    ) -> StoreResult<i64> {
        let row = sqlx::query(
            "SELECT COUNT(DISTINCT e.room_id) AS n
             FROM contest_entries e
             JOIN contest_rooms r ON r.id = e.room_id
             WHERE e.contest_id = $1 AND e.user_id = $2
               AND e.status = 'pending' AND r.status = 'waiting'",
        )
        .bind(contest_id)
        .bind(user_id)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(row.get("n"))
    }

    async fn list_rooms(&mut self, contest_id: ContestId) -> StoreResult<Vec<ContestRoom>> {
        fetch_rooms(&mut *self.tx, contest_id).await
    }

    async fn lock_room(&mut self, room_id: i64) -> StoreResult<Option<ContestRoom>> {
        fetch_room(&mut *self.tx, room_id, true).await
    }

    async fn room_entries(&mut self, room_id: i64) -> StoreResult<Vec<Entry>> {
        fetch_room_entries(&mut *self.tx, room_id).await
    }

    async fn create_room(
        &mut self,
        contest_id: ContestId,
        room_number: i32,
        capacity: usize,
    ) -> StoreResult<ContestRoom> {
        let row = sqlx::query(concat!(
            "INSERT INTO contest_rooms (contest_id, room_number, capacity, status) \
             VALUES ($1, $2, $3, 'waiting') RETURNING ",
            room_columns!()
        ))
        .bind(contest_id)
        .bind(room_number)
        .bind(capacity as i32)
        .fetch_one(&mut *self.tx)
        .await?;
        room_row(&row)
    }

    async fn set_room_status(&mut self, room_id: i64, status: RoomStatus) -> StoreResult<()> {
        sqlx::query("UPDATE contest_rooms SET status = $1 WHERE id = $2")
            .bind(status.to_string())
            .bind(room_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn insert_entry(&mut self, entry: &NewEntry) -> StoreResult<Entry> {
        let row = sqlx::query(concat!(
            "INSERT INTO contest_entries \
             (contest_id, room_id, user_id, username, draft_position, fee_paid, status) \
             VALUES ($1, $2, $3, $4, $5, $6, 'pending') RETURNING ",
            entry_columns!()
        ))
        .bind(entry.contest_id)
        .bind(entry.room_id)
        .bind(entry.user_id)
        .bind(&entry.username)
        .bind(entry.draft_position as i32)
        .bind(entry.fee_paid)
        .fetch_one(&mut *self.tx)
        .await?;
        entry_row(&row)
    }

    async fn lock_entry(&mut self, entry_id: EntryId) -> StoreResult<Option<Entry>> {
        fetch_entry(&mut *self.tx, entry_id, true).await
    }

    async fn set_entry_status(&mut self, entry_id: EntryId, status: EntryStatus) -> StoreResult<()> {
        sqlx::query("UPDATE contest_entries SET status = $1 WHERE id = $2")
            .bind(status.to_string())
            .bind(entry_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn set_entry_position(&mut self, entry_id: EntryId, position: u32) -> StoreResult<()> {
        sqlx::query("UPDATE contest_entries SET draft_position = $1 WHERE id = $2")
            .bind(position as i32)
            .bind(entry_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn post_ledger(&mut self, posting: &LedgerPosting) -> StoreResult<Option<i64>> {
        post_ledger_tx(&mut self.tx, posting).await
    }

    async fn update_contest_entries(
        &mut self,
        contest_id: ContestId,
        current_entries: i64,
        status: ContestStatus,
    ) -> StoreResult<()> {
        sqlx::query("UPDATE contests SET current_entries = $1, status = $2 WHERE id = $3")
            .bind(current_entries)
            .bind(status.to_string())
            .bind(contest_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn insert_contest(&mut self, contest: &NewContest) -> StoreResult<Contest> {
        insert_contest_row(&mut *self.tx, contest).await
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

/// PostgreSQL contest repository
#[derive(Clone)]
pub struct PgContestRepository {
    pool: Arc<PgPool>,
}

impl PgContestRepository {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ContestRepository for PgContestRepository {
    async fn begin(&self) -> StoreResult<Box<dyn ContestTx>> {
        let mut tx = with_default_timeout(self.pool.begin()).await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await?;
        Ok(Box::new(PgContestTx { tx }))
    }

    async fn create_contest(&self, contest: &NewContest) -> StoreResult<Contest> {
        with_default_timeout(insert_contest_row(self.pool.as_ref(), contest)).await
    }

    async fn get_contest(&self, contest_id: ContestId) -> StoreResult<Option<Contest>> {
        with_default_timeout(fetch_contest(self.pool.as_ref(), contest_id, false)).await
    }

    async fn get_room(&self, room_id: i64) -> StoreResult<Option<ContestRoom>> {
        with_default_timeout(fetch_room(self.pool.as_ref(), room_id, false)).await
    }

    async fn list_rooms(&self, contest_id: ContestId) -> StoreResult<Vec<ContestRoom>> {
        with_default_timeout(fetch_rooms(self.pool.as_ref(), contest_id)).await
    }

    async fn get_entry(&self, entry_id: EntryId) -> StoreResult<Option<Entry>> {
        with_default_timeout(fetch_entry(self.pool.as_ref(), entry_id, false)).await
    }

    async fn room_entries(&self, room_id: i64) -> StoreResult<Vec<Entry>> {
        with_default_timeout(fetch_room_entries(self.pool.as_ref(), room_id)).await
    }

    async fn set_entry_positions(&self, updates: &[(EntryId, u32)]) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        for (entry_id, position) in updates {
            sqlx::query("UPDATE contest_entries SET draft_position = $1 WHERE id = $2")
                .bind(*position as i32)
                .bind(*entry_id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn claim_room_for_draft(&self, room_id: i64) -> StoreResult<bool> {
        let result = with_default_timeout(
            sqlx::query(
                "UPDATE contest_rooms SET status = 'drafting', launched_at = NOW()
                 WHERE id = $1 AND status IN ('waiting', 'ready')",
            )
            .bind(room_id)
            .execute(self.pool.as_ref()),
        )
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn mark_entries_drafting(&self, room_id: i64) -> StoreResult<u64> {
        let result = with_default_timeout(
            sqlx::query(
                "UPDATE contest_entries SET status = 'drafting'
                 WHERE room_id = $1 AND status = 'pending'",
            )
            .bind(room_id)
            .execute(self.pool.as_ref()),
        )
        .await?;
        Ok(result.rows_affected())
    }

    async fn set_room_status(&self, room_id: i64, status: RoomStatus) -> StoreResult<()> {
        with_default_timeout(
            sqlx::query("UPDATE contest_rooms SET status = $1 WHERE id = $2")
                .bind(status.to_string())
                .bind(room_id)
                .execute(self.pool.as_ref()),
        )
        .await?;
        Ok(())
    }

    async fn complete_entry(&self, entry_id: EntryId, roster: &Roster) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await?;

        let entry = fetch_entry(&mut *tx, entry_id, true)
            .await?
            .ok_or(StoreError::Database(sqlx::Error::RowNotFound))?;

        sqlx::query("UPDATE contest_entries SET status = 'completed', roster = $1 WHERE id = $2")
            .bind(Json(roster))
            .bind(entry_id)
            .execute(&mut *tx)
            .await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO lineups (entry_id, contest_id, room_id, user_id, roster, total_spent)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (entry_id) DO NOTHING
            "#,
        )
        .bind(entry.id)
        .bind(entry.contest_id)
        .bind(entry.room_id)
        .bind(entry.user_id)
        .bind(Json(roster))
        .bind(roster.total_spent())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(inserted.rows_affected() == 1)
    }

    async fn award_completion_bonus(&self, entry: &Entry, amount: i64) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await?;
        let posted = post_ledger_tx(
            &mut tx,
            &LedgerPosting {
                user_id: entry.user_id,
                contest_id: Some(entry.contest_id),
                amount,
                entry_type: EntryType::CompletionBonus,
                idempotency_key: EntryType::CompletionBonus.idempotency_key(entry.id),
                description: Some(format!("Draft completed in room {}", entry.room_id)),
            },
        )
        .await?;
        tx.commit().await?;
        Ok(posted.is_some())
    }

    async fn resync_contest_entries(&self, contest_id: ContestId) -> StoreResult<i64> {
        let row = with_default_timeout(
            sqlx::query(
                "UPDATE contests SET current_entries = (
                     SELECT COUNT(*) FROM contest_entries
                     WHERE contest_id = $1 AND status <> 'cancelled'
                 )
                 WHERE id = $1
                 RETURNING current_entries",
            )
            .bind(contest_id)
            .fetch_optional(self.pool.as_ref()),
        )
        .await?;
        Ok(row.map(|r| r.get("current_entries")).unwrap_or(0))
    }

    async fn drafting_rooms(&self) -> StoreResult<Vec<i64>> {
        let rows = with_default_timeout(
            sqlx::query(
                "SELECT DISTINCT room_id FROM contest_entries
                 WHERE status = 'drafting' ORDER BY room_id",
            )
            .fetch_all(self.pool.as_ref()),
        )
        .await?;
        Ok(rows.iter().map(|r| r.get("room_id")).collect())
    }

    async fn full_unlaunched_rooms(&self) -> StoreResult<Vec<i64>> {
        let rows = with_default_timeout(
            sqlx::query(
                "SELECT r.id
                 FROM contest_rooms r
                 JOIN contest_entries e ON e.room_id = r.id AND e.status <> 'cancelled'
                 WHERE r.status IN ('waiting', 'ready')
                 GROUP BY r.id, r.capacity
                 HAVING COUNT(*) >= r.capacity
                 ORDER BY r.id",
            )
            .fetch_all(self.pool.as_ref()),
        )
        .await?;
        Ok(rows.iter().map(|r| r.get("id")).collect())
    }

    async fn get_balance(&self, user_id: i64) -> StoreResult<Option<i64>> {
        let row = with_default_timeout(
            sqlx::query("SELECT balance FROM wallets WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(self.pool.as_ref()),
        )
        .await?;
        Ok(row.map(|r| r.get("balance")))
    }

    async fn lineup(&self, entry_id: EntryId) -> StoreResult<Option<Lineup>> {
        let row = with_default_timeout(
            sqlx::query(
                "SELECT entry_id, contest_id, room_id, user_id, roster, total_spent, created_at
                 FROM lineups WHERE entry_id = $1",
            )
            .bind(entry_id)
            .fetch_optional(self.pool.as_ref()),
        )
        .await?;
        Ok(row.map(|r| Lineup {
            entry_id: r.get("entry_id"),
            contest_id: r.get("contest_id"),
            room_id: r.get("room_id"),
            user_id: r.get("user_id"),
            roster: r.get::<Json<Roster>, _>("roster").0,
            total_spent: r.get("total_spent"),
            created_at: r.get("created_at"),
        }))
    }

    async fn ledger_entries(&self, user_id: i64) -> StoreResult<Vec<LedgerEntry>> {
        let rows = with_default_timeout(
            sqlx::query(
                r#"
                SELECT id, user_id, contest_id, amount, balance_after, direction, entry_type,
                       idempotency_key, description, created_at
                FROM wallet_entries
                WHERE user_id = $1
                ORDER BY id
                "#,
            )
            .bind(user_id)
            .fetch_all(self.pool.as_ref()),
        )
        .await?;

        rows.iter()
            .map(|row| {
                let entry_type: EntryType = decode(row.get("entry_type"))?;
                Ok(LedgerEntry {
                    id: row.get("id"),
                    user_id: row.get("user_id"),
                    contest_id: row.get("contest_id"),
                    amount: row.get("amount"),
                    balance_after: row.get("balance_after"),
                    direction: entry_type.direction(),
                    entry_type,
                    idempotency_key: row.get("idempotency_key"),
                    description: row.get("description"),
                    created_at: row.get("created_at"),
                })
            })
            .collect()
    }
}
