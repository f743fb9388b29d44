//! Contest entry admission and withdrawal.

use super::config::AdmissionConfig;
use super::errors::{ContestError, ContestResult};
use super::matchmaker::RoomMatchmaker;
use super::models::{
    Admission, Contest, ContestStatus, ContestType, EntryStatus, LedgerPosting, NewContest,
    NewEntry, RoomStatus, Withdrawal,
};
use super::repository::{ContestRepository, ContestTx};
use crate::db::{
    LockManager, LockToken, StoreError, lock::admission_key, timeouts::DEFAULT_TRANSACTION_TIMEOUT,
};
use crate::draft::events::{DraftEvent, EventSink};
use crate::wallet::EntryType;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::time::timeout;

/// Notified after commit when an admission fills a room
#[async_trait]
pub trait RoomLauncher: Send + Sync {
    async fn room_filled(&self, room_id: i64);
}

/// Concurrency-safe contest entry
pub struct AdmissionController {
    repo: Arc<dyn ContestRepository>,
    locks: Arc<dyn LockManager>,
    events: Arc<dyn EventSink>,
    launcher: Option<Arc<dyn RoomLauncher>>,
    matchmaker: RoomMatchmaker,
    config: AdmissionConfig,
}

impl AdmissionController {
    pub fn new(
        repo: Arc<dyn ContestRepository>,
        locks: Arc<dyn LockManager>,
        events: Arc<dyn EventSink>,
        config: AdmissionConfig,
    ) -> Self {
        Self {
            repo,
            locks,
            events,
            launcher: None,
            matchmaker: RoomMatchmaker::new(config.matchmaker_retries),
            config,
        }
    }

    /// Launch rooms through `launcher` once they fill
    pub fn with_launcher(mut self, launcher: Arc<dyn RoomLauncher>) -> Self {
        self.launcher = Some(launcher);
        self
    }

    /// Enter `user_id` into a contest.
    ///
    /// # Errors
    ///
    /// `LockBusy` and retryable storage errors may be retried; everything
    /// else is terminal and leaves no trace.
    pub async fn enter(
        &self,
        contest_id: i64,
        user_id: i64,
        username: &str,
    ) -> ContestResult<Admission> {
        let lock = self.acquire(contest_id, user_id).await?;

        let result = within_deadline(async {
            let mut tx = self.repo.begin().await?;
            let result = self.admit(tx.as_mut(), contest_id, user_id, username).await;
            finish(tx, result).await
        })
        .await;

        self.release(&lock).await;

        let admission = result?;
        log::info!(
            "User {} entered contest {} (entry {}, room {}, position {})",
            user_id,
            contest_id,
            admission.entry_id,
            admission.room_id,
            admission.draft_position
        );

        self.announce(&admission, user_id, username).await;

        if admission.room_full
            && let Some(launcher) = &self.launcher
        {
            launcher.room_filled(admission.room_id).await;
        }

        Ok(admission)
    }

    /// Withdraw a pending entry before its room's draft starts, refunding the fee
    pub async fn withdraw(&self, entry_id: i64, user_id: i64) -> ContestResult<Withdrawal> {
        let entry = self
            .repo
            .get_entry(entry_id)
            .await?
            .filter(|e| e.user_id == user_id)
            .ok_or(ContestError::EntryNotFound(entry_id))?;

        let lock = self.acquire(entry.contest_id, user_id).await?;
        let result = within_deadline(async {
            let mut tx = self.repo.begin().await?;
            let result = self.cancel(tx.as_mut(), entry_id, user_id).await;
            finish(tx, result).await
        })
        .await;
        self.release(&lock).await;

        let withdrawal = result?;
        log::info!(
            "User {} withdrew entry {} from contest {} (refunded {})",
            user_id,
            entry_id,
            entry.contest_id,
            withdrawal.refunded
        );
        Ok(withdrawal)
    }

    async fn acquire(&self, contest_id: i64, user_id: i64) -> ContestResult<LockToken> {
        self.locks
            .try_acquire(&admission_key(contest_id, user_id), self.config.lock_ttl())
            .await?
            .ok_or(ContestError::LockBusy)
    }

    async fn release(&self, lock: &LockToken) {
        if let Err(e) = self.locks.release(lock).await {
            log::error!("Failed to release admission lock {}: {}", lock.key, e);
        }
    }

    async fn admit(
        &self,
        tx: &mut dyn ContestTx,
        contest_id: i64,
        user_id: i64,
        username: &str,
    ) -> ContestResult<Admission> {
        let contest = tx
            .lock_contest(contest_id)
            .await?
            .ok_or(ContestError::NotFound(contest_id))?;
        self.check_capacity(tx, &contest, user_id).await?;

        let account = tx
            .lock_account(user_id)
            .await?
            .ok_or(ContestError::AccountNotFound(user_id))?;
        if account.balance < contest.entry_fee {
            return Err(ContestError::InsufficientBalance {
                balance: account.balance,
                fee: contest.entry_fee,
            });
        }

        let assignment = self.matchmaker.assign(tx, &contest, user_id).await?;

        let entry = tx
            .insert_entry(&NewEntry {
                contest_id,
                room_id: assignment.room_id,
                user_id,
                username: username.to_string(),
                draft_position: assignment.draft_position,
                fee_paid: contest.entry_fee,
            })
            .await?;

        let new_balance = if contest.entry_fee > 0 {
            tx.post_ledger(&LedgerPosting {
                user_id,
                contest_id: Some(contest_id),
                amount: -contest.entry_fee,
                entry_type: EntryType::EntryFee,
                idempotency_key: EntryType::EntryFee.idempotency_key(entry.id),
                description: Some(format!("Entry fee for contest {contest_id}")),
            })
            .await?
            .unwrap_or(account.balance)
        } else {
            account.balance
        };

        let current_entries = contest.current_entries + 1;
        let status = if current_entries >= contest.max_entries {
            ContestStatus::Closed
        } else {
            ContestStatus::Open
        };
        tx.update_contest_entries(contest_id, current_entries, status)
            .await?;

        if status == ContestStatus::Closed && contest.contest_type == ContestType::SingleRoom {
            let replacement = tx
                .insert_contest(&NewContest::replacement_for(&contest))
                .await?;
            log::info!(
                "Contest {} filled, provisioned replacement {}",
                contest_id,
                replacement.id
            );
        }

        if assignment.is_full() {
            tx.set_room_status(assignment.room_id, RoomStatus::Ready)
                .await?;
        }

        Ok(Admission {
            entry_id: entry.id,
            contest_id,
            room_id: assignment.room_id,
            draft_position: assignment.draft_position,
            new_balance,
            room_full: assignment.is_full(),
        })
    }

    /// Status, per-user and unfilled-room checks under the contest row lock
    async fn check_capacity(
        &self,
        tx: &mut dyn ContestTx,
        contest: &Contest,
        user_id: i64,
    ) -> ContestResult<()> {
        if contest.status != ContestStatus::Open {
            return Err(ContestError::NotOpen(contest.id));
        }
        if contest.is_full() {
            return Err(ContestError::Full(contest.id));
        }

        let held = tx.count_user_entries(contest.id, user_id).await?;
        if held >= contest.max_entries_per_user {
            return Err(if contest.max_entries_per_user <= 1 {
                ContestError::AlreadyEntered(contest.id)
            } else {
                ContestError::EntryLimitReached {
                    contest_id: contest.id,
                    limit: contest.max_entries_per_user,
                }
            });
        }

        let unfilled = tx.count_unfilled_rooms_for_user(contest.id, user_id).await?;
        if unfilled >= self.config.max_unfilled_rooms {
            return Err(ContestError::TooManyUnfilledRooms(unfilled));
        }

        Ok(())
    }

    async fn cancel(
        &self,
        tx: &mut dyn ContestTx,
        entry_id: i64,
        user_id: i64,
    ) -> ContestResult<Withdrawal> {
        let entry = tx
            .lock_entry(entry_id)
            .await?
            .filter(|e| e.user_id == user_id)
            .ok_or(ContestError::EntryNotFound(entry_id))?;
        if entry.status != EntryStatus::Pending {
            return Err(ContestError::NotWithdrawable(entry_id));
        }

        let room = tx
            .lock_room(entry.room_id)
            .await?
            .filter(|r| r.status.is_pre_draft())
            .ok_or(ContestError::NotWithdrawable(entry_id))?;
        let contest = tx
            .lock_contest(entry.contest_id)
            .await?
            .ok_or(ContestError::NotFound(entry.contest_id))?;

        tx.set_entry_status(entry_id, EntryStatus::Cancelled).await?;

        let refund = tx
            .post_ledger(&LedgerPosting {
                user_id,
                contest_id: Some(entry.contest_id),
                amount: entry.fee_paid,
                entry_type: EntryType::Refund,
                idempotency_key: EntryType::Refund.idempotency_key(entry_id),
                description: Some(format!("Withdrawal from contest {}", entry.contest_id)),
            })
            .await?;
        let new_balance = match refund {
            Some(balance) => balance,
            None => tx
                .lock_account(user_id)
                .await?
                .map(|a| a.balance)
                .ok_or(ContestError::AccountNotFound(user_id))?,
        };

        let status = match contest.status {
            ContestStatus::Closed => ContestStatus::Open,
            other => other,
        };
        tx.update_contest_entries(contest.id, (contest.current_entries - 1).max(0), status)
            .await?;

        if room.status == RoomStatus::Ready {
            tx.set_room_status(room.id, RoomStatus::Waiting).await?;
        }

        Ok(Withdrawal {
            entry_id,
            refunded: if refund.is_some() { entry.fee_paid } else { 0 },
            new_balance,
        })
    }

    async fn announce(&self, admission: &Admission, user_id: i64, username: &str) {
        let (entries, capacity) = match self.repo.room_entries(admission.room_id).await {
            Ok(entries) => {
                let capacity = self
                    .repo
                    .get_room(admission.room_id)
                    .await
                    .ok()
                    .flatten()
                    .map(|r| r.capacity)
                    .unwrap_or(entries.len());
                (entries.len(), capacity)
            }
            Err(e) => {
                log::warn!("Could not count room {}: {}", admission.room_id, e);
                return;
            }
        };

        self.events
            .publish_room(
                admission.room_id,
                DraftEvent::RoomJoined {
                    room_id: admission.room_id,
                    contest_id: admission.contest_id,
                    user_id,
                    username: username.to_string(),
                    draft_position: admission.draft_position,
                    entries,
                    capacity,
                },
            )
            .await;
    }
}

/// Commit on success, roll back on failure
async fn finish<T>(tx: Box<dyn ContestTx>, result: ContestResult<T>) -> ContestResult<T> {
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback_err) = tx.rollback().await {
                log::error!("Rollback failed: {}", rollback_err);
            }
            Err(e)
        }
    }
}

/// Bound a whole admission transaction by the transaction timeout
async fn within_deadline<T, F>(work: F) -> ContestResult<T>
where
    F: std::future::Future<Output = ContestResult<T>>,
{
    match timeout(DEFAULT_TRANSACTION_TIMEOUT, work).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout(DEFAULT_TRANSACTION_TIMEOUT).into()),
    }
}
