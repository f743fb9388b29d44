//! Engine facade wiring admission, scheduling and storage together.

use crate::contest::{
    Admission, AdmissionConfig, AdmissionController, ContestError, ContestRepository,
    ContestResult, ContestRoom, Entry, MemoryContestRepository, PgContestRepository,
    RoomParticipants, Withdrawal, matchmaker::repaired_room_entries,
};
use crate::db::{Database, LockManager, MemoryLockManager, PgLockManager};
use crate::draft::{
    BoardGenerator, DraftConfig, DraftInstance, DraftPhase, DraftResult, DraftScheduler,
    DraftStateBackend, DraftStore, EventSink, FinalizeSummary, MemoryDraftBackend, Pick,
    PgDraftBackend, RoomId, RosterSlot, StallSweeper, SweepReport, TurnMeta,
};
use serde::Serialize;
use std::sync::Arc;
use tokio::{sync::watch, task::JoinHandle};

/// Engine-wide settings
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub draft: DraftConfig,
    pub admission: AdmissionConfig,
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self {
            draft: DraftConfig::from_env(),
            admission: AdmissionConfig::from_env(),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        self.draft.validate().map_err(|e| e.to_string())?;
        self.admission.validate()
    }
}

/// Everything known about a room, for status queries
#[derive(Debug, Clone, Serialize)]
pub struct RoomStatusSnapshot {
    pub room: ContestRoom,
    pub entries: Vec<Entry>,
    pub draft: Option<DraftInstance>,
    pub turn: Option<TurnMeta>,
    pub phase: Option<DraftPhase>,
}

/// The snake draft engine
#[derive(Clone)]
pub struct DraftEngine {
    repo: Arc<dyn ContestRepository>,
    admission: Arc<AdmissionController>,
    scheduler: DraftScheduler,
}

impl DraftEngine {
    /// Assemble an engine from its storage and collaborators
    pub fn new(
        repo: Arc<dyn ContestRepository>,
        backend: Arc<dyn DraftStateBackend>,
        locks: Arc<dyn LockManager>,
        events: Arc<dyn EventSink>,
        generator: Arc<dyn BoardGenerator>,
        config: EngineConfig,
    ) -> Self {
        let store = DraftStore::new(backend, &config.draft)
            .with_participant_source(Arc::new(RoomParticipants(repo.clone())));
        let scheduler = DraftScheduler::new(
            repo.clone(),
            store,
            events.clone(),
            generator,
            locks.clone(),
            config.draft,
        );
        let admission = AdmissionController::new(repo.clone(), locks, events, config.admission)
            .with_launcher(Arc::new(scheduler.clone()));

        Self {
            repo,
            admission: Arc::new(admission),
            scheduler,
        }
    }

    /// Engine over PostgreSQL
    pub fn postgres(
        db: &Database,
        events: Arc<dyn EventSink>,
        generator: Arc<dyn BoardGenerator>,
        config: EngineConfig,
    ) -> Self {
        let pool = Arc::new(db.pool().clone());
        Self::new(
            Arc::new(PgContestRepository::new(pool.clone())),
            Arc::new(PgDraftBackend::new(pool.clone())),
            Arc::new(PgLockManager::new(pool)),
            events,
            generator,
            config,
        )
    }

    /// Engine over in-memory storage
    pub fn in_memory(
        repo: MemoryContestRepository,
        events: Arc<dyn EventSink>,
        generator: Arc<dyn BoardGenerator>,
        config: EngineConfig,
    ) -> Self {
        Self::new(
            Arc::new(repo),
            Arc::new(MemoryDraftBackend::new()),
            Arc::new(MemoryLockManager::new()),
            events,
            generator,
            config,
        )
    }

    pub fn scheduler(&self) -> &DraftScheduler {
        &self.scheduler
    }

    pub fn repository(&self) -> &Arc<dyn ContestRepository> {
        &self.repo
    }

    /// Enter a user into a contest
    pub async fn enter(
        &self,
        contest_id: i64,
        user_id: i64,
        username: &str,
    ) -> ContestResult<Admission> {
        self.admission.enter(contest_id, user_id, username).await
    }

    /// Withdraw a pending entry and refund its fee
    pub async fn withdraw(&self, entry_id: i64, user_id: i64) -> ContestResult<Withdrawal> {
        self.admission.withdraw(entry_id, user_id).await
    }

    /// Current room, entry and draft state. Repairs draft positions and
    /// damaged draft documents on the way.
    pub async fn room_status(&self, room_id: RoomId) -> ContestResult<RoomStatusSnapshot> {
        let room = self
            .repo
            .get_room(room_id)
            .await?
            .ok_or(ContestError::RoomNotFound(room_id))?;
        let entries = repaired_room_entries(self.repo.as_ref(), room_id, room.capacity).await?;

        let store = self.scheduler.store();
        let draft = store.get(room_id).await.unwrap_or_else(|e| {
            log::warn!("Room {}: draft state unreadable: {}", room_id, e);
            None
        });
        let turn = store.get_turn(room_id).await.ok().flatten();
        let phase = self.scheduler.phase(room_id).await;

        Ok(RoomStatusSnapshot {
            room,
            entries,
            draft,
            turn,
            phase,
        })
    }

    pub async fn handle_pick(
        &self,
        room_id: RoomId,
        user_id: i64,
        player_id: &str,
        slot: RosterSlot,
    ) -> DraftResult<Pick> {
        self.scheduler
            .handle_pick(room_id, user_id, player_id, slot)
            .await
    }

    pub async fn handle_auto_pick(&self, room_id: RoomId, user_id: i64) -> DraftResult<Pick> {
        self.scheduler.handle_auto_pick(room_id, user_id).await
    }

    pub async fn preselect(
        &self,
        room_id: RoomId,
        user_id: i64,
        player_id: &str,
        slot: Option<RosterSlot>,
    ) -> DraftResult<()> {
        self.scheduler
            .preselect(room_id, user_id, player_id, slot)
            .await
    }

    pub async fn launch(&self, room_id: RoomId) -> DraftResult<()> {
        self.scheduler.launch(room_id).await
    }

    pub async fn finalize(&self, room_id: RoomId) -> DraftResult<FinalizeSummary> {
        self.scheduler.finalize(room_id).await
    }

    /// One stall sweep pass
    pub async fn sweep_once(&self) -> SweepReport {
        self.sweeper().sweep_once().await
    }

    /// Run the stall sweep in the background until `shutdown` is set
    pub fn spawn_stall_sweep(&self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.sweeper().run(shutdown))
    }

    fn sweeper(&self) -> StallSweeper {
        StallSweeper::new(self.scheduler.clone(), self.repo.clone())
    }

    /// Stop all room actors, leaving drafts recoverable
    pub async fn shutdown(&self) {
        self.scheduler.shutdown().await;
    }
}
