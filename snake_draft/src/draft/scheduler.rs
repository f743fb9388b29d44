//! Draft scheduler: launches rooms, routes picks to room actors and
//! recovers rooms whose actor or timer was lost.

use super::{
    actor::{ActorContext, DraftActor, DraftHandle},
    board::BoardGenerator,
    config::DraftConfig,
    errors::{DraftError, DraftResult},
    events::EventSink,
    finalize::{DraftFinalizer, FinalizeSummary},
    messages::{DraftMessage, DraftPhase},
    models::{DraftInstance, DraftStatus, Participant, Pick, RoomId, RosterSlot},
    store::DraftStore,
    timer::TurnTimers,
};
use crate::contest::{
    ContestError, ContestRepository, RoomLauncher, RoomStatus, matchmaker::repaired_room_entries,
};
use crate::db::{LockManager, lock::pick_key};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::{collections::HashMap, sync::Arc};

#[derive(Clone)]
enum Slot {
    /// Launch or recovery in progress, no actor yet
    Launching,
    Running(DraftHandle),
}

/// Live room actors, keyed by room
#[derive(Clone, Default)]
pub struct DraftRegistry {
    slots: Arc<Mutex<HashMap<RoomId, Slot>>>,
}

impl DraftRegistry {
    /// Claim the room for launch or recovery. Fails while another launch is
    /// in progress or a live actor owns the room.
    pub fn try_reserve(&self, room_id: RoomId) -> bool {
        let mut slots = self.slots.lock();
        let busy = match slots.get(&room_id) {
            Some(Slot::Launching) => true,
            Some(Slot::Running(handle)) => !handle.is_closed(),
            None => false,
        };
        if busy {
            return false;
        }
        slots.insert(room_id, Slot::Launching);
        true
    }

    pub fn install(&self, room_id: RoomId, handle: DraftHandle) {
        self.slots.lock().insert(room_id, Slot::Running(handle));
    }

    /// Drop a reservation whose launch failed
    pub fn abandon(&self, room_id: RoomId) {
        let mut slots = self.slots.lock();
        if matches!(slots.get(&room_id), Some(Slot::Launching)) {
            slots.remove(&room_id);
        }
    }

    /// Remove the room if `handle` is still the installed actor
    pub fn release(&self, room_id: RoomId, handle: &DraftHandle) -> bool {
        let mut slots = self.slots.lock();
        match slots.get(&room_id) {
            Some(Slot::Running(current)) if current.same_actor(handle) => {
                slots.remove(&room_id);
                true
            }
            _ => false,
        }
    }

    /// Handle of the room's live actor
    pub fn handle(&self, room_id: RoomId) -> Option<DraftHandle> {
        match self.slots.lock().get(&room_id) {
            Some(Slot::Running(handle)) if !handle.is_closed() => Some(handle.clone()),
            _ => None,
        }
    }

    pub fn is_launching(&self, room_id: RoomId) -> bool {
        matches!(self.slots.lock().get(&room_id), Some(Slot::Launching))
    }

    pub fn contains(&self, room_id: RoomId) -> bool {
        self.is_launching(room_id) || self.handle(room_id).is_some()
    }

    pub fn rooms(&self) -> Vec<RoomId> {
        let mut rooms: Vec<RoomId> = self.slots.lock().keys().copied().collect();
        rooms.sort_unstable();
        rooms
    }

    fn handles(&self) -> Vec<DraftHandle> {
        self.slots
            .lock()
            .values()
            .filter_map(|slot| match slot {
                Slot::Running(handle) => Some(handle.clone()),
                Slot::Launching => None,
            })
            .collect()
    }
}

struct SchedulerInner {
    repo: Arc<dyn ContestRepository>,
    store: DraftStore,
    events: Arc<dyn EventSink>,
    generator: Arc<dyn BoardGenerator>,
    locks: Arc<dyn LockManager>,
    timers: TurnTimers,
    registry: DraftRegistry,
    finalizer: DraftFinalizer,
    config: Arc<DraftConfig>,
}

/// Entry point for everything that happens to a room once it is full
#[derive(Clone)]
pub struct DraftScheduler {
    inner: Arc<SchedulerInner>,
}

impl DraftScheduler {
    /// Create a new scheduler
    ///
    /// # Arguments
    ///
    /// * `repo` - Contest, room and entry storage
    /// * `store` - Draft document storage
    /// * `events` - Event fan-out
    /// * `generator` - Board source for launched rooms
    /// * `locks` - Lock service for the pick-in-flight token
    /// * `config` - Draft timing and budget settings
    pub fn new(
        repo: Arc<dyn ContestRepository>,
        store: DraftStore,
        events: Arc<dyn EventSink>,
        generator: Arc<dyn BoardGenerator>,
        locks: Arc<dyn LockManager>,
        config: DraftConfig,
    ) -> Self {
        let timers = TurnTimers::new();
        let finalizer = DraftFinalizer::new(
            repo.clone(),
            store.clone(),
            events.clone(),
            timers.clone(),
            &config,
        );

        Self {
            inner: Arc::new(SchedulerInner {
                repo,
                store,
                events,
                generator,
                locks,
                timers,
                registry: DraftRegistry::default(),
                finalizer,
                config: Arc::new(config),
            }),
        }
    }

    pub fn config(&self) -> &DraftConfig {
        &self.inner.config
    }

    pub fn timers(&self) -> &TurnTimers {
        &self.inner.timers
    }

    pub fn registry(&self) -> &DraftRegistry {
        &self.inner.registry
    }

    pub fn store(&self) -> &DraftStore {
        &self.inner.store
    }

    /// Rooms with a live or launching actor
    pub fn active_rooms(&self) -> Vec<RoomId> {
        self.inner.registry.rooms()
    }

    fn context(&self) -> ActorContext {
        ActorContext {
            store: self.inner.store.clone(),
            events: self.inner.events.clone(),
            timers: self.inner.timers.clone(),
            finalizer: self.inner.finalizer.clone(),
            config: self.inner.config.clone(),
        }
    }

    /// Launch a full room's draft.
    ///
    /// Builds the board and teams, persists the draft, marks entries as
    /// drafting and starts the room actor's launch countdown.
    ///
    /// # Errors
    ///
    /// * `AlreadyLaunched` - Another launch won, or the room left pre-draft
    /// * `NotReady` - The room has fewer entries than seats
    pub async fn launch(&self, room_id: RoomId) -> DraftResult<()> {
        if !self.inner.registry.try_reserve(room_id) {
            return Err(DraftError::AlreadyLaunched(room_id));
        }

        match self.start(room_id).await {
            Ok(handle) => {
                handle.send(DraftMessage::Begin).await?;
                Ok(())
            }
            Err(e) => {
                self.inner.registry.abandon(room_id);
                Err(e)
            }
        }
    }

    async fn start(&self, room_id: RoomId) -> DraftResult<DraftHandle> {
        let repo = &self.inner.repo;
        let room = repo
            .get_room(room_id)
            .await?
            .ok_or(DraftError::RoomNotFound(room_id))?;
        if !room.status.is_pre_draft() {
            return Err(DraftError::AlreadyLaunched(room_id));
        }

        let entries = repaired_room_entries(repo.as_ref(), room_id, room.capacity)
            .await
            .map_err(into_draft_error)?;
        let participants: Vec<_> = entries
            .iter()
            .filter(|e| e.status.is_active())
            .map(|e| e.participant())
            .collect();
        if participants.len() < room.capacity {
            return Err(DraftError::NotReady {
                room_id,
                entries: participants.len(),
                capacity: room.capacity,
            });
        }

        if !repo.claim_room_for_draft(room_id).await? {
            return Err(DraftError::AlreadyLaunched(room_id));
        }

        let draft = match self.prepare(room_id, room.contest_id, participants).await {
            Ok(draft) => draft,
            Err(e) => {
                self.unclaim(room_id).await;
                return Err(e);
            }
        };

        let (actor, handle) = DraftActor::launched(room_id, self.context());
        self.spawn_actor(actor, handle.clone());
        self.inner.registry.install(room_id, handle.clone());

        log::info!(
            "Launched draft for room {} (contest {}, {} teams)",
            room_id,
            room.contest_id,
            draft.teams.len()
        );
        Ok(handle)
    }

    /// Build and persist the draft for a claimed room, then move its entries
    /// to drafting
    async fn prepare(
        &self,
        room_id: RoomId,
        contest_id: i64,
        participants: Vec<Participant>,
    ) -> DraftResult<DraftInstance> {
        let board = self.inner.generator.generate(contest_id).inspect_err(|e| {
            log::error!("Room {}: board generation failed: {}", room_id, e);
        })?;

        let draft = DraftInstance::new(
            room_id,
            contest_id,
            board,
            participants,
            self.inner.config.starting_budget,
        );
        self.inner.store.put(&draft).await?;
        self.inner.store.clear_turn(room_id).await?;
        self.inner.repo.mark_entries_drafting(room_id).await?;
        Ok(draft)
    }

    /// Undo a claim whose launch failed part way, so the room is full and
    /// unlaunched again and the sweep picks it back up
    async fn unclaim(&self, room_id: RoomId) {
        if let Err(e) = self.inner.store.delete(room_id).await {
            log::warn!("Room {}: failed to drop partial draft: {}", room_id, e);
        }
        if let Err(e) = self
            .inner
            .repo
            .set_room_status(room_id, RoomStatus::Ready)
            .await
        {
            log::error!("Room {}: failed to release launch claim: {}", room_id, e);
        }
    }

    /// Launch after the configured settle delay, in the background.
    ///
    /// Losing the race to another launcher is expected and only logged.
    pub fn launch_when_ready(&self, room_id: RoomId) {
        let scheduler = self.clone();
        let delay = self.inner.config.launch_delay();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            match scheduler.launch(room_id).await {
                Ok(()) => {}
                Err(DraftError::AlreadyLaunched(_)) => {
                    log::debug!("Room {} already launched", room_id);
                }
                Err(e) => {
                    log::warn!("Launch of room {} failed, sweep will retry: {}", room_id, e);
                }
            }
        });
    }

    fn spawn_actor(&self, actor: DraftActor, handle: DraftHandle) {
        let room_id = handle.room_id();
        let registry = self.inner.registry.clone();
        let timers = self.inner.timers.clone();

        tokio::spawn(async move {
            if let Err(e) = tokio::spawn(actor.run()).await {
                log::error!("Draft room {} actor panicked: {}", room_id, e);
            }
            if registry.release(room_id, &handle) {
                timers.cancel(room_id);
            }
        });
    }

    /// Submit a manual pick.
    ///
    /// Holds the user's pick-in-flight token for the duration, so a second
    /// concurrent submission fails fast with `PickInFlight`.
    pub async fn handle_pick(
        &self,
        room_id: RoomId,
        user_id: i64,
        player_id: &str,
        slot: RosterSlot,
    ) -> DraftResult<Pick> {
        let player_id = player_id.to_string();
        self.with_pick_lock(room_id, user_id, async {
            let handle = self.handle_for(room_id).await?;
            handle
                .request(|response| DraftMessage::SubmitPick {
                    user_id,
                    player_id,
                    slot,
                    response,
                })
                .await?
        })
        .await
    }

    /// Auto-pick on behalf of the acting user
    pub async fn handle_auto_pick(&self, room_id: RoomId, user_id: i64) -> DraftResult<Pick> {
        self.with_pick_lock(room_id, user_id, async {
            let handle = self.handle_for(room_id).await?;
            handle
                .request(|response| DraftMessage::AutoPick { user_id, response })
                .await?
        })
        .await
    }

    /// Queue a preferred player for the user's next auto-pick
    pub async fn preselect(
        &self,
        room_id: RoomId,
        user_id: i64,
        player_id: &str,
        slot: Option<RosterSlot>,
    ) -> DraftResult<()> {
        let handle = self.handle_for(room_id).await?;
        let player_id = player_id.to_string();
        handle
            .request(|response| DraftMessage::Preselect {
                user_id,
                player_id,
                slot,
                response,
            })
            .await?
    }

    async fn with_pick_lock<T>(
        &self,
        room_id: RoomId,
        user_id: i64,
        work: impl Future<Output = DraftResult<T>>,
    ) -> DraftResult<T> {
        let lock = self
            .inner
            .locks
            .try_acquire(&pick_key(room_id, user_id), self.inner.config.pick_lock_ttl())
            .await?
            .ok_or(DraftError::PickInFlight)?;

        let result = work.await;

        if let Err(e) = self.inner.locks.release(&lock).await {
            log::warn!("Failed to release pick lock {}: {}", lock.key, e);
        }
        result
    }

    /// Live actor for the room, recovering one if the draft is active but
    /// nothing is running it
    async fn handle_for(&self, room_id: RoomId) -> DraftResult<DraftHandle> {
        if let Some(handle) = self.inner.registry.handle(room_id) {
            return Ok(handle);
        }

        match self.inner.store.get(room_id).await? {
            Some(draft) if draft.status == DraftStatus::Active => {
                self.recover(room_id).await?;
                self.inner
                    .registry
                    .handle(room_id)
                    .ok_or(DraftError::DraftNotActive(room_id))
            }
            Some(_) => Err(DraftError::DraftNotActive(room_id)),
            None => Err(DraftError::DraftNotFound(room_id)),
        }
    }

    /// Resume a drafting room from persisted state.
    ///
    /// A live actor is asked to re-arm its timer if it lost it; otherwise a
    /// fresh actor is spawned that auto-picks a stalled turn, restarts the
    /// remaining time of a live one, or finalizes a finished draft.
    pub async fn recover(&self, room_id: RoomId) -> DraftResult<()> {
        if let Some(handle) = self.inner.registry.handle(room_id) {
            return handle.send(DraftMessage::Resume).await;
        }
        if !self.inner.registry.try_reserve(room_id) {
            // a launch is in flight
            return Ok(());
        }

        log::info!("Recovering draft for room {}", room_id);
        let (actor, handle) = DraftActor::recovered(room_id, self.context());
        self.spawn_actor(actor, handle.clone());
        self.inner.registry.install(room_id, handle.clone());
        handle.send(DraftMessage::Resume).await
    }

    /// Finalize a room now, stopping its actor first. Safe to repeat.
    pub async fn finalize(&self, room_id: RoomId) -> DraftResult<FinalizeSummary> {
        if let Some(handle) = self.inner.registry.handle(room_id) {
            let _ = handle.send(DraftMessage::Close).await;
            self.inner.registry.release(room_id, &handle);
        }
        let draft = match self.inner.store.get(room_id).await {
            Ok(draft) => draft,
            Err(e) => {
                log::warn!("Room {}: unreadable draft at finalize: {}", room_id, e);
                None
            }
        };
        self.inner.finalizer.finalize(room_id, draft).await
    }

    /// Current phase of the room's actor, if one is running
    pub async fn phase(&self, room_id: RoomId) -> Option<DraftPhase> {
        let handle = self.inner.registry.handle(room_id)?;
        handle
            .request(|response| DraftMessage::GetPhase { response })
            .await
            .ok()
    }

    /// Stop every room actor. Persisted state is left for recovery.
    pub async fn shutdown(&self) {
        let handles = self.inner.registry.handles();
        log::info!("Stopping {} draft actors", handles.len());
        for handle in handles {
            let _ = handle.send(DraftMessage::Close).await;
        }
        self.inner.timers.cancel_all();
    }
}

#[async_trait]
impl RoomLauncher for DraftScheduler {
    async fn room_filled(&self, room_id: i64) {
        self.launch_when_ready(room_id);
    }
}

fn into_draft_error(error: ContestError) -> DraftError {
    match error {
        ContestError::Store(e) => DraftError::Store(e),
        other => DraftError::CorruptedState(other.to_string()),
    }
}
