//! Draft state store.
//!
//! Draft instances are kept as expiring JSON documents keyed by room, with
//! the current turn's timing stored beside them. Reads go through a
//! validating decoder: a document whose `teams` field is not an array is
//! rebuilt from the participant list and written back before the caller
//! sees it. Anything else that fails to decode is reported as corruption.

use super::config::DraftConfig;
use super::errors::{DraftError, DraftResult};
use super::models::{DraftInstance, DraftStatus, Participant, RoomId, TurnMeta};
use crate::db::{StoreResult, timeouts::with_default_timeout};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{PgPool, Row, types::Json};
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::sync::RwLock;

/// Raw storage for draft documents and turn metadata
#[async_trait]
pub trait DraftStateBackend: Send + Sync {
    /// Load the raw draft document, ignoring expired records
    async fn load(&self, room_id: RoomId) -> StoreResult<Option<Value>>;

    /// Store the raw draft document with an expiry
    async fn save(&self, room_id: RoomId, document: &Value, ttl: Duration) -> StoreResult<()>;

    async fn delete(&self, room_id: RoomId) -> StoreResult<()>;

    async fn load_turn(&self, room_id: RoomId) -> StoreResult<Option<TurnMeta>>;

    async fn save_turn(&self, meta: &TurnMeta, ttl: Duration) -> StoreResult<()>;

    async fn delete_turn(&self, room_id: RoomId) -> StoreResult<()>;
}

/// Authoritative participant list for a room, used when the stored
/// document has lost its own copy
#[async_trait]
pub trait ParticipantSource: Send + Sync {
    async fn participants(&self, room_id: RoomId) -> StoreResult<Vec<Participant>>;
}

fn expiry(ttl: Duration) -> DateTime<Utc> {
    Utc::now() + chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::hours(1))
}

/// PostgreSQL backend (tables `draft_states` and `draft_turns`)
#[derive(Clone)]
pub struct PgDraftBackend {
    pool: Arc<PgPool>,
}

impl PgDraftBackend {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DraftStateBackend for PgDraftBackend {
    async fn load(&self, room_id: RoomId) -> StoreResult<Option<Value>> {
        let row = with_default_timeout(
            sqlx::query(
                "SELECT state FROM draft_states WHERE room_id = $1 AND expires_at > NOW()",
            )
            .bind(room_id)
            .fetch_optional(self.pool.as_ref()),
        )
        .await?;

        Ok(row.map(|r| r.get::<Json<Value>, _>("state").0))
    }

    async fn save(&self, room_id: RoomId, document: &Value, ttl: Duration) -> StoreResult<()> {
        with_default_timeout(
            sqlx::query(
                r#"
                INSERT INTO draft_states (room_id, state, expires_at, updated_at)
                VALUES ($1, $2, $3, NOW())
                ON CONFLICT (room_id) DO UPDATE
                    SET state = EXCLUDED.state,
                        expires_at = EXCLUDED.expires_at,
                        updated_at = NOW()
                "#,
            )
            .bind(room_id)
            .bind(Json(document))
            .bind(expiry(ttl))
            .execute(self.pool.as_ref()),
        )
        .await?;
        Ok(())
    }

    async fn delete(&self, room_id: RoomId) -> StoreResult<()> {
        with_default_timeout(
            sqlx::query("DELETE FROM draft_states WHERE room_id = $1")
                .bind(room_id)
                .execute(self.pool.as_ref()),
        )
        .await?;
        Ok(())
    }

    async fn load_turn(&self, room_id: RoomId) -> StoreResult<Option<TurnMeta>> {
        let row = with_default_timeout(
            sqlx::query(
                r#"
                SELECT room_id, turn, user_id, started_at, limit_secs
                FROM draft_turns
                WHERE room_id = $1 AND expires_at > NOW()
                "#,
            )
            .bind(room_id)
            .fetch_optional(self.pool.as_ref()),
        )
        .await?;

        Ok(row.map(|r| TurnMeta {
            room_id: r.get("room_id"),
            turn: r.get::<i32, _>("turn") as usize,
            user_id: r.get("user_id"),
            started_at: r.get("started_at"),
            limit_secs: r.get::<i32, _>("limit_secs") as u64,
        }))
    }

    async fn save_turn(&self, meta: &TurnMeta, ttl: Duration) -> StoreResult<()> {
        with_default_timeout(
            sqlx::query(
                r#"
                INSERT INTO draft_turns (room_id, turn, user_id, started_at, limit_secs, expires_at)
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (room_id) DO UPDATE
                    SET turn = EXCLUDED.turn,
                        user_id = EXCLUDED.user_id,
                        started_at = EXCLUDED.started_at,
                        limit_secs = EXCLUDED.limit_secs,
                        expires_at = EXCLUDED.expires_at
                "#,
            )
            .bind(meta.room_id)
            .bind(meta.turn as i32)
            .bind(meta.user_id)
            .bind(meta.started_at)
            .bind(meta.limit_secs as i32)
            .bind(expiry(ttl))
            .execute(self.pool.as_ref()),
        )
        .await?;
        Ok(())
    }

    async fn delete_turn(&self, room_id: RoomId) -> StoreResult<()> {
        with_default_timeout(
            sqlx::query("DELETE FROM draft_turns WHERE room_id = $1")
                .bind(room_id)
                .execute(self.pool.as_ref()),
        )
        .await?;
        Ok(())
    }
}

/// In-process backend for single-node deployments and tests
#[derive(Clone, Default)]
pub struct MemoryDraftBackend {
    states: Arc<RwLock<HashMap<RoomId, (Value, DateTime<Utc>)>>>,
    turns: Arc<RwLock<HashMap<RoomId, (TurnMeta, DateTime<Utc>)>>>,
}

impl MemoryDraftBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DraftStateBackend for MemoryDraftBackend {
    async fn load(&self, room_id: RoomId) -> StoreResult<Option<Value>> {
        let states = self.states.read().await;
        Ok(states
            .get(&room_id)
            .filter(|(_, expires_at)| *expires_at > Utc::now())
            .map(|(doc, _)| doc.clone()))
    }

    async fn save(&self, room_id: RoomId, document: &Value, ttl: Duration) -> StoreResult<()> {
        self.states
            .write()
            .await
            .insert(room_id, (document.clone(), expiry(ttl)));
        Ok(())
    }

    async fn delete(&self, room_id: RoomId) -> StoreResult<()> {
        self.states.write().await.remove(&room_id);
        Ok(())
    }

    async fn load_turn(&self, room_id: RoomId) -> StoreResult<Option<TurnMeta>> {
        let turns = self.turns.read().await;
        Ok(turns
            .get(&room_id)
            .filter(|(_, expires_at)| *expires_at > Utc::now())
            .map(|(meta, _)| meta.clone()))
    }

    async fn save_turn(&self, meta: &TurnMeta, ttl: Duration) -> StoreResult<()> {
        self.turns
            .write()
            .await
            .insert(meta.room_id, (meta.clone(), expiry(ttl)));
        Ok(())
    }

    async fn delete_turn(&self, room_id: RoomId) -> StoreResult<()> {
        self.turns.write().await.remove(&room_id);
        Ok(())
    }
}

/// Typed, self-repairing access to draft documents
#[derive(Clone)]
pub struct DraftStore {
    backend: Arc<dyn DraftStateBackend>,
    participants: Option<Arc<dyn ParticipantSource>>,
    starting_budget: i64,
    active_ttl: Duration,
    completed_ttl: Duration,
}

impl DraftStore {
    pub fn new(backend: Arc<dyn DraftStateBackend>, config: &DraftConfig) -> Self {
        Self {
            backend,
            participants: None,
            starting_budget: config.starting_budget,
            active_ttl: config.active_ttl(),
            completed_ttl: config.completed_ttl(),
        }
    }

    /// Fall back to `source` when a damaged document has no participants
    pub fn with_participant_source(mut self, source: Arc<dyn ParticipantSource>) -> Self {
        self.participants = Some(source);
        self
    }

    pub fn backend(&self) -> &Arc<dyn DraftStateBackend> {
        &self.backend
    }

    /// Load and decode a room's draft, repairing a damaged `teams` field
    pub async fn get(&self, room_id: RoomId) -> DraftResult<Option<DraftInstance>> {
        let Some(document) = self.backend.load(room_id).await? else {
            return Ok(None);
        };

        let teams_ok = document.get("teams").is_some_and(Value::is_array);
        if teams_ok {
            return serde_json::from_value(document)
                .map(Some)
                .map_err(|e| DraftError::CorruptedState(format!("room {room_id}: {e}")));
        }

        log::warn!(
            "Draft state for room {} has malformed teams ({}), rebuilding",
            room_id,
            document
                .get("teams")
                .map(json_kind)
                .unwrap_or("missing")
        );
        let repaired = self.repair(room_id, document).await?;
        self.put(&repaired).await?;
        Ok(Some(repaired))
    }

    /// Like [`get`](Self::get) but a missing draft is an error
    pub async fn require(&self, room_id: RoomId) -> DraftResult<DraftInstance> {
        self.get(room_id)
            .await?
            .ok_or(DraftError::DraftNotFound(room_id))
    }

    pub async fn put(&self, draft: &DraftInstance) -> DraftResult<()> {
        let ttl = match draft.status {
            DraftStatus::Active => self.active_ttl,
            DraftStatus::Completed => self.completed_ttl,
        };
        let document = serde_json::to_value(draft).map_err(crate::db::StoreError::from)?;
        self.backend.save(draft.room_id, &document, ttl).await?;
        Ok(())
    }

    /// Read, mutate and write back a draft in one step.
    ///
    /// Callers must be the room's single writer. If `f` fails nothing is
    /// written.
    pub async fn update<T, F>(&self, room_id: RoomId, f: F) -> DraftResult<T>
    where
        F: FnOnce(&mut DraftInstance) -> DraftResult<T> + Send,
        T: Send,
    {
        let mut draft = self.require(room_id).await?;
        let out = f(&mut draft)?;
        self.put(&draft).await?;
        Ok(out)
    }

    pub async fn delete(&self, room_id: RoomId) -> DraftResult<()> {
        self.backend.delete(room_id).await?;
        self.backend.delete_turn(room_id).await?;
        Ok(())
    }

    pub async fn get_turn(&self, room_id: RoomId) -> DraftResult<Option<TurnMeta>> {
        Ok(self.backend.load_turn(room_id).await?)
    }

    pub async fn put_turn(&self, meta: &TurnMeta) -> DraftResult<()> {
        self.backend.save_turn(meta, self.active_ttl).await?;
        Ok(())
    }

    pub async fn clear_turn(&self, room_id: RoomId) -> DraftResult<()> {
        self.backend.delete_turn(room_id).await?;
        Ok(())
    }

    async fn repair(&self, room_id: RoomId, mut document: Value) -> DraftResult<DraftInstance> {
        let Some(object) = document.as_object_mut() else {
            return Err(DraftError::CorruptedState(format!(
                "room {room_id}: document is not an object"
            )));
        };
        object.insert("teams".to_string(), Value::Array(Vec::new()));

        let mut draft: DraftInstance = serde_json::from_value(document)
            .map_err(|e| DraftError::CorruptedState(format!("room {room_id}: {e}")))?;

        if draft.participants.is_empty()
            && let Some(source) = &self.participants
        {
            draft.participants = source.participants(room_id).await?;
        }
        if draft.participants.is_empty() {
            return Err(DraftError::CorruptedState(format!(
                "room {room_id}: no participants to rebuild teams from"
            )));
        }

        draft.teams =
            DraftInstance::rebuild_teams(&draft.participants, &draft.picks, self.starting_budget);
        log::info!(
            "Rebuilt {} teams for room {} from {} picks",
            draft.teams.len(),
            room_id,
            draft.picks.len()
        );
        Ok(draft)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
