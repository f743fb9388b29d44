//! Draft event stream.
//!
//! Events are delivered through an [`EventSink`]. [`BroadcastHub`] is the
//! in-process sink: one tokio broadcast channel per room, one per user, and
//! a firehose carrying every event with its delivery target.

use super::models::{Board, Pick, RoomId, Team};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::broadcast;

/// Which countdown is running
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CountdownStage {
    /// Before the board is revealed
    Launch,
    /// After the board is revealed, before the first turn
    FirstTurn,
}

/// Events published to room members and individual users
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DraftEvent {
    RoomJoined {
        room_id: RoomId,
        contest_id: i64,
        user_id: i64,
        username: String,
        draft_position: u32,
        entries: usize,
        capacity: usize,
    },
    DraftCountdown {
        room_id: RoomId,
        stage: CountdownStage,
        seconds: u64,
    },
    DraftStarting {
        room_id: RoomId,
        board: Board,
        teams: Vec<Team>,
        draft_order: Vec<usize>,
    },
    DraftTurn {
        room_id: RoomId,
        turn: usize,
        round: usize,
        team_index: usize,
        user_id: i64,
        username: String,
        budget: i64,
        limit_secs: u64,
    },
    PlayerPicked {
        room_id: RoomId,
        user_id: i64,
        pick: Pick,
    },
    TurnSkipped {
        room_id: RoomId,
        turn: usize,
        user_id: i64,
        reason: String,
    },
    DraftComplete {
        room_id: RoomId,
        teams: Vec<Team>,
        total_picks: usize,
    },
}

impl DraftEvent {
    /// Stable event name as sent to clients
    pub fn name(&self) -> &'static str {
        match self {
            DraftEvent::RoomJoined { .. } => "room_joined",
            DraftEvent::DraftCountdown { .. } => "draft_countdown",
            DraftEvent::DraftStarting { .. } => "draft_starting",
            DraftEvent::DraftTurn { .. } => "draft_turn",
            DraftEvent::PlayerPicked { .. } => "player_picked",
            DraftEvent::TurnSkipped { .. } => "turn_skipped",
            DraftEvent::DraftComplete { .. } => "draft_complete",
        }
    }
}

/// Delivery target of a published event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    Room(RoomId),
    User(i64),
}

/// An event together with its audience, as seen on the firehose
#[derive(Debug, Clone)]
pub struct Envelope {
    pub audience: Audience,
    pub event: DraftEvent,
}

/// Outbound fan-out used by the engine
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Deliver to every member of a room
    async fn publish_room(&self, room_id: RoomId, event: DraftEvent);

    /// Deliver to a single user
    async fn publish_user(&self, user_id: i64, event: DraftEvent);

    /// Drop any per-room resources once a draft is over
    async fn release_room(&self, room_id: RoomId);
}

/// Capacity of each broadcast buffer
const CHANNEL_CAPACITY: usize = 1024;

/// In-process event hub on tokio broadcast channels
pub struct BroadcastHub {
    rooms: Mutex<HashMap<RoomId, broadcast::Sender<DraftEvent>>>,
    users: Mutex<HashMap<i64, broadcast::Sender<DraftEvent>>>,
    all: broadcast::Sender<Envelope>,
}

impl BroadcastHub {
    pub fn new() -> Self {
        let (all, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            rooms: Mutex::new(HashMap::new()),
            users: Mutex::new(HashMap::new()),
            all,
        }
    }

    /// Subscribe to a room's events. Creates the channel if needed.
    pub fn subscribe_room(&self, room_id: RoomId) -> broadcast::Receiver<DraftEvent> {
        let mut rooms = self.rooms.lock();
        rooms
            .entry(room_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Subscribe to events addressed to one user.
    ///
    /// Channels of users whose receivers have all gone are dropped here and
    /// on publish.
    pub fn subscribe_user(&self, user_id: i64) -> broadcast::Receiver<DraftEvent> {
        let mut users = self.users.lock();
        users.retain(|_, tx| tx.receiver_count() > 0);
        users
            .entry(user_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Subscribe to every event published through the hub
    pub fn subscribe_all(&self) -> broadcast::Receiver<Envelope> {
        self.all.subscribe()
    }

    /// Number of rooms with an open channel
    pub fn room_count(&self) -> usize {
        self.rooms.lock().len()
    }

    /// Number of users with an open channel
    pub fn user_count(&self) -> usize {
        self.users.lock().len()
    }

    fn fan_out(&self, audience: Audience, event: DraftEvent) {
        let direct = match audience {
            Audience::Room(id) => self.rooms.lock().get(&id).cloned(),
            Audience::User(id) => {
                let mut users = self.users.lock();
                if users.get(&id).is_some_and(|tx| tx.receiver_count() == 0) {
                    users.remove(&id);
                }
                users.get(&id).cloned()
            }
        };
        if let Some(tx) = direct {
            // No receivers is not an error
            let _ = tx.send(event.clone());
        }
        let _ = self.all.send(Envelope { audience, event });
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventSink for BroadcastHub {
    async fn publish_room(&self, room_id: RoomId, event: DraftEvent) {
        log::debug!("room {} <- {}", room_id, event.name());
        self.fan_out(Audience::Room(room_id), event);
    }

    async fn publish_user(&self, user_id: i64, event: DraftEvent) {
        log::debug!("user {} <- {}", user_id, event.name());
        self.fan_out(Audience::User(user_id), event);
    }

    async fn release_room(&self, room_id: RoomId) {
        self.rooms.lock().remove(&room_id);
    }
}
