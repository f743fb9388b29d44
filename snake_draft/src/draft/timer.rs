//! Turn timers.
//!
//! One tokio task per room drives its current countdown or turn. A turn
//! timer sleeps the pick limit, reports `DeadlineElapsed`, sleeps the grace
//! period and reports `GraceElapsed`, both tagged with the turn they were
//! armed for so the room can drop stale expiries.

use super::actor::DraftHandle;
use super::events::CountdownStage;
use super::messages::DraftMessage;
use super::models::RoomId;
use parking_lot::Mutex;
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::{task::JoinHandle, time::sleep};

/// What an armed timer is counting down to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    Countdown(CountdownStage),
    Turn(usize),
}

struct ArmedTimer {
    kind: TimerKind,
    task: JoinHandle<()>,
}

/// Registry of per-room timers
#[derive(Clone, Default)]
pub struct TurnTimers {
    timers: Arc<Mutex<HashMap<RoomId, ArmedTimer>>>,
}

impl TurnTimers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the timer for `turn`, replacing whatever the room had armed
    pub fn arm_turn(
        &self,
        room_id: RoomId,
        turn: usize,
        limit: Duration,
        grace: Duration,
        handle: DraftHandle,
    ) {
        let task = tokio::spawn(async move {
            sleep(limit).await;
            if handle.send(DraftMessage::DeadlineElapsed { turn }).await.is_err() {
                return;
            }
            sleep(grace).await;
            let _ = handle.send(DraftMessage::GraceElapsed { turn }).await;
        });
        log::debug!("Room {room_id}: turn {turn} timer armed for {limit:?}");
        self.install(room_id, TimerKind::Turn(turn), task);
    }

    /// Arm a countdown that reports `CountdownElapsed` after `delay`
    pub fn arm_countdown(
        &self,
        room_id: RoomId,
        stage: CountdownStage,
        delay: Duration,
        handle: DraftHandle,
    ) {
        let task = tokio::spawn(async move {
            sleep(delay).await;
            let _ = handle.send(DraftMessage::CountdownElapsed { stage }).await;
        });
        self.install(room_id, TimerKind::Countdown(stage), task);
    }

    fn install(&self, room_id: RoomId, kind: TimerKind, task: JoinHandle<()>) {
        if let Some(previous) = self.timers.lock().insert(room_id, ArmedTimer { kind, task }) {
            previous.task.abort();
        }
    }

    /// Cancel the room's timer, if any
    pub fn cancel(&self, room_id: RoomId) {
        if let Some(timer) = self.timers.lock().remove(&room_id) {
            timer.task.abort();
            log::debug!("Room {room_id}: {:?} timer cancelled", timer.kind);
        }
    }

    /// Whether the room has a timer that has not yet fired completely
    pub fn is_armed(&self, room_id: RoomId) -> bool {
        self.timers
            .lock()
            .get(&room_id)
            .is_some_and(|t| !t.task.is_finished())
    }

    /// What the room's live timer is counting down to
    pub fn armed_kind(&self, room_id: RoomId) -> Option<TimerKind> {
        self.timers
            .lock()
            .get(&room_id)
            .filter(|t| !t.task.is_finished())
            .map(|t| t.kind)
    }

    /// Abort every timer
    pub fn cancel_all(&self) {
        for (_, timer) in self.timers.lock().drain() {
            timer.task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::draft::actor::DraftHandle;
    use tokio::sync::mpsc;

    fn handle(room_id: RoomId) -> (DraftHandle, mpsc::Receiver<DraftMessage>) {
        let (tx, rx) = mpsc::channel(8);
        (DraftHandle::new(tx, room_id), rx)
    }

    #[tokio::test(start_paused = true)]
    async fn test_turn_timer_reports_deadline_then_grace() {
        let timers = TurnTimers::new();
        let (h, mut rx) = handle(1);

        timers.arm_turn(1, 4, Duration::from_secs(30), Duration::from_secs(2), h);
        assert_eq!(timers.armed_kind(1), Some(TimerKind::Turn(4)));

        let start = tokio::time::Instant::now();
        assert!(matches!(
            rx.recv().await,
            Some(DraftMessage::DeadlineElapsed { turn: 4 })
        ));
        assert!(start.elapsed() >= Duration::from_secs(30));
        assert!(start.elapsed() < Duration::from_secs(31));

        assert!(matches!(
            rx.recv().await,
            Some(DraftMessage::GraceElapsed { turn: 4 })
        ));
        assert!(start.elapsed() >= Duration::from_secs(32));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_delivery() {
        let timers = TurnTimers::new();
        let (h, mut rx) = handle(1);

        timers.arm_turn(1, 0, Duration::from_secs(5), Duration::from_secs(1), h);
        timers.cancel(1);
        assert!(!timers.is_armed(1));

        sleep(Duration::from_secs(10)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearming_replaces_previous_timer() {
        let timers = TurnTimers::new();
        let (h, mut rx) = handle(2);

        timers.arm_turn(2, 0, Duration::from_secs(5), Duration::ZERO, h.clone());
        timers.arm_turn(2, 1, Duration::from_secs(5), Duration::ZERO, h);

        assert!(matches!(
            rx.recv().await,
            Some(DraftMessage::DeadlineElapsed { turn: 1 })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_countdown_fires_once() {
        let timers = TurnTimers::new();
        let (h, mut rx) = handle(3);

        timers.arm_countdown(3, CountdownStage::Launch, Duration::from_secs(5), h);
        assert!(timers.is_armed(3));
        assert!(matches!(
            rx.recv().await,
            Some(DraftMessage::CountdownElapsed {
                stage: CountdownStage::Launch
            })
        ));
    }
}
