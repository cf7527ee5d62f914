//! Row-level change notifications.
//!
//! Every committed mutation in the store publishes exactly one
//! [`ChangeEvent`]. Events fan out over three broadcast channels — task-level
//! changes (session tasks and viewers), participant changes, and session-row
//! changes — and consumers subscribe per session via a [`SubscriptionHandle`]
//! that filters to its session id and is torn down by dropping it.
//!
//! Delivery order is send order within one channel; nothing is guaranteed
//! across channels. A consumer that falls behind observes [`FeedItem::Lapse`]
//! and must re-fetch full session state rather than assume continuity.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use super::models::{CleaningSession, SessionParticipant, SessionTask, TaskViewer};

/// Events retained per channel before the slowest receiver starts lapsing.
const FEED_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeOp {
    Insert,
    Update,
    Delete,
}

impl ChangeOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }
}

/// One row-level change, carrying the new and/or old row.
///
/// INSERT populates `new`, DELETE populates `old`, UPDATE populates both.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "table", rename_all = "snake_case")]
pub enum ChangeEvent {
    SessionTasks {
        op: ChangeOp,
        session_id: Uuid,
        new: Option<SessionTask>,
        old: Option<SessionTask>,
    },
    SessionParticipants {
        op: ChangeOp,
        session_id: Uuid,
        new: Option<SessionParticipant>,
        old: Option<SessionParticipant>,
    },
    TaskViewers {
        op: ChangeOp,
        session_id: Uuid,
        new: Option<TaskViewer>,
        old: Option<TaskViewer>,
    },
    CleaningSessions {
        op: ChangeOp,
        session_id: Uuid,
        new: Option<CleaningSession>,
        old: Option<CleaningSession>,
    },
}

impl ChangeEvent {
    pub fn session_id(&self) -> Uuid {
        match self {
            Self::SessionTasks { session_id, .. }
            | Self::SessionParticipants { session_id, .. }
            | Self::TaskViewers { session_id, .. }
            | Self::CleaningSessions { session_id, .. } => *session_id,
        }
    }

    pub fn op(&self) -> ChangeOp {
        match self {
            Self::SessionTasks { op, .. }
            | Self::SessionParticipants { op, .. }
            | Self::TaskViewers { op, .. }
            | Self::CleaningSessions { op, .. } => *op,
        }
    }
}

/// What a subscriber sees on each poll.
#[derive(Debug)]
pub enum FeedItem {
    Event(ChangeEvent),
    /// The subscriber fell behind and events were dropped; in-memory state
    /// can no longer be trusted and must be rebuilt from the store.
    Lapse,
    /// The bus shut down.
    Closed,
}

/// Process-wide fan-out of change events.
#[derive(Clone)]
pub struct FeedBus {
    tasks_tx: broadcast::Sender<ChangeEvent>,
    participants_tx: broadcast::Sender<ChangeEvent>,
    session_tx: broadcast::Sender<ChangeEvent>,
}

impl Default for FeedBus {
    fn default() -> Self {
        Self::new()
    }
}

impl FeedBus {
    pub fn new() -> Self {
        Self::with_capacity(FEED_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tasks_tx, _) = broadcast::channel(capacity);
        let (participants_tx, _) = broadcast::channel(capacity);
        let (session_tx, _) = broadcast::channel(capacity);
        Self {
            tasks_tx,
            participants_tx,
            session_tx,
        }
    }

    /// Publish an event to its channel. Returns silently when no subscriber
    /// is connected.
    pub fn publish(&self, event: ChangeEvent) {
        let tx = match &event {
            ChangeEvent::SessionTasks { .. } | ChangeEvent::TaskViewers { .. } => &self.tasks_tx,
            ChangeEvent::SessionParticipants { .. } => &self.participants_tx,
            ChangeEvent::CleaningSessions { .. } => &self.session_tx,
        };
        let _ = tx.send(event);
    }

    /// Subscribe to all three channels, filtered to one session.
    pub fn subscribe(&self, session_id: Uuid) -> SubscriptionHandle {
        SubscriptionHandle {
            session_id,
            tasks_rx: self.tasks_tx.subscribe(),
            participants_rx: self.participants_tx.subscribe(),
            session_rx: self.session_tx.subscribe(),
        }
    }
}

/// A live subscription scoped to one session. Dropping the handle
/// unsubscribes all three channels.
pub struct SubscriptionHandle {
    session_id: Uuid,
    tasks_rx: broadcast::Receiver<ChangeEvent>,
    participants_rx: broadcast::Receiver<ChangeEvent>,
    session_rx: broadcast::Receiver<ChangeEvent>,
}

impl SubscriptionHandle {
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Wait for the next event for this session.
    ///
    /// Events for other sessions are skipped. A lagged receiver on any
    /// channel surfaces as a single [`FeedItem::Lapse`]; the receiver stays
    /// usable afterwards, so the caller resyncs and keeps polling.
    pub async fn next(&mut self) -> FeedItem {
        loop {
            let result = tokio::select! {
                r = self.tasks_rx.recv() => r,
                r = self.participants_rx.recv() => r,
                r = self.session_rx.recv() => r,
            };
            match result {
                Ok(event) if event.session_id() == self.session_id => {
                    return FeedItem::Event(event);
                }
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => return FeedItem::Lapse,
                Err(broadcast::error::RecvError::Closed) => return FeedItem::Closed,
            }
        }
    }

    /// Non-blocking variant used by tests and drain loops: returns `None`
    /// when no event is immediately available.
    pub fn try_next(&mut self) -> Option<FeedItem> {
        for rx in [
            &mut self.tasks_rx,
            &mut self.participants_rx,
            &mut self.session_rx,
        ] {
            loop {
                match rx.try_recv() {
                    Ok(event) if event.session_id() == self.session_id => {
                        return Some(FeedItem::Event(event));
                    }
                    Ok(_) => continue,
                    Err(broadcast::error::TryRecvError::Lagged(_)) => {
                        return Some(FeedItem::Lapse);
                    }
                    Err(_) => break,
                }
            }
        }
        None
    }
}
