//! Live board state for one session.
//!
//! `SessionSync` owns the in-memory copies of the session row, its tasks,
//! participants, and viewers, and keeps them converged with the store by
//! applying change-feed events. The store stays the durable source of truth;
//! local state is a view that tolerates duplicate and out-of-order delivery
//! across channels because every merge is keyed by row id and idempotent.
//!
//! An optimistic local edit and the feed echo of the same mutation can land
//! in either order; both paths write the same row state, so the result is
//! identical. When the feed reports a lapse the whole session state is
//! re-fetched rather than patched.

use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::StoreResult;

use super::db::BoardStore;
use super::feed::{ChangeEvent, ChangeOp, FeedItem, SubscriptionHandle};
use super::join::join_session_best_effort;
use super::models::{
    BoardTask, CleaningSession, Identity, SessionParticipant, SessionStatus, TaskViewer,
};

/// In-memory collections for one session's board.
#[derive(Debug, Default)]
pub struct SessionState {
    pub session: Option<CleaningSession>,
    pub tasks: Vec<BoardTask>,
    pub participants: Vec<SessionParticipant>,
    pub viewers: Vec<TaskViewer>,
    /// Raised when the session transitions into `completed`; the UI layer
    /// consumes it via [`SessionSync::take_celebration`].
    celebrate: bool,
}

impl SessionState {
    /// Update-if-exists else append, keyed by the session-task row id.
    pub fn merge_task(&mut self, task: BoardTask) {
        match self.tasks.iter_mut().find(|t| t.task.id == task.task.id) {
            Some(existing) => *existing = task,
            None => self.tasks.push(task),
        }
    }

    pub fn remove_task(&mut self, id: Uuid) {
        self.tasks.retain(|t| t.task.id != id);
        self.viewers.retain(|v| v.session_task_id != id);
    }

    pub fn task(&self, id: Uuid) -> Option<&BoardTask> {
        self.tasks.iter().find(|t| t.task.id == id)
    }

    pub fn task_mut(&mut self, id: Uuid) -> Option<&mut BoardTask> {
        self.tasks.iter_mut().find(|t| t.task.id == id)
    }

    pub fn merge_participant(&mut self, participant: SessionParticipant) {
        match self
            .participants
            .iter_mut()
            .find(|p| p.id == participant.id)
        {
            Some(existing) => *existing = participant,
            None => self.participants.push(participant),
        }
    }

    pub fn remove_participant(&mut self, id: Uuid) {
        self.participants.retain(|p| p.id != id);
    }

    pub fn participant_for(&self, identity: &Identity) -> Option<&SessionParticipant> {
        self.participants
            .iter()
            .find(|p| p.identity().as_ref() == Some(identity))
    }

    pub fn merge_viewer(&mut self, viewer: TaskViewer) {
        match self.viewers.iter_mut().find(|v| v.id == viewer.id) {
            Some(existing) => *existing = viewer,
            None => self.viewers.push(viewer),
        }
    }

    pub fn remove_viewer(&mut self, id: Uuid) {
        self.viewers.retain(|v| v.id != id);
    }

    /// Participants currently viewing a task, collapsed by identity so stale
    /// duplicate viewer rows never render twice. The stable user id wins
    /// over the temp id, which wins over the raw participant row id.
    pub fn viewers_of_task(&self, session_task_id: Uuid) -> Vec<&SessionParticipant> {
        let mut seen = std::collections::HashSet::new();
        let mut result = Vec::new();
        for viewer in self
            .viewers
            .iter()
            .filter(|v| v.session_task_id == session_task_id)
        {
            let Some(participant) = self.participants.iter().find(|p| p.id == viewer.participant_id)
            else {
                continue;
            };
            if seen.insert(participant.identity_key()) {
                result.push(participant);
            }
        }
        result
    }
}

/// Synchronizer for one session: subscribes on creation, applies events,
/// and rebuilds from the store whenever the feed lapses. Dropping it tears
/// the subscription down.
pub struct SessionSync {
    pub(crate) store: BoardStore,
    pub(crate) session_id: Uuid,
    pub(crate) identity: Identity,
    pub(crate) participant: Option<SessionParticipant>,
    sub: SubscriptionHandle,
    pub state: SessionState,
}

impl SessionSync {
    /// Subscribe, register the actor as a participant (best effort), and
    /// load the initial board state. Subscription happens before the state
    /// fetch so no event can slip between the two.
    pub async fn connect(
        store: BoardStore,
        session_id: Uuid,
        identity: Identity,
    ) -> StoreResult<Self> {
        let sub = store.feed().subscribe(session_id);
        let participant = join_session_best_effort(&store, session_id, &identity).await;
        let mut sync = Self {
            store,
            session_id,
            identity,
            participant,
            sub,
            state: SessionState::default(),
        };
        sync.resync().await?;
        Ok(sync)
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn participant(&self) -> Option<&SessionParticipant> {
        self.participant.as_ref()
    }

    /// Replace in-memory state with the store's current view.
    pub async fn resync(&mut self) -> StoreResult<()> {
        let view = self.store.board_view(self.session_id).await?;
        let was_active = self
            .state
            .session
            .as_ref()
            .map(|s| s.status == SessionStatus::Active)
            .unwrap_or(false);
        if was_active && view.session.status == SessionStatus::Completed {
            self.state.celebrate = true;
        }
        self.state.session = Some(view.session);
        self.state.tasks = view.tasks;
        self.state.participants = view.participants;
        self.state.viewers = view.viewers;
        Ok(())
    }

    /// Wait for and apply the next feed item. Returns `false` once the feed
    /// closed and no further updates will arrive.
    pub async fn process_next(&mut self) -> StoreResult<bool> {
        match self.sub.next().await {
            FeedItem::Event(event) => {
                self.apply(event).await;
                Ok(true)
            }
            FeedItem::Lapse => {
                warn!(
                    "[sync] feed lapsed for session {}, rebuilding state",
                    self.session_id
                );
                self.resync().await?;
                Ok(true)
            }
            FeedItem::Closed => Ok(false),
        }
    }

    /// Drain whatever is immediately available; used after an action to pick
    /// up the echo without blocking.
    pub async fn drain_pending(&mut self) -> StoreResult<()> {
        while let Some(item) = self.sub.try_next() {
            match item {
                FeedItem::Event(event) => self.apply(event).await,
                FeedItem::Lapse => self.resync().await?,
                FeedItem::Closed => break,
            }
        }
        Ok(())
    }

    /// Apply one change event to local state.
    ///
    /// Enrichment failures are logged and leave the previous row in place;
    /// the next event or resync corrects the drift. Applying the same event
    /// twice is a no-op by construction.
    pub async fn apply(&mut self, event: ChangeEvent) {
        match event {
            ChangeEvent::SessionTasks { op, new, old, .. } => match op {
                ChangeOp::Insert | ChangeOp::Update => {
                    let Some(row) = new else { return };
                    self.refresh_task(row.id).await;
                }
                ChangeOp::Delete => {
                    if let Some(row) = old {
                        self.state.remove_task(row.id);
                    }
                }
            },
            ChangeEvent::SessionParticipants { op, new, old, .. } => match op {
                ChangeOp::Insert | ChangeOp::Update => {
                    if let Some(row) = new {
                        self.state.merge_participant(row);
                    }
                }
                ChangeOp::Delete => {
                    if let Some(row) = old {
                        self.state.remove_participant(row.id);
                    }
                }
            },
            ChangeEvent::TaskViewers { op, new, old, .. } => match op {
                ChangeOp::Insert | ChangeOp::Update => {
                    if let Some(row) = new {
                        self.state.merge_viewer(row);
                    }
                }
                ChangeOp::Delete => {
                    if let Some(row) = old {
                        self.state.remove_viewer(row.id);
                    }
                }
            },
            ChangeEvent::CleaningSessions { op, new, .. } => {
                if matches!(op, ChangeOp::Insert | ChangeOp::Update)
                    && let Some(session) = new
                {
                    let was_active = self
                        .state
                        .session
                        .as_ref()
                        .map(|s| s.status == SessionStatus::Active)
                        .unwrap_or(false);
                    if was_active && session.status == SessionStatus::Completed {
                        info!("[sync] session {} completed", session.id);
                        self.state.celebrate = true;
                    }
                    self.state.session = Some(session);
                }
            }
        }
    }

    /// Re-fetch one task enriched with its catalog entry and assignee
    /// display info, then merge it. A row that vanished between the event
    /// and the fetch is treated as deleted.
    async fn refresh_task(&mut self, task_id: Uuid) {
        match self.store.get_board_task(task_id).await {
            Ok(Some(enriched)) => {
                self.ensure_assignee_known(&enriched).await;
                self.state.merge_task(enriched);
            }
            Ok(None) => self.state.remove_task(task_id),
            Err(e) => {
                warn!("[sync] failed to refresh task {}: {}", task_id, e);
            }
        }
    }

    /// Make sure the assignee of a task is present in the local participant
    /// set, fetching from the store when the roster event has not arrived
    /// yet (cross-channel ordering is not guaranteed).
    async fn ensure_assignee_known(&mut self, task: &BoardTask) {
        let Some(identity) = task.task.assignee() else {
            return;
        };
        if self.state.participant_for(&identity).is_some() {
            return;
        }
        match self
            .store
            .find_participant(self.session_id, identity.clone())
            .await
        {
            Ok(Some(participant)) => self.state.merge_participant(participant),
            Ok(None) => {}
            Err(e) => {
                warn!(
                    "[sync] failed to resolve assignee {} for task {}: {}",
                    identity.key(),
                    task.task.id,
                    e
                );
            }
        }
    }

    /// Whether a just-completed session celebration is pending; reading it
    /// clears the flag.
    pub fn take_celebration(&mut self) -> bool {
        std::mem::take(&mut self.state.celebrate)
    }
}
