//! Task transitions driven by the current actor: claim (`todo → doing`),
//! complete (`doing → done`), cancel (`doing → todo`). There is no way out
//! of `done`.
//!
//! Each operation applies an optimistic local update for responsiveness,
//! then issues the store call that actually arbitrates. Reconciliation
//! policy differs per operation and per failure:
//! claim rolls its optimistic fields back on any error except a claim
//! conflict (the feed echo corrects that one); complete and cancel never
//! roll back and rely on the next feed event to correct drift.

use chrono::Utc;
use tracing::warn;
use uuid::Uuid;

use crate::errors::{StoreError, StoreResult};

use super::models::{BoardTask, TaskStatus};
use super::sync::SessionSync;

impl SessionSync {
    /// Claim a task for the current actor.
    pub async fn claim_task(&mut self, task_id: Uuid) -> StoreResult<BoardTask> {
        let identity = self.identity.clone();
        {
            let Some(local) = self.state.task(task_id) else {
                return Err(StoreError::NotFound {
                    entity: "session task",
                    id: task_id.to_string(),
                });
            };
            if local.task.status != TaskStatus::Todo {
                return Err(StoreError::Conflict(
                    "task was already claimed by someone else".into(),
                ));
            }
        }

        // Optimistic: show the claim immediately.
        let (user_id, temp_user_id) = identity.columns();
        let own_name = self.participant.as_ref().map(|p| p.display_name.clone());
        let own_avatar = self.participant.as_ref().and_then(|p| p.avatar_url.clone());
        if let Some(local) = self.state.task_mut(task_id) {
            local.task.status = TaskStatus::Doing;
            local.task.assigned_to = user_id;
            local.task.assigned_to_temp_user = temp_user_id;
            local.task.assigned_at = Some(Utc::now().to_rfc3339());
            local.assignee_name = own_name;
            local.assignee_avatar = own_avatar;
        }

        match self.store.assign_task(task_id, identity).await {
            Ok(enriched) => {
                // Reconcile with the authoritative row, which may carry
                // richer assignee display info.
                self.state.merge_task(enriched.clone());
                Ok(enriched)
            }
            Err(e @ StoreError::Conflict(_)) => {
                // Someone else won the race. The losing optimistic state is
                // corrected by the winner's feed event, not reverted here.
                Err(e)
            }
            Err(e) => {
                if let Some(local) = self.state.task_mut(task_id) {
                    local.task.status = TaskStatus::Todo;
                    local.task.assigned_to = None;
                    local.task.assigned_to_temp_user = None;
                    local.task.assigned_at = None;
                    local.assignee_name = None;
                    local.assignee_avatar = None;
                }
                Err(e)
            }
        }
    }

    /// Mark a task the current actor is working on as done.
    pub async fn complete_task(&mut self, task_id: Uuid) -> StoreResult<BoardTask> {
        let identity = self.identity.clone();
        {
            let Some(local) = self.state.task(task_id) else {
                return Err(StoreError::NotFound {
                    entity: "session task",
                    id: task_id.to_string(),
                });
            };
            if local.task.status != TaskStatus::Doing || !local.task.is_assigned_to(&identity) {
                return Err(StoreError::Conflict(
                    "task is not in progress for this participant".into(),
                ));
            }
        }

        // Best-effort display info for the optimistic row: the profile
        // lookup fills it when the participant row lacks one.
        let mut own_name = self.participant.as_ref().map(|p| p.display_name.clone());
        let mut own_avatar = self.participant.as_ref().and_then(|p| p.avatar_url.clone());
        if (own_name.is_none() || own_avatar.is_none())
            && let Some(user_id) = identity.user_id()
        {
            match self.store.get_profile(user_id).await {
                Ok(Some(profile)) => {
                    own_name = own_name.or(Some(profile.display_name));
                    own_avatar = own_avatar.or(profile.avatar_url);
                }
                Ok(None) => {}
                Err(e) => warn!("[actions] profile lookup failed: {}", e),
            }
        }

        let points = self.state.task(task_id).map(|t| t.catalog.points);
        if let Some(local) = self.state.task_mut(task_id) {
            local.task.status = TaskStatus::Done;
            local.task.completed_at = Some(Utc::now().to_rfc3339());
            local.task.points_awarded = points;
            local.assignee_name = own_name;
            local.assignee_avatar = own_avatar;
        }

        match self.store.complete_task(task_id, identity).await {
            Ok(enriched) => {
                self.state.merge_task(enriched.clone());
                Ok(enriched)
            }
            // No rollback: the feed echo or the next resync corrects drift.
            Err(e) => Err(e),
        }
    }

    /// Give a claimed task back to the board.
    pub async fn cancel_task(&mut self, task_id: Uuid) -> StoreResult<BoardTask> {
        let identity = self.identity.clone();
        {
            let Some(local) = self.state.task(task_id) else {
                return Err(StoreError::NotFound {
                    entity: "session task",
                    id: task_id.to_string(),
                });
            };
            if local.task.status != TaskStatus::Doing || !local.task.is_assigned_to(&identity) {
                return Err(StoreError::Conflict(
                    "task is not in progress for this participant".into(),
                ));
            }
        }

        if let Some(local) = self.state.task_mut(task_id) {
            local.task.status = TaskStatus::Todo;
            local.task.assigned_to = None;
            local.task.assigned_to_temp_user = None;
            local.task.assigned_at = None;
            local.assignee_name = None;
            local.assignee_avatar = None;
        }

        match self.store.cancel_task(task_id, identity).await {
            Ok(enriched) => {
                self.state.merge_task(enriched.clone());
                Ok(enriched)
            }
            // No rollback on failure; drift resolves via the feed.
            Err(e) => Err(e),
        }
    }
}
