//! "Currently viewing" markers for task detail views.
//!
//! Opening a detail view upserts a viewer row for (task, participant);
//! closing it deletes the row. Both are best-effort side effects of
//! viewing: failures are logged and never block the board. Actors without
//! a participant row (a failed join) simply cast no marker.

use tracing::warn;
use uuid::Uuid;

use super::sync::SessionSync;

impl SessionSync {
    /// Record that the current actor opened a task's detail view.
    /// Repeat opens refresh the marker instead of duplicating it.
    pub async fn open_task_view(&mut self, task_id: Uuid) {
        let Some(participant_id) = self.participant.as_ref().map(|p| p.id) else {
            return;
        };
        match self.store.upsert_viewer(task_id, participant_id).await {
            Ok(viewer) => self.state.merge_viewer(viewer),
            Err(e) => {
                warn!("[presence] failed to record viewer for task {}: {}", task_id, e);
            }
        }
    }

    /// Remove the current actor's marker for a task; called on close and on
    /// view teardown. Deleting an absent marker is a no-op.
    pub async fn close_task_view(&mut self, task_id: Uuid) {
        let Some(participant_id) = self.participant.as_ref().map(|p| p.id) else {
            return;
        };
        if let Err(e) = self.store.delete_viewer(task_id, participant_id).await {
            warn!("[presence] failed to clear viewer for task {}: {}", task_id, e);
        }
        self.state
            .viewers
            .retain(|v| !(v.session_task_id == task_id && v.participant_id == participant_id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::bootstrap::{BootstrapOutcome, bootstrap_session};
    use crate::board::testing::{anon, auth, seed_store};

    async fn connected(titles: &[&str]) -> (SessionSync, SessionSync) {
        let (store, ward, _schedule) = seed_store(titles).await;
        let session = match bootstrap_session(&store, ward.id, None, &auth()).await.unwrap() {
            BootstrapOutcome::Ready { session, .. } => session,
            other => panic!("Expected ready, got {:?}", other),
        };
        let a = SessionSync::connect(store.clone(), session.id, anon("opener"))
            .await
            .unwrap();
        let b = SessionSync::connect(store, session.id, anon("observer"))
            .await
            .unwrap();
        (a, b)
    }

    #[tokio::test]
    async fn test_open_close_round_trip() {
        let (mut a, _b) = connected(&["Vacuum chapel"]).await;
        let task_id = a.state.tasks[0].task.id;

        a.open_task_view(task_id).await;
        assert_eq!(a.state.viewers_of_task(task_id).len(), 1);

        a.close_task_view(task_id).await;
        assert!(a.state.viewers_of_task(task_id).is_empty());
    }

    #[tokio::test]
    async fn test_repeat_open_is_idempotent() {
        let (mut a, _b) = connected(&["Vacuum chapel"]).await;
        let task_id = a.state.tasks[0].task.id;

        a.open_task_view(task_id).await;
        a.open_task_view(task_id).await;
        a.drain_pending().await.unwrap();

        assert_eq!(a.state.viewers.len(), 1);
        assert_eq!(a.state.viewers_of_task(task_id).len(), 1);
    }

    #[tokio::test]
    async fn test_presence_propagates_to_other_viewers() {
        let (mut a, mut b) = connected(&["Vacuum chapel"]).await;
        let task_id = a.state.tasks[0].task.id;

        a.open_task_view(task_id).await;
        b.drain_pending().await.unwrap();
        let shown = b.state.viewers_of_task(task_id);
        assert_eq!(shown.len(), 1);
        assert_eq!(shown[0].id, a.participant().unwrap().id);

        a.close_task_view(task_id).await;
        b.drain_pending().await.unwrap();
        assert!(b.state.viewers_of_task(task_id).is_empty());
    }

    #[tokio::test]
    async fn test_degraded_actor_casts_no_marker() {
        let (store, ward, _schedule) = seed_store(&["Vacuum chapel"]).await;
        let session = match bootstrap_session(&store, ward.id, None, &auth()).await.unwrap() {
            BootstrapOutcome::Ready { session, .. } => session,
            other => panic!("Expected ready, got {:?}", other),
        };
        let mut sync = SessionSync::connect(store, session.id, anon("ghost"))
            .await
            .unwrap();
        let task_id = sync.state.tasks[0].task.id;

        // Simulate a failed join: no participant row.
        sync.participant = None;
        sync.open_task_view(task_id).await;
        assert!(sync.state.viewers_of_task(task_id).is_empty());
    }

    #[tokio::test]
    async fn test_close_without_open_is_noop() {
        let (mut a, _b) = connected(&["Vacuum chapel"]).await;
        let task_id = a.state.tasks[0].task.id;
        a.close_task_view(task_id).await;
        assert!(a.state.viewers_of_task(task_id).is_empty());
    }
}
