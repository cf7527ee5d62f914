//! Integration tests for wardwork
//!
//! These tests verify the CLI surface and drive full board scenarios
//! through the public library API.

use assert_cmd::Command;
use predicates::prelude::*;
use std::sync::Arc;
use tempfile::TempDir;

use wardwork::board::api::AppState;
use wardwork::board::db::{BoardDb, BoardStore, DbHandle, NewWardTask};
use wardwork::board::feed::FeedBus;
use wardwork::board::models::{Identity, TaskPriority, TaskStatus};
use wardwork::board::server::build_router;
use wardwork::board::sync::SessionSync;
use wardwork::board::bootstrap::{BootstrapOutcome, bootstrap_session};
use wardwork::errors::StoreError;

/// Helper to create a wardwork Command
fn wardwork() -> Command {
    Command::cargo_bin("wardwork").unwrap()
}

// =============================================================================
// Basic CLI Tests
// =============================================================================

mod cli_basics {
    use super::*;

    #[test]
    fn test_wardwork_help() {
        wardwork().arg("--help").assert().success();
    }

    #[test]
    fn test_wardwork_version() {
        wardwork().arg("--version").assert().success();
    }

    #[test]
    fn test_init_db_creates_database() {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("data/board.db");

        wardwork()
            .arg("init-db")
            .arg("--db-path")
            .arg(&db_path)
            .assert()
            .success()
            .stdout(predicate::str::contains("Board database initialized"));

        assert!(db_path.exists());
    }

    #[test]
    fn test_init_db_is_rerunnable() {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("board.db");

        for _ in 0..2 {
            wardwork()
                .arg("init-db")
                .arg("--db-path")
                .arg(&db_path)
                .assert()
                .success();
        }
    }

    #[test]
    fn test_unknown_subcommand_fails() {
        wardwork().arg("frobnicate").assert().failure();
    }
}

// =============================================================================
// Board scenarios (library API)
// =============================================================================

mod board_scenarios {
    use super::*;

    fn anon(tag: &str) -> Identity {
        Identity::Anonymous {
            temp_user_id: format!("anon_{}", tag),
        }
    }

    async fn store_with_catalog(titles: &[(&str, i64)]) -> (BoardStore, uuid::Uuid) {
        let db = BoardDb::new_in_memory().unwrap();
        let ward = db.create_ward("Maple 1st Ward").unwrap();
        db.create_schedule(ward.id, "Saturday cleaning", "2099-01-04")
            .unwrap();
        for (title, points) in titles {
            db.create_ward_task(
                ward.id,
                NewWardTask {
                    title: title.to_string(),
                    subtitle: None,
                    instructions: None,
                    equipment: None,
                    safety_notes: None,
                    color: None,
                    priority: TaskPriority::Normal,
                    kid_friendly: false,
                    points: *points,
                    active: true,
                },
            )
            .unwrap();
        }
        let store = BoardStore::new(DbHandle::new(db), FeedBus::new());
        (store, ward.id)
    }

    async fn materialized_session(store: &BoardStore, ward_id: uuid::Uuid) -> uuid::Uuid {
        let creator = Identity::Authenticated {
            user_id: uuid::Uuid::new_v4(),
        };
        match bootstrap_session(store, ward_id, None, &creator).await.unwrap() {
            BootstrapOutcome::Ready { session, .. } => session.id,
            other => panic!("Expected a session, got {:?}", other),
        }
    }

    /// Ward with 5 active tasks, no session yet: bootstrapping creates one
    /// session and 5 todo tasks.
    #[tokio::test]
    async fn test_scenario_bootstrap_materializes_board() {
        let (store, ward_id) = store_with_catalog(&[
            ("Vacuum chapel", 10),
            ("Clean glass doors", 5),
            ("Wipe chairs", 5),
            ("Empty trash", 5),
            ("Mop cultural hall", 15),
        ])
        .await;

        let session_id = materialized_session(&store, ward_id).await;
        let view = store.board_view(session_id).await.unwrap();
        assert_eq!(view.tasks.len(), 5);
        assert!(view
            .tasks
            .iter()
            .all(|t| t.task.status == TaskStatus::Todo && t.task.assignee().is_none()));
    }

    /// Two actors race for the same task: one winner, the loser observes a
    /// conflict, and both views converge on the winner's claim.
    #[tokio::test]
    async fn test_scenario_claim_race_converges() {
        let (store, ward_id) = store_with_catalog(&[("Vacuum chapel", 10)]).await;
        let session_id = materialized_session(&store, ward_id).await;

        let mut alice = SessionSync::connect(store.clone(), session_id, anon("alice"))
            .await
            .unwrap();
        let mut bob = SessionSync::connect(store.clone(), session_id, anon("bob"))
            .await
            .unwrap();
        let task_id = alice.state.tasks[0].task.id;

        alice.claim_task(task_id).await.unwrap();
        let err = bob.claim_task(task_id).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        bob.drain_pending().await.unwrap();
        alice.drain_pending().await.unwrap();
        let a_task = &alice.state.task(task_id).unwrap().task;
        let b_task = &bob.state.task(task_id).unwrap().task;
        assert_eq!(a_task.assignee(), b_task.assignee());
        assert_eq!(a_task.assignee(), Some(alice.identity().clone()));
    }

    /// Claim → complete awards the catalog's point value; session completion
    /// raises the celebration signal in every connected view.
    #[tokio::test]
    async fn test_scenario_complete_and_celebrate() {
        let (store, ward_id) = store_with_catalog(&[("Mop cultural hall", 15)]).await;
        let session_id = materialized_session(&store, ward_id).await;

        let mut worker = SessionSync::connect(store.clone(), session_id, anon("worker"))
            .await
            .unwrap();
        let task_id = worker.state.tasks[0].task.id;

        worker.claim_task(task_id).await.unwrap();
        let done = worker.complete_task(task_id).await.unwrap();
        assert_eq!(done.task.points_awarded, Some(15));

        store.complete_session(session_id).await.unwrap();
        loop {
            assert!(worker.process_next().await.unwrap());
            if worker.take_celebration() {
                break;
            }
        }
    }

    /// A guest's pseudo identity is stable across visits: the second join
    /// reuses the participant row.
    #[tokio::test]
    async fn test_scenario_guest_identity_reused() {
        use wardwork::board::join::join_session;

        let (store, ward_id) = store_with_catalog(&[("Vacuum chapel", 10)]).await;
        let session_id = materialized_session(&store, ward_id).await;
        let guest = anon("returning");

        let first = join_session(&store, session_id, &guest).await.unwrap();
        let second = join_session(&store, session_id, &guest).await.unwrap();
        assert_eq!(first.id, second.id);

        let view = store.board_view(session_id).await.unwrap();
        assert_eq!(view.participants.len(), 1);
    }

    /// Opening and closing a detail view leaves no viewer rows behind, and
    /// other connected boards observe both transitions.
    #[tokio::test]
    async fn test_scenario_presence_round_trip() {
        let (store, ward_id) = store_with_catalog(&[("Vacuum chapel", 10)]).await;
        let session_id = materialized_session(&store, ward_id).await;

        let mut guest = SessionSync::connect(store.clone(), session_id, anon("guest"))
            .await
            .unwrap();
        let mut other = SessionSync::connect(store.clone(), session_id, anon("other"))
            .await
            .unwrap();
        let task_id = guest.state.tasks[0].task.id;

        guest.open_task_view(task_id).await;
        other.drain_pending().await.unwrap();
        assert_eq!(other.state.viewers_of_task(task_id).len(), 1);

        guest.close_task_view(task_id).await;
        other.drain_pending().await.unwrap();
        assert!(other.state.viewers_of_task(task_id).is_empty());
    }
}

// =============================================================================
// HTTP end-to-end
// =============================================================================

mod http_flow {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn test_app() -> axum::Router {
        let db = BoardDb::new_in_memory().unwrap();
        let store = BoardStore::new(DbHandle::new(db), FeedBus::new());
        build_router(Arc::new(AppState { store }))
    }

    async fn post_json(
        app: &axum::Router,
        uri: &str,
        body: serde_json::Value,
    ) -> (StatusCode, serde_json::Value) {
        let req = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn test_full_board_lifecycle_over_http() {
        let app = test_app();

        let (status, ward) =
            post_json(&app, "/api/wards", serde_json::json!({"name": "Maple 1st Ward"})).await;
        assert_eq!(status, StatusCode::CREATED);
        let ward_id = ward["id"].as_str().unwrap();

        for title in ["Vacuum chapel", "Wipe chairs"] {
            let (status, _) = post_json(
                &app,
                &format!("/api/wards/{}/tasks", ward_id),
                serde_json::json!({"title": title, "points": 10}),
            )
            .await;
            assert_eq!(status, StatusCode::CREATED);
        }
        let (status, _) = post_json(
            &app,
            &format!("/api/wards/{}/schedules", ward_id),
            serde_json::json!({"name": "Saturday cleaning", "session_date": "2099-01-04"}),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let creator = serde_json::json!({"kind": "authenticated", "user_id": uuid::Uuid::new_v4()});
        let (status, body) = post_json(
            &app,
            &format!("/api/wards/{}/bootstrap", ward_id),
            serde_json::json!({"identity": creator}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ready");
        assert_eq!(body["created"], true);
        let task_id = body["board"]["tasks"][0]["id"].as_str().unwrap().to_string();

        // Bootstrapping again reuses the same session.
        let (_, again) = post_json(
            &app,
            &format!("/api/wards/{}/bootstrap", ward_id),
            serde_json::json!({"identity": {"kind": "anonymous", "temp_user_id": "anon_guest001"}}),
        )
        .await;
        assert_eq!(again["created"], false);
        assert_eq!(
            again["board"]["session"]["id"],
            body["board"]["session"]["id"]
        );

        // Claim, then complete, through the conditional endpoints.
        let worker = serde_json::json!({"identity": {"kind": "anonymous", "temp_user_id": "anon_worker01"}});
        let (status, task) =
            post_json(&app, &format!("/api/tasks/{}/assign", task_id), worker.clone()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(task["status"], "doing");

        let (status, task) =
            post_json(&app, &format!("/api/tasks/{}/complete", task_id), worker).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(task["status"], "done");
        assert_eq!(task["points_awarded"], 10);
    }
}
