//! Cleaning-session task board back-end.
//!
//! ## Overview
//!
//! A ward's task catalog is materialized into per-session boards: volunteers
//! open the board for the next scheduled cleaning, claim tasks, and mark
//! them done, with every change fanned out live to all connected clients
//! over a WebSocket.
//!
//! ## Module Map
//!
//! ```text
//! ┌──────────┐   HTTP   ┌──────────────────────────────────────────────────┐
//! │  Client  │ ───────> │  server.rs  (axum Router, ServerConfig)          │
//! │          │ <─────── │    ├─ api.rs  (route handlers, AppState)         │
//! └──────────┘ WebSocket│    └─ ws.rs   (per-session feed fan-out)         │
//!                       │         │                                        │
//!                       │         v                                        │
//!                       │  bootstrap.rs / join.rs / actions.rs /           │
//!                       │  presence.rs   (board operations)                │
//!                       │         │                                        │
//!                       │         v                                        │
//!                       │  db.rs  (BoardDb + BoardStore: SQLite access,    │
//!                       │          conditional claim arbitration,          │
//!                       │          one feed event per committed mutation)  │
//!                       │         │                                        │
//!                       │         v                                        │
//!                       │  feed.rs  (three broadcast channels per session) │
//!                       └──────────────────────────────────────────────────┘
//! ```
//!
//! ## Supporting Modules
//!
//! | Module      | Responsibility                                          |
//! |-------------|---------------------------------------------------------|
//! | `models`    | Row types, status enums, the `Identity` tagged variant  |
//! | `sync`      | `SessionSync`: in-memory board state converged from the |
//! |             | feed; merge-by-id, enrichment, resync-on-lapse          |
//!
//! ## Typical flow (volunteer claims a task)
//!
//! 1. `POST /api/wards/:id/bootstrap` finds or materializes the session for
//!    the next schedule entry (catalog copied into `todo` tasks).
//! 2. `POST /api/sessions/:id/join` puts the actor on the roster
//!    (idempotent; a failed join degrades instead of blocking).
//! 3. `POST /api/tasks/:id/assign` performs the conditional claim — the one
//!    place the todo→doing race is arbitrated; the loser receives 409.
//! 4. The store publishes the row change; every `/ws?session=` client and
//!    every `SessionSync` instance merges the update into its local state.

pub mod actions;
pub mod api;
pub mod bootstrap;
pub mod db;
pub mod feed;
pub mod join;
pub mod models;
pub mod presence;
pub mod server;
pub mod sync;
pub mod ws;

#[cfg(test)]
pub(crate) mod testing {
    //! Shared seeding helpers for board tests.

    use uuid::Uuid;

    use super::db::{BoardDb, BoardStore, DbHandle, NewWardTask};
    use super::feed::FeedBus;
    use super::models::{CleaningSchedule, Identity, TaskPriority, Ward};

    pub fn anon(tag: &str) -> Identity {
        Identity::Anonymous {
            temp_user_id: format!("anon_{}", tag),
        }
    }

    pub fn auth() -> Identity {
        Identity::Authenticated {
            user_id: Uuid::new_v4(),
        }
    }

    /// A store over an in-memory database with one ward, one upcoming
    /// schedule entry, and a catalog task (10 points each) per title.
    pub async fn seed_store(task_titles: &[&str]) -> (BoardStore, Ward, CleaningSchedule) {
        seed_store_with_capacity(task_titles, 256).await
    }

    pub async fn seed_store_with_capacity(
        task_titles: &[&str],
        feed_capacity: usize,
    ) -> (BoardStore, Ward, CleaningSchedule) {
        let db = BoardDb::new_in_memory().unwrap();
        let ward = db.create_ward("Maple 1st Ward").unwrap();
        let schedule = db
            .create_schedule(ward.id, "Saturday cleaning", "2099-01-04")
            .unwrap();
        for title in task_titles {
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
                    points: 10,
                    active: true,
                },
            )
            .unwrap();
        }
        let store = BoardStore::new(
            DbHandle::new(db),
            FeedBus::with_capacity(feed_capacity),
        );
        (store, ward, schedule)
    }
}
