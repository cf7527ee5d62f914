//! Session bootstrap: resolve which board a visitor lands on, materializing
//! it from the ward's schedule on first visit.

use rand::Rng;
use tracing::info;
use uuid::Uuid;

use crate::errors::{StoreError, StoreResult};

use super::db::{BoardStore, today_iso};
use super::models::{CleaningSession, Identity};

/// Share codes skip easily-confused characters (0/O, 1/I/L).
const SHARE_CODE_CHARS: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";
const SHARE_CODE_LEN: usize = 6;

pub fn generate_share_code() -> String {
    let mut rng = rand::thread_rng();
    (0..SHARE_CODE_LEN)
        .map(|_| SHARE_CODE_CHARS[rng.gen_range(0..SHARE_CODE_CHARS.len())] as char)
        .collect()
}

/// Result of a bootstrap attempt.
#[derive(Debug, Clone)]
pub enum BootstrapOutcome {
    /// A session is ready; `created` marks whether this call materialized it.
    Ready {
        session: CleaningSession,
        created: bool,
    },
    /// No upcoming schedule entry for the ward. An empty state, not an error.
    NoUpcoming,
}

/// Find or create the session a visitor should land on.
///
/// An explicit `session_id` wins when it resolves; otherwise the earliest
/// upcoming schedule entry is materialized (or reused if a session already
/// exists for it). Creation requires an authenticated actor; two concurrent
/// creations for one schedule converge on a single session via the store's
/// schedule-keyed upsert.
pub async fn bootstrap_session(
    store: &BoardStore,
    ward_id: Uuid,
    session_id: Option<Uuid>,
    identity: &Identity,
) -> StoreResult<BootstrapOutcome> {
    if let Some(id) = session_id
        && let Some(session) = store.get_session(id).await?
    {
        return Ok(BootstrapOutcome::Ready {
            session,
            created: false,
        });
    }

    let schedule = match store.next_schedule(ward_id, today_iso()).await? {
        Some(schedule) => schedule,
        None => return Ok(BootstrapOutcome::NoUpcoming),
    };

    if let Some(session) = store.find_session_by_schedule(schedule.id).await? {
        return Ok(BootstrapOutcome::Ready {
            session,
            created: false,
        });
    }

    let created_by = match identity {
        Identity::Authenticated { user_id } => *user_id,
        Identity::Anonymous { .. } => {
            return Err(StoreError::NotAuthenticated(
                "sign in to start a cleaning session".into(),
            ));
        }
    };

    let (session, created) = store
        .materialize_session(schedule, generate_share_code(), created_by)
        .await?;
    if created {
        info!(
            "[bootstrap] materialized session {} ({}) for ward {}",
            session.id, session.name, ward_id
        );
    }
    Ok(BootstrapOutcome::Ready { session, created })
}
