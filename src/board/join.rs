//! Participant registration: put the current actor on the session roster,
//! reusing their row across visits.

use rand::Rng;
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::StoreResult;

use super::db::BoardStore;
use super::models::{Identity, SessionParticipant};

/// Generate the client-persisted pseudo id for an anonymous actor.
/// The client stores it per session and replays it on every visit.
pub fn new_temp_user_id() -> String {
    const CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();
    let suffix: String = (0..8)
        .map(|_| CHARS[rng.gen_range(0..CHARS.len())] as char)
        .collect();
    format!("anon_{}", suffix)
}

fn guest_display_name() -> String {
    format!("Guest {}", rand::thread_rng().gen_range(1000..10000))
}

/// Register `identity` as a participant of the session, idempotently:
/// an existing row is heartbeat-refreshed, a missing one inserted.
///
/// Transient store failures are retried once; the retry decision keys off
/// the error classification, never off message text.
pub async fn join_session(
    store: &BoardStore,
    session_id: Uuid,
    identity: &Identity,
) -> StoreResult<SessionParticipant> {
    match try_join(store, session_id, identity).await {
        Err(e) if e.is_transient() => {
            warn!("[join] transient failure, retrying once: {}", e);
            try_join(store, session_id, identity).await
        }
        other => other,
    }
}

/// Best-effort variant for the viewing path: a failed join must never block
/// the board, so errors are logged and the actor continues unregistered.
pub async fn join_session_best_effort(
    store: &BoardStore,
    session_id: Uuid,
    identity: &Identity,
) -> Option<SessionParticipant> {
    match join_session(store, session_id, identity).await {
        Ok(participant) => Some(participant),
        Err(e) => {
            warn!(
                "[join] continuing without participant for session {}: {}",
                session_id, e
            );
            None
        }
    }
}

async fn try_join(
    store: &BoardStore,
    session_id: Uuid,
    identity: &Identity,
) -> StoreResult<SessionParticipant> {
    if let Some(existing) = store.find_participant(session_id, identity.clone()).await? {
        return store.heartbeat_participant(existing.id).await;
    }

    let display_name = match identity {
        Identity::Authenticated { user_id } => store
            .get_profile(*user_id)
            .await?
            .map(|p| p.display_name)
            .unwrap_or_else(|| "Member".to_string()),
        Identity::Anonymous { .. } => guest_display_name(),
    };

    let participant = store
        .insert_participant(session_id, identity.clone(), display_name, None)
        .await?;
    info!(
        "[join] {} joined session {} as {}",
        identity.key(),
        session_id,
        participant.display_name
    );
    Ok(participant)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::bootstrap::{BootstrapOutcome, bootstrap_session};
    use crate::board::testing::{anon, auth, seed_store};

    async fn seeded_session() -> (super::super::db::BoardStore, Uuid) {
        let (store, ward, _schedule) = seed_store(&["Vacuum chapel"]).await;
        let session = match bootstrap_session(&store, ward.id, None, &auth()).await.unwrap() {
            BootstrapOutcome::Ready { session, .. } => session,
            other => panic!("Expected ready, got {:?}", other),
        };
        (store, session.id)
    }

    #[test]
    fn test_temp_user_id_shape() {
        let id = new_temp_user_id();
        assert!(id.starts_with("anon_"));
        assert_eq!(id.len(), "anon_".len() + 8);
        // Two generations are (overwhelmingly) distinct.
        assert_ne!(id, new_temp_user_id());
    }

    #[tokio::test]
    async fn test_anonymous_join_creates_guest_row() {
        let (store, session_id) = seeded_session().await;

        let participant = join_session(&store, session_id, &anon("guest1"))
            .await
            .unwrap();
        assert!(participant.display_name.starts_with("Guest "));
        assert!(!participant.is_authenticated);
        assert_eq!(participant.temp_user_id.as_deref(), Some("anon_guest1"));
    }

    #[tokio::test]
    async fn test_join_is_idempotent_per_identity() {
        let (store, session_id) = seeded_session().await;
        let identity = anon("guest1");

        let first = join_session(&store, session_id, &identity).await.unwrap();
        let second = join_session(&store, session_id, &identity).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.display_name, second.display_name);
        assert!(second.last_active_at >= first.last_active_at);

        let view = store.board_view(session_id).await.unwrap();
        // creator is not auto-joined; only the guest row exists
        assert_eq!(view.participants.len(), 1);
    }

    #[tokio::test]
    async fn test_authenticated_join_uses_profile_name() {
        let (store, session_id) = seeded_session().await;
        let identity = auth();
        let user_id = identity.user_id().unwrap();
        store
            .upsert_profile(user_id, "Brother Call".to_string(), None)
            .await
            .unwrap();

        let participant = join_session(&store, session_id, &identity).await.unwrap();
        assert_eq!(participant.display_name, "Brother Call");
        assert!(participant.is_authenticated);
        assert_eq!(participant.user_id, Some(user_id));
    }

    #[tokio::test]
    async fn test_authenticated_join_without_profile_falls_back() {
        let (store, session_id) = seeded_session().await;

        let participant = join_session(&store, session_id, &auth()).await.unwrap();
        assert_eq!(participant.display_name, "Member");
    }

    #[tokio::test]
    async fn test_distinct_identities_get_distinct_rows() {
        let (store, session_id) = seeded_session().await;

        join_session(&store, session_id, &anon("guest1")).await.unwrap();
        join_session(&store, session_id, &anon("guest2")).await.unwrap();
        join_session(&store, session_id, &auth()).await.unwrap();

        let view = store.board_view(session_id).await.unwrap();
        assert_eq!(view.participants.len(), 3);
    }

    #[tokio::test]
    async fn test_best_effort_join_swallows_failure() {
        let (store, _session_id) = seeded_session().await;

        // A session that does not exist: the insert will fail on the
        // foreign key, and the best-effort path must absorb it.
        let result = join_session_best_effort(&store, Uuid::new_v4(), &anon("guest1")).await;
        assert!(result.is_none());
    }
}
