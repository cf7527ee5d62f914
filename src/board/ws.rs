//! WebSocket fan-out of the change feed.
//!
//! Clients connect to `/ws?session=<id>` and receive every change event for
//! that session as a JSON frame. A feed lapse is forwarded as an explicit
//! `lapse` frame — the client must re-fetch the board rather than assume it
//! saw every event.

use axum::{
    body::Bytes,
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt, stream::SplitSink, stream::SplitStream};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

use super::api::SharedState;
use super::feed::{ChangeEvent, FeedItem, SubscriptionHandle};

/// How often to send WebSocket Ping frames.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// How long to wait for a Pong response before considering the connection dead.
const PONG_TIMEOUT: Duration = Duration::from_secs(60);

/// Frames sent to connected clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsFrame {
    /// One row-level change.
    Change { event: ChangeEvent },
    /// Events were dropped; re-fetch full board state.
    Lapse,
}

#[derive(Deserialize)]
pub struct WsParams {
    pub session: Uuid,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    State(state): State<SharedState>,
) -> impl IntoResponse {
    // Reject unknown sessions before upgrading.
    match state.store.get_session(params.session).await {
        Ok(Some(_)) => {}
        Ok(None) => return (StatusCode::NOT_FOUND, "session not found").into_response(),
        Err(_) => {
            return (StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response();
        }
    }
    let sub = state.store.feed().subscribe(params.session);
    ws.on_upgrade(move |socket| handle_socket(socket, sub))
        .into_response()
}

async fn handle_socket(socket: WebSocket, sub: SubscriptionHandle) {
    let session_id = sub.session_id();
    let (sender, receiver) = socket.split();
    debug!("[ws] client subscribed to session {}", session_id);
    run_socket_loop(sender, receiver, sub).await;
    debug!("[ws] client for session {} disconnected", session_id);
}

/// Core WebSocket loop with ping/pong keepalive.
///
/// Combines feed forwarding, client message receiving, and periodic
/// ping/pong health checking into a single select loop. If no Pong is
/// received within [`PONG_TIMEOUT`] after a Ping is sent, the connection
/// is considered dead and the loop exits.
async fn run_socket_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    mut sub: SubscriptionHandle,
) {
    let mut ping_interval = tokio::time::interval(PING_INTERVAL);
    // The first tick completes immediately; consume it so the first real
    // ping fires after PING_INTERVAL has elapsed.
    ping_interval.tick().await;

    let mut last_pong = Instant::now();
    let mut awaiting_pong = false;

    loop {
        tokio::select! {
            // ── Periodic ping ───────────────────────────────────────
            _ = ping_interval.tick() => {
                if awaiting_pong && last_pong.elapsed() > PONG_TIMEOUT {
                    // Connection is dead — no pong received in time
                    break;
                }
                if sender.send(Message::Ping(Bytes::new())).await.is_err() {
                    break;
                }
                awaiting_pong = true;
            }

            // ── Feed forwarding ─────────────────────────────────────
            item = sub.next() => {
                let frame = match item {
                    FeedItem::Event(event) => WsFrame::Change { event },
                    FeedItem::Lapse => WsFrame::Lapse,
                    FeedItem::Closed => break,
                };
                match serde_json::to_string(&frame) {
                    Ok(json) => {
                        if sender.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::error!("[ws] failed to serialize frame: {}", e);
                    }
                }
            }

            // ── Client messages (pong, close, etc.) ─────────────────
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Pong(_))) => {
                        last_pong = Instant::now();
                        awaiting_pong = false;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {
                        // Ignore other messages from client (Text, Binary, Ping)
                    }
                    Some(Err(_)) => break,
                }
            }
        }
    }

    // Best-effort close frame
    let _ = sender.send(Message::Close(None)).await;
}

// ── Tests ────────────────────────────────────────────────────────────
