//! Admin live feed.
//!
//! Moderation events fan out through a `tokio::sync::broadcast` channel to
//! every connected staff dashboard (`GET /admin/live`, WebSocket).
//! Publishing never fails the caller: with no subscribers, or a subscriber
//! that fell behind, events are simply dropped.
//!
//! # Protocol
//!
//! Server → client:
//! ```json
//! {"type": "event", "event": {"kind": "flag_created", "flagId": "...", ...}}
//! ```
//!
//! Client → server: `{"type": "ping"}` (logged; any other text is ignored).

use crate::auth::RequireStaff;
use arena_core::moderation::{FlagReason, FlagSeverity, FlagStatus};
use arena_core::types::{FlagId, PostId};
use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use futures::{SinkExt, stream::StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Default channel capacity.
const DEFAULT_CAPACITY: usize = 256;

/// Something staff dashboards want to see immediately.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LiveEvent {
    /// A member flagged a post.
    #[serde(rename_all = "camelCase")]
    FlagCreated {
        /// New flag
        flag_id: FlagId,
        /// Flagged post
        post_id: PostId,
        /// Reason given
        reason: FlagReason,
        /// Derived severity
        severity: FlagSeverity,
        /// Open flags on the post after this one
        flag_count: u32,
    },
    /// A moderator resolved or dismissed a flag.
    #[serde(rename_all = "camelCase")]
    FlagClosed {
        /// Closed flag
        flag_id: FlagId,
        /// Its post
        post_id: PostId,
        /// Resulting status
        status: FlagStatus,
        /// Open flags left on the post
        flag_count: u32,
        /// Whether the post still counts as flagged
        is_flagged: bool,
    },
}

/// Frames on the socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WsMessage<E> {
    /// A live event
    Event {
        /// Payload
        event: E,
    },
    /// Keep-alive from the client
    Ping,
    /// Keep-alive answer
    Pong,
}

/// Broadcast handle. Clones share the channel.
#[derive(Debug, Clone)]
pub struct LiveFeed {
    sender: broadcast::Sender<LiveEvent>,
}

impl Default for LiveFeed {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl LiveFeed {
    /// Feed buffering up to `capacity` events per subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Sends `event` to every current subscriber.
    pub fn publish(&self, event: LiveEvent) {
        match self.sender.send(event) {
            Ok(receivers) => debug!(receivers, "Live event published"),
            Err(_) => debug!("Live event dropped, no dashboards connected"),
        }
    }

    /// New subscription, starting from the next event.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<LiveEvent> {
        self.sender.subscribe()
    }
}

/// WebSocket upgrade for staff dashboards.
#[allow(clippy::unused_async)]
pub async fn live_feed(
    ws: WebSocketUpgrade,
    staff: RequireStaff,
    State(feed): State<LiveFeed>,
) -> Response {
    info!(user_id = %staff.user().id, "Live feed connection requested");
    ws.on_upgrade(move |socket| handle_socket(socket, feed))
}

async fn handle_socket(socket: WebSocket, feed: LiveFeed) {
    let (mut sender, mut receiver) = socket.split();
    let mut events = feed.subscribe();

    let mut send_task = tokio::spawn(async move {
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Live feed subscriber lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };
            let text = match serde_json::to_string(&WsMessage::Event { event }) {
                Ok(text) => text,
                Err(e) => {
                    warn!(error = %e, "Failed to serialize live event");
                    continue;
                }
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
        debug!("Live feed send task terminated");
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    match serde_json::from_str::<WsMessage<serde_json::Value>>(&text) {
                        Ok(WsMessage::Ping) => debug!("Received ping from dashboard"),
                        Ok(_) | Err(_) => debug!("Ignoring dashboard message"),
                    }
                }
                Message::Close(_) => break,
                Message::Binary(_) | Message::Ping(_) | Message::Pong(_) => {}
            }
        }
        debug!("Live feed receive task terminated");
    });

    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    }
    info!("Live feed connection closed");
}
