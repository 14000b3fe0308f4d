//! Broadcast/presence channel abstraction.
//!
//! A channel is a named pub/sub topic (one per note) that carries
//! fire-and-forget broadcasts plus a presence primitive reporting which
//! clients are subscribed and what metadata they announced. Adapters live in
//! [`local`] (in-process hub) and [`crate::realtime`] (Supabase Realtime).

pub mod local;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::models::{PeerId, PresenceMeta};

pub use local::{LocalChannel, LocalHub};

/// Broadcast event carrying a full title/content replacement.
pub const CONTENT_CHANGE_EVENT: &str = "content_change";
/// Broadcast event carrying a caret offset.
pub const CURSOR_MOVE_EVENT: &str = "cursor_move";

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Channel is not subscribed")]
    NotSubscribed,
    #[error("Channel closed: {0}")]
    Closed(String),
    #[error("Channel join rejected: {0}")]
    Rejected(String),
    #[error("Realtime protocol error: {0}")]
    Protocol(String),
    #[error("Realtime transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("Invalid channel payload: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Outcome of the subscribe handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    /// Handshake still running; completion arrives later as a channel event.
    Connecting,
    Connected,
    Failed,
}

/// Full replacement of a note's title and content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeMessage {
    #[serde(rename = "user_id")]
    pub sender_id: PeerId,
    pub title: String,
    pub content: String,
}

/// Caret position of the sender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorMessage {
    #[serde(rename = "user_id")]
    pub sender_id: PeerId,
    #[serde(rename = "cursor_position")]
    pub offset: usize,
}

/// Messages exchanged between editors of the same note.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BroadcastMessage {
    Change(ChangeMessage),
    Cursor(CursorMessage),
}

impl BroadcastMessage {
    /// Broadcast event name on the wire.
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::Change(_) => CONTENT_CHANGE_EVENT,
            Self::Cursor(_) => CURSOR_MOVE_EVENT,
        }
    }

    #[must_use]
    pub const fn sender_id(&self) -> &PeerId {
        match self {
            Self::Change(message) => &message.sender_id,
            Self::Cursor(message) => &message.sender_id,
        }
    }

    pub fn to_payload(&self) -> serde_json::Result<Value> {
        match self {
            Self::Change(message) => serde_json::to_value(message),
            Self::Cursor(message) => serde_json::to_value(message),
        }
    }

    /// Decode a broadcast by event name.
    ///
    /// Returns `Ok(None)` for events this client does not handle.
    pub fn decode(event: &str, payload: Value) -> Result<Option<Self>, ChannelError> {
        match event {
            CONTENT_CHANGE_EVENT => Ok(Some(Self::Change(serde_json::from_value(payload)?))),
            CURSOR_MOVE_EVENT => Ok(Some(Self::Cursor(serde_json::from_value(payload)?))),
            _ => Ok(None),
        }
    }
}

/// Presence state keyed by client id; the first announced meta per key.
pub type PresenceSnapshot = BTreeMap<PeerId, PresenceMeta>;

/// Events delivered by a subscribed channel, in transport order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Broadcast(BroadcastMessage),
    PresenceSync(PresenceSnapshot),
    PresenceJoin { peer_id: PeerId, meta: PresenceMeta },
    PresenceLeave { peer_id: PeerId },
    /// Late completion of a handshake that returned `Connecting`.
    Subscription(SubscriptionState),
    /// The transport went away; no further events follow.
    Closed { reason: String },
}

/// One client's membership in a note topic.
#[async_trait]
pub trait RealtimeChannel: Send {
    /// Topic this channel is joined to.
    fn topic(&self) -> &str;

    /// Run the subscribe handshake.
    async fn subscribe(&mut self) -> Result<SubscriptionState, ChannelError>;

    /// Announce local presence metadata.
    async fn track(&mut self, meta: &PresenceMeta) -> Result<(), ChannelError>;

    /// Fire-and-forget send to every other subscriber.
    fn broadcast(&self, message: &BroadcastMessage) -> Result<(), ChannelError>;

    /// Next event, or `None` once the channel is gone.
    ///
    /// Must be cancel-safe: dropping the future loses no event.
    async fn next_event(&mut self) -> Option<ChannelEvent>;

    /// Release membership.
    async fn unsubscribe(&mut self) -> Result<(), ChannelError>;
}
