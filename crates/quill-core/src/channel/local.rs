//! In-process broadcast/presence hub.
//!
//! Mirrors the delivery rules of the hosted realtime service closely enough to
//! drive several sessions inside one process: broadcasts skip the sender,
//! presence changes reach every subscriber (the tracker included) as a
//! join/leave followed by a full sync.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{
    BroadcastMessage, ChannelError, ChannelEvent, PresenceSnapshot, RealtimeChannel,
    SubscriptionState,
};
use crate::models::{PeerId, PresenceMeta};

/// Shared hub; clone it to hand out channels on the same topics.
#[derive(Clone, Default)]
pub struct LocalHub {
    inner: Arc<HubInner>,
}

#[derive(Default)]
struct HubInner {
    topics: Mutex<HashMap<String, Vec<Member>>>,
    next_conn: AtomicU64,
    refuse_joins: AtomicBool,
}

struct Member {
    conn: u64,
    key: PeerId,
    tx: mpsc::UnboundedSender<ChannelEvent>,
    meta: Option<PresenceMeta>,
}

impl LocalHub {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a channel on `topic` whose presence is keyed by `key`.
    #[must_use]
    pub fn join(&self, topic: impl Into<String>, key: impl Into<PeerId>) -> LocalChannel {
        let (tx, rx) = mpsc::unbounded_channel();
        LocalChannel {
            hub: self.clone(),
            topic: topic.into(),
            key: key.into(),
            conn: self.inner.next_conn.fetch_add(1, Ordering::Relaxed),
            tx,
            rx,
            subscribed: false,
        }
    }

    /// Make subsequent subscribe handshakes fail.
    pub fn refuse_joins(&self, refuse: bool) {
        self.inner.refuse_joins.store(refuse, Ordering::Relaxed);
    }

    /// Drop every member of `topic`, as if the transport went away.
    pub fn close_topic(&self, topic: &str, reason: &str) {
        let members = self.topics().remove(topic).unwrap_or_default();
        for member in members {
            let _ = member.tx.send(ChannelEvent::Closed {
                reason: reason.to_string(),
            });
        }
    }

    /// Number of subscribed members on `topic`.
    #[must_use]
    pub fn member_count(&self, topic: &str) -> usize {
        self.topics().get(topic).map_or(0, Vec::len)
    }

    fn topics(&self) -> MutexGuard<'_, HashMap<String, Vec<Member>>> {
        self.inner
            .topics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn subscribe(&self, channel: &LocalChannel) -> bool {
        if self.inner.refuse_joins.load(Ordering::Relaxed) {
            return false;
        }
        let mut topics = self.topics();
        let members = topics.entry(channel.topic.clone()).or_default();
        if !members.iter().any(|member| member.conn == channel.conn) {
            members.push(Member {
                conn: channel.conn,
                key: channel.key.clone(),
                tx: channel.tx.clone(),
                meta: None,
            });
        }
        // New subscribers receive the current presence state.
        let _ = channel
            .tx
            .send(ChannelEvent::PresenceSync(snapshot(members)));
        true
    }

    fn track(&self, channel: &LocalChannel, meta: &PresenceMeta) -> Result<(), ChannelError> {
        let mut topics = self.topics();
        let members = topics
            .get_mut(&channel.topic)
            .ok_or(ChannelError::NotSubscribed)?;
        let member = members
            .iter_mut()
            .find(|member| member.conn == channel.conn)
            .ok_or(ChannelError::NotSubscribed)?;
        member.meta = Some(meta.clone());

        let join = ChannelEvent::PresenceJoin {
            peer_id: channel.key.clone(),
            meta: meta.clone(),
        };
        let sync = ChannelEvent::PresenceSync(snapshot(members));
        for member in members.iter() {
            let _ = member.tx.send(join.clone());
            let _ = member.tx.send(sync.clone());
        }
        Ok(())
    }

    fn broadcast(
        &self,
        channel: &LocalChannel,
        message: &BroadcastMessage,
    ) -> Result<(), ChannelError> {
        let topics = self.topics();
        let members = topics
            .get(&channel.topic)
            .ok_or(ChannelError::NotSubscribed)?;
        if !members.iter().any(|member| member.conn == channel.conn) {
            return Err(ChannelError::NotSubscribed);
        }
        for member in members.iter().filter(|member| member.conn != channel.conn) {
            let _ = member.tx.send(ChannelEvent::Broadcast(message.clone()));
        }
        Ok(())
    }

    fn leave(&self, topic: &str, conn: u64) {
        let mut topics = self.topics();
        let Some(members) = topics.get_mut(topic) else {
            return;
        };
        let Some(index) = members.iter().position(|member| member.conn == conn) else {
            return;
        };
        let removed = members.remove(index);
        if removed.meta.is_some() {
            let leave = ChannelEvent::PresenceLeave {
                peer_id: removed.key.clone(),
            };
            let sync = ChannelEvent::PresenceSync(snapshot(members));
            for member in members.iter() {
                let _ = member.tx.send(leave.clone());
                let _ = member.tx.send(sync.clone());
            }
        }
        if members.is_empty() {
            topics.remove(topic);
        }
    }
}

fn snapshot(members: &[Member]) -> PresenceSnapshot {
    let mut state = PresenceSnapshot::new();
    for member in members {
        if let Some(meta) = &member.meta {
            state
                .entry(member.key.clone())
                .or_insert_with(|| meta.clone());
        }
    }
    state
}

/// A client's membership on a [`LocalHub`] topic.
pub struct LocalChannel {
    hub: LocalHub,
    topic: String,
    key: PeerId,
    conn: u64,
    tx: mpsc::UnboundedSender<ChannelEvent>,
    rx: mpsc::UnboundedReceiver<ChannelEvent>,
    subscribed: bool,
}

#[async_trait]
impl RealtimeChannel for LocalChannel {
    fn topic(&self) -> &str {
        &self.topic
    }

    async fn subscribe(&mut self) -> Result<SubscriptionState, ChannelError> {
        if self.hub.subscribe(self) {
            self.subscribed = true;
            Ok(SubscriptionState::Connected)
        } else {
            Ok(SubscriptionState::Failed)
        }
    }

    async fn track(&mut self, meta: &PresenceMeta) -> Result<(), ChannelError> {
        if !self.subscribed {
            return Err(ChannelError::NotSubscribed);
        }
        self.hub.track(self, meta)
    }

    fn broadcast(&self, message: &BroadcastMessage) -> Result<(), ChannelError> {
        if !self.subscribed {
            return Err(ChannelError::NotSubscribed);
        }
        self.hub.broadcast(self, message)
    }

    async fn next_event(&mut self) -> Option<ChannelEvent> {
        self.rx.recv().await
    }

    async fn unsubscribe(&mut self) -> Result<(), ChannelError> {
        if self.subscribed {
            self.subscribed = false;
            self.hub.leave(&self.topic, self.conn);
        }
        Ok(())
    }
}

impl Drop for LocalChannel {
    fn drop(&mut self) {
        if self.subscribed {
            self.hub.leave(&self.topic, self.conn);
        }
    }
}
