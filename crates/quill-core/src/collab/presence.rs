//! Presence reconciliation: the set of remote peers seen by one session.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::channel::PresenceSnapshot;
use crate::models::{PeerId, PresenceMeta, RemotePeer};

/// Remote peers keyed by id. Never contains the local id.
#[derive(Debug, Clone)]
pub struct PresenceTable {
    local_id: PeerId,
    peers: BTreeMap<PeerId, RemotePeer>,
}

impl PresenceTable {
    #[must_use]
    pub const fn new(local_id: PeerId) -> Self {
        Self {
            local_id,
            peers: BTreeMap::new(),
        }
    }

    /// Replace the whole set from a presence snapshot.
    pub fn apply_sync(&mut self, snapshot: &PresenceSnapshot, now: DateTime<Utc>) {
        self.peers = snapshot
            .iter()
            .filter(|(peer_id, _)| self.accepts(peer_id))
            .map(|(peer_id, meta)| {
                (
                    peer_id.clone(),
                    RemotePeer::from_presence(peer_id.clone(), meta, now),
                )
            })
            .collect();
    }

    /// Insert or replace one announced peer. Returns whether it was accepted.
    pub fn apply_join(&mut self, peer_id: &PeerId, meta: &PresenceMeta, now: DateTime<Utc>) -> bool {
        if !self.accepts(peer_id) {
            return false;
        }
        self.peers.insert(
            peer_id.clone(),
            RemotePeer::from_presence(peer_id.clone(), meta, now),
        );
        true
    }

    /// Remove a peer immediately. Returns the removed entry.
    pub fn apply_leave(&mut self, peer_id: &PeerId) -> Option<RemotePeer> {
        self.peers.remove(peer_id)
    }

    /// Record a caret move from a known peer. Unknown and local ids are ignored.
    pub fn update_cursor(&mut self, peer_id: &PeerId, offset: usize, now: DateTime<Utc>) -> bool {
        match self.peers.get_mut(peer_id) {
            Some(peer) => {
                peer.cursor_offset = offset;
                peer.last_seen_at = now;
                true
            }
            None => false,
        }
    }

    /// Refresh `last_seen_at` for a known peer.
    pub fn touch(&mut self, peer_id: &PeerId, now: DateTime<Utc>) {
        if let Some(peer) = self.peers.get_mut(peer_id) {
            peer.last_seen_at = now;
        }
    }

    #[must_use]
    pub fn get(&self, peer_id: &PeerId) -> Option<&RemotePeer> {
        self.peers.get(peer_id)
    }

    #[must_use]
    pub fn contains(&self, peer_id: &PeerId) -> bool {
        self.peers.contains_key(peer_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Peers ordered by id.
    #[must_use]
    pub fn peers(&self) -> Vec<RemotePeer> {
        self.peers.values().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.peers.clear();
    }

    fn accepts(&self, peer_id: &PeerId) -> bool {
        *peer_id != self.local_id && !peer_id.is_empty()
    }
}
