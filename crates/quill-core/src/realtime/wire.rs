//! Phoenix channel frames as spoken by Supabase Realtime (`vsn=1.0.0`).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::channel::{ChannelError, ChannelEvent, PresenceSnapshot};
use crate::models::{PeerId, PresenceMeta};

pub const PHOENIX_TOPIC: &str = "phoenix";

pub const EVENT_JOIN: &str = "phx_join";
pub const EVENT_LEAVE: &str = "phx_leave";
pub const EVENT_REPLY: &str = "phx_reply";
pub const EVENT_CLOSE: &str = "phx_close";
pub const EVENT_ERROR: &str = "phx_error";
pub const EVENT_HEARTBEAT: &str = "heartbeat";
pub const EVENT_BROADCAST: &str = "broadcast";
pub const EVENT_PRESENCE: &str = "presence";
pub const EVENT_PRESENCE_STATE: &str = "presence_state";
pub const EVENT_PRESENCE_DIFF: &str = "presence_diff";

/// Topic name the server expects for a channel called `name`.
#[must_use]
pub fn channel_topic(name: &str) -> String {
    format!("realtime:{name}")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "ref", default)]
    pub reference: Option<String>,
}

impl Frame {
    fn new(topic: &str, event: &str, payload: Value, reference: Option<String>) -> Self {
        Self {
            topic: topic.to_string(),
            event: event.to_string(),
            payload,
            reference,
        }
    }

    /// Join request. Our own broadcasts are not echoed back.
    #[must_use]
    pub fn join(topic: &str, reference: String, presence_key: &PeerId, access_token: Option<&str>) -> Self {
        let mut payload = json!({
            "config": {
                "broadcast": { "self": false, "ack": false },
                "presence": { "key": presence_key.as_str() },
            }
        });
        if let Some(token) = access_token {
            payload["access_token"] = Value::String(token.to_string());
        }
        Self::new(topic, EVENT_JOIN, payload, Some(reference))
    }

    #[must_use]
    pub fn leave(topic: &str, reference: String) -> Self {
        Self::new(topic, EVENT_LEAVE, json!({}), Some(reference))
    }

    #[must_use]
    pub fn heartbeat(reference: String) -> Self {
        Self::new(PHOENIX_TOPIC, EVENT_HEARTBEAT, json!({}), Some(reference))
    }

    #[must_use]
    pub fn broadcast(topic: &str, event: &str, payload: Value) -> Self {
        Self::new(
            topic,
            EVENT_BROADCAST,
            json!({ "type": "broadcast", "event": event, "payload": payload }),
            None,
        )
    }

    pub fn track(topic: &str, reference: String, meta: &PresenceMeta) -> Result<Self, ChannelError> {
        Ok(Self::new(
            topic,
            EVENT_PRESENCE,
            json!({ "type": "presence", "event": "track", "payload": serde_json::to_value(meta)? }),
            Some(reference),
        ))
    }

    pub fn encode(&self) -> Result<String, ChannelError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(text: &str) -> Result<Self, ChannelError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Interpret a frame received on the channel topic.
    pub fn classify(self) -> Result<Inbound, ChannelError> {
        let inbound = match self.event.as_str() {
            EVENT_REPLY => {
                let reply: ReplyPayload = serde_json::from_value(self.payload)?;
                Inbound::Reply {
                    reference: self.reference,
                    ok: reply.status == "ok",
                    reason: reply.response.get("reason").and_then(Value::as_str).map(str::to_string),
                }
            }
            EVENT_BROADCAST => {
                let body: BroadcastPayload = serde_json::from_value(self.payload)?;
                Inbound::Broadcast {
                    event: body.event,
                    payload: body.payload,
                }
            }
            EVENT_PRESENCE_STATE => Inbound::PresenceState(serde_json::from_value(self.payload)?),
            EVENT_PRESENCE_DIFF => Inbound::PresenceDiff(serde_json::from_value(self.payload)?),
            EVENT_CLOSE => Inbound::Closed("channel closed by server".to_string()),
            EVENT_ERROR => Inbound::Closed(
                self.payload
                    .get("reason")
                    .and_then(Value::as_str)
                    .unwrap_or("channel error")
                    .to_string(),
            ),
            _ => Inbound::Ignored,
        };
        Ok(inbound)
    }
}

#[derive(Debug, Deserialize)]
struct ReplyPayload {
    status: String,
    #[serde(default)]
    response: Value,
}

#[derive(Debug, Deserialize)]
struct BroadcastPayload {
    event: String,
    #[serde(default)]
    payload: Value,
}

/// A decoded server frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Reply {
        reference: Option<String>,
        ok: bool,
        reason: Option<String>,
    },
    Broadcast {
        event: String,
        payload: Value,
    },
    PresenceState(PresenceEntries),
    PresenceDiff(PresenceDiff),
    Closed(String),
    Ignored,
}

/// One presence meta as the server reports it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WireMeta {
    #[serde(default)]
    pub phx_ref: Option<String>,
    #[serde(flatten)]
    pub meta: PresenceMeta,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PresenceEntry {
    #[serde(default)]
    pub metas: Vec<WireMeta>,
}

pub type PresenceEntries = BTreeMap<PeerId, PresenceEntry>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PresenceDiff {
    #[serde(default)]
    pub joins: PresenceEntries,
    #[serde(default)]
    pub leaves: PresenceEntries,
}

/// Client-side copy of the channel's presence, keyed like the server.
///
/// One key can carry several metas (the same user in two tabs); the key
/// leaves only when its last meta does.
#[derive(Debug, Clone, Default)]
pub struct PresenceMirror {
    entries: BTreeMap<PeerId, Vec<WireMeta>>,
}

impl PresenceMirror {
    /// Replace everything from a `presence_state` frame.
    pub fn apply_state(&mut self, state: PresenceEntries) -> Vec<ChannelEvent> {
        self.entries = state
            .into_iter()
            .filter(|(_, entry)| !entry.metas.is_empty())
            .map(|(key, entry)| (key, entry.metas))
            .collect();
        vec![ChannelEvent::PresenceSync(self.snapshot())]
    }

    /// Apply a `presence_diff`: joins first, then leaves, then a full sync.
    pub fn apply_diff(&mut self, diff: PresenceDiff) -> Vec<ChannelEvent> {
        let mut events = Vec::new();

        for (key, entry) in diff.joins {
            let Some(latest) = entry.metas.last().map(|wire| wire.meta.clone()) else {
                continue;
            };
            let metas = self.entries.entry(key.clone()).or_default();
            for joined in entry.metas {
                metas.retain(|existing| existing.phx_ref.is_none() || existing.phx_ref != joined.phx_ref);
                metas.push(joined);
            }
            events.push(ChannelEvent::PresenceJoin {
                peer_id: key,
                meta: latest,
            });
        }

        for (key, entry) in diff.leaves {
            let Some(metas) = self.entries.get_mut(&key) else {
                continue;
            };
            let refs: Vec<&String> = entry.metas.iter().filter_map(|wire| wire.phx_ref.as_ref()).collect();
            if refs.is_empty() {
                metas.clear();
            } else {
                metas.retain(|existing| existing.phx_ref.as_ref().is_some_and(|r| !refs.contains(&r)));
            }
            if metas.is_empty() {
                self.entries.remove(&key);
                events.push(ChannelEvent::PresenceLeave { peer_id: key });
            }
        }

        events.push(ChannelEvent::PresenceSync(self.snapshot()));
        events
    }

    /// Latest meta per key.
    #[must_use]
    pub fn snapshot(&self) -> PresenceSnapshot {
        self.entries
            .iter()
            .filter_map(|(key, metas)| metas.last().map(|wire| (key.clone(), wire.meta.clone())))
            .collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn diff(value: Value) -> PresenceDiff {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn join_frame_carries_presence_key_and_token() {
        let frame = Frame::join("realtime:note_1", "1".into(), &"user-a".into(), Some("jwt"));
        let encoded: Value = serde_json::from_str(&frame.encode().unwrap()).unwrap();
        assert_eq!(encoded["event"], "phx_join");
        assert_eq!(encoded["ref"], "1");
        assert_eq!(encoded["payload"]["config"]["presence"]["key"], "user-a");
        assert_eq!(encoded["payload"]["config"]["broadcast"]["self"], false);
        assert_eq!(encoded["payload"]["access_token"], "jwt");
    }

    #[test]
    fn classify_reply_and_broadcast() {
        let reply = Frame::decode(
            r#"{"topic":"realtime:note_1","event":"phx_reply","payload":{"status":"error","response":{"reason":"unauthorized"}},"ref":"1"}"#,
        )
        .unwrap();
        assert_eq!(
            reply.classify().unwrap(),
            Inbound::Reply {
                reference: Some("1".into()),
                ok: false,
                reason: Some("unauthorized".into()),
            }
        );

        let broadcast = Frame::decode(
            r#"{"topic":"realtime:note_1","event":"broadcast","payload":{"type":"broadcast","event":"cursor_move","payload":{"user_id":"b","cursor_position":4}},"ref":null}"#,
        )
        .unwrap();
        let Inbound::Broadcast { event, payload } = broadcast.classify().unwrap() else {
            panic!("expected broadcast");
        };
        assert_eq!(event, "cursor_move");
        assert_eq!(payload["cursor_position"], 4);
    }

    #[test]
    fn unknown_events_are_ignored() {
        let frame = Frame::decode(r#"{"topic":"realtime:note_1","event":"system","payload":{}}"#).unwrap();
        assert_eq!(frame.classify().unwrap(), Inbound::Ignored);
    }

    #[test]
    fn presence_state_replaces_mirror() {
        let mut mirror = PresenceMirror::default();
        let state: PresenceEntries = serde_json::from_value(json!({
            "a": {"metas": [{"phx_ref": "r1", "name": "alice", "cursor_position": 0}]},
            "b": {"metas": [{"phx_ref": "r2", "name": "bob"}]},
        }))
        .unwrap();
        let events = mirror.apply_state(state);
        let [ChannelEvent::PresenceSync(snapshot)] = events.as_slice() else {
            panic!("expected a single sync");
        };
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[&PeerId::from("b")].name.as_deref(), Some("bob"));
        assert_eq!(snapshot[&PeerId::from("b")].cursor_position, None);
    }

    #[test]
    fn diff_emits_join_leave_then_sync() {
        let mut mirror = PresenceMirror::default();
        mirror.apply_state(
            serde_json::from_value(json!({"a": {"metas": [{"phx_ref": "r1", "name": "alice"}]}})).unwrap(),
        );

        let events = mirror.apply_diff(diff(json!({
            "joins": {"b": {"metas": [{"phx_ref": "r2", "name": "bob"}]}},
            "leaves": {"a": {"metas": [{"phx_ref": "r1"}]}},
        })));

        assert_eq!(events.len(), 3);
        assert!(matches!(&events[0], ChannelEvent::PresenceJoin { peer_id, .. } if peer_id.as_str() == "b"));
        assert!(matches!(&events[1], ChannelEvent::PresenceLeave { peer_id } if peer_id.as_str() == "a"));
        let ChannelEvent::PresenceSync(snapshot) = &events[2] else {
            panic!("expected sync last");
        };
        assert_eq!(snapshot.keys().map(PeerId::as_str).collect::<Vec<_>>(), vec!["b"]);
    }

    #[test]
    fn key_with_remaining_meta_does_not_leave() {
        let mut mirror = PresenceMirror::default();
        mirror.apply_diff(diff(json!({
            "joins": {"a": {"metas": [{"phx_ref": "tab1"}, {"phx_ref": "tab2"}]}},
        })));

        let events = mirror.apply_diff(diff(json!({
            "leaves": {"a": {"metas": [{"phx_ref": "tab1"}]}},
        })));
        assert_eq!(events.len(), 1);
        assert_eq!(mirror.snapshot().len(), 1);
    }

    #[test]
    fn retrack_replaces_meta_without_leaving() {
        let mut mirror = PresenceMirror::default();
        mirror.apply_diff(diff(json!({
            "joins": {"a": {"metas": [{"phx_ref": "r1", "cursor_position": 0}]}},
        })));

        let events = mirror.apply_diff(diff(json!({
            "joins": {"a": {"metas": [{"phx_ref": "r2", "cursor_position": 9}]}},
            "leaves": {"a": {"metas": [{"phx_ref": "r1"}]}},
        })));
        assert!(!events
            .iter()
            .any(|event| matches!(event, ChannelEvent::PresenceLeave { .. })));
        assert_eq!(mirror.snapshot()[&PeerId::from("a")].cursor_position, Some(9));
    }
}
