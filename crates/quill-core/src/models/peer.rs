//! Collaborator identities and presence metadata

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::collab::peer_color;
use crate::util::display_name_from_email;

const ANONYMOUS: &str = "Anonymous";

/// Identifier of a connected client (the authenticated user id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// The user behind the local editor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalUser {
    pub id: PeerId,
    pub display_name: String,
}

impl LocalUser {
    #[must_use]
    pub fn new(id: impl Into<PeerId>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
        }
    }

    /// Build a local user whose display name is the email's local part.
    #[must_use]
    pub fn from_email(id: impl Into<PeerId>, email: Option<&str>) -> Self {
        Self::new(id, display_name_from_email(email))
    }

    /// Metadata announced when the session starts tracking presence.
    #[must_use]
    pub fn presence(&self) -> PresenceMeta {
        PresenceMeta {
            name: Some(self.display_name.clone()),
            cursor_position: Some(0),
        }
    }
}

impl From<String> for PeerId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Metadata a client announces through the channel's presence primitive.
///
/// Both fields are optional on the wire; absent values fall back to
/// `"Anonymous"` and offset 0 when projected into a [`RemotePeer`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor_position: Option<usize>,
}

/// Another client editing the same note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemotePeer {
    pub peer_id: PeerId,
    pub display_name: String,
    pub assigned_color: &'static str,
    /// Last known caret offset
    pub cursor_offset: usize,
    pub last_seen_at: DateTime<Utc>,
}

impl RemotePeer {
    /// Project announced presence metadata into a peer entry.
    #[must_use]
    pub fn from_presence(peer_id: PeerId, meta: &PresenceMeta, seen_at: DateTime<Utc>) -> Self {
        let display_name = meta
            .name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(ANONYMOUS)
            .to_string();
        Self {
            assigned_color: peer_color(&peer_id),
            peer_id,
            display_name,
            cursor_offset: meta.cursor_position.unwrap_or(0),
            last_seen_at: seen_at,
        }
    }

    /// First letter of the display name, uppercased, for avatar badges.
    #[must_use]
    pub fn initial(&self) -> String {
        self.display_name
            .chars()
            .next()
            .map(|c| c.to_uppercase().collect())
            .unwrap_or_default()
    }
}
