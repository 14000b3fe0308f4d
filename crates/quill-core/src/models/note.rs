//! Note model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// Opaque key of a stored note.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoteId(String);

impl NoteId {
    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Realtime topic shared by every editor of this note.
    #[must_use]
    pub fn topic(&self) -> String {
        format!("note_{}", self.0)
    }
}

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for NoteId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidInput("note id cannot be empty".into()));
        }
        Ok(Self(trimmed.to_string()))
    }
}

/// A note as stored in the `notes` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    /// Unique identifier
    pub id: NoteId,
    pub title: String,
    /// Plain text body; absent for encrypted notes
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub is_encrypted: bool,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default)]
    pub owner_id: Option<String>,
    #[serde(default)]
    pub subject_id: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Server-assigned modification timestamp
    pub updated_at: DateTime<Utc>,
}

impl Note {
    /// Create a new unsaved note with the given title and content
    #[must_use]
    pub fn new(id: NoteId, title: impl Into<String>, content: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            title: title.into(),
            content: Some(content.into()),
            tags: Vec::new(),
            is_encrypted: false,
            is_public: false,
            owner_id: None,
            subject_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Body text, empty when the note has none
    #[must_use]
    pub fn content_or_empty(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }
}

/// Fields written by an editor save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotePatch {
    pub title: String,
    pub content: String,
    pub updated_at: DateTime<Utc>,
}

impl NotePatch {
    /// Build a patch from the editor buffer, trimming both fields.
    #[must_use]
    pub fn from_buffer(title: &str, content: &str) -> Self {
        Self {
            title: title.trim().to_string(),
            content: content.trim().to_string(),
            updated_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_id_parse_trims() {
        let id: NoteId = "  abc-123 ".parse().unwrap();
        assert_eq!(id.as_str(), "abc-123");
        assert_eq!(id.topic(), "note_abc-123");
    }

    #[test]
    fn test_note_id_rejects_empty() {
        assert!("   ".parse::<NoteId>().is_err());
    }

    #[test]
    fn test_note_deserializes_supabase_row() {
        let row = r#"{
            "id": "n1",
            "title": "Cells",
            "content": null,
            "tags": ["biology"],
            "is_encrypted": true,
            "is_public": false,
            "owner_id": "u1",
            "created_at": "2024-03-01T10:00:00+00:00",
            "updated_at": "2024-03-02T10:00:00.123+00:00",
            "password_hash": "ignored"
        }"#;
        let note: Note = serde_json::from_str(row).unwrap();
        assert_eq!(note.id.as_str(), "n1");
        assert_eq!(note.content, None);
        assert_eq!(note.content_or_empty(), "");
        assert!(note.is_encrypted);
        assert_eq!(note.subject_id, None);
    }

    #[test]
    fn test_patch_trims_buffer() {
        let patch = NotePatch::from_buffer(" Title ", "Body\n");
        assert_eq!(patch.title, "Title");
        assert_eq!(patch.content, "Body");
    }
}
