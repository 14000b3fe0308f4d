//! In-memory note store (tests and demos).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use super::NoteStore;
use crate::models::{Note, NoteId, NotePatch};
use crate::{Error, Result};

/// Thread-safe map of notes that records every successful write.
#[derive(Clone, Default)]
pub struct MemoryNoteStore {
    notes: Arc<Mutex<HashMap<NoteId, Note>>>,
    writes: Arc<Mutex<Vec<(NoteId, NotePatch)>>>,
    fail_writes: Arc<AtomicBool>,
}

impl MemoryNoteStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed or overwrite a note.
    pub async fn insert(&self, note: Note) {
        self.notes.lock().await.insert(note.id.clone(), note);
    }

    /// Make subsequent updates fail with a write error.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Relaxed);
    }

    /// Successful writes in order.
    pub async fn writes(&self) -> Vec<(NoteId, NotePatch)> {
        self.writes.lock().await.clone()
    }

    pub async fn write_count(&self) -> usize {
        self.writes.lock().await.len()
    }
}

#[async_trait]
impl NoteStore for MemoryNoteStore {
    async fn get(&self, id: &NoteId) -> Result<Note> {
        self.notes
            .lock()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    async fn update(&self, id: &NoteId, patch: &NotePatch) -> Result<Note> {
        if self.fail_writes.load(Ordering::Relaxed) {
            return Err(Error::Write(format!("store rejected update of {id}")));
        }

        let mut notes = self.notes.lock().await;
        let note = notes
            .get_mut(id)
            .ok_or_else(|| Error::Write(format!("note {id} no longer exists")))?;
        note.title.clone_from(&patch.title);
        note.content = Some(patch.content.clone());
        note.updated_at = Utc::now().max(patch.updated_at);
        let stored = note.clone();
        drop(notes);

        self.writes.lock().await.push((id.clone(), patch.clone()));
        Ok(stored)
    }
}
