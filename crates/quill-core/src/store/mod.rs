//! Persistence store for note records.
//!
//! The editor only needs read-by-id and update-by-id; listing, filtering and
//! access control stay with the hosted database.

mod memory;
mod supabase;

use async_trait::async_trait;

use crate::models::{Note, NoteId, NotePatch};
use crate::Result;

pub use memory::MemoryNoteStore;
pub use supabase::{SupabaseNoteStore, SupabaseStoreConfig};

/// Key-addressed note storage.
#[async_trait]
pub trait NoteStore: Send + Sync + 'static {
    /// Fetch a note. Fails with `NotFound` when missing or not accessible.
    async fn get(&self, id: &NoteId) -> Result<Note>;

    /// Write title/content and return the stored record with its new
    /// modification timestamp. Fails with `Write` on rejection or
    /// connectivity loss.
    async fn update(&self, id: &NoteId, patch: &NotePatch) -> Result<Note>;
}
