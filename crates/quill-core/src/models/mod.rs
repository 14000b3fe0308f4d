//! Data models for Quill

mod note;
mod peer;

pub use note::{Note, NoteId, NotePatch};
pub use peer::{LocalUser, PeerId, PresenceMeta, RemotePeer};
