//! quill-core - Core library for Quill
//!
//! Shared models, the collaborative editing session, and the clients for the
//! hosted note store, the realtime channel service and the AI study helper.
//! Used by the CLI and the API server.

pub mod ai;
pub mod channel;
pub mod collab;
pub mod config;
pub mod error;
pub mod models;
pub mod realtime;
pub mod store;
pub mod util;

pub use error::{Error, Result};
pub use models::{Note, NoteId};
