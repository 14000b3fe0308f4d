use std::io;

use quill_core::ai::AiError;
use quill_core::collab::SessionError;
use quill_core::config::ConfigError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] quill_core::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Ai(#[from] AiError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Note ID cannot be empty")]
    EmptyNoteId,
    #[error("Question cannot be empty")]
    EmptyQuestion,
    #[error("Note has no content to study")]
    EmptyNote,
    #[error("--debounce-ms must be between {min} and {max}")]
    InvalidDebounce { min: u64, max: u64 },
    #[error("Question count must be between 1 and {0}")]
    InvalidQuestionCount(usize),
}
