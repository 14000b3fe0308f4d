use std::time::Duration;

use chrono::{DateTime, Utc};
use quill_core::collab::{ConnectionState, SaveStatus, SessionView};
use quill_core::config::{ClientConfig, SAVE_DEBOUNCE_RANGE_MS};
use quill_core::models::RemotePeer;
use quill_core::NoteId;

use crate::error::CliError;

/// Read the environment and apply command-line overrides.
pub fn load_config(debounce_ms: Option<u64>, flush_on_close: bool) -> Result<ClientConfig, CliError> {
    let config = ClientConfig::from_env()?;
    apply_overrides(config, debounce_ms, flush_on_close)
}

pub fn apply_overrides(
    mut config: ClientConfig,
    debounce_ms: Option<u64>,
    flush_on_close: bool,
) -> Result<ClientConfig, CliError> {
    if let Some(ms) = debounce_ms {
        if !SAVE_DEBOUNCE_RANGE_MS.contains(&ms) {
            return Err(CliError::InvalidDebounce {
                min: *SAVE_DEBOUNCE_RANGE_MS.start(),
                max: *SAVE_DEBOUNCE_RANGE_MS.end(),
            });
        }
        config.save_debounce = Duration::from_millis(ms);
    }
    if flush_on_close {
        config.flush_on_close = true;
    }
    Ok(config)
}

pub fn normalize_note_identifier(id: &str) -> Result<NoteId, CliError> {
    id.parse::<NoteId>().map_err(|_| CliError::EmptyNoteId)
}

pub fn normalize_content(content: &str) -> Option<String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub fn note_preview(content: &str, max_chars: usize) -> String {
    let first_line = content.lines().next().unwrap_or("").trim();
    let collapsed = first_line.split_whitespace().collect::<Vec<_>>().join(" ");

    if collapsed.chars().count() <= max_chars {
        collapsed
    } else {
        let take_len = max_chars.saturating_sub(3);
        let mut truncated = collapsed.chars().take(take_len).collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

pub const fn connection_label(state: ConnectionState) -> &'static str {
    match state {
        ConnectionState::Connecting => "connecting",
        ConnectionState::Connected => "live",
        ConnectionState::Disconnected => "offline",
    }
}

pub fn format_save_status(status: &SaveStatus, now: DateTime<Utc>) -> String {
    match status {
        SaveStatus::Idle => "no changes".to_string(),
        SaveStatus::Pending => "unsaved changes".to_string(),
        SaveStatus::Saving => "saving...".to_string(),
        SaveStatus::Saved { at } => format!("saved {}", format_relative_time(*at, now)),
        SaveStatus::Failed { message } => format!("save failed: {message}"),
    }
}

pub fn format_relative_time(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let seconds = now.signed_duration_since(at).num_seconds().max(0);
    if seconds < 60 {
        "just now".to_string()
    } else if seconds < 3_600 {
        format!("{}m ago", seconds / 60)
    } else if seconds < 86_400 {
        format!("{}h ago", seconds / 3_600)
    } else {
        format!("{}d ago", seconds / 86_400)
    }
}

/// `A(alice@12) B(bob@0)` style list of collaborators.
pub fn format_peers(peers: &[RemotePeer]) -> String {
    if peers.is_empty() {
        return "nobody else here".to_string();
    }
    peers
        .iter()
        .map(|peer| {
            format!(
                "{}({}@{} {})",
                peer.initial(),
                peer.display_name,
                peer.cursor_offset,
                peer.assigned_color
            )
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// One-line summary of a session view.
pub fn format_status_line(view: &SessionView, now: DateTime<Utc>) -> String {
    format!(
        "[{}] {} | {} | {}",
        connection_label(view.connection_state),
        note_preview(&view.title, 30),
        format_save_status(&view.save_status, now),
        format_peers(&view.peers)
    )
}

pub fn render_view(view: &SessionView, now: DateTime<Utc>) -> Vec<String> {
    let mut lines = vec![
        format!("# {}", view.title),
        String::new(),
        view.content.clone(),
        String::new(),
        format_status_line(view, now),
    ];
    if let Some(error) = view.connectivity_error.as_deref() {
        lines.push(format!("realtime: {error}"));
    }
    lines
}
