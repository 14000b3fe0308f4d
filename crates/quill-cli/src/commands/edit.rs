use std::sync::Arc;

use chrono::Utc;
use quill_core::collab::{SaveStatus, SessionHandle, SessionView};
use quill_core::config::ClientConfig;
use quill_core::realtime::RealtimeClient;
use quill_core::store::SupabaseNoteStore;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::commands::common::{
    format_peers, format_status_line, normalize_note_identifier, render_view,
};
use crate::error::CliError;

const HELP: &str =
    "Type a line to replace the content. Commands: /title <text>, /append <text>, /cursor <n>, /peers, /status, /quit";

/// One line typed into the editor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditInput {
    ReplaceContent(String),
    Title(String),
    Append(String),
    Cursor(usize),
    Peers,
    Status,
    Quit,
    Unknown(String),
}

/// Interpret a typed line. Blank lines are ignored.
pub fn parse_edit_input(line: &str) -> Option<EditInput> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return None;
    }
    let Some(command) = line.strip_prefix('/') else {
        return Some(EditInput::ReplaceContent(line.to_string()));
    };

    let (name, argument) = command
        .split_once(' ')
        .map_or((command, ""), |(name, rest)| (name, rest));
    let input = match name {
        "title" => EditInput::Title(argument.to_string()),
        "append" => EditInput::Append(argument.to_string()),
        "cursor" => match argument.trim().parse::<usize>() {
            Ok(offset) => EditInput::Cursor(offset),
            Err(_) => EditInput::Unknown(line.to_string()),
        },
        "peers" => EditInput::Peers,
        "status" => EditInput::Status,
        "quit" | "q" | "exit" => EditInput::Quit,
        _ => EditInput::Unknown(line.to_string()),
    };
    Some(input)
}

enum Wake {
    Input(Option<String>),
    Changed(bool),
    Interrupt,
}

pub async fn run_edit(note_id: &str, config: &ClientConfig, json: bool) -> Result<(), CliError> {
    let note_id = normalize_note_identifier(note_id)?;
    let store = Arc::new(SupabaseNoteStore::new(config.store_config()?)?);
    let user = config.local_user();
    let channel =
        RealtimeClient::new(config.realtime_config()?).channel(&note_id.topic(), user.id.clone());
    tracing::info!(note_id = %note_id, user = %user.id, "Opening note");

    let mut handle =
        SessionHandle::open(store, channel, user, note_id, config.session_config()).await?;
    let mut shown = handle.view();
    print_full(&shown, json)?;
    if !json {
        eprintln!("{HELP}");
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let wake = tokio::select! {
            line = lines.next_line() => Wake::Input(line?),
            changed = handle.changed() => Wake::Changed(changed),
            _ = tokio::signal::ctrl_c() => Wake::Interrupt,
        };

        match wake {
            Wake::Input(None) | Wake::Interrupt | Wake::Changed(false) => break,
            Wake::Input(Some(line)) => match parse_edit_input(&line) {
                None => {}
                Some(EditInput::Quit) => break,
                Some(EditInput::ReplaceContent(text)) => {
                    handle.edit_content(text);
                }
                Some(EditInput::Title(title)) => {
                    handle.edit_title(title);
                }
                Some(EditInput::Append(text)) => {
                    handle.append_content(text);
                }
                Some(EditInput::Cursor(offset)) => {
                    handle.move_cursor(offset);
                }
                Some(EditInput::Peers) => println!("{}", format_peers(&handle.view().peers)),
                Some(EditInput::Status) => print_full(&handle.view(), json)?,
                Some(EditInput::Unknown(command)) => eprintln!("Unknown command: {command}\n{HELP}"),
            },
            Wake::Changed(true) => {
                let view = handle.view();
                if json {
                    println!("{}", serde_json::to_string(&view)?);
                } else if view.title != shown.title || view.content != shown.content {
                    print_full(&view, false)?;
                } else {
                    println!("{}", format_status_line(&view, Utc::now()));
                }
                shown = view;
            }
        }
    }

    let final_view = handle.close().await;
    if json {
        println!("{}", serde_json::to_string(&final_view)?);
    } else {
        println!("{}", format_status_line(&final_view, Utc::now()));
        if final_view.pending_persist
            || matches!(final_view.save_status, SaveStatus::Pending)
        {
            eprintln!("Unsaved edits were discarded. Use --flush-on-close to keep them.");
        }
    }
    Ok(())
}

fn print_full(view: &SessionView, json: bool) -> Result<(), CliError> {
    if json {
        println!("{}", serde_json::to_string(view)?);
    } else {
        for line in render_view(view, Utc::now()) {
            println!("{line}");
        }
    }
    Ok(())
}
