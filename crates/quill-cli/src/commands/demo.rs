//! Two editors sharing one note in-process.

use std::sync::Arc;
use std::time::Duration;

use quill_core::channel::LocalHub;
use quill_core::collab::{SessionConfig, SessionHandle, SessionView};
use quill_core::config::ClientConfig;
use quill_core::models::{LocalUser, Note, NoteId};
use quill_core::store::{MemoryNoteStore, NoteStore};
use serde::Serialize;
use tokio::time::sleep;

use crate::commands::common::format_peers;
use crate::error::CliError;

const DEMO_NOTE_ID: &str = "demo-note";
const PROPAGATION_PAUSE: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Serialize)]
pub struct DemoStep {
    pub actor: String,
    pub action: String,
    pub ada_sees: String,
    pub grace_sees: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DemoReport {
    pub note_id: String,
    pub steps: Vec<DemoStep>,
    pub stored_title: String,
    pub stored_content: String,
    pub store_writes: usize,
}

fn snapshot(view: &SessionView) -> String {
    format!("\"{}\" / \"{}\" with {}", view.title, view.content, format_peers(&view.peers))
}

fn step(actor: &str, action: &str, ada: &SessionHandle, grace: &SessionHandle) -> DemoStep {
    DemoStep {
        actor: actor.to_string(),
        action: action.to_string(),
        ada_sees: snapshot(&ada.view()),
        grace_sees: snapshot(&grace.view()),
    }
}

/// Run the two-editor exchange and report what each side saw.
pub async fn run_demo_scenario(config: SessionConfig) -> Result<DemoReport, CliError> {
    let note_id: NoteId = DEMO_NOTE_ID.parse()?;
    let store = Arc::new(MemoryNoteStore::new());
    store
        .insert(Note::new(note_id.clone(), "Cell biology", "Mitochondria"))
        .await;
    let hub = LocalHub::new();
    let quiet_period = config.quiet_period;

    let ada_user = LocalUser::from_email("ada", Some("ada@example.com"));
    let grace_user = LocalUser::from_email("grace", Some("grace@example.com"));
    let ada = SessionHandle::open(
        Arc::clone(&store),
        hub.join(note_id.topic(), ada_user.id.clone()),
        ada_user,
        note_id.clone(),
        config.clone(),
    )
    .await?;
    let grace = SessionHandle::open(
        Arc::clone(&store),
        hub.join(note_id.topic(), grace_user.id.clone()),
        grace_user,
        note_id.clone(),
        config,
    )
    .await?;
    sleep(PROPAGATION_PAUSE).await;

    let mut steps = vec![step("both", "opened the note", &ada, &grace)];

    ada.edit_content("Mitochondria make ATP.");
    sleep(PROPAGATION_PAUSE).await;
    steps.push(step("ada", "replaced the content", &ada, &grace));

    grace.edit_title("Cell biology: energy");
    sleep(PROPAGATION_PAUSE).await;
    steps.push(step("grace", "renamed the note", &ada, &grace));

    grace.move_cursor(12);
    sleep(PROPAGATION_PAUSE).await;
    steps.push(step("grace", "moved the cursor", &ada, &grace));

    sleep(quiet_period + Duration::from_millis(500)).await;
    steps.push(step("both", "waited for the quiet period", &ada, &grace));

    ada.close().await;
    grace.close().await;

    let stored = store.get(&note_id).await?;
    Ok(DemoReport {
        note_id: note_id.to_string(),
        steps,
        stored_title: stored.title.clone(),
        stored_content: stored.content_or_empty().to_string(),
        store_writes: store.write_count().await,
    })
}

pub async fn run_demo(config: &ClientConfig, json: bool) -> Result<(), CliError> {
    let report = run_demo_scenario(config.session_config()).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    for (index, step) in report.steps.iter().enumerate() {
        println!("{}. {} {}", index + 1, step.actor, step.action);
        println!("   ada:   {}", step.ada_sees);
        println!("   grace: {}", step.grace_sees);
    }
    println!();
    println!(
        "Stored: \"{}\" / \"{}\" after {} write(s)",
        report.stored_title, report.stored_content, report.store_writes
    );
    Ok(())
}
