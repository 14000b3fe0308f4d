//! Background task that drives a [`CollabSession`] and the UI handle to it.
//!
//! One task owns the session. It reacts to UI commands, channel events, the
//! debounce deadline, and finished store writes, one at a time, and publishes
//! a fresh [`SessionView`] after each.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

use super::session::{CollabSession, EditField, SessionConfig, SessionError, SessionView};
use crate::channel::{ChannelEvent, RealtimeChannel};
use crate::models::{LocalUser, Note, NoteId, NotePatch};
use crate::store::NoteStore;

enum SessionCommand {
    Edit { field: EditField, value: String },
    Append(String),
    MoveCursor(usize),
    Close { reply: oneshot::Sender<SessionView> },
}

enum Wake {
    Command(Option<SessionCommand>),
    Channel(Option<ChannelEvent>),
    PersistDue,
    Persisted(crate::Result<Note>),
}

/// UI-side handle to a running session.
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<SessionCommand>,
    view: watch::Receiver<SessionView>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    /// Load the note, join its channel and start the session task.
    pub async fn open<S, C>(
        store: Arc<S>,
        channel: C,
        local: LocalUser,
        note_id: NoteId,
        config: SessionConfig,
    ) -> Result<Self, SessionError>
    where
        S: NoteStore,
        C: RealtimeChannel + 'static,
    {
        let session = CollabSession::open(store, channel, local, note_id, config).await?;
        Ok(Self::spawn(session))
    }

    /// Start the task for an already opened session.
    #[must_use]
    pub fn spawn<S, C>(session: CollabSession<S, C>) -> Self
    where
        S: NoteStore,
        C: RealtimeChannel + 'static,
    {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (view_tx, view) = watch::channel(session.view());
        let task = tokio::spawn(run(session, command_rx, view_tx));
        Self {
            commands,
            view,
            task,
        }
    }

    /// Replace the title. Returns false once the session has ended.
    pub fn edit_title(&self, value: impl Into<String>) -> bool {
        self.send(SessionCommand::Edit {
            field: EditField::Title,
            value: value.into(),
        })
    }

    /// Replace the content. Returns false once the session has ended.
    pub fn edit_content(&self, value: impl Into<String>) -> bool {
        self.send(SessionCommand::Edit {
            field: EditField::Content,
            value: value.into(),
        })
    }

    /// Add a line to the end of the content as the session holds it.
    pub fn append_content(&self, text: impl Into<String>) -> bool {
        self.send(SessionCommand::Append(text.into()))
    }

    pub fn move_cursor(&self, offset: usize) -> bool {
        self.send(SessionCommand::MoveCursor(offset))
    }

    fn send(&self, command: SessionCommand) -> bool {
        self.commands.send(command).is_ok()
    }

    /// Latest published view.
    #[must_use]
    pub fn view(&self) -> SessionView {
        self.view.borrow().clone()
    }

    /// Wait for the next view update. Returns false when the session ended.
    pub async fn changed(&mut self) -> bool {
        self.view.changed().await.is_ok()
    }

    /// A separate receiver for rendering from another task.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionView> {
        self.view.clone()
    }

    /// Stop the session and return its final view.
    pub async fn close(self) -> SessionView {
        let (reply, response) = oneshot::channel();
        let final_view = if self.send(SessionCommand::Close { reply }) {
            response.await.ok()
        } else {
            None
        };

        if let Err(error) = self.task.await {
            tracing::error!("Session task ended abnormally: {}", error);
        }
        final_view.unwrap_or_else(|| self.view.borrow().clone())
    }
}

async fn run<S, C>(
    mut session: CollabSession<S, C>,
    mut commands: mpsc::UnboundedReceiver<SessionCommand>,
    view_tx: watch::Sender<SessionView>,
) where
    S: NoteStore,
    C: RealtimeChannel,
{
    let (persisted_tx, mut persisted_rx) = mpsc::unbounded_channel();
    let mut channel_open = true;

    loop {
        let deadline = session.persist_deadline();
        let wake = tokio::select! {
            command = commands.recv() => Wake::Command(command),
            event = session.next_channel_event(), if channel_open => Wake::Channel(event),
            () = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => Wake::PersistDue,
            Some(outcome) = persisted_rx.recv() => Wake::Persisted(outcome),
        };

        match wake {
            Wake::Command(Some(SessionCommand::Edit { field, value })) => {
                session.on_local_edit(field, value);
            }
            Wake::Command(Some(SessionCommand::Append(text))) => {
                session.on_local_append(&text);
            }
            Wake::Command(Some(SessionCommand::MoveCursor(offset))) => {
                session.on_local_cursor_move(offset);
                continue;
            }
            Wake::Command(Some(SessionCommand::Close { reply })) => {
                settle_writes(&mut session, &persisted_tx, &mut persisted_rx).await;
                let view = session.close().await;
                view_tx.send_replace(view.clone());
                let _ = reply.send(view);
                return;
            }
            Wake::Command(None) => {
                tracing::debug!("All session handles dropped");
                settle_writes(&mut session, &persisted_tx, &mut persisted_rx).await;
                view_tx.send_replace(session.close().await);
                return;
            }
            Wake::Channel(Some(event)) => {
                if matches!(event, ChannelEvent::Closed { .. }) {
                    channel_open = false;
                }
                session.handle_event(event).await;
            }
            Wake::Channel(None) => {
                channel_open = false;
                session
                    .handle_event(ChannelEvent::Closed {
                        reason: "event stream ended".to_string(),
                    })
                    .await;
            }
            Wake::PersistDue => {
                if let Some(patch) = session.take_due_patch(Instant::now()) {
                    spawn_write(&session, patch, &persisted_tx);
                }
            }
            Wake::Persisted(outcome) => {
                if let Some(patch) = session.finish_persist(outcome) {
                    spawn_write(&session, patch, &persisted_tx);
                }
            }
        }

        view_tx.send_replace(session.view());
    }
}

fn spawn_write<S, C>(
    session: &CollabSession<S, C>,
    patch: NotePatch,
    persisted_tx: &mpsc::UnboundedSender<crate::Result<Note>>,
) where
    S: NoteStore,
    C: RealtimeChannel,
{
    let store = session.store();
    let note_id = session.note_id().clone();
    let persisted_tx = persisted_tx.clone();
    tokio::spawn(async move {
        let outcome = store.update(&note_id, &patch).await;
        let _ = persisted_tx.send(outcome);
    });
}

/// Wait out the running write, and any write queued behind it.
async fn settle_writes<S, C>(
    session: &mut CollabSession<S, C>,
    persisted_tx: &mpsc::UnboundedSender<crate::Result<Note>>,
    persisted_rx: &mut mpsc::UnboundedReceiver<crate::Result<Note>>,
) where
    S: NoteStore,
    C: RealtimeChannel,
{
    while session.persist_in_flight() {
        let Some(outcome) = persisted_rx.recv().await else {
            break;
        };
        if let Some(patch) = session.finish_persist(outcome) {
            spawn_write(session, patch, persisted_tx);
        }
    }
}
