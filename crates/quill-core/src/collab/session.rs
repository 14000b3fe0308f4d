//! Collaborative session state machine for one note in one editor.
//!
//! Consistency is last-message-wins: a change broadcast from any other client
//! replaces the local title and content wholesale, with no merge and no
//! ordering check. Local edits are applied before anything else and never wait
//! on the network.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::time::Instant;

use super::persist::{PersistController, SaveStatus, DEFAULT_QUIET_PERIOD};
use super::presence::PresenceTable;
use crate::channel::{
    BroadcastMessage, ChangeMessage, ChannelError, ChannelEvent, CursorMessage, RealtimeChannel,
    SubscriptionState,
};
use crate::models::{LocalUser, Note, NoteId, NotePatch, RemotePeer};
use crate::store::NoteStore;

/// Realtime connection indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Connecting,
    Connected,
    /// Terminal: torn down, refused, or dropped by the transport
    Disconnected,
}

/// Which buffer field a local edit targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditField {
    Title,
    Content,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Quiet period after the last local edit before the buffer is saved
    pub quiet_period: Duration,
    /// Persist a dirty buffer once when the session closes
    pub flush_on_close: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            quiet_period: DEFAULT_QUIET_PERIOD,
            flush_on_close: false,
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    /// Initial fetch failed; the session cannot start
    #[error("Note not found or access denied: {0}")]
    Load(#[source] crate::Error),
    /// A save was rejected; editing continues
    #[error("Note not saved: {0}")]
    Persistence(#[source] crate::Error),
    /// Subscribe or broadcast failed; editing continues without peers
    #[error("Realtime unavailable: {0}")]
    Connectivity(#[from] ChannelError),
}

/// Everything the UI renders for an open editor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionView {
    pub note_id: NoteId,
    pub title: String,
    pub content: String,
    pub connection_state: ConnectionState,
    pub peers: Vec<RemotePeer>,
    pub save_status: SaveStatus,
    pub pending_persist: bool,
    pub last_persisted_at: Option<DateTime<Utc>>,
    /// Most recent realtime failure, if any
    pub connectivity_error: Option<String>,
}

/// One user's editing session of one note.
pub struct CollabSession<S: NoteStore, C: RealtimeChannel> {
    note_id: NoteId,
    local: LocalUser,
    title: String,
    content: String,
    connection: ConnectionState,
    presence: PresenceTable,
    persist: PersistController,
    store: Arc<S>,
    channel: C,
    config: SessionConfig,
    connectivity_error: Option<String>,
}

impl<S: NoteStore, C: RealtimeChannel> CollabSession<S, C> {
    /// Load the note, then join its channel.
    ///
    /// Only the load can fail; a channel that refuses the subscription leaves
    /// the session `Disconnected` but editable.
    pub async fn open(
        store: Arc<S>,
        channel: C,
        local: LocalUser,
        note_id: NoteId,
        config: SessionConfig,
    ) -> Result<Self, SessionError> {
        let note = store.get(&note_id).await.map_err(|error| {
            tracing::warn!(note_id = %note_id, "Failed to load note: {}", error);
            SessionError::Load(error)
        })?;

        let mut session = Self::new(store, channel, local, note_id, config);
        session.load_initial(&note);
        session.connect().await;
        Ok(session)
    }

    /// Build a session without touching the store or channel.
    pub fn new(
        store: Arc<S>,
        channel: C,
        local: LocalUser,
        note_id: NoteId,
        config: SessionConfig,
    ) -> Self {
        Self {
            presence: PresenceTable::new(local.id.clone()),
            persist: PersistController::new(config.quiet_period),
            note_id,
            local,
            title: String::new(),
            content: String::new(),
            connection: ConnectionState::Connecting,
            store,
            channel,
            config,
            connectivity_error: None,
        }
    }

    /// Seed the buffer from the stored record.
    pub fn load_initial(&mut self, note: &Note) {
        self.title.clone_from(&note.title);
        self.content = note.content_or_empty().to_string();
    }

    /// Run the subscribe handshake and announce presence once connected.
    pub async fn connect(&mut self) {
        match self.channel.subscribe().await {
            Ok(state) => self.apply_subscription(state).await,
            Err(error) => self.fail_connectivity(&SessionError::Connectivity(error)),
        }
    }

    async fn apply_subscription(&mut self, state: SubscriptionState) {
        match state {
            SubscriptionState::Connecting => {
                tracing::debug!(note_id = %self.note_id, "Channel handshake still pending");
            }
            SubscriptionState::Connected => {
                if self.connection == ConnectionState::Connected {
                    return;
                }
                self.connection = ConnectionState::Connected;
                self.connectivity_error = None;
                tracing::info!(
                    note_id = %self.note_id,
                    topic = self.channel.topic(),
                    "Joined collaboration channel"
                );
                let presence = self.local.presence();
                if let Err(error) = self.channel.track(&presence).await {
                    tracing::warn!(note_id = %self.note_id, "Failed to announce presence: {}", error);
                    self.connectivity_error = Some(error.to_string());
                }
            }
            SubscriptionState::Failed => {
                self.fail_connectivity(&SessionError::Connectivity(ChannelError::Rejected(
                    "subscription failed".to_string(),
                )));
            }
        }
    }

    fn fail_connectivity(&mut self, error: &SessionError) {
        tracing::warn!(note_id = %self.note_id, "{}", error);
        self.connection = ConnectionState::Disconnected;
        self.presence.clear();
        self.connectivity_error = Some(error.to_string());
    }

    /// Apply a local keystroke, broadcast the new buffer, restart the save timer.
    pub fn on_local_edit(&mut self, field: EditField, value: impl Into<String>) {
        match field {
            EditField::Title => self.title = value.into(),
            EditField::Content => self.content = value.into(),
        }

        let message = BroadcastMessage::Change(ChangeMessage {
            sender_id: self.local.id.clone(),
            title: self.title.clone(),
            content: self.content.clone(),
        });
        self.send(&message);
        self.persist.on_local_edit(Instant::now());
    }

    /// Add `text` as a new last line of the content.
    pub fn on_local_append(&mut self, text: &str) {
        let content = if self.content.is_empty() {
            text.to_string()
        } else {
            format!("{}\n{text}", self.content)
        };
        self.on_local_edit(EditField::Content, content);
    }

    /// Broadcast the local caret position; no debounce.
    pub fn on_local_cursor_move(&mut self, offset: usize) {
        let message = BroadcastMessage::Cursor(CursorMessage {
            sender_id: self.local.id.clone(),
            offset,
        });
        self.send(&message);
    }

    fn send(&self, message: &BroadcastMessage) {
        if let Err(error) = self.channel.broadcast(message) {
            tracing::debug!(
                note_id = %self.note_id,
                event = message.event_name(),
                "Broadcast dropped: {}",
                error
            );
        }
    }

    /// Overwrite the buffer with a remote change. Returns whether it applied.
    pub fn on_remote_change(&mut self, message: &ChangeMessage) -> bool {
        if message.sender_id == self.local.id {
            return false;
        }
        self.title.clone_from(&message.title);
        self.content.clone_from(&message.content);
        self.presence.touch(&message.sender_id, Utc::now());
        true
    }

    /// Move a known peer's caret. Local and unknown senders are ignored.
    pub fn on_remote_cursor_move(&mut self, message: &CursorMessage) -> bool {
        if message.sender_id == self.local.id {
            return false;
        }
        self.presence
            .update_cursor(&message.sender_id, message.offset, Utc::now())
    }

    /// Dispatch one channel event.
    pub async fn handle_event(&mut self, event: ChannelEvent) {
        let now = Utc::now();
        match event {
            ChannelEvent::Broadcast(BroadcastMessage::Change(message)) => {
                if self.on_remote_change(&message) {
                    tracing::trace!(note_id = %self.note_id, peer = %message.sender_id, "Applied remote change");
                }
            }
            ChannelEvent::Broadcast(BroadcastMessage::Cursor(message)) => {
                self.on_remote_cursor_move(&message);
            }
            ChannelEvent::PresenceSync(snapshot) => self.presence.apply_sync(&snapshot, now),
            ChannelEvent::PresenceJoin { peer_id, meta } => {
                if self.presence.apply_join(&peer_id, &meta, now) {
                    tracing::debug!(note_id = %self.note_id, peer = %peer_id, "Peer joined");
                }
            }
            ChannelEvent::PresenceLeave { peer_id } => {
                if self.presence.apply_leave(&peer_id).is_some() {
                    tracing::debug!(note_id = %self.note_id, peer = %peer_id, "Peer left");
                }
            }
            ChannelEvent::Subscription(state) => self.apply_subscription(state).await,
            ChannelEvent::Closed { reason } => {
                self.fail_connectivity(&SessionError::Connectivity(ChannelError::Closed(reason)));
            }
        }
    }

    /// Pull the next channel event. Cancel-safe.
    pub async fn next_channel_event(&mut self) -> Option<ChannelEvent> {
        self.channel.next_event().await
    }

    /// When the debounce timer fires next, if armed.
    #[must_use]
    pub const fn persist_deadline(&self) -> Option<Instant> {
        self.persist.deadline()
    }

    /// If the quiet period has elapsed, return the patch to write.
    ///
    /// Returns `None` when nothing is due, or when another write is still
    /// running; that write's completion hands back the queued patch.
    pub fn take_due_patch(&mut self, now: Instant) -> Option<NotePatch> {
        if !self.persist.fire_if_due(now) {
            return None;
        }
        self.begin_persist()
    }

    fn begin_persist(&mut self) -> Option<NotePatch> {
        self.persist
            .begin()
            .then(|| NotePatch::from_buffer(&self.title, &self.content))
    }

    /// Record a finished write. Failures are logged and shown, not retried.
    ///
    /// Returns the next patch when a save came due while this one ran.
    pub fn finish_persist(&mut self, outcome: crate::Result<Note>) -> Option<NotePatch> {
        let follow_up = match outcome {
            Ok(note) => {
                tracing::debug!(note_id = %self.note_id, "Auto-saved note");
                self.persist.finish(Ok(&note))
            }
            Err(error) => {
                let error = SessionError::Persistence(error);
                tracing::error!(note_id = %self.note_id, "{}", error);
                self.persist.finish(Err(error.to_string()))
            }
        };
        if follow_up {
            self.begin_persist()
        } else {
            None
        }
    }

    /// A store write is running.
    #[must_use]
    pub const fn persist_in_flight(&self) -> bool {
        self.persist.in_flight()
    }

    /// Write the buffer now if the debounce deadline has passed.
    pub async fn persist_if_due(&mut self, now: Instant) {
        if let Some(patch) = self.take_due_patch(now) {
            self.write_through(patch).await;
        }
    }

    async fn write_through(&mut self, mut patch: NotePatch) {
        loop {
            let outcome = self.store.update(&self.note_id, &patch).await;
            match self.finish_persist(outcome) {
                Some(next) => patch = next,
                None => break,
            }
        }
    }

    /// Tear down: drop or flush the pending save, then leave the channel.
    pub async fn close(mut self) -> SessionView {
        if self.persist.cancel() && self.config.flush_on_close {
            if let Some(patch) = self.begin_persist() {
                self.write_through(patch).await;
            }
        }

        if let Err(error) = self.channel.unsubscribe().await {
            tracing::warn!(note_id = %self.note_id, "Failed to leave channel: {}", error);
        }
        self.connection = ConnectionState::Disconnected;
        self.presence.clear();
        tracing::info!(note_id = %self.note_id, "Closed collaboration session");
        self.view()
    }

    /// Snapshot for rendering.
    #[must_use]
    pub fn view(&self) -> SessionView {
        SessionView {
            note_id: self.note_id.clone(),
            title: self.title.clone(),
            content: self.content.clone(),
            connection_state: self.connection,
            peers: self.presence.peers(),
            save_status: self.persist.status().clone(),
            pending_persist: self.persist.pending_persist(),
            last_persisted_at: self.persist.last_persisted_at(),
            connectivity_error: self.connectivity_error.clone(),
        }
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    #[must_use]
    pub const fn connection_state(&self) -> ConnectionState {
        self.connection
    }

    #[must_use]
    pub const fn presence(&self) -> &PresenceTable {
        &self.presence
    }

    #[must_use]
    pub const fn note_id(&self) -> &NoteId {
        &self.note_id
    }

    #[must_use]
    pub const fn local_user(&self) -> &LocalUser {
        &self.local
    }

    #[must_use]
    pub fn store(&self) -> Arc<S> {
        Arc::clone(&self.store)
    }

    #[must_use]
    pub const fn writes_issued(&self) -> u64 {
        self.persist.writes_issued()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{LocalChannel, LocalHub};
    use crate::models::PresenceMeta;
    use crate::store::MemoryNoteStore;
    use pretty_assertions::assert_eq;

    type TestSession = CollabSession<MemoryNoteStore, LocalChannel>;

    async fn seeded_store() -> (Arc<MemoryNoteStore>, NoteId) {
        let store = Arc::new(MemoryNoteStore::new());
        let id: NoteId = "note-1".parse().unwrap();
        store.insert(Note::new(id.clone(), "T", "C")).await;
        (store, id)
    }

    async fn open(hub: &LocalHub, store: &Arc<MemoryNoteStore>, id: &NoteId, user: &str) -> TestSession {
        CollabSession::open(
            Arc::clone(store),
            hub.join(id.topic(), user),
            LocalUser::new(user, user.to_uppercase()),
            id.clone(),
            SessionConfig::default(),
        )
        .await
        .unwrap()
    }

    async fn pump(session: &mut TestSession) {
        while let Ok(Some(event)) =
            tokio::time::timeout(Duration::from_millis(1), session.next_channel_event()).await
        {
            session.handle_event(event).await;
        }
    }

    #[tokio::test]
    async fn open_seeds_buffer_and_connects() {
        let hub = LocalHub::new();
        let (store, id) = seeded_store().await;
        let session = open(&hub, &store, &id, "a").await;
        assert_eq!(session.title(), "T");
        assert_eq!(session.content(), "C");
        assert_eq!(session.connection_state(), ConnectionState::Connected);
        assert_eq!(session.view().save_status, SaveStatus::Idle);
    }

    #[tokio::test]
    async fn open_fails_with_load_error_for_missing_note() {
        let hub = LocalHub::new();
        let store = Arc::new(MemoryNoteStore::new());
        let id: NoteId = "missing".parse().unwrap();
        let result = CollabSession::open(
            store,
            hub.join(id.topic(), "a"),
            LocalUser::new("a", "A"),
            id,
            SessionConfig::default(),
        )
        .await;
        assert!(matches!(result, Err(SessionError::Load(_))));
    }

    #[tokio::test]
    async fn refused_subscription_still_allows_editing() {
        let hub = LocalHub::new();
        hub.refuse_joins(true);
        let (store, id) = seeded_store().await;
        let mut session = open(&hub, &store, &id, "a").await;
        assert_eq!(session.connection_state(), ConnectionState::Disconnected);
        assert!(session.view().connectivity_error.is_some());

        session.on_local_edit(EditField::Content, "offline edit");
        assert_eq!(session.content(), "offline edit");
        assert!(session.view().pending_persist);
    }

    #[tokio::test]
    async fn self_sent_change_is_ignored() {
        let hub = LocalHub::new();
        let (store, id) = seeded_store().await;
        let mut session = open(&hub, &store, &id, "a").await;

        let echo = ChangeMessage {
            sender_id: "a".into(),
            title: "echo".into(),
            content: "echo".into(),
        };
        assert!(!session.on_remote_change(&echo));
        assert_eq!(session.title(), "T");
        assert_eq!(session.content(), "C");
    }

    #[tokio::test]
    async fn last_received_change_wins() {
        let hub = LocalHub::new();
        let (store, id) = seeded_store().await;
        let mut session = open(&hub, &store, &id, "me").await;

        let from_b = ChangeMessage {
            sender_id: "b".into(),
            title: "B title".into(),
            content: "B body".into(),
        };
        let from_a = ChangeMessage {
            sender_id: "a".into(),
            title: "A title".into(),
            content: "A body".into(),
        };
        // B's change was produced last but A's arrives last.
        session.on_remote_change(&from_b);
        session.on_remote_change(&from_a);
        assert_eq!(session.content(), "A body");

        session.on_remote_change(&from_b);
        assert_eq!(session.title(), "B title");
        assert_eq!(session.content(), "B body");
    }

    #[tokio::test]
    async fn remote_change_carries_senders_full_buffer() {
        let hub = LocalHub::new();
        let (store, id) = seeded_store().await;
        let mut a = open(&hub, &store, &id, "a").await;
        let mut b = open(&hub, &store, &id, "b").await;
        pump(&mut a).await;
        pump(&mut b).await;

        b.on_local_edit(EditField::Title, "B's own title");
        pump(&mut a).await;

        a.on_local_edit(EditField::Content, "C2");
        pump(&mut b).await;

        // A already holds B's title and sends it back with the new content.
        assert_eq!(b.title(), "B's own title");
        assert_eq!(b.content(), "C2");
    }

    #[tokio::test]
    async fn remote_change_discards_unseen_local_title() {
        let hub = LocalHub::new();
        let (store, id) = seeded_store().await;
        let mut a = open(&hub, &store, &id, "a").await;
        let mut b = open(&hub, &store, &id, "b").await;
        pump(&mut a).await;
        pump(&mut b).await;

        a.on_local_edit(EditField::Content, "C2");
        b.on_local_edit(EditField::Title, "B's own title");
        pump(&mut b).await;

        assert_eq!(b.title(), "T");
        assert_eq!(b.content(), "C2");
    }

    #[tokio::test]
    async fn cursor_moves_update_known_peers_only() {
        let hub = LocalHub::new();
        let (store, id) = seeded_store().await;
        let mut a = open(&hub, &store, &id, "a").await;
        let mut b = open(&hub, &store, &id, "b").await;
        pump(&mut a).await;
        pump(&mut b).await;

        b.on_local_cursor_move(5);
        b.on_local_cursor_move(6);
        pump(&mut a).await;
        let peer = a.presence().get(&"b".into()).unwrap().clone();
        assert_eq!(peer.cursor_offset, 6);
        assert_eq!(peer.display_name, "B");
        assert_eq!(a.content(), "C");

        assert!(!a.on_remote_cursor_move(&CursorMessage {
            sender_id: "ghost".into(),
            offset: 1,
        }));
        assert!(!a.on_remote_cursor_move(&CursorMessage {
            sender_id: "a".into(),
            offset: 1,
        }));
    }

    #[tokio::test]
    async fn presence_tracks_join_and_leave() {
        let hub = LocalHub::new();
        let (store, id) = seeded_store().await;
        let mut a = open(&hub, &store, &id, "a").await;
        let b = open(&hub, &store, &id, "b").await;
        pump(&mut a).await;
        assert_eq!(a.view().peers.len(), 1);
        assert!(a.presence().get(&"a".into()).is_none());

        b.close().await;
        pump(&mut a).await;
        assert!(a.view().peers.is_empty());
        assert_eq!(hub.member_count(&id.topic()), 1);
    }

    #[tokio::test]
    async fn leave_wins_over_earlier_sync() {
        let hub = LocalHub::new();
        let (store, id) = seeded_store().await;
        let mut a = open(&hub, &store, &id, "a").await;
        pump(&mut a).await;

        let meta = PresenceMeta {
            name: Some("x".into()),
            cursor_position: None,
        };
        a.handle_event(ChannelEvent::PresenceJoin {
            peer_id: "x".into(),
            meta: meta.clone(),
        })
        .await;
        a.handle_event(ChannelEvent::PresenceSync(
            [("x".into(), meta)].into_iter().collect(),
        ))
        .await;
        a.handle_event(ChannelEvent::PresenceLeave {
            peer_id: "x".into(),
        })
        .await;
        assert!(!a.presence().contains(&"x".into()));
    }

    #[tokio::test]
    async fn transport_close_marks_disconnected() {
        let hub = LocalHub::new();
        let (store, id) = seeded_store().await;
        let mut a = open(&hub, &store, &id, "a").await;
        hub.close_topic(&id.topic(), "server restart");
        pump(&mut a).await;
        assert_eq!(a.connection_state(), ConnectionState::Disconnected);

        a.on_local_edit(EditField::Content, "still typing");
        assert_eq!(a.content(), "still typing");
    }

    #[tokio::test(start_paused = true)]
    async fn persist_after_quiet_period_writes_buffer() {
        let hub = LocalHub::new();
        let (store, id) = seeded_store().await;
        let mut a = open(&hub, &store, &id, "a").await;

        a.on_local_edit(EditField::Content, "C2");
        a.persist_if_due(Instant::now()).await;
        assert_eq!(store.write_count().await, 0);

        tokio::time::advance(Duration::from_millis(2100)).await;
        a.persist_if_due(Instant::now()).await;

        assert_eq!(store.write_count().await, 1);
        assert_eq!(store.get(&id).await.unwrap().content.as_deref(), Some("C2"));
        assert!(matches!(a.view().save_status, SaveStatus::Saved { .. }));
        assert!(a.view().last_persisted_at.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn each_spaced_edit_is_written_even_when_unchanged() {
        let hub = LocalHub::new();
        let (store, id) = seeded_store().await;
        let mut a = open(&hub, &store, &id, "a").await;

        for text in ["C2", "C2 ", "C2"] {
            a.on_local_edit(EditField::Content, text);
            tokio::time::advance(Duration::from_millis(2500)).await;
            a.persist_if_due(Instant::now()).await;
        }

        assert_eq!(store.write_count().await, 3);
        assert_eq!(store.get(&id).await.unwrap().content.as_deref(), Some("C2"));
    }

    #[tokio::test]
    async fn local_append_builds_on_current_buffer() {
        let hub = LocalHub::new();
        let (store, id) = seeded_store().await;
        let mut a = open(&hub, &store, &id, "a").await;

        a.on_local_append("x");
        a.on_local_append("y");
        assert_eq!(a.content(), "C\nx\ny");
        assert!(a.view().pending_persist);

        a.on_local_edit(EditField::Content, "");
        a.on_local_append("first");
        assert_eq!(a.content(), "first");
    }

    #[tokio::test(start_paused = true)]
    async fn failed_persist_keeps_buffer_and_does_not_retry() {
        let hub = LocalHub::new();
        let (store, id) = seeded_store().await;
        let mut a = open(&hub, &store, &id, "a").await;
        store.fail_writes(true);

        a.on_local_edit(EditField::Content, "unsaved");
        tokio::time::advance(Duration::from_millis(2000)).await;
        a.persist_if_due(Instant::now()).await;

        assert_eq!(a.content(), "unsaved");
        assert!(matches!(a.view().save_status, SaveStatus::Failed { .. }));
        assert_eq!(a.persist_deadline(), None);

        tokio::time::advance(Duration::from_secs(10)).await;
        a.persist_if_due(Instant::now()).await;
        assert_eq!(a.writes_issued(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn close_discards_pending_save_by_default() {
        let hub = LocalHub::new();
        let (store, id) = seeded_store().await;
        let mut a = open(&hub, &store, &id, "a").await;
        a.on_local_edit(EditField::Content, "lost on close");

        let view = a.close().await;
        tokio::time::advance(Duration::from_secs(5)).await;

        assert_eq!(view.connection_state, ConnectionState::Disconnected);
        assert_eq!(store.write_count().await, 0);
        assert_eq!(store.get(&id).await.unwrap().content.as_deref(), Some("C"));
    }

    #[tokio::test(start_paused = true)]
    async fn close_flushes_pending_save_when_configured() {
        let hub = LocalHub::new();
        let (store, id) = seeded_store().await;
        let mut a = CollabSession::open(
            Arc::clone(&store),
            hub.join(id.topic(), "a"),
            LocalUser::new("a", "A"),
            id.clone(),
            SessionConfig {
                flush_on_close: true,
                ..SessionConfig::default()
            },
        )
        .await
        .unwrap();
        a.on_local_edit(EditField::Content, "kept on close");

        a.close().await;

        assert_eq!(store.write_count().await, 1);
        assert_eq!(
            store.get(&id).await.unwrap().content.as_deref(),
            Some("kept on close")
        );
    }
}
