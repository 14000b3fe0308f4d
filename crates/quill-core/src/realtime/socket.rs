//! WebSocket transport for Supabase Realtime channels.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{SplitStream, StreamExt};
use futures::SinkExt;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

use super::wire::{channel_topic, Frame, Inbound, PresenceMirror};
use crate::channel::{
    BroadcastMessage, ChannelError, ChannelEvent, RealtimeChannel, SubscriptionState,
};
use crate::models::{PeerId, PresenceMeta};

pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(25);
pub const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_secs(10);

const PROTOCOL_VERSION: &str = "1.0.0";
const SOCKET_PATH: &str = "/realtime/v1/websocket";

type SocketReader = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

#[derive(Clone, PartialEq, Eq)]
pub struct RealtimeConfig {
    /// Project URL, e.g. `https://<ref>.supabase.co`
    pub url: String,
    pub anon_key: String,
    pub access_token: Option<String>,
    pub heartbeat_interval: Duration,
    pub join_timeout: Duration,
}

impl RealtimeConfig {
    #[must_use]
    pub fn new(url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            anon_key: anon_key.into(),
            access_token: None,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            join_timeout: DEFAULT_JOIN_TIMEOUT,
        }
    }
}

impl fmt::Debug for RealtimeConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("RealtimeConfig")
            .field("url", &self.url)
            .field("anon_key", &"[REDACTED]")
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("heartbeat_interval", &self.heartbeat_interval)
            .field("join_timeout", &self.join_timeout)
            .finish()
    }
}

/// Build the websocket endpoint for a project URL.
pub fn socket_url(project_url: &str, anon_key: &str) -> Result<Url, ChannelError> {
    let mut url = Url::parse(project_url.trim())
        .map_err(|error| ChannelError::Protocol(format!("invalid realtime URL: {error}")))?;
    let scheme = match url.scheme() {
        "https" | "wss" => "wss",
        "http" | "ws" => "ws",
        other => {
            return Err(ChannelError::Protocol(format!(
                "unsupported realtime URL scheme: {other}"
            )))
        }
    };
    url.set_scheme(scheme)
        .map_err(|()| ChannelError::Protocol("cannot switch URL to websocket scheme".into()))?;

    let base_path = url.path().trim_end_matches('/').to_string();
    url.set_path(&format!("{base_path}{SOCKET_PATH}"));
    url.query_pairs_mut()
        .clear()
        .append_pair("apikey", anon_key)
        .append_pair("vsn", PROTOCOL_VERSION);
    Ok(url)
}

/// Opens Realtime channels against one project.
#[derive(Debug, Clone)]
pub struct RealtimeClient {
    config: Arc<RealtimeConfig>,
}

impl RealtimeClient {
    #[must_use]
    pub fn new(config: RealtimeConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// Channel `name` with presence keyed by `presence_key`. Nothing is sent
    /// until [`RealtimeChannel::subscribe`].
    #[must_use]
    pub fn channel(&self, name: &str, presence_key: impl Into<PeerId>) -> SocketChannel {
        SocketChannel {
            config: Arc::clone(&self.config),
            name: name.to_string(),
            topic: channel_topic(name),
            presence_key: presence_key.into(),
            refs: Arc::new(AtomicU64::new(1)),
            connection: None,
        }
    }
}

struct Connection {
    outbound: mpsc::UnboundedSender<Message>,
    events: mpsc::UnboundedReceiver<ChannelEvent>,
    writer: JoinHandle<()>,
    reader: JoinHandle<()>,
    heartbeat: JoinHandle<()>,
}

impl Connection {
    fn abort(&self) {
        self.heartbeat.abort();
        self.reader.abort();
        self.writer.abort();
    }
}

/// One Realtime channel over its own websocket.
pub struct SocketChannel {
    config: Arc<RealtimeConfig>,
    name: String,
    topic: String,
    presence_key: PeerId,
    refs: Arc<AtomicU64>,
    connection: Option<Connection>,
}

impl SocketChannel {
    fn next_ref(&self) -> String {
        next_ref(&self.refs)
    }

    fn send_frame(&self, frame: &Frame) -> Result<(), ChannelError> {
        let connection = self.connection.as_ref().ok_or(ChannelError::NotSubscribed)?;
        connection
            .outbound
            .send(Message::Text(frame.encode()?))
            .map_err(|_| ChannelError::Closed("socket writer stopped".into()))
    }
}

fn next_ref(refs: &AtomicU64) -> String {
    refs.fetch_add(1, Ordering::Relaxed).to_string()
}

#[async_trait]
impl RealtimeChannel for SocketChannel {
    fn topic(&self) -> &str {
        &self.name
    }

    async fn subscribe(&mut self) -> Result<SubscriptionState, ChannelError> {
        if self.connection.is_some() {
            return Ok(SubscriptionState::Connected);
        }

        let url = socket_url(&self.config.url, &self.config.anon_key)?;
        tracing::debug!(topic = %self.topic, host = url.host_str().unwrap_or_default(), "Opening realtime socket");
        let (stream, _) = connect_async(url.as_str()).await?;
        let (mut sink, source) = stream.split();

        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Message>();
        let (event_tx, events) = mpsc::unbounded_channel();
        let (ack_tx, ack_rx) = oneshot::channel();
        let join_ref = self.next_ref();

        let writer = tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                if let Err(error) = sink.send(message).await {
                    tracing::debug!("Realtime socket write failed: {}", error);
                    break;
                }
            }
            let _ = sink.close().await;
        });

        let reader = tokio::spawn(read_frames(
            source,
            self.topic.clone(),
            join_ref.clone(),
            ack_tx,
            event_tx,
        ));

        let heartbeat = {
            let outbound = outbound.clone();
            let refs = Arc::clone(&self.refs);
            let period = self.config.heartbeat_interval;
            tokio::spawn(async move {
                let mut ticker = interval(period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    let Ok(text) = Frame::heartbeat(next_ref(&refs)).encode() else {
                        break;
                    };
                    if outbound.send(Message::Text(text)).is_err() {
                        break;
                    }
                }
            })
        };

        self.connection = Some(Connection {
            outbound,
            events,
            writer,
            reader,
            heartbeat,
        });

        let join = Frame::join(
            &self.topic,
            join_ref,
            &self.presence_key,
            self.config.access_token.as_deref(),
        );
        self.send_frame(&join)?;

        match timeout(self.config.join_timeout, ack_rx).await {
            Ok(Ok(Ok(()))) => Ok(SubscriptionState::Connected),
            Ok(Ok(Err(reason))) => {
                self.shutdown();
                Err(ChannelError::Rejected(reason))
            }
            Ok(Err(_)) => {
                self.shutdown();
                Err(ChannelError::Closed("socket closed during join".into()))
            }
            Err(_) => {
                tracing::warn!(topic = %self.topic, "Realtime join reply is late; continuing");
                Ok(SubscriptionState::Connecting)
            }
        }
    }

    async fn track(&mut self, meta: &PresenceMeta) -> Result<(), ChannelError> {
        let frame = Frame::track(&self.topic, self.next_ref(), meta)?;
        self.send_frame(&frame)
    }

    fn broadcast(&self, message: &BroadcastMessage) -> Result<(), ChannelError> {
        let frame = Frame::broadcast(&self.topic, message.event_name(), message.to_payload()?);
        self.send_frame(&frame)
    }

    async fn next_event(&mut self) -> Option<ChannelEvent> {
        match self.connection.as_mut() {
            Some(connection) => connection.events.recv().await,
            None => None,
        }
    }

    async fn unsubscribe(&mut self) -> Result<(), ChannelError> {
        let Some(connection) = self.connection.take() else {
            return Ok(());
        };
        let leave = Frame::leave(&self.topic, self.next_ref()).encode()?;
        let _ = connection.outbound.send(Message::Text(leave));
        let _ = connection.outbound.send(Message::Close(None));

        connection.heartbeat.abort();
        connection.reader.abort();
        drop(connection.outbound);
        if timeout(Duration::from_secs(1), connection.writer).await.is_err() {
            tracing::debug!(topic = %self.topic, "Realtime socket did not close in time");
        }
        Ok(())
    }
}

impl SocketChannel {
    fn shutdown(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.abort();
        }
    }
}

impl Drop for SocketChannel {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn read_frames(
    mut source: SocketReader,
    topic: String,
    join_ref: String,
    ack: oneshot::Sender<Result<(), String>>,
    events: mpsc::UnboundedSender<ChannelEvent>,
) {
    let mut ack = Some(ack);
    let mut mirror = PresenceMirror::default();

    let reason = loop {
        let text = match source.next().await {
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(Message::Close(_))) | None => break "socket closed".to_string(),
            Some(Ok(_)) => continue,
            Some(Err(error)) => break error.to_string(),
        };

        let frame = match Frame::decode(&text) {
            Ok(frame) if frame.topic == topic => frame,
            Ok(_) => continue,
            Err(error) => {
                tracing::debug!(topic = %topic, "Skipping malformed realtime frame: {}", error);
                continue;
            }
        };

        let inbound = match frame.classify() {
            Ok(inbound) => inbound,
            Err(error) => {
                tracing::debug!(topic = %topic, "Skipping unreadable realtime frame: {}", error);
                continue;
            }
        };

        let emitted = match inbound {
            Inbound::Reply {
                reference,
                ok,
                reason,
            } if reference.as_deref() == Some(join_ref.as_str()) => {
                let outcome = if ok {
                    Ok(())
                } else {
                    Err(reason.unwrap_or_else(|| "join refused".to_string()))
                };
                match ack.take() {
                    Some(waiting) => match waiting.send(outcome) {
                        Ok(()) => Vec::new(),
                        Err(late) => vec![ChannelEvent::Subscription(if late.is_ok() {
                            SubscriptionState::Connected
                        } else {
                            SubscriptionState::Failed
                        })],
                    },
                    None => Vec::new(),
                }
            }
            Inbound::Reply { .. } | Inbound::Ignored => Vec::new(),
            Inbound::Broadcast { event, payload } => match BroadcastMessage::decode(&event, payload) {
                Ok(Some(message)) => vec![ChannelEvent::Broadcast(message)],
                Ok(None) => Vec::new(),
                Err(error) => {
                    tracing::debug!(topic = %topic, event = %event, "Dropping bad broadcast: {}", error);
                    Vec::new()
                }
            },
            Inbound::PresenceState(state) => mirror.apply_state(state),
            Inbound::PresenceDiff(diff) => mirror.apply_diff(diff),
            Inbound::Closed(reason) => break reason,
        };

        for event in emitted {
            if events.send(event).is_err() {
                return;
            }
        }
    };

    tracing::info!(topic = %topic, reason = %reason, "Realtime channel closed");
    let _ = events.send(ChannelEvent::Closed { reason });
}
