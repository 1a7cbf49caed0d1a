//! Pusher channels transport over `tokio-tungstenite`.
//!
//! SYSTEM CONTEXT
//! ==============
//! The realtime backend speaks Pusher protocol 7. After the socket opens the
//! server sends `pusher:connection_established` with a socket ID. Private
//! channels need a signature from the REST backend's auth endpoint (a form
//! POST of `socket_id` and `channel_name`, bearer-authenticated) before the
//! `pusher:subscribe` is accepted.
//!
//! DESIGN
//! ======
//! One spawned worker per link runs a `select!` loop over the socket and the
//! manager's commands. It remembers which channels are wanted, so after a
//! drop it reconnects with exponential backoff (1s doubling, 30s cap) and
//! re-subscribes everything. Server error codes 4000-4099 are fatal per the
//! protocol: the worker stops and closes the link.

use std::collections::BTreeSet;
use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep, sleep_until, timeout};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};
use wire::protocol::{self, Envelope, ServerMessage};

use super::{Inbound, Link, Outbound, RealtimeError, Transport};
use crate::config::{HttpTimeouts, RealtimeConfig};

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);
const DEFAULT_ACTIVITY_TIMEOUT_SECS: u64 = 120;
const PONG_TIMEOUT: Duration = Duration::from_secs(30);
const PRIVATE_PREFIX: &str = "private-";

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;
type SocketSink = SplitSink<Socket, Message>;

// =============================================================================
// TRANSPORT
// =============================================================================

pub struct PusherTransport {
    config: RealtimeConfig,
    http: reqwest::Client,
    connect_timeout: Duration,
}

impl PusherTransport {
    /// # Errors
    ///
    /// Returns [`RealtimeError::Connect`] if the auth HTTP client cannot be built.
    pub fn new(config: RealtimeConfig, timeouts: HttpTimeouts) -> Result<Self, RealtimeError> {
        let http = reqwest::Client::builder()
            .timeout(timeouts.request())
            .connect_timeout(timeouts.connect())
            .build()
            .map_err(|e| RealtimeError::Connect(format!("http client build failed: {e}")))?;
        Ok(Self { config, http, connect_timeout: timeouts.connect() })
    }
}

#[async_trait::async_trait]
impl Transport for PusherTransport {
    async fn connect(&self, token: &str) -> Result<Link, RealtimeError> {
        let socket = open(&self.config.socket_url, self.connect_timeout).await?;

        let (outbound, commands) = mpsc::unbounded_channel();
        let (events, inbound) = mpsc::unbounded_channel();
        let worker = Worker {
            socket_url: self.config.socket_url.clone(),
            auth_endpoint: self.config.auth_endpoint.clone(),
            http: self.http.clone(),
            token: token.to_owned(),
            connect_timeout: self.connect_timeout,
            commands,
            events,
            channels: BTreeSet::new(),
        };
        tokio::spawn(worker.run(socket));
        info!(app_key = %self.config.app_key, cluster = %self.config.cluster, "pusher: socket opened");

        Ok(Link { outbound, inbound })
    }
}

async fn open(url: &str, connect_timeout: Duration) -> Result<Socket, RealtimeError> {
    match timeout(connect_timeout, connect_async(url)).await {
        Ok(Ok((socket, _response))) => Ok(socket),
        Ok(Err(e)) => Err(RealtimeError::Connect(e.to_string())),
        Err(_) => Err(RealtimeError::Connect(format!("timed out after {}s", connect_timeout.as_secs()))),
    }
}

async fn send(sink: &mut SocketSink, envelope: &Envelope) -> Result<(), tungstenite::Error> {
    sink.send(Message::Text(envelope.encode().into())).await
}

#[derive(Deserialize)]
struct AuthResponse {
    auth: String,
}

// =============================================================================
// WORKER
// =============================================================================

enum Ended {
    /// Closed on request, or a fatal server error. No reconnect.
    Closed,
    /// Connection lost. `established` once the handshake had completed.
    Dropped { established: bool },
}

struct Worker {
    socket_url: String,
    auth_endpoint: String,
    http: reqwest::Client,
    token: String,
    connect_timeout: Duration,
    commands: mpsc::UnboundedReceiver<Outbound>,
    events: mpsc::UnboundedSender<Inbound>,
    /// Channels the manager wants, kept across reconnects.
    channels: BTreeSet<String>,
}

impl Worker {
    async fn run(mut self, first: Socket) {
        let mut socket = Some(first);
        let mut backoff = INITIAL_BACKOFF;

        loop {
            let current = match socket.take() {
                Some(socket) => socket,
                None => match open(&self.socket_url, self.connect_timeout).await {
                    Ok(socket) => socket,
                    Err(e) => {
                        warn!(error = %e, retry_secs = backoff.as_secs(), "pusher: reconnect failed");
                        if !self.idle(backoff).await {
                            return;
                        }
                        backoff = (backoff * 2).min(MAX_BACKOFF);
                        continue;
                    }
                },
            };

            match self.serve(current).await {
                Ended::Closed => {
                    debug!("pusher: worker stopped");
                    return;
                }
                Ended::Dropped { established } => {
                    if established {
                        backoff = INITIAL_BACKOFF;
                    }
                    self.notify(Inbound::Disconnected);
                    warn!(retry_secs = backoff.as_secs(), "pusher: connection dropped");
                    if !self.idle(backoff).await {
                        return;
                    }
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
            }
        }
    }

    /// Wait out `delay` while still tracking channel intent. Returns false
    /// once the manager closed the link.
    async fn idle(&mut self, delay: Duration) -> bool {
        let deadline = sleep(delay);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                () = &mut deadline => return true,
                command = self.commands.recv() => match command {
                    Some(Outbound::Subscribe { channel }) => {
                        self.channels.insert(channel);
                    }
                    Some(Outbound::Unsubscribe { channel }) => {
                        self.channels.remove(&channel);
                    }
                    Some(Outbound::Close) | None => return false,
                },
            }
        }
    }

    async fn serve(&mut self, socket: Socket) -> Ended {
        let (mut sink, mut stream) = socket.split();
        let mut session = Session { socket_id: None, activity: Duration::from_secs(DEFAULT_ACTIVITY_TIMEOUT_SECS) };
        let mut idle_deadline = Instant::now() + session.activity;
        let mut awaiting_pong = false;

        loop {
            tokio::select! {
                frame = stream.next() => {
                    idle_deadline = Instant::now() + session.activity;
                    awaiting_pong = false;
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            if let Some(ended) = self.on_text(text.as_str(), &mut sink, &mut session).await {
                                return ended;
                            }
                        }
                        Some(Ok(Message::Ping(payload))) => {
                            if sink.send(Message::Pong(payload)).await.is_err() {
                                return session.dropped();
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => return session.dropped(),
                        Some(Err(e)) => {
                            warn!(error = %e, "pusher: socket error");
                            return session.dropped();
                        }
                        Some(Ok(_)) => {}
                    }
                }
                command = self.commands.recv() => {
                    let result = match command {
                        Some(Outbound::Subscribe { channel }) => {
                            match (self.channels.insert(channel.clone()), session.socket_id.clone()) {
                                (true, Some(socket_id)) => self.subscribe(&mut sink, &socket_id, &channel).await,
                                _ => Ok(()),
                            }
                        }
                        Some(Outbound::Unsubscribe { channel }) => {
                            if self.channels.remove(&channel) && session.socket_id.is_some() {
                                send(&mut sink, &protocol::unsubscribe_message(&channel)).await
                            } else {
                                Ok(())
                            }
                        }
                        Some(Outbound::Close) | None => {
                            let _ = sink.send(Message::Close(None)).await;
                            return Ended::Closed;
                        }
                    };
                    if result.is_err() {
                        return session.dropped();
                    }
                }
                () = sleep_until(idle_deadline) => {
                    if awaiting_pong {
                        warn!("pusher: no pong before timeout");
                        return session.dropped();
                    }
                    if send(&mut sink, &protocol::ping_message()).await.is_err() {
                        return session.dropped();
                    }
                    awaiting_pong = true;
                    idle_deadline = Instant::now() + PONG_TIMEOUT;
                }
            }
        }
    }

    async fn on_text(&mut self, text: &str, sink: &mut SocketSink, session: &mut Session) -> Option<Ended> {
        let message = match ServerMessage::parse(text) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "pusher: unparseable message");
                return None;
            }
        };

        match message {
            ServerMessage::ConnectionEstablished { socket_id, activity_timeout } => {
                if let Some(secs) = activity_timeout {
                    session.activity = Duration::from_secs(secs.max(1));
                }
                info!(%socket_id, "pusher: connection established");
                session.socket_id = Some(socket_id.clone());
                self.notify(Inbound::Connected { socket_id: socket_id.clone() });

                let wanted: Vec<String> = self.channels.iter().cloned().collect();
                for channel in wanted {
                    if self.subscribe(sink, &socket_id, &channel).await.is_err() {
                        return Some(session.dropped());
                    }
                }
            }
            ServerMessage::SubscriptionSucceeded { channel } => {
                self.notify(Inbound::SubscriptionSucceeded { channel });
            }
            ServerMessage::SubscriptionError { channel, message } => {
                self.channels.remove(&channel);
                self.notify(Inbound::SubscriptionError { channel, message });
            }
            ServerMessage::Error { code, message } => {
                self.notify(Inbound::Error(message.clone()));
                if code.is_some_and(|code| (4000..4100).contains(&code)) {
                    warn!(?code, %message, "pusher: fatal server error, not reconnecting");
                    return Some(Ended::Closed);
                }
            }
            ServerMessage::Ping => {
                if send(sink, &protocol::pong_message()).await.is_err() {
                    return Some(session.dropped());
                }
            }
            ServerMessage::Pong => {}
            ServerMessage::ChannelEvent { channel, event, data } => {
                self.notify(Inbound::Event { channel, name: event, data });
            }
            ServerMessage::Other { event } => debug!(%event, "pusher: message ignored"),
        }
        None
    }

    /// Authorize (for private channels) and send `pusher:subscribe`. An
    /// authorization failure is reported as a subscription error, not a
    /// socket failure.
    async fn subscribe(&mut self, sink: &mut SocketSink, socket_id: &str, channel: &str) -> Result<(), tungstenite::Error> {
        let auth = if channel.starts_with(PRIVATE_PREFIX) {
            match self.authorize(socket_id, channel).await {
                Ok(signature) => Some(signature),
                Err(e) => {
                    warn!(%channel, error = %e, "pusher: channel authorization failed");
                    self.channels.remove(channel);
                    self.notify(Inbound::SubscriptionError { channel: channel.to_owned(), message: e.to_string() });
                    return Ok(());
                }
            }
        } else {
            None
        };
        send(sink, &protocol::subscribe_message(channel, auth.as_deref())).await
    }

    async fn authorize(&self, socket_id: &str, channel: &str) -> Result<String, RealtimeError> {
        let response = self
            .http
            .post(&self.auth_endpoint)
            .bearer_auth(&self.token)
            .form(&[("socket_id", socket_id), ("channel_name", channel)])
            .send()
            .await
            .map_err(|e| RealtimeError::Auth(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RealtimeError::Auth(format!("auth endpoint returned {}", status.as_u16())));
        }
        let body: AuthResponse = response.json().await.map_err(|e| RealtimeError::Auth(e.to_string()))?;
        Ok(body.auth)
    }

    fn notify(&self, message: Inbound) {
        if self.events.send(message).is_err() {
            debug!("pusher: manager gone, notification dropped");
        }
    }
}

struct Session {
    socket_id: Option<String>,
    activity: Duration,
}

impl Session {
    fn dropped(&self) -> Ended {
        Ended::Dropped { established: self.socket_id.is_some() }
    }
}

#[cfg(test)]
#[path = "pusher_test.rs"]
mod tests;
