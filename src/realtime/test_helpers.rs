//! Scripted transport for manager and controller tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Duration, timeout};
use wire::BoardEvent;

use super::{ChannelMessage, Inbound, Link, Outbound, RealtimeError, Transport};

/// The transport's side of one accepted link.
pub(crate) struct ServerEnd {
    pub token: String,
    pub commands: mpsc::UnboundedReceiver<Outbound>,
    pub inbound: mpsc::UnboundedSender<Inbound>,
}

impl ServerEnd {
    pub(crate) async fn next_command(&mut self) -> Outbound {
        timeout(Duration::from_millis(500), self.commands.recv())
            .await
            .expect("transport command timed out")
            .expect("manager dropped its outbound sender")
    }

    pub(crate) async fn assert_no_command(&mut self) {
        if let Ok(Some(command)) = timeout(Duration::from_millis(80), self.commands.recv()).await {
            panic!("expected no transport command, got {command:?}");
        }
    }

    pub(crate) fn send(&self, message: Inbound) {
        self.inbound.send(message).expect("manager pump should be running");
    }

    pub(crate) fn confirm(&self, channel: &str) {
        self.send(Inbound::SubscriptionSucceeded { channel: channel.to_owned() });
    }

    pub(crate) fn emit(&self, channel: &str, event: &BoardEvent) {
        self.send(Inbound::Event { channel: channel.to_owned(), name: event.name().to_owned(), data: event.payload() });
    }
}

/// Transport whose links are handed to the test through a channel.
pub(crate) struct MockTransport {
    accepted: mpsc::UnboundedSender<ServerEnd>,
    refuse: AtomicBool,
    attempts: AtomicUsize,
}

impl MockTransport {
    pub(crate) fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ServerEnd>) {
        let (accepted, rx) = mpsc::unbounded_channel();
        let transport = Self { accepted, refuse: AtomicBool::new(false), attempts: AtomicUsize::new(0) };
        (Arc::new(transport), rx)
    }

    pub(crate) fn refuse_connections(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    pub(crate) fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Transport for MockTransport {
    async fn connect(&self, token: &str) -> Result<Link, RealtimeError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.refuse.load(Ordering::SeqCst) {
            return Err(RealtimeError::Connect("connection refused".into()));
        }
        let (outbound, commands) = mpsc::unbounded_channel();
        let (inbound_tx, inbound) = mpsc::unbounded_channel();
        let end = ServerEnd { token: token.to_owned(), commands, inbound: inbound_tx };
        self.accepted
            .send(end)
            .map_err(|_| RealtimeError::Connect("test dropped the accept queue".into()))?;
        Ok(Link { outbound, inbound })
    }
}

pub(crate) async fn accept(accepted: &mut mpsc::UnboundedReceiver<ServerEnd>) -> ServerEnd {
    timeout(Duration::from_millis(500), accepted.recv())
        .await
        .expect("no transport connection")
        .expect("transport dropped")
}

/// Serve a link that reports `Connected`, confirms every subscribe, and
/// forwards the commands it saw. Returns a sender for pushing events.
pub(crate) fn auto_confirm(mut end: ServerEnd) -> (mpsc::UnboundedSender<Inbound>, mpsc::UnboundedReceiver<Outbound>, JoinHandle<()>) {
    let inbound = end.inbound.clone();
    let (seen_tx, seen_rx) = mpsc::unbounded_channel();
    let _ = end.inbound.send(Inbound::Connected { socket_id: "1.1".into() });
    let task = tokio::spawn(async move {
        while let Some(command) = end.commands.recv().await {
            if let Outbound::Subscribe { channel } = &command {
                let _ = end.inbound.send(Inbound::SubscriptionSucceeded { channel: channel.clone() });
            }
            let _ = seen_tx.send(command);
        }
    });
    (inbound, seen_rx, task)
}

pub(crate) async fn recv_message(rx: &mut mpsc::UnboundedReceiver<ChannelMessage>) -> ChannelMessage {
    timeout(Duration::from_millis(500), rx.recv())
        .await
        .expect("channel message timed out")
        .expect("listener channel closed")
}

pub(crate) async fn assert_no_message(rx: &mut mpsc::UnboundedReceiver<ChannelMessage>) {
    if let Ok(Some(message)) = timeout(Duration::from_millis(80), rx.recv()).await {
        panic!("expected no channel message, got {message:?}");
    }
}
