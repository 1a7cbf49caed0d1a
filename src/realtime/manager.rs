//! Board channel subscription manager.
//!
//! DESIGN
//! ======
//! At most one board channel is intended at any time. Every subscription
//! gets a fresh [`SubscriptionHandle`] id, and every inbound notification is
//! compared against the current intent before it is routed. That single
//! check covers late join confirmations, events for a channel being torn
//! down, and listeners bound with an outdated handle.
//!
//! Listener table: one sink per subscription. `bind` replaces it, and
//! switching boards drops the old sink before the new channel is requested,
//! so old listeners can never observe new-board traffic.
//!
//! ERROR HANDLING
//! ==============
//! Connection failures are logged and reflected in [`ChannelManager::is_connected`];
//! they never propagate out of `connect`. Subscription failures clear the
//! current intent and reach the bound sink as [`ChannelSignal::Failed`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;
use wire::{BoardEvent, channel_name};

use super::{Inbound, Link, Outbound, RealtimeError, Transport};
use crate::auth::AuthProvider;

// =============================================================================
// TYPES
// =============================================================================

/// Identity of one subscription attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionHandle {
    pub board_id: String,
    pub channel: String,
    pub id: Uuid,
}

/// What a bound listener receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelSignal {
    /// The server confirmed the subscription.
    Joined,
    Event(BoardEvent),
    /// The subscription was rejected or the link gave up. Intent is cleared.
    Failed(String),
}

/// A signal tagged with the subscription it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelMessage {
    pub board_id: String,
    pub subscription: Uuid,
    pub signal: ChannelSignal,
}

struct ActiveLink {
    id: u64,
    outbound: mpsc::UnboundedSender<Outbound>,
    pump: JoinHandle<()>,
}

struct Current {
    handle: SubscriptionHandle,
    joined: bool,
    sink: Option<mpsc::UnboundedSender<ChannelMessage>>,
}

impl Current {
    fn notify(&self, signal: ChannelSignal) {
        let Some(sink) = &self.sink else {
            debug!(board_id = %self.handle.board_id, "realtime: no listener bound, signal dropped");
            return;
        };
        let message = ChannelMessage {
            board_id: self.handle.board_id.clone(),
            subscription: self.handle.id,
            signal,
        };
        if sink.send(message).is_err() {
            debug!(board_id = %self.handle.board_id, "realtime: listener gone");
        }
    }
}

#[derive(Default)]
struct ManagerState {
    link: Option<ActiveLink>,
    current: Option<Current>,
    next_link_id: u64,
}

struct Shared {
    state: Mutex<ManagerState>,
    connected: watch::Sender<bool>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, ManagerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// =============================================================================
// MANAGER
// =============================================================================

pub struct ChannelManager {
    transport: Arc<dyn Transport>,
    shared: Arc<Shared>,
    connecting: tokio::sync::Mutex<()>,
}

impl ChannelManager {
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        let (connected, _) = watch::channel(false);
        Self {
            transport,
            shared: Arc::new(Shared { state: Mutex::new(ManagerState::default()), connected }),
            connecting: tokio::sync::Mutex::new(()),
        }
    }

    /// Bring the transport up for the current auth state.
    ///
    /// Needs both a user and a token; otherwise tears everything down. A
    /// no-op when a link already exists. Failures only show up as
    /// `is_connected() == false`.
    pub async fn connect(&self, auth: &dyn AuthProvider) {
        let (Some(user_id), Some(token)) = (auth.current_user(), auth.token()) else {
            self.disconnect();
            return;
        };

        let _connecting = self.connecting.lock().await;
        if self.shared.lock().link.is_some() {
            return;
        }

        match self.transport.connect(&token).await {
            Ok(link) => {
                self.install(link);
                info!(%user_id, "realtime: link established");
            }
            Err(e) => {
                warn!(%user_id, error = %e, code = e.code(), "realtime: connect failed");
                self.shared.connected.send_replace(false);
            }
        }
    }

    fn install(&self, link: Link) {
        let Link { outbound, inbound } = link;
        let mut state = self.shared.lock();
        state.next_link_id += 1;
        let id = state.next_link_id;
        let pump = tokio::spawn(pump(Arc::clone(&self.shared), id, inbound));
        state.link = Some(ActiveLink { id, outbound, pump });
    }

    /// Close the link and release any subscription.
    pub fn disconnect(&self) {
        let (current, link) = {
            let mut state = self.shared.lock();
            (state.current.take(), state.link.take())
        };
        if let Some(current) = current {
            debug!(board_id = %current.handle.board_id, "realtime: subscription released");
        }
        if let Some(link) = link {
            let _ = link.outbound.send(Outbound::Close);
            link.pump.abort();
            info!("realtime: disconnected");
        }
        self.shared.connected.send_replace(false);
    }

    /// Make `board_id` the single live channel.
    ///
    /// Returns the existing handle when that board is already intended.
    /// Otherwise the previous subscription loses its listener, is
    /// unsubscribed, and a new handle is issued.
    ///
    /// # Errors
    ///
    /// [`RealtimeError::NotConnected`] without a link, or
    /// [`RealtimeError::Closed`] if the transport already stopped.
    pub fn subscribe(&self, board_id: &str) -> Result<SubscriptionHandle, RealtimeError> {
        let mut guard = self.shared.lock();
        let state = &mut *guard;
        let Some(link) = state.link.as_ref() else {
            return Err(RealtimeError::NotConnected);
        };

        if let Some(current) = &state.current {
            if current.handle.board_id == board_id {
                return Ok(current.handle.clone());
            }
        }

        if let Some(previous) = state.current.take() {
            drop(previous.sink);
            let _ = link.outbound.send(Outbound::Unsubscribe { channel: previous.handle.channel.clone() });
            debug!(board_id = %previous.handle.board_id, "realtime: previous subscription torn down");
        }

        let handle = SubscriptionHandle { board_id: board_id.to_owned(), channel: channel_name(board_id), id: Uuid::new_v4() };
        link.outbound
            .send(Outbound::Subscribe { channel: handle.channel.clone() })
            .map_err(|_| RealtimeError::Closed)?;
        state.current = Some(Current { handle: handle.clone(), joined: false, sink: None });
        debug!(%board_id, subscription = %handle.id, "realtime: subscribe requested");
        Ok(handle)
    }

    /// Route the subscription's signals to `sink`, replacing any previous
    /// listener. If the join was already confirmed, `sink` gets `Joined`
    /// immediately.
    ///
    /// # Errors
    ///
    /// [`RealtimeError::StaleHandle`] when `handle` is not the current
    /// subscription.
    pub fn bind(&self, handle: &SubscriptionHandle, sink: mpsc::UnboundedSender<ChannelMessage>) -> Result<(), RealtimeError> {
        let mut state = self.shared.lock();
        let Some(current) = state.current.as_mut().filter(|c| c.handle.id == handle.id) else {
            return Err(RealtimeError::StaleHandle(handle.board_id.clone()));
        };
        current.sink = Some(sink);
        if current.joined {
            current.notify(ChannelSignal::Joined);
        }
        Ok(())
    }

    /// Drop the listener of `board_id`'s subscription, keeping the channel.
    pub fn unbind_all(&self, board_id: &str) {
        if let Some(current) = self.shared.lock().current.as_mut() {
            if current.handle.board_id == board_id {
                current.sink = None;
            }
        }
    }

    /// Tear down `board_id`'s subscription. Safe when not subscribed.
    pub fn unsubscribe(&self, board_id: &str) {
        let mut guard = self.shared.lock();
        let state = &mut *guard;
        if !state.current.as_ref().is_some_and(|c| c.handle.board_id == board_id) {
            return;
        }
        if let Some(current) = state.current.take() {
            if let Some(link) = &state.link {
                let _ = link.outbound.send(Outbound::Unsubscribe { channel: current.handle.channel.clone() });
            }
            debug!(%board_id, "realtime: unsubscribed");
        }
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        *self.shared.connected.borrow()
    }

    /// Connection status updates.
    #[must_use]
    pub fn connection_status(&self) -> watch::Receiver<bool> {
        self.shared.connected.subscribe()
    }

    #[must_use]
    pub fn current_subscription(&self) -> Option<SubscriptionHandle> {
        self.shared.lock().current.as_ref().map(|c| c.handle.clone())
    }

    /// Whether `board_id`'s subscription has been confirmed by the server.
    #[must_use]
    pub fn is_joined(&self, board_id: &str) -> bool {
        self.shared
            .lock()
            .current
            .as_ref()
            .is_some_and(|c| c.joined && c.handle.board_id == board_id)
    }
}

impl Drop for ChannelManager {
    fn drop(&mut self) {
        if let Some(link) = self.shared.lock().link.take() {
            let _ = link.outbound.send(Outbound::Close);
            link.pump.abort();
        }
    }
}

// =============================================================================
// INBOUND ROUTING
// =============================================================================

async fn pump(shared: Arc<Shared>, link_id: u64, mut inbound: mpsc::UnboundedReceiver<Inbound>) {
    while let Some(message) = inbound.recv().await {
        route(&shared, message);
    }

    let mut state = shared.lock();
    if state.link.as_ref().is_some_and(|link| link.id == link_id) {
        state.link = None;
        if let Some(current) = state.current.take() {
            current.notify(ChannelSignal::Failed("realtime link closed".to_owned()));
        }
        drop(state);
        shared.connected.send_replace(false);
        warn!("realtime: transport stopped");
    }
}

fn route(shared: &Shared, message: Inbound) {
    match message {
        Inbound::Connected { socket_id } => {
            shared.connected.send_replace(true);
            info!(%socket_id, "realtime: connected");
        }
        Inbound::Disconnected => {
            shared.connected.send_replace(false);
            if let Some(current) = shared.lock().current.as_mut() {
                current.joined = false;
            }
            warn!("realtime: connection lost, transport reconnecting");
        }
        Inbound::Error(message) => warn!(%message, "realtime: server error"),
        Inbound::SubscriptionSucceeded { channel } => {
            let mut state = shared.lock();
            match state.current.as_mut() {
                Some(current) if current.handle.channel == channel => {
                    current.joined = true;
                    current.notify(ChannelSignal::Joined);
                    info!(%channel, "realtime: subscribed");
                }
                _ => debug!(%channel, "realtime: stale join confirmation discarded"),
            }
        }
        Inbound::SubscriptionError { channel, message } => {
            let mut guard = shared.lock();
            let state = &mut *guard;
            if !state.current.as_ref().is_some_and(|c| c.handle.channel == channel) {
                debug!(%channel, "realtime: stale subscription error discarded");
                return;
            }
            if let Some(current) = state.current.take() {
                if let Some(link) = &state.link {
                    let _ = link.outbound.send(Outbound::Unsubscribe { channel: channel.clone() });
                }
                warn!(%channel, %message, "realtime: subscription failed");
                current.notify(ChannelSignal::Failed(message));
            }
        }
        Inbound::Event { channel, name, data } => {
            let state = shared.lock();
            let Some(current) = state.current.as_ref().filter(|c| c.handle.channel == channel) else {
                debug!(%channel, event = %name, "realtime: event for inactive channel dropped");
                return;
            };
            match BoardEvent::decode(&name, &data) {
                Ok(Some(event)) => current.notify(ChannelSignal::Event(event)),
                Ok(None) => debug!(%channel, event = %name, "realtime: unhandled event skipped"),
                Err(e) => warn!(%channel, event = %name, error = %e, "realtime: undecodable event"),
            }
        }
    }
}

#[cfg(test)]
#[path = "manager_test.rs"]
mod tests;
