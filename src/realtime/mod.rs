//! Realtime channel layer.
//!
//! ARCHITECTURE
//! ============
//! Two halves joined by a [`Link`]:
//!
//! - [`Transport`] owns the socket. It connects, reconnects with backoff,
//!   authorizes private channels, and translates protocol traffic into
//!   [`Inbound`] notifications. [`PusherTransport`] is the production one.
//! - [`ChannelManager`] owns intent: which single board channel should be
//!   live, which listener receives its events, and which confirmations are
//!   stale. It never touches the socket directly; it sends [`Outbound`]
//!   commands over the link.
//!
//! Splitting them keeps every race decision in the manager, where tests can
//! drive it with a scripted transport.

mod manager;
mod pusher;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use manager::{ChannelManager, ChannelMessage, ChannelSignal, SubscriptionHandle};
pub use pusher::PusherTransport;

use serde_json::Value;
use tokio::sync::mpsc;

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RealtimeError {
    #[error("realtime transport is not connected")]
    NotConnected,
    #[error("realtime connect failed: {0}")]
    Connect(String),
    #[error("channel authorization failed: {0}")]
    Auth(String),
    #[error("realtime link closed")]
    Closed,
    /// A handle for a subscription that has since been replaced or torn down.
    #[error("subscription {0} is no longer current")]
    StaleHandle(String),
}

impl RealtimeError {
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotConnected => "E_REALTIME_NOT_CONNECTED",
            Self::Connect(_) => "E_REALTIME_CONNECT",
            Self::Auth(_) => "E_REALTIME_AUTH",
            Self::Closed => "E_REALTIME_CLOSED",
            Self::StaleHandle(_) => "E_REALTIME_STALE",
        }
    }

    #[must_use]
    pub fn retryable(&self) -> bool {
        matches!(self, Self::NotConnected | Self::Connect(_) | Self::Closed)
    }
}

// =============================================================================
// LINK
// =============================================================================

/// Commands from the manager to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Keep `channel` subscribed, including across reconnects.
    Subscribe { channel: String },
    Unsubscribe { channel: String },
    /// Close the socket and stop reconnecting.
    Close,
}

/// Notifications from the transport to the manager.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Socket (re)established.
    Connected { socket_id: String },
    /// Socket dropped; the transport is reconnecting.
    Disconnected,
    /// Protocol-level error reported by the server.
    Error(String),
    SubscriptionSucceeded { channel: String },
    SubscriptionError { channel: String, message: String },
    /// Application event with its decoded JSON payload.
    Event { channel: String, name: String, data: Value },
}

/// Both directions of one transport session. Dropping `outbound` stops the
/// transport; the transport closing `inbound` means it has given up.
#[derive(Debug)]
pub struct Link {
    pub outbound: mpsc::UnboundedSender<Outbound>,
    pub inbound: mpsc::UnboundedReceiver<Inbound>,
}

#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Open a session authenticated with `token`.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::Connect`] when the first connection attempt
    /// fails. Later drops are handled inside the session.
    async fn connect(&self, token: &str) -> Result<Link, RealtimeError>;
}
