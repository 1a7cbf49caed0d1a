//! Board synchronization controller.
//!
//! The controller ties the store, gateway, and channel manager together for
//! one board session at a time. See [`SyncController`] for the lifecycle.

mod controller;

pub use controller::{Phase, SyncController};

use crate::gateway::ApiError;
use crate::realtime::RealtimeError;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Realtime(#[from] RealtimeError),
    #[error("no board is loaded")]
    NoBoard,
    /// The session moved to another board (or unmounted) while the request
    /// was in flight. Its result was discarded.
    #[error("board {0} was superseded before its response arrived")]
    Superseded(String),
}

impl SyncError {
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Api(e) => e.code(),
            Self::Realtime(e) => e.code(),
            Self::NoBoard => "E_NO_BOARD",
            Self::Superseded(_) => "E_SUPERSEDED",
        }
    }

    #[must_use]
    pub fn retryable(&self) -> bool {
        match self {
            Self::Api(e) => e.retryable(),
            Self::Realtime(e) => e.retryable(),
            Self::NoBoard | Self::Superseded(_) => false,
        }
    }
}
