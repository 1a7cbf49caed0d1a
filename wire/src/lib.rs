//! Shared wire model for the task-board REST API and realtime channel.
//!
//! This crate owns the representation used on both transports: resource
//! payloads (`model`), board channel events (`events`), and the Pusher
//! envelope the realtime socket speaks (`protocol`). Resource fields follow
//! the backend's JSON (`_id`, camelCase) so serde round-trips stay lossless.

pub mod events;
pub mod model;
pub mod protocol;

pub use events::{BoardEvent, board_id_from_channel, channel_name};
pub use model::{Board, BoardSnapshot, List, Task, User};
pub use protocol::{Envelope, ServerMessage};

/// Error returned when a wire payload cannot be decoded.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// The text is not valid JSON or does not match the expected shape.
    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),
    /// A required field was absent from an otherwise valid payload.
    #[error("missing field `{0}`")]
    MissingField(&'static str),
    /// An event payload did not decode into the resource its name implies.
    #[error("invalid payload for {event}: {message}")]
    InvalidPayload { event: String, message: String },
}
