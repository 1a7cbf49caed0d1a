//! Board channel events published by the realtime backend.
//!
//! Each board has one private channel named from its ID. Every event carries
//! either the full updated resource or, for removals, just the removed ID.

#[cfg(test)]
#[path = "events_test.rs"]
mod events_test;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::WireError;
use crate::model::{Board, List, Task};

// =============================================================================
// CHANNEL NAMES
// =============================================================================

/// Prefix of every board channel. `private-` makes the backend require auth.
pub const CHANNEL_PREFIX: &str = "private-board-";

/// Channel name for a board.
#[must_use]
pub fn channel_name(board_id: &str) -> String {
    format!("{CHANNEL_PREFIX}{board_id}")
}

/// Board ID encoded in a channel name, if it is a board channel.
#[must_use]
pub fn board_id_from_channel(channel: &str) -> Option<&str> {
    channel
        .strip_prefix(CHANNEL_PREFIX)
        .filter(|board_id| !board_id.is_empty())
}

// =============================================================================
// EVENT NAMES
// =============================================================================

pub const LIST_CREATED: &str = "list:created";
pub const LIST_UPDATED: &str = "list:updated";
pub const LIST_DELETED: &str = "list:deleted";
pub const TASK_CREATED: &str = "task:created";
pub const TASK_UPDATED: &str = "task:updated";
pub const TASK_DELETED: &str = "task:deleted";
pub const BOARD_UPDATED: &str = "board:updated";
pub const MEMBER_ADDED: &str = "board:member-added";
pub const MEMBER_REMOVED: &str = "board:member-removed";

// =============================================================================
// EVENT
// =============================================================================

/// A decoded board channel event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BoardEvent {
    ListCreated(List),
    ListUpdated(List),
    ListDeleted { list_id: String },
    TaskCreated(Task),
    TaskUpdated(Task),
    TaskDeleted { task_id: String },
    BoardUpdated(Board),
    MemberAdded { user_id: String },
    MemberRemoved { user_id: String },
}

impl BoardEvent {
    /// Event name on the wire.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::ListCreated(_) => LIST_CREATED,
            Self::ListUpdated(_) => LIST_UPDATED,
            Self::ListDeleted { .. } => LIST_DELETED,
            Self::TaskCreated(_) => TASK_CREATED,
            Self::TaskUpdated(_) => TASK_UPDATED,
            Self::TaskDeleted { .. } => TASK_DELETED,
            Self::BoardUpdated(_) => BOARD_UPDATED,
            Self::MemberAdded { .. } => MEMBER_ADDED,
            Self::MemberRemoved { .. } => MEMBER_REMOVED,
        }
    }

    /// Decode an event from its wire name and JSON payload.
    ///
    /// Returns `Ok(None)` for names this client does not handle (protocol
    /// events, future event kinds) so callers can skip them quietly.
    ///
    /// # Errors
    ///
    /// Returns [`WireError::InvalidPayload`] when a known event carries a
    /// payload that does not match its resource shape.
    pub fn decode(name: &str, data: &Value) -> Result<Option<Self>, WireError> {
        let event = match name {
            LIST_CREATED => Self::ListCreated(resource(name, data)?),
            LIST_UPDATED => Self::ListUpdated(resource(name, data)?),
            LIST_DELETED => Self::ListDeleted { list_id: id_field(name, data, "listId")? },
            TASK_CREATED => Self::TaskCreated(resource(name, data)?),
            TASK_UPDATED => Self::TaskUpdated(resource(name, data)?),
            TASK_DELETED => Self::TaskDeleted { task_id: id_field(name, data, "taskId")? },
            BOARD_UPDATED => Self::BoardUpdated(resource(name, data)?),
            MEMBER_ADDED => Self::MemberAdded { user_id: id_field(name, data, "userId")? },
            MEMBER_REMOVED => Self::MemberRemoved { user_id: id_field(name, data, "userId")? },
            _ => return Ok(None),
        };
        Ok(Some(event))
    }

    /// JSON payload as the backend publishes it.
    #[must_use]
    pub fn payload(&self) -> Value {
        let encoded = match self {
            Self::ListCreated(list) | Self::ListUpdated(list) => serde_json::to_value(list),
            Self::TaskCreated(task) | Self::TaskUpdated(task) => serde_json::to_value(task),
            Self::BoardUpdated(board) => serde_json::to_value(board),
            Self::ListDeleted { list_id } => Ok(serde_json::json!({ "listId": list_id })),
            Self::TaskDeleted { task_id } => Ok(serde_json::json!({ "taskId": task_id })),
            Self::MemberAdded { user_id } | Self::MemberRemoved { user_id } => {
                Ok(serde_json::json!({ "userId": user_id }))
            }
        };
        // Plain structs with string keys always serialize.
        encoded.unwrap_or(Value::Null)
    }
}

fn resource<T: DeserializeOwned>(name: &str, data: &Value) -> Result<T, WireError> {
    serde_json::from_value(data.clone()).map_err(|e| WireError::InvalidPayload { event: name.to_owned(), message: e.to_string() })
}

fn id_field(name: &str, data: &Value, key: &str) -> Result<String, WireError> {
    data.get(key)
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(ToOwned::to_owned)
        .ok_or_else(|| WireError::InvalidPayload { event: name.to_owned(), message: format!("missing `{key}`") })
}
