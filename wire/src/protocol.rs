//! Pusher channels protocol (v7) envelope codec.
//!
//! DESIGN
//! ======
//! Every websocket text message is `{ event, channel?, data }`. The server
//! string-encodes `data` (a JSON document inside a JSON string) while clients
//! send it as a plain object; [`Envelope::payload`] accepts both so the rest
//! of the client only ever sees structured JSON.

#[cfg(test)]
#[path = "protocol_test.rs"]
mod protocol_test;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::WireError;
#[cfg(any(test, feature = "test-utils"))]
use crate::events::BoardEvent;

// =============================================================================
// EVENT NAMES
// =============================================================================

pub const CONNECTION_ESTABLISHED: &str = "pusher:connection_established";
pub const SUBSCRIBE: &str = "pusher:subscribe";
pub const UNSUBSCRIBE: &str = "pusher:unsubscribe";
pub const SUBSCRIPTION_SUCCEEDED: &str = "pusher_internal:subscription_succeeded";
pub const SUBSCRIPTION_ERROR: &str = "pusher:subscription_error";
pub const ERROR: &str = "pusher:error";
pub const PING: &str = "pusher:ping";
pub const PONG: &str = "pusher:pong";

/// Protocol revision advertised in the connection URL.
pub const PROTOCOL_VERSION: u8 = 7;

// =============================================================================
// ENVELOPE
// =============================================================================

/// One websocket text message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self { event: event.into(), channel: None, data }
    }

    #[must_use]
    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    /// Parse a websocket text message.
    ///
    /// # Errors
    ///
    /// Returns [`WireError::Json`] if the text is not an envelope.
    pub fn decode(text: &str) -> Result<Self, WireError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Serialize for sending.
    #[must_use]
    pub fn encode(&self) -> String {
        // A `Value` payload with string keys always serializes.
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Structured payload, unwrapping string-encoded JSON. A string that is
    /// not itself JSON is returned as a plain string value.
    #[must_use]
    pub fn payload(&self) -> Value {
        match &self.data {
            Value::String(raw) => serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.clone())),
            other => other.clone(),
        }
    }
}

// =============================================================================
// CLIENT MESSAGES
// =============================================================================

/// Subscribe to a channel. Private channels require the `auth` signature.
#[must_use]
pub fn subscribe_message(channel: &str, auth: Option<&str>) -> Envelope {
    let mut data = serde_json::json!({ "channel": channel });
    if let Some(auth) = auth {
        data["auth"] = Value::String(auth.to_owned());
    }
    Envelope::new(SUBSCRIBE, data)
}

#[must_use]
pub fn unsubscribe_message(channel: &str) -> Envelope {
    Envelope::new(UNSUBSCRIBE, serde_json::json!({ "channel": channel }))
}

/// Client keepalive, sent after `activity_timeout` of silence.
#[must_use]
pub fn ping_message() -> Envelope {
    Envelope::new(PING, serde_json::json!({}))
}

#[must_use]
pub fn pong_message() -> Envelope {
    Envelope::new(PONG, serde_json::json!({}))
}

// =============================================================================
// SERVER MESSAGES
// =============================================================================

/// Server messages the client reacts to.
#[derive(Clone, Debug, PartialEq)]
pub enum ServerMessage {
    ConnectionEstablished { socket_id: String, activity_timeout: Option<u64> },
    SubscriptionSucceeded { channel: String },
    SubscriptionError { channel: String, message: String },
    Error { code: Option<u16>, message: String },
    Ping,
    Pong,
    /// An application event published on a channel.
    ChannelEvent { channel: String, event: String, data: Value },
    /// Anything else (unknown protocol events, channel-less app events).
    Other { event: String },
}

impl ServerMessage {
    /// Classify a websocket text message.
    ///
    /// # Errors
    ///
    /// Returns [`WireError::Json`] for malformed envelopes and
    /// [`WireError::MissingField`] when a protocol event lacks a field it
    /// cannot be handled without.
    pub fn parse(text: &str) -> Result<Self, WireError> {
        let envelope = Envelope::decode(text)?;
        let payload = envelope.payload();

        let message = match envelope.event.as_str() {
            CONNECTION_ESTABLISHED => Self::ConnectionEstablished {
                socket_id: payload
                    .get("socket_id")
                    .and_then(Value::as_str)
                    .map(ToOwned::to_owned)
                    .ok_or(WireError::MissingField("socket_id"))?,
                activity_timeout: payload.get("activity_timeout").and_then(Value::as_u64),
            },
            SUBSCRIPTION_SUCCEEDED => Self::SubscriptionSucceeded {
                channel: envelope.channel.ok_or(WireError::MissingField("channel"))?,
            },
            SUBSCRIPTION_ERROR => Self::SubscriptionError {
                channel: envelope.channel.ok_or(WireError::MissingField("channel"))?,
                message: error_text(&payload).unwrap_or("subscription failed").to_owned(),
            },
            ERROR => Self::Error {
                code: payload
                    .get("code")
                    .and_then(Value::as_u64)
                    .and_then(|c| u16::try_from(c).ok()),
                message: error_text(&payload).unwrap_or("realtime error").to_owned(),
            },
            PING => Self::Ping,
            PONG => Self::Pong,
            event => match envelope.channel {
                Some(channel) if !event.starts_with("pusher") => {
                    Self::ChannelEvent { channel, event: event.to_owned(), data: payload }
                }
                _ => Self::Other { event: event.to_owned() },
            },
        };
        Ok(message)
    }
}

fn error_text(payload: &Value) -> Option<&str> {
    payload
        .get("error")
        .or_else(|| payload.get("message"))
        .and_then(Value::as_str)
        .or_else(|| payload.as_str())
}

// =============================================================================
// SERVER-SIDE ENCODERS
// =============================================================================
//
// Symmetric encoders for the messages a server sends. Data is string-encoded
// exactly as the hosted service does it. Only test servers need these, so they
// sit behind the `test-utils` feature.

#[cfg(any(test, feature = "test-utils"))]
#[must_use]
pub fn connection_established_message(socket_id: &str, activity_timeout: u64) -> Envelope {
    let data = serde_json::json!({ "socket_id": socket_id, "activity_timeout": activity_timeout });
    Envelope::new(CONNECTION_ESTABLISHED, Value::String(data.to_string()))
}

#[cfg(any(test, feature = "test-utils"))]
#[must_use]
pub fn subscription_succeeded_message(channel: &str) -> Envelope {
    Envelope::new(SUBSCRIPTION_SUCCEEDED, Value::String("{}".to_owned())).with_channel(channel)
}

#[cfg(any(test, feature = "test-utils"))]
#[must_use]
pub fn subscription_error_message(channel: &str, status: u16, error: &str) -> Envelope {
    let data = serde_json::json!({ "type": "AuthError", "error": error, "status": status });
    Envelope::new(SUBSCRIPTION_ERROR, data).with_channel(channel)
}

#[cfg(any(test, feature = "test-utils"))]
#[must_use]
pub fn event_message(channel: &str, event: &BoardEvent) -> Envelope {
    Envelope::new(event.name(), Value::String(event.payload().to_string())).with_channel(channel)
}
