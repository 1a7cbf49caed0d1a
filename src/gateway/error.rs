//! Gateway failure taxonomy.
//!
//! DESIGN
//! ======
//! Every REST failure is classified once, here, from either the transport
//! error or the HTTP status plus the optional `{ message }` body. Callers
//! never see raw `reqwest` errors. Display text is for logs; the wording
//! shown to users comes from [`ApiError::user_message`].

use serde::Deserialize;

/// Classified REST failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// Transport-level failure, including timeouts.
    #[error("network failure: {0}")]
    Network(String),
    /// 401. The auth collaborator has already been notified.
    #[error("unauthorized")]
    Unauthorized,
    /// 403.
    #[error("forbidden{}", detail(.0))]
    Forbidden(Option<String>),
    /// 404.
    #[error("not found{}", detail(.0))]
    NotFound(Option<String>),
    /// 409.
    #[error("conflict{}", detail(.0))]
    Conflict(Option<String>),
    /// 400 or 422, with the server's explanation when it sent one.
    #[error("validation failed ({status}){}", detail(.message))]
    Validation { status: u16, message: Option<String> },
    /// 5xx.
    #[error("server failure ({status}){}", detail(.message))]
    Server { status: u16, message: Option<String> },
    /// Anything else: unexpected status, undecodable body, client build failure.
    #[error("unexpected failure{}: {message}", status_suffix(.status))]
    Unknown { status: Option<u16>, message: String },
}

fn detail(message: &Option<String>) -> String {
    message.as_deref().map(|m| format!(": {m}")).unwrap_or_default()
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" ({s})")).unwrap_or_default()
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

impl ApiError {
    /// Classify a non-2xx response from its status and raw body.
    #[must_use]
    pub fn from_status(status: u16, body: &str) -> Self {
        let message = serde_json::from_str::<ErrorBody>(body)
            .ok()
            .and_then(|b| b.message)
            .filter(|m| !m.trim().is_empty());

        match status {
            401 => Self::Unauthorized,
            403 => Self::Forbidden(message),
            404 => Self::NotFound(message),
            409 => Self::Conflict(message),
            400 | 422 => Self::Validation { status, message },
            500..=599 => Self::Server { status, message },
            _ => Self::Unknown {
                status: Some(status),
                message: message.unwrap_or_else(|| format!("unexpected status {status}")),
            },
        }
    }

    /// Classify a transport error (no usable response).
    #[must_use]
    pub fn from_transport(err: &reqwest::Error) -> Self {
        if err.is_decode() {
            return Self::Unknown { status: err.status().map(|s| s.as_u16()), message: err.to_string() };
        }
        if let Some(status) = err.status() {
            return Self::from_status(status.as_u16(), "");
        }
        Self::Network(err.to_string())
    }

    /// HTTP status behind this error, when there was one.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Network(_) => None,
            Self::Unauthorized => Some(401),
            Self::Forbidden(_) => Some(403),
            Self::NotFound(_) => Some(404),
            Self::Conflict(_) => Some(409),
            Self::Validation { status, .. } | Self::Server { status, .. } => Some(*status),
            Self::Unknown { status, .. } => *status,
        }
    }

    /// Grepable error code for logs.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Network(_) => "E_NETWORK",
            Self::Unauthorized => "E_UNAUTHORIZED",
            Self::Forbidden(_) => "E_FORBIDDEN",
            Self::NotFound(_) => "E_NOT_FOUND",
            Self::Conflict(_) => "E_CONFLICT",
            Self::Validation { .. } => "E_VALIDATION",
            Self::Server { .. } => "E_SERVER",
            Self::Unknown { .. } => "E_UNKNOWN",
        }
    }

    #[must_use]
    pub fn retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Server { .. } | Self::Unknown { status: Some(429), .. })
    }

    /// Message suitable for display next to the board.
    #[must_use]
    pub fn user_message(&self) -> String {
        let fixed = match self {
            Self::Network(_) => "Unable to reach the server. Please check your connection and try again.",
            Self::Unauthorized => "You are not authorized to perform this action. Please log in again.",
            Self::Forbidden(_) => "You don't have permission to perform this action.",
            Self::NotFound(message) => return or_default(message, "The requested resource was not found."),
            Self::Conflict(message) => return or_default(message, "This action conflicts with existing data."),
            Self::Validation { status: 422, message } => return or_default(message, "The provided data is invalid."),
            Self::Validation { message, .. } => {
                return or_default(message, "Invalid request. Please check your input and try again.");
            }
            Self::Server { status: 502..=504, .. } => {
                "The service is temporarily unavailable. Please try again later."
            }
            Self::Server { .. } => "A server error occurred. Please try again later.",
            Self::Unknown { status: Some(429), .. } => "Too many requests. Please wait a moment and try again.",
            Self::Unknown { .. } => "An unexpected error occurred. Please try again.",
        };
        fixed.to_owned()
    }
}

fn or_default(message: &Option<String>, fallback: &str) -> String {
    message.clone().unwrap_or_else(|| fallback.to_owned())
}

#[cfg(test)]
#[path = "error_test.rs"]
mod tests;
