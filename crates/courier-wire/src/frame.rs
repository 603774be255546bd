//! Request and response frames exchanged between the gateway and services.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Token tying a response frame to the request that caused it.
///
/// Tokens are unique per connection; the gateway allocates them from a
/// monotonic counter and services echo them unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(u64);

impl CorrelationId {
    /// Wraps a raw token.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw token.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// A named request for a backend, with its payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    name: String,
    payload: Value,
}

impl Command {
    /// Builds a command.
    #[must_use]
    pub fn new(name: impl Into<String>, payload: Value) -> Self {
        Self {
            name: name.into(),
            payload,
        }
    }

    /// Command name the backend dispatches on.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Payload forwarded to the handler.
    #[must_use]
    pub const fn payload(&self) -> &Value {
        &self.payload
    }

    /// Returns `true` when the name is usable on the wire.
    #[must_use]
    pub fn has_name(&self) -> bool {
        !self.name.trim().is_empty()
    }

    /// Attaches a correlation token, producing the outbound frame.
    #[must_use]
    pub fn into_frame(self, correlation: CorrelationId) -> RequestFrame {
        RequestFrame {
            correlation,
            command: self.name,
            payload: self.payload,
        }
    }
}

/// Frame sent from the gateway to a service.
///
/// ```json
/// {"correlation":7,"command":"get_user","payload":"1"}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestFrame {
    /// Token the service must echo.
    pub correlation: CorrelationId,
    /// Name of the command to run.
    pub command: String,
    /// Handler input.
    #[serde(default)]
    pub payload: Value,
}

/// Frame sent from a service back to the gateway.
///
/// ```json
/// {"correlation":7,"status":"ok","payload":"User with ID 1"}
/// {"correlation":8,"status":"error","error":{"kind":"unknown_command","message":"..."}}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseFrame {
    /// Token copied from the request.
    pub correlation: CorrelationId,
    /// Terminal result of the request.
    #[serde(flatten)]
    pub outcome: Outcome,
}

impl ResponseFrame {
    /// Builds a successful response.
    #[must_use]
    pub const fn success(correlation: CorrelationId, payload: Value) -> Self {
        Self {
            correlation,
            outcome: Outcome::Ok { payload },
        }
    }

    /// Builds an error response.
    #[must_use]
    pub fn failure(
        correlation: CorrelationId,
        kind: RemoteErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            correlation,
            outcome: Outcome::Error {
                error: RemoteError::new(kind, message),
            },
        }
    }
}

/// Terminal result carried by a response frame. Exactly one per request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    /// The handler produced a value.
    Ok {
        /// Handler output.
        payload: Value,
    },
    /// The request failed on the service side.
    Error {
        /// Failure description.
        error: RemoteError,
    },
}

impl Outcome {
    /// Converts the outcome into a `Result`.
    ///
    /// # Errors
    ///
    /// Returns the [`RemoteError`] when the service reported a failure.
    pub fn into_result(self) -> Result<Value, RemoteError> {
        match self {
            Self::Ok { payload } => Ok(payload),
            Self::Error { error } => Err(error),
        }
    }
}

/// Classification of service-side failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteErrorKind {
    /// No handler is registered for the command.
    UnknownCommand,
    /// The payload did not match what the handler expects.
    InvalidPayload,
    /// The handler ran and failed.
    HandlerFailed,
    /// The request frame could not be decoded.
    MalformedRequest,
}

impl RemoteErrorKind {
    /// Returns the wire spelling of the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UnknownCommand => "unknown_command",
            Self::InvalidPayload => "invalid_payload",
            Self::HandlerFailed => "handler_failed",
            Self::MalformedRequest => "malformed_request",
        }
    }
}

impl fmt::Display for RemoteErrorKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Failure reported by a service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct RemoteError {
    /// Failure classification.
    pub kind: RemoteErrorKind,
    /// Human-readable detail.
    pub message: String,
}

impl RemoteError {
    /// Builds a remote error.
    #[must_use]
    pub fn new(kind: RemoteErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}
