//! Command handler trait and adapters.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use courier_wire::RemoteErrorKind;

/// Failure reported by a command handler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandlerError {
    /// The payload does not have the shape the handler expects.
    #[error("invalid payload: {message}")]
    InvalidPayload {
        /// What was wrong with the payload.
        message: String,
    },
    /// The handler understood the payload but could not complete.
    #[error("{message}")]
    Failed {
        /// Failure detail.
        message: String,
    },
}

impl HandlerError {
    /// Builds an invalid payload error.
    pub fn invalid_payload(message: impl Into<String>) -> Self {
        Self::InvalidPayload {
            message: message.into(),
        }
    }

    /// Builds a handler failure.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }

    /// Wire classification of this error.
    #[must_use]
    pub const fn kind(&self) -> RemoteErrorKind {
        match self {
            Self::InvalidPayload { .. } => RemoteErrorKind::InvalidPayload,
            Self::Failed { .. } => RemoteErrorKind::HandlerFailed,
        }
    }

    /// Message reported to the caller.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::InvalidPayload { message } | Self::Failed { message } => message,
        }
    }
}

/// Runs a single command.
///
/// Any `Fn(Value) -> Result<Value, HandlerError>` closure is a handler; use
/// [`typed`] to work with concrete payload types instead.
pub trait CommandHandler: Send + Sync + 'static {
    /// Executes the command with its payload.
    ///
    /// # Errors
    ///
    /// Returns a [`HandlerError`] when the payload is unusable or the work
    /// fails.
    fn call(&self, payload: Value) -> Result<Value, HandlerError>;
}

impl<F> CommandHandler for F
where
    F: Fn(Value) -> Result<Value, HandlerError> + Send + Sync + 'static,
{
    fn call(&self, payload: Value) -> Result<Value, HandlerError> {
        self(payload)
    }
}

/// Adapts a handler over typed input and output.
///
/// The payload is deserialised into `A` (failures become
/// [`HandlerError::InvalidPayload`]) and the result serialised from `R`.
///
/// ```ignore
/// registry.register("get_user", typed(|id: String| Ok(format!("User with ID {id}"))))?;
/// ```
pub fn typed<A, R, F>(handler: F) -> impl CommandHandler
where
    A: DeserializeOwned + 'static,
    R: Serialize + 'static,
    F: Fn(A) -> Result<R, HandlerError> + Send + Sync + 'static,
{
    move |payload: Value| -> Result<Value, HandlerError> {
        let input: A = serde_json::from_value(payload)
            .map_err(|error| HandlerError::invalid_payload(error.to_string()))?;
        let output = handler(input)?;
        serde_json::to_value(output).map_err(|error| {
            HandlerError::failed(format!("failed to serialise handler output: {error}"))
        })
    }
}
