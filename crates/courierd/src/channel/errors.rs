//! Errors reported by command channels.

use std::time::Duration;

use thiserror::Error;

use courier_wire::RemoteError;

use crate::transport::ConnectError;

/// Failure of a single [`super::CommandChannel::send`].
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The command cannot be sent as given.
    #[error("invalid command: {reason}")]
    InvalidCommand {
        /// Why the command was refused.
        reason: String,
    },
    /// The backend could not be reached within the connect deadline.
    #[error("cannot reach backend '{backend}': {source}")]
    ConnectionFailed {
        /// Backend name.
        backend: String,
        /// Underlying transport error.
        #[source]
        source: ConnectError,
    },
    /// No response arrived within the request deadline.
    #[error("backend '{backend}' did not answer '{command}' within {}ms", .timeout.as_millis())]
    Timeout {
        /// Backend name.
        backend: String,
        /// Command that went unanswered.
        command: String,
        /// Deadline that elapsed.
        timeout: Duration,
    },
    /// The connection dropped while the request was outstanding.
    #[error("connection to backend '{backend}' lost: {reason}")]
    Disconnected {
        /// Backend name.
        backend: String,
        /// What ended the connection.
        reason: String,
    },
    /// The backend sent something that is not a valid frame.
    #[error("protocol violation from backend '{backend}': {message}")]
    Protocol {
        /// Backend name.
        backend: String,
        /// Decoder detail.
        message: String,
    },
    /// The backend answered with an error response.
    #[error("backend '{backend}' rejected the command: {source}")]
    Remote {
        /// Backend name.
        backend: String,
        /// Error carried by the response.
        #[source]
        source: RemoteError,
    },
}

impl ChannelError {
    pub(crate) fn invalid_command(reason: impl Into<String>) -> Self {
        Self::InvalidCommand {
            reason: reason.into(),
        }
    }

    pub(crate) fn disconnected(backend: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Disconnected {
            backend: backend.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn protocol(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Protocol {
            backend: backend.into(),
            message: message.into(),
        }
    }
}
