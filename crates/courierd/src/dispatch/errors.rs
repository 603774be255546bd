//! Error types for operation dispatch.
//!
//! [`DispatchError`] covers the per-request failures surfaced to query
//! clients; each carries a stable code. [`ConfigurationError`] covers
//! inconsistencies in the operation table and is fatal at startup.

use thiserror::Error;

use courier_wire::RemoteErrorKind;

use crate::channel::ChannelError;

/// Failure resolving a single operation.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The operation is not part of the query surface.
    #[error("unknown operation '{operation}'")]
    UnknownOperation {
        /// Operation that was requested.
        operation: String,
    },

    /// The operation maps to a backend with no channel.
    #[error("no channel configured for backend '{backend}'")]
    UnknownBackend {
        /// Backend the operation maps to.
        backend: String,
    },

    /// Arguments are missing or have the wrong type.
    #[error("invalid arguments: {message}")]
    InvalidArguments {
        /// What was wrong.
        message: String,
    },

    /// The backend could not be reached or the connection dropped.
    #[error("backend '{backend}' is unavailable: {source}")]
    BackendUnavailable {
        /// Backend name.
        backend: String,
        /// Channel failure.
        #[source]
        source: ChannelError,
    },

    /// The backend did not answer within the request deadline.
    #[error("backend '{backend}' timed out: {source}")]
    Timeout {
        /// Backend name.
        backend: String,
        /// Channel failure.
        #[source]
        source: ChannelError,
    },

    /// The backend broke the wire protocol.
    #[error("backend '{backend}' sent an invalid response: {source}")]
    BackendProtocol {
        /// Backend name.
        backend: String,
        /// Channel failure.
        #[source]
        source: ChannelError,
    },

    /// The backend answered with an error.
    #[error("backend '{backend}' rejected the request ({kind}): {message}")]
    BackendRejected {
        /// Backend name.
        backend: String,
        /// Error classification reported by the backend.
        kind: RemoteErrorKind,
        /// Error message reported by the backend.
        message: String,
    },
}

impl DispatchError {
    /// Machine-readable code reported to query clients.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::UnknownOperation { .. } => "UNKNOWN_OPERATION",
            Self::UnknownBackend { .. } => "UNKNOWN_BACKEND",
            Self::InvalidArguments { .. } => "INVALID_ARGUMENTS",
            Self::BackendUnavailable { .. } => "BACKEND_UNAVAILABLE",
            Self::Timeout { .. } => "DISPATCH_TIMEOUT",
            Self::BackendProtocol { .. } => "BACKEND_PROTOCOL",
            Self::BackendRejected { .. } => "BACKEND_REJECTED",
        }
    }

    /// Creates an unknown operation error.
    pub fn unknown_operation(operation: impl Into<String>) -> Self {
        Self::UnknownOperation {
            operation: operation.into(),
        }
    }

    /// Creates an unknown backend error.
    pub fn unknown_backend(backend: impl Into<String>) -> Self {
        Self::UnknownBackend {
            backend: backend.into(),
        }
    }

    /// Creates an invalid arguments error.
    pub fn invalid_arguments(message: impl Into<String>) -> Self {
        Self::InvalidArguments {
            message: message.into(),
        }
    }

    /// Translates a channel failure on `backend`.
    pub fn from_channel(backend: impl Into<String>, error: ChannelError) -> Self {
        let backend = backend.into();
        match error {
            ChannelError::InvalidCommand { reason } => Self::InvalidArguments { message: reason },
            ChannelError::Remote { source, .. } => Self::BackendRejected {
                backend,
                kind: source.kind,
                message: source.message,
            },
            source @ ChannelError::Timeout { .. } => Self::Timeout { backend, source },
            source @ ChannelError::Protocol { .. } => Self::BackendProtocol { backend, source },
            source @ (ChannelError::ConnectionFailed { .. }
            | ChannelError::Disconnected { .. }) => Self::BackendUnavailable { backend, source },
        }
    }
}

/// Inconsistency in the operation table detected at startup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    /// An operation targets a backend that is not configured.
    #[error("operation '{operation}' targets unknown backend '{backend}'")]
    UnknownBackend {
        /// Offending operation.
        operation: String,
        /// Backend it names.
        backend: String,
    },
    /// Two entries share an operation name.
    #[error("operation '{operation}' is declared more than once")]
    DuplicateOperation {
        /// Repeated operation name.
        operation: String,
    },
    /// An operation name is blank.
    #[error("operation names must not be empty")]
    EmptyOperation,
    /// An operation maps to a blank command name.
    #[error("operation '{operation}' has an empty command name")]
    EmptyCommand {
        /// Offending operation.
        operation: String,
    },
}
