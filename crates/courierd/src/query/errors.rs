//! Errors raised before any field is resolved.

use thiserror::Error;

/// Failure to accept a query request as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// The query document is not valid syntax.
    #[error("Syntax Error: {message}")]
    Syntax {
        /// What the parser expected.
        message: String,
        /// 1-based line of the offending token.
        line: usize,
        /// 1-based column of the offending token.
        column: usize,
    },
    /// The request line is not a usable query envelope.
    #[error("{message}")]
    BadRequest {
        /// What was wrong with the envelope.
        message: String,
    },
    /// The document parsed but cannot be executed.
    #[error("{message}")]
    Validation {
        /// Why the document was refused.
        message: String,
    },
}

impl QueryError {
    /// Creates a bad request error.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Machine-readable code reported to clients.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Syntax { .. } => "GRAPHQL_PARSE_FAILED",
            Self::BadRequest { .. } => "BAD_REQUEST",
            Self::Validation { .. } => "GRAPHQL_VALIDATION_FAILED",
        }
    }

    /// Source position for syntax errors.
    #[must_use]
    pub const fn location(&self) -> Option<(usize, usize)> {
        match self {
            Self::Syntax { line, column, .. } => Some((*line, *column)),
            Self::BadRequest { .. } | Self::Validation { .. } => None,
        }
    }
}
