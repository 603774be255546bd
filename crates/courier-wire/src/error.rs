//! Errors raised while encoding or decoding frames.

use std::io;

use thiserror::Error;

/// Failures from the JSON Lines codec.
#[derive(Debug, Error)]
pub enum WireError {
    /// Reading from or writing to the stream failed.
    #[error("frame i/o failed: {0}")]
    Io(#[from] io::Error),
    /// A frame could not be rendered as JSON.
    #[error("failed to serialise frame: {0}")]
    Serialize(#[source] serde_json::Error),
    /// A received line was not a valid frame.
    #[error("malformed frame: {message}")]
    Malformed {
        /// Short description of what was wrong.
        message: String,
        /// Underlying JSON error, when there is one.
        #[source]
        source: Option<serde_json::Error>,
    },
    /// A line exceeded the frame limit.
    #[error("frame of {size} bytes exceeds the {max} byte limit")]
    FrameTooLarge {
        /// Bytes seen before giving up.
        size: usize,
        /// Configured limit.
        max: usize,
    },
}

impl WireError {
    /// Builds a [`WireError::Malformed`] wrapping a JSON error.
    #[must_use]
    pub fn malformed(source: serde_json::Error) -> Self {
        Self::Malformed {
            message: source.to_string(),
            source: Some(source),
        }
    }

    /// Returns `true` when the peer closed or broke the stream rather than
    /// sending bad data.
    #[must_use]
    pub const fn is_io(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}
