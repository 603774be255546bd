//! Correlated request/response channels to backend services.
//!
//! A [`MultiplexedChannel`] owns at most one connection to its backend. Every
//! [`CommandChannel::send`] tags the outbound frame with a fresh correlation
//! token, registers a waiter in the pending table, writes the frame under the
//! writer lock, and blocks until the connection's reader thread delivers the
//! matching response or the deadline passes. Responses may arrive in any
//! order.

mod errors;
mod multiplexed;
mod pending;
#[cfg(test)]
mod tests;

use std::time::Duration;

use serde_json::Value;

use courier_config::Config;
use courier_wire::Command;

pub use self::errors::ChannelError;
pub use self::multiplexed::MultiplexedChannel;

pub(crate) const CHANNEL_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::channel");

/// Request/response link to one backend.
#[cfg_attr(test, mockall::automock)]
pub trait CommandChannel: Send + Sync {
    /// Sends `command` and blocks until its response arrives.
    ///
    /// # Errors
    ///
    /// Returns a [`ChannelError`] when the command is invalid, the backend is
    /// unreachable, the deadline passes, the connection drops, the backend
    /// sends garbage, or the backend answers with an error.
    fn send(&self, command: Command) -> Result<Value, ChannelError>;

    /// Drops the connection and fails anything still outstanding.
    fn close(&self);
}

/// Deadlines applied by a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelSettings {
    /// Upper bound on establishing the connection.
    pub connect_timeout: Duration,
    /// Upper bound on waiting for a single response.
    pub request_timeout: Duration,
}

impl ChannelSettings {
    /// Reads both deadlines from the configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            connect_timeout: config.connect_timeout(),
            request_timeout: config.request_timeout(),
        }
    }
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}
