//! Shared configuration for the Courier gateway and its backend services.
//!
//! Every `courierd` process, whatever its role, loads the same [`Config`].
//! Values are layered by [`ortho_config`]: built-in defaults, then an optional
//! TOML file (`--config-path` or `COURIER_CONFIG_PATH`), then `COURIER_*`
//! environment variables, then command-line flags.
//!
//! ```toml
//! role = "gateway"
//! gateway_socket = "tcp://0.0.0.0:3000"
//! users_socket = { transport = "tcp", host = "users", port = 3001 }
//! forms_socket = "tcp://forms:3002"
//! request_timeout_ms = 5000
//! ```

mod defaults;
mod options;
mod socket;

use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

pub use defaults::{
    DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_FORMS_PORT, DEFAULT_GATEWAY_PORT, DEFAULT_HOST,
    DEFAULT_LOG_FILTER, DEFAULT_REQUEST_TIMEOUT_MS, DEFAULT_USERS_PORT, default_forms_socket,
    default_gateway_socket, default_log_filter, default_log_format, default_role,
    default_users_socket,
};
pub use options::{LogFormat, NodeRole, OptionParseError};
pub use socket::{SocketEndpoint, SocketParseError, SocketPreparationError};

/// Backend name under which the users service is addressed.
pub const USERS_BACKEND: &str = "users";

/// Backend name under which the forms service is addressed.
pub const FORMS_BACKEND: &str = "forms";

/// Resolved configuration for a `courierd` process.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, OrthoConfig)]
#[serde(default)]
#[ortho_config(prefix = "COURIER")]
pub struct Config {
    /// Role this process plays.
    pub role: NodeRole,
    /// Endpoint the public query gateway listens on.
    pub gateway_socket: SocketEndpoint,
    /// Endpoint of the users service.
    pub users_socket: SocketEndpoint,
    /// Endpoint of the forms service.
    pub forms_socket: SocketEndpoint,
    /// Deadline for one backend round trip, in milliseconds.
    pub request_timeout_ms: u64,
    /// Deadline for establishing a backend connection, in milliseconds.
    pub connect_timeout_ms: u64,
    /// `tracing` filter expression.
    pub log_filter: String,
    /// Log output format.
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            role: default_role(),
            gateway_socket: default_gateway_socket(),
            users_socket: default_users_socket(),
            forms_socket: default_forms_socket(),
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            log_filter: default_log_filter().to_owned(),
            log_format: default_log_format(),
        }
    }
}

/// A named backend and the address it listens on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendEndpoint {
    name: String,
    address: SocketEndpoint,
}

impl BackendEndpoint {
    /// Builds a backend endpoint.
    #[must_use]
    pub fn new(name: impl Into<String>, address: SocketEndpoint) -> Self {
        Self {
            name: name.into(),
            address,
        }
    }

    /// Backend name used by the query surface.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Socket the backend listens on.
    #[must_use]
    pub fn address(&self) -> &SocketEndpoint {
        &self.address
    }
}

impl Config {
    /// Role this process plays.
    #[must_use]
    pub fn role(&self) -> NodeRole {
        self.role
    }

    /// Endpoint this process should listen on for its role.
    #[must_use]
    pub fn listen_endpoint(&self) -> &SocketEndpoint {
        match self.role {
            NodeRole::Gateway => &self.gateway_socket,
            NodeRole::Users => &self.users_socket,
            NodeRole::Forms => &self.forms_socket,
        }
    }

    /// Backends the gateway dispatches to.
    #[must_use]
    pub fn backend_endpoints(&self) -> Vec<BackendEndpoint> {
        vec![
            BackendEndpoint::new(USERS_BACKEND, self.users_socket.clone()),
            BackendEndpoint::new(FORMS_BACKEND, self.forms_socket.clone()),
        ]
    }

    /// Deadline for one backend round trip.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Deadline for establishing a backend connection.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// `tracing` filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        self.log_filter.as_str()
    }

    /// Log output format.
    #[must_use]
    pub fn log_format(&self) -> LogFormat {
        self.log_format
    }
}
