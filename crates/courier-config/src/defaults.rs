use crate::options::{LogFormat, NodeRole};
use crate::socket::SocketEndpoint;

/// Loopback host used by the default endpoints.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default port of the public query gateway.
pub const DEFAULT_GATEWAY_PORT: u16 = 3000;

/// Default port of the users service.
pub const DEFAULT_USERS_PORT: u16 = 3001;

/// Default port of the forms service.
pub const DEFAULT_FORMS_PORT: u16 = 3002;

/// Default deadline for a single backend round trip, in milliseconds.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 5_000;

/// Default deadline for establishing a backend connection, in milliseconds.
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 2_000;

/// Default log filter expression used by the binaries.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Default log filter expression used by the binaries.
pub fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Default logging format for the binaries.
pub fn default_log_format() -> LogFormat {
    LogFormat::Json
}

/// Default role when none is configured.
pub fn default_role() -> NodeRole {
    NodeRole::Gateway
}

/// Default endpoint the gateway listens on.
pub fn default_gateway_socket() -> SocketEndpoint {
    SocketEndpoint::tcp(DEFAULT_HOST, DEFAULT_GATEWAY_PORT)
}

/// Default endpoint of the users service.
pub fn default_users_socket() -> SocketEndpoint {
    SocketEndpoint::tcp(DEFAULT_HOST, DEFAULT_USERS_PORT)
}

/// Default endpoint of the forms service.
pub fn default_forms_socket() -> SocketEndpoint {
    SocketEndpoint::tcp(DEFAULT_HOST, DEFAULT_FORMS_PORT)
}
