//! Socket plumbing shared by the gateway and the backend services.
//!
//! Backend nodes accept connections through [`SocketListener`], which hands
//! each one to a [`ConnectionHandler`] on its own thread. Outbound connections
//! to backends are opened with [`connect`], which honours a deadline for both
//! TCP and Unix domain sockets. Unix socket files are reclaimed and released
//! through `socket_file`, which the gateway's HTTP server shares.

mod connect;
mod errors;
mod handler;
mod listener;
pub(crate) mod socket_file;
#[cfg(test)]
mod test_utils;

pub(crate) use self::connect::connect;
pub use self::errors::{ConnectError, ListenerError};
pub(crate) use self::handler::{ConnectionHandler, ConnectionStream};
pub(crate) use self::listener::{ListenerHandle, SocketListener};
#[cfg(test)]
pub(crate) use self::test_utils::EchoHandler;

pub(crate) const TRANSPORT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");
