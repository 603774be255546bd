//! Courier: a query gateway that dispatches operations to backend services.
//!
//! One binary, `courierd`, plays one of three roles chosen by configuration:
//!
//! - **gateway** serves queries over HTTP at `POST /graphql`. Each root field
//!   of a query names an operation of the [`dispatch::QuerySurface`]; the
//!   [`dispatch::DispatchRouter`] turns it into a command and sends it over a
//!   [`channel::MultiplexedChannel`] to the backend that owns it.
//! - **users** and **forms** serve a [`registry::HandlerRegistry`] of command
//!   handlers over a line-delimited JSON wire protocol.
//!
//! Channels multiplex any number of in-flight commands over one connection
//! per backend, matching responses to callers by correlation token, and
//! enforce a per-request deadline. Backend failures surface to query clients
//! as structured errors with stable codes rather than tearing down the
//! gateway.
//!
//! Startup follows a fixed sequence: load configuration, install telemetry,
//! prepare the listen socket, assemble the role's service, then serve until a
//! termination signal arrives. Each stage is reported through a
//! [`HealthReporter`].

mod bootstrap;
pub mod channel;
pub mod dispatch;
mod health;
mod process;
pub mod query;
pub mod registry;
pub mod services;
mod telemetry;
mod transport;

pub use bootstrap::{
    BootstrapError, ConfigLoader, Node, RunningNode, StaticConfigLoader, SystemConfigLoader,
    bootstrap_with,
};
pub use health::{HealthReporter, StructuredHealthReporter};
pub use process::{LaunchError, ShutdownError, ShutdownSignal, SystemShutdownSignal, run_node};
pub use telemetry::{TelemetryError, TelemetryHandle};
pub use transport::{ConnectError, ListenerError};

#[cfg(test)]
mod tests;
