//! Resolves public operations to backend commands.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use courier_config::BackendEndpoint;
use courier_wire::Command;

use crate::channel::{ChannelSettings, CommandChannel, MultiplexedChannel};

use super::errors::{ConfigurationError, DispatchError};
use super::surface::{QuerySurface, QuerySurfaceBuilder};

/// Tracing target for dispatch operations.
pub(crate) const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");

/// Channels keyed by backend name.
pub type Backends = HashMap<String, Arc<dyn CommandChannel>>;

/// Routes operations from the query surface to backend channels.
///
/// The router holds one channel per backend and needs no external locking:
/// any number of threads may call [`DispatchRouter::resolve`] at once.
pub struct DispatchRouter {
    surface: QuerySurface,
    channels: Backends,
}

impl fmt::Debug for DispatchRouter {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut backends: Vec<_> = self.channels.keys().collect();
        backends.sort_unstable();
        formatter
            .debug_struct("DispatchRouter")
            .field("surface", &self.surface)
            .field("backends", &backends)
            .finish()
    }
}

impl DispatchRouter {
    /// Builds a router over existing channels.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] when the surface does not validate
    /// against the channel names.
    pub fn new(
        surface: QuerySurfaceBuilder,
        channels: Backends,
    ) -> Result<Self, ConfigurationError> {
        let surface = surface.build(channels.keys().map(String::as_str))?;
        Ok(Self { surface, channels })
    }

    /// Builds a router with a [`MultiplexedChannel`] per endpoint.
    ///
    /// No connection is opened until the first request.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] when the surface does not validate
    /// against the endpoint names.
    pub fn connect(
        surface: QuerySurfaceBuilder,
        endpoints: &[BackendEndpoint],
        settings: ChannelSettings,
    ) -> Result<Self, ConfigurationError> {
        let channels = endpoints
            .iter()
            .map(|endpoint| {
                let channel: Arc<dyn CommandChannel> = Arc::new(MultiplexedChannel::new(
                    endpoint.name(),
                    endpoint.address().clone(),
                    settings,
                ));
                (endpoint.name().to_owned(), channel)
            })
            .collect();
        Self::new(surface, channels)
    }

    /// The validated operation table.
    #[must_use]
    pub fn surface(&self) -> &QuerySurface {
        &self.surface
    }

    /// Resolves `operation` with `arguments` and returns the backend's value.
    ///
    /// # Errors
    ///
    /// Returns a [`DispatchError`] describing why the operation could not be
    /// answered; see [`DispatchError::code`] for the stable codes.
    pub fn resolve(
        &self,
        operation: &str,
        arguments: &Map<String, Value>,
    ) -> Result<Value, DispatchError> {
        let entry = self
            .surface
            .get(operation)
            .ok_or_else(|| DispatchError::unknown_operation(operation))?;
        let payload = entry.transform().apply(arguments)?;
        let channel = self
            .channels
            .get(entry.backend())
            .ok_or_else(|| DispatchError::unknown_backend(entry.backend()))?;

        debug!(
            target: DISPATCH_TARGET,
            operation,
            backend = entry.backend(),
            command = entry.command(),
            "dispatching operation"
        );

        channel
            .send(Command::new(entry.command(), payload))
            .map_err(|source| {
                let error = DispatchError::from_channel(entry.backend(), source);
                warn!(
                    target: DISPATCH_TARGET,
                    operation,
                    backend = entry.backend(),
                    code = error.code(),
                    error = %error,
                    "operation failed"
                );
                error
            })
    }

    /// Closes every backend channel.
    pub fn close(&self) {
        for (backend, channel) in &self.channels {
            debug!(target: DISPATCH_TARGET, backend = %backend, "closing channel");
            channel.close();
        }
    }
}
