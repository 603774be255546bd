//! Structured health reporting for node lifecycle events.

use std::sync::Arc;

use courier_config::{Config, NodeRole, SocketEndpoint};

use crate::bootstrap::BootstrapError;

const HEALTH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::health");

/// Observer notified as a node moves through its lifecycle.
pub trait HealthReporter: Send + Sync {
    /// Invoked before configuration loading begins.
    fn bootstrap_starting(&self);

    /// Invoked after bootstrap completes successfully.
    fn bootstrap_succeeded(&self, config: &Config);

    /// Invoked when bootstrap fails.
    fn bootstrap_failed(&self, error: &BootstrapError);

    /// Invoked once the node's listener accepts connections.
    fn node_serving(&self, role: NodeRole, endpoint: &SocketEndpoint);

    /// Invoked after the listener has stopped and channels are closed.
    fn node_stopped(&self, role: NodeRole);
}

impl<T> HealthReporter for Arc<T>
where
    T: HealthReporter + ?Sized,
{
    fn bootstrap_starting(&self) {
        (**self).bootstrap_starting();
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        (**self).bootstrap_succeeded(config);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        (**self).bootstrap_failed(error);
    }

    fn node_serving(&self, role: NodeRole, endpoint: &SocketEndpoint) {
        (**self).node_serving(role, endpoint);
    }

    fn node_stopped(&self, role: NodeRole) {
        (**self).node_stopped(role);
    }
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredHealthReporter;

impl StructuredHealthReporter {
    /// Builds a new reporter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl HealthReporter for StructuredHealthReporter {
    fn bootstrap_starting(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_starting",
            "starting node bootstrap"
        );
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_succeeded",
            role = %config.role(),
            socket = %config.listen_endpoint(),
            request_timeout_ms = config.request_timeout_ms,
            log_filter = %config.log_filter(),
            log_format = %config.log_format(),
            "node bootstrap completed"
        );
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "bootstrap_failed",
            error = %error,
            "node bootstrap failed"
        );
    }

    fn node_serving(&self, role: NodeRole, endpoint: &SocketEndpoint) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "node_serving",
            %role,
            %endpoint,
            "node accepting connections"
        );
    }

    fn node_stopped(&self, role: NodeRole) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "node_stopped",
            %role,
            "node stopped"
        );
    }
}
