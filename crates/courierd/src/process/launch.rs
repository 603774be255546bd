//! Runs a node from configuration to shutdown.

use std::sync::Arc;

use tracing::info;

use crate::bootstrap::{ConfigLoader, SystemConfigLoader, bootstrap_with};
use crate::health::{HealthReporter, StructuredHealthReporter};

use super::PROCESS_TARGET;
use super::errors::LaunchError;
use super::shutdown::{ShutdownSignal, SystemShutdownSignal};

/// Collaborators needed to run a node.
pub(crate) struct LaunchPlan<L, S> {
    pub(crate) loader: L,
    pub(crate) reporter: Arc<dyn HealthReporter>,
    pub(crate) shutdown: S,
}

/// Runs the configured role until a termination signal arrives.
///
/// # Errors
///
/// Returns a [`LaunchError`] when bootstrap fails, the listen socket cannot
/// be bound, or signal handlers cannot be installed.
pub fn run_node() -> Result<(), LaunchError> {
    run_node_with(LaunchPlan {
        loader: SystemConfigLoader,
        reporter: Arc::new(StructuredHealthReporter::new()),
        shutdown: SystemShutdownSignal::new(),
    })
}

/// Runs a node with injected collaborators.
pub(crate) fn run_node_with<L, S>(plan: LaunchPlan<L, S>) -> Result<(), LaunchError>
where
    L: ConfigLoader,
    S: ShutdownSignal,
{
    let LaunchPlan {
        loader,
        reporter,
        shutdown,
    } = plan;

    let node = bootstrap_with(&loader, reporter)?;
    let role = node.config().role();
    info!(target: PROCESS_TARGET, %role, "starting node runtime");

    let running = node.serve()?;
    let waited = shutdown.wait();
    info!(target: PROCESS_TARGET, %role, "stopping node");
    running.stop()?;
    waited?;
    info!(target: PROCESS_TARGET, %role, "shutdown sequence completed");
    Ok(())
}
