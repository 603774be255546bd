//! Shared harness for the behavioural suites.

mod cluster;
mod config_loader;
mod fake_backend;
mod reporter;
mod shutdown;

pub use cluster::{Answer, Cluster, QueryClient, unused_endpoint};
pub use config_loader::{FailingConfigLoader, TestConfigLoader};
pub use fake_backend::{FakeBehaviour, spawn_fake_backend};
pub use reporter::{HealthEvent, RecordingHealthReporter};
pub use shutdown::TestShutdownSignal;

/// Strips surrounding double quotes from a step argument.
pub fn strip_quotes(value: &str) -> &str {
    value.trim_matches('"')
}
