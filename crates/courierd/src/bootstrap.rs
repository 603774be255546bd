//! Node bootstrap: configuration, telemetry, and service assembly.

use std::fmt;
use std::sync::Arc;

use ortho_config::{OrthoConfig, OrthoError};
use thiserror::Error;

use courier_config::{Config, NodeRole, SocketEndpoint, SocketPreparationError};

use crate::channel::ChannelSettings;
use crate::dispatch::{ConfigurationError, DispatchRouter, QuerySurface};
use crate::health::HealthReporter;
use crate::query::{QueryServer, QueryServerHandle};
use crate::registry::{HandlerRegistry, RegistryError, ServiceConnectionHandler};
use crate::services::service_for;
use crate::telemetry::{self, TelemetryError, TelemetryHandle};
use crate::transport::{ListenerError, ListenerHandle, SocketListener};

/// Source of the node configuration.
pub trait ConfigLoader: Send + Sync {
    /// Loads the configuration.
    ///
    /// # Errors
    ///
    /// Returns the loader's error when no valid configuration is available.
    fn load(&self) -> Result<Config, Arc<OrthoError>>;
}

/// Loader that delegates to [`Config::load`]: defaults, file, environment,
/// then command line.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemConfigLoader;

impl ConfigLoader for SystemConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Config::load()
    }
}

/// Loader that hands out a fixed configuration.
#[derive(Debug, Clone)]
pub struct StaticConfigLoader {
    config: Config,
}

impl StaticConfigLoader {
    /// Wraps an already resolved configuration.
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config }
    }
}

impl ConfigLoader for StaticConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Ok(self.config.clone())
    }
}

/// Errors surfaced during bootstrap. All of them are fatal.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Configuration failed to load.
    #[error("failed to load configuration: {source}")]
    Configuration {
        /// Underlying loader error.
        #[source]
        source: Arc<OrthoError>,
    },
    /// Telemetry initialisation failed.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        /// Underlying telemetry error.
        #[source]
        source: TelemetryError,
    },
    /// The listen socket's directory could not be prepared.
    #[error("failed to prepare listen socket: {source}")]
    Socket {
        /// Underlying filesystem error.
        #[source]
        source: SocketPreparationError,
    },
    /// The query surface does not match the configured backends.
    #[error("invalid query surface: {source}")]
    Surface {
        /// Underlying validation error.
        #[source]
        source: ConfigurationError,
    },
    /// A service's handler table could not be built.
    #[error("invalid service registry: {source}")]
    Registry {
        /// Underlying registration error.
        #[source]
        source: RegistryError,
    },
}

enum Service {
    Gateway(Arc<DispatchRouter>),
    Backend {
        name: &'static str,
        registry: Arc<HandlerRegistry>,
    },
}

impl Service {
    /// Binds `endpoint` and starts serving: HTTP queries for the gateway,
    /// framed commands for a backend.
    fn serve(&self, endpoint: &SocketEndpoint) -> Result<Serving, ListenerError> {
        match self {
            Self::Gateway(router) => QueryServer::bind(endpoint)?
                .serve(Arc::clone(router))
                .map(Serving::Queries),
            Self::Backend { name, registry } => {
                let handler = ServiceConnectionHandler::new(*name, Arc::clone(registry));
                SocketListener::bind(endpoint)?
                    .serve(Arc::new(handler))
                    .map(Serving::Commands)
            }
        }
    }

    fn close(&self) {
        if let Self::Gateway(router) = self {
            router.close();
        }
    }
}

/// What a running node is serving on its socket.
enum Serving {
    Queries(QueryServerHandle),
    Commands(ListenerHandle),
}

impl Serving {
    fn endpoint(&self) -> &SocketEndpoint {
        match self {
            Self::Queries(server) => server.endpoint(),
            Self::Commands(listener) => listener.endpoint(),
        }
    }

    fn stop(self) -> Result<(), ListenerError> {
        match self {
            Self::Queries(server) => server.stop(),
            Self::Commands(listener) => listener.stop(),
        }
    }
}

impl fmt::Debug for Service {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gateway(router) => formatter.debug_tuple("Gateway").field(router).finish(),
            Self::Backend { name, registry } => formatter
                .debug_struct("Backend")
                .field("name", name)
                .field("commands", &registry.commands())
                .finish(),
        }
    }
}

/// A bootstrapped node, ready to serve.
pub struct Node {
    config: Config,
    service: Service,
    telemetry: TelemetryHandle,
    reporter: Arc<dyn HealthReporter>,
}

impl fmt::Debug for Node {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Node")
            .field("config", &self.config)
            .field("service", &self.service)
            .finish_non_exhaustive()
    }
}

impl Node {
    /// Resolved configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Telemetry handle, primarily useful for testing.
    #[must_use]
    pub const fn telemetry(&self) -> TelemetryHandle {
        self.telemetry
    }

    /// The gateway's router; `None` for backend services.
    #[must_use]
    pub fn router(&self) -> Option<&DispatchRouter> {
        match &self.service {
            Service::Gateway(router) => Some(router.as_ref()),
            Service::Backend { .. } => None,
        }
    }

    /// Binds the listen socket and starts serving the node's role.
    ///
    /// # Errors
    ///
    /// Returns a [`ListenerError`] when the socket cannot be bound or the
    /// serving thread cannot be started.
    pub fn serve(self) -> Result<RunningNode, ListenerError> {
        let serving = self.service.serve(self.config.listen_endpoint())?;
        let role = self.config.role();
        self.reporter.node_serving(role, serving.endpoint());
        Ok(RunningNode {
            role,
            service: self.service,
            serving,
            reporter: self.reporter,
        })
    }
}

/// A node that is serving its socket.
pub struct RunningNode {
    role: NodeRole,
    service: Service,
    serving: Serving,
    reporter: Arc<dyn HealthReporter>,
}

impl fmt::Debug for RunningNode {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("RunningNode")
            .field("role", &self.role)
            .field("endpoint", self.serving.endpoint())
            .finish_non_exhaustive()
    }
}

impl RunningNode {
    /// Role being served.
    #[must_use]
    pub const fn role(&self) -> NodeRole {
        self.role
    }

    /// Address the node is bound to, with any ephemeral port resolved.
    #[must_use]
    pub fn endpoint(&self) -> &SocketEndpoint {
        self.serving.endpoint()
    }

    /// Stops serving, then closes backend channels.
    ///
    /// # Errors
    ///
    /// Returns [`ListenerError::ThreadPanic`] if the serving thread panicked.
    pub fn stop(self) -> Result<(), ListenerError> {
        let stopped = self.serving.stop();
        self.service.close();
        self.reporter.node_stopped(self.role);
        stopped
    }
}

/// Loads configuration, installs telemetry, and assembles the configured
/// role's service.
///
/// The reporter is told about every stage, including the failing one.
///
/// # Errors
///
/// Returns a [`BootstrapError`] naming the stage that failed.
pub fn bootstrap_with(
    loader: &dyn ConfigLoader,
    reporter: Arc<dyn HealthReporter>,
) -> Result<Node, BootstrapError> {
    reporter.bootstrap_starting();
    match assemble(loader) {
        Ok((config, service, telemetry)) => {
            reporter.bootstrap_succeeded(&config);
            Ok(Node {
                config,
                service,
                telemetry,
                reporter,
            })
        }
        Err(error) => {
            reporter.bootstrap_failed(&error);
            Err(error)
        }
    }
}

fn assemble(loader: &dyn ConfigLoader) -> Result<(Config, Service, TelemetryHandle), BootstrapError> {
    let config = loader
        .load()
        .map_err(|source| BootstrapError::Configuration { source })?;
    let telemetry =
        telemetry::initialise(&config).map_err(|source| BootstrapError::Telemetry { source })?;
    config
        .listen_endpoint()
        .prepare_filesystem()
        .map_err(|source| BootstrapError::Socket { source })?;
    let service = build_service(&config)?;
    Ok((config, service, telemetry))
}

fn build_service(config: &Config) -> Result<Service, BootstrapError> {
    match service_for(config.role()).map_err(|source| BootstrapError::Registry { source })? {
        Some((name, registry)) => Ok(Service::Backend {
            name,
            registry: Arc::new(registry),
        }),
        None => {
            let router = DispatchRouter::connect(
                QuerySurface::standard(),
                &config.backend_endpoints(),
                ChannelSettings::from_config(config),
            )
            .map_err(|source| BootstrapError::Surface { source })?;
            Ok(Service::Gateway(Arc::new(router)))
        }
    }
}
