//! Configuration loaders for success and failure paths.

use std::ffi::OsString;
use std::sync::Arc;

use ortho_config::{OrthoConfig, OrthoError};
use tempfile::TempDir;

use courier_config::{Config, NodeRole, SocketEndpoint};

use crate::bootstrap::ConfigLoader;

/// Loader placing every socket under a nested temporary directory, so
/// bootstrap has to create the parent before binding.
#[derive(Clone)]
pub struct TestConfigLoader {
    role: NodeRole,
    socket_dir: Arc<TempDir>,
}

impl TestConfigLoader {
    pub fn new(role: NodeRole) -> Self {
        let dir = TempDir::new().expect("failed to create temporary directory for sockets");
        Self {
            role,
            socket_dir: Arc::new(dir),
        }
    }

    pub fn socket(&self, name: &str) -> SocketEndpoint {
        let path = self
            .socket_dir
            .path()
            .join("run")
            .join(format!("{name}.sock"));
        SocketEndpoint::unix(
            path.to_str()
                .expect("temporary socket path was not valid UTF-8")
                .to_owned(),
        )
    }
}

impl ConfigLoader for TestConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Ok(Config {
            role: self.role,
            gateway_socket: self.socket("gateway"),
            users_socket: self.socket("users"),
            forms_socket: self.socket("forms"),
            log_filter: String::from("warn"),
            ..Config::default()
        })
    }
}

/// Loader that fails by passing an unknown role on the command line.
pub struct FailingConfigLoader;

impl ConfigLoader for FailingConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        let args = vec![
            OsString::from("courierd"),
            OsString::from("--role"),
            OsString::from("widgets"),
        ];
        Config::load_from_iter(args)
    }
}
