//! In-process deployment of backend services and a gateway over TCP.
//!
//! Backends speak the framed command protocol; the gateway is queried over
//! HTTP like any other client would.

use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};

use courier_config::{Config, NodeRole, SocketEndpoint};

use crate::bootstrap::{RunningNode, StaticConfigLoader, bootstrap_with};
use crate::health::HealthReporter;
use crate::query::GRAPHQL_PATH;

use super::reporter::RecordingHealthReporter;

const LOCALHOST: &str = "127.0.0.1";

/// Returns a TCP endpoint nothing is listening on.
pub fn unused_endpoint() -> SocketEndpoint {
    let listener = TcpListener::bind((LOCALHOST, 0)).expect("reserve port");
    let port = listener.local_addr().expect("local addr").port();
    drop(listener);
    SocketEndpoint::tcp(LOCALHOST, port)
}

/// Nodes started for one scenario, stopped when dropped.
pub struct Cluster {
    reporter: Arc<RecordingHealthReporter>,
    nodes: Vec<RunningNode>,
    users: Option<SocketEndpoint>,
    forms: Option<SocketEndpoint>,
    gateway: Option<SocketEndpoint>,
    request_timeout: Duration,
}

impl Cluster {
    pub fn new() -> Self {
        Self {
            reporter: Arc::new(RecordingHealthReporter::default()),
            nodes: Vec::new(),
            users: None,
            forms: None,
            gateway: None,
            request_timeout: Duration::from_secs(2),
        }
    }

    fn config(&self, role: NodeRole) -> Config {
        Config {
            role,
            gateway_socket: SocketEndpoint::tcp(LOCALHOST, 0),
            users_socket: self
                .users
                .clone()
                .unwrap_or_else(|| SocketEndpoint::tcp(LOCALHOST, 0)),
            forms_socket: self
                .forms
                .clone()
                .unwrap_or_else(|| SocketEndpoint::tcp(LOCALHOST, 0)),
            request_timeout_ms: u64::try_from(self.request_timeout.as_millis())
                .expect("timeout fits in u64"),
            connect_timeout_ms: 500,
            log_filter: String::from("warn"),
            ..Config::default()
        }
    }

    fn start(&mut self, config: Config) -> SocketEndpoint {
        let reporter: Arc<dyn HealthReporter> = self.reporter.clone();
        let node = bootstrap_with(&StaticConfigLoader::new(config), reporter)
            .expect("node bootstraps")
            .serve()
            .expect("node serves");
        let endpoint = node.endpoint().clone();
        self.nodes.push(node);
        endpoint
    }

    /// Starts the users or forms service on an ephemeral port.
    pub fn start_service(&mut self, role: NodeRole) {
        let endpoint = self.start(self.config(role));
        self.use_backend(role, endpoint);
    }

    /// Points the gateway's `role` backend at `endpoint`.
    pub fn use_backend(&mut self, role: NodeRole, endpoint: SocketEndpoint) {
        match role {
            NodeRole::Users => self.users = Some(endpoint),
            NodeRole::Forms => self.forms = Some(endpoint),
            NodeRole::Gateway => panic!("the gateway is not a backend"),
        }
    }

    pub fn set_request_timeout(&mut self, timeout: Duration) {
        self.request_timeout = timeout;
    }

    /// Starts the gateway. Backends not started yet point at a closed port.
    pub fn start_gateway(&mut self) {
        if self.users.is_none() {
            self.users = Some(unused_endpoint());
        }
        if self.forms.is_none() {
            self.forms = Some(unused_endpoint());
        }
        let endpoint = self.start(self.config(NodeRole::Gateway));
        self.gateway = Some(endpoint);
    }

    pub fn client(&self) -> QueryClient {
        QueryClient::connect(self.gateway.as_ref().expect("gateway should be running"))
    }
}

impl Drop for Cluster {
    fn drop(&mut self) {
        for node in self.nodes.drain(..).rev() {
            let _ = node.stop();
        }
    }
}

/// HTTP client for the gateway's query endpoint.
pub struct QueryClient {
    url: String,
    agent: ureq::Agent,
}

/// Status and decoded body of one exchange with the gateway.
pub struct Answer {
    pub status: u16,
    pub body: Value,
}

impl QueryClient {
    pub fn connect(endpoint: &SocketEndpoint) -> Self {
        let SocketEndpoint::Tcp { host, port } = endpoint else {
            panic!("query client expects a TCP endpoint, got {endpoint}");
        };
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(10))
            .build();
        Self {
            url: format!("http://{host}:{port}{GRAPHQL_PATH}"),
            agent,
        }
    }

    /// Posts `body` as the request's JSON payload.
    pub fn post(&self, body: &str) -> Answer {
        let outcome = self
            .agent
            .post(&self.url)
            .set("Content-Type", "application/json")
            .send_string(body);
        Self::answer(outcome)
    }

    /// Issues a bodiless `GET`, which the endpoint does not accept.
    pub fn get(&self) -> Answer {
        Self::answer(self.agent.get(&self.url).call())
    }

    pub fn query(&self, query: &str) -> Answer {
        self.post(&json!({ "query": query }).to_string())
    }

    fn answer(outcome: Result<ureq::Response, ureq::Error>) -> Answer {
        let response = match outcome {
            Ok(response) | Err(ureq::Error::Status(_, response)) => response,
            Err(error) => panic!("gateway request failed: {error}"),
        };
        let status = response.status();
        let text = response.into_string().expect("read response body");
        let body = serde_json::from_str(&text).expect("decode response body");
        Answer { status, body }
    }
}
