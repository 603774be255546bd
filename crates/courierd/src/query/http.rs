//! HTTP transport for the query endpoint.
//!
//! The gateway answers `POST /graphql` with a JSON body
//! `{"query", "variables", "operationName"}`. Requests are read on the
//! server's receive loop and each one is executed on its own thread, so a
//! slow backend only holds up the requests that need it.

use std::io::{self, Read};
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tiny_http::{Header, Method, Request, Response, Server};
use tracing::{debug, info, warn};

use courier_config::SocketEndpoint;
use courier_wire::MAX_FRAME_BYTES;

use crate::dispatch::DispatchRouter;
use crate::transport::{ListenerError, socket_file};

use super::QUERY_TARGET;
use super::errors::QueryError;
use super::execute::execute;
use super::request::QueryRequest;
use super::response::QueryResponse;

/// Path the query endpoint is served on.
pub const GRAPHQL_PATH: &str = "/graphql";

/// Largest accepted request body.
pub const MAX_BODY_BYTES: usize = MAX_FRAME_BYTES;

const RECEIVE_ERROR_PAUSE: Duration = Duration::from_millis(150);

/// HTTP server bound to the gateway socket, not yet serving.
pub(crate) struct QueryServer {
    endpoint: SocketEndpoint,
    server: Server,
}

impl QueryServer {
    /// Binds `endpoint`. A TCP port of `0` is replaced by the assigned port.
    pub(crate) fn bind(endpoint: &SocketEndpoint) -> Result<Self, ListenerError> {
        let bind_failed = |error: Box<dyn std::error::Error + Send + Sync>| {
            ListenerError::BindHttp {
                endpoint: endpoint.to_string(),
                message: error.to_string(),
            }
        };
        match endpoint {
            SocketEndpoint::Tcp { host, port } => {
                let addr = resolve(host, *port)?;
                let server = Server::http(addr).map_err(bind_failed)?;
                let assigned = server
                    .server_addr()
                    .to_ip()
                    .map_or(*port, |bound| bound.port());
                Ok(Self {
                    endpoint: SocketEndpoint::tcp(host.clone(), assigned),
                    server,
                })
            }
            SocketEndpoint::Unix { path } => {
                socket_file::reclaim(path.as_std_path())?;
                let server = Server::http_unix(path.as_std_path()).map_err(bind_failed)?;
                Ok(Self {
                    endpoint: endpoint.clone(),
                    server,
                })
            }
        }
    }

    pub(crate) fn endpoint(&self) -> &SocketEndpoint {
        &self.endpoint
    }

    /// Starts answering queries through `router`.
    pub(crate) fn serve(
        self,
        router: Arc<DispatchRouter>,
    ) -> Result<QueryServerHandle, ListenerError> {
        let server = Arc::new(self.server);
        let stopping = Arc::new(AtomicBool::new(false));
        let receive = ReceiveLoop {
            server: Arc::clone(&server),
            stopping: Arc::clone(&stopping),
            router,
        };
        let thread = thread::Builder::new()
            .name(String::from("courier-http"))
            .spawn(move || receive.run())
            .map_err(|source| ListenerError::Spawn { source })?;
        info!(
            target: QUERY_TARGET,
            endpoint = %self.endpoint,
            path = GRAPHQL_PATH,
            "query endpoint listening"
        );
        Ok(QueryServerHandle {
            endpoint: self.endpoint,
            server,
            stopping,
            thread: Some(thread),
        })
    }
}

/// Running query endpoint. Dropping it stops the server.
pub(crate) struct QueryServerHandle {
    endpoint: SocketEndpoint,
    server: Arc<Server>,
    stopping: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl QueryServerHandle {
    pub(crate) fn endpoint(&self) -> &SocketEndpoint {
        &self.endpoint
    }

    /// Stops receiving and waits for requests already being executed.
    pub(crate) fn stop(mut self) -> Result<(), ListenerError> {
        self.halt()
    }

    fn halt(&mut self) -> Result<(), ListenerError> {
        let Some(thread) = self.thread.take() else {
            return Ok(());
        };
        self.stopping.store(true, Ordering::SeqCst);
        self.server.unblock();
        let joined = thread.join().map_err(|_| ListenerError::ThreadPanic);
        if let Some(path) = self.endpoint.unix_path() {
            socket_file::release(path.as_std_path());
        }
        debug!(target: QUERY_TARGET, endpoint = %self.endpoint, "query endpoint stopped");
        joined
    }
}

impl Drop for QueryServerHandle {
    fn drop(&mut self) {
        if let Err(error) = self.halt() {
            warn!(target: QUERY_TARGET, error = %error, "query endpoint did not stop cleanly");
        }
    }
}

struct ReceiveLoop {
    server: Arc<Server>,
    stopping: Arc<AtomicBool>,
    router: Arc<DispatchRouter>,
}

impl ReceiveLoop {
    fn run(self) {
        let mut workers: Vec<JoinHandle<()>> = Vec::new();
        loop {
            let received = self.server.recv();
            if self.stopping.load(Ordering::SeqCst) {
                if let Ok(request) = received {
                    answer(request, &Reply::unavailable());
                }
                break;
            }
            let request = match received {
                Ok(request) => request,
                Err(error) => {
                    warn!(target: QUERY_TARGET, error = %error, "failed to receive request");
                    thread::sleep(RECEIVE_ERROR_PAUSE);
                    continue;
                }
            };

            workers.retain(|worker| !worker.is_finished());
            let router = Arc::clone(&self.router);
            let spawned = thread::Builder::new()
                .name(String::from("courier-query"))
                .spawn(move || handle(&router, request));
            match spawned {
                Ok(worker) => workers.push(worker),
                Err(error) => warn!(
                    target: QUERY_TARGET,
                    error = %error,
                    "could not start a thread for the request"
                ),
            }
        }

        for worker in workers {
            if worker.join().is_err() {
                warn!(target: QUERY_TARGET, "query worker panicked");
            }
        }
    }
}

/// Status, body and extra header of an HTTP answer.
#[derive(Debug)]
struct Reply {
    status: u16,
    body: QueryResponse,
    allow: Option<&'static str>,
}

impl Reply {
    fn rejected(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            body: QueryResponse::from_error(&QueryError::bad_request(message)),
            allow: None,
        }
    }

    fn unavailable() -> Self {
        Self::rejected(503, "the gateway is shutting down")
    }

    /// Request-level failures never reach execution and carry no data.
    fn executed(body: QueryResponse) -> Self {
        let status = if body.data().is_some() { 200 } else { 400 };
        Self {
            status,
            body,
            allow: None,
        }
    }
}

fn handle(router: &DispatchRouter, mut request: Request) {
    let reply = route(router, &mut request);
    debug!(
        target: QUERY_TARGET,
        method = %request.method(),
        url = request.url(),
        status = reply.status,
        "answered query request"
    );
    answer(request, &reply);
}

fn route(router: &DispatchRouter, request: &mut Request) -> Reply {
    let url = request.url();
    let path = url.split_once('?').map_or(url, |(path, _)| path);
    if path != GRAPHQL_PATH {
        return Reply::rejected(404, format!("no endpoint at {path}; queries go to {GRAPHQL_PATH}"));
    }
    if *request.method() != Method::Post {
        return Reply {
            allow: Some("POST"),
            ..Reply::rejected(405, format!("{GRAPHQL_PATH} only accepts POST"))
        };
    }

    let body = match read_body(request) {
        Ok(body) => body,
        Err(reply) => return reply,
    };
    match QueryRequest::parse(&body) {
        Ok(query) => Reply::executed(execute(router, &query)),
        Err(rejection) => {
            debug!(target: QUERY_TARGET, error = %rejection, "malformed query request");
            Reply::executed(QueryResponse::from_error(&rejection))
        }
    }
}

fn read_body(request: &mut Request) -> Result<Vec<u8>, Reply> {
    let too_large = |size: usize| {
        Reply::rejected(
            413,
            format!("request body of {size} bytes exceeds the {MAX_BODY_BYTES} byte limit"),
        )
    };
    if let Some(declared) = request.body_length()
        && declared > MAX_BODY_BYTES
    {
        return Err(too_large(declared));
    }

    let mut body = Vec::new();
    let limit = u64::try_from(MAX_BODY_BYTES).map_or(u64::MAX, |limit| limit.saturating_add(1));
    request
        .as_reader()
        .take(limit)
        .read_to_end(&mut body)
        .map_err(|error| Reply::rejected(400, format!("failed to read request body: {error}")))?;
    if body.len() > MAX_BODY_BYTES {
        return Err(too_large(body.len()));
    }
    Ok(body)
}

fn answer(request: Request, reply: &Reply) {
    let body = match serde_json::to_vec(&reply.body) {
        Ok(body) => body,
        Err(error) => {
            warn!(target: QUERY_TARGET, error = %error, "failed to encode response");
            let _ = request.respond(Response::empty(500));
            return;
        }
    };
    let mut response = Response::from_data(body).with_status_code(reply.status);
    if let Ok(content_type) = Header::from_bytes("Content-Type", "application/json") {
        response = response.with_header(content_type);
    }
    if let Some(allow) = reply.allow
        && let Ok(header) = Header::from_bytes("Allow", allow)
    {
        response = response.with_header(header);
    }
    if let Err(error) = request.respond(response) {
        debug!(target: QUERY_TARGET, error = %error, "failed to write response");
    }
}

fn resolve(host: &str, port: u16) -> Result<SocketAddr, ListenerError> {
    let resolve_failed = |source: io::Error| ListenerError::Resolve {
        host: host.to_owned(),
        port,
        source,
    };
    (host, port)
        .to_socket_addrs()
        .map_err(resolve_failed)?
        .next()
        .ok_or_else(|| ListenerError::ResolveEmpty {
            host: host.to_owned(),
            port,
        })
}
