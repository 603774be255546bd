//! Inbound socket listener for backend nodes.
//!
//! Accepting blocks on a dedicated thread. Stopping flips a flag and then
//! dials the listener's own endpoint so the blocked `accept` returns; the
//! loop sees the flag, drops the wake-up connection, and shuts down every
//! connection still being served before it exits.

use std::collections::HashMap;
use std::io;
use std::net::{SocketAddr, TcpListener, ToSocketAddrs};
use std::os::unix::net::UnixListener;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, warn};

use courier_config::SocketEndpoint;

use super::{
    ConnectionHandler, ConnectionStream, ListenerError, TRANSPORT_TARGET, connect, socket_file,
};

/// Pause after a failed `accept`, so a persistent error such as descriptor
/// exhaustion does not spin the thread.
const ACCEPT_ERROR_PAUSE: Duration = Duration::from_millis(150);
const WAKE_TIMEOUT: Duration = Duration::from_millis(500);

/// A bound socket that is not accepting yet.
#[derive(Debug)]
pub(crate) struct SocketListener {
    endpoint: SocketEndpoint,
    acceptor: Acceptor,
}

#[derive(Debug)]
enum Acceptor {
    Tcp(TcpListener),
    Unix(UnixListener),
}

impl Acceptor {
    fn accept(&self) -> io::Result<ConnectionStream> {
        match self {
            Self::Tcp(listener) => {
                let (stream, _) = listener.accept()?;
                stream.set_nodelay(true)?;
                Ok(ConnectionStream::Tcp(stream))
            }
            Self::Unix(listener) => {
                let (stream, _) = listener.accept()?;
                Ok(ConnectionStream::Unix(stream))
            }
        }
    }
}

impl SocketListener {
    /// Binds `endpoint`, reclaiming a stale Unix socket file first.
    ///
    /// A TCP port of `0` is replaced by the port the OS assigned, so
    /// [`SocketListener::endpoint`] is always dialable.
    pub(crate) fn bind(endpoint: &SocketEndpoint) -> Result<Self, ListenerError> {
        match endpoint {
            SocketEndpoint::Tcp { host, port } => {
                let addr = resolve(host, *port)?;
                let listener = TcpListener::bind(addr)
                    .map_err(|source| ListenerError::BindTcp { addr, source })?;
                let assigned = listener
                    .local_addr()
                    .map_err(|source| ListenerError::BindTcp { addr, source })?;
                Ok(Self {
                    endpoint: SocketEndpoint::tcp(host.clone(), assigned.port()),
                    acceptor: Acceptor::Tcp(listener),
                })
            }
            SocketEndpoint::Unix { path } => {
                socket_file::reclaim(path.as_std_path())?;
                let listener =
                    UnixListener::bind(path.as_std_path()).map_err(|source| {
                        ListenerError::BindUnix {
                            path: path.to_string(),
                            source,
                        }
                    })?;
                Ok(Self {
                    endpoint: endpoint.clone(),
                    acceptor: Acceptor::Unix(listener),
                })
            }
        }
    }

    /// Endpoint clients should dial.
    pub(crate) fn endpoint(&self) -> &SocketEndpoint {
        &self.endpoint
    }

    /// Starts accepting, handing each connection to `handler` on its own
    /// thread.
    pub(crate) fn serve(
        self,
        handler: Arc<dyn ConnectionHandler>,
    ) -> Result<ListenerHandle, ListenerError> {
        let endpoint = self.endpoint.clone();
        let stopping = Arc::new(AtomicBool::new(false));
        let accept_loop = AcceptLoop {
            listener: self,
            stopping: Arc::clone(&stopping),
            live: Arc::new(LiveConnections::default()),
            handler,
        };
        let thread = thread::Builder::new()
            .name(String::from("courier-accept"))
            .spawn(move || accept_loop.run())
            .map_err(|source| ListenerError::Spawn { source })?;
        info!(
            target: TRANSPORT_TARGET,
            endpoint = %endpoint,
            "listening"
        );
        Ok(ListenerHandle {
            endpoint,
            stopping,
            thread: Some(thread),
        })
    }
}

/// Running listener. Dropping it stops the listener.
#[derive(Debug)]
pub(crate) struct ListenerHandle {
    endpoint: SocketEndpoint,
    stopping: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl ListenerHandle {
    pub(crate) fn endpoint(&self) -> &SocketEndpoint {
        &self.endpoint
    }

    /// Stops accepting, disconnects live clients, and waits for their
    /// handlers to return. A Unix socket file is removed.
    pub(crate) fn stop(mut self) -> Result<(), ListenerError> {
        self.halt()
    }

    fn halt(&mut self) -> Result<(), ListenerError> {
        let Some(thread) = self.thread.take() else {
            return Ok(());
        };
        self.stopping.store(true, Ordering::SeqCst);
        if let Err(error) = connect(&self.endpoint, WAKE_TIMEOUT) {
            debug!(
                target: TRANSPORT_TARGET,
                endpoint = %self.endpoint,
                error = %error,
                "wake-up connection failed"
            );
        }
        let joined = thread.join().map_err(|_| ListenerError::ThreadPanic);
        if let Some(path) = self.endpoint.unix_path() {
            socket_file::release(path.as_std_path());
        }
        debug!(
            target: TRANSPORT_TARGET,
            endpoint = %self.endpoint,
            "listener stopped"
        );
        joined
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        if let Err(error) = self.halt() {
            warn!(target: TRANSPORT_TARGET, error = %error, "listener did not stop cleanly");
        }
    }
}

/// Control handles for connections still being served, so a stopping
/// listener can cut them off.
#[derive(Debug, Default)]
struct LiveConnections {
    streams: Mutex<HashMap<u64, ConnectionStream>>,
}

impl LiveConnections {
    fn track(&self, id: u64, stream: &ConnectionStream) -> io::Result<()> {
        let control = stream.try_clone()?;
        self.lock().insert(id, control);
        Ok(())
    }

    fn forget(&self, id: u64) {
        self.lock().remove(&id);
    }

    fn disconnect_all(&self) {
        let streams: Vec<_> = self.lock().drain().map(|(_, stream)| stream).collect();
        for stream in streams {
            if let Err(error) = stream.shutdown() {
                debug!(target: TRANSPORT_TARGET, error = %error, "connection shutdown failed");
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u64, ConnectionStream>> {
        self.streams.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct AcceptLoop {
    listener: SocketListener,
    stopping: Arc<AtomicBool>,
    live: Arc<LiveConnections>,
    handler: Arc<dyn ConnectionHandler>,
}

impl AcceptLoop {
    fn run(self) {
        let mut workers: Vec<JoinHandle<()>> = Vec::new();
        let mut next_id = 0_u64;
        let mut last_error = None::<io::ErrorKind>;

        loop {
            let accepted = self.listener.acceptor.accept();
            if self.stopping.load(Ordering::SeqCst) {
                break;
            }
            let stream = match accepted {
                Ok(stream) => {
                    last_error = None;
                    stream
                }
                Err(error) => {
                    if last_error != Some(error.kind()) {
                        warn!(target: TRANSPORT_TARGET, error = %error, "accept failed");
                    }
                    last_error = Some(error.kind());
                    thread::sleep(ACCEPT_ERROR_PAUSE);
                    continue;
                }
            };

            workers.retain(|worker| !worker.is_finished());
            next_id += 1;
            if let Some(worker) = self.spawn_worker(next_id, stream) {
                workers.push(worker);
            }
        }

        self.live.disconnect_all();
        for worker in workers {
            if worker.join().is_err() {
                warn!(target: TRANSPORT_TARGET, "connection handler panicked");
            }
        }
    }

    fn spawn_worker(&self, id: u64, stream: ConnectionStream) -> Option<JoinHandle<()>> {
        if let Err(error) = self.live.track(id, &stream) {
            warn!(
                target: TRANSPORT_TARGET,
                error = %error,
                "could not track connection; dropping it"
            );
            return None;
        }
        let handler = Arc::clone(&self.handler);
        let live = Arc::clone(&self.live);
        let spawned = thread::Builder::new()
            .name(format!("courier-conn-{id}"))
            .spawn(move || {
                handler.handle(stream);
                live.forget(id);
            });
        match spawned {
            Ok(worker) => Some(worker),
            Err(error) => {
                warn!(
                    target: TRANSPORT_TARGET,
                    error = %error,
                    "could not start connection thread"
                );
                self.live.forget(id);
                None
            }
        }
    }
}

fn resolve(host: &str, port: u16) -> Result<SocketAddr, ListenerError> {
    let mut addrs = (host, port)
        .to_socket_addrs()
        .map_err(|source| ListenerError::Resolve {
            host: host.to_owned(),
            port,
            source,
        })?;
    addrs.next().ok_or_else(|| ListenerError::ResolveEmpty {
        host: host.to_owned(),
        port,
    })
}
