//! Multiplexed channel over a single lazily opened connection.

use std::io::{self, BufReader, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use serde_json::Value;
use tracing::{debug, info, warn};

use courier_config::SocketEndpoint;
use courier_wire::{Command, CorrelationId, FrameReader, ResponseFrame, encode_frame};

use crate::transport::{self, ConnectError, ConnectionStream};

use super::pending::{Delivery, InFlight, PendingRequests};
use super::{CHANNEL_TARGET, ChannelError, ChannelSettings, CommandChannel};

/// Channel bound to one backend endpoint.
///
/// The connection is opened on the first [`send`](CommandChannel::send) and
/// reused until it drops; the next send after a drop opens a new one. Callers
/// that arrive while a connection is being opened wait for that attempt and
/// share its outcome instead of dialling again. Sends are never retried.
///
/// A caller never writes to the socket itself. Frames are queued for the
/// connection's writer thread and the caller only waits, up to the request
/// deadline, for its answer. A backend that stops reading therefore costs
/// each caller at most one deadline, and the writer gives up on the
/// connection once a single write stalls for that long.
#[derive(Debug)]
pub struct MultiplexedChannel {
    backend: String,
    endpoint: SocketEndpoint,
    settings: ChannelSettings,
    issued: Arc<AtomicU64>,
    slot: Mutex<Slot>,
    slot_changed: Condvar,
}

/// Connection state guarded by the slot mutex. The mutex is never held
/// while dialling.
#[derive(Debug, Default)]
struct Slot {
    connection: Option<Arc<Connection>>,
    /// Attempt currently dialling, if any.
    connecting: Option<u64>,
    attempts: u64,
    /// Failure of the most recent attempt, kept for callers that waited on it.
    failure: Option<(u64, ConnectError)>,
}

impl MultiplexedChannel {
    /// Creates a channel; no connection is made until the first send.
    #[must_use]
    pub fn new(
        backend: impl Into<String>,
        endpoint: SocketEndpoint,
        settings: ChannelSettings,
    ) -> Self {
        Self {
            backend: backend.into(),
            endpoint,
            settings,
            issued: Arc::new(AtomicU64::new(1)),
            slot: Mutex::new(Slot::default()),
            slot_changed: Condvar::new(),
        }
    }

    /// Name of the backend this channel talks to.
    #[must_use]
    pub fn backend(&self) -> &str {
        self.backend.as_str()
    }

    /// Address of the backend.
    #[must_use]
    pub fn endpoint(&self) -> &SocketEndpoint {
        &self.endpoint
    }

    /// Returns `true` while a live connection is held.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.lock_slot()
            .connection
            .as_ref()
            .is_some_and(|connection| connection.is_open())
    }

    /// Requests on the current connection still waiting for an answer.
    #[cfg(test)]
    pub(crate) fn pending_requests(&self) -> usize {
        self.lock_slot()
            .connection
            .as_ref()
            .map_or(0, |connection| connection.pending.len())
    }

    /// Returns the live connection, dialling when there is none.
    fn connection(&self) -> Result<Arc<Connection>, ChannelError> {
        let mut slot = self.lock_slot();
        loop {
            if let Some(connection) = slot.connection.as_ref()
                && connection.is_open()
            {
                return Ok(Arc::clone(connection));
            }
            let Some(attempt) = slot.connecting else {
                break;
            };
            slot = self
                .slot_changed
                .wait_while(slot, |slot| slot.connecting == Some(attempt))
                .unwrap_or_else(PoisonError::into_inner);
            if let Some((failed, error)) = slot.failure.as_ref()
                && *failed == attempt
            {
                return Err(ChannelError::ConnectionFailed {
                    backend: self.backend.clone(),
                    source: error.duplicate(),
                });
            }
        }

        slot.attempts += 1;
        let attempt = slot.attempts;
        slot.connecting = Some(attempt);
        let stale = slot.connection.take();
        drop(slot);

        if let Some(stale) = stale {
            debug!(
                target: CHANNEL_TARGET,
                backend = %self.backend,
                "discarding dropped connection"
            );
            stale.close("connection discarded");
        }
        let opened = Connection::open(
            &self.backend,
            &self.endpoint,
            self.settings,
            Arc::clone(&self.issued),
        );

        let mut slot = self.lock_slot();
        slot.connecting = None;
        let outcome = match opened {
            Ok(connection) => {
                info!(
                    target: CHANNEL_TARGET,
                    backend = %self.backend,
                    endpoint = %self.endpoint,
                    "connected to backend"
                );
                slot.failure = None;
                slot.connection = Some(Arc::clone(&connection));
                Ok(connection)
            }
            Err(error) => {
                slot.failure = Some((attempt, error.duplicate()));
                Err(ChannelError::ConnectionFailed {
                    backend: self.backend.clone(),
                    source: error,
                })
            }
        };
        drop(slot);
        self.slot_changed.notify_all();
        outcome
    }

    fn next_correlation(&self) -> CorrelationId {
        CorrelationId::new(self.issued.fetch_add(1, Ordering::SeqCst))
    }

    fn lock_slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn await_delivery(
        &self,
        delivery: Result<Delivery, RecvTimeoutError>,
        command: &str,
        correlation: CorrelationId,
    ) -> Result<Value, ChannelError> {
        match delivery {
            Ok(Delivery::Response(outcome)) => {
                outcome
                    .into_result()
                    .map_err(|source| ChannelError::Remote {
                        backend: self.backend.clone(),
                        source,
                    })
            }
            Ok(Delivery::Disconnected(reason)) => {
                Err(ChannelError::disconnected(&self.backend, reason))
            }
            Ok(Delivery::Protocol(message)) => Err(ChannelError::protocol(&self.backend, message)),
            Err(RecvTimeoutError::Timeout) => {
                debug!(
                    target: CHANNEL_TARGET,
                    backend = %self.backend,
                    command,
                    %correlation,
                    "request deadline elapsed"
                );
                Err(ChannelError::Timeout {
                    backend: self.backend.clone(),
                    command: command.to_owned(),
                    timeout: self.settings.request_timeout,
                })
            }
            Err(RecvTimeoutError::Disconnected) => Err(ChannelError::disconnected(
                &self.backend,
                "reader stopped without answering",
            )),
        }
    }
}

impl CommandChannel for MultiplexedChannel {
    fn send(&self, command: Command) -> Result<Value, ChannelError> {
        if !command.has_name() {
            return Err(ChannelError::invalid_command("command name must not be empty"));
        }

        let correlation = self.next_correlation();
        let command_name = command.name().to_owned();
        let line = encode_frame(&command.into_frame(correlation))
            .map_err(|error| ChannelError::invalid_command(error.to_string()))?;

        let connection = self.connection()?;
        let Some(receiver) = connection.pending.register(correlation) else {
            return Err(ChannelError::disconnected(
                &self.backend,
                "connection closed before the request was sent",
            ));
        };
        let _in_flight = InFlight::new(&connection.pending, correlation);

        debug!(
            target: CHANNEL_TARGET,
            backend = %self.backend,
            command = %command_name,
            %correlation,
            "sending command"
        );
        if !connection.enqueue(Outgoing { correlation, line }) {
            return Err(ChannelError::disconnected(
                &self.backend,
                "connection closed before the request was sent",
            ));
        }

        let delivery = receiver.recv_timeout(self.settings.request_timeout);
        self.await_delivery(delivery, &command_name, correlation)
    }

    fn close(&self) {
        let connection = self.lock_slot().connection.take();
        if let Some(connection) = connection {
            connection.close("channel closed");
            debug!(
                target: CHANNEL_TARGET,
                backend = %self.backend,
                "channel closed"
            );
        }
    }
}

impl Drop for MultiplexedChannel {
    fn drop(&mut self) {
        self.close();
    }
}

/// An encoded request waiting for the writer thread.
#[derive(Debug)]
struct Outgoing {
    correlation: CorrelationId,
    line: Vec<u8>,
}

/// A live connection: the outbox feeding its writer thread, a control handle
/// for shutdown, and the reader thread feeding the pending table.
#[derive(Debug)]
struct Connection {
    outbox: Mutex<Option<Sender<Outgoing>>>,
    control: ConnectionStream,
    pending: Arc<PendingRequests>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Connection {
    fn open(
        backend: &str,
        endpoint: &SocketEndpoint,
        settings: ChannelSettings,
        issued: Arc<AtomicU64>,
    ) -> Result<Arc<Self>, ConnectError> {
        let io_failed = |source| ConnectError::Connect {
            endpoint: endpoint.to_string(),
            source,
        };

        let stream = transport::connect(endpoint, settings.connect_timeout).inspect_err(|error| {
            warn!(
                target: CHANNEL_TARGET,
                backend,
                %endpoint,
                timed_out = error.is_timeout(),
                error = %error,
                "backend connection failed"
            );
        })?;
        stream
            .set_write_timeout(Some(settings.request_timeout))
            .map_err(io_failed)?;
        let read_half = stream.try_clone().map_err(io_failed)?;
        let control = stream.try_clone().map_err(io_failed)?;
        let pending = Arc::new(PendingRequests::new());
        let (outbox, queued) = mpsc::channel();

        let reader = {
            let pending = Arc::clone(&pending);
            let backend = backend.to_owned();
            thread::Builder::new()
                .name(format!("{backend}-reader"))
                .spawn(move || run_reader(&backend, read_half, &pending, &issued))
                .map_err(io_failed)?
        };
        let connection = Self {
            outbox: Mutex::new(Some(outbox)),
            control,
            pending: Arc::clone(&pending),
            workers: Mutex::new(vec![reader]),
        };
        let writer = {
            let backend = backend.to_owned();
            thread::Builder::new()
                .name(format!("{backend}-writer"))
                .spawn(move || run_writer(&backend, stream, &queued, &pending))
        };
        match writer {
            Ok(writer) => connection.lock_workers().push(writer),
            // Dropping the connection shuts the socket and joins the reader.
            Err(source) => return Err(io_failed(source)),
        }
        Ok(Arc::new(connection))
    }

    fn is_open(&self) -> bool {
        self.pending.is_open()
    }

    /// Hands a request to the writer thread. Returns `false` once the
    /// connection has been closed.
    fn enqueue(&self, request: Outgoing) -> bool {
        self.outbox
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|outbox| outbox.send(request).is_ok())
    }

    fn lock_workers(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.workers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fails outstanding requests, shuts the socket and joins both threads.
    fn close(&self, reason: &str) {
        self.pending
            .fail_all(&Delivery::Disconnected(reason.to_owned()));
        drop(
            self.outbox
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
        );
        if let Err(error) = self.control.shutdown() {
            debug!(
                target: CHANNEL_TARGET,
                error = %error,
                "socket shutdown failed"
            );
        }
        let workers: Vec<_> = self.lock_workers().drain(..).collect();
        for worker in workers {
            if worker.join().is_err() {
                warn!(target: CHANNEL_TARGET, "connection worker panicked");
            }
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close("connection dropped");
    }
}

/// Writes queued frames until the outbox closes or a write fails.
///
/// Requests whose caller already gave up are skipped. A write that errors or
/// stalls past the socket's write timeout ends the connection, since a
/// partial frame cannot be recovered.
fn run_writer(
    backend: &str,
    mut stream: ConnectionStream,
    queued: &Receiver<Outgoing>,
    pending: &PendingRequests,
) {
    for Outgoing { correlation, line } in queued {
        if !pending.is_waiting(correlation) {
            debug!(
                target: CHANNEL_TARGET,
                backend,
                %correlation,
                "skipping request abandoned before it was written"
            );
            continue;
        }
        if let Err(error) = stream.write_all(&line).and_then(|()| stream.flush()) {
            let stalled = matches!(
                error.kind(),
                io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
            );
            warn!(
                target: CHANNEL_TARGET,
                backend,
                %correlation,
                stalled,
                error = %error,
                "failed to write request; dropping connection"
            );
            let reason = if stalled {
                String::from("backend stopped reading requests")
            } else {
                format!("write failed: {error}")
            };
            pending.fail_all(&Delivery::Disconnected(reason));
            let _ = stream.shutdown();
            return;
        }
    }
}

fn run_reader(
    backend: &str,
    stream: ConnectionStream,
    pending: &PendingRequests,
    issued: &AtomicU64,
) {
    let mut frames = FrameReader::new(BufReader::new(stream));
    loop {
        let failure = match frames.read_frame::<ResponseFrame>() {
            Ok(Some(frame)) => {
                let correlation = frame.correlation;
                if correlation.get() == 0 || correlation.get() >= issued.load(Ordering::SeqCst) {
                    warn!(
                        target: CHANNEL_TARGET,
                        backend,
                        %correlation,
                        "response for a correlation token never issued; dropping connection"
                    );
                    Delivery::Protocol(format!(
                        "response for correlation token {correlation} that was never issued"
                    ))
                } else {
                    if !pending.complete(frame) {
                        debug!(
                            target: CHANNEL_TARGET,
                            backend,
                            %correlation,
                            "discarding late response"
                        );
                    }
                    continue;
                }
            }
            Ok(None) => {
                debug!(target: CHANNEL_TARGET, backend, "backend closed the connection");
                pending.fail_all(&Delivery::Disconnected(String::from(
                    "backend closed the connection",
                )));
                return;
            }
            Err(error) if error.is_io() => {
                pending.fail_all(&Delivery::Disconnected(error.to_string()));
                return;
            }
            Err(error) => {
                warn!(
                    target: CHANNEL_TARGET,
                    backend,
                    error = %error,
                    "malformed frame from backend; dropping connection"
                );
                Delivery::Protocol(error.to_string())
            }
        };
        pending.fail_all(&failure);
        let stream = frames.into_inner().into_inner();
        let _ = stream.shutdown();
        return;
    }
}
