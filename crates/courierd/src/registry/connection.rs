//! Serves a handler registry over an accepted connection.

use std::io::{BufReader, Write};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use serde_json::Value;
use tracing::{debug, warn};

use courier_wire::{
    CorrelationId, FrameReader, RemoteErrorKind, RequestFrame, ResponseFrame, WireError, decode,
    encode_frame,
};

use crate::transport::{ConnectionHandler, ConnectionStream};

use super::{HandlerRegistry, REGISTRY_TARGET};

/// Connection handler for a backend service.
///
/// Frames are read in order, but each request runs on its own thread and its
/// response is written as soon as it is ready, so a slow handler never holds
/// up the ones behind it. The connection stays open until the peer closes it.
#[derive(Debug)]
pub(crate) struct ServiceConnectionHandler {
    service: String,
    registry: Arc<HandlerRegistry>,
}

impl ServiceConnectionHandler {
    pub(crate) fn new(service: impl Into<String>, registry: Arc<HandlerRegistry>) -> Self {
        Self {
            service: service.into(),
            registry,
        }
    }

    fn serve(&self, stream: ConnectionStream) {
        let writer = match stream.try_clone() {
            Ok(writer) => Mutex::new(writer),
            Err(error) => {
                warn!(
                    target: REGISTRY_TARGET,
                    service = %self.service,
                    error = %error,
                    "failed to split connection"
                );
                return;
            }
        };
        let mut frames = FrameReader::new(BufReader::new(stream));

        thread::scope(|scope| {
            loop {
                let line = match frames.next_line() {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(WireError::FrameTooLarge { size, max }) => {
                        warn!(
                            target: REGISTRY_TARGET,
                            service = %self.service,
                            size,
                            max,
                            "request frame too large; closing connection"
                        );
                        break;
                    }
                    Err(error) => {
                        debug!(
                            target: REGISTRY_TARGET,
                            service = %self.service,
                            error = %error,
                            "connection read failed"
                        );
                        break;
                    }
                };

                match decode::<RequestFrame>(line) {
                    Ok(request) => {
                        let registry = &self.registry;
                        let writer = &writer;
                        let service = self.service.as_str();
                        scope.spawn(move || {
                            let response = registry.handle_incoming(request);
                            send_response(service, writer, &response);
                        });
                    }
                    Err(error) => match recover_correlation(line) {
                        Some(correlation) => {
                            debug!(
                                target: REGISTRY_TARGET,
                                service = %self.service,
                                %correlation,
                                error = %error,
                                "malformed request"
                            );
                            let response = ResponseFrame::failure(
                                correlation,
                                RemoteErrorKind::MalformedRequest,
                                error.to_string(),
                            );
                            send_response(&self.service, &writer, &response);
                        }
                        None => warn!(
                            target: REGISTRY_TARGET,
                            service = %self.service,
                            error = %error,
                            "skipping request without correlation token"
                        ),
                    },
                }
            }
        });
    }
}

impl ConnectionHandler for ServiceConnectionHandler {
    fn handle(&self, stream: ConnectionStream) {
        self.serve(stream);
    }
}

fn send_response(service: &str, writer: &Mutex<ConnectionStream>, response: &ResponseFrame) {
    let line = match encode_frame(response) {
        Ok(line) => line,
        Err(error) => {
            warn!(
                target: REGISTRY_TARGET,
                service,
                correlation = %response.correlation,
                error = %error,
                "response cannot be framed; answering with a failure"
            );
            let failure = ResponseFrame::failure(
                response.correlation,
                RemoteErrorKind::HandlerFailed,
                format!("response could not be sent: {error}"),
            );
            match encode_frame(&failure) {
                Ok(line) => line,
                Err(_) => return,
            }
        }
    };
    let mut stream = writer.lock().unwrap_or_else(PoisonError::into_inner);
    if let Err(error) = stream.write_all(&line).and_then(|()| stream.flush()) {
        warn!(
            target: REGISTRY_TARGET,
            service,
            correlation = %response.correlation,
            error = %error,
            "failed to write response"
        );
    }
}

/// Pulls the correlation token out of a line that is not a valid request.
fn recover_correlation(line: &[u8]) -> Option<CorrelationId> {
    let value: Value = serde_json::from_slice(line).ok()?;
    value
        .get("correlation")
        .and_then(Value::as_u64)
        .map(CorrelationId::new)
}
