//! Connection handler used by transport tests.

use std::io::{BufRead, BufReader, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::{ConnectionHandler, ConnectionStream};

/// Echoes every line back until the peer hangs up.
///
/// Counts connections seen and connections still being served, so tests can
/// tell a listener that accepted a client apart from one that is serving it.
#[derive(Debug, Default)]
pub(crate) struct EchoHandler {
    connections: AtomicUsize,
    active: AtomicUsize,
}

impl EchoHandler {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub(crate) fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    fn echo(stream: ConnectionStream) {
        let Ok(mut writer) = stream.try_clone() else {
            return;
        };
        for line in BufReader::new(stream).lines() {
            let Ok(line) = line else { return };
            if writer.write_all(format!("{line}\n").as_bytes()).is_err() {
                return;
            }
        }
    }
}

impl ConnectionHandler for EchoHandler {
    fn handle(&self, stream: ConnectionStream) {
        self.connections.fetch_add(1, Ordering::SeqCst);
        self.active.fetch_add(1, Ordering::SeqCst);
        Self::echo(stream);
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}
