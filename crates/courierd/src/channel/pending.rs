//! Table of requests awaiting a response on one connection.

use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Mutex, MutexGuard, PoisonError};

use courier_wire::{CorrelationId, Outcome, ResponseFrame};

/// What the reader thread hands to a waiting caller.
#[derive(Debug, Clone)]
pub(super) enum Delivery {
    /// The backend answered.
    Response(Outcome),
    /// The connection ended before an answer arrived.
    Disconnected(String),
    /// The connection was poisoned by an undecodable frame.
    Protocol(String),
}

#[derive(Debug)]
struct PendingState {
    open: bool,
    waiters: HashMap<CorrelationId, Sender<Delivery>>,
}

/// Waiters keyed by correlation token.
///
/// Once [`PendingRequests::fail_all`] runs the table is closed: later
/// registrations are refused so no caller waits on a dead connection.
#[derive(Debug)]
pub(super) struct PendingRequests {
    state: Mutex<PendingState>,
}

impl PendingRequests {
    pub(super) fn new() -> Self {
        Self {
            state: Mutex::new(PendingState {
                open: true,
                waiters: HashMap::new(),
            }),
        }
    }

    /// Registers a waiter, or returns `None` when the table is closed.
    pub(super) fn register(&self, correlation: CorrelationId) -> Option<Receiver<Delivery>> {
        let mut state = self.lock();
        if !state.open {
            return None;
        }
        let (sender, receiver) = mpsc::channel();
        state.waiters.insert(correlation, sender);
        Some(receiver)
    }

    /// Hands a response to its waiter. Returns `false` for unknown tokens.
    pub(super) fn complete(&self, frame: ResponseFrame) -> bool {
        let waiter = self.lock().waiters.remove(&frame.correlation);
        match waiter {
            // The waiter may have given up between lookup and send.
            Some(sender) => sender.send(Delivery::Response(frame.outcome)).is_ok(),
            None => false,
        }
    }

    /// Returns `true` while a caller still waits on `correlation`.
    pub(super) fn is_waiting(&self, correlation: CorrelationId) -> bool {
        self.lock().waiters.contains_key(&correlation)
    }

    pub(super) fn release(&self, correlation: CorrelationId) {
        self.lock().waiters.remove(&correlation);
    }

    /// Closes the table and delivers `delivery` to every waiter.
    pub(super) fn fail_all(&self, delivery: &Delivery) {
        let waiters: Vec<_> = {
            let mut state = self.lock();
            state.open = false;
            state.waiters.drain().map(|(_, sender)| sender).collect()
        };
        for sender in waiters {
            let _ = sender.send(delivery.clone());
        }
    }

    pub(super) fn is_open(&self) -> bool {
        self.lock().open
    }

    #[cfg(test)]
    pub(super) fn len(&self) -> usize {
        self.lock().waiters.len()
    }

    fn lock(&self) -> MutexGuard<'_, PendingState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Releases a pending entry when the waiting caller returns, however it
/// returns.
pub(super) struct InFlight<'a> {
    pending: &'a PendingRequests,
    correlation: CorrelationId,
}

impl<'a> InFlight<'a> {
    pub(super) fn new(pending: &'a PendingRequests, correlation: CorrelationId) -> Self {
        Self {
            pending,
            correlation,
        }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.pending.release(self.correlation);
    }
}
