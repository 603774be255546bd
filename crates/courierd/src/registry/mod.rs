//! Command handler registry for backend services.
//!
//! A [`HandlerRegistry`] maps command names to handlers and turns every
//! inbound [`RequestFrame`] into exactly one [`ResponseFrame`]: unknown
//! commands, bad payloads, handler failures and even handler panics are all
//! reported to the caller as error responses.

mod connection;
mod errors;
mod handler;

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{debug, warn};

use courier_wire::{RemoteErrorKind, RequestFrame, ResponseFrame};

pub(crate) use self::connection::ServiceConnectionHandler;
pub use self::errors::RegistryError;
pub use self::handler::{CommandHandler, HandlerError, typed};

pub(crate) const REGISTRY_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::registry");

/// Command handlers served by one backend.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn CommandHandler>>,
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("HandlerRegistry")
            .field("commands", &self.commands())
            .finish()
    }
}

impl HandlerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` under `command`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::EmptyCommandName`] for a blank name and
    /// [`RegistryError::DuplicateCommand`] when the name is taken.
    pub fn register(
        &mut self,
        command: impl Into<String>,
        handler: impl CommandHandler,
    ) -> Result<(), RegistryError> {
        let command = command.into();
        if command.trim().is_empty() {
            return Err(RegistryError::EmptyCommandName);
        }
        if self.handlers.contains_key(&command) {
            return Err(RegistryError::DuplicateCommand { command });
        }
        self.handlers.insert(command, Arc::new(handler));
        Ok(())
    }

    /// Returns `true` when a handler exists for `command`.
    #[must_use]
    pub fn contains(&self, command: &str) -> bool {
        self.handlers.contains_key(command)
    }

    /// Registered command names in sorted order.
    #[must_use]
    pub fn commands(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Runs the handler for `request` and builds its response.
    #[must_use]
    pub fn handle_incoming(&self, request: RequestFrame) -> ResponseFrame {
        let RequestFrame {
            correlation,
            command,
            payload,
        } = request;

        let Some(handler) = self.handlers.get(&command) else {
            debug!(
                target: REGISTRY_TARGET,
                command = %command,
                %correlation,
                "no handler registered"
            );
            return ResponseFrame::failure(
                correlation,
                RemoteErrorKind::UnknownCommand,
                format!("no handler registered for command '{command}'"),
            );
        };

        match panic::catch_unwind(AssertUnwindSafe(|| handler.call(payload))) {
            Ok(Ok(value)) => ResponseFrame::success(correlation, value),
            Ok(Err(error)) => {
                debug!(
                    target: REGISTRY_TARGET,
                    command = %command,
                    %correlation,
                    error = %error,
                    "handler returned an error"
                );
                ResponseFrame::failure(correlation, error.kind(), error.message())
            }
            Err(panic) => {
                let detail = panic_message(panic.as_ref());
                warn!(
                    target: REGISTRY_TARGET,
                    command = %command,
                    %correlation,
                    panic = %detail,
                    "handler panicked"
                );
                ResponseFrame::failure(
                    correlation,
                    RemoteErrorKind::HandlerFailed,
                    format!("handler for '{command}' panicked: {detail}"),
                )
            }
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        String::from("unknown panic")
    }
}
