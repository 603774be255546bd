//! Registration errors.

use thiserror::Error;

/// Errors raised while populating a [`super::HandlerRegistry`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// A handler is already registered under the name.
    #[error("command '{command}' is already registered")]
    DuplicateCommand {
        /// Conflicting command name.
        command: String,
    },
    /// Command names must contain at least one non-whitespace character.
    #[error("command name must not be empty")]
    EmptyCommandName,
}
