//! Public query surface: the table of operations clients may call.
//!
//! Each [`Operation`] names the backend that serves it, the command sent to
//! that backend, and an [`ArgTransform`] that turns the query arguments into
//! the command payload. The table is assembled with a [`QuerySurfaceBuilder`]
//! and validated against the configured backends before anything is served.

use std::collections::{HashMap, HashSet};

use serde_json::{Map, Value};

use courier_config::{FORMS_BACKEND, USERS_BACKEND};

use crate::services::{GET_FORM, GET_USER};

use super::errors::{ConfigurationError, DispatchError};

/// Operation name for user lookups.
pub const GET_USER_OPERATION: &str = "getUser";

/// Operation name for form lookups.
pub const GET_FORM_OPERATION: &str = "getForm";

/// Scalar types an argument can be checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgumentKind {
    /// A JSON string.
    String,
    /// A JSON integer.
    Int,
    /// A JSON boolean.
    Boolean,
}

impl ArgumentKind {
    fn accepts(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Int => value.is_i64() || value.is_u64(),
            Self::Boolean => value.is_boolean(),
        }
    }

    /// Name used in error messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::String => "String",
            Self::Int => "Int",
            Self::Boolean => "Boolean",
        }
    }
}

/// How query arguments become a command payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgTransform {
    /// Forward one required argument, unchanged, after a type check.
    Argument {
        /// Argument name.
        name: String,
        /// Expected type.
        kind: ArgumentKind,
    },
    /// Forward the whole argument object.
    Arguments,
}

impl ArgTransform {
    /// Shorthand for [`ArgTransform::Argument`].
    pub fn argument(name: impl Into<String>, kind: ArgumentKind) -> Self {
        Self::Argument {
            name: name.into(),
            kind,
        }
    }

    /// Builds the payload from `arguments`.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::InvalidArguments`] when the required argument
    /// is missing, null, or of the wrong type.
    pub fn apply(&self, arguments: &Map<String, Value>) -> Result<Value, DispatchError> {
        match self {
            Self::Arguments => Ok(Value::Object(arguments.clone())),
            Self::Argument { name, kind } => match arguments.get(name) {
                None | Some(Value::Null) => Err(DispatchError::invalid_arguments(format!(
                    "missing required argument '{name}'"
                ))),
                Some(value) if kind.accepts(value) => Ok(value.clone()),
                Some(value) => Err(DispatchError::invalid_arguments(format!(
                    "argument '{name}' must be {}, got {value}",
                    kind.as_str()
                ))),
            },
        }
    }
}

/// A single entry of the query surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    name: String,
    backend: String,
    command: String,
    transform: ArgTransform,
}

impl Operation {
    /// Public operation name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Backend that serves the operation.
    #[must_use]
    pub fn backend(&self) -> &str {
        self.backend.as_str()
    }

    /// Command sent to the backend.
    #[must_use]
    pub fn command(&self) -> &str {
        self.command.as_str()
    }

    /// Argument transform.
    #[must_use]
    pub fn transform(&self) -> &ArgTransform {
        &self.transform
    }
}

/// Validated operation table.
#[derive(Debug, Clone, Default)]
pub struct QuerySurface {
    operations: HashMap<String, Operation>,
}

impl QuerySurface {
    /// Starts an empty table.
    #[must_use]
    pub fn builder() -> QuerySurfaceBuilder {
        QuerySurfaceBuilder::default()
    }

    /// The table served by the gateway: `getUser` and `getForm`.
    #[must_use]
    pub fn standard() -> QuerySurfaceBuilder {
        Self::builder()
            .operation(
                GET_USER_OPERATION,
                USERS_BACKEND,
                GET_USER,
                ArgTransform::argument("id", ArgumentKind::String),
            )
            .operation(
                GET_FORM_OPERATION,
                FORMS_BACKEND,
                GET_FORM,
                ArgTransform::argument("id", ArgumentKind::String),
            )
    }

    /// Looks up an operation by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Operation> {
        self.operations.get(name)
    }

    /// Operation names in sorted order.
    #[must_use]
    pub fn operation_names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.operations.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Collects operations before validation.
#[derive(Debug, Clone, Default)]
pub struct QuerySurfaceBuilder {
    operations: Vec<Operation>,
}

impl QuerySurfaceBuilder {
    /// Adds an operation.
    #[must_use]
    pub fn operation(
        mut self,
        name: impl Into<String>,
        backend: impl Into<String>,
        command: impl Into<String>,
        transform: ArgTransform,
    ) -> Self {
        self.operations.push(Operation {
            name: name.into(),
            backend: backend.into(),
            command: command.into(),
            transform,
        });
        self
    }

    /// Validates the table against the backends that have channels.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] for blank names, duplicate
    /// operations, or operations naming an unknown backend.
    pub fn build<'a>(
        self,
        backends: impl IntoIterator<Item = &'a str>,
    ) -> Result<QuerySurface, ConfigurationError> {
        let known: HashSet<&str> = backends.into_iter().collect();
        let mut operations = HashMap::with_capacity(self.operations.len());
        for operation in self.operations {
            if operation.name.trim().is_empty() {
                return Err(ConfigurationError::EmptyOperation);
            }
            if operation.command.trim().is_empty() {
                return Err(ConfigurationError::EmptyCommand {
                    operation: operation.name,
                });
            }
            if !known.contains(operation.backend.as_str()) {
                return Err(ConfigurationError::UnknownBackend {
                    operation: operation.name,
                    backend: operation.backend,
                });
            }
            if operations.contains_key(&operation.name) {
                return Err(ConfigurationError::DuplicateOperation {
                    operation: operation.name,
                });
            }
            operations.insert(operation.name.clone(), operation);
        }
        Ok(QuerySurface { operations })
    }
}
