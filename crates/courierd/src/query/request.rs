//! Query request envelope.

use serde::Deserialize;
use serde_json::{Map, Value};

use super::errors::QueryError;

/// Body of a request to the query endpoint.
///
/// ```json
/// {"query": "query($id: String!) { getUser(id: $id) }", "variables": {"id": "1"}}
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct QueryRequest {
    query: String,
    #[serde(default)]
    variables: Option<Map<String, Value>>,
    #[serde(default, rename = "operationName")]
    operation_name: Option<String>,
}

impl QueryRequest {
    /// Creates a request for `query` with no variables.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            variables: None,
            operation_name: None,
        }
    }

    /// Attaches variable values.
    #[must_use]
    pub fn with_variables(mut self, variables: Map<String, Value>) -> Self {
        self.variables = Some(variables);
        self
    }

    /// Selects the operation to run by name.
    #[must_use]
    pub fn with_operation_name(mut self, name: impl Into<String>) -> Self {
        self.operation_name = Some(name.into());
        self
    }

    /// Decodes a request body.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::BadRequest`] when the body is not a JSON object
    /// with a non-blank `query` string.
    pub fn parse(body: &[u8]) -> Result<Self, QueryError> {
        let request: Self = serde_json::from_slice(body)
            .map_err(|error| QueryError::bad_request(format!("invalid request: {error}")))?;
        if request.query.trim().is_empty() {
            return Err(QueryError::bad_request(
                "request must contain a non-empty query",
            ));
        }
        Ok(request)
    }

    /// Query document source.
    #[must_use]
    pub fn query(&self) -> &str {
        self.query.as_str()
    }

    /// Supplied variable values.
    #[must_use]
    pub fn variables(&self) -> Option<&Map<String, Value>> {
        self.variables.as_ref()
    }

    /// Requested operation name.
    #[must_use]
    pub fn operation_name(&self) -> Option<&str> {
        self.operation_name.as_deref()
    }
}
