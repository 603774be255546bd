//! Query response envelope.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::dispatch::DispatchError;

use super::errors::QueryError;

/// Code used when a field resolver panics.
pub const INTERNAL_ERROR_CODE: &str = "INTERNAL_SERVER_ERROR";

/// Body of a query endpoint response.
///
/// `data` is always present (possibly `null`); `errors` is omitted when
/// empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    data: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    errors: Vec<GraphQlError>,
}

impl QueryResponse {
    /// Builds a response from resolved data and field errors.
    #[must_use]
    pub const fn new(data: Option<Map<String, Value>>, errors: Vec<GraphQlError>) -> Self {
        Self { data, errors }
    }

    /// A response with `data: null` and the single request-level error.
    #[must_use]
    pub fn from_error(error: &QueryError) -> Self {
        Self::new(None, vec![GraphQlError::from_query(error)])
    }

    /// Resolved data, `None` when the request failed before execution.
    #[must_use]
    pub const fn data(&self) -> Option<&Map<String, Value>> {
        self.data.as_ref()
    }

    /// Errors in field order.
    #[must_use]
    pub fn errors(&self) -> &[GraphQlError] {
        &self.errors
    }
}

/// Source position of a syntax error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// 1-based line.
    pub line: usize,
    /// 1-based column.
    pub column: usize,
}

/// Machine-readable error details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorExtensions {
    /// Stable error code.
    pub code: String,
}

/// An entry of the `errors` array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphQlError {
    message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    locations: Vec<Location>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    path: Option<Vec<String>>,
    extensions: ErrorExtensions,
}

impl GraphQlError {
    /// Creates an error with a message and code.
    pub fn new(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            locations: Vec::new(),
            path: None,
            extensions: ErrorExtensions { code: code.into() },
        }
    }

    /// Attaches the response key of the failing field.
    #[must_use]
    pub fn at_field(mut self, response_key: impl Into<String>) -> Self {
        self.path = Some(vec![response_key.into()]);
        self
    }

    /// Converts a request-level failure.
    #[must_use]
    pub fn from_query(error: &QueryError) -> Self {
        let mut converted = Self::new(error.to_string(), error.code());
        if let Some((line, column)) = error.location() {
            converted.locations.push(Location { line, column });
        }
        converted
    }

    /// Converts a field resolution failure.
    #[must_use]
    pub fn from_dispatch(error: &DispatchError, response_key: &str) -> Self {
        Self::new(error.to_string(), error.code()).at_field(response_key)
    }

    /// Human-readable message.
    #[must_use]
    pub fn message(&self) -> &str {
        self.message.as_str()
    }

    /// Stable error code.
    #[must_use]
    pub fn code(&self) -> &str {
        self.extensions.code.as_str()
    }

    /// Response path, for field errors.
    #[must_use]
    pub fn path(&self) -> Option<&[String]> {
        self.path.as_deref()
    }

    /// Source locations, for syntax errors.
    #[must_use]
    pub fn locations(&self) -> &[Location] {
        &self.locations
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn failed_request_serialises_explicit_null_data() {
        let error = QueryError::Syntax {
            message: String::from("Expected Name, found <EOF>"),
            line: 1,
            column: 3,
        };
        let encoded = serde_json::to_value(QueryResponse::from_error(&error)).expect("encode");
        assert_eq!(
            encoded,
            json!({
                "data": null,
                "errors": [{
                    "message": "Syntax Error: Expected Name, found <EOF>",
                    "locations": [{"line": 1, "column": 3}],
                    "extensions": {"code": "GRAPHQL_PARSE_FAILED"}
                }]
            })
        );
    }

    #[test]
    fn successful_response_omits_errors() {
        let mut data = Map::new();
        data.insert(String::from("getUser"), json!("User with ID 1"));
        let encoded = serde_json::to_value(QueryResponse::new(Some(data), Vec::new())).expect("encode");
        assert_eq!(encoded, json!({"data": {"getUser": "User with ID 1"}}));
    }

    #[test]
    fn field_errors_carry_their_path() {
        let error = DispatchError::unknown_operation("getWidget");
        let converted = GraphQlError::from_dispatch(&error, "widget");
        assert_eq!(converted.code(), "UNKNOWN_OPERATION");
        assert_eq!(converted.path(), Some([String::from("widget")].as_slice()));
        assert!(converted.locations().is_empty());
    }
}
