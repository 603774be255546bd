//! Query endpoint served by the gateway.
//!
//! Clients `POST /graphql` with a JSON body:
//!
//! ```json
//! {"query": "query($id: String!) { getUser(id: $id) }", "variables": {"id": "1"}}
//! ```
//!
//! and receive a JSON response:
//!
//! ```json
//! {"data": {"getUser": "User with ID 1"}}
//! ```
//!
//! Each root field names an operation of the
//! [`QuerySurface`](crate::dispatch::QuerySurface) and is resolved through the
//! [`DispatchRouter`](crate::dispatch::DispatchRouter). A field that fails
//! resolves to `null` and adds an entry to `errors` carrying the field's
//! response key and the dispatch error code. A request that fails before
//! execution gets `data: null` and a `400` status.

mod errors;
mod execute;
mod http;
pub mod parser;
mod request;
mod response;

pub use self::errors::QueryError;
pub use self::execute::{TYPENAME_FIELD, execute};
pub use self::http::{GRAPHQL_PATH, MAX_BODY_BYTES};
pub(crate) use self::http::{QueryServer, QueryServerHandle};
pub use self::parser::{QueryDocument, parse};
pub use self::request::QueryRequest;
pub use self::response::{ErrorExtensions, GraphQlError, Location, QueryResponse};

/// Tracing target for the query endpoint.
pub(crate) const QUERY_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::query");
