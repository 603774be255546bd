//! Executes query requests against the dispatch router.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::thread;

use serde_json::{Map, Number, Value};
use tracing::{debug, error};

use crate::dispatch::DispatchRouter;

use super::QUERY_TARGET;
use super::errors::QueryError;
use super::parser::{Field, InputValue, QueryDocument, parse};
use super::request::QueryRequest;
use super::response::{GraphQlError, INTERNAL_ERROR_CODE, QueryResponse};

/// Introspection field answered without contacting a backend.
pub const TYPENAME_FIELD: &str = "__typename";

const QUERY_TYPE_NAME: &str = "Query";

/// A root field ready for dispatch: variables substituted, key fixed.
#[derive(Debug)]
struct PlannedField {
    response_key: String,
    operation: String,
    arguments: Map<String, Value>,
}

/// Runs `request` and builds its response.
///
/// Request-level failures (syntax, validation) yield `data: null` with one
/// error. Otherwise every root field is resolved, concurrently when there is
/// more than one, and a failing field contributes `null` plus an error that
/// names its response key.
#[must_use]
pub fn execute(router: &DispatchRouter, request: &QueryRequest) -> QueryResponse {
    match plan(request) {
        Ok(fields) => run(router, &fields),
        Err(rejection) => {
            debug!(
                target: QUERY_TARGET,
                code = rejection.code(),
                error = %rejection,
                "query rejected"
            );
            QueryResponse::from_error(&rejection)
        }
    }
}

fn plan(request: &QueryRequest) -> Result<Vec<PlannedField>, QueryError> {
    let document = parse(request.query())?;
    if let Some(requested) = request.operation_name()
        && document.operation_name() != Some(requested)
    {
        return Err(QueryError::validation(format!(
            "Unknown operation named \"{requested}\"."
        )));
    }
    let variables = coerce_variables(&document, request.variables())?;

    let mut seen: HashMap<&str, &Field> = HashMap::new();
    let mut planned = Vec::with_capacity(document.fields().len());
    for field in document.fields() {
        let key = field.response_key();
        if let Some(previous) = seen.get(key) {
            if previous.name() == field.name() && previous.arguments() == field.arguments() {
                continue;
            }
            return Err(QueryError::validation(format!(
                "Fields \"{key}\" conflict because they select different operations or arguments."
            )));
        }
        seen.insert(key, field);
        planned.push(PlannedField {
            response_key: key.to_owned(),
            operation: field.name().to_owned(),
            arguments: field_arguments(&document, field, &variables)?,
        });
    }
    Ok(planned)
}

fn coerce_variables(
    document: &QueryDocument,
    supplied: Option<&Map<String, Value>>,
) -> Result<Map<String, Value>, QueryError> {
    let mut values = Map::new();
    for definition in document.variables() {
        let name = definition.name();
        let value = supplied
            .and_then(|variables| variables.get(name))
            .cloned()
            .or_else(|| definition.default_value().map(literal));
        let required = definition.type_ref().is_non_null();
        match value {
            None if required => {
                return Err(QueryError::validation(format!(
                    "Variable \"${name}\" of required type \"{}\" was not provided.",
                    definition.type_ref()
                )));
            }
            Some(Value::Null) if required => {
                return Err(QueryError::validation(format!(
                    "Variable \"${name}\" of non-null type \"{}\" must not be null.",
                    definition.type_ref()
                )));
            }
            Some(present) => {
                values.insert(name.to_owned(), present);
            }
            None => {}
        }
    }
    Ok(values)
}

fn field_arguments(
    document: &QueryDocument,
    field: &Field,
    variables: &Map<String, Value>,
) -> Result<Map<String, Value>, QueryError> {
    let mut arguments = Map::new();
    for (name, value) in field.arguments() {
        let resolved = match value {
            InputValue::Variable(variable) => {
                let declared = document
                    .variables()
                    .iter()
                    .any(|definition| definition.name() == variable);
                if !declared {
                    return Err(QueryError::validation(format!(
                        "Variable \"${variable}\" is not defined."
                    )));
                }
                // A nullable variable that was not supplied leaves the
                // argument out altogether.
                match variables.get(variable) {
                    Some(bound) => bound.clone(),
                    None => continue,
                }
            }
            other => literal(other),
        };
        arguments.insert(name.clone(), resolved);
    }
    Ok(arguments)
}

fn literal(value: &InputValue) -> Value {
    match value {
        InputValue::Null | InputValue::Variable(_) => Value::Null,
        InputValue::Boolean(flag) => Value::Bool(*flag),
        InputValue::Int(number) => Value::from(*number),
        InputValue::Float(number) => Number::from_f64(*number).map_or(Value::Null, Value::Number),
        InputValue::String(text) => Value::String(text.clone()),
    }
}

fn run(router: &DispatchRouter, fields: &[PlannedField]) -> QueryResponse {
    let outcomes: Vec<Result<Value, GraphQlError>> = if let [only] = fields {
        vec![resolve_field(router, only)]
    } else {
        thread::scope(|scope| {
            let handles: Vec<_> = fields
                .iter()
                .map(|field| scope.spawn(move || resolve_field(router, field)))
                .collect();
            handles
                .into_iter()
                .zip(fields)
                .map(|(handle, field)| {
                    handle
                        .join()
                        .unwrap_or_else(|_| Err(internal_error(&field.response_key)))
                })
                .collect()
        })
    };

    let mut data = Map::new();
    let mut errors = Vec::new();
    for (field, outcome) in fields.iter().zip(outcomes) {
        let value = outcome.unwrap_or_else(|field_error| {
            errors.push(field_error);
            Value::Null
        });
        data.insert(field.response_key.clone(), value);
    }
    QueryResponse::new(Some(data), errors)
}

fn resolve_field(router: &DispatchRouter, field: &PlannedField) -> Result<Value, GraphQlError> {
    if field.operation == TYPENAME_FIELD {
        return Ok(Value::from(QUERY_TYPE_NAME));
    }
    match panic::catch_unwind(AssertUnwindSafe(|| {
        router.resolve(&field.operation, &field.arguments)
    })) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(failure)) => Err(GraphQlError::from_dispatch(&failure, &field.response_key)),
        Err(_) => {
            error!(
                target: QUERY_TARGET,
                operation = %field.operation,
                "field resolver panicked"
            );
            Err(internal_error(&field.response_key))
        }
    }
}

fn internal_error(response_key: &str) -> GraphQlError {
    GraphQlError::new("field resolver panicked", INTERNAL_ERROR_CODE).at_field(response_key)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::{Arc, Barrier};

    use rstest::{fixture, rstest};
    use serde_json::json;

    use courier_config::{FORMS_BACKEND, USERS_BACKEND};

    use super::*;
    use crate::channel::{ChannelError, MockCommandChannel};
    use crate::dispatch::{Backends, QuerySurface};

    fn router_with(users: MockCommandChannel, forms: MockCommandChannel) -> DispatchRouter {
        let mut channels: Backends = HashMap::new();
        channels.insert(USERS_BACKEND.to_owned(), Arc::new(users));
        channels.insert(FORMS_BACKEND.to_owned(), Arc::new(forms));
        DispatchRouter::new(QuerySurface::standard(), channels).expect("router builds")
    }

    fn untouched() -> MockCommandChannel {
        let mut channel = MockCommandChannel::new();
        channel.expect_send().never();
        channel
    }

    fn echoing(prefix: &'static str) -> MockCommandChannel {
        let mut channel = MockCommandChannel::new();
        channel.expect_send().returning(move |command| {
            let id = command.payload().as_str().unwrap_or_default().to_owned();
            Ok(json!(format!("{prefix} with ID {id}")))
        });
        channel
    }

    #[fixture]
    fn live_router() -> DispatchRouter {
        router_with(echoing("User"), echoing("Form"))
    }

    fn data_of(response: &QueryResponse) -> Value {
        Value::Object(response.data().cloned().expect("data present"))
    }

    #[rstest]
    fn resolves_root_fields_with_aliases(live_router: DispatchRouter) {
        let request = QueryRequest::new(r#"{ person: getUser(id: "1") getForm(id: "2") }"#);
        let response = execute(&live_router, &request);
        assert!(response.errors().is_empty());
        assert_eq!(
            data_of(&response),
            json!({"person": "User with ID 1", "getForm": "Form with ID 2"})
        );
    }

    #[rstest]
    fn substitutes_variables_and_defaults(live_router: DispatchRouter) {
        let mut variables = Map::new();
        variables.insert(String::from("user"), json!("7"));
        let request = QueryRequest::new(
            r#"query Both($user: String!, $form: String! = "9") {
                getUser(id: $user)
                getForm(id: $form)
            }"#,
        )
        .with_variables(variables)
        .with_operation_name("Both");
        let response = execute(&live_router, &request);
        assert_eq!(
            data_of(&response),
            json!({"getUser": "User with ID 7", "getForm": "Form with ID 9"})
        );
    }

    #[rstest]
    #[case::undefined("{ getUser(id: $id) }")]
    #[case::missing_required("query($id: String!) { getUser(id: $id) }")]
    #[case::conflicting_keys(r#"{ a: getUser(id: "1") a: getForm(id: "1") }"#)]
    fn validation_failures_contact_no_backend(#[case] query: &str) {
        let router = router_with(untouched(), untouched());
        let response = execute(&router, &QueryRequest::new(query));
        assert!(response.data().is_none());
        let [only] = response.errors() else {
            panic!("expected one error, got {:?}", response.errors());
        };
        assert_eq!(only.code(), "GRAPHQL_VALIDATION_FAILED");
    }

    #[test]
    fn parse_failures_report_location() {
        let router = router_with(untouched(), untouched());
        let response = execute(&router, &QueryRequest::new("{ getUser(id: "));
        assert!(response.data().is_none());
        assert_eq!(response.errors()[0].code(), "GRAPHQL_PARSE_FAILED");
        assert_eq!(response.errors()[0].locations().len(), 1);
    }

    #[test]
    fn unknown_operation_name_is_rejected() {
        let router = router_with(untouched(), untouched());
        let request = QueryRequest::new(r#"query A { getUser(id: "1") }"#).with_operation_name("B");
        let response = execute(&router, &request);
        assert_eq!(response.errors()[0].code(), "GRAPHQL_VALIDATION_FAILED");
    }

    #[test]
    fn failing_field_is_null_and_others_resolve() {
        let mut forms = MockCommandChannel::new();
        forms
            .expect_send()
            .returning(|_| Err(ChannelError::disconnected(FORMS_BACKEND, "backend closed the connection")));
        let router = router_with(echoing("User"), forms);
        let request = QueryRequest::new(r#"{ getUser(id: "1") getForm(id: "1") }"#);

        let response = execute(&router, &request);
        assert_eq!(
            data_of(&response),
            json!({"getUser": "User with ID 1", "getForm": null})
        );
        let [failure] = response.errors() else {
            panic!("expected one error, got {:?}", response.errors());
        };
        assert_eq!(failure.code(), "BACKEND_UNAVAILABLE");
        assert_eq!(failure.path(), Some([String::from("getForm")].as_slice()));
    }

    #[test]
    fn unknown_fields_fail_individually() {
        let router = router_with(echoing("User"), untouched());
        let response = execute(&router, &QueryRequest::new(r#"{ getUser(id: "1") getWidget }"#));
        assert_eq!(
            data_of(&response),
            json!({"getUser": "User with ID 1", "getWidget": null})
        );
        assert_eq!(response.errors()[0].code(), "UNKNOWN_OPERATION");
    }

    #[test]
    fn identical_duplicate_fields_are_resolved_once() {
        let mut users = MockCommandChannel::new();
        users
            .expect_send()
            .times(1)
            .returning(|_| Ok(json!("User with ID 1")));
        let router = router_with(users, untouched());
        let response = execute(
            &router,
            &QueryRequest::new(r#"{ getUser(id: "1") getUser(id: "1") }"#),
        );
        assert_eq!(data_of(&response), json!({"getUser": "User with ID 1"}));
    }

    #[test]
    fn typename_needs_no_backend() {
        let router = router_with(untouched(), untouched());
        let response = execute(&router, &QueryRequest::new("{ __typename }"));
        assert_eq!(data_of(&response), json!({"__typename": "Query"}));
    }

    #[test]
    fn root_fields_resolve_concurrently() {
        let barrier = Arc::new(Barrier::new(2));
        let users_barrier = Arc::clone(&barrier);
        let mut users = MockCommandChannel::new();
        users.expect_send().returning(move |_| {
            users_barrier.wait();
            Ok(json!("User with ID 1"))
        });
        let forms_barrier = Arc::clone(&barrier);
        let mut forms = MockCommandChannel::new();
        forms.expect_send().returning(move |_| {
            forms_barrier.wait();
            Ok(json!("Form with ID 1"))
        });
        let router = router_with(users, forms);

        let response = execute(
            &router,
            &QueryRequest::new(r#"{ getUser(id: "1") getForm(id: "1") }"#),
        );
        assert!(response.errors().is_empty());
    }
}
