//! Built-in backend services.
//!
//! Both services answer a single lookup command with a canned description of
//! the requested record; the payload is the record identifier as a string.

use courier_config::{FORMS_BACKEND, NodeRole, USERS_BACKEND};

use crate::registry::{HandlerRegistry, RegistryError, typed};

/// Command answered by the users service.
pub const GET_USER: &str = "get_user";

/// Command answered by the forms service.
pub const GET_FORM: &str = "get_form";

/// Registry served by the users backend.
///
/// # Errors
///
/// Returns a [`RegistryError`] if the handler table is inconsistent.
pub fn users_registry() -> Result<HandlerRegistry, RegistryError> {
    let mut registry = HandlerRegistry::new();
    registry.register(GET_USER, typed(|id: String| Ok(format!("User with ID {id}"))))?;
    Ok(registry)
}

/// Registry served by the forms backend.
///
/// # Errors
///
/// Returns a [`RegistryError`] if the handler table is inconsistent.
pub fn forms_registry() -> Result<HandlerRegistry, RegistryError> {
    let mut registry = HandlerRegistry::new();
    registry.register(GET_FORM, typed(|id: String| Ok(format!("Form with ID {id}"))))?;
    Ok(registry)
}

/// Service name and registry for a backend role, or `None` for the gateway.
///
/// # Errors
///
/// Propagates registry construction failures.
pub fn service_for(role: NodeRole) -> Result<Option<(&'static str, HandlerRegistry)>, RegistryError> {
    match role {
        NodeRole::Gateway => Ok(None),
        NodeRole::Users => Ok(Some((USERS_BACKEND, users_registry()?))),
        NodeRole::Forms => Ok(Some((FORMS_BACKEND, forms_registry()?))),
    }
}
