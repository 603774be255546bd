//! Operation dispatch from the public query surface to backend services.
//!
//! The [`DispatchRouter`] owns one [`CommandChannel`](crate::channel::CommandChannel)
//! per configured backend. Resolving an operation looks it up in the
//! [`QuerySurface`], applies its argument transform, sends the resulting
//! command to the operation's backend, and translates channel failures into
//! [`DispatchError`]s with stable codes:
//!
//! | Code                  | Meaning                                        |
//! |-----------------------|------------------------------------------------|
//! | `UNKNOWN_OPERATION`   | no such operation; no backend contacted        |
//! | `UNKNOWN_BACKEND`     | operation maps to a backend without a channel  |
//! | `INVALID_ARGUMENTS`   | missing or mistyped argument                   |
//! | `BACKEND_UNAVAILABLE` | connect failed or connection dropped           |
//! | `DISPATCH_TIMEOUT`    | no response within the request deadline        |
//! | `BACKEND_PROTOCOL`    | backend sent an undecodable frame              |
//! | `BACKEND_REJECTED`    | backend answered with an error response        |

mod errors;
mod router;
pub mod surface;

pub use self::errors::{ConfigurationError, DispatchError};
pub use self::router::{Backends, DispatchRouter};
pub use self::surface::{ArgTransform, ArgumentKind, Operation, QuerySurface, QuerySurfaceBuilder};
