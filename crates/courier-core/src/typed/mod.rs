//! Typed - handler registration and payload validation.
//!
//! Two layers:
//! - **typed**: `EventSchema` structs bound to a queue at compile time
//! - **dyn**: `ValidatedHandler` trait objects looked up by queue name at runtime

pub mod handler;
pub mod registry;
pub mod schema;

pub use self::handler::{FnHandler, SchemaHandler, ValidatedHandler, handler_fn};
pub use self::registry::{HandlerRegistry, RegistryError};
pub use self::schema::EventSchema;
