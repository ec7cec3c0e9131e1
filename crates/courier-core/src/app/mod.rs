//! App - the dispatcher and its wiring.
//!
//! # Components
//! - **DispatcherBuilder**: wiring and fail-fast validation
//! - **DispatcherConfig**: tunables (batch size, poll interval, retries, ...)
//! - **OutboxDispatcher**: fetch -> handle -> publish -> commit cycles
//! - **DispatcherHandle**: background loops with graceful shutdown

pub mod builder;
pub mod config;
pub mod dispatcher;
pub mod handle;

pub use self::builder::{BuildError, DispatcherBuilder};
pub use self::config::DispatcherConfig;
pub use self::dispatcher::OutboxDispatcher;
pub use self::handle::DispatcherHandle;
