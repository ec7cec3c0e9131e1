//! Impls - reference implementations of the ports.
//!
//! # Included
//! - **InMemoryOutboxStore**: outbox table with claim/commit semantics
//! - **InMemoryPublisher**: recording broker with scriptable failures
//! - **LogPublisher**: writes messages to the log instead of a broker
//!
//! Database and broker adapters belong in their own crates.

pub mod inmem_publisher;
pub mod inmem_store;
pub mod log_publisher;

pub use self::inmem_publisher::InMemoryPublisher;
pub use self::inmem_store::{InMemoryOutboxStore, OutboxCounts};
pub use self::log_publisher::LogPublisher;
