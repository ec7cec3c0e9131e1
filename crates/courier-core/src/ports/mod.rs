//! Ports - abstraction layer.
//!
//! Each trait here is the seam to an external system (the database holding
//! the outbox table, the message broker) or to an ambient service (time, id
//! generation). The dispatcher only ever talks to these traits.

pub mod clock;
pub mod id_generator;
pub mod publisher;
pub mod repository;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::publisher::{Ack, Publisher};
pub use self::repository::{OutboxRepository, RepositorySession};
