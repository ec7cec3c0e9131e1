//! Domain model (ids, records, messages, outcomes, errors, ...).
//!
//! Nothing in here performs I/O. Storage and broker access live behind the
//! traits in `ports`.

pub mod errors;
pub mod ids;
pub mod message;
pub mod outcome;
pub mod queue;
pub mod record;
pub mod report;
pub mod retry;

pub use errors::{ConfigError, ErrorKind, OutboxError, PublishError, Rejection, StorageError};
pub use ids::EventId;
pub use message::{Message, headers};
pub use outcome::{FailureReason, RecordOutcome};
pub use queue::QueueName;
pub use record::{EventRecord, Payload, RecordState};
pub use report::{CycleReport, DispatcherStats};
pub use retry::{RetryBudget, RetryDecision};
