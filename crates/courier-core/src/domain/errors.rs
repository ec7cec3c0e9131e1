//! Errors and their operational classification.

use std::time::Duration;

use thiserror::Error;

/// Operational class of an error.
///
/// - Transient: storage or broker temporarily unavailable, retried next cycle.
/// - Permanent: the record can never succeed, it is marked failed.
/// - Configuration: invalid settings, fatal before the loop starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transient,
    Permanent,
    Configuration,
}

/// Failure of the storage collaborator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("commit failed: {0}")]
    CommitFailed(String),

    #[error("record {0} is not claimed by this session")]
    NotClaimed(String),

    #[error("storage lock poisoned")]
    Poisoned,
}

/// Failure of the broker collaborator. Always treated as transient.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PublishError {
    #[error("broker unavailable: {0}")]
    Unavailable(String),

    #[error("channel error: {0}")]
    Channel(String),

    #[error("publish timed out after {0:?}")]
    Timeout(Duration),

    #[error("message encoding failed: {0}")]
    Encode(String),

    #[error("publisher panicked")]
    Panicked,
}

/// A handler refused the payload. Permanent: retrying cannot help.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{reason}")]
pub struct Rejection {
    pub reason: String,
}

impl Rejection {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Invalid dispatcher settings.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    #[error("batch_size must be positive")]
    ZeroBatchSize,

    #[error("poll_interval must be a finite, non-negative number of seconds (got {0})")]
    InvalidPollInterval(f64),

    #[error("max_in_flight must be between 1 and batch_size={batch_size} (got {max_in_flight})")]
    InvalidMaxInFlight {
        max_in_flight: usize,
        batch_size: usize,
    },

    #[error("publish_timeout must be a finite, positive number of seconds (got {0})")]
    InvalidPublishTimeout(f64),
}

/// Error that aborts a whole cycle.
#[derive(Debug, Error)]
pub enum OutboxError {
    #[error("begin session: {0}")]
    Begin(#[source] StorageError),

    #[error("fetch batch: {0}")]
    Fetch(#[source] StorageError),

    #[error("record outcome: {0}")]
    Record(#[source] StorageError),

    #[error("commit: {0}")]
    Commit(#[source] StorageError),
}

impl OutboxError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Transient
    }
}

impl StorageError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Transient
    }
}

impl PublishError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Transient
    }
}

impl Rejection {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Permanent
    }
}

impl ConfigError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Configuration
    }
}
