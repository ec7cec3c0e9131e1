//! Event record: one row of the outbox table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{EventId, QueueName};

/// Raw, unvalidated event body (field name -> value).
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// Lifecycle of a record as seen by the dispatcher.
///
/// State transitions:
/// - Pending -> Published
/// - Pending -> Pending (retry_count + 1) -> ... -> Failed
/// - Pending -> Failed (no handler / rejected payload)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordState {
    Pending,
    Published,
    Failed,
}

impl RecordState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RecordState::Published | RecordState::Failed)
    }
}

/// An outbox event.
///
/// Created by the owning business transaction (same commit as the domain
/// change) with both flags cleared and `retry_count = 0`. Only the dispatcher
/// mutates it afterwards, through a repository session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: EventId,
    pub queue: QueueName,
    pub created_at: DateTime<Utc>,
    pub payload: Payload,

    pub is_published: bool,
    pub is_failed: bool,

    /// Number of failed delivery attempts that were scheduled for retry.
    pub retry_count: u32,

    /// Reason of the most recent failure, kept for operators.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl EventRecord {
    pub fn new(id: EventId, queue: QueueName, created_at: DateTime<Utc>, payload: Payload) -> Self {
        Self {
            id,
            queue,
            created_at,
            payload,
            is_published: false,
            is_failed: false,
            retry_count: 0,
            last_error: None,
        }
    }

    pub fn state(&self) -> RecordState {
        if self.is_published {
            RecordState::Published
        } else if self.is_failed {
            RecordState::Failed
        } else {
            RecordState::Pending
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state().is_terminal()
    }

    /// Not terminal and still within the retry budget.
    pub fn is_eligible(&self, max_retries: u32) -> bool {
        !self.is_terminal() && self.retry_count <= max_retries
    }

    /// Terminal records ignore this.
    pub fn mark_published(&mut self) {
        if self.is_terminal() {
            return;
        }
        self.is_published = true;
    }

    /// Terminal records ignore this.
    pub fn mark_failed(&mut self, reason: impl Into<String>) {
        if self.is_terminal() {
            return;
        }
        self.is_failed = true;
        self.last_error = Some(reason.into());
    }

    /// Count one failed attempt that will be retried. Terminal records ignore this.
    pub fn record_retry(&mut self, reason: impl Into<String>) {
        if self.is_terminal() {
            return;
        }
        self.retry_count = self.retry_count.saturating_add(1);
        self.last_error = Some(reason.into());
    }
}
