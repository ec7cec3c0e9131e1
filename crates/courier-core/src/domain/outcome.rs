//! Outcome model: how a single delivery attempt resolved.
//!
//! The dispatcher computes one `RecordOutcome` per fetched record and then
//! hands it to the repository session. Nothing here touches storage.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::QueueName;

/// Why a record was moved to the terminal failed state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    /// No handler registered for the record's queue.
    NoHandler { queue: QueueName },

    /// The handler rejected the payload.
    Rejected { reason: String },

    /// The handler panicked while transforming the payload.
    HandlerPanicked,

    /// Publish kept failing until the retry budget ran out.
    RetriesExhausted { retry_count: u32, last_error: String },
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::NoHandler { queue } => {
                write!(f, "no handler registered for queue={queue}")
            }
            FailureReason::Rejected { reason } => write!(f, "payload rejected: {reason}"),
            FailureReason::HandlerPanicked => f.write_str("handler panicked"),
            FailureReason::RetriesExhausted {
                retry_count,
                last_error,
            } => write!(
                f,
                "retries exhausted after {retry_count} retries: {last_error}"
            ),
        }
    }
}

/// Resolution of one record within a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    Published,
    Retry { reason: String },
    Failed(FailureReason),
}

impl RecordOutcome {
    pub fn failed(reason: FailureReason) -> Self {
        RecordOutcome::Failed(reason)
    }

    pub fn retry(reason: impl Into<String>) -> Self {
        RecordOutcome::Retry {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_reason_messages() {
        let r = FailureReason::NoHandler {
            queue: QueueName::new("unknown"),
        };
        assert_eq!(r.to_string(), "no handler registered for queue=unknown");

        let r = FailureReason::RetriesExhausted {
            retry_count: 2,
            last_error: "broker unavailable".to_string(),
        };
        assert!(r.to_string().contains("after 2 retries"));
    }

    #[test]
    fn failure_reason_is_tagged() {
        let r = FailureReason::Rejected {
            reason: "missing field `user_name`".to_string(),
        };
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["kind"], "rejected");
        assert_eq!(v["reason"], "missing field `user_name`");
    }
}
