//! Retry budget: decides whether a failed publish is retried or given up.

use serde::{Deserialize, Serialize};

/// What to do with a record whose publish just failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Leave it eligible and count the attempt.
    Retry,
    /// Budget used up: mark it failed.
    Exhausted,
}

/// Per-record retry budget.
///
/// `retry_count` counts failed attempts that were handed back for another
/// try, so a record gets `max_retries + 1` publish attempts in total and its
/// `retry_count` never exceeds `max_retries`.
///
/// With `max_retries = 2`:
/// - attempt 1 fails (retry_count 0): retry -> 1
/// - attempt 2 fails (retry_count 1): retry -> 2
/// - attempt 3 fails (retry_count 2): exhausted -> failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryBudget {
    pub max_retries: u32,
}

impl RetryBudget {
    pub fn new(max_retries: u32) -> Self {
        Self { max_retries }
    }

    pub fn after_failure(&self, retry_count: u32) -> RetryDecision {
        if retry_count >= self.max_retries {
            RetryDecision::Exhausted
        } else {
            RetryDecision::Retry
        }
    }
}
