//! Dispatcher settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::{ConfigError, RetryBudget};

pub const DEFAULT_BATCH_SIZE: usize = 10;
pub const DEFAULT_POLL_INTERVAL_SECS: f64 = 1.0;
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Options recognised by the dispatcher.
///
/// Deserializable so binaries can read it from a file; every field has a
/// default. Call `validate` (the builder does) before using the values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Max records claimed per cycle.
    pub batch_size: usize,

    /// Pause between cycles.
    pub poll_interval_secs: f64,

    /// Failed publishes retried per record before it is marked failed.
    pub max_retries: u32,

    /// Records of one batch processed concurrently (1 = sequential).
    pub max_in_flight: usize,

    /// Upper bound for a single publish; elapsed counts as a publish failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publish_timeout_secs: Option<f64>,

    /// Service name stamped on outgoing messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            max_retries: DEFAULT_MAX_RETRIES,
            max_in_flight: 1,
            publish_timeout_secs: None,
            source: None,
        }
    }
}

impl DispatcherConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        if !self.poll_interval_secs.is_finite() || self.poll_interval_secs < 0.0 {
            return Err(ConfigError::InvalidPollInterval(self.poll_interval_secs));
        }
        if self.max_in_flight == 0 || self.max_in_flight > self.batch_size {
            return Err(ConfigError::InvalidMaxInFlight {
                max_in_flight: self.max_in_flight,
                batch_size: self.batch_size,
            });
        }
        if let Some(secs) = self.publish_timeout_secs {
            if !secs.is_finite() || secs <= 0.0 {
                return Err(ConfigError::InvalidPublishTimeout(secs));
            }
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::try_from_secs_f64(self.poll_interval_secs).unwrap_or(Duration::ZERO)
    }

    pub fn publish_timeout(&self) -> Option<Duration> {
        self.publish_timeout_secs
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
    }

    pub fn retry_budget(&self) -> RetryBudget {
        RetryBudget::new(self.max_retries)
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval_secs = poll_interval.as_secs_f64();
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight;
        self
    }

    pub fn with_publish_timeout(mut self, timeout: Duration) -> Self {
        self.publish_timeout_secs = Some(timeout.as_secs_f64());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}
