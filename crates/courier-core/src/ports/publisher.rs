//! Publisher port - the message broker.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{Message, PublishError, QueueName};

/// Broker acknowledgement of one publish.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    /// Broker-side delivery tag / offset, when the broker reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_tag: Option<u64>,
}

impl Ack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delivery_tag(delivery_tag: u64) -> Self {
        Self {
            delivery_tag: Some(delivery_tag),
        }
    }
}

/// Publishes one message to a named destination.
///
/// Every error is treated as transient and retried within the record's
/// budget. The same message may be published again when an earlier ack was
/// lost (at-least-once); implementations must not add side effects beyond the
/// wire send on repeated calls. A panic inside `publish` is caught by the
/// dispatcher and counted as a failed attempt (`PublishError::Panicked`).
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, destination: &QueueName, message: &Message)
    -> Result<Ack, PublishError>;
}
