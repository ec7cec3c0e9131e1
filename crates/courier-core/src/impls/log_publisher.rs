use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

use crate::domain::{Message, PublishError, QueueName};
use crate::ports::{Ack, Publisher};

/// Publishes by writing the message to the log. Useful for local runs
/// without a broker.
#[derive(Debug, Default)]
pub struct LogPublisher {
    next_tag: AtomicU64,
}

impl LogPublisher {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Publisher for LogPublisher {
    async fn publish(
        &self,
        destination: &QueueName,
        message: &Message,
    ) -> Result<Ack, PublishError> {
        let bytes = message
            .to_bytes()
            .map_err(|e| PublishError::Encode(e.to_string()))?;
        let tag = self.next_tag.fetch_add(1, Ordering::Relaxed) + 1;

        tracing::info!(
            destination = %destination,
            delivery_tag = tag,
            headers = ?message.headers,
            body = %String::from_utf8_lossy(&bytes),
            "published"
        );
        Ok(Ack::with_delivery_tag(tag))
    }
}
