//! InMemoryPublisher - recording broker for tests and demos.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{Message, PublishError, QueueName};
use crate::ports::{Ack, Publisher};

/// Keeps every successfully published message in memory.
///
/// Failures can be scripted: the next `n` publishes (`fail_next`) or every
/// publish to given destinations (`fail_destination`).
#[derive(Default)]
pub struct InMemoryPublisher {
    sent: Mutex<Vec<(QueueName, Message)>>,
    failing: Mutex<HashSet<QueueName>>,
    fail_next: AtomicUsize,
    attempts: AtomicUsize,
    next_tag: AtomicU64,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn guard<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl InMemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every publish takes `delay` before resolving.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn fail_next(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    pub fn fail_destination(&self, queue: impl Into<QueueName>) {
        guard(&self.failing).insert(queue.into());
    }

    pub fn recover_destination(&self, queue: &QueueName) {
        guard(&self.failing).remove(queue);
    }

    /// Successfully published messages, in publish order.
    pub fn sent(&self) -> Vec<(QueueName, Message)> {
        guard(&self.sent).clone()
    }

    pub fn sent_to(&self, queue: &str) -> Vec<Message> {
        guard(&self.sent)
            .iter()
            .filter(|(q, _)| q.as_str() == queue)
            .map(|(_, m)| m.clone())
            .collect()
    }

    /// Publish calls so far, failed ones included.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Publishes currently in flight.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of publishes observed in flight at once.
    pub fn max_concurrent(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn take_scripted_failure(&self) -> bool {
        self.fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl Publisher for InMemoryPublisher {
    async fn publish(
        &self,
        destination: &QueueName,
        message: &Message,
    ) -> Result<Ack, PublishError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        {
            // released on drop too, so a cancelled publish leaves the count right
            let _in_flight = InFlight(&self.in_flight);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
        }

        if self.take_scripted_failure() {
            return Err(PublishError::Unavailable("scripted failure".to_string()));
        }
        if guard(&self.failing).contains(destination) {
            return Err(PublishError::Channel(format!("destination {destination} is failing")));
        }

        guard(&self.sent).push((destination.clone(), message.clone()));
        let tag = self.next_tag.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Ack::with_delivery_tag(tag))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn records_successful_publishes() {
        let publisher = InMemoryPublisher::new();
        let queue = QueueName::new("user_events");

        let ack = publisher
            .publish(&queue, &Message::new(json!({ "a": 1 })))
            .await
            .unwrap();

        assert_eq!(ack.delivery_tag, Some(1));
        assert_eq!(publisher.sent_to("user_events").len(), 1);
        assert_eq!(publisher.attempts(), 1);
    }

    #[tokio::test]
    async fn scripted_failures_run_out() {
        let publisher = InMemoryPublisher::new();
        publisher.fail_next(2);
        let queue = QueueName::new("q");
        let message = Message::new(json!({}));

        assert!(publisher.publish(&queue, &message).await.is_err());
        assert!(publisher.publish(&queue, &message).await.is_err());
        assert!(publisher.publish(&queue, &message).await.is_ok());
        assert_eq!(publisher.attempts(), 3);
        assert_eq!(publisher.sent().len(), 1);
    }

    #[tokio::test]
    async fn failing_destination_until_recovered() {
        let publisher = InMemoryPublisher::new();
        let queue = QueueName::new("q");
        publisher.fail_destination("q");

        let err = publisher
            .publish(&queue, &Message::new(json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::Channel(_)));

        publisher.recover_destination(&queue);
        assert!(publisher.publish(&queue, &Message::new(json!({}))).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_publish_leaves_in_flight_count_right() {
        let publisher = InMemoryPublisher::new().with_delay(Duration::from_secs(10));
        let queue = QueueName::new("q");
        let message = Message::new(json!({}));

        let timed_out = tokio::time::timeout(
            Duration::from_secs(1),
            publisher.publish(&queue, &message),
        )
        .await;
        assert!(timed_out.is_err());
        assert_eq!(publisher.in_flight(), 0);

        let first = publisher.publish(&queue, &message);
        let second = publisher.publish(&queue, &message);
        let (a, b) = tokio::join!(first, second);
        assert!(a.is_ok() && b.is_ok());
        assert_eq!(publisher.max_concurrent(), 2);
        assert_eq!(publisher.in_flight(), 0);
    }
}
