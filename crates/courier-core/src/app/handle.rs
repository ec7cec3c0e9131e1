use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::app::dispatcher::OutboxDispatcher;
use crate::domain::DispatcherStats;

/// Handle to dispatcher loops running on the tokio runtime.
/// - handle（`shutdown_tx`）を drop してもループは止まる
/// - `shutdown_and_join()` で全ループの終了を待ち、stats を合算する
pub struct DispatcherHandle {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<DispatcherStats>>,
}

impl DispatcherHandle {
    /// Spawn `n` loops over one dispatcher. They compete for records through
    /// the repository's claims, like separate instances would.
    pub fn spawn(n: usize, dispatcher: Arc<OutboxDispatcher>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let joins = (0..n.max(1))
            .map(|_| {
                let d = Arc::clone(&dispatcher);
                let rx = shutdown_rx.clone();
                tokio::spawn(async move { d.run(rx).await })
            })
            .collect();

        Self { shutdown_tx, joins }
    }

    pub fn loops(&self) -> usize {
        self.joins.len()
    }

    /// Ask every loop to stop after its current cycle.
    pub fn request_shutdown(&self) {
        // receivers may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn shutdown_and_join(self) -> DispatcherStats {
        self.request_shutdown();
        let mut total = DispatcherStats::default();
        for join in self.joins {
            match join.await {
                Ok(stats) => total.merge(&stats),
                Err(err) => warn!(error = %err, "dispatcher loop ended abnormally"),
            }
        }
        total
    }
}

impl OutboxDispatcher {
    /// Run the polling loop on a background task.
    pub fn spawn(self: Arc<Self>) -> DispatcherHandle {
        DispatcherHandle::spawn(1, self)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::app::{DispatcherBuilder, DispatcherConfig};
    use crate::impls::{InMemoryOutboxStore, InMemoryPublisher};
    use crate::typed::schema::test_schemas::UserCreated;
    use serde_json::json;

    fn build(store: &Arc<InMemoryOutboxStore>, publisher: &Arc<InMemoryPublisher>) -> Arc<OutboxDispatcher> {
        let dispatcher = DispatcherBuilder::new()
            .config(DispatcherConfig::default().with_poll_interval(Duration::from_millis(50)))
            .register_schema::<UserCreated>()
            .unwrap()
            .repository(store.clone())
            .publisher(publisher.clone())
            .build()
            .unwrap();
        Arc::new(dispatcher)
    }

    #[tokio::test(start_paused = true)]
    async fn spawned_loop_drains_and_stops() {
        let store = Arc::new(InMemoryOutboxStore::new());
        let publisher = Arc::new(InMemoryPublisher::new());
        for i in 0..3 {
            let payload = json!({ "user_id": i, "user_name": "Neo" });
            store.insert("user_events", payload.as_object().cloned().unwrap());
        }

        let handle = build(&store, &publisher).spawn();
        tokio::time::sleep(Duration::from_millis(200)).await;
        let stats = handle.shutdown_and_join().await;

        assert_eq!(stats.published, 3);
        assert!(stats.cycles >= 2);
        assert_eq!(store.counts().published, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn several_loops_sum_their_stats() {
        let store = Arc::new(InMemoryOutboxStore::new());
        let publisher = Arc::new(InMemoryPublisher::new().with_delay(Duration::from_millis(10)));
        for i in 0..30 {
            let payload = json!({ "user_id": i, "user_name": "Neo" });
            store.insert("user_events", payload.as_object().cloned().unwrap());
        }

        let handle = DispatcherHandle::spawn(3, build(&store, &publisher));
        assert_eq!(handle.loops(), 3);
        tokio::time::sleep(Duration::from_secs(2)).await;
        let stats = handle.shutdown_and_join().await;

        assert_eq!(stats.published, 30);
        assert_eq!(publisher.sent().len(), 30);
    }
}
