//! OutboxDispatcher - the polling loop.
//!
//! # Cycle
//! 1. `begin()` a repository session
//! 2. `fetch_batch(batch_size)` claims eligible records
//! 3. per record: resolve handler -> transform -> publish -> outcome
//! 4. stage every outcome on the session, then `commit()` once
//! 5. sleep `poll_interval` (cut short by shutdown)
//!
//! Per-record failures never abort a cycle; they become outcomes. Only
//! storage errors (begin, fetch, staging, commit) abort it, and then the
//! session is dropped, which releases the claims without applying anything.
//!
//! # 学習ポイント
//! - `FuturesOrdered` による上限付きの並行処理（結果は fetch 順）
//! - `catch_unwind` で handler / publisher の panic をレコード単位に閉じ込める
//! - `tokio::select!` で sleep と shutdown を競合させる

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::FuturesOrdered;
use futures::{FutureExt, StreamExt};
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

use crate::domain::{
    CycleReport, DispatcherStats, EventRecord, FailureReason, Message, OutboxError, PublishError,
    QueueName, RecordOutcome, RetryBudget, RetryDecision, StorageError, headers,
};
use crate::ports::{Ack, OutboxRepository, Publisher, RepositorySession};
use crate::typed::HandlerRegistry;

/// Moves outbox records to the broker.
///
/// Built by `DispatcherBuilder`. Holds no per-cycle state, so one instance
/// can be shared (`Arc`) by several loops; the repository's claim keeps them
/// from processing the same record.
pub struct OutboxDispatcher {
    pub(crate) repository: Arc<dyn OutboxRepository>,
    pub(crate) publisher: Arc<dyn Publisher>,
    pub(crate) registry: Arc<HandlerRegistry>,
    pub(crate) batch_size: usize,
    pub(crate) poll_interval: Duration,
    pub(crate) max_in_flight: usize,
    pub(crate) publish_timeout: Option<Duration>,
    pub(crate) retry: RetryBudget,
    pub(crate) source: Option<String>,
}

impl OutboxDispatcher {
    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Run one fetch-process-commit cycle.
    ///
    /// `Err` means the cycle had no durable effect: every fetched record is
    /// still eligible and will be fetched again.
    #[instrument(name = "outbox_cycle", skip_all, fields(batch_size = self.batch_size))]
    pub async fn run_cycle(&self) -> Result<CycleReport, OutboxError> {
        let mut session = self.repository.begin().await.map_err(OutboxError::Begin)?;
        let batch = session
            .fetch_batch(self.batch_size, self.retry)
            .await
            .map_err(OutboxError::Fetch)?;

        let mut report = CycleReport {
            fetched: batch.len(),
            ..Default::default()
        };

        if batch.is_empty() {
            if let Err(err) = session.rollback().await {
                debug!(error = %err, "rollback of empty session failed");
            }
            debug!("no eligible records");
            return Ok(report);
        }

        let outcomes = self.process_batch(&batch).await;

        for (record, outcome) in batch.iter().zip(&outcomes) {
            report.record(outcome);
            stage(&mut session, record, outcome)
                .await
                .map_err(OutboxError::Record)?;
        }

        session.commit().await.map_err(OutboxError::Commit)?;

        info!(
            fetched = report.fetched,
            published = report.published,
            retried = report.retried,
            failed = report.failed,
            "cycle committed"
        );
        Ok(report)
    }

    /// Poll until `shutdown` turns true (or its sender is dropped).
    ///
    /// Shutdown is only observed between cycles: a cycle that has fetched
    /// always runs to its commit.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> DispatcherStats {
        let mut stats = DispatcherStats::default();
        info!(
            batch_size = self.batch_size,
            poll_interval = ?self.poll_interval,
            max_retries = self.retry.max_retries,
            max_in_flight = self.max_in_flight,
            handlers = self.registry.len(),
            "outbox dispatcher started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.run_cycle().await {
                Ok(report) => stats.absorb(&report),
                Err(err) => {
                    stats.record_failed_cycle();
                    warn!(error = %err, "cycle aborted; records stay eligible");
                }
            }

            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!(
            cycles = stats.cycles,
            failed_cycles = stats.failed_cycles,
            published = stats.published,
            retried = stats.retried,
            failed = stats.failed,
            "outbox dispatcher stopped"
        );
        stats
    }

    /// Outcomes in fetch order, at most `max_in_flight` records in progress.
    async fn process_batch(&self, batch: &[EventRecord]) -> Vec<RecordOutcome> {
        let mut outcomes = Vec::with_capacity(batch.len());
        let mut in_flight = FuturesOrdered::new();
        let mut records = batch.iter();

        loop {
            while in_flight.len() < self.max_in_flight {
                match records.next() {
                    Some(record) => in_flight.push_back(self.process(record)),
                    None => break,
                }
            }
            match in_flight.next().await {
                Some(outcome) => outcomes.push(outcome),
                None => break,
            }
        }
        outcomes
    }

    async fn process(&self, record: &EventRecord) -> RecordOutcome {
        let Some(handler) = self.registry.get(&record.queue) else {
            return RecordOutcome::failed(FailureReason::NoHandler {
                queue: record.queue.clone(),
            });
        };

        let transformed = AssertUnwindSafe(handler.transform(&record.payload))
            .catch_unwind()
            .await;
        let message = match transformed {
            Ok(Ok(message)) => self.stamp(record, message),
            Ok(Err(rejection)) => {
                return RecordOutcome::failed(FailureReason::Rejected {
                    reason: rejection.reason,
                });
            }
            Err(_) => return RecordOutcome::failed(FailureReason::HandlerPanicked),
        };

        match self.publish(&record.queue, &message).await {
            Ok(_) => RecordOutcome::Published,
            Err(err) => match self.retry.after_failure(record.retry_count) {
                RetryDecision::Retry => RecordOutcome::retry(err.to_string()),
                RetryDecision::Exhausted => RecordOutcome::failed(FailureReason::RetriesExhausted {
                    retry_count: record.retry_count,
                    last_error: err.to_string(),
                }),
            },
        }
    }

    /// A panicking publisher counts as a failed publish, retried like any other.
    async fn publish(&self, destination: &QueueName, message: &Message) -> Result<Ack, PublishError> {
        let publish = AssertUnwindSafe(self.publisher.publish(destination, message)).catch_unwind();
        let result = match self.publish_timeout {
            Some(limit) => tokio::time::timeout(limit, publish)
                .await
                .map_err(|_| PublishError::Timeout(limit))?,
            None => publish.await,
        };
        result.unwrap_or(Err(PublishError::Panicked))
    }

    fn stamp(&self, record: &EventRecord, message: Message) -> Message {
        let message = message
            .with_header(headers::EVENT_ID, record.id.to_string())
            .with_header(headers::QUEUE, record.queue.as_str())
            .with_header(headers::CREATED_AT, record.created_at.to_rfc3339());
        match &self.source {
            Some(source) => message.with_header(headers::SOURCE, source.as_str()),
            None => message,
        }
    }
}

async fn stage(
    session: &mut Box<dyn RepositorySession>,
    record: &EventRecord,
    outcome: &RecordOutcome,
) -> Result<(), StorageError> {
    match outcome {
        RecordOutcome::Published => {
            debug!(event_id = %record.id, queue = %record.queue, "published");
            session.mark_published(record).await
        }
        RecordOutcome::Retry { reason } => {
            warn!(
                event_id = %record.id,
                queue = %record.queue,
                retry_count = record.retry_count + 1,
                reason = %reason,
                "publish failed; will retry"
            );
            session.mark_retry(record, reason).await
        }
        RecordOutcome::Failed(reason) => {
            error!(
                event_id = %record.id,
                queue = %record.queue,
                reason = %reason,
                "record failed permanently"
            );
            session.mark_failed(record, &reason.to_string()).await
        }
    }
}
