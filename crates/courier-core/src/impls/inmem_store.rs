//! InMemoryOutboxStore - reference storage adapter.
//!
//! Behaves like a SQL outbox table accessed with `FOR UPDATE SKIP LOCKED`:
//! - `fetch_batch` claims rows for the session, oldest first
//! - staged mutations become visible only on `commit`, all together
//! - rollback, drop, or a failed commit releases the claims untouched
//! - a claim expires after `claim_ttl`, standing in for the transaction abort
//!   a real database performs when the dispatcher process dies
//!
//! Fault injection (`fail_next_fetches`, `fail_next_commits`) exists so the
//! dispatcher's failure paths can be exercised.
//!
//! # 学習ポイント
//! - Mutex で守った共有状態とセッションごとの claim
//! - Drop による rollback（どの exit path でも claim を解放）
//! - Clock port を差し替えて claim の期限切れをテスト

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{EventId, EventRecord, Payload, QueueName, RetryBudget, StorageError};
use crate::ports::{Clock, IdGenerator, OutboxRepository, RepositorySession, SystemClock, UlidGenerator};

const DEFAULT_CLAIM_TTL_SECS: i64 = 30;

/// Snapshot of the table by state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboxCounts {
    pub pending: usize,
    /// Pending records currently claimed by a live session.
    pub claimed: usize,
    pub published: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy)]
struct Claim {
    session: u64,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
enum Mutation {
    Published,
    Failed(String),
    Retry(String),
}

#[derive(Default)]
struct StoreState {
    /// Creation order.
    records: Vec<EventRecord>,
    index: HashMap<EventId, usize>,
    claims: HashMap<EventId, Claim>,
    fail_fetches: usize,
    fail_commits: usize,
}

impl StoreState {
    fn release(&mut self, session: u64, ids: &[EventId]) {
        for id in ids {
            if self.claims.get(id).is_some_and(|c| c.session == session) {
                self.claims.remove(id);
            }
        }
    }

    fn is_claimed(&self, id: &EventId, now: DateTime<Utc>) -> bool {
        self.claims.get(id).is_some_and(|c| c.expires_at > now)
    }
}

fn lock(state: &Mutex<StoreState>) -> Result<MutexGuard<'_, StoreState>, StorageError> {
    state.lock().map_err(|_| StorageError::Poisoned)
}

/// In-memory outbox table.
pub struct InMemoryOutboxStore {
    state: Arc<Mutex<StoreState>>,
    clock: Arc<dyn Clock>,
    ids: UlidGenerator<Arc<dyn Clock>>,
    claim_ttl: Duration,
    next_session: AtomicU64,
}

impl InMemoryOutboxStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(Mutex::new(StoreState::default())),
            ids: UlidGenerator::new(Arc::clone(&clock)),
            clock,
            claim_ttl: Duration::seconds(DEFAULT_CLAIM_TTL_SECS),
            next_session: AtomicU64::new(1),
        }
    }

    /// How long an unreleased claim blocks other sessions.
    ///
    /// A cycle must reach `commit` within this window. If processing a batch
    /// takes longer, its claims expire, the commit fails and the whole batch
    /// is fetched and published again next cycle, indefinitely. Keep it above
    /// `batch_size x publish_timeout` (with `max_in_flight = 1`), and set a
    /// publish timeout when the broker can hang.
    pub fn with_claim_ttl(mut self, claim_ttl: Duration) -> Self {
        self.claim_ttl = claim_ttl;
        self
    }

    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Write a new pending record, as the business transaction would.
    pub fn insert(&self, queue: impl Into<QueueName>, payload: Payload) -> EventId {
        let id = self.ids.generate_event_id();
        let record = EventRecord::new(id, queue.into(), self.clock.now(), payload);
        self.insert_record(record);
        id
    }

    /// Write a record as-is (any state). Replaces a record with the same id.
    pub fn insert_record(&self, record: EventRecord) {
        let mut state = self.state();
        match state.index.get(&record.id).copied() {
            Some(pos) => state.records[pos] = record,
            None => {
                let pos = state.records.len();
                state.index.insert(record.id, pos);
                state.records.push(record);
            }
        }
    }

    pub fn get(&self, id: EventId) -> Option<EventRecord> {
        let state = self.state();
        state.index.get(&id).map(|&pos| state.records[pos].clone())
    }

    /// All records in creation order.
    pub fn records(&self) -> Vec<EventRecord> {
        self.state().records.clone()
    }

    pub fn counts(&self) -> OutboxCounts {
        let state = self.state();
        let now = self.clock.now();
        let mut counts = OutboxCounts::default();
        for record in &state.records {
            if record.is_published {
                counts.published += 1;
            } else if record.is_failed {
                counts.failed += 1;
            } else {
                counts.pending += 1;
                if state.is_claimed(&record.id, now) {
                    counts.claimed += 1;
                }
            }
        }
        counts
    }

    /// The next `n` fetches fail with `StorageError::Unavailable`.
    pub fn fail_next_fetches(&self, n: usize) {
        self.state().fail_fetches = n;
    }

    /// The next `n` commits fail with `StorageError::CommitFailed`.
    pub fn fail_next_commits(&self, n: usize) {
        self.state().fail_commits = n;
    }
}

impl Default for InMemoryOutboxStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OutboxRepository for InMemoryOutboxStore {
    async fn begin(&self) -> Result<Box<dyn RepositorySession>, StorageError> {
        let session = InMemorySession {
            id: self.next_session.fetch_add(1, Ordering::Relaxed),
            state: Arc::clone(&self.state),
            clock: Arc::clone(&self.clock),
            claim_ttl: self.claim_ttl,
            claimed: Vec::new(),
            staged: Vec::new(),
            finished: false,
        };
        Ok(Box::new(session))
    }
}

/// One open unit of work against the store.
struct InMemorySession {
    id: u64,
    state: Arc<Mutex<StoreState>>,
    clock: Arc<dyn Clock>,
    claim_ttl: Duration,
    claimed: Vec<EventId>,
    staged: Vec<(EventId, Mutation)>,
    finished: bool,
}

impl InMemorySession {
    fn stage(&mut self, record: &EventRecord, mutation: Mutation) -> Result<(), StorageError> {
        if !self.claimed.contains(&record.id) {
            return Err(StorageError::NotClaimed(record.id.to_string()));
        }
        self.staged.push((record.id, mutation));
        Ok(())
    }

    fn release_all(&mut self, state: &mut StoreState) {
        state.release(self.id, &self.claimed);
        self.claimed.clear();
        self.staged.clear();
        self.finished = true;
    }
}

#[async_trait]
impl RepositorySession for InMemorySession {
    async fn fetch_batch(
        &mut self,
        limit: usize,
        budget: RetryBudget,
    ) -> Result<Vec<EventRecord>, StorageError> {
        let mut state = lock(&self.state)?;
        if state.fail_fetches > 0 {
            state.fail_fetches -= 1;
            return Err(StorageError::Unavailable("injected fetch failure".to_string()));
        }

        let now = self.clock.now();
        let expires_at = now + self.claim_ttl;
        let picked: Vec<EventRecord> = state
            .records
            .iter()
            .filter(|r| r.is_eligible(budget.max_retries) && !state.is_claimed(&r.id, now))
            .take(limit)
            .cloned()
            .collect();

        for record in &picked {
            state.claims.insert(
                record.id,
                Claim {
                    session: self.id,
                    expires_at,
                },
            );
            self.claimed.push(record.id);
        }
        Ok(picked)
    }

    async fn mark_published(&mut self, record: &EventRecord) -> Result<(), StorageError> {
        self.stage(record, Mutation::Published)
    }

    async fn mark_failed(
        &mut self,
        record: &EventRecord,
        reason: &str,
    ) -> Result<(), StorageError> {
        self.stage(record, Mutation::Failed(reason.to_string()))
    }

    async fn mark_retry(
        &mut self,
        record: &EventRecord,
        reason: &str,
    ) -> Result<(), StorageError> {
        self.stage(record, Mutation::Retry(reason.to_string()))
    }

    async fn commit(mut self: Box<Self>) -> Result<(), StorageError> {
        let state_handle = Arc::clone(&self.state);
        let mut state = lock(&state_handle)?;

        if state.fail_commits > 0 {
            state.fail_commits -= 1;
            self.release_all(&mut state);
            return Err(StorageError::CommitFailed("injected commit failure".to_string()));
        }

        // A claim that expired and was taken over means another session owns the row now.
        let now = self.clock.now();
        let lost = self.claimed.iter().find(|id| {
            !state
                .claims
                .get(*id)
                .is_some_and(|c| c.session == self.id && c.expires_at > now)
        });
        if let Some(id) = lost {
            let message = format!("claim on {id} expired before commit");
            self.release_all(&mut state);
            return Err(StorageError::CommitFailed(message));
        }

        let staged = std::mem::take(&mut self.staged);
        for (id, mutation) in staged {
            let Some(&pos) = state.index.get(&id) else {
                continue;
            };
            let record = &mut state.records[pos];
            match mutation {
                Mutation::Published => record.mark_published(),
                Mutation::Failed(reason) => record.mark_failed(reason),
                Mutation::Retry(reason) => record.record_retry(reason),
            }
        }
        self.release_all(&mut state);
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> Result<(), StorageError> {
        let state_handle = Arc::clone(&self.state);
        let mut state = lock(&state_handle)?;
        self.release_all(&mut state);
        Ok(())
    }
}

impl Drop for InMemorySession {
    fn drop(&mut self) {
        if self.finished || self.claimed.is_empty() {
            return;
        }
        if let Ok(mut state) = self.state.lock() {
            state.release(self.id, &self.claimed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::FixedClock;
    use chrono::TimeZone;
    use serde_json::json;

    const BUDGET: RetryBudget = RetryBudget { max_retries: 3 };

    fn payload() -> Payload {
        json!({ "user_id": 42, "user_name": "Neo" })
            .as_object()
            .cloned()
            .unwrap()
    }

    fn store_with(n: usize) -> (InMemoryOutboxStore, Vec<EventId>) {
        let store = InMemoryOutboxStore::new();
        let ids = (0..n).map(|_| store.insert("user_events", payload())).collect();
        (store, ids)
    }

    #[tokio::test]
    async fn fetch_returns_records_in_creation_order() {
        let (store, ids) = store_with(3);

        let mut session = store.begin().await.unwrap();
        let batch = session.fetch_batch(10, BUDGET).await.unwrap();

        let fetched: Vec<EventId> = batch.iter().map(|r| r.id).collect();
        assert_eq!(fetched, ids);
    }

    #[tokio::test]
    async fn fetch_respects_limit() {
        let (store, _) = store_with(5);

        let mut session = store.begin().await.unwrap();
        assert_eq!(session.fetch_batch(2, BUDGET).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn concurrent_sessions_never_share_records() {
        let (store, _) = store_with(4);

        let mut a = store.begin().await.unwrap();
        let mut b = store.begin().await.unwrap();
        let batch_a = a.fetch_batch(3, BUDGET).await.unwrap();
        let batch_b = b.fetch_batch(3, BUDGET).await.unwrap();

        assert_eq!(batch_a.len(), 3);
        assert_eq!(batch_b.len(), 1);
        assert!(batch_a.iter().all(|r| r.id != batch_b[0].id));
        assert_eq!(store.counts().claimed, 4);
    }

    #[tokio::test]
    async fn commit_applies_staged_mutations() {
        let (store, ids) = store_with(3);

        let mut session = store.begin().await.unwrap();
        let batch = session.fetch_batch(10, BUDGET).await.unwrap();
        session.mark_published(&batch[0]).await.unwrap();
        session.mark_failed(&batch[1], "rejected").await.unwrap();
        session.mark_retry(&batch[2], "broker down").await.unwrap();

        // Nothing visible before commit.
        assert_eq!(store.counts().published, 0);

        session.commit().await.unwrap();

        assert!(store.get(ids[0]).unwrap().is_published);
        let failed = store.get(ids[1]).unwrap();
        assert!(failed.is_failed);
        assert_eq!(failed.last_error.as_deref(), Some("rejected"));
        assert_eq!(store.get(ids[2]).unwrap().retry_count, 1);
        assert_eq!(
            store.counts(),
            OutboxCounts {
                pending: 1,
                claimed: 0,
                published: 1,
                failed: 1,
            }
        );
    }

    #[tokio::test]
    async fn terminal_records_are_not_fetched_again() {
        let (store, _) = store_with(2);

        let mut session = store.begin().await.unwrap();
        let batch = session.fetch_batch(10, BUDGET).await.unwrap();
        session.mark_published(&batch[0]).await.unwrap();
        session.mark_failed(&batch[1], "bad").await.unwrap();
        session.commit().await.unwrap();

        let mut session = store.begin().await.unwrap();
        assert!(session.fetch_batch(10, BUDGET).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_commit_changes_nothing_and_releases_claims() {
        let (store, ids) = store_with(2);
        store.fail_next_commits(1);

        let mut session = store.begin().await.unwrap();
        let batch = session.fetch_batch(10, BUDGET).await.unwrap();
        for record in &batch {
            session.mark_published(record).await.unwrap();
        }
        let err = session.commit().await.unwrap_err();
        assert!(matches!(err, StorageError::CommitFailed(_)));

        assert!(ids.iter().all(|id| !store.get(*id).unwrap().is_published));
        let mut session = store.begin().await.unwrap();
        assert_eq!(session.fetch_batch(10, BUDGET).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn dropped_session_releases_claims() {
        let (store, _) = store_with(2);

        {
            let mut session = store.begin().await.unwrap();
            let batch = session.fetch_batch(10, BUDGET).await.unwrap();
            session.mark_published(&batch[0]).await.unwrap();
        }

        assert_eq!(store.counts().claimed, 0);
        assert_eq!(store.counts().published, 0);
        let mut session = store.begin().await.unwrap();
        assert_eq!(session.fetch_batch(10, BUDGET).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn rollback_releases_claims() {
        let (store, _) = store_with(1);

        let mut session = store.begin().await.unwrap();
        session.fetch_batch(10, BUDGET).await.unwrap();
        session.rollback().await.unwrap();

        assert_eq!(store.counts().claimed, 0);
    }

    #[tokio::test]
    async fn injected_fetch_failure_is_transient() {
        let (store, _) = store_with(1);
        store.fail_next_fetches(1);

        let mut session = store.begin().await.unwrap();
        assert!(matches!(
            session.fetch_batch(10, BUDGET).await,
            Err(StorageError::Unavailable(_))
        ));
        assert_eq!(session.fetch_batch(10, BUDGET).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn marking_unclaimed_record_is_an_error() {
        let (store, ids) = store_with(1);
        let record = store.get(ids[0]).unwrap();

        let mut session = store.begin().await.unwrap();
        let err = session.mark_published(&record).await.unwrap_err();
        assert!(matches!(err, StorageError::NotClaimed(_)));
    }

    #[tokio::test]
    async fn expired_claim_can_be_taken_over_and_blocks_stale_commit() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let clock = Arc::new(FixedClock::new(start));
        let store = InMemoryOutboxStore::with_clock(clock.clone())
            .with_claim_ttl(Duration::seconds(10));
        store.insert("user_events", payload());

        // A session that stalls past its claim ttl without releasing.
        let mut crashed = store.begin().await.unwrap();
        let batch = crashed.fetch_batch(10, BUDGET).await.unwrap();
        crashed.mark_published(&batch[0]).await.unwrap();

        let mut other = store.begin().await.unwrap();
        assert!(other.fetch_batch(10, BUDGET).await.unwrap().is_empty());
        drop(other);

        clock.advance(Duration::seconds(11));
        let mut other = store.begin().await.unwrap();
        assert_eq!(other.fetch_batch(10, BUDGET).await.unwrap().len(), 1);

        // The stale session lost its claim, so its commit must not apply.
        assert!(crashed.commit().await.is_err());
        assert_eq!(store.counts().published, 0);
        assert_eq!(store.counts().claimed, 1);
    }

    #[tokio::test]
    async fn fetch_skips_records_past_the_budget() {
        let store = InMemoryOutboxStore::new();
        let spent = store.insert("user_events", payload());
        let mut record = store.get(spent).unwrap();
        record.retry_count = 2;
        store.insert_record(record);
        let at_limit = store.insert("user_events", payload());
        let mut record = store.get(at_limit).unwrap();
        record.retry_count = 1;
        store.insert_record(record);

        let mut session = store.begin().await.unwrap();
        let batch = session.fetch_batch(10, RetryBudget::new(1)).await.unwrap();
        let ids: Vec<EventId> = batch.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![at_limit]);
    }

    #[test]
    fn insert_uses_clock_for_created_at() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap();
        let store = InMemoryOutboxStore::with_clock(Arc::new(FixedClock::new(at)));
        let id = store.insert("user_events", payload());

        let record = store.get(id).unwrap();
        assert_eq!(record.created_at, at);
        assert_eq!(record.retry_count, 0);
        assert!(!record.is_published && !record.is_failed);
    }
}
