//! Repository port - the outbox table.
//!
//! A cycle runs inside exactly one `RepositorySession`:
//! `begin -> fetch_batch -> mark_* ... -> commit`.
//!
//! # Contract for implementations
//! - `fetch_batch` atomically claims the rows it returns (e.g.
//!   `SELECT ... FOR UPDATE SKIP LOCKED` inside the session's transaction).
//!   Two live sessions never receive the same record. This claim is the only
//!   mutual exclusion between dispatcher instances.
//! - `mark_*` stage mutations. Nothing is durable before `commit`.
//! - `commit` persists every staged mutation or none of them, then releases
//!   the claims.
//! - A session that is dropped or rolled back releases its claims without
//!   applying anything. If the process dies before either happens, the
//!   storage layer must expire the claim on its own (transaction abort, lease
//!   timeout) so the rows become eligible again.

use async_trait::async_trait;

use crate::domain::{EventRecord, RetryBudget, StorageError};

/// Opens sessions. Shared by the dispatcher for its whole lifetime.
#[async_trait]
pub trait OutboxRepository: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn RepositorySession>, StorageError>;
}

/// Scoped unit of work covering one fetch-process-record cycle.
#[async_trait]
pub trait RepositorySession: Send {
    /// Claim up to `limit` eligible records, oldest first.
    /// Eligible: neither published nor failed, and `retry_count` within `budget`.
    /// Returns an empty batch when nothing is eligible; never waits for rows.
    async fn fetch_batch(
        &mut self,
        limit: usize,
        budget: RetryBudget,
    ) -> Result<Vec<EventRecord>, StorageError>;

    async fn mark_published(&mut self, record: &EventRecord) -> Result<(), StorageError>;

    async fn mark_failed(&mut self, record: &EventRecord, reason: &str)
    -> Result<(), StorageError>;

    /// Count one failed attempt; the record stays eligible.
    async fn mark_retry(&mut self, record: &EventRecord, reason: &str)
    -> Result<(), StorageError>;

    async fn commit(self: Box<Self>) -> Result<(), StorageError>;

    async fn rollback(self: Box<Self>) -> Result<(), StorageError>;
}
