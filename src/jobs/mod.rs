//! Job record storage: the single source of truth for a job's state.

mod memory;
mod redis_store;
pub mod types;

use async_trait::async_trait;

pub use memory::MemoryJobStore;
pub use redis_store::RedisJobStore;
pub use types::{JobId, JobRecord, JobState, StoreError};

/// Key-value mapping from job identifier to job record.
///
/// Every operation is atomic per key; no cross-key transactions are required.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new record. Fails with [`StoreError::Duplicate`] if the id is taken.
    async fn create(&self, record: &JobRecord) -> Result<(), StoreError>;

    /// Fetch the record for `id`, if any.
    async fn get(&self, id: &JobId) -> Result<Option<JobRecord>, StoreError>;

    /// Replace a pending record with `next`.
    ///
    /// Returns `false` without writing when the stored record is missing or no longer pending,
    /// which makes redelivered jobs harmless.
    async fn transition_from_pending(&self, next: &JobRecord) -> Result<bool, StoreError>;

    /// Remove a record. Used to roll back an ingest that could not be enqueued.
    async fn delete(&self, id: &JobId) -> Result<(), StoreError>;
}
