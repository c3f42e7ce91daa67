//! Work queue carrying job identifiers from the ingest path to extraction consumers.

mod memory;
mod redis_queue;

use crate::jobs::JobId;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

pub use memory::MemoryQueue;
pub use redis_queue::RedisQueue;

/// Errors raised by queue backends.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Redis command failed or the connection was lost.
    #[error("Redis queue request failed: {0}")]
    Redis(#[from] redis::RedisError),
    /// The queue can no longer deliver messages.
    #[error("queue closed")]
    Closed,
}

/// At-least-once queue of job identifiers.
///
/// A dequeued id stays claimed until [`JobQueue::ack`] is called. Ids claimed by a consumer
/// that died are handed out again by [`JobQueue::recover`].
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Push an id for extraction.
    async fn enqueue(&self, id: &JobId) -> Result<(), QueueError>;

    /// Claim the next id, waiting at most `wait`. Returns `None` when the queue stayed empty.
    async fn dequeue(&self, wait: Duration) -> Result<Option<JobId>, QueueError>;

    /// Mark a claimed id as handled.
    async fn ack(&self, id: &JobId) -> Result<(), QueueError>;

    /// Return ids claimed but never acknowledged to the queue. Returns how many were moved.
    async fn recover(&self) -> Result<usize, QueueError>;
}
