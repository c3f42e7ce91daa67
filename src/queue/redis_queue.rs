//! Reliable Redis list queue.
//!
//! Producers `LPUSH` onto `docpoll:queue:<name>`. Consumers atomically move the oldest id onto
//! `docpoll:queue:<name>:inflight` with `LMOVE` and remove it from there once handled, so a
//! consumer crash leaves the id recoverable instead of lost.

use super::{JobQueue, QueueError};
use crate::jobs::JobId;
use async_trait::async_trait;
use redis::{AsyncCommands, aio::ConnectionManager};
use std::time::Duration;
use tokio::time::Instant;

const POLL_STEP: Duration = Duration::from_millis(100);

/// Queue of job ids stored in Redis lists.
pub struct RedisQueue {
    connection: ConnectionManager,
    pending_key: String,
    inflight_key: String,
}

impl RedisQueue {
    /// Connect to Redis at `url` and bind to the queue called `name`.
    pub async fn connect(url: &str, name: &str) -> Result<Self, QueueError> {
        let client = redis::Client::open(url)?;
        let connection = ConnectionManager::new(client).await?;
        tracing::debug!(queue = name, "Connected job queue to Redis");
        Ok(Self::new(connection, name))
    }

    /// Build a queue over an existing connection manager.
    pub fn new(connection: ConnectionManager, name: &str) -> Self {
        let pending_key = format!("docpoll:queue:{name}");
        let inflight_key = format!("{pending_key}:inflight");
        Self {
            connection,
            pending_key,
            inflight_key,
        }
    }

    async fn claim(&self) -> Result<Option<JobId>, QueueError> {
        let mut con = self.connection.clone();
        let claimed: Option<String> = redis::cmd("LMOVE")
            .arg(&self.pending_key)
            .arg(&self.inflight_key)
            .arg("RIGHT")
            .arg("LEFT")
            .query_async(&mut con)
            .await?;
        Ok(claimed.map(JobId::from))
    }
}

#[async_trait]
impl JobQueue for RedisQueue {
    async fn enqueue(&self, id: &JobId) -> Result<(), QueueError> {
        let mut con = self.connection.clone();
        let _: () = con.lpush(&self.pending_key, id.as_str()).await?;
        Ok(())
    }

    async fn dequeue(&self, wait: Duration) -> Result<Option<JobId>, QueueError> {
        let deadline = Instant::now() + wait;
        loop {
            if let Some(id) = self.claim().await? {
                return Ok(Some(id));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(POLL_STEP.min(deadline - now)).await;
        }
    }

    async fn ack(&self, id: &JobId) -> Result<(), QueueError> {
        let mut con = self.connection.clone();
        let _: () = con.lrem(&self.inflight_key, 1, id.as_str()).await?;
        Ok(())
    }

    async fn recover(&self) -> Result<usize, QueueError> {
        let mut con = self.connection.clone();
        let mut moved = 0;
        loop {
            let requeued: Option<String> = redis::cmd("LMOVE")
                .arg(&self.inflight_key)
                .arg(&self.pending_key)
                .arg("RIGHT")
                .arg("RIGHT")
                .query_async(&mut con)
                .await?;
            match requeued {
                Some(id) => {
                    tracing::warn!(file_id = %id, "Re-queued unacknowledged job");
                    moved += 1;
                }
                None => return Ok(moved),
            }
        }
    }
}

