use super::{JobQueue, QueueError};
use crate::jobs::JobId;
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};

/// Channel-backed queue for tests and single-process deployments.
///
/// Messages live only in memory, so [`JobQueue::recover`] has nothing to return.
pub struct MemoryQueue {
    sender: mpsc::UnboundedSender<JobId>,
    receiver: Mutex<mpsc::UnboundedReceiver<JobId>>,
}

impl MemoryQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver: Mutex::new(receiver),
        }
    }
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobQueue for MemoryQueue {
    async fn enqueue(&self, id: &JobId) -> Result<(), QueueError> {
        self.sender.send(id.clone()).map_err(|_| QueueError::Closed)
    }

    async fn dequeue(&self, wait: Duration) -> Result<Option<JobId>, QueueError> {
        let next = async { self.receiver.lock().await.recv().await };
        match tokio::time::timeout(wait, next).await {
            Ok(Some(id)) => Ok(Some(id)),
            Ok(None) => Err(QueueError::Closed),
            Err(_) => Ok(None),
        }
    }

    async fn ack(&self, _id: &JobId) -> Result<(), QueueError> {
        Ok(())
    }

    async fn recover(&self) -> Result<usize, QueueError> {
        Ok(0)
    }
}
