//! Background text extraction.
//!
//! [`ExtractionWorker::process`] handles one job id: it loads the pending blob, extracts its
//! text, and moves the record to `done` or `failed`. [`run_pool`] runs several consumers
//! against a shared [`JobQueue`] until a shutdown signal arrives. Failures never escape a
//! consumer; they are logged and recorded so the loop keeps draining the queue.

use crate::{
    blob::{BlobHandle, BlobStore},
    extract::TextExtractor,
    jobs::{JobId, JobState, JobStore},
    metrics::JobMetrics,
    queue::JobQueue,
};
use serde_json::{Value, json};
use std::{fmt, sync::Arc, time::Duration};
use tokio::{sync::watch, task::JoinSet};

const DEQUEUE_ERROR_BACKOFF: Duration = Duration::from_secs(2);

/// Result of handling one job id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerOutcome {
    /// Text was extracted and recorded; the blob was removed.
    Completed,
    /// No pending job exists for the id (unknown, or already finished).
    NotFound,
    /// Extraction failed and the failure was recorded; carries the error message.
    Failed(String),
    /// The job store could not be read or written, so the record is still pending.
    StoreUnavailable(String),
}

impl WorkerOutcome {
    /// Task report in the `{"success": true}` / `{"error": ...}` shape.
    pub fn report(&self) -> Value {
        match self {
            Self::Completed => json!({ "success": true }),
            Self::NotFound => json!({ "error": "File not found" }),
            Self::Failed(message) | Self::StoreUnavailable(message) => {
                json!({ "error": message })
            }
        }
    }

    /// Whether the queue item should be left unacknowledged for redelivery.
    pub fn needs_retry(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_))
    }
}

impl fmt::Display for WorkerOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.report())
    }
}

/// Consumer-side handle on the job record store, blob store, and extractor.
pub struct ExtractionWorker {
    store: Arc<dyn JobStore>,
    blobs: Arc<dyn BlobStore>,
    extractor: Arc<dyn TextExtractor>,
    metrics: Arc<JobMetrics>,
}

impl ExtractionWorker {
    /// Assemble a worker from already-connected backends.
    pub fn new(
        store: Arc<dyn JobStore>,
        blobs: Arc<dyn BlobStore>,
        extractor: Arc<dyn TextExtractor>,
        metrics: Arc<JobMetrics>,
    ) -> Self {
        Self {
            store,
            blobs,
            extractor,
            metrics,
        }
    }

    /// Extract the text for one job and record the result.
    ///
    /// Only a pending record is ever transitioned, so a redelivered id reports
    /// [`WorkerOutcome::NotFound`] instead of extracting twice. On extraction failure the blob is
    /// kept on disk.
    pub async fn process(&self, id: &JobId) -> WorkerOutcome {
        let record = match self.store.get(id).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                tracing::warn!(file_id = %id, "No job record for queued file");
                return WorkerOutcome::NotFound;
            }
            Err(err) => {
                tracing::error!(file_id = %id, error = %err, "Failed to read job record");
                return WorkerOutcome::StoreUnavailable(err.to_string());
            }
        };

        let JobState::Pending { blob } = &record.state else {
            tracing::info!(file_id = %id, state = record.state.label(), "Job already finished");
            return WorkerOutcome::NotFound;
        };

        match self.extract(blob).await {
            Ok(text) => {
                let chars = text.chars().count();
                let next = record.transitioned(JobState::Done { text });
                match self.store.transition_from_pending(&next).await {
                    Ok(true) => {
                        if let Err(err) = self.blobs.delete(blob).await {
                            tracing::warn!(file_id = %id, error = %err, "Failed to remove blob");
                        }
                        self.metrics.record_completed();
                        tracing::info!(file_id = %id, chars, "File converted");
                        WorkerOutcome::Completed
                    }
                    Ok(false) => {
                        tracing::info!(file_id = %id, "Job finished by another consumer");
                        WorkerOutcome::NotFound
                    }
                    Err(err) => {
                        tracing::error!(file_id = %id, error = %err, "Failed to record extracted text");
                        WorkerOutcome::StoreUnavailable(err.to_string())
                    }
                }
            }
            Err(message) => {
                let next = record.transitioned(JobState::Failed {
                    error: message.clone(),
                });
                match self.store.transition_from_pending(&next).await {
                    Ok(true) => {
                        self.metrics.record_failed();
                        tracing::warn!(file_id = %id, error = %message, "Error processing file");
                    }
                    Ok(false) => {
                        tracing::info!(file_id = %id, "Job finished by another consumer");
                        return WorkerOutcome::NotFound;
                    }
                    Err(err) => {
                        tracing::error!(file_id = %id, error = %err, "Failed to record extraction error");
                        return WorkerOutcome::StoreUnavailable(err.to_string());
                    }
                }
                WorkerOutcome::Failed(message)
            }
        }
    }

    async fn extract(&self, blob: &BlobHandle) -> Result<String, String> {
        let bytes = self.blobs.load(blob).await.map_err(|err| err.to_string())?;
        self.extractor
            .extract(bytes)
            .await
            .map_err(|err| err.to_string())
    }
}

/// Sizing for [`run_pool`].
#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    /// Number of concurrent consumers (at least one is started).
    pub concurrency: usize,
    /// Longest a consumer waits on an empty queue before checking for shutdown again.
    pub poll_interval: Duration,
}

/// Run consumers until `shutdown` flips to `true` or its sender is dropped.
///
/// Ids left claimed by a previous crash are re-queued before consumers start. Each consumer
/// finishes the job it holds before stopping.
pub async fn run_pool(
    worker: Arc<ExtractionWorker>,
    queue: Arc<dyn JobQueue>,
    config: PoolConfig,
    shutdown: watch::Receiver<bool>,
) {
    match queue.recover().await {
        Ok(0) => {}
        Ok(moved) => tracing::info!(moved, "Re-queued unacknowledged jobs"),
        Err(err) => tracing::warn!(error = %err, "Failed to recover unacknowledged jobs"),
    }

    let concurrency = config.concurrency.max(1);
    tracing::info!(concurrency, "Starting worker pool");

    let mut consumers = JoinSet::new();
    for consumer in 0..concurrency {
        consumers.spawn(consume(
            consumer,
            worker.clone(),
            queue.clone(),
            config.poll_interval,
            shutdown.clone(),
        ));
    }

    while let Some(result) = consumers.join_next().await {
        if let Err(err) = result {
            tracing::error!(error = %err, "Consumer task aborted");
        }
    }
    tracing::info!("Worker pool stopped");
}

async fn consume(
    consumer: usize,
    worker: Arc<ExtractionWorker>,
    queue: Arc<dyn JobQueue>,
    poll_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() {
            break;
        }

        let next = tokio::select! {
            _ = shutdown.changed() => break,
            next = queue.dequeue(poll_interval) => next,
        };

        match next {
            Ok(Some(id)) => {
                let outcome = worker.process(&id).await;
                tracing::debug!(consumer, file_id = %id, %outcome, "Job handled");
                if outcome.needs_retry() {
                    tracing::warn!(consumer, file_id = %id, "Leaving job claimed for recovery");
                    continue;
                }
                if let Err(err) = queue.ack(&id).await {
                    tracing::warn!(consumer, file_id = %id, error = %err, "Failed to acknowledge job");
                }
            }
            Ok(None) => {}
            Err(err) => {
                tracing::error!(consumer, error = %err, "Failed to dequeue job");
                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = tokio::time::sleep(DEQUEUE_ERROR_BACKOFF) => {}
                }
            }
        }
    }
    tracing::debug!(consumer, "Consumer stopped");
}
