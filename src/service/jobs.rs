//! Job service coordinating blob storage, job records, and the work queue.

use crate::{
    blob::{BlobHandle, BlobStore},
    jobs::{JobId, JobRecord, JobState, JobStore},
    metrics::{JobMetrics, MetricsSnapshot},
    queue::JobQueue,
    service::{
        types::{IngestError, PollError, PollStatus, StorageError, Upload},
        validate::validate_upload,
    },
};
use async_trait::async_trait;
use std::sync::Arc;

/// Prefix applied to extraction failures when they are reported to pollers.
pub const FAILURE_PREFIX: &str = "Error processing file: ";

/// Abstraction over the job lifecycle used by the HTTP surface.
#[async_trait]
pub trait JobApi: Send + Sync {
    /// Largest upload the service accepts, in bytes.
    fn max_upload_bytes(&self) -> usize;

    /// Validate and persist an upload, enqueue its extraction, and return the new job id.
    async fn submit(&self, upload: Upload) -> Result<JobId, IngestError>;

    /// Report the current state of a job.
    async fn poll(&self, id: &JobId) -> Result<PollStatus, PollError>;

    /// Retrieve the current metrics snapshot for diagnostics.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

/// Owns the store, blob, and queue clients shared by every request.
///
/// Build one at startup and share it through an `Arc`.
pub struct JobService {
    store: Arc<dyn JobStore>,
    blobs: Arc<dyn BlobStore>,
    queue: Arc<dyn JobQueue>,
    metrics: Arc<JobMetrics>,
    max_upload_bytes: usize,
}

impl JobService {
    /// Assemble the service from already-connected backends.
    pub fn new(
        store: Arc<dyn JobStore>,
        blobs: Arc<dyn BlobStore>,
        queue: Arc<dyn JobQueue>,
        metrics: Arc<JobMetrics>,
        max_upload_bytes: usize,
    ) -> Self {
        Self {
            store,
            blobs,
            queue,
            metrics,
            max_upload_bytes,
        }
    }

    /// Validate, store, record, and enqueue an upload.
    ///
    /// If a later step fails, the earlier writes are rolled back on a best-effort basis so no
    /// half-created job stays visible.
    pub async fn submit(&self, upload: Upload) -> Result<JobId, IngestError> {
        if let Err(err) = validate_upload(&upload, self.max_upload_bytes) {
            self.metrics.record_rejected();
            tracing::warn!(
                filename = %upload.filename,
                content_type = ?upload.content_type,
                size = upload.bytes.len(),
                reason = %err,
                "Rejected upload"
            );
            return Err(err);
        }

        let id = JobId::generate();
        let size = upload.bytes.len();

        let handle = self
            .blobs
            .put(&id, &upload.bytes)
            .await
            .map_err(|err| storage_failure(&id, err.into()))?;

        let record = JobRecord::pending(id.clone(), handle.clone());
        if let Err(err) = self.store.create(&record).await {
            self.discard_blob(&id, &handle).await;
            return Err(storage_failure(&id, err.into()));
        }

        if let Err(err) = self.queue.enqueue(&id).await {
            self.discard_record(&id).await;
            self.discard_blob(&id, &handle).await;
            return Err(storage_failure(&id, err.into()));
        }

        self.metrics.record_submitted();
        tracing::info!(
            file_id = %id,
            filename = %upload.filename,
            size,
            "File stored and processing started"
        );
        Ok(id)
    }

    /// Look up a job and translate its state for clients.
    pub async fn poll(&self, id: &JobId) -> Result<PollStatus, PollError> {
        let record = self.store.get(id).await.map_err(|err| {
            tracing::error!(file_id = %id, error = %err, "Failed to fetch file data");
            PollError::StorageUnavailable(err)
        })?;

        let Some(record) = record else {
            tracing::warn!(file_id = %id, "File ID not found");
            return Err(PollError::NotFound);
        };

        let status = match record.state {
            JobState::Pending { .. } => PollStatus::Processing,
            JobState::Done { text } => PollStatus::Ready(text),
            JobState::Failed { error } => PollStatus::Ready(format!("{FAILURE_PREFIX}{error}")),
        };
        tracing::info!(
            file_id = %id,
            processing = matches!(status, PollStatus::Processing),
            "Polled file"
        );
        Ok(status)
    }

    /// Retrieve the current metrics snapshot.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    async fn discard_blob(&self, id: &JobId, handle: &BlobHandle) {
        if let Err(err) = self.blobs.delete(handle).await {
            tracing::warn!(file_id = %id, error = %err, "Failed to remove blob after aborted ingest");
        }
    }

    async fn discard_record(&self, id: &JobId) {
        if let Err(err) = self.store.delete(id).await {
            tracing::warn!(file_id = %id, error = %err, "Failed to remove record after aborted ingest");
        }
    }
}

fn storage_failure(id: &JobId, err: StorageError) -> IngestError {
    tracing::error!(file_id = %id, error = %err, "Failed to process the uploaded file");
    IngestError::StorageFailure(err)
}

#[async_trait]
impl JobApi for JobService {
    fn max_upload_bytes(&self) -> usize {
        self.max_upload_bytes
    }

    async fn submit(&self, upload: Upload) -> Result<JobId, IngestError> {
        JobService::submit(self, upload).await
    }

    async fn poll(&self, id: &JobId) -> Result<PollStatus, PollError> {
        JobService::poll(self, id).await
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        JobService::metrics_snapshot(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        blob::FsBlobStore,
        jobs::{MemoryJobStore, StoreError},
        queue::{MemoryQueue, QueueError},
        service::validate::PDF_MEDIA_TYPE,
    };
    use std::time::Duration;
    use tempfile::TempDir;

    struct Harness {
        _dir: TempDir,
        blobs: Arc<FsBlobStore>,
        store: Arc<MemoryJobStore>,
        service: JobService,
    }

    async fn harness_with_queue(queue: Arc<dyn JobQueue>) -> Harness {
        let dir = tempfile::tempdir().expect("tempdir");
        let blobs = Arc::new(FsBlobStore::open(dir.path()).await.expect("blob store"));
        let store = Arc::new(MemoryJobStore::new());
        let service = JobService::new(
            store.clone(),
            blobs.clone(),
            queue,
            Arc::new(JobMetrics::new()),
            1024,
        );
        Harness {
            _dir: dir,
            blobs,
            store,
            service,
        }
    }

    fn pdf_upload() -> Upload {
        Upload {
            filename: "test.pdf".into(),
            content_type: Some(PDF_MEDIA_TYPE.into()),
            bytes: b"PDF".to_vec(),
        }
    }

    struct BrokenQueue;

    #[async_trait]
    impl JobQueue for BrokenQueue {
        async fn enqueue(&self, _id: &JobId) -> Result<(), QueueError> {
            Err(QueueError::Closed)
        }

        async fn dequeue(&self, _wait: Duration) -> Result<Option<JobId>, QueueError> {
            Err(QueueError::Closed)
        }

        async fn ack(&self, _id: &JobId) -> Result<(), QueueError> {
            Ok(())
        }

        async fn recover(&self) -> Result<usize, QueueError> {
            Ok(0)
        }
    }

    struct UnwritableStore;

    #[async_trait]
    impl JobStore for UnwritableStore {
        async fn create(&self, _record: &JobRecord) -> Result<(), StoreError> {
            Err(StoreError::Redis(redis::RedisError::from((
                redis::ErrorKind::IoError,
                "connection refused",
            ))))
        }

        async fn get(&self, _id: &JobId) -> Result<Option<JobRecord>, StoreError> {
            Ok(None)
        }

        async fn transition_from_pending(&self, _next: &JobRecord) -> Result<bool, StoreError> {
            Ok(false)
        }

        async fn delete(&self, _id: &JobId) -> Result<(), StoreError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn submit_records_pending_job_and_enqueues_it() {
        let queue = Arc::new(MemoryQueue::new());
        let harness = harness_with_queue(queue.clone()).await;

        let id = harness.service.submit(pdf_upload()).await.expect("submit");

        let record = harness.store.get(&id).await.expect("get").expect("record");
        let JobState::Pending { blob } = &record.state else {
            panic!("expected pending record, got {:?}", record.state);
        };
        assert!(harness.blobs.exists(blob).await.expect("exists"));
        assert_eq!(
            queue.dequeue(Duration::from_millis(10)).await.expect("dequeue"),
            Some(id.clone())
        );
        assert_eq!(
            harness.service.poll(&id).await.expect("poll"),
            PollStatus::Processing
        );
        assert_eq!(harness.service.metrics_snapshot().jobs_submitted, 1);
    }

    #[tokio::test]
    async fn rejected_upload_persists_nothing() {
        let harness = harness_with_queue(Arc::new(MemoryQueue::new())).await;
        let upload = Upload {
            bytes: vec![0; 2048],
            ..pdf_upload()
        };

        let err = harness.service.submit(upload).await.expect_err("too large");

        assert!(matches!(err, IngestError::FileTooLarge));
        assert!(harness.store.is_empty().await);
        assert_eq!(harness.service.metrics_snapshot().uploads_rejected, 1);
    }

    #[tokio::test]
    async fn enqueue_failure_rolls_back_record_and_blob() {
        let harness = harness_with_queue(Arc::new(BrokenQueue)).await;

        let err = harness.service.submit(pdf_upload()).await.expect_err("queue down");

        assert!(matches!(
            err,
            IngestError::StorageFailure(StorageError::Queue(_))
        ));
        assert!(harness.store.is_empty().await);
        let leftovers = std::fs::read_dir(harness.blobs.root())
            .expect("read dir")
            .count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn record_failure_removes_stored_blob_and_skips_queue() {
        let dir = tempfile::tempdir().expect("tempdir");
        let blobs = Arc::new(FsBlobStore::open(dir.path()).await.expect("blob store"));
        let queue = Arc::new(MemoryQueue::new());
        let service = JobService::new(
            Arc::new(UnwritableStore),
            blobs.clone(),
            queue.clone(),
            Arc::new(JobMetrics::new()),
            1024,
        );

        let err = service.submit(pdf_upload()).await.expect_err("store down");

        assert!(matches!(
            err,
            IngestError::StorageFailure(StorageError::Store(_))
        ));
        let leftovers = std::fs::read_dir(blobs.root()).expect("read dir").count();
        assert_eq!(leftovers, 0);
        assert_eq!(
            queue.dequeue(Duration::from_millis(5)).await.expect("dequeue"),
            None
        );
        assert_eq!(service.metrics_snapshot().jobs_submitted, 0);
    }

    #[tokio::test]
    async fn poll_reports_failures_as_prefixed_data() {
        let harness = harness_with_queue(Arc::new(MemoryQueue::new())).await;
        let id = harness.service.submit(pdf_upload()).await.expect("submit");
        let record = harness.store.get(&id).await.expect("get").expect("record");
        let failed = record.transitioned(JobState::Failed {
            error: "invalid file header".into(),
        });
        assert!(harness
            .store
            .transition_from_pending(&failed)
            .await
            .expect("transition"));

        let status = harness.service.poll(&id).await.expect("poll");
        assert_eq!(
            status,
            PollStatus::Ready("Error processing file: invalid file header".into())
        );
    }

    #[tokio::test]
    async fn unknown_id_is_not_found() {
        let harness = harness_with_queue(Arc::new(MemoryQueue::new())).await;
        let err = harness
            .service
            .poll(&JobId::from("random_id"))
            .await
            .expect_err("unknown");
        assert!(matches!(err, PollError::NotFound));
    }

    #[tokio::test]
    async fn concurrent_submits_create_independent_jobs() {
        let harness = harness_with_queue(Arc::new(MemoryQueue::new())).await;

        let (first, second) = tokio::join!(
            harness.service.submit(pdf_upload()),
            harness.service.submit(pdf_upload())
        );
        let first = first.expect("first submit");
        let second = second.expect("second submit");

        assert_ne!(first, second);
        assert_eq!(harness.store.len().await, 2);
    }
}
