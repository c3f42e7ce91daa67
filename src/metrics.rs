use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing job activity in this process.
#[derive(Default)]
pub struct JobMetrics {
    jobs_submitted: AtomicU64,
    uploads_rejected: AtomicU64,
    jobs_completed: AtomicU64,
    jobs_failed: AtomicU64,
}

impl JobMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an upload that was accepted and enqueued.
    pub fn record_submitted(&self) {
        self.jobs_submitted.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an upload refused by validation.
    pub fn record_rejected(&self) {
        self.uploads_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a job whose text was extracted successfully.
    pub fn record_completed(&self) {
        self.jobs_completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a job whose extraction failed.
    pub fn record_failed(&self) {
        self.jobs_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            jobs_submitted: self.jobs_submitted.load(Ordering::Relaxed),
            uploads_rejected: self.uploads_rejected.load(Ordering::Relaxed),
            jobs_completed: self.jobs_completed.load(Ordering::Relaxed),
            jobs_failed: self.jobs_failed.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of job counters used for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Uploads accepted since startup.
    pub jobs_submitted: u64,
    /// Uploads refused by validation since startup.
    pub uploads_rejected: u64,
    /// Jobs finished with extracted text by consumers in this process.
    pub jobs_completed: u64,
    /// Jobs finished with an extraction error by consumers in this process.
    pub jobs_failed: u64,
}
