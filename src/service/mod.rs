//! Job lifecycle: ingest validation, persistence, enqueueing, and polling.

mod jobs;
pub mod types;
pub mod validate;

pub use jobs::{FAILURE_PREFIX, JobApi, JobService};
pub use types::{IngestError, PollError, PollStatus, StorageError, Upload};
pub use validate::{PDF_MEDIA_TYPE, validate_upload};
