//! Request, response, and error types for the job service.

use crate::{blob::BlobError, jobs::StoreError, queue::QueueError};
use thiserror::Error;

/// One uploaded file as received from a client.
#[derive(Debug, Clone)]
pub struct Upload {
    /// Client-supplied file name.
    pub filename: String,
    /// Declared media type, if the client sent one.
    pub content_type: Option<String>,
    /// Raw file contents.
    pub bytes: Vec<u8>,
}

/// Dependency failure while persisting an upload.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Writing the upload to the blob store failed.
    #[error(transparent)]
    Blob(#[from] BlobError),
    /// Writing the job record failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Enqueuing the extraction job failed.
    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// Errors returned when an upload cannot be accepted.
///
/// The display strings of the validation variants are the exact messages returned to clients.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Declared media type is not `application/pdf`.
    #[error("The uploaded file is not a valid PDF file.")]
    InvalidFileType,
    /// File name does not end with `.pdf`.
    #[error("The uploaded file does not have a .pdf extension.")]
    InvalidFileExtension,
    /// Upload is larger than the configured limit.
    #[error("The uploaded file exceeds the size limit.")]
    FileTooLarge,
    /// A persistence step failed; nothing was left visible to pollers.
    #[error("Failed to process the uploaded file: {0}")]
    StorageFailure(#[from] StorageError),
}

/// Errors returned when polling a job.
#[derive(Debug, Error)]
pub enum PollError {
    /// No job exists for the identifier.
    #[error("File not found")]
    NotFound,
    /// The job store could not be read.
    #[error("Failed to fetch file data: {0}")]
    StorageUnavailable(#[from] StoreError),
}

/// Client-facing view of a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStatus {
    /// Extraction has not finished.
    Processing,
    /// Extraction finished; carries the text, or the recorded failure message.
    Ready(String),
}
