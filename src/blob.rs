//! Temporary storage for uploaded PDFs awaiting extraction.
//!
//! Every pending job owns exactly one blob, named `<job id>.pdf` inside the upload directory.
//! Blobs are written through a `.part` file and renamed so a consumer never observes a
//! half-written upload.

use crate::jobs::JobId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised by blob storage backends.
#[derive(Debug, Error)]
pub enum BlobError {
    /// Filesystem operation failed.
    #[error("blob i/o failed for {path}: {source}")]
    Io {
        /// Path the operation targeted.
        path: PathBuf,
        /// Underlying filesystem error.
        #[source]
        source: std::io::Error,
    },
}

impl BlobError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Location of a stored blob, persisted inside pending job records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlobHandle(PathBuf);

impl BlobHandle {
    /// Wrap an existing path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    /// Filesystem path of the blob.
    pub fn path(&self) -> &Path {
        &self.0
    }
}

impl fmt::Display for BlobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// Storage for raw upload bytes keyed by job identifier.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Persist the bytes for `id` and return the handle to record in the job.
    async fn put(&self, id: &JobId, bytes: &[u8]) -> Result<BlobHandle, BlobError>;

    /// Read the full contents of a blob.
    async fn load(&self, handle: &BlobHandle) -> Result<Vec<u8>, BlobError>;

    /// Whether the blob is still present.
    async fn exists(&self, handle: &BlobHandle) -> Result<bool, BlobError>;

    /// Remove a blob. Removing a blob that is already gone succeeds.
    async fn delete(&self, handle: &BlobHandle) -> Result<(), BlobError>;
}

/// Blob store backed by a local directory.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    /// Open (and create if needed) the upload directory.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, BlobError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|err| BlobError::io(&root, err))?;
        tracing::debug!(root = %root.display(), "Upload directory ready");
        Ok(Self { root })
    }

    /// Directory blobs are written to.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, id: &JobId) -> PathBuf {
        self.root.join(format!("{id}.pdf"))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, id: &JobId, bytes: &[u8]) -> Result<BlobHandle, BlobError> {
        let path = self.path_for(id);
        let staging = path.with_extension("pdf.part");
        tokio::fs::write(&staging, bytes)
            .await
            .map_err(|err| BlobError::io(&staging, err))?;
        if let Err(err) = tokio::fs::rename(&staging, &path).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(BlobError::io(&path, err));
        }
        tracing::debug!(file_id = %id, path = %path.display(), size = bytes.len(), "Blob stored");
        Ok(BlobHandle(path))
    }

    async fn load(&self, handle: &BlobHandle) -> Result<Vec<u8>, BlobError> {
        tokio::fs::read(handle.path())
            .await
            .map_err(|err| BlobError::io(handle.path(), err))
    }

    async fn exists(&self, handle: &BlobHandle) -> Result<bool, BlobError> {
        tokio::fs::try_exists(handle.path())
            .await
            .map_err(|err| BlobError::io(handle.path(), err))
    }

    async fn delete(&self, handle: &BlobHandle) -> Result<(), BlobError> {
        match tokio::fs::remove_file(handle.path()).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(BlobError::io(handle.path(), err)),
        }
    }
}
