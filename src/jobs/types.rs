//! Job identifiers, states, and persisted records.

use crate::blob::BlobHandle;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

/// Errors raised by job record stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Redis command failed or the connection was lost.
    #[error("Redis request failed: {0}")]
    Redis(#[from] redis::RedisError),
    /// A stored record could not be encoded or decoded.
    #[error("Malformed job record: {0}")]
    Serialization(#[from] serde_json::Error),
    /// A record was created for an identifier that already exists.
    #[error("Job {0} already exists")]
    Duplicate(JobId),
}

/// Opaque identifier issued for each uploaded file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Issue a fresh random identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Borrow the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for JobId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for JobId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle state of a job, persisted with an explicit `state` discriminant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum JobState {
    /// Upload stored, extraction not finished yet.
    Pending {
        /// Where the uploaded bytes wait for the worker.
        blob: BlobHandle,
    },
    /// Extraction succeeded.
    Done {
        /// Text extracted from every page, in page order.
        text: String,
    },
    /// Extraction failed.
    Failed {
        /// Error message reported by the extractor.
        error: String,
    },
}

impl JobState {
    /// Whether the job still waits for a worker.
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending { .. })
    }

    /// Short label used in logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending { .. } => "pending",
            Self::Done { .. } => "done",
            Self::Failed { .. } => "failed",
        }
    }
}

/// Stored value for one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    /// Identifier the record is keyed by.
    pub id: JobId,
    /// Current lifecycle state.
    #[serde(flatten)]
    pub state: JobState,
    /// RFC 3339 timestamp of the upload.
    pub created_at: String,
    /// RFC 3339 timestamp of the last transition.
    pub updated_at: String,
}

impl JobRecord {
    /// New record for a freshly stored upload.
    pub fn pending(id: JobId, blob: BlobHandle) -> Self {
        let now = current_timestamp_rfc3339();
        Self {
            id,
            state: JobState::Pending { blob },
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// Copy of this record moved to `state`, stamped with the current time.
    pub fn transitioned(&self, state: JobState) -> Self {
        Self {
            id: self.id.clone(),
            state,
            created_at: self.created_at.clone(),
            updated_at: current_timestamp_rfc3339(),
        }
    }
}

pub(crate) fn current_timestamp_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}
