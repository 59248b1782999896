//! Error types for reconcile-sync.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use reconcile_core::{EntityId, NormalizeError};

/// All errors that can arise while processing one request.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The remote source did not answer within the configured timeout.
    #[error("remote fetch for entity {entity_id} timed out after {after:?}")]
    FetchTimeout { entity_id: EntityId, after: Duration },

    /// The remote source answered with an error.
    #[error("remote fetch for entity {entity_id} failed: {message}")]
    Fetch { entity_id: EntityId, message: String },

    /// An earlier fetch for this entity failed during this run.
    #[error("remote fetch for entity {entity_id} already failed in this run: {message}")]
    FetchPreviouslyFailed { entity_id: EntityId, message: String },

    /// A directory-backed source could not read its file.
    #[error("record file {path} for entity {entity_id} is unreadable: {source}")]
    SourceFile {
        entity_id: EntityId,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The remote payload was JSON but not an object.
    #[error("remote record for entity {entity_id} is not a JSON object")]
    NotAnObject { entity_id: EntityId },

    /// The local file named by the request could not be read.
    #[error("local file {path} is unreadable: {source}")]
    LocalRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The local file is not a valid change document.
    #[error("local file {path} is not a valid change document: {source}")]
    LocalParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A local field could not be coerced to its declared type.
    #[error("normalization failed for {path}: {source}")]
    Normalize {
        path: PathBuf,
        #[source]
        source: NormalizeError,
    },

    /// The snapshot path already exists. The existing file is untouched.
    #[error("snapshot {path} already exists; refusing to overwrite")]
    SnapshotCollision { path: PathBuf },

    /// An id or stamp would not produce a plain file name.
    #[error("{what} {value:?} cannot be used in a snapshot file name")]
    InvalidSnapshotName { what: &'static str, value: String },

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Coarse classification used by the ingestion loop to pick a policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    RemoteFetch,
    LocalFile,
    Normalization,
    SnapshotCollision,
    Snapshot,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorKind::RemoteFetch => "remote fetch",
            ErrorKind::LocalFile => "local file",
            ErrorKind::Normalization => "normalization",
            ErrorKind::SnapshotCollision => "snapshot collision",
            ErrorKind::Snapshot => "snapshot write",
        };
        f.write_str(label)
    }
}

impl SyncError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::FetchTimeout { .. }
            | SyncError::Fetch { .. }
            | SyncError::FetchPreviouslyFailed { .. }
            | SyncError::SourceFile { .. }
            | SyncError::NotAnObject { .. } => ErrorKind::RemoteFetch,
            SyncError::LocalRead { .. } | SyncError::LocalParse { .. } => ErrorKind::LocalFile,
            SyncError::Normalize { .. } => ErrorKind::Normalization,
            SyncError::SnapshotCollision { .. } => ErrorKind::SnapshotCollision,
            SyncError::InvalidSnapshotName { .. } | SyncError::Io { .. } | SyncError::Json(_) => {
                ErrorKind::Snapshot
            }
        }
    }
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}
