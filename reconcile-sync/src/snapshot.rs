//! Write-once snapshot files.
//!
//! ## `write`: 4-step protocol
//!
//! 1. Translate the merged record to wire format.
//! 2. Serialize to canonical JSON.
//! 3. Create `<dir>/<entity_id>_<stamp>.json` with `create_new`; the open
//!    fails if the path exists, so an existing snapshot is never opened for
//!    writing. There is no separate existence check.
//! 4. Write, flush to disk. A failed write removes the half-written file.
//!
//! The receipt carries the SHA-256 digest of the merged record, so a
//! snapshot can be matched to the state it was written from.

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::PathBuf;

use reconcile_core::{EntityId, Record, Stamp};

use crate::error::{io_err, SyncError};
use crate::wire::WireFormat;

/// Where a snapshot landed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotReceipt {
    pub path: PathBuf,
    pub bytes: usize,
    /// Hex SHA-256 of the record's canonical form.
    pub digest: String,
}

impl SnapshotReceipt {
    /// Leading 12 hex digits, enough to tell states apart in progress output.
    pub fn short_digest(&self) -> &str {
        self.digest.get(..12).unwrap_or(&self.digest)
    }
}

pub struct SnapshotWriter<W> {
    dir: PathBuf,
    translator: W,
}

impl<W: WireFormat> SnapshotWriter<W> {
    pub fn new(dir: impl Into<PathBuf>, translator: W) -> Self {
        Self {
            dir: dir.into(),
            translator,
        }
    }

    /// `<dir>/<entity_id>_<stamp>.json`, rejecting components that are not
    /// plain file-name text.
    pub fn path_for(&self, entity_id: &EntityId, stamp: &Stamp) -> Result<PathBuf, SyncError> {
        check_component("entity id", &entity_id.0)?;
        check_component("stamp", &stamp.0)?;
        Ok(self.dir.join(format!("{entity_id}_{stamp}.json")))
    }

    /// Persist `record` as a new snapshot. Fails with
    /// [`SyncError::SnapshotCollision`] if the snapshot already exists.
    pub fn write(
        &self,
        entity_id: &EntityId,
        stamp: &Stamp,
        record: &Record,
    ) -> Result<SnapshotReceipt, SyncError> {
        let path = self.path_for(entity_id, stamp)?;
        let content = self.translator.to_wire(record).canonical_json();

        std::fs::create_dir_all(&self.dir).map_err(|e| io_err(&self.dir, e))?;

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(SyncError::SnapshotCollision { path });
            }
            Err(e) => return Err(io_err(&path, e)),
        };

        let written = file
            .write_all(content.as_bytes())
            .and_then(|()| file.sync_all());
        if let Err(e) = written {
            drop(file);
            let _ = std::fs::remove_file(&path);
            return Err(io_err(&path, e));
        }

        let digest = record.digest();
        tracing::info!("wrote snapshot: {} (sha256 {digest})", path.display());
        Ok(SnapshotReceipt {
            path,
            bytes: content.len(),
            digest,
        })
    }
}

fn check_component(what: &'static str, value: &str) -> Result<(), SyncError> {
    if value.is_empty() || value.contains(['/', '\\', '\0']) {
        return Err(SyncError::InvalidSnapshotName {
            what,
            value: value.to_string(),
        });
    }
    Ok(())
}
