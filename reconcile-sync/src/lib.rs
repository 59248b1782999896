//! # reconcile-sync
//!
//! Reconciliation pipeline: memoized remote lookup, merge and change
//! detection, write-once snapshots, and the line-driven ingestion loop.
//!
//! Build an [`Ingestor`] from a [`RecordSource`], a [`WireFormat`] and a
//! [`SnapshotWriter`], then feed it request lines with [`Ingestor::run`].

pub mod audit;
pub mod cache;
pub mod diff;
pub mod error;
pub mod ingest;
pub mod merge;
pub mod snapshot;
pub mod source;
pub mod wire;

pub use cache::{EntityCache, Lookup};
pub use error::{ErrorKind, SyncError};
pub use ingest::{Ingestor, RunReport, Termination};
pub use merge::{Reconciler, Reconciliation};
pub use snapshot::{SnapshotReceipt, SnapshotWriter};
pub use source::{AnySource, DirectorySource, HttpSource, RecordSource};
pub use wire::{ApiTranslator, WireFormat};
