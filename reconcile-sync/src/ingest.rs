//! Line-driven ingestion loop.
//!
//! The loop is either running or terminated. While running it handles one
//! request line completely (lookup, reconcile, snapshot, cache update)
//! before reading the next, so a repeated entity id always reconciles
//! against the state written for its previous line.
//!
//! Termination rules:
//! - end of input → [`Termination::Completed`] (or
//!   [`Termination::CompletedWithFailures`] if requests were skipped)
//! - a line without exactly three fields → [`Termination::MalformedInput`];
//!   that line and everything after it are left unprocessed
//! - a snapshot path that already exists → [`Termination::SnapshotCollision`]
//! - any other request failure → skipped, or [`Termination::Halted`] under
//!   [`ErrorPolicy::Halt`]
//! - a read error on the input stream → [`Termination::InputUnreadable`]
//!
//! A failed request never updates the cache.

use std::fmt;
use std::io::Write;
use std::path::PathBuf;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use reconcile_core::types::DEFAULT_DELIMITER;
use reconcile_core::{Config, ErrorPolicy, MalformedInput, Request};

use crate::cache::{CacheStats, EntityCache};
use crate::diff::value_diff;
use crate::error::{ErrorKind, SyncError};
use crate::merge::Reconciler;
use crate::snapshot::{SnapshotReceipt, SnapshotWriter};
use crate::source::RecordSource;
use crate::wire::WireFormat;

/// Process exit codes, one per way a run can end.
pub mod exit_code {
    pub const OK: i32 = 0;
    pub const MALFORMED_INPUT: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const SNAPSHOT_COLLISION: i32 = 3;
    pub const REQUEST_FAILED: i32 = 4;
    pub const COMPLETED_WITH_FAILURES: i32 = 5;
    pub const INPUT_UNREADABLE: i32 = 6;
    /// A local change document failed to load or normalize outside a run.
    pub const INVALID_DOCUMENT: i32 = 7;
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Why the loop stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    Completed,
    CompletedWithFailures { failed: usize },
    MalformedInput { line: usize, error: MalformedInput },
    SnapshotCollision { line: usize, path: PathBuf },
    Halted { line: usize, kind: ErrorKind },
    InputUnreadable { line: usize, message: String },
}

impl Termination {
    pub fn exit_code(&self) -> i32 {
        match self {
            Termination::Completed => exit_code::OK,
            Termination::CompletedWithFailures { .. } => exit_code::COMPLETED_WITH_FAILURES,
            Termination::MalformedInput { .. } => exit_code::MALFORMED_INPUT,
            Termination::SnapshotCollision { .. } => exit_code::SNAPSHOT_COLLISION,
            Termination::Halted { .. } => exit_code::REQUEST_FAILED,
            Termination::InputUnreadable { .. } => exit_code::INPUT_UNREADABLE,
        }
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::Completed => write!(f, "completed"),
            Termination::CompletedWithFailures { failed } => {
                write!(f, "completed with {failed} failed request(s)")
            }
            Termination::MalformedInput { line, error } => write!(f, "line {line}: {error}"),
            Termination::SnapshotCollision { line, path } => write!(
                f,
                "line {line}: snapshot {} already exists; stopping",
                path.display()
            ),
            Termination::Halted { line, kind } => {
                write!(f, "line {line}: stopping after {kind} failure")
            }
            Termination::InputUnreadable { line, message } => {
                write!(f, "input unreadable at line {line}: {message}")
            }
        }
    }
}

/// A request that could not be processed, with enough context to re-run it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedRequest {
    pub line: usize,
    pub request: Request,
    pub kind: ErrorKind,
    pub message: String,
}

/// Result of one successfully processed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestOutcome {
    pub receipt: SnapshotReceipt,
    pub changed: bool,
}

/// Summary of a whole run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub lines: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub snapshots: Vec<SnapshotReceipt>,
    pub failures: Vec<FailedRequest>,
    pub cache: CacheStats,
    pub termination: Termination,
}

impl RunReport {
    pub fn exit_code(&self) -> i32 {
        self.termination.exit_code()
    }
}

// ---------------------------------------------------------------------------
// Ingestor
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestOptions {
    pub delimiter: char,
    pub on_error: ErrorPolicy,
    /// Print a unified diff of prior → merged state for changed requests.
    pub show_diff: bool,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            delimiter: DEFAULT_DELIMITER,
            on_error: ErrorPolicy::default(),
            show_diff: false,
        }
    }
}

pub struct Ingestor<S, W> {
    cache: EntityCache<S>,
    reconciler: Reconciler,
    writer: SnapshotWriter<W>,
    options: IngestOptions,
}

impl<S: RecordSource, W: WireFormat> Ingestor<S, W> {
    pub fn new(
        cache: EntityCache<S>,
        reconciler: Reconciler,
        writer: SnapshotWriter<W>,
        options: IngestOptions,
    ) -> Self {
        Self {
            cache,
            reconciler,
            writer,
            options,
        }
    }

    /// Wire up every stage from configuration.
    pub fn from_config(source: S, translator: W, config: &Config) -> Self {
        Self::new(
            EntityCache::new(source, config.source.timeout()),
            Reconciler::from_config(&config.schemas),
            SnapshotWriter::new(config.output.dir.clone(), translator),
            IngestOptions {
                delimiter: config.input.delimiter,
                on_error: config.on_error,
                show_diff: false,
            },
        )
    }

    pub fn with_show_diff(mut self, show_diff: bool) -> Self {
        self.options.show_diff = show_diff;
        self
    }

    pub fn cache(&self) -> &EntityCache<S> {
        &self.cache
    }

    /// Consume request lines from `input` until the loop terminates.
    ///
    /// Human-readable progress goes to `progress`; diagnostics go through
    /// `tracing`.
    pub async fn run<R, P>(&mut self, input: R, progress: &mut P) -> RunReport
    where
        R: AsyncBufRead + Unpin,
        P: Write,
    {
        let mut lines = input.lines();
        let mut line_no = 0;
        let mut updated = 0;
        let mut unchanged = 0;
        let mut snapshots = Vec::new();
        let mut failures: Vec<FailedRequest> = Vec::new();

        let termination = loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) if failures.is_empty() => break Termination::Completed,
                Ok(None) => {
                    break Termination::CompletedWithFailures {
                        failed: failures.len(),
                    }
                }
                Err(e) => {
                    break Termination::InputUnreadable {
                        line: line_no + 1,
                        message: e.to_string(),
                    }
                }
            };
            line_no += 1;

            let request = match Request::parse(&line, self.options.delimiter) {
                Ok(request) => request,
                Err(error) => {
                    tracing::error!("line {line_no}: {error}");
                    break Termination::MalformedInput {
                        line: line_no,
                        error,
                    };
                }
            };

            emit(
                progress,
                format_args!(
                    "Processing {} {} {}",
                    request.entity_id,
                    request.stamp,
                    request.local_path.display()
                ),
            );

            match self.process(&request, progress).await {
                Ok(outcome) => {
                    if outcome.changed {
                        updated += 1;
                    } else {
                        unchanged += 1;
                    }
                    snapshots.push(outcome.receipt);
                }
                Err(err) => {
                    let kind = err.kind();
                    emit(progress, format_args!("  Failed ({kind}): {err}"));
                    tracing::warn!(
                        "line {line_no}: {kind} failure for entity {} stamp {}: {err}",
                        request.entity_id,
                        request.stamp
                    );
                    let collision = match &err {
                        SyncError::SnapshotCollision { path } => Some(path.clone()),
                        _ => None,
                    };
                    failures.push(FailedRequest {
                        line: line_no,
                        request,
                        kind,
                        message: err.to_string(),
                    });

                    if let Some(path) = collision {
                        break Termination::SnapshotCollision {
                            line: line_no,
                            path,
                        };
                    }
                    if self.options.on_error == ErrorPolicy::Halt {
                        break Termination::Halted {
                            line: line_no,
                            kind,
                        };
                    }
                }
            }
        };

        let report = RunReport {
            lines: line_no,
            updated,
            unchanged,
            snapshots,
            failures,
            cache: self.cache.stats(),
            termination,
        };
        tracing::info!(
            "run finished after {} line(s): {} ({} updated, {} no-op, {} failed)",
            report.lines,
            report.termination,
            report.updated,
            report.unchanged,
            report.failures.len()
        );
        report
    }

    /// Handle one parsed request end to end.
    pub async fn process<P: Write>(
        &mut self,
        request: &Request,
        progress: &mut P,
    ) -> Result<RequestOutcome, SyncError> {
        let id = &request.entity_id;

        let lookup = self.cache.get_or_fetch(id).await?;
        if lookup.is_hit() {
            emit(progress, format_args!("  Retrieved {id} from previous sight"));
        } else {
            emit(progress, format_args!("  Fetched {id} from remote source"));
        }

        let reconciliation =
            self.reconciler
                .reconcile(lookup.into_record(), self.cache.peek(id), &request.local_path)?;

        if reconciliation.changed {
            emit(progress, format_args!("  Updated"));
            if self.options.show_diff {
                let prior = self
                    .cache
                    .peek(id)
                    .map(|r| r.clone().into_value())
                    .unwrap_or_default();
                let diff = value_diff(
                    &prior,
                    &reconciliation.merged.clone().into_value(),
                    &format!("a/{id}"),
                    &format!("b/{id}_{}", request.stamp),
                );
                emit(progress, format_args!("{}", diff.trim_end()));
            }
        } else {
            emit(progress, format_args!("  Updated (NOP)"));
        }

        // No-op updates are persisted too, so every audit event has a snapshot.
        let receipt = self
            .writer
            .write(id, &request.stamp, &reconciliation.merged)?;
        emit(
            progress,
            format_args!(
                "  Wrote {} (sha256 {})",
                receipt.path.display(),
                receipt.short_digest()
            ),
        );
        tracing::debug!(
            "{id}: state {} -> {}",
            reconciliation.previous_digest.as_deref().unwrap_or("none"),
            reconciliation.digest
        );

        self.cache.update(id.clone(), reconciliation.merged);

        Ok(RequestOutcome {
            receipt,
            changed: reconciliation.changed,
        })
    }
}

fn emit<P: Write>(progress: &mut P, line: fmt::Arguments<'_>) {
    if let Err(e) = writeln!(progress, "{line}") {
        tracing::warn!("progress output failed: {e}");
    }
}
