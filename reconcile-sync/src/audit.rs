//! Audit-trail scanning: recover the request stream from a directory of
//! client-side audit snapshots.
//!
//! Audit files are named
//!
//! ```text
//! LatS_<seq>_<date>T<HH>_<MM>_<SS[.ffffff]>_<pid>_<action>_<type>_<side>.json
//! ```
//!
//! Runs of `_` count as one separator (extra underscores pad fields to equal
//! width). `done` entries carry no type and are given type `all`.
//!
//! Every (stamp, seq) must be described exactly twice, once from the `sync`
//! side and once from the `async` side, and both descriptions must agree on
//! everything but the side. The `sent`/`sync` descriptions, sorted by
//! (stamp, seq) per pid, become request lines for the ingestion loop.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime};
use serde_json::json;
use thiserror::Error;
use walkdir::WalkDir;

use crate::diff::value_diff;

/// Stamp format used in emitted request lines (colon-free).
pub const REQUEST_STAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S-%6f";

const PREFIX: &str = "LatS";
const PART_COUNT: usize = 9;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("{name}: {reason}")]
    Filename { name: String, reason: String },

    #[error("failed to walk {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("cannot resolve {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("stamp {stamp}, seq {seq}: {first} and {second} are both {side} descriptions")]
    SameSide {
        stamp: NaiveDateTime,
        seq: u64,
        side: Side,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("stamp {stamp}, seq {seq}: {first} does not match {second}\n{diff}")]
    Mismatch {
        stamp: NaiveDateTime,
        seq: u64,
        first: PathBuf,
        second: PathBuf,
        diff: String,
    },

    #[error("stamp {stamp}, seq {seq} recurs in {} and {extra}; more than a sync/async pair", preview(.existing))]
    Recurs {
        stamp: NaiveDateTime,
        seq: u64,
        existing: Vec<PathBuf>,
        extra: PathBuf,
    },

    #[error("stamp {stamp}, seq {seq} has {count} description(s); expected a sync/async pair")]
    Unpaired {
        stamp: NaiveDateTime,
        seq: u64,
        count: usize,
    },
}

fn preview(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn bad_name(name: &str, reason: impl Into<String>) -> AuditError {
    AuditError::Filename {
        name: name.to_string(),
        reason: reason.into(),
    }
}

// ---------------------------------------------------------------------------
// Filename tokens
// ---------------------------------------------------------------------------

/// Which cache the audited data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Side {
    /// Local state.
    Sync,
    /// Server state.
    Async,
}

/// What was happening to the data when it was audited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Action {
    Received,
    Sent,
    /// Navigated away; carries no data type.
    Done,
}

/// Which part of the record the audit covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DataType {
    Name,
    Service,
    /// Paired with [`Action::Done`].
    All,
}

macro_rules! token_enum {
    ($ty:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $text),+
                }
            }
        }

        impl FromStr for $ty {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($ty::$variant),)+
                    other => Err(format!(
                        "unknown {} {other:?}",
                        stringify!($ty).to_ascii_lowercase()
                    )),
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

token_enum!(Side { Sync => "sync", Async => "async" });
token_enum!(Action { Received => "rcvd", Sent => "sent", Done => "done" });
token_enum!(DataType { Name => "name", Service => "service", All => "all" });

/// One parsed audit file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEntry {
    pub seq: u64,
    pub stamp: NaiveDateTime,
    pub pid: u64,
    pub action: Action,
    pub data_type: DataType,
    pub side: Side,
    pub path: PathBuf,
    pub basename: String,
}

impl AuditEntry {
    /// Everything that must agree between the two sides of a pair.
    fn paired_attributes(&self) -> serde_json::Value {
        json!({
            "seq": self.seq,
            "stamp": self.stamp.to_string(),
            "pid": self.pid,
            "action": self.action.as_str(),
            "type": self.data_type.as_str(),
        })
    }

    /// Request line for the ingestion loop: `<pid>:<stamp>:<path>`.
    pub fn request_line(&self) -> String {
        format!(
            "{}:{}:{}",
            self.pid,
            self.stamp.format(REQUEST_STAMP_FORMAT),
            self.path.display()
        )
    }
}

/// Tokens parsed from an audit file name (no path information).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditTokens {
    pub seq: u64,
    pub stamp: NaiveDateTime,
    pub pid: u64,
    pub action: Action,
    pub data_type: DataType,
    pub side: Side,
}

/// Parse an audit file name. The conversions double as validation.
pub fn tokenize(name: &str) -> Result<AuditTokens, AuditError> {
    let Some(stem) = name.strip_suffix(".json") else {
        return Err(bad_name(name, "suffix is not .json"));
    };
    let mut parts: Vec<&str> = stem.split('_').filter(|p| !p.is_empty()).collect();
    if parts.len() >= 2 && parts[parts.len() - 2] == Action::Done.as_str() {
        parts.insert(parts.len() - 1, DataType::All.as_str());
    }
    if parts.len() != PART_COUNT {
        return Err(bad_name(
            name,
            format!("has {} parts, expected {PART_COUNT}", parts.len()),
        ));
    }
    if parts[0] != PREFIX {
        return Err(bad_name(
            name,
            format!("first part is {:?} rather than {PREFIX}", parts[0]),
        ));
    }

    let seq = parts[1]
        .parse::<u64>()
        .map_err(|_| bad_name(name, format!("sequence {:?} is not an integer", parts[1])))?;
    let stamp_text = parts[2..5].join(":");
    let stamp = parse_stamp(&stamp_text)
        .ok_or_else(|| bad_name(name, format!("stamp {stamp_text:?} is not ISO 8601")))?;
    let pid = parts[5]
        .parse::<u64>()
        .map_err(|_| bad_name(name, format!("pid {:?} is not an integer", parts[5])))?;
    let action = parts[6].parse::<Action>().map_err(|e| bad_name(name, e))?;
    let data_type = parts[7].parse::<DataType>().map_err(|e| bad_name(name, e))?;
    let side = parts[8].parse::<Side>().map_err(|e| bad_name(name, e))?;

    Ok(AuditTokens {
        seq,
        stamp,
        pid,
        action,
        data_type,
        side,
    })
}

fn parse_stamp(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(s).ok().map(|d| d.naive_utc()))
}

/// Tokenize the file name of `path` and attach its absolute path.
pub fn describe(path: &Path) -> Result<AuditEntry, AuditError> {
    let basename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tokens = tokenize(&basename)?;
    let path = std::path::absolute(path).map_err(|source| AuditError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(AuditEntry {
        seq: tokens.seq,
        stamp: tokens.stamp,
        pid: tokens.pid,
        action: tokens.action,
        data_type: tokens.data_type,
        side: tokens.side,
        path,
        basename,
    })
}

/// Describe every file below each of `roots`.
pub fn collect<P: AsRef<Path>>(roots: &[P]) -> Result<Vec<AuditEntry>, AuditError> {
    let mut entries = Vec::new();
    for (n, root) in roots.iter().enumerate() {
        let root = root.as_ref();
        tracing::info!("scanning directory {} / {} ({})", n + 1, roots.len(), root.display());
        for item in WalkDir::new(root).sort_by_file_name() {
            let item = item.map_err(|source| AuditError::Walk {
                path: root.to_path_buf(),
                source,
            })?;
            if !item.file_type().is_file() {
                continue;
            }
            entries.push(describe(item.path())?);
        }
        tracing::debug!("{} audit file(s) described so far", entries.len());
    }
    Ok(entries)
}

// ---------------------------------------------------------------------------
// Index
// ---------------------------------------------------------------------------

/// Verified audit entries, grouped by pid and sorted by (stamp, seq).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditIndex {
    pub by_pid: BTreeMap<u64, Vec<AuditEntry>>,
    pub stamps: usize,
    /// Stamps that carry more than one sequence number.
    pub multi_sequence_stamps: usize,
    /// Paths of every entry belonging to a multi-sequence stamp.
    pub multi_sequence_paths: Vec<PathBuf>,
}

impl AuditIndex {
    /// Index and verify `entries`.
    pub fn build(entries: Vec<AuditEntry>) -> Result<Self, AuditError> {
        let mut stamps: BTreeMap<NaiveDateTime, BTreeMap<u64, Vec<AuditEntry>>> = BTreeMap::new();
        for entry in entries {
            let pairs = stamps
                .entry(entry.stamp)
                .or_default()
                .entry(entry.seq)
                .or_default();
            match pairs.as_slice() {
                [] => {}
                [existing] => check_pairing(existing, &entry)?,
                existing => {
                    return Err(AuditError::Recurs {
                        stamp: entry.stamp,
                        seq: entry.seq,
                        existing: existing.iter().map(|e| e.path.clone()).collect(),
                        extra: entry.path,
                    })
                }
            }
            pairs.push(entry);
        }

        let mut index = AuditIndex {
            stamps: stamps.len(),
            ..Default::default()
        };
        for (stamp, seqs) in stamps {
            if seqs.len() != 1 {
                index.multi_sequence_stamps += 1;
                index
                    .multi_sequence_paths
                    .extend(seqs.values().flatten().map(|e| e.path.clone()));
            }
            for (seq, pair) in seqs {
                if pair.len() != 2 {
                    return Err(AuditError::Unpaired {
                        stamp,
                        seq,
                        count: pair.len(),
                    });
                }
                for entry in pair {
                    index.by_pid.entry(entry.pid).or_default().push(entry);
                }
            }
        }
        for list in index.by_pid.values_mut() {
            list.sort_by(|a, b| (a.stamp, a.seq).cmp(&(b.stamp, b.seq)));
        }
        Ok(index)
    }

    pub fn pid_count(&self) -> usize {
        self.by_pid.len()
    }

    /// Sync-side `sent` entries in request-line form.
    pub fn sync_sends(&self) -> Vec<String> {
        self.by_pid
            .values()
            .flatten()
            .filter(|e| e.action == Action::Sent && e.side == Side::Sync)
            .map(AuditEntry::request_line)
            .collect()
    }
}

fn check_pairing(a: &AuditEntry, b: &AuditEntry) -> Result<(), AuditError> {
    if a.side == b.side {
        return Err(AuditError::SameSide {
            stamp: a.stamp,
            seq: a.seq,
            side: a.side,
            first: a.path.clone(),
            second: b.path.clone(),
        });
    }
    let (left, right) = (a.paired_attributes(), b.paired_attributes());
    if left != right {
        return Err(AuditError::Mismatch {
            stamp: a.stamp,
            seq: a.seq,
            first: a.path.clone(),
            second: b.path.clone(),
            diff: value_diff(&left, &right, &a.basename, &b.basename),
        });
    }
    Ok(())
}

/// Walk `roots`, verify the trail and build the index.
pub fn scan<P: AsRef<Path>>(roots: &[P]) -> Result<AuditIndex, AuditError> {
    AuditIndex::build(collect(roots)?)
}
