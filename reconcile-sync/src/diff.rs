//! Unified diffs of record states, for `--show-diff` and `reconcile diff`.

use std::path::Path;

use serde_json::Value;
use similar::TextDiff;

use reconcile_core::record::canonical_pretty;

use crate::error::{io_err, SyncError};

/// Unified diff of the pretty canonical JSON of two values.
///
/// Empty when both sides have the same canonical form.
pub fn value_diff(before: &Value, after: &Value, old_header: &str, new_header: &str) -> String {
    let old = with_trailing_newline(canonical_pretty(before));
    let new = with_trailing_newline(canonical_pretty(after));
    if old == new {
        return String::new();
    }
    TextDiff::from_lines(&old, &new)
        .unified_diff()
        .header(old_header, new_header)
        .context_radius(3)
        .to_string()
}

/// Diff two JSON files (typically snapshots), labelled by their paths.
pub fn file_diff(old: &Path, new: &Path) -> Result<String, SyncError> {
    let before = read_json(old)?;
    let after = read_json(new)?;
    Ok(value_diff(
        &before,
        &after,
        &format!("a/{}", old.display()),
        &format!("b/{}", new.display()),
    ))
}

fn read_json(path: &Path) -> Result<Value, SyncError> {
    let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    Ok(serde_json::from_str(&contents)?)
}

fn with_trailing_newline(mut s: String) -> String {
    s.push('\n');
    s
}
