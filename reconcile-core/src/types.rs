//! Domain newtypes and the per-line change request.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::MalformedInput;

/// Default separator between the three request fields.
pub const DEFAULT_DELIMITER: char = ':';

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Identifier of the entity a request refers to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub String);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for EntityId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Caller-supplied version marker distinguishing snapshots of one entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Stamp(pub String);

impl fmt::Display for Stamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for Stamp {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Stamp {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// One change request: which entity, which stamp, and where its local data lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub entity_id: EntityId,
    pub stamp: Stamp,
    pub local_path: PathBuf,
}

impl Request {
    /// Split `line` on `delimiter` into exactly three fields.
    ///
    /// A trailing `\r` is ignored so CRLF input parses the same as LF. Any
    /// other field count, including a blank line, is [`MalformedInput`].
    pub fn parse(line: &str, delimiter: char) -> Result<Self, MalformedInput> {
        let line = line.strip_suffix('\r').unwrap_or(line);
        let parts: Vec<&str> = line.split(delimiter).collect();
        let [id, stamp, path] = parts.as_slice() else {
            return Err(MalformedInput {
                delimiter,
                found: parts.len(),
            });
        };
        Ok(Self {
            entity_id: EntityId::from(*id),
            stamp: Stamp::from(*stamp),
            local_path: PathBuf::from(*path),
        })
    }

    /// Render back into input-line form.
    pub fn to_line(&self, delimiter: char) -> String {
        format!(
            "{}{delimiter}{}{delimiter}{}",
            self.entity_id,
            self.stamp,
            self.local_path.display()
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
