//! Error types for reconcile-core.

use std::path::PathBuf;

use serde_json::Value;
use thiserror::Error;

/// Errors from configuration loading and other core I/O.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Underlying I/O failure, with the path involved.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML parse error on load; includes file path and line context from serde_yaml.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// The configuration parsed but is not usable.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Convenience constructor for [`CoreError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> CoreError {
    CoreError::Io {
        path: path.into(),
        source,
    }
}

/// An input line that does not split into exactly three fields.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed request line: expected 3 fields separated by {delimiter:?}, found {found}")]
pub struct MalformedInput {
    pub delimiter: char,
    pub found: usize,
}

/// A field value that cannot be brought into its declared shape.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NormalizeError {
    /// The value at `path` cannot be coerced to the declared field type.
    #[error("field `{path}`: cannot coerce {value} to {expected}")]
    Field {
        path: String,
        value: Value,
        expected: String,
    },

    /// A nested table structure does not have the expected shape.
    #[error("`{path}`: {reason}")]
    Shape { path: String, reason: String },
}

impl NormalizeError {
    /// Dotted location of the offending value.
    pub fn path(&self) -> &str {
        match self {
            NormalizeError::Field { path, .. } | NormalizeError::Shape { path, .. } => path,
        }
    }
}
