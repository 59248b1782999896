//! YAML configuration.
//!
//! # Location
//!
//! ```text
//! <config_dir>/reconcile/config.yaml   (e.g. ~/.config/reconcile/config.yaml)
//! ```
//!
//! Every section is optional; omitted sections take their defaults. A missing
//! default file is not an error, an explicitly named one is.
//!
//! ```yaml
//! input:
//!   delimiter: ":"
//! output:
//!   dir: snapshots
//! source:
//!   timeout_secs: 30
//!   http:
//!     base_url: https://api.example.org/development
//!     token_env: RECONCILE_API_TOKEN
//! wire:
//!   rename: { services: service }
//!   omit: [internal_notes]
//! schemas:
//!   person:
//!     birth_date: { type: date }
//! on_error: skip
//! ```
//!
//! # API pattern
//!
//! As elsewhere: `load_at(path)` takes an explicit path and is what tests
//! use; `load()` derives the default path from `dirs::config_dir()`.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{io_err, CoreError};
use crate::schema::Schema;
use crate::types::DEFAULT_DELIMITER;

/// What the ingestion loop does after a per-request failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ErrorPolicy {
    /// Report the failed request and continue with the next line.
    #[default]
    Skip,
    /// Stop the run at the first failed request.
    Halt,
}

impl fmt::Display for ErrorPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorPolicy::Skip => write!(f, "skip"),
            ErrorPolicy::Halt => write!(f, "halt"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InputConfig {
    /// Single-character separator between request fields.
    pub delimiter: char,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            delimiter: DEFAULT_DELIMITER,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    /// Directory snapshots are created in.
    pub dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
        }
    }
}

/// Settings for the HTTP record source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HttpSourceConfig {
    pub base_url: String,
    #[serde(default = "default_http_path")]
    pub path: String,
    #[serde(default = "default_record_type")]
    pub record_type: String,
    #[serde(default = "default_type_param")]
    pub type_param: String,
    #[serde(default = "default_id_param")]
    pub id_param: String,
    /// Name of an environment variable holding a bearer token.
    #[serde(default)]
    pub token_env: Option<String>,
}

impl HttpSourceConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            path: default_http_path(),
            record_type: default_record_type(),
            type_param: default_type_param(),
            id_param: default_id_param(),
            token_env: None,
        }
    }
}

fn default_http_path() -> String {
    "person".to_string()
}

fn default_record_type() -> String {
    "rating".to_string()
}

fn default_type_param() -> String {
    "sailorType".to_string()
}

fn default_id_param() -> String {
    "nameId".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SourceConfig {
    /// Remote fetch timeout in seconds; `0` waits forever.
    pub timeout_secs: u64,
    pub http: Option<HttpSourceConfig>,
    /// Directory of `<entity_id>.json` files standing in for the remote.
    pub directory: Option<PathBuf>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            http: None,
            directory: None,
        }
    }
}

impl SourceConfig {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

/// Top-level key renames and removals applied when translating to wire format.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WireConfig {
    pub rename: BTreeMap<String, String>,
    pub omit: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchemaConfig {
    pub person: Schema,
    pub service: Schema,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            person: Schema::person(),
            service: Schema::service(),
        }
    }
}

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub input: InputConfig,
    pub output: OutputConfig,
    pub source: SourceConfig,
    pub wire: WireConfig,
    pub schemas: SchemaConfig,
    pub on_error: ErrorPolicy,
}

/// `<config_dir>/reconcile/config.yaml`, if the platform has a config dir.
pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("reconcile").join("config.yaml"))
}

impl Config {
    /// Load from an explicit path. The file must exist.
    pub fn load_at(path: &Path) -> Result<Self, CoreError> {
        let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
        serde_yaml::from_str(&contents).map_err(|e| CoreError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Load from `path` when it exists, otherwise return defaults.
    pub fn load_or_default_at(path: &Path) -> Result<Self, CoreError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_at(path)
    }

    /// Load from [`default_path`], falling back to defaults.
    pub fn load() -> Result<Self, CoreError> {
        match default_path() {
            Some(path) => Self::load_or_default_at(&path),
            None => Ok(Self::default()),
        }
    }

    /// Check the settings the ingestion loop relies on.
    pub fn validate(&self) -> Result<(), CoreError> {
        let d = self.input.delimiter;
        if d.is_whitespace() || d == '/' || d == '\\' {
            return Err(CoreError::InvalidConfig(format!(
                "delimiter {d:?} cannot be whitespace or a path separator"
            )));
        }
        match (&self.source.http, &self.source.directory) {
            (Some(_), Some(_)) => Err(CoreError::InvalidConfig(
                "configure either source.http or source.directory, not both".into(),
            )),
            (None, None) => Err(CoreError::InvalidConfig(
                "no record source configured (source.http or source.directory)".into(),
            )),
            (Some(http), None) if http.base_url.trim().is_empty() => Err(
                CoreError::InvalidConfig("source.http.base_url is empty".into()),
            ),
            _ => Ok(()),
        }
    }
}
