//! Reconcile core library: record values, request parsing, field schemas,
//! normalization and configuration.
//!
//! Public API surface:
//! - [`record`]: owned [`Record`] / [`WireRecord`] values with canonical JSON
//! - [`types`]: newtypes and the per-line [`Request`]
//! - [`schema`]: [`FieldType`] and [`Schema`]
//! - [`normalize`]: coerce record fields to their declared types
//! - [`config`]: YAML configuration
//! - [`error`]: [`CoreError`], [`NormalizeError`], [`MalformedInput`]

pub mod config;
pub mod error;
pub mod normalize;
pub mod record;
pub mod schema;
pub mod types;

pub use config::{Config, ErrorPolicy};
pub use error::{CoreError, MalformedInput, NormalizeError};
pub use record::{Record, WireRecord};
pub use schema::{FieldType, Schema};
pub use types::{EntityId, Request, Stamp};
