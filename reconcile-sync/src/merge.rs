//! Merge & change detection.
//!
//! ## `reconcile`: 4 steps
//!
//! 1. Read and parse the local change document (`name` + `service`).
//! 2. Normalize `name` by the person schema, then every row of every
//!    `service.services[*].records` table by the service schema.
//! 3. Overlay: `name` and `services` from the local document replace the
//!    same keys of the base record; every other key passes through.
//! 4. `changed` = canonical JSON of the merge differs from the prior state.

use std::path::Path;

use serde::Deserialize;
use serde_json::{Map, Value};

use reconcile_core::config::SchemaConfig;
use reconcile_core::normalize::{normalize, normalize_tables};
use reconcile_core::{NormalizeError, Record, Schema};

use crate::error::SyncError;

/// Key the normalized identity block is stored under.
pub const NAME_KEY: &str = "name";
/// Key the normalized service tables are stored under.
pub const SERVICES_KEY: &str = "services";

#[derive(Debug, Deserialize)]
struct LocalDocument {
    name: Map<String, Value>,
    service: Map<String, Value>,
}

/// The local region of a record after normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalData {
    pub name: Map<String, Value>,
    pub services: Value,
    /// Service rows visited during normalization.
    pub rows: usize,
}

impl LocalData {
    /// The normalized document in its on-disk shape.
    pub fn to_document(&self) -> Value {
        let mut doc = Map::new();
        doc.insert(NAME_KEY.to_string(), Value::Object(self.name.clone()));
        doc.insert("service".to_string(), self.services.clone());
        Value::Object(doc)
    }
}

/// Outcome of reconciling one request.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    pub merged: Record,
    /// False when the merge is identical to the prior state (a no-op update).
    pub changed: bool,
    pub digest: String,
    pub previous_digest: Option<String>,
    pub rows: usize,
}

/// Normalizes local documents and merges them onto remote records.
#[derive(Debug, Clone)]
pub struct Reconciler {
    person: Schema,
    service: Schema,
}

impl Reconciler {
    pub fn new(person: Schema, service: Schema) -> Self {
        Self { person, service }
    }

    pub fn from_config(schemas: &SchemaConfig) -> Self {
        Self::new(schemas.person.clone(), schemas.service.clone())
    }

    /// Steps 1–2: read, parse and normalize a local change document.
    pub fn load_local(&self, path: &Path) -> Result<LocalData, SyncError> {
        let contents = std::fs::read_to_string(path).map_err(|source| SyncError::LocalRead {
            path: path.to_path_buf(),
            source,
        })?;
        let doc: LocalDocument =
            serde_json::from_str(&contents).map_err(|source| SyncError::LocalParse {
                path: path.to_path_buf(),
                source,
            })?;

        let normalize_err = |source: NormalizeError| SyncError::Normalize {
            path: path.to_path_buf(),
            source,
        };

        let mut name = doc.name;
        normalize(&mut name, &self.person).map_err(|e| normalize_err(prefixed(NAME_KEY, e)))?;

        let mut services = Value::Object(doc.service);
        let rows = normalize_tables(&mut services, &self.service, "service").map_err(normalize_err)?;

        Ok(LocalData {
            name,
            services,
            rows,
        })
    }

    /// Step 3: overlay the local region onto `base`.
    pub fn merge(base: Record, local: LocalData) -> Record {
        let mut merged = base;
        merged.insert(NAME_KEY, Value::Object(local.name));
        merged.insert(SERVICES_KEY, local.services);
        merged
    }

    /// Run all four steps for one request.
    ///
    /// `base` is the record the merge starts from (the cached or freshly
    /// fetched state); `prior` is the state stored for the entity before this
    /// request, which `changed` is measured against.
    pub fn reconcile(
        &self,
        base: Record,
        prior: Option<&Record>,
        local_path: &Path,
    ) -> Result<Reconciliation, SyncError> {
        let local = self.load_local(local_path)?;
        let rows = local.rows;
        let merged = Self::merge(base, local);

        let canonical = merged.canonical_json();
        let changed = prior.map_or(true, |p| p.canonical_json() != canonical);
        tracing::debug!(
            "reconciled {} ({} service rows, changed: {changed})",
            local_path.display(),
            rows
        );

        Ok(Reconciliation {
            digest: merged.digest(),
            previous_digest: prior.map(Record::digest),
            merged,
            changed,
            rows,
        })
    }
}

fn prefixed(prefix: &str, err: NormalizeError) -> NormalizeError {
    match err {
        NormalizeError::Field {
            path,
            value,
            expected,
        } => NormalizeError::Field {
            path: format!("{prefix}.{path}"),
            value,
            expected,
        },
        NormalizeError::Shape { path, reason } => NormalizeError::Shape {
            path: format!("{prefix}.{path}"),
            reason,
        },
    }
}
