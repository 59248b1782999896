//! Translation from the internal record shape to the downstream wire shape.

use std::collections::BTreeMap;

use reconcile_core::config::WireConfig;
use reconcile_core::{Record, WireRecord};

/// Turns an internal record into the shape the downstream API expects.
pub trait WireFormat {
    fn to_wire(&self, record: &Record) -> WireRecord;
}

/// Top-level key renames and removals; the identity when unconfigured.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApiTranslator {
    rename: BTreeMap<String, String>,
    omit: Vec<String>,
}

impl ApiTranslator {
    pub fn identity() -> Self {
        Self::default()
    }

    pub fn from_config(config: &WireConfig) -> Self {
        Self {
            rename: config.rename.clone(),
            omit: config.omit.clone(),
        }
    }
}

impl WireFormat for ApiTranslator {
    fn to_wire(&self, record: &Record) -> WireRecord {
        let mut out = Record::new();
        for (key, value) in record.as_map() {
            if self.omit.iter().any(|o| o == key) {
                continue;
            }
            let key = self.rename.get(key).unwrap_or(key);
            out.insert(key.clone(), value.clone());
        }
        WireRecord(out.into_value())
    }
}
