//! Field-type schemas.
//!
//! A [`Schema`] maps field names to the semantic [`FieldType`] their values
//! must be coerced to. Schemas never change which fields a record has, only
//! the representation of the values that are present.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Semantic type tag for a field.
///
/// Serialized with an internal `type` tag so schemas read naturally in YAML:
///
/// ```yaml
/// birth_date: { type: date }
/// official_number: { type: numeric_string, width: 6 }
/// sex: { type: enum, allowed: [M, F] }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldType {
    /// Trimmed string with internal whitespace runs collapsed.
    Text,
    /// Calendar date, canonical `YYYY-MM-DD`.
    Date,
    /// Instant, canonical RFC 3339 UTC with seconds precision.
    Datetime,
    /// Upper-case code, optionally restricted to `allowed`.
    Enum {
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        allowed: Vec<String>,
    },
    /// Digits only, left-padded with zeros to `width` when given.
    NumericString {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        width: Option<usize>,
    },
    /// JSON integer.
    Integer,
    /// JSON boolean.
    Boolean,
}

/// Field name → declared type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schema(BTreeMap<String, FieldType>);

impl Schema {
    pub fn get(&self, field: &str) -> Option<&FieldType> {
        self.0.get(field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldType)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Built-in schema for the identity (`name`) block of a person record.
    pub fn person() -> Self {
        Self::from_iter([
            ("forename", FieldType::Text),
            ("surname", FieldType::Text),
            ("other_names", FieldType::Text),
            ("birth_date", FieldType::Date),
            ("death_date", FieldType::Date),
            ("birth_place", FieldType::Text),
            ("official_number", FieldType::NumericString { width: None }),
            ("sex", FieldType::Enum { allowed: vec![] }),
            ("sailor_type", FieldType::Enum { allowed: vec![] }),
        ])
    }

    /// Built-in schema for one row of a service table.
    pub fn service() -> Self {
        Self::from_iter([
            ("ship", FieldType::Text),
            ("rating", FieldType::Enum { allowed: vec![] }),
            ("from_date", FieldType::Date),
            ("to_date", FieldType::Date),
            ("pay_number", FieldType::NumericString { width: None }),
            ("entry_number", FieldType::Integer),
            ("confirmed", FieldType::Boolean),
            ("recorded_at", FieldType::Datetime),
        ])
    }
}

impl<K: Into<String>> FromIterator<(K, FieldType)> for Schema {
    fn from_iter<I: IntoIterator<Item = (K, FieldType)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}
