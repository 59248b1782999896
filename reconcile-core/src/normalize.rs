//! Field normalization.
//!
//! [`normalize`] coerces, in place, every field of a record that the schema
//! declares. Fields the schema does not mention are untouched, absent fields
//! are skipped and `null` stays `null`. Blank strings become `null` for every
//! type except [`FieldType::Text`].
//!
//! A value that cannot be coerced fails the whole record with
//! [`NormalizeError::Field`]; raw values are never passed through. Fields
//! visited before the failure may already have been rewritten.
//!
//! Canonical output always normalizes to itself, so applying a schema twice
//! is the same as applying it once.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde_json::{Map, Number, Value};

use crate::error::NormalizeError;
use crate::schema::{FieldType, Schema};

/// Normalize the top-level fields of `record` against `schema`.
pub fn normalize(record: &mut Map<String, Value>, schema: &Schema) -> Result<(), NormalizeError> {
    normalize_at(record, schema, "")
}

/// Normalize every row of every table of a `{ services: [ { records: [...] } ] }`
/// block, each row independently against `schema`.
///
/// `root` names the block in error paths. Returns the number of rows visited.
pub fn normalize_tables(
    block: &mut Value,
    schema: &Schema,
    root: &str,
) -> Result<usize, NormalizeError> {
    let tables = block
        .get_mut("services")
        .ok_or_else(|| shape(root, "missing `services` list"))?;
    let Value::Array(tables) = tables else {
        return Err(shape(&format!("{root}.services"), "not a list"));
    };

    let mut rows = 0;
    for (t, table) in tables.iter_mut().enumerate() {
        let table_path = format!("{root}.services[{t}]");
        let records = table
            .get_mut("records")
            .ok_or_else(|| shape(&table_path, "missing `records` list"))?;
        let Value::Array(records) = records else {
            return Err(shape(&format!("{table_path}.records"), "not a list"));
        };
        for (r, row) in records.iter_mut().enumerate() {
            let row_path = format!("{table_path}.records[{r}]");
            let Value::Object(row) = row else {
                return Err(shape(&row_path, "row is not an object"));
            };
            normalize_at(row, schema, &row_path)?;
            rows += 1;
        }
    }
    Ok(rows)
}

fn normalize_at(
    record: &mut Map<String, Value>,
    schema: &Schema,
    prefix: &str,
) -> Result<(), NormalizeError> {
    for (field, ty) in schema.iter() {
        let Some(value) = record.get_mut(field) else {
            continue;
        };
        match coerce(value, ty) {
            Ok(coerced) => *value = coerced,
            Err(expected) => {
                let path = if prefix.is_empty() {
                    field.clone()
                } else {
                    format!("{prefix}.{field}")
                };
                return Err(NormalizeError::Field {
                    path,
                    value: value.clone(),
                    expected,
                });
            }
        }
    }
    Ok(())
}

fn shape(path: &str, reason: &str) -> NormalizeError {
    NormalizeError::Shape {
        path: path.to_string(),
        reason: reason.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Coercion
// ---------------------------------------------------------------------------

/// Coerce one value. `Err` carries a description of what was expected.
pub fn coerce(value: &Value, ty: &FieldType) -> Result<Value, String> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    if let Value::String(s) = value {
        if s.trim().is_empty() && *ty != FieldType::Text {
            return Ok(Value::Null);
        }
    }

    match ty {
        FieldType::Text => coerce_text(value),
        FieldType::Date => coerce_date(value),
        FieldType::Datetime => coerce_datetime(value),
        FieldType::Enum { allowed } => coerce_enum(value, allowed),
        FieldType::NumericString { width } => coerce_numeric_string(value, *width),
        FieldType::Integer => coerce_integer(value),
        FieldType::Boolean => coerce_boolean(value),
    }
}

fn coerce_text(value: &Value) -> Result<Value, String> {
    let s = match value {
        Value::String(s) => s.split_whitespace().collect::<Vec<_>>().join(" "),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return Err("text".into()),
    };
    Ok(Value::String(s))
}

fn coerce_date(value: &Value) -> Result<Value, String> {
    let expected = || "a date (YYYY-MM-DD, DD/MM/YYYY or ISO 8601 datetime)".to_string();
    let Value::String(s) = value else {
        return Err(expected());
    };
    let s = s.trim();
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(s).ok().map(|d| d.date_naive()))
        .or_else(|| parse_naive_datetime(s).map(|d| d.date()))
        .or_else(|| NaiveDate::parse_from_str(s, "%d/%m/%Y").ok())
        .ok_or_else(expected)?;
    Ok(Value::String(date.format("%Y-%m-%d").to_string()))
}

fn coerce_datetime(value: &Value) -> Result<Value, String> {
    let expected = || "an ISO 8601 datetime".to_string();
    let Value::String(s) = value else {
        return Err(expected());
    };
    let s = s.trim();
    let instant = DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|d| d.with_timezone(&Utc))
        .or_else(|| parse_naive_datetime(s).map(|d| d.and_utc()))
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|d| d.and_utc())
        })
        .ok_or_else(expected)?;
    Ok(Value::String(
        instant.to_rfc3339_opts(SecondsFormat::Secs, true),
    ))
}

fn parse_naive_datetime(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
}

fn coerce_enum(value: &Value, allowed: &[String]) -> Result<Value, String> {
    let code = match value {
        Value::String(s) => s.trim().to_uppercase(),
        Value::Number(n) if n.is_i64() || n.is_u64() => n.to_string(),
        _ => return Err("an enumerated code".into()),
    };
    if !allowed.is_empty() && !allowed.iter().any(|a| a.trim().to_uppercase() == code) {
        return Err(format!("one of [{}]", allowed.join(", ")));
    }
    Ok(Value::String(code))
}

fn coerce_numeric_string(value: &Value, width: Option<usize>) -> Result<Value, String> {
    let expected = || match width {
        Some(w) => format!("a digit string of at most {w} significant digits"),
        None => "a digit string".to_string(),
    };
    let digits = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) if n.is_u64() => n.to_string(),
        _ => return Err(expected()),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(expected());
    }
    let Some(width) = width else {
        return Ok(Value::String(digits));
    };
    let mut digits = digits.as_str();
    while digits.len() > width && digits.starts_with('0') {
        digits = &digits[1..];
    }
    if digits.len() > width {
        return Err(expected());
    }
    Ok(Value::String(format!("{digits:0>width$}")))
}

fn coerce_integer(value: &Value) -> Result<Value, String> {
    match value {
        Value::Number(n) if n.is_i64() || n.is_u64() => Ok(value.clone()),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map(|i| Value::Number(Number::from(i)))
            .map_err(|_| "an integer".to_string()),
        _ => Err("an integer".into()),
    }
}

fn coerce_boolean(value: &Value) -> Result<Value, String> {
    let expected = || "a boolean".to_string();
    let b = match value {
        Value::Bool(b) => *b,
        Value::Number(n) => match n.as_u64() {
            Some(0) => false,
            Some(1) => true,
            _ => return Err(expected()),
        },
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "y" | "1" => true,
            "false" | "no" | "n" | "0" => false,
            _ => return Err(expected()),
        },
        _ => return Err(expected()),
    };
    Ok(Value::Bool(b))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
