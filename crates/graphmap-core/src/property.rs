//! Field/column mapping and type-directed value serialization for writes.

use crate::error::{GraphError, Result};
use crate::graph::cache::PropertyTypes;
use crate::graph::traversal::{Argument, PropertyKey, Traversal};
use crate::model::ModelDefinition;
use chrono::{DateTime, NaiveDate, SecondsFormat, TimeZone, Utc};
use graphmap_common::{PropertyType, Record, ID_FIELD};
use serde_json::Value;

/// Resolves the semantic type of every declared field.
pub fn derive_types(model: &ModelDefinition) -> PropertyTypes {
    let mut types = PropertyTypes::default();
    for prop in model.properties() {
        types.insert(&prop.name, prop.column.as_deref(), prop.property_type);
    }
    types
}

/// Renames, in place, every key that has a configured storage column.
pub fn to_storage_fields(model: &ModelDefinition, record: &mut Record) {
    if !model.properties().iter().any(|p| p.column.is_some()) {
        return;
    }
    let original = std::mem::take(record);
    for (key, value) in original {
        let column = model.column_for(&key).to_string();
        record.insert(column, value);
    }
}

/// Maps a storage-shaped record back to declared field names. Fields absent under
/// both their column and their own name are left out.
pub fn from_storage_fields(model: &ModelDefinition, record: &Record) -> Record {
    let mut out = Record::new();
    for prop in model.properties() {
        if let Some(v) = record.get(prop.column_name()) {
            out.insert(prop.name.clone(), v.clone());
        } else if let Some(v) = record.get(&prop.name) {
            out.insert(prop.name.clone(), v.clone());
        }
    }
    out
}

/// Appends a `property(key, value)` step, serializing `value` according to `property_type`.
///
/// `None` as type means the key is not declared on the model. The primary key is
/// written through the identity token whatever its declared type. `null` values
/// write nothing.
pub fn write_property(
    traversal: Traversal,
    property_type: Option<PropertyType>,
    key: &str,
    value: &Value,
    ignore: &[&str],
) -> Result<Traversal> {
    if ignore.contains(&key) || value.is_null() {
        return Ok(traversal);
    }

    if key == ID_FIELD {
        return Ok(traversal.property(PropertyKey::Id, value.clone()));
    }

    let property_type = property_type
        .ok_or_else(|| GraphError::UnsupportedType(format!("of undeclared field {}", key)))?;

    let argument = match property_type {
        PropertyType::Object | PropertyType::Array => Argument::from(value.to_string()),
        PropertyType::Number => Argument::Value(coerce_number(key, value)?),
        PropertyType::Date => Argument::Date(coerce_date(key, value)?),
        PropertyType::Boolean => Argument::from(coerce_bool(key, value)?),
        PropertyType::String => Argument::from(coerce_string(value)),
    };

    Ok(traversal.property(PropertyKey::Name(key.to_string()), argument))
}

/// Writes every entry of a storage-shaped record, left to right.
pub fn write_record(
    mut traversal: Traversal,
    types: &PropertyTypes,
    record: &Record,
    ignore: &[&str],
) -> Result<Traversal> {
    for (key, value) in record {
        traversal = write_property(traversal, types.of_storage_key(key), key, value, ignore)?;
    }
    Ok(traversal)
}

/// Undoes the write serialization on a record keyed by field name: JSON text of
/// object and array fields is parsed back, date millis become RFC 3339 text.
pub fn read_record(types: &PropertyTypes, record: Record) -> Record {
    record
        .into_iter()
        .map(|(key, value)| {
            let value = match (types.of_field(&key), value) {
                (Some(PropertyType::Object | PropertyType::Array), Value::String(text)) => {
                    serde_json::from_str(&text).unwrap_or(Value::String(text))
                }
                (Some(PropertyType::Date), Value::Number(n)) => n
                    .as_i64()
                    .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
                    .map(|d| Value::String(d.to_rfc3339_opts(SecondsFormat::Millis, true)))
                    .unwrap_or(Value::Number(n)),
                (_, other) => other,
            };
            (key, value)
        })
        .collect()
}

fn invalid(key: &str, value: &Value, expected: &str) -> GraphError {
    GraphError::validation(format!("Field {} expects {}, got {}", key, expected, value))
}

fn coerce_number(key: &str, value: &Value) -> Result<Value> {
    match value {
        Value::Number(_) => Ok(value.clone()),
        Value::Bool(b) => Ok(Value::from(*b as i64)),
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                return Ok(Value::from(0));
            }
            if let Ok(i) = s.parse::<i64>() {
                return Ok(Value::from(i));
            }
            s.parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| invalid(key, value, "a number"))
        }
        _ => Err(invalid(key, value, "a number")),
    }
}

fn coerce_date(key: &str, value: &Value) -> Result<DateTime<Utc>> {
    let millis = |ms: i64| Utc.timestamp_millis_opt(ms).single();
    let parsed = match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .and_then(millis),
        Value::String(s) => {
            let s = s.trim();
            DateTime::parse_from_rfc3339(s)
                .map(|d| d.with_timezone(&Utc))
                .ok()
                .or_else(|| {
                    NaiveDate::parse_from_str(s, "%Y-%m-%d")
                        .ok()
                        .and_then(|d| d.and_hms_opt(0, 0, 0))
                        .map(|d| d.and_utc())
                })
                .or_else(|| s.parse::<i64>().ok().and_then(millis))
        }
        _ => None,
    };
    parsed.ok_or_else(|| invalid(key, value, "a date"))
}

fn coerce_bool(key: &str, value: &Value) -> Result<bool> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Number(n) if n.as_f64() == Some(1.0) => Ok(true),
        Value::Number(n) if n.as_f64() == Some(0.0) => Ok(false),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Ok(true),
            "false" | "0" => Ok(false),
            _ => Err(invalid(key, value, "a boolean")),
        },
        _ => Err(invalid(key, value, "a boolean")),
    }
}

fn coerce_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
