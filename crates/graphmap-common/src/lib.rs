use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub mod config;

/// A flat application record, keyed by field (or storage column) name.
pub type Record = serde_json::Map<String, Value>;

/// Name of the primary-key field on every model.
pub const ID_FIELD: &str = "id";
/// Edge endpoint reference fields, both in `model/id` form.
pub const FROM_FIELD: &str = "from";
pub const TO_FIELD: &str = "to";

/// Structural kind of a model: graph node or graph relationship.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    #[default]
    Vertex,
    Edge,
}

impl ModelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::Vertex => "vertex",
            ModelKind::Edge => "edge",
        }
    }
}

/// Semantic type of a model property. Drives how values are serialized on write.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum PropertyType {
    String,
    Number,
    Boolean,
    Date,
    Object,
    Array,
}

impl PropertyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PropertyType::String => "String",
            PropertyType::Number => "Number",
            PropertyType::Boolean => "Boolean",
            PropertyType::Date => "Date",
            PropertyType::Object => "Object",
            PropertyType::Array => "Array",
        }
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Type {0} is not supported.")]
pub struct UnknownPropertyType(pub String);

impl FromStr for PropertyType {
    type Err = UnknownPropertyType;

    /// Accepts the loopback spellings, case-insensitively (`string`, `Number`, `date`, ...).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "string" => Ok(PropertyType::String),
            "number" => Ok(PropertyType::Number),
            "boolean" => Ok(PropertyType::Boolean),
            "date" => Ok(PropertyType::Date),
            "object" => Ok(PropertyType::Object),
            "array" => Ok(PropertyType::Array),
            _ => Err(UnknownPropertyType(s.to_string())),
        }
    }
}

/// Per-model retry policy for transient storage failures.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Number of resubmissions allowed after the first failure.
    #[serde(alias = "max")]
    pub max_retries: u32,
    #[serde(alias = "delay")]
    pub delay_ms: u64,
}

impl RetryPolicy {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: config::DEFAULT_RETRY_MAX,
            delay_ms: config::DEFAULT_RETRY_DELAY_MS,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

/// One `"field DIR"` ordering entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderSpec {
    pub field: String,
    pub direction: SortDirection,
}

impl OrderSpec {
    /// Parses `"name"`, `"name ASC"` or `"name DESC"`. A missing direction sorts ascending.
    pub fn parse(raw: &str) -> Option<Self> {
        let mut parts = raw.split_whitespace();
        let field = parts.next()?.to_string();
        let direction = match parts.next() {
            Some(dir) if dir.eq_ignore_ascii_case("desc") => SortDirection::Desc,
            _ => SortDirection::Asc,
        };
        Some(Self { field, direction })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum FieldSelection {
    List(Vec<String>),
    Flags(serde_json::Map<String, Value>),
}

fn deserialize_order<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<OneOrMany>::deserialize(deserializer)?.map(|o| match o {
        OneOrMany::One(s) => vec![s],
        OneOrMany::Many(v) => v,
    }))
}

fn deserialize_fields<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<FieldSelection>::deserialize(deserializer)?.map(|sel| match sel {
        FieldSelection::List(v) => v,
        FieldSelection::Flags(map) => map
            .into_iter()
            .filter(|(_, v)| v.as_bool().unwrap_or(false))
            .map(|(k, _)| k)
            .collect(),
    }))
}

/// Loopback-style query filter.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Filter {
    #[serde(default, rename = "where")]
    pub where_clause: Option<Value>,
    #[serde(default, deserialize_with = "deserialize_fields")]
    pub fields: Option<Vec<String>>,
    #[serde(default, deserialize_with = "deserialize_order")]
    pub order: Option<Vec<String>>,
    #[serde(default)]
    pub skip: Option<u64>,
    #[serde(default)]
    pub limit: Option<u64>,
}

impl Filter {
    pub fn with_where(where_clause: Value) -> Self {
        Self {
            where_clause: Some(where_clause),
            ..Default::default()
        }
    }

    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }
}

/// Per-call options threaded through every public operation.
#[derive(Debug, Clone, Default)]
pub struct Options {
    /// Open pseudo-transaction that mutations accumulate into instead of executing.
    pub transaction: Option<String>,
}

impl Options {
    pub fn in_transaction(id: impl Into<String>) -> Self {
        Self {
            transaction: Some(id.into()),
        }
    }
}

/// Result shape of bulk mutations (`destroy_all`, `update_all`).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct AffectedCount {
    pub count: u64,
}
