use crate::error::{GraphError, Result};
use crate::graph::cache::{PropertyTypes, TypeCache};
use dashmap::DashMap;
use graphmap_common::{ModelKind, PropertyType, RetryPolicy, FROM_FIELD, ID_FIELD, TO_FIELD};
use serde_json::Value;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyDefinition {
    pub name: String,
    pub property_type: PropertyType,
    /// Storage column the field is persisted under, when it differs from `name`.
    pub column: Option<String>,
}

impl PropertyDefinition {
    pub fn column_name(&self) -> &str {
        self.column.as_deref().unwrap_or(&self.name)
    }
}

/// Immutable description of one model: its structural kind, ordered fields and retry policy.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelDefinition {
    name: String,
    kind: ModelKind,
    properties: Vec<PropertyDefinition>,
    retry: Option<RetryPolicy>,
}

impl ModelDefinition {
    pub fn new(name: impl Into<String>, kind: ModelKind) -> Self {
        let mut def = Self {
            name: name.into(),
            kind,
            properties: Vec::new(),
            retry: None,
        };
        def = def.with_property(ID_FIELD, PropertyType::String);
        if kind == ModelKind::Edge {
            def = def
                .with_property(FROM_FIELD, PropertyType::String)
                .with_property(TO_FIELD, PropertyType::String);
        }
        def
    }

    pub fn vertex(name: impl Into<String>) -> Self {
        Self::new(name, ModelKind::Vertex)
    }

    pub fn edge(name: impl Into<String>) -> Self {
        Self::new(name, ModelKind::Edge)
    }

    /// Declares (or redeclares) a field stored under its own name.
    pub fn with_property(self, name: impl Into<String>, property_type: PropertyType) -> Self {
        self.with_definition(PropertyDefinition {
            name: name.into(),
            property_type,
            column: None,
        })
    }

    /// Declares a field persisted under a different storage column.
    pub fn with_column(
        self,
        name: impl Into<String>,
        property_type: PropertyType,
        column: impl Into<String>,
    ) -> Self {
        self.with_definition(PropertyDefinition {
            name: name.into(),
            property_type,
            column: Some(column.into()),
        })
    }

    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    fn with_definition(mut self, prop: PropertyDefinition) -> Self {
        match self.properties.iter_mut().find(|p| p.name == prop.name) {
            Some(existing) => *existing = prop,
            None => self.properties.push(prop),
        }
        self
    }

    /// Parses a loopback model definition:
    ///
    /// ```json
    /// {"name": "Person",
    ///  "settings": {"type": "vertex", "retry": {"max": 5, "delay": 50}},
    ///  "properties": {"name": {"type": "string", "neptune": {"columnName": "full_name"}},
    ///                 "tags": ["string"], "age": "number"}}
    /// ```
    pub fn from_json(value: &Value) -> Result<Self> {
        let name = value
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| GraphError::validation("Model definition requires a name"))?;

        let settings = value.get("settings");
        let kind = match settings.and_then(|s| s.get("type")).and_then(Value::as_str) {
            None | Some("vertex") => ModelKind::Vertex,
            Some("edge") => ModelKind::Edge,
            Some(other) => {
                return Err(GraphError::validation(format!(
                    "Model {} has unknown type {:?}, expected vertex or edge",
                    name, other
                )))
            }
        };

        let mut def = Self::new(name, kind);

        if let Some(retry) = settings.and_then(|s| s.get("retry")) {
            let defaults = RetryPolicy::default();
            let max_retries = match retry.get("max").and_then(Value::as_u64) {
                Some(max) => u32::try_from(max).map_err(|_| {
                    GraphError::validation(format!("Model {} has retry max {} out of range", name, max))
                })?,
                None => defaults.max_retries,
            };
            def.retry = Some(RetryPolicy {
                max_retries,
                delay_ms: retry
                    .get("delay")
                    .and_then(Value::as_u64)
                    .unwrap_or(defaults.delay_ms),
            });
        }

        if let Some(props) = value.get("properties").and_then(Value::as_object) {
            for (field, spec) in props {
                let property_type = parse_type(spec.get("type").unwrap_or(spec))?;
                let column = spec
                    .pointer("/neptune/columnName")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                def = def.with_definition(PropertyDefinition {
                    name: field.clone(),
                    property_type,
                    column,
                });
            }
        }

        Ok(def)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ModelKind {
        self.kind
    }

    pub fn is_edge(&self) -> bool {
        self.kind == ModelKind::Edge
    }

    pub fn properties(&self) -> &[PropertyDefinition] {
        &self.properties
    }

    pub fn field(&self, name: &str) -> Option<&PropertyDefinition> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Storage column for `field`; undeclared fields map to themselves.
    pub fn column_for<'a>(&'a self, field: &'a str) -> &'a str {
        self.field(field).map(|p| p.column_name()).unwrap_or(field)
    }

    pub fn retry(&self) -> Option<RetryPolicy> {
        self.retry
    }
}

fn parse_type(spec: &Value) -> Result<PropertyType> {
    match spec {
        Value::String(name) => Ok(name.parse::<PropertyType>()?),
        Value::Array(_) => Ok(PropertyType::Array),
        other => Err(GraphError::UnsupportedType(other.to_string())),
    }
}

/// Registered models plus the lazily derived per-model type tables.
pub struct ModelRegistry {
    models: DashMap<String, Arc<ModelDefinition>>,
    types: TypeCache,
    default_retry: RetryPolicy,
}

impl ModelRegistry {
    pub fn new(default_retry: RetryPolicy) -> Self {
        Self {
            models: DashMap::new(),
            types: TypeCache::new(),
            default_retry,
        }
    }

    pub fn register(&self, model: ModelDefinition) -> Result<Arc<ModelDefinition>> {
        let name = model.name().to_string();
        if self.models.contains_key(&name) {
            return Err(GraphError::validation(format!("Model {} is already registered", name)));
        }
        let model = Arc::new(model);
        self.models.insert(name.clone(), model.clone());
        tracing::debug!("Registered {} model {}", model.kind().as_str(), name);
        Ok(model)
    }

    pub fn get(&self, name: &str) -> Result<Arc<ModelDefinition>> {
        self.models
            .get(name)
            .map(|m| m.value().clone())
            .ok_or_else(|| GraphError::UnknownModel(name.to_string()))
    }

    /// Type table for `name`, derived on first use and cached afterwards.
    pub fn types(&self, name: &str) -> Result<Arc<PropertyTypes>> {
        let model = self.get(name)?;
        Ok(self.types.get_or_derive(&model))
    }

    pub fn type_cache(&self) -> &TypeCache {
        &self.types
    }

    /// Retry policy in force for `name` right now; `None` for unregistered models.
    pub fn retry_policy(&self, name: &str) -> Option<RetryPolicy> {
        self.models
            .get(name)
            .map(|m| m.retry().unwrap_or(self.default_retry))
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}
