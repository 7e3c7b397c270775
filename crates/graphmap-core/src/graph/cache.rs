// Model type cache
// Derived per-model type tables, keyed by model name. Populated lazily and never invalidated.

use crate::model::ModelDefinition;
use crate::property::derive_types;
use dashmap::DashMap;
use graphmap_common::PropertyType;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Field types of one model, addressable by field name or by storage column.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PropertyTypes {
    by_field: HashMap<String, PropertyType>,
    /// storage column -> field name, for renamed fields only
    by_column: HashMap<String, String>,
}

impl PropertyTypes {
    pub(crate) fn insert(&mut self, field: &str, column: Option<&str>, property_type: PropertyType) {
        self.by_field.insert(field.to_string(), property_type);
        if let Some(column) = column {
            self.by_column.insert(column.to_string(), field.to_string());
        }
    }

    pub fn of_field(&self, field: &str) -> Option<PropertyType> {
        self.by_field.get(field).copied()
    }

    /// Resolves a key of a storage-shaped record (column or plain field name) to its type.
    pub fn of_storage_key(&self, key: &str) -> Option<PropertyType> {
        match self.by_column.get(key) {
            Some(field) => self.of_field(field),
            None => self.of_field(key),
        }
    }

    pub fn len(&self) -> usize {
        self.by_field.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_field.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

#[derive(Default)]
pub struct TypeCache {
    entries: DashMap<String, Arc<PropertyTypes>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl TypeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Concurrent first accesses may both derive; the values are identical so
    /// whichever insert lands last is kept.
    pub fn get_or_derive(&self, model: &ModelDefinition) -> Arc<PropertyTypes> {
        if let Some(entry) = self.entries.get(model.name()) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return entry.value().clone();
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let types = Arc::new(derive_types(model));
        self.entries.insert(model.name().to_string(), types.clone());
        tracing::debug!("Derived {} property types for model {}", types.len(), model.name());
        types
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}
