// Graph connector
// CRUD, bulk mutations, pseudo-transactions and raw execution for registered models,
// each operation one traversal built by the query builder and run by the executor.

use crate::connection::{ExecutionMode, GraphConnection};
use crate::error::{GraphError, Result};
use crate::graph::cache::PropertyTypes;
use crate::graph::executor::{Executor, RawOptions};
use crate::graph::graphson::convert_edge;
use crate::graph::query_builder::QueryBuilder;
use crate::graph::traversal::Traversal;
use crate::model::{ModelDefinition, ModelRegistry};
use crate::property::{from_storage_fields, read_record};
use crate::transaction::TransactionRegistry;
use graphmap_common::config::AppConfig;
use graphmap_common::{AffectedCount, Filter, Options, Record, ID_FIELD};
use serde_json::{json, Value};
use std::sync::Arc;

/// CRUD over a Gremlin graph for registered models.
///
/// Owns the model registry (with its type cache) and the transaction registry; clones
/// share both.
#[derive(Clone)]
pub struct GraphConnector {
    models: Arc<ModelRegistry>,
    transactions: Arc<TransactionRegistry>,
    executor: Executor,
}

impl GraphConnector {
    pub fn new(connection: Arc<dyn GraphConnection>, config: &AppConfig) -> Self {
        let models = Arc::new(ModelRegistry::new(config.default_retry()));
        let transactions = Arc::new(TransactionRegistry::new(config.transaction.clear_timeout()));
        let executor = Executor::new(connection, models.clone(), transactions.clone());
        tracing::debug!(
            "Graph connector ready for {} (transaction timeout {:?})",
            config.connection.endpoint(),
            config.transaction.clear_timeout()
        );
        Self {
            models,
            transactions,
            executor,
        }
    }

    pub fn with_defaults(connection: Arc<dyn GraphConnection>) -> Self {
        Self::new(connection, &AppConfig::default())
    }

    pub fn register_model(&self, model: ModelDefinition) -> Result<Arc<ModelDefinition>> {
        self.models.register(model)
    }

    /// Registers a model given in loopback JSON form.
    pub fn register_model_json(&self, definition: &Value) -> Result<Arc<ModelDefinition>> {
        self.models.register(ModelDefinition::from_json(definition)?)
    }

    pub fn models(&self) -> &ModelRegistry {
        &self.models
    }

    fn resolve(&self, model: &str) -> Result<(Arc<ModelDefinition>, Arc<PropertyTypes>)> {
        Ok((self.models.get(model)?, self.models.types(model)?))
    }

    fn pending(&self, options: &Options) -> Result<Option<Traversal>> {
        match &options.transaction {
            Some(tx) => self.transactions.pending(tx),
            None => Ok(None),
        }
    }

    /// Returns the new element's id, or `None` when the write was parked in a transaction.
    pub async fn create(&self, model: &str, record: Record, options: &Options) -> Result<Option<Value>> {
        let (def, types) = self.resolve(model)?;
        let traversal = QueryBuilder::new(&def, &types)
            .continuing(self.pending(options)?)
            .create(record)?;

        let created = self
            .executor
            .execute(Some(model), traversal, ExecutionMode::Next, options)
            .await?;
        Ok(created.get(ID_FIELD).filter(|id| !id.is_null()).cloned())
    }

    /// Reads matching records. A missing filter still projects every declared field.
    ///
    /// Reads always see committed state: an attached transaction is ignored and its
    /// pending traversal left untouched.
    pub async fn all(&self, model: &str, filter: Option<&Filter>, options: &Options) -> Result<Vec<Record>> {
        let (def, types) = self.resolve(model)?;
        let everything = Filter::default();
        let traversal = QueryBuilder::new(&def, &types).query(Some(filter.unwrap_or(&everything)))?;

        if let Some(tx) = &options.transaction {
            tracing::debug!("Reading {} outside transaction {}", model, tx);
        }
        let result = self
            .executor
            .execute(Some(model), traversal, ExecutionMode::ToList, &Options::default())
            .await?;
        let items = match result {
            Value::Array(items) => items,
            Value::Null => Vec::new(),
            other => vec![other],
        };

        Ok(items
            .into_iter()
            .filter_map(|item| match item {
                Value::Object(record) => Some(record),
                _ => None,
            })
            .map(|record| {
                let record = if def.is_edge() { convert_edge(record) } else { record };
                read_record(&types, from_storage_fields(&def, &record))
            })
            .collect())
    }

    pub async fn find_by_id(&self, model: &str, id: &Value, filter: Option<Filter>) -> Result<Option<Record>> {
        if id.is_null() {
            return Err(GraphError::MissingId);
        }
        let filter = Filter {
            where_clause: Some(json!({ ID_FIELD: id })),
            limit: Some(1),
            skip: Some(0),
            ..filter.unwrap_or_default()
        };
        Ok(self.all(model, Some(&filter), &Options::default()).await?.into_iter().next())
    }

    pub async fn find_one(&self, model: &str, filter: Option<Filter>) -> Result<Option<Record>> {
        let filter = Filter {
            limit: Some(1),
            skip: Some(0),
            ..filter.unwrap_or_default()
        };
        Ok(self.all(model, Some(&filter), &Options::default()).await?.into_iter().next())
    }

    pub async fn count(&self, model: &str, where_clause: Option<&Value>) -> Result<u64> {
        let (def, types) = self.resolve(model)?;
        let traversal = QueryBuilder::new(&def, &types).count(where_clause.unwrap_or(&json!({})))?;
        let count = self
            .executor
            .execute(Some(model), traversal, ExecutionMode::Next, &Options::default())
            .await?;
        Ok(count.as_u64().unwrap_or(0))
    }

    /// Counts first so the reply can say how many elements went away.
    pub async fn destroy_all(&self, model: &str, where_clause: Option<&Value>) -> Result<AffectedCount> {
        let count = self.count(model, where_clause).await?;
        if count == 0 {
            return Ok(AffectedCount { count: 0 });
        }

        let (def, types) = self.resolve(model)?;
        let traversal = QueryBuilder::new(&def, &types).destroy(where_clause.unwrap_or(&json!({})))?;
        self.executor
            .execute(Some(model), traversal, ExecutionMode::Iterate, &Options::default())
            .await?;
        Ok(AffectedCount { count })
    }

    pub async fn destroy_by_id(&self, model: &str, id: &Value) -> Result<AffectedCount> {
        if id.is_null() {
            return Err(GraphError::MissingId);
        }
        self.destroy_all(model, Some(&json!({ ID_FIELD: id }))).await
    }

    pub async fn exists(&self, model: &str, id: &Value) -> Result<bool> {
        let filter = Filter {
            where_clause: Some(json!({ ID_FIELD: id })),
            fields: Some(Vec::new()),
            limit: Some(1),
            skip: Some(0),
            ..Default::default()
        };
        Ok(!self.all(model, Some(&filter), &Options::default()).await?.is_empty())
    }

    /// Full overwrite of the element's properties. Edge endpoints cannot change.
    pub async fn replace_by_id(&self, model: &str, id: &Value, record: Record, options: &Options) -> Result<()> {
        let (def, types) = self.resolve(model)?;
        let traversal = QueryBuilder::new(&def, &types)
            .continuing(self.pending(options)?)
            .replace(id, record)?;
        self.executor
            .execute(Some(model), traversal, ExecutionMode::Iterate, options)
            .await?;
        Ok(())
    }

    /// Replaces by the record's own id.
    pub async fn save(&self, model: &str, record: Record, options: &Options) -> Result<()> {
        let id = record.get(ID_FIELD).cloned().unwrap_or(Value::Null);
        self.replace_by_id(model, &id, record, options).await
    }

    pub async fn update_all(&self, model: &str, where_clause: Option<&Value>, record: Record) -> Result<AffectedCount> {
        let (def, types) = self.resolve(model)?;
        let traversal = QueryBuilder::new(&def, &types).update(where_clause.unwrap_or(&json!({})), record)?;
        let count = self
            .executor
            .execute(Some(model), traversal, ExecutionMode::Next, &Options::default())
            .await?;
        Ok(AffectedCount {
            count: count.as_u64().unwrap_or(0),
        })
    }

    pub async fn update(&self, model: &str, where_clause: Option<&Value>, record: Record) -> Result<AffectedCount> {
        self.update_all(model, where_clause, record).await
    }

    pub async fn begin_transaction(&self) -> String {
        self.transactions.begin()
    }

    /// Submits everything accumulated under `id` as one request. Never retried.
    pub async fn commit(&self, id: &str) -> Result<()> {
        let pending = self.transactions.take(id)?;
        let Some(traversal) = pending else {
            tracing::info!("Transaction {} committed with nothing pending", id);
            return Ok(());
        };

        self.executor
            .submit(None, &traversal, ExecutionMode::Iterate, false)
            .await?;
        tracing::info!("Transaction {} committed", id);
        Ok(())
    }

    /// Discards `id`; unknown or already closed ids are fine.
    pub async fn rollback(&self, id: &str) {
        self.transactions.rollback(id);
    }

    pub async fn raw_execute(&self, traversal: Traversal, options: &RawOptions) -> Result<Value> {
        self.executor.raw(traversal, options).await
    }
}

#[cfg(test)]
#[path = "connector_tests.rs"]
mod connector_tests;
