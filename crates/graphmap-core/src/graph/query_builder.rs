// Query/mutation builder
// Assembles one complete traversal per connector operation: label scope, where
// predicates, projection, ordering, paging and property writes.

use super::filter::build_where;
use super::traversal::Traversal;
use crate::error::{GraphError, Result};
use crate::graph::cache::PropertyTypes;
use crate::model::ModelDefinition;
use crate::property::{to_storage_fields, write_property, write_record};
use graphmap_common::{Filter, OrderSpec, Record, FROM_FIELD, ID_FIELD, TO_FIELD};
use serde_json::{json, Value};

/// Keys never rewritten by replace/update: identity and edge endpoints are fixed at creation.
const IMMUTABLE_FIELDS: [&str; 3] = [ID_FIELD, FROM_FIELD, TO_FIELD];

/// A `model/id` endpoint reference carried by edge records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeReference {
    pub model: String,
    pub id: String,
}

impl EdgeReference {
    pub fn parse(field: &'static str, value: Option<&Value>) -> Result<Self> {
        let raw = match value {
            None | Some(Value::Null) => return Err(GraphError::MissingReference(field)),
            Some(Value::String(s)) => s,
            Some(other) => {
                return Err(GraphError::InvalidReferenceFormat {
                    field,
                    value: other.to_string(),
                })
            }
        };

        let parts: Vec<&str> = raw.split('/').collect();
        match parts.as_slice() {
            [model, id] if !model.is_empty() && !id.is_empty() => Ok(Self {
                model: model.to_string(),
                id: id.to_string(),
            }),
            _ => Err(GraphError::InvalidReferenceFormat {
                field,
                value: raw.clone(),
            }),
        }
    }
}

pub struct QueryBuilder<'a> {
    model: &'a ModelDefinition,
    types: &'a PropertyTypes,
    base: Option<Traversal>,
}

impl<'a> QueryBuilder<'a> {
    pub fn new(model: &'a ModelDefinition, types: &'a PropertyTypes) -> Self {
        Self {
            model,
            types,
            base: None,
        }
    }

    /// Continues `pending` (an open transaction's traversal) instead of starting from `g`.
    pub fn continuing(mut self, pending: Option<Traversal>) -> Self {
        self.base = pending;
        self
    }

    fn root(&mut self) -> Traversal {
        self.base.take().unwrap_or_else(Traversal::g)
    }

    fn scoped(&mut self, where_clause: &Value) -> Result<Traversal> {
        let base = self.base.take();
        build_where(base, self.model, where_clause)
    }

    /// Read traversal for `filter`. No filter means every element with the model's label.
    pub fn query(mut self, filter: Option<&Filter>) -> Result<Traversal> {
        let filter = match filter {
            Some(f) => f,
            None => {
                let root = self.root();
                let scoped = if self.model.is_edge() { root.e(vec![]) } else { root.v(vec![]) };
                return Ok(scoped.has_label(self.model.name()));
            }
        };

        let where_clause = filter.where_clause.clone().unwrap_or_else(|| json!({}));
        let mut t = self.scoped(&where_clause)?;

        t = match &filter.fields {
            None => t.element_map(self.projected_columns()),
            Some(fields) if !fields.is_empty() => {
                t.element_map(fields.iter().map(|f| self.model.column_for(f).to_string()))
            }
            Some(_) => t,
        };

        if let Some(order) = &filter.order {
            let mut entries = Vec::with_capacity(order.len());
            for raw in order {
                let spec = OrderSpec::parse(raw)
                    .ok_or_else(|| GraphError::validation(format!("Invalid order entry {:?}", raw)))?;
                if let Some(fields) = &filter.fields {
                    if !fields.contains(&spec.field) {
                        return Err(GraphError::validation(format!(
                            "Field \"{}\" must be in field list!",
                            spec.field
                        )));
                    }
                }
                entries.push(spec);
            }
            if !entries.is_empty() {
                t = t.order();
                for spec in entries {
                    t = t.by(self.model.column_for(&spec.field).to_string(), spec.direction);
                }
            }
        }

        if let Some(skip) = filter.skip.filter(|n| *n > 0) {
            t = t.skip(skip);
        }
        if let Some(limit) = filter.limit.filter(|n| *n > 0) {
            t = t.limit(limit);
        }
        Ok(t)
    }

    /// Storage columns of every declared field; identity and endpoints come back with the element.
    fn projected_columns(&self) -> Vec<String> {
        self.model
            .properties()
            .iter()
            .filter(|p| {
                p.name != ID_FIELD && !(self.model.is_edge() && (p.name == FROM_FIELD || p.name == TO_FIELD))
            })
            .map(|p| p.column_name().to_string())
            .collect()
    }

    pub fn create(mut self, mut record: Record) -> Result<Traversal> {
        let root = self.root();

        let (t, ignore): (Traversal, &[&str]) = if self.model.is_edge() {
            let from = EdgeReference::parse("from", record.get(FROM_FIELD))?;
            let to = EdgeReference::parse("to", record.get(TO_FIELD))?;
            let t = root
                .v(vec![Value::String(from.id)])
                .has_label(from.model)
                .add_e(self.model.name())
                .to(Traversal::anonymous().v(vec![Value::String(to.id)]).has_label(to.model));
            (t, &[FROM_FIELD, TO_FIELD])
        } else {
            (root.add_v(self.model.name()), &[])
        };

        to_storage_fields(self.model, &mut record);
        write_record(t, self.types, &record, ignore)
    }

    /// Full overwrite: every existing property is dropped before the record is written.
    pub fn replace(mut self, id: &Value, mut record: Record) -> Result<Traversal> {
        if id.is_null() {
            return Err(GraphError::MissingId);
        }
        let t = self
            .scoped(&json!({ ID_FIELD: id }))?
            .side_effect(Traversal::anonymous().properties(Vec::<String>::new()).drop());

        to_storage_fields(self.model, &mut record);
        write_record(t, self.types, &record, &IMMUTABLE_FIELDS)
    }

    /// Partial update of every match, yielding the number of elements touched.
    pub fn update(mut self, where_clause: &Value, mut record: Record) -> Result<Traversal> {
        let mut t = self.scoped(where_clause)?;

        to_storage_fields(self.model, &mut record);
        for (key, value) in &record {
            if IMMUTABLE_FIELDS.contains(&key.as_str()) {
                continue;
            }
            t = t.side_effect(Traversal::anonymous().properties([key.as_str()]).drop());
            t = write_property(t, self.types.of_storage_key(key), key, value, &IMMUTABLE_FIELDS)?;
        }
        Ok(t.count())
    }

    pub fn count(mut self, where_clause: &Value) -> Result<Traversal> {
        Ok(self.scoped(where_clause)?.count())
    }

    pub fn destroy(mut self, where_clause: &Value) -> Result<Traversal> {
        Ok(self.scoped(where_clause)?.drop())
    }
}
