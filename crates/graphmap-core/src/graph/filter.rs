// Where-clause compiler.
//
// A loopback where clause is parsed into a `Condition` tree first, then lowered onto
// a traversal as `has`/`hasNot`/`and`/`or` steps. Parsing knows nothing about Gremlin;
// lowering knows nothing about the JSON grammar.

use super::traversal::{PropertyKey, Predicate, Traversal};
use crate::error::{GraphError, Result};
use crate::model::ModelDefinition;
use graphmap_common::ID_FIELD;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    Between,
    Inq,
    Nin,
    Like,
    ILike,
    NLike,
    NILike,
}

impl Operator {
    /// `Ok(None)` for keys that are not operators at all.
    fn from_key(key: &str) -> Result<Option<Self>> {
        let op = match key {
            "eq" => Operator::Eq,
            "neq" => Operator::Neq,
            "gt" => Operator::Gt,
            "gte" => Operator::Gte,
            "lt" => Operator::Lt,
            "lte" => Operator::Lte,
            "between" => Operator::Between,
            "inq" => Operator::Inq,
            "nin" => Operator::Nin,
            "like" => Operator::Like,
            "ilike" => Operator::ILike,
            "nlike" => Operator::NLike,
            "nilike" => Operator::NILike,
            "near" | "regexp" => return Err(GraphError::UnsupportedOperator(key.to_uppercase())),
            _ => return Ok(None),
        };
        Ok(Some(op))
    }

    fn to_predicate(self, operand: &Value) -> Predicate {
        let text = || match operand {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        let list = || match operand {
            Value::Array(items) => items.clone(),
            other => vec![other.clone()],
        };
        match self {
            Operator::Eq => Predicate::Eq(operand.clone()),
            Operator::Neq => Predicate::Neq(operand.clone()),
            Operator::Gt => Predicate::Gt(operand.clone()),
            Operator::Gte => Predicate::Gte(operand.clone()),
            Operator::Lt => Predicate::Lt(operand.clone()),
            Operator::Lte => Predicate::Lte(operand.clone()),
            Operator::Between => {
                let bounds = list();
                Predicate::Between(bounds[0].clone(), bounds[1].clone())
            }
            Operator::Inq => Predicate::Within(list()),
            Operator::Nin => Predicate::Without(list()),
            Operator::Like | Operator::ILike => Predicate::Containing(text()),
            Operator::NLike | Operator::NILike => Predicate::NotContaining(text()),
        }
    }
}

/// Parsed where clause.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// `{field: scalar}`
    Equals { field: String, value: Value },
    /// `{field: {op: operand}}`
    Compare { field: String, op: Operator, value: Value },
    /// `{field: null}`
    Missing { field: String },
    /// Sibling conditions, implicitly ANDed by traversal order.
    All(Vec<Condition>),
    And(Vec<Condition>),
    Or(Vec<Condition>),
}

pub fn parse_where(clause: &Value) -> Result<Condition> {
    match clause {
        Value::Null => Ok(Condition::All(Vec::new())),
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| parse_entry(k, v))
            .collect::<Result<Vec<_>>>()
            .map(Condition::All),
        Value::Array(items) => items
            .iter()
            .map(parse_where)
            .collect::<Result<Vec<_>>>()
            .map(Condition::All),
        other => Err(GraphError::validation(format!("Invalid where clause: {}", other))),
    }
}

fn parse_entry(key: &str, value: &Value) -> Result<Condition> {
    match key {
        "or" | "and" => {
            let members = match value {
                Value::Array(items) => items.iter().map(parse_where).collect::<Result<Vec<_>>>()?,
                Value::Object(_) => vec![parse_where(value)?],
                other => {
                    return Err(GraphError::validation(format!(
                        "{} expects a list of clauses, got {}",
                        key, other
                    )))
                }
            };
            Ok(if key == "or" { Condition::Or(members) } else { Condition::And(members) })
        }
        // list-shaped clause given as an object: {"0": {...}, "1": {...}}
        k if k.parse::<usize>().is_ok() => parse_where(value),
        k => {
            if Operator::from_key(k)?.is_some() {
                return Err(GraphError::validation(format!("Operator {} must be applied to a field", k)));
            }
            parse_field(k, value)
        }
    }
}

fn parse_field(field: &str, value: &Value) -> Result<Condition> {
    match value {
        Value::Null if field == ID_FIELD => Err(GraphError::MissingId),
        Value::Null => Ok(Condition::Missing { field: field.to_string() }),
        Value::Object(ops) => parse_operators(field, ops),
        Value::Array(_) => Err(GraphError::validation(format!(
            "Field {} cannot be matched against a list, use inq",
            field
        ))),
        scalar => Ok(Condition::Equals {
            field: field.to_string(),
            value: scalar.clone(),
        }),
    }
}

fn parse_operators(field: &str, ops: &Map<String, Value>) -> Result<Condition> {
    let mut conditions = Vec::new();
    for (key, operand) in ops {
        // regex flags for like/ilike; containment is the only text match available
        if key == "options" {
            continue;
        }
        let op = Operator::from_key(key)?.ok_or_else(|| {
            GraphError::validation(format!("Unknown operator {} on field {}", key, field))
        })?;
        validate_operand(field, op, operand)?;
        conditions.push(Condition::Compare {
            field: field.to_string(),
            op,
            value: operand.clone(),
        });
    }

    if conditions.len() == 1 {
        Ok(conditions.remove(0))
    } else {
        Ok(Condition::All(conditions))
    }
}

fn validate_operand(field: &str, op: Operator, operand: &Value) -> Result<()> {
    let ok = match op {
        Operator::Between => matches!(operand, Value::Array(b) if b.len() == 2),
        Operator::Inq | Operator::Nin => !operand.is_object() && !operand.is_null(),
        Operator::Like | Operator::ILike | Operator::NLike | Operator::NILike => operand.is_string(),
        _ => !operand.is_object() && !operand.is_array(),
    };
    if ok {
        Ok(())
    } else {
        Err(GraphError::validation(format!(
            "Invalid operand {} for {:?} on field {}",
            operand, op, field
        )))
    }
}

fn key_for(model: &ModelDefinition, field: &str) -> PropertyKey {
    PropertyKey::for_field(model.column_for(field))
}

/// Appends the predicate steps for `condition` to `traversal`.
pub fn lower(condition: &Condition, model: &ModelDefinition, traversal: Traversal) -> Traversal {
    match condition {
        Condition::Equals { field, value } => traversal.has(key_for(model, field), value.clone()),
        Condition::Compare { field, op, value } => {
            traversal.has(key_for(model, field), op.to_predicate(value))
        }
        Condition::Missing { field } => traversal.has_not(model.column_for(field).to_string()),
        Condition::All(children) => children
            .iter()
            .fold(traversal, |t, child| lower(child, model, t)),
        Condition::And(members) => traversal.and(
            members
                .iter()
                .map(|m| lower(m, model, Traversal::anonymous()))
                .collect(),
        ),
        Condition::Or(members) => traversal.or(
            members
                .iter()
                .map(|m| lower(m, model, Traversal::anonymous()))
                .collect(),
        ),
    }
}

/// `{id: <scalar>}` and nothing else.
pub fn identity_lookup(clause: &Value) -> Option<Value> {
    let map = clause.as_object()?;
    if map.len() != 1 {
        return None;
    }
    match map.get(ID_FIELD)? {
        v @ (Value::String(_) | Value::Number(_)) => Some(v.clone()),
        _ => None,
    }
}

/// Roots a traversal at the model's vertices/edges (on top of `base` when given) and
/// applies `clause`. An exact `{id}` clause roots directly at that element, still
/// asserting the label so ids shared across models cannot leak through.
pub fn build_where(base: Option<Traversal>, model: &ModelDefinition, clause: &Value) -> Result<Traversal> {
    let condition = parse_where(clause)?;
    let base = base.unwrap_or_else(Traversal::g);

    let ids = identity_lookup(clause).into_iter().collect::<Vec<_>>();
    let fast_path = !ids.is_empty();
    let rooted = if model.is_edge() { base.e(ids) } else { base.v(ids) };
    let scoped = rooted.has_label(model.name());

    if fast_path {
        return Ok(scoped);
    }
    Ok(lower(&condition, model, scoped))
}
