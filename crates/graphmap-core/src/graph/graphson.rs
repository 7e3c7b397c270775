// GraphSON codec.
//
// Outbound: traversal bytecode in GraphSON 2 (`g:Bytecode`), plus the inverse used
// by the in-process server.
// Inbound: strips the typed wrappers of GraphSON 2 and 3 responses into plain JSON.
// Every function here is pure; nothing touches shared state.

use super::traversal::{Argument, Predicate, Token, Traversal};
use chrono::{TimeZone, Utc};
use graphmap_common::{Record, SortDirection, FROM_FIELD, TO_FIELD};
use serde_json::{json, Map, Value};

fn typed(kind: &str, value: Value) -> Value {
    json!({ "@type": kind, "@value": value })
}

fn encode_value(value: &Value) -> Value {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                if i32::try_from(i).is_ok() {
                    typed("g:Int32", Value::from(i))
                } else {
                    typed("g:Int64", Value::from(i))
                }
            } else if let Some(u) = n.as_u64() {
                typed("g:Int64", Value::from(u))
            } else {
                typed("g:Double", value.clone())
            }
        }
        Value::Array(items) => Value::Array(items.iter().map(encode_value).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), encode_value(v)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn encode_predicate(p: &Predicate) -> Value {
    let kind = if p.is_text() { "g:TextP" } else { "g:P" };
    let value = match p {
        Predicate::Between(low, high) => Value::Array(vec![encode_value(low), encode_value(high)]),
        Predicate::Within(vs) | Predicate::Without(vs) => {
            Value::Array(vs.iter().map(encode_value).collect())
        }
        other => encode_value(&other.operands()[0]),
    };
    typed(kind, json!({ "predicate": p.name(), "value": value }))
}

fn encode_argument(arg: &Argument) -> Value {
    match arg {
        Argument::Value(v) => encode_value(v),
        Argument::Date(d) => typed("g:Date", Value::from(d.timestamp_millis())),
        Argument::Token(t) => typed("g:T", Value::from(t.as_str())),
        Argument::Order(SortDirection::Asc) => typed("g:Order", Value::from("asc")),
        Argument::Order(SortDirection::Desc) => typed("g:Order", Value::from("desc")),
        Argument::Predicate(p) => encode_predicate(p),
        Argument::Traversal(t) => encode_bytecode(t),
    }
}

/// Encodes a traversal as a `g:Bytecode` object.
pub fn encode_bytecode(traversal: &Traversal) -> Value {
    let steps: Vec<Value> = traversal
        .steps()
        .iter()
        .map(|step| {
            let mut instruction = vec![Value::from(step.name.as_str())];
            instruction.extend(step.args.iter().map(encode_argument));
            Value::Array(instruction)
        })
        .collect();
    typed("g:Bytecode", json!({ "step": steps }))
}

fn typed_parts(value: &Value) -> Option<(&str, &Value)> {
    let map = value.as_object()?;
    if map.len() != 2 {
        return None;
    }
    Some((map.get("@type")?.as_str()?, map.get("@value")?))
}

fn decode_value(value: &Value) -> Result<Value, String> {
    if let Some((kind, inner)) = typed_parts(value) {
        return match kind {
            "g:Int32" | "g:Int64" | "g:Double" | "g:Float" => Ok(inner.clone()),
            other => Err(format!("Unexpected {} in value position", other)),
        };
    }
    match value {
        Value::Array(items) => items.iter().map(decode_value).collect::<Result<_, _>>().map(Value::Array),
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| Ok((k.clone(), decode_value(v)?)))
            .collect::<Result<Map<_, _>, String>>()
            .map(Value::Object),
        other => Ok(other.clone()),
    }
}

fn decode_predicate(body: &Value) -> Result<Predicate, String> {
    let name = body
        .get("predicate")
        .and_then(Value::as_str)
        .ok_or("Predicate without a name")?;
    let operand = decode_value(body.get("value").unwrap_or(&Value::Null))?;
    let list = |v: Value| match v {
        Value::Array(items) => items,
        other => vec![other],
    };
    let text = |v: Value| match v {
        Value::String(s) => Ok(s),
        other => Err(format!("{} expects text, got {}", name, other)),
    };

    Ok(match name {
        "eq" => Predicate::Eq(operand),
        "neq" => Predicate::Neq(operand),
        "gt" => Predicate::Gt(operand),
        "gte" => Predicate::Gte(operand),
        "lt" => Predicate::Lt(operand),
        "lte" => Predicate::Lte(operand),
        "between" => match list(operand).as_slice() {
            [low, high] => Predicate::Between(low.clone(), high.clone()),
            _ => return Err("between expects two bounds".into()),
        },
        "within" => Predicate::Within(list(operand)),
        "without" => Predicate::Without(list(operand)),
        "containing" => Predicate::Containing(text(operand)?),
        "notContaining" => Predicate::NotContaining(text(operand)?),
        other => return Err(format!("Unknown predicate {}", other)),
    })
}

fn decode_argument(value: &Value) -> Result<Argument, String> {
    let Some((kind, inner)) = typed_parts(value) else {
        return decode_value(value).map(Argument::Value);
    };
    match kind {
        "g:Date" | "g:Timestamp" => inner
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            .map(Argument::Date)
            .ok_or_else(|| format!("Invalid date {}", inner)),
        "g:T" => match inner.as_str() {
            Some("id") => Ok(Argument::Token(Token::Id)),
            Some("label") => Ok(Argument::Token(Token::Label)),
            _ => Err(format!("Unknown token {}", inner)),
        },
        "g:Order" => match inner.as_str() {
            Some("asc") => Ok(Argument::Order(SortDirection::Asc)),
            Some("desc") => Ok(Argument::Order(SortDirection::Desc)),
            _ => Err(format!("Unknown order {}", inner)),
        },
        "g:P" | "g:TextP" => decode_predicate(inner).map(Argument::Predicate),
        "g:Bytecode" => decode_steps(inner, true).map(Argument::Traversal),
        _ => decode_value(value).map(Argument::Value),
    }
}

fn decode_steps(body: &Value, anonymous: bool) -> Result<Traversal, String> {
    let steps = match body.get("step") {
        None => &[][..],
        Some(Value::Array(steps)) => steps.as_slice(),
        Some(other) => return Err(format!("Malformed step list {}", other)),
    };

    let mut traversal = if anonymous { Traversal::anonymous() } else { Traversal::g() };
    for instruction in steps {
        let Some((name, args)) = instruction.as_array().and_then(|i| i.split_first()) else {
            return Err(format!("Malformed instruction {}", instruction));
        };
        let name = name.as_str().ok_or("Step name must be a string")?;
        let args = args.iter().map(decode_argument).collect::<Result<Vec<_>, _>>()?;
        traversal = traversal.step(name, args);
    }
    Ok(traversal)
}

/// Inverse of [`encode_bytecode`].
pub fn decode_bytecode(value: &Value) -> Result<Traversal, String> {
    match typed_parts(value) {
        Some(("g:Bytecode", body)) => decode_steps(body, false),
        _ => Err("Request is not g:Bytecode".to_string()),
    }
}

fn key_to_string(key: Value) -> String {
    match key {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

fn strip_map_pairs(pairs: Vec<Value>) -> Value {
    let mut out = Map::new();
    let mut iter = pairs.into_iter();
    while let Some(k) = iter.next() {
        let v = iter.next().unwrap_or(Value::Null);
        out.insert(key_to_string(strip(k)), strip(v));
    }
    Value::Object(out)
}

fn strip_element(mut body: Map<String, Value>) -> Map<String, Value> {
    let mut out = Map::new();
    if let Some(id) = body.remove("id") {
        out.insert("id".into(), strip(id));
    }
    if let Some(label) = body.remove("label") {
        out.insert("label".into(), strip(label));
    }
    // GraphSON 2 vertices inline their properties; keep the first value of each.
    if let Some(Value::Object(props)) = body.remove("properties") {
        for (k, v) in props {
            let v = match strip(v) {
                Value::Array(mut vs) if !vs.is_empty() => vs.swap_remove(0),
                other => other,
            };
            out.insert(k, v);
        }
    }
    out
}

fn endpoint(body: &mut Map<String, Value>, id_key: &str, label_key: &str) -> Value {
    let mut ep = Map::new();
    ep.insert("id".into(), body.remove(id_key).map(strip).unwrap_or(Value::Null));
    ep.insert("label".into(), body.remove(label_key).map(strip).unwrap_or(Value::Null));
    Value::Object(ep)
}

fn strip_typed(kind: &str, value: Value) -> Value {
    match (kind, value) {
        ("g:List" | "g:Set", Value::Array(items)) => Value::Array(items.into_iter().map(strip).collect()),
        ("g:Map", Value::Array(pairs)) => strip_map_pairs(pairs),
        ("g:BulkSet", Value::Array(pairs)) => {
            let mut out = Vec::new();
            let mut iter = pairs.into_iter();
            while let Some(v) = iter.next() {
                let bulk = iter.next().map(strip).and_then(|b| b.as_u64()).unwrap_or(1);
                let v = strip(v);
                for _ in 0..bulk {
                    out.push(v.clone());
                }
            }
            Value::Array(out)
        }
        ("g:Vertex", Value::Object(body)) => Value::Object(strip_element(body)),
        ("g:Edge", Value::Object(mut body)) => {
            let inbound = endpoint(&mut body, "inV", "inVLabel");
            let outbound = endpoint(&mut body, "outV", "outVLabel");
            let mut out = strip_element(body);
            out.insert("IN".into(), inbound);
            out.insert("OUT".into(), outbound);
            Value::Object(out)
        }
        ("g:VertexProperty" | "g:Property" | "g:Traverser", Value::Object(mut body)) => {
            body.remove("value").map(strip).unwrap_or(Value::Null)
        }
        (_, other) => strip(other),
    }
}

fn strip(value: Value) -> Value {
    match value {
        Value::Object(mut map) => {
            let is_typed = map.len() == 2
                && matches!(map.get("@type"), Some(Value::String(_)))
                && map.contains_key("@value");
            if is_typed {
                if let (Some(Value::String(kind)), Some(inner)) = (map.remove("@type"), map.remove("@value")) {
                    return strip_typed(&kind, inner);
                }
            }
            Value::Object(map.into_iter().map(|(k, v)| (k, strip(v))).collect())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(strip).collect()),
        scalar => scalar,
    }
}

/// Strips transport wrappers from a raw response. Records directly inside a
/// top-level list lose their `label` key.
pub fn normalize(raw: Value) -> Value {
    match strip(raw) {
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| match item {
                    Value::Object(mut m) => {
                        m.remove("label");
                        Value::Object(m)
                    }
                    other => other,
                })
                .collect(),
        ),
        other => other,
    }
}

fn reference(endpoint: Option<Value>) -> Option<String> {
    let Some(Value::Object(ep)) = endpoint else {
        return None;
    };
    let label = key_to_string(ep.get("label")?.clone());
    let id = key_to_string(ep.get("id")?.clone());
    Some(format!("{}/{}", label, id))
}

/// Collapses the `IN`/`OUT` endpoint maps of a normalized edge into `to`/`from` references.
pub fn convert_edge(mut record: Record) -> Record {
    record.remove("label");
    if let Some(to) = reference(record.remove("IN")) {
        record.insert(TO_FIELD.into(), Value::String(to));
    }
    if let Some(from) = reference(record.remove("OUT")) {
        record.insert(FROM_FIELD.into(), Value::String(from));
    }
    record
}
