// In-process Gremlin server.
//
// Interprets the step vocabulary the query builder emits over a small property graph
// and answers in GraphSON 3, the same shape a remote server sends. Requests go through
// the bytecode codec, so whatever reaches this graph has survived the wire encoding.
// Each submission is atomic: it runs against a scratch copy that replaces the graph
// only when every step succeeded.

use super::{ExecutionMode, GraphConnection, TransportError};
use crate::graph::graphson::{decode_bytecode, encode_bytecode};
use crate::graph::traversal::{Argument, Predicate, Token, Traversal};
use async_trait::async_trait;
use graphmap_common::SortDirection;
use serde_json::{json, Map, Value};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Mutex;
use uuid::Uuid;

const INVALID_REQUEST: u16 = 499;
const EVALUATION_ERROR: u16 = 597;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum ElementKind {
    Vertex,
    Edge,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ElementRef {
    kind: ElementKind,
    key: String,
}

#[derive(Debug, Clone)]
struct Element {
    id: Value,
    label: String,
    properties: Map<String, Value>,
    /// `(out, in)` vertex keys of an edge.
    endpoints: Option<(String, String)>,
}

fn id_key(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone, Default)]
struct Store {
    vertices: Vec<Element>,
    edges: Vec<Element>,
}

impl Store {
    fn elements(&self, kind: ElementKind) -> &Vec<Element> {
        match kind {
            ElementKind::Vertex => &self.vertices,
            ElementKind::Edge => &self.edges,
        }
    }

    fn elements_mut(&mut self, kind: ElementKind) -> &mut Vec<Element> {
        match kind {
            ElementKind::Vertex => &mut self.vertices,
            ElementKind::Edge => &mut self.edges,
        }
    }

    fn get(&self, r: &ElementRef) -> Option<&Element> {
        self.elements(r.kind).iter().find(|e| id_key(&e.id) == r.key)
    }

    fn get_mut(&mut self, r: &ElementRef) -> Option<&mut Element> {
        self.elements_mut(r.kind).iter_mut().find(|e| id_key(&e.id) == r.key)
    }

    fn insert(&mut self, kind: ElementKind, element: Element) -> ElementRef {
        let r = ElementRef {
            kind,
            key: id_key(&element.id),
        };
        self.elements_mut(kind).push(element);
        r
    }

    /// Removing a vertex removes its incident edges.
    fn remove(&mut self, r: &ElementRef) {
        self.elements_mut(r.kind).retain(|e| id_key(&e.id) != r.key);
        if r.kind == ElementKind::Vertex {
            self.edges.retain(|e| match &e.endpoints {
                Some((out, inv)) => *out != r.key && *inv != r.key,
                None => true,
            });
        }
    }

    fn endpoint(&self, key: &str) -> Option<&Element> {
        self.vertices.iter().find(|v| id_key(&v.id) == key)
    }
}

/// Result of `elementMap`.
#[derive(Debug, Clone)]
struct Projection {
    id: Value,
    label: String,
    endpoints: Option<((Value, String), (Value, String))>,
    properties: Map<String, Value>,
}

#[derive(Debug, Clone)]
enum Item {
    Element(ElementRef),
    Property { owner: ElementRef, key: String },
    Projection(Projection),
    Value(Value),
}

fn evaluation_error(message: impl Into<String>) -> TransportError {
    TransportError::new(EVALUATION_ERROR, message)
}

fn invalid_request(message: impl Into<String>) -> TransportError {
    TransportError::new(INVALID_REQUEST, message)
}

fn date_tag(millis: i64) -> Value {
    json!({"@type": "g:Date", "@value": millis})
}

fn date_millis(value: &Value) -> Option<i64> {
    let map = value.as_object()?;
    if map.get("@type")?.as_str()? == "g:Date" {
        map.get("@value")?.as_i64()
    } else {
        None
    }
}

enum Comparable<'a> {
    Number(f64),
    Text(&'a str),
    Bool(bool),
}

fn comparable(value: &Value) -> Option<Comparable<'_>> {
    match value {
        Value::Number(n) => n.as_f64().map(Comparable::Number),
        Value::String(s) => Some(Comparable::Text(s)),
        Value::Bool(b) => Some(Comparable::Bool(*b)),
        other => date_millis(other).map(|ms| Comparable::Number(ms as f64)),
    }
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (comparable(a)?, comparable(b)?) {
        (Comparable::Number(x), Comparable::Number(y)) => x.partial_cmp(&y),
        (Comparable::Text(x), Comparable::Text(y)) => Some(x.cmp(y)),
        (Comparable::Bool(x), Comparable::Bool(y)) => Some(x.cmp(&y)),
        _ => None,
    }
}

fn equals(a: &Value, b: &Value) -> bool {
    compare(a, b) == Some(Ordering::Equal) || a == b
}

fn test_predicate(predicate: &Predicate, actual: &Value) -> bool {
    let is = |v: &Value, wanted: &[Ordering]| compare(actual, v).is_some_and(|o| wanted.contains(&o));
    match predicate {
        Predicate::Eq(v) => equals(actual, v),
        Predicate::Neq(v) => !equals(actual, v),
        Predicate::Gt(v) => is(v, &[Ordering::Greater]),
        Predicate::Gte(v) => is(v, &[Ordering::Greater, Ordering::Equal]),
        Predicate::Lt(v) => is(v, &[Ordering::Less]),
        Predicate::Lte(v) => is(v, &[Ordering::Less, Ordering::Equal]),
        Predicate::Between(low, high) => {
            is(low, &[Ordering::Greater, Ordering::Equal]) && is(high, &[Ordering::Less])
        }
        Predicate::Within(vs) => vs.iter().any(|v| equals(actual, v)),
        Predicate::Without(vs) => !vs.iter().any(|v| equals(actual, v)),
        Predicate::Containing(s) => actual.as_str().is_some_and(|a| a.contains(s.as_str())),
        Predicate::NotContaining(s) => actual.as_str().is_some_and(|a| !a.contains(s.as_str())),
    }
}

/// Ids compare by their text form, so `V(1)` and `V('1')` address the same element.
fn id_predicate(predicate: &Predicate) -> Predicate {
    let text = |v: &Value| Value::String(id_key(v));
    let all = |vs: &Vec<Value>| -> Vec<Value> { vs.iter().map(text).collect() };
    match predicate {
        Predicate::Eq(v) => Predicate::Eq(text(v)),
        Predicate::Neq(v) => Predicate::Neq(text(v)),
        Predicate::Gt(v) => Predicate::Gt(text(v)),
        Predicate::Gte(v) => Predicate::Gte(text(v)),
        Predicate::Lt(v) => Predicate::Lt(text(v)),
        Predicate::Lte(v) => Predicate::Lte(text(v)),
        Predicate::Between(low, high) => Predicate::Between(text(low), text(high)),
        Predicate::Within(vs) => Predicate::Within(all(vs)),
        Predicate::Without(vs) => Predicate::Without(all(vs)),
        other => other.clone(),
    }
}

/// Converts a step argument to the value stored on an element.
fn stored_value(arg: &Argument) -> Result<Value, TransportError> {
    match arg {
        Argument::Value(v) => Ok(v.clone()),
        Argument::Date(d) => Ok(date_tag(d.timestamp_millis())),
        other => Err(invalid_request(format!("Cannot store {}", other))),
    }
}

fn text_args(args: &[Argument]) -> Result<Vec<String>, TransportError> {
    args.iter()
        .map(|a| match a {
            Argument::Value(Value::String(s)) => Ok(s.clone()),
            other => Err(invalid_request(format!("Expected a key, got {}", other))),
        })
        .collect()
}

fn count_arg(args: &[Argument]) -> Result<usize, TransportError> {
    match args.first() {
        Some(Argument::Value(v)) => v
            .as_u64()
            .map(|n| n as usize)
            .ok_or_else(|| invalid_request(format!("Expected a count, got {}", v))),
        _ => Err(invalid_request("Expected a count")),
    }
}

fn child_traversals(args: &[Argument]) -> Result<Vec<&Traversal>, TransportError> {
    args.iter()
        .map(|a| match a {
            Argument::Traversal(t) => Ok(t),
            other => Err(invalid_request(format!("Expected a traversal, got {}", other))),
        })
        .collect()
}

fn encode_id(id: &Value) -> Value {
    encode_stored(id)
}

fn encode_stored(value: &Value) -> Value {
    match value {
        Value::Number(n) if n.is_f64() => json!({"@type": "g:Double", "@value": n}),
        Value::Number(n) => json!({"@type": "g:Int64", "@value": n}),
        Value::Array(items) => json!({"@type": "g:List", "@value": items.iter().map(encode_stored).collect::<Vec<_>>()}),
        other => other.clone(),
    }
}

fn token(name: &str) -> Value {
    json!({"@type": "g:T", "@value": name})
}

fn direction(name: &str) -> Value {
    json!({"@type": "g:Direction", "@value": name})
}

fn endpoint_map(id: &Value, label: &str) -> Value {
    json!({"@type": "g:Map", "@value": [token("id"), encode_id(id), token("label"), label]})
}

/// Per-submission evaluation state.
struct Evaluation<'a> {
    store: &'a mut Store,
    /// Elements added by this submission; only these may have their id assigned.
    created: HashSet<ElementRef>,
}

impl<'a> Evaluation<'a> {
    fn run(&mut self, traversal: &Traversal, input: Vec<Item>) -> Result<Vec<Item>, TransportError> {
        let steps = traversal.steps();
        let mut stream = input;
        let mut i = 0;

        while i < steps.len() {
            let step = &steps[i];
            let args = step.args.as_slice();
            stream = match step.name.as_str() {
                "V" | "E" => {
                    let kind = if step.name == "V" { ElementKind::Vertex } else { ElementKind::Edge };
                    let ids = args
                        .iter()
                        .map(|a| match a {
                            Argument::Value(v) => Ok(id_key(v)),
                            other => Err(invalid_request(format!("Invalid id {}", other))),
                        })
                        .collect::<Result<Vec<_>, _>>()?;
                    let matched: Vec<Item> = self
                        .store
                        .elements(kind)
                        .iter()
                        .map(|e| id_key(&e.id))
                        .filter(|key| ids.is_empty() || ids.contains(key))
                        .map(|key| Item::Element(ElementRef { kind, key }))
                        .collect();
                    stream.iter().flat_map(|_| matched.clone()).collect()
                }
                "hasLabel" => {
                    let labels = text_args(args)?;
                    stream
                        .into_iter()
                        .filter(|item| self.element(item).is_some_and(|e| labels.contains(&e.label)))
                        .collect()
                }
                "has" => {
                    let (key, test) = match args {
                        [key, test] => (key, test),
                        _ => return Err(invalid_request("has expects a key and a test")),
                    };
                    let mut kept = Vec::new();
                    for item in stream {
                        if self.has(&item, key, test)? {
                            kept.push(item);
                        }
                    }
                    kept
                }
                "hasNot" => {
                    let keys = text_args(args)?;
                    stream
                        .into_iter()
                        .filter(|item| {
                            self.element(item)
                                .is_some_and(|e| keys.iter().all(|k| !e.properties.contains_key(k)))
                        })
                        .collect()
                }
                "or" | "and" => {
                    let children = child_traversals(args)?;
                    let any = step.name == "or";
                    let mut kept = Vec::new();
                    for item in stream {
                        let mut matched = !any;
                        for child in &children {
                            let hit = !self.run(child, vec![item.clone()])?.is_empty();
                            if any && hit {
                                matched = true;
                                break;
                            }
                            if !any && !hit {
                                matched = false;
                                break;
                            }
                        }
                        if matched {
                            kept.push(item);
                        }
                    }
                    kept
                }
                "addV" => {
                    let label = text_args(args)?.into_iter().next().unwrap_or_else(|| "vertex".into());
                    stream
                        .iter()
                        .map(|_| self.create(ElementKind::Vertex, &label, None))
                        .collect()
                }
                "addE" => {
                    let label = text_args(args)?
                        .into_iter()
                        .next()
                        .ok_or_else(|| invalid_request("addE requires a label"))?;
                    let target = match steps.get(i + 1) {
                        Some(next) if next.name == "to" => match next.args.as_slice() {
                            [Argument::Traversal(t)] => t,
                            _ => return Err(invalid_request("to expects a traversal")),
                        },
                        _ => return Err(invalid_request("addE requires a to() modulator")),
                    };
                    i += 1;

                    let mut added = Vec::new();
                    for item in stream {
                        let Item::Element(from) = &item else {
                            return Err(evaluation_error("addE must start from a vertex"));
                        };
                        let to = self
                            .run(target, vec![item.clone()])?
                            .into_iter()
                            .find_map(|t| match t {
                                Item::Element(r) if r.kind == ElementKind::Vertex => Some(r),
                                _ => None,
                            })
                            .ok_or_else(|| {
                                evaluation_error("The provided traverser does not map to a value")
                            })?;
                        added.push(self.create(ElementKind::Edge, &label, Some((from.key.clone(), to.key))));
                    }
                    added
                }
                "property" => {
                    let (key, value) = match args {
                        [key, value] => (key, stored_value(value)?),
                        _ => return Err(invalid_request("property expects a key and a value")),
                    };
                    let mut out = Vec::with_capacity(stream.len());
                    for item in stream {
                        out.push(self.set_property(item, key, &value)?);
                    }
                    out
                }
                "sideEffect" => {
                    let children = child_traversals(args)?;
                    for item in &stream {
                        for child in &children {
                            self.run(child, vec![item.clone()])?;
                        }
                    }
                    stream
                }
                "properties" => {
                    let keys = text_args(args)?;
                    let mut out = Vec::new();
                    for item in &stream {
                        if let (Item::Element(r), Some(e)) = (item, self.element(item)) {
                            for k in e.properties.keys() {
                                if keys.is_empty() || keys.contains(k) {
                                    out.push(Item::Property {
                                        owner: r.clone(),
                                        key: k.clone(),
                                    });
                                }
                            }
                        }
                    }
                    out
                }
                "drop" => {
                    for item in stream {
                        match item {
                            Item::Element(r) => self.store.remove(&r),
                            Item::Property { owner, key } => {
                                if let Some(e) = self.store.get_mut(&owner) {
                                    e.properties.remove(&key);
                                }
                            }
                            _ => return Err(evaluation_error("Only elements and properties can be dropped")),
                        }
                    }
                    Vec::new()
                }
                "elementMap" => {
                    let keys = text_args(args)?;
                    stream
                        .iter()
                        .filter_map(|item| self.project(item, &keys))
                        .map(Item::Projection)
                        .collect()
                }
                "order" => {
                    let mut criteria = Vec::new();
                    while let Some(next) = steps.get(i + 1).filter(|s| s.name == "by") {
                        match next.args.as_slice() {
                            [Argument::Value(Value::String(key)), Argument::Order(dir)] => {
                                criteria.push((key.clone(), *dir))
                            }
                            _ => return Err(invalid_request("by expects a key and an order")),
                        }
                        i += 1;
                    }
                    let mut keyed: Vec<(Vec<Option<Value>>, Item)> = stream
                        .into_iter()
                        .map(|item| {
                            let keys = criteria.iter().map(|(k, _)| self.sort_value(&item, k)).collect();
                            (keys, item)
                        })
                        .collect();
                    keyed.sort_by(|(a, _), (b, _)| {
                        for (idx, (_, dir)) in criteria.iter().enumerate() {
                            let ord = match (&a[idx], &b[idx]) {
                                (Some(x), Some(y)) => compare(x, y).unwrap_or(Ordering::Equal),
                                (None, Some(_)) => Ordering::Less,
                                (Some(_), None) => Ordering::Greater,
                                (None, None) => Ordering::Equal,
                            };
                            let ord = if *dir == SortDirection::Desc { ord.reverse() } else { ord };
                            if ord != Ordering::Equal {
                                return ord;
                            }
                        }
                        Ordering::Equal
                    });
                    keyed.into_iter().map(|(_, item)| item).collect()
                }
                "skip" => {
                    let n = count_arg(args)?;
                    stream.into_iter().skip(n).collect()
                }
                "limit" => {
                    let n = count_arg(args)?;
                    stream.into_iter().take(n).collect()
                }
                "count" => vec![Item::Value(Value::from(stream.len() as u64))],
                "identity" => stream,
                other => return Err(invalid_request(format!("Unsupported step {}", other))),
            };
            i += 1;
        }

        Ok(stream)
    }

    fn element(&self, item: &Item) -> Option<&Element> {
        match item {
            Item::Element(r) => self.store.get(r),
            _ => None,
        }
    }

    fn create(&mut self, kind: ElementKind, label: &str, endpoints: Option<(String, String)>) -> Item {
        let element = Element {
            id: Value::String(Uuid::new_v4().to_string()),
            label: label.to_string(),
            properties: Map::new(),
            endpoints,
        };
        let r = self.store.insert(kind, element);
        self.created.insert(r.clone());
        Item::Element(r)
    }

    fn has(&self, item: &Item, key: &Argument, test: &Argument) -> Result<bool, TransportError> {
        let Some(element) = self.element(item) else {
            return Ok(false);
        };
        let (actual, by_id) = match key {
            Argument::Token(Token::Id) => (Value::String(id_key(&element.id)), true),
            Argument::Token(Token::Label) => (Value::String(element.label.clone()), false),
            Argument::Value(Value::String(k)) => match element.properties.get(k) {
                Some(v) => (v.clone(), false),
                None => return Ok(false),
            },
            other => return Err(invalid_request(format!("Invalid property key {}", other))),
        };

        Ok(match test {
            Argument::Predicate(p) if by_id => test_predicate(&id_predicate(p), &actual),
            Argument::Predicate(p) => test_predicate(p, &actual),
            Argument::Value(v) if by_id => actual == Value::String(id_key(v)),
            Argument::Value(v) => equals(&actual, v),
            Argument::Date(d) => equals(&actual, &date_tag(d.timestamp_millis())),
            other => return Err(invalid_request(format!("Invalid has() test {}", other))),
        })
    }

    fn set_property(&mut self, item: Item, key: &Argument, value: &Value) -> Result<Item, TransportError> {
        let Item::Element(r) = item else {
            return Err(evaluation_error("property() requires an element"));
        };
        match key {
            Argument::Token(Token::Id) => {
                if !self.created.contains(&r) {
                    return Err(evaluation_error("Element ids cannot be changed once assigned"));
                }
                let new_key = id_key(value);
                if new_key != r.key && self.store.get(&ElementRef { kind: r.kind, key: new_key.clone() }).is_some() {
                    let kind = if r.kind == ElementKind::Vertex { "Vertex" } else { "Edge" };
                    return Err(evaluation_error(format!("{} with id already exists: {}", kind, new_key)));
                }
                if let Some(e) = self.store.get_mut(&r) {
                    e.id = value.clone();
                }
                self.created.remove(&r);
                let renamed = ElementRef { kind: r.kind, key: new_key };
                self.created.insert(renamed.clone());
                Ok(Item::Element(renamed))
            }
            Argument::Value(Value::String(k)) => {
                if let Some(e) = self.store.get_mut(&r) {
                    e.properties.insert(k.clone(), value.clone());
                }
                Ok(Item::Element(r))
            }
            other => Err(invalid_request(format!("Invalid property key {}", other))),
        }
    }

    fn project(&self, item: &Item, keys: &[String]) -> Option<Projection> {
        let element = self.element(item)?;
        let endpoints = element.endpoints.as_ref().map(|(out, inv)| {
            let describe = |key: &String| match self.store.endpoint(key) {
                Some(v) => (v.id.clone(), v.label.clone()),
                None => (Value::String(key.clone()), String::new()),
            };
            (describe(inv), describe(out))
        });
        let properties = element
            .properties
            .iter()
            .filter(|(k, _)| keys.is_empty() || keys.contains(k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Some(Projection {
            id: element.id.clone(),
            label: element.label.clone(),
            endpoints,
            properties,
        })
    }

    fn sort_value(&self, item: &Item, key: &str) -> Option<Value> {
        match item {
            Item::Element(_) => self.element(item)?.properties.get(key).cloned(),
            Item::Projection(p) => p.properties.get(key).cloned(),
            _ => None,
        }
    }

    fn encode(&self, item: &Item) -> Value {
        match item {
            Item::Element(r) => match self.store.get(r) {
                None => Value::Null,
                Some(e) => match (&r.kind, &e.endpoints) {
                    (ElementKind::Edge, Some((out, inv))) => {
                        let label_of = |k: &String| self.store.endpoint(k).map(|v| v.label.clone());
                        json!({"@type": "g:Edge", "@value": {
                            "id": encode_id(&e.id), "label": e.label,
                            "inV": inv, "inVLabel": label_of(inv),
                            "outV": out, "outVLabel": label_of(out)
                        }})
                    }
                    _ => json!({"@type": "g:Vertex", "@value": {"id": encode_id(&e.id), "label": e.label}}),
                },
            },
            Item::Property { owner, key } => {
                let value = self
                    .store
                    .get(owner)
                    .and_then(|e| e.properties.get(key))
                    .map(encode_stored)
                    .unwrap_or(Value::Null);
                json!({"@type": "g:Property", "@value": {"key": key, "value": value}})
            }
            Item::Projection(p) => {
                let mut pairs = vec![token("id"), encode_id(&p.id), token("label"), Value::from(p.label.as_str())];
                if let Some(((in_id, in_label), (out_id, out_label))) = &p.endpoints {
                    pairs.push(direction("IN"));
                    pairs.push(endpoint_map(in_id, in_label));
                    pairs.push(direction("OUT"));
                    pairs.push(endpoint_map(out_id, out_label));
                }
                for (k, v) in &p.properties {
                    pairs.push(Value::from(k.as_str()));
                    pairs.push(encode_stored(v));
                }
                json!({"@type": "g:Map", "@value": pairs})
            }
            Item::Value(v) => encode_stored(v),
        }
    }
}

/// Property graph held in memory, speaking the same protocol as a remote server.
#[derive(Default)]
pub struct MemoryGraph {
    store: Mutex<Store>,
    submitted: Mutex<Vec<String>>,
    reconnects: AtomicUsize,
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Gremlin text of every traversal received, oldest first.
    pub fn submitted(&self) -> Vec<String> {
        self.submitted.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn reconnects(&self) -> usize {
        self.reconnects.load(AtomicOrdering::SeqCst)
    }

    pub fn vertex_count(&self) -> usize {
        self.store.lock().unwrap_or_else(|e| e.into_inner()).vertices.len()
    }

    pub fn edge_count(&self) -> usize {
        self.store.lock().unwrap_or_else(|e| e.into_inner()).edges.len()
    }

    fn evaluate(&self, traversal: &Traversal, mode: ExecutionMode) -> Result<Value, TransportError> {
        let mut store = self.store.lock().unwrap_or_else(|e| e.into_inner());
        let mut scratch = store.clone();

        let mut eval = Evaluation {
            store: &mut scratch,
            created: HashSet::new(),
        };
        let results = eval.run(traversal, vec![Item::Value(Value::Null)])?;

        let response = match mode {
            ExecutionMode::ToList => {
                json!({"@type": "g:List", "@value": results.iter().map(|r| eval.encode(r)).collect::<Vec<_>>()})
            }
            ExecutionMode::Next => results.first().map(|r| eval.encode(r)).unwrap_or(Value::Null),
            ExecutionMode::Iterate => Value::Null,
        };

        *store = scratch;
        Ok(response)
    }
}

#[async_trait]
impl GraphConnection for MemoryGraph {
    async fn submit(&self, traversal: &Traversal, mode: ExecutionMode) -> Result<Value, TransportError> {
        let wire = encode_bytecode(traversal);
        let request = decode_bytecode(&wire).map_err(invalid_request)?;
        if request.is_anonymous() || request.is_empty() {
            return Err(invalid_request("Cannot submit an empty or anonymous traversal"));
        }

        self.submitted
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.to_string());
        tracing::trace!("memory graph evaluating {} ({})", request, mode);

        self.evaluate(&request, mode)
    }

    async fn reconnect(&self) -> Result<(), TransportError> {
        self.reconnects.fetch_add(1, AtomicOrdering::SeqCst);
        Ok(())
    }
}
