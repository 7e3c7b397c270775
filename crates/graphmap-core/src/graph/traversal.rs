// Traversal bytecode: an append-only list of Gremlin steps.
//
// Built fluently by the query builder and filter compiler, rendered as Gremlin text for
// logging, and encoded as GraphSON bytecode (see `graphson`) for the wire.

use chrono::{DateTime, SecondsFormat, Utc};
use graphmap_common::SortDirection;
use serde_json::Value;
use std::fmt;

/// Process-level tokens (`T.id`, `T.label`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Token {
    Id,
    Label,
}

impl Token {
    pub fn as_str(&self) -> &'static str {
        match self {
            Token::Id => "id",
            Token::Label => "label",
        }
    }
}

/// `P` and `TextP` predicates.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Eq(Value),
    Neq(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    Between(Value, Value),
    Within(Vec<Value>),
    Without(Vec<Value>),
    Containing(String),
    NotContaining(String),
}

impl Predicate {
    pub fn name(&self) -> &'static str {
        match self {
            Predicate::Eq(_) => "eq",
            Predicate::Neq(_) => "neq",
            Predicate::Gt(_) => "gt",
            Predicate::Gte(_) => "gte",
            Predicate::Lt(_) => "lt",
            Predicate::Lte(_) => "lte",
            Predicate::Between(..) => "between",
            Predicate::Within(_) => "within",
            Predicate::Without(_) => "without",
            Predicate::Containing(_) => "containing",
            Predicate::NotContaining(_) => "notContaining",
        }
    }

    /// Text predicates travel as `g:TextP` instead of `g:P`.
    pub fn is_text(&self) -> bool {
        matches!(self, Predicate::Containing(_) | Predicate::NotContaining(_))
    }

    /// Operands in wire order.
    pub fn operands(&self) -> Vec<Value> {
        match self {
            Predicate::Eq(v)
            | Predicate::Neq(v)
            | Predicate::Gt(v)
            | Predicate::Gte(v)
            | Predicate::Lt(v)
            | Predicate::Lte(v) => vec![v.clone()],
            Predicate::Between(low, high) => vec![low.clone(), high.clone()],
            Predicate::Within(vs) | Predicate::Without(vs) => vs.clone(),
            Predicate::Containing(s) | Predicate::NotContaining(s) => vec![Value::String(s.clone())],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Argument {
    Value(Value),
    Date(DateTime<Utc>),
    Token(Token),
    Order(SortDirection),
    Predicate(Predicate),
    Traversal(Traversal),
}

impl From<Value> for Argument {
    fn from(v: Value) -> Self {
        Argument::Value(v)
    }
}

impl From<&str> for Argument {
    fn from(s: &str) -> Self {
        Argument::Value(Value::String(s.to_string()))
    }
}

impl From<String> for Argument {
    fn from(s: String) -> Self {
        Argument::Value(Value::String(s))
    }
}

impl From<u64> for Argument {
    fn from(n: u64) -> Self {
        Argument::Value(Value::from(n))
    }
}

impl From<bool> for Argument {
    fn from(b: bool) -> Self {
        Argument::Value(Value::Bool(b))
    }
}

impl From<DateTime<Utc>> for Argument {
    fn from(d: DateTime<Utc>) -> Self {
        Argument::Date(d)
    }
}

impl From<Token> for Argument {
    fn from(t: Token) -> Self {
        Argument::Token(t)
    }
}

impl From<Predicate> for Argument {
    fn from(p: Predicate) -> Self {
        Argument::Predicate(p)
    }
}

impl From<Traversal> for Argument {
    fn from(t: Traversal) -> Self {
        Argument::Traversal(t)
    }
}

/// Property key position of `has`/`property`: either a name or the identity token.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PropertyKey {
    Id,
    Name(String),
}

impl PropertyKey {
    /// The primary-key field never appears as a literal property name.
    pub fn for_field(field: &str) -> Self {
        if field == graphmap_common::ID_FIELD {
            PropertyKey::Id
        } else {
            PropertyKey::Name(field.to_string())
        }
    }
}

impl From<PropertyKey> for Argument {
    fn from(k: PropertyKey) -> Self {
        match k {
            PropertyKey::Id => Argument::Token(Token::Id),
            PropertyKey::Name(name) => Argument::Value(Value::String(name)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub name: String,
    pub args: Vec<Argument>,
}

impl Step {
    pub fn new(name: impl Into<String>, args: Vec<Argument>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }
}

/// Composed Gremlin traversal. `g` is a traversal spawned from the source;
/// anonymous traversals (`__`) appear nested inside step arguments.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Traversal {
    steps: Vec<Step>,
    anonymous: bool,
}

impl Traversal {
    /// `g`: root traversal spawned from the graph traversal source.
    pub fn g() -> Self {
        Self {
            steps: Vec::new(),
            anonymous: false,
        }
    }

    /// `__`: anonymous child traversal.
    pub fn anonymous() -> Self {
        Self {
            steps: Vec::new(),
            anonymous: true,
        }
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn is_anonymous(&self) -> bool {
        self.anonymous
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn step(mut self, name: impl Into<String>, args: Vec<Argument>) -> Self {
        self.steps.push(Step::new(name, args));
        self
    }

    pub fn v(self, ids: Vec<Value>) -> Self {
        let args = ids.into_iter().map(Argument::Value).collect();
        self.step("V", args)
    }

    pub fn e(self, ids: Vec<Value>) -> Self {
        let args = ids.into_iter().map(Argument::Value).collect();
        self.step("E", args)
    }

    pub fn has_label(self, label: impl Into<String>) -> Self {
        self.step("hasLabel", vec![Argument::from(label.into())])
    }

    pub fn has(self, key: PropertyKey, value: impl Into<Argument>) -> Self {
        self.step("has", vec![key.into(), value.into()])
    }

    pub fn has_not(self, key: impl Into<String>) -> Self {
        self.step("hasNot", vec![Argument::from(key.into())])
    }

    pub fn or(self, children: Vec<Traversal>) -> Self {
        let args = children.into_iter().map(Argument::Traversal).collect();
        self.step("or", args)
    }

    pub fn and(self, children: Vec<Traversal>) -> Self {
        let args = children.into_iter().map(Argument::Traversal).collect();
        self.step("and", args)
    }

    pub fn add_v(self, label: impl Into<String>) -> Self {
        self.step("addV", vec![Argument::from(label.into())])
    }

    pub fn add_e(self, label: impl Into<String>) -> Self {
        self.step("addE", vec![Argument::from(label.into())])
    }

    pub fn to(self, target: Traversal) -> Self {
        self.step("to", vec![Argument::Traversal(target)])
    }

    pub fn property(self, key: PropertyKey, value: impl Into<Argument>) -> Self {
        self.step("property", vec![key.into(), value.into()])
    }

    pub fn side_effect(self, child: Traversal) -> Self {
        self.step("sideEffect", vec![Argument::Traversal(child)])
    }

    pub fn properties<S: Into<String>>(self, keys: impl IntoIterator<Item = S>) -> Self {
        let args = keys.into_iter().map(|k| Argument::from(k.into())).collect();
        self.step("properties", args)
    }

    pub fn drop(self) -> Self {
        self.step("drop", Vec::new())
    }

    pub fn element_map<S: Into<String>>(self, keys: impl IntoIterator<Item = S>) -> Self {
        let args = keys.into_iter().map(|k| Argument::from(k.into())).collect();
        self.step("elementMap", args)
    }

    pub fn order(self) -> Self {
        self.step("order", Vec::new())
    }

    pub fn by(self, key: impl Into<String>, direction: SortDirection) -> Self {
        self.step("by", vec![Argument::from(key.into()), Argument::Order(direction)])
    }

    pub fn skip(self, n: u64) -> Self {
        self.step("skip", vec![Argument::from(n)])
    }

    pub fn limit(self, n: u64) -> Self {
        self.step("limit", vec![Argument::from(n)])
    }

    pub fn count(self) -> Self {
        self.step("count", Vec::new())
    }
}

fn write_value(f: &mut fmt::Formatter<'_>, value: &Value) -> fmt::Result {
    match value {
        Value::String(s) => write!(f, "'{}'", s.replace('\\', "\\\\").replace('\'', "\\'")),
        Value::Array(items) => {
            f.write_str("[")?;
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    f.write_str(",")?;
                }
                write_value(f, item)?;
            }
            f.write_str("]")
        }
        Value::Object(_) => write!(f, "'{}'", value),
        other => write!(f, "{}", other),
    }
}

fn write_values(f: &mut fmt::Formatter<'_>, values: &[Value]) -> fmt::Result {
    for (i, v) in values.iter().enumerate() {
        if i > 0 {
            f.write_str(",")?;
        }
        write_value(f, v)?;
    }
    Ok(())
}

impl fmt::Display for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Argument::Value(v) => write_value(f, v),
            Argument::Date(d) => write!(f, "datetime('{}')", d.to_rfc3339_opts(SecondsFormat::Millis, true)),
            Argument::Token(t) => write!(f, "T.{}", t.as_str()),
            Argument::Order(SortDirection::Asc) => f.write_str("asc"),
            Argument::Order(SortDirection::Desc) => f.write_str("desc"),
            Argument::Predicate(p) => {
                write!(f, "{}(", p.name())?;
                write_values(f, &p.operands())?;
                f.write_str(")")
            }
            Argument::Traversal(t) => write!(f, "{}", t),
        }
    }
}

impl fmt::Display for Traversal {
    /// Gremlin-Groovy rendering, e.g. `g.V().hasLabel('Person').has('age',gt(30))`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(if self.anonymous { "__" } else { "g" })?;
        if self.steps.is_empty() && self.anonymous {
            return f.write_str(".identity()");
        }
        for step in &self.steps {
            write!(f, ".{}(", step.name)?;
            for (i, arg) in step.args.iter().enumerate() {
                if i > 0 {
                    f.write_str(",")?;
                }
                write!(f, "{}", arg)?;
            }
            f.write_str(")")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render_scan_with_predicates() {
        let t = Traversal::g()
            .v(vec![])
            .has_label("Person")
            .has(PropertyKey::for_field("age"), Predicate::Gt(json!(30)))
            .has(PropertyKey::for_field("id"), Predicate::Within(vec![json!("a"), json!("b")]))
            .element_map(["name", "age"])
            .order()
            .by("age", SortDirection::Desc)
            .skip(5)
            .limit(10);

        assert_eq!(
            t.to_string(),
            "g.V().hasLabel('Person').has('age',gt(30)).has(T.id,within('a','b'))\
             .elementMap('name','age').order().by('age',desc).skip(5).limit(10)"
        );
    }

    #[test]
    fn test_render_nested_anonymous() {
        let t = Traversal::g()
            .e(vec![json!("e1")])
            .or(vec![
                Traversal::anonymous().has(PropertyKey::for_field("since"), json!(2020)),
                Traversal::anonymous(),
            ])
            .side_effect(Traversal::anonymous().properties(Vec::<String>::new()).drop());

        assert_eq!(
            t.to_string(),
            "g.E('e1').or(__.has('since',2020),__.identity()).sideEffect(__.properties().drop())"
        );
    }

    #[test]
    fn test_render_escapes_quotes() {
        let t = Traversal::g().v(vec![]).has(PropertyKey::for_field("name"), "O'Brien");
        assert_eq!(t.to_string(), "g.V().has('name','O\\'Brien')");
    }
}
