use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;
use restweave::{CancellationToken, HttpClient, Request};

/// A run-time value passed to or produced by woven code.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Unit,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Bytes),
    /// String-keyed map, in insertion order.
    Map(Vec<(String, Value)>),
    Json(serde_json::Value),
    Cancel(CancellationToken),
    Client(HttpClient),
    Request(Request),
}

impl Value {
    pub fn str(s: impl Into<String>) -> Self {
        Value::Str(s.into())
    }

    pub fn map<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Value::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Value::Unit => "unit",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Map(_) => "map",
            Value::Json(_) => "json",
            Value::Cancel(_) => "cancellation token",
            Value::Client(_) => "client",
            Value::Request(_) => "request",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// JSON view of plain data; `None` for run-time handles.
    pub fn to_json(&self) -> Option<serde_json::Value> {
        use serde_json::Value as J;
        Some(match self {
            Value::Unit => J::Null,
            Value::Bool(b) => J::Bool(*b),
            Value::Int(i) => J::from(*i),
            Value::Float(f) => J::from(*f),
            Value::Str(s) => J::String(s.clone()),
            Value::Bytes(b) => J::Array(b.iter().map(|x| J::from(*x)).collect()),
            Value::Map(entries) => J::Object(
                entries
                    .iter()
                    .map(|(k, v)| Some((k.clone(), v.to_json()?)))
                    .collect::<Option<_>>()?,
            ),
            Value::Json(j) => j.clone(),
            Value::Cancel(_) | Value::Client(_) | Value::Request(_) => return None,
        })
    }
}

/// Renders values the way they appear in paths, queries and headers.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Unit => Ok(()),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Str(s) => f.write_str(s),
            Value::Bytes(b) => f.write_str(&String::from_utf8_lossy(b)),
            Value::Json(serde_json::Value::String(s)) => f.write_str(s),
            Value::Json(j) => write!(f, "{j}"),
            other => match other.to_json() {
                Some(j) => write!(f, "{j}"),
                None => write!(f, "<{}>", other.kind()),
            },
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Bytes> for Value {
    fn from(b: Bytes) -> Self {
        Value::Bytes(b)
    }
}

impl From<serde_json::Value> for Value {
    fn from(j: serde_json::Value) -> Self {
        Value::Json(j)
    }
}

impl From<CancellationToken> for Value {
    fn from(t: CancellationToken) -> Self {
        Value::Cancel(t)
    }
}

/// An object of a woven type. Cloning shares the fields.
#[derive(Debug, Clone)]
pub struct Instance {
    type_name: Arc<str>,
    fields: Arc<RwLock<HashMap<String, Value>>>,
}

impl Instance {
    pub(crate) fn new(type_name: &str) -> Self {
        Self {
            type_name: type_name.into(),
            fields: Arc::default(),
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Fields and properties share one namespace.
    pub fn get(&self, member: &str) -> Option<Value> {
        self.fields.read().get(member).cloned()
    }

    pub fn set(&self, member: impl Into<String>, value: Value) {
        self.fields.write().insert(member.into(), value);
    }

    pub fn client(&self, member: &str) -> Option<HttpClient> {
        match self.get(member)? {
            Value::Client(c) => Some(c),
            _ => None,
        }
    }
}
