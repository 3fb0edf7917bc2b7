use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;

use super::value::{Instance, Value};
use crate::ir::TypeRef;

/// Arguments of a call into user code.
pub struct NativeCall<'a> {
    /// `None` for static methods.
    pub this: Option<&'a Instance>,
    pub args: &'a [Value],
    /// The type argument of a generic call (deserializers).
    pub type_arg: Option<&'a TypeRef>,
}

impl NativeCall<'_> {
    pub fn arg(&self, index: usize) -> Result<&Value, String> {
        self.args
            .get(index)
            .ok_or_else(|| format!("missing argument #{index}"))
    }
}

pub type NativeFn = Arc<dyn Fn(NativeCall<'_>) -> Result<Value, String> + Send + Sync>;

/// User code by `Type::method`.
#[derive(Clone, Default)]
pub struct NativeTable {
    fns: HashMap<String, NativeFn>,
}

impl fmt::Debug for NativeTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&String> = self.fns.keys().collect();
        keys.sort();
        f.debug_struct("NativeTable").field("fns", &keys).finish()
    }
}

impl NativeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(mut self, key: impl Into<String>, f: F) -> Self
    where
        F: Fn(NativeCall<'_>) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.insert(key, f);
        self
    }

    pub fn insert<F>(&mut self, key: impl Into<String>, f: F)
    where
        F: Fn(NativeCall<'_>) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.fns.insert(key.into(), Arc::new(f));
    }

    pub fn get(&self, key: &str) -> Option<&NativeFn> {
        self.fns.get(key)
    }

    /// A serializer writing its argument as JSON text.
    pub fn json_to_text() -> impl Fn(NativeCall<'_>) -> Result<Value, String> + Send + Sync {
        |call| {
            let json = to_json(call.arg(0)?)?;
            serde_json::to_string(&json)
                .map(Value::Str)
                .map_err(|e| e.to_string())
        }
    }

    /// A serializer writing its argument as JSON bytes.
    pub fn json_to_bytes() -> impl Fn(NativeCall<'_>) -> Result<Value, String> + Send + Sync {
        |call| {
            let json = to_json(call.arg(0)?)?;
            serde_json::to_vec(&json)
                .map(|v| Value::Bytes(Bytes::from(v)))
                .map_err(|e| e.to_string())
        }
    }

    /// A deserializer parsing text or bytes as JSON.
    pub fn json_parse() -> impl Fn(NativeCall<'_>) -> Result<Value, String> + Send + Sync {
        |call| {
            let parsed = match call.arg(0)? {
                Value::Str(s) => serde_json::from_str(s),
                Value::Bytes(b) => serde_json::from_slice(b),
                other => return Err(format!("cannot parse {} as JSON", other.kind())),
            };
            parsed.map(Value::Json).map_err(|e| e.to_string())
        }
    }
}

fn to_json(v: &Value) -> Result<serde_json::Value, String> {
    v.to_json()
        .ok_or_else(|| format!("{} cannot be serialized", v.kind()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call(args: &[Value]) -> NativeCall<'_> {
        NativeCall {
            this: None,
            args,
            type_arg: None,
        }
    }

    #[test]
    fn json_helpers() {
        let table = NativeTable::new()
            .register("J::enc", NativeTable::json_to_text())
            .register("J::dec", NativeTable::json_parse());

        let enc = table.get("J::enc").unwrap();
        let text = enc(call(&[Value::map([("id", Value::Int(3))])])).unwrap();
        assert_eq!(text.as_str(), Some(r#"{"id":3}"#));

        let dec = table.get("J::dec").unwrap();
        let Value::Json(j) = dec(call(&[text])).unwrap() else {
            panic!("expected json");
        };
        assert_eq!(j, json!({"id": 3}));
    }

    #[test]
    fn errors_are_messages() {
        let dec = NativeTable::json_parse();
        assert!(dec(call(&[Value::str("{")])).is_err());
        assert_eq!(
            dec(call(&[Value::Int(1)])).unwrap_err(),
            "cannot parse int as JSON"
        );
        assert!(NativeTable::json_to_text()(call(&[])).is_err());
    }
}
