//! The runtime value type tool inputs, tool outputs, and request context are
//! expressed in (§3.4).
//!
//! `Value` mirrors `serde_json::Value` in shape but is its own tagged enum:
//! the engine needs an ordered map (field order matters for response shaping
//! and deterministic trace dumps), which `serde_json::Map` does not
//! guarantee once the `preserve_order` feature is off, so `Map` is backed by
//! `IndexMap` instead. `From`/conversions to and from `serde_json::Value`
//! keep the boundary with JSON literal parsing (constants, tool I/O crossing
//! an HTTP tool) free of ceremony.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value as JsonValue};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    List(Vec<Value>),
    Map(IndexMap<String, Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn object() -> Self {
        Value::Map(IndexMap::new())
    }

    /// Walks a drilldown path (field names, or digit-only strings meaning
    /// list indices) against this value, per §4.2.1's pull-semantics walk.
    /// Returns `None` both when a field/index is absent and when a
    /// non-numeric segment is used to index a list -- the caller is
    /// responsible for distinguishing the two if it needs to warn (§4.2.1).
    pub fn get_path(&self, path: &[String]) -> Option<&Value> {
        let mut current = self;
        for segment in path {
            current = match current {
                Value::Map(m) => m.get(segment)?,
                Value::List(items) => {
                    let idx: usize = segment.parse().ok()?;
                    items.get(idx)?
                }
                _ => return None,
            };
        }
        Some(current)
    }

    /// Like [`Value::get_path`], but reports whether a list was indexed by a
    /// non-numeric segment so the caller can emit §4.2.1's warning.
    pub fn get_path_checked(&self, path: &[String]) -> (Option<Value>, bool) {
        let mut current = self.clone();
        for segment in path {
            match current {
                Value::Map(ref m) => match m.get(segment) {
                    Some(v) => current = v.clone(),
                    None => return (None, false),
                },
                Value::List(ref items) => match segment.parse::<usize>() {
                    Ok(idx) => match items.get(idx) {
                        Some(v) => current = v.clone(),
                        None => return (None, false),
                    },
                    Err(_) => return (None, true),
                },
                _ => return (None, false),
            }
        }
        (Some(current), false)
    }

    /// Shallow-merges `other` into `self` (both must be maps), `other`'s
    /// keys winning -- used to spread a bridge-wire group targeting the
    /// empty path into an assembled tool/define input mapping (§4.2.2 step
    /// 4: "a group targeting the empty path whose value is a mapping
    /// spreads into the root").
    pub fn merge_from(&mut self, other: &Value) {
        if let (Value::Map(dst), Value::Map(src)) = (self, other) {
            for (k, v) in src {
                dst.insert(k.clone(), v.clone());
            }
        }
    }

    pub fn set_path(&mut self, path: &[String], value: Value) {
        if path.is_empty() {
            *self = value;
            return;
        }
        if !matches!(self, Value::Map(_)) {
            *self = Value::object();
        }
        let Value::Map(map) = self else { unreachable!() };
        let (head, rest) = (&path[0], &path[1..]);
        let entry = map.entry(head.clone()).or_insert(Value::Null);
        entry.set_path(rest, value);
    }
}

impl From<JsonValue> for Value {
    fn from(v: JsonValue) -> Self {
        match v {
            JsonValue::Null => Value::Null,
            JsonValue::Bool(b) => Value::Bool(b),
            JsonValue::Number(n) => Value::Number(n),
            JsonValue::String(s) => Value::String(s),
            JsonValue::Array(items) => Value::List(items.into_iter().map(Value::from).collect()),
            JsonValue::Object(map) => {
                Value::Map(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<Value> for JsonValue {
    fn from(v: Value) -> Self {
        match v {
            Value::Null => JsonValue::Null,
            Value::Bool(b) => JsonValue::Bool(b),
            Value::Number(n) => JsonValue::Number(n),
            Value::String(s) => JsonValue::String(s),
            Value::List(items) => JsonValue::Array(items.into_iter().map(JsonValue::from).collect()),
            Value::Map(map) => {
                JsonValue::Object(map.into_iter().map(|(k, v)| (k, JsonValue::from(v))).collect())
            }
        }
    }
}

/// Parses a compiler-emitted JSON literal text (a [`ConstDef::json_text`],
/// a [`Wire::Constant`] value, a `null_fallback`/`fallback` literal) into a
/// runtime [`Value`]. §4.2's `resolveWires` step 3 falls back to the raw
/// text on parse failure; callers that need that behavior handle the `Err`
/// themselves rather than this function swallowing it.
pub fn parse_json_literal(text: &str) -> Result<Value, serde_json::Error> {
    serde_json::from_str::<JsonValue>(text).map(Value::from)
}
