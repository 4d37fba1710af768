//! The built-in `std` namespace (§4.4): a minimal, transport-free set of
//! tool functions `schedule()` falls through to when a dotted lookup and a
//! flat-key lookup both miss in the host-supplied namespace. These exist so
//! `schedule()`'s fallback branch has something real to resolve against,
//! and so pipe-chain/define fixtures in tests have tools to call without a
//! host standing up real transports.

use async_trait::async_trait;

use crate::engine::error::ToolFailure;
use crate::engine::value::Value;
use crate::ports::{ToolFunction, ToolNamespace};

struct Identity;

#[async_trait]
impl ToolFunction for Identity {
    async fn call(&self, input: Value) -> Result<Value, ToolFailure> {
        Ok(field(&input, "value").cloned().unwrap_or(Value::Null))
    }
}

struct DefaultFn;

#[async_trait]
impl ToolFunction for DefaultFn {
    async fn call(&self, input: Value) -> Result<Value, ToolFailure> {
        let value = field(&input, "value").cloned().unwrap_or(Value::Null);
        if value.is_null() {
            Ok(field(&input, "fallback").cloned().unwrap_or(Value::Null))
        } else {
            Ok(value)
        }
    }
}

struct Merge;

#[async_trait]
impl ToolFunction for Merge {
    async fn call(&self, input: Value) -> Result<Value, ToolFailure> {
        let Some(map) = input.as_map() else { return Ok(Value::object()) };
        let mut out = Value::object();
        for (_, v) in map {
            out.merge_from(v);
        }
        Ok(out)
    }
}

struct Concat;

#[async_trait]
impl ToolFunction for Concat {
    async fn call(&self, input: Value) -> Result<Value, ToolFailure> {
        let Some(map) = input.as_map() else { return Ok(Value::String(String::new())) };
        let mut out = String::new();
        for (_, v) in map {
            match v {
                Value::String(s) => out.push_str(s),
                Value::Null => {}
                other => out.push_str(&format!("{other:?}")),
            }
        }
        Ok(Value::String(out))
    }
}

struct Pick;

#[async_trait]
impl ToolFunction for Pick {
    async fn call(&self, input: Value) -> Result<Value, ToolFailure> {
        let value = field(&input, "value").cloned().unwrap_or(Value::Null);
        let path: Vec<String> = match field(&input, "path") {
            Some(Value::List(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        };
        Ok(value.get_path(&path).cloned().unwrap_or(Value::Null))
    }
}

/// Looks up `name` on `input`. When `input` isn't a mapping at all -- the
/// shape `schedule()` hands a pipe-fork or define-boundary tool whose sole
/// resolved source was a bare scalar (§4.1 rule 4's pipe chains don't wrap
/// their intermediate stages in `{value: ...}`) -- it is treated as if it
/// were `{"value": input}`, since `"value"` is the only key every built-in
/// here reads from a scalar-shaped call.
fn field<'a>(input: &'a Value, name: &str) -> Option<&'a Value> {
    match input.as_map() {
        Some(m) => m.get(name),
        None if name == "value" => Some(input),
        None => None,
    }
}

/// Builds the `std` namespace ships with the crate (§4.4). Host-registered
/// namespaces always take priority over this one (`ToolNamespace::merge_under`
/// puts the host on top); `EngineSettings::std_namespace_enabled` (§4.6) lets
/// an embedding host disable this fallback entirely so `ToolNotFound`
/// becomes strict.
pub fn std_namespace() -> ToolNamespace {
    let mut ns = ToolNamespace::new();
    ns.insert("std.identity", std::sync::Arc::new(Identity));
    ns.insert("std.default", std::sync::Arc::new(DefaultFn));
    ns.insert("std.merge", std::sync::Arc::new(Merge));
    ns.insert("std.concat", std::sync::Arc::new(Concat));
    ns.insert("std.pick", std::sync::Arc::new(Pick));
    ns
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn identity_returns_value_unchanged() {
        let ns = std_namespace();
        let f = ns.lookup("std.identity").unwrap();
        let input = Value::from(serde_json::json!({"value": "hello"}));
        assert_eq!(f.call(input).await.unwrap(), Value::String("hello".into()));
    }

    #[tokio::test]
    async fn default_falls_back_when_value_is_null() {
        let ns = std_namespace();
        let f = ns.lookup("std.default").unwrap();
        let input = Value::from(serde_json::json!({"value": null, "fallback": "d"}));
        assert_eq!(f.call(input).await.unwrap(), Value::String("d".into()));
    }

    #[tokio::test]
    async fn merge_later_keys_win() {
        let ns = std_namespace();
        let f = ns.lookup("std.merge").unwrap();
        let input = Value::from(serde_json::json!({"a": {"x": 1}, "b": {"x": 2, "y": 3}}));
        let out = f.call(input).await.unwrap();
        assert_eq!(out, Value::from(serde_json::json!({"x": 2, "y": 3})));
    }

    #[tokio::test]
    async fn concat_joins_string_parts() {
        let ns = std_namespace();
        let f = ns.lookup("std.concat").unwrap();
        let input = Value::from(serde_json::json!({"a": "foo", "b": "bar"}));
        assert_eq!(f.call(input).await.unwrap(), Value::String("foobar".into()));
    }

    #[tokio::test]
    async fn pick_projects_a_sub_path() {
        let ns = std_namespace();
        let f = ns.lookup("std.pick").unwrap();
        let input = Value::from(serde_json::json!({"value": {"a": {"b": 7}}, "path": ["a", "b"]}));
        assert_eq!(f.call(input).await.unwrap(), Value::Number(7.into()));
    }
}
