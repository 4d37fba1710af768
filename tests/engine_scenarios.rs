//! End-to-end compile -> build -> resolve_field coverage for §8's seed
//! scenarios, plus the onError-vs-`??` precedence regression.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bridge_engine::engine::error::ToolFailure;
use bridge_engine::ports::{ToolFunction, ToolNamespace};
use bridge_engine::{compile, BuildEngineOptions, Engine, FieldValue, Value};

/// An `AtomicUsize`-backed test double for asserting at-most-once /
/// short-circuit invocation counts without a mocking library.
struct CountingTool {
    calls: AtomicUsize,
    respond: Value,
}

impl CountingTool {
    fn new(respond: Value) -> Arc<Self> {
        Arc::new(Self { calls: AtomicUsize::new(0), respond })
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ToolFunction for CountingTool {
    async fn call(&self, _input: Value) -> Result<Value, ToolFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.respond.clone())
    }
}

/// Same as [`CountingTool`] but always fails, for the `||`+`??` seed.
struct FailingTool {
    calls: AtomicUsize,
}

impl FailingTool {
    fn new() -> Arc<Self> {
        Arc::new(Self { calls: AtomicUsize::new(0) })
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ToolFunction for FailingTool {
    async fn call(&self, _input: Value) -> Result<Value, ToolFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ToolFailure::new("boom"))
    }
}

fn scalar_field(v: &FieldValue) -> &Value {
    match v {
        FieldValue::Value(value) => value,
        FieldValue::Shadows(_) => panic!("expected a scalar field value, got Shadows"),
        FieldValue::SelfRef(_) => panic!("expected a scalar field value, got SelfRef"),
    }
}

/// Seed 1: passthrough, zero tool calls.
#[tokio::test]
async fn seed1_passthrough_resolves_without_any_tool_call() {
    let source = r#"
        version 1.4
        bridge Query.echo {
            with input as i
            with output as o
            o.text <- i.text
            o.count <- i.count
        }
    "#;
    let instructions = compile(source).unwrap();
    let engine = Arc::new(Engine::build(&instructions, BuildEngineOptions::default()).unwrap());
    let input = Value::from(serde_json::json!({"text": "Hi", "count": 3}));
    let tree = engine.start("Query", "echo", input, None).await.unwrap();

    let text = tree.resolve_field(&["text".to_string()], false).await.unwrap();
    let count = tree.resolve_field(&["count".to_string()], false).await.unwrap();
    assert_eq!(*scalar_field(&text), Value::String("Hi".into()));
    assert_eq!(*scalar_field(&count), Value::Number(3.into()));
}

/// Seed 2: pipe chain. Regression test for the bug where `apply_into`
/// handed a bare scalar to a std tool and `field()` silently returned
/// null instead of the scalar.
#[tokio::test]
async fn seed2_pipe_chain_resolves_bare_scalar_through_both_tools() {
    let source = r#"
        version 1.4
        tool pickFirst from std.pick
        tool toArray from std.identity
        bridge Query.label {
            with input as i
            with output as o
            o.value <- pickFirst:toArray:i.value
        }
    "#;
    let instructions = compile(source).unwrap();
    let engine = Arc::new(Engine::build(&instructions, BuildEngineOptions::default()).unwrap());
    let input = Value::from(serde_json::json!({"value": "hello"}));
    let tree = engine.start("Query", "label", input, None).await.unwrap();

    let value = tree.resolve_field(&["value".to_string()], false).await.unwrap();
    assert_eq!(*scalar_field(&value), Value::String("hello".into()));
}

/// Seed 3: overdefinition. A cost-0 source (the request's own input)
/// resolves before the cost-1 tool is ever invoked.
#[tokio::test]
async fn seed3_overdefinition_prefers_cheap_source_and_skips_the_tool() {
    let source = r#"
        version 1.4
        tool api from http.get
        bridge Query.one {
            with input as i
            with output as o
            with api as a
            o.label <- a.label
            o.label <- i.hint
        }
    "#;
    let instructions = compile(source).unwrap();
    let api = CountingTool::new(Value::from(serde_json::json!({"label": "from-api"})));
    let mut tools = ToolNamespace::new();
    tools.insert("http.get", api.clone());

    let engine = Arc::new(Engine::build(&instructions, BuildEngineOptions { tools, ..BuildEngineOptions::default() }).unwrap());
    let input = Value::from(serde_json::json!({"hint": "cheap"}));
    let tree = engine.start("Query", "one", input, None).await.unwrap();

    let label = tree.resolve_field(&["label".to_string()], false).await.unwrap();
    assert_eq!(*scalar_field(&label), Value::String("cheap".into()));
    assert_eq!(api.call_count(), 0);
}

/// Seed 4: `||` chain, call order `[p, b]`, result from the second source.
#[tokio::test]
async fn seed4_double_bar_chain_falls_through_in_order() {
    let source = r#"
        version 1.4
        tool p from http.get
        tool b from http.get
        bridge Query.label {
            with input as i
            with output as o
            with p as p
            with b as b
            o.label <- p.label || b.label || "default"
        }
    "#;
    let instructions = compile(source).unwrap();
    let p = CountingTool::new(Value::from(serde_json::json!({"label": null})));
    let b = CountingTool::new(Value::from(serde_json::json!({"label": "B"})));
    let mut tools = ToolNamespace::new();
    tools.insert("p", p.clone());
    tools.insert("b", b.clone());

    let engine = Arc::new(Engine::build(&instructions, BuildEngineOptions { tools, ..BuildEngineOptions::default() }).unwrap());
    let tree = engine.start("Query", "label", Value::object(), None).await.unwrap();

    let label = tree.resolve_field(&["label".to_string()], false).await.unwrap();
    assert_eq!(*scalar_field(&label), Value::String("B".into()));
    assert_eq!(p.call_count(), 1);
    assert_eq!(b.call_count(), 1);
}

/// Seed 5: `||` + `??`. Both sources throw; the `??` fallback fires.
#[tokio::test]
async fn seed5_double_bar_then_coalesce_falls_back_on_aggregate_failure() {
    let source = r#"
        version 1.4
        tool p from boom.p
        tool b from boom.b
        bridge Query.label {
            with input as i
            with output as o
            with p as p
            with b as b
            o.label <- p.label || b.label || "null-default" ?? "error-default"
        }
    "#;
    let instructions = compile(source).unwrap();
    let p = FailingTool::new();
    let b = FailingTool::new();
    let mut tools = ToolNamespace::new();
    tools.insert("boom.p", p.clone());
    tools.insert("boom.b", b.clone());

    let engine = Arc::new(Engine::build(&instructions, BuildEngineOptions { tools, ..BuildEngineOptions::default() }).unwrap());
    let tree = engine.start("Query", "label", Value::object(), None).await.unwrap();

    let label = tree.resolve_field(&["label".to_string()], false).await.unwrap();
    assert_eq!(*scalar_field(&label), Value::String("error-default".into()));
    assert_eq!(p.call_count(), 1);
    assert_eq!(b.call_count(), 1);
}

/// Seed 6: nested array mapping. Each journey's own stops resolve from
/// its own shadow tree without leaking into a sibling's.
#[tokio::test]
async fn seed6_nested_array_mapping_keeps_each_element_in_its_own_shadow() {
    let source = r#"
        version 1.4
        bridge Query.trip {
            with input as i
            with output as o
            o.journeys <- i.journeys [] as j {
                .label <- j.label
                .stops <- j.stops
            }
        }
    "#;
    let instructions = compile(source).unwrap();
    let engine = Arc::new(Engine::build(&instructions, BuildEngineOptions::default()).unwrap());
    let input = Value::from(serde_json::json!({
        "journeys": [
            {"label": "commute", "stops": [{"name": "home"}, {"name": "office"}]},
            {"label": "errand", "stops": [{"name": "bank"}]},
        ]
    }));
    let tree = engine.start("Query", "trip", input, None).await.unwrap();

    let journeys = tree.resolve_field(&["journeys".to_string()], true).await.unwrap();
    let FieldValue::Shadows(journeys) = journeys else { panic!("expected shadow trees for the outer array") };
    assert_eq!(journeys.len(), 2);

    let first_stops = journeys[0].resolve_field(&["stops".to_string()], true).await.unwrap();
    let FieldValue::Shadows(first_stops) = first_stops else { panic!("expected shadow trees for stops") };
    assert_eq!(first_stops.len(), 2);
    let first_stop_name = first_stops[0].resolve_field(&["name".to_string()], false).await.unwrap();
    assert_eq!(*scalar_field(&first_stop_name), Value::String("home".into()));

    let second_stops = journeys[1].resolve_field(&["stops".to_string()], true).await.unwrap();
    let FieldValue::Shadows(second_stops) = second_stops else { panic!("expected shadow trees for stops") };
    assert_eq!(second_stops.len(), 1);
    let second_stop_name = second_stops[0].resolve_field(&["name".to_string()], false).await.unwrap();
    assert_eq!(*scalar_field(&second_stop_name), Value::String("bank".into()));
}

/// §9's onError-vs-`??` decision: `onError` fires inside `schedule()` and
/// must win before a wire-level `??` ever sees the failure.
#[tokio::test]
async fn on_error_suppresses_the_failure_before_a_coalesce_wire_sees_it() {
    let source = r#"
        version 1.4
        tool flaky from boom {
            on error = "recovered-by-tool"
        }
        bridge Query.echo {
            with input as i
            with output as o
            o.label <- flaky.label ?? "recovered-by-wire"
        }
    "#;
    let instructions = compile(source).unwrap();
    let mut tools = ToolNamespace::new();
    tools.insert("boom", Arc::new(|_: Value| async move { Err::<Value, _>(ToolFailure::new("boom")) }));

    let engine = Arc::new(Engine::build(&instructions, BuildEngineOptions { tools, ..BuildEngineOptions::default() }).unwrap());
    let tree = engine.start("Query", "echo", Value::object(), None).await.unwrap();

    let label = tree.resolve_field(&["label".to_string()], false).await.unwrap();
    assert_eq!(*scalar_field(&label), Value::String("recovered-by-tool".into()));
}
