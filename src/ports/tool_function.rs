//! The tool function contract (§6.3): an async callable `input -> value`
//! that a host registers into a [`crate::ports::ToolNamespace`].

use async_trait::async_trait;

use crate::engine::error::ToolFailure;
use crate::engine::value::Value;

#[async_trait]
pub trait ToolFunction: Send + Sync {
    async fn call(&self, input: Value) -> Result<Value, ToolFailure>;
}

/// Blanket impl so a host can register a plain async closure directly
/// (`Arc::new(|input| async move { ... })` would not implement `ToolFunction`
/// on its own because closures returning futures aren't directly `async
/// fn`-shaped) without hand-rolling a struct for every tool.
#[async_trait]
impl<F, Fut> ToolFunction for F
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<Value, ToolFailure>> + Send,
{
    async fn call(&self, input: Value) -> Result<Value, ToolFailure> {
        (self)(input).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn closures_satisfy_tool_function_via_blanket_impl() {
        let f = |input: Value| async move { Ok(input) };
        let out = f.call(Value::Bool(true)).await.unwrap();
        assert_eq!(out, Value::Bool(true));
    }
}
