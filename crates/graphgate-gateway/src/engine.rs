use std::error::Error as StdError;

use async_trait::async_trait;
use serde_json::{Map, Value};

use graphgate_common::{ExecutionContext, ExecutionError, ExecutionResult};

/// A query-execution engine. Validation and resolver failures belong in the
/// returned result's `errors`; `Err` is reserved for the invocation itself
/// breaking down.
#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    async fn execute(&self, ctx: ExecutionContext) -> Result<ExecutionResult, EngineError>;
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The engine observed the cancellation token and stopped.
    #[error("execution was cancelled")]
    Cancelled,
    /// Several independent failures, e.g. from concurrently run resolvers.
    #[error("{} errors occurred during execution", .0.len())]
    Aggregate(Vec<EngineError>),
    #[error("{message}")]
    Failed {
        message: String,
        #[source]
        source: Option<Box<dyn StdError + Send + Sync>>,
    },
}

impl EngineError {
    pub fn failed(message: impl Into<String>) -> Self {
        EngineError::Failed {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source<E>(message: impl Into<String>, source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        EngineError::Failed {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Expand nested aggregates into their leaf errors, depth first, keeping order.
    pub fn flatten(self) -> Vec<EngineError> {
        match self {
            EngineError::Aggregate(inner) => inner.into_iter().flat_map(EngineError::flatten).collect(),
            other => vec![other],
        }
    }
}

/// Root values served by [`StaticEngine`].
#[derive(Debug, Clone, Default)]
pub struct StaticSchema {
    pub root: Map<String, Value>,
}

impl StaticSchema {
    pub fn new(root: Map<String, Value>) -> Self {
        Self { root }
    }

    pub fn hello_world() -> Self {
        let mut root = Map::new();
        root.insert("hello".to_string(), Value::String("world".to_string()));
        Self { root }
    }
}

/// Minimal engine answering flat top-level selections such as
/// `{ hello }` or `query Named { a b }` from a [`StaticSchema`].
#[derive(Debug, Default, Clone)]
pub struct StaticEngine {}

impl StaticEngine {
    pub fn new() -> Self {
        Self {}
    }

    fn selection(query: &str) -> Result<Vec<&str>, ExecutionError> {
        let (Some(open), Some(close)) = (query.find('{'), query.rfind('}')) else {
            return Err(ExecutionError::new("Syntax Error: expected a selection set").at(1, 1));
        };
        if close < open {
            return Err(ExecutionError::new("Syntax Error: unbalanced selection set").at(1, 1));
        }
        let inner = &query[open + 1..close];
        if inner.contains(['{', '}', '(', ')']) {
            return Err(ExecutionError::new(
                "static engine only supports flat selections without arguments",
            ));
        }
        let fields: Vec<&str> = inner
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|f| !f.is_empty())
            .collect();
        if fields.is_empty() {
            return Err(ExecutionError::new("Syntax Error: empty selection set"));
        }
        Ok(fields)
    }
}

#[async_trait]
impl ExecutionEngine for StaticEngine {
    async fn execute(&self, ctx: ExecutionContext) -> Result<ExecutionResult, EngineError> {
        if ctx.cancellation.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        let Some(schema) = ctx.schema.downcast_ref::<StaticSchema>() else {
            return Err(EngineError::failed("static engine requires a StaticSchema"));
        };

        let fields = match Self::selection(&ctx.query) {
            Ok(f) => f,
            Err(e) => return Ok(ExecutionResult::from_errors(vec![e])),
        };

        let mut data = Map::new();
        let mut errors = Vec::new();
        for field in fields {
            match schema.root.get(field) {
                Some(v) => {
                    data.insert(field.to_string(), v.clone());
                }
                None => errors.push(ExecutionError::new(format!(
                    "Cannot query field \"{field}\" on type \"Query\"."
                ))),
            }
        }

        if errors.is_empty() {
            Ok(ExecutionResult::from_data(Value::Object(data)))
        } else {
            Ok(ExecutionResult::from_errors(errors))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graphgate_common::SchemaRef;
    use serde_json::json;
    use tokio_util::sync::CancellationToken;

    fn ctx(query: &str) -> ExecutionContext {
        ExecutionContext {
            schema: SchemaRef::new(StaticSchema::hello_world()),
            query: query.to_string(),
            variables: None,
            operation_name: None,
            principal: None,
            cancellation: CancellationToken::new(),
        }
    }

    #[test]
    fn flatten_preserves_order_through_nesting() {
        let err = EngineError::Aggregate(vec![
            EngineError::failed("a"),
            EngineError::Aggregate(vec![EngineError::failed("b"), EngineError::failed("c")]),
            EngineError::failed("d"),
        ]);
        let messages: Vec<_> = err.flatten().iter().map(|e| e.to_string()).collect();
        assert_eq!(messages, ["a", "b", "c", "d"]);
    }

    #[test]
    fn aggregate_display_counts_children() {
        let err = EngineError::Aggregate(vec![EngineError::failed("a"), EngineError::failed("b")]);
        assert_eq!(err.to_string(), "2 errors occurred during execution");
    }

    #[tokio::test]
    async fn resolves_hello() {
        let result = StaticEngine::new().execute(ctx("{ hello }")).await.unwrap();
        assert_eq!(result.data, Some(json!({"hello": "world"})));
        assert!(result.errors.is_empty());
    }

    #[tokio::test]
    async fn named_operation_is_accepted() {
        let result = StaticEngine::new()
            .execute(ctx("query Greeting { hello, hello }"))
            .await
            .unwrap();
        assert_eq!(result.data, Some(json!({"hello": "world"})));
    }

    #[tokio::test]
    async fn unknown_field_is_an_execution_error() {
        let result = StaticEngine::new().execute(ctx("{ hello nope }")).await.unwrap();
        assert!(result.data.is_none());
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].message.contains("nope"));
    }

    #[tokio::test]
    async fn observes_cancellation() {
        let c = ctx("{ hello }");
        c.cancellation.cancel();
        assert!(matches!(StaticEngine::new().execute(c).await, Err(EngineError::Cancelled)));
    }

    #[tokio::test]
    async fn wrong_schema_type_is_an_invocation_error() {
        let mut c = ctx("{ hello }");
        c.schema = SchemaRef::new(42u8);
        assert!(matches!(
            StaticEngine::new().execute(c).await,
            Err(EngineError::Failed { .. })
        ));
    }
}
