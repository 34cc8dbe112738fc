use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures_util::FutureExt;
use tokio_util::sync::CancellationToken;

use graphgate_common::{
    Environment, ExecutionContext, ExecutionError, ExecutionResult, Principal, QueryRequest,
    SchemaProvider,
};

use crate::engine::{EngineError, ExecutionEngine};

/// Only cancellation escapes [`QueryService::execute`]; every other failure
/// is reported inside the returned result.
#[derive(Debug, thiserror::Error)]
pub enum ExecuteError {
    #[error("operation was cancelled")]
    Cancelled,
}

/// Business-rule violations found before the engine is called.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("query must not be empty")]
    EmptyQuery,
    #[error("variables must be a JSON object: {0}")]
    InvalidVariables(#[source] serde_json::Error),
}

impl From<ValidationError> for ExecutionError {
    fn from(err: ValidationError) -> Self {
        ExecutionError::with_cause(err.to_string(), err)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("engine panicked: {0}")]
pub struct EnginePanic(String);

/// Boundary between the HTTP layer and an execution engine.
#[async_trait]
pub trait QueryService: Send + Sync {
    async fn execute(
        &self,
        request: QueryRequest,
        principal: Option<Principal>,
        cancellation: CancellationToken,
    ) -> Result<ExecutionResult, ExecuteError>;
}

pub struct EngineQueryService {
    engine: Arc<dyn ExecutionEngine>,
    schema: Arc<dyn SchemaProvider>,
    environment: Environment,
}

impl EngineQueryService {
    pub fn new(
        engine: Arc<dyn ExecutionEngine>,
        schema: Arc<dyn SchemaProvider>,
        environment: Environment,
    ) -> Self {
        Self {
            engine,
            schema,
            environment,
        }
    }

    fn finish(&self, mut result: ExecutionResult) -> ExecutionResult {
        result.expose_internal_details = self.environment.is_development();
        result
    }

    fn failure(&self, errors: Vec<ExecutionError>) -> ExecutionResult {
        self.finish(ExecutionResult::from_errors(errors))
    }
}

fn to_execution_errors(err: EngineError) -> Vec<ExecutionError> {
    err.flatten()
        .into_iter()
        .map(|e| ExecutionError::with_cause(e.to_string(), e))
        .collect()
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[async_trait]
impl QueryService for EngineQueryService {
    async fn execute(
        &self,
        request: QueryRequest,
        principal: Option<Principal>,
        cancellation: CancellationToken,
    ) -> Result<ExecutionResult, ExecuteError> {
        if cancellation.is_cancelled() {
            return Err(ExecuteError::Cancelled);
        }

        if request.query.trim().is_empty() {
            return Ok(self.failure(vec![ValidationError::EmptyQuery.into()]));
        }

        let variables = match request.variables.map(|v| v.into_inputs()).transpose() {
            Ok(v) => v.flatten(),
            Err(e) => return Ok(self.failure(vec![ValidationError::InvalidVariables(e).into()])),
        };

        let ctx = ExecutionContext {
            schema: self.schema.schema(),
            query: request.query,
            variables,
            operation_name: request.operation_name,
            principal,
            cancellation,
        };

        let start = Instant::now();
        let outcome = AssertUnwindSafe(self.engine.execute(ctx)).catch_unwind().await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(Ok(result)) => {
                tracing::debug!(elapsed_ms, errors = result.errors.len(), "execution finished");
                Ok(self.finish(result))
            }
            Ok(Err(EngineError::Cancelled)) => {
                tracing::info!(elapsed_ms, "execution cancelled");
                Err(ExecuteError::Cancelled)
            }
            Ok(Err(err)) => {
                tracing::warn!(elapsed_ms, error = %err, "engine invocation failed");
                Ok(self.failure(to_execution_errors(err)))
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::error!(elapsed_ms, panic = %message, "engine panicked");
                let panic = EnginePanic(message);
                Ok(self.failure(vec![ExecutionError::with_cause(panic.to_string(), panic)]))
            }
        }
    }
}
