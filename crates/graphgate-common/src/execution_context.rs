use std::any::Any;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::query::Inputs;

/// Opaque handle to whatever schema object the engine executes against.
#[derive(Clone)]
pub struct SchemaRef(Arc<dyn Any + Send + Sync>);

impl SchemaRef {
    pub fn new<T: Any + Send + Sync>(schema: T) -> Self {
        Self(Arc::new(schema))
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }
}

impl fmt::Debug for SchemaRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SchemaRef(..)")
    }
}

pub trait SchemaProvider: Send + Sync {
    fn schema(&self) -> SchemaRef;
}

impl SchemaProvider for SchemaRef {
    fn schema(&self) -> SchemaRef {
        self.clone()
    }
}

/// Identity established by an upstream authentication layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub name: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl Principal {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            roles: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Environment {
    Development,
    #[default]
    Production,
}

impl Environment {
    pub fn is_development(self) -> bool {
        matches!(self, Environment::Development)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown environment '{0}', expected development or production")]
pub struct EnvironmentParseError(String);

impl FromStr for Environment {
    type Err = EnvironmentParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(EnvironmentParseError(other.to_string())),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Development => f.write_str("development"),
            Environment::Production => f.write_str("production"),
        }
    }
}

/// Everything a single engine invocation needs. Built fresh per request.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub schema: SchemaRef,
    pub query: String,
    pub variables: Option<Inputs>,
    pub operation_name: Option<String>,
    pub principal: Option<Principal>,
    pub cancellation: CancellationToken,
}
