use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub type BoxedCause = Arc<dyn StdError + Send + Sync + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub line: u32,
    pub column: u32,
}

/// One entry of the response `errors` list.
#[derive(Clone)]
pub struct ExecutionError {
    pub message: String,
    pub cause: Option<BoxedCause>,
    pub locations: Vec<Location>,
    pub path: Option<Vec<Value>>,
}

impl ExecutionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            cause: None,
            locations: Vec::new(),
            path: None,
        }
    }

    pub fn with_cause<E>(message: impl Into<String>, cause: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self {
            cause: Some(Arc::new(cause)),
            ..Self::new(message)
        }
    }

    pub fn at(mut self, line: u32, column: u32) -> Self {
        self.locations.push(Location { line, column });
        self
    }

    pub fn with_path(mut self, path: Vec<Value>) -> Self {
        self.path = Some(path);
        self
    }

    /// Display strings of the cause and every error it wraps, outermost first.
    pub fn cause_chain(&self) -> Vec<String> {
        let mut chain = Vec::new();
        let mut next: Option<&(dyn StdError + 'static)> =
            self.cause.as_deref().map(|c| c as &(dyn StdError + 'static));
        while let Some(err) = next {
            chain.push(err.to_string());
            next = err.source();
        }
        chain
    }

    fn to_wire(&self, expose_internal_details: bool) -> WireError {
        let extensions = if expose_internal_details && self.cause.is_some() {
            Some(json!({ "details": self.cause_chain() }))
        } else {
            None
        };
        WireError {
            message: self.message.clone(),
            locations: self.locations.clone(),
            path: self.path.clone(),
            extensions,
        }
    }
}

impl fmt::Debug for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionError")
            .field("message", &self.message)
            .field("cause", &self.cause.as_ref().map(|c| c.to_string()))
            .field("locations", &self.locations)
            .field("path", &self.path)
            .finish()
    }
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Outcome of one execution. `errors` keeps insertion order.
#[derive(Debug, Clone, Default)]
pub struct ExecutionResult {
    pub data: Option<Value>,
    pub errors: Vec<ExecutionError>,
    pub expose_internal_details: bool,
}

impl ExecutionResult {
    pub fn from_data(data: Value) -> Self {
        Self {
            data: Some(data),
            ..Default::default()
        }
    }

    pub fn from_errors(errors: Vec<ExecutionError>) -> Self {
        Self {
            data: None,
            errors,
            expose_internal_details: false,
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn to_envelope(&self) -> ResponseEnvelope {
        ResponseEnvelope {
            data: self.data.clone(),
            errors: self
                .errors
                .iter()
                .map(|e| e.to_wire(self.expose_internal_details))
                .collect(),
        }
    }
}

/// Wire shape of a response: `{"data": ..., "errors": [...]}`.
///
/// `data` is always written (as `null` when absent); `errors` is omitted
/// when empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<WireError>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub locations: Vec<Location>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Value>,
}
