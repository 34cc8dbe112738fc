pub mod execution_context;
pub mod query;
pub mod result;

pub use execution_context::{
    Environment, EnvironmentParseError, ExecutionContext, Principal, SchemaProvider, SchemaRef,
};
pub use query::{Inputs, QueryRequest, Variables};
pub use result::{ExecutionError, ExecutionResult, Location, ResponseEnvelope, WireError};

pub mod telemetry;
