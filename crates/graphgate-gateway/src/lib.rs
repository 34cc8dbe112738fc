pub mod args;
pub mod decoder;
pub mod encoder;
pub mod engine;
pub mod gateway;
pub mod identity;
pub mod metrics;
pub mod options;
pub mod service;

pub use decoder::DecodeError;
pub use encoder::{encode_result, EncodedResponse};
pub use engine::{EngineError, ExecutionEngine, StaticEngine, StaticSchema};
pub use gateway::{graphql_middleware, Gateway, GraphQLRouterExt};
pub use options::{GatewayOptions, PathMatch, DEFAULT_REQUEST_PATH};
pub use service::{EngineQueryService, ExecuteError, QueryService, ValidationError};
