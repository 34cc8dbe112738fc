use std::path::PathBuf;

use clap::Parser;

use graphgate_common::Environment;

use crate::options::{DEFAULT_MAX_BODY_BYTES, DEFAULT_REQUEST_PATH};

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Args {
    #[arg(long, env = "GRAPHGATE_ADDR", default_value = "0.0.0.0:8080")]
    pub listen_addr: String,

    /// Path answered by the query endpoint. Empty falls back to the default.
    #[arg(long, env = "GRAPHGATE_REQUEST_PATH", default_value = DEFAULT_REQUEST_PATH)]
    pub request_path: String,

    /// Match the request path ignoring ASCII case.
    #[arg(long, env = "GRAPHGATE_IGNORE_PATH_CASE")]
    pub ignore_path_case: bool,

    /// `development` exposes internal error details in responses.
    #[arg(long, env = "GRAPHGATE_ENV", default_value = "production")]
    pub environment: Environment,

    #[arg(long, env = "GRAPHGATE_MAX_BODY_BYTES", default_value_t = DEFAULT_MAX_BODY_BYTES)]
    pub max_body_bytes: usize,

    #[arg(long, env = "GRAPHGATE_EXECUTION_TIMEOUT_MS")]
    pub execution_timeout_ms: Option<u64>,

    /// Header set by an upstream proxy with the authenticated user name.
    #[arg(long, env = "GRAPHGATE_PRINCIPAL_HEADER")]
    pub principal_header: Option<String>,

    /// Comma-separated roles for the principal, set by the same proxy.
    #[arg(long, env = "GRAPHGATE_ROLES_HEADER")]
    pub roles_header: Option<String>,

    /// JSON object whose top-level keys the static engine serves.
    #[arg(long, env = "GRAPHGATE_STATIC_DATA")]
    pub static_data: Option<PathBuf>,

    /// OTLP endpoint for exporting traces.
    #[arg(long, env = "OTLP_URL")]
    pub otlp_url: Option<String>,

    /// Bearer token for the OTLP endpoint.
    #[arg(long, env = "OTLP_TOKEN")]
    pub otlp_token: Option<String>,
}
