use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use axum::{http::HeaderName, middleware, routing::get, Router};
use clap::Parser;

use graphgate_common::telemetry::{init_tracing, OtlpExport};
use graphgate_common::SchemaRef;
use graphgate_gateway::args::Args;
use graphgate_gateway::identity::{attach_principal, TrustedIdentity};
use graphgate_gateway::metrics::{metrics_handler, track_requests, Metrics};
use graphgate_gateway::{
    EngineQueryService, Gateway, GatewayOptions, GraphQLRouterExt, PathMatch, StaticEngine,
    StaticSchema,
};

async fn load_schema(path: Option<&Path>) -> Result<StaticSchema> {
    let Some(path) = path else {
        return Ok(StaticSchema::hello_world());
    };
    let raw = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading static data {}", path.display()))?;
    match serde_json::from_slice(&raw)? {
        serde_json::Value::Object(root) => Ok(StaticSchema::new(root)),
        _ => bail!("static data {} must be a JSON object", path.display()),
    }
}

async fn healthz() -> &'static str {
    "ok"
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let provider = init_tracing(
        "graphgate-gateway",
        &OtlpExport {
            endpoint: args.otlp_url.clone(),
            token: args.otlp_token.clone(),
        },
    );

    let schema = load_schema(args.static_data.as_deref()).await?;
    let service = Arc::new(EngineQueryService::new(
        Arc::new(StaticEngine::new()),
        Arc::new(SchemaRef::new(schema)),
        args.environment,
    ));

    let path_match = if args.ignore_path_case {
        PathMatch::IgnoreAsciiCase
    } else {
        PathMatch::Exact
    };
    let options = GatewayOptions::new(args.request_path.clone())
        .with_path_match(path_match)
        .with_max_body_bytes(args.max_body_bytes)
        .with_execution_timeout(args.execution_timeout_ms.map(Duration::from_millis));

    tracing::info!(
        request_path = options.request_path(),
        environment = %args.environment,
        "gateway starting"
    );

    let metrics = Arc::new(Metrics::default());

    let mut app = Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics_handler))
        .with_state(metrics.clone())
        .graphql(Gateway::new(options, service));

    if let Some(header) = args.principal_header.as_deref() {
        let mut identity = TrustedIdentity::new(HeaderName::try_from(header)?);
        if let Some(roles) = args.roles_header.as_deref() {
            identity = identity.with_roles_header(HeaderName::try_from(roles)?);
        }
        app = app.layer(middleware::from_fn_with_state(identity, attach_principal));
    }

    let app = app.layer(middleware::from_fn_with_state(metrics, track_requests));

    let listener = tokio::net::TcpListener::bind(&args.listen_addr)
        .await
        .with_context(|| format!("binding {}", args.listen_addr))?;
    tracing::info!(addr = %args.listen_addr, "listening");

    let served = axum::serve(listener, app).await;

    if let Some(provider) = provider {
        if let Err(e) = provider.shutdown() {
            eprintln!("failed to flush traces: {e}");
        }
    }
    served.context("server error")
}
