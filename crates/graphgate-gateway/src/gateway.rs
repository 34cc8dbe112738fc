use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    Router,
};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use graphgate_common::{ExecutionError, ExecutionResult, Principal};

use crate::decoder::{decode_request, read_body};
use crate::encoder::encode_result;
use crate::options::GatewayOptions;
use crate::service::{ExecuteError, QueryService};

/// Read-only state shared by every request the gateway intercepts.
#[derive(Clone)]
pub struct Gateway {
    options: Arc<GatewayOptions>,
    service: Arc<dyn QueryService>,
}

impl Gateway {
    pub fn new(options: GatewayOptions, service: Arc<dyn QueryService>) -> Self {
        Self {
            options: Arc::new(options),
            service,
        }
    }

    pub fn options(&self) -> &GatewayOptions {
        &self.options
    }

    async fn handle(&self, req: Request<Body>) -> Response {
        let principal = req.extensions().get::<Principal>().cloned();

        // Dropping the request future (client gone) cancels the engine call.
        let cancellation = CancellationToken::new();
        let _cancel_on_drop = cancellation.clone().drop_guard();
        if let Some(timeout) = self.options.execution_timeout {
            spawn_deadline(cancellation.clone(), timeout);
        }

        let body = match read_body(req.into_body(), self.options.max_body_bytes).await {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!(error = %e, "rejecting unreadable request body");
                return client_error(e.to_string());
            }
        };
        let query = match decode_request(&body) {
            Ok(q) => q,
            Err(e) => {
                tracing::warn!(error = %e, "rejecting malformed request body");
                return client_error(e.to_string());
            }
        };

        let operation = query.operation_name.clone().unwrap_or_default();
        tracing::Span::current().record("operation", operation.as_str());

        match self.service.execute(query, principal, cancellation).await {
            Ok(result) => {
                let encoded = encode_result(&result);
                tracing::info!(status = encoded.status.as_u16(), errors = result.errors.len(), "query handled");
                encoded.into_response()
            }
            Err(ExecuteError::Cancelled) => {
                tracing::info!("query cancelled before completion");
                let result = ExecutionResult::from_errors(vec![ExecutionError::new(
                    ExecuteError::Cancelled.to_string(),
                )]);
                encode_result(&result)
                    .with_status(StatusCode::GATEWAY_TIMEOUT)
                    .into_response()
            }
        }
    }
}

fn spawn_deadline(token: CancellationToken, timeout: Duration) {
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::time::sleep(timeout) => {
                tracing::debug!(timeout_ms = timeout.as_millis() as u64, "execution deadline reached");
                token.cancel();
            }
            _ = token.cancelled() => {}
        }
    });
}

fn client_error(message: String) -> Response {
    encode_result(&ExecutionResult::from_errors(vec![ExecutionError::new(message)])).into_response()
}

/// Intercepts `POST <request_path>`; everything else goes to `next` untouched.
pub async fn graphql_middleware(
    State(gateway): State<Gateway>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, Infallible> {
    if !gateway.options.matches(req.method(), req.uri().path()) {
        return Ok(next.run(req).await);
    }

    let span = tracing::info_span!(
        "graphql",
        request_id = %Uuid::new_v4(),
        operation = tracing::field::Empty,
    );
    Ok(gateway.handle(req).instrument(span).await)
}

pub trait GraphQLRouterExt {
    /// Install `gateway` in front of every route and the fallback added so far.
    fn graphql(self, gateway: Gateway) -> Self;
}

impl<S> GraphQLRouterExt for Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn graphql(self, gateway: Gateway) -> Self {
        self.layer(middleware::from_fn_with_state(gateway, graphql_middleware))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use axum::{
        http::{header, Method},
        routing::{get, post},
        Extension,
    };
    use graphgate_common::{Environment, QueryRequest, ResponseEnvelope, SchemaRef};
    use serde_json::json;
    use tower::ServiceExt;

    use super::*;
    use crate::engine::{EngineError, ExecutionEngine, StaticEngine, StaticSchema};
    use crate::options::PathMatch;
    use crate::service::EngineQueryService;
    use graphgate_common::ExecutionContext;

    #[derive(Default)]
    struct CountingService {
        calls: AtomicUsize,
        principals: std::sync::Mutex<Vec<Option<Principal>>>,
    }

    #[async_trait]
    impl QueryService for CountingService {
        async fn execute(
            &self,
            _request: QueryRequest,
            principal: Option<Principal>,
            _cancellation: CancellationToken,
        ) -> Result<ExecutionResult, ExecuteError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.principals.lock().unwrap().push(principal);
            Ok(ExecutionResult::from_data(json!({"ok": true})))
        }
    }

    struct SlowEngine;

    #[async_trait]
    impl ExecutionEngine for SlowEngine {
        async fn execute(&self, ctx: ExecutionContext) -> Result<ExecutionResult, EngineError> {
            tokio::select! {
                _ = ctx.cancellation.cancelled() => Err(EngineError::Cancelled),
                _ = tokio::time::sleep(Duration::from_secs(30)) => Ok(ExecutionResult::default()),
            }
        }
    }

    fn hello_service() -> Arc<dyn QueryService> {
        Arc::new(EngineQueryService::new(
            Arc::new(StaticEngine::new()),
            Arc::new(SchemaRef::new(StaticSchema::hello_world())),
            Environment::Production,
        ))
    }

    fn app(gateway: Gateway) -> Router {
        Router::new()
            .route("/GraphQL", get(|| async { (StatusCode::IM_A_TEAPOT, "downstream get") }))
            .route("/other", post(|body: String| async move { format!("echo:{body}") }))
            .fallback(|| async { (StatusCode::NOT_FOUND, "downstream fallback") })
            .graphql(gateway)
    }

    fn post_json(path: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(path)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn read(resp: Response) -> (StatusCode, Option<usize>, bytes::Bytes) {
        let status = resp.status();
        let len = resp
            .headers()
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, len, body)
    }

    #[tokio::test]
    async fn hello_world_scenario() {
        let resp = app(Gateway::new(GatewayOptions::default(), hello_service()))
            .oneshot(post_json("/GraphQL", r#"{"query":"{ hello }"}"#))
            .await
            .unwrap();

        assert_eq!(resp.headers()[header::CONTENT_TYPE], "application/json");
        let (status, len, body) = read(resp).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(len, Some(body.len()));
        assert_eq!(&body[..], br#"{"data":{"hello":"world"}}"#);
    }

    #[tokio::test]
    async fn empty_query_is_a_400_validation_error() {
        let resp = app(Gateway::new(GatewayOptions::default(), hello_service()))
            .oneshot(post_json("/GraphQL", r#"{"query":""}"#))
            .await
            .unwrap();

        let (status, len, body) = read(resp).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(len, Some(body.len()));
        let envelope: ResponseEnvelope = serde_json::from_slice(&body).unwrap();
        assert_eq!(envelope.data, None);
        assert_eq!(envelope.errors[0].message, "query must not be empty");
    }

    #[tokio::test]
    async fn unknown_field_maps_to_400() {
        let resp = app(Gateway::new(GatewayOptions::default(), hello_service()))
            .oneshot(post_json("/GraphQL", r#"{"query":"{ missing }"}"#))
            .await
            .unwrap();
        let (status, _, body) = read(resp).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let envelope: ResponseEnvelope = serde_json::from_slice(&body).unwrap();
        assert_eq!(envelope.errors.len(), 1);
    }

    #[tokio::test]
    async fn non_matching_requests_pass_through_untouched() {
        let svc = Arc::new(CountingService::default());
        let router = app(Gateway::new(GatewayOptions::default(), svc.clone()));

        let get_req = Request::builder()
            .method(Method::GET)
            .uri("/GraphQL")
            .body(Body::from(r#"{"query":"{ hello }"}"#))
            .unwrap();
        let (status, _, body) = read(router.clone().oneshot(get_req).await.unwrap()).await;
        assert_eq!(status, StatusCode::IM_A_TEAPOT);
        assert_eq!(&body[..], b"downstream get");

        let (status, _, body) =
            read(router.clone().oneshot(post_json("/other", "payload")).await.unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(&body[..], b"echo:payload");

        let (status, _, body) =
            read(router.clone().oneshot(post_json("/nowhere", "{}")).await.unwrap()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(&body[..], b"downstream fallback");

        assert_eq!(svc.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn path_match_is_case_sensitive_by_default() {
        let svc = Arc::new(CountingService::default());
        let router = app(Gateway::new(GatewayOptions::default(), svc.clone()));

        let (status, _, _) =
            read(router.oneshot(post_json("/graphql", r#"{"query":"{a}"}"#)).await.unwrap()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(svc.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn path_match_can_ignore_case() {
        let svc = Arc::new(CountingService::default());
        let opts = GatewayOptions::default().with_path_match(PathMatch::IgnoreAsciiCase);
        let router = app(Gateway::new(opts, svc.clone()));

        for path in ["/graphql", "/GraphQL"] {
            let (status, _, _) = read(
                router
                    .clone()
                    .oneshot(post_json(path, r#"{"query":"{a}"}"#))
                    .await
                    .unwrap(),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
        }
        assert_eq!(svc.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn custom_request_path() {
        let svc = Arc::new(CountingService::default());
        let router = app(Gateway::new(GatewayOptions::new("/api/query"), svc.clone()));

        let (status, _, _) =
            read(router.clone().oneshot(post_json("/api/query", r#"{"query":"{a}"}"#)).await.unwrap())
                .await;
        assert_eq!(status, StatusCode::OK);

        // Falls through to the fixture's GET-only /GraphQL route.
        let (status, _, _) =
            read(router.oneshot(post_json("/GraphQL", r#"{"query":"{a}"}"#)).await.unwrap()).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(svc.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn malformed_body_is_rejected_without_execution() {
        let svc = Arc::new(CountingService::default());
        let router = app(Gateway::new(GatewayOptions::default(), svc.clone()));

        for body in ["{not json", "[]", r#"["{ hello }", null, "Op"]"#, r#"{"query":1}"#] {
            let (status, len, bytes) =
                read(router.clone().oneshot(post_json("/GraphQL", body)).await.unwrap()).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(len, Some(bytes.len()));
            let envelope: ResponseEnvelope = serde_json::from_slice(&bytes).unwrap();
            assert_eq!(envelope.errors.len(), 1);
        }
        assert_eq!(svc.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        let svc = Arc::new(CountingService::default());
        let opts = GatewayOptions::default().with_max_body_bytes(16);
        let router = app(Gateway::new(opts, svc.clone()));

        let body = format!(r#"{{"query":"{{ {} }}"}}"#, "a ".repeat(64));
        let (status, _, _) = read(router.oneshot(post_json("/GraphQL", &body)).await.unwrap()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(svc.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn principal_extension_reaches_service() {
        let svc = Arc::new(CountingService::default());
        let router = app(Gateway::new(GatewayOptions::default(), svc.clone()))
            .layer(Extension(Principal::new("carol")));

        let (status, _, _) =
            read(router.oneshot(post_json("/GraphQL", r#"{"query":"{a}"}"#)).await.unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            svc.principals.lock().unwrap().as_slice(),
            &[Some(Principal::new("carol"))]
        );
    }

    #[tokio::test]
    async fn deadline_cancels_execution() {
        let svc: Arc<dyn QueryService> = Arc::new(EngineQueryService::new(
            Arc::new(SlowEngine),
            Arc::new(SchemaRef::new(())),
            Environment::Production,
        ));
        let opts = GatewayOptions::default().with_execution_timeout(Some(Duration::from_millis(20)));
        let resp = app(Gateway::new(opts, svc))
            .oneshot(post_json("/GraphQL", r#"{"query":"{ slow }"}"#))
            .await
            .unwrap();

        let (status, len, body) = read(resp).await;
        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(len, Some(body.len()));
        let envelope: ResponseEnvelope = serde_json::from_slice(&body).unwrap();
        assert_eq!(envelope.errors[0].message, "operation was cancelled");
    }

    #[tokio::test]
    async fn array_body_is_not_executed() {
        let resp = app(Gateway::new(GatewayOptions::default(), hello_service()))
            .oneshot(post_json("/GraphQL", r#"["{ hello }"]"#))
            .await
            .unwrap();
        let (status, _, body) = read(resp).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let envelope: ResponseEnvelope = serde_json::from_slice(&body).unwrap();
        assert_eq!(envelope.data, None);
        assert_eq!(envelope.errors.len(), 1);
    }

    /// Holds every execution until `n` of them are in flight at once.
    struct BarrierEngine {
        barrier: tokio::sync::Barrier,
    }

    #[async_trait]
    impl ExecutionEngine for BarrierEngine {
        async fn execute(&self, _ctx: ExecutionContext) -> Result<ExecutionResult, EngineError> {
            self.barrier.wait().await;
            Ok(ExecutionResult::from_data(json!({"ok": true})))
        }
    }

    #[tokio::test]
    async fn concurrent_requests_do_not_block_each_other() {
        const N: usize = 8;
        let svc: Arc<dyn QueryService> = Arc::new(EngineQueryService::new(
            Arc::new(BarrierEngine {
                barrier: tokio::sync::Barrier::new(N),
            }),
            Arc::new(SchemaRef::new(())),
            Environment::Production,
        ));
        let router = app(Gateway::new(GatewayOptions::default(), svc));

        let mut tasks = Vec::new();
        for _ in 0..N {
            let router = router.clone();
            tasks.push(tokio::spawn(async move {
                let resp = router
                    .oneshot(post_json("/GraphQL", r#"{"query":"{ ok }"}"#))
                    .await
                    .unwrap();
                resp.status()
            }));
        }

        let statuses = tokio::time::timeout(Duration::from_secs(5), async {
            let mut out = Vec::new();
            for t in tasks {
                out.push(t.await.unwrap());
            }
            out
        })
        .await
        .expect("requests were serialised instead of overlapping");
        assert!(statuses.iter().all(|s| *s == StatusCode::OK));
    }
}
