use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

#[derive(Debug, Default)]
pub struct Metrics {
    pub requests_total: AtomicU64,
    pub requests_inflight: AtomicU64,
    pub status_2xx: AtomicU64,
    pub status_4xx: AtomicU64,
    pub status_5xx: AtomicU64,
}

impl Metrics {
    fn observe(&self, status: StatusCode) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        let bucket = match status.as_u16() {
            500.. => &self.status_5xx,
            400..=499 => &self.status_4xx,
            200..=299 => &self.status_2xx,
            _ => return,
        };
        bucket.fetch_add(1, Ordering::Relaxed);
    }
}

fn write_metric(out: &mut String, name: &str, kind: &str, help: &str, value: &AtomicU64) {
    let _ = write!(
        out,
        "# HELP graphgate_{name} {help}\n# TYPE graphgate_{name} {kind}\ngraphgate_{name} {}\n",
        value.load(Ordering::Relaxed)
    );
}

pub fn render_metrics(metrics: &Metrics) -> String {
    let mut body = String::new();
    write_metric(&mut body, "requests_total", "counter", "Total HTTP requests handled.", &metrics.requests_total);
    write_metric(&mut body, "requests_inflight", "gauge", "Currently in-flight requests.", &metrics.requests_inflight);
    write_metric(&mut body, "responses_2xx", "counter", "Total 2xx responses.", &metrics.status_2xx);
    write_metric(&mut body, "responses_4xx", "counter", "Total 4xx responses.", &metrics.status_4xx);
    write_metric(&mut body, "responses_5xx", "counter", "Total 5xx responses.", &metrics.status_5xx);
    body
}

pub async fn metrics_handler(State(metrics): State<Arc<Metrics>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        render_metrics(&metrics),
    )
}

pub async fn track_requests(
    State(metrics): State<Arc<Metrics>>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, std::convert::Infallible> {
    let inflight = InflightGuard::enter(&metrics);
    let resp = next.run(req).await;
    drop(inflight);
    metrics.observe(resp.status());
    Ok(resp)
}

/// Decrements the in-flight gauge on drop, so cancelled requests are released too.
struct InflightGuard<'a>(&'a Metrics);

impl<'a> InflightGuard<'a> {
    fn enter(metrics: &'a Metrics) -> Self {
        metrics.requests_inflight.fetch_add(1, Ordering::Relaxed);
        Self(metrics)
    }
}

impl Drop for InflightGuard<'_> {
    fn drop(&mut self) {
        self.0.requests_inflight.fetch_sub(1, Ordering::Relaxed);
    }
}
