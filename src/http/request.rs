//! Request handling middleware.
//!
//! # Responsibilities
//! - Generate or propagate the `x-request-id` header
//! - Open the request span as a child of any inbound trace context
//! - Track in-flight requests and record request metrics
//! - Reject new work outside the `Serving` state
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing
//! - Metrics are recorded per matched route, not raw path, to bound cardinality
//! - A request still running when the drain deadline hits is cut off with 503

use std::time::{Duration, Instant};

use axum::extract::{MatchedPath, Request, State};
use axum::http::{HeaderValue, Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use opentelemetry::metrics::{Counter, Histogram, Meter};
use opentelemetry::KeyValue;
use opentelemetry_semantic_conventions::trace::{
    HTTP_REQUEST_METHOD, HTTP_RESPONSE_STATUS_CODE, HTTP_ROUTE,
};
use tracing::Span;
use tracing_opentelemetry::OpenTelemetrySpanExt;
use uuid::Uuid;

use crate::http::server::ServiceContext;
use crate::telemetry::extract_context;

/// Header carrying the request ID.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Request ID stored in request extensions.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Keep a usable inbound `x-request-id`, otherwise mint a UUID; echo it on the response.
pub async fn request_id(mut req: Request, next: Next) -> Response {
    let value = req
        .headers()
        .get(X_REQUEST_ID)
        .filter(|v| v.to_str().is_ok_and(|s| !s.is_empty()))
        .cloned()
        .unwrap_or_else(generate_request_id);

    let id = value.to_str().unwrap_or_default().to_string();
    req.headers_mut().insert(X_REQUEST_ID, value.clone());
    req.extensions_mut().insert(RequestId(id));

    let mut response = next.run(req).await;
    response.headers_mut().insert(X_REQUEST_ID, value);
    response
}

fn generate_request_id() -> HeaderValue {
    HeaderValue::from_str(&Uuid::new_v4().to_string())
        .unwrap_or_else(|_| HeaderValue::from_static("unknown"))
}

/// Span for one request, parented on the inbound `traceparent` if present.
pub fn make_request_span(req: &Request) -> Span {
    let request_id = req
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown");

    let span = tracing::info_span!(
        "http_request",
        method = %req.method(),
        uri = %req.uri(),
        request_id = %request_id,
    );
    span.set_parent(extract_context(req.headers()));
    span
}

/// Request counter and duration histogram.
#[derive(Debug, Clone)]
pub struct RequestMetrics {
    requests: Counter<u64>,
    duration: Histogram<f64>,
}

impl RequestMetrics {
    pub fn new(meter: &Meter) -> Self {
        Self {
            requests: meter
                .u64_counter("http.server.requests")
                .with_description("Requests handled, by route and status")
                .build(),
            duration: meter
                .f64_histogram("http.server.request.duration")
                .with_description("Request latency")
                .with_unit("s")
                .build(),
        }
    }

    fn record(&self, method: &Method, route: &str, status: StatusCode, elapsed: Duration) {
        let attributes = [
            KeyValue::new(HTTP_REQUEST_METHOD, method.to_string()),
            KeyValue::new(HTTP_ROUTE, route.to_string()),
            KeyValue::new(HTTP_RESPONSE_STATUS_CODE, i64::from(status.as_u16())),
        ];
        self.requests.add(1, &attributes);
        self.duration.record(elapsed.as_secs_f64(), &attributes);
    }
}

/// Count the request as in flight, record metrics, honor the drain cut-off.
pub async fn track(State(ctx): State<ServiceContext>, req: Request, next: Next) -> Response {
    let _guard = ctx.in_flight.track();
    let start = Instant::now();
    let method = req.method().clone();
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = tokio::select! {
        response = next.run(req) => response,
        _ = ctx.cutoff.triggered() => {
            tracing::warn!(route = %route, "Request cut off at drain deadline");
            (StatusCode::SERVICE_UNAVAILABLE, "request cut off by shutdown").into_response()
        }
    };

    ctx.metrics
        .record(&method, &route, response.status(), start.elapsed());
    response
}

/// Reject new work unless the service is `Serving`. `/health` always answers.
pub async fn gate(State(ctx): State<ServiceContext>, req: Request, next: Next) -> Response {
    let state = *ctx.state.borrow();
    if state.is_accepting() || req.uri().path() == "/health" {
        return next.run(req).await;
    }

    tracing::debug!(state = %state, path = %req.uri().path(), "Rejecting request outside serving state");
    (
        StatusCode::SERVICE_UNAVAILABLE,
        format!("service is {state}"),
    )
        .into_response()
}
