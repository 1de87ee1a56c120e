use std::time::Instant;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::http::server::ServiceContext;
use crate::lifecycle::LifecycleState;
use crate::resources::{ResourceHandle, ResourceKind};

#[derive(Serialize)]
pub struct ServiceInfo {
    pub service: String,
    pub version: &'static str,
    pub state: LifecycleState,
    pub endpoints: &'static [&'static str],
}

#[derive(Serialize)]
pub struct HealthStatus {
    pub state: LifecycleState,
    pub resources: Vec<ResourceStatus>,
}

#[derive(Serialize)]
pub struct ResourceStatus {
    pub name: String,
    pub kind: ResourceKind,
    /// `host:port` only; DSNs may carry credentials.
    pub target: Option<String>,
    pub open: bool,
}

impl ResourceStatus {
    fn of(handle: &ResourceHandle) -> Self {
        Self {
            name: handle.name().to_string(),
            kind: handle.kind(),
            target: handle.spec().target().ok().map(|t| t.to_string()),
            open: handle.is_open(),
        }
    }
}

#[derive(Serialize)]
pub struct PingResult {
    pub name: String,
    pub kind: ResourceKind,
    pub latency_ms: u128,
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: String,
}

fn error(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
        .into_response()
}

pub async fn index(State(ctx): State<ServiceContext>) -> Json<ServiceInfo> {
    Json(ServiceInfo {
        service: ctx.service_name.clone(),
        version: env!("CARGO_PKG_VERSION"),
        state: *ctx.state.borrow(),
        endpoints: &["/", "/health", "/resources", "/resources/{name}"],
    })
}

/// 200 while serving, 503 otherwise.
pub async fn health(State(ctx): State<ServiceContext>) -> Response {
    let state = *ctx.state.borrow();
    let status = if state.is_accepting() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let resources = ctx
        .registry
        .handles()
        .iter()
        .map(|h| ResourceStatus::of(h))
        .collect();

    (status, Json(HealthStatus { state, resources })).into_response()
}

pub async fn list_resources(State(ctx): State<ServiceContext>) -> Json<Vec<ResourceStatus>> {
    Json(
        ctx.registry
            .handles()
            .iter()
            .map(|h| ResourceStatus::of(h))
            .collect(),
    )
}

/// One backend round trip. Failures stay local to this request as a 500.
pub async fn ping_resource(
    State(ctx): State<ServiceContext>,
    Path(name): Path<String>,
) -> Response {
    let Some(handle) = ctx.registry.get(&name) else {
        return error(StatusCode::NOT_FOUND, format!("unknown resource `{name}`"));
    };

    let start = Instant::now();
    match tokio::time::timeout(ctx.request_timeout, handle.ping()).await {
        Ok(Ok(())) => Json(PingResult {
            name,
            kind: handle.kind(),
            latency_ms: start.elapsed().as_millis(),
        })
        .into_response(),
        Ok(Err(e)) => {
            tracing::warn!(resource = %name, kind = %handle.kind(), error = %e, "Backend call failed");
            error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
        Err(_) => {
            tracing::warn!(resource = %name, timeout = ?ctx.request_timeout, "Backend call timed out");
            error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("backend call timed out after {:?}", ctx.request_timeout),
            )
        }
    }
}
