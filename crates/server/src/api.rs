//! HTTP API for placement, workload history, health checks and metrics

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use placement_lib::{
    health::{ComponentStatus, HealthRegistry},
    observability::PlacementMetrics,
    InMemoryWorkload, MetadataEntry, OptimalFilter, PlacementError, RankedResultTable,
    WorkloadHistory, WorkloadRequirement,
};
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub metrics: PlacementMetrics,
    pub filter: Arc<OptimalFilter>,
    pub history: WorkloadHistory,
}

impl AppState {
    pub fn new(
        health_registry: HealthRegistry,
        metrics: PlacementMetrics,
        filter: OptimalFilter,
        history: WorkloadHistory,
    ) -> Self {
        Self {
            health_registry,
            metrics,
            filter: Arc::new(filter),
            history,
        }
    }
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Placement(#[from] PlacementError),

    #[error("Metrics encoding failed: {0}")]
    Metrics(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl ApiError {
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Placement(PlacementError::InvalidWorkload(_)) => "invalid_workload",
            Self::Placement(PlacementError::ScoreOutOfRange { .. }) => "score_out_of_range",
            Self::Placement(_) => "registry_error",
            Self::Metrics(_) => "metrics_error",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Placement(PlacementError::InvalidWorkload(_)) => StatusCode::BAD_REQUEST,
            Self::Placement(e) if e.is_upstream() => StatusCode::BAD_GATEWAY,
            Self::Placement(_) | Self::Metrics(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.error_type(),
            message: self.to_string(),
        };
        (self.status_code(), Json(body)).into_response()
    }
}

/// Rank the fleet for the posted workload
async fn optimal(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<RankedResultTable>, ApiError> {
    let requirement = WorkloadRequirement::from_json(&body).map_err(|e| {
        warn!(event = "workload_rejected", error = %e, "Rejected workload payload");
        e
    })?;

    let mut workload = InMemoryWorkload::new(requirement);
    let outcome = state.filter.run(&mut workload).await;
    state.health_registry.record_run(&outcome).await;

    let table = outcome?;
    state.history.record(workload).await;
    Ok(Json(table))
}

/// Tables appended for one workload, oldest first
async fn history(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Json<Vec<MetadataEntry>> {
    Json(state.history.get(&name).await)
}

/// Health check response - returns 200 if healthy, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy | ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Result<impl IntoResponse, ApiError> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| ApiError::Metrics(e.to_string()))?;

    Ok((
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    ))
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/mf2c/optimal", post(optimal))
        .route("/mf2c/history/:name", get(history))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        assert_eq!(
            ApiError::from(PlacementError::InvalidWorkload("bad".into())).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(PlacementError::Source("down".into())).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ApiError::from(PlacementError::ScoreOutOfRange {
                parameter: "utilization",
                value: 2.0
            })
            .status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_error_types() {
        assert_eq!(
            ApiError::from(PlacementError::InvalidWorkload("bad".into())).error_type(),
            "invalid_workload"
        );
        assert_eq!(
            ApiError::from(PlacementError::Source("down".into())).error_type(),
            "registry_error"
        );
    }
}
