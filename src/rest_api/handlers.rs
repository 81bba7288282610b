//! HTTP handlers for the operator's health and metrics endpoints

use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};
use tracing::{error, instrument};

use crate::controller::ControllerState;

use super::dto::{HealthResponse, ReadinessResponse};

/// Liveness: the process is up and serving
#[instrument]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Readiness follows the leader lease; a follower reports 503
#[instrument(skip(state))]
pub async fn ready(
    State(state): State<Arc<ControllerState>>,
) -> (StatusCode, Json<ReadinessResponse>) {
    let leader = state.is_leader.load(Ordering::Relaxed);
    let status = if leader {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(ReadinessResponse {
            ready: leader,
            leader,
        }),
    )
}

/// Prometheus text exposition of the operator registry
pub async fn metrics() -> Result<String, StatusCode> {
    use prometheus_client::encoding::text::encode;

    let mut buffer = String::new();
    encode(&mut buffer, &crate::controller::metrics::REGISTRY).map_err(|e| {
        error!("Failed to encode metrics: {:?}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_reports_version() {
        let Json(body) = tokio_test::block_on(health());
        assert_eq!(body.status, "healthy");
        assert_eq!(body.version, env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn test_metrics_exposes_operator_families() {
        crate::controller::metrics::inc_reconcile_outcome("converged");
        let body = tokio_test::block_on(metrics()).unwrap();
        assert!(body.contains("pulp_reconcile_outcomes_total"));
    }
}
