//! Liveness, readiness, and detailed-health endpoint handlers.
//!
//! These expose server health information for orchestrators (Kubernetes,
//! load balancers) and operational monitoring.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::json;

use super::AppState;
use crate::network::HealthState;
use crate::replica::{QUEUE_ALL_BANDS, QUEUE_EXPIRED, QUEUE_ITEMS, QUEUE_LEASES};

/// Detailed health as JSON. Always returns 200 -- the `state` field lets
/// monitoring tools distinguish "up but draining" from "down".
pub async fn health_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let cancel = tokio_util::sync::CancellationToken::new();
    let health = state.shutdown.health_state();
    let uptime_secs = state.start_time.elapsed().as_secs();

    let queue_count = state.replica.count(QUEUE_ALL_BANDS, &cancel).await.unwrap_or_default();
    let lease_count = state.replica.count(QUEUE_LEASES, &cancel).await.unwrap_or_default();
    let expired_count = state.replica.count(QUEUE_EXPIRED, &cancel).await.unwrap_or_default();
    let item_count = state.replica.count(QUEUE_ITEMS, &cancel).await.unwrap_or_default();

    Json(json!({
        "state": health.as_str(),
        "partition_id": state.replica.partition_id(),
        "uptime_secs": uptime_secs,
        "queue_count": queue_count,
        "lease_count": lease_count,
        "expired_count": expired_count,
        "item_count": item_count,
    }))
}

/// Kubernetes liveness probe -- always 200 while the process is running.
pub async fn liveness_handler() -> StatusCode {
    StatusCode::OK
}

/// Kubernetes readiness probe -- 200 once `Ready`, 503 otherwise (startup,
/// draining, or stopped).
pub async fn readiness_handler(State(state): State<AppState>) -> StatusCode {
    if state.shutdown.health_state() == HealthState::Ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}
