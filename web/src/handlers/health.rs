//! Health check endpoints.
//!
//! Used by load balancers and orchestrators to probe the service.

use crate::state::AppState;
use axum::{Json, extract::State, http::StatusCode};
use serde_json::{Value, json};

/// Liveness: the process is serving requests. Does not touch the store.
///
/// ```text
/// GET /health
/// ```
#[allow(clippy::unused_async)]
pub async fn health_check() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

/// Readiness: the store answers a read.
///
/// ```text
/// GET /ready
/// ```
///
/// Returns 503 with the failure message while the store is unreachable.
pub async fn readiness_check(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    match state.engine.list_raffles().await {
        Ok(raffles) => (
            StatusCode::OK,
            Json(json!({ "status": "ready", "raffles": raffles.len() })),
        ),
        Err(err) => {
            tracing::warn!(error = %err, "Readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unavailable", "error": err.to_string() })),
            )
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn liveness_is_always_ok() {
        let (status, body) = health_check().await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "ok");
    }
}
