use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde_json::json;

use crate::{app::AppState, db};

/// Component status for PostgreSQL and Redis. 503 when either is down.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    operation_id = "healthCheck",
    responses(
        (status = 200, description = "All components healthy"),
        (status = 503, description = "At least one component unhealthy")
    )
)]
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let mut overall_healthy = true;
    let timestamp = chrono::Utc::now().to_rfc3339();

    let postgres = match db::check_diesel_health(&state.diesel_pool).await {
        Ok(_) => json!({
            "status": "healthy",
            "max_connections": state.max_connections,
            "error": null
        }),
        Err(e) => {
            overall_healthy = false;
            tracing::error!("PostgreSQL health check failed: {}", e);
            json!({
                "status": "unhealthy",
                "error": "Database connection failed"
            })
        },
    };

    let redis = state.redis_pool.health_check().await;
    if !redis.is_healthy {
        overall_healthy = false;
    }

    let body = json!({
        "status": if overall_healthy { "healthy" } else { "degraded" },
        "service": "activity-marketplace",
        "timestamp": timestamp,
        "components": {
            "postgresql": postgres,
            "redis": {
                "status": if redis.is_healthy { "healthy" } else { "unhealthy" },
                "latency_ms": redis.latency_ms,
                "error": redis.error
            }
        }
    });

    let status = if overall_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}
