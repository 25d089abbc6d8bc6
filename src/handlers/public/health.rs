// handlers/public/health.rs - GET / and GET /health

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use chrono::Utc;
use serde_json::{json, Value};

use crate::middleware::ApiResponse;
use crate::state::AppState;

/// Service banner
pub async fn root(State(state): State<AppState>) -> ApiResponse<Value> {
    ApiResponse::success(json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "environment": state.config.environment,
        "endpoints": {
            "public": ["/", "/health", "/auth/login"],
            "protected": ["/api/auth", "/api/firm", "/api/users", "/api/clients", "/api/cases", "/api/tasks", "/api/attachments", "/api/audit"],
            "elevated": ["/api/admin/firms", "/api/admin/stats", "/api/admin/audit"]
        }
    }))
}

/// 200 when the database answers, 503 `degraded` otherwise
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    match state.db.health_check().await {
        Ok(()) => ApiResponse::success(json!({
            "status": "ok",
            "timestamp": Utc::now(),
            "database": "ok",
            "storage": state.storage.name(),
        }))
        .into_response(),
        Err(e) => {
            tracing::warn!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "success": false,
                    "data": {
                        "status": "degraded",
                        "timestamp": Utc::now(),
                        "database": "unreachable",
                        "storage": state.storage.name(),
                    }
                })),
            )
                .into_response()
        }
    }
}
