use axum::{extract::State, http::StatusCode, response::Json};
use serde::Serialize;

use crate::state::AppState;

/// 健康检查响应
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct HealthResponse {
    /// healthy | degraded
    #[schema(example = "healthy")]
    pub status: String,
    #[schema(example = "access-log-analyzer")]
    pub service: String,
    #[schema(example = "0.1.0")]
    pub version: String,
    /// SQLite 是否可用：ok | unavailable
    #[schema(example = "ok")]
    pub storage: String,
}

#[utoipa::path(
    get,
    path = "/health",
    summary = "健康检查",
    description = "探活端点。存储不可用时返回 503 与 degraded。",
    responses(
        (status = 200, description = "服务健康", body = HealthResponse),
        (status = 503, description = "存储不可用", body = HealthResponse)
    ),
    tag = "Health"
)]
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let storage_ok = match state.storage.ping().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!("健康检查：存储不可用: {}", e);
            false
        }
    };
    let (code, status) = if storage_ok {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };
    (
        code,
        Json(HealthResponse {
            status: status.to_string(),
            service: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            storage: if storage_ok { "ok" } else { "unavailable" }.to_string(),
        }),
    )
}
