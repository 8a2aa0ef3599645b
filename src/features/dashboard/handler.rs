use axum::{Router, extract::State, response::Json, routing::get};

use crate::error::AppError;
use crate::state::AppState;

use super::models::DashboardStats;

#[utoipa::path(
    get,
    path = "/api/dashboard",
    summary = "仪表盘统计",
    description = "最近 24 小时 / 7 天的请求量、错误率、独立 IP、按小时分布、状态码分布及 Top 10 国家与路径。每次请求实时计算。",
    responses(
        (status = 200, description = "统计快照", body = DashboardStats),
        (
            status = 500,
            description = "存储查询失败",
            body = crate::error::ProblemDetails,
            content_type = "application/problem+json"
        )
    ),
    tag = "Dashboard"
)]
pub async fn get_dashboard(
    State(state): State<AppState>,
) -> Result<Json<DashboardStats>, AppError> {
    let stats = super::snapshot(
        state.storage.as_ref(),
        state.clock.as_ref(),
        state.dashboard_tz,
    )
    .await?;
    Ok(Json(stats))
}

pub fn create_dashboard_router() -> Router<AppState> {
    Router::new().route("/dashboard", get(get_dashboard))
}
