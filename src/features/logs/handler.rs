use axum::{
    Router,
    extract::{Query, State},
    response::Json,
    routing::get,
};

use crate::error::AppError;
use crate::state::AppState;

use super::models::LogPage;
use super::query::{QueryFilterSpec, RawLogFilters, fetch_page};

#[utoipa::path(
    get,
    path = "/api/logs",
    summary = "分页查询访问日志",
    description = "每个过滤字段为逗号分隔的 token 列表，`-` 开头表示排除；字段内包含项取并集，排除项与其他字段取交集。每页固定 50 条。",
    params(RawLogFilters),
    responses(
        (status = 200, description = "当前页记录与分页信息", body = LogPage),
        (
            status = 500,
            description = "存储查询失败",
            body = crate::error::ProblemDetails,
            content_type = "application/problem+json"
        )
    ),
    tag = "Logs"
)]
pub async fn get_logs(
    State(state): State<AppState>,
    Query(raw): Query<RawLogFilters>,
) -> Result<Json<LogPage>, AppError> {
    let spec = QueryFilterSpec::from_raw(&raw);
    let page = fetch_page(state.storage.as_ref(), &spec, raw.page_number()).await?;
    tracing::debug!(
        "logs query: total={} page={}/{} sort={} {}",
        page.total,
        page.page,
        page.pages,
        page.sort,
        page.order
    );
    Ok(Json(page))
}

pub fn create_logs_router() -> Router<AppState> {
    Router::new().route("/logs", get(get_logs))
}
