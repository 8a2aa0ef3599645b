use axum::{
    Router,
    extract::{Multipart, State},
    response::Json,
    routing::post,
};
use futures_util::TryStreamExt;
use serde::Serialize;
use tokio::io::BufReader;
use tokio_util::io::StreamReader;

use crate::error::AppError;
use crate::state::AppState;

use super::pipeline::ingest_reader;

/// 上传表单中承载日志文件的字段名
pub const UPLOAD_FIELD: &str = "logfile";

#[derive(Debug, Serialize, utoipa::ToSchema)]
#[schema(example = json!({"ingested": 1234}))]
pub struct UploadResponse {
    /// 已提交的条目数
    pub ingested: usize,
}

/// multipart 表单（仅用于文档）
#[derive(utoipa::ToSchema)]
#[allow(dead_code)]
pub struct UploadForm {
    /// 每行一个 JSON 对象的访问日志
    #[schema(value_type = String, format = Binary)]
    logfile: Vec<u8>,
}

#[utoipa::path(
    post,
    path = "/api/upload",
    summary = "上传访问日志",
    description = "以 multipart/form-data 上传 nginx json 日志（字段名 logfile）。无法解析的行会被跳过；按 1000 条一批提交，某批失败时返回此前已提交的条数。",
    request_body(content_type = "multipart/form-data", content = UploadForm),
    responses(
        (status = 200, description = "导入完成", body = UploadResponse),
        (
            status = 400,
            description = "缺少 logfile 字段或表单不合法",
            body = crate::error::ProblemDetails,
            content_type = "application/problem+json"
        ),
        (
            status = 403,
            description = "上传功能已关闭",
            body = crate::error::ProblemDetails,
            content_type = "application/problem+json"
        ),
        (
            status = 500,
            description = "批次提交失败（committed 为已提交条数）",
            body = crate::error::ProblemDetails,
            content_type = "application/problem+json"
        )
    ),
    tag = "Ingest"
)]
pub async fn upload_logs(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    if !state.upload_enabled {
        return Err(AppError::Forbidden("上传功能已关闭".into()));
    }

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("表单解析失败: {e}")))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let file_name = field.file_name().unwrap_or("-").to_string();
        tracing::info!("收到上传 {}", file_name);

        // 边读边解析，内存占用与文件大小无关
        let stream = Box::pin(field.map_err(std::io::Error::other));
        let reader = BufReader::new(StreamReader::new(stream));
        let report = ingest_reader(
            reader,
            state.storage.as_ref(),
            &state.rules,
            state.clock.as_ref(),
        )
        .await?;
        tracing::info!(
            "上传 {} 导入 {} 条（{} 字节）",
            file_name,
            report.ingested,
            report.consumed_bytes
        );
        return Ok(Json(UploadResponse {
            ingested: report.ingested,
        }));
    }

    Err(AppError::Validation(format!("缺少上传字段 {UPLOAD_FIELD}")))
}

pub fn create_ingest_router() -> Router<AppState> {
    Router::new().route("/upload", post(upload_logs))
}
