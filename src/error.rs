use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// 应用统一错误类型
#[derive(Error, Debug, utoipa::ToSchema)]
pub enum AppError {
    /// 参数校验错误
    #[error("参数校验错误: {0}")]
    Validation(String),

    /// 禁止访问（如上传功能已关闭）
    #[error("禁止访问: {0}")]
    Forbidden(String),

    /// 内部服务器错误（存储/IO 等）
    #[error("内部错误: {0}")]
    Internal(String),

    /// 日志导入错误
    #[error("日志导入错误: {0}")]
    Ingest(#[from] IngestError),
}

/// 日志导入错误类型
///
/// 所有变体都携带失败前已经提交的条数与字节位置，
/// 调用方可据此判断部分进度是否已经持久化。
#[derive(Error, Debug, utoipa::ToSchema)]
pub enum IngestError {
    /// 打开或定位日志文件失败
    #[error("打开日志文件失败: {message}")]
    Open { message: String },

    /// 读取输入流失败
    #[error("读取日志失败（已提交 {committed} 条）: {message}")]
    Read {
        committed: usize,
        committed_bytes: u64,
        message: String,
    },

    /// 批次事务提交失败
    #[error("批次提交失败（已提交 {committed} 条）: {message}")]
    Commit {
        committed: usize,
        committed_bytes: u64,
        message: String,
    },
}

impl IngestError {
    /// 失败前已经提交的条目数
    pub fn committed(&self) -> usize {
        match self {
            IngestError::Open { .. } => 0,
            IngestError::Read { committed, .. } | IngestError::Commit { committed, .. } => {
                *committed
            }
        }
    }

    /// 已提交批次覆盖的输入字节数（尾随时据此推进偏移量）
    pub fn committed_bytes(&self) -> u64 {
        match self {
            IngestError::Open { .. } => 0,
            IngestError::Read {
                committed_bytes, ..
            }
            | IngestError::Commit {
                committed_bytes, ..
            } => *committed_bytes,
        }
    }
}

/// RFC7807 风格的错误响应（Problem Details）。
#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProblemDetails {
    /// 问题类型（URI）。若无更细分的类型，可使用 about:blank。
    #[serde(rename = "type")]
    #[schema(example = "about:blank")]
    pub type_url: String,

    /// 简短标题，用于概括错误。
    #[schema(example = "Validation Failed")]
    pub title: String,

    /// HTTP 状态码（与响应 status 一致）。
    #[schema(example = 422)]
    pub status: u16,

    /// 人类可读的详细信息（尽量稳定，不建议依赖解析）。
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,

    /// 稳定的错误码，用于程序化处理。
    #[schema(example = "VALIDATION_FAILED")]
    pub code: String,

    /// 可选：导入失败前已提交的条目数。
    #[serde(skip_serializing_if = "Option::is_none")]
    pub committed: Option<usize>,
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Ingest(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn stable_code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VALIDATION_FAILED",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::Internal(_) => "INTERNAL_ERROR",
            AppError::Ingest(IngestError::Open { .. }) => "INGEST_OPEN_FAILED",
            AppError::Ingest(IngestError::Read { .. }) => "INGEST_READ_FAILED",
            AppError::Ingest(IngestError::Commit { .. }) => "INGEST_COMMIT_FAILED",
        }
    }

    fn title(&self) -> &'static str {
        match self.status_code() {
            StatusCode::BAD_REQUEST => "Bad Request",
            StatusCode::FORBIDDEN => "Forbidden",
            StatusCode::INTERNAL_SERVER_ERROR => "Internal Server Error",
            _ => "Error",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let committed = match &self {
            AppError::Ingest(e) => Some(e.committed()),
            _ => None,
        };

        let problem = ProblemDetails {
            type_url: "about:blank".to_string(),
            title: self.title().to_string(),
            status: status.as_u16(),
            detail: Some(self.to_string()),
            code: self.stable_code().to_string(),
            committed,
        };

        let mut res = Json(problem).into_response();
        *res.status_mut() = status;
        res.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/problem+json"),
        );
        res
    }
}
