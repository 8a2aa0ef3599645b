/// 统一错误处理模块
pub mod error;

/// 配置模块
pub mod config;

/// 时间源
pub mod clock;

/// 功能聚合模块
pub mod features;

/// 应用状态聚合模块
pub mod state;

/// 优雅退出管理模块
pub mod shutdown;

/// OpenAPI 文档
pub mod openapi;

use axum::{Router, extract::DefaultBodyLimit, routing::get};
use tower_http::compression::CompressionLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

// 导出常用类型供外部使用
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::AppConfig;
pub use error::{AppError, IngestError};
pub use shutdown::{ShutdownHandle, ShutdownManager, ShutdownReason};
pub use state::AppState;

fn compression_predicate() -> impl tower_http::compression::predicate::Predicate {
    use tower_http::compression::predicate::{NotForContentType, Predicate, SizeAbove};

    // JSON 结果集压缩收益明显；流式与已压缩内容保持原样
    SizeAbove::default()
        .and(NotForContentType::GRPC)
        .and(NotForContentType::IMAGES)
        .and(NotForContentType::SSE)
        .and(NotForContentType::const_new("application/octet-stream"))
        .and(NotForContentType::const_new("application/gzip"))
}

/// 组装完整路由：`/health`、`/api/*` 业务接口与 `/docs` 文档
pub fn create_app(state: AppState, upload_max_bytes: usize) -> Router {
    let api = Router::<AppState>::new()
        .merge(features::logs::create_logs_router())
        .merge(features::dashboard::create_dashboard_router())
        .merge(features::ingest::create_ingest_router());

    Router::<AppState>::new()
        .route("/health", get(features::health::health_check))
        .nest("/api", api)
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", openapi::ApiDoc::openapi()))
        .layer(DefaultBodyLimit::max(upload_max_bytes))
        .layer(CompressionLayer::new().compress_when(compression_predicate()))
        .with_state(state)
}

#[cfg(test)]
mod compression_predicate_tests {
    use super::compression_predicate;
    use axum::body::Body;
    use axum::http::{Response as HttpResponse, header};
    use tower_http::compression::predicate::Predicate;

    fn should_compress_for(ct: &str) -> bool {
        let resp = HttpResponse::builder()
            .header(header::CONTENT_TYPE, ct)
            .body(Body::from(vec![b'x'; 2048]))
            .unwrap();
        compression_predicate().should_compress(&resp)
    }

    #[test]
    fn json_is_compressed() {
        assert!(should_compress_for("application/json"));
        assert!(should_compress_for("application/problem+json"));
    }

    #[test]
    fn streams_and_binaries_are_not() {
        assert!(!should_compress_for("text/event-stream"));
        assert!(!should_compress_for("application/octet-stream"));
        assert!(!should_compress_for("image/png"));
    }
}
