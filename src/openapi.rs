use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::features::health::handler::health_check,
        crate::features::logs::handler::get_logs,
        crate::features::dashboard::handler::get_dashboard,
        crate::features::ingest::handler::upload_logs,
    ),
    components(
        schemas(
            crate::error::ProblemDetails,
            crate::features::health::HealthResponse,
            crate::features::logs::models::LogEntry,
            crate::features::logs::models::LogPage,
            crate::features::dashboard::models::DashboardStats,
            crate::features::dashboard::models::HourCount,
            crate::features::dashboard::models::StatusCount,
            crate::features::dashboard::models::CountryCount,
            crate::features::dashboard::models::PathCount,
            crate::features::ingest::handler::UploadResponse,
            crate::features::ingest::handler::UploadForm,
        )
    ),
    tags(
        (name = "Logs", description = "访问日志查询：包含/排除过滤、排序与分页。"),
        (name = "Dashboard", description = "仪表盘：24 小时 / 7 天窗口聚合。"),
        (name = "Ingest", description = "日志导入：multipart 上传 nginx json 日志。"),
        (name = "Health", description = "健康检查：服务与存储探活。"),
    ),
    info(
        title = "Access Log Analyzer API",
        version = env!("CARGO_PKG_VERSION"),
        description = "nginx json 访问日志的导入、查询与统计服务（Axum + SQLite）。"
    )
)]
pub struct ApiDoc;
