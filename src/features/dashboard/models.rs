use serde::{Deserialize, Serialize};

/// 每小时请求数（本地时区小时桶，标签形如 `2024-05-01 13:00`）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct HourCount {
    pub hour: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct StatusCount {
    pub status: u16,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct CountryCount {
    pub country: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct PathCount {
    pub path: String,
    pub count: i64,
}

/// 仪表盘聚合快照；每次请求重新计算，不做缓存
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct DashboardStats {
    pub total_requests_24h: i64,
    pub total_requests_7d: i64,
    /// 24h 内 status >= 400 的占比（百分比）；无请求时为 0
    pub error_rate_24h: f64,
    pub unique_ips_24h: i64,
    /// 7 天窗口内按小时的请求数，升序
    pub requests_by_hour: Vec<HourCount>,
    /// 24h 内状态码分布，按状态码升序
    pub status_distribution: Vec<StatusCount>,
    /// 24h 内请求最多的 10 个国家
    pub top_countries: Vec<CountryCount>,
    /// 24h 内请求最多的 10 个路径
    pub top_paths: Vec<PathCount>,
}

/// 错误率（百分比），总数为 0 时返回 0
pub fn error_rate(errors: i64, total: i64) -> f64 {
    if total <= 0 {
        return 0.0;
    }
    errors as f64 / total as f64 * 100.0
}
