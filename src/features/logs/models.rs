use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 一条已入库（或待入库）的访问记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct LogEntry {
    /// 入库后由存储分配的主键；未入库时为 0
    pub id: i64,
    /// 请求时间（Unix 秒，带小数，对应 nginx 的 $msec）
    pub time: f64,
    pub remote_addr: String,
    pub host: String,
    pub method: String,
    pub path: String,
    /// 查询串（nginx 日志中的 `q` 字段）
    pub query: String,
    pub protocol: String,
    pub status: u16,
    pub bytes: i64,
    pub city: String,
    pub country: String,
    pub user_agent: String,
    /// 导入时间
    #[schema(value_type = String, format = DateTime)]
    pub created_at: DateTime<Utc>,
}

/// 分页查询结果
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct LogPage {
    pub entries: Vec<LogEntry>,
    /// 当前过滤条件下的总条数
    pub total: i64,
    /// 当前页（从 1 开始）
    pub page: i64,
    /// 总页数（至少为 1）
    pub pages: i64,
    /// 实际生效的排序列
    pub sort: String,
    /// 实际生效的排序方向：asc | desc
    pub order: String,
}
