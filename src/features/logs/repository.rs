use std::future::Future;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use super::models::LogEntry;
use super::predicate::{Predicate, SortSpec};
use crate::error::AppError;
use crate::features::dashboard::models::DashboardStats;

/// 访问日志存储契约
///
/// 写操作各自在一个事务内完成；读操作之间不共享事务，
/// 计数与分页、仪表盘各项指标可能观察到不同时刻的数据。
pub trait LogRepository: Send + Sync {
    /// 原子写入一批记录（全部成功或全部回滚）
    fn insert_batch(
        &self,
        entries: &[LogEntry],
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    /// 按谓词分页查询，返回 (当前页记录, 总条数)
    fn query(
        &self,
        predicate: &Predicate,
        sort: SortSpec,
        limit: i64,
        offset: i64,
    ) -> impl Future<Output = Result<(Vec<LogEntry>, i64), AppError>> + Send;

    /// 以 `since`（now-24h）为锚点计算仪表盘聚合
    fn aggregate_stats(
        &self,
        since: DateTime<Utc>,
        tz: Tz,
    ) -> impl Future<Output = Result<DashboardStats, AppError>> + Send;

    /// 删除 time 严格早于 cutoff 的记录，返回删除条数
    fn delete_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> impl Future<Output = Result<u64, AppError>> + Send;
}
