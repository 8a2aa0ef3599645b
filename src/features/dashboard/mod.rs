pub mod handler;
pub mod models;

use chrono::Duration;
use chrono_tz::Tz;

use crate::clock::Clock;
use crate::error::AppError;
use crate::features::logs::repository::LogRepository;

pub use handler::create_dashboard_router;
pub use models::DashboardStats;

/// 以当前时间为锚点计算仪表盘快照（24h 窗口起点为 now - 24h）
pub async fn snapshot<R: LogRepository>(
    repo: &R,
    clock: &dyn Clock,
    tz: Tz,
) -> Result<DashboardStats, AppError> {
    let since = clock.now() - Duration::hours(24);
    repo.aggregate_stats(since, tz).await
}
