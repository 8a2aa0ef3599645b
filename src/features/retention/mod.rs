//! 过期数据清理
//!
//! 删除 `time` 严格早于 `now - retention.days` 的记录。启动时先清理一次，
//! 之后按 `retention.interval_secs` 周期执行；单次失败只记日志，不影响后续调度。

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::time::MissedTickBehavior;

use crate::clock::Clock;
use crate::config::RetentionConfig;
use crate::error::AppError;
use crate::features::logs::repository::LogRepository;
use crate::shutdown::ShutdownHandle;

/// 按当前时间计算截止点并清理一次，返回删除条数
pub async fn sweep_once<R: LogRepository>(
    repo: &R,
    clock: &dyn Clock,
    max_age: chrono::Duration,
) -> Result<u64, AppError> {
    let cutoff: DateTime<Utc> = clock.now() - max_age;
    let deleted = repo.delete_older_than(cutoff).await?;
    if deleted > 0 {
        tracing::info!("清理过期日志 {} 条（早于 {}）", deleted, cutoff.to_rfc3339());
    } else {
        tracing::debug!("没有早于 {} 的日志需要清理", cutoff.to_rfc3339());
    }
    Ok(deleted)
}

/// 周期清理任务，收到退出信号后返回
pub async fn run_retention_sweeper<R>(
    repo: Arc<R>,
    clock: Arc<dyn Clock>,
    cfg: RetentionConfig,
    mut shutdown: ShutdownHandle,
) where
    R: LogRepository + 'static,
{
    let max_age = cfg.max_age();
    tracing::info!(
        "数据保留任务启动：保留 {} 天，每 {:?} 清理一次",
        max_age.num_days(),
        cfg.interval()
    );

    let mut ticker = tokio::time::interval(cfg.interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        if shutdown.is_shutting_down() {
            break;
        }
        tokio::select! {
            _ = shutdown.wait() => break,
            // 第一次 tick 立即完成，对应启动时的那次清理
            _ = ticker.tick() => {
                if let Err(e) = sweep_once(repo.as_ref(), clock.as_ref(), max_age).await {
                    tracing::warn!("清理过期日志失败（等待下次调度）: {}", e);
                }
            }
        }
    }
    tracing::info!("数据保留任务已停止");
}
