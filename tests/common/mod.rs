#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};

use access_log_analyzer::error::AppError;
use access_log_analyzer::features::dashboard::DashboardStats;
use access_log_analyzer::features::logs::predicate::{Predicate, SortSpec};
use access_log_analyzer::features::logs::{LogEntry, LogRepository, LogStorage};
use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Tz;
use tempfile::TempDir;

/// 临时目录中的 SQLite 库；`TempDir` 需与存储同生命周期
pub async fn temp_storage() -> (TempDir, LogStorage) {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("access.db");
    let storage = LogStorage::connect_sqlite(path.to_str().expect("utf8 path"), true)
        .await
        .expect("connect sqlite");
    storage.init_schema().await.expect("init schema");
    (dir, storage)
}

pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 31, 12, 0, 0).unwrap()
}

/// 一行 nginx json 日志
pub fn log_line(time: f64, addr: &str, path: &str, status: u16, country: &str) -> String {
    serde_json::json!({
        "time": time.to_string(),
        "remote_addr": addr,
        "host": "example.com",
        "method": "GET",
        "path": path,
        "q": "",
        "protocol": "HTTP/1.1",
        "status": status.to_string(),
        "bytes": "128",
        "city": "",
        "country": country,
        "user_agent": "curl/8.5",
    })
    .to_string()
        + "\n"
}

/// 第 `fail_on` 次写入时返回错误，其余委托给真实存储
pub struct FlakyRepo {
    inner: LogStorage,
    calls: AtomicUsize,
    fail_on: usize,
}

impl FlakyRepo {
    pub fn new(inner: LogStorage, fail_on: usize) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
            fail_on,
        }
    }
}

impl LogRepository for FlakyRepo {
    async fn insert_batch(&self, entries: &[LogEntry]) -> Result<(), AppError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) + 1 == self.fail_on {
            return Err(AppError::Internal("injected failure".into()));
        }
        self.inner.insert_batch(entries).await
    }

    async fn query(
        &self,
        predicate: &Predicate,
        sort: SortSpec,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<LogEntry>, i64), AppError> {
        self.inner.query(predicate, sort, limit, offset).await
    }

    async fn aggregate_stats(
        &self,
        since: DateTime<Utc>,
        tz: Tz,
    ) -> Result<DashboardStats, AppError> {
        self.inner.aggregate_stats(since, tz).await
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError> {
        self.inner.delete_older_than(cutoff).await
    }
}
