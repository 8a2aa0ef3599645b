use std::{collections::BTreeMap, path::Path};

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use sqlx::{
    QueryBuilder, Row, Sqlite, SqlitePool,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqliteRow, SqliteSynchronous},
};

use super::models::LogEntry;
use super::predicate::{Predicate, SortSpec};
use super::repository::LogRepository;
use crate::clock::epoch_seconds;
use crate::error::AppError;
use crate::features::dashboard::models::{
    CountryCount, DashboardStats, HourCount, PathCount, StatusCount, error_rate,
};

/// 小时分桶的 SQL 粒度（秒）。按 15 分钟聚合后再在应用端折算到本地小时，
/// 可以覆盖 +05:30、+05:45 这类非整点时区。
const HOUR_BUCKET_GRAIN_SECS: i64 = 900;

const SELECT_COLUMNS: &str = "SELECT id, time, remote_addr, host, method, path, query, protocol, status, bytes, city, country, user_agent, created_at FROM log_entries";

#[derive(Clone)]
pub struct LogStorage {
    pub pool: SqlitePool,
}

impl LogStorage {
    pub async fn connect_sqlite(path: &str, wal: bool) -> Result<Self, AppError> {
        let journal = if wal {
            SqliteJournalMode::Wal
        } else {
            SqliteJournalMode::Delete
        };
        let opt = SqliteConnectOptions::new()
            .filename(Path::new(path))
            .create_if_missing(true)
            .journal_mode(journal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true);
        let pool = SqlitePool::connect_with(opt)
            .await
            .map_err(|e| AppError::Internal(format!("sqlite connect: {e}")))?;
        Ok(Self { pool })
    }

    pub async fn init_schema(&self) -> Result<(), AppError> {
        let ddl = r#"
        CREATE TABLE IF NOT EXISTS log_entries (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            time REAL NOT NULL,
            remote_addr TEXT,
            host TEXT,
            method TEXT,
            path TEXT,
            query TEXT,
            protocol TEXT,
            status INTEGER,
            bytes INTEGER,
            city TEXT,
            country TEXT,
            user_agent TEXT,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_log_entries_time ON log_entries(time);
        CREATE INDEX IF NOT EXISTS idx_log_entries_status ON log_entries(status);
        CREATE INDEX IF NOT EXISTS idx_log_entries_country ON log_entries(country);
        CREATE INDEX IF NOT EXISTS idx_log_entries_path ON log_entries(path);
        CREATE INDEX IF NOT EXISTS idx_log_entries_host ON log_entries(host);
        CREATE INDEX IF NOT EXISTS idx_log_entries_remote_addr_time ON log_entries(remote_addr, time);
        CREATE INDEX IF NOT EXISTS idx_log_entries_created_at ON log_entries(created_at);
        "#;
        sqlx::query(ddl)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Internal(format!("init schema: {e}")))?;
        Ok(())
    }

    /// 探活：执行一次 `SELECT 1`
    pub async fn ping(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Internal(format!("ping: {e}")))?;
        Ok(())
    }

    async fn count_since(&self, since: f64, errors_only: bool) -> Result<i64, AppError> {
        let sql = if errors_only {
            "SELECT COUNT(1) AS c FROM log_entries WHERE time >= ? AND status >= 400"
        } else {
            "SELECT COUNT(1) AS c FROM log_entries WHERE time >= ?"
        };
        let row = sqlx::query(sql)
            .bind(since)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::Internal(format!("dashboard count: {e}")))?;
        Ok(row.try_get::<i64, _>("c").unwrap_or(0))
    }

    async fn requests_by_hour(&self, since: f64, tz: Tz) -> Result<Vec<HourCount>, AppError> {
        let rows = sqlx::query(
            "SELECT CAST(time / ? AS INTEGER) AS bucket, COUNT(1) AS cnt
             FROM log_entries WHERE time >= ?
             GROUP BY bucket ORDER BY bucket",
        )
        .bind(HOUR_BUCKET_GRAIN_SECS)
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Internal(format!("dashboard by hour: {e}")))?;

        let mut by_hour: BTreeMap<String, i64> = BTreeMap::new();
        for r in rows {
            let bucket: i64 = r.try_get("bucket").unwrap_or(0);
            let cnt: i64 = r.try_get("cnt").unwrap_or(0);
            if let Some(label) = hour_label(bucket * HOUR_BUCKET_GRAIN_SECS, tz) {
                *by_hour.entry(label).or_insert(0) += cnt;
            }
        }
        Ok(by_hour
            .into_iter()
            .map(|(hour, count)| HourCount { hour, count })
            .collect())
    }
}

/// 将 Unix 秒折算为本地时区的小时标签
pub(crate) fn hour_label(epoch_secs: i64, tz: Tz) -> Option<String> {
    DateTime::<Utc>::from_timestamp(epoch_secs, 0)
        .map(|t| t.with_timezone(&tz).format("%Y-%m-%d %H:00").to_string())
}

fn row_to_entry(r: &SqliteRow) -> LogEntry {
    let status: i64 = r.try_get("status").unwrap_or(0);
    LogEntry {
        id: r.try_get("id").unwrap_or(0),
        time: r.try_get("time").unwrap_or(0.0),
        remote_addr: r.try_get("remote_addr").unwrap_or_default(),
        host: r.try_get("host").unwrap_or_default(),
        method: r.try_get("method").unwrap_or_default(),
        path: r.try_get("path").unwrap_or_default(),
        query: r.try_get("query").unwrap_or_default(),
        protocol: r.try_get("protocol").unwrap_or_default(),
        status: u16::try_from(status).unwrap_or(0),
        bytes: r.try_get("bytes").unwrap_or(0),
        city: r.try_get("city").unwrap_or_default(),
        country: r.try_get("country").unwrap_or_default(),
        user_agent: r.try_get("user_agent").unwrap_or_default(),
        created_at: r.try_get("created_at").unwrap_or_default(),
    }
}

impl LogRepository for LogStorage {
    async fn insert_batch(&self, entries: &[LogEntry]) -> Result<(), AppError> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::Internal(format!("begin tx: {e}")))?;

        // SQLite 默认 `SQLITE_MAX_VARIABLE_NUMBER=999`，每行 13 列绑定参数，按 76 行/语句拆分。
        const COLS: usize = 13;
        const SQLITE_MAX_VARS: usize = 999;
        const MAX_ROWS_PER_INSERT: usize = SQLITE_MAX_VARS / COLS;

        for chunk in entries.chunks(MAX_ROWS_PER_INSERT) {
            let mut qb = QueryBuilder::<Sqlite>::new(
                "INSERT INTO log_entries(time, remote_addr, host, method, path, query, protocol, status, bytes, city, country, user_agent, created_at) ",
            );
            qb.push_values(chunk, |mut b, e| {
                b.push_bind(e.time)
                    .push_bind(e.remote_addr.clone())
                    .push_bind(e.host.clone())
                    .push_bind(e.method.clone())
                    .push_bind(e.path.clone())
                    .push_bind(e.query.clone())
                    .push_bind(e.protocol.clone())
                    .push_bind(i64::from(e.status))
                    .push_bind(e.bytes)
                    .push_bind(e.city.clone())
                    .push_bind(e.country.clone())
                    .push_bind(e.user_agent.clone())
                    .push_bind(e.created_at);
            });
            qb.build()
                .execute(&mut *tx)
                .await
                .map_err(|e| AppError::Internal(format!("insert log entry: {e}")))?;
        }
        tx.commit()
            .await
            .map_err(|e| AppError::Internal(format!("commit: {e}")))?;
        Ok(())
    }

    async fn query(
        &self,
        predicate: &Predicate,
        sort: SortSpec,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<LogEntry>, i64), AppError> {
        let mut count_qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(1) AS c FROM log_entries");
        predicate.push_where(&mut count_qb);
        let count_row = count_qb
            .build()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::Internal(format!("count log entries: {e}")))?;
        let total: i64 = count_row.try_get("c").unwrap_or(0);

        let mut qb = QueryBuilder::<Sqlite>::new(SELECT_COLUMNS);
        predicate.push_where(&mut qb);
        sort.push_order_by(&mut qb);
        qb.push(" LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);
        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::Internal(format!("query log entries: {e}")))?;

        Ok((rows.iter().map(row_to_entry).collect(), total))
    }

    async fn aggregate_stats(
        &self,
        since: DateTime<Utc>,
        tz: Tz,
    ) -> Result<DashboardStats, AppError> {
        let since_24h = epoch_seconds(since);
        let since_7d = epoch_seconds(since - chrono::Duration::days(6));

        let total_24h = self.count_since(since_24h, false).await?;
        let total_7d = self.count_since(since_7d, false).await?;
        let errors_24h = self.count_since(since_24h, true).await?;

        let row = sqlx::query(
            "SELECT COUNT(DISTINCT remote_addr) AS c FROM log_entries WHERE time >= ?",
        )
        .bind(since_24h)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::Internal(format!("dashboard unique ips: {e}")))?;
        let unique_ips_24h: i64 = row.try_get("c").unwrap_or(0);

        let requests_by_hour = self.requests_by_hour(since_7d, tz).await?;

        let rows = sqlx::query(
            "SELECT status, COUNT(1) AS cnt FROM log_entries WHERE time >= ?
             GROUP BY status ORDER BY status",
        )
        .bind(since_24h)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Internal(format!("dashboard status: {e}")))?;
        let status_distribution = rows
            .iter()
            .map(|r| StatusCount {
                status: u16::try_from(r.try_get::<i64, _>("status").unwrap_or(0)).unwrap_or(0),
                count: r.try_get("cnt").unwrap_or(0),
            })
            .collect();

        let rows = sqlx::query(
            "SELECT COALESCE(country, '') AS c, COUNT(1) AS cnt FROM log_entries WHERE time >= ?
             GROUP BY c ORDER BY cnt DESC LIMIT 10",
        )
        .bind(since_24h)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Internal(format!("dashboard countries: {e}")))?;
        let top_countries = rows
            .iter()
            .map(|r| CountryCount {
                country: r.try_get("c").unwrap_or_default(),
                count: r.try_get("cnt").unwrap_or(0),
            })
            .collect();

        let rows = sqlx::query(
            "SELECT COALESCE(path, '') AS p, COUNT(1) AS cnt FROM log_entries WHERE time >= ?
             GROUP BY p ORDER BY cnt DESC LIMIT 10",
        )
        .bind(since_24h)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Internal(format!("dashboard paths: {e}")))?;
        let top_paths = rows
            .iter()
            .map(|r| PathCount {
                path: r.try_get("p").unwrap_or_default(),
                count: r.try_get("cnt").unwrap_or(0),
            })
            .collect();

        Ok(DashboardStats {
            total_requests_24h: total_24h,
            total_requests_7d: total_7d,
            error_rate_24h: error_rate(errors_24h, total_24h),
            unique_ips_24h,
            requests_by_hour,
            status_distribution,
            top_countries,
            top_paths,
        })
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::Internal(format!("begin tx: {e}")))?;
        let deleted = sqlx::query("DELETE FROM log_entries WHERE time < ?")
            .bind(epoch_seconds(cutoff))
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::Internal(format!("delete old entries: {e}")))?
            .rows_affected();
        tx.commit()
            .await
            .map_err(|e| AppError::Internal(format!("commit: {e}")))?;
        Ok(deleted)
    }
}
