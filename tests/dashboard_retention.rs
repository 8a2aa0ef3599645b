mod common;

use access_log_analyzer::clock::{FixedClock, epoch_seconds};
use access_log_analyzer::features::dashboard::snapshot;
use access_log_analyzer::features::dashboard::models::{CountryCount, PathCount, StatusCount};
use access_log_analyzer::features::ingest::{FilterRules, ingest_reader};
use access_log_analyzer::features::logs::query::{QueryFilterSpec, fetch_page};
use access_log_analyzer::features::logs::{LogRepository, LogStorage};
use access_log_analyzer::features::retention::sweep_once;
use chrono::Duration;
use common::{fixed_now, log_line, temp_storage};

const HOUR: f64 = 3600.0;
const DAY: f64 = 86400.0;

async fn seed(storage: &LogStorage, lines: &[String]) {
    ingest_reader(
        lines.concat().as_bytes(),
        storage,
        &FilterRules::default(),
        &FixedClock(fixed_now()),
    )
    .await
    .expect("seed");
}

#[tokio::test]
async fn dashboard_windows_and_rankings() {
    let (_dir, storage) = temp_storage().await;
    let now = epoch_seconds(fixed_now());
    seed(
        &storage,
        &[
            log_line(now - HOUR, "1.1.1.1", "/a", 200, "us"),
            log_line(now - 2.0 * HOUR, "2.2.2.2", "/a", 404, "fr"),
            log_line(now - 3.0 * HOUR, "1.1.1.1", "/b", 500, "us"),
            log_line(now - 3.0 * DAY, "3.3.3.3", "/c", 200, "de"),
            log_line(now - 10.0 * DAY, "4.4.4.4", "/d", 200, "jp"),
        ],
    )
    .await;

    let stats = snapshot(&storage, &FixedClock(fixed_now()), chrono_tz::UTC)
        .await
        .unwrap();
    assert_eq!(stats.total_requests_24h, 3);
    assert_eq!(stats.total_requests_7d, 4);
    assert!((stats.error_rate_24h - 200.0 / 3.0).abs() < 1e-9);
    assert_eq!(stats.unique_ips_24h, 2);
    assert_eq!(
        stats.status_distribution,
        vec![
            StatusCount { status: 200, count: 1 },
            StatusCount { status: 404, count: 1 },
            StatusCount { status: 500, count: 1 },
        ]
    );
    assert_eq!(
        stats.top_countries,
        vec![
            CountryCount { country: "us".into(), count: 2 },
            CountryCount { country: "fr".into(), count: 1 },
        ]
    );
    assert_eq!(
        stats.top_paths,
        vec![
            PathCount { path: "/a".into(), count: 2 },
            PathCount { path: "/b".into(), count: 1 },
        ]
    );

    let hours: Vec<&str> = stats.requests_by_hour.iter().map(|h| h.hour.as_str()).collect();
    assert_eq!(
        hours,
        vec![
            "2024-05-28 12:00",
            "2024-05-31 09:00",
            "2024-05-31 10:00",
            "2024-05-31 11:00",
        ]
    );
    assert!(stats.requests_by_hour.iter().all(|h| h.count == 1));
}

#[tokio::test]
async fn hourly_buckets_follow_configured_timezone() {
    let (_dir, storage) = temp_storage().await;
    let now = epoch_seconds(fixed_now());
    seed(
        &storage,
        &[
            log_line(now - HOUR, "1.1.1.1", "/", 200, "us"),
            log_line(now - HOUR + 60.0, "1.1.1.1", "/", 200, "us"),
        ],
    )
    .await;

    let stats = snapshot(&storage, &FixedClock(fixed_now()), chrono_tz::Asia::Shanghai)
        .await
        .unwrap();
    assert_eq!(stats.requests_by_hour.len(), 1);
    assert_eq!(stats.requests_by_hour[0].hour, "2024-05-31 19:00");
    assert_eq!(stats.requests_by_hour[0].count, 2);
}

#[tokio::test]
async fn empty_window_has_zero_error_rate() {
    let (_dir, storage) = temp_storage().await;
    let now = epoch_seconds(fixed_now());
    seed(&storage, &[log_line(now - 2.0 * DAY, "1.1.1.1", "/", 500, "us")]).await;

    let stats = snapshot(&storage, &FixedClock(fixed_now()), chrono_tz::UTC)
        .await
        .unwrap();
    assert_eq!(stats.total_requests_24h, 0);
    assert_eq!(stats.error_rate_24h, 0.0);
    assert_eq!(stats.unique_ips_24h, 0);
    assert!(stats.status_distribution.is_empty());
    assert_eq!(stats.total_requests_7d, 1);
}

#[tokio::test]
async fn retention_deletes_strictly_older_and_is_idempotent() {
    let (_dir, storage) = temp_storage().await;
    let cutoff = epoch_seconds(fixed_now() - Duration::days(30));
    seed(
        &storage,
        &[
            log_line(cutoff - 1.0, "1.1.1.1", "/old", 200, "us"),
            log_line(cutoff, "1.1.1.1", "/edge", 200, "us"),
            log_line(cutoff + 1.0, "1.1.1.1", "/new", 200, "us"),
        ],
    )
    .await;

    let clock = FixedClock(fixed_now());
    assert_eq!(sweep_once(&storage, &clock, Duration::days(30)).await.unwrap(), 1);
    assert_eq!(sweep_once(&storage, &clock, Duration::days(30)).await.unwrap(), 0);

    let page = fetch_page(&storage, &QueryFilterSpec::default(), None)
        .await
        .unwrap();
    let paths: Vec<&str> = page.entries.iter().map(|e| e.path.as_str()).collect();
    assert_eq!(paths, vec!["/edge", "/new"]);

    // 直接调用存储接口同样幂等
    let again = storage
        .delete_older_than(fixed_now() - Duration::days(30))
        .await
        .unwrap();
    assert_eq!(again, 0);
}
