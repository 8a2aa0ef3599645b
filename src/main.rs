use std::path::Path;
use std::sync::Arc;

use access_log_analyzer::clock::{Clock, SystemClock};
use access_log_analyzer::features::ingest::{FileTailer, FilterRules};
use access_log_analyzer::features::logs::LogStorage;
use access_log_analyzer::features::retention::run_retention_sweeper;
use access_log_analyzer::shutdown::join_with_timeout;
use access_log_analyzer::{AppState, ShutdownManager, config::AppConfig, create_app};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "access_log_analyzer=info,tower_http=info".into()),
        )
        .init();

    let shutdown_manager = ShutdownManager::new();

    if let Err(e) = AppConfig::init_global() {
        tracing::error!("Config init failed: {}", e);
        std::process::exit(1);
    }
    let config = AppConfig::global();

    if let Err(e) = shutdown_manager.start_signal_handler().await {
        tracing::error!("信号处理器启动失败: {}", e);
        std::process::exit(1);
    }

    // SQLite 文件所在目录不存在时先创建
    let db_path = &config.storage.sqlite_path;
    if let Some(dir) = Path::new(db_path).parent() {
        if !dir.as_os_str().is_empty() {
            if let Err(e) = std::fs::create_dir_all(dir) {
                tracing::error!("创建数据目录 {:?} 失败: {}", dir, e);
                std::process::exit(1);
            }
        }
    }
    let storage = match LogStorage::connect_sqlite(db_path, config.storage.sqlite_wal).await {
        Ok(s) => Arc::new(s),
        Err(e) => {
            tracing::error!("打开数据库 {} 失败: {}", db_path, e);
            std::process::exit(1);
        }
    };
    if let Err(e) = storage.init_schema().await {
        tracing::error!("初始化表结构失败: {}", e);
        std::process::exit(1);
    }

    let rules = Arc::new(FilterRules::from_config(&config.ignore));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    if rules.is_empty() {
        tracing::info!("未配置忽略规则，全部日志行都会入库");
    } else {
        tracing::info!(
            "忽略规则: whitelist={} extensions={} methods={} statuses={} prefixes={}",
            config.ignore.whitelisted_ips.len(),
            config.ignore.skip_extensions.len(),
            config.ignore.skip_methods.len(),
            config.ignore.skip_status_codes.len(),
            config.ignore.skip_path_prefixes.len()
        );
    }

    let mut background = Vec::new();

    if let Some(log_path) = config.ingest.log_path.as_deref().filter(|p| !p.trim().is_empty()) {
        let tailer = FileTailer::new(
            log_path,
            storage.clone(),
            rules.clone(),
            clock.clone(),
            config.ingest.poll_interval(),
        );
        background.push(("tailer", tokio::spawn(tailer.run(shutdown_manager.handle()))));
    } else {
        tracing::info!("未配置 ingest.log_path，跳过文件尾随");
    }

    background.push((
        "retention",
        tokio::spawn(run_retention_sweeper(
            storage.clone(),
            clock.clone(),
            config.retention.clone(),
            shutdown_manager.handle(),
        )),
    ));

    let state = AppState::new(storage.clone(), rules, clock, config);
    let app = create_app(state, config.ingest.upload_max_bytes);

    let addr = config.server_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("Bind address failed {}: {}", addr, e);
            std::process::exit(1);
        });

    tracing::info!("Server: http://{}", addr);
    tracing::info!("Docs: http://{}/docs", addr);
    tracing::info!("Health: http://{}/health", addr);
    tracing::info!(
        "Upload: {}",
        if config.ingest.upload_enabled {
            "enabled"
        } else {
            "disabled"
        }
    );

    let signal_manager = shutdown_manager.clone();
    let graceful = axum::serve(listener, app).with_graceful_shutdown(async move {
        let reason = signal_manager.wait_for_shutdown().await;
        tracing::info!("接收到退出信号: {:?}，开始优雅关闭HTTP服务器...", reason);
    });

    if let Err(e) = graceful.await {
        tracing::error!("服务器运行错误: {}", e);
        shutdown_manager.trigger_shutdown(access_log_analyzer::ShutdownReason::Application);
    }

    let timeout = config.shutdown.timeout_duration();
    tracing::info!("等待后台任务退出（超时 {}秒）", config.shutdown.timeout_secs);
    match join_with_timeout(background, timeout).await {
        Ok(()) => tracing::info!("后台任务已全部退出"),
        Err(e) => tracing::warn!("{}，强制退出", e),
    }

    storage.pool.close().await;
    tracing::info!("服务器已优雅关闭");
}
