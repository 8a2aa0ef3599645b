use std::sync::Arc;

use chrono_tz::Tz;

use crate::clock::Clock;
use crate::config::AppConfig;
use crate::features::ingest::FilterRules;
use crate::features::logs::LogStorage;

/// 聚合的应用共享状态
#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<LogStorage>,
    /// 启动时构造的忽略规则，上传与尾随共用
    pub rules: Arc<FilterRules>,
    pub clock: Arc<dyn Clock>,
    /// 仪表盘按小时分桶使用的时区
    pub dashboard_tz: Tz,
    pub upload_enabled: bool,
}

impl AppState {
    pub fn new(
        storage: Arc<LogStorage>,
        rules: Arc<FilterRules>,
        clock: Arc<dyn Clock>,
        config: &AppConfig,
    ) -> Self {
        Self {
            storage,
            rules,
            clock,
            dashboard_tz: config.dashboard.tz(),
            upload_enabled: config.ingest.upload_enabled,
        }
    }
}
