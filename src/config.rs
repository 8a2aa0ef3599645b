use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// 全局配置单例
static CONFIG: OnceCell<AppConfig> = OnceCell::new();

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// 监听地址
    #[serde(default = "ServerConfig::default_host")]
    pub host: String,
    /// 监听端口
    #[serde(default = "ServerConfig::default_port")]
    pub port: u16,
}

impl ServerConfig {
    fn default_host() -> String {
        "0.0.0.0".to_string()
    }
    fn default_port() -> u16 {
        8080
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: Self::default_host(),
            port: Self::default_port(),
        }
    }
}

/// 导入配置（本地文件尾随 + 上传）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// 需要尾随的本地访问日志路径（留空则不启用尾随）
    #[serde(default)]
    pub log_path: Option<String>,
    /// 兜底轮询间隔（毫秒），用于弥补文件变更通知丢失的情况
    #[serde(default = "IngestConfig::default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// 是否允许通过 HTTP 上传日志
    #[serde(default = "IngestConfig::default_upload_enabled")]
    pub upload_enabled: bool,
    /// 上传请求体大小上限（字节）
    #[serde(default = "IngestConfig::default_upload_max_bytes")]
    pub upload_max_bytes: usize,
}

impl IngestConfig {
    fn default_poll_interval_ms() -> u64 {
        2000
    }
    fn default_upload_enabled() -> bool {
        true
    }
    fn default_upload_max_bytes() -> usize {
        256 * 1024 * 1024
    }

    /// 获取兜底轮询间隔
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            log_path: None,
            poll_interval_ms: Self::default_poll_interval_ms(),
            upload_enabled: Self::default_upload_enabled(),
            upload_max_bytes: Self::default_upload_max_bytes(),
        }
    }
}

/// 忽略规则配置（原始值，构造 FilterRules 时再做归一化）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IgnoreConfig {
    /// 白名单 IP：命中后永不跳过
    #[serde(default)]
    pub whitelisted_ips: Vec<String>,
    /// 需要跳过的扩展名（如 "js"、".css"）
    #[serde(default)]
    pub skip_extensions: Vec<String>,
    /// 需要跳过的 HTTP 方法
    #[serde(default)]
    pub skip_methods: Vec<String>,
    /// 需要跳过的状态码
    #[serde(default)]
    pub skip_status_codes: Vec<u16>,
    /// 需要跳过的路径前缀
    #[serde(default)]
    pub skip_path_prefixes: Vec<String>,
}

/// 存储配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite 文件路径
    #[serde(default = "StorageConfig::default_sqlite_path")]
    pub sqlite_path: String,
    /// 是否启用 WAL
    #[serde(default = "StorageConfig::default_sqlite_wal")]
    pub sqlite_wal: bool,
}

impl StorageConfig {
    fn default_sqlite_path() -> String {
        "./data/access.db".to_string()
    }
    fn default_sqlite_wal() -> bool {
        true
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            sqlite_path: Self::default_sqlite_path(),
            sqlite_wal: Self::default_sqlite_wal(),
        }
    }
}

/// 数据保留配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// 保留天数
    #[serde(default = "RetentionConfig::default_days")]
    pub days: u32,
    /// 清理任务执行间隔（秒）
    #[serde(default = "RetentionConfig::default_interval_secs")]
    pub interval_secs: u64,
}

impl RetentionConfig {
    fn default_days() -> u32 {
        30
    }
    fn default_interval_secs() -> u64 {
        6 * 60 * 60
    }

    /// 保留时长（天数为 0 时按默认值处理）
    pub fn max_age(&self) -> chrono::Duration {
        let days = if self.days == 0 {
            Self::default_days()
        } else {
            self.days
        };
        chrono::Duration::days(i64::from(days))
    }

    /// 清理任务执行间隔
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            days: Self::default_days(),
            interval_secs: Self::default_interval_secs(),
        }
    }
}

/// 仪表盘配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardConfig {
    /// 按小时分桶使用的时区（IANA 名称，如 Asia/Shanghai）
    #[serde(default = "DashboardConfig::default_timezone")]
    pub timezone: String,
}

impl DashboardConfig {
    fn default_timezone() -> String {
        "UTC".to_string()
    }

    /// 解析配置中的时区，非法值回退到 UTC
    pub fn tz(&self) -> chrono_tz::Tz {
        match self.timezone.parse::<chrono_tz::Tz>() {
            Ok(tz) => tz,
            Err(_) => {
                tracing::warn!("无效的仪表盘时区 {:?}，回退为 UTC", self.timezone);
                chrono_tz::UTC
            }
        }
    }
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            timezone: Self::default_timezone(),
        }
    }
}

/// 优雅退出配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShutdownConfig {
    /// 优雅退出超时时间（秒）
    #[serde(default = "ShutdownConfig::default_timeout")]
    pub timeout_secs: u64,
}

impl ShutdownConfig {
    fn default_timeout() -> u64 {
        30
    }

    /// 获取优雅退出超时时间
    pub fn timeout_duration(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            timeout_secs: Self::default_timeout(),
        }
    }
}

/// 应用配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    /// 导入配置
    #[serde(default)]
    pub ingest: IngestConfig,
    /// 忽略规则
    #[serde(default)]
    pub ignore: IgnoreConfig,
    /// 存储配置
    #[serde(default)]
    pub storage: StorageConfig,
    /// 数据保留
    #[serde(default)]
    pub retention: RetentionConfig,
    /// 仪表盘
    #[serde(default)]
    pub dashboard: DashboardConfig,
    /// 优雅退出配置
    #[serde(default)]
    pub shutdown: ShutdownConfig,
}

impl AppConfig {
    /// 从配置文件加载配置，支持环境变量覆盖
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::get_config_path();

        tracing::info!("正在从 {:?} 加载配置文件", config_path);

        let builder = ConfigBuilder::builder()
            // 配置文件可缺省，缺省时全部使用默认值
            .add_source(File::from(config_path).required(false))
            // 支持环境变量覆盖，例如：APP_STORAGE__SQLITE_PATH
            .add_source(
                Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut config: Self = builder.try_deserialize()?;
        config.apply_legacy_env();

        tracing::debug!(
            "配置加载完成: sqlite_path = {}, log_path = {:?}, upload_enabled = {}",
            config.storage.sqlite_path,
            config.ingest.log_path,
            config.ingest.upload_enabled
        );

        Ok(config)
    }

    /// 兼容旧部署使用的 `UPLOAD_ENABLED=true|false`
    fn apply_legacy_env(&mut self) {
        if let Ok(raw) = std::env::var("UPLOAD_ENABLED") {
            match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => self.ingest.upload_enabled = true,
                "0" | "false" | "no" | "off" => self.ingest.upload_enabled = false,
                other => tracing::warn!("忽略无法识别的 UPLOAD_ENABLED 值: {}", other),
            }
        }
    }

    /// 获取全局配置单例
    pub fn global() -> &'static AppConfig {
        CONFIG.get().expect("配置未初始化，请先调用 init_global()")
    }

    /// 初始化全局配置
    pub fn init_global() -> Result<(), ConfigError> {
        let config = Self::load()?;
        CONFIG
            .set(config)
            .map_err(|_| ConfigError::Message("配置已经被初始化".to_string()))?;
        Ok(())
    }

    /// 获取配置文件路径（可通过 APP_CONFIG_FILE 指定）
    fn get_config_path() -> PathBuf {
        std::env::var_os("APP_CONFIG_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("config.toml"))
    }

    /// 获取服务器监听地址
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
