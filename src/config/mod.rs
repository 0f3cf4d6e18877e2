// 配置管理模块

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs;

/// 应用配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// 数据库配置
    #[serde(default)]
    pub database: DatabaseConfig,
    /// 链接检测 HTTP 配置
    #[serde(default)]
    pub http: HttpConfig,
    /// 调度器配置
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// 日志配置
    #[serde(default)]
    pub log: LogConfig,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// 是否启用日志文件持久化
    #[serde(default = "default_log_enabled")]
    pub enabled: bool,
    /// 日志文件保存目录
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// 日志保留天数（默认 7 天）
    #[serde(default = "default_log_retention_days")]
    pub retention_days: u32,
    /// 日志级别（默认 info）
    #[serde(default = "default_log_level")]
    pub level: String,
    /// 单个日志文件最大大小（字节，默认 50MB）
    #[serde(default = "default_log_max_file_size")]
    pub max_file_size: u64,
}

fn default_log_enabled() -> bool {
    true
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_log_retention_days() -> u32 {
    7
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_max_file_size() -> u64 {
    50 * 1024 * 1024 // 50MB
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: default_log_enabled(),
            log_dir: default_log_dir(),
            retention_days: default_log_retention_days(),
            level: default_log_level(),
            max_file_size: default_log_max_file_size(),
        }
    }
}

/// 数据库配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite 数据库文件路径
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("data/netdisk-ingest.db")
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// 链接检测使用的 HTTP 客户端策略
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// 单次请求超时（秒）
    #[serde(default = "default_http_timeout_secs")]
    pub timeout_secs: u64,
    /// 传输失败后的重试次数
    #[serde(default = "default_http_retry_count")]
    pub retry_count: u32,
    /// 首次重试等待（秒），之后逐次翻倍
    #[serde(default = "default_http_retry_wait_secs")]
    pub retry_wait_secs: u64,
    /// 重试等待上限（秒）
    #[serde(default = "default_http_retry_max_wait_secs")]
    pub retry_max_wait_secs: u64,
}

fn default_http_timeout_secs() -> u64 {
    10
}
fn default_http_retry_count() -> u32 {
    3
}
fn default_http_retry_wait_secs() -> u64 {
    2
}
fn default_http_retry_max_wait_secs() -> u64 {
    10
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_http_timeout_secs(),
            retry_count: default_http_retry_count(),
            retry_wait_secs: default_http_retry_wait_secs(),
            retry_max_wait_secs: default_http_retry_max_wait_secs(),
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// 第 attempt 次重试（从 0 开始）前的等待时间
    pub fn retry_backoff(&self, attempt: u32) -> Duration {
        let base = self.retry_wait_secs.max(1);
        let factor = 1u64.checked_shl(attempt.min(16)).unwrap_or(u64::MAX);
        let wait = base.saturating_mul(factor).min(self.retry_max_wait_secs.max(base));
        Duration::from_secs(wait)
    }
}

/// 调度器配置
///
/// 开关、间隔、违禁词等运行期参数存放在 system_config 表中，
/// 这里只保存缺省值和节流参数。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// 待处理资源任务的默认间隔（分钟）
    #[serde(default = "default_ready_interval_minutes")]
    pub ready_default_interval_minutes: u64,
    /// 自动转存任务的默认间隔（分钟）
    #[serde(default = "default_transfer_interval_minutes")]
    pub transfer_default_interval_minutes: u64,
    /// 自动转存只扫描最近多少小时内创建的资源
    #[serde(default = "default_transfer_window_hours")]
    pub transfer_window_hours: i64,
    /// 每个账号每分钟预估可完成的转存数
    #[serde(default = "default_transfers_per_account_minute")]
    pub transfers_per_account_minute: usize,
    /// 两次转存之间的最小间隔（毫秒）
    #[serde(default = "default_delay_min_ms")]
    pub delay_min_ms: u64,
    /// 两次转存之间的最大间隔（毫秒）
    #[serde(default = "default_delay_max_ms")]
    pub delay_max_ms: u64,
    /// 转存任务状态轮询次数
    #[serde(default = "default_task_poll_attempts")]
    pub task_poll_attempts: u32,
    /// 转存任务状态轮询间隔（毫秒）
    #[serde(default = "default_task_poll_interval_ms")]
    pub task_poll_interval_ms: u64,
}

fn default_ready_interval_minutes() -> u64 {
    3
}
fn default_transfer_interval_minutes() -> u64 {
    5
}
fn default_transfer_window_hours() -> i64 {
    24
}
fn default_transfers_per_account_minute() -> usize {
    12
}
fn default_delay_min_ms() -> u64 {
    1000
}
fn default_delay_max_ms() -> u64 {
    3000
}
fn default_task_poll_attempts() -> u32 {
    50
}
fn default_task_poll_interval_ms() -> u64 {
    2000
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            ready_default_interval_minutes: default_ready_interval_minutes(),
            transfer_default_interval_minutes: default_transfer_interval_minutes(),
            transfer_window_hours: default_transfer_window_hours(),
            transfers_per_account_minute: default_transfers_per_account_minute(),
            delay_min_ms: default_delay_min_ms(),
            delay_max_ms: default_delay_max_ms(),
            task_poll_attempts: default_task_poll_attempts(),
            task_poll_interval_ms: default_task_poll_interval_ms(),
        }
    }
}

impl SchedulerConfig {
    pub fn task_poll_interval(&self) -> Duration {
        Duration::from_millis(self.task_poll_interval_ms)
    }
}

impl AppConfig {
    /// 从文件加载配置
    pub async fn load_from_file(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .context("Failed to read config file")?;

        let config: AppConfig = toml::from_str(&content).context("Failed to parse config file")?;

        config.validate().context("配置文件校验失败")?;

        Ok(config)
    }

    /// 保存配置到文件
    pub async fn save_to_file(&self, path: &str) -> Result<()> {
        self.validate().context("保存配置失败")?;

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        // 确保父目录存在
        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .context("Failed to create config directory")?;
            }
        }

        fs::write(path, content)
            .await
            .context("Failed to write config file")?;

        tracing::info!("✓ 配置已保存: {}", path);

        Ok(())
    }

    /// 加载或创建默认配置
    pub async fn load_or_default(path: &str) -> Self {
        match Self::load_from_file(path).await {
            Ok(config) => {
                tracing::info!("配置文件加载成功: {}", path);
                config
            }
            Err(e) => {
                tracing::warn!("配置文件加载失败，使用默认配置: {:#}", e);
                let default_config = Self::default();

                if let Err(e) = default_config.save_to_file(path).await {
                    tracing::error!("保存默认配置失败: {}", e);
                }

                default_config
            }
        }
    }

    /// 校验取值范围
    pub fn validate(&self) -> Result<()> {
        if self.http.timeout_secs == 0 {
            anyhow::bail!("http.timeout_secs 必须大于 0");
        }
        if self.scheduler.ready_default_interval_minutes == 0
            || self.scheduler.transfer_default_interval_minutes == 0
        {
            anyhow::bail!("调度间隔必须大于 0 分钟");
        }
        if self.scheduler.delay_min_ms > self.scheduler.delay_max_ms {
            anyhow::bail!(
                "scheduler.delay_min_ms ({}) 不能大于 delay_max_ms ({})",
                self.scheduler.delay_min_ms,
                self.scheduler.delay_max_ms
            );
        }
        if self.scheduler.transfer_window_hours <= 0 {
            anyhow::bail!("scheduler.transfer_window_hours 必须大于 0");
        }
        Ok(())
    }
}
