// 持久化接口模块
//
// 调度器只通过这些窄接口访问存储，具体实现见 sqlite.rs

pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{Account, Provider, ReadyResource, Resource};

pub use sqlite::SqliteStore;

/// system_config 表中调度相关的配置键
pub mod keys {
    pub const AUTO_PROCESS_READY_RESOURCES: &str = "auto_process_ready_resources";
    pub const AUTO_PROCESS_INTERVAL: &str = "auto_process_interval";
    pub const AUTO_TRANSFER_ENABLED: &str = "auto_transfer_enabled";
    pub const AUTO_TRANSFER_MIN_SPACE: &str = "auto_transfer_min_space";
    pub const FORBIDDEN_WORDS: &str = "forbidden_words";
    pub const AD_KEYWORDS: &str = "ad_keywords";
}

#[derive(Debug, Error)]
pub enum RepositoryError {
    /// 资源 URL 唯一约束冲突
    #[error("资源已存在: {0}")]
    Duplicate(String),

    #[error("记录不存在: {0}")]
    NotFound(String),

    #[error("配置项 {key} 的值无效: {value}")]
    InvalidConfig { key: String, value: String },

    #[error("数据库错误: {0}")]
    Storage(String),
}

impl From<rusqlite::Error> for RepositoryError {
    fn from(e: rusqlite::Error) -> Self {
        RepositoryError::Storage(e.to_string())
    }
}

pub type RepoResult<T> = Result<T, RepositoryError>;

/// 待处理资源
#[async_trait]
pub trait ReadyResourceRepository: Send + Sync {
    async fn find_all(&self) -> RepoResult<Vec<ReadyResource>>;

    /// 返回新记录 ID
    async fn create(&self, item: &ReadyResource) -> RepoResult<i64>;

    /// 批量写入，未设置 key 的记录共用同一个分组标识
    async fn batch_create(&self, items: &[ReadyResource]) -> RepoResult<Vec<i64>>;

    async fn delete(&self, id: i64) -> RepoResult<()>;
}

/// 正式资源
#[async_trait]
pub trait ResourceRepository: Send + Sync {
    /// URL 已存在时返回 `RepositoryError::Duplicate`
    async fn create(&self, resource: &Resource) -> RepoResult<i64>;

    async fn update(&self, resource: &Resource) -> RepoResult<()>;

    async fn find_exists(&self, url: &str) -> RepoResult<bool>;

    /// 指定平台下尚未转存且没有错误记录的资源，按创建时间倒序
    async fn get_resources_for_transfer(
        &self,
        pan_id: i64,
        since: DateTime<Utc>,
        limit: usize,
    ) -> RepoResult<Vec<Resource>>;

    async fn create_resource_tag(&self, resource_id: i64, tag_id: i64) -> RepoResult<()>;
}

/// 网盘账号（Cks）
#[async_trait]
pub trait AccountRepository: Send + Sync {
    async fn find_all(&self) -> RepoResult<Vec<Account>>;

    async fn find_by_provider(&self, pan_id: i64) -> RepoResult<Vec<Account>>;
}

/// 网盘平台目录（Pan）
#[async_trait]
pub trait ProviderRepository: Send + Sync {
    async fn find_all(&self) -> RepoResult<Vec<Provider>>;
}

/// 分类与标签
#[async_trait]
pub trait TaxonomyRepository: Send + Sync {
    async fn find_or_create_category(&self, name: &str) -> RepoResult<i64>;

    async fn find_or_create_tag(&self, name: &str) -> RepoResult<i64>;
}

/// 系统配置
#[async_trait]
pub trait SystemConfigRepository: Send + Sync {
    async fn get_value(&self, key: &str) -> RepoResult<Option<String>>;

    async fn set_value(&self, key: &str, value: &str) -> RepoResult<()>;

    /// 缺失或空值视为 false
    async fn get_bool(&self, key: &str) -> RepoResult<bool> {
        match self.get_value(key).await? {
            None => Ok(false),
            Some(raw) => parse_bool(key, &raw),
        }
    }

    /// 缺失或空值视为 0
    async fn get_int(&self, key: &str) -> RepoResult<i64> {
        match self.get_value(key).await? {
            None => Ok(0),
            Some(raw) => parse_int(key, &raw),
        }
    }

    async fn auto_process_enabled(&self) -> RepoResult<bool> {
        self.get_bool(keys::AUTO_PROCESS_READY_RESOURCES).await
    }

    /// 分钟
    async fn auto_process_interval(&self) -> RepoResult<i64> {
        self.get_int(keys::AUTO_PROCESS_INTERVAL).await
    }

    async fn auto_transfer_enabled(&self) -> RepoResult<bool> {
        self.get_bool(keys::AUTO_TRANSFER_ENABLED).await
    }

    /// GiB
    async fn auto_transfer_min_space(&self) -> RepoResult<i64> {
        self.get_int(keys::AUTO_TRANSFER_MIN_SPACE).await
    }

    async fn forbidden_words(&self) -> RepoResult<String> {
        Ok(self.get_value(keys::FORBIDDEN_WORDS).await?.unwrap_or_default())
    }

    async fn ad_keywords(&self) -> RepoResult<String> {
        Ok(self.get_value(keys::AD_KEYWORDS).await?.unwrap_or_default())
    }
}

fn parse_bool(key: &str, raw: &str) -> RepoResult<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "" | "0" | "false" | "off" | "no" => Ok(false),
        "1" | "true" | "on" | "yes" => Ok(true),
        _ => Err(RepositoryError::InvalidConfig {
            key: key.to_string(),
            value: raw.to_string(),
        }),
    }
}

fn parse_int(key: &str, raw: &str) -> RepoResult<i64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(0);
    }
    trimmed
        .parse::<i64>()
        .map_err(|_| RepositoryError::InvalidConfig {
            key: key.to_string(),
            value: raw.to_string(),
        })
}
