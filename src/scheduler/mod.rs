// 后台调度模块
//
// - ready_resource: 待处理资源入库
// - auto_transfer: 已入库资源的批量转存
// - manager: 两个任务的启停入口

pub mod auto_transfer;
pub mod guard;
pub mod lifecycle;
pub mod manager;
pub mod provider_cache;
pub mod ready_resource;

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

use crate::checker::{CheckError, LinkProbe};
use crate::config::SchedulerConfig;
use crate::provider::{ProviderKind, ShareLinkClassifier};
use crate::repository::{
    AccountRepository, ProviderRepository, ReadyResourceRepository, RepositoryError,
    ResourceRepository, SqliteStore, SystemConfigRepository, TaxonomyRepository,
};
use crate::transfer::{ShareTransfer, TransferError};

pub use auto_transfer::{AutoTransferScheduler, TransferReport};
pub use guard::{FlightPermit, SingleFlight};
pub use lifecycle::{JobLifecycle, ScheduledJob};
pub use manager::SchedulerManager;
pub use provider_cache::ProviderIdCache;
pub use ready_resource::{PassReport, ReadyResourceScheduler};

/// 支持账号转存的平台
pub const ELASTIC_PROVIDER: ProviderKind = ProviderKind::Quark;

/// 单条资源处理失败的原因，Display 即写入错误字段的文本
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("不支持的链接地址: {0}")]
    UnsupportedLink(String),

    #[error("存在违禁词: {}", .0.join(", "))]
    ForbiddenWords(Vec<String>),

    #[error("链接检查失败: {0}")]
    CheckFailed(#[source] CheckError),

    #[error("链接无效: {0}")]
    LinkDead(String),

    #[error("未找到对应的平台ID: {0}")]
    ProviderMissing(ProviderKind),

    #[error("没有可用的{}账号", .0.label())]
    NoAccount(ProviderKind),

    #[error("转存失败: {0}")]
    Transfer(#[source] TransferError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// 转存阶段命中违禁词时写入的错误信息
pub fn forbidden_count_message(hits: usize) -> String {
    format!("存在违禁词 (共 {} 个)", hits)
}

/// 受单次执行保护的一轮处理结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome<R> {
    Completed(R),
    /// 上一轮仍在执行
    Skipped,
}

impl<R> PassOutcome<R> {
    pub fn is_skipped(&self) -> bool {
        matches!(self, PassOutcome::Skipped)
    }
}

/// 构造调度器所需的全部依赖
#[derive(Clone)]
pub struct SchedulerDeps {
    pub ready_resources: Arc<dyn ReadyResourceRepository>,
    pub resources: Arc<dyn ResourceRepository>,
    pub accounts: Arc<dyn AccountRepository>,
    pub providers: Arc<dyn ProviderRepository>,
    pub taxonomy: Arc<dyn TaxonomyRepository>,
    pub system_config: Arc<dyn SystemConfigRepository>,
    pub classifier: ShareLinkClassifier,
    pub probe: Arc<dyn LinkProbe>,
    pub transfer: Arc<dyn ShareTransfer>,
    pub settings: SchedulerConfig,
}

impl SchedulerDeps {
    /// 全部存储接口都由同一个 SQLite 实现提供
    pub fn from_store(
        store: Arc<SqliteStore>,
        classifier: ShareLinkClassifier,
        probe: Arc<dyn LinkProbe>,
        transfer: Arc<dyn ShareTransfer>,
        settings: SchedulerConfig,
    ) -> Self {
        Self {
            ready_resources: store.clone(),
            resources: store.clone(),
            accounts: store.clone(),
            providers: store.clone(),
            taxonomy: store.clone(),
            system_config: store,
            classifier,
            probe,
            transfer,
            settings,
        }
    }
}

/// 运行间隔：`auto_process_interval` 大于 0 时使用，否则取缺省值
pub(crate) async fn interval_minutes(
    system_config: &dyn SystemConfigRepository,
    default_minutes: u64,
) -> u64 {
    match system_config.auto_process_interval().await {
        Ok(minutes) if minutes > 0 => minutes as u64,
        Ok(_) => default_minutes,
        Err(e) => {
            warn!("读取处理间隔失败，使用默认值 {} 分钟: {}", default_minutes, e);
            default_minutes
        }
    }
}

pub(crate) fn minutes(value: u64) -> Duration {
    Duration::from_secs(value.max(1).saturating_mul(60))
}

/// 读取违禁词，失败时按未配置处理
pub(crate) async fn load_forbidden_words(system_config: &dyn SystemConfigRepository) -> String {
    system_config.forbidden_words().await.unwrap_or_else(|e| {
        warn!("获取违禁词配置失败: {}", e);
        String::new()
    })
}

#[cfg(test)]
pub(crate) mod testing {
    //! 调度器测试用的桩实现

    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use super::*;
    use crate::checker::ShareStatus;
    use crate::models::Account;
    use crate::provider::{ClassifiedLink, ProviderRegistry};
    use crate::repository::keys;
    use crate::transfer::TransferOutcome;

    pub struct StubProbe {
        pub status: ShareStatus,
        pub calls: AtomicUsize,
    }

    impl StubProbe {
        pub fn new(status: ShareStatus) -> Arc<Self> {
            Arc::new(Self {
                status,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl LinkProbe for StubProbe {
        async fn probe(&self, _link: &ClassifiedLink) -> Result<ShareStatus, CheckError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.status)
        }
    }

    /// 按 share_id 返回预设结果，同时记录调用的账号
    pub struct StubTransfer {
        pub failures: Vec<(String, TransferError)>,
        pub title: String,
        pub seen: Mutex<Vec<(i64, String)>>,
    }

    impl StubTransfer {
        pub fn ok(title: &str) -> Arc<Self> {
            Arc::new(Self {
                failures: Vec::new(),
                title: title.to_string(),
                seen: Mutex::new(Vec::new()),
            })
        }

        pub fn failing(share_id: &str, err: TransferError) -> Arc<Self> {
            Arc::new(Self {
                failures: vec![(share_id.to_string(), err)],
                title: String::new(),
                seen: Mutex::new(Vec::new()),
            })
        }

        pub fn calls(&self) -> usize {
            self.seen.lock().len()
        }
    }

    #[async_trait]
    impl ShareTransfer for StubTransfer {
        async fn transfer(
            &self,
            account: &Account,
            share_id: &str,
        ) -> Result<TransferOutcome, TransferError> {
            self.seen.lock().push((account.id, share_id.to_string()));
            if let Some((_, err)) = self.failures.iter().find(|(id, _)| id == share_id) {
                return Err(err.clone());
            }
            Ok(TransferOutcome {
                share_url: format!("https://pan.quark.cn/s/saved-{}", share_id),
                title: self.title.clone(),
                fid: format!("fid-{}", share_id),
                code: String::new(),
            })
        }
    }

    pub fn classifier() -> ShareLinkClassifier {
        ShareLinkClassifier::new(Arc::new(ProviderRegistry::builtin().unwrap()))
    }

    pub fn fast_settings() -> SchedulerConfig {
        SchedulerConfig {
            delay_min_ms: 0,
            delay_max_ms: 0,
            ..Default::default()
        }
    }

    /// 已写入平台目录并打开两个功能开关的内存库
    pub async fn seeded_store() -> Arc<SqliteStore> {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        store.seed_providers().unwrap();
        store
            .set_value(keys::AUTO_PROCESS_READY_RESOURCES, "true")
            .await
            .unwrap();
        store
            .set_value(keys::AUTO_TRANSFER_ENABLED, "true")
            .await
            .unwrap();
        store
    }

    pub async fn provider_id(store: &SqliteStore, name: &str) -> i64 {
        ProviderRepository::find_all(store)
            .await
            .unwrap()
            .into_iter()
            .find(|p| p.name == name)
            .map(|p| p.id)
            .unwrap()
    }

    pub fn deps(
        store: Arc<SqliteStore>,
        probe: Arc<dyn LinkProbe>,
        transfer: Arc<dyn ShareTransfer>,
    ) -> SchedulerDeps {
        SchedulerDeps::from_store(store, classifier(), probe, transfer, fast_settings())
    }

    pub fn quark_account(pan_id: i64, left_gib: i64) -> Account {
        Account {
            pan_id,
            ck: "__pus=abc; __puus=def".to_string(),
            is_valid: true,
            space: 100 * crate::account::GIB,
            left_space: left_gib * crate::account::GIB,
            used_space: (100 - left_gib) * crate::account::GIB,
            ..Default::default()
        }
    }
}
