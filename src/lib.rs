// Netdisk Ingest Library
// 网盘分享链接入库与自动转存核心库

// 账号选择
pub mod account;

// 分享链接有效性检测
pub mod checker;

// 配置管理模块
pub mod config;

// 日志
pub mod logging;

// 数据模型
pub mod models;

// 违禁词过滤
pub mod policy;

// 网盘平台识别
pub mod provider;

// 存储接口与 SQLite 实现
pub mod repository;

// 后台调度
pub mod scheduler;

// 转存模块
pub mod transfer;

// 导出常用类型
pub use checker::{CheckError, CheckResult, LinkChecker, LinkProbe, RetryingClient, ShareStatus};
pub use config::AppConfig;
pub use models::{Account, Provider, ReadyResource, Resource};
pub use policy::{ContentPolicyFilter, PolicyScan};
pub use provider::{ClassifiedLink, ProviderKind, ProviderRegistry, ShareLinkClassifier};
pub use repository::{RepositoryError, SqliteStore};
pub use scheduler::{
    AutoTransferScheduler, PassReport, PipelineError, ReadyResourceScheduler, SchedulerDeps,
    SchedulerManager, TransferReport,
};

// 导出转存相关类型
pub use transfer::{QuarkTransferClient, ShareTransfer, TransferError, TransferOutcome};
