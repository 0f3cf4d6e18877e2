use std::sync::Arc;

use anyhow::Context;
use netdisk_ingest::{
    config::LogConfig, logging, AppConfig, LinkChecker, ProviderRegistry, QuarkTransferClient,
    RetryingClient, SchedulerDeps, SchedulerManager, ShareLinkClassifier, SqliteStore,
};
use tracing::{error, info};

const CONFIG_PATH: &str = "config/app.toml";

/// 加载日志配置
///
/// 日志系统需要先于完整配置初始化，读取失败时使用默认值
async fn load_log_config() -> LogConfig {
    if let Ok(content) = tokio::fs::read_to_string(CONFIG_PATH).await {
        if let Ok(config) = toml::from_str::<toml::Value>(&content) {
            if let Some(log_table) = config.get("log") {
                if let Ok(log_config) = log_table.clone().try_into::<LogConfig>() {
                    return log_config;
                }
            }
        }
    }

    LogConfig::default()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let log_config = load_log_config().await;

    // 必须保持 _log_guard 存活
    let _log_guard = logging::init_logging(&log_config);

    info!("Netdisk Ingest v{} 启动中...", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::load_or_default(CONFIG_PATH).await;

    let store = Arc::new(SqliteStore::open(&config.database.path)?);
    let seeded = store.seed_providers()?;
    info!("数据库初始化完成: {:?} (平台 {} 个)", config.database.path, seeded);

    let registry = Arc::new(ProviderRegistry::builtin().context("加载平台规则失败")?);
    let classifier = ShareLinkClassifier::new(registry);

    let http = Arc::new(RetryingClient::new(&config.http)?);
    let checker = Arc::new(LinkChecker::new(classifier.clone(), http));

    let transfer = QuarkTransferClient::new(&config.http, &config.scheduler)?
        .with_system_config(store.clone());

    let deps = SchedulerDeps::from_store(
        store,
        classifier,
        checker,
        Arc::new(transfer),
        config.scheduler.clone(),
    );
    let manager = SchedulerManager::new(deps);

    if let Err(e) = manager.apply_system_config().await {
        error!("读取调度开关失败: {}", e);
    }
    info!("调度器状态: {:?}", manager.status());

    tokio::signal::ctrl_c()
        .await
        .context("监听退出信号失败")?;

    info!("收到退出信号，正在停止调度器...");
    manager.stop_all();
    info!("已退出");

    Ok(())
}
