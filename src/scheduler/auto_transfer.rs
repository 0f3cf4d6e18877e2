//! 自动转存调度器
//!
//! 针对已入库但尚未转存的夸克资源：按账号数和运行间隔估算本轮上限，
//! 每个可用账号一个工作任务，从预先填满并关闭的通道里取资源逐个转存。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use serde::Serialize;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::guard::SingleFlight;
use super::lifecycle::ScheduledJob;
use super::provider_cache::ProviderIdCache;
use super::{
    forbidden_count_message, interval_minutes, load_forbidden_words, minutes, PassOutcome,
    PipelineError, SchedulerDeps, ELASTIC_PROVIDER,
};
use crate::account::{min_space_bytes, AccountPool};
use crate::models::{Account, Resource};
use crate::policy::ContentPolicyFilter;
use crate::provider::ShareLinkClassifier;
use crate::repository::ResourceRepository;
use crate::transfer::ShareTransfer;

/// 一轮转存的统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TransferReport {
    pub transferred: usize,
    pub failed: usize,
    /// 命中违禁词被排除的资源数
    pub forbidden: usize,
}

/// 本轮最多处理的资源数：账号数 × 每账号每分钟转存数 × 间隔分钟数
pub fn processing_cap(accounts: usize, per_account_minute: usize, interval_minutes: u64) -> usize {
    let minutes = usize::try_from(interval_minutes).unwrap_or(usize::MAX);
    accounts
        .saturating_mul(per_account_minute)
        .saturating_mul(minutes)
}

pub struct AutoTransferScheduler {
    deps: SchedulerDeps,
    provider_ids: ProviderIdCache,
    flight: SingleFlight,
}

impl AutoTransferScheduler {
    pub fn new(deps: SchedulerDeps) -> Self {
        Self {
            provider_ids: ProviderIdCache::new(Arc::clone(&deps.providers)),
            deps,
            flight: SingleFlight::new(),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.flight.is_busy()
    }

    pub async fn try_run_pass(&self) -> Result<PassOutcome<TransferReport>, PipelineError> {
        let Some(_permit) = self.flight.try_begin() else {
            info!("上一次自动转存任务还在执行中，跳过本次执行");
            return Ok(PassOutcome::Skipped);
        };
        self.run_once().await.map(PassOutcome::Completed)
    }

    pub async fn run_once(&self) -> Result<TransferReport, PipelineError> {
        let system_config = self.deps.system_config.as_ref();
        if !system_config.auto_transfer_enabled().await? {
            debug!("自动转存功能已禁用");
            return Ok(TransferReport::default());
        }

        let pan_id = self
            .provider_ids
            .lookup(ELASTIC_PROVIDER)
            .await?
            .ok_or(PipelineError::ProviderMissing(ELASTIC_PROVIDER))?;

        let min_space = min_space_bytes(system_config.auto_transfer_min_space().await?);
        let pool = AccountPool::new(self.deps.accounts.find_all().await?);
        let accounts = pool.eligible(pan_id, min_space);
        if accounts.is_empty() {
            info!("没有可用的{}账号", ELASTIC_PROVIDER.label());
            return Ok(TransferReport::default());
        }

        let settings = &self.deps.settings;
        let interval =
            interval_minutes(system_config, settings.transfer_default_interval_minutes).await;
        let cap = processing_cap(accounts.len(), settings.transfers_per_account_minute, interval);
        info!(
            "时间间隔: {} 分钟, 账号数: {}, 最大处理数量: {}",
            interval,
            accounts.len(),
            cap
        );

        let since = Utc::now() - chrono::Duration::hours(settings.transfer_window_hours);
        let candidates = self
            .deps
            .resources
            .get_resources_for_transfer(pan_id, since, cap)
            .await?;
        if candidates.is_empty() {
            info!("没有需要转存的资源");
            return Ok(TransferReport::default());
        }
        info!("找到 {} 个需要转存的资源", candidates.len());

        let filter = ContentPolicyFilter::from_config(&load_forbidden_words(system_config).await);
        let mut allowed = Vec::with_capacity(candidates.len());
        let mut report = TransferReport::default();

        for mut resource in candidates {
            let scan = filter.scan(&resource.title, &resource.description);
            if !scan.matched {
                allowed.push(resource);
                continue;
            }

            report.forbidden += 1;
            resource.error_msg = forbidden_count_message(scan.hits.len());
            info!(
                "标记违禁词资源: {} (包含 {} 个违禁词)",
                resource.title,
                scan.hits.len()
            );
            if let Err(e) = self.deps.resources.update(&resource).await {
                error!("保存违禁词错误信息失败 (ID: {}): {}", resource.id, e);
            }
        }

        let account_count = accounts.len();
        let (transferred, failed) = self.fan_out(accounts, allowed).await;
        report.transferred = transferred;
        report.failed = failed;

        info!(
            "自动转存处理完成，账号数: {}，成功 {} 个，失败 {} 个，违禁词资源 {} 个",
            account_count, report.transferred, report.failed, report.forbidden
        );
        Ok(report)
    }

    /// 每个账号一个工作任务，全部结束后返回 (成功数, 失败数)
    async fn fan_out(&self, accounts: Vec<Account>, resources: Vec<Resource>) -> (usize, usize) {
        if resources.is_empty() {
            return (0, 0);
        }

        let (tx, rx) = mpsc::channel(resources.len());
        for resource in resources {
            if tx.send(resource).await.is_err() {
                break;
            }
        }
        drop(tx);

        let queue = Arc::new(Mutex::new(rx));
        let worker = TransferWorker {
            resources: Arc::clone(&self.deps.resources),
            transfer: Arc::clone(&self.deps.transfer),
            classifier: self.deps.classifier.clone(),
            delay_ms: delay_range(self.deps.settings.delay_min_ms, self.deps.settings.delay_max_ms),
        };

        let mut workers = JoinSet::new();
        for account in accounts {
            let worker = worker.clone();
            let queue = Arc::clone(&queue);
            workers.spawn(async move { worker.run(account, queue).await });
        }

        let mut totals = (0, 0);
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(tally) => {
                    totals.0 += tally.transferred;
                    totals.1 += tally.failed;
                }
                Err(e) => error!("转存工作任务异常退出: {}", e),
            }
        }
        totals
    }
}

fn delay_range(min_ms: u64, max_ms: u64) -> (u64, u64) {
    if min_ms <= max_ms {
        (min_ms, max_ms)
    } else {
        (max_ms, min_ms)
    }
}

#[derive(Debug, Default)]
struct WorkerTally {
    transferred: usize,
    failed: usize,
}

/// 单个账号的转存工作任务
#[derive(Clone)]
struct TransferWorker {
    resources: Arc<dyn ResourceRepository>,
    transfer: Arc<dyn ShareTransfer>,
    classifier: ShareLinkClassifier,
    delay_ms: (u64, u64),
}

impl TransferWorker {
    async fn run(self, account: Account, queue: Arc<Mutex<mpsc::Receiver<Resource>>>) -> WorkerTally {
        let mut tally = WorkerTally::default();

        loop {
            let next = queue.lock().await.recv().await;
            let Some(mut resource) = next else {
                break;
            };

            match self.transfer_one(&account, &mut resource).await {
                Ok(()) => {
                    tally.transferred += 1;
                    info!("成功转存资源: {}", resource.title);
                }
                Err(msg) => {
                    tally.failed += 1;
                    error!("转存资源失败 (ID: {}): {}", resource.id, msg);
                }
            }

            self.pause().await;
        }

        debug!(
            "账号 {} 转存结束: 成功 {} 个，失败 {} 个",
            account.id, tally.transferred, tally.failed
        );
        tally
    }

    /// 失败时错误信息会写回资源
    async fn transfer_one(&self, account: &Account, resource: &mut Resource) -> Result<(), String> {
        let link = self.classifier.classify(&resource.url);
        let result = if link.is_supported() {
            self.transfer
                .transfer(account, &link.share_id)
                .await
                .map_err(|e| e.to_string())
        } else {
            Err(PipelineError::UnsupportedLink(resource.url.clone()).to_string())
        };

        match result {
            Ok(outcome) => {
                resource.save_url = outcome.share_url;
                resource.ck_id = Some(account.id);
                resource.fid = outcome.fid;
                resource.error_msg.clear();
                self.resources
                    .update(resource)
                    .await
                    .map_err(|e| format!("保存转存结果失败: {}", e))
            }
            Err(msg) => {
                resource.error_msg = msg.clone();
                if let Err(e) = self.resources.update(resource).await {
                    warn!("保存转存错误信息失败 (ID: {}): {}", resource.id, e);
                }
                Err(msg)
            }
        }
    }

    async fn pause(&self) {
        let (lo, hi) = self.delay_ms;
        let ms = rand::thread_rng().gen_range(lo..=hi);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }
}

#[async_trait]
impl ScheduledJob for AutoTransferScheduler {
    fn name(&self) -> &'static str {
        "自动转存任务"
    }

    async fn interval(&self) -> Duration {
        let default = self.deps.settings.transfer_default_interval_minutes;
        minutes(interval_minutes(self.deps.system_config.as_ref(), default).await)
    }

    async fn on_tick(&self) {
        match self.try_run_pass().await {
            Ok(PassOutcome::Completed(report)) => debug!("自动转存本轮结果: {:?}", report),
            Ok(PassOutcome::Skipped) => {}
            Err(e) => error!("自动转存任务执行失败: {}", e),
        }
    }
}
