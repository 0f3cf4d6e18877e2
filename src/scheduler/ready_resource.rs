//! 待处理资源调度器
//!
//! 每轮读取全部待处理记录，依次查重、识别、违禁词过滤、有效性检测
//! （夸克走账号转存），成功的写入正式资源表。无论成功失败，处理过的
//! 待处理记录都会被删除；只有查重本身出错时记录保留到下一轮。
//!
//! 转存返回的标题只在提交的标题为空时填入，描述始终保留提交的内容。
//! 标签在资源写入成功后才创建，写入撞上唯一约束时不会留下孤立标签。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::guard::SingleFlight;
use super::lifecycle::ScheduledJob;
use super::provider_cache::ProviderIdCache;
use super::{
    interval_minutes, load_forbidden_words, minutes, PassOutcome, PipelineError, SchedulerDeps,
};
use crate::account::{min_space_bytes, select_best};
use crate::models::{ReadyResource, Resource};
use crate::policy::ContentPolicyFilter;
use crate::repository::RepositoryError;

/// 一轮处理的统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PassReport {
    /// 新写入的正式资源数
    pub processed: usize,
    /// 已存在而被丢弃的记录数
    pub duplicates: usize,
    pub failed: usize,
}

/// 单条记录的处理结果
enum Stored {
    Created(i64),
    /// 写入时撞上唯一约束
    Duplicate,
}

/// 标签分隔符：中英文逗号、分号以及顿号
pub fn split_tags(raw: &str) -> Vec<String> {
    raw.split(|c| matches!(c, ',' | '，' | ';' | '；' | '、'))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

pub struct ReadyResourceScheduler {
    deps: SchedulerDeps,
    provider_ids: ProviderIdCache,
    flight: SingleFlight,
}

impl ReadyResourceScheduler {
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

    /// 受单次执行保护的一轮处理
    pub async fn try_run_pass(&self) -> Result<PassOutcome<PassReport>, RepositoryError> {
        let Some(_permit) = self.flight.try_begin() else {
            info!("上一次待处理资源任务还在执行中，跳过本次执行");
            return Ok(PassOutcome::Skipped);
        };
        self.run_once().await.map(PassOutcome::Completed)
    }

    /// 执行一轮处理，只有读取配置或待处理列表失败时返回错误
    pub async fn run_once(&self) -> Result<PassReport, RepositoryError> {
        let system_config = self.deps.system_config.as_ref();
        if !system_config.auto_process_enabled().await? {
            debug!("自动处理待处理资源功能已禁用");
            return Ok(PassReport::default());
        }

        let items = self.deps.ready_resources.find_all().await?;
        if items.is_empty() {
            debug!("没有待处理的资源");
            return Ok(PassReport::default());
        }
        info!("找到 {} 个待处理资源，开始处理...", items.len());

        let filter = ContentPolicyFilter::from_config(&load_forbidden_words(system_config).await);
        let min_space = match system_config.auto_transfer_min_space().await {
            Ok(gib) => min_space_bytes(gib),
            Err(e) => {
                warn!("获取最小存储空间配置失败，按 0 处理: {}", e);
                0
            }
        };

        let mut report = PassReport::default();
        for item in &items {
            match self.deps.resources.find_exists(&item.url).await {
                Err(e) => {
                    error!("查重失败，保留到下一轮: {}, 错误: {}", item.url, e);
                    continue;
                }
                Ok(true) => {
                    info!("资源已存在: {}", item.url);
                    report.duplicates += 1;
                    self.discard(item.id).await;
                    continue;
                }
                Ok(false) => {}
            }

            match self.convert(item, &filter, min_space).await {
                Ok(Stored::Created(id)) => {
                    report.processed += 1;
                    info!("成功处理资源: {} (资源ID: {})", item.url, id);
                }
                Ok(Stored::Duplicate) => {
                    report.duplicates += 1;
                    info!("资源已被其他来源写入: {}", item.url);
                }
                Err(e) => {
                    report.failed += 1;
                    error!("处理资源失败 (ID: {}): {}", item.id, e);
                }
            }
            self.discard(item.id).await;
        }

        info!(
            "待处理资源处理完成，新增 {} 个，重复 {} 个，失败 {} 个",
            report.processed, report.duplicates, report.failed
        );
        Ok(report)
    }

    async fn discard(&self, id: i64) {
        if let Err(e) = self.deps.ready_resources.delete(id).await {
            warn!("删除待处理资源失败 (ID: {}): {}", id, e);
        }
    }

    async fn convert(
        &self,
        item: &ReadyResource,
        filter: &ContentPolicyFilter,
        min_space: i64,
    ) -> Result<Stored, PipelineError> {
        debug!("开始处理资源: {}", item.url);

        let link = self.deps.classifier.classify(&item.url);
        if !link.is_supported() {
            return Err(PipelineError::UnsupportedLink(item.url.clone()));
        }
        debug!("检测到服务类型: {}, 分享ID: {}", link.provider, link.share_id);

        let mut resource = Resource::from_ready(item, None);

        let scan = filter.scan(&resource.title, &resource.description);
        if scan.matched {
            return Err(PipelineError::ForbiddenWords(scan.hits));
        }

        resource.pan_id = self.provider_ids.resolve(link.provider).await?;

        if link.provider.is_elastic() {
            let pan_id = self
                .provider_ids
                .lookup(link.provider)
                .await?
                .ok_or(PipelineError::ProviderMissing(link.provider))?;
            let accounts = self.deps.accounts.find_by_provider(pan_id).await?;
            let account = select_best(&accounts, min_space)
                .ok_or(PipelineError::NoAccount(link.provider))?;
            debug!(
                "使用{}账号: {}, Cookie: {}",
                link.provider.label(),
                account.id,
                account.masked_cookie()
            );

            let outcome = self
                .deps
                .transfer
                .transfer(account, &link.share_id)
                .await
                .map_err(PipelineError::Transfer)?;

            resource.save_url = outcome.share_url;
            resource.fid = outcome.fid;
            resource.ck_id = Some(account.id);
            if resource.title.trim().is_empty() && !outcome.title.is_empty() {
                resource.title = outcome.title;
            }
        } else {
            let status = self
                .deps
                .probe
                .probe(&link)
                .await
                .map_err(PipelineError::CheckFailed)?;
            if !status.is_live() {
                return Err(PipelineError::LinkDead(item.url.clone()));
            }
        }

        resource.category_id = self.resolve_category(&item.category).await;

        let id = match self.deps.resources.create(&resource).await {
            Ok(id) => id,
            Err(RepositoryError::Duplicate(_)) => return Ok(Stored::Duplicate),
            Err(e) => return Err(e.into()),
        };

        for tag_id in self.resolve_tags(&item.tags).await {
            if let Err(e) = self.deps.resources.create_resource_tag(id, tag_id).await {
                error!("创建资源标签关联失败: {}", e);
            }
        }

        Ok(Stored::Created(id))
    }

    async fn resolve_category(&self, name: &str) -> Option<i64> {
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        match self.deps.taxonomy.find_or_create_category(name).await {
            Ok(id) => Some(id),
            Err(e) => {
                error!("解析分类失败: {}, 错误: {}", name, e);
                None
            }
        }
    }

    async fn resolve_tags(&self, raw: &str) -> Vec<i64> {
        let mut ids = Vec::new();
        for name in split_tags(raw) {
            match self.deps.taxonomy.find_or_create_tag(&name).await {
                Ok(id) if !ids.contains(&id) => ids.push(id),
                Ok(_) => {}
                Err(e) => error!("创建标签失败: {}, 错误: {}", name, e),
            }
        }
        ids
    }
}

#[async_trait]
impl ScheduledJob for ReadyResourceScheduler {
    fn name(&self) -> &'static str {
        "待处理资源自动处理任务"
    }

    async fn interval(&self) -> Duration {
        let default = self.deps.settings.ready_default_interval_minutes;
        minutes(interval_minutes(self.deps.system_config.as_ref(), default).await)
    }

    async fn on_tick(&self) {
        match self.try_run_pass().await {
            Ok(PassOutcome::Completed(report)) => debug!("待处理资源本轮结果: {:?}", report),
            Ok(PassOutcome::Skipped) => {}
            Err(e) => error!("待处理资源任务执行失败: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checker::ShareStatus;
    use crate::repository::{
        keys, ReadyResourceRepository, RepoResult, ResourceRepository, SqliteStore,
        SystemConfigRepository, TaxonomyRepository,
    };
    use chrono::{DateTime, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use crate::scheduler::testing::*;
    use crate::transfer::TransferError;
    use tokio::sync::Notify;

    const QUARK_URL: &str = "https://pan.quark.cn/s/9803af406f13";
    const BAIDU_URL: &str = "https://pan.baidu.com/s/1abcDEFg";

    async fn queue(store: &SqliteStore, item: ReadyResource) -> i64 {
        ReadyResourceRepository::create(store, &item).await.unwrap()
    }

    async fn pending(store: &SqliteStore) -> usize {
        ReadyResourceRepository::find_all(store).await.unwrap().len()
    }

    #[test]
    fn test_split_tags() {
        assert_eq!(
            split_tags("电影， 4K;国语；高清、 ,剧情"),
            vec!["电影", "4K", "国语", "高清", "剧情"]
        );
        assert!(split_tags("").is_empty());
    }

    #[tokio::test]
    async fn test_disabled_pass_is_noop() {
        let store = seeded_store().await;
        store
            .set_value(keys::AUTO_PROCESS_READY_RESOURCES, "false")
            .await
            .unwrap();
        queue(&store, ReadyResource::new(BAIDU_URL)).await;

        let scheduler = ReadyResourceScheduler::new(deps(
            store.clone(),
            StubProbe::new(ShareStatus::Live),
            StubTransfer::ok(""),
        ));
        assert_eq!(scheduler.run_once().await.unwrap(), PassReport::default());
        assert_eq!(pending(&store).await, 1);
    }

    #[tokio::test]
    async fn test_live_link_is_persisted_with_taxonomy() {
        let store = seeded_store().await;
        queue(
            &store,
            ReadyResource::new(BAIDU_URL)
                .with_title("纪录片合集")
                .with_category("纪录片")
                .with_tags("自然，4K;自然"),
        )
        .await;

        let probe = StubProbe::new(ShareStatus::PasswordProtected);
        let scheduler =
            ReadyResourceScheduler::new(deps(store.clone(), probe.clone(), StubTransfer::ok("")));
        let report = scheduler.run_once().await.unwrap();

        assert_eq!(report.processed, 1);
        assert_eq!(pending(&store).await, 0);

        let saved = store.find_resource_by_url(BAIDU_URL).unwrap().unwrap();
        assert_eq!(saved.title, "纪录片合集");
        assert_eq!(saved.pan_id, Some(provider_id(&store, "baidu").await));
        assert!(saved.category_id.is_some());
        assert!(saved.is_valid && saved.is_public);
        assert!(!saved.is_transferred());
        assert_eq!(store.tag_ids_for(saved.id).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_processing_twice_creates_one_resource() {
        let store = seeded_store().await;
        queue(&store, ReadyResource::new(BAIDU_URL)).await;
        queue(&store, ReadyResource::new(BAIDU_URL)).await;

        let scheduler = ReadyResourceScheduler::new(deps(
            store.clone(),
            StubProbe::new(ShareStatus::Live),
            StubTransfer::ok(""),
        ));
        let first = scheduler.run_once().await.unwrap();
        assert_eq!(first.processed, 1);
        assert_eq!(first.duplicates, 1);

        // 模拟中途崩溃后同一条记录被重新提交
        queue(&store, ReadyResource::new(BAIDU_URL)).await;
        let second = scheduler.run_once().await.unwrap();
        assert_eq!(second.processed, 0);
        assert_eq!(second.duplicates, 1);
        assert_eq!(pending(&store).await, 0);
    }

    #[tokio::test]
    async fn test_terminal_failures_are_deleted() {
        let store = seeded_store().await;
        store.set_value(keys::FORBIDDEN_WORDS, "赌博").await.unwrap();
        queue(&store, ReadyResource::new("https://example.com/x")).await;
        queue(
            &store,
            ReadyResource::new("https://www.aliyundrive.com/s/abc123").with_title("在线赌博教程"),
        )
        .await;
        queue(&store, ReadyResource::new("https://cloud.189.cn/t/deadlink")).await;

        let probe = StubProbe::new(ShareStatus::Dead);
        let scheduler =
            ReadyResourceScheduler::new(deps(store.clone(), probe.clone(), StubTransfer::ok("")));
        let report = scheduler.run_once().await.unwrap();

        assert_eq!(report.failed, 3);
        assert_eq!(report.processed, 0);
        assert_eq!(pending(&store).await, 0);
        // 违禁词和无法识别的链接不会触发检测
        assert_eq!(probe.calls.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert!(!store.find_exists("https://cloud.189.cn/t/deadlink").await.unwrap());
    }

    #[tokio::test]
    async fn test_elastic_link_is_transferred_with_best_account() {
        let store = seeded_store().await;
        let quark_id = provider_id(&store, "quark").await;
        store.create_account(&quark_account(quark_id, 10)).unwrap();
        let best = store.create_account(&quark_account(quark_id, 80)).unwrap();
        queue(&store, ReadyResource::new(QUARK_URL)).await;

        let transfer = StubTransfer::ok("分享标题");
        let probe = StubProbe::new(ShareStatus::Dead);
        let scheduler =
            ReadyResourceScheduler::new(deps(store.clone(), probe.clone(), transfer.clone()));
        let report = scheduler.run_once().await.unwrap();
        assert_eq!(report.processed, 1);

        let saved = store.find_resource_by_url(QUARK_URL).unwrap().unwrap();
        assert_eq!(saved.pan_id, Some(quark_id));
        assert_eq!(saved.ck_id, Some(best));
        assert_eq!(saved.save_url, "https://pan.quark.cn/s/saved-9803af406f13");
        assert_eq!(saved.fid, "fid-9803af406f13");
        assert_eq!(saved.title, "分享标题");
        assert_eq!(transfer.seen.lock()[0], (best, "9803af406f13".to_string()));
        assert_eq!(probe.calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_submitted_title_and_description_are_kept() {
        let store = seeded_store().await;
        let quark_id = provider_id(&store, "quark").await;
        store.create_account(&quark_account(quark_id, 50)).unwrap();
        queue(
            &store,
            ReadyResource::new(QUARK_URL)
                .with_title("用户标题")
                .with_description("用户描述"),
        )
        .await;

        let scheduler = ReadyResourceScheduler::new(deps(
            store.clone(),
            StubProbe::new(ShareStatus::Live),
            StubTransfer::ok("分享标题"),
        ));
        scheduler.run_once().await.unwrap();

        let saved = store.find_resource_by_url(QUARK_URL).unwrap().unwrap();
        assert_eq!(saved.title, "用户标题");
        assert_eq!(saved.description, "用户描述");
        assert!(saved.is_transferred());
    }

    /// 查重总是返回不存在，其余操作交给真实存储
    struct StaleLookup {
        inner: Arc<SqliteStore>,
    }

    #[async_trait]
    impl ResourceRepository for StaleLookup {
        async fn create(&self, resource: &Resource) -> RepoResult<i64> {
            ResourceRepository::create(self.inner.as_ref(), resource).await
        }

        async fn update(&self, resource: &Resource) -> RepoResult<()> {
            self.inner.update(resource).await
        }

        async fn find_exists(&self, _url: &str) -> RepoResult<bool> {
            Ok(false)
        }

        async fn get_resources_for_transfer(
            &self,
            pan_id: i64,
            since: DateTime<Utc>,
            limit: usize,
        ) -> RepoResult<Vec<Resource>> {
            self.inner.get_resources_for_transfer(pan_id, since, limit).await
        }

        async fn create_resource_tag(&self, resource_id: i64, tag_id: i64) -> RepoResult<()> {
            self.inner.create_resource_tag(resource_id, tag_id).await
        }
    }

    struct CountingTaxonomy {
        inner: Arc<SqliteStore>,
        tags: AtomicUsize,
    }

    #[async_trait]
    impl TaxonomyRepository for CountingTaxonomy {
        async fn find_or_create_category(&self, name: &str) -> RepoResult<i64> {
            self.inner.find_or_create_category(name).await
        }

        async fn find_or_create_tag(&self, name: &str) -> RepoResult<i64> {
            self.tags.fetch_add(1, Ordering::SeqCst);
            self.inner.find_or_create_tag(name).await
        }
    }

    #[tokio::test]
    async fn test_insert_conflict_creates_no_tags() {
        let store = seeded_store().await;
        let existing = Resource {
            url: BAIDU_URL.to_string(),
            title: "已入库".to_string(),
            ..Default::default()
        };
        ResourceRepository::create(store.as_ref(), &existing).await.unwrap();
        queue(&store, ReadyResource::new(BAIDU_URL).with_tags("电影,高清")).await;

        let taxonomy = Arc::new(CountingTaxonomy {
            inner: store.clone(),
            tags: AtomicUsize::new(0),
        });
        let mut scheduler_deps = deps(
            store.clone(),
            StubProbe::new(ShareStatus::Live),
            StubTransfer::ok(""),
        );
        scheduler_deps.resources = Arc::new(StaleLookup {
            inner: store.clone(),
        });
        scheduler_deps.taxonomy = taxonomy.clone();

        let report = ReadyResourceScheduler::new(scheduler_deps)
            .run_once()
            .await
            .unwrap();
        assert_eq!(report.duplicates, 1);
        assert_eq!(report.failed, 0);
        assert_eq!(taxonomy.tags.load(Ordering::SeqCst), 0);
        assert_eq!(pending(&store).await, 0);
    }

    #[tokio::test]
    async fn test_elastic_failures_are_terminal() {
        let store = seeded_store().await;
        queue(&store, ReadyResource::new(QUARK_URL)).await;

        // 没有账号
        let transfer = StubTransfer::ok("");
        let scheduler = ReadyResourceScheduler::new(deps(
            store.clone(),
            StubProbe::new(ShareStatus::Live),
            transfer.clone(),
        ));
        assert_eq!(scheduler.run_once().await.unwrap().failed, 1);
        assert_eq!(transfer.calls(), 0);
        assert_eq!(pending(&store).await, 0);

        // 转存接口报错
        let quark_id = provider_id(&store, "quark").await;
        store.create_account(&quark_account(quark_id, 50)).unwrap();
        queue(&store, ReadyResource::new(QUARK_URL)).await;
        let transfer = StubTransfer::failing("9803af406f13", TransferError::CapacityExhausted);
        let scheduler = ReadyResourceScheduler::new(deps(
            store.clone(),
            StubProbe::new(ShareStatus::Live),
            transfer.clone(),
        ));
        assert_eq!(scheduler.run_once().await.unwrap().failed, 1);
        assert_eq!(transfer.calls(), 1);
        assert!(!store.find_exists(QUARK_URL).await.unwrap());
        assert_eq!(pending(&store).await, 0);
    }

    #[tokio::test]
    async fn test_min_space_excludes_small_accounts() {
        let store = seeded_store().await;
        store.set_value(keys::AUTO_TRANSFER_MIN_SPACE, "20").await.unwrap();
        let quark_id = provider_id(&store, "quark").await;
        store.create_account(&quark_account(quark_id, 5)).unwrap();
        queue(&store, ReadyResource::new(QUARK_URL)).await;

        let transfer = StubTransfer::ok("");
        let scheduler = ReadyResourceScheduler::new(deps(
            store.clone(),
            StubProbe::new(ShareStatus::Live),
            transfer.clone(),
        ));
        assert_eq!(scheduler.run_once().await.unwrap().failed, 1);
        assert_eq!(transfer.calls(), 0);
    }

    /// find_all 会一直阻塞到测试放行
    struct BlockingQueue {
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl ReadyResourceRepository for BlockingQueue {
        async fn find_all(&self) -> RepoResult<Vec<ReadyResource>> {
            self.entered.notify_one();
            self.release.notified().await;
            Ok(Vec::new())
        }

        async fn create(&self, _item: &ReadyResource) -> RepoResult<i64> {
            Ok(0)
        }

        async fn batch_create(&self, _items: &[ReadyResource]) -> RepoResult<Vec<i64>> {
            Ok(Vec::new())
        }

        async fn delete(&self, _id: i64) -> RepoResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_overlapping_pass_is_skipped() {
        let store = seeded_store().await;
        let blocking = Arc::new(BlockingQueue {
            entered: Notify::new(),
            release: Notify::new(),
        });
        let mut scheduler_deps = deps(
            store.clone(),
            StubProbe::new(ShareStatus::Live),
            StubTransfer::ok(""),
        );
        scheduler_deps.ready_resources = blocking.clone();
        let scheduler = Arc::new(ReadyResourceScheduler::new(scheduler_deps));

        let first = {
            let scheduler = Arc::clone(&scheduler);
            tokio::spawn(async move { scheduler.try_run_pass().await })
        };
        blocking.entered.notified().await;
        assert!(scheduler.is_busy());

        let second = scheduler.try_run_pass().await.unwrap();
        assert!(second.is_skipped());

        blocking.release.notify_one();
        let first = first.await.unwrap().unwrap();
        assert_eq!(first, PassOutcome::Completed(PassReport::default()));
        assert!(!scheduler.is_busy());
    }
}
