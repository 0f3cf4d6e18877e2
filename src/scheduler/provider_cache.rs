//! 平台 → pans 表 ID 的映射缓存
//!
//! 首次使用时从 `ProviderRepository` 加载，加载失败的话下次再试。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{error, info, warn};

use crate::provider::ProviderKind;
use crate::repository::{ProviderRepository, RepoResult};

pub struct ProviderIdCache {
    providers: Arc<dyn ProviderRepository>,
    ids: DashMap<ProviderKind, i64>,
    loaded: AtomicBool,
}

impl ProviderIdCache {
    pub fn new(providers: Arc<dyn ProviderRepository>) -> Self {
        Self {
            providers,
            ids: DashMap::new(),
            loaded: AtomicBool::new(false),
        }
    }

    async fn ensure_loaded(&self) -> RepoResult<()> {
        if self.loaded.load(Ordering::Acquire) {
            return Ok(());
        }

        let pans = self.providers.find_all().await?;
        let all_kinds = ProviderKind::SUPPORTED
            .into_iter()
            .chain(std::iter::once(ProviderKind::NotFound));

        for kind in all_kinds {
            match pans.iter().find(|p| p.name == kind.catalog_name()) {
                Some(pan) => {
                    self.ids.insert(kind, pan.id);
                }
                None => warn!("未找到平台 {} 对应的数据库记录", kind.catalog_name()),
            }
        }

        self.loaded.store(true, Ordering::Release);
        info!("平台映射缓存初始化完成，共 {} 个映射", self.ids.len());
        Ok(())
    }

    /// 精确查找，不回退
    pub async fn lookup(&self, kind: ProviderKind) -> RepoResult<Option<i64>> {
        self.ensure_loaded().await?;
        Ok(self.ids.get(&kind).map(|id| *id))
    }

    /// 找不到时回退到 other 平台
    pub async fn resolve(&self, kind: ProviderKind) -> RepoResult<Option<i64>> {
        if let Some(id) = self.lookup(kind).await? {
            return Ok(Some(id));
        }

        let fallback = self.ids.get(&ProviderKind::NotFound).map(|id| *id);
        match fallback {
            Some(_) => warn!("未找到服务类型 {} 的映射，使用默认平台 other", kind),
            None => error!("未找到服务类型 {} 的映射，且没有默认平台", kind),
        }
        Ok(fallback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Provider;
    use crate::repository::{RepositoryError, SqliteStore};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn test_resolve_with_seeded_catalog() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        store.seed_providers().unwrap();
        let cache = ProviderIdCache::new(store.clone());

        let pans = ProviderRepository::find_all(store.as_ref()).await.unwrap();
        let quark_id = pans.iter().find(|p| p.name == "quark").unwrap().id;
        let other_id = pans.iter().find(|p| p.name == "other").unwrap().id;

        assert_eq!(cache.lookup(ProviderKind::Quark).await.unwrap(), Some(quark_id));
        assert_eq!(cache.resolve(ProviderKind::NotFound).await.unwrap(), Some(other_id));
    }

    /// 只有 quark 和 other 两个平台，第一次加载失败
    struct SparseCatalog {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ProviderRepository for SparseCatalog {
        async fn find_all(&self) -> RepoResult<Vec<Provider>> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(RepositoryError::Storage("连接中断".to_string()));
            }
            Ok(vec![
                Provider {
                    id: 5,
                    name: "quark".to_string(),
                    remark: String::new(),
                },
                Provider {
                    id: 9,
                    name: "other".to_string(),
                    remark: String::new(),
                },
            ])
        }
    }

    #[tokio::test]
    async fn test_fallback_and_retry_after_load_failure() {
        let repo = Arc::new(SparseCatalog {
            calls: AtomicUsize::new(0),
        });
        let cache = ProviderIdCache::new(repo.clone());

        assert!(cache.lookup(ProviderKind::Quark).await.is_err());

        assert_eq!(cache.lookup(ProviderKind::Quark).await.unwrap(), Some(5));
        assert_eq!(cache.lookup(ProviderKind::Baidu).await.unwrap(), None);
        assert_eq!(cache.resolve(ProviderKind::Baidu).await.unwrap(), Some(9));
        assert_eq!(repo.calls.load(Ordering::SeqCst), 2);
    }
}
