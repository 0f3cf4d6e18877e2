// 分享链接有效性检测模块

pub mod aliyun;
pub mod baidu;
pub mod http;
pub mod pan115;
pub mod pan123;
pub mod quark;
pub mod tianyi;
pub mod uc;
pub mod xunlei;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::provider::{ClassifiedLink, ProviderKind, ShareLinkClassifier};

pub use aliyun::AliyunChecker;
pub use baidu::BaiduChecker;
pub use http::{FetchedPage, RetryingClient};
pub use pan115::Pan115Checker;
pub use pan123::Pan123Checker;
pub use quark::QuarkChecker;
pub use tianyi::TianyiChecker;
pub use uc::UcChecker;
pub use xunlei::XunleiChecker;

/// 分享状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ShareStatus {
    /// 正常可访问
    Live,
    /// 需要提取码（内容仍然有效）
    PasswordProtected,
    /// 失效 / 不存在 / 违规 / 无法判断
    Dead,
}

impl ShareStatus {
    pub fn is_live(&self) -> bool {
        !matches!(self, ShareStatus::Dead)
    }

    pub fn description(&self) -> &'static str {
        match self {
            ShareStatus::Live => "有效",
            ShareStatus::PasswordProtected => "有效（需提取码）",
            ShareStatus::Dead => "无效",
        }
    }
}

/// 检测错误
///
/// 只表示"无法得出结论"，调用方不应据此判定链接失效。
#[derive(Debug, Error)]
pub enum CheckError {
    #[error("网络请求失败: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("不支持的网盘类型: {0}")]
    Unsupported(ProviderKind),
}

/// 单个平台的检测器
#[async_trait]
pub trait ProviderChecker: Send + Sync {
    fn kind(&self) -> ProviderKind;

    async fn check(&self, share_id: &str) -> Result<ShareStatus, CheckError>;
}

/// 调度器使用的检测入口
#[async_trait]
pub trait LinkProbe: Send + Sync {
    async fn probe(&self, link: &ClassifiedLink) -> Result<ShareStatus, CheckError>;
}

/// 完整链接的检测结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckResult {
    pub url: String,
    pub provider: ProviderKind,
    pub share_id: String,
    pub status: ShareStatus,
}

/// 全平台检测器
pub struct LinkChecker {
    classifier: ShareLinkClassifier,
    uc: UcChecker,
    aliyun: AliyunChecker,
    quark: QuarkChecker,
    pan115: Pan115Checker,
    pan123: Pan123Checker,
    tianyi: TianyiChecker,
    xunlei: XunleiChecker,
    baidu: BaiduChecker,
}

impl LinkChecker {
    pub fn new(classifier: ShareLinkClassifier, http: Arc<RetryingClient>) -> Self {
        Self {
            classifier,
            uc: UcChecker::new(Arc::clone(&http)),
            aliyun: AliyunChecker::new(Arc::clone(&http)),
            quark: QuarkChecker::new(Arc::clone(&http)),
            pan115: Pan115Checker::new(Arc::clone(&http)),
            pan123: Pan123Checker::new(Arc::clone(&http)),
            tianyi: TianyiChecker::new(Arc::clone(&http)),
            xunlei: XunleiChecker::new(Arc::clone(&http)),
            baidu: BaiduChecker::new(http),
        }
    }

    /// 按平台选择检测器
    pub fn checker_for(&self, kind: ProviderKind) -> Option<&dyn ProviderChecker> {
        match kind {
            ProviderKind::Uc => Some(&self.uc),
            ProviderKind::Aliyun => Some(&self.aliyun),
            ProviderKind::Quark => Some(&self.quark),
            ProviderKind::Pan115 => Some(&self.pan115),
            ProviderKind::Pan123 => Some(&self.pan123),
            ProviderKind::Tianyi => Some(&self.tianyi),
            ProviderKind::Xunlei => Some(&self.xunlei),
            ProviderKind::Baidu => Some(&self.baidu),
            ProviderKind::NotFound => None,
        }
    }

    /// 检测一个完整的分享链接
    ///
    /// 无法识别的链接直接判定为无效，不发起网络请求。
    pub async fn check_url(&self, url: &str) -> Result<CheckResult, CheckError> {
        let link = self.classifier.classify(url);
        if !link.is_supported() {
            info!("无法识别的链接或网盘服务: {}", url);
            return Ok(CheckResult {
                url: url.to_string(),
                provider: link.provider,
                share_id: link.share_id,
                status: ShareStatus::Dead,
            });
        }

        let status = self.probe(&link).await?;
        Ok(CheckResult {
            url: url.to_string(),
            provider: link.provider,
            share_id: link.share_id,
            status,
        })
    }
}

#[async_trait]
impl LinkProbe for LinkChecker {
    async fn probe(&self, link: &ClassifiedLink) -> Result<ShareStatus, CheckError> {
        let checker = self
            .checker_for(link.provider)
            .ok_or(CheckError::Unsupported(link.provider))?;
        let status = checker.check(&link.share_id).await?;
        debug!(
            "链接检测完成: provider={}, share_id={}, 结果={}",
            link.provider,
            link.share_id,
            status.description()
        );
        Ok(status)
    }
}

/// 文本中是否包含任一关键词
pub(crate) fn contains_any(body: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|k| body.contains(k))
}

/// 解析平台 JSON 响应，失败时记录日志并返回 None
pub(crate) fn decode_json<T: DeserializeOwned>(kind: ProviderKind, body: &str) -> Option<T> {
    match serde_json::from_str::<T>(body) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("{} 响应解析失败，按无效处理: {}", kind.label(), e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HttpConfig;
    use crate::provider::ProviderRegistry;

    fn checker() -> LinkChecker {
        let classifier = ShareLinkClassifier::new(Arc::new(ProviderRegistry::builtin().unwrap()));
        let http = Arc::new(RetryingClient::new(&HttpConfig::default()).unwrap());
        LinkChecker::new(classifier, http)
    }

    #[test]
    fn test_every_supported_provider_has_checker() {
        let checker = checker();
        for kind in ProviderKind::SUPPORTED {
            let c = checker.checker_for(kind).expect("缺少检测器");
            assert_eq!(c.kind(), kind);
        }
        assert!(checker.checker_for(ProviderKind::NotFound).is_none());
    }

    #[tokio::test]
    async fn test_unrecognized_url_is_dead_without_network() {
        let result = checker().check_url("https://example.com/x").await.unwrap();
        assert_eq!(result.provider, ProviderKind::NotFound);
        assert_eq!(result.status, ShareStatus::Dead);
        assert!(result.share_id.is_empty());
    }

    #[tokio::test]
    async fn test_probe_rejects_not_found() {
        let err = checker().probe(&ClassifiedLink::not_found()).await.unwrap_err();
        assert!(matches!(err, CheckError::Unsupported(ProviderKind::NotFound)));
    }

    #[test]
    fn test_share_status_liveness() {
        assert!(ShareStatus::Live.is_live());
        assert!(ShareStatus::PasswordProtected.is_live());
        assert!(!ShareStatus::Dead.is_live());
    }
}
