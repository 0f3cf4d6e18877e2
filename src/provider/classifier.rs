//! 分享链接识别

use std::sync::Arc;

use reqwest::Url;
use serde::Serialize;

use super::{ProviderKind, ProviderRegistry};

/// 识别结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassifiedLink {
    pub provider: ProviderKind,
    /// 分享 ID，未识别时为空
    pub share_id: String,
}

impl ClassifiedLink {
    pub fn not_found() -> Self {
        Self {
            provider: ProviderKind::NotFound,
            share_id: String::new(),
        }
    }

    pub fn is_supported(&self) -> bool {
        self.provider.is_supported() && !self.share_id.is_empty()
    }
}

/// 分享链接识别器
#[derive(Debug, Clone)]
pub struct ShareLinkClassifier {
    registry: Arc<ProviderRegistry>,
}

impl ShareLinkClassifier {
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// 识别链接所属平台并提取分享 ID
    pub fn classify(&self, url: &str) -> ClassifiedLink {
        let host = match Url::parse(url.trim()) {
            Ok(parsed) => match parsed.host_str() {
                Some(host) => host.to_ascii_lowercase(),
                None => return ClassifiedLink::not_found(),
            },
            Err(_) => return ClassifiedLink::not_found(),
        };

        for rule in self.registry.rules() {
            if !rule.matches_host(&host) {
                continue;
            }
            if let Some(share_id) = rule.extract_share_id(url.trim()) {
                return ClassifiedLink {
                    provider: rule.kind,
                    share_id,
                };
            }
        }

        ClassifiedLink::not_found()
    }
}
