//! 天翼云盘

use std::sync::Arc;

use async_trait::async_trait;

use super::http::RetryingClient;
use super::{contains_any, CheckError, ProviderChecker, ShareStatus};
use crate::provider::ProviderKind;

const SHARE_INFO_API: &str = "https://api.cloud.189.cn/open/share/getShareInfoByCodeV2.action";

const NEGATIVE_KEYWORDS: &[&str] = &[
    "ShareInfoNotFound",
    "ShareNotFound",
    "FileNotFound",
    "ShareExpiredError",
    "ShareAuditNotPass",
];

pub struct TianyiChecker {
    http: Arc<RetryingClient>,
}

impl TianyiChecker {
    pub fn new(http: Arc<RetryingClient>) -> Self {
        Self { http }
    }
}

/// 天翼接口在有效时返回内容并不固定，除错误码外均视为有效
pub(crate) fn evaluate_body(body: &str) -> ShareStatus {
    if contains_any(body, NEGATIVE_KEYWORDS) {
        ShareStatus::Dead
    } else if body.contains("needAccessCode") {
        ShareStatus::PasswordProtected
    } else {
        ShareStatus::Live
    }
}

#[async_trait]
impl ProviderChecker for TianyiChecker {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Tianyi
    }

    async fn check(&self, share_id: &str) -> Result<ShareStatus, CheckError> {
        let page = self
            .http
            .fetch(|client| client.post(SHARE_INFO_API).form(&[("shareCode", share_id)]))
            .await?;

        Ok(evaluate_body(&page.body))
    }
}
