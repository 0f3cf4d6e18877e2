//! 百度网盘

use std::sync::Arc;

use async_trait::async_trait;

use super::http::{RetryingClient, DESKTOP_USER_AGENT};
use super::{contains_any, CheckError, ProviderChecker, ShareStatus};
use crate::provider::ProviderKind;

const NEGATIVE_KEYWORDS: &[&str] = &[
    "分享的文件已经被取消",
    "分享已过期",
    "你访问的页面不存在",
    "你所访问的页面",
];
const PASSWORD_MARKERS: &[&str] = &["请输入提取码", "提取文件"];
const POSITIVE_MARKERS: &[&str] = &["过期时间", "文件列表"];

pub struct BaiduChecker {
    http: Arc<RetryingClient>,
}

impl BaiduChecker {
    pub fn new(http: Arc<RetryingClient>) -> Self {
        Self { http }
    }
}

pub(crate) fn evaluate_page(body: &str) -> ShareStatus {
    if contains_any(body, NEGATIVE_KEYWORDS) {
        ShareStatus::Dead
    } else if contains_any(body, PASSWORD_MARKERS) {
        ShareStatus::PasswordProtected
    } else if contains_any(body, POSITIVE_MARKERS) {
        ShareStatus::Live
    } else {
        ShareStatus::Dead
    }
}

#[async_trait]
impl ProviderChecker for BaiduChecker {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Baidu
    }

    async fn check(&self, share_id: &str) -> Result<ShareStatus, CheckError> {
        let url = format!("https://pan.baidu.com/s/{}", share_id);
        let page = self
            .http
            .fetch(|client| client.get(&url).header("User-Agent", DESKTOP_USER_AGENT))
            .await?;

        Ok(evaluate_page(&page.body))
    }
}
