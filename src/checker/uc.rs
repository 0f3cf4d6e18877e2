//! UC网盘

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::StatusCode;

use super::http::{RetryingClient, MOBILE_USER_AGENT};
use super::{contains_any, CheckError, ProviderChecker, ShareStatus};
use crate::provider::ProviderKind;

const NEGATIVE_KEYWORDS: &[&str] = &["失效", "不存在", "违规", "删除", "已过期", "被取消"];
const POSITIVE_MARKERS: &[&str] = &["文件", "分享", "class=\"file-list\""];

pub struct UcChecker {
    http: Arc<RetryingClient>,
}

impl UcChecker {
    pub fn new(http: Arc<RetryingClient>) -> Self {
        Self { http }
    }
}

/// 根据分享页判断状态
pub(crate) fn evaluate_page(status: StatusCode, body: &str) -> ShareStatus {
    if status != StatusCode::OK {
        return ShareStatus::Dead;
    }
    if contains_any(body, NEGATIVE_KEYWORDS) {
        return ShareStatus::Dead;
    }
    // 访问码输入框
    if body.contains("class=\"main-body\"") && body.contains("class=\"input-wrap\"") {
        return ShareStatus::PasswordProtected;
    }
    if contains_any(body, POSITIVE_MARKERS) {
        return ShareStatus::Live;
    }
    ShareStatus::Dead
}

#[async_trait]
impl ProviderChecker for UcChecker {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Uc
    }

    async fn check(&self, share_id: &str) -> Result<ShareStatus, CheckError> {
        let url = format!("https://drive.uc.cn/s/{}", share_id);
        let page = self
            .http
            .fetch(|client| {
                client
                    .get(&url)
                    .header("User-Agent", MOBILE_USER_AGENT)
                    .header("Host", "drive.uc.cn")
                    .header("Referer", &url)
                    .header("Origin", "https://drive.uc.cn")
            })
            .await?;

        Ok(evaluate_page(page.status, &page.body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negative_keyword_wins_over_file_list() {
        let body = r#"<div class="file-list">文件</div><p>分享已失效</p>"#;
        assert_eq!(evaluate_page(StatusCode::OK, body), ShareStatus::Dead);
    }

    #[test]
    fn test_password_form_is_live() {
        let body = r#"<div class="main-body"><div class="input-wrap"><input/></div></div>"#;
        assert_eq!(evaluate_page(StatusCode::OK, body), ShareStatus::PasswordProtected);
    }

    #[test]
    fn test_positive_and_ambiguous_pages() {
        assert_eq!(
            evaluate_page(StatusCode::OK, r#"<ul class="file-list"></ul>"#),
            ShareStatus::Live
        );
        assert_eq!(evaluate_page(StatusCode::OK, "<html></html>"), ShareStatus::Dead);
        assert_eq!(
            evaluate_page(StatusCode::NOT_FOUND, r#"<ul class="file-list"></ul>"#),
            ShareStatus::Dead
        );
    }
}
