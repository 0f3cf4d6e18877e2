//! 123云盘

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use super::http::RetryingClient;
use super::{decode_json, CheckError, ProviderChecker, ShareStatus};
use crate::provider::ProviderKind;

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ShareInfoResponse {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub data: Option<ShareInfoData>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ShareInfoData {
    #[serde(rename = "HasPwd", default)]
    pub has_pwd: Option<bool>,
}

pub struct Pan123Checker {
    http: Arc<RetryingClient>,
}

impl Pan123Checker {
    pub fn new(http: Arc<RetryingClient>) -> Self {
        Self { http }
    }
}

pub(crate) fn evaluate_body(body: &str) -> ShareStatus {
    if body.trim().is_empty() || body.contains("分享页面不存在") {
        return ShareStatus::Dead;
    }

    let Some(info) = decode_json::<ShareInfoResponse>(ProviderKind::Pan123, body) else {
        return ShareStatus::Dead;
    };

    if info.code.map_or(false, |c| c != 0) {
        return ShareStatus::Dead;
    }
    if info.data.and_then(|d| d.has_pwd) == Some(true) {
        return ShareStatus::PasswordProtected;
    }
    ShareStatus::Live
}

#[async_trait]
impl ProviderChecker for Pan123Checker {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Pan123
    }

    async fn check(&self, share_id: &str) -> Result<ShareStatus, CheckError> {
        let page = self
            .http
            .fetch(|client| {
                client
                    .get("https://www.123pan.com/api/share/info")
                    .query(&[("shareKey", share_id)])
                    .header("User-Agent", "Mozilla/5.0")
            })
            .await?;

        Ok(evaluate_body(&page.body))
    }
}
