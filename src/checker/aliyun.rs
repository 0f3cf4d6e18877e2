//! 阿里云盘

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use super::http::RetryingClient;
use super::{decode_json, CheckError, ProviderChecker, ShareStatus};
use crate::provider::ProviderKind;

const ANONYMOUS_SHARE_API: &str =
    "https://api.aliyundrive.com/adrive/v3/share_link/get_share_by_anonymous";

/// 匿名分享信息响应
#[derive(Debug, Default, Deserialize)]
pub(crate) struct AnonymousShareResponse {
    #[serde(default)]
    pub has_pwd: Option<bool>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub file_infos: Option<serde_json::Value>,
}

impl AnonymousShareResponse {
    pub(crate) fn status(&self) -> ShareStatus {
        if self.has_pwd == Some(true) {
            return ShareStatus::PasswordProtected;
        }
        if self.code.as_deref() == Some("NotFound.ShareLink") {
            return ShareStatus::Dead;
        }
        match &self.file_infos {
            Some(_) => ShareStatus::Live,
            None => ShareStatus::Dead,
        }
    }
}

pub struct AliyunChecker {
    http: Arc<RetryingClient>,
}

impl AliyunChecker {
    pub fn new(http: Arc<RetryingClient>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl ProviderChecker for AliyunChecker {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Aliyun
    }

    async fn check(&self, share_id: &str) -> Result<ShareStatus, CheckError> {
        let payload = serde_json::json!({ "share_id": share_id });
        let page = self
            .http
            .fetch(|client| client.post(ANONYMOUS_SHARE_API).json(&payload))
            .await?;

        Ok(decode_json::<AnonymousShareResponse>(self.kind(), &page.body)
            .map(|r| r.status())
            .unwrap_or(ShareStatus::Dead))
    }
}
