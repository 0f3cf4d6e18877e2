//! 115网盘

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use super::http::RetryingClient;
use super::{decode_json, CheckError, ProviderChecker, ShareStatus};
use crate::provider::ProviderKind;

const SNAP_API: &str = "https://webapi.115.com/share/snap";

#[derive(Debug, Default, Deserialize)]
pub(crate) struct SnapResponse {
    #[serde(default)]
    pub state: Option<bool>,
    #[serde(default)]
    pub error: Option<String>,
}

impl SnapResponse {
    pub(crate) fn status(&self) -> ShareStatus {
        if self.state == Some(true) {
            ShareStatus::Live
        } else if self
            .error
            .as_deref()
            .map_or(false, |e| e.contains("请输入访问码"))
        {
            ShareStatus::PasswordProtected
        } else {
            ShareStatus::Dead
        }
    }
}

pub struct Pan115Checker {
    http: Arc<RetryingClient>,
}

impl Pan115Checker {
    pub fn new(http: Arc<RetryingClient>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl ProviderChecker for Pan115Checker {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Pan115
    }

    async fn check(&self, share_id: &str) -> Result<ShareStatus, CheckError> {
        let page = self
            .http
            .fetch(|client| {
                client
                    .get(SNAP_API)
                    .query(&[("share_code", share_id), ("receive_code", "")])
            })
            .await?;

        Ok(decode_json::<SnapResponse>(self.kind(), &page.body)
            .map(|r| r.status())
            .unwrap_or(ShareStatus::Dead))
    }
}
