//! 夸克网盘
//!
//! 两步检测：先换取 stoken，再查询分享详情。

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use super::http::RetryingClient;
use super::{decode_json, CheckError, ProviderChecker, ShareStatus};
use crate::provider::ProviderKind;

const TOKEN_API: &str = "https://drive.quark.cn/1/clouddrive/share/sharepage/token";
const DETAIL_API: &str = "https://drive-h.quark.cn/1/clouddrive/share/sharepage/detail";

#[derive(Debug, Default, Deserialize)]
pub(crate) struct TokenResponse {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Option<TokenData>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct TokenData {
    #[serde(default)]
    pub stoken: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct DetailResponse {
    #[serde(default)]
    pub status: Option<i64>,
    #[serde(default)]
    pub data: Option<DetailData>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct DetailData {
    #[serde(default)]
    pub share: Option<DetailShare>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct DetailShare {
    #[serde(default)]
    pub status: Option<i64>,
}

/// 第一步的结论
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum TokenStep {
    Finished(ShareStatus),
    /// 拿到 stoken，需要继续查询详情
    Detail(String),
}

pub(crate) fn evaluate_token(resp: &TokenResponse) -> TokenStep {
    match resp.message.as_deref() {
        Some("ok") => {
            match resp
                .data
                .as_ref()
                .and_then(|d| d.stoken.as_deref())
                .filter(|s| !s.is_empty())
            {
                Some(stoken) => TokenStep::Detail(stoken.to_string()),
                None => TokenStep::Finished(ShareStatus::Dead),
            }
        }
        Some("需要提取码") => TokenStep::Finished(ShareStatus::PasswordProtected),
        _ => TokenStep::Finished(ShareStatus::Dead),
    }
}

/// 详情接口的业务状态码决定最终结果
pub(crate) fn evaluate_detail(resp: &DetailResponse) -> ShareStatus {
    if resp.status == Some(400) {
        return ShareStatus::Live;
    }
    let share_status = resp
        .data
        .as_ref()
        .and_then(|d| d.share.as_ref())
        .and_then(|s| s.status);
    if share_status == Some(1) {
        ShareStatus::Live
    } else {
        ShareStatus::Dead
    }
}

pub struct QuarkChecker {
    http: Arc<RetryingClient>,
}

impl QuarkChecker {
    pub fn new(http: Arc<RetryingClient>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl ProviderChecker for QuarkChecker {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Quark
    }

    async fn check(&self, share_id: &str) -> Result<ShareStatus, CheckError> {
        let payload = serde_json::json!({ "pwd_id": share_id, "passcode": "" });
        let page = self
            .http
            .fetch(|client| client.post(TOKEN_API).json(&payload))
            .await?;

        let Some(token) = decode_json::<TokenResponse>(self.kind(), &page.body) else {
            return Ok(ShareStatus::Dead);
        };

        let stoken = match evaluate_token(&token) {
            TokenStep::Finished(status) => return Ok(status),
            TokenStep::Detail(stoken) => stoken,
        };

        let detail_url = format!(
            "{}?pwd_id={}&stoken={}&_fetch_share=1",
            DETAIL_API,
            share_id,
            urlencoding::encode(&stoken)
        );
        let detail = self.http.fetch(|client| client.get(&detail_url)).await?;

        Ok(decode_json::<DetailResponse>(self.kind(), &detail.body)
            .map(|d| evaluate_detail(&d))
            .unwrap_or(ShareStatus::Dead))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(body: &str) -> TokenStep {
        evaluate_token(&serde_json::from_str(body).unwrap())
    }

    fn detail(body: &str) -> ShareStatus {
        evaluate_detail(&serde_json::from_str(body).unwrap())
    }

    #[test]
    fn test_token_step() {
        assert_eq!(
            token(r#"{"status":200,"message":"ok","data":{"stoken":"a b+c"}}"#),
            TokenStep::Detail("a b+c".to_string())
        );
        assert_eq!(
            token(r#"{"status":200,"message":"ok","data":{"stoken":""}}"#),
            TokenStep::Finished(ShareStatus::Dead)
        );
        assert_eq!(
            token(r#"{"status":401,"message":"需要提取码"}"#),
            TokenStep::Finished(ShareStatus::PasswordProtected)
        );
        assert_eq!(
            token(r#"{"status":404,"message":"分享不存在"}"#),
            TokenStep::Finished(ShareStatus::Dead)
        );
    }

    #[test]
    fn test_detail_step_uses_body_status() {
        assert_eq!(detail(r#"{"status":400,"message":"x"}"#), ShareStatus::Live);
        assert_eq!(
            detail(r#"{"status":200,"data":{"share":{"status":1,"title":"t"}}}"#),
            ShareStatus::Live
        );
        assert_eq!(
            detail(r#"{"status":200,"data":{"share":{"status":3}}}"#),
            ShareStatus::Dead
        );
        assert_eq!(detail(r#"{"status":200,"data":{}}"#), ShareStatus::Dead);
    }
}
