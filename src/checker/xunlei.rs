//! 迅雷云盘
//!
//! 两步检测：先申请 captcha token，再带 token 查询分享。

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::http::RetryingClient;
use super::{contains_any, decode_json, CheckError, ProviderChecker, ShareStatus};
use crate::provider::ProviderKind;

const CAPTCHA_API: &str = "https://xluser-ssl.xunlei.com/v1/shield/captcha/init";
const SHARE_API: &str = "https://api-pan.xunlei.com/drive/v1/share";
const CLIENT_ID: &str = "Xqp0kJBXWhwaTpB6";
const DEVICE_ID: &str = "925b7631473a13716b791d7f28289cad";

const NEGATIVE_KEYWORDS: &[&str] = &["NOT_FOUND", "SENSITIVE_RESOURCE", "EXPIRED"];

#[derive(Debug, Serialize)]
struct CaptchaRequest<'a> {
    client_id: &'a str,
    device_id: &'a str,
    action: &'a str,
    meta: CaptchaMeta<'a>,
}

#[derive(Debug, Serialize)]
struct CaptchaMeta<'a> {
    package_name: &'a str,
    client_version: &'a str,
    captcha_sign: &'a str,
    timestamp: &'a str,
}

impl Default for CaptchaRequest<'static> {
    fn default() -> Self {
        Self {
            client_id: CLIENT_ID,
            device_id: DEVICE_ID,
            action: "get:/drive/v1/share",
            meta: CaptchaMeta {
                package_name: "pan.xunlei.com",
                client_version: "1.45.0",
                captcha_sign: "1.fe2108ad808a74c9ac0243309242726c",
                timestamp: "1645241033384",
            },
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct CaptchaResponse {
    #[serde(default)]
    pub captcha_token: Option<String>,
}

impl CaptchaResponse {
    pub(crate) fn token(&self) -> Option<&str> {
        self.captcha_token.as_deref().filter(|t| !t.is_empty())
    }
}

pub(crate) fn evaluate_share(body: &str) -> ShareStatus {
    if contains_any(body, NEGATIVE_KEYWORDS) {
        ShareStatus::Dead
    } else if body.contains("PASS_CODE_EMPTY") {
        ShareStatus::PasswordProtected
    } else {
        ShareStatus::Live
    }
}

pub struct XunleiChecker {
    http: Arc<RetryingClient>,
}

impl XunleiChecker {
    pub fn new(http: Arc<RetryingClient>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl ProviderChecker for XunleiChecker {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Xunlei
    }

    async fn check(&self, share_id: &str) -> Result<ShareStatus, CheckError> {
        let request = CaptchaRequest::default();
        let page = self
            .http
            .fetch(|client| client.post(CAPTCHA_API).json(&request))
            .await?;

        let captcha = decode_json::<CaptchaResponse>(self.kind(), &page.body).unwrap_or_default();
        let Some(token) = captcha.token() else {
            return Ok(ShareStatus::Dead);
        };

        let share = self
            .http
            .fetch(|client| {
                client
                    .get(SHARE_API)
                    .query(&[("share_id", share_id)])
                    .header("x-captcha-token", token)
                    .header("x-client-id", CLIENT_ID)
                    .header("x-device-id", DEVICE_ID)
            })
            .await?;

        Ok(evaluate_share(&share.body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_captcha_token() {
        let resp: CaptchaResponse =
            serde_json::from_str(r#"{"captcha_token":"ck.abc","expires_in":300}"#).unwrap();
        assert_eq!(resp.token(), Some("ck.abc"));

        let empty: CaptchaResponse = serde_json::from_str(r#"{"captcha_token":""}"#).unwrap();
        assert_eq!(empty.token(), None);
    }

    #[test]
    fn test_share_evaluation() {
        assert_eq!(
            evaluate_share(r#"{"share_status":"SENSITIVE_RESOURCE","pass_code_token":""}"#),
            ShareStatus::Dead
        );
        assert_eq!(
            evaluate_share(r#"{"share_status":"PASS_CODE_EMPTY"}"#),
            ShareStatus::PasswordProtected
        );
        assert_eq!(
            evaluate_share(r#"{"share_status":"OK","files":[{"name":"a"}]}"#),
            ShareStatus::Live
        );
    }

    #[test]
    fn test_captcha_request_shape() {
        let json = serde_json::to_value(CaptchaRequest::default()).unwrap();
        assert_eq!(json["client_id"], CLIENT_ID);
        assert_eq!(json["meta"]["package_name"], "pan.xunlei.com");
    }
}
