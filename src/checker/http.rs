//! 链接检测共用的 HTTP 客户端
//!
//! 固定超时，传输层错误按指数退避重试（2s 起步，封顶 10s）。
//! 业务层面的失效判断由各平台检测器完成，这里只关心请求能否送达。

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{Client, RequestBuilder, StatusCode};
use tracing::{debug, warn};

use crate::config::HttpConfig;

/// 桌面浏览器 User-Agent
pub const DESKTOP_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// 移动端 User-Agent
pub const MOBILE_USER_AGENT: &str = "Mozilla/5.0 (Linux; Android 10; SM-G975F) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/87.0.4280.101 Mobile Safari/537.36";

/// 已读取完毕的响应
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub status: StatusCode,
    pub body: String,
}

/// 带重试的 HTTP 客户端
#[derive(Debug, Clone)]
pub struct RetryingClient {
    client: Client,
    policy: HttpConfig,
}

impl RetryingClient {
    pub fn new(policy: &HttpConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(policy.timeout())
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            policy: policy.clone(),
        })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// 发送请求并读取响应体
    ///
    /// `build` 每次重试都会被调用一次，以便重新构造请求。
    pub async fn fetch<F>(&self, build: F) -> Result<FetchedPage, reqwest::Error>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let mut attempt = 0u32;
        loop {
            match Self::send_once(build(&self.client)).await {
                Ok(page) => {
                    debug!("请求完成: status={}, body_len={}", page.status, page.body.len());
                    return Ok(page);
                }
                Err(e) if attempt < self.policy.retry_count => {
                    let wait = self.backoff(attempt);
                    warn!(
                        "请求失败，{:?} 后进行第 {} 次重试: {}",
                        wait,
                        attempt + 1,
                        e
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn send_once(request: RequestBuilder) -> Result<FetchedPage, reqwest::Error> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        Ok(FetchedPage { status, body })
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.policy.retry_backoff(attempt)
    }
}
