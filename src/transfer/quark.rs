//! 夸克网盘转存客户端
//!
//! 流程：换取 stoken → 读取分享详情 → 转存 → 轮询任务 → 清理广告文件
//! → 创建新分享 → 轮询任务 → 读取分享链接与提取码。
//!
//! 每次调用都显式传入账号 Cookie，客户端本身不保存会话状态。

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use super::{ShareTransfer, TransferError, TransferOutcome};
use crate::config::{HttpConfig, SchedulerConfig};
use crate::models::Account;
use crate::policy::parse_words;
use crate::repository::SystemConfigRepository;

const API_BASE: &str = "https://drive-pc.quark.cn/1/clouddrive";

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// 任务完成状态
const TASK_DONE: i64 = 2;

const GUEST_LOGIN_MESSAGE: &str = "require login [guest]";

/// 统一响应包装 `{status, message, data}`
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    status: i64,
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: serde_json::Value,
}

#[derive(Debug, Default, Deserialize)]
struct TokenData {
    #[serde(default)]
    stoken: String,
}

#[derive(Debug, Default, Deserialize)]
struct DetailData {
    #[serde(default)]
    share: DetailShare,
    #[serde(default)]
    list: Vec<ShareItem>,
}

#[derive(Debug, Default, Deserialize)]
struct DetailShare {
    #[serde(default)]
    title: String,
}

#[derive(Debug, Default, Deserialize)]
struct ShareItem {
    #[serde(default)]
    fid: String,
    #[serde(default)]
    share_fid_token: String,
}

#[derive(Debug, Default, Deserialize)]
struct TaskRef {
    #[serde(default)]
    task_id: String,
}

#[derive(Debug, Default, Deserialize)]
struct TaskData {
    #[serde(default)]
    status: i64,
    #[serde(default)]
    share_id: String,
    #[serde(default)]
    save_as: SaveAs,
}

#[derive(Debug, Default, Deserialize)]
struct SaveAs {
    #[serde(default)]
    save_as_top_fids: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct PasswordData {
    #[serde(default)]
    share_url: String,
    #[serde(default)]
    share_title: String,
    #[serde(default)]
    code: String,
    #[serde(default)]
    first_file: FirstFile,
}

#[derive(Debug, Default, Deserialize)]
struct FirstFile {
    #[serde(default)]
    fid: String,
}

#[derive(Debug, Default, Deserialize)]
struct FileListData {
    #[serde(default)]
    list: Vec<DirEntry>,
}

#[derive(Debug, Default, Deserialize)]
struct DirEntry {
    #[serde(default)]
    fid: String,
    #[serde(default)]
    file_name: String,
}

/// 解析响应包装，非 200 状态转为业务错误
fn decode_envelope<T: DeserializeOwned>(body: &str) -> Result<T, TransferError> {
    let envelope: Envelope =
        serde_json::from_str(body).map_err(|e| TransferError::ParseError(e.to_string()))?;

    if envelope.status != 200 {
        let message = if envelope.message == GUEST_LOGIN_MESSAGE {
            "夸克未登录，请检查cookie".to_string()
        } else {
            envelope.message
        };
        return Err(TransferError::Api(message));
    }

    serde_json::from_value(envelope.data).map_err(|e| TransferError::ParseError(e.to_string()))
}

/// 任务查询错误：容量上限单独归类
fn map_task_error(err: TransferError) -> TransferError {
    match err {
        TransferError::Api(msg) if msg.contains("capacity limit") => {
            TransferError::CapacityExhausted
        }
        other => other,
    }
}

/// 多个顶层文件时记录全部 ID，否则使用新分享的首个文件
fn resolve_fid(top_fids: &[String], first_file_fid: &str) -> String {
    if top_fids.len() > 1 {
        top_fids.join(",")
    } else {
        first_file_fid.to_string()
    }
}

fn is_ad_file(file_name: &str, keywords: &[String]) -> bool {
    let name = file_name.to_lowercase();
    keywords
        .iter()
        .any(|k| !k.is_empty() && name.contains(&k.to_lowercase()))
}

fn default_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::ACCEPT,
        HeaderValue::from_static("application/json, text/plain, */*"),
    );
    headers.insert(
        header::ACCEPT_LANGUAGE,
        HeaderValue::from_static("zh-CN,zh;q=0.9"),
    );
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json;charset=UTF-8"),
    );
    headers.insert(header::REFERER, HeaderValue::from_static("https://pan.quark.cn/"));
    headers.insert("sec-fetch-dest", HeaderValue::from_static("empty"));
    headers.insert("sec-fetch-mode", HeaderValue::from_static("cors"));
    headers.insert("sec-fetch-site", HeaderValue::from_static("same-site"));
    headers
}

pub struct QuarkTransferClient {
    client: Client,
    poll_attempts: u32,
    poll_interval: Duration,
    /// 广告关键词来源，未设置时跳过清理
    system_config: Option<Arc<dyn SystemConfigRepository>>,
}

impl QuarkTransferClient {
    pub fn new(http: &HttpConfig, scheduler: &SchedulerConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(http.timeout())
            .user_agent(USER_AGENT)
            .default_headers(default_headers())
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            poll_attempts: scheduler.task_poll_attempts.max(1),
            poll_interval: scheduler.task_poll_interval(),
            system_config: None,
        })
    }

    pub fn with_system_config(mut self, system_config: Arc<dyn SystemConfigRepository>) -> Self {
        self.system_config = Some(system_config);
        self
    }

    fn get(&self, account: &Account, path: &str) -> RequestBuilder {
        self.client
            .get(format!("{}/{}", API_BASE, path))
            .header(header::COOKIE, account.ck.as_str())
            .query(&[("pr", "ucpro"), ("fr", "pc"), ("uc_param_str", "")])
    }

    fn post(&self, account: &Account, path: &str) -> RequestBuilder {
        self.client
            .post(format!("{}/{}", API_BASE, path))
            .header(header::COOKIE, account.ck.as_str())
            .query(&[("pr", "ucpro"), ("fr", "pc"), ("uc_param_str", "")])
    }

    async fn call<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, TransferError> {
        let body = request.send().await?.text().await?;
        decode_envelope(&body)
    }

    async fn fetch_stoken(&self, account: &Account, share_id: &str) -> Result<String, TransferError> {
        let data: TokenData = self
            .call(
                self.post(account, "share/sharepage/token")
                    .json(&json!({ "pwd_id": share_id, "passcode": "" })),
            )
            .await?;
        Ok(data.stoken.replace(' ', "+"))
    }

    async fn fetch_detail(
        &self,
        account: &Account,
        share_id: &str,
        stoken: &str,
    ) -> Result<DetailData, TransferError> {
        self.call(self.get(account, "share/sharepage/detail").query(&[
            ("pwd_id", share_id),
            ("stoken", stoken),
            ("pdir_fid", "0"),
            ("force", "0"),
            ("_page", "1"),
            ("_size", "100"),
            ("_fetch_banner", "1"),
            ("_fetch_share", "1"),
            ("_fetch_total", "1"),
            ("_sort", "file_type:asc,updated_at:desc"),
        ]))
        .await
    }

    async fn save(
        &self,
        account: &Account,
        share_id: &str,
        stoken: &str,
        items: &[ShareItem],
    ) -> Result<String, TransferError> {
        let fid_list: Vec<&str> = items.iter().map(|i| i.fid.as_str()).collect();
        let fid_token_list: Vec<&str> = items.iter().map(|i| i.share_fid_token.as_str()).collect();

        let task: TaskRef = self
            .call(self.post(account, "share/sharepage/save").json(&json!({
                "pwd_id": share_id,
                "stoken": stoken,
                "fid_list": fid_list,
                "fid_token_list": fid_token_list,
                "to_pdir_fid": "0",
            })))
            .await?;
        Ok(task.task_id)
    }

    async fn wait_for_task(&self, account: &Account, task_id: &str) -> Result<TaskData, TransferError> {
        for retry_index in 0..self.poll_attempts {
            let retry = retry_index.to_string();
            let timestamp = chrono::Utc::now().timestamp_millis().to_string();
            let task: TaskData = self
                .call(self.get(account, "task").query(&[
                    ("task_id", task_id),
                    ("retry_index", retry.as_str()),
                    ("__dt", "21192"),
                    ("__t", timestamp.as_str()),
                ]))
                .await
                .map_err(map_task_error)?;

            if task.status == TASK_DONE {
                debug!("任务完成: task_id={}, 第 {} 次查询", task_id, retry_index + 1);
                return Ok(task);
            }

            tokio::time::sleep(self.poll_interval).await;
        }

        Err(TransferError::TaskTimeout)
    }

    async fn list_dir(&self, account: &Account, pdir_fid: &str) -> Result<Vec<DirEntry>, TransferError> {
        let data: FileListData = self
            .call(self.get(account, "file/sort").query(&[
                ("pdir_fid", pdir_fid),
                ("_page", "1"),
                ("_size", "50"),
                ("_fetch_total", "1"),
                ("_fetch_sub_dirs", "0"),
                ("_sort", "file_type:asc,updated_at:desc"),
            ]))
            .await?;
        Ok(data.list)
    }

    async fn delete_file(&self, account: &Account, fid: &str) -> Result<(), TransferError> {
        let _: serde_json::Value = self
            .call(self.post(account, "file/delete").json(&json!({
                "action_type": 2,
                "filelist": [fid],
                "exclude_fids": [],
            })))
            .await?;
        Ok(())
    }

    /// 删除转存目录中文件名命中广告关键词的文件，失败只记录日志
    async fn remove_ad_files(&self, account: &Account, pdir_fid: &str) {
        let Some(system_config) = &self.system_config else {
            return;
        };

        let keywords = match system_config.ad_keywords().await {
            Ok(raw) => parse_words(&raw),
            Err(e) => {
                warn!("读取广告关键词失败: {}", e);
                return;
            }
        };
        if keywords.is_empty() {
            return;
        }

        let entries = match self.list_dir(account, pdir_fid).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!("获取目录文件失败: pdir_fid={}, 错误: {}", pdir_fid, e);
                return;
            }
        };

        for entry in entries.iter().filter(|e| is_ad_file(&e.file_name, &keywords)) {
            match self.delete_file(account, &entry.fid).await {
                Ok(()) => info!("已删除广告文件: {} ({})", entry.file_name, entry.fid),
                Err(e) => warn!("删除广告文件失败: {}, 错误: {}", entry.file_name, e),
            }
        }
    }

    async fn create_share(
        &self,
        account: &Account,
        fids: &[String],
        title: &str,
    ) -> Result<String, TransferError> {
        let task: TaskRef = self
            .call(self.post(account, "share").json(&json!({
                "fid_list": fids,
                "title": title,
                "url_type": 1,
                "expired_type": 1,
            })))
            .await?;
        Ok(task.task_id)
    }

    async fn fetch_password(&self, account: &Account, share_id: &str) -> Result<PasswordData, TransferError> {
        self.call(
            self.post(account, "share/password")
                .json(&json!({ "share_id": share_id })),
        )
        .await
    }
}

#[async_trait]
impl ShareTransfer for QuarkTransferClient {
    async fn transfer(
        &self,
        account: &Account,
        share_id: &str,
    ) -> Result<TransferOutcome, TransferError> {
        info!(
            "开始转存夸克分享: share_id={}, 账号={}",
            share_id,
            account.masked_cookie()
        );

        let stoken = self.fetch_stoken(account, share_id).await?;
        let detail = self.fetch_detail(account, share_id, &stoken).await?;
        if detail.list.is_empty() {
            return Err(TransferError::EmptyShare);
        }

        let save_task = self.save(account, share_id, &stoken, &detail.list).await?;
        let saved = self.wait_for_task(account, &save_task).await?;
        let top_fids = saved.save_as.save_as_top_fids;
        let Some(first_dir) = top_fids.first() else {
            return Err(TransferError::ParseError("转存结果缺少文件ID".to_string()));
        };

        self.remove_ad_files(account, first_dir).await;

        let share_task = self.create_share(account, &top_fids, &detail.share.title).await?;
        let shared = self.wait_for_task(account, &share_task).await?;
        let password = self.fetch_password(account, &shared.share_id).await?;

        let outcome = TransferOutcome {
            fid: resolve_fid(&top_fids, &password.first_file.fid),
            share_url: password.share_url,
            title: password.share_title,
            code: password.code,
        };
        info!("转存完成: {} -> {}", share_id, outcome.share_url);
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_envelope_ok() {
        let body = r#"{"status":200,"message":"ok","data":{"stoken":"a b"}}"#;
        let data: TokenData = decode_envelope(body).unwrap();
        assert_eq!(data.stoken, "a b");
    }

    #[test]
    fn test_decode_envelope_api_error() {
        let body = r#"{"status":404,"message":"分享不存在","data":null}"#;
        let err = decode_envelope::<TokenData>(body).unwrap_err();
        assert_eq!(err, TransferError::Api("分享不存在".to_string()));

        let body = r#"{"status":401,"message":"require login [guest]"}"#;
        let err = decode_envelope::<TokenData>(body).unwrap_err();
        assert_eq!(err.to_string(), "夸克未登录，请检查cookie");
    }

    #[test]
    fn test_decode_envelope_malformed() {
        assert!(matches!(
            decode_envelope::<TokenData>("<html>"),
            Err(TransferError::ParseError(_))
        ));
    }

    #[test]
    fn test_decode_task_payload() {
        let body = r#"{"status":200,"message":"","data":{"status":2,"share_id":"s1","save_as":{"save_as_top_fids":["f1","f2"]}}}"#;
        let task: TaskData = decode_envelope(body).unwrap();
        assert_eq!(task.status, TASK_DONE);
        assert_eq!(task.share_id, "s1");
        assert_eq!(task.save_as.save_as_top_fids, vec!["f1", "f2"]);
    }

    #[test]
    fn test_map_task_error() {
        let err = map_task_error(TransferError::Api("capacity limit[{0}]".to_string()));
        assert_eq!(err, TransferError::CapacityExhausted);
        assert_eq!(err.to_string(), "容量不足");

        let err = map_task_error(TransferError::Api("其他".to_string()));
        assert_eq!(err, TransferError::Api("其他".to_string()));
    }

    #[test]
    fn test_resolve_fid() {
        let many = vec!["a".to_string(), "b".to_string()];
        assert_eq!(resolve_fid(&many, "x"), "a,b");
        assert_eq!(resolve_fid(&["a".to_string()], "x"), "x");
        assert_eq!(resolve_fid(&[], "x"), "x");
    }

    #[test]
    fn test_is_ad_file() {
        let keywords = parse_words("广告,QQ群，Promo");
        assert!(is_ad_file("加QQ群获取更多.txt", &keywords));
        assert!(is_ad_file("promo_link.url", &keywords));
        assert!(!is_ad_file("电影.mkv", &keywords));
        assert!(!is_ad_file("任何文件", &[]));
    }
}
