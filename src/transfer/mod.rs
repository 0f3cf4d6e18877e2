// 转存模块
//
// 使用账号 Cookie 将分享内容转存到自己的网盘，并生成新的分享链接

pub mod quark;

use async_trait::async_trait;

use crate::models::Account;

pub use quark::QuarkTransferClient;

/// 转存结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferOutcome {
    /// 新生成的分享链接
    pub share_url: String,
    /// 分享标题
    pub title: String,
    /// 转存后的文件 ID（多个时逗号分隔）
    pub fid: String,
    /// 提取码
    pub code: String,
}

/// 转存错误类型
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    /// 平台接口返回的业务错误
    Api(String),
    /// 账号空间不足
    CapacityExhausted,
    /// 转存或分享任务轮询超时
    TaskTimeout,
    /// 分享中没有可转存的文件
    EmptyShare,
    /// 网络错误
    NetworkError(String),
    /// 解析错误
    ParseError(String),
}

impl std::fmt::Display for TransferError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransferError::Api(msg) => write!(f, "{}", msg),
            TransferError::CapacityExhausted => write!(f, "容量不足"),
            TransferError::TaskTimeout => write!(f, "任务超时"),
            TransferError::EmptyShare => write!(f, "分享内容为空"),
            TransferError::NetworkError(msg) => write!(f, "网络错误: {}", msg),
            TransferError::ParseError(msg) => write!(f, "解析错误: {}", msg),
        }
    }
}

impl std::error::Error for TransferError {}

impl From<reqwest::Error> for TransferError {
    fn from(e: reqwest::Error) -> Self {
        TransferError::NetworkError(e.to_string())
    }
}

/// 支持账号转存的平台客户端
#[async_trait]
pub trait ShareTransfer: Send + Sync {
    async fn transfer(&self, account: &Account, share_id: &str)
        -> Result<TransferOutcome, TransferError>;
}
