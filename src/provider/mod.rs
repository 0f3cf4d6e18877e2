// 网盘平台识别模块

pub mod classifier;
pub mod registry;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub use classifier::{ClassifiedLink, ShareLinkClassifier};
pub use registry::{ProviderRegistry, ProviderRule, RegistryError};

/// 支持的网盘平台
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Uc,
    Aliyun,
    Quark,
    #[serde(rename = "115")]
    Pan115,
    #[serde(rename = "123pan")]
    Pan123,
    Tianyi,
    Xunlei,
    Baidu,
    /// 无法识别的链接
    #[serde(rename = "notfound")]
    NotFound,
}

impl ProviderKind {
    /// 所有可识别的平台（不含 NotFound）
    pub const SUPPORTED: [ProviderKind; 8] = [
        ProviderKind::Uc,
        ProviderKind::Aliyun,
        ProviderKind::Quark,
        ProviderKind::Pan115,
        ProviderKind::Pan123,
        ProviderKind::Tianyi,
        ProviderKind::Xunlei,
        ProviderKind::Baidu,
    ];

    /// 平台标签
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Uc => "uc",
            ProviderKind::Aliyun => "aliyun",
            ProviderKind::Quark => "quark",
            ProviderKind::Pan115 => "115",
            ProviderKind::Pan123 => "123pan",
            ProviderKind::Tianyi => "tianyi",
            ProviderKind::Xunlei => "xunlei",
            ProviderKind::Baidu => "baidu",
            ProviderKind::NotFound => "notfound",
        }
    }

    /// 平台目录（pans 表）中对应的名称
    pub fn catalog_name(&self) -> &'static str {
        match self {
            ProviderKind::NotFound => OTHER_CATALOG_NAME,
            other => other.as_str(),
        }
    }

    /// 中文名称
    pub fn label(&self) -> &'static str {
        match self {
            ProviderKind::Uc => "UC网盘",
            ProviderKind::Aliyun => "阿里云盘",
            ProviderKind::Quark => "夸克网盘",
            ProviderKind::Pan115 => "115网盘",
            ProviderKind::Pan123 => "123云盘",
            ProviderKind::Tianyi => "天翼云盘",
            ProviderKind::Xunlei => "迅雷云盘",
            ProviderKind::Baidu => "百度网盘",
            ProviderKind::NotFound => "未知平台",
        }
    }

    /// 是否支持账号转存
    pub fn is_elastic(&self) -> bool {
        matches!(self, ProviderKind::Quark)
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, ProviderKind::NotFound)
    }
}

/// 兜底平台名称
pub const OTHER_CATALOG_NAME: &str = "other";

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("未知的网盘类型: {0}")]
pub struct UnknownProvider(pub String);

impl FromStr for ProviderKind {
    type Err = UnknownProvider;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "uc" => Ok(ProviderKind::Uc),
            // 阿里云盘的新旧两个品牌名
            "aliyun" | "alipan" => Ok(ProviderKind::Aliyun),
            "quark" => Ok(ProviderKind::Quark),
            "115" => Ok(ProviderKind::Pan115),
            "123pan" => Ok(ProviderKind::Pan123),
            "tianyi" => Ok(ProviderKind::Tianyi),
            "xunlei" => Ok(ProviderKind::Xunlei),
            "baidu" => Ok(ProviderKind::Baidu),
            "notfound" => Ok(ProviderKind::NotFound),
            other => Err(UnknownProvider(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_round_trip() {
        for kind in ProviderKind::SUPPORTED {
            assert_eq!(kind.as_str().parse::<ProviderKind>().unwrap(), kind);
        }
        assert_eq!("alipan".parse::<ProviderKind>().unwrap(), ProviderKind::Aliyun);
        assert!("dropbox".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn test_catalog_name() {
        assert_eq!(ProviderKind::Pan123.catalog_name(), "123pan");
        assert_eq!(ProviderKind::NotFound.catalog_name(), "other");
    }

    #[test]
    fn test_only_quark_is_elastic() {
        let elastic: Vec<_> = ProviderKind::SUPPORTED
            .iter()
            .filter(|k| k.is_elastic())
            .collect();
        assert_eq!(elastic, vec![&ProviderKind::Quark]);
    }

    #[test]
    fn test_serde_uses_tags() {
        let json = serde_json::to_string(&ProviderKind::Pan115).unwrap();
        assert_eq!(json, "\"115\"");
        let kind: ProviderKind = serde_json::from_str("\"123pan\"").unwrap();
        assert_eq!(kind, ProviderKind::Pan123);
    }
}
