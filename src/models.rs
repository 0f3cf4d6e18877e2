//! 核心数据模型
//!
//! 与持久化层共享的实体：待处理资源、正式资源、网盘账号、网盘平台

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 待处理资源（入库队列中的候选记录）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReadyResource {
    pub id: i64,
    /// 标题（可选，夸克转存时可由分享信息补全）
    pub title: Option<String>,
    #[serde(default)]
    pub description: String,
    pub url: String,
    /// 自由文本分类名
    #[serde(default)]
    pub category: String,
    /// 自由文本标签（支持多种分隔符）
    #[serde(default)]
    pub tags: String,
    /// 封面图
    #[serde(default)]
    pub img: String,
    /// 来源（api / bot / 手工录入等）
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub extra: String,
    /// 批量提交时的分组标识
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub error_msg: String,
    pub create_time: DateTime<Utc>,
    #[serde(default)]
    pub ip: Option<String>,
}

impl ReadyResource {
    /// 以 URL 构造一条新的待处理记录
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            create_time: Utc::now(),
            ..Default::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_tags(mut self, tags: impl Into<String>) -> Self {
        self.tags = tags.into();
        self
    }
}

/// 正式资源
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub id: i64,
    pub title: String,
    pub description: String,
    /// 原始分享链接（全局唯一）
    pub url: String,
    pub pan_id: Option<i64>,
    /// 转存后的分享链接
    pub save_url: String,
    pub file_size: String,
    pub category_id: Option<i64>,
    pub view_count: i64,
    pub is_valid: bool,
    pub is_public: bool,
    pub cover: String,
    pub author: String,
    pub error_msg: String,
    /// 执行转存的账号
    pub ck_id: Option<i64>,
    /// 转存后网盘内的文件 ID（多个时逗号分隔）
    pub fid: String,
    pub key: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Default for Resource {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            title: String::new(),
            description: String::new(),
            url: String::new(),
            pan_id: None,
            save_url: String::new(),
            file_size: String::new(),
            category_id: None,
            view_count: 0,
            is_valid: true,
            is_public: true,
            cover: String::new(),
            author: String::new(),
            error_msg: String::new(),
            ck_id: None,
            fid: String::new(),
            key: String::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

impl Resource {
    /// 由待处理资源生成正式资源的初始形态
    pub fn from_ready(ready: &ReadyResource, pan_id: Option<i64>) -> Self {
        Self {
            title: ready.title.clone().unwrap_or_default(),
            description: ready.description.clone(),
            url: ready.url.clone(),
            cover: ready.img.clone(),
            key: ready.key.clone(),
            pan_id,
            ..Default::default()
        }
    }

    /// 是否已有转存副本
    pub fn is_transferred(&self) -> bool {
        !self.save_url.is_empty()
    }
}

/// 网盘账号（Cks）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: i64,
    pub pan_id: i64,
    pub idx: Option<i64>,
    /// Cookie / 会话令牌
    pub ck: String,
    pub is_valid: bool,
    /// 总空间（字节）
    pub space: i64,
    /// 剩余空间（字节）
    pub left_space: i64,
    /// 已用空间（字节）
    pub used_space: i64,
    pub username: String,
    pub vip_status: bool,
    pub service_type: String,
    pub remark: String,
}

impl Account {
    /// 日志中使用的脱敏 Cookie
    pub fn masked_cookie(&self) -> String {
        let prefix: String = self.ck.chars().take(20).collect();
        if prefix.len() < self.ck.len() {
            format!("{}...", prefix)
        } else {
            prefix
        }
    }
}

/// 网盘平台目录项（Pan）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Provider {
    pub id: i64,
    pub name: String,
    pub remark: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_from_ready() {
        let mut ready = ReadyResource::new("https://pan.baidu.com/s/1abc")
            .with_title("示例资源")
            .with_description("描述");
        ready.img = "https://img.example.com/a.png".to_string();
        ready.key = "group-1".to_string();

        let resource = Resource::from_ready(&ready, Some(3));
        assert_eq!(resource.title, "示例资源");
        assert_eq!(resource.cover, "https://img.example.com/a.png");
        assert_eq!(resource.key, "group-1");
        assert_eq!(resource.pan_id, Some(3));
        assert!(resource.is_valid);
        assert!(resource.is_public);
        assert!(!resource.is_transferred());
    }

    #[test]
    fn test_masked_cookie() {
        let account = Account {
            ck: "__pus=0123456789abcdefghijklmnop".to_string(),
            ..Default::default()
        };
        assert_eq!(account.masked_cookie(), "__pus=0123456789abcd...");

        let short = Account {
            ck: "a=1".to_string(),
            ..Default::default()
        };
        assert_eq!(short.masked_cookie(), "a=1");
    }
}
