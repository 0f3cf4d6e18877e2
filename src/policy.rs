//! 违禁词过滤
//!
//! 命中违禁词的记录不会被直接丢弃：待处理阶段记为终态失败，
//! 转存阶段写入错误信息并排除出本轮批次。

use serde::Serialize;

/// 扫描结果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PolicyScan {
    pub matched: bool,
    /// 命中的违禁词（按配置顺序，去重）
    pub hits: Vec<String>,
}

/// 解析逗号分隔的词表（中英文逗号均可）
pub fn parse_words(raw: &str) -> Vec<String> {
    let mut words: Vec<String> = Vec::new();
    for word in raw.split(|c| c == ',' || c == '，') {
        let word = word.trim();
        if word.is_empty() || words.iter().any(|w| w.eq_ignore_ascii_case(word)) {
            continue;
        }
        words.push(word.to_string());
    }
    words
}

/// 对标题和描述做大小写不敏感的子串匹配
pub fn scan(title: &str, description: &str, words: &[String]) -> PolicyScan {
    let title = title.to_lowercase();
    let description = description.to_lowercase();

    let mut hits: Vec<String> = Vec::new();
    for word in words {
        let needle = word.to_lowercase();
        if needle.is_empty() {
            continue;
        }
        if (title.contains(&needle) || description.contains(&needle)) && !hits.contains(word) {
            hits.push(word.clone());
        }
    }

    PolicyScan {
        matched: !hits.is_empty(),
        hits,
    }
}

/// 持有一份已解析词表的过滤器
#[derive(Debug, Clone, Default)]
pub struct ContentPolicyFilter {
    words: Vec<String>,
}

impl ContentPolicyFilter {
    pub fn from_config(raw: &str) -> Self {
        Self {
            words: parse_words(raw),
        }
    }

    pub fn words(&self) -> &[String] {
        &self.words
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn scan(&self, title: &str, description: &str) -> PolicyScan {
        scan(title, description, &self.words)
    }
}
