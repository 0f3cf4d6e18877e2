//! 网盘平台规则表
//!
//! 每个平台对应一组域名和一条分享 ID 提取正则。
//! 识别时先做域名包含判断，再用正则提取，因此构建时必须保证
//! 不同平台的域名之间互不包含，否则识别结果取决于遍历顺序。

use regex::Regex;
use thiserror::Error;

use super::ProviderKind;

/// 内置规则：(平台, 域名列表, 分享 ID 提取正则)
const BUILTIN_RULES: &[(ProviderKind, &[&str], &str)] = &[
    (
        ProviderKind::Uc,
        &["drive.uc.cn"],
        r"https?://drive\.uc\.cn/s/([a-zA-Z0-9]+)",
    ),
    (
        ProviderKind::Aliyun,
        &["aliyundrive.com", "alipan.com"],
        r"https?://(?:www\.)?(?:aliyundrive|alipan)\.com/s/([a-zA-Z0-9]+)",
    ),
    (
        ProviderKind::Quark,
        &["pan.quark.cn"],
        r"https?://(?:www\.)?pan\.quark\.cn/s/([a-zA-Z0-9]+)",
    ),
    (
        ProviderKind::Pan115,
        &["115.com", "115cdn.com", "anxia.com"],
        r"https?://(?:www\.)?(?:115|115cdn|anxia)\.com/s/([a-zA-Z0-9]+)",
    ),
    (
        ProviderKind::Pan123,
        &[
            "123684.com",
            "123685.com",
            "123912.com",
            "123pan.com",
            "123pan.cn",
            "123592.com",
        ],
        r"https?://(?:www\.)?(?:123684\.com|123685\.com|123912\.com|123pan\.com|123pan\.cn|123592\.com)/s/([a-zA-Z0-9-]+)",
    ),
    (
        ProviderKind::Tianyi,
        &["cloud.189.cn"],
        r"https?://cloud\.189\.cn/(?:t/|web/share\?code=)([a-zA-Z0-9]+)",
    ),
    (
        ProviderKind::Xunlei,
        &["pan.xunlei.com"],
        r"https?://(?:www\.)?pan\.xunlei\.com/s/([a-zA-Z0-9-]+)",
    ),
    (
        ProviderKind::Baidu,
        &["pan.baidu.com", "yun.baidu.com"],
        r"https?://(?:[a-z]+\.)?(?:pan|yun)\.baidu\.com/(?:s/|share/init\?surl=)([a-zA-Z0-9_-]+)(?:\?|$)",
    ),
];

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("平台 {kind} 的分享链接正则无效: {source}")]
    InvalidPattern {
        kind: ProviderKind,
        #[source]
        source: regex::Error,
    },

    #[error("平台 {0} 重复注册")]
    DuplicateProvider(ProviderKind),

    #[error("平台 {kind} 未配置任何域名")]
    EmptyDomains { kind: ProviderKind },

    #[error("域名冲突: {left_kind} 的 {left} 与 {right_kind} 的 {right} 存在包含关系")]
    OverlappingDomains {
        left_kind: ProviderKind,
        left: String,
        right_kind: ProviderKind,
        right: String,
    },
}

/// 单个平台的识别规则
#[derive(Debug, Clone)]
pub struct ProviderRule {
    pub kind: ProviderKind,
    pub domains: Vec<String>,
    pub pattern: Regex,
}

impl ProviderRule {
    /// 主机名是否属于该平台
    pub fn matches_host(&self, host: &str) -> bool {
        self.domains.iter().any(|d| host.contains(d.as_str()))
    }

    /// 从完整 URL 中提取非空的分享 ID
    pub fn extract_share_id(&self, url: &str) -> Option<String> {
        self.pattern
            .captures(url)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
            .filter(|id| !id.is_empty())
            .map(str::to_string)
    }
}

/// 平台规则表
#[derive(Debug, Clone)]
pub struct ProviderRegistry {
    rules: Vec<ProviderRule>,
}

impl ProviderRegistry {
    /// 使用内置规则构建
    pub fn builtin() -> Result<Self, RegistryError> {
        Self::from_rules(BUILTIN_RULES.iter().map(|(kind, domains, pattern)| {
            (*kind, domains.iter().map(|d| d.to_string()).collect(), *pattern)
        }))
    }

    /// 从规则定义构建，并校验域名互不包含
    pub fn from_rules<'a, I>(defs: I) -> Result<Self, RegistryError>
    where
        I: IntoIterator<Item = (ProviderKind, Vec<String>, &'a str)>,
    {
        let mut rules: Vec<ProviderRule> = Vec::new();

        for (kind, domains, pattern) in defs {
            if rules.iter().any(|r| r.kind == kind) {
                return Err(RegistryError::DuplicateProvider(kind));
            }

            let domains: Vec<String> = domains
                .into_iter()
                .map(|d| d.trim().to_ascii_lowercase())
                .filter(|d| !d.is_empty())
                .collect();
            if domains.is_empty() {
                return Err(RegistryError::EmptyDomains { kind });
            }

            let pattern = Regex::new(pattern)
                .map_err(|source| RegistryError::InvalidPattern { kind, source })?;

            rules.push(ProviderRule {
                kind,
                domains,
                pattern,
            });
        }

        Self::check_disjoint(&rules)?;

        Ok(Self { rules })
    }

    /// 跨平台域名两两比较，任一方包含另一方即视为冲突
    fn check_disjoint(rules: &[ProviderRule]) -> Result<(), RegistryError> {
        for (i, left) in rules.iter().enumerate() {
            for right in &rules[i + 1..] {
                for l in &left.domains {
                    for r in &right.domains {
                        if l.contains(r.as_str()) || r.contains(l.as_str()) {
                            return Err(RegistryError::OverlappingDomains {
                                left_kind: left.kind,
                                left: l.clone(),
                                right_kind: right.kind,
                                right: r.clone(),
                            });
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// 按声明顺序遍历规则
    pub fn rules(&self) -> &[ProviderRule] {
        &self.rules
    }

    pub fn rule_for(&self, kind: ProviderKind) -> Option<&ProviderRule> {
        self.rules.iter().find(|r| r.kind == kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_registry_is_valid() {
        let registry = ProviderRegistry::builtin().unwrap();
        assert_eq!(registry.rules().len(), ProviderKind::SUPPORTED.len());
        for kind in ProviderKind::SUPPORTED {
            assert!(registry.rule_for(kind).is_some(), "缺少规则: {}", kind);
        }
    }

    #[test]
    fn test_overlapping_domains_rejected() {
        let result = ProviderRegistry::from_rules(vec![
            (
                ProviderKind::Baidu,
                vec!["pan.baidu.com".to_string()],
                r"https?://pan\.baidu\.com/s/(\w+)",
            ),
            (
                ProviderKind::Xunlei,
                vec!["baidu.com".to_string()],
                r"https?://baidu\.com/s/(\w+)",
            ),
        ]);

        match result {
            Err(RegistryError::OverlappingDomains {
                left_kind,
                right_kind,
                ..
            }) => {
                assert_eq!(left_kind, ProviderKind::Baidu);
                assert_eq!(right_kind, ProviderKind::Xunlei);
            }
            other => panic!("期望域名冲突错误, 实际: {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_and_invalid_rules_rejected() {
        let dup = ProviderRegistry::from_rules(vec![
            (ProviderKind::Uc, vec!["a.cn".to_string()], r"(a)"),
            (ProviderKind::Uc, vec!["b.cn".to_string()], r"(b)"),
        ]);
        assert!(matches!(dup, Err(RegistryError::DuplicateProvider(ProviderKind::Uc))));

        let bad = ProviderRegistry::from_rules(vec![(
            ProviderKind::Uc,
            vec!["a.cn".to_string()],
            r"(unclosed",
        )]);
        assert!(matches!(bad, Err(RegistryError::InvalidPattern { .. })));

        let empty = ProviderRegistry::from_rules(vec![(ProviderKind::Uc, vec![" ".to_string()], r"(a)")]);
        assert!(matches!(empty, Err(RegistryError::EmptyDomains { .. })));
    }

    #[test]
    fn test_same_provider_domains_may_overlap() {
        // 同一平台内部的别名域名不参与冲突校验
        let registry = ProviderRegistry::from_rules(vec![(
            ProviderKind::Pan115,
            vec!["115.com".to_string(), "cdn115.com".to_string()],
            r"https?://(?:cdn)?115\.com/s/(\w+)",
        )]);
        assert!(registry.is_ok());
    }
}
