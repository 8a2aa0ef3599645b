//! 导入阶段的忽略规则
//!
//! 判定顺序（先命中先返回）：白名单 IP → 方法 → 状态码 → 扩展名 → 路径前缀。
//! 白名单命中的记录永远保留，即使它同时满足后面的任何一条跳过规则。

use std::collections::HashSet;

use crate::config::IgnoreConfig;
use crate::features::logs::models::LogEntry;

/// 归一化后的不可变规则快照，启动时构造一次，之后以 `Arc` 共享只读
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterRules {
    whitelisted_ips: HashSet<String>,
    /// 小写且带前导 `.`
    skip_extensions: HashSet<String>,
    /// 大写
    skip_methods: HashSet<String>,
    skip_status_codes: HashSet<u16>,
    /// 保持配置顺序
    skip_path_prefixes: Vec<String>,
}

fn clean_tokens<'a>(raw: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    raw.into_iter()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn normalize_extension(ext: String) -> String {
    let lower = ext.to_lowercase();
    if lower.starts_with('.') {
        lower
    } else {
        format!(".{lower}")
    }
}

impl FilterRules {
    pub fn new<'a>(
        whitelisted_ips: impl IntoIterator<Item = &'a str>,
        skip_extensions: impl IntoIterator<Item = &'a str>,
        skip_methods: impl IntoIterator<Item = &'a str>,
        skip_status_codes: impl IntoIterator<Item = u16>,
        skip_path_prefixes: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        Self {
            whitelisted_ips: clean_tokens(whitelisted_ips).into_iter().collect(),
            skip_extensions: clean_tokens(skip_extensions)
                .into_iter()
                .map(normalize_extension)
                .collect(),
            skip_methods: clean_tokens(skip_methods)
                .into_iter()
                .map(|m| m.to_uppercase())
                .collect(),
            skip_status_codes: skip_status_codes.into_iter().collect(),
            skip_path_prefixes: clean_tokens(skip_path_prefixes),
        }
    }

    pub fn from_config(cfg: &IgnoreConfig) -> Self {
        Self::new(
            cfg.whitelisted_ips.iter().map(String::as_str),
            cfg.skip_extensions.iter().map(String::as_str),
            cfg.skip_methods.iter().map(String::as_str),
            cfg.skip_status_codes.iter().copied(),
            cfg.skip_path_prefixes.iter().map(String::as_str),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.whitelisted_ips.is_empty()
            && self.skip_extensions.is_empty()
            && self.skip_methods.is_empty()
            && self.skip_status_codes.is_empty()
            && self.skip_path_prefixes.is_empty()
    }

    pub fn should_skip(&self, entry: &LogEntry) -> bool {
        if self.whitelisted_ips.contains(&entry.remote_addr) {
            return false;
        }
        if !self.skip_methods.is_empty()
            && self.skip_methods.contains(&entry.method.to_uppercase())
        {
            return true;
        }
        if self.skip_status_codes.contains(&entry.status) {
            return true;
        }
        if !self.skip_extensions.is_empty() {
            if let Some(ext) = path_extension(&entry.path) {
                if self.skip_extensions.contains(&ext) {
                    return true;
                }
            }
        }
        self.skip_path_prefixes
            .iter()
            .any(|p| entry.path.starts_with(p.as_str()))
    }
}

/// 取路径最后一段中最后一个 `.` 起的扩展名（小写，含 `.`）
pub fn path_extension(path: &str) -> Option<String> {
    let segment = path.rsplit('/').next().unwrap_or(path);
    segment.rfind('.').map(|i| segment[i..].to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn entry(addr: &str, method: &str, path: &str, status: u16) -> LogEntry {
        LogEntry {
            id: 0,
            time: 0.0,
            remote_addr: addr.into(),
            host: String::new(),
            method: method.into(),
            path: path.into(),
            query: String::new(),
            protocol: String::new(),
            status,
            bytes: 0,
            city: String::new(),
            country: String::new(),
            user_agent: String::new(),
            created_at: Utc::now(),
        }
    }

    fn rules() -> FilterRules {
        FilterRules::new(
            [" 10.0.0.1 ", ""],
            ["js", ".CSS", "  "],
            ["head", " options"],
            [304],
            ["/health", "/static/"],
        )
    }

    #[test]
    fn construction_normalizes_tokens() {
        let r = rules();
        assert!(r.whitelisted_ips.contains("10.0.0.1"));
        assert_eq!(r.whitelisted_ips.len(), 1);
        assert!(r.skip_extensions.contains(".js"));
        assert!(r.skip_extensions.contains(".css"));
        assert_eq!(r.skip_extensions.len(), 2);
        assert!(r.skip_methods.contains("HEAD"));
        assert!(r.skip_methods.contains("OPTIONS"));
    }

    #[test]
    fn whitelisted_address_is_never_skipped() {
        let r = rules();
        assert!(!r.should_skip(&entry("10.0.0.1", "HEAD", "/static/app.JS", 304)));
        assert!(r.should_skip(&entry("10.0.0.2", "HEAD", "/", 200)));
    }

    #[test]
    fn extension_matches_any_case() {
        let r = rules();
        assert!(r.should_skip(&entry("1.1.1.1", "GET", "/assets/app.JS", 200)));
        assert!(r.should_skip(&entry("1.1.1.1", "GET", "/site.Css", 200)));
        assert!(!r.should_skip(&entry("1.1.1.1", "GET", "/js/index.html", 200)));
    }

    #[test]
    fn method_status_and_prefix_rules() {
        let r = rules();
        assert!(r.should_skip(&entry("1.1.1.1", "options", "/api", 200)));
        assert!(r.should_skip(&entry("1.1.1.1", "GET", "/api", 304)));
        assert!(r.should_skip(&entry("1.1.1.1", "GET", "/healthz", 200)));
        assert!(!r.should_skip(&entry("1.1.1.1", "GET", "/api/health", 200)));
    }

    #[test]
    fn empty_rules_keep_everything() {
        let r = FilterRules::default();
        assert!(r.is_empty());
        assert!(!r.should_skip(&entry("1.1.1.1", "DELETE", "/x.js", 500)));
    }

    #[test]
    fn extension_comes_from_last_segment() {
        assert_eq!(path_extension("/a.b/c"), None);
        assert_eq!(path_extension("/a/b.tar.GZ"), Some(".gz".into()));
        assert_eq!(path_extension("/"), None);
        assert_eq!(path_extension("/.env"), Some(".env".into()));
    }
}
