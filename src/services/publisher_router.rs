//! 出版商路由 - 业务能力层
//!
//! 根据导航后（重定向之后）的最终 URL 决定抓取策略。路由只在这里做一次，
//! 下游按 `Route` 分派，不再检查主机名。

use std::collections::HashSet;

use url::Url;

/// 提供 API 的出版商
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PublisherKind {
    Elsevier,
    Wiley,
}

impl PublisherKind {
    pub const ALL: [PublisherKind; 2] = [PublisherKind::Elsevier, PublisherKind::Wiley];

    /// 该出版商的落地页主机
    pub fn hosts(self) -> &'static [&'static str] {
        match self {
            PublisherKind::Elsevier => &["sciencedirect.com", "elsevier.com", "cell.com", "thelancet.com"],
            PublisherKind::Wiley => &["onlinelibrary.wiley.com", "wiley.com"],
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            PublisherKind::Elsevier => "Elsevier",
            PublisherKind::Wiley => "Wiley",
        }
    }
}

/// 路由结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// 主机在黑名单中
    Denylisted { reason: String },
    /// 通过出版商 API 获取
    ApiBacked(PublisherKind),
    /// 通用页面抓取
    Generic,
}

/// 黑名单命中时的标准原因
pub fn denylist_reason(host: &str) -> String {
    format!("publisher denylisted: {}", host)
}

/// 出版商路由器
#[derive(Debug, Clone, Default)]
pub struct PublisherRouter {
    denied_hosts: Vec<String>,
    enabled: HashSet<PublisherKind>,
}

/// 去掉协议、路径与 `www.` 前缀，得到小写主机名
fn normalize_host(entry: &str) -> Option<String> {
    let entry = entry.trim();
    if entry.is_empty() {
        return None;
    }
    let host = match Url::parse(entry) {
        Ok(url) => url.host_str()?.to_string(),
        Err(_) => entry
            .split(['/', '?', '#'])
            .next()
            .unwrap_or(entry)
            .split(':')
            .next()
            .unwrap_or(entry)
            .to_string(),
    };
    let host = host.to_lowercase();
    Some(host.strip_prefix("www.").unwrap_or(&host).to_string())
}

/// `host` 等于 `pattern` 或是其子域名
fn host_matches(host: &str, pattern: &str) -> bool {
    host == pattern || host.ends_with(&format!(".{}", pattern))
}

impl PublisherRouter {
    /// 创建路由器
    ///
    /// # 参数
    /// - `denied_hosts`: 黑名单（主机名或完整 URL）
    /// - `enabled`: 已配置凭据、可走 API 的出版商
    pub fn new(denied_hosts: &[String], enabled: impl IntoIterator<Item = PublisherKind>) -> Self {
        let mut hosts: Vec<String> = denied_hosts.iter().filter_map(|h| normalize_host(h)).collect();
        hosts.sort();
        hosts.dedup();
        Self {
            denied_hosts: hosts,
            enabled: enabled.into_iter().collect(),
        }
    }

    pub fn denied_host_count(&self) -> usize {
        self.denied_hosts.len()
    }

    /// 对最终 URL 路由
    pub fn route(&self, resolved_url: &str) -> Route {
        let Some(host) = normalize_host(resolved_url) else {
            return Route::Generic;
        };

        if let Some(pattern) = self.denied_hosts.iter().find(|p| host_matches(&host, p)) {
            return Route::Denylisted {
                reason: denylist_reason(pattern),
            };
        }

        PublisherKind::ALL
            .into_iter()
            .filter(|kind| self.enabled.contains(kind))
            .find(|kind| kind.hosts().iter().any(|p| host_matches(&host, p)))
            .map(Route::ApiBacked)
            .unwrap_or(Route::Generic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn denylist_matches_subdomains_and_urls() {
        let router = PublisherRouter::new(&["https://www.predatory.example/journals".to_string()], []);
        assert!(matches!(
            router.route("https://articles.predatory.example/a/1"),
            Route::Denylisted { .. }
        ));
        assert_eq!(router.route("https://notpredatory.example/a"), Route::Generic);
    }

    #[test]
    fn api_publishers_need_to_be_enabled() {
        let url = "https://www.sciencedirect.com/science/article/pii/S0000";
        let disabled = PublisherRouter::new(&[], []);
        assert_eq!(disabled.route(url), Route::Generic);

        let enabled = PublisherRouter::new(&[], [PublisherKind::Elsevier]);
        assert_eq!(enabled.route(url), Route::ApiBacked(PublisherKind::Elsevier));
        assert_eq!(
            enabled.route("https://onlinelibrary.wiley.com/doi/10.1002/x"),
            Route::Generic
        );
    }

    #[test]
    fn denylist_wins_over_api() {
        let router = PublisherRouter::new(&["wiley.com".to_string()], [PublisherKind::Wiley]);
        assert!(matches!(
            router.route("https://onlinelibrary.wiley.com/doi/10.1002/x"),
            Route::Denylisted { .. }
        ));
    }
}
