//! 抓取策略 - 业务能力层
//!
//! 按路由结果分派：黑名单 → Discredited；出版商 API；通用页面抓取。
//! 策略内的错误都转为 `FetchOutcome::Failed`，不会中断整个批次。

pub mod api_backed;
pub mod generic;
pub mod images;
pub mod tables;

use scraper::{ElementRef, Selector};
use tracing::warn;

use crate::error::{AppResult, ParseError};
use crate::infrastructure::PageDriver;
use crate::models::{FetchOutcome, FetchTarget};
use crate::services::publisher_router::Route;

pub use api_backed::PublisherApiClient;
pub use generic::{extract_chapters, is_blocked_title, ChapterExtraction, ChapterTier, GenericScraper};

/// 解析 CSS 选择器
pub(crate) fn selector(css: &str) -> AppResult<Selector> {
    Selector::parse(css).map_err(|e| ParseError::Selector(format!("{}: {:?}", css, e)).into())
}

/// 元素的可见文本（空白折叠）
pub(crate) fn element_text(element: &ElementRef<'_>) -> String {
    element.text().collect::<Vec<_>>().join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}

/// 按路由执行抓取策略
pub struct ContentFetcher {
    api: PublisherApiClient,
    generic: GenericScraper,
}

impl ContentFetcher {
    pub fn new(api: PublisherApiClient, generic: GenericScraper) -> Self {
        Self { api, generic }
    }

    pub fn api(&self) -> &PublisherApiClient {
        &self.api
    }

    /// 执行抓取
    ///
    /// # 参数
    /// - `route`: 路由结果（基于重定向后的 URL）
    /// - `target`: 抓取任务
    /// - `page`: 已导航到落地页的页面
    /// - `resolved_url`: 重定向后的最终 URL
    ///
    /// # 返回
    /// 每个任务恰好一个 `FetchOutcome`
    pub async fn fetch(
        &self,
        route: &Route,
        target: &FetchTarget,
        page: &dyn PageDriver,
        resolved_url: &str,
    ) -> FetchOutcome {
        let result = match route {
            Route::Denylisted { reason } => {
                return FetchOutcome::Discredited {
                    reason: reason.clone(),
                }
            }
            Route::ApiBacked(kind) => self.api.fetch(*kind, target).await,
            Route::Generic => self.generic.fetch(page, resolved_url).await,
        };

        match result {
            Ok(content) => FetchOutcome::Succeeded(content),
            Err(e) => {
                warn!("⚠️ 抓取失败 {}: {}", target.identifier(), e);
                FetchOutcome::Failed { error: e.to_string() }
            }
        }
    }
}
