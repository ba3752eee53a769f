//! 单篇文章抓取流程 - 流程层
//!
//! 流程顺序：
//! 1. 从浏览器池借出页面
//! 2. 导航到 DOI 落地页，拿到重定向后的 URL
//! 3. 按最终 URL 路由（黑名单 / 出版商 API / 通用抓取）
//! 4. 执行抓取策略，归还页面
//!
//! 除 `AppError::Fatal` 外的错误都转为 `FetchOutcome::Failed`。

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::error::AppResult;
use crate::infrastructure::BrowserPool;
use crate::models::{FetchOutcome, FetchTarget};
use crate::services::{ContentFetcher, PublisherRouter};
use crate::workflow::article_ctx::ArticleCtx;

/// 单篇文章抓取流程
///
/// - 持有页面的时间只限于一次抓取
/// - 不直接访问存储，结果交给编排层持久化
pub struct FetchFlow {
    pool: Arc<BrowserPool>,
    fetcher: Arc<ContentFetcher>,
    navigation_timeout: Duration,
}

impl FetchFlow {
    pub fn new(pool: Arc<BrowserPool>, fetcher: Arc<ContentFetcher>, navigation_timeout: Duration) -> Self {
        Self {
            pool,
            fetcher,
            navigation_timeout,
        }
    }

    /// 抓取一篇文章
    ///
    /// # 参数
    /// - `target`: 抓取任务
    /// - `router`: 本轮的路由表
    /// - `ctx`: 日志上下文
    ///
    /// # 返回
    /// - `Ok(outcome)`: 每个任务恰好一个结果
    /// - `Err`: 仅在浏览器池彻底不可用时（Fatal）
    pub async fn run(&self, target: &FetchTarget, router: &PublisherRouter, ctx: &ArticleCtx) -> AppResult<FetchOutcome> {
        info!("{} 📄 开始抓取: {}", ctx, target.display_title());

        let mut handle = match self.pool.acquire().await {
            Ok(handle) => handle,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!("{} ⚠️ 获取页面失败: {}", ctx, e);
                return Ok(FetchOutcome::Failed { error: e.to_string() });
            }
        };

        let resolved_url = match handle
            .page_mut()
            .navigate(target.canonical_url(), self.navigation_timeout)
            .await
        {
            Ok(url) => url,
            Err(e) => {
                warn!("{} ⚠️ 导航失败 {}: {}", ctx, target.canonical_url(), e);
                self.pool.release(handle).await;
                return Ok(FetchOutcome::Failed { error: e.to_string() });
            }
        };

        let route = router.route(&resolved_url);
        info!("{} 🔍 落地页 {} → {:?}", ctx, resolved_url, route);

        let outcome = self
            .fetcher
            .fetch(&route, target, handle.page(), &resolved_url)
            .await;
        self.pool.release(handle).await;

        match &outcome {
            FetchOutcome::Succeeded(content) => info!(
                "{} ✅ 抓取成功: {} 章节, {} 表格, {} 图片",
                ctx,
                content.chapters.len(),
                content.tables.len(),
                content.images.len()
            ),
            FetchOutcome::Discredited { reason } => info!("{} 🛑 已拉黑: {}", ctx, reason),
            FetchOutcome::Failed { error } => warn!("{} ❌ 抓取失败: {}", ctx, error),
        }
        Ok(outcome)
    }
}
