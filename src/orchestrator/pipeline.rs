//! 采集流水线 - 编排层
//!
//! ## 流程
//!
//! 1. 检索：拿到候选文章 ID
//! 2. 分区：已在存储中的 / 新文章；新文章拉取元数据并保存
//! 3. 抓取：新文章 ∪ 缺内容且未被拉黑的已存文章，全部同时启动，
//!    并发上限由浏览器池控制；每个任务独立超时
//! 4. 持久化：章节 / 表格 / 图片，或拉黑原因
//! 5. 抽取：逐篇顺序执行（已有记录的跳过），富化后过滤
//!
//! ## 失败语义
//!
//! 单篇失败只影响该篇；只有浏览器池彻底不可用（Fatal）会中止整轮。

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use futures::future::try_join_all;
use tracing::{info, warn};

use crate::clients::{CatalogSearch, ContentStore, DenylistProvider, DurationNormalizer, EnrichmentClient};
use crate::config::Config;
use crate::error::AppResult;
use crate::infrastructure::BrowserPool;
use crate::models::{Article, FetchOutcome, FetchTarget};
use crate::services::{ContentFetcher, ExtractionEngine, PublisherKind, PublisherRouter};
use crate::workflow::{ArticleCtx, ExtractionFlow, ExtractionResult, FetchFlow};

/// 流水线依赖的外部协作方
#[derive(Clone)]
pub struct Collaborators {
    pub catalog: Arc<dyn CatalogSearch>,
    pub store: Arc<dyn ContentStore>,
    pub denylist: Arc<dyn DenylistProvider>,
    pub enrichment: Arc<dyn EnrichmentClient>,
    pub normalizer: Arc<dyn DurationNormalizer>,
}

/// 流水线参数
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub denylist_scope: String,
    /// 除黑名单提供方外额外拉黑的主机
    pub seed_denied_hosts: Vec<String>,
    /// 单篇抓取总超时
    pub fetch_timeout: Duration,
    pub navigation_timeout: Duration,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            denylist_scope: config.denylist_scope.clone(),
            seed_denied_hosts: config.denied_hosts.clone(),
            fetch_timeout: config.fetch_timeout(),
            navigation_timeout: config.navigation_timeout(),
        }
    }
}

/// 一轮运行的统计
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStats {
    pub searched: usize,
    pub new_articles: usize,
    pub fetch_targets: usize,
    pub succeeded: usize,
    pub discredited: usize,
    pub failed: usize,
    pub extracted: usize,
    pub skipped_extraction: usize,
    pub records: usize,
}

/// 一轮运行的结果：文章（附带记录）+ 统计
#[derive(Debug, Clone, Default)]
pub struct PipelineRun {
    pub articles: Vec<Article>,
    pub stats: RunStats,
}

pub struct PipelineOrchestrator {
    catalog: Arc<dyn CatalogSearch>,
    store: Arc<dyn ContentStore>,
    denylist: Arc<dyn DenylistProvider>,
    engine: Arc<ExtractionEngine>,
    fetch_flow: FetchFlow,
    extraction_flow: ExtractionFlow,
    api_kinds: Vec<PublisherKind>,
    settings: PipelineSettings,
}

impl PipelineOrchestrator {
    pub fn new(
        collaborators: Collaborators,
        pool: Arc<BrowserPool>,
        fetcher: ContentFetcher,
        settings: PipelineSettings,
    ) -> AppResult<Self> {
        let engine = Arc::new(ExtractionEngine::new()?);
        let api_kinds = fetcher.api().enabled_kinds();
        let fetch_flow = FetchFlow::new(pool, Arc::new(fetcher), settings.navigation_timeout);
        let extraction_flow = ExtractionFlow::new(
            engine.clone(),
            collaborators.store.clone(),
            collaborators.enrichment,
            collaborators.normalizer,
        );

        Ok(Self {
            catalog: collaborators.catalog,
            store: collaborators.store,
            denylist: collaborators.denylist,
            engine,
            fetch_flow,
            extraction_flow,
            api_kinds,
            settings,
        })
    }

    /// 运行一轮采集
    ///
    /// # 参数
    /// - `query`: 检索式
    /// - `page`: 页码（从1开始）
    /// - `page_size`: 每页条数
    ///
    /// # 返回
    /// 本轮涉及的全部文章（按检索顺序），附带结构化记录
    pub async fn run_acquisition_pipeline(&self, query: &str, page: usize, page_size: usize) -> AppResult<PipelineRun> {
        let mut stats = RunStats::default();

        info!("🔍 检索: \"{}\" (第 {} 页, 每页 {} 条)", query, page, page_size);
        let ids = self.catalog.search(query, page, page_size).await?;
        stats.searched = ids.len();
        if ids.is_empty() {
            warn!("⚠️ 检索无结果");
            return Ok(PipelineRun {
                articles: Vec::new(),
                stats,
            });
        }

        let mut articles = self.partition_and_load(&ids, &mut stats).await?;

        let router = self.build_router().await?;
        for article in articles.iter_mut().filter(|a| a.needs_content()) {
            article.begin_fetch();
        }
        let outcomes = self.fetch_all(&articles, &router, &mut stats).await?;
        self.persist_outcomes(&mut articles, outcomes, &mut stats).await;

        self.extract_all(&mut articles, &mut stats).await?;

        info!(
            "📊 本轮完成: 检索 {} 篇, 新增 {} 篇, 抓取 {} 篇 (成功 {}, 拉黑 {}, 失败 {}), 抽取 {} 篇, 记录 {} 条",
            stats.searched,
            stats.new_articles,
            stats.fetch_targets,
            stats.succeeded,
            stats.discredited,
            stats.failed,
            stats.extracted,
            stats.records
        );
        Ok(PipelineRun { articles, stats })
    }

    /// 已存文章直接取出，新文章拉取元数据并保存；结果保持检索顺序
    async fn partition_and_load(&self, ids: &[String], stats: &mut RunStats) -> AppResult<Vec<Article>> {
        let stored = self.store.articles_by_external_ids(ids).await?;
        let stored_ids: HashSet<String> = stored.iter().map(|a| a.external_id().to_string()).collect();
        let new_ids: Vec<String> = ids
            .iter()
            .filter(|id| !stored_ids.contains(*id))
            .cloned()
            .collect();
        info!("📂 已存 {} 篇, 新文章 {} 篇", stored.len(), new_ids.len());

        let mut new_articles = Vec::new();
        if !new_ids.is_empty() {
            let metadata = self.catalog.fetch_metadata(&new_ids).await?;
            new_articles = metadata.into_iter().map(Article::from_metadata).collect();
            self.store.save_articles(&new_articles).await?;
            info!("💾 已保存 {} 篇新文章元数据", new_articles.len());
        }
        stats.new_articles = new_articles.len();

        let mut by_id: HashMap<String, Article> = stored
            .into_iter()
            .chain(new_articles)
            .map(|a| (a.external_id().to_string(), a))
            .collect();
        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    async fn build_router(&self) -> AppResult<PublisherRouter> {
        let mut denied = self.denylist.denied_hosts(&self.settings.denylist_scope).await?;
        denied.extend(self.settings.seed_denied_hosts.iter().cloned());
        let router = PublisherRouter::new(&denied, self.api_kinds.iter().copied());
        info!(
            "🛑 黑名单主机 {} 个, 出版商 API {:?}",
            router.denied_host_count(),
            self.api_kinds
        );
        Ok(router)
    }

    /// 并发抓取所有需要内容的文章
    ///
    /// 每个任务独立超时，超时只影响该任务；Fatal 错误中止整轮。
    async fn fetch_all(
        &self,
        articles: &[Article],
        router: &PublisherRouter,
        stats: &mut RunStats,
    ) -> AppResult<Vec<(usize, FetchOutcome)>> {
        let targets: Vec<(usize, FetchTarget)> = articles
            .iter()
            .enumerate()
            .filter(|(_, article)| article.needs_content())
            .filter_map(|(idx, article)| article.fetch_target().map(|target| (idx, target)))
            .collect();
        stats.fetch_targets = targets.len();
        if targets.is_empty() {
            info!("✅ 没有需要抓取的文章");
            return Ok(Vec::new());
        }
        info!("🚀 开始抓取 {} 篇文章", targets.len());

        let total = targets.len();
        let fetch_timeout = self.settings.fetch_timeout;
        let tasks = targets.iter().enumerate().map(|(n, (idx, target))| {
            let ctx = ArticleCtx::new(n + 1, total, articles[*idx].external_id());
            async move {
                match tokio::time::timeout(fetch_timeout, self.fetch_flow.run(target, router, &ctx)).await {
                    Ok(result) => result.map(|outcome| (*idx, outcome)),
                    Err(_) => {
                        warn!("{} ⏱️ 抓取超时 ({} 秒)", ctx, fetch_timeout.as_secs());
                        Ok((
                            *idx,
                            FetchOutcome::Failed {
                                error: format!("抓取超时 ({} 秒)", fetch_timeout.as_secs()),
                            },
                        ))
                    }
                }
            }
        });

        try_join_all(tasks).await
    }

    /// 应用抓取结果并持久化；存储失败只记录警告
    async fn persist_outcomes(
        &self,
        articles: &mut [Article],
        outcomes: Vec<(usize, FetchOutcome)>,
        stats: &mut RunStats,
    ) {
        for (idx, outcome) in outcomes {
            let Some(article) = articles.get_mut(idx) else { continue };
            article.apply_outcome(&outcome);

            let saved = match &outcome {
                FetchOutcome::Succeeded(content) => {
                    stats.succeeded += 1;
                    self.store.save_chapters(article.external_id(), content).await
                }
                FetchOutcome::Discredited { reason } => {
                    stats.discredited += 1;
                    self.store.mark_discredited(article.external_id(), reason).await
                }
                FetchOutcome::Failed { .. } => {
                    stats.failed += 1;
                    Ok(())
                }
            };
            if let Err(e) = saved {
                warn!("⚠️ 保存抓取结果失败 {}: {}", article.external_id(), e);
            }
        }
    }

    /// 逐篇抽取，词表每轮只加载、编译一次
    async fn extract_all(&self, articles: &mut [Article], stats: &mut RunStats) -> AppResult<()> {
        let vocabulary = self.store.load_vocabulary().await?;
        let compiled = self.engine.compile(&vocabulary)?;

        let total = articles.len();
        for (n, article) in articles.iter_mut().enumerate() {
            let ctx = ArticleCtx::new(n + 1, total, article.external_id());
            match self.extraction_flow.run(article, &compiled, &ctx).await {
                Ok(result) => {
                    match &result {
                        ExtractionResult::AlreadyExtracted(_) => stats.skipped_extraction += 1,
                        ExtractionResult::Extracted(_) => stats.extracted += 1,
                        ExtractionResult::NoContent => {}
                    }
                    article.records = result.records().to_vec();
                    stats.records += article.records.len();
                }
                Err(e) => warn!("{} ⚠️ 抽取失败: {}", ctx, e),
            }
        }
        Ok(())
    }
}
