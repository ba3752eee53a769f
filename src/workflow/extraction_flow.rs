//! 单篇文章抽取流程 - 流程层
//!
//! 已有结构化记录的文章直接跳过（重复运行不重新推导），
//! 没有章节的文章本轮不抽取。否则：抽取 → 富化过滤 → 保存。

use std::sync::Arc;

use tracing::info;

use crate::clients::{ContentStore, DurationNormalizer, EnrichmentClient};
use crate::error::AppResult;
use crate::models::{Article, CandidateRecord};
use crate::services::extraction::CompiledVocabulary;
use crate::services::{enrich_and_filter, ExtractionEngine};
use crate::workflow::article_ctx::ArticleCtx;

/// 抽取结果
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionResult {
    /// 存储中已有记录
    AlreadyExtracted(Vec<CandidateRecord>),
    /// 没有章节内容
    NoContent,
    /// 本轮新抽取的记录（可能为空）
    Extracted(Vec<CandidateRecord>),
}

impl ExtractionResult {
    pub fn records(&self) -> &[CandidateRecord] {
        match self {
            ExtractionResult::AlreadyExtracted(records) | ExtractionResult::Extracted(records) => records,
            ExtractionResult::NoContent => &[],
        }
    }
}

pub struct ExtractionFlow {
    engine: Arc<ExtractionEngine>,
    store: Arc<dyn ContentStore>,
    enrichment: Arc<dyn EnrichmentClient>,
    normalizer: Arc<dyn DurationNormalizer>,
}

impl ExtractionFlow {
    pub fn new(
        engine: Arc<ExtractionEngine>,
        store: Arc<dyn ContentStore>,
        enrichment: Arc<dyn EnrichmentClient>,
        normalizer: Arc<dyn DurationNormalizer>,
    ) -> Self {
        Self {
            engine,
            store,
            enrichment,
            normalizer,
        }
    }

    /// 处理一篇文章
    ///
    /// # 参数
    /// - `article`: 已应用抓取结果的文章
    /// - `vocabulary`: 本轮已编译词表
    /// - `ctx`: 日志上下文
    pub async fn run(
        &self,
        article: &Article,
        vocabulary: &CompiledVocabulary,
        ctx: &ArticleCtx,
    ) -> AppResult<ExtractionResult> {
        let existing = self
            .store
            .structured_records_by_article(article.external_id())
            .await?;
        if !existing.is_empty() {
            info!("{} 已有 {} 条结构化记录，跳过抽取", ctx, existing.len());
            return Ok(ExtractionResult::AlreadyExtracted(existing));
        }

        if article.chapters.is_empty() {
            return Ok(ExtractionResult::NoContent);
        }

        let text = article.full_text();
        let candidates = self
            .engine
            .extract(&text, vocabulary, self.normalizer.as_ref())
            .await;
        let candidate_count = candidates.len();
        let records = enrich_and_filter(candidates, self.enrichment.as_ref()).await;

        if !records.is_empty() {
            self.store
                .save_structured_records(article.external_id(), &records)
                .await?;
        }
        info!(
            "{} 💾 抽取完成: 候选 {} 条，保留 {} 条",
            ctx,
            candidate_count,
            records.len()
        );
        Ok(ExtractionResult::Extracted(records))
    }
}
