//! 外部协作方：检索、存储、黑名单、结构富化、时长归一化
//!
//! 每个协作方都是一个 trait，具体实现由 `App` 按配置组装后注入流水线。

pub mod llm_client;
pub mod memory_store;
pub mod pubmed;
pub mod rcsb;

use async_trait::async_trait;

use crate::error::AppResult;
use crate::models::{Article, ArticleMetadata, CandidateRecord, EnrichmentResult, FetchedContent, Vocabulary};

pub use llm_client::{LlmDurationNormalizer, PatternDurationNormalizer};
pub use memory_store::MemoryStore;
pub use pubmed::PubMedCatalog;
pub use rcsb::RcsbClient;

/// 文献检索
#[async_trait]
pub trait CatalogSearch: Send + Sync {
    /// 按查询分页检索，`page` 从 1 开始
    async fn search(&self, query: &str, page: usize, page_size: usize) -> AppResult<Vec<String>>;

    /// 批量获取元数据
    async fn fetch_metadata(&self, ids: &[String]) -> AppResult<Vec<ArticleMetadata>>;
}

/// 内容存储
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// 按外部标识查询已存储的文章（不存在的标识直接忽略）
    async fn articles_by_external_ids(&self, ids: &[String]) -> AppResult<Vec<Article>>;

    /// 插入或更新文章（元数据与抓取状态）
    async fn save_articles(&self, articles: &[Article]) -> AppResult<()>;

    /// 保存章节、表格、图片，并将文章标记为已完成
    async fn save_chapters(&self, external_id: &str, content: &FetchedContent) -> AppResult<()>;

    /// 标记文章被拉黑（终态）
    async fn mark_discredited(&self, external_id: &str, reason: &str) -> AppResult<()>;

    async fn save_structured_records(&self, external_id: &str, records: &[CandidateRecord]) -> AppResult<()>;

    async fn structured_records_by_article(&self, external_id: &str) -> AppResult<Vec<CandidateRecord>>;

    /// 本次运行使用的词表
    async fn load_vocabulary(&self) -> AppResult<Vocabulary>;
}

/// 出版商黑名单
#[async_trait]
pub trait DenylistProvider: Send + Sync {
    /// 返回作用域内被拉黑的主机 / URL
    async fn denied_hosts(&self, scope: &str) -> AppResult<Vec<String>>;
}

/// 结构富化
#[async_trait]
pub trait EnrichmentClient: Send + Sync {
    async fn lookup(&self, structure_id: &str) -> AppResult<EnrichmentResult>;
}

/// 模拟时长归一化：自由文本 → 纳秒列表
#[async_trait]
pub trait DurationNormalizer: Send + Sync {
    async fn normalize(&self, sentence: &str) -> AppResult<Vec<i64>>;
}
