//! 内存存储：`ContentStore` + `DenylistProvider` 的进程内实现
//!
//! 可从 JSON 快照恢复，运行结束后写回快照，使重复运行保持幂等。

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::clients::{ContentStore, DenylistProvider};
use crate::error::{AppError, AppResult};
use crate::models::{Article, CandidateRecord, FetchState, FetchedContent, Vocabulary};

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    #[serde(default)]
    articles: Vec<Article>,
    #[serde(default)]
    records: BTreeMap<String, Vec<CandidateRecord>>,
    #[serde(default)]
    denylists: BTreeMap<String, Vec<String>>,
}

/// 内存存储
pub struct MemoryStore {
    articles: RwLock<HashMap<String, Article>>,
    records: RwLock<HashMap<String, Vec<CandidateRecord>>>,
    denylists: RwLock<HashMap<String, Vec<String>>>,
    vocabulary: Vocabulary,
}

impl MemoryStore {
    pub fn new(vocabulary: Vocabulary) -> Self {
        Self {
            articles: RwLock::new(HashMap::new()),
            records: RwLock::new(HashMap::new()),
            denylists: RwLock::new(HashMap::new()),
            vocabulary,
        }
    }

    /// 从快照恢复；文件不存在时返回空存储
    pub async fn load_snapshot(path: &Path, vocabulary: Vocabulary) -> AppResult<Self> {
        let store = Self::new(vocabulary);
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            debug!("快照不存在，使用空存储: {}", path.display());
            return Ok(store);
        }

        let content = tokio::fs::read_to_string(path).await?;
        let snapshot: Snapshot = serde_json::from_str(&content)?;
        info!(
            "📂 已加载快照: {} 篇文章, {} 篇有结构化记录",
            snapshot.articles.len(),
            snapshot.records.len()
        );

        {
            let mut articles = store.articles.write().await;
            for article in snapshot.articles {
                articles.insert(article.external_id().to_string(), article);
            }
        }
        store.records.write().await.extend(snapshot.records);
        store.denylists.write().await.extend(snapshot.denylists);
        Ok(store)
    }

    /// 写出快照
    pub async fn save_snapshot(&self, path: &Path) -> AppResult<()> {
        let mut articles: Vec<Article> = self.articles.read().await.values().cloned().collect();
        articles.sort_by(|a, b| a.external_id().cmp(b.external_id()));
        for article in &mut articles {
            article.records.clear();
        }

        let snapshot = Snapshot {
            articles,
            records: self.records.read().await.clone().into_iter().collect(),
            denylists: self.denylists.read().await.clone().into_iter().collect(),
        };
        let json = serde_json::to_string_pretty(&snapshot)?;
        tokio::fs::write(path, json).await?;
        info!("💾 快照已保存: {}", path.display());
        Ok(())
    }

    /// 为作用域追加被拉黑的主机
    pub async fn deny_hosts(&self, scope: &str, hosts: &[String]) {
        let mut denylists = self.denylists.write().await;
        let entry = denylists.entry(scope.to_string()).or_default();
        for host in hosts {
            if !entry.iter().any(|h| h.eq_ignore_ascii_case(host)) {
                entry.push(host.clone());
            }
        }
    }

    pub async fn article_count(&self) -> usize {
        self.articles.read().await.len()
    }

    fn missing(external_id: &str) -> AppError {
        AppError::Store(format!("文章不存在: {}", external_id))
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn articles_by_external_ids(&self, ids: &[String]) -> AppResult<Vec<Article>> {
        let articles = self.articles.read().await;
        let records = self.records.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| articles.get(id))
            .map(|article| {
                let mut article = article.clone();
                article.records = records.get(article.external_id()).cloned().unwrap_or_default();
                article
            })
            .collect())
    }

    async fn save_articles(&self, batch: &[Article]) -> AppResult<()> {
        let mut articles = self.articles.write().await;
        for article in batch {
            let mut stored = article.clone();
            stored.records.clear();
            articles.insert(stored.external_id().to_string(), stored);
        }
        Ok(())
    }

    async fn save_chapters(&self, external_id: &str, content: &FetchedContent) -> AppResult<()> {
        let mut articles = self.articles.write().await;
        let article = articles.get_mut(external_id).ok_or_else(|| Self::missing(external_id))?;
        article.chapters = content.chapters.clone();
        article.tables = content.tables.clone();
        article.images = content.images.clone();
        article.fetch_state = FetchState::Succeeded;
        article.fetched_at = Some(Utc::now());
        Ok(())
    }

    async fn mark_discredited(&self, external_id: &str, reason: &str) -> AppResult<()> {
        let mut articles = self.articles.write().await;
        let article = articles.get_mut(external_id).ok_or_else(|| Self::missing(external_id))?;
        article.fetch_state = FetchState::Discredited;
        article.discredited_reason = Some(reason.to_string());
        Ok(())
    }

    async fn save_structured_records(&self, external_id: &str, records: &[CandidateRecord]) -> AppResult<()> {
        self.records
            .write()
            .await
            .insert(external_id.to_string(), records.to_vec());
        Ok(())
    }

    async fn structured_records_by_article(&self, external_id: &str) -> AppResult<Vec<CandidateRecord>> {
        Ok(self
            .records
            .read()
            .await
            .get(external_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn load_vocabulary(&self) -> AppResult<Vocabulary> {
        Ok(self.vocabulary.clone())
    }
}

#[async_trait]
impl DenylistProvider for MemoryStore {
    async fn denied_hosts(&self, scope: &str) -> AppResult<Vec<String>> {
        Ok(self
            .denylists
            .read()
            .await
            .get(scope)
            .cloned()
            .unwrap_or_default())
    }
}
