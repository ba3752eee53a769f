//! 集成测试共用的模拟协作方
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};

use md_harvest::clients::{CatalogSearch, EnrichmentClient};
use md_harvest::error::{AppError, AppResult, BrowserError};
use md_harvest::infrastructure::{BrowserLauncher, BrowserSession, PageDriver};
use md_harvest::models::{ArticleMetadata, EnrichmentField, EnrichmentResult};

// ========== 浏览器 ==========

/// 模拟站点：重定向、页面内容、导航失败与慢速页面
#[derive(Default)]
pub struct MockSite {
    pub redirects: HashMap<String, String>,
    pub pages: HashMap<String, String>,
    pub failing: HashSet<String>,
    pub slow: HashMap<String, Duration>,
    pub navigation_delay: Duration,
}

impl MockSite {
    pub fn redirect(mut self, from: &str, to: &str) -> Self {
        self.redirects.insert(from.to_string(), to.to_string());
        self
    }

    pub fn page(mut self, url: &str, html: &str) -> Self {
        self.pages.insert(url.to_string(), html.to_string());
        self
    }

    pub fn failing(mut self, url: &str) -> Self {
        self.failing.insert(url.to_string());
        self
    }

    pub fn slow(mut self, url: &str, delay: Duration) -> Self {
        self.slow.insert(url.to_string(), delay);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.navigation_delay = delay;
        self
    }
}

/// 浏览器侧计数器
#[derive(Default)]
pub struct BrowserStats {
    pub launches: AtomicUsize,
    /// 接下来这么多次启动会失败
    pub failing_launches: AtomicUsize,
    /// 启动编号 ≤ 此值的浏览器视为已崩溃
    pub crashed_upto: AtomicUsize,
    pub open_pages: AtomicUsize,
    pub peak_pages: AtomicUsize,
    pub pages_created: AtomicUsize,
}

impl BrowserStats {
    /// 让当前浏览器"崩溃"
    pub fn crash(&self) {
        self.crashed_upto
            .store(self.launches.load(Ordering::SeqCst), Ordering::SeqCst);
    }
}

pub struct MockLauncher {
    pub stats: Arc<BrowserStats>,
    site: Arc<MockSite>,
}

impl MockLauncher {
    pub fn new(site: MockSite) -> Self {
        Self {
            stats: Arc::new(BrowserStats::default()),
            site: Arc::new(site),
        }
    }
}

#[async_trait]
impl BrowserLauncher for MockLauncher {
    async fn launch(&self) -> AppResult<Arc<dyn BrowserSession>> {
        let pending_failures = self.stats.failing_launches.load(Ordering::SeqCst);
        if pending_failures > 0 {
            self.stats
                .failing_launches
                .store(pending_failures - 1, Ordering::SeqCst);
            return Err(AppError::Browser(BrowserError::LaunchFailed {
                reason: "模拟启动失败".into(),
            }));
        }
        let generation = self.stats.launches.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Arc::new(MockSession {
            generation,
            stats: self.stats.clone(),
            site: self.site.clone(),
        }))
    }
}

struct MockSession {
    generation: usize,
    stats: Arc<BrowserStats>,
    site: Arc<MockSite>,
}

impl MockSession {
    fn alive(&self) -> bool {
        self.generation > self.stats.crashed_upto.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrowserSession for MockSession {
    async fn is_connected(&self) -> bool {
        self.alive()
    }

    async fn new_page(&self, _user_agent: &str) -> AppResult<Box<dyn PageDriver>> {
        if !self.alive() {
            return Err(AppError::Browser(BrowserError::PageCreationFailed {
                reason: "浏览器已断开".into(),
            }));
        }
        let open = self.stats.open_pages.fetch_add(1, Ordering::SeqCst) + 1;
        self.stats.peak_pages.fetch_max(open, Ordering::SeqCst);
        self.stats.pages_created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockPage {
            stats: self.stats.clone(),
            site: self.site.clone(),
            current_url: String::new(),
        }))
    }

    async fn shutdown(&self) {}
}

struct MockPage {
    stats: Arc<BrowserStats>,
    site: Arc<MockSite>,
    current_url: String,
}

#[async_trait]
impl PageDriver for MockPage {
    async fn navigate(&mut self, url: &str, _timeout: Duration) -> AppResult<String> {
        let delay = self.site.slow.get(url).copied().unwrap_or(self.site.navigation_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.site.failing.contains(url) {
            return Err(AppError::navigation_failed(url, "模拟导航失败"));
        }
        self.current_url = self
            .site
            .redirects
            .get(url)
            .cloned()
            .unwrap_or_else(|| url.to_string());
        Ok(self.current_url.clone())
    }

    async fn eval(&self, _script: &str) -> AppResult<JsonValue> {
        Ok(json!(0))
    }

    async fn html(&self) -> AppResult<String> {
        Ok(self
            .site
            .pages
            .get(&self.current_url)
            .cloned()
            .unwrap_or_else(|| "<html><body></body></html>".to_string()))
    }

    async fn close(self: Box<Self>) {
        self.stats.open_pages.fetch_sub(1, Ordering::SeqCst);
    }
}

// ========== 检索 ==========

pub struct MockCatalog {
    ids: Vec<String>,
    metadata: HashMap<String, ArticleMetadata>,
    pub metadata_requests: Mutex<Vec<Vec<String>>>,
}

impl MockCatalog {
    pub fn new(articles: Vec<ArticleMetadata>) -> Self {
        Self {
            ids: articles.iter().map(|a| a.external_id.clone()).collect(),
            metadata: articles
                .into_iter()
                .map(|a| (a.external_id.clone(), a))
                .collect(),
            metadata_requests: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl CatalogSearch for MockCatalog {
    async fn search(&self, _query: &str, page: usize, page_size: usize) -> AppResult<Vec<String>> {
        Ok(self
            .ids
            .iter()
            .skip((page.max(1) - 1) * page_size)
            .take(page_size)
            .cloned()
            .collect())
    }

    async fn fetch_metadata(&self, ids: &[String]) -> AppResult<Vec<ArticleMetadata>> {
        self.metadata_requests.lock().unwrap().push(ids.to_vec());
        Ok(ids.iter().filter_map(|id| self.metadata.get(id).cloned()).collect())
    }
}

pub fn metadata(external_id: &str, doi: &str) -> ArticleMetadata {
    ArticleMetadata {
        external_id: external_id.to_string(),
        title: format!("Article {}", external_id),
        doi: Some(doi.to_string()),
        ..Default::default()
    }
}

// ========== 富化 ==========

/// 所有结构都返回同一组富化值，并记录查询次数
#[derive(Default)]
pub struct MockEnrichment {
    pub lookups: Mutex<Vec<String>>,
}

#[async_trait]
impl EnrichmentClient for MockEnrichment {
    async fn lookup(&self, structure_id: &str) -> AppResult<EnrichmentResult> {
        self.lookups.lock().unwrap().push(structure_id.to_string());
        Ok(EnrichmentResult {
            structure_id: structure_id.to_string(),
            classification: EnrichmentField::Value("HYDROLASE".into()),
            organism: EnrichmentField::Value("Homo sapiens".into()),
            method: EnrichmentField::Value("X-RAY DIFFRACTION".into()),
        })
    }
}

/// 任何结构都查不到，模拟 RCSB 中不存在的条目
#[derive(Default)]
pub struct MissingEnrichment {
    pub lookups: Mutex<Vec<String>>,
}

#[async_trait]
impl EnrichmentClient for MissingEnrichment {
    async fn lookup(&self, structure_id: &str) -> AppResult<EnrichmentResult> {
        self.lookups.lock().unwrap().push(structure_id.to_string());
        Ok(EnrichmentResult::not_found(structure_id))
    }
}

// ========== 页面内容 ==========

fn filler(title: &str) -> String {
    (0..3)
        .map(|i| format!("{} paragraph {} summarises prior work on protein dynamics in detail.", title, i))
        .collect::<Vec<_>>()
        .join(" ")
}

/// 一篇按标题分节的文章页面，Methods 节包含给定文本
pub fn article_html(methods: &str) -> String {
    format!(
        "<html><body><h2>Introduction</h2><p>{}</p><h2>Methods</h2><p>{}</p>\
         <h2>Results</h2><p>{}</p><h2>Discussion</h2><p>{}</p></body></html>",
        filler("Introduction"),
        methods,
        filler("Results"),
        filler("Discussion")
    )
}

pub const METHODS_TEXT: &str = "The crystal structure was obtained from the Protein Data Bank (PDB code 1ABC). \
The TIP3P explicit water model was used to solvate the protein. \
The simulation at 310 K was performed with GROMACS 2020.4 for 100 ns.";
