//! 应用入口 - 编排层
//!
//! 按配置组装所有协作方（浏览器池、检索、存储、富化、时长归一化、出版商 API），
//! 运行一轮采集，输出统计，保存存储快照，关闭浏览器。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};

use crate::clients::{
    DurationNormalizer, LlmDurationNormalizer, MemoryStore, PatternDurationNormalizer, PubMedCatalog, RcsbClient,
};
use crate::config::Config;
use crate::infrastructure::{random_user_agent, BrowserPool, ChromiumLauncher};
use crate::models::load_vocabulary_or_builtin;
use crate::orchestrator::pipeline::{Collaborators, PipelineOrchestrator, PipelineSettings};
use crate::services::{ContentFetcher, GenericScraper, PublisherApiClient};
use crate::utils::logging::{init_log_file, log_startup, print_final_stats};

/// 应用主结构
pub struct App {
    config: Config,
    pool: Arc<BrowserPool>,
    store: Arc<MemoryStore>,
    pipeline: PipelineOrchestrator,
}

impl App {
    /// 初始化应用
    pub async fn initialize(config: Config) -> Result<Self> {
        init_log_file(&config.output_log_file)?;
        log_startup(&config);

        let vocabulary = load_vocabulary_or_builtin(config.vocabulary_file.as_deref().map(Path::new)).await?;
        let store = Arc::new(MemoryStore::load_snapshot(Path::new(&config.store_snapshot_path), vocabulary).await?);
        info!("📂 存储中已有 {} 篇文章", store.article_count().await);

        let launcher = Arc::new(ChromiumLauncher::new(
            config.chrome_executable.as_ref().map(PathBuf::from),
            config.headless,
        ));
        let pool = Arc::new(BrowserPool::new(
            launcher,
            config.browser_pool_size,
            config.browser_relaunch_attempts,
        ));

        let normalizer: Arc<dyn DurationNormalizer> = match config.llm_api_key.as_deref() {
            Some(key) => {
                info!("🤖 时长归一化使用 LLM: {}", config.llm_model_name);
                Arc::new(LlmDurationNormalizer::new(&config, key))
            }
            None => {
                warn!("⚠️ 未配置 LLM_API_KEY，时长归一化使用正则");
                Arc::new(PatternDurationNormalizer::new()?)
            }
        };

        let collaborators = Collaborators {
            catalog: Arc::new(PubMedCatalog::new(&config)?),
            store: store.clone(),
            denylist: store.clone(),
            enrichment: Arc::new(RcsbClient::new(&config)?),
            normalizer,
        };

        let image_client = reqwest::Client::builder()
            .user_agent(random_user_agent())
            .timeout(config.navigation_timeout())
            .build()?;
        let fetcher = ContentFetcher::new(PublisherApiClient::new(&config)?, GenericScraper::new(image_client));

        let pipeline = PipelineOrchestrator::new(
            collaborators,
            pool.clone(),
            fetcher,
            PipelineSettings::from_config(&config),
        )?;

        Ok(Self {
            config,
            pool,
            store,
            pipeline,
        })
    }

    /// 运行一轮采集；无论成败都保存快照并关闭浏览器
    pub async fn run(&self) -> Result<()> {
        let run = self
            .pipeline
            .run_acquisition_pipeline(&self.config.query, self.config.page, self.config.page_size)
            .await;

        if let Err(e) = self.store.save_snapshot(Path::new(&self.config.store_snapshot_path)).await {
            warn!("⚠️ 保存存储快照失败: {}", e);
        }
        self.pool.shutdown().await;

        let run = run?;
        print_final_stats(&run.stats, &self.config.output_log_file)?;
        Ok(())
    }
}
