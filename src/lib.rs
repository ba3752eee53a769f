//! # MD Harvest
//!
//! 从科学文献中采集全文并抽取分子动力学模拟元数据
//!
//! ## 架构设计
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有稀缺资源，只暴露能力
//! - `BrowserPool` - 有界页面池，浏览器崩溃后自动重启
//! - `RateLimitedClient` - 按协作方限速、遵守 429 / Retry-After 的 HTTP 客户端
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 单一能力，只处理单篇文章
//! - `PublisherRouter` - 按落地页主机路由（黑名单 / 出版商 API / 通用抓取）
//! - `ContentFetcher` - 抓取策略
//! - `ExtractionEngine` - 逐句规则抽取 + 交叉组合 + 去重
//! - `enrichment` - 结构富化与过滤
//!
//! ### ③ 流程层（Workflow）
//! - `FetchFlow` - 借页面 → 导航 → 路由 → 抓取 → 归还
//! - `ExtractionFlow` - 抽取 → 富化 → 保存
//!
//! ### ④ 编排层（Orchestration）
//! - `PipelineOrchestrator` - 一轮完整采集
//! - `App` - 按配置组装协作方
//!
//! ### 外部协作方（Clients）
//! - `clients/` - 检索、存储、黑名单、富化、时长归一化的 trait 与实现

pub mod clients;
pub mod config;
pub mod error;
pub mod infrastructure;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::Config;
pub use error::{AppError, AppResult};
pub use infrastructure::{BrowserPool, PageHandle};
pub use models::{Article, CandidateRecord, FetchOutcome, FetchTarget, Vocabulary};
pub use orchestrator::{App, PipelineOrchestrator, PipelineRun, RunStats};
pub use services::{ExtractionEngine, PublisherRouter, Route};
pub use workflow::{ArticleCtx, ExtractionFlow, FetchFlow};
