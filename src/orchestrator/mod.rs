//! 编排层（Orchestration Layer）
//!
//! ## 模块划分
//!
//! ### `app` - 应用入口
//! - 按配置组装协作方，管理浏览器池与存储快照的生命周期
//! - 输出全局统计信息
//!
//! ### `pipeline` - 采集流水线
//! - 检索 → 分区 → 并发抓取 → 持久化 → 逐篇抽取
//!
//! ## 层次关系
//!
//! ```text
//! app
//!     ↓
//! pipeline (处理 Vec<Article>)
//!     ↓
//! workflow::FetchFlow / ExtractionFlow (处理单篇文章)
//!     ↓
//! services (能力层：路由 / 抓取 / 抽取 / 富化)
//!     ↓
//! infrastructure (基础设施：BrowserPool / RateLimitedClient)
//! ```

pub mod app;
pub mod pipeline;

pub use app::App;
pub use pipeline::{Collaborators, PipelineOrchestrator, PipelineRun, PipelineSettings, RunStats};
