pub mod article_ctx;
pub mod extraction_flow;
pub mod fetch_flow;

pub use article_ctx::ArticleCtx;
pub use extraction_flow::{ExtractionFlow, ExtractionResult};
pub use fetch_flow::FetchFlow;
