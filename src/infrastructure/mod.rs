//! 基础设施层：稀缺资源与外部连接

pub mod browser_pool;
pub mod chromium;
pub mod http_client;
pub mod js_executor;
pub mod rate_limiter;

pub use browser_pool::{
    random_user_agent, BrowserLauncher, BrowserPool, BrowserSession, PageDriver, PageHandle,
    PoolPhase,
};
pub use chromium::ChromiumLauncher;
pub use http_client::RateLimitedClient;
pub use js_executor::JsExecutor;
pub use rate_limiter::{parse_retry_after, RateLimiter, RetryPolicy};
