//! 浏览器池 - 基础设施层
//!
//! ## 职责
//!
//! - 持有唯一的浏览器进程（首次使用时懒启动，所有页面共享）
//! - 用 Semaphore 限制同时打开的页面数量（默认 5）
//! - 浏览器崩溃 / 被关闭后自动重启，调用方看不到 "browser closed"
//! - 重启由单一互斥门控制，同一时刻只有一个重启在进行，其余调用方等待
//!
//! ## 状态机
//!
//! ```text
//! Uninitialized → Initializing → Ready → Closed
//!        ↑              │          │
//!        └──(启动失败)───┘   (检测到断开时回到 Initializing)
//! ```
//!
//! 页面导航超时不属于池的故障，不会触发重启。

use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use rand::seq::SliceRandom;
use serde_json::Value as JsonValue;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::error::{AppError, AppResult, BrowserError};

/// 浏览器引擎：负责启动浏览器进程
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> AppResult<Arc<dyn BrowserSession>>;
}

/// 已启动的浏览器进程
#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// 浏览器是否仍然可用
    async fn is_connected(&self) -> bool;
    /// 打开一个新页面（已挂载资源拦截，使用给定 UA）
    async fn new_page(&self, user_agent: &str) -> AppResult<Box<dyn PageDriver>>;
    /// 关闭浏览器
    async fn shutdown(&self);
}

/// 单个页面的操作能力
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// 导航到 URL，返回重定向后的最终 URL
    async fn navigate(&mut self, url: &str, timeout: Duration) -> AppResult<String>;
    /// 执行 JS 并返回 JSON 结果
    async fn eval(&self, script: &str) -> AppResult<JsonValue>;
    /// 当前页面的完整 HTML
    async fn html(&self) -> AppResult<String>;
    /// 关闭页面
    async fn close(self: Box<Self>);
}

/// 池状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolPhase {
    Uninitialized,
    Initializing,
    Ready,
    Closed,
}

/// 常见桌面浏览器 UA，每个页面随机选择一个
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/125.0.0.0 Safari/537.36 Edg/125.0.0.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:127.0) Gecko/20100101 Firefox/127.0",
];

/// 随机选择一个 UA
pub fn random_user_agent() -> &'static str {
    USER_AGENTS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(USER_AGENTS[0])
}

/// 浏览器池
pub struct BrowserPool {
    launcher: Arc<dyn BrowserLauncher>,
    /// 单飞门：持锁者负责启动 / 重启
    session: Mutex<Option<Arc<dyn BrowserSession>>>,
    phase: RwLock<PoolPhase>,
    slots: Arc<Semaphore>,
    max_pages: usize,
    relaunch_attempts: u32,
    relaunch_delay: Duration,
}

impl BrowserPool {
    /// 创建新的浏览器池（不会立即启动浏览器）
    ///
    /// # 参数
    /// - `launcher`: 浏览器引擎
    /// - `max_pages`: 同时打开的页面数量上限
    /// - `relaunch_attempts`: 启动 / 重启的最大尝试次数
    pub fn new(launcher: Arc<dyn BrowserLauncher>, max_pages: usize, relaunch_attempts: u32) -> Self {
        let max_pages = max_pages.max(1);
        Self {
            launcher,
            session: Mutex::new(None),
            phase: RwLock::new(PoolPhase::Uninitialized),
            slots: Arc::new(Semaphore::new(max_pages)),
            max_pages,
            relaunch_attempts: relaunch_attempts.max(1),
            relaunch_delay: Duration::from_millis(500),
        }
    }

    /// 设置两次启动尝试之间的等待时间
    pub fn with_relaunch_delay(mut self, delay: Duration) -> Self {
        self.relaunch_delay = delay;
        self
    }

    pub fn phase(&self) -> PoolPhase {
        self.phase.read().map(|p| *p).unwrap_or(PoolPhase::Closed)
    }

    fn set_phase(&self, phase: PoolPhase) {
        if let Ok(mut current) = self.phase.write() {
            *current = phase;
        }
    }

    pub fn max_pages(&self) -> usize {
        self.max_pages
    }

    /// 当前已借出的页面数量
    pub fn in_use(&self) -> usize {
        self.max_pages - self.slots.available_permits()
    }

    /// 借出一个页面
    ///
    /// 阻塞直到有空闲槽位；取消由调用方丢弃该 future 完成（例如外层 `timeout`）。
    /// 浏览器不可用时自动重启，多次重启失败返回 `AppError::Fatal`。
    pub async fn acquire(&self) -> AppResult<PageHandle> {
        let permit = self
            .slots
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| AppError::Browser(BrowserError::PoolClosed))?;

        let mut last_error = None;
        for attempt in 1..=self.relaunch_attempts {
            let session = self.ensure_session().await?;
            let user_agent = random_user_agent();
            match session.new_page(user_agent).await {
                Ok(page) => {
                    debug!("借出页面 ({}/{})", self.in_use(), self.max_pages);
                    return Ok(PageHandle::new(page, permit));
                }
                Err(e) => {
                    warn!("创建页面失败 (尝试 {}/{}): {}", attempt, self.relaunch_attempts, e);
                    if !session.is_connected().await {
                        self.invalidate(&session).await;
                    }
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            AppError::Browser(BrowserError::PageCreationFailed {
                reason: "未知原因".to_string(),
            })
        }))
    }

    /// 归还页面：关闭页面并释放槽位
    pub async fn release(&self, mut handle: PageHandle) {
        if let Some(page) = handle.take_page() {
            page.close().await;
        }
        debug!("归还页面");
    }

    /// 关闭池与浏览器，之后的 `acquire` 返回错误
    pub async fn shutdown(&self) {
        self.slots.close();
        let mut session = self.session.lock().await;
        if let Some(browser) = session.take() {
            browser.shutdown().await;
        }
        self.set_phase(PoolPhase::Closed);
        info!("🛑 浏览器池已关闭");
    }

    /// 确保浏览器可用，必要时（重新）启动
    async fn ensure_session(&self) -> AppResult<Arc<dyn BrowserSession>> {
        let mut guard = self.session.lock().await;

        if self.phase() == PoolPhase::Closed {
            return Err(AppError::Browser(BrowserError::PoolClosed));
        }

        if let Some(session) = guard.as_ref() {
            if session.is_connected().await {
                return Ok(session.clone());
            }
            warn!("⚠️ 检测到浏览器已断开，准备重新启动");
            *guard = None;
        }

        self.set_phase(PoolPhase::Initializing);
        for attempt in 1..=self.relaunch_attempts {
            match self.launcher.launch().await {
                Ok(session) => {
                    info!("✅ 浏览器启动成功 (尝试 {}/{})", attempt, self.relaunch_attempts);
                    *guard = Some(session.clone());
                    self.set_phase(PoolPhase::Ready);
                    return Ok(session);
                }
                Err(e) => {
                    warn!("浏览器启动失败 (尝试 {}/{}): {}", attempt, self.relaunch_attempts, e);
                    if attempt < self.relaunch_attempts {
                        sleep(self.relaunch_delay).await;
                    }
                }
            }
        }

        self.set_phase(PoolPhase::Uninitialized);
        error!("❌ 浏览器在 {} 次尝试后仍无法启动", self.relaunch_attempts);
        Err(AppError::Fatal(format!(
            "浏览器在 {} 次尝试后仍无法启动",
            self.relaunch_attempts
        )))
    }

    /// 丢弃已失效的浏览器（若它仍是当前实例）
    async fn invalidate(&self, stale: &Arc<dyn BrowserSession>) {
        let mut guard = self.session.lock().await;
        if let Some(current) = guard.as_ref() {
            if Arc::ptr_eq(current, stale) {
                *guard = None;
                self.set_phase(PoolPhase::Uninitialized);
            }
        }
    }
}

/// 借出的页面，持有一个槽位
///
/// 未经 `release` 直接丢弃时（例如外层超时取消），槽位照常释放，页面在后台关闭。
pub struct PageHandle {
    page: Box<dyn PageDriver>,
    closed: bool,
    _permit: OwnedSemaphorePermit,
}

impl PageHandle {
    fn new(page: Box<dyn PageDriver>, permit: OwnedSemaphorePermit) -> Self {
        Self {
            page,
            closed: false,
            _permit: permit,
        }
    }

    pub fn page(&self) -> &dyn PageDriver {
        self.page.as_ref()
    }

    pub fn page_mut(&mut self) -> &mut dyn PageDriver {
        self.page.as_mut()
    }

    fn take_page(&mut self) -> Option<Box<dyn PageDriver>> {
        if self.closed {
            return None;
        }
        self.closed = true;
        Some(std::mem::replace(&mut self.page, Box::new(DetachedPage)))
    }
}

impl Drop for PageHandle {
    fn drop(&mut self) {
        if let Some(page) = self.take_page() {
            if let Ok(runtime) = tokio::runtime::Handle::try_current() {
                runtime.spawn(async move { page.close().await });
            }
        }
    }
}

/// 页面被取走后留下的占位
struct DetachedPage;

#[async_trait]
impl PageDriver for DetachedPage {
    async fn navigate(&mut self, url: &str, _timeout: Duration) -> AppResult<String> {
        Err(AppError::navigation_failed(url, "页面已关闭"))
    }

    async fn eval(&self, _script: &str) -> AppResult<JsonValue> {
        Err(AppError::Browser(BrowserError::ScriptExecutionFailed {
            reason: "页面已关闭".to_string(),
        }))
    }

    async fn html(&self) -> AppResult<String> {
        Err(AppError::Browser(BrowserError::ScriptExecutionFailed {
            reason: "页面已关闭".to_string(),
        }))
    }

    async fn close(self: Box<Self>) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_agent_is_from_known_list() {
        for _ in 0..20 {
            assert!(USER_AGENTS.contains(&random_user_agent()));
        }
    }
}
