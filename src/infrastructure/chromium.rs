//! Chromium 浏览器引擎 - 基础设施层
//!
//! `BrowserLauncher` / `BrowserSession` / `PageDriver` 的 chromiumoxide 实现。
//! 每个页面在创建时挂载请求拦截，图片和字体请求直接失败，其余请求放行。

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::emulation::SetUserAgentOverrideParams;
use chromiumoxide::cdp::browser_protocol::fetch::{
    EnableParams, EventRequestPaused, FailRequestParams, RequestPattern, RequestStage,
};
use chromiumoxide::cdp::browser_protocol::network::{ErrorReason, ResourceType};
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use serde_json::Value as JsonValue;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

use crate::error::{AppError, AppResult, BrowserError};
use crate::infrastructure::browser_pool::{BrowserLauncher, BrowserSession, PageDriver};

/// Chromium 启动参数
#[derive(Debug, Clone)]
pub struct ChromiumLauncher {
    executable: Option<PathBuf>,
    headless: bool,
}

impl ChromiumLauncher {
    pub fn new(executable: Option<PathBuf>, headless: bool) -> Self {
        Self { executable, headless }
    }

    fn build_config(&self) -> AppResult<BrowserConfig> {
        let mut builder = BrowserConfig::builder();
        builder = if self.headless {
            builder.new_headless_mode()
        } else {
            builder.with_head()
        };
        if let Some(path) = &self.executable {
            builder = builder.chrome_executable(path);
        }

        builder
            .args(vec![
                "--disable-gpu",
                "--no-sandbox",
                "--disable-dev-shm-usage",
                "--disable-extensions",
                "--disable-background-networking",
                "--remote-debugging-port=0",
            ])
            .build()
            .map_err(|e| {
                error!("配置浏览器失败: {}", e);
                AppError::Browser(BrowserError::LaunchFailed { reason: e })
            })
    }
}

#[async_trait]
impl BrowserLauncher for ChromiumLauncher {
    async fn launch(&self) -> AppResult<Arc<dyn BrowserSession>> {
        info!("🚀 启动浏览器...");
        let config = self.build_config()?;

        let (browser, mut handler) = Browser::launch(config).await.map_err(|e| {
            error!("启动浏览器失败: {}", e);
            AppError::Browser(BrowserError::LaunchFailed {
                reason: e.to_string(),
            })
        })?;

        let alive = Arc::new(AtomicBool::new(true));
        let handler_alive = alive.clone();

        // 在后台处理浏览器事件，事件流结束即视为浏览器已断开
        tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
            handler_alive.store(false, Ordering::SeqCst);
            debug!("浏览器事件流已结束");
        });

        // 等待浏览器状态同步
        sleep(Duration::from_millis(300)).await;

        Ok(Arc::new(ChromiumSession {
            browser: tokio::sync::Mutex::new(browser),
            alive,
        }))
    }
}

/// 已启动的 Chromium 进程
pub struct ChromiumSession {
    browser: tokio::sync::Mutex<Browser>,
    alive: Arc<AtomicBool>,
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    async fn is_connected(&self) -> bool {
        if !self.alive.load(Ordering::SeqCst) {
            return false;
        }
        let browser = self.browser.lock().await;
        browser.version().await.is_ok()
    }

    async fn new_page(&self, user_agent: &str) -> AppResult<Box<dyn PageDriver>> {
        let page = {
            let browser = self.browser.lock().await;
            browser.new_page("about:blank").await.map_err(|e| {
                AppError::Browser(BrowserError::PageCreationFailed {
                    reason: e.to_string(),
                })
            })?
        };

        page.execute(SetUserAgentOverrideParams::new(user_agent.to_string()))
            .await?;
        install_resource_blocking(&page).await?;

        Ok(Box::new(ChromiumPage { page }))
    }

    async fn shutdown(&self) {
        let mut browser = self.browser.lock().await;
        if let Err(e) = browser.close().await {
            warn!("关闭浏览器失败: {}", e);
        }
        let _ = browser.wait().await;
        self.alive.store(false, Ordering::SeqCst);
    }
}

/// 拦截图片与字体请求
async fn install_resource_blocking(page: &Page) -> AppResult<()> {
    let patterns = [ResourceType::Image, ResourceType::Font]
        .into_iter()
        .map(|kind| {
            RequestPattern::builder()
                .resource_type(kind)
                .request_stage(RequestStage::Request)
                .build()
        })
        .collect::<Vec<_>>();

    let mut paused = page.event_listener::<EventRequestPaused>().await?;
    page.execute(EnableParams::builder().patterns(patterns).build())
        .await?;

    let interceptor = page.clone();
    tokio::spawn(async move {
        while let Some(event) = paused.next().await {
            let params = FailRequestParams::new(event.request_id.clone(), ErrorReason::BlockedByClient);
            if interceptor.execute(params).await.is_err() {
                break;
            }
        }
    });

    Ok(())
}

/// 单个 Chromium 页面
pub struct ChromiumPage {
    page: Page,
}

#[async_trait]
impl PageDriver for ChromiumPage {
    async fn navigate(&mut self, url: &str, limit: Duration) -> AppResult<String> {
        debug!("导航到: {}", url);
        match timeout(limit, self.page.goto(url)).await {
            Ok(Ok(_)) => {
                let final_url = self
                    .page
                    .url()
                    .await
                    .ok()
                    .flatten()
                    .map(|u| u.to_string())
                    .unwrap_or_else(|| url.to_string());
                Ok(final_url)
            }
            Ok(Err(e)) => Err(AppError::navigation_failed(url, e)),
            Err(_) => Err(AppError::Browser(BrowserError::NavigationTimeout {
                url: url.to_string(),
                secs: limit.as_secs(),
            })),
        }
    }

    async fn eval(&self, script: &str) -> AppResult<JsonValue> {
        let result = self.page.evaluate(script).await?;
        result.into_value().map_err(|e| {
            AppError::Browser(BrowserError::ScriptExecutionFailed {
                reason: format!("{:?}", e),
            })
        })
    }

    async fn html(&self) -> AppResult<String> {
        Ok(self.page.content().await?)
    }

    async fn close(self: Box<Self>) {
        if let Err(e) = self.page.close().await {
            debug!("关闭页面失败: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::browser_pool::BrowserPool;

    #[tokio::test]
    #[ignore] // 需要本机安装 Chromium
    async fn navigates_and_reads_html() {
        let launcher = Arc::new(ChromiumLauncher::new(None, true));
        let pool = BrowserPool::new(launcher, 2, 1);

        let mut handle = pool.acquire().await.expect("acquire failed");
        let final_url = handle
            .page_mut()
            .navigate("data:text/html,<h1>Hello</h1><p>World</p>", Duration::from_secs(10))
            .await
            .expect("navigation failed");
        assert!(final_url.starts_with("data:"));

        let heading = handle
            .page()
            .eval("document.querySelector('h1').textContent")
            .await
            .expect("eval failed");
        assert_eq!(heading.as_str(), Some("Hello"));

        let html = handle.page().html().await.expect("html failed");
        assert!(html.contains("<p>World</p>"));

        pool.release(handle).await;
        pool.shutdown().await;
    }
}
