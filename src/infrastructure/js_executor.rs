//! JS 执行器 - 基础设施层
//!
//! 借用一个页面，只暴露"执行 JS"的能力

use serde_json::Value as JsonValue;

use crate::error::AppResult;
use crate::infrastructure::browser_pool::PageDriver;

/// JS 执行器
///
/// 职责：
/// - 借用页面（不持有，页面生命周期由浏览器池管理）
/// - 暴露 eval() 与滚动相关的取值能力
/// - 不认识 Article / Chapter
pub struct JsExecutor<'a> {
    page: &'a dyn PageDriver,
}

impl<'a> JsExecutor<'a> {
    /// 创建新的 JS 执行器
    pub fn new(page: &'a dyn PageDriver) -> Self {
        Self { page }
    }

    /// 执行 JS 代码并返回 JSON 结果
    ///
    /// # 参数
    /// - `js_code`: 要执行的 JavaScript 代码
    pub async fn eval(&self, js_code: &str) -> AppResult<JsonValue> {
        self.page.eval(js_code).await
    }

    /// 当前纵向滚动位置
    pub async fn scroll_position(&self) -> AppResult<f64> {
        let value = self
            .eval("window.scrollY || document.documentElement.scrollTop || 0")
            .await?;
        Ok(value.as_f64().unwrap_or(0.0))
    }

    /// 文档总高度
    pub async fn scroll_height(&self) -> AppResult<f64> {
        let value = self
            .eval("Math.max(document.body ? document.body.scrollHeight : 0, document.documentElement.scrollHeight)")
            .await?;
        Ok(value.as_f64().unwrap_or(0.0))
    }

    /// 视口高度
    pub async fn viewport_height(&self) -> AppResult<f64> {
        let value = self.eval("window.innerHeight || 0").await?;
        Ok(value.as_f64().unwrap_or(0.0))
    }

    /// 滚动到指定纵向位置
    pub async fn scroll_to(&self, y: f64) -> AppResult<()> {
        self.eval(&format!("window.scrollTo(0, {}); true", y)).await?;
        Ok(())
    }
}
