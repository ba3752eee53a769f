//! 限流 HTTP 客户端 - 基础设施层
//!
//! 持有 reqwest::Client + 一个协作方专属的限流器和重试策略，
//! 只暴露"发请求"能力，不认识任何业务数据。

use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use tracing::debug;

use crate::error::{ApiError, AppError, AppResult};
use crate::infrastructure::rate_limiter::{parse_retry_after, RateLimiter, RetryPolicy};

/// 限流 HTTP 客户端
pub struct RateLimitedClient {
    name: String,
    client: Client,
    limiter: RateLimiter,
    policy: RetryPolicy,
}

impl RateLimitedClient {
    /// 创建新的客户端
    ///
    /// # 参数
    /// - `name`: 协作方名称（日志 / 错误中的 endpoint）
    /// - `min_interval`: 两次调用的最小间隔
    /// - `policy`: 重试策略
    pub fn new(name: impl Into<String>, min_interval: Duration, policy: RetryPolicy) -> AppResult<Self> {
        let name = name.into();
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .user_agent(concat!("md_harvest/", env!("CARGO_PKG_VERSION")))
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| AppError::request_failed(name.clone(), e))?;
        Ok(Self::with_client(name, client, min_interval, policy))
    }

    pub fn with_client(name: impl Into<String>, client: Client, min_interval: Duration, policy: RetryPolicy) -> Self {
        Self {
            name: name.into(),
            client,
            limiter: RateLimiter::new(min_interval),
            policy,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 发送请求
    ///
    /// `build` 每次尝试调用一次，用于重新构造请求。
    /// - 429：按 `Retry-After` 等待后重试
    /// - 5xx / 网络错误：指数退避重试
    /// - 其他非成功状态：立即返回 `ApiError::BadStatus`
    pub async fn send<F>(&self, build: F) -> AppResult<Response>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        self.policy
            .run(&self.name, || async {
                self.limiter.wait().await;
                let response = build(&self.client)
                    .send()
                    .await
                    .map_err(|e| AppError::request_failed(self.name.clone(), e))?;
                self.check_status(response)
            })
            .await
    }

    /// 发送请求并解析 JSON
    pub async fn send_json<T, F>(&self, build: F) -> AppResult<T>
    where
        T: serde::de::DeserializeOwned,
        F: Fn(&Client) -> RequestBuilder,
    {
        let response = self.send(build).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| AppError::request_failed(self.name.clone(), e))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// 发送请求并读取文本
    pub async fn send_text<F>(&self, build: F) -> AppResult<String>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let response = self.send(build).await?;
        response
            .text()
            .await
            .map_err(|e| AppError::request_failed(self.name.clone(), e))
    }

    /// 发送请求并读取二进制内容
    pub async fn send_bytes<F>(&self, build: F) -> AppResult<Vec<u8>>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let response = self.send(build).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| AppError::request_failed(self.name.clone(), e))?;
        Ok(bytes.to_vec())
    }

    fn check_status(&self, response: Response) -> AppResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after);
            debug!("{} 返回 429, Retry-After: {:?}", self.name, retry_after);
            return Err(ApiError::RateLimited {
                endpoint: self.name.clone(),
                retry_after,
            }
            .into());
        }

        Err(AppError::bad_status(self.name.clone(), status.as_u16()))
    }
}
