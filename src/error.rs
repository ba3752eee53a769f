use std::time::Duration;

use thiserror::Error;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 浏览器相关错误
    #[error("浏览器错误: {0}")]
    Browser(#[from] BrowserError),
    /// API 调用错误
    #[error("API错误: {0}")]
    Api(#[from] ApiError),
    /// 文档解析错误（XML / PDF / HTML）
    #[error("解析错误: {0}")]
    Parse(#[from] ParseError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// 存储层错误
    #[error("存储错误: {0}")]
    Store(String),
    /// 致命错误：浏览器池无法（重新）初始化，整个流水线必须中止
    #[error("致命错误: {0}")]
    Fatal(String),
    /// 其他错误
    #[error("错误: {0}")]
    Other(String),
}

/// 浏览器相关错误
#[derive(Debug, Error)]
pub enum BrowserError {
    /// 启动浏览器失败
    #[error("启动浏览器失败: {reason}")]
    LaunchFailed { reason: String },
    /// 创建页面失败
    #[error("创建页面失败: {reason}")]
    PageCreationFailed { reason: String },
    /// 导航失败
    #[error("导航到 {url} 失败: {reason}")]
    NavigationFailed { url: String, reason: String },
    /// 导航超时
    #[error("导航到 {url} 超时 ({secs} 秒)")]
    NavigationTimeout { url: String, secs: u64 },
    /// 执行脚本失败
    #[error("执行脚本失败: {reason}")]
    ScriptExecutionFailed { reason: String },
    /// 浏览器池已关闭
    #[error("浏览器池已关闭")]
    PoolClosed,
}

/// API 调用错误
#[derive(Debug, Error)]
pub enum ApiError {
    /// 网络请求失败
    #[error("API请求失败 ({endpoint}): {source}")]
    RequestFailed {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    /// API 返回非成功状态码
    #[error("API返回错误状态 ({endpoint}): HTTP {status}")]
    BadStatus { endpoint: String, status: u16 },
    /// 请求频率限制
    #[error("API请求频率限制 ({endpoint}), 建议等待: {retry_after:?}")]
    RateLimited {
        endpoint: String,
        retry_after: Option<Duration>,
    },
    /// API 返回空结果
    #[error("API返回空结果: {endpoint}")]
    EmptyResponse { endpoint: String },
    /// JSON 解析失败
    #[error("JSON解析失败: {0}")]
    JsonParseFailed(#[from] serde_json::Error),
    /// LLM 调用失败
    #[error("LLM调用失败 (模型: {model}): {message}")]
    Llm { model: String, message: String },
}

/// 文档解析错误
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("XML解析失败: {0}")]
    Xml(String),
    #[error("PDF解析失败: {0}")]
    Pdf(String),
    #[error("HTML选择器无效: {0}")]
    Selector(String),
    #[error("正则表达式编译失败: {0}")]
    Regex(#[from] regex::Error),
    #[error("URL解析失败: {0}")]
    Url(#[from] url::ParseError),
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 读取配置文件失败
    #[error("读取配置文件失败 ({path}): {source}")]
    FileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// TOML 解析失败
    #[error("TOML解析失败 ({path}): {source}")]
    TomlParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    /// 环境变量解析失败
    #[error("环境变量 {var_name} 解析失败: 值 '{value}' 无法转换为 {expected_type}")]
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },
}

// ========== 从常见错误类型转换 ==========

impl From<chromiumoxide::error::CdpError> for AppError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        AppError::Browser(BrowserError::ScriptExecutionFailed {
            reason: err.to_string(),
        })
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Api(ApiError::JsonParseFailed(err))
    }
}

impl From<regex::Error> for AppError {
    fn from(err: regex::Error) -> Self {
        AppError::Parse(ParseError::Regex(err))
    }
}

impl From<url::ParseError> for AppError {
    fn from(err: url::ParseError) -> Self {
        AppError::Parse(ParseError::Url(err))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Store(err.to_string())
    }
}

// ========== 便捷构造函数与分类 ==========

impl AppError {
    /// 创建网络请求失败错误
    pub fn request_failed(endpoint: impl Into<String>, source: reqwest::Error) -> Self {
        AppError::Api(ApiError::RequestFailed {
            endpoint: endpoint.into(),
            source,
        })
    }

    /// 创建非成功状态码错误
    pub fn bad_status(endpoint: impl Into<String>, status: u16) -> Self {
        AppError::Api(ApiError::BadStatus {
            endpoint: endpoint.into(),
            status,
        })
    }

    /// 创建导航失败错误
    pub fn navigation_failed(url: impl Into<String>, reason: impl ToString) -> Self {
        AppError::Browser(BrowserError::NavigationFailed {
            url: url.into(),
            reason: reason.to_string(),
        })
    }

    /// 是否为可重试的瞬时错误（超时、5xx、导航失败、429）
    pub fn is_transient(&self) -> bool {
        match self {
            AppError::Api(ApiError::RequestFailed { .. }) => true,
            AppError::Api(ApiError::RateLimited { .. }) => true,
            AppError::Api(ApiError::BadStatus { status, .. }) => *status >= 500,
            AppError::Browser(BrowserError::NavigationFailed { .. })
            | AppError::Browser(BrowserError::NavigationTimeout { .. }) => true,
            _ => false,
        }
    }

    /// 429 响应携带的等待时间
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            AppError::Api(ApiError::RateLimited { retry_after, .. }) => *retry_after,
            _ => None,
        }
    }

    /// 是否为致命错误
    pub fn is_fatal(&self) -> bool {
        matches!(self, AppError::Fatal(_))
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_are_transient_but_client_errors_are_not() {
        assert!(AppError::bad_status("x", 503).is_transient());
        assert!(!AppError::bad_status("x", 404).is_transient());
        assert!(!AppError::Fatal("boom".into()).is_transient());
    }

    #[test]
    fn rate_limited_exposes_retry_after() {
        let err = AppError::Api(ApiError::RateLimited {
            endpoint: "rcsb".into(),
            retry_after: Some(Duration::from_secs(3)),
        });
        assert!(err.is_transient());
        assert_eq!(err.retry_after(), Some(Duration::from_secs(3)));
    }
}
