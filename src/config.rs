use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{AppResult, ConfigError};

/// 程序配置文件
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    // --- 浏览器池 ---
    /// 同时打开的页面数量上限
    pub browser_pool_size: usize,
    /// 浏览器启动 / 重启的最大尝试次数
    pub browser_relaunch_attempts: u32,
    /// Chrome 可执行文件路径（为空时由 chromiumoxide 自动查找）
    pub chrome_executable: Option<String>,
    /// 是否无头模式
    pub headless: bool,
    /// 单篇文章抓取的总超时（秒）
    pub fetch_timeout_secs: u64,
    /// 页面导航超时（秒）
    pub navigation_timeout_secs: u64,

    // --- 出版商 ---
    /// 黑名单作用域
    pub denylist_scope: String,
    /// 作用域下预置的黑名单主机
    pub denied_hosts: Vec<String>,
    pub elsevier_api_key: Option<String>,
    pub elsevier_api_base_url: String,
    pub wiley_tdm_token: Option<String>,
    pub wiley_api_base_url: String,
    /// 出版商 API 的最小调用间隔（毫秒）
    pub publisher_min_interval_ms: u64,

    // --- 文献检索 ---
    pub pubmed_base_url: String,
    pub pubmed_api_key: Option<String>,
    pub pubmed_min_interval_ms: u64,

    // --- 结构富化 ---
    pub rcsb_graphql_url: String,
    pub rcsb_min_interval_ms: u64,

    // --- LLM 配置（时长归一化）---
    pub llm_api_key: Option<String>,
    pub llm_api_base_url: String,
    pub llm_model_name: String,

    // --- 运行参数 ---
    pub query: String,
    pub page: usize,
    pub page_size: usize,
    /// 词表 TOML 文件
    pub vocabulary_file: Option<String>,
    /// 存储快照文件
    pub store_snapshot_path: String,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    /// 输出日志文件
    pub output_log_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            browser_pool_size: 5,
            browser_relaunch_attempts: 3,
            chrome_executable: None,
            headless: true,
            fetch_timeout_secs: 120,
            navigation_timeout_secs: 60,
            denylist_scope: "default".to_string(),
            denied_hosts: Vec::new(),
            elsevier_api_key: None,
            elsevier_api_base_url: "https://api.elsevier.com".to_string(),
            wiley_tdm_token: None,
            wiley_api_base_url: "https://api.wiley.com".to_string(),
            publisher_min_interval_ms: 1000,
            pubmed_base_url: "https://eutils.ncbi.nlm.nih.gov/entrez/eutils".to_string(),
            pubmed_api_key: None,
            pubmed_min_interval_ms: 340,
            rcsb_graphql_url: "https://data.rcsb.org/graphql".to_string(),
            rcsb_min_interval_ms: 200,
            llm_api_key: None,
            llm_api_base_url: "https://api.openai.com/v1".to_string(),
            llm_model_name: "gpt-4o-mini".to_string(),
            query: "molecular dynamics simulation protein".to_string(),
            page: 1,
            page_size: 20,
            vocabulary_file: None,
            store_snapshot_path: "harvest_store.json".to_string(),
            verbose_logging: false,
            output_log_file: "output.txt".to_string(),
        }
    }
}

impl Config {
    /// 加载配置：可选的 TOML 文件 + 环境变量覆盖
    pub fn load(path: Option<&Path>) -> AppResult<Self> {
        let base = match path {
            Some(path) => Self::from_toml_file(path)?,
            None => Self::default(),
        };
        base.apply_env()
    }

    /// 从 TOML 文件读取配置，缺省字段使用默认值
    pub fn from_toml_file(path: &Path) -> AppResult<Self> {
        let display = path.display().to_string();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
            path: display.clone(),
            source,
        })?;
        let config = toml::from_str(&content).map_err(|source| ConfigError::TomlParseFailed {
            path: display,
            source,
        })?;
        Ok(config)
    }

    /// 使用环境变量覆盖配置项
    pub fn apply_env(mut self) -> AppResult<Self> {
        self.browser_pool_size = env_parse("BROWSER_POOL_SIZE", "usize")?.unwrap_or(self.browser_pool_size);
        self.browser_relaunch_attempts = env_parse("BROWSER_RELAUNCH_ATTEMPTS", "u32")?.unwrap_or(self.browser_relaunch_attempts);
        self.chrome_executable = env_string("CHROME_EXECUTABLE").or(self.chrome_executable);
        self.headless = env_parse("HEADLESS", "bool")?.unwrap_or(self.headless);
        self.fetch_timeout_secs = env_parse("FETCH_TIMEOUT_SECS", "u64")?.unwrap_or(self.fetch_timeout_secs);
        self.navigation_timeout_secs = env_parse("NAVIGATION_TIMEOUT_SECS", "u64")?.unwrap_or(self.navigation_timeout_secs);
        self.denylist_scope = env_string("DENYLIST_SCOPE").unwrap_or(self.denylist_scope);
        self.elsevier_api_key = env_string("ELSEVIER_API_KEY").or(self.elsevier_api_key);
        self.wiley_tdm_token = env_string("WILEY_TDM_TOKEN").or(self.wiley_tdm_token);
        self.pubmed_api_key = env_string("PUBMED_API_KEY").or(self.pubmed_api_key);
        self.llm_api_key = env_string("LLM_API_KEY").or(self.llm_api_key);
        self.llm_api_base_url = env_string("LLM_API_BASE_URL").unwrap_or(self.llm_api_base_url);
        self.llm_model_name = env_string("LLM_MODEL_NAME").unwrap_or(self.llm_model_name);
        self.query = env_string("HARVEST_QUERY").unwrap_or(self.query);
        self.page = env_parse("HARVEST_PAGE", "usize")?.unwrap_or(self.page);
        self.page_size = env_parse("HARVEST_PAGE_SIZE", "usize")?.unwrap_or(self.page_size);
        self.vocabulary_file = env_string("VOCABULARY_FILE").or(self.vocabulary_file);
        self.store_snapshot_path = env_string("STORE_SNAPSHOT_PATH").unwrap_or(self.store_snapshot_path);
        self.verbose_logging = env_parse("VERBOSE_LOGGING", "bool")?.unwrap_or(self.verbose_logging);
        self.output_log_file = env_string("OUTPUT_LOG_FILE").unwrap_or(self.output_log_file);
        Ok(self)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }
}

fn env_string(var_name: &str) -> Option<String> {
    std::env::var(var_name).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(var_name: &str, expected_type: &str) -> AppResult<Option<T>> {
    match env_string(var_name) {
        None => Ok(None),
        Some(value) => value.parse().map(Some).map_err(|_| {
            ConfigError::EnvVarParseFailed {
                var_name: var_name.to_string(),
                value,
                expected_type: expected_type.to_string(),
            }
            .into()
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            browser_pool_size = 2
            denied_hosts = ["example-predatory.com"]
            "#,
        )
        .unwrap();
        assert_eq!(config.browser_pool_size, 2);
        assert_eq!(config.denied_hosts, vec!["example-predatory.com"]);
        assert_eq!(config.fetch_timeout_secs, 120);
        assert_eq!(config.denylist_scope, "default");
    }
}
