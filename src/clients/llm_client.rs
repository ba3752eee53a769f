//! 模拟时长归一化
//!
//! - `LlmDurationNormalizer`：调用兼容 OpenAI API 的服务，把自由文本转为纳秒列表
//! - `PatternDurationNormalizer`：不依赖外部服务的正则实现（未配置 LLM 时使用）

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, warn};

use crate::clients::DurationNormalizer;
use crate::config::Config;
use crate::error::{ApiError, AppError, AppResult};
use crate::utils::logging::truncate_text;

const SYSTEM_PROMPT: &str = "You extract molecular dynamics simulation lengths from one sentence. \
Answer with a JSON array of integers, each a simulation length converted to nanoseconds \
(1 µs = 1000 ns, 1 ps = 0.001 ns, rounded to the nearest integer). \
Ignore time steps, save intervals and analysis windows. Answer [] when no simulation length is stated. \
Answer with the JSON array only.";

/// 基于 LLM 的时长归一化
pub struct LlmDurationNormalizer {
    client: Client<OpenAIConfig>,
    model_name: String,
}

impl LlmDurationNormalizer {
    /// 创建新的归一化器
    ///
    /// # 参数
    /// - `api_key`: LLM API 密钥
    /// - `config`: 提供 base URL 与模型名
    pub fn new(config: &Config, api_key: &str) -> Self {
        let openai_config = OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(&config.llm_api_base_url);

        Self {
            client: Client::with_config(openai_config),
            model_name: config.llm_model_name.clone(),
        }
    }

    fn llm_error(&self, message: impl ToString) -> AppError {
        AppError::Api(ApiError::Llm {
            model: self.model_name.clone(),
            message: message.to_string(),
        })
    }

    async fn ask(&self, sentence: &str) -> AppResult<String> {
        let system_msg = ChatCompletionRequestSystemMessageArgs::default()
            .content(SYSTEM_PROMPT)
            .build()
            .map_err(|e| self.llm_error(e))?;
        let user_msg = ChatCompletionRequestUserMessageArgs::default()
            .content(sentence)
            .build()
            .map_err(|e| self.llm_error(e))?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model_name)
            .messages(vec![
                ChatCompletionRequestMessage::System(system_msg),
                ChatCompletionRequestMessage::User(user_msg),
            ])
            .build()
            .map_err(|e| self.llm_error(e))?;

        let response = self.client.chat().create(request).await.map_err(|e| {
            warn!("LLM API 调用失败: {}", e);
            self.llm_error(e)
        })?;

        response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .map(|content| content.trim().to_string())
            .ok_or_else(|| self.llm_error("LLM 返回内容为空"))
    }
}

#[async_trait]
impl DurationNormalizer for LlmDurationNormalizer {
    async fn normalize(&self, sentence: &str) -> AppResult<Vec<i64>> {
        debug!("调用 LLM 归一化时长: {}", truncate_text(sentence, 80));
        let answer = self.ask(sentence).await?;
        Ok(parse_duration_answer(&answer))
    }
}

/// 解析 LLM 返回的 JSON 数组，容忍代码块包裹与多余文字
pub fn parse_duration_answer(answer: &str) -> Vec<i64> {
    let (Some(start), Some(end)) = (answer.find('['), answer.rfind(']')) else {
        return Vec::new();
    };
    if end < start {
        return Vec::new();
    }
    serde_json::from_str::<Vec<f64>>(&answer[start..=end])
        .map(|values| {
            values
                .into_iter()
                .filter(|v| v.is_finite() && *v > 0.0)
                .map(|v| v.round() as i64)
                .collect()
        })
        .unwrap_or_default()
}

/// 基于正则的时长归一化
pub struct PatternDurationNormalizer {
    pattern: Regex,
}

impl PatternDurationNormalizer {
    pub fn new() -> AppResult<Self> {
        let pattern = Regex::new(
            r"(?i)(\d+(?:\.\d+)?)\s*[-‐]?\s*(nanoseconds?|microseconds?|picoseconds?|ns|µs|μs|us|ps)(?:[^a-z]|$)",
        )?;
        Ok(Self { pattern })
    }

    fn to_nanoseconds(value: f64, unit: &str) -> f64 {
        match unit.to_lowercase().as_str() {
            u if u.starts_with("micro") || u == "µs" || u == "μs" || u == "us" => value * 1000.0,
            u if u.starts_with("pico") || u == "ps" => value / 1000.0,
            _ => value,
        }
    }
}

#[async_trait]
impl DurationNormalizer for PatternDurationNormalizer {
    async fn normalize(&self, sentence: &str) -> AppResult<Vec<i64>> {
        let mut durations = Vec::new();
        for caps in self.pattern.captures_iter(sentence) {
            let Ok(value) = caps[1].parse::<f64>() else {
                continue;
            };
            let ns = Self::to_nanoseconds(value, &caps[2]).round() as i64;
            if ns > 0 && !durations.contains(&ns) {
                durations.push(ns);
            }
        }
        Ok(durations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_wrapped_answers() {
        assert_eq!(parse_duration_answer("```json\n[100, 250.4]\n```"), vec![100, 250]);
        assert_eq!(parse_duration_answer("[]"), Vec::<i64>::new());
        assert_eq!(parse_duration_answer("no durations"), Vec::<i64>::new());
    }

    #[tokio::test]
    async fn pattern_normalizer_converts_units() {
        let normalizer = PatternDurationNormalizer::new().unwrap();
        let values = normalizer
            .normalize("Three 500 ns production runs and one 1.5 µs run with a 2 fs time step")
            .await
            .unwrap();
        assert_eq!(values, vec![500, 1500]);
    }

    #[tokio::test]
    async fn pattern_normalizer_ignores_other_units() {
        let normalizer = PatternDurationNormalizer::new().unwrap();
        let values = normalizer.normalize("The run used 100 nsteps").await.unwrap();
        assert!(values.is_empty());
    }
}
