//! 抽取引擎 - 业务能力层
//!
//! 文章全文 + 词表 → 去重后的 `CandidateRecord`：
//! 1. 标识符发现
//! 2. 逐句属性发现（重复句子只访问一次）
//! 3. 每个标识符做全维度交叉组合并去重
//!
//! 富化与过滤在 [`crate::services::enrichment`] 中完成。

pub mod assembly;
pub mod attributes;
pub mod identifiers;
pub mod sentences;

use tracing::{debug, warn};

use crate::clients::DurationNormalizer;
use crate::error::AppResult;
use crate::models::{AttributeKind, AttributeObservation, CandidateRecord, Vocabulary};

pub use assembly::{assemble_candidates, dedup_candidates, AttributeSet};
pub use attributes::{AttributeMatcher, CompiledVocabulary};
pub use identifiers::{DiscoveredIdentifier, IdentifierMatcher};
pub use sentences::{split_sentences, unique_sentences, Sentence};

/// 抽取引擎，正则只在构造时编译一次
pub struct ExtractionEngine {
    identifiers: IdentifierMatcher,
    attributes: AttributeMatcher,
}

impl ExtractionEngine {
    pub fn new() -> AppResult<Self> {
        Ok(Self {
            identifiers: IdentifierMatcher::new()?,
            attributes: AttributeMatcher::new()?,
        })
    }

    /// 编译词表，一次运行只需编译一次
    pub fn compile(&self, vocabulary: &Vocabulary) -> AppResult<CompiledVocabulary> {
        CompiledVocabulary::compile(vocabulary)
    }

    /// 发现结构标识符
    pub fn discover_identifiers(&self, text: &str) -> Vec<DiscoveredIdentifier> {
        self.identifiers.discover(text, &split_sentences(text))
    }

    /// 逐句发现属性
    ///
    /// # 参数
    /// - `text`: 文章全文
    /// - `vocabulary`: 已编译词表
    /// - `normalizer`: 时长归一化协作方，仅对通过门槛的句子调用
    ///
    /// # 返回
    /// 按句子顺序排列的观测值；归一化失败的句子只记录警告
    pub async fn discover_attributes(
        &self,
        text: &str,
        vocabulary: &CompiledVocabulary,
        normalizer: &dyn DurationNormalizer,
    ) -> Vec<AttributeObservation> {
        let mut observations = Vec::new();

        for sentence in unique_sentences(text) {
            observations.extend(self.attributes.observe(&sentence, vocabulary));

            if !self.attributes.wants_duration(sentence.text) {
                continue;
            }
            match normalizer.normalize(sentence.text).await {
                Ok(durations) => {
                    observations.extend(durations.into_iter().filter(|ns| *ns > 0).map(|ns| {
                        AttributeObservation {
                            kind: AttributeKind::Duration(ns),
                            sentence_offset: sentence.offset,
                        }
                    }));
                }
                Err(e) => warn!("⚠️ 时长归一化失败，跳过该句: {}", e),
            }
        }

        observations
    }

    /// 完整抽取：标识符 × 属性，去重后返回（未富化）
    pub async fn extract(
        &self,
        text: &str,
        vocabulary: &CompiledVocabulary,
        normalizer: &dyn DurationNormalizer,
    ) -> Vec<CandidateRecord> {
        let identifiers = self.discover_identifiers(text);
        if identifiers.is_empty() {
            debug!("未发现结构标识符");
            return Vec::new();
        }

        let observations = self.discover_attributes(text, vocabulary, normalizer).await;
        let attributes = AttributeSet::from_observations(&observations);
        debug!(
            "标识符 {} 个，观测值 {} 条，组合数 {}",
            identifiers.len(),
            observations.len(),
            identifiers.len() * attributes.combination_count()
        );

        dedup_candidates(assemble_candidates(&identifiers, &attributes))
    }
}
