use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::record::CandidateRecord;

/// 文章元数据（来自文献检索）
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ArticleMetadata {
    /// 外部标识（PMID）
    pub external_id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abstract_text: Option<String>,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub journal: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pub_date: Option<String>,
}

/// 章节：(标题, 正文)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chapter {
    pub title: String,
    pub content: String,
}

impl Chapter {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
        }
    }
}

/// 从 `<table>` 转换出的表格
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TableData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    /// 表头（按列顺序）
    pub headers: Vec<String>,
    /// 每一行：表头 -> 单元格
    pub rows: Vec<BTreeMap<String, String>>,
}

/// 下载的图片
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImageData {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// 二进制内容，快照中以 base64 保存
    #[serde(default, with = "base64_bytes", skip_serializing_if = "Vec::is_empty")]
    pub bytes: Vec<u8>,
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

/// 一次成功抓取得到的全部内容
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FetchedContent {
    pub chapters: Vec<Chapter>,
    #[serde(default)]
    pub tables: Vec<TableData>,
    #[serde(default)]
    pub images: Vec<ImageData>,
}

/// 抓取任务，创建后不可变
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTarget {
    /// DOI
    identifier: String,
    canonical_url: String,
    display_title: String,
}

impl FetchTarget {
    pub fn new(identifier: impl Into<String>, canonical_url: impl Into<String>, display_title: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            canonical_url: canonical_url.into(),
            display_title: display_title.into(),
        }
    }

    /// 由 DOI 构造，落地页为 doi.org 解析地址
    pub fn from_doi(doi: &str, display_title: &str) -> Self {
        Self::new(doi, format!("https://doi.org/{}", doi), display_title)
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn canonical_url(&self) -> &str {
        &self.canonical_url
    }

    pub fn display_title(&self) -> &str {
        &self.display_title
    }
}

/// 单个抓取任务的结果，每个 FetchTarget 只产生一次
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// 成功：章节 / 表格 / 图片
    Succeeded(FetchedContent),
    /// 出版商在黑名单中
    Discredited { reason: String },
    /// 本轮失败，下次运行可重试
    Failed { error: String },
}

impl FetchOutcome {
    pub fn state(&self) -> FetchState {
        match self {
            FetchOutcome::Succeeded(_) => FetchState::Succeeded,
            FetchOutcome::Discredited { .. } => FetchState::Discredited,
            FetchOutcome::Failed { .. } => FetchState::Failed,
        }
    }
}

/// 抓取状态机：Pending → Fetching → {Succeeded | Discredited | Failed}
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FetchState {
    #[default]
    Pending,
    Fetching,
    Succeeded,
    Discredited,
    Failed,
}

impl FetchState {
    /// Succeeded / Discredited 为终态；Failed 可在后续运行中重试
    pub fn is_terminal(self) -> bool {
        matches!(self, FetchState::Succeeded | FetchState::Discredited)
    }
}

/// 文章：元数据 + 抓取内容 + 结构化记录
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Article {
    #[serde(flatten)]
    pub metadata: ArticleMetadata,
    #[serde(default)]
    pub fetch_state: FetchState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discredited_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fetched_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub chapters: Vec<Chapter>,
    #[serde(default)]
    pub tables: Vec<TableData>,
    #[serde(default)]
    pub images: Vec<ImageData>,
    #[serde(default)]
    pub records: Vec<CandidateRecord>,
}

impl Article {
    pub fn from_metadata(metadata: ArticleMetadata) -> Self {
        Self {
            metadata,
            ..Default::default()
        }
    }

    pub fn external_id(&self) -> &str {
        &self.metadata.external_id
    }

    /// 内容已抓取完成
    pub fn is_complete(&self) -> bool {
        self.fetch_state == FetchState::Succeeded
    }

    pub fn is_discredited(&self) -> bool {
        self.fetch_state == FetchState::Discredited
    }

    /// 需要抓取内容：未完成、未被拉黑、有 DOI
    pub fn needs_content(&self) -> bool {
        !self.is_complete() && !self.is_discredited() && self.metadata.doi.is_some()
    }

    pub fn fetch_target(&self) -> Option<FetchTarget> {
        self.metadata
            .doi
            .as_deref()
            .map(|doi| FetchTarget::from_doi(doi, &self.metadata.title))
    }

    /// 进入抓取：非终态的文章标记为 Fetching，返回是否标记成功
    pub fn begin_fetch(&mut self) -> bool {
        if self.fetch_state.is_terminal() {
            return false;
        }
        self.fetch_state = FetchState::Fetching;
        true
    }

    /// 应用抓取结果
    pub fn apply_outcome(&mut self, outcome: &FetchOutcome) {
        self.fetch_state = outcome.state();
        match outcome {
            FetchOutcome::Succeeded(content) => {
                self.chapters = content.chapters.clone();
                self.tables = content.tables.clone();
                self.images = content.images.clone();
                self.fetched_at = Some(Utc::now());
            }
            FetchOutcome::Discredited { reason } => {
                self.discredited_reason = Some(reason.clone());
            }
            FetchOutcome::Failed { .. } => {}
        }
    }

    /// 拼接所有章节文本，作为抽取引擎的输入
    pub fn full_text(&self) -> String {
        self.chapters
            .iter()
            .map(|c| format!("{}\n{}", c.title, c.content))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}
