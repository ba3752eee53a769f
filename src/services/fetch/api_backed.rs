//! 出版商 API 抓取
//!
//! - Elsevier：Article Retrieval API 返回全文 XML，按 section 拆章节
//! - Wiley：TDM API 返回 PDF，每页一个伪章节（不尝试跨页合并）
//!
//! 每个出版商持有各自的限流客户端；任何非成功状态都作为错误返回，
//! 由上层转为 `FetchOutcome::Failed`。

use std::time::Duration;

use lopdf::Document;
use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::{debug, info, warn};
use url::form_urlencoded::byte_serialize;

use crate::config::Config;
use crate::error::{ApiError, AppError, AppResult, ParseError};
use crate::infrastructure::{RateLimitedClient, RetryPolicy};
use crate::models::{Chapter, FetchTarget, FetchedContent};
use crate::services::fetch::generic::is_blocked_title;
use crate::services::publisher_router::PublisherKind;

struct ElsevierApi {
    http: RateLimitedClient,
    base_url: String,
    api_key: String,
}

struct WileyApi {
    http: RateLimitedClient,
    base_url: String,
    token: String,
}

/// 出版商 API 客户端（只包含已配置凭据的出版商）
pub struct PublisherApiClient {
    elsevier: Option<ElsevierApi>,
    wiley: Option<WileyApi>,
}

fn encode_doi(doi: &str) -> String {
    byte_serialize(doi.as_bytes()).collect()
}

impl PublisherApiClient {
    pub fn new(config: &Config) -> AppResult<Self> {
        let interval = Duration::from_millis(config.publisher_min_interval_ms);

        let elsevier = match &config.elsevier_api_key {
            Some(key) => Some(ElsevierApi {
                http: RateLimitedClient::new("elsevier", interval, RetryPolicy::default())?,
                base_url: config.elsevier_api_base_url.trim_end_matches('/').to_string(),
                api_key: key.clone(),
            }),
            None => None,
        };
        let wiley = match &config.wiley_tdm_token {
            Some(token) => Some(WileyApi {
                http: RateLimitedClient::new("wiley", interval, RetryPolicy::default())?,
                base_url: config.wiley_api_base_url.trim_end_matches('/').to_string(),
                token: token.clone(),
            }),
            None => None,
        };

        Ok(Self { elsevier, wiley })
    }

    /// 不启用任何出版商 API
    pub fn disabled() -> Self {
        Self {
            elsevier: None,
            wiley: None,
        }
    }

    /// 已配置凭据的出版商
    pub fn enabled_kinds(&self) -> Vec<PublisherKind> {
        let mut kinds = Vec::new();
        if self.elsevier.is_some() {
            kinds.push(PublisherKind::Elsevier);
        }
        if self.wiley.is_some() {
            kinds.push(PublisherKind::Wiley);
        }
        kinds
    }

    /// 通过出版商 API 获取全文
    pub async fn fetch(&self, kind: PublisherKind, target: &FetchTarget) -> AppResult<FetchedContent> {
        let chapters = match kind {
            PublisherKind::Elsevier => {
                let api = self.elsevier.as_ref().ok_or_else(|| missing_credentials(kind))?;
                fetch_elsevier(api, target.identifier()).await?
            }
            PublisherKind::Wiley => {
                let api = self.wiley.as_ref().ok_or_else(|| missing_credentials(kind))?;
                fetch_wiley(api, target.identifier()).await?
            }
        };

        if chapters.is_empty() {
            return Err(ApiError::EmptyResponse {
                endpoint: kind.name().to_string(),
            }
            .into());
        }
        info!("📄 {} API 返回 {} 个章节: {}", kind.name(), chapters.len(), target.identifier());
        Ok(FetchedContent {
            chapters,
            ..Default::default()
        })
    }
}

fn missing_credentials(kind: PublisherKind) -> AppError {
    AppError::Other(format!("{} API 未配置凭据", kind.name()))
}

async fn fetch_elsevier(api: &ElsevierApi, doi: &str) -> AppResult<Vec<Chapter>> {
    let url = format!("{}/content/article/doi/{}", api.base_url, encode_doi(doi));
    let xml = api
        .http
        .send_text(|client| {
            client
                .get(&url)
                .query(&[("httpAccept", "text/xml")])
                .header("X-ELS-APIKey", &api.api_key)
                .header(reqwest::header::ACCEPT, "text/xml")
        })
        .await?;
    parse_elsevier_xml(&xml)
}

async fn fetch_wiley(api: &WileyApi, doi: &str) -> AppResult<Vec<Chapter>> {
    let url = format!("{}/onlinelibrary/tdm/v1/articles/{}", api.base_url, encode_doi(doi));
    let bytes = api
        .http
        .send_bytes(|client| {
            client
                .get(&url)
                .header("Wiley-TDM-Client-Token", &api.token)
                .header(reqwest::header::ACCEPT, "application/pdf")
        })
        .await?;
    debug!("Wiley PDF 大小: {} 字节", bytes.len());

    tokio::task::spawn_blocking(move || pdf_to_chapters(&bytes))
        .await
        .map_err(|e| AppError::Parse(ParseError::Pdf(e.to_string())))?
}

fn push_text(target: &mut String, text: &str) {
    if text.is_empty() {
        return;
    }
    if !target.is_empty() && !target.ends_with(char::is_whitespace) {
        target.push(' ');
    }
    target.push_str(text);
}

fn finish_paragraph(target: &mut String) {
    let trimmed = target.trim_end().len();
    target.truncate(trimmed);
    if !target.is_empty() {
        target.push('\n');
    }
}

/// 解析 Elsevier 全文 XML
///
/// 摘要作为第一个章节；每个（含嵌套的）section 一个章节，正文取其直属段落。
/// 没有 section 时退回 `originalText` 的全部文本。
pub fn parse_elsevier_xml(xml: &str) -> AppResult<Vec<Chapter>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    let mut stack: Vec<String> = Vec::new();
    let mut sections: Vec<(String, String)> = Vec::new();
    let mut open_sections: Vec<usize> = Vec::new();
    let mut abstract_text = String::new();
    let mut description = String::new();
    let mut raw_text = String::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                if name == "section" && !stack.iter().any(|s| s == "abstract") {
                    sections.push((String::new(), String::new()));
                    open_sections.push(sections.len() - 1);
                }
                stack.push(name);
            }
            Ok(Event::End(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                stack.pop();
                match name.as_str() {
                    "section" if !stack.iter().any(|s| s == "abstract") => {
                        open_sections.pop();
                    }
                    "para" | "simple-para" => {
                        if let Some(&index) = open_sections.last() {
                            finish_paragraph(&mut sections[index].1);
                        }
                        if stack.iter().any(|s| s == "abstract") {
                            finish_paragraph(&mut abstract_text);
                        }
                        finish_paragraph(&mut raw_text);
                    }
                    _ => {}
                }
            }
            Ok(Event::Text(e)) => {
                let text = e.unescape().map_err(|err| ParseError::Xml(err.to_string()))?;
                let text = text.trim();
                let within = |tag: &str| stack.iter().any(|s| s == tag);
                let top = stack.last().map(String::as_str).unwrap_or("");
                let parent = stack.len().checked_sub(2).and_then(|i| stack.get(i)).map(String::as_str);

                if within("abstract") {
                    if top != "section-title" {
                        push_text(&mut abstract_text, text);
                    }
                } else if top == "description" && parent == Some("coredata") {
                    push_text(&mut description, text);
                } else if let Some(&index) = open_sections.last() {
                    if top == "section-title" && parent == Some("section") {
                        push_text(&mut sections[index].0, text);
                    } else if within("para") || within("simple-para") || within("list-item") {
                        push_text(&mut sections[index].1, text);
                    }
                }
                if within("originalText") && !within("abstract") && !within("bibliography") && !within("tail") {
                    push_text(&mut raw_text, text);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ParseError::Xml(e.to_string()).into()),
            _ => {}
        }
        buf.clear();
    }

    let mut chapters = Vec::new();
    let abstract_text = if abstract_text.trim().is_empty() {
        description
    } else {
        abstract_text
    };
    if !abstract_text.trim().is_empty() {
        chapters.push(Chapter::new("Abstract", abstract_text.trim()));
    }

    let section_chapters: Vec<Chapter> = sections
        .into_iter()
        .filter(|(title, content)| !content.trim().is_empty() && !is_blocked_title(title))
        .map(|(title, content)| Chapter::new(title.trim(), content.trim()))
        .collect();

    if section_chapters.is_empty() {
        if !raw_text.trim().is_empty() {
            chapters.push(Chapter::new("Full Text", raw_text.trim()));
        }
    } else {
        chapters.extend(section_chapters);
    }
    Ok(chapters)
}

/// PDF 按页转为章节，无法提取文字的页跳过
pub fn pdf_to_chapters(bytes: &[u8]) -> AppResult<Vec<Chapter>> {
    let document = Document::load_mem(bytes).map_err(|e| ParseError::Pdf(e.to_string()))?;

    let mut chapters = Vec::new();
    for page_number in document.get_pages().keys() {
        match document.extract_text(&[*page_number]) {
            Ok(text) if !text.trim().is_empty() => {
                chapters.push(Chapter::new(format!("Page {}", page_number), text.trim()));
            }
            Ok(_) => {}
            Err(e) => warn!("⚠️ PDF 第 {} 页文字提取失败: {}", page_number, e),
        }
    }
    Ok(chapters)
}
