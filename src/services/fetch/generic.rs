//! 通用页面抓取
//!
//! 流程：滚动到底部 → 读取 HTML → 三级章节识别（逐级回退，不并行）→ 表格 / 图片。
//!
//! 1. 主策略：`h1..h6` 作为章节边界
//! 2. 模板策略：`section-title` 类标题 + 通过共享 id 关联的内容块
//! 3. 兜底策略：任何类标题元素作为边界；都没有时整个 body 作为 "Full Text"

use std::collections::HashMap;
use std::time::Duration;

use phf::phf_set;
use reqwest::Client;
use scraper::{ElementRef, Html};
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::AppResult;
use crate::infrastructure::{JsExecutor, PageDriver};
use crate::models::{Chapter, FetchedContent, TableData};
use crate::services::fetch::images::{collect_image_candidates, download_images, ImageCandidate};
use crate::services::fetch::tables::extract_tables;
use crate::services::fetch::{element_text, selector};

/// 章节正文最小长度
const MIN_CONTENT_CHARS: usize = 100;
/// 主策略：空章节超过该数量则回退
const MAX_EMPTY_CHAPTERS: usize = 5;
/// 主策略"长章节"阈值
const PRIMARY_LONG_CHARS: usize = 70;
/// 模板策略"长章节"阈值
const TEMPLATE_LONG_CHARS: usize = 300;
/// 长章节数量不超过该值则回退
const MIN_LONG_CHAPTERS: usize = 3;
/// 兜底策略中作为边界的元素文本上限
const MAX_BOUNDARY_TITLE_CHARS: usize = 300;
/// 连续多少次滚动位置不变视为到底
const STUCK_LIMIT: usize = 3;

/// 样板标题（小写）
static BLOCKED_TITLES: phf::Set<&'static str> = phf_set! {
    "references",
    "reference list",
    "bibliography",
    "literature cited",
    "acknowledgments",
    "acknowledgements",
    "acknowledgment",
    "acknowledgement",
    "funding",
    "funding information",
    "author contributions",
    "author information",
    "authors and affiliations",
    "affiliations",
    "corresponding author",
    "conflict of interest",
    "conflicts of interest",
    "competing interests",
    "declaration of competing interest",
    "ethics declarations",
    "additional information",
    "supplementary material",
    "supplementary materials",
    "supplementary information",
    "supporting information",
    "electronic supplementary material",
    "data availability",
    "data availability statement",
    "code availability",
    "abbreviations",
    "footnotes",
    "keywords",
    "cookie",
    "cookies",
    "cookie settings",
    "cookie policy",
    "accept cookies",
    "we value your privacy",
    "privacy policy",
    "sign in",
    "log in",
    "login",
    "institutional login",
    "register",
    "subscribe",
    "newsletter",
    "advertisement",
    "advertising",
    "recommended articles",
    "related articles",
    "similar articles",
    "you may also like",
    "cited by",
    "citing articles",
    "article metrics",
    "rights and permissions",
    "permissions",
    "copyright",
    "about this article",
    "article info",
    "article information",
    "access options",
    "buy article",
    "purchase pdf",
    "download pdf",
    "table of contents",
    "journal menu",
    "follow us",
    "contact us",
    "share this article",
};

/// 实际生效的章节识别策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChapterTier {
    Primary,
    Template,
    Generic,
    FullText,
}

/// 章节识别结果
#[derive(Debug, Clone, PartialEq)]
pub struct ChapterExtraction {
    pub tier: ChapterTier,
    pub chapters: Vec<Chapter>,
}

/// 页面解析结果（不含需要网络的图片内容）
#[derive(Debug, Clone)]
pub struct ParsedPage {
    pub extraction: ChapterExtraction,
    pub tables: Vec<TableData>,
    pub images: Vec<ImageCandidate>,
}

/// 在 `haystack` 中按词边界查找 `needle`
fn contains_phrase(haystack: &str, needle: &str) -> bool {
    haystack.match_indices(needle).any(|(start, _)| {
        let end = start + needle.len();
        let before_ok = haystack[..start]
            .chars()
            .next_back()
            .map_or(true, |c| !c.is_alphanumeric());
        let after_ok = haystack[end..].chars().next().map_or(true, |c| !c.is_alphanumeric());
        before_ok && after_ok
    })
}

/// 标题是否属于样板内容（前缀 / 子串，双向，不区分大小写）
pub fn is_blocked_title(title: &str) -> bool {
    let normalized = title
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_matches(|c: char| !c.is_alphanumeric())
        .to_lowercase();
    if normalized.is_empty() {
        return false;
    }
    let title_chars = normalized.chars().count();

    BLOCKED_TITLES.iter().any(|blocked| {
        normalized.starts_with(blocked)
            || contains_phrase(&normalized, blocked)
            || (title_chars >= 4
                && title_chars * 2 >= blocked.chars().count()
                && contains_phrase(blocked, &normalized))
    })
}

fn is_skipped(element: &ElementRef<'_>) -> bool {
    let value = element.value();
    matches!(
        value.name(),
        "script" | "style" | "noscript" | "template" | "svg" | "head" | "button" | "select" | "iframe"
    ) || value.attr("hidden").is_some()
        || value.attr("aria-hidden") == Some("true")
}

fn is_block(name: &str) -> bool {
    matches!(
        name,
        "p" | "div" | "li" | "tr" | "br" | "section" | "article" | "table" | "ul" | "ol" | "blockquote"
            | "figcaption" | "figure" | "dd" | "dt" | "pre" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6"
    )
}

fn is_heading_tag(name: &str) -> bool {
    matches!(name, "h1" | "h2" | "h3" | "h4" | "h5" | "h6")
}

fn is_heading_element(element: &ElementRef<'_>) -> bool {
    is_heading_tag(element.value().name())
}

/// 保留块级换行的文本缓冲
#[derive(Debug, Default)]
struct TextBuffer {
    text: String,
}

impl TextBuffer {
    fn push_text(&mut self, raw: &str) {
        for word in raw.split_whitespace() {
            if !self.text.is_empty() && !self.text.ends_with('\n') && !self.text.ends_with(' ') {
                self.text.push(' ');
            }
            self.text.push_str(word);
        }
    }

    fn break_line(&mut self) {
        let trimmed = self.text.trim_end_matches(' ').len();
        self.text.truncate(trimmed);
        if !self.text.is_empty() && !self.text.ends_with('\n') {
            self.text.push('\n');
        }
    }

    fn finish(self) -> String {
        self.text.trim().to_string()
    }
}

/// 收集元素文本，`skip` 子树跳过
fn collect_text<'a>(element: ElementRef<'a>, buffer: &mut TextBuffer, skip: Option<ElementRef<'a>>) {
    for child in element.children() {
        if let Some(child_el) = ElementRef::wrap(child) {
            if is_skipped(&child_el) || skip == Some(child_el) {
                continue;
            }
            let block = is_block(child_el.value().name());
            if block {
                buffer.break_line();
            }
            collect_text(child_el, buffer, skip);
            if block {
                buffer.break_line();
            }
        } else if let Some(text) = child.value().as_text() {
            buffer.push_text(text);
        }
    }
}

/// 按边界元素切分章节，第一个边界之前的文本丢弃
struct Splitter {
    is_boundary: fn(&ElementRef<'_>) -> bool,
    chapters: Vec<Chapter>,
    current: Option<(String, TextBuffer)>,
}

impl Splitter {
    fn split(root: ElementRef<'_>, is_boundary: fn(&ElementRef<'_>) -> bool) -> Vec<Chapter> {
        let mut splitter = Splitter {
            is_boundary,
            chapters: Vec::new(),
            current: None,
        };
        splitter.walk(root);
        splitter.flush();
        splitter.chapters
    }

    fn flush(&mut self) {
        if let Some((title, buffer)) = self.current.take() {
            self.chapters.push(Chapter::new(title, buffer.finish()));
        }
    }

    fn walk(&mut self, element: ElementRef<'_>) {
        for child in element.children() {
            if let Some(child_el) = ElementRef::wrap(child) {
                if is_skipped(&child_el) {
                    continue;
                }
                if (self.is_boundary)(&child_el) {
                    self.flush();
                    self.current = Some((element_text(&child_el), TextBuffer::default()));
                    continue;
                }
                let block = is_block(child_el.value().name());
                if block {
                    self.break_line();
                }
                self.walk(child_el);
                if block {
                    self.break_line();
                }
            } else if let Some(text) = child.value().as_text() {
                if let Some((_, buffer)) = self.current.as_mut() {
                    buffer.push_text(text);
                }
            }
        }
    }

    fn break_line(&mut self) {
        if let Some((_, buffer)) = self.current.as_mut() {
            buffer.break_line();
        }
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

fn count_empty(chapters: &[Chapter]) -> usize {
    chapters.iter().filter(|c| c.content.trim().is_empty()).count()
}

fn count_long(chapters: &[Chapter], threshold: usize) -> usize {
    chapters.iter().filter(|c| char_len(&c.content) > threshold).count()
}

/// 去掉样板标题与过短正文
fn keep_substantial(chapters: &[Chapter], min_chars: usize) -> Vec<Chapter> {
    chapters
        .iter()
        .filter(|c| !is_blocked_title(&c.title))
        .filter(|c| char_len(c.content.trim()) >= min_chars)
        .cloned()
        .collect()
}

fn body_of(document: &Html) -> AppResult<ElementRef<'_>> {
    let body_sel = selector("body")?;
    Ok(document.select(&body_sel).next().unwrap_or_else(|| document.root_element()))
}

/// 主策略：`h1..h6`
fn primary_tier(document: &Html) -> AppResult<Option<Vec<Chapter>>> {
    let body = body_of(document)?;
    let raw = Splitter::split(body, is_heading_element);
    let kept = keep_substantial(&raw, MIN_CONTENT_CHARS);

    let empty = count_empty(&raw);
    let long = count_long(&raw, PRIMARY_LONG_CHARS);
    debug!("主策略: {} 个标题, 空 {}, 长 {}, 保留 {}", raw.len(), empty, long, kept.len());

    if empty > MAX_EMPTY_CHAPTERS || long <= MIN_LONG_CHAPTERS || kept.is_empty() {
        return Ok(None);
    }
    Ok(Some(kept))
}

fn has_class_fragment(element: &ElementRef<'_>, fragment: &str) -> bool {
    element.value().attr("class").map_or(false, |c| c.contains(fragment))
}

fn is_descendant_of(element: &ElementRef<'_>, ancestor: &ElementRef<'_>) -> bool {
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .any(|a| a == *ancestor)
}

/// 模板策略：`section-title` 标题 + 共享 id 的内容块
fn template_tier(document: &Html) -> AppResult<Option<Vec<Chapter>>> {
    let title_sel = selector("[class*='section-title']")?;
    let keyed_sel = selector("[data-section-id], [aria-labelledby]")?;

    let mut by_section_id: HashMap<&str, Vec<ElementRef<'_>>> = HashMap::new();
    let mut by_labelledby: HashMap<&str, Vec<ElementRef<'_>>> = HashMap::new();
    for el in document.select(&keyed_sel) {
        if let Some(key) = el.value().attr("data-section-id") {
            by_section_id.entry(key).or_default().push(el);
        }
        if let Some(keys) = el.value().attr("aria-labelledby") {
            for key in keys.split_whitespace() {
                by_labelledby.entry(key).or_default().push(el);
            }
        }
    }

    let titles: Vec<ElementRef<'_>> = document.select(&title_sel).collect();
    let mut raw = Vec::new();

    for title in &titles {
        if titles.iter().any(|other| other != title && is_descendant_of(title, other)) {
            continue;
        }

        let keys: Vec<&str> = [
            title.value().attr("data-section-id"),
            title.value().attr("id"),
            title.value().attr("data-target").map(|t| t.trim_start_matches('#')),
        ]
        .into_iter()
        .flatten()
        .filter(|k| !k.is_empty())
        .collect();

        let mut blocks: Vec<ElementRef<'_>> = Vec::new();
        for key in &keys {
            let candidates = by_section_id
                .get(key)
                .into_iter()
                .flatten()
                .chain(by_labelledby.get(key).into_iter().flatten());
            for block in candidates {
                if block != title && !has_class_fragment(block, "section-title") && !blocks.contains(block) {
                    blocks.push(*block);
                }
            }
        }
        let outermost: Vec<ElementRef<'_>> = blocks
            .iter()
            .filter(|b| !blocks.iter().any(|other| other != *b && is_descendant_of(b, other)))
            .copied()
            .collect();

        let mut buffer = TextBuffer::default();

        if outermost.is_empty() {
            // 没有共享 id 时，取到下一个标题为止的兄弟节点
            for sibling in title.next_siblings().filter_map(ElementRef::wrap) {
                if has_class_fragment(&sibling, "section-title")
                    || titles.iter().any(|t| is_descendant_of(t, &sibling))
                {
                    break;
                }
                if is_skipped(&sibling) {
                    continue;
                }
                buffer.break_line();
                collect_text(sibling, &mut buffer, Some(*title));
            }
        } else {
            for block in outermost {
                buffer.break_line();
                collect_text(block, &mut buffer, Some(*title));
            }
        }

        raw.push(Chapter::new(element_text(title), buffer.finish()));
    }

    let kept = keep_substantial(&raw, MIN_CONTENT_CHARS);
    let empty = count_empty(&raw);
    let long = count_long(&raw, TEMPLATE_LONG_CHARS);
    debug!("模板策略: {} 个标题, 空 {}, 长 {}, 保留 {}", raw.len(), empty, long, kept.len());

    if kept.len() < 2 || empty > MAX_EMPTY_CHAPTERS || long <= MIN_LONG_CHAPTERS {
        return Ok(None);
    }
    Ok(Some(kept))
}

fn is_heading_like(element: &ElementRef<'_>) -> bool {
    let value = element.value();
    if matches!(value.name(), "html" | "body" | "main" | "article") {
        return false;
    }
    let candidate = is_heading_tag(value.name())
        || value.attr("role") == Some("heading")
        || has_class_fragment(element, "title")
        || has_class_fragment(element, "section-head");
    if !candidate {
        return false;
    }
    let title_len = char_len(&element_text(element));
    title_len > 0 && title_len <= MAX_BOUNDARY_TITLE_CHARS
}

/// 兜底策略
fn generic_tier(document: &Html) -> AppResult<ChapterExtraction> {
    let body = body_of(document)?;
    let chapters: Vec<Chapter> = Splitter::split(body, is_heading_like)
        .into_iter()
        .filter(|c| !is_blocked_title(&c.title) && !c.content.trim().is_empty())
        .collect();
    if !chapters.is_empty() {
        return Ok(ChapterExtraction {
            tier: ChapterTier::Generic,
            chapters,
        });
    }

    let mut buffer = TextBuffer::default();
    collect_text(body, &mut buffer, None);
    let text = buffer.finish();
    let chapters = if text.is_empty() {
        Vec::new()
    } else {
        vec![Chapter::new("Full Text", text)]
    };
    Ok(ChapterExtraction {
        tier: ChapterTier::FullText,
        chapters,
    })
}

/// 三级章节识别
pub fn extract_chapters(document: &Html) -> AppResult<ChapterExtraction> {
    if let Some(chapters) = primary_tier(document)? {
        return Ok(ChapterExtraction {
            tier: ChapterTier::Primary,
            chapters,
        });
    }
    if let Some(chapters) = template_tier(document)? {
        return Ok(ChapterExtraction {
            tier: ChapterTier::Template,
            chapters,
        });
    }
    generic_tier(document)
}

/// 解析整页：章节 + 表格 + 图片候选；表格 / 图片失败不影响章节
pub fn parse_page(html: &str, page_url: &str) -> AppResult<ParsedPage> {
    let document = Html::parse_document(html);
    let extraction = extract_chapters(&document)?;

    let tables = extract_tables(&document).unwrap_or_else(|e| {
        warn!("⚠️ 表格提取失败: {}", e);
        Vec::new()
    });
    let images = collect_image_candidates(&document, page_url).unwrap_or_else(|e| {
        warn!("⚠️ 图片收集失败: {}", e);
        Vec::new()
    });

    Ok(ParsedPage {
        extraction,
        tables,
        images,
    })
}

/// 滚动到页面底部：先一次跳到底，未到底再逐步滚动，位置连续不变即停止
pub async fn scroll_to_bottom(
    executor: &JsExecutor<'_>,
    step: f64,
    pause: Duration,
    max_steps: usize,
) -> AppResult<()> {
    let height = executor.scroll_height().await?;
    executor.scroll_to(height).await?;
    sleep(pause).await;

    let viewport = executor.viewport_height().await?;
    let mut position = executor.scroll_position().await?;
    if position + viewport >= executor.scroll_height().await? - 1.0 {
        return Ok(());
    }

    debug!("一次滚动未到底，改为逐步滚动");
    let mut unchanged = 0;
    for _ in 0..max_steps {
        executor.scroll_to(position + step).await?;
        sleep(pause).await;
        let next = executor.scroll_position().await?;
        if (next - position).abs() < 1.0 {
            unchanged += 1;
            if unchanged >= STUCK_LIMIT {
                break;
            }
        } else {
            unchanged = 0;
        }
        position = next;
    }
    Ok(())
}

/// 通用抓取策略
pub struct GenericScraper {
    http: Client,
    scroll_step: f64,
    scroll_pause: Duration,
    max_scroll_steps: usize,
}

impl GenericScraper {
    pub fn new(http: Client) -> Self {
        Self {
            http,
            scroll_step: 800.0,
            scroll_pause: Duration::from_millis(250),
            max_scroll_steps: 200,
        }
    }

    /// 设置滚动节奏
    pub fn with_scroll(mut self, step: f64, pause: Duration, max_steps: usize) -> Self {
        self.scroll_step = step;
        self.scroll_pause = pause;
        self.max_scroll_steps = max_steps;
        self
    }

    /// 从已导航的页面抓取内容
    ///
    /// # 参数
    /// - `page`: 已完成导航的页面
    /// - `page_url`: 重定向后的最终 URL（用于解析相对图片地址）
    pub async fn fetch(&self, page: &dyn PageDriver, page_url: &str) -> AppResult<FetchedContent> {
        let executor = JsExecutor::new(page);
        if let Err(e) = scroll_to_bottom(&executor, self.scroll_step, self.scroll_pause, self.max_scroll_steps).await {
            warn!("⚠️ 滚动失败，直接读取当前页面: {}", e);
        }

        let html = page.html().await?;
        let parsed = parse_page(&html, page_url)?;
        debug!(
            "章节识别: {:?}, {} 个章节, {} 个表格, {} 张候选图片",
            parsed.extraction.tier,
            parsed.extraction.chapters.len(),
            parsed.tables.len(),
            parsed.images.len()
        );

        let images = download_images(&self.http, parsed.images).await;
        Ok(FetchedContent {
            chapters: parsed.extraction.chapters,
            tables: parsed.tables,
            images,
        })
    }
}
