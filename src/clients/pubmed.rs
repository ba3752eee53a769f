//! PubMed 文献检索客户端（NCBI E-utilities）
//!
//! - `esearch`（JSON）按查询分页获取 PMID
//! - `efetch`（XML）批量获取元数据

use std::time::Duration;

use async_trait::async_trait;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::Deserialize;
use tracing::{debug, info};

use crate::clients::CatalogSearch;
use crate::config::Config;
use crate::error::{AppResult, ParseError};
use crate::infrastructure::{RateLimitedClient, RetryPolicy};
use crate::models::ArticleMetadata;

/// 单次 efetch 请求的最大 PMID 数
const EFETCH_BATCH: usize = 200;

#[derive(Debug, Deserialize)]
struct ESearchResponse {
    esearchresult: ESearchResult,
}

#[derive(Debug, Deserialize)]
struct ESearchResult {
    #[serde(default)]
    idlist: Vec<String>,
}

/// PubMed 检索客户端
pub struct PubMedCatalog {
    http: RateLimitedClient,
    base_url: String,
    api_key: Option<String>,
}

impl PubMedCatalog {
    pub fn new(config: &Config) -> AppResult<Self> {
        let http = RateLimitedClient::new(
            "pubmed",
            Duration::from_millis(config.pubmed_min_interval_ms),
            RetryPolicy::default(),
        )?;
        Ok(Self::with_client(http, &config.pubmed_base_url, config.pubmed_api_key.clone()))
    }

    pub fn with_client(http: RateLimitedClient, base_url: &str, api_key: Option<String>) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    fn params<'a>(&'a self, mut params: Vec<(&'a str, String)>) -> Vec<(&'a str, String)> {
        if let Some(key) = &self.api_key {
            params.push(("api_key", key.clone()));
        }
        params
    }
}

#[async_trait]
impl CatalogSearch for PubMedCatalog {
    async fn search(&self, query: &str, page: usize, page_size: usize) -> AppResult<Vec<String>> {
        let retstart = page.max(1).saturating_sub(1) * page_size;
        let url = format!("{}/esearch.fcgi", self.base_url);
        let params = self.params(vec![
            ("db", "pubmed".to_string()),
            ("term", query.to_string()),
            ("retmode", "json".to_string()),
            ("retstart", retstart.to_string()),
            ("retmax", page_size.to_string()),
        ]);

        let response: ESearchResponse = self
            .http
            .send_json(|client| client.get(&url).query(&params))
            .await?;

        info!(
            "🔍 检索 \"{}\" 第 {} 页: {} 条结果",
            query,
            page,
            response.esearchresult.idlist.len()
        );
        Ok(response.esearchresult.idlist)
    }

    async fn fetch_metadata(&self, ids: &[String]) -> AppResult<Vec<ArticleMetadata>> {
        let url = format!("{}/efetch.fcgi", self.base_url);
        let mut metadata = Vec::with_capacity(ids.len());

        for chunk in ids.chunks(EFETCH_BATCH) {
            let params = self.params(vec![
                ("db", "pubmed".to_string()),
                ("id", chunk.join(",")),
                ("retmode", "xml".to_string()),
            ]);
            let xml = self
                .http
                .send_text(|client| client.get(&url).query(&params))
                .await?;
            let parsed = parse_efetch_xml(&xml)?;
            debug!("efetch 返回 {} 条元数据", parsed.len());
            metadata.extend(parsed);
        }

        Ok(metadata)
    }
}

fn local_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).to_string()
}

fn has_attr(e: &BytesStart<'_>, key: &[u8], value: &str) -> bool {
    e.attributes()
        .flatten()
        .any(|attr| attr.key.as_ref() == key && attr.value.as_ref().eq_ignore_ascii_case(value.as_bytes()))
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

#[derive(Default)]
struct PubDate {
    year: String,
    month: String,
    day: String,
    medline: String,
}

impl PubDate {
    fn render(&self) -> Option<String> {
        if !self.year.is_empty() {
            let parts = [&self.year, &self.month, &self.day];
            return Some(
                parts
                    .iter()
                    .filter(|p| !p.is_empty())
                    .map(|p| p.as_str())
                    .collect::<Vec<_>>()
                    .join(" "),
            );
        }
        (!self.medline.is_empty()).then(|| self.medline.clone())
    }
}

/// 解析 efetch 返回的 PubmedArticleSet
pub fn parse_efetch_xml(xml: &str) -> AppResult<Vec<ArticleMetadata>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    let mut articles = Vec::new();
    let mut stack: Vec<String> = Vec::new();
    let mut current = ArticleMetadata::default();
    let mut abstract_text = String::new();
    let mut journal = String::new();
    let mut date = PubDate::default();
    let mut last_name = String::new();
    let mut fore_name = String::new();
    let mut collective = String::new();
    let mut doi_open = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = local_name(&e);
                match name.as_str() {
                    "PubmedArticle" => {
                        current = ArticleMetadata::default();
                        abstract_text.clear();
                        journal.clear();
                        date = PubDate::default();
                    }
                    "Author" => {
                        last_name.clear();
                        fore_name.clear();
                        collective.clear();
                    }
                    "ArticleId" => doi_open = has_attr(&e, b"IdType", "doi"),
                    "ELocationID" => doi_open = has_attr(&e, b"EIdType", "doi"),
                    _ => {}
                }
                stack.push(name);
            }
            Ok(Event::End(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                stack.pop();
                match name.as_str() {
                    "PubmedArticle" => {
                        let mut article = std::mem::take(&mut current);
                        article.abstract_text =
                            (!abstract_text.trim().is_empty()).then(|| abstract_text.trim().to_string());
                        article.journal = (!journal.is_empty()).then(|| journal.clone());
                        article.pub_date = date.render();
                        article.title = article.title.trim().to_string();
                        if !article.external_id.is_empty() {
                            articles.push(article);
                        }
                    }
                    "Author" => {
                        let full = if !collective.is_empty() {
                            collective.clone()
                        } else {
                            format!("{} {}", fore_name, last_name).trim().to_string()
                        };
                        if !full.is_empty() {
                            current.authors.push(full);
                        }
                    }
                    "AbstractText" => abstract_text.push('\n'),
                    "ArticleId" | "ELocationID" => doi_open = false,
                    _ => {}
                }
            }
            Ok(Event::Text(e)) => {
                let text = e.unescape().map_err(|err| ParseError::Xml(err.to_string()))?;
                let text = text.trim();
                let within = |tag: &str| stack.iter().any(|s| s == tag);
                let top = stack.last().map(String::as_str).unwrap_or("");
                let parent = stack.len().checked_sub(2).and_then(|i| stack.get(i)).map(String::as_str);

                if top == "PMID" && parent == Some("MedlineCitation") && current.external_id.is_empty() {
                    current.external_id = text.to_string();
                } else if within("ArticleTitle") {
                    push_text(&mut current.title, text);
                } else if within("AbstractText") {
                    push_text(&mut abstract_text, text);
                } else if within("Author") {
                    match top {
                        "LastName" => last_name = text.to_string(),
                        "ForeName" => fore_name = text.to_string(),
                        "CollectiveName" => push_text(&mut collective, text),
                        _ => {}
                    }
                } else if top == "Title" && parent == Some("Journal") {
                    journal = text.to_string();
                } else if within("PubDate") {
                    match top {
                        "Year" => date.year = text.to_string(),
                        "Month" => date.month = text.to_string(),
                        "Day" => date.day = text.to_string(),
                        "MedlineDate" => date.medline = text.to_string(),
                        _ => {}
                    }
                } else if doi_open && current.doi.is_none() {
                    current.doi = Some(text.to_string());
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ParseError::Xml(e.to_string()).into()),
            _ => {}
        }
        buf.clear();
    }

    Ok(articles)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" ?>
<PubmedArticleSet>
  <PubmedArticle>
    <MedlineCitation Status="MEDLINE">
      <PMID Version="1">31234567</PMID>
      <Article>
        <Journal>
          <JournalIssue>
            <PubDate><Year>2020</Year><Month>Mar</Month></PubDate>
          </JournalIssue>
          <Title>Journal of Chemical Theory and Computation</Title>
        </Journal>
        <ArticleTitle>Dynamics of <i>lysozyme</i> in water.</ArticleTitle>
        <ELocationID EIdType="doi" ValidYN="Y">10.1021/acs.jctc.0c00001</ELocationID>
        <Abstract>
          <AbstractText Label="BACKGROUND">We simulated lysozyme &amp; water.</AbstractText>
          <AbstractText Label="RESULTS">It was stable.</AbstractText>
        </Abstract>
        <AuthorList>
          <Author><LastName>Smith</LastName><ForeName>Jane</ForeName></Author>
          <Author><CollectiveName>MD Consortium</CollectiveName></Author>
        </AuthorList>
      </Article>
    </MedlineCitation>
    <PubmedData>
      <ArticleIdList>
        <ArticleId IdType="pubmed">31234567</ArticleId>
        <ArticleId IdType="doi">10.1021/acs.jctc.0c00001</ArticleId>
      </ArticleIdList>
    </PubmedData>
  </PubmedArticle>
</PubmedArticleSet>"#;

    #[test]
    fn parses_efetch_article() {
        let articles = parse_efetch_xml(SAMPLE).unwrap();
        assert_eq!(articles.len(), 1);
        let article = &articles[0];
        assert_eq!(article.external_id, "31234567");
        assert_eq!(article.title, "Dynamics of lysozyme in water.");
        assert_eq!(article.doi.as_deref(), Some("10.1021/acs.jctc.0c00001"));
        assert_eq!(article.journal.as_deref(), Some("Journal of Chemical Theory and Computation"));
        assert_eq!(article.pub_date.as_deref(), Some("2020 Mar"));
        assert_eq!(article.authors, vec!["Jane Smith", "MD Consortium"]);
        let abstract_text = article.abstract_text.as_deref().unwrap();
        assert!(abstract_text.contains("lysozyme & water."));
        assert!(abstract_text.contains("It was stable."));
    }

    #[test]
    fn malformed_xml_is_a_parse_error() {
        assert!(parse_efetch_xml("<PubmedArticleSet><PubmedArticle></Oops>").is_err());
    }
}
