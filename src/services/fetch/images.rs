//! 正文图片：按主机关键字白名单筛选并下载
//!
//! 单张图片下载失败只记日志，不影响章节抽取。

use phf::phf_map;
use reqwest::Client;
use scraper::Html;
use tracing::{debug, warn};
use url::Url;

use crate::error::AppResult;
use crate::models::ImageData;
use crate::services::fetch::selector;

/// 每篇文章最多下载的图片数
const MAX_IMAGES: usize = 20;

/// 主机 → 图片 URL / alt 中必须出现的关键字之一
static HOST_IMAGE_KEYWORDS: phf::Map<&'static str, &'static [&'static str]> = phf_map! {
    "ncbi.nlm.nih.gov" => &["/figures/", "bin/", "fig"],
    "europepmc.org" => &["fig", "/figures/"],
    "sciencedirect.com" => &["gr", "fx"],
    "pubs.acs.org" => &["figure", "/asset/images/"],
    "nature.com" => &["fig", "media.springernature.com"],
    "link.springer.com" => &["fig", "media.springernature.com"],
    "onlinelibrary.wiley.com" => &["fig", "/cms/asset/"],
    "mdpi.com" => &["/article_deploy/", "g0"],
    "frontiersin.org" => &["image_m", "fig"],
    "plos.org" => &["figure", ".g0"],
    "pnas.org" => &["figure", "/asset/images/"],
    "biorxiv.org" => &["large.jpg", "fig"],
};

/// 未登记主机使用的关键字
const DEFAULT_KEYWORDS: &[&str] = &["figure", "fig"];

/// 待下载的图片
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageCandidate {
    pub url: String,
    pub alt: Option<String>,
}

fn keywords_for(host: &str) -> &'static [&'static str] {
    let host = host.strip_prefix("www.").unwrap_or(host);
    let mut candidate = host;
    loop {
        if let Some(keywords) = HOST_IMAGE_KEYWORDS.get(candidate) {
            return keywords;
        }
        match candidate.split_once('.') {
            Some((_, rest)) if rest.contains('.') => candidate = rest,
            _ => return DEFAULT_KEYWORDS,
        }
    }
}

/// 收集页面中符合白名单的图片（相对地址按页面 URL 解析）
pub fn collect_image_candidates(document: &Html, page_url: &str) -> AppResult<Vec<ImageCandidate>> {
    let base = Url::parse(page_url)?;
    let keywords = keywords_for(base.host_str().unwrap_or_default());
    let img_sel = selector("img")?;

    let mut candidates: Vec<ImageCandidate> = Vec::new();
    for img in document.select(&img_sel) {
        let element = img.value();
        let Some(src) = element
            .attr("data-src")
            .or_else(|| element.attr("src"))
            .map(str::trim)
            .filter(|s| !s.is_empty() && !s.starts_with("data:"))
        else {
            continue;
        };
        let Ok(url) = base.join(src) else {
            continue;
        };
        if !matches!(url.scheme(), "http" | "https") {
            continue;
        }

        let alt = element.attr("alt").map(str::trim).filter(|a| !a.is_empty());
        let haystack = format!("{} {}", url.as_str(), alt.unwrap_or_default()).to_lowercase();
        if !keywords.iter().any(|k| haystack.contains(&k.to_lowercase())) {
            continue;
        }

        let url = url.to_string();
        if candidates.iter().any(|c| c.url == url) {
            continue;
        }
        candidates.push(ImageCandidate {
            url,
            alt: alt.map(str::to_string),
        });
        if candidates.len() >= MAX_IMAGES {
            break;
        }
    }
    Ok(candidates)
}

/// 逐个下载，失败的图片跳过
pub async fn download_images(client: &Client, candidates: Vec<ImageCandidate>) -> Vec<ImageData> {
    let mut images = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        match download_one(client, &candidate).await {
            Ok(image) => images.push(image),
            Err(e) => warn!("⚠️ 图片下载失败 {}: {}", candidate.url, e),
        }
    }
    debug!("图片下载完成: {} 张", images.len());
    images
}

async fn download_one(client: &Client, candidate: &ImageCandidate) -> Result<ImageData, reqwest::Error> {
    let response = client.get(&candidate.url).send().await?.error_for_status()?;
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let bytes = response.bytes().await?;
    Ok(ImageData {
        url: candidate.url.clone(),
        alt: candidate.alt.clone(),
        content_type,
        bytes: bytes.to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_keywords_fall_back_through_subdomains() {
        assert_eq!(keywords_for("www.ncbi.nlm.nih.gov"), HOST_IMAGE_KEYWORDS["ncbi.nlm.nih.gov"]);
        assert_eq!(keywords_for("pmc.ncbi.nlm.nih.gov"), HOST_IMAGE_KEYWORDS["ncbi.nlm.nih.gov"]);
        assert_eq!(keywords_for("unknown.example"), DEFAULT_KEYWORDS);
    }

    #[test]
    fn filters_and_resolves_images() {
        let html = Html::parse_document(
            r#"<img src="/static/logo.png" alt="Journal logo">
               <img src="figures/fig1.jpg" alt="Figure 1">
               <img data-src="https://cdn.example.org/img/abc.png" alt="Fig. 2 RMSD">
               <img src="data:image/png;base64,AAAA" alt="figure inline">
               <img src="figures/fig1.jpg" alt="Figure 1 again">"#,
        );
        let candidates = collect_image_candidates(&html, "https://journal.example.org/articles/42/").unwrap();
        let urls: Vec<&str> = candidates.iter().map(|c| c.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://journal.example.org/articles/42/figures/fig1.jpg",
                "https://cdn.example.org/img/abc.png",
            ]
        );
    }
}
