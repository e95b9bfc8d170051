use async_trait::async_trait;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::core::error::FetchError;

pub const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// Features pulled from one HTML document. Missing elements leave their
/// field empty or false.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapedPage {
    pub url: String,
    pub title: String,
    pub meta_description: String,
    pub h1_tags: Vec<String>,
    pub h2_tags: Vec<String>,
    pub has_viewport: bool,
    pub has_canonical: bool,
    pub og_image: String,
    pub link_count: usize,
    pub image_count: usize,
    pub has_nav: bool,
    pub has_footer: bool,
    pub has_form: bool,
}

/// Adds `https://` when the input has no http(s) scheme, then checks that the
/// result is an absolute http(s) URL.
pub fn normalize_url(raw: &str) -> Result<String, FetchError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(FetchError::InvalidUrl(raw.to_string()));
    }
    let lower = trimmed.to_ascii_lowercase();
    let normalized = if lower.starts_with("http://") || lower.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };
    match Url::parse(&normalized) {
        Ok(parsed) if parsed.host_str().is_some_and(|h| !h.is_empty()) => Ok(normalized),
        _ => Err(FetchError::InvalidUrl(raw.to_string())),
    }
}

/// Retrieves the HTML body at a URL.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

pub struct HttpFetcher {
    client: Client,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent(BROWSER_USER_AGENT)
            .timeout(timeout)
            .build()?;
        Ok(Self { client, timeout })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let network = |e: reqwest::Error| {
            if e.is_timeout() {
                FetchError::Timeout {
                    url: url.to_string(),
                    secs: self.timeout.as_secs(),
                }
            } else {
                FetchError::Network {
                    url: url.to_string(),
                    reason: e.to_string(),
                }
            }
        };

        let res = self.client.get(url).send().await.map_err(network)?;
        let status = res.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        res.text().await.map_err(network)
    }
}

fn select<'a>(doc: &'a Html, css: &str) -> Vec<ElementRef<'a>> {
    match Selector::parse(css) {
        Ok(selector) => doc.select(&selector).collect(),
        Err(_) => Vec::new(),
    }
}

fn text_of(el: &ElementRef) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn first_attr(doc: &Html, css: &str, attr: &str) -> String {
    select(doc, css)
        .first()
        .and_then(|el| el.value().attr(attr))
        .unwrap_or_default()
        .trim()
        .to_string()
}

fn headings(doc: &Html, css: &str, limit: usize) -> Vec<String> {
    select(doc, css).iter().take(limit).map(text_of).collect()
}

/// Parses `html` and extracts the page features. Never fails; a document
/// that is not HTML at all simply yields an empty page.
pub fn extract_features(url: &str, html: &str) -> ScrapedPage {
    let doc = Html::parse_document(html);

    let title = select(&doc, "title")
        .first()
        .map(text_of)
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| "No title".to_string());

    ScrapedPage {
        url: url.to_string(),
        title,
        meta_description: first_attr(&doc, r#"meta[name="description"]"#, "content"),
        h1_tags: headings(&doc, "h1", 3),
        h2_tags: headings(&doc, "h2", 5),
        has_viewport: !select(&doc, r#"meta[name="viewport"]"#).is_empty(),
        has_canonical: !select(&doc, r#"link[rel~="canonical"]"#).is_empty(),
        og_image: first_attr(&doc, r#"meta[property="og:image"]"#, "content"),
        link_count: select(&doc, "a").len(),
        image_count: select(&doc, "img").len(),
        has_nav: !select(&doc, "nav").is_empty(),
        has_footer: !select(&doc, "footer").is_empty(),
        has_form: !select(&doc, "form").is_empty(),
    }
}
