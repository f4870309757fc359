//! Digital archive page source
//!
//! Fetches `{base_url}/nodes/view/{id}` and pulls the Open Graph tags plus the
//! labelled `Date` / `Summary` / `Alternate Title` fields out of the page.

use archive_poster_domain::{FetchError, PageSource, RecordId, ScrapedData};
use async_trait::async_trait;
use reqwest::{
    Client, StatusCode,
    header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue, REFERER},
};
use scraper::{ElementRef, Html, Selector};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://digital.denverlibrary.org";

// The archive answers 403 to non-browser user agents
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const BROWSER_ACCEPT: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8";
const BROWSER_ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";

/// Build a client that presents itself like a desktop browser to `origin`
pub fn browser_client(origin: &str, timeout: Duration) -> Client {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static(BROWSER_ACCEPT));
    headers.insert(
        ACCEPT_LANGUAGE,
        HeaderValue::from_static(BROWSER_ACCEPT_LANGUAGE),
    );
    if let Ok(referer) = HeaderValue::from_str(&format!("{}/", origin.trim_end_matches('/'))) {
        headers.insert(REFERER, referer);
    }

    Client::builder()
        .user_agent(BROWSER_USER_AGENT)
        .default_headers(headers)
        .timeout(timeout)
        .build()
        .expect("Failed to build HTTP client")
}

/// Page source backed by the archive website
pub struct ArchivePageSource {
    client: Client,
    base_url: String,
}

impl ArchivePageSource {
    pub fn new(timeout: Duration) -> Self {
        Self::with_base_url(DEFAULT_BASE_URL.to_string(), timeout)
    }

    pub fn with_base_url(base_url: String, timeout: Duration) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        Self {
            client: browser_client(&base_url, timeout),
            base_url,
        }
    }

    /// URL of the record page for `id`
    pub fn page_url(&self, id: &RecordId) -> String {
        format!("{}/nodes/view/{}", self.base_url, id)
    }
}

#[async_trait]
impl PageSource for ArchivePageSource {
    async fn fetch(&self, id: &RecordId) -> Result<ScrapedData, FetchError> {
        let url = self.page_url(id);
        tracing::debug!(url = %url, "Fetching record page");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::FORBIDDEN {
            return Err(FetchError::Forbidden);
        }
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let html = response
            .text()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        extract(&html)
    }
}

fn selector(css: &str) -> Result<Selector, FetchError> {
    Selector::parse(css).map_err(|e| FetchError::Parse(format!("bad selector {css:?}: {e}")))
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn meta_content(document: &Html, property: &str) -> Result<String, FetchError> {
    let selector = selector(&format!(r#"meta[property="{property}"]"#))?;
    Ok(document
        .select(&selector)
        .next()
        .and_then(|meta| meta.value().attr("content"))
        .map(|content| content.trim().to_string())
        .unwrap_or_default())
}

/// Text of the element wrapping the `.titlelabel` named `label`, without the label itself
fn labelled_field(document: &Html, labels: &Selector, label: &str) -> String {
    let Some(parent) = document
        .select(labels)
        .find(|el| collapse_whitespace(&el.text().collect::<String>()) == label)
        .and_then(|el| el.parent())
        .and_then(ElementRef::wrap)
    else {
        return String::new();
    };

    let text = collapse_whitespace(&parent.text().collect::<Vec<_>>().join(" "));
    let value = text.strip_prefix(label).unwrap_or(&text);
    value.trim().to_string()
}

/// Extract record metadata from an archive page
pub fn extract(html: &str) -> Result<ScrapedData, FetchError> {
    let document = Html::parse_document(html);
    let labels = selector(".titlelabel")?;

    Ok(ScrapedData {
        title: meta_content(&document, "og:title")?,
        image_url: meta_content(&document, "og:image")?,
        image_date: labelled_field(&document, &labels, "Date"),
        summary: labelled_field(&document, &labels, "Summary"),
        alt_summary: labelled_field(&document, &labels, "Alternate Title"),
        node_url: meta_content(&document, "og:url")?,
        description: meta_content(&document, "og:description")?,
    })
}
