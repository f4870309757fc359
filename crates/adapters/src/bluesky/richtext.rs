//! Rich-text facet detection for post text
//!
//! Offsets are UTF-8 byte offsets into the text, as the AT Protocol expects.

use serde::Serialize;
use std::sync::LazyLock;

use regex::Regex;

static LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"https?://[^\s<>"]+"#).expect("link pattern is valid"));

static MENTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|\s)(@([a-zA-Z0-9](?:[a-zA-Z0-9-]*[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]*[a-zA-Z0-9])?)+))")
        .expect("mention pattern is valid")
});

static HASHTAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|\s)(#(\w+))").expect("hashtag pattern is valid"));

/// Characters stripped from the end of a detected link
const LINK_TRAILING_PUNCTUATION: &[char] = &['.', ',', ';', ':', '!', '?', ')', '\'', '"'];

/// A detected span and the value it refers to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    /// Link URI, handle without `@`, or tag without `#`
    pub value: String,
}

/// Links in `text`, trailing punctuation excluded
pub fn find_links(text: &str) -> Vec<Span> {
    LINK.find_iter(text)
        .filter_map(|m| {
            let uri = m.as_str().trim_end_matches(LINK_TRAILING_PUNCTUATION);
            (!uri.is_empty()).then(|| Span {
                start: m.start(),
                end: m.start() + uri.len(),
                value: uri.to_string(),
            })
        })
        .collect()
}

/// `@handle` mentions in `text`
pub fn find_mentions(text: &str) -> Vec<Span> {
    MENTION
        .captures_iter(text)
        .filter_map(|captures| {
            let whole = captures.get(1)?;
            let handle = captures.get(2)?;
            Some(Span {
                start: whole.start(),
                end: whole.end(),
                value: handle.as_str().to_string(),
            })
        })
        .collect()
}

/// `#tag` hashtags in `text`; all-digit tags are ignored
pub fn find_hashtags(text: &str) -> Vec<Span> {
    HASHTAG
        .captures_iter(text)
        .filter_map(|captures| {
            let whole = captures.get(1)?;
            let tag = captures.get(2)?;
            if tag.as_str().chars().all(|c| c.is_ascii_digit()) {
                return None;
            }
            Some(Span {
                start: whole.start(),
                end: whole.end(),
                value: tag.as_str().to_string(),
            })
        })
        .collect()
}

/// `app.bsky.richtext.facet` record
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Facet {
    pub index: ByteSlice,
    pub features: Vec<FacetFeature>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ByteSlice {
    pub byte_start: usize,
    pub byte_end: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "$type")]
pub enum FacetFeature {
    #[serde(rename = "app.bsky.richtext.facet#link")]
    Link { uri: String },
    #[serde(rename = "app.bsky.richtext.facet#mention")]
    Mention { did: String },
    #[serde(rename = "app.bsky.richtext.facet#tag")]
    Tag { tag: String },
}

impl Facet {
    pub fn new(span: &Span, feature: FacetFeature) -> Self {
        Self {
            index: ByteSlice {
                byte_start: span.start,
                byte_end: span.end,
            },
            features: vec![feature],
        }
    }
}
