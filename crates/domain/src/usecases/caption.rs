//! Caption composition - turns scraped metadata into post text
//!
//! Two strategies implement [`CaptionComposer`]:
//! - [`DeterministicComposer`]: `title | date | body` with fixed truncation rules
//! - [`AssistedComposer`]: asks a [`TextGenerator`] for a caption, then pulls
//!   hashtags and a `Creator Name:` trailer out of the generated text

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use scraper::Html;

use crate::{
    model::{CaptionRequest, CaptionResult, ScrapedData},
    ports::{CaptionComposer, TextGenerator},
};

/// Appended to any field that had to be cut
pub const TRUNCATION_SUFFIX: &str = "... ";

/// Separator between caption segments
pub const SEGMENT_SEPARATOR: &str = " | ";

static HASHTAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"#\w+").expect("hashtag pattern is valid"));

static CREATOR_TRAILER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)\bcreator\s+name\s*:\s*(.*)$").expect("creator pattern is valid")
});

/// Character budgets for captions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptionLimits {
    /// Maximum title characters before the suffix
    pub title_max_chars: usize,
    /// Budget shared by title allowance, separator and body
    pub total_max_chars: usize,
}

impl Default for CaptionLimits {
    fn default() -> Self {
        Self {
            title_max_chars: 50,
            total_max_chars: 290,
        }
    }
}

impl CaptionLimits {
    /// Characters left for the body once the title allowance and separator are spent
    pub fn body_budget(&self, separator: &str) -> usize {
        self.total_max_chars
            .saturating_sub(self.title_max_chars)
            .saturating_sub(separator.chars().count())
    }
}

/// Cut `text` to `max_chars` characters, appending [`TRUNCATION_SUFFIX`] if anything was cut
///
/// The suffix is not counted against the budget.
pub fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}{}", &text[..cut], TRUNCATION_SUFFIX),
        None => text.to_string(),
    }
}

/// Decode HTML character references (`&amp;`, `&#39;`, ...) in plain text
pub fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }

    // Escape `<` so the parser sees only text and character references, never tags
    let fragment = Html::parse_fragment(&text.replace('<', "&lt;"));
    fragment.root_element().text().collect()
}

/// The separator emitted between title and body
///
/// `" | 1900-1910 | "` when a date is known, a single `" | "` otherwise.
pub fn date_segment(image_date: &str) -> String {
    let date = image_date.trim();
    if date.is_empty() {
        SEGMENT_SEPARATOR.to_string()
    } else {
        format!("{SEGMENT_SEPARATOR}{date}{SEGMENT_SEPARATOR}")
    }
}

/// Build the deterministic `title | date | body` caption
pub fn compose_deterministic(data: &ScrapedData, limits: &CaptionLimits) -> String {
    let title = decode_entities(&data.title);
    let summary = decode_entities(&data.summary);
    let alt_summary = decode_entities(&data.alt_summary);

    // An empty summary falls back to the alternate title
    let body = if summary.trim().is_empty() {
        alt_summary
    } else {
        summary
    };

    let separator = date_segment(&data.image_date);
    let body_budget = limits.body_budget(&separator);

    format!(
        "{}{}{}",
        truncate(&title, limits.title_max_chars),
        separator,
        truncate(&body, body_budget)
    )
}

/// Split generated text into caption text, hashtags and creator attribution
pub fn parse_assisted_caption(raw: &str, limits: &CaptionLimits) -> CaptionResult {
    let tags: Vec<String> = HASHTAG
        .find_iter(raw)
        .map(|m| m.as_str().to_string())
        .collect();
    let without_tags = HASHTAG.replace_all(raw, " ");

    let (body, creator_name) = match CREATOR_TRAILER.captures(&without_tags) {
        Some(captures) => {
            let start = captures.get(0).map_or(without_tags.len(), |m| m.start());
            let name = captures
                .get(1)
                .map(|m| m.as_str().split_whitespace().collect::<Vec<_>>().join(" "))
                .map(|name| name.trim_end_matches('.').trim().to_string())
                .filter(|name| !name.is_empty());
            (&without_tags[..start], name)
        }
        None => (without_tags.as_ref(), None),
    };

    let text = body.split_whitespace().collect::<Vec<_>>().join(" ");

    CaptionResult {
        text: truncate(&text, limits.total_max_chars),
        tags,
        creator_name,
    }
}

/// Fixed-format captions; always produces a result
#[derive(Debug, Clone, Default)]
pub struct DeterministicComposer {
    limits: CaptionLimits,
}

impl DeterministicComposer {
    pub fn new(limits: CaptionLimits) -> Self {
        Self { limits }
    }
}

#[async_trait]
impl CaptionComposer for DeterministicComposer {
    async fn compose(&self, data: &ScrapedData) -> Option<CaptionResult> {
        let text = compose_deterministic(data, &self.limits);
        tracing::debug!(chars = text.chars().count(), "Composed deterministic caption");
        Some(CaptionResult::plain(text))
    }

    fn strategy(&self) -> &'static str {
        "deterministic"
    }
}

/// Language-model captions with deterministic post-processing
pub struct AssistedComposer<G: TextGenerator + ?Sized> {
    generator: Option<Arc<G>>,
    limits: CaptionLimits,
}

impl<G: TextGenerator + ?Sized> AssistedComposer<G> {
    pub fn new(generator: Arc<G>, limits: CaptionLimits) -> Self {
        Self {
            generator: Some(generator),
            limits,
        }
    }

    /// A composer whose generator could not be configured (e.g. missing API key)
    pub fn unavailable(limits: CaptionLimits) -> Self {
        Self {
            generator: None,
            limits,
        }
    }
}

#[async_trait]
impl<G: TextGenerator + ?Sized> CaptionComposer for AssistedComposer<G> {
    async fn compose(&self, data: &ScrapedData) -> Option<CaptionResult> {
        let Some(generator) = &self.generator else {
            tracing::warn!("No text generator configured, skipping assisted caption");
            return None;
        };

        let request = CaptionRequest {
            data: data.clone(),
            max_chars: self.limits.total_max_chars,
        };

        let raw = match generator.generate(&request).await {
            Ok(raw) => raw,
            Err(error) => {
                tracing::error!(error = %error, "Text generation failed");
                return None;
            }
        };

        let caption = parse_assisted_caption(&raw, &self.limits);
        if caption.text.is_empty() {
            tracing::warn!(raw = %raw, "Generated caption is empty after post-processing");
            return None;
        }

        tracing::debug!(
            chars = caption.text.chars().count(),
            tags = ?caption.tags,
            creator = ?caption.creator_name,
            "Composed assisted caption"
        );

        Some(caption)
    }

    fn strategy(&self) -> &'static str {
        "assisted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::GenerateError;

    const LONG_TITLE: &str = "A very, super, ultra long title text for the test photo";
    const LONG_SUMMARY: &str = "A summary of the photo to be used in the post description. It is very long and contains three sentences. This is the third sentence and it contains quite a few extra characters so it requires truncation and goes beyond the character limit of 300 characters.";

    fn scraped(title: &str, image_date: &str, summary: &str, alt_summary: &str) -> ScrapedData {
        ScrapedData {
            title: title.to_string(),
            image_date: image_date.to_string(),
            summary: summary.to_string(),
            alt_summary: alt_summary.to_string(),
            ..Default::default()
        }
    }

    struct FixedGenerator(Result<String, ()>);

    #[async_trait]
    impl TextGenerator for FixedGenerator {
        async fn generate(&self, _request: &CaptionRequest) -> Result<String, GenerateError> {
            self.0
                .clone()
                .map_err(|_| GenerateError::Api("boom".to_string()))
        }
    }

    #[test]
    fn test_truncate_cuts_and_appends_suffix() {
        assert_eq!(truncate("My very long string here", 10), "My very lo... ");
    }

    #[test]
    fn test_truncate_leaves_short_text_alone() {
        assert_eq!(truncate("My short string", 50), "My short string");
        assert_eq!(truncate("exactly ten", 11), "exactly ten");
    }

    #[test]
    fn test_truncate_counts_characters_not_bytes() {
        assert_eq!(truncate("Café Ñandú", 4), "Café... ");
        assert_eq!(truncate("Café", 4), "Café");
    }

    #[test]
    fn test_decode_entities() {
        assert_eq!(decode_entities("Tom &amp; Jerry"), "Tom & Jerry");
        assert_eq!(decode_entities("Miner&#39;s cabin"), "Miner's cabin");
        assert_eq!(decode_entities("No entities here"), "No entities here");
    }

    #[test]
    fn test_decode_entities_keeps_angle_bracket_text() {
        assert_eq!(
            decode_entities("Crate <b>Fragile</b> &amp; <Denver depot"),
            "Crate <b>Fragile</b> & <Denver depot"
        );
        assert_eq!(decode_entities("Price &lt;5 cents"), "Price <5 cents");
    }

    #[test]
    fn test_compose_with_date() {
        let data = scraped(LONG_TITLE, "1900 - 1910", LONG_SUMMARY, "An alt summary");
        let text = compose_deterministic(&data, &CaptionLimits::default());

        let expected = "A very, super, ultra long title text for the test ...  | 1900 - 1910 | A summary of the photo to be used in the post description. It is very long and contains three sentences. This is the third sentence and it contains quite a few extra characters so it requires truncation and goes beyond the ... ";
        assert_eq!(text, expected);
        assert_eq!(text.chars().count(), 298);
    }

    #[test]
    fn test_compose_without_date_uses_single_separator() {
        let data = scraped(LONG_TITLE, "", LONG_SUMMARY, "An alt summary");
        let text = compose_deterministic(&data, &CaptionLimits::default());

        let expected = "A very, super, ultra long title text for the test ...  | A summary of the photo to be used in the post description. It is very long and contains three sentences. This is the third sentence and it contains quite a few extra characters so it requires truncation and goes beyond the character limi... ";
        assert_eq!(text, expected);
        assert_eq!(text.matches(" | ").count(), 1);
    }

    #[test]
    fn test_compose_stays_near_budget() {
        let title = "T".repeat(60);
        let summary = "S".repeat(300);
        let data = scraped(&title, "1900-1910", &summary, "x");
        let text = compose_deterministic(&data, &CaptionLimits::default());

        assert!(text.chars().count() <= 300, "too long: {}", text.chars().count());
        assert!(text.starts_with(&format!("{}... ", "T".repeat(50))));
        let (_, rest) = text.split_once(" | 1900-1910 | ").unwrap();
        assert!(rest.starts_with('S'));
        assert!(rest.ends_with("... "));
    }

    #[test]
    fn test_compose_short_fields_are_untouched() {
        let data = scraped(
            "Union Station",
            "1925",
            "Travelers at the depot.",
            "Depot",
        );
        let text = compose_deterministic(&data, &CaptionLimits::default());

        assert_eq!(text, "Union Station | 1925 | Travelers at the depot.");
    }

    #[test]
    fn test_compose_empty_summary_falls_back_to_alt_summary() {
        let data = scraped("Union Station", "", "", "Alternate Title Depot view");
        let text = compose_deterministic(&data, &CaptionLimits::default());

        assert_eq!(text, "Union Station | Alternate Title Depot view");
    }

    #[test]
    fn test_compose_decodes_entities_before_truncating() {
        let title = format!("{}&amp;", "A".repeat(49));
        let data = scraped(&title, "", "Rock &amp; roll", "");
        let text = compose_deterministic(&data, &CaptionLimits::default());

        assert_eq!(text, format!("{}& | Rock & roll", "A".repeat(49)));
    }

    #[test]
    fn test_compose_tolerates_missing_fields() {
        let text = compose_deterministic(&ScrapedData::default(), &CaptionLimits::default());
        assert_eq!(text, " | ");
    }

    #[test]
    fn test_parse_assisted_caption_extracts_tags_and_creator() {
        let raw = "Skiers pause on the slopes above town. #tag1 #tag2\nCreator Name: Jane Doe";
        let caption = parse_assisted_caption(raw, &CaptionLimits::default());

        assert_eq!(caption.tags, vec!["#tag1", "#tag2"]);
        assert_eq!(caption.creator_name.as_deref(), Some("Jane Doe"));
        assert_eq!(caption.text, "Skiers pause on the slopes above town.");
        assert!(!caption.text.contains('#'));
        assert!(!caption.text.contains("Creator Name"));
    }

    #[test]
    fn test_parse_assisted_caption_without_annotations() {
        let raw = "  A streetcar on Colfax Avenue.  ";
        let caption = parse_assisted_caption(raw, &CaptionLimits::default());

        assert_eq!(caption.text, "A streetcar on Colfax Avenue.");
        assert!(caption.tags.is_empty());
        assert!(caption.creator_name.is_none());
    }

    #[test]
    fn test_parse_assisted_caption_ignores_empty_creator() {
        let caption =
            parse_assisted_caption("Mountain view. Creator Name:", &CaptionLimits::default());

        assert_eq!(caption.text, "Mountain view.");
        assert!(caption.creator_name.is_none());
    }

    #[tokio::test]
    async fn test_deterministic_composer_always_returns_caption() {
        let composer = DeterministicComposer::default();
        let caption = composer.compose(&ScrapedData::default()).await;

        assert!(caption.is_some());
        assert_eq!(composer.strategy(), "deterministic");
    }

    #[tokio::test]
    async fn test_assisted_composer_post_processes_output() {
        let generator = Arc::new(FixedGenerator(Ok(
            "Miners at the Smuggler mine. #mining #colorado Creator Name: William Jackson".to_string(),
        )));
        let composer = AssistedComposer::new(generator, CaptionLimits::default());

        let caption = composer.compose(&ScrapedData::default()).await.unwrap();

        assert_eq!(caption.text, "Miners at the Smuggler mine.");
        assert_eq!(caption.tags, vec!["#mining", "#colorado"]);
        assert_eq!(caption.creator_name.as_deref(), Some("William Jackson"));
    }

    #[tokio::test]
    async fn test_assisted_composer_returns_none_on_generator_error() {
        let composer = AssistedComposer::new(
            Arc::new(FixedGenerator(Err(()))),
            CaptionLimits::default(),
        );

        assert!(composer.compose(&ScrapedData::default()).await.is_none());
    }

    #[tokio::test]
    async fn test_assisted_composer_without_generator_returns_none() {
        let composer = AssistedComposer::<FixedGenerator>::unavailable(CaptionLimits::default());

        assert!(composer.compose(&ScrapedData::default()).await.is_none());
        assert_eq!(composer.strategy(), "assisted");
    }
}
