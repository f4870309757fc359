//! LLM text generators for assisted captions

pub mod anthropic;
pub mod openai;
pub mod stub;

pub use anthropic::AnthropicGenerator;
pub use openai::OpenAiGenerator;
pub use stub::StubTextGenerator;

use archive_poster_domain::ScrapedData;
use serde::{Deserialize, Serialize};

pub const CAPTION_INSTRUCTIONS: &str = "You write short, factual social media captions for historical archive photographs. Output only the caption text.";

/// Common LLM configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Model name/ID
    pub model: String,
    /// Temperature (0.0-1.0)
    pub temperature: f64,
    /// Maximum output tokens
    pub max_output_tokens: u32,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Number of retries on failure
    pub retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            temperature: 0.4,
            max_output_tokens: 300,
            timeout_secs: 45,
            retries: 2,
        }
    }
}

/// Build the caption prompt for a record
pub fn build_caption_prompt(data: &ScrapedData, max_chars: usize) -> String {
    let mut prompt = String::new();

    prompt.push_str(
        "Write a caption for a post sharing this photograph from a public library's digital archive.\n\n",
    );

    prompt.push_str("## Record\n");
    for (label, value) in [
        ("Title", &data.title),
        ("Date", &data.image_date),
        ("Summary", &data.summary),
        ("Alternate title", &data.alt_summary),
        ("Description", &data.description),
    ] {
        let value = value.trim();
        if !value.is_empty() {
            prompt.push_str(&format!("{}: {}\n", label, value));
        }
    }

    prompt.push_str(&format!(
        r#"
## Rules
- At most {max_chars} characters, plain text, no emoji
- Describe only what the record states; do not invent names, places or dates
- You may add up to three relevant hashtags such as #denver or #history
- If the record names the photographer or creator, end with a line "Creator Name: <name>"
"#
    ));

    prompt
}

/// Strip markdown fences and wrapping quotes some models add around plain text
pub fn clean_generated_text(response: &str) -> String {
    let mut text = response.trim();

    if let Some(inner) = text.strip_prefix("```") {
        let inner = inner.strip_suffix("```").unwrap_or(inner);
        // Skip a language identifier on the opening fence line
        text = match inner.split_once('\n') {
            Some((first_line, rest)) if !first_line.contains(' ') => rest,
            _ => inner,
        }
        .trim();
    }

    if text.len() >= 2 && text.starts_with('"') && text.ends_with('"') {
        text = text[1..text.len() - 1].trim();
    }

    text.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_includes_fields_and_budget() {
        let data = ScrapedData {
            title: "Union Station".to_string(),
            image_date: "1905".to_string(),
            summary: "Travelers at the depot.".to_string(),
            ..Default::default()
        };

        let prompt = build_caption_prompt(&data, 290);

        assert!(prompt.contains("Title: Union Station"));
        assert!(prompt.contains("Date: 1905"));
        assert!(prompt.contains("At most 290 characters"));
        assert!(prompt.contains("Creator Name:"));
        assert!(!prompt.contains("Alternate title:"));
    }

    #[test]
    fn test_clean_plain_text() {
        assert_eq!(clean_generated_text("  A streetcar.  "), "A streetcar.");
    }

    #[test]
    fn test_clean_code_fence() {
        let input = "```text\nA streetcar on Colfax. #denver\n```";
        assert_eq!(clean_generated_text(input), "A streetcar on Colfax. #denver");
    }

    #[test]
    fn test_clean_wrapping_quotes() {
        assert_eq!(
            clean_generated_text("\"Skiers above town.\""),
            "Skiers above town."
        );
    }
}
