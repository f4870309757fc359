//! OpenAI Responses API adapter

use archive_poster_domain::{CaptionRequest, GenerateError, TextGenerator};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{CAPTION_INSTRUCTIONS, LlmConfig, build_caption_prompt, clean_generated_text};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI caption writer using the Responses API
pub struct OpenAiGenerator {
    client: Client,
    api_key: SecretString,
    base_url: String,
    config: LlmConfig,
}

impl OpenAiGenerator {
    pub fn new(api_key: SecretString, config: LlmConfig) -> Self {
        Self::with_base_url(api_key, DEFAULT_BASE_URL.to_string(), config)
    }

    pub fn with_base_url(api_key: SecretString, base_url: String, config: LlmConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            config,
        }
    }

    async fn call_api(&self, prompt: &str) -> Result<String, GenerateError> {
        let request = OpenAiRequest {
            model: self.config.model.clone(),
            input: prompt.to_string(),
            instructions: Some(CAPTION_INSTRUCTIONS.to_string()),
            temperature: Some(self.config.temperature),
            max_output_tokens: Some(self.config.max_output_tokens),
        };

        let url = format!("{}/responses", self.base_url);

        let response = self
            .client
            .post(&url)
            .header(
                "Authorization",
                format!("Bearer {}", self.api_key.expose_secret()),
            )
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GenerateError::Timeout
                } else {
                    GenerateError::Api(e.to_string())
                }
            })?;

        if response.status() == 429 {
            return Err(GenerateError::RateLimited);
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GenerateError::Api(format!(
                "API returned {}: {}",
                status, body
            )));
        }

        let api_response: OpenAiResponse = response
            .json()
            .await
            .map_err(|e| GenerateError::InvalidFormat(e.to_string()))?;

        let text = api_response
            .output
            .into_iter()
            .filter(|item| item.r#type == "message")
            .flat_map(|item| item.content)
            .filter(|c| c.r#type == "output_text")
            .map(|c| c.text)
            .collect::<Vec<_>>()
            .join("");

        let text = clean_generated_text(&text);
        if text.is_empty() {
            return Err(GenerateError::InvalidFormat("Empty response".to_string()));
        }

        Ok(text)
    }
}

#[derive(Serialize)]
struct OpenAiRequest {
    model: String,
    input: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    instructions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    output: Vec<OutputItem>,
}

#[derive(Deserialize)]
struct OutputItem {
    r#type: String,
    #[serde(default)]
    content: Vec<ContentItem>,
}

#[derive(Deserialize)]
struct ContentItem {
    r#type: String,
    #[serde(default)]
    text: String,
}

#[async_trait]
impl TextGenerator for OpenAiGenerator {
    async fn generate(&self, request: &CaptionRequest) -> Result<String, GenerateError> {
        let prompt = build_caption_prompt(&request.data, request.max_chars);

        let mut last_error = None;
        for attempt in 0..=self.config.retries {
            if attempt > 0 {
                tracing::warn!(attempt = attempt, "Retrying caption generation");
                tokio::time::sleep(Duration::from_millis(500 * 2_u64.pow(attempt))).await;
            }

            match self.call_api(&prompt).await {
                Ok(text) => return Ok(text),
                Err(GenerateError::RateLimited) => {
                    return Err(GenerateError::RateLimited);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Caption generation failed");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| GenerateError::Api("Unknown error".to_string())))
    }
}
