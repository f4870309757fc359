//! Stub text generator for offline runs, with a fixed or echoed response

use archive_poster_domain::{CaptionRequest, GenerateError, TextGenerator};
use async_trait::async_trait;

/// Stub generator that returns configurable responses
pub struct StubTextGenerator {
    response: Option<String>,
    error: Option<GenerateError>,
}

impl StubTextGenerator {
    /// Create a stub that always returns `text`
    pub fn with_response(text: impl Into<String>) -> Self {
        Self {
            response: Some(text.into()),
            error: None,
        }
    }

    /// Create a stub that always returns an error
    #[cfg(test)]
    pub fn with_error(error: GenerateError) -> Self {
        Self {
            response: None,
            error: Some(error),
        }
    }

    /// Create a stub that echoes the record title and summary
    pub fn echo() -> Self {
        Self {
            response: None,
            error: None,
        }
    }
}

impl Default for StubTextGenerator {
    fn default() -> Self {
        Self::echo()
    }
}

#[async_trait]
impl TextGenerator for StubTextGenerator {
    async fn generate(&self, request: &CaptionRequest) -> Result<String, GenerateError> {
        if let Some(ref error) = self.error {
            return Err(match error {
                GenerateError::Api(msg) => GenerateError::Api(msg.clone()),
                GenerateError::InvalidFormat(msg) => GenerateError::InvalidFormat(msg.clone()),
                GenerateError::RateLimited => GenerateError::RateLimited,
                GenerateError::Timeout => GenerateError::Timeout,
                GenerateError::Config(msg) => GenerateError::Config(msg.clone()),
            });
        }

        if let Some(ref response) = self.response {
            return Ok(response.clone());
        }

        let data = &request.data;
        let text = [data.title.trim(), data.summary.trim()]
            .into_iter()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(". ");

        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use archive_poster_domain::ScrapedData;

    fn request() -> CaptionRequest {
        CaptionRequest {
            data: ScrapedData {
                title: "Union Station".to_string(),
                summary: "Travelers at the depot.".to_string(),
                ..Default::default()
            },
            max_chars: 290,
        }
    }

    #[tokio::test]
    async fn test_stub_with_response() {
        let stub = StubTextGenerator::with_response("Fixed caption #denver");

        assert_eq!(stub.generate(&request()).await.unwrap(), "Fixed caption #denver");
    }

    #[tokio::test]
    async fn test_stub_with_error() {
        let stub = StubTextGenerator::with_error(GenerateError::RateLimited);

        assert!(matches!(
            stub.generate(&request()).await,
            Err(GenerateError::RateLimited)
        ));
    }

    #[tokio::test]
    async fn test_stub_echo() {
        let stub = StubTextGenerator::echo();

        assert_eq!(
            stub.generate(&request()).await.unwrap(),
            "Union Station. Travelers at the depot."
        );
    }
}
