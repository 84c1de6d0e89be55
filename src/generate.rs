//! Generation Collaborator
//!
//! Opaque interface to the listing-generation backend. The gateway invokes
//! it only after a full allow, and its result never affects the admission
//! decision or usage accounting: usage is recorded on attempt.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A listing-generation request forwarded after admission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Free-form description of the item to list
    pub prompt: String,

    /// Optional tone/style hint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
}

/// Output returned by the generation backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationOutput {
    /// Generated listing text
    pub listing: String,

    /// Backend model identifier when reported
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// Errors from the generation backend.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    /// Request could not be delivered
    #[error("upstream request failed: {0}")]
    Upstream(String),

    /// Backend answered with a non-success status
    #[error("upstream returned status {0}")]
    Status(u16),
}

/// The generation collaborator seam.
#[async_trait]
pub trait ListingGenerator: Send + Sync {
    /// Generate a listing for an admitted request.
    async fn generate(&self, request: &GenerationRequest)
        -> Result<GenerationOutput, GenerationError>;
}

/// HTTP-backed generator: JSON POST to a configured upstream.
pub struct HttpGenerator {
    client: reqwest::Client,
    url: String,
}

impl HttpGenerator {
    /// Build a generator for the upstream URL with a request timeout.
    pub fn new(url: String, timeout: Duration) -> Result<Self, GenerationError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| GenerationError::Upstream(err.to_string()))?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl ListingGenerator for HttpGenerator {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationOutput, GenerationError> {
        let response = self
            .client
            .post(&self.url)
            .json(request)
            .send()
            .await
            .map_err(|err| GenerationError::Upstream(err.to_string()))?;

        if !response.status().is_success() {
            return Err(GenerationError::Status(response.status().as_u16()));
        }

        response
            .json::<GenerationOutput>()
            .await
            .map_err(|err| GenerationError::Upstream(err.to_string()))
    }
}

/// Deterministic local generator for tests and offline runs.
#[derive(Debug, Clone, Default)]
pub struct StubGenerator;

#[async_trait]
impl ListingGenerator for StubGenerator {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationOutput, GenerationError> {
        Ok(GenerationOutput {
            listing: format!("For sale: {}", request.prompt),
            model: Some("stub".to_string()),
        })
    }
}

/// Generator that always fails, for exercising the attempt-accounting rule.
#[derive(Debug, Clone, Default)]
pub struct FailingGenerator;

#[async_trait]
impl ListingGenerator for FailingGenerator {
    async fn generate(
        &self,
        _request: &GenerationRequest,
    ) -> Result<GenerationOutput, GenerationError> {
        Err(GenerationError::Status(500))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stub_generator_is_deterministic() {
        let generator = StubGenerator;
        let request = GenerationRequest {
            prompt: "vintage desk lamp".to_string(),
            style: None,
        };

        let first = generator.generate(&request).await.unwrap();
        let second = generator.generate(&request).await.unwrap();
        assert_eq!(first.listing, second.listing);
        assert!(first.listing.contains("vintage desk lamp"));
    }

    #[tokio::test]
    async fn test_failing_generator_reports_status() {
        let generator = FailingGenerator;
        let request = GenerationRequest {
            prompt: "anything".to_string(),
            style: None,
        };

        let err = generator.generate(&request).await.unwrap_err();
        assert!(matches!(err, GenerationError::Status(500)));
    }

    #[test]
    fn test_request_serialization_omits_empty_style() {
        let request = GenerationRequest {
            prompt: "bike".to_string(),
            style: None,
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(!json.contains("style"));
    }
}
