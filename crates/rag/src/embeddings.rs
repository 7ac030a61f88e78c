//! Embedding client
//!
//! OpenAI-compatible embeddings endpoint. An embedding failure is fatal to
//! vector search but not to the session; callers take the fallback path.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::RagError;

/// Seam for tests; the retriever depends on this rather than the concrete
/// HTTP client.
#[async_trait]
pub trait Embedder: Send + Sync + 'static {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError>;
}

/// HTTP embedding client
pub struct EmbeddingClient {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl EmbeddingClient {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self, RagError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            model: model.into(),
        })
    }
}

#[async_trait]
impl Embedder for EmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError> {
        if text.trim().is_empty() {
            return Err(RagError::Embedding("empty query text".to_string()));
        }

        let request = EmbeddingRequest {
            model: &self.model,
            input: text,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RagError::Embedding(format!("status {status}: {body}")));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| RagError::InvalidResponse(e.to_string()))?;

        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| RagError::InvalidResponse("no embedding in response".to_string()))
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_text_is_rejected_before_the_network() {
        let client = EmbeddingClient::new("http://localhost:9", "key", "model").unwrap();
        let err = client.embed("   ").await.unwrap_err();
        assert!(matches!(err, RagError::Embedding(_)));
    }

    #[test]
    fn test_request_serialization() {
        let request = EmbeddingRequest { model: "text-embedding-3-small", input: "hello" };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "text-embedding-3-small");
        assert_eq!(json["input"], "hello");
    }
}
