//! Instruction store client
//!
//! PostgREST-backed: a similarity-search RPC for the vector path and a
//! priority-ordered table query for the fallback path.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use opsvoice_core::InstructionMatch;

use crate::RagError;

/// Fixed similarity assigned to fallback matches so downstream sorting is
/// stable; never 0, which would sink them below genuine low-score matches.
pub const FALLBACK_SIMILARITY: f32 = 0.5;

/// Fallback path returns at most this many priority-ordered snippets
pub const FALLBACK_LIMIT: u32 = 5;

/// Seam for tests
#[async_trait]
pub trait InstructionSearch: Send + Sync + 'static {
    /// Vector-similarity search over active, role-visible snippets
    async fn match_instructions(
        &self,
        embedding: &[f32],
        threshold: f32,
        count: u32,
        user_role: Option<&str>,
    ) -> Result<Vec<InstructionMatch>, RagError>;

    /// Priority-ordered fallback query, each row tagged with
    /// [`FALLBACK_SIMILARITY`]
    async fn fallback_instructions(&self, limit: u32) -> Result<Vec<InstructionMatch>, RagError>;
}

/// PostgREST instruction store
pub struct InstructionStore {
    client: Client,
    base_url: String,
    api_key: String,
}

impl InstructionStore {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self, RagError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    fn authed(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }
}

/// Fallback query: active snippets, highest priority first, newest first
/// within equal priority
fn fallback_query_url(base_url: &str, limit: u32) -> String {
    format!(
        "{base_url}/rest/v1/ai_instructions?is_active=eq.true&order=priority.desc.nullslast,created_at.desc&limit={limit}"
    )
}

#[derive(Debug, Serialize)]
struct MatchRequest<'a> {
    query_embedding: &'a [f32],
    match_threshold: f32,
    match_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_role_access: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct InstructionRow {
    title: String,
    content: String,
    #[serde(default)]
    content_type: Option<String>,
    #[serde(default)]
    role_access: Option<String>,
    #[serde(default)]
    similarity: Option<f32>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    priority: Option<i32>,
}

impl InstructionRow {
    fn into_match(self, default_similarity: Option<f32>) -> InstructionMatch {
        InstructionMatch {
            title: self.title,
            content: self.content,
            instruction_type: self.content_type,
            role_access: self
                .role_access
                .unwrap_or_else(|| opsvoice_core::WILDCARD_ROLE.to_string()),
            similarity: self.similarity.or(default_similarity).unwrap_or(0.0),
            url: self.url,
            priority: self.priority,
        }
    }
}

#[async_trait]
impl InstructionSearch for InstructionStore {
    async fn match_instructions(
        &self,
        embedding: &[f32],
        threshold: f32,
        count: u32,
        user_role: Option<&str>,
    ) -> Result<Vec<InstructionMatch>, RagError> {
        let url = format!("{}/rest/v1/rpc/match_ai_instructions", self.base_url);
        let request = MatchRequest {
            query_embedding: embedding,
            match_threshold: threshold,
            match_count: count,
            user_role_access: user_role,
        };

        let response = self.authed(self.client.post(&url)).json(&request).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RagError::Store(format!("match rpc status {status}: {body}")));
        }

        let rows: Vec<InstructionRow> = response
            .json()
            .await
            .map_err(|e| RagError::InvalidResponse(e.to_string()))?;

        Ok(rows.into_iter().map(|r| r.into_match(None)).collect())
    }

    async fn fallback_instructions(&self, limit: u32) -> Result<Vec<InstructionMatch>, RagError> {
        let url = fallback_query_url(&self.base_url, limit);

        let response = self.authed(self.client.get(&url)).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RagError::Store(format!("fallback query status {status}: {body}")));
        }

        let rows: Vec<InstructionRow> = response
            .json()
            .await
            .map_err(|e| RagError::InvalidResponse(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|r| r.into_match(Some(FALLBACK_SIMILARITY)))
            .collect())
    }
}
