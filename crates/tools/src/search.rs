//! Web-search proxy
//!
//! Proxies a Tavily-style search API and normalizes the response into the
//! `{ results, answer?, query }` envelope the agent expects.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::ToolsError;

/// One search hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub content: String,
}

/// Normalized search response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebSearchResponse {
    pub results: Vec<SearchResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    pub query: String,
}

/// External search API client
pub struct WebSearchClient {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl WebSearchClient {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Result<Self, ToolsError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(20))
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        })
    }

    pub async fn search(
        &self,
        query: &str,
        max_results: u32,
    ) -> Result<WebSearchResponse, ToolsError> {
        let request = SearchApiRequest {
            api_key: &self.api_key,
            query,
            max_results,
            include_answer: true,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ToolsError::Search(format!("status {status}: {body}")));
        }

        let parsed: SearchApiResponse = response.json().await?;

        Ok(WebSearchResponse {
            results: parsed
                .results
                .into_iter()
                .map(|r| SearchResult {
                    title: r.title,
                    url: r.url,
                    content: r.content,
                })
                .collect(),
            answer: parsed.answer.filter(|a| !a.is_empty()),
            query: query.to_string(),
        })
    }
}

#[derive(Debug, Serialize)]
struct SearchApiRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    max_results: u32,
    include_answer: bool,
}

#[derive(Debug, Deserialize)]
struct SearchApiResponse {
    #[serde(default)]
    results: Vec<SearchApiResult>,
    #[serde(default)]
    answer: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchApiResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_envelope_shape() {
        let response = WebSearchResponse {
            results: vec![SearchResult {
                title: "Rust".to_string(),
                url: "https://rust-lang.org".to_string(),
                content: "A language".to_string(),
            }],
            answer: Some("Rust is a language".to_string()),
            query: "what is rust".to_string(),
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["results"][0]["title"], "Rust");
        assert_eq!(json["answer"], "Rust is a language");
        assert_eq!(json["query"], "what is rust");
    }

    #[test]
    fn test_absent_answer_is_omitted() {
        let response = WebSearchResponse {
            results: vec![],
            answer: None,
            query: "q".to_string(),
        };
        let json = serde_json::to_value(&response).unwrap();
        assert!(json.get("answer").is_none());
    }

    #[tokio::test]
    async fn test_unreachable_api_is_an_error() {
        let client = WebSearchClient::new("http://127.0.0.1:1/search", "key").unwrap();
        assert!(client.search("query", 5).await.is_err());
    }
}
