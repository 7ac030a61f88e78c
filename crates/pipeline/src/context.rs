//! Context fetcher
//!
//! Loads the user's business profile from the PostgREST datastore, with a
//! short-lived in-memory cache. A fetch failure degrades to an
//! error-tagged empty context; it never fails the session.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, warn};

use opsvoice_core::{ContextSource, UserContext};

const CACHE_TTL: Duration = Duration::from_secs(300);

/// PostgREST-backed context source with an in-memory cache
pub struct ProfileContextSource {
    client: Client,
    base_url: String,
    api_key: String,
    cache: RwLock<HashMap<String, (Instant, UserContext)>>,
}

impl ProfileContextSource {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, crate::PipelineError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| crate::PipelineError::Configuration(format!("http client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            cache: RwLock::new(HashMap::new()),
        })
    }

    fn cached(&self, user_id: &str) -> Option<UserContext> {
        let cache = self.cache.read();
        let (stored_at, context) = cache.get(user_id)?;
        if stored_at.elapsed() < CACHE_TTL {
            let mut hit = context.clone();
            hit.cached = true;
            Some(hit)
        } else {
            None
        }
    }

    async fn fetch_profile(&self, user_id: &str) -> Result<UserContext, String> {
        let url = format!(
            "{}/rest/v1/business_info?user_id=eq.{user_id}&select=*&limit=1",
            self.base_url
        );

        let response = self
            .client
            .get(&url)
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| format!("request: {e}"))?;

        if !response.status().is_success() {
            return Err(format!("status {}", response.status()));
        }

        let rows: Vec<Value> = response.json().await.map_err(|e| format!("parse: {e}"))?;
        let profile = rows.into_iter().next();
        let team_id = profile
            .as_ref()
            .and_then(|p| p.get("team_id"))
            .and_then(|v| v.as_str())
            .map(String::from);

        Ok(UserContext {
            user_id: user_id.to_string(),
            cached: false,
            error: false,
            profile,
            team_id,
        })
    }
}

#[async_trait]
impl ContextSource for ProfileContextSource {
    async fn fetch(&self, user_id: &str) -> UserContext {
        if let Some(hit) = self.cached(user_id) {
            debug!(user_id, "context cache hit");
            return hit;
        }

        match self.fetch_profile(user_id).await {
            Ok(context) => {
                self.cache
                    .write()
                    .insert(user_id.to_string(), (Instant::now(), context.clone()));
                context
            }
            Err(reason) => {
                warn!(user_id, reason, "context fetch failed, degrading");
                UserContext::errored(user_id)
            }
        }
    }
}
