//! Scoped tool-data fetching
//!
//! Applies the registry's scoping rules to a bounded, most-recent-first
//! PostgREST query. Any combination with no valid filter column, an
//! unknown tool key, or an upstream error yields an empty result set,
//! never an error.

use std::time::Duration;

use reqwest::Client;
use serde_json::Value;
use tracing::{debug, warn};

use crate::sources::{data_source, DataSourceConfig, Scope};
use crate::ToolsError;

/// Hard cap on rows returned per query
pub const MAX_DATA_ROWS: u32 = 30;

/// How a query should be filtered once scope is resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScopeFilter<'a> {
    /// Platform-wide, no filter
    Unfiltered,
    /// Filter column = value
    Column(&'a str, &'a str),
    /// No valid filter exists; the query must return nothing
    Empty,
}

fn resolve_filter<'a>(
    config: &DataSourceConfig,
    scope: Scope,
    user_id: &'a str,
    team_id: Option<&'a str>,
) -> ScopeFilter<'a> {
    match scope {
        Scope::All => ScopeFilter::Unfiltered,
        Scope::TeamSpecific => match (config.team_column, team_id) {
            (Some(column), Some(team)) => ScopeFilter::Column(column, team),
            // no team column: fall back to the user column
            _ => match config.user_column {
                Some(column) if !user_id.is_empty() => ScopeFilter::Column(column, user_id),
                _ => ScopeFilter::Empty,
            },
        },
        Scope::UserSpecific => match config.user_column {
            Some(column) if !user_id.is_empty() => ScopeFilter::Column(column, user_id),
            _ => ScopeFilter::Empty,
        },
    }
}

/// PostgREST tool-data client
pub struct ToolDataClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl ToolDataClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self, ToolsError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    /// Fetch rows for a tool, applying scope resolution and the row cap
    pub async fn fetch(
        &self,
        tool_key: &str,
        scope: Scope,
        user_id: &str,
        team_id: Option<&str>,
        limit: u32,
    ) -> Vec<Value> {
        let Some(config) = data_source(tool_key) else {
            warn!(tool_key, "unknown tool key");
            return Vec::new();
        };

        let filter = match resolve_filter(config, scope, user_id, team_id) {
            ScopeFilter::Empty => {
                debug!(tool_key, scope = scope.as_str(), "no valid filter for scope");
                return Vec::new();
            }
            filter => filter,
        };

        let limit = limit.clamp(1, MAX_DATA_ROWS);
        let select: String = config.select.split_whitespace().collect();
        let mut url = format!(
            "{}/rest/v1/{}?select={select}&order=created_at.desc&limit={limit}",
            self.base_url, config.table
        );
        if let ScopeFilter::Column(column, value) = filter {
            url.push_str(&format!("&{column}=eq.{value}"));
        }

        match self.run_query(&url).await {
            Ok(rows) => {
                debug!(tool_key, count = rows.len(), scope = scope.as_str(), "tool data fetched");
                rows
            }
            Err(err) => {
                warn!(tool_key, error = %err, "tool data query failed");
                Vec::new()
            }
        }
    }

    async fn run_query(&self, url: &str) -> Result<Vec<Value>, ToolsError> {
        let response = self
            .client
            .get(url)
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ToolsError::Store(format!("status {}", response.status())));
        }

        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(team: Option<&'static str>, user: Option<&'static str>) -> DataSourceConfig {
        DataSourceConfig {
            table: "t",
            select: "id, created_at",
            team_column: team,
            user_column: user,
        }
    }

    #[test]
    fn test_team_scope_uses_team_column() {
        let filter = resolve_filter(
            &config(Some("team_id"), Some("user_id")),
            Scope::TeamSpecific,
            "u1",
            Some("t1"),
        );
        assert_eq!(filter, ScopeFilter::Column("team_id", "t1"));
    }

    #[test]
    fn test_team_scope_falls_back_to_user_column() {
        // source lacks a team column but has a user column
        let filter = resolve_filter(
            &config(None, Some("user_id")),
            Scope::TeamSpecific,
            "u1",
            Some("t1"),
        );
        assert_eq!(filter, ScopeFilter::Column("user_id", "u1"));
    }

    #[test]
    fn test_team_scope_without_team_id_falls_back_to_user() {
        let filter = resolve_filter(
            &config(Some("team_id"), Some("user_id")),
            Scope::TeamSpecific,
            "u1",
            None,
        );
        assert_eq!(filter, ScopeFilter::Column("user_id", "u1"));
    }

    #[test]
    fn test_all_scope_is_unfiltered() {
        let filter = resolve_filter(&config(None, None), Scope::All, "u1", None);
        assert_eq!(filter, ScopeFilter::Unfiltered);
    }

    #[test]
    fn test_invalid_combination_is_empty_not_error() {
        let filter = resolve_filter(&config(None, None), Scope::UserSpecific, "u1", None);
        assert_eq!(filter, ScopeFilter::Empty);

        let filter = resolve_filter(&config(None, Some("user_id")), Scope::UserSpecific, "", None);
        assert_eq!(filter, ScopeFilter::Empty);
    }

    #[tokio::test]
    async fn test_unknown_tool_key_returns_empty() {
        let client = ToolDataClient::new("http://127.0.0.1:1", "key").unwrap();
        let rows = client.fetch("nonexistent", Scope::All, "u1", None, 10).await;
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_upstream_error_returns_empty() {
        // nothing is listening; the query fails and degrades to empty
        let client = ToolDataClient::new("http://127.0.0.1:1", "key").unwrap();
        let rows = client.fetch("tasks", Scope::All, "u1", None, 10).await;
        assert!(rows.is_empty());
    }
}
