//! Structured business-data tools
//!
//! Lets the voice agent fetch scoped business data mid-conversation, plus a
//! generic web-search proxy. Scoping rules live in [`sources`] and are
//! shared verbatim by the HTTP tool endpoints.

pub mod fetch;
pub mod search;
pub mod sources;

pub use fetch::{ToolDataClient, MAX_DATA_ROWS};
pub use search::{SearchResult, WebSearchClient, WebSearchResponse};
pub use sources::{data_source, default_scope, is_valid_scope, DataSourceConfig, Scope};

use thiserror::Error;

/// Tool errors
#[derive(Debug, Error)]
pub enum ToolsError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("datastore error: {0}")]
    Store(String),

    #[error("search api error: {0}")]
    Search(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}
