//! HTTP and WebSocket transport
//!
//! Exposes the session pipeline over a WebSocket and the tool-data
//! endpoints over bearer-authenticated HTTP.

pub mod auth;
pub mod http;
pub mod state;
pub mod ws;

pub use http::create_router;
pub use state::AppState;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

/// Server errors, mapped to HTTP status codes
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("missing or invalid bearer token")]
    Unauthorized,

    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("scope {scope} is not valid for tool {tool_key}")]
    InvalidScope { tool_key: String, scope: String },

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("search failed: {0}")]
    Search(#[from] opsvoice_tools::ToolsError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    fn status(&self) -> StatusCode {
        match self {
            ServerError::Unauthorized => StatusCode::UNAUTHORIZED,
            ServerError::UnknownTool(_) => StatusCode::NOT_FOUND,
            ServerError::InvalidScope { .. } | ServerError::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            ServerError::Search(_) => StatusCode::BAD_GATEWAY,
            ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({
            "success": false,
            "error": self.to_string(),
        }));
        (self.status(), body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ServerError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ServerError::UnknownTool("x".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ServerError::InvalidScope { tool_key: "t".into(), scope: "s".into() }.status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ServerError::Internal("x".into()).status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
