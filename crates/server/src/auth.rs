//! Bearer shared-secret authentication for the tool endpoints

use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::warn;

use crate::{AppState, ServerError};

/// Middleware guarding the tool-data routes. Rejects before any pipeline
/// or datastore work begins.
pub async fn require_bearer(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let expected = &state.settings.tools.shared_secret;
    if expected.is_empty() {
        warn!("tool endpoints called but no shared secret is configured");
        return ServerError::Internal("tool auth not configured".to_string()).into_response();
    }

    let provided = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match provided {
        Some(token) if constant_time_compare(token.as_bytes(), expected.as_bytes()) => {
            next.run(request).await
        }
        Some(_) => {
            warn!("invalid bearer token on tool endpoint");
            ServerError::Unauthorized.into_response()
        }
        None => ServerError::Unauthorized.into_response(),
    }
}

/// Constant-time comparison to prevent timing attacks
fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare(b"secret", b"secret"));
        assert!(!constant_time_compare(b"secret", b"secre"));
        assert!(!constant_time_compare(b"secret", b"secreT"));
        assert!(!constant_time_compare(b"", b"x"));
        assert!(constant_time_compare(b"", b""));
    }
}
