//! Shared error type for pipeline stage boundaries
//!
//! Each crate keeps its own richer error enum; this is the common currency
//! the stage traits speak so the coordinator can hold trait objects without
//! caring which backend produced the failure.

use thiserror::Error;

/// Errors surfaced across stage trait boundaries
#[derive(Debug, Error)]
pub enum Error {
    /// Outbound HTTP request failed (connect, timeout, non-success status)
    #[error("http error: {0}")]
    Http(String),

    /// Upstream service returned an unusable body
    #[error("invalid response from {service}: {message}")]
    InvalidResponse { service: String, message: String },

    /// Backend rejected the request or reported a failure of its own
    #[error("{service} error: {message}")]
    Backend { service: String, message: String },

    /// Caller-supplied input could not be used (bad base64, empty text)
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Stage exceeded its time budget
    #[error("stage timed out")]
    Timeout,

    /// Session was cancelled before the stage finished
    #[error("session cancelled")]
    Cancelled,
}

impl Error {
    /// Shorthand for a backend failure
    pub fn backend(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Backend {
            service: service.into(),
            message: message.into(),
        }
    }

    /// Shorthand for an unparseable upstream body
    pub fn invalid_response(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            service: service.into(),
            message: message.into(),
        }
    }
}

/// Result alias used by the stage traits
pub type Result<T> = std::result::Result<T, Error>;
