//! Retrieval-augmented generation support
//!
//! Query text is embedded, matched against the instruction store with a
//! deliberately wide net, degraded to a priority-ordered fallback query
//! when vector search yields nothing, then filtered, ranked, and formatted
//! into a budget-bounded context string.

pub mod context;
pub mod embeddings;
pub mod retriever;
pub mod store;

pub use context::{format_instruction_context, MAX_CONTENT_LENGTH, MAX_INSTRUCTIONS, MAX_TOTAL_CONTEXT};
pub use embeddings::{Embedder, EmbeddingClient};
pub use retriever::InstructionRetriever;
pub use store::{InstructionSearch, InstructionStore, FALLBACK_LIMIT, FALLBACK_SIMILARITY};

use thiserror::Error;

/// Retrieval errors
#[derive(Debug, Error)]
pub enum RagError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("instruction store error: {0}")]
    Store(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl From<RagError> for opsvoice_core::Error {
    fn from(err: RagError) -> Self {
        match err {
            RagError::Http(e) => opsvoice_core::Error::Http(e.to_string()),
            RagError::Embedding(m) => opsvoice_core::Error::backend("embeddings", m),
            RagError::Store(m) => opsvoice_core::Error::backend("instruction-store", m),
            RagError::InvalidResponse(m) => {
                opsvoice_core::Error::invalid_response("instruction-store", m)
            }
        }
    }
}
