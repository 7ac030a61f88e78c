//! Instruction retriever
//!
//! Pipeline: embed the query, cast a wide vector-search net, degrade to the
//! priority-ordered fallback when the net comes back empty, then apply
//! post-hoc role/category filters and rank by similarity.

use std::cmp::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use opsvoice_core::{InstructionMatch, KnowledgeRetriever, RetrieveOptions};

use crate::store::{InstructionSearch, FALLBACK_LIMIT};
use crate::Embedder;

/// Retriever configuration
#[derive(Debug, Clone)]
pub struct RetrieverConfig {
    /// Low on purpose: wide net first, rank afterwards
    pub match_threshold: f32,
    pub match_count: u32,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self { match_threshold: 0.1, match_count: 50 }
    }
}

/// Embedding + vector search + fallback retriever
pub struct InstructionRetriever {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn InstructionSearch>,
    config: RetrieverConfig,
}

impl InstructionRetriever {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn InstructionSearch>,
        config: RetrieverConfig,
    ) -> Self {
        Self { embedder, store, config }
    }

    async fn vector_candidates(
        &self,
        query: &str,
        user_role: Option<&str>,
    ) -> Vec<InstructionMatch> {
        let embedding = match self.embedder.embed(query).await {
            Ok(embedding) => embedding,
            Err(err) => {
                warn!(error = %err, "embedding failed, taking fallback path");
                return Vec::new();
            }
        };

        match self
            .store
            .match_instructions(
                &embedding,
                self.config.match_threshold,
                self.config.match_count,
                user_role,
            )
            .await
        {
            Ok(matches) => matches,
            Err(err) => {
                warn!(error = %err, "vector search failed, taking fallback path");
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl KnowledgeRetriever for InstructionRetriever {
    async fn retrieve(
        &self,
        query: &str,
        options: &RetrieveOptions,
    ) -> opsvoice_core::Result<Vec<InstructionMatch>> {
        let user_role = options.user_role.as_deref();

        let mut candidates = self.vector_candidates(query, user_role).await;

        if candidates.is_empty() {
            debug!("no vector matches, querying priority fallback");
            candidates = self
                .store
                .fallback_instructions(FALLBACK_LIMIT)
                .await
                .map_err(opsvoice_core::Error::from)?;
        }

        let mut filtered: Vec<InstructionMatch> = candidates
            .into_iter()
            .filter(|m| m.matches_role(user_role) && m.matches_category(options.category.as_deref()))
            .collect();

        filtered.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(Ordering::Equal)
        });

        debug!(count = filtered.len(), "retrieval complete");
        Ok(filtered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FALLBACK_SIMILARITY;
    use crate::RagError;

    struct FixedEmbedder {
        fail: bool,
    }

    #[async_trait]
    impl Embedder for FixedEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, RagError> {
            if self.fail {
                Err(RagError::Embedding("down".to_string()))
            } else {
                Ok(vec![0.1; 8])
            }
        }
    }

    struct FixedStore {
        vector: Vec<InstructionMatch>,
        fallback: Vec<InstructionMatch>,
    }

    #[async_trait]
    impl InstructionSearch for FixedStore {
        async fn match_instructions(
            &self,
            _embedding: &[f32],
            _threshold: f32,
            _count: u32,
            _user_role: Option<&str>,
        ) -> Result<Vec<InstructionMatch>, RagError> {
            Ok(self.vector.clone())
        }

        async fn fallback_instructions(
            &self,
            limit: u32,
        ) -> Result<Vec<InstructionMatch>, RagError> {
            Ok(self.fallback.iter().take(limit as usize).cloned().collect())
        }
    }

    fn snippet(title: &str, similarity: f32, role: &str) -> InstructionMatch {
        InstructionMatch {
            title: title.to_string(),
            content: format!("{title} body"),
            instruction_type: None,
            role_access: role.to_string(),
            similarity,
            url: None,
            priority: None,
        }
    }

    fn retriever(embed_fails: bool, store: FixedStore) -> InstructionRetriever {
        InstructionRetriever::new(
            Arc::new(FixedEmbedder { fail: embed_fails }),
            Arc::new(store),
            RetrieverConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_vector_matches_sorted_by_similarity() {
        let store = FixedStore {
            vector: vec![snippet("low", 0.2, "all"), snippet("high", 0.9, "all")],
            fallback: vec![],
        };
        let results = retriever(false, store)
            .retrieve("query", &RetrieveOptions::default())
            .await
            .unwrap();
        assert_eq!(results[0].title, "high");
        assert_eq!(results[1].title, "low");
    }

    #[tokio::test]
    async fn test_empty_vector_results_take_fallback_with_fixed_score() {
        let store = FixedStore {
            vector: vec![],
            fallback: vec![snippet("fb", FALLBACK_SIMILARITY, "all")],
        };
        let results = retriever(false, store)
            .retrieve("query", &RetrieveOptions::default())
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].similarity, FALLBACK_SIMILARITY);
    }

    #[tokio::test]
    async fn test_embedding_failure_degrades_to_fallback() {
        let store = FixedStore {
            vector: vec![snippet("never-seen", 0.9, "all")],
            fallback: vec![snippet("fb", FALLBACK_SIMILARITY, "all")],
        };
        let results = retriever(true, store)
            .retrieve("query", &RetrieveOptions::default())
            .await
            .unwrap();
        assert_eq!(results[0].title, "fb");
    }

    #[tokio::test]
    async fn test_post_hoc_role_filter() {
        let store = FixedStore {
            vector: vec![
                snippet("managers-only", 0.9, "manager"),
                snippet("everyone", 0.8, "all"),
            ],
            fallback: vec![],
        };
        let options = RetrieveOptions {
            user_role: Some("operator".to_string()),
            category: None,
        };
        let results = retriever(false, store)
            .retrieve("query", &options)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].title, "everyone");
    }

    #[tokio::test]
    async fn test_role_filter_all_is_noop() {
        let store = FixedStore {
            vector: vec![snippet("managers-only", 0.9, "manager")],
            fallback: vec![],
        };
        let options = RetrieveOptions {
            user_role: Some("all".to_string()),
            category: None,
        };
        let results = retriever(false, store)
            .retrieve("query", &options)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
    }
}
