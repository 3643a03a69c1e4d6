//! Vector-store adapter: embed the query, then search the index.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::embedding::Embedder;
use crate::error::AdapterError;
use crate::models::{Source, SourceResult};
use crate::store::VectorIndex;

use super::{finalize_results, retry_once, truncate_chars, RetrievalOutcome, SourceAdapter};

const SNIPPET_CHARS: usize = 500;

/// Retrieves from the proprietary corpus through an [`Embedder`] and a
/// [`VectorIndex`]. Live only when both halves are live.
pub struct VectorStoreAdapter {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    backoff: Duration,
}

impl VectorStoreAdapter {
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<dyn VectorIndex>, backoff: Duration) -> Self {
        Self {
            embedder,
            index,
            backoff,
        }
    }
}

#[async_trait]
impl SourceAdapter for VectorStoreAdapter {
    fn source(&self) -> Source {
        Source::Vector
    }

    fn is_live(&self) -> bool {
        self.embedder.is_live() && self.index.is_live()
    }

    async fn retrieve(&self, query: &str, top_k: usize) -> Result<RetrievalOutcome, AdapterError> {
        if top_k == 0 {
            return Ok(RetrievalOutcome::empty());
        }

        let started = Instant::now();
        let vector = retry_once(self.backoff, || self.embedder.embed(query)).await?;
        let embedding_ms = started.elapsed().as_millis() as u64;

        if vector.iter().all(|v| *v == 0.0) {
            // Nothing in the query overlaps the embedding space.
            return Ok(RetrievalOutcome {
                results: Vec::new(),
                embedding_ms: Some(embedding_ms),
            });
        }

        let matches = retry_once(self.backoff, || self.index.search(&vector, top_k)).await?;
        tracing::debug!(
            index = self.index.name(),
            model = self.embedder.model_name(),
            matches = matches.len(),
            "vector search complete"
        );

        let raw = matches
            .into_iter()
            .map(|m| SourceResult {
                source_id: m.chunk_id,
                similarity_score: m.score,
                snippet: truncate_chars(&m.text, SNIPPET_CHARS),
                url: m.url,
            })
            .collect();

        Ok(RetrievalOutcome {
            results: finalize_results(raw, top_k),
            embedding_ms: Some(embedding_ms),
        })
    }
}
