//! In-memory [`VectorIndex`] used in mock mode and tests.
//!
//! Uses a `Vec` behind `std::sync::RwLock` for thread safety. Search is
//! brute-force cosine similarity over all stored vectors.

use std::sync::RwLock;

use async_trait::async_trait;

use crate::corpus::SEED_CORPUS;
use crate::embedding::{cosine_similarity, similarity_to_score, LexicalEmbedder};
use crate::error::AdapterError;

use super::{IndexMatch, VectorIndex};

struct StoredChunk {
    chunk_id: String,
    document_id: String,
    text: String,
    url: Option<String>,
    vector: Vec<f32>,
}

/// In-memory vector index.
pub struct InMemoryIndex {
    chunks: RwLock<Vec<StoredChunk>>,
    min_score: f64,
}

impl InMemoryIndex {
    /// An empty index. Matches scoring at or below `min_score` are dropped.
    pub fn new(min_score: f64) -> Self {
        Self {
            chunks: RwLock::new(Vec::new()),
            min_score,
        }
    }

    /// An index holding the built-in seed corpus, embedded with `embedder`.
    pub fn seeded(embedder: &LexicalEmbedder, min_score: f64) -> Self {
        let index = Self::new(min_score);
        for chunk in SEED_CORPUS {
            index.insert(
                chunk.id,
                chunk.document_id,
                chunk.text,
                Some(chunk.url.to_string()),
                embedder.embed_sync(chunk.text),
            );
        }
        index
    }

    /// Insert or replace a chunk.
    pub fn insert(
        &self,
        chunk_id: &str,
        document_id: &str,
        text: &str,
        url: Option<String>,
        vector: Vec<f32>,
    ) {
        let mut chunks = self.chunks.write().unwrap_or_else(|e| e.into_inner());
        chunks.retain(|c| c.chunk_id != chunk_id);
        chunks.push(StoredChunk {
            chunk_id: chunk_id.to_string(),
            document_id: document_id.to_string(),
            text: text.to_string(),
            url,
            vector,
        });
    }

    pub fn len(&self) -> usize {
        self.chunks.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    fn name(&self) -> &str {
        "memory"
    }

    fn is_live(&self) -> bool {
        false
    }

    async fn search(&self, vector: &[f32], top_k: usize) -> Result<Vec<IndexMatch>, AdapterError> {
        let chunks = self.chunks.read().unwrap_or_else(|e| e.into_inner());
        let mut matches: Vec<IndexMatch> = chunks
            .iter()
            .filter_map(|c| {
                let score = similarity_to_score(cosine_similarity(vector, &c.vector));
                (score > self.min_score).then(|| IndexMatch {
                    chunk_id: c.chunk_id.clone(),
                    document_id: c.document_id.clone(),
                    score,
                    text: c.text.clone(),
                    url: c.url.clone(),
                })
            })
            .collect();
        // Stable: equal scores keep insertion order.
        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        matches.truncate(top_k);
        Ok(matches)
    }
}
