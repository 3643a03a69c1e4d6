//! Vector index abstraction.
//!
//! The [`VectorIndex`] trait is the only thing the vector-store adapter
//! needs from the indexing side: `search(vector, top_k) -> ranked matches`.
//! Chunking, embedding and ingestion happen elsewhere.
//!
//! | Implementation | Backend |
//! |----------------|---------|
//! | [`memory::InMemoryIndex`] | brute-force cosine over an in-process corpus |
//! | [`astra::AstraIndex`] | Astra DB Data API vector search |

pub mod astra;
pub mod memory;

use async_trait::async_trait;

use crate::error::AdapterError;

/// A chunk returned from a vector search.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexMatch {
    /// Chunk identifier, unique within the index.
    pub chunk_id: String,
    /// Parent document identifier.
    pub document_id: String,
    /// Relevance in `[0.0, 1.0]`, already mapped by the backend.
    pub score: f64,
    /// Chunk text.
    pub text: String,
    /// Where the parent document can be read.
    pub url: Option<String>,
}

/// Nearest-neighbour search over indexed document chunks.
///
/// Implementations return matches ordered by descending score and never
/// more than `top_k`. An index with no matches returns `Ok(vec![])`.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Short backend label used in logs.
    fn name(&self) -> &str;

    /// Whether calls leave the process.
    fn is_live(&self) -> bool;

    /// Return up to `top_k` chunks nearest to `vector`.
    async fn search(&self, vector: &[f32], top_k: usize) -> Result<Vec<IndexMatch>, AdapterError>;
}
