//! Source adapters: one uniform retrieval capability per knowledge source.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │               AdapterRegistry                │
//! │  ┌──────────────┐ ┌───────────┐ ┌─────────┐  │
//! │  │ VectorStore  │ │ Wikipedia │ │   Web   │  │
//! │  │ live | mock  │ │live | mock│ │live|mock│  │
//! │  └──────────────┘ └───────────┘ └─────────┘  │
//! └──────────────────────┬───────────────────────┘
//!                        ▼
//!             Orchestrator (RETRIEVING)
//! ```
//!
//! Whether an adapter is live or simulated is fixed when the registry is
//! built from the [`CapabilityState`]; call sites never branch on it.
//!
//! Every adapter honours the same contract:
//! - never more than `top_k` results, sorted by descending score;
//! - zero matches is `Ok` with an empty list, not an error;
//! - `source_id`s are unique within one call;
//! - a transient failure is retried once after a fixed backoff.

pub mod external;
pub mod vector;

use anyhow::Result;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::capability::{CapabilityState, Dependency};
use crate::config::{Config, Credentials};
use crate::embedding::{create_embedder, LexicalEmbedder};
use crate::error::AdapterError;
use crate::models::{Source, SourceResult};
use crate::store::astra::AstraIndex;
use crate::store::memory::InMemoryIndex;
use crate::store::VectorIndex;

use self::external::{
    CannedSearch, DuckDuckGoSearch, ExternalSearchAdapter, SearchBackend, WikipediaSearch,
};
use self::vector::VectorStoreAdapter;

/// What one adapter call produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetrievalOutcome {
    /// Ranked evidence, at most `top_k`.
    pub results: Vec<SourceResult>,
    /// Time spent embedding the query, when the adapter embeds.
    pub embedding_ms: Option<u64>,
}

impl RetrievalOutcome {
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Uniform retrieval over one knowledge source.
///
/// # Example
///
/// ```rust
/// use adaptive_rag::adapters::{RetrievalOutcome, SourceAdapter};
/// use adaptive_rag::error::AdapterError;
/// use adaptive_rag::models::Source;
/// use async_trait::async_trait;
///
/// struct NothingFound;
///
/// #[async_trait]
/// impl SourceAdapter for NothingFound {
///     fn source(&self) -> Source { Source::Web }
///     fn is_live(&self) -> bool { false }
///     async fn retrieve(&self, _query: &str, _top_k: usize)
///         -> Result<RetrievalOutcome, AdapterError> {
///         Ok(RetrievalOutcome::empty())
///     }
/// }
/// ```
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// The source this adapter serves.
    fn source(&self) -> Source;

    /// Whether calls leave the process.
    fn is_live(&self) -> bool;

    /// Retrieve up to `top_k` evidence units for `query`.
    async fn retrieve(&self, query: &str, top_k: usize) -> Result<RetrievalOutcome, AdapterError>;
}

/// Normalize raw adapter output into the response contract.
///
/// Drops results with non-finite scores or a repeated `source_id`, clamps
/// scores into `[0, 1]`, stable-sorts by descending score (ties keep their
/// original order) and truncates to `top_k`.
pub fn finalize_results(raw: Vec<SourceResult>, top_k: usize) -> Vec<SourceResult> {
    let mut seen = HashSet::new();
    let mut results: Vec<SourceResult> = raw
        .into_iter()
        .filter(|r| r.similarity_score.is_finite())
        .filter(|r| seen.insert(r.source_id.clone()))
        .map(|mut r| {
            r.similarity_score = r.similarity_score.clamp(0.0, 1.0);
            r
        })
        .collect();
    results.sort_by(|a, b| {
        b.similarity_score
            .partial_cmp(&a.similarity_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    results.truncate(top_k);
    results
}

/// Cut `text` to at most `max_chars` characters, marking the cut with `…`.
pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    out.push('…');
    out
}

/// Run `op`, retrying exactly once after `backoff` if it fails transiently.
pub async fn retry_once<T, F, Fut>(backoff: Duration, mut op: F) -> Result<T, AdapterError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AdapterError>>,
{
    match op().await {
        Err(e) if e.is_transient() => {
            tracing::debug!(error = %e, backoff_ms = backoff.as_millis() as u64, "retrying after transient failure");
            tokio::time::sleep(backoff).await;
            op().await
        }
        other => other,
    }
}

/// Holds one adapter per source.
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: BTreeMap<Source, Arc<dyn SourceAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter, replacing any previous one for the same source.
    pub fn register(&mut self, adapter: Arc<dyn SourceAdapter>) {
        self.adapters.insert(adapter.source(), adapter);
    }

    pub fn get(&self, source: Source) -> Option<Arc<dyn SourceAdapter>> {
        self.adapters.get(&source).cloned()
    }

    pub fn sources(&self) -> Vec<Source> {
        self.adapters.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

/// Build the live or simulated adapter for every source.
///
/// # Errors
///
/// Only fails if a live HTTP client cannot be constructed.
pub fn build_registry(
    config: &Config,
    creds: &Credentials,
    caps: &CapabilityState,
) -> Result<AdapterRegistry> {
    let backoff = Duration::from_millis(config.retrieval.retry_backoff_ms);
    let mut registry = AdapterRegistry::new();

    let vector_adapter = if caps.is_live(Dependency::VectorStore) {
        let embedder = create_embedder(config, creds, caps)?;
        let (db_id, token) = match (&creds.astra_db_id, &creds.astra_db_application_token) {
            (Some(id), Some(token)) => (id.as_str(), token.as_str()),
            _ => anyhow::bail!("vector store marked live without Astra credentials"),
        };
        let index: Arc<dyn VectorIndex> =
            Arc::new(AstraIndex::new(&config.vector_store, db_id, token)?);
        VectorStoreAdapter::new(Arc::from(embedder), index, backoff)
    } else {
        let embedder = LexicalEmbedder::for_seed_corpus();
        let index = InMemoryIndex::seeded(&embedder, config.retrieval.min_vector_score);
        VectorStoreAdapter::new(Arc::new(embedder), Arc::new(index), backoff)
    };
    registry.register(Arc::new(vector_adapter));

    let live_search = caps.is_live(Dependency::ExternalSearch);
    let max_chars = config.external_search.max_snippet_chars;
    for source in [Source::Wikipedia, Source::Web] {
        let backend: Box<dyn SearchBackend> = match (source, live_search) {
            (Source::Wikipedia, true) => Box::new(WikipediaSearch::new(
                &config.external_search.wikipedia_url,
                max_chars,
            )?),
            (_, true) => Box::new(DuckDuckGoSearch::new(
                &config.external_search.web_url,
                max_chars,
            )?),
            (_, false) => Box::new(CannedSearch::new(source)),
        };
        registry.register(Arc::new(ExternalSearchAdapter::new(
            source, backend, backoff,
        )));
    }

    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn result(id: &str, score: f64) -> SourceResult {
        SourceResult {
            source_id: id.to_string(),
            similarity_score: score,
            snippet: String::new(),
            url: None,
        }
    }

    #[test]
    fn test_finalize_sorts_clamps_and_truncates() {
        let raw = vec![
            result("a", 0.2),
            result("b", 1.7),
            result("c", -0.5),
            result("d", 0.9),
        ];
        let out = finalize_results(raw, 3);
        let ids: Vec<&str> = out.iter().map(|r| r.source_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "d", "a"]);
        assert_eq!(out[0].similarity_score, 1.0);
    }

    #[test]
    fn test_finalize_is_stable_and_dedupes() {
        let raw = vec![
            result("x", 0.5),
            result("y", 0.5),
            result("x", 0.9),
            result("z", f64::NAN),
        ];
        let out = finalize_results(raw, 10);
        let ids: Vec<&str> = out.iter().map(|r| r.source_id.as_str()).collect();
        assert_eq!(ids, vec!["x", "y"]);
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("  short  ", 10), "short");
        let cut = truncate_chars("abcdefghij", 5);
        assert_eq!(cut, "abcd…");
        assert_eq!(cut.chars().count(), 5);
    }

    #[tokio::test]
    async fn test_retry_once_on_transient() {
        let calls = AtomicUsize::new(0);
        let out = retry_once(Duration::from_millis(1), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(AdapterError::Transient("blip".into()))
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(out.unwrap(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_retry_once_gives_up_after_second_failure() {
        let calls = AtomicUsize::new(0);
        let out: Result<(), _> = retry_once(Duration::from_millis(1), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(AdapterError::Transient("down".into())) }
        })
        .await;
        assert!(out.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_no_retry_on_permanent_error() {
        let calls = AtomicUsize::new(0);
        let out: Result<(), _> = retry_once(Duration::from_millis(1), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(AdapterError::Rejected("401".into())) }
        })
        .await;
        assert!(matches!(out, Err(AdapterError::Rejected(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_mock_registry_covers_every_source() {
        let registry = build_registry(
            &Config::default(),
            &Credentials::default(),
            &CapabilityState::all_mock(),
        )
        .unwrap();
        assert_eq!(registry.sources(), Source::ALL.to_vec());
        for source in Source::ALL {
            assert!(!registry.get(source).unwrap().is_live());
        }
    }
}
