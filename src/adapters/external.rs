//! External search adapters: Wikipedia and open web.
//!
//! Both sources share one [`ExternalSearchAdapter`] wrapped around a
//! [`SearchBackend`]. Live backends call public HTTP APIs; [`CannedSearch`]
//! answers deterministically from a hash of the query so mock runs are
//! reproducible.
//!
//! External APIs don't report a relevance score, so live results are scored
//! by rank: the first hit gets `1.0` and later hits step down towards `0.5`.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::AdapterError;
use crate::models::{Source, SourceResult};

use super::{finalize_results, retry_once, truncate_chars, RetrievalOutcome, SourceAdapter};

/// One search API.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    fn is_live(&self) -> bool;

    /// Raw ranked hits; the adapter normalizes them.
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<SourceResult>, AdapterError>;
}

/// [`SourceAdapter`] over a [`SearchBackend`], with the shared retry policy.
pub struct ExternalSearchAdapter {
    source: Source,
    backend: Box<dyn SearchBackend>,
    backoff: Duration,
}

impl ExternalSearchAdapter {
    pub fn new(source: Source, backend: Box<dyn SearchBackend>, backoff: Duration) -> Self {
        Self {
            source,
            backend,
            backoff,
        }
    }
}

#[async_trait]
impl SourceAdapter for ExternalSearchAdapter {
    fn source(&self) -> Source {
        self.source
    }

    fn is_live(&self) -> bool {
        self.backend.is_live()
    }

    async fn retrieve(&self, query: &str, top_k: usize) -> Result<RetrievalOutcome, AdapterError> {
        if top_k == 0 {
            return Ok(RetrievalOutcome::empty());
        }
        let raw = retry_once(self.backoff, || self.backend.search(query, top_k)).await?;
        Ok(RetrievalOutcome {
            results: finalize_results(raw, top_k),
            embedding_ms: None,
        })
    }
}

fn rank_score(rank: usize, total: usize) -> f64 {
    if total <= 1 {
        return 1.0;
    }
    1.0 - 0.5 * rank as f64 / (total - 1) as f64
}

fn http_client() -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .user_agent(concat!("adaptive-rag/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

// ============ Wikipedia ============

/// MediaWiki search with plain-text intro extracts.
pub struct WikipediaSearch {
    api_url: String,
    max_chars: usize,
    client: reqwest::Client,
}

impl WikipediaSearch {
    pub fn new(api_url: &str, max_chars: usize) -> Result<Self> {
        Ok(Self {
            api_url: api_url.to_string(),
            max_chars,
            client: http_client()?,
        })
    }
}

#[async_trait]
impl SearchBackend for WikipediaSearch {
    fn is_live(&self) -> bool {
        true
    }

    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<SourceResult>, AdapterError> {
        let limit = top_k.to_string();
        let response = self
            .client
            .get(&self.api_url)
            .query(&[
                ("action", "query"),
                ("format", "json"),
                ("generator", "search"),
                ("gsrsearch", query),
                ("gsrlimit", limit.as_str()),
                ("prop", "extracts|info"),
                ("exintro", "1"),
                ("explaintext", "1"),
                ("inprop", "url"),
            ])
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 404 {
            return Ok(Vec::new());
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AdapterError::from_status("Wikipedia", status.as_u16(), &body));
        }

        let json: Value = response.json().await?;
        parse_wikipedia_response(&json, self.max_chars)
    }
}

/// Parse a `generator=search` response. Pages come back keyed by id, so
/// the search rank is recovered from each page's `index`.
fn parse_wikipedia_response(json: &Value, max_chars: usize) -> Result<Vec<SourceResult>, AdapterError> {
    if let Some(err) = json.get("error") {
        let info = err.get("info").and_then(|i| i.as_str()).unwrap_or("unknown error");
        return Err(AdapterError::Rejected(format!("Wikipedia: {}", info)));
    }
    if !json.is_object() {
        return Err(AdapterError::Malformed("Wikipedia response is not an object".into()));
    }
    // No `query` key means the search matched nothing.
    let pages = match json.pointer("/query/pages") {
        None => return Ok(Vec::new()),
        Some(Value::Object(pages)) => pages,
        Some(_) => {
            return Err(AdapterError::Malformed(
                "Wikipedia query.pages is not an object".into(),
            ))
        }
    };

    let mut hits: Vec<(u64, &Value)> = pages
        .values()
        .map(|page| (page.get("index").and_then(|i| i.as_u64()).unwrap_or(u64::MAX), page))
        .collect();
    hits.sort_by_key(|(index, _)| *index);

    let total = hits.len();
    let mut results = Vec::with_capacity(total);
    for (rank, (_, page)) in hits.into_iter().enumerate() {
        let title = page
            .get("title")
            .and_then(|t| t.as_str())
            .ok_or_else(|| AdapterError::Malformed("Wikipedia page missing title".into()))?;
        let extract = page.get("extract").and_then(|e| e.as_str()).unwrap_or_default();
        let url = page
            .get("fullurl")
            .and_then(|u| u.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| format!("https://en.wikipedia.org/wiki/{}", title.replace(' ', "_")));
        results.push(SourceResult {
            source_id: format!("wikipedia:{}", title),
            similarity_score: rank_score(rank, total),
            snippet: truncate_chars(extract, max_chars),
            url: Some(url),
        });
    }
    Ok(results)
}

// ============ Web ============

/// DuckDuckGo Instant Answer API: the abstract first, then related topics.
pub struct DuckDuckGoSearch {
    api_url: String,
    max_chars: usize,
    client: reqwest::Client,
}

impl DuckDuckGoSearch {
    pub fn new(api_url: &str, max_chars: usize) -> Result<Self> {
        Ok(Self {
            api_url: api_url.to_string(),
            max_chars,
            client: http_client()?,
        })
    }
}

#[async_trait]
impl SearchBackend for DuckDuckGoSearch {
    fn is_live(&self) -> bool {
        true
    }

    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<SourceResult>, AdapterError> {
        let response = self
            .client
            .get(&self.api_url)
            .query(&[
                ("q", query),
                ("format", "json"),
                ("no_html", "1"),
                ("skip_disambig", "1"),
            ])
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 404 {
            return Ok(Vec::new());
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AdapterError::from_status("DuckDuckGo", status.as_u16(), &body));
        }

        let json: Value = response.json().await?;
        parse_duckduckgo_response(&json, top_k, self.max_chars)
    }
}

fn parse_duckduckgo_response(
    json: &Value,
    top_k: usize,
    max_chars: usize,
) -> Result<Vec<SourceResult>, AdapterError> {
    if !json.is_object() {
        return Err(AdapterError::Malformed("DuckDuckGo response is not an object".into()));
    }

    let mut hits: Vec<(String, String)> = Vec::new();
    let abstract_text = json.get("AbstractText").and_then(|t| t.as_str()).unwrap_or_default();
    if !abstract_text.trim().is_empty() {
        let url = json.get("AbstractURL").and_then(|u| u.as_str()).unwrap_or_default();
        hits.push((url.to_string(), abstract_text.to_string()));
    }
    if let Some(topics) = json.get("RelatedTopics").and_then(|t| t.as_array()) {
        collect_topics(topics, &mut hits);
    }
    hits.truncate(top_k);

    let total = hits.len();
    Ok(hits
        .into_iter()
        .enumerate()
        .map(|(rank, (url, text))| SourceResult {
            source_id: if url.is_empty() {
                format!("web:{}", rank)
            } else {
                format!("web:{}", url)
            },
            similarity_score: rank_score(rank, total),
            snippet: truncate_chars(&text, max_chars),
            url: (!url.is_empty()).then_some(url),
        })
        .collect())
}

/// Flatten `RelatedTopics`, which nests grouped topics under `Topics`.
fn collect_topics(topics: &[Value], hits: &mut Vec<(String, String)>) {
    for topic in topics {
        if let Some(nested) = topic.get("Topics").and_then(|t| t.as_array()) {
            collect_topics(nested, hits);
            continue;
        }
        let text = topic.get("Text").and_then(|t| t.as_str()).unwrap_or_default();
        if text.trim().is_empty() {
            continue;
        }
        let url = topic.get("FirstURL").and_then(|u| u.as_str()).unwrap_or_default();
        hits.push((url.to_string(), text.to_string()));
    }
}

// ============ Canned ============

/// Deterministic stand-in for a search API.
///
/// Hit count, ids and scores are all derived from a SHA-256 of the
/// normalized query, so equal queries always get equal results.
pub struct CannedSearch {
    source: Source,
}

impl CannedSearch {
    pub fn new(source: Source) -> Self {
        Self { source }
    }

    fn max_hits(&self) -> usize {
        match self.source {
            Source::Wikipedia => 2,
            _ => 3,
        }
    }
}

fn query_digest(query: &str) -> [u8; 32] {
    let normalized = query
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    Sha256::digest(normalized.as_bytes()).into()
}

#[async_trait]
impl SearchBackend for CannedSearch {
    fn is_live(&self) -> bool {
        false
    }

    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<SourceResult>, AdapterError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let digest = query_digest(query);
        let tag = hex::encode(&digest[..4]);
        let top = 0.6 + f64::from(digest[4]) / 255.0 * 0.35;

        let hits = top_k.min(self.max_hits());
        Ok((0..hits)
            .map(|i| SourceResult {
                source_id: format!("{}:mock-{}-{}", self.source, tag, i + 1),
                similarity_score: top - 0.1 * i as f64,
                snippet: format!(
                    "Simulated {} result {} for \"{}\". Live search is disabled in mock mode.",
                    self.source,
                    i + 1,
                    query
                ),
                url: None,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_score_steps_down() {
        assert_eq!(rank_score(0, 1), 1.0);
        assert_eq!(rank_score(0, 3), 1.0);
        assert_eq!(rank_score(2, 3), 0.5);
        assert!(rank_score(1, 3) < 1.0 && rank_score(1, 3) > 0.5);
    }

    #[test]
    fn test_parse_wikipedia_orders_by_index() {
        let json = serde_json::json!({
            "query": { "pages": {
                "200": { "title": "SpaceX", "index": 2, "extract": "SpaceX is a company." },
                "100": { "title": "Elon Musk", "index": 1,
                         "extract": "Elon Musk is a businessman.",
                         "fullurl": "https://en.wikipedia.org/wiki/Elon_Musk" }
            }}
        });
        let results = parse_wikipedia_response(&json, 1000).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].source_id, "wikipedia:Elon Musk");
        assert_eq!(results[0].similarity_score, 1.0);
        assert_eq!(
            results[1].url.as_deref(),
            Some("https://en.wikipedia.org/wiki/SpaceX")
        );
    }

    #[test]
    fn test_parse_wikipedia_no_match_is_empty() {
        let json = serde_json::json!({ "batchcomplete": "" });
        assert!(parse_wikipedia_response(&json, 1000).unwrap().is_empty());
    }

    #[test]
    fn test_parse_wikipedia_errors() {
        let json = serde_json::json!({ "error": { "code": "badvalue", "info": "bad" } });
        assert!(matches!(
            parse_wikipedia_response(&json, 1000),
            Err(AdapterError::Rejected(_))
        ));
        let json = serde_json::json!({ "query": { "pages": [1, 2] } });
        assert!(matches!(
            parse_wikipedia_response(&json, 1000),
            Err(AdapterError::Malformed(_))
        ));
    }

    #[test]
    fn test_parse_wikipedia_truncates_extract() {
        let json = serde_json::json!({
            "query": { "pages": { "1": { "title": "T", "index": 1, "extract": "x".repeat(50) } } }
        });
        let results = parse_wikipedia_response(&json, 10).unwrap();
        assert_eq!(results[0].snippet.chars().count(), 10);
    }

    #[test]
    fn test_parse_duckduckgo_flattens_topics() {
        let json = serde_json::json!({
            "AbstractText": "Rust is a language.",
            "AbstractURL": "https://en.wikipedia.org/wiki/Rust",
            "RelatedTopics": [
                { "Text": "Cargo", "FirstURL": "https://duckduckgo.com/Cargo" },
                { "Name": "Group", "Topics": [
                    { "Text": "Crates", "FirstURL": "https://duckduckgo.com/Crates" }
                ]},
                { "Text": "" }
            ]
        });
        let results = parse_duckduckgo_response(&json, 5, 1000).unwrap();
        let ids: Vec<&str> = results.iter().map(|r| r.source_id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "web:https://en.wikipedia.org/wiki/Rust",
                "web:https://duckduckgo.com/Cargo",
                "web:https://duckduckgo.com/Crates"
            ]
        );
        assert_eq!(parse_duckduckgo_response(&json, 1, 1000).unwrap().len(), 1);
    }

    #[test]
    fn test_parse_duckduckgo_empty_answer() {
        let json = serde_json::json!({ "AbstractText": "", "RelatedTopics": [] });
        assert!(parse_duckduckgo_response(&json, 5, 1000).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_canned_search_is_deterministic() {
        let canned = CannedSearch::new(Source::Wikipedia);
        let a = canned.search("Who is Elon Musk?", 5).await.unwrap();
        let b = canned.search("  who is   elon musk?", 5).await.unwrap();
        assert_eq!(a.len(), 2);
        assert_eq!(
            a.iter().map(|r| &r.source_id).collect::<Vec<_>>(),
            b.iter().map(|r| &r.source_id).collect::<Vec<_>>()
        );
        assert!(a[0].source_id.starts_with("wikipedia:mock-"));
        assert!(a[0].similarity_score > a[1].similarity_score);
    }

    #[tokio::test]
    async fn test_adapter_respects_top_k() {
        let adapter = ExternalSearchAdapter::new(
            Source::Web,
            Box::new(CannedSearch::new(Source::Web)),
            Duration::from_millis(1),
        );
        assert!(!adapter.is_live());
        let out = adapter.retrieve("rust async runtimes", 1).await.unwrap();
        assert_eq!(out.results.len(), 1);
        assert!(out.embedding_ms.is_none());
        assert!(adapter.retrieve("rust", 0).await.unwrap().results.is_empty());
    }
}
