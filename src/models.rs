//! Core data models used throughout the orchestration engine.
//!
//! These types represent the requests, routing decisions, evidence and
//! responses that flow through a single orchestration run. All of them
//! serialize to the JSON envelope served by the HTTP layer.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum accepted query length, in characters.
pub const MAX_QUERY_CHARS: usize = 2000;

/// A concrete knowledge source a query can be answered from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    /// The proprietary document corpus behind the vector store.
    Vector,
    /// Wikipedia, for general knowledge.
    Wikipedia,
    /// Open web search.
    Web,
}

impl Source {
    /// All concrete sources, in routing-label order.
    pub const ALL: [Source; 3] = [Source::Vector, Source::Wikipedia, Source::Web];

    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Vector => "vector",
            Source::Wikipedia => "wikipedia",
            Source::Web => "web",
        }
    }

    /// Parses a routing label. Only the exact lowercase labels are accepted.
    pub fn from_label(label: &str) -> Option<Source> {
        match label {
            "vector" => Some(Source::Vector),
            "wikipedia" => Some(Source::Wikipedia),
            "web" => Some(Source::Web),
            _ => None,
        }
    }

    /// The source tried when this one comes back empty on an auto-routed query.
    pub fn complement(&self) -> Source {
        match self {
            Source::Vector => Source::Wikipedia,
            Source::Wikipedia => Source::Vector,
            Source::Web => Source::Vector,
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The source requested by the caller: a concrete source or `auto`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceHint {
    #[default]
    Auto,
    Vector,
    Wikipedia,
    Web,
}

impl SourceHint {
    /// Returns the concrete source, or `None` for `auto`.
    pub fn concrete(&self) -> Option<Source> {
        match self {
            SourceHint::Auto => None,
            SourceHint::Vector => Some(Source::Vector),
            SourceHint::Wikipedia => Some(Source::Wikipedia),
            SourceHint::Web => Some(Source::Web),
        }
    }

    pub fn is_auto(&self) -> bool {
        matches!(self, SourceHint::Auto)
    }
}

impl From<Source> for SourceHint {
    fn from(source: Source) -> Self {
        match source {
            Source::Vector => SourceHint::Vector,
            Source::Wikipedia => SourceHint::Wikipedia,
            Source::Web => SourceHint::Web,
        }
    }
}

impl std::str::FromStr for SourceHint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(SourceHint::Auto),
            "vector" => Ok(SourceHint::Vector),
            "wikipedia" => Ok(SourceHint::Wikipedia),
            "web" => Ok(SourceHint::Web),
            other => Err(format!(
                "unknown source '{}': expected auto, vector, wikipedia or web",
                other
            )),
        }
    }
}

/// Advanced per-query options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryOptions {
    /// Number of results to retrieve.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// LLM temperature for live synthesis, in `[0, 2]`.
    #[serde(default)]
    pub temperature: f32,
    /// Embed a hypothetical answer instead of the raw query (vector source only).
    #[serde(default)]
    pub hyde: bool,
}

fn default_top_k() -> usize {
    5
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            temperature: 0.0,
            hyde: false,
        }
    }
}

/// A query as submitted at the orchestration boundary. Never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default)]
    pub source: SourceHint,
    #[serde(default)]
    pub options: QueryOptions,
}

impl QueryRequest {
    /// An `auto`-routed request with default options.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            user_id: None,
            source: SourceHint::Auto,
            options: QueryOptions::default(),
        }
    }

    pub fn with_source(mut self, source: SourceHint) -> Self {
        self.source = source;
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.options.top_k = top_k;
        self
    }

    /// Checks the request against the input contract.
    ///
    /// Returns a human-readable message describing the first violation.
    pub fn validate(&self, max_top_k: usize) -> Result<(), String> {
        let trimmed = self.query.trim();
        if trimmed.is_empty() {
            return Err("query must not be empty".to_string());
        }
        if trimmed.chars().count() > MAX_QUERY_CHARS {
            return Err(format!(
                "query must be at most {} characters",
                MAX_QUERY_CHARS
            ));
        }
        if self.options.top_k == 0 {
            return Err("options.top_k must be >= 1".to_string());
        }
        if self.options.top_k > max_top_k {
            return Err(format!("options.top_k must be <= {}", max_top_k));
        }
        let t = self.options.temperature;
        if !t.is_finite() || !(0.0..=2.0).contains(&t) {
            return Err("options.temperature must be in [0.0, 2.0]".to_string());
        }
        Ok(())
    }
}

/// The outcome of the Routing Decision Engine for one query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingDecision {
    /// The chosen concrete source.
    pub source: Source,
    /// Human-readable explanation; always names `source`.
    pub reason: String,
    /// `true` for explicit or model-driven decisions, `false` for the heuristic.
    pub confident: bool,
}

/// One retrieved evidence unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceResult {
    /// Identifier, unique within a response.
    pub source_id: String,
    /// Relevance in `[0.0, 1.0]`.
    pub similarity_score: f64,
    pub snippet: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Timing and usage figures for one orchestration run.
///
/// Stages that did not run are left as `None` and omitted from JSON.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryMetrics {
    pub elapsed_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retrieval_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm_ms: Option<u64>,
}

/// The terminal artifact of a successful run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub id: String,
    pub response: String,
    pub sources: Vec<SourceResult>,
    pub metrics: QueryMetrics,
    pub routing_reason: String,
    /// The source whose evidence backs `response`.
    pub source: Source,
    /// Whether any dependency used during the run was simulated.
    pub mock: bool,
}
