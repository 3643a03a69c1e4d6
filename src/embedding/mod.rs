//! Embedding provider abstraction and implementations.
//!
//! Defines the [`Embedder`] trait and concrete implementations:
//! - **[`LexicalEmbedder`]** — deterministic bag-of-words embedder over the
//!   seed corpus vocabulary; used whenever the embeddings dependency is simulated.
//! - **[`OpenAIEmbedder`]** — calls the OpenAI embeddings API.
//! - **[`OllamaEmbedder`]** — calls a local Ollama instance's `/api/embed` endpoint.
//!
//! Also provides [`cosine_similarity`] and [`similarity_to_score`] for
//! turning raw vectors into relevance scores in `[0, 1]`.
//!
//! # Provider Selection
//!
//! Use [`create_embedder`] to pick the provider from the configuration and
//! the resolved [`CapabilityState`]:
//!
//! ```rust
//! # use adaptive_rag::capability::CapabilityState;
//! # use adaptive_rag::config::{Config, Credentials};
//! # use adaptive_rag::embedding::create_embedder;
//! let config = Config::default(); // provider = "disabled"
//! let caps = CapabilityState::all_mock();
//! let embedder = create_embedder(&config, &Credentials::default(), &caps).unwrap();
//! assert_eq!(embedder.model_name(), "lexical-bow");
//! assert!(!embedder.is_live());
//! ```
//!
//! # Errors
//!
//! Live providers do not retry internally. They classify failures as
//! transient (network, HTTP 429, 5xx) or permanent, and the owning source
//! adapter decides whether to retry.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use crate::capability::{CapabilityState, Dependency};
use crate::config::{Config, Credentials, EmbeddingConfig};
use crate::corpus::SEED_CORPUS;
use crate::error::AdapterError;

/// Trait for embedding providers.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `1536`).
    fn dims(&self) -> usize;
    /// Whether calls leave the process.
    fn is_live(&self) -> bool;
    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, AdapterError>;
}

// ============ Lexical Embedder ============

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "can", "do", "does", "for", "from", "how",
    "in", "is", "it", "of", "on", "or", "that", "the", "their", "this", "to", "was", "what",
    "when", "where", "which", "who", "why", "with",
];

/// Deterministic bag-of-words embedder over a fixed vocabulary.
///
/// Every vocabulary term owns one dimension and a text's vector holds its
/// term counts, L2-normalized. Terms outside the vocabulary are ignored, so
/// a text sharing no content word with the corpus embeds to the zero vector
/// and scores exactly `0.0` against every chunk.
pub struct LexicalEmbedder {
    vocab: BTreeMap<String, usize>,
}

impl LexicalEmbedder {
    /// Build the vocabulary from a set of texts.
    pub fn from_texts<'a>(texts: impl IntoIterator<Item = &'a str>) -> Self {
        let terms: BTreeSet<String> = texts.into_iter().flat_map(tokenize).collect();
        let vocab = terms
            .into_iter()
            .enumerate()
            .map(|(i, term)| (term, i))
            .collect();
        Self { vocab }
    }

    /// Embedder whose vocabulary is the built-in seed corpus.
    pub fn for_seed_corpus() -> Self {
        Self::from_texts(SEED_CORPUS.iter().map(|c| c.text))
    }

    /// Synchronous embedding, shared by the async trait method and seeding.
    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vec = vec![0.0f32; self.vocab.len()];
        for token in tokenize(text) {
            if let Some(&i) = self.vocab.get(&token) {
                vec[i] += 1.0;
            }
        }
        let norm = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for x in &mut vec {
                *x /= norm;
            }
        }
        vec
    }
}

/// Lowercased content words with a naive plural strip.
pub(crate) fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .filter(|w| !STOPWORDS.contains(&w.as_str()))
        .map(|w| {
            if w.len() > 3 && w.ends_with('s') && !w.ends_with("ss") {
                w[..w.len() - 1].to_string()
            } else {
                w
            }
        })
        .collect()
}

#[async_trait]
impl Embedder for LexicalEmbedder {
    fn model_name(&self) -> &str {
        "lexical-bow"
    }
    fn dims(&self) -> usize {
        self.vocab.len()
    }
    fn is_live(&self) -> bool {
        false
    }
    async fn embed(&self, text: &str) -> Result<Vec<f32>, AdapterError> {
        Ok(self.embed_sync(text))
    }
}

// ============ OpenAI Provider ============

/// Embedding provider using the OpenAI API.
///
/// Calls `POST /v1/embeddings` with the configured model. The API key is
/// taken from [`Credentials`] at construction.
pub struct OpenAIEmbedder {
    model: String,
    dims: usize,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAIEmbedder {
    /// # Errors
    ///
    /// Returns an error if `model` or `dims` is not set in config, or the
    /// API key is absent.
    pub fn new(config: &EmbeddingConfig, creds: &Credentials) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for OpenAI provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for OpenAI provider"))?;
        let api_key = creds
            .openai_api_key
            .clone()
            .ok_or_else(|| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model,
            dims,
            api_key,
            client,
        })
    }
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
    fn is_live(&self) -> bool {
        true
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, AdapterError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": [text],
        });

        let response = self
            .client
            .post("https://api.openai.com/v1/embeddings")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(AdapterError::from_status("OpenAI", status.as_u16(), &body_text));
        }

        let json: serde_json::Value = response.json().await?;
        parse_openai_response(&json)
    }
}

/// Extracts `data[0].embedding` from an OpenAI embeddings response.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<f32>, AdapterError> {
    let embedding = json
        .get("data")
        .and_then(|d| d.as_array())
        .and_then(|d| d.first())
        .and_then(|item| item.get("embedding"))
        .and_then(|e| e.as_array())
        .ok_or_else(|| {
            AdapterError::Malformed("OpenAI response missing data[0].embedding".to_string())
        })?;
    to_f32_vec(embedding)
}

// ============ Ollama Provider ============

/// Embedding provider using a local Ollama instance.
///
/// Calls `POST /api/embed` on the configured URL (default: `http://localhost:11434`).
pub struct OllamaEmbedder {
    model: String,
    dims: usize,
    url: String,
    client: reqwest::Client,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for Ollama provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for Ollama provider"))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434".to_string());
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model,
            dims,
            url,
            client,
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
    fn is_live(&self) -> bool {
        true
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, AdapterError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": [text],
        });

        let response = self
            .client
            .post(format!("{}/api/embed", self.url.trim_end_matches('/')))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                AdapterError::Transient(format!(
                    "Ollama connection error (is Ollama running at {}?): {}",
                    self.url, e
                ))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(AdapterError::from_status("Ollama", status.as_u16(), &body_text));
        }

        let json: serde_json::Value = response.json().await?;
        parse_ollama_response(&json)
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<f32>, AdapterError> {
    let embedding = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .and_then(|e| e.first())
        .and_then(|e| e.as_array())
        .ok_or_else(|| {
            AdapterError::Malformed("Ollama response missing embeddings[0]".to_string())
        })?;
    to_f32_vec(embedding)
}

fn to_f32_vec(values: &[serde_json::Value]) -> Result<Vec<f32>, AdapterError> {
    values
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| AdapterError::Malformed("non-numeric embedding value".to_string()))
        })
        .collect()
}

/// Create the [`Embedder`] matching the configuration and capability state.
///
/// | Embeddings live | Config value | Provider |
/// |-----------------|--------------|----------|
/// | no | any | [`LexicalEmbedder`] |
/// | yes | `"openai"` | [`OpenAIEmbedder`] |
/// | yes | `"ollama"` | [`OllamaEmbedder`] |
///
/// # Errors
///
/// Only a live provider can fail to construct (e.g. an HTTP client error).
pub fn create_embedder(
    config: &Config,
    creds: &Credentials,
    caps: &CapabilityState,
) -> Result<Box<dyn Embedder>> {
    if !caps.is_live(Dependency::Embeddings) {
        return Ok(Box::new(LexicalEmbedder::for_seed_corpus()));
    }
    match config.embedding.provider.as_str() {
        "openai" => Ok(Box::new(OpenAIEmbedder::new(&config.embedding, creds)?)),
        "ollama" => Ok(Box::new(OllamaEmbedder::new(&config.embedding)?)),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`, or `0.0` for empty vectors or vectors
/// of different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

/// Map a cosine similarity onto a relevance score in `[0, 1]`.
///
/// Negative similarities carry no evidence and map to `0.0`.
pub fn similarity_to_score(sim: f32) -> f64 {
    if sim.is_finite() {
        (sim as f64).clamp(0.0, 1.0)
    } else {
        0.0
    }
}
