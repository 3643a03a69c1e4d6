use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Application configuration, read from a TOML file.
///
/// Every section is optional; a missing section takes its defaults, which
/// together describe a fully simulated (mock-mode) deployment. Secrets are
/// never read from this file; see [`Credentials`].
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub synthesis: SynthesisConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub vector_store: VectorStoreConfig,
    #[serde(default)]
    pub external_search: ExternalSearchConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default = "default_environment")]
    pub environment: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            environment: default_environment(),
        }
    }
}

fn default_environment() -> String {
    "development".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_max_top_k")]
    pub max_top_k: usize,
    /// Deadline for a single adapter call, including its retry.
    #[serde(default = "default_adapter_timeout_ms")]
    pub adapter_timeout_ms: u64,
    /// Fixed pause before the single retry of a transient failure.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    /// Vector matches scoring at or below this are treated as non-matches.
    #[serde(default)]
    pub min_vector_score: f64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            max_top_k: default_max_top_k(),
            adapter_timeout_ms: default_adapter_timeout_ms(),
            retry_backoff_ms: default_retry_backoff_ms(),
            min_vector_score: 0.0,
        }
    }
}

fn default_max_top_k() -> usize {
    20
}
fn default_adapter_timeout_ms() -> u64 {
    10_000
}
fn default_retry_backoff_ms() -> u64 {
    250
}

#[derive(Debug, Deserialize, Clone)]
pub struct RoutingConfig {
    #[serde(default = "default_chat_model")]
    pub classifier_model: String,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            classifier_model: default_chat_model(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SynthesisConfig {
    #[serde(default = "default_chat_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Number of evidence snippets passed to the model.
    #[serde(default = "default_context_docs")]
    pub context_docs: usize,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            model: default_chat_model(),
            max_tokens: default_max_tokens(),
            context_docs: default_context_docs(),
        }
    }
}

fn default_chat_model() -> String {
    "llama-3.1-8b-instant".to_string()
}
fn default_max_tokens() -> u32 {
    512
}
fn default_context_docs() -> usize {
    5
}

/// OpenAI-compatible chat completions endpoint shared by the classifier
/// and the synthesizer.
#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_llm_base_url() -> String {
    "https://api.groq.com/openai/v1".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            url: None,
            timeout_secs: 30,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

/// Astra DB Data API location. Token and database id come from the environment.
#[derive(Debug, Deserialize, Clone)]
pub struct VectorStoreConfig {
    #[serde(default = "default_astra_region")]
    pub region: String,
    #[serde(default = "default_keyspace")]
    pub keyspace: String,
    #[serde(default = "default_collection")]
    pub collection: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            region: default_astra_region(),
            keyspace: default_keyspace(),
            collection: default_collection(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_astra_region() -> String {
    "us-east1".to_string()
}
fn default_keyspace() -> String {
    "default_keyspace".to_string()
}
fn default_collection() -> String {
    "intelligent_knowledge_base".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExternalSearchConfig {
    /// Opt in to live Wikipedia and web calls.
    #[serde(default)]
    pub live: bool,
    #[serde(default = "default_wikipedia_url")]
    pub wikipedia_url: String,
    #[serde(default = "default_web_url")]
    pub web_url: String,
    #[serde(default = "default_max_snippet_chars")]
    pub max_snippet_chars: usize,
}

impl Default for ExternalSearchConfig {
    fn default() -> Self {
        Self {
            live: false,
            wikipedia_url: default_wikipedia_url(),
            web_url: default_web_url(),
            max_snippet_chars: default_max_snippet_chars(),
        }
    }
}

fn default_wikipedia_url() -> String {
    "https://en.wikipedia.org/w/api.php".to_string()
}
fn default_web_url() -> String {
    "https://api.duckduckgo.com/".to_string()
}
fn default_max_snippet_chars() -> usize {
    1000
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Pretty,
    Json,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Secrets read from the process environment.
///
/// Values are kept verbatim; validity is judged by the capability resolver.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub groq_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub astra_db_application_token: Option<String>,
    pub astra_db_id: Option<String>,
    pub supabase_url: Option<String>,
    pub supabase_anon_key: Option<String>,
}

impl Credentials {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build credentials from an arbitrary key lookup. Blank values count as absent.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Self {
            groq_api_key: get("GROQ_API_KEY"),
            openai_api_key: get("OPENAI_API_KEY"),
            astra_db_application_token: get("ASTRA_DB_APPLICATION_TOKEN"),
            astra_db_id: get("ASTRA_DB_ID"),
            supabase_url: get("SUPABASE_URL"),
            supabase_anon_key: get("SUPABASE_ANON_KEY"),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Load the config file if it exists, otherwise fall back to defaults.
///
/// A file that exists but fails to parse or validate is still an error.
pub fn load_config_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        Ok(Config::default())
    }
}

fn validate(config: &Config) -> Result<()> {
    if config.retrieval.max_top_k == 0 {
        anyhow::bail!("retrieval.max_top_k must be >= 1");
    }

    if config.retrieval.adapter_timeout_ms == 0 {
        anyhow::bail!("retrieval.adapter_timeout_ms must be > 0");
    }

    if !(0.0..1.0).contains(&config.retrieval.min_vector_score) {
        anyhow::bail!("retrieval.min_vector_score must be in [0.0, 1.0)");
    }

    if config.synthesis.context_docs == 0 {
        anyhow::bail!("synthesis.context_docs must be >= 1");
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }

    if config.embedding.is_enabled() && config.embedding.dims == Some(0) {
        anyhow::bail!("embedding.dims must be > 0");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_empty_file_is_all_defaults() {
        let config: Config = toml::from_str("").unwrap();
        validate(&config).unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:8000");
        assert_eq!(config.retrieval.max_top_k, 20);
        assert_eq!(config.retrieval.retry_backoff_ms, 250);
        assert!(!config.embedding.is_enabled());
        assert!(!config.external_search.live);
        assert_eq!(config.logging.format, LogFormat::Compact);
    }

    #[test]
    fn test_partial_sections() {
        let config: Config = toml::from_str(
            r#"
[retrieval]
adapter_timeout_ms = 500

[embedding]
provider = "openai"
model = "text-embedding-3-small"
dims = 1536

[logging]
format = "json"
"#,
        )
        .unwrap();
        validate(&config).unwrap();
        assert_eq!(config.retrieval.adapter_timeout_ms, 500);
        assert_eq!(config.retrieval.max_top_k, 20);
        assert_eq!(config.embedding.dims, Some(1536));
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_rejects_unknown_provider() {
        let config: Config = toml::from_str("[embedding]\nprovider = \"magic\"").unwrap();
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("Unknown embedding provider"));
    }

    #[test]
    fn test_rejects_zero_timeout() {
        let config: Config = toml::from_str("[retrieval]\nadapter_timeout_ms = 0").unwrap();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_credentials_ignore_blank_values() {
        let env: HashMap<&str, &str> = [("GROQ_API_KEY", "   "), ("ASTRA_DB_ID", "abc")]
            .into_iter()
            .collect();
        let creds = Credentials::from_lookup(|k| env.get(k).map(|v| v.to_string()));
        assert!(creds.groq_api_key.is_none());
        assert_eq!(creds.astra_db_id.as_deref(), Some("abc"));
        assert!(creds.openai_api_key.is_none());
    }
}
