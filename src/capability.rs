//! Mock/live capability resolution.
//!
//! Each external dependency is marked live or simulated exactly once, at
//! startup, from the presence and shape of its configuration. Nothing here
//! touches the network: a missing or malformed credential is enough to put a
//! dependency into mock mode, and that is never an error.
//!
//! The resulting [`CapabilityState`] is immutable and shared behind an `Arc`,
//! so every request observes the same snapshot.

use std::collections::BTreeMap;
use std::fmt;

use crate::config::{Config, Credentials};

/// An external dependency whose liveness is resolved at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Dependency {
    /// LLM used to classify queries to a source.
    Classifier,
    /// LLM used to synthesize answers.
    Synthesis,
    /// Embedding provider for the vector store.
    Embeddings,
    /// Remote vector database.
    VectorStore,
    /// Wikipedia and web search APIs.
    ExternalSearch,
    /// Credential/auth store.
    AuthStore,
}

impl Dependency {
    pub const ALL: [Dependency; 6] = [
        Dependency::Classifier,
        Dependency::Synthesis,
        Dependency::Embeddings,
        Dependency::VectorStore,
        Dependency::ExternalSearch,
        Dependency::AuthStore,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Dependency::Classifier => "classifier",
            Dependency::Synthesis => "synthesis",
            Dependency::Embeddings => "embeddings",
            Dependency::VectorStore => "vector_store",
            Dependency::ExternalSearch => "external_search",
            Dependency::AuthStore => "auth_store",
        }
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Process-wide, read-only liveness snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityState {
    live: BTreeMap<Dependency, bool>,
    missing: Vec<&'static str>,
}

impl CapabilityState {
    /// Resolve liveness for every dependency from config and credentials.
    pub fn resolve(config: &Config, creds: &Credentials) -> Self {
        let mut missing = Vec::new();

        let groq = check(
            &mut missing,
            "GROQ_API_KEY",
            creds.groq_api_key.as_deref(),
            |k| k.starts_with("gsk_") && k.len() >= 20,
        );

        let embeddings = match config.embedding.provider.as_str() {
            "openai" => {
                let key = check(
                    &mut missing,
                    "OPENAI_API_KEY",
                    creds.openai_api_key.as_deref(),
                    |k| k.starts_with("sk-") && k.len() >= 20,
                );
                key && config.embedding.model.is_some() && config.embedding.dims.is_some()
            }
            "ollama" => config.embedding.model.is_some() && config.embedding.dims.is_some(),
            _ => false,
        };

        let token = check(
            &mut missing,
            "ASTRA_DB_APPLICATION_TOKEN",
            creds.astra_db_application_token.as_deref(),
            |t| t.starts_with("AstraCS:"),
        );
        let db_id = check(
            &mut missing,
            "ASTRA_DB_ID",
            creds.astra_db_id.as_deref(),
            |id| uuid::Uuid::parse_str(id).is_ok(),
        );
        let vector_store = token && db_id && embeddings;

        let supabase_url = check(
            &mut missing,
            "SUPABASE_URL",
            creds.supabase_url.as_deref(),
            |u| u.starts_with("https://") || u.starts_with("http://"),
        );
        let supabase_key = check(
            &mut missing,
            "SUPABASE_ANON_KEY",
            creds.supabase_anon_key.as_deref(),
            |_| true,
        );

        let mut live = BTreeMap::new();
        live.insert(Dependency::Classifier, groq);
        live.insert(Dependency::Synthesis, groq);
        live.insert(Dependency::Embeddings, embeddings);
        live.insert(Dependency::VectorStore, vector_store);
        live.insert(Dependency::ExternalSearch, config.external_search.live);
        live.insert(Dependency::AuthStore, supabase_url && supabase_key);

        Self { live, missing }
    }

    /// Build a state from explicit flags. Unlisted dependencies are simulated.
    pub fn from_flags(flags: &[(Dependency, bool)]) -> Self {
        let mut live: BTreeMap<Dependency, bool> =
            Dependency::ALL.iter().map(|d| (*d, false)).collect();
        for (dep, is_live) in flags {
            live.insert(*dep, *is_live);
        }
        Self {
            live,
            missing: Vec::new(),
        }
    }

    /// Every dependency simulated.
    pub fn all_mock() -> Self {
        Self::from_flags(&[])
    }

    pub fn is_live(&self, dep: Dependency) -> bool {
        self.live.get(&dep).copied().unwrap_or(false)
    }

    /// Map of dependency name → "is in mock mode", for the health endpoint.
    pub fn mock_status(&self) -> BTreeMap<String, bool> {
        self.live
            .iter()
            .map(|(dep, live)| (dep.as_str().to_string(), !live))
            .collect()
    }

    /// One warning per credential that is missing or malformed.
    pub fn mock_warnings(&self) -> Vec<String> {
        self.missing
            .iter()
            .map(|var| format!("MOCK MODE: missing or malformed {}", var))
            .collect()
    }

    pub fn mock_dependencies(&self) -> Vec<Dependency> {
        self.live
            .iter()
            .filter(|(_, live)| !**live)
            .map(|(dep, _)| *dep)
            .collect()
    }
}

fn check(
    missing: &mut Vec<&'static str>,
    var: &'static str,
    value: Option<&str>,
    well_formed: impl Fn(&str) -> bool,
) -> bool {
    match value.map(str::trim) {
        Some(v) if well_formed(v) => true,
        _ => {
            missing.push(var);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds_all() -> Credentials {
        Credentials {
            groq_api_key: Some("gsk_0123456789abcdefghij".into()),
            openai_api_key: Some("sk-0123456789abcdefghij".into()),
            astra_db_application_token: Some("AstraCS:abc:def".into()),
            astra_db_id: Some("8f1b2c3d-4e5f-4a6b-8c7d-9e0f1a2b3c4d".into()),
            supabase_url: Some("https://xyz.supabase.co".into()),
            supabase_anon_key: Some("anon".into()),
        }
    }

    fn openai_config() -> Config {
        let mut config = Config::default();
        config.embedding.provider = "openai".into();
        config.embedding.model = Some("text-embedding-3-small".into());
        config.embedding.dims = Some(1536);
        config
    }

    #[test]
    fn test_no_credentials_is_all_mock() {
        let state = CapabilityState::resolve(&Config::default(), &Credentials::default());
        for dep in Dependency::ALL {
            assert!(!state.is_live(dep), "{} should be mock", dep);
        }
        let warnings = state.mock_warnings();
        assert!(warnings.iter().any(|w| w.contains("GROQ_API_KEY")));
        assert!(warnings.iter().any(|w| w.contains("ASTRA_DB_ID")));
    }

    #[test]
    fn test_full_credentials_are_live() {
        let state = CapabilityState::resolve(&openai_config(), &creds_all());
        assert!(state.is_live(Dependency::Classifier));
        assert!(state.is_live(Dependency::Synthesis));
        assert!(state.is_live(Dependency::Embeddings));
        assert!(state.is_live(Dependency::VectorStore));
        assert!(state.is_live(Dependency::AuthStore));
        assert!(!state.is_live(Dependency::ExternalSearch));
        assert!(state.mock_warnings().is_empty());
    }

    #[test]
    fn test_malformed_keys_degrade_to_mock() {
        let mut creds = creds_all();
        creds.groq_api_key = Some("not-a-key".into());
        creds.astra_db_id = Some("not-a-uuid".into());
        let state = CapabilityState::resolve(&openai_config(), &creds);
        assert!(!state.is_live(Dependency::Classifier));
        assert!(!state.is_live(Dependency::VectorStore));
        assert!(state.is_live(Dependency::Embeddings));
    }

    #[test]
    fn test_vector_store_requires_embeddings() {
        let state = CapabilityState::resolve(&Config::default(), &creds_all());
        assert!(!state.is_live(Dependency::Embeddings));
        assert!(!state.is_live(Dependency::VectorStore));
    }

    #[test]
    fn test_mock_status_inverts_liveness() {
        let state = CapabilityState::from_flags(&[(Dependency::Classifier, true)]);
        let status = state.mock_status();
        assert_eq!(status.get("classifier"), Some(&false));
        assert_eq!(status.get("vector_store"), Some(&true));
        assert_eq!(status.len(), Dependency::ALL.len());
    }
}
