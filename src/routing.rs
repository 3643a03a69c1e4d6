//! Routing decision engine.
//!
//! Maps a query and a source hint to a [`RoutingDecision`]:
//!
//! | Hint | Classifier | Decision |
//! |------|------------|----------|
//! | concrete | never called | the hinted source, confident |
//! | `auto` | live, parseable label | the model's label, confident |
//! | `auto` | absent, failing or unparseable | [`HeuristicRouter`], not confident |
//!
//! The classifier boundary is parse-or-fallback: anything other than an
//! exact label from the closed set `{vector, wikipedia, web}` is discarded
//! and the heuristic decides instead.

use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::config::{Config, Credentials, LlmConfig};
use crate::llm::{ChatClient, ChatMessage, LlmError};
use crate::models::{RoutingDecision, Source, SourceHint};

const CLASSIFIER_PROMPT: &str = "You are an expert at routing user questions to the most relevant data source.

The vector store contains specialized documents about:
- AI agents and their architectures (planning, memory, tool use)
- Prompt engineering techniques and best practices
- Adversarial attacks on large language models

Answer with a JSON object of the form {\"datasource\": \"<label>\"} where <label> is one of:
- \"vector\" for questions about the topics above
- \"wikipedia\" for general knowledge: people, places, history, definitions outside the vector store
- \"web\" for current events or anything needing fresh web results

Respond with the JSON object only.";

/// A model that labels a query with a source.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Raw model output. Interpretation happens in [`parse_label`].
    async fn classify(&self, query: &str) -> Result<String, LlmError>;
}

/// Classifier backed by a chat completions model at temperature 0.
pub struct LlmClassifier {
    client: ChatClient,
    model: String,
}

impl LlmClassifier {
    pub fn new(llm: &LlmConfig, api_key: &str, model: &str) -> Result<Self> {
        Ok(Self {
            client: ChatClient::new(llm, api_key)?,
            model: model.to_string(),
        })
    }
}

#[async_trait]
impl Classifier for LlmClassifier {
    async fn classify(&self, query: &str) -> Result<String, LlmError> {
        let messages = [ChatMessage::system(CLASSIFIER_PROMPT), ChatMessage::user(query)];
        let completion = self.client.complete(&self.model, &messages, 0.0, 32).await?;
        Ok(completion.content)
    }
}

/// Strictly interpret classifier output.
///
/// Accepts `{"datasource": "<label>"}` or a bare label, surrounding
/// whitespace aside. The label itself must match exactly.
pub fn parse_label(raw: &str) -> Option<Source> {
    let raw = raw.trim();
    if let Some(source) = Source::from_label(raw) {
        return Some(source);
    }
    let json: Value = serde_json::from_str(raw).ok()?;
    json.get("datasource")
        .and_then(|d| d.as_str())
        .and_then(Source::from_label)
}

// ============ Heuristic ============

/// AI/ML vocabulary covered by the proprietary corpus, in singular form.
const DOMAIN_TERMS: &[&str] = &[
    "agent", "ai", "adversarial", "attack", "attention", "chatbot", "dataset", "embedding",
    "gpt", "gradient", "hallucination", "inference", "instruction", "jailbreak", "llm",
    "memory", "ml", "model", "neural", "planning", "prompt", "prompting", "rag", "reasoning",
    "retrieval", "token", "training", "transformer", "vector",
];

const DOMAIN_PHRASES: &[&str] = &[
    "chain of thought",
    "fine tuning",
    "few shot",
    "language model",
    "machine learning",
    "neural network",
    "prompt engineering",
    "tool use",
    "zero shot",
];

const GENERAL_TERMS: &[&str] = &[
    "biography", "born", "capital", "century", "city", "country", "died", "election", "empire",
    "famous", "founded", "founder", "geography", "history", "historical", "invented", "king",
    "located", "mountain", "olympic", "population", "president", "queen", "river", "war",
];

const GENERAL_OPENERS: &[&str] = &[
    "who is", "who was", "who were", "what is", "what was", "when did", "when was",
    "where is", "where was", "what year",
];

/// Signals found in one query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeuristicScore {
    /// Matched domain terms and phrases.
    pub domain: Vec<String>,
    /// Matched general-knowledge signals: openers, years, proper nouns, terms.
    pub general: Vec<String>,
}

impl HeuristicScore {
    pub fn domain_score(&self) -> usize {
        self.domain.len()
    }

    pub fn general_score(&self) -> usize {
        self.general.len()
    }
}

fn singular(word: &str) -> &str {
    if word.len() > 3 && word.ends_with('s') && !word.ends_with("ss") {
        &word[..word.len() - 1]
    } else {
        word
    }
}

fn is_year(word: &str) -> bool {
    word.len() == 4
        && word.chars().all(|c| c.is_ascii_digit())
        && matches!(word.parse::<u16>(), Ok(1000..=2099))
}

/// Deterministic keyword router. Only ever picks `vector` or `wikipedia`;
/// ties (including no signal at all) go to `vector`.
pub struct HeuristicRouter;

impl HeuristicRouter {
    pub fn score(query: &str) -> HeuristicScore {
        let words: Vec<&str> = query
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();
        let lowered: Vec<String> = words.iter().map(|w| w.to_lowercase()).collect();
        let joined = format!(" {} ", lowered.join(" "));

        let mut domain = BTreeSet::new();
        for phrase in DOMAIN_PHRASES {
            if joined.contains(&format!(" {} ", phrase)) {
                domain.insert(phrase.to_string());
            }
        }
        for word in &lowered {
            let base = singular(word);
            if DOMAIN_TERMS.contains(&base) {
                domain.insert(base.to_string());
            }
        }

        // Keep signal order stable for the reason string.
        let mut general: Vec<String> = Vec::new();
        if let Some(opener) = GENERAL_OPENERS
            .iter()
            .find(|o| joined.starts_with(&format!(" {} ", o)))
        {
            general.push(opener.to_string());
        }
        for (i, word) in words.iter().enumerate() {
            let lower = &lowered[i];
            let signal = if is_year(word) {
                true
            } else if DOMAIN_TERMS.contains(&singular(lower)) {
                false
            } else if GENERAL_TERMS.contains(&singular(lower)) {
                true
            } else {
                // A capitalized word past the first is taken as a proper noun;
                // single letters ("I") are not.
                i > 0
                    && word.chars().count() > 1
                    && word.chars().next().is_some_and(|c| c.is_uppercase())
            };
            if signal && !general.iter().any(|g| g == word) {
                general.push(word.to_string());
            }
        }

        HeuristicScore {
            domain: domain.into_iter().collect(),
            general,
        }
    }

    pub fn decide(query: &str) -> RoutingDecision {
        let score = Self::score(query);
        let (d, g) = (score.domain_score(), score.general_score());
        let source = if d >= g { Source::Vector } else { Source::Wikipedia };

        let signal = match source {
            Source::Vector if d == 0 => "no discriminating terms, defaulting".to_string(),
            Source::Vector => format!("domain terms: {}", score.domain.join(", ")),
            _ => format!("general-knowledge signals: {}", score.general.join(", ")),
        };
        RoutingDecision {
            source,
            reason: format!(
                "heuristic: routed to {} ({}; score {} vs {})",
                source, signal, d, g
            ),
            confident: false,
        }
    }
}

// ============ Engine ============

pub struct RoutingEngine {
    classifier: Option<Arc<dyn Classifier>>,
}

impl RoutingEngine {
    /// `None` means no live classifier: `auto` always uses the heuristic.
    pub fn new(classifier: Option<Arc<dyn Classifier>>) -> Self {
        Self { classifier }
    }

    pub fn heuristic_only() -> Self {
        Self::new(None)
    }

    pub fn has_classifier(&self) -> bool {
        self.classifier.is_some()
    }

    pub async fn decide(&self, query: &str, hint: SourceHint) -> RoutingDecision {
        if let Some(source) = hint.concrete() {
            return RoutingDecision {
                source,
                reason: format!("explicit source requested: {}", source),
                confident: true,
            };
        }

        let Some(classifier) = &self.classifier else {
            return HeuristicRouter::decide(query);
        };

        match classifier.classify(query).await {
            Ok(raw) => match parse_label(&raw) {
                Some(source) => RoutingDecision {
                    source,
                    reason: format!("classifier: model selected {}", source),
                    confident: true,
                },
                None => {
                    tracing::warn!(output = %raw.trim(), "unusable classifier output, using heuristic");
                    Self::fallback(query, "unusable output")
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "classifier unavailable, using heuristic");
                Self::fallback(query, "unavailable")
            }
        }
    }

    fn fallback(query: &str, why: &str) -> RoutingDecision {
        let mut decision = HeuristicRouter::decide(query);
        decision.reason = format!("{} [classifier {}]", decision.reason, why);
        decision
    }
}

/// Live classifier when the capability allows it, else none.
pub fn build_classifier(
    config: &Config,
    creds: &Credentials,
    live: bool,
) -> Result<Option<Arc<dyn Classifier>>> {
    match (&creds.groq_api_key, live) {
        (Some(key), true) => {
            let classifier: Arc<dyn Classifier> = Arc::new(LlmClassifier::new(
                &config.llm,
                key,
                &config.routing.classifier_model,
            )?);
            Ok(Some(classifier))
        }
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Scripted {
        reply: Result<String, ()>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(reply: Result<&str, ()>) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.map(str::to_string),
                calls: AtomicUsize::new(0),
            })
        }
    }

    fn engine_with(classifier: &Arc<Scripted>) -> RoutingEngine {
        let classifier: Arc<dyn Classifier> = classifier.clone();
        RoutingEngine::new(Some(classifier))
    }

    #[async_trait]
    impl Classifier for Scripted {
        async fn classify(&self, _query: &str) -> Result<String, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reply
                .clone()
                .map_err(|_| LlmError::Malformed("scripted failure".into()))
        }
    }

    #[test]
    fn test_parse_label_is_strict() {
        assert_eq!(parse_label("vector"), Some(Source::Vector));
        assert_eq!(parse_label("  wikipedia\n"), Some(Source::Wikipedia));
        assert_eq!(parse_label(r#"{"datasource": "web"}"#), Some(Source::Web));
        assert_eq!(parse_label("Vector"), None);
        assert_eq!(parse_label("vectorstore"), None);
        assert_eq!(parse_label(r#"{"datasource": "auto"}"#), None);
        assert_eq!(parse_label("I think wikipedia"), None);
        assert_eq!(parse_label(""), None);
    }

    #[test]
    fn test_heuristic_domain_query() {
        let score = HeuristicRouter::score("What are the types of agent memory?");
        assert_eq!(score.domain, vec!["agent", "memory"]);
        assert!(score.general.is_empty());

        let d = HeuristicRouter::decide("What are the types of agent memory?");
        assert_eq!(d.source, Source::Vector);
        assert!(!d.confident);
        assert!(d.reason.contains("vector"));
        assert!(d.reason.contains("agent, memory"));
    }

    #[test]
    fn test_heuristic_general_query() {
        let score = HeuristicRouter::score("Who is Elon Musk?");
        assert_eq!(score.general, vec!["who is", "Elon", "Musk"]);
        assert!(score.domain.is_empty());

        let d = HeuristicRouter::decide("Who is Elon Musk?");
        assert_eq!(d.source, Source::Wikipedia);
        assert!(d.reason.contains("wikipedia"));
        assert!(d.reason.contains("Elon"));
    }

    #[test]
    fn test_heuristic_tie_goes_to_vector() {
        let d = HeuristicRouter::decide("tell me something");
        assert_eq!(d.source, Source::Vector);
        assert!(d.reason.contains("score 0 vs 0"));
    }

    #[test]
    fn test_heuristic_phrases_and_years() {
        let score = HeuristicRouter::score("How does chain-of-thought prompting work?");
        assert!(score.domain.contains(&"chain of thought".to_string()));
        assert!(score.domain.contains(&"prompting".to_string()));

        let score = HeuristicRouter::score("what happened in 1969");
        assert_eq!(score.general, vec!["1969"]);
    }

    #[test]
    fn test_what_is_opener_is_general_knowledge() {
        let score = HeuristicRouter::score("What is photosynthesis?");
        assert_eq!(score.general, vec!["what is"]);
        assert!(score.domain.is_empty());

        let d = HeuristicRouter::decide("What is photosynthesis?");
        assert_eq!(d.source, Source::Wikipedia);
        assert!(d.reason.contains("what is"));

        let score = HeuristicRouter::score("What was the Marshall Plan?");
        assert_eq!(score.general, vec!["what was", "Marshall", "Plan"]);

        // Scenario wording must keep routing to the corpus.
        let d = HeuristicRouter::decide("What are the types of agent memory?");
        assert_eq!(d.source, Source::Vector);
        let d = HeuristicRouter::decide("What is prompt engineering?");
        assert_eq!(d.source, Source::Vector);
    }

    #[test]
    fn test_pronoun_i_is_not_a_proper_noun() {
        let score = HeuristicRouter::score("Should I learn Python?");
        assert_eq!(score.general, vec!["Python"]);

        let score = HeuristicRouter::score("What should I read about agents?");
        assert!(score.general.is_empty());
        assert_eq!(score.domain, vec!["agent"]);
        assert_eq!(
            HeuristicRouter::decide("What should I read about agents?").source,
            Source::Vector
        );
    }

    #[test]
    fn test_capitalized_domain_terms_are_not_proper_nouns() {
        let score = HeuristicRouter::score("Explain LLM Jailbreak attacks");
        assert!(score.general.is_empty());
        assert_eq!(HeuristicRouter::decide("Explain LLM Jailbreak attacks").source, Source::Vector);
    }

    #[test]
    fn test_heuristic_is_deterministic() {
        let q = "When did the Roman Empire fall?";
        assert_eq!(HeuristicRouter::decide(q), HeuristicRouter::decide(q));
    }

    #[tokio::test]
    async fn test_explicit_hint_never_calls_classifier() {
        let classifier = Scripted::new(Ok("wikipedia"));
        let engine = engine_with(&classifier);
        for source in Source::ALL {
            let d = engine
                .decide("What are the types of agent memory?", source.into())
                .await;
            assert_eq!(d.source, source);
            assert!(d.confident);
            assert_eq!(d.reason, format!("explicit source requested: {}", source));
        }
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_classifier_label_wins() {
        let classifier = Scripted::new(Ok(r#"{"datasource": "web"}"#));
        let engine = engine_with(&classifier);
        let d = engine.decide("agent memory", SourceHint::Auto).await;
        assert_eq!(d.source, Source::Web);
        assert!(d.confident);
        assert!(d.reason.starts_with("classifier:"));
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_bad_classifier_output_falls_back_to_heuristic() {
        let engine = engine_with(&Scripted::new(Ok("the vector store, probably")));
        let d = engine.decide("Who is Elon Musk?", SourceHint::Auto).await;
        assert_eq!(d.source, Source::Wikipedia);
        assert!(!d.confident);
        assert!(d.reason.starts_with("heuristic:"));

        let engine = engine_with(&Scripted::new(Err(())));
        let d = engine.decide("agent memory", SourceHint::Auto).await;
        assert_eq!(d.source, Source::Vector);
        assert!(!d.confident);
    }

    #[tokio::test]
    async fn test_no_classifier_uses_heuristic() {
        let engine = RoutingEngine::heuristic_only();
        assert!(!engine.has_classifier());
        let d = engine.decide("Who is Elon Musk?", SourceHint::Auto).await;
        assert_eq!(d, HeuristicRouter::decide("Who is Elon Musk?"));
    }
}
