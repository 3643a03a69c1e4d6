//! Answer synthesis from retrieved evidence.
//!
//! [`LlmSynthesizer`] asks a chat model to answer from the evidence and cite
//! it. [`TemplateSynthesizer`] builds a deterministic answer from the top
//! snippet, so simulated runs produce the same response shape as live ones.

use anyhow::Result;
use async_trait::async_trait;

use crate::config::{LlmConfig, SynthesisConfig};
use crate::llm::{ChatClient, ChatMessage, LlmError};
use crate::models::{Source, SourceResult};

/// Fixed answer when retrieval produced nothing.
pub const NO_EVIDENCE_MESSAGE: &str = "No evidence found for this query.";

const ANSWER_PROMPT: &str = "You answer questions using only the numbered evidence provided. \
Cite evidence by its number in square brackets, e.g. [1]. If the evidence does not contain \
the answer, say so plainly. Keep the answer concise.";

const HYDE_PROMPT: &str = "Write a short passage (three to five sentences) that would answer \
the question as if taken from a technical article. Do not mention that it is hypothetical.";

/// Generated text plus token usage, when reported.
#[derive(Debug, Clone, PartialEq)]
pub struct Synthesis {
    pub text: String,
    pub tokens: Option<u32>,
}

#[async_trait]
pub trait Synthesizer: Send + Sync {
    fn is_live(&self) -> bool;

    async fn synthesize(
        &self,
        query: &str,
        source: Source,
        evidence: &[SourceResult],
        temperature: f32,
    ) -> Result<Synthesis, LlmError>;

    /// A hypothetical answer to embed in place of the query.
    async fn hypothesize(&self, query: &str) -> Result<Synthesis, LlmError>;
}

/// Deterministic answer built from the top result.
pub fn template_answer(source: Source, evidence: &[SourceResult]) -> String {
    match evidence.first() {
        Some(top) => format!(
            "Based on {} evidence [{}]: {}",
            source,
            top.source_id,
            top.snippet.trim()
        ),
        None => NO_EVIDENCE_MESSAGE.to_string(),
    }
}

pub struct TemplateSynthesizer;

#[async_trait]
impl Synthesizer for TemplateSynthesizer {
    fn is_live(&self) -> bool {
        false
    }

    async fn synthesize(
        &self,
        _query: &str,
        source: Source,
        evidence: &[SourceResult],
        _temperature: f32,
    ) -> Result<Synthesis, LlmError> {
        Ok(Synthesis {
            text: template_answer(source, evidence),
            tokens: None,
        })
    }

    async fn hypothesize(&self, query: &str) -> Result<Synthesis, LlmError> {
        Ok(Synthesis {
            text: query.to_string(),
            tokens: None,
        })
    }
}

pub struct LlmSynthesizer {
    client: ChatClient,
    model: String,
    max_tokens: u32,
    context_docs: usize,
}

impl LlmSynthesizer {
    pub fn new(llm: &LlmConfig, synthesis: &SynthesisConfig, api_key: &str) -> Result<Self> {
        Ok(Self {
            client: ChatClient::new(llm, api_key)?,
            model: synthesis.model.clone(),
            max_tokens: synthesis.max_tokens,
            context_docs: synthesis.context_docs,
        })
    }
}

/// Numbered evidence block for the answer prompt.
fn format_evidence(source: Source, evidence: &[SourceResult], limit: usize) -> String {
    if evidence.is_empty() {
        return format!("(no evidence was retrieved from {})", source);
    }
    evidence
        .iter()
        .take(limit)
        .enumerate()
        .map(|(i, r)| format!("[{}] ({}) {}", i + 1, r.source_id, r.snippet.trim()))
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[async_trait]
impl Synthesizer for LlmSynthesizer {
    fn is_live(&self) -> bool {
        true
    }

    async fn synthesize(
        &self,
        query: &str,
        source: Source,
        evidence: &[SourceResult],
        temperature: f32,
    ) -> Result<Synthesis, LlmError> {
        let user = format!(
            "Evidence:\n{}\n\nQuestion: {}",
            format_evidence(source, evidence, self.context_docs),
            query
        );
        let messages = [ChatMessage::system(ANSWER_PROMPT), ChatMessage::user(user)];
        let completion = self
            .client
            .complete(&self.model, &messages, temperature, self.max_tokens)
            .await?;
        if completion.content.trim().is_empty() {
            return Err(LlmError::Malformed("empty completion".into()));
        }
        Ok(Synthesis {
            text: completion.content.trim().to_string(),
            tokens: completion.total_tokens,
        })
    }

    async fn hypothesize(&self, query: &str) -> Result<Synthesis, LlmError> {
        let messages = [ChatMessage::system(HYDE_PROMPT), ChatMessage::user(query)];
        let completion = self
            .client
            .complete(&self.model, &messages, 0.0, self.max_tokens)
            .await?;
        Ok(Synthesis {
            text: completion.content,
            tokens: completion.total_tokens,
        })
    }
}
