//! Retrieval orchestrator: the per-query state machine.
//!
//! ```text
//! INIT ─▶ ROUTING ─▶ RETRIEVING ─▶ (FALLBACK_RETRYING)? ─▶ SYNTHESIZING ─▶ DONE
//!   │        │           │                  │                    │
//!   └────────┴───────────┴──────────────────┴────────────────────┴─▶ ERROR
//!                                                    (any state) ─▶ CANCELLED
//! ```
//!
//! - INIT validates the request; nothing is routed for an invalid one.
//! - RETRIEVING calls one adapter under a caller-enforced timeout. A timeout
//!   or adapter error ends the run in ERROR; it is never mistaken for an
//!   empty result.
//! - FALLBACK_RETRYING runs at most once, only for `auto` hints whose primary
//!   source came back empty, against [`Source::complement`].
//! - SYNTHESIZING never fails the run: a live synthesis error degrades to the
//!   templated answer and is noted in the routing reason.
//!
//! DONE and ERROR runs are folded into the shared [`MetricsCollector`].
//! CANCELLED runs are not: cancellation drops the run future before it
//! reaches the recording step.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use tracing::Instrument;
use uuid::Uuid;

use crate::adapters::{build_registry, finalize_results, AdapterRegistry};
use crate::capability::{CapabilityState, Dependency};
use crate::config::{Config, Credentials};
use crate::error::{AdapterError, OrchestrationError};
use crate::metrics::{millis, MetricsCollector, MetricsSnapshot, RunMetrics, RunSummary};
use crate::models::{QueryRequest, QueryResponse, Source, SourceResult};
use crate::routing::{build_classifier, RoutingEngine};
use crate::synthesis::{template_answer, LlmSynthesizer, Synthesizer, TemplateSynthesizer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Init,
    Routing,
    Retrieving,
    FallbackRetrying,
    Synthesizing,
    Done,
    Error,
    Cancelled,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Init => "INIT",
            Stage::Routing => "ROUTING",
            Stage::Retrieving => "RETRIEVING",
            Stage::FallbackRetrying => "FALLBACK_RETRYING",
            Stage::Synthesizing => "SYNTHESIZING",
            Stage::Done => "DONE",
            Stage::Error => "ERROR",
            Stage::Cancelled => "CANCELLED",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn enter(stage: Stage) {
    tracing::debug!(stage = %stage, "stage");
}

fn new_query_id() -> String {
    format!("query-{}", Uuid::new_v4().simple())
}

/// What a run learned before reaching a terminal state.
#[derive(Debug, Default)]
struct Progress {
    routed_to: Option<Source>,
    fell_back: bool,
}

/// Everything but the metrics, which are finalized last.
struct Answer {
    response: String,
    sources: Vec<SourceResult>,
    routing_reason: String,
    source: Source,
    mock: bool,
}

pub struct Orchestrator {
    caps: Arc<CapabilityState>,
    router: RoutingEngine,
    adapters: AdapterRegistry,
    synthesizer: Arc<dyn Synthesizer>,
    metrics: Arc<MetricsCollector>,
    max_top_k: usize,
    adapter_timeout: Duration,
}

impl Orchestrator {
    /// Assemble an orchestrator from already-built components, with the
    /// default adapter timeout (10 s) and `top_k` ceiling (20).
    pub fn new(
        caps: CapabilityState,
        router: RoutingEngine,
        adapters: AdapterRegistry,
        synthesizer: Arc<dyn Synthesizer>,
    ) -> Self {
        Self {
            caps: Arc::new(caps),
            router,
            adapters,
            synthesizer,
            metrics: Arc::new(MetricsCollector::new()),
            max_top_k: 20,
            adapter_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_adapter_timeout(mut self, timeout: Duration) -> Self {
        self.adapter_timeout = timeout;
        self
    }

    pub fn with_max_top_k(mut self, max_top_k: usize) -> Self {
        self.max_top_k = max_top_k;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Resolve capabilities from the environment-derived credentials and
    /// build every component accordingly.
    pub fn from_config(config: &Config, creds: &Credentials) -> Result<Self> {
        let caps = CapabilityState::resolve(config, creds);
        Self::with_capabilities(config, creds, caps)
    }

    /// Build components for an explicit capability state.
    pub fn with_capabilities(
        config: &Config,
        creds: &Credentials,
        caps: CapabilityState,
    ) -> Result<Self> {
        let adapters = build_registry(config, creds, &caps)?;
        let classifier = build_classifier(config, creds, caps.is_live(Dependency::Classifier))?;
        let synthesizer: Arc<dyn Synthesizer> =
            match (&creds.groq_api_key, caps.is_live(Dependency::Synthesis)) {
                (Some(key), true) => Arc::new(LlmSynthesizer::new(
                    &config.llm,
                    &config.synthesis,
                    key,
                )?),
                _ => Arc::new(TemplateSynthesizer),
            };

        Ok(Self::new(caps, RoutingEngine::new(classifier), adapters, synthesizer)
            .with_adapter_timeout(Duration::from_millis(config.retrieval.adapter_timeout_ms))
            .with_max_top_k(config.retrieval.max_top_k))
    }

    pub fn capabilities(&self) -> &CapabilityState {
        &self.caps
    }

    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Drive one query to DONE or ERROR.
    ///
    /// Dropping the returned future cancels the run: in-flight adapter and
    /// LLM calls are dropped with it and the aggregate is left untouched.
    pub async fn run(&self, request: &QueryRequest) -> Result<QueryResponse, OrchestrationError> {
        let id = new_query_id();
        let span = tracing::info_span!("query", id = %id);
        self.run_with_id(id, request).instrument(span).await
    }

    /// Like [`run`](Self::run), but ends in `Cancelled` as soon as `cancel`
    /// resolves.
    pub async fn run_until<F>(
        &self,
        request: &QueryRequest,
        cancel: F,
    ) -> Result<QueryResponse, OrchestrationError>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            biased;
            _ = cancel => {
                tracing::info!(stage = %Stage::Cancelled, "query cancelled");
                Err(OrchestrationError::Cancelled)
            }
            result = self.run(request) => result,
        }
    }

    async fn run_with_id(
        &self,
        id: String,
        request: &QueryRequest,
    ) -> Result<QueryResponse, OrchestrationError> {
        let mut metrics = RunMetrics::start();
        let mut progress = Progress::default();

        let outcome = self.execute(request, &mut metrics, &mut progress).await;

        match outcome {
            Ok(answer) => {
                let metrics = metrics.finish();
                enter(Stage::Done);
                tracing::info!(
                    source = %answer.source,
                    results = answer.sources.len(),
                    elapsed_ms = metrics.elapsed_ms,
                    fell_back = progress.fell_back,
                    mock = answer.mock,
                    "query complete"
                );
                self.metrics.record(RunSummary {
                    query: request.query.trim().to_string(),
                    routed_to: progress.routed_to,
                    fell_back: progress.fell_back,
                    elapsed_ms: metrics.elapsed_ms,
                    error: None,
                });
                Ok(QueryResponse {
                    id,
                    response: answer.response,
                    sources: answer.sources,
                    metrics,
                    routing_reason: answer.routing_reason,
                    source: answer.source,
                    mock: answer.mock,
                })
            }
            Err(err) => {
                let elapsed_ms = metrics.elapsed_ms();
                enter(Stage::Error);
                tracing::warn!(kind = err.kind(), error = %err, elapsed_ms, "query failed");
                self.metrics.record(RunSummary {
                    query: request.query.trim().to_string(),
                    routed_to: progress.routed_to,
                    fell_back: progress.fell_back,
                    elapsed_ms,
                    error: Some(err.kind()),
                });
                Err(err)
            }
        }
    }

    async fn execute(
        &self,
        request: &QueryRequest,
        metrics: &mut RunMetrics,
        progress: &mut Progress,
    ) -> Result<Answer, OrchestrationError> {
        enter(Stage::Init);
        request
            .validate(self.max_top_k)
            .map_err(OrchestrationError::Validation)?;
        let query = request.query.trim();
        let top_k = request.options.top_k;
        let auto = request.source.is_auto();

        enter(Stage::Routing);
        let decision = self.router.decide(query, request.source).await;
        tracing::info!(
            source = %decision.source,
            confident = decision.confident,
            reason = %decision.reason,
            "routed"
        );
        progress.routed_to = Some(decision.source);
        let mut mock = auto && !self.router.has_classifier();
        let mut reason = decision.reason;

        let retrieval_query = if request.options.hyde
            && decision.source == Source::Vector
            && self.synthesizer.is_live()
        {
            self.hypothesize(query, metrics).await
        } else {
            query.to_string()
        };

        enter(Stage::Retrieving);
        let (mut results, live) = self
            .retrieve(decision.source, &retrieval_query, top_k, metrics)
            .await?;
        mock |= !live;
        let mut answered_by = decision.source;

        if results.is_empty() && auto {
            let alternate = decision.source.complement();
            enter(Stage::FallbackRetrying);
            tracing::info!(from = %decision.source, to = %alternate, "no results, falling back");
            progress.fell_back = true;
            let (alt_results, alt_live) = self.retrieve(alternate, query, top_k, metrics).await?;
            mock |= !alt_live;
            reason = format!(
                "{}; fallback: {} returned no results, retried {}",
                reason, decision.source, alternate
            );
            results = alt_results;
            answered_by = alternate;
        }

        enter(Stage::Synthesizing);
        let live = self.synthesizer.is_live();
        mock |= !live;
        let started = Instant::now();
        let response = match self
            .synthesizer
            .synthesize(query, answered_by, &results, request.options.temperature)
            .await
        {
            Ok(synthesis) => {
                let llm_ms = if live { millis(started.elapsed()) } else { 0 };
                metrics.add_llm(llm_ms, synthesis.tokens);
                synthesis.text
            }
            Err(e) => {
                tracing::warn!(error = %e, "synthesis failed, using templated answer");
                metrics.add_llm(millis(started.elapsed()), None);
                reason.push_str("; synthesis unavailable, answered from template");
                template_answer(answered_by, &results)
            }
        };

        Ok(Answer {
            response,
            sources: results,
            routing_reason: reason,
            source: answered_by,
            mock,
        })
    }

    /// HyDE: embed a hypothetical answer instead of the raw query. Any
    /// failure falls back to the raw query.
    async fn hypothesize(&self, query: &str, metrics: &mut RunMetrics) -> String {
        let started = Instant::now();
        let result = self.synthesizer.hypothesize(query).await;
        let elapsed = millis(started.elapsed());
        match result {
            Ok(h) if !h.text.trim().is_empty() => {
                metrics.add_llm(elapsed, h.tokens);
                h.text
            }
            Ok(h) => {
                metrics.add_llm(elapsed, h.tokens);
                query.to_string()
            }
            Err(e) => {
                tracing::warn!(error = %e, "hypothetical answer failed, embedding the raw query");
                metrics.add_llm(elapsed, None);
                query.to_string()
            }
        }
    }

    /// One adapter call under the run's timeout. Returns the results and
    /// whether the adapter was live.
    async fn retrieve(
        &self,
        source: Source,
        query: &str,
        top_k: usize,
        metrics: &mut RunMetrics,
    ) -> Result<(Vec<SourceResult>, bool), OrchestrationError> {
        let adapter = self
            .adapters
            .get(source)
            .ok_or_else(|| OrchestrationError::AdapterFailure {
                source_name: source,
                error: AdapterError::Rejected("no adapter registered".to_string()),
            })?;

        let started = Instant::now();
        let result = tokio::time::timeout(self.adapter_timeout, adapter.retrieve(query, top_k)).await;
        let elapsed = started.elapsed();

        match result {
            Ok(Ok(outcome)) => {
                metrics.add_retrieval(elapsed, outcome.embedding_ms);
                tracing::debug!(
                    source = %source,
                    results = outcome.results.len(),
                    elapsed_ms = millis(elapsed),
                    "retrieved"
                );
                Ok((finalize_results(outcome.results, top_k), adapter.is_live()))
            }
            Ok(Err(error)) => {
                metrics.add_retrieval(elapsed, None);
                Err(OrchestrationError::AdapterFailure {
                    source_name: source,
                    error,
                })
            }
            Err(_) => {
                metrics.add_retrieval(elapsed, None);
                Err(OrchestrationError::AdapterFailure {
                    source_name: source,
                    error: AdapterError::Timeout(millis(self.adapter_timeout)),
                })
            }
        }
    }
}
