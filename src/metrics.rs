//! Per-run timing and the process-wide query analytics.
//!
//! Each run owns a [`RunMetrics`] accumulator that stages write into and
//! that is finalized once into [`QueryMetrics`]. Finished runs are then
//! folded into the shared [`MetricsCollector`] with a single short critical
//! section. Nothing in the orchestrator reads the aggregate back.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{QueryMetrics, Source};

/// How many finished runs the analytics history keeps.
pub const HISTORY_LIMIT: usize = 50;

pub(crate) fn millis(d: Duration) -> u64 {
    d.as_millis().min(u64::MAX as u128) as u64
}

/// Accumulator for a single orchestration run.
#[derive(Debug)]
pub struct RunMetrics {
    started: Instant,
    embedding_ms: Option<u64>,
    retrieval_ms: Option<u64>,
    llm_ms: Option<u64>,
    tokens: Option<u32>,
}

impl RunMetrics {
    /// Starts the wall clock.
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
            embedding_ms: None,
            retrieval_ms: None,
            llm_ms: None,
            tokens: None,
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        millis(self.started.elapsed())
    }

    /// Adapter time accumulates across the primary and fallback calls.
    pub fn add_retrieval(&mut self, elapsed: Duration, embedding_ms: Option<u64>) {
        *self.retrieval_ms.get_or_insert(0) += millis(elapsed);
        if let Some(ms) = embedding_ms {
            *self.embedding_ms.get_or_insert(0) += ms;
        }
    }

    pub fn add_llm(&mut self, elapsed_ms: u64, tokens: Option<u32>) {
        *self.llm_ms.get_or_insert(0) += elapsed_ms;
        if let Some(t) = tokens {
            *self.tokens.get_or_insert(0) += t;
        }
    }

    pub fn finish(self) -> QueryMetrics {
        QueryMetrics {
            elapsed_ms: millis(self.started.elapsed()),
            tokens: self.tokens,
            embedding_ms: self.embedding_ms,
            retrieval_ms: self.retrieval_ms,
            llm_ms: self.llm_ms,
        }
    }
}

/// What the aggregate learns about one terminal run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub query: String,
    /// The routing decision, absent when the run failed validation.
    pub routed_to: Option<Source>,
    pub fell_back: bool,
    pub elapsed_ms: u64,
    /// Error kind for runs that ended in ERROR.
    pub error: Option<&'static str>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HistoryEntry {
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,
    pub elapsed_ms: u64,
    pub fell_back: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub at: DateTime<Utc>,
}

/// Read-only view of the aggregate.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MetricsSnapshot {
    pub total_queries: u64,
    pub by_source: BTreeMap<Source, u64>,
    pub fallbacks: u64,
    pub errors: u64,
    pub average_elapsed_ms: f64,
    /// Most recent first.
    pub recent: Vec<HistoryEntry>,
}

#[derive(Debug)]
struct Aggregate {
    total_queries: u64,
    by_source: BTreeMap<Source, u64>,
    fallbacks: u64,
    errors: u64,
    total_elapsed_ms: u64,
    history: VecDeque<HistoryEntry>,
}

/// Process-wide counters, shared by every run.
#[derive(Debug)]
pub struct MetricsCollector {
    inner: Mutex<Aggregate>,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Aggregate {
                total_queries: 0,
                by_source: Source::ALL.iter().map(|s| (*s, 0)).collect(),
                fallbacks: 0,
                errors: 0,
                total_elapsed_ms: 0,
                history: VecDeque::with_capacity(HISTORY_LIMIT),
            }),
        }
    }

    /// Fold one terminal run into the aggregate.
    pub fn record(&self, run: RunSummary) {
        let entry = HistoryEntry {
            query: run.query,
            source: run.routed_to,
            elapsed_ms: run.elapsed_ms,
            fell_back: run.fell_back,
            error: run.error.map(str::to_string),
            at: Utc::now(),
        };

        let mut agg = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        agg.total_queries += 1;
        agg.total_elapsed_ms = agg.total_elapsed_ms.saturating_add(run.elapsed_ms);
        if let Some(source) = run.routed_to {
            *agg.by_source.entry(source).or_insert(0) += 1;
        }
        if run.fell_back {
            agg.fallbacks += 1;
        }
        if run.error.is_some() {
            agg.errors += 1;
        }
        if agg.history.len() == HISTORY_LIMIT {
            agg.history.pop_back();
        }
        agg.history.push_front(entry);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let agg = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let average_elapsed_ms = if agg.total_queries == 0 {
            0.0
        } else {
            agg.total_elapsed_ms as f64 / agg.total_queries as f64
        };
        MetricsSnapshot {
            total_queries: agg.total_queries,
            by_source: agg.by_source.clone(),
            fallbacks: agg.fallbacks,
            errors: agg.errors,
            average_elapsed_ms,
            recent: agg.history.iter().cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(source: Option<Source>, elapsed_ms: u64) -> RunSummary {
        RunSummary {
            query: "q".into(),
            routed_to: source,
            fell_back: false,
            elapsed_ms,
            error: None,
        }
    }

    #[test]
    fn test_empty_snapshot() {
        let snap = MetricsCollector::new().snapshot();
        assert_eq!(snap.total_queries, 0);
        assert_eq!(snap.average_elapsed_ms, 0.0);
        assert_eq!(snap.by_source.len(), 3);
        assert!(snap.by_source.values().all(|n| *n == 0));
    }

    #[test]
    fn test_record_counts_and_average() {
        let collector = MetricsCollector::new();
        collector.record(summary(Some(Source::Vector), 100));
        collector.record(RunSummary {
            fell_back: true,
            ..summary(Some(Source::Wikipedia), 300)
        });
        collector.record(RunSummary {
            error: Some("validation_error"),
            ..summary(None, 2)
        });

        let snap = collector.snapshot();
        assert_eq!(snap.total_queries, 3);
        assert_eq!(snap.by_source[&Source::Vector], 1);
        assert_eq!(snap.by_source[&Source::Wikipedia], 1);
        assert_eq!(snap.by_source[&Source::Web], 0);
        assert_eq!(snap.fallbacks, 1);
        assert_eq!(snap.errors, 1);
        assert!((snap.average_elapsed_ms - 134.0).abs() < 1e-9);
        assert_eq!(snap.recent[0].error.as_deref(), Some("validation_error"));
    }

    #[test]
    fn test_history_is_bounded() {
        let collector = MetricsCollector::new();
        for i in 0..(HISTORY_LIMIT as u64 + 5) {
            collector.record(summary(Some(Source::Vector), i));
        }
        let snap = collector.snapshot();
        assert_eq!(snap.recent.len(), HISTORY_LIMIT);
        assert_eq!(snap.recent[0].elapsed_ms, HISTORY_LIMIT as u64 + 4);
    }

    #[test]
    fn test_run_metrics_leaves_unused_stages_empty() {
        let mut run = RunMetrics::start();
        run.add_llm(0, None);
        let m = run.finish();
        assert_eq!(m.llm_ms, Some(0));
        assert!(m.tokens.is_none());
        assert!(m.embedding_ms.is_none());
        assert!(m.retrieval_ms.is_none());
    }

    #[test]
    fn test_run_metrics_accumulates_retrieval() {
        let mut run = RunMetrics::start();
        run.add_retrieval(Duration::from_millis(5), Some(2));
        run.add_retrieval(Duration::from_millis(7), None);
        run.add_llm(10, Some(40));
        run.add_llm(3, Some(2));
        let m = run.finish();
        assert_eq!(m.retrieval_ms, Some(12));
        assert_eq!(m.embedding_ms, Some(2));
        assert_eq!(m.llm_ms, Some(13));
        assert_eq!(m.tokens, Some(42));
    }
}
