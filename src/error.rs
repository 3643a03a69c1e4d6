//! Error kinds surfaced by the orchestration engine.
//!
//! Only three kinds ever reach a caller: validation failures, adapter
//! failures and cancellation. Classifier and synthesis problems degrade
//! silently (heuristic routing, templated answers) and have no variant here.

use thiserror::Error;

use crate::models::Source;

/// Failure of a single source adapter call.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// Network error, HTTP 429 or 5xx. Eligible for the single retry.
    #[error("transient backend error: {0}")]
    Transient(String),
    /// The backend answered with something we cannot interpret.
    #[error("malformed backend response: {0}")]
    Malformed(String),
    /// The backend rejected the request (4xx other than 404/429).
    #[error("backend rejected request: {0}")]
    Rejected(String),
    /// The caller-enforced deadline passed.
    #[error("timed out after {0} ms")]
    Timeout(u64),
}

impl AdapterError {
    pub fn is_transient(&self) -> bool {
        matches!(self, AdapterError::Transient(_))
    }

    /// Classify a non-success HTTP status.
    ///
    /// 429 and 5xx are transient; any other 4xx is a rejection.
    pub fn from_status(service: &str, status: u16, body: &str) -> Self {
        let message = format!("{} API error {}: {}", service, status, body.trim());
        if status == 429 || (500..600).contains(&status) {
            AdapterError::Transient(message)
        } else {
            AdapterError::Rejected(message)
        }
    }
}

impl From<reqwest::Error> for AdapterError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            AdapterError::Malformed(err.to_string())
        } else {
            AdapterError::Transient(err.to_string())
        }
    }
}

/// A terminal failure of an orchestration run.
#[derive(Debug, Error)]
pub enum OrchestrationError {
    #[error("{0}")]
    Validation(String),
    #[error("{source_name} retrieval failed: {error}")]
    AdapterFailure {
        source_name: Source,
        #[source]
        error: AdapterError,
    },
    #[error("query was cancelled")]
    Cancelled,
}

impl OrchestrationError {
    /// Stable machine-readable kind.
    pub fn kind(&self) -> &'static str {
        match self {
            OrchestrationError::Validation(_) => "validation_error",
            OrchestrationError::AdapterFailure { .. } => "adapter_failure",
            OrchestrationError::Cancelled => "cancelled",
        }
    }
}
