use thiserror::Error;

/// Unified error taxonomy for the processing pipeline, matching the five
/// kinds spec.md §7 distinguishes. Each task boundary matches on the variant
/// to decide retry/metric/log behavior; no variant is allowed to unwind a
/// long-running task except via explicit cancellation.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Malformed or filtered input. Dropped, counted, logged at debug.
    #[error("validation failed: {0}")]
    Validation(#[from] crate::models::ValidationError),

    /// Network/timeout/5xx against a downstream. Retried with backoff up to
    /// a budget; once exhausted, surfaces as this variant.
    #[error("transient failure talking to {service}: {source}")]
    Transient {
        service: &'static str,
        #[source]
        source: anyhow::Error,
    },

    /// 4xx on our own request, or a schema mismatch on write. Never retried.
    #[error("permanent failure talking to {service}: {source}")]
    Permanent {
        service: &'static str,
        #[source]
        source: anyhow::Error,
    },

    /// A bounded buffer was full; the work item was dropped.
    #[error("backpressure: {0} buffer full, dropping item")]
    Backpressure(&'static str),

    /// An invariant the code assumed should hold did not (e.g. a circuit
    /// breaker rejected a promotion, or a cache miss that should have been
    /// a hit). Logged at warn, the caller degrades gracefully.
    #[error("invariant violated: {0}")]
    Invariant(String),
}

impl PipelineError {
    pub fn transient(service: &'static str, source: impl Into<anyhow::Error>) -> Self {
        PipelineError::Transient { service, source: source.into() }
    }

    pub fn permanent(service: &'static str, source: impl Into<anyhow::Error>) -> Self {
        PipelineError::Permanent { service, source: source.into() }
    }

    /// The metric-label bucket this error counts against, used uniformly by
    /// every task boundary so error metrics stay consistent across modules.
    pub fn metric_label(&self) -> &'static str {
        match self {
            PipelineError::Validation(_) => "validation",
            PipelineError::Transient { .. } => "transient",
            PipelineError::Permanent { .. } => "permanent",
            PipelineError::Backpressure(_) => "backpressure",
            PipelineError::Invariant(_) => "invariant",
        }
    }
}

impl From<redis::RedisError> for PipelineError {
    fn from(e: redis::RedisError) -> Self {
        if e.is_timeout() || e.is_connection_dropped() || e.is_connection_refusal() {
            PipelineError::transient("kv", e)
        } else {
            PipelineError::permanent("kv", e)
        }
    }
}
