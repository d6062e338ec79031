//! Error taxonomy for the compute-aware inference proxy.

use thiserror::Error;

/// Result type alias used throughout the proxy core.
pub type Result<T> = std::result::Result<T, Error>;

/// Error kinds produced by the routing / forwarding / efficiency core.
///
/// The recoverable kinds (`BackendUnhealthy`, `BackendError`, `BackendTimeout`,
/// `PolicyViolated`) are logged at debug and never surfaced to the caller until
/// an escalation path is exhausted; `Cancelled` and `Fatal` propagate immediately.
#[derive(Error, Debug)]
pub enum Error {
    /// All candidate backends were filtered out before scoring.
    #[error("no candidate backend: {0}")]
    NoCandidate(String),

    /// The chosen backend reported itself unavailable at dispatch time.
    #[error("backend unhealthy: {0}")]
    BackendUnhealthy(String),

    /// The backend returned a well-formed failure.
    #[error("backend error: {0}")]
    BackendError(String),

    /// An attempt exceeded its configured latency budget.
    #[error("backend timeout: {0}")]
    BackendTimeout(String),

    /// The caller cancelled the request or its deadline elapsed.
    #[error("cancelled: {0}")]
    Cancelled(String),

    /// An attempt completed but failed a confidence or latency gate.
    #[error("policy violated: {0}")]
    PolicyViolated(String),

    /// Programmer-error conditions: invalid annotations, duplicate
    /// registration, unknown hardware class. Never retried.
    #[error("fatal error: {0}")]
    Fatal(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("generic error: {0}")]
    Generic(#[from] anyhow::Error),
}

impl Error {
    /// Whether the forwarding executor should treat this as recoverable and
    /// move on to the next backend in the escalation path.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::BackendUnhealthy(_)
                | Error::BackendError(_)
                | Error::BackendTimeout(_)
                | Error::PolicyViolated(_)
        )
    }

    /// Category label used when attaching errors to telemetry/metrics.
    pub fn category(&self) -> &'static str {
        match self {
            Error::NoCandidate(_) => "no_candidate",
            Error::BackendUnhealthy(_) => "backend_unhealthy",
            Error::BackendError(_) => "backend_error",
            Error::BackendTimeout(_) => "backend_timeout",
            Error::Cancelled(_) => "cancelled",
            Error::PolicyViolated(_) => "policy_violated",
            Error::Fatal(_) => "fatal",
            Error::Configuration(_) => "configuration",
            Error::Serialization(_) => "serialization",
            Error::Generic(_) => "generic",
        }
    }
}
