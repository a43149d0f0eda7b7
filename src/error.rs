//! Error types
//!
//! Two families:
//! - [`InvokeError`]: a remote call (model or OCR) failed. Throttling is the only
//!   retryable kind.
//! - [`EngineError`]: the engine's own data invariants were violated. These are
//!   programming defects and always propagate.

use thiserror::Error;

use crate::agent::recovery::ErrorClass;

/// Failure of a single remote invocation
#[derive(Error, Debug, Clone)]
pub enum InvokeError {
    /// Provider-side rate limiting; safe to retry after backoff
    #[error("Throttled: {0}")]
    Throttled(String),

    /// Any other provider failure (auth, bad request, permanent outage)
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// The collaborator was never configured for this process
    #[error("Not configured: {0}")]
    NotConfigured(String),
}

impl InvokeError {
    /// Whether the retry layer should back off and try again
    pub fn is_throttled(&self) -> bool {
        match self {
            Self::Throttled(_) => true,
            Self::Upstream(msg) => ErrorClass::from_error(msg) == ErrorClass::Throttled,
            Self::NotConfigured(_) => false,
        }
    }

    /// Classification used in logs and stats
    pub fn class(&self) -> ErrorClass {
        if self.is_throttled() {
            ErrorClass::Throttled
        } else {
            ErrorClass::Fatal
        }
    }
}

impl From<reqwest::Error> for InvokeError {
    fn from(e: reqwest::Error) -> Self {
        if e.status().map(|s| s.as_u16() == 429).unwrap_or(false) {
            Self::Throttled(e.to_string())
        } else {
            Self::Upstream(e.to_string())
        }
    }
}

/// Engine-level failure
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid goal: {0}")]
    InvalidGoal(String),

    #[error("Invalid plan: {0}")]
    InvalidPlan(String),

    /// Only surfaced by gateway-level APIs; phases substitute their fallback instead
    #[error("Model call failed: {0}")]
    Model(#[from] InvokeError),
}

impl EngineError {
    /// True for the internal-invariant kind (as opposed to an AI call failure)
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::InvalidGoal(_) | Self::InvalidPlan(_))
    }
}
