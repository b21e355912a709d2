//! Model backends and the fallback router.
//!
//! `ModelBackend` is the single capability interface every AI provider
//! implements; `ModelRouter` owns candidate ordering and failover. Nothing
//! above this module ever talks to a concrete provider.

pub mod backend;
pub mod ollama;
pub mod router;

pub use backend::{CostTier, InferenceRequest, MockModelBackend, ModelBackend};
pub use ollama::OllamaBackend;
pub use router::{AttemptOutcome, AttemptRecord, ModelRouter, RoutedResponse};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("model backend '{backend}' timed out after {timeout_secs}s")]
    BackendTimeout { backend: String, timeout_secs: u64 },

    #[error("model backend '{backend}' unavailable: {reason}")]
    BackendUnavailable { backend: String, reason: String },

    #[error("malformed model output: {0}")]
    MalformedOutput(String),

    #[error("all {attempts} backend attempts failed; last error: {last}")]
    Exhausted {
        attempts: usize,
        #[source]
        last: Box<ModelError>,
    },

    #[error("no model backend configured")]
    NoBackendConfigured,
}

impl ModelError {
    /// Whether the router should advance to the next candidate.
    /// Everything except exhaustion is retryable at the router level.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Exhausted { .. } | Self::NoBackendConfigured)
    }
}
