//! ModelRouter — ordered-candidate fallback across model backends.
//!
//! State machine per request: order candidates (cost-ascending, optionally
//! biased by a caller hint) → attempt each once → first acceptable response
//! wins. No retries against the same backend with the same prompt: backends
//! are deterministic enough that an identical configuration rarely recovers.
//! Attempt count and latency are recorded per candidate for observability.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{info, warn};

use super::backend::{InferenceRequest, ModelBackend};
use super::ModelError;

/// Default cap on attempts per routed request.
pub const DEFAULT_MAX_ATTEMPTS: usize = 2;

/// What happened on one candidate attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    Timeout,
    Unavailable,
    MalformedOutput,
}

/// Per-candidate observability record.
#[derive(Debug, Clone, Serialize)]
pub struct AttemptRecord {
    pub backend: String,
    pub latency_ms: u64,
    pub outcome: AttemptOutcome,
}

/// A routed response: the winning text plus the attempt trail.
#[derive(Debug, Clone)]
pub struct RoutedResponse {
    pub text: String,
    pub backend: String,
    pub attempts: Vec<AttemptRecord>,
}

/// Selects a backend per request and falls back across candidates on failure.
pub struct ModelRouter {
    backends: Vec<Arc<dyn ModelBackend>>,
    max_attempts: usize,
}

impl ModelRouter {
    pub fn new(backends: Vec<Arc<dyn ModelBackend>>) -> Self {
        Self {
            backends,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Candidate order for one request: hint match first, then cost-ascending.
    /// The sort is stable, so equal-cost backends keep registration order.
    fn candidates(&self, model_hint: Option<&str>) -> Vec<Arc<dyn ModelBackend>> {
        let mut ordered = self.backends.clone();
        ordered.sort_by_key(|b| b.cost_tier());
        if let Some(hint) = model_hint {
            if let Some(pos) = ordered.iter().position(|b| b.name().starts_with(hint)) {
                let preferred = ordered.remove(pos);
                ordered.insert(0, preferred);
            }
        }
        ordered
    }

    /// Route a request with no response check.
    pub fn infer(
        &self,
        request: &InferenceRequest,
        model_hint: Option<&str>,
    ) -> Result<RoutedResponse, ModelError> {
        self.infer_checked(request, model_hint, |_| Ok(()))
    }

    /// Route a request, treating a failed `check` on the response text as a
    /// backend-level failure (e.g. unparseable model output triggers
    /// fallback — a different model may produce parseable output).
    pub fn infer_checked<F>(
        &self,
        request: &InferenceRequest,
        model_hint: Option<&str>,
        check: F,
    ) -> Result<RoutedResponse, ModelError>
    where
        F: Fn(&str) -> Result<(), ModelError>,
    {
        let candidates = self.candidates(model_hint);
        if candidates.is_empty() {
            return Err(ModelError::NoBackendConfigured);
        }

        let mut attempts: Vec<AttemptRecord> = Vec::new();
        let mut last_error: Option<ModelError> = None;

        for backend in candidates.iter().take(self.max_attempts) {
            let start = Instant::now();
            let result = backend.infer(request).and_then(|text| {
                check(&text)?;
                Ok(text)
            });
            let latency_ms = start.elapsed().as_millis() as u64;

            match result {
                Ok(text) => {
                    attempts.push(AttemptRecord {
                        backend: backend.name().to_string(),
                        latency_ms,
                        outcome: AttemptOutcome::Success,
                    });
                    info!(
                        backend = backend.name(),
                        latency_ms,
                        attempt = attempts.len(),
                        "Model attempt succeeded"
                    );
                    return Ok(RoutedResponse {
                        text,
                        backend: backend.name().to_string(),
                        attempts,
                    });
                }
                Err(e) => {
                    let outcome = match &e {
                        ModelError::BackendTimeout { .. } => AttemptOutcome::Timeout,
                        ModelError::MalformedOutput(_) => AttemptOutcome::MalformedOutput,
                        _ => AttemptOutcome::Unavailable,
                    };
                    attempts.push(AttemptRecord {
                        backend: backend.name().to_string(),
                        latency_ms,
                        outcome,
                    });
                    warn!(
                        backend = backend.name(),
                        latency_ms,
                        error = %e,
                        "Model attempt failed"
                    );
                    let terminal = !e.is_retryable();
                    last_error = Some(e);
                    if terminal {
                        break;
                    }
                }
            }
        }

        Err(ModelError::Exhausted {
            attempts: attempts.len(),
            last: Box::new(last_error.unwrap_or(ModelError::NoBackendConfigured)),
        })
    }
}
