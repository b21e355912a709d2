use base64::Engine as _;

use super::ModelError;
use crate::pipeline::preprocess::PageImage;

/// Where a backend sits on the cost/accuracy curve. The router orders
/// candidates cheapest-first within equal expected accuracy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CostTier {
    Economy,
    Standard,
    Premium,
}

/// One prompt + image set headed for a model backend.
///
/// Images are base64-encoded PNG, encoded once per request via
/// [`InferenceRequest::for_pages`] so retries across backends don't re-encode.
#[derive(Debug, Clone)]
pub struct InferenceRequest {
    pub prompt: String,
    pub system: Option<String>,
    pub images: Vec<String>,
    /// Per-attempt deadline. Callers derive it from the page count; a
    /// backend without one falls back to its construction-time default.
    pub timeout_secs: Option<u64>,
}

impl InferenceRequest {
    pub fn for_pages(prompt: impl Into<String>, system: Option<&str>, pages: &[PageImage]) -> Self {
        let images = pages
            .iter()
            .map(|p| base64::engine::general_purpose::STANDARD.encode(&p.png_bytes))
            .collect();
        Self {
            prompt: prompt.into(),
            system: system.map(str::to_string),
            images,
            timeout_secs: None,
        }
    }

    /// Text-only request (later analyzer stages reason over structured
    /// context from earlier stages, not raw pixels).
    pub fn text_only(prompt: impl Into<String>, system: Option<&str>) -> Self {
        Self {
            prompt: prompt.into(),
            system: system.map(str::to_string),
            images: Vec::new(),
            timeout_secs: None,
        }
    }

    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = Some(timeout_secs);
        self
    }
}

/// Capability interface for an AI model backend.
///
/// One uniform blocking call; each implementation differs in cost, latency,
/// and accuracy. The router depends only on this trait, never on a concrete
/// provider.
pub trait ModelBackend: Send + Sync {
    /// Stable backend identifier, used in provenance and attempt records.
    fn name(&self) -> &str;

    fn cost_tier(&self) -> CostTier;

    /// Run inference. Blocking; callers bound it with the per-attempt timeout.
    fn infer(&self, request: &InferenceRequest) -> Result<String, ModelError>;
}

// ── Mock for testing ──────────────────────────────────────

/// Scripted mock backend: returns queued responses in order, then repeats
/// the last one. Counts calls so tests can assert "no backend was invoked".
pub struct MockModelBackend {
    name: String,
    cost_tier: CostTier,
    responses: std::sync::Mutex<Vec<Result<String, ModelError>>>,
    /// Prompt-substring → response, for tests where concurrent callers
    /// share one backend and queue order would be racy.
    prompt_scripts: Vec<(String, String)>,
    calls: std::sync::atomic::AtomicUsize,
    seen_timeouts: std::sync::Mutex<Vec<Option<u64>>>,
}

impl MockModelBackend {
    pub fn new(name: &str, response: &str) -> Self {
        Self {
            name: name.to_string(),
            cost_tier: CostTier::Standard,
            responses: std::sync::Mutex::new(vec![Ok(response.to_string())]),
            prompt_scripts: Vec::new(),
            calls: std::sync::atomic::AtomicUsize::new(0),
            seen_timeouts: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Dispatch responses by prompt content instead of call order. A prompt
    /// matching no script fails as malformed output.
    pub fn scripted_by_prompt(name: &str, scripts: Vec<(&str, &str)>) -> Self {
        Self {
            name: name.to_string(),
            cost_tier: CostTier::Standard,
            responses: std::sync::Mutex::new(Vec::new()),
            prompt_scripts: scripts
                .into_iter()
                .map(|(needle, response)| (needle.to_string(), response.to_string()))
                .collect(),
            calls: std::sync::atomic::AtomicUsize::new(0),
            seen_timeouts: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Backend that fails every call with a timeout.
    pub fn timing_out(name: &str) -> Self {
        Self {
            name: name.to_string(),
            cost_tier: CostTier::Standard,
            responses: std::sync::Mutex::new(vec![Err(ModelError::BackendTimeout {
                backend: name.to_string(),
                timeout_secs: 30,
            })]),
            prompt_scripts: Vec::new(),
            calls: std::sync::atomic::AtomicUsize::new(0),
            seen_timeouts: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Backend that fails every call as unavailable.
    pub fn unavailable(name: &str) -> Self {
        Self {
            name: name.to_string(),
            cost_tier: CostTier::Standard,
            responses: std::sync::Mutex::new(vec![Err(ModelError::BackendUnavailable {
                backend: name.to_string(),
                reason: "connection refused".into(),
            })]),
            prompt_scripts: Vec::new(),
            calls: std::sync::atomic::AtomicUsize::new(0),
            seen_timeouts: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn with_cost_tier(mut self, tier: CostTier) -> Self {
        self.cost_tier = tier;
        self
    }

    /// Queue an ordered sequence of responses (last one repeats).
    pub fn with_responses(self, responses: Vec<Result<String, ModelError>>) -> Self {
        *self.responses.lock().unwrap() = responses;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Timeouts carried by each request seen so far, in call order.
    pub fn seen_timeouts(&self) -> Vec<Option<u64>> {
        self.seen_timeouts.lock().unwrap().clone()
    }
}

impl ModelBackend for MockModelBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn cost_tier(&self) -> CostTier {
        self.cost_tier
    }

    fn infer(&self, request: &InferenceRequest) -> Result<String, ModelError> {
        let n = self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.seen_timeouts.lock().unwrap().push(request.timeout_secs);
        if !self.prompt_scripts.is_empty() {
            return self
                .prompt_scripts
                .iter()
                .find(|(needle, _)| request.prompt.contains(needle.as_str()))
                .map(|(_, response)| response.clone())
                .ok_or_else(|| {
                    ModelError::MalformedOutput("no scripted response for prompt".into())
                });
        }
        let responses = self.responses.lock().unwrap();
        let idx = n.min(responses.len().saturating_sub(1));
        match &responses[idx] {
            Ok(text) => Ok(text.clone()),
            Err(e) => Err(clone_error(e)),
        }
    }
}

/// ModelError does not implement Clone (it carries sources); rebuild the
/// variants the mock uses.
fn clone_error(e: &ModelError) -> ModelError {
    match e {
        ModelError::BackendTimeout {
            backend,
            timeout_secs,
        } => ModelError::BackendTimeout {
            backend: backend.clone(),
            timeout_secs: *timeout_secs,
        },
        ModelError::BackendUnavailable { backend, reason } => ModelError::BackendUnavailable {
            backend: backend.clone(),
            reason: reason.clone(),
        },
        ModelError::MalformedOutput(s) => ModelError::MalformedOutput(s.clone()),
        ModelError::NoBackendConfigured => ModelError::NoBackendConfigured,
        ModelError::Exhausted { attempts, last } => ModelError::Exhausted {
            attempts: *attempts,
            last: Box::new(clone_error(last)),
        },
    }
}
