//! Ollama-backed model implementation.
//!
//! Uses `/api/chat` (the Ollama standard for vision models — `/api/generate`
//! returns 500 for chat-template models when images are attached) with
//! temperature 0 for deterministic extraction.

use serde::{Deserialize, Serialize};

use super::backend::{CostTier, InferenceRequest, ModelBackend};
use super::ModelError;

/// Ollama HTTP backend for a single local model.
pub struct OllamaBackend {
    base_url: String,
    model: String,
    cost_tier: CostTier,
    client: reqwest::blocking::Client,
    /// Used when a request carries no timeout of its own.
    default_timeout_secs: u64,
}

impl OllamaBackend {
    pub fn new(base_url: &str, model: &str, cost_tier: CostTier, default_timeout_secs: u64) -> Self {
        let client = reqwest::blocking::Client::builder()
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            cost_tier,
            client,
            default_timeout_secs,
        }
    }

    /// Default local Ollama instance at localhost:11434.
    pub fn local(model: &str, cost_tier: CostTier, default_timeout_secs: u64) -> Self {
        Self::new("http://localhost:11434", model, cost_tier, default_timeout_secs)
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    options: ChatOptions,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    images: Option<&'a [String]>,
}

#[derive(Serialize)]
struct ChatOptions {
    /// 0.0 for deterministic document extraction.
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

impl ModelBackend for OllamaBackend {
    fn name(&self) -> &str {
        &self.model
    }

    fn cost_tier(&self) -> CostTier {
        self.cost_tier
    }

    fn infer(&self, request: &InferenceRequest) -> Result<String, ModelError> {
        let url = format!("{}/api/chat", self.base_url);

        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &request.system {
            messages.push(ChatMessage {
                role: "system",
                content: system,
                images: None,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: &request.prompt,
            images: if request.images.is_empty() {
                None
            } else {
                Some(&request.images)
            },
        });

        let body = ChatRequest {
            model: &self.model,
            messages,
            stream: false,
            options: ChatOptions { temperature: 0.0 },
        };

        let timeout_secs = request.timeout_secs.unwrap_or(self.default_timeout_secs);
        let response = self
            .client
            .post(&url)
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .json(&body)
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    ModelError::BackendTimeout {
                        backend: self.model.clone(),
                        timeout_secs,
                    }
                } else {
                    ModelError::BackendUnavailable {
                        backend: self.model.clone(),
                        reason: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(ModelError::BackendUnavailable {
                backend: self.model.clone(),
                reason: format!("HTTP {status}: {body}"),
            });
        }

        let parsed: ChatResponse = response
            .json()
            .map_err(|e| ModelError::MalformedOutput(format!("response body not JSON: {e}")))?;

        Ok(parsed.message.content)
    }
}
