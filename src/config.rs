//! Pipeline configuration.
//!
//! All knobs that shape a single analysis request: rendering caps, model
//! timeouts, fallback attempts, and the analysis-cache freshness window.
//! Banding thresholds are deliberately NOT here — they live as constants in
//! `pipeline::confidence` so the accept/review/reject policy has one source
//! of truth and cannot drift per deployment.

use serde::Serialize;

/// Crate version, surfaced in provenance metadata.
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Configuration for one processing pipeline instance.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineConfig {
    /// Hard cap on pages rendered from a multi-page PDF.
    pub max_pages: usize,
    /// Rendering DPI to start from; stepped down if the payload ceiling is hit.
    pub render_dpi: u32,
    /// Ceiling on the total PNG payload sent to a model backend, in bytes.
    /// Drives the adaptive-resolution loop in the preprocessor.
    pub max_payload_bytes: usize,
    /// Base model-call timeout, before the per-page component.
    pub timeout_base_secs: u64,
    /// Additional timeout budget per page image in the request.
    pub timeout_per_page_secs: u64,
    /// Maximum backend attempts per routed request (fallback included).
    pub max_attempts: usize,
    /// How long a completed analysis stays servable from the content-hash cache.
    pub cache_freshness_secs: u64,
    /// Confidence-dimension weights. Equal by default; any deviation changes
    /// the externally observed banding and must be documented by the caller.
    pub scorer_weights: ScorerWeights,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_pages: 5,
            render_dpi: 200,
            max_payload_bytes: 12 * 1024 * 1024,
            timeout_base_secs: 30,
            timeout_per_page_secs: 20,
            max_attempts: 2,
            cache_freshness_secs: 15 * 60,
            scorer_weights: ScorerWeights::default(),
        }
    }
}

impl PipelineConfig {
    /// Per-attempt model timeout for a request spanning `page_count` pages.
    pub fn attempt_timeout_secs(&self, page_count: usize) -> u64 {
        self.timeout_base_secs + self.timeout_per_page_secs * page_count as u64
    }
}

/// Weights for the five confidence dimensions.
///
/// The default is equal weighting, which is the only shipped policy: the
/// overall score must stay within ±0.05 of the plain mean of the five
/// sub-scores, and that invariant is only guaranteed at the default.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ScorerWeights {
    pub visual_clarity: f32,
    pub label: f32,
    pub value: f32,
    pub field_type: f32,
    pub context: f32,
}

impl Default for ScorerWeights {
    fn default() -> Self {
        Self {
            visual_clarity: 1.0,
            label: 1.0,
            value: 1.0,
            field_type: 1.0,
            context: 1.0,
        }
    }
}

impl ScorerWeights {
    pub fn total(&self) -> f32 {
        self.visual_clarity + self.label + self.value + self.field_type + self.context
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_sane() {
        let config = PipelineConfig::default();
        assert!(config.max_pages >= 1);
        assert!(config.max_attempts >= 1);
        assert!(config.max_payload_bytes > 1024 * 1024);
    }

    #[test]
    fn timeout_scales_with_page_count() {
        let config = PipelineConfig::default();
        let one = config.attempt_timeout_secs(1);
        let five = config.attempt_timeout_secs(5);
        assert!(five > one);
        assert_eq!(five - one, 4 * config.timeout_per_page_secs);
    }

    #[test]
    fn default_weights_are_equal() {
        let w = ScorerWeights::default();
        assert_eq!(w.visual_clarity, w.label);
        assert_eq!(w.label, w.value);
        assert_eq!(w.value, w.field_type);
        assert_eq!(w.field_type, w.context);
        assert!((w.total() - 5.0).abs() < f32::EPSILON);
    }
}
