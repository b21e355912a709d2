//! DocumentAnalyzer — the four-stage prompt pipeline.
//!
//! Stages run in fixed order against the router: type detection → field
//! discovery → field enhancement → hint generation. Stages 1-2 see the page
//! images; stages 3-4 reason over the structured output of earlier stages.
//! A stage whose output contains no parseable JSON fails at the router level
//! and triggers fallback to the next backend.

pub mod json_extract;
pub mod prompts;
pub mod types;
pub mod value_norm;

pub use types::{
    AnalysisResult, ConfidenceDimensions, DocumentFileType, ExtractedField, FieldType, FieldValue,
    ProcessingStatus, RankedDocumentType, RankedFieldType, RankedName, SampleDocument,
};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::Deserialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::pipeline::confidence::{ConfidenceScorer, FieldSignals};
use crate::pipeline::model::{InferenceRequest, ModelError, ModelRouter};
use crate::pipeline::preprocess::PageImage;

use self::json_extract::{check_contains_json, extract_json_object};

// ── Stage response shapes ─────────────────────────────────
// Deserialized leniently: unparseable entries are skipped, out-of-range
// confidences clamped, missing optionals defaulted.

#[derive(Deserialize)]
struct TypeDetectionResponse {
    document_type: Option<String>,
    confidence: Option<f64>,
    #[serde(default)]
    alternatives: Vec<serde_json::Value>,
}

#[derive(Deserialize)]
struct FieldListResponse {
    #[serde(default)]
    fields: Vec<serde_json::Value>,
}

#[derive(Deserialize)]
struct DiscoveredField {
    name: String,
    #[serde(default)]
    value: serde_json::Value,
    #[serde(default)]
    source_text: String,
    field_type: Option<String>,
    confidence: Option<f64>,
    legibility: Option<f64>,
    group: Option<String>,
}

#[derive(Deserialize)]
struct EnhancedField {
    name: String,
    display_name: Option<String>,
    field_type: Option<String>,
    type_agreement: Option<f64>,
    description: Option<String>,
    #[serde(default)]
    alternative_names: Vec<serde_json::Value>,
    #[serde(default)]
    alternative_types: Vec<serde_json::Value>,
}

#[derive(Deserialize)]
struct HintedField {
    name: String,
    #[serde(default)]
    hints: Vec<String>,
    #[serde(default)]
    sample_values: Vec<String>,
}

/// Runs the multi-stage analysis pipeline against the model router.
pub struct DocumentAnalyzer {
    router: Arc<ModelRouter>,
    scorer: ConfidenceScorer,
    config: PipelineConfig,
}

impl DocumentAnalyzer {
    pub fn new(router: Arc<ModelRouter>, scorer: ConfidenceScorer, config: PipelineConfig) -> Self {
        Self {
            router,
            scorer,
            config,
        }
    }

    /// Analyze preprocessed pages into an [`AnalysisResult`].
    ///
    /// `model_hint` biases router candidate ordering; `document_type_hint`
    /// is offered to the classifier but never trusted blindly.
    pub fn analyze(
        &self,
        document_id: Uuid,
        pages: &[PageImage],
        model_hint: Option<&str>,
        document_type_hint: Option<&str>,
    ) -> Result<AnalysisResult, ModelError> {
        let start = Instant::now();
        // Every stage gets the same per-attempt deadline, scaled to how
        // many page images the request carries.
        let timeout_secs = self.config.attempt_timeout_secs(pages.len());

        // Stage 1: type detection (sees the pages).
        let request = InferenceRequest::for_pages(
            prompts::type_detection_prompt(document_type_hint),
            Some(prompts::ANALYZER_SYSTEM),
            pages,
        )
        .with_timeout_secs(timeout_secs);
        let routed = self
            .router
            .infer_checked(&request, model_hint, check_contains_json)?;
        let model_used = routed.backend.clone();
        let detection: TypeDetectionResponse =
            parse_stage(&routed.text, "type detection")?;
        let detected_type = detection
            .document_type
            .unwrap_or_else(|| "unknown".to_string())
            .trim()
            .to_lowercase();
        let type_confidence = clamp01(detection.confidence.unwrap_or(0.0));
        let alternative_types = detection
            .alternatives
            .iter()
            .filter_map(|v| {
                let alt: RankedDocumentType = serde_json::from_value(v.clone()).ok()?;
                Some(RankedDocumentType {
                    confidence: clamp01(alt.confidence),
                    ..alt
                })
            })
            .collect::<Vec<_>>();
        debug!(document_type = %detected_type, confidence = type_confidence, "Stage 1 complete");

        // Stage 2: field discovery (sees the pages).
        let request = InferenceRequest::for_pages(
            prompts::field_discovery_prompt(&detected_type),
            Some(prompts::ANALYZER_SYSTEM),
            pages,
        )
        .with_timeout_secs(timeout_secs);
        let routed = self
            .router
            .infer_checked(&request, model_hint, check_contains_json)?;
        let discovery: FieldListResponse = parse_stage(&routed.text, "field discovery")?;
        let discovered: Vec<DiscoveredField> = parse_fields_lenient(&discovery.fields);
        debug!(fields = discovered.len(), "Stage 2 complete");

        // Stage 3: enhancement over the discovered field summary.
        let summary = field_summary_json(&discovered);
        let request = InferenceRequest::text_only(
            prompts::field_enhancement_prompt(&detected_type, &summary),
            Some(prompts::ANALYZER_SYSTEM),
        )
        .with_timeout_secs(timeout_secs);
        let routed = self
            .router
            .infer_checked(&request, model_hint, check_contains_json)?;
        let enhancement: FieldListResponse = parse_stage(&routed.text, "field enhancement")?;
        let enhanced: HashMap<String, EnhancedField> = parse_fields_lenient(&enhancement.fields)
            .into_iter()
            .map(|f: EnhancedField| (f.name.clone(), f))
            .collect();
        debug!(fields = enhanced.len(), "Stage 3 complete");

        // Stage 4: extraction hints and rule-inference seed values.
        let request = InferenceRequest::text_only(
            prompts::hint_generation_prompt(&summary),
            Some(prompts::ANALYZER_SYSTEM),
        )
        .with_timeout_secs(timeout_secs);
        let routed = self
            .router
            .infer_checked(&request, model_hint, check_contains_json)?;
        let hints_response: FieldListResponse = parse_stage(&routed.text, "hint generation")?;
        let hinted: HashMap<String, HintedField> = parse_fields_lenient(&hints_response.fields)
            .into_iter()
            .map(|f: HintedField| (f.name.clone(), f))
            .collect();
        debug!(fields = hinted.len(), "Stage 4 complete");

        // Merge the stages into scored fields.
        let (mut fields, signals) = merge_stages(discovered, &enhanced, &hinted);
        self.scorer.score_fields(&mut fields, &signals);
        let quality_score = self.scorer.quality_score(&detected_type, &fields);

        let result = AnalysisResult {
            id: Uuid::new_v4(),
            document_id,
            detected_document_type: detected_type,
            document_type_confidence: type_confidence,
            alternative_types,
            fields,
            model_used,
            processing_time_ms: start.elapsed().as_millis() as u64,
            quality_score,
            created_at: Utc::now(),
        };

        info!(
            analysis_id = %result.id,
            document_type = %result.detected_document_type,
            fields = result.fields.len(),
            quality = result.quality_score,
            model = %result.model_used,
            elapsed_ms = result.processing_time_ms,
            "Document analysis complete"
        );
        Ok(result)
    }
}

/// Extract and deserialize a stage's JSON payload.
fn parse_stage<T: for<'de> Deserialize<'de>>(text: &str, stage: &str) -> Result<T, ModelError> {
    let value = extract_json_object(text)?;
    serde_json::from_value(value)
        .map_err(|e| ModelError::MalformedOutput(format!("{stage} response shape: {e}")))
}

/// Deserialize field entries, skipping the ones that fail.
fn parse_fields_lenient<T: for<'de> Deserialize<'de>>(items: &[serde_json::Value]) -> Vec<T> {
    items
        .iter()
        .filter_map(|v| serde_json::from_value(v.clone()).ok())
        .collect()
}

/// Compact per-field summary handed to stages 3 and 4 as context.
fn field_summary_json(discovered: &[DiscoveredField]) -> String {
    let summary: Vec<serde_json::Value> = discovered
        .iter()
        .map(|f| {
            serde_json::json!({
                "name": f.name,
                "value": f.value,
                "source_text": f.source_text,
                "field_type": f.field_type,
            })
        })
        .collect();
    serde_json::to_string(&summary).unwrap_or_else(|_| "[]".to_string())
}

fn merge_stages(
    discovered: Vec<DiscoveredField>,
    enhanced: &HashMap<String, EnhancedField>,
    hinted: &HashMap<String, HintedField>,
) -> (Vec<ExtractedField>, Vec<FieldSignals>) {
    let mut fields = Vec::with_capacity(discovered.len());
    let mut signals = Vec::with_capacity(discovered.len());

    for d in discovered {
        let enh = enhanced.get(&d.name);
        let hint = hinted.get(&d.name);

        let declared_type = enh
            .and_then(|e| e.field_type.as_deref())
            .or(d.field_type.as_deref())
            .map(FieldType::parse_lenient)
            .unwrap_or(FieldType::String);
        let value = value_norm::normalize_value(&d.value, declared_type);

        let display_name = enh
            .and_then(|e| e.display_name.clone())
            .unwrap_or_else(|| titlecase(&d.name));

        let alternative_names = enh
            .map(|e| {
                e.alternative_names
                    .iter()
                    .filter_map(|v| serde_json::from_value::<RankedName>(v.clone()).ok())
                    .collect()
            })
            .unwrap_or_default();
        let alternative_types = enh
            .map(|e| {
                e.alternative_types
                    .iter()
                    .filter_map(|v| {
                        #[derive(Deserialize)]
                        struct RawAlt {
                            field_type: String,
                            confidence: f64,
                        }
                        let raw: RawAlt = serde_json::from_value(v.clone()).ok()?;
                        Some(RankedFieldType {
                            field_type: FieldType::parse_lenient(&raw.field_type),
                            confidence: clamp01(raw.confidence),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        let mut sample_values: Vec<String> =
            hint.map(|h| h.sample_values.clone()).unwrap_or_default();
        if let Some(v) = &value {
            let text = v.as_text();
            if !text.is_empty() && !sample_values.contains(&text) {
                sample_values.insert(0, text);
            }
        }

        signals.push(FieldSignals {
            legibility: clamp01(d.legibility.unwrap_or(0.5)),
            model_confidence: clamp01(d.confidence.unwrap_or(0.5)),
            type_agreement: clamp01(enh.and_then(|e| e.type_agreement).unwrap_or(0.5)),
        });

        fields.push(ExtractedField {
            detected_name: d.name,
            display_name,
            field_type: declared_type,
            value,
            source_text: d.source_text,
            description: enh.and_then(|e| e.description.clone()),
            confidence: ConfidenceDimensions::default(),
            overall_confidence_score: 0.0,
            requires_review: true,
            alternative_names,
            alternative_types,
            field_group: d.group,
            extraction_hints: hint.map(|h| h.hints.clone()).unwrap_or_default(),
            sample_values,
        });
    }

    (fields, signals)
}

fn titlecase(name: &str) -> String {
    name.split(|c: char| c == '_' || c == '-' || c.is_whitespace())
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn clamp01(v: f64) -> f64 {
    v.clamp(0.0, 1.0)
}
