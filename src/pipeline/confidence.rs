//! ConfidenceScorer — five-dimension field scoring and the banding policy.
//!
//! The accept/review/reject thresholds live here and only here; the review
//! gate and schema synthesizer import them rather than carrying their own
//! copies. They are fixed, not configuration: the review UI depends on the
//! banding being predictable across deployments.

use serde::Serialize;

use crate::config::ScorerWeights;
use crate::pipeline::analyzer::types::{ConfidenceDimensions, ExtractedField, FieldValue};

/// Fields at or above this score are accepted without review.
pub const ACCEPT_THRESHOLD: f64 = 0.8;
/// Fields below this score are rejected (kept, but flagged for review).
pub const REVIEW_THRESHOLD: f64 = 0.6;

/// Review band derived from the fixed thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewBand {
    Accept,
    Review,
    Reject,
}

impl ReviewBand {
    pub fn for_score(score: f64) -> Self {
        if score >= ACCEPT_THRESHOLD {
            Self::Accept
        } else if score >= REVIEW_THRESHOLD {
            Self::Review
        } else {
            Self::Reject
        }
    }
}

/// Coarse confidence level for the response envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    Low,
    Medium,
    High,
}

impl ConfidenceLevel {
    pub fn for_score(score: f64) -> Self {
        if score >= ACCEPT_THRESHOLD {
            Self::High
        } else if score >= REVIEW_THRESHOLD {
            Self::Medium
        } else {
            Self::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// Raw signals the analyzer stages report for one field, before scoring.
#[derive(Debug, Clone, Copy)]
pub struct FieldSignals {
    /// Stage-2 legibility of the source image region.
    pub legibility: f64,
    /// Model's own extraction confidence from stage 2.
    pub model_confidence: f64,
    /// Stage-3 agreement that the originally inferred type was right.
    pub type_agreement: f64,
}

/// Field names commonly seen across business documents. Matching against
/// this vocabulary raises label confidence.
const KNOWN_FIELD_NAMES: &[&str] = &[
    "invoice_number",
    "receipt_number",
    "account_number",
    "reference",
    "date",
    "due_date",
    "issue_date",
    "total",
    "subtotal",
    "tax",
    "amount",
    "quantity",
    "price",
    "description",
    "name",
    "first_name",
    "last_name",
    "company",
    "customer",
    "vendor",
    "address",
    "city",
    "state",
    "zip",
    "postal_code",
    "country",
    "phone",
    "email",
    "signature",
    "id_number",
];

/// How many fields a document of a given type typically yields. Used for
/// the field-yield component of the document quality score.
fn expected_field_count(document_type: &str) -> usize {
    match document_type {
        "invoice" => 8,
        "receipt" => 6,
        "id_card" => 8,
        "form" => 10,
        "letter" => 4,
        _ => 5,
    }
}

/// Pure scorer over analyzer output. No side effects, no hidden state.
pub struct ConfidenceScorer {
    weights: ScorerWeights,
}

impl ConfidenceScorer {
    pub fn new(weights: ScorerWeights) -> Self {
        Self { weights }
    }

    /// Score every field in place: fill the five dimensions, the overall
    /// score, and the review flag. `signals` is index-aligned with `fields`.
    pub fn score_fields(&self, fields: &mut [ExtractedField], signals: &[FieldSignals]) {
        // Group membership snapshot, taken before mutation so context
        // scoring sees all siblings.
        let group_sizes: Vec<usize> = fields
            .iter()
            .map(|f| match &f.field_group {
                Some(g) => fields
                    .iter()
                    .filter(|other| other.field_group.as_deref() == Some(g.as_str()))
                    .count(),
                None => 1,
            })
            .collect();
        let sibling_count = fields.len();

        for (i, field) in fields.iter_mut().enumerate() {
            let default = FieldSignals {
                legibility: 0.5,
                model_confidence: 0.5,
                type_agreement: 0.5,
            };
            let sig = signals.get(i).copied().unwrap_or(default);
            let dims = self.dimensions(field, sig, group_sizes[i], sibling_count);
            let overall = self.overall(&dims);
            field.confidence = dims;
            field.overall_confidence_score = overall;
            field.requires_review = overall < REVIEW_THRESHOLD;
        }
    }

    /// Weighted mean of the five dimensions. At the default equal weights
    /// this is exactly the arithmetic mean.
    pub fn overall(&self, dims: &ConfidenceDimensions) -> f64 {
        let w = self.weights;
        let total = w.total() as f64;
        if total <= 0.0 {
            return 0.0;
        }
        let sum = dims.visual_clarity * w.visual_clarity as f64
            + dims.label_confidence * w.label as f64
            + dims.value_confidence * w.value as f64
            + dims.type_confidence * w.field_type as f64
            + dims.context_confidence * w.context as f64;
        (sum / total).clamp(0.0, 1.0)
    }

    /// Document quality: aggregate field confidence blended with field
    /// yield against the document-type prior.
    pub fn quality_score(&self, document_type: &str, fields: &[ExtractedField]) -> f64 {
        if fields.is_empty() {
            return 0.0;
        }
        let avg = fields
            .iter()
            .map(|f| f.overall_confidence_score)
            .sum::<f64>()
            / fields.len() as f64;
        let expected = expected_field_count(document_type) as f64;
        let yield_ratio = (fields.len() as f64 / expected).min(1.0);
        (0.6 * avg + 0.4 * yield_ratio).clamp(0.0, 1.0)
    }

    fn dimensions(
        &self,
        field: &ExtractedField,
        sig: FieldSignals,
        group_size: usize,
        sibling_count: usize,
    ) -> ConfidenceDimensions {
        ConfidenceDimensions {
            visual_clarity: sig.legibility.clamp(0.0, 1.0),
            label_confidence: label_confidence(&field.detected_name),
            value_confidence: value_confidence(field, sig.model_confidence),
            type_confidence: type_confidence(field, sig.type_agreement),
            context_confidence: context_confidence(sig.model_confidence, group_size, sibling_count),
        }
    }
}

/// Label confidence from the known-name vocabulary and basic shape checks.
fn label_confidence(detected_name: &str) -> f64 {
    let normalized: String = detected_name
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect();
    if KNOWN_FIELD_NAMES.contains(&normalized.as_str()) {
        return 0.9;
    }
    if KNOWN_FIELD_NAMES
        .iter()
        .any(|known| normalized.contains(known))
    {
        return 0.75;
    }
    let len = normalized.trim_matches('_').len();
    if (2..=40).contains(&len) {
        0.6
    } else {
        0.4
    }
}

/// Value plausibility: did the declared type actually parse, and does the
/// source text support the value? Blended with the model's own confidence.
fn value_confidence(field: &ExtractedField, model_confidence: f64) -> f64 {
    let heuristic = match &field.value {
        None => 0.2,
        Some(FieldValue::Number(_))
        | Some(FieldValue::Date(_))
        | Some(FieldValue::Boolean(_)) => 0.85,
        Some(FieldValue::String(s)) => {
            if !s.is_empty() && field.source_text.contains(s.as_str()) {
                0.8
            } else if !s.is_empty() {
                0.65
            } else {
                0.2
            }
        }
        Some(FieldValue::Array(items)) if !items.is_empty() => 0.7,
        Some(_) => 0.5,
    };
    ((heuristic + model_confidence.clamp(0.0, 1.0)) / 2.0).clamp(0.0, 1.0)
}

/// Type agreement from stage 3, with a bonus when the normalized value's
/// own tag confirms the declared type.
fn type_confidence(field: &ExtractedField, type_agreement: f64) -> f64 {
    let mut score = type_agreement.clamp(0.0, 1.0);
    if let Some(value) = &field.value {
        if value.field_type() == field.field_type {
            score += 0.1;
        }
    }
    score.clamp(0.0, 1.0)
}

/// Consistency with sibling fields: shared groups and a coherent overall
/// field set raise context confidence.
fn context_confidence(model_confidence: f64, group_size: usize, sibling_count: usize) -> f64 {
    let mut score = 0.4 + 0.2 * model_confidence.clamp(0.0, 1.0);
    if group_size >= 2 {
        score += 0.2;
    }
    if sibling_count >= 3 {
        score += 0.1;
    }
    score.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::analyzer::types::FieldType;

    fn field(name: &str, value: Option<FieldValue>) -> ExtractedField {
        ExtractedField {
            detected_name: name.to_string(),
            display_name: name.to_string(),
            field_type: value
                .as_ref()
                .map(|v| v.field_type())
                .unwrap_or(FieldType::String),
            source_text: value
                .as_ref()
                .map(|v| format!("{name}: {}", v.as_text()))
                .unwrap_or_default(),
            value,
            description: None,
            confidence: ConfidenceDimensions::default(),
            overall_confidence_score: 0.0,
            requires_review: true,
            alternative_names: vec![],
            alternative_types: vec![],
            field_group: None,
            extraction_hints: vec![],
            sample_values: vec![],
        }
    }

    fn dims(values: [f64; 5]) -> ConfidenceDimensions {
        ConfidenceDimensions {
            visual_clarity: values[0],
            label_confidence: values[1],
            value_confidence: values[2],
            type_confidence: values[3],
            context_confidence: values[4],
        }
    }

    #[test]
    fn banding_thresholds() {
        assert_eq!(ReviewBand::for_score(0.85), ReviewBand::Accept);
        assert_eq!(ReviewBand::for_score(0.8), ReviewBand::Accept);
        assert_eq!(ReviewBand::for_score(0.7), ReviewBand::Review);
        assert_eq!(ReviewBand::for_score(0.6), ReviewBand::Review);
        assert_eq!(ReviewBand::for_score(0.59), ReviewBand::Reject);
    }

    #[test]
    fn uniform_high_dimensions_land_in_accept() {
        let scorer = ConfidenceScorer::new(ScorerWeights::default());
        let overall = scorer.overall(&dims([0.9, 0.9, 0.9, 0.9, 0.9]));
        assert!((overall - 0.9).abs() < 1e-9);
        assert_eq!(ReviewBand::for_score(overall), ReviewBand::Accept);
    }

    #[test]
    fn one_weak_dimension_drops_into_review() {
        let scorer = ConfidenceScorer::new(ScorerWeights::default());
        let overall = scorer.overall(&dims([0.9, 0.9, 0.2, 0.9, 0.9]));
        assert!((overall - 0.76).abs() < 0.03);
        assert_eq!(ReviewBand::for_score(overall), ReviewBand::Review);
    }

    #[test]
    fn overall_equals_mean_within_tolerance() {
        let scorer = ConfidenceScorer::new(ScorerWeights::default());
        let cases = [
            [0.1, 0.2, 0.3, 0.4, 0.5],
            [1.0, 1.0, 1.0, 1.0, 1.0],
            [0.0, 0.0, 0.0, 0.0, 0.0],
            [0.33, 0.91, 0.5, 0.77, 0.62],
        ];
        for case in cases {
            let d = dims(case);
            let mean = case.iter().sum::<f64>() / 5.0;
            let overall = scorer.overall(&d);
            assert!(
                (overall - mean).abs() <= 0.05,
                "overall {overall} vs mean {mean}"
            );
        }
    }

    #[test]
    fn scored_fields_stay_in_unit_range_and_flag_review() {
        let scorer = ConfidenceScorer::new(ScorerWeights::default());
        let mut fields = vec![
            field("invoice_number", Some(FieldValue::String("INV-0001".into()))),
            field("smudge", None),
        ];
        let signals = vec![
            FieldSignals {
                legibility: 0.95,
                model_confidence: 0.9,
                type_agreement: 0.95,
            },
            FieldSignals {
                legibility: 0.1,
                model_confidence: 0.2,
                type_agreement: 0.3,
            },
        ];
        scorer.score_fields(&mut fields, &signals);

        for f in &fields {
            assert!((0.0..=1.0).contains(&f.overall_confidence_score));
            for d in f.confidence.as_array() {
                assert!((0.0..=1.0).contains(&d));
            }
            assert_eq!(
                f.requires_review,
                f.overall_confidence_score < REVIEW_THRESHOLD
            );
        }
        assert!(fields[0].overall_confidence_score > fields[1].overall_confidence_score);
        assert!(fields[1].requires_review);
    }

    #[test]
    fn shared_group_raises_context_confidence() {
        let lone = context_confidence(0.8, 1, 2);
        let grouped = context_confidence(0.8, 2, 2);
        assert!(grouped > lone);
    }

    #[test]
    fn vocabulary_match_beats_unknown_label() {
        assert!(label_confidence("invoice_number") > label_confidence("zzqx"));
        assert!(label_confidence("Total Amount") >= 0.75);
    }

    #[test]
    fn quality_score_rewards_yield() {
        let scorer = ConfidenceScorer::new(ScorerWeights::default());
        let mut few = vec![field("total", Some(FieldValue::Number(10.0)))];
        let mut many: Vec<ExtractedField> = (0..8)
            .map(|i| field(&format!("field_{i}"), Some(FieldValue::Number(i as f64))))
            .collect();
        let signals = |n: usize| {
            vec![
                FieldSignals {
                    legibility: 0.8,
                    model_confidence: 0.8,
                    type_agreement: 0.8,
                };
                n
            ]
        };
        scorer.score_fields(&mut few, &signals(1));
        scorer.score_fields(&mut many, &signals(8));
        let sparse = scorer.quality_score("invoice", &few);
        let dense = scorer.quality_score("invoice", &many);
        assert!(dense > sparse);
    }

    #[test]
    fn empty_document_scores_zero_quality() {
        let scorer = ConfidenceScorer::new(ScorerWeights::default());
        assert_eq!(scorer.quality_score("invoice", &[]), 0.0);
    }

    #[test]
    fn confidence_level_bands() {
        assert_eq!(ConfidenceLevel::for_score(0.9), ConfidenceLevel::High);
        assert_eq!(ConfidenceLevel::for_score(0.7), ConfidenceLevel::Medium);
        assert_eq!(ConfidenceLevel::for_score(0.3), ConfidenceLevel::Low);
    }
}
