//! Analyzer data model: documents, analysis results, and extracted fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Sample documents ──────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentFileType {
    Pdf,
    Image,
}

/// Ingestion lifecycle of a sample document. Never moves backward, and a
/// `Completed` document is immutable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// One ingested document. `content_hash` is the dedup/caching key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleDocument {
    pub id: Uuid,
    pub filename: String,
    pub file_type: DocumentFileType,
    pub file_size: usize,
    pub page_count: usize,
    pub content_hash: String,
    pub processing_status: ProcessingStatus,
}

// ── Field typing ──────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Number,
    Date,
    Boolean,
    Array,
    Object,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Date => "date",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
        }
    }

    /// Lenient parse from model output ("str", "int", "float", "text"...).
    pub fn parse_lenient(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "number" | "numeric" | "int" | "integer" | "float" | "decimal" | "currency"
            | "amount" => Self::Number,
            "date" | "datetime" | "time" => Self::Date,
            "boolean" | "bool" | "checkbox" => Self::Boolean,
            "array" | "list" => Self::Array,
            "object" | "dict" | "map" => Self::Object,
            _ => Self::String,
        }
    }
}

/// A typed field value. The tag travels with the value so downstream
/// validation and serialization stay exhaustive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    String(String),
    Number(f64),
    /// ISO 8601 date (YYYY-MM-DD), normalized from the source locale.
    Date(String),
    Boolean(bool),
    Array(Vec<FieldValue>),
    Object(serde_json::Map<String, serde_json::Value>),
}

impl FieldValue {
    pub fn field_type(&self) -> FieldType {
        match self {
            Self::String(_) => FieldType::String,
            Self::Number(_) => FieldType::Number,
            Self::Date(_) => FieldType::Date,
            Self::Boolean(_) => FieldType::Boolean,
            Self::Array(_) => FieldType::Array,
            Self::Object(_) => FieldType::Object,
        }
    }

    /// Plain-text rendering, used for rule inference over sample values.
    pub fn as_text(&self) -> String {
        match self {
            Self::String(s) | Self::Date(s) => s.clone(),
            Self::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    format!("{n}")
                }
            }
            Self::Boolean(b) => b.to_string(),
            Self::Array(items) => items
                .iter()
                .map(FieldValue::as_text)
                .collect::<Vec<_>>()
                .join(", "),
            Self::Object(map) => serde_json::to_string(map).unwrap_or_default(),
        }
    }
}

// ── Confidence ────────────────────────────────────────────

/// The five independent confidence dimensions, each in [0,1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceDimensions {
    pub visual_clarity: f64,
    pub label_confidence: f64,
    pub value_confidence: f64,
    pub type_confidence: f64,
    pub context_confidence: f64,
}

impl ConfidenceDimensions {
    pub fn as_array(&self) -> [f64; 5] {
        [
            self.visual_clarity,
            self.label_confidence,
            self.value_confidence,
            self.type_confidence,
            self.context_confidence,
        ]
    }
}

impl Default for ConfidenceDimensions {
    fn default() -> Self {
        Self {
            visual_clarity: 0.5,
            label_confidence: 0.5,
            value_confidence: 0.5,
            type_confidence: 0.5,
            context_confidence: 0.5,
        }
    }
}

// ── Ranked alternatives ───────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedName {
    pub name: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedFieldType {
    pub field_type: FieldType,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedDocumentType {
    pub document_type: String,
    pub confidence: f64,
}

// ── Extracted fields ──────────────────────────────────────

/// One field discovered in a document, with its confidence breakdown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedField {
    /// Name as the model reported it, before identifier normalization.
    pub detected_name: String,
    pub display_name: String,
    pub field_type: FieldType,
    pub value: Option<FieldValue>,
    /// Verbatim text span the value came from.
    pub source_text: String,
    pub description: Option<String>,
    pub confidence: ConfidenceDimensions,
    /// Weighted mean of the five dimensions.
    pub overall_confidence_score: f64,
    /// True iff `overall_confidence_score` falls below the review floor.
    pub requires_review: bool,
    pub alternative_names: Vec<RankedName>,
    pub alternative_types: Vec<RankedFieldType>,
    /// Logical cluster ("address", "totals"), when the model reports one.
    pub field_group: Option<String>,
    /// Visual cues for re-extraction ("top-right corner, bold").
    pub extraction_hints: Vec<String>,
    /// Additional observed values for this field, feeding rule inference.
    pub sample_values: Vec<String>,
}

// ── Analysis results ──────────────────────────────────────

/// One analysis attempt over a document. A document may accumulate several
/// across retries; each is immutable once produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub id: Uuid,
    pub document_id: Uuid,
    pub detected_document_type: String,
    pub document_type_confidence: f64,
    pub alternative_types: Vec<RankedDocumentType>,
    pub fields: Vec<ExtractedField>,
    pub model_used: String,
    pub processing_time_ms: u64,
    /// Clarity + field-yield composite, in [0,1].
    pub quality_score: f64,
    pub created_at: DateTime<Utc>,
}

impl AnalysisResult {
    pub fn high_confidence_field_count(&self) -> usize {
        self.fields
            .iter()
            .filter(|f| f.overall_confidence_score >= crate::pipeline::confidence::ACCEPT_THRESHOLD)
            .count()
    }
}
