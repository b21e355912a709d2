//! Schema data model: versioned, provenance-tagged extraction schemas.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::pipeline::analyzer::types::FieldType;
use crate::pipeline::rules::ValidationRule;

/// Semantic version of a schema. Monotonically increasing per schema id;
/// versions are appended, never rewritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SemanticVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl SemanticVersion {
    pub const INITIAL: Self = Self {
        major: 1,
        minor: 0,
        patch: 0,
    };

    pub fn bump_major(self) -> Self {
        Self {
            major: self.major + 1,
            minor: 0,
            patch: 0,
        }
    }

    pub fn bump_minor(self) -> Self {
        Self {
            minor: self.minor + 1,
            patch: 0,
            ..self
        }
    }
}

impl fmt::Display for SemanticVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationMethod {
    AiGenerated,
    AiAssisted,
    ManualRefined,
}

/// Human review lifecycle of a schema version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserReviewStatus {
    Pending,
    InProgress,
    Reviewed,
    Approved,
    Rejected,
}

/// One field definition inside a generated schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaField {
    /// Normalized identifier (lowercase, underscores, collision-suffixed).
    pub id: String,
    pub display_name: String,
    pub field_type: FieldType,
    pub description: Option<String>,
    pub required: bool,
    pub confidence: f64,
    /// Kept even in the reject band; human triage decides, not the pipeline.
    pub requires_review: bool,
    pub validation_rules: Vec<ValidationRule>,
    pub extraction_hints: Vec<String>,
    pub field_group: Option<String>,
}

/// The synthesized schema artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedSchema {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub version: SemanticVersion,
    /// Ordered: field order mirrors the analyzer's discovery order.
    pub fields: Vec<SchemaField>,
    pub generation_method: GenerationMethod,
    /// Aggregate confidence over all fields.
    pub generation_confidence: f64,
    pub source_document_id: Uuid,
    pub analysis_result_id: Uuid,
    pub user_review_status: UserReviewStatus,
    /// Crate version of the synthesizer that produced this version.
    pub generator_version: String,
    pub created_at: DateTime<Utc>,
}

impl GeneratedSchema {
    pub fn high_confidence_field_count(&self) -> usize {
        self.fields
            .iter()
            .filter(|f| f.confidence >= crate::pipeline::confidence::ACCEPT_THRESHOLD)
            .count()
    }

    /// Structural equality, ignoring timestamps and generator provenance.
    /// Two synthesis runs over the same analysis must be equal under this
    /// comparison.
    pub fn same_content(&self, other: &Self) -> bool {
        self.id == other.id
            && self.name == other.name
            && self.version == other.version
            && self.fields == other.fields
            && self.generation_method == other.generation_method
            && (self.generation_confidence - other.generation_confidence).abs() < f64::EPSILON
            && self.analysis_result_id == other.analysis_result_id
    }
}
