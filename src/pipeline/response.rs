//! The full analysis response envelope.
//!
//! Field names and nesting are a compatibility surface for consuming UIs:
//! the `processing_stages` map is always present, even on failure, so a
//! caller can see exactly which stage failed and why. `errors` carries
//! human-readable summaries, never raw debug output.

use std::collections::BTreeMap;

use serde::Serialize;
use uuid::Uuid;

use crate::pipeline::analyzer::types::{
    AnalysisResult, DocumentFileType, ProcessingStatus, SampleDocument,
};
use crate::pipeline::confidence::ConfidenceLevel;
use crate::pipeline::review::GateDecision;
use crate::pipeline::schema::{GeneratedSchema, UserReviewStatus};
use crate::pipeline::verifier::{RiskLevel, TamperingIndicators, VerificationReport};

/// Outcome of one named pipeline stage.
#[derive(Debug, Clone, Serialize)]
pub struct StageOutcome {
    pub success: bool,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StageOutcome {
    pub fn ok(duration_ms: u64) -> Self {
        Self {
            success: true,
            duration_ms,
            error: None,
        }
    }

    pub fn failed(duration_ms: u64, error: impl Into<String>) -> Self {
        Self {
            success: false,
            duration_ms,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentSummary {
    pub id: Uuid,
    pub filename: String,
    pub file_type: DocumentFileType,
    pub file_size: usize,
    pub processing_status: ProcessingStatus,
}

impl From<&SampleDocument> for DocumentSummary {
    fn from(doc: &SampleDocument) -> Self {
        Self {
            id: doc.id,
            filename: doc.filename.clone(),
            file_type: doc.file_type,
            file_size: doc.file_size,
            processing_status: doc.processing_status,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisSummary {
    pub id: Uuid,
    pub detected_document_type: String,
    pub document_type_confidence: f64,
    pub total_fields_detected: usize,
    pub high_confidence_fields: usize,
    pub overall_quality_score: f64,
    pub model_used: String,
}

impl From<&AnalysisResult> for AnalysisSummary {
    fn from(analysis: &AnalysisResult) -> Self {
        Self {
            id: analysis.id,
            detected_document_type: analysis.detected_document_type.clone(),
            document_type_confidence: analysis.document_type_confidence,
            total_fields_detected: analysis.fields.len(),
            high_confidence_fields: analysis.high_confidence_field_count(),
            overall_quality_score: analysis.quality_score,
            model_used: analysis.model_used.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SchemaSummary {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub version: String,
    pub total_fields: usize,
    pub high_confidence_fields: usize,
    pub generation_confidence: f64,
    pub validation_status: UserReviewStatus,
    pub production_ready: bool,
}

impl SchemaSummary {
    pub fn from_schema(schema: &GeneratedSchema, gate: &GateDecision) -> Self {
        Self {
            id: schema.id,
            name: schema.name.clone(),
            description: schema.description.clone(),
            version: schema.version.to_string(),
            total_fields: schema.fields.len(),
            high_confidence_fields: schema.high_confidence_field_count(),
            generation_confidence: schema.generation_confidence,
            validation_status: gate.review_status,
            production_ready: gate.production_ready,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ConfidenceSummary {
    pub overall_confidence: f64,
    pub confidence_level: ConfidenceLevel,
}

impl ConfidenceSummary {
    pub fn for_score(score: f64) -> Self {
        Self {
            overall_confidence: score,
            confidence_level: ConfidenceLevel::for_score(score),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct VerificationSummary {
    pub document_type_confidence: f64,
    pub authenticity_score: f64,
    pub tampering_indicators: TamperingIndicators,
    pub risk_level: RiskLevel,
    pub verification_notes: Vec<String>,
}

impl From<&VerificationReport> for VerificationSummary {
    fn from(report: &VerificationReport) -> Self {
        Self {
            document_type_confidence: report.document_type_confidence,
            authenticity_score: report.authenticity_score,
            tampering_indicators: report.tampering_indicators,
            risk_level: report.risk_level,
            verification_notes: report.notes.clone(),
        }
    }
}

/// The full pipeline response.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisResponse {
    pub success: bool,
    pub processing_stages: BTreeMap<String, StageOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document: Option<DocumentSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<AnalysisSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<SchemaSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<ConfidenceSummary>,
    /// `None` serializes as `null`: verification was inconclusive, see notes
    /// in `errors`/`recommendations`.
    pub verification: Option<VerificationSummary>,
    pub recommendations: Vec<String>,
    pub errors: Vec<String>,
    /// Seconds, wall clock for the whole request.
    pub total_processing_time: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_error_is_omitted_when_absent() {
        let ok = serde_json::to_value(StageOutcome::ok(12)).unwrap();
        assert!(ok.get("error").is_none());
        let failed = serde_json::to_value(StageOutcome::failed(5, "boom")).unwrap();
        assert_eq!(failed["error"], "boom");
    }

    #[test]
    fn null_verification_serializes_explicitly() {
        let response = AnalysisResponse {
            success: true,
            processing_stages: BTreeMap::new(),
            document: None,
            analysis: None,
            schema: None,
            confidence: None,
            verification: None,
            recommendations: vec![],
            errors: vec![],
            total_processing_time: 0.5,
        };
        let json = serde_json::to_value(&response).unwrap();
        assert!(json["verification"].is_null());
        // Absent optional sections are omitted entirely.
        assert!(json.get("schema").is_none());
    }

    #[test]
    fn confidence_summary_levels() {
        let high = ConfidenceSummary::for_score(0.9);
        assert_eq!(high.confidence_level, ConfidenceLevel::High);
        let json = serde_json::to_value(&high).unwrap();
        assert_eq!(json["confidence_level"], "high");
    }
}
