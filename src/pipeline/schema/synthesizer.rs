//! SchemaSynthesizer — analyzer output to versioned schema.
//!
//! Synthesis is deterministic: the schema id derives from the analysis id,
//! field identifiers from detected names, and re-running over an unchanged
//! analysis yields a schema equal in everything but the timestamp. Reject-band
//! fields are kept and flagged rather than dropped; AI findings are never
//! silently discarded.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::pipeline::analyzer::types::AnalysisResult;
use crate::pipeline::confidence::{ACCEPT_THRESHOLD, REVIEW_THRESHOLD};
use crate::pipeline::rules;

use super::repository::SchemaRepository;
use super::types::{
    GeneratedSchema, GenerationMethod, SchemaField, SemanticVersion, UserReviewStatus,
};
use super::SchemaError;

pub struct SchemaSynthesizer {
    repository: Arc<dyn SchemaRepository>,
}

impl SchemaSynthesizer {
    pub fn new(repository: Arc<dyn SchemaRepository>) -> Self {
        Self { repository }
    }

    /// Synthesize a brand-new schema (v1.0.0) from an analysis result.
    /// Deterministic apart from `created_at`.
    pub fn synthesize(&self, analysis: &AnalysisResult) -> GeneratedSchema {
        let fields = build_fields(analysis);
        let generation_confidence = aggregate_confidence(&fields);

        let schema = GeneratedSchema {
            // Derived from the analysis id so re-synthesis is cache-safe.
            id: Uuid::new_v5(&Uuid::NAMESPACE_OID, analysis.id.as_bytes()),
            name: analysis.detected_document_type.clone(),
            description: format!(
                "AI-generated extraction schema for {} documents",
                analysis.detected_document_type
            ),
            version: SemanticVersion::INITIAL,
            fields,
            generation_method: GenerationMethod::AiGenerated,
            generation_confidence,
            source_document_id: analysis.document_id,
            analysis_result_id: analysis.id,
            user_review_status: UserReviewStatus::Pending,
            generator_version: crate::config::APP_VERSION.to_string(),
            created_at: Utc::now(),
        };

        info!(
            schema_id = %schema.id,
            name = %schema.name,
            version = %schema.version,
            fields = schema.fields.len(),
            confidence = schema.generation_confidence,
            "Schema synthesized"
        );
        schema
    }

    /// Re-synthesize against an existing schema after edits or a fresh
    /// analysis. Classifies the change set itself: any breaking change
    /// (field removal, type change, newly required field) dominates and
    /// bumps MAJOR; otherwise additive changes bump MINOR; no change keeps
    /// the version (idempotent).
    pub fn resynthesize(
        &self,
        previous: &GeneratedSchema,
        analysis: &AnalysisResult,
    ) -> GeneratedSchema {
        let fields = build_fields(analysis);
        let generation_confidence = aggregate_confidence(&fields);
        let version = match classify_change(&previous.fields, &fields) {
            ChangeKind::Breaking => previous.version.bump_major(),
            ChangeKind::Additive => previous.version.bump_minor(),
            ChangeKind::None => previous.version,
        };

        GeneratedSchema {
            id: previous.id,
            name: previous.name.clone(),
            description: previous.description.clone(),
            version,
            fields,
            generation_method: GenerationMethod::AiAssisted,
            generation_confidence,
            source_document_id: analysis.document_id,
            analysis_result_id: analysis.id,
            user_review_status: UserReviewStatus::Pending,
            generator_version: crate::config::APP_VERSION.to_string(),
            created_at: Utc::now(),
        }
    }

    /// Publish a schema version atomically. Re-publishing an identical
    /// version is a no-op (cached re-runs); a differing schema at the same
    /// version is a conflict, propagated for manual resolution.
    pub fn store(&self, schema: &GeneratedSchema) -> Result<(), SchemaError> {
        if let Some(existing) = self.repository.load(schema.id, Some(schema.version)) {
            if existing.same_content(schema) {
                return Ok(());
            }
            return Err(SchemaError::VersionConflict {
                schema_id: schema.id,
                version: schema.version,
            });
        }
        self.repository.save(schema)
    }
}

fn build_fields(analysis: &AnalysisResult) -> Vec<SchemaField> {
    let mut taken: HashSet<String> = HashSet::new();
    analysis
        .fields
        .iter()
        .map(|field| {
            let id = unique_identifier(&field.detected_name, &mut taken);
            SchemaField {
                id,
                display_name: field.display_name.clone(),
                field_type: field.field_type,
                description: field.description.clone(),
                required: field.overall_confidence_score >= ACCEPT_THRESHOLD,
                confidence: field.overall_confidence_score,
                requires_review: field.overall_confidence_score < REVIEW_THRESHOLD,
                validation_rules: rules::infer_rules(field),
                extraction_hints: field.extraction_hints.clone(),
                field_group: field.field_group.clone(),
            }
        })
        .collect()
}

fn aggregate_confidence(fields: &[SchemaField]) -> f64 {
    if fields.is_empty() {
        return 0.0;
    }
    fields.iter().map(|f| f.confidence).sum::<f64>() / fields.len() as f64
}

/// Normalize a detected name to the identifier convention: lowercase,
/// non-alphanumerics collapsed to underscores, numeric suffix on collision.
fn unique_identifier(detected_name: &str, taken: &mut HashSet<String>) -> String {
    let base = normalize_identifier(detected_name);
    if taken.insert(base.clone()) {
        return base;
    }
    let mut n = 2;
    loop {
        let candidate = format!("{base}_{n}");
        if taken.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

fn normalize_identifier(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_underscore = true;
    for c in name.trim().to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c);
            last_underscore = false;
        } else if !last_underscore {
            out.push('_');
            last_underscore = true;
        }
    }
    let trimmed = out.trim_matches('_').to_string();
    if trimmed.is_empty() {
        "field".to_string()
    } else {
        trimmed
    }
}

#[derive(Debug, PartialEq)]
enum ChangeKind {
    None,
    Additive,
    Breaking,
}

/// Compare field sets by identifier. Removal, type change, and newly
/// required fields are breaking; new fields and rule adjustments additive.
fn classify_change(old: &[SchemaField], new: &[SchemaField]) -> ChangeKind {
    let mut kind = ChangeKind::None;

    for old_field in old {
        match new.iter().find(|f| f.id == old_field.id) {
            None => return ChangeKind::Breaking,
            Some(new_field) => {
                if new_field.field_type != old_field.field_type
                    || (new_field.required && !old_field.required)
                {
                    return ChangeKind::Breaking;
                }
                if new_field != old_field {
                    kind = ChangeKind::Additive;
                }
            }
        }
    }
    if new.iter().any(|f| old.iter().all(|o| o.id != f.id)) {
        kind = ChangeKind::Additive;
    }
    kind
}
