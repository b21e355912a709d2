//! ReviewGate — schema-level application of the banding policy.
//!
//! Pure classification: a schema is production-ready only when every field
//! sits in the accept band and the aggregate confidence clears the same
//! threshold. Everything else goes to human review, worst fields first.

use serde::Serialize;

use crate::pipeline::confidence::{ReviewBand, ACCEPT_THRESHOLD};
use crate::pipeline::schema::{GeneratedSchema, UserReviewStatus};

/// One field flagged for reviewer attention.
#[derive(Debug, Clone, Serialize)]
pub struct AttentionItem {
    pub field_id: String,
    pub display_name: String,
    pub confidence: f64,
    pub band: ReviewBand,
}

/// Outcome of gating one schema.
#[derive(Debug, Clone, Serialize)]
pub struct GateDecision {
    pub production_ready: bool,
    pub review_status: UserReviewStatus,
    /// Fields needing attention, ascending by confidence (worst first).
    pub attention: Vec<AttentionItem>,
}

pub struct ReviewGate;

impl ReviewGate {
    /// Classify a schema against the fixed banding policy.
    pub fn evaluate(schema: &GeneratedSchema) -> GateDecision {
        let all_fields_accepted = schema
            .fields
            .iter()
            .all(|f| f.confidence >= ACCEPT_THRESHOLD);
        let production_ready =
            all_fields_accepted && schema.generation_confidence >= ACCEPT_THRESHOLD;

        let mut attention: Vec<AttentionItem> = schema
            .fields
            .iter()
            .filter(|f| f.confidence < ACCEPT_THRESHOLD)
            .map(|f| AttentionItem {
                field_id: f.id.clone(),
                display_name: f.display_name.clone(),
                confidence: f.confidence,
                band: ReviewBand::for_score(f.confidence),
            })
            .collect();
        attention.sort_by(|a, b| {
            a.confidence
                .partial_cmp(&b.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        GateDecision {
            production_ready,
            review_status: if production_ready {
                UserReviewStatus::Reviewed
            } else {
                UserReviewStatus::Pending
            },
            attention,
        }
    }
}
