//! DocumentVerifier — authenticity and tampering analysis.
//!
//! Independent of the analyzer: both consume the same immutable page images,
//! and a failure on either side never fails the other. Risk banding is a
//! pure function of the authenticity score and indicator set.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::PipelineConfig;
use crate::pipeline::analyzer::json_extract::{check_contains_json, extract_json_object};
use crate::pipeline::model::{InferenceRequest, ModelError, ModelRouter};
use crate::pipeline::preprocess::PageImage;

/// Named boolean tampering signals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TamperingIndicators {
    #[serde(default)]
    pub photo_manipulation: bool,
    #[serde(default)]
    pub text_alterations: bool,
    #[serde(default)]
    pub structural_anomalies: bool,
    #[serde(default)]
    pub digital_artifacts: bool,
    #[serde(default)]
    pub font_inconsistencies: bool,
}

impl TamperingIndicators {
    /// Indicators that alone force high risk.
    pub fn any_critical(&self) -> bool {
        self.photo_manipulation || self.text_alterations
    }

    pub fn any(&self) -> bool {
        self.any_critical()
            || self.structural_anomalies
            || self.digital_artifacts
            || self.font_inconsistencies
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// Fixed risk banding. High on a critical indicator or score below 50,
/// medium on any other indicator or score below 75, low otherwise.
pub fn risk_level(authenticity_score: f64, indicators: &TamperingIndicators) -> RiskLevel {
    if indicators.any_critical() || authenticity_score < 50.0 {
        RiskLevel::High
    } else if indicators.any() || authenticity_score < 75.0 {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

/// One verification pass over a document.
#[derive(Debug, Clone, Serialize)]
pub struct VerificationReport {
    pub document_type_confidence: f64,
    /// 0-100; higher means more likely authentic.
    pub authenticity_score: f64,
    pub tampering_indicators: TamperingIndicators,
    pub risk_level: RiskLevel,
    pub notes: Vec<String>,
}

const VERIFIER_SYSTEM: &str = "You are a document forensics engine. You inspect scanned \
document images for signs of manipulation and answer with a single JSON object, no \
commentary. Be conservative: only flag an indicator when you see concrete evidence.";

fn verification_prompt() -> &'static str {
    "Inspect this document for authenticity. Check: font consistency across the page, \
     structural layout anomalies (misaligned tables, irregular margins), digital editing \
     artifacts (compression seams, cloned regions), photo substitution, text alterations, \
     and whether any check-digit fields (ID numbers, IBANs) are internally consistent.\n\n\
     Respond with JSON:\n\
     {\n\
       \"document_type_confidence\": 0.0,\n\
       \"authenticity_score\": 0,\n\
       \"indicators\": {\n\
         \"photo_manipulation\": false,\n\
         \"text_alterations\": false,\n\
         \"structural_anomalies\": false,\n\
         \"digital_artifacts\": false,\n\
         \"font_inconsistencies\": false\n\
       },\n\
       \"notes\": [\"...\"]\n\
     }\n\
     \"authenticity_score\" is 0-100, higher meaning more likely authentic."
}

#[derive(Deserialize)]
struct VerificationResponse {
    document_type_confidence: Option<f64>,
    authenticity_score: Option<f64>,
    #[serde(default)]
    indicators: TamperingIndicators,
    #[serde(default)]
    notes: Vec<String>,
}

/// Runs the authenticity pipeline through its own router prompts.
pub struct DocumentVerifier {
    router: Arc<ModelRouter>,
    config: PipelineConfig,
}

impl DocumentVerifier {
    pub fn new(router: Arc<ModelRouter>, config: PipelineConfig) -> Self {
        Self { router, config }
    }

    pub fn verify(
        &self,
        pages: &[PageImage],
        model_hint: Option<&str>,
    ) -> Result<VerificationReport, ModelError> {
        let request =
            InferenceRequest::for_pages(verification_prompt(), Some(VERIFIER_SYSTEM), pages)
                .with_timeout_secs(self.config.attempt_timeout_secs(pages.len()));
        let routed = self
            .router
            .infer_checked(&request, model_hint, check_contains_json)?;

        let value = extract_json_object(&routed.text)?;
        let parsed: VerificationResponse = serde_json::from_value(value)
            .map_err(|e| ModelError::MalformedOutput(format!("verification shape: {e}")))?;

        let authenticity_score = parsed.authenticity_score.unwrap_or(0.0).clamp(0.0, 100.0);
        let indicators = parsed.indicators;
        let report = VerificationReport {
            document_type_confidence: parsed
                .document_type_confidence
                .unwrap_or(0.0)
                .clamp(0.0, 1.0),
            authenticity_score,
            tampering_indicators: indicators,
            risk_level: risk_level(authenticity_score, &indicators),
            notes: parsed.notes,
        };

        info!(
            backend = %routed.backend,
            authenticity = report.authenticity_score,
            risk = report.risk_level.as_str(),
            "Document verification complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::model::MockModelBackend;

    fn pages() -> Vec<PageImage> {
        vec![PageImage {
            page_number: 0,
            png_bytes: vec![1, 2, 3],
            width: 10,
            height: 10,
        }]
    }

    #[test]
    fn low_score_is_high_risk_even_with_clean_indicators() {
        assert_eq!(
            risk_level(40.0, &TamperingIndicators::default()),
            RiskLevel::High
        );
    }

    #[test]
    fn high_score_with_clean_indicators_is_low_risk() {
        assert_eq!(
            risk_level(90.0, &TamperingIndicators::default()),
            RiskLevel::Low
        );
    }

    #[test]
    fn critical_indicator_forces_high_risk_regardless_of_score() {
        let indicators = TamperingIndicators {
            text_alterations: true,
            ..Default::default()
        };
        assert_eq!(risk_level(95.0, &indicators), RiskLevel::High);
    }

    #[test]
    fn non_critical_indicator_is_medium_risk() {
        let indicators = TamperingIndicators {
            font_inconsistencies: true,
            ..Default::default()
        };
        assert_eq!(risk_level(90.0, &indicators), RiskLevel::Medium);
    }

    #[test]
    fn mid_band_score_is_medium_risk() {
        assert_eq!(
            risk_level(60.0, &TamperingIndicators::default()),
            RiskLevel::Medium
        );
    }

    #[test]
    fn verify_parses_model_report() {
        let response = r#"{"document_type_confidence": 0.85, "authenticity_score": 92,
            "indicators": {"photo_manipulation": false, "text_alterations": false,
                           "structural_anomalies": false, "digital_artifacts": false,
                           "font_inconsistencies": false},
            "notes": ["Fonts uniform", "No compression seams"]}"#;
        let router = Arc::new(ModelRouter::new(vec![Arc::new(MockModelBackend::new(
            "forensics", response,
        ))]));
        let report = DocumentVerifier::new(router, PipelineConfig::default())
            .verify(&pages(), None)
            .unwrap();
        assert_eq!(report.authenticity_score, 92.0);
        assert_eq!(report.risk_level, RiskLevel::Low);
        assert_eq!(report.notes.len(), 2);
    }

    #[test]
    fn verify_clamps_out_of_range_scores() {
        let response = r#"{"authenticity_score": 250, "indicators": {}}"#;
        let router = Arc::new(ModelRouter::new(vec![Arc::new(MockModelBackend::new(
            "forensics", response,
        ))]));
        let report = DocumentVerifier::new(router, PipelineConfig::default())
            .verify(&pages(), None)
            .unwrap();
        assert_eq!(report.authenticity_score, 100.0);
    }

    #[test]
    fn verify_surfaces_exhaustion_when_all_backends_fail() {
        let router = Arc::new(ModelRouter::new(vec![Arc::new(
            MockModelBackend::timing_out("forensics"),
        )]));
        let err = DocumentVerifier::new(router, PipelineConfig::default())
            .verify(&pages(), None)
            .unwrap_err();
        assert!(matches!(err, ModelError::Exhausted { .. }));
    }

    #[test]
    fn verify_bounds_each_attempt_with_the_page_scaled_timeout() {
        let response = r#"{"authenticity_score": 90, "indicators": {}}"#;
        let backend = Arc::new(MockModelBackend::new("forensics", response));
        let router = Arc::new(ModelRouter::new(vec![backend.clone()]));
        let config = PipelineConfig {
            timeout_base_secs: 10,
            timeout_per_page_secs: 5,
            ..PipelineConfig::default()
        };
        DocumentVerifier::new(router, config)
            .verify(&pages(), None)
            .unwrap();
        assert_eq!(backend.seen_timeouts(), vec![Some(15)]);
    }
}
