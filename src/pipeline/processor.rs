//! DocumentProcessor — request-scoped pipeline orchestration.
//!
//! One call drives the whole flow: preprocess → {analyze, verify} run
//! concurrently on the same immutable pages → score → synthesize → gate.
//! The two model pipelines are failure-independent: a verifier failure
//! yields `verification: null` with a note, an analyzer failure still
//! reports whatever verification found. The `processing_stages` map is
//! returned in every case, including fatal preprocessing errors.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::pipeline::analyzer::types::{
    AnalysisResult, DocumentFileType, ProcessingStatus, SampleDocument,
};
use crate::pipeline::analyzer::DocumentAnalyzer;
use crate::pipeline::confidence::{ConfidenceScorer, REVIEW_THRESHOLD};
use crate::pipeline::model::ModelRouter;
use crate::pipeline::preprocess::{
    sanitize_filename, DocumentPreprocessor, FileCategory, PageRenderer, PreprocessedDocument,
};
use crate::pipeline::response::{
    AnalysisResponse, AnalysisSummary, ConfidenceSummary, DocumentSummary, SchemaSummary,
    StageOutcome, VerificationSummary,
};
use crate::pipeline::review::ReviewGate;
use crate::pipeline::schema::{SchemaRepository, SchemaSynthesizer};
use crate::pipeline::verifier::{DocumentVerifier, RiskLevel};

const STAGE_PREPROCESSING: &str = "preprocessing";
const STAGE_ANALYSIS: &str = "analysis";
const STAGE_CONFIDENCE: &str = "confidence_scoring";
const STAGE_SCHEMA: &str = "schema_generation";
const STAGE_VERIFICATION: &str = "verification";

/// One analysis request.
#[derive(Debug, Clone)]
pub struct AnalyzeRequest {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub mime_type: String,
    /// Biases router candidate ordering toward a named model.
    pub model_hint: Option<String>,
    /// Offered to the classifier, never trusted blindly.
    pub document_type_hint: Option<String>,
}

struct CachedAnalysis {
    result: AnalysisResult,
    cached_at: Instant,
}

/// Stateless between requests apart from the analysis cache, which is keyed
/// by content hash so identical uploads short-circuit the model backends.
pub struct DocumentProcessor {
    preprocessor: DocumentPreprocessor,
    analyzer: Arc<DocumentAnalyzer>,
    verifier: Arc<DocumentVerifier>,
    synthesizer: SchemaSynthesizer,
    config: PipelineConfig,
    cache: Mutex<HashMap<String, CachedAnalysis>>,
}

impl DocumentProcessor {
    pub fn new(
        renderer: Arc<dyn PageRenderer>,
        router: ModelRouter,
        repository: Arc<dyn SchemaRepository>,
        config: PipelineConfig,
    ) -> Self {
        let scorer = ConfidenceScorer::new(config.scorer_weights);
        let router = Arc::new(router.with_max_attempts(config.max_attempts));
        Self {
            preprocessor: DocumentPreprocessor::new(renderer, config.clone()),
            analyzer: Arc::new(DocumentAnalyzer::new(
                router.clone(),
                scorer,
                config.clone(),
            )),
            verifier: Arc::new(DocumentVerifier::new(router, config.clone())),
            synthesizer: SchemaSynthesizer::new(repository),
            config,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Run the full pipeline for one document.
    pub async fn process(&self, request: AnalyzeRequest) -> AnalysisResponse {
        let total_start = Instant::now();
        let mut stages: BTreeMap<String, StageOutcome> = BTreeMap::new();
        let mut errors: Vec<String> = Vec::new();
        let mut recommendations: Vec<String> = Vec::new();

        // Caller-supplied filenames can carry path components; strip them
        // before the name reaches logs or the response.
        let filename = sanitize_filename(&request.filename);

        // ── Preprocessing (fatal on failure, no backend is invoked) ──
        let stage_start = Instant::now();
        let prepared = match self
            .preprocessor
            .normalize(&request.bytes, &request.mime_type)
        {
            Ok(prepared) => {
                stages.insert(
                    STAGE_PREPROCESSING.into(),
                    StageOutcome::ok(stage_start.elapsed().as_millis() as u64),
                );
                prepared
            }
            Err(e) => {
                error!(filename = %filename, error = %e, "Preprocessing failed");
                stages.insert(
                    STAGE_PREPROCESSING.into(),
                    StageOutcome::failed(stage_start.elapsed().as_millis() as u64, e.to_string()),
                );
                errors.push(format!("Document could not be processed: {e}"));
                return AnalysisResponse {
                    success: false,
                    processing_stages: stages,
                    document: None,
                    analysis: None,
                    schema: None,
                    confidence: None,
                    verification: None,
                    recommendations,
                    errors,
                    total_processing_time: total_start.elapsed().as_secs_f64(),
                };
            }
        };

        let document = SampleDocument {
            id: Uuid::new_v4(),
            filename,
            file_type: match prepared.format.category {
                FileCategory::Pdf => DocumentFileType::Pdf,
                _ => DocumentFileType::Image,
            },
            file_size: request.bytes.len(),
            page_count: prepared.total_page_count,
            content_hash: prepared.content_hash.clone(),
            processing_status: ProcessingStatus::Processing,
        };

        // ── Analysis + verification, concurrently ──
        let (analysis_outcome, verification_outcome) =
            self.run_model_pipelines(&document, &prepared, &request).await;

        let verification = match verification_outcome {
            Ok((report, elapsed_ms)) => {
                stages.insert(STAGE_VERIFICATION.into(), StageOutcome::ok(elapsed_ms));
                if report.risk_level == RiskLevel::High {
                    recommendations.push(
                        "High tampering risk detected; verify the source document manually"
                            .to_string(),
                    );
                }
                Some(VerificationSummary::from(&report))
            }
            Err((reason, elapsed_ms)) => {
                warn!(error = %reason, "Verification inconclusive");
                stages.insert(
                    STAGE_VERIFICATION.into(),
                    StageOutcome::failed(elapsed_ms, reason.clone()),
                );
                errors.push(format!("Verification inconclusive: {reason}"));
                None
            }
        };

        let (analysis, from_cache) = match analysis_outcome {
            Ok((analysis, elapsed_ms, from_cache)) => {
                stages.insert(STAGE_ANALYSIS.into(), StageOutcome::ok(elapsed_ms));
                (analysis, from_cache)
            }
            Err((reason, elapsed_ms)) => {
                stages.insert(
                    STAGE_ANALYSIS.into(),
                    StageOutcome::failed(elapsed_ms, reason.clone()),
                );
                errors.push(format!("Document analysis failed: {reason}"));
                let mut failed_doc = document;
                failed_doc.processing_status = ProcessingStatus::Failed;
                return AnalysisResponse {
                    success: false,
                    processing_stages: stages,
                    document: Some(DocumentSummary::from(&failed_doc)),
                    analysis: None,
                    schema: None,
                    confidence: None,
                    verification,
                    recommendations,
                    errors,
                    total_processing_time: total_start.elapsed().as_secs_f64(),
                };
            }
        };
        if from_cache {
            recommendations
                .push("Identical document analyzed recently; cached analysis reused".to_string());
        }

        // ── Confidence aggregation ──
        let stage_start = Instant::now();
        let overall_confidence = if analysis.fields.is_empty() {
            0.0
        } else {
            analysis
                .fields
                .iter()
                .map(|f| f.overall_confidence_score)
                .sum::<f64>()
                / analysis.fields.len() as f64
        };
        stages.insert(
            STAGE_CONFIDENCE.into(),
            StageOutcome::ok(stage_start.elapsed().as_millis() as u64),
        );

        // ── Schema synthesis + review gate ──
        let stage_start = Instant::now();
        let mut schema = self.synthesizer.synthesize(&analysis);
        let gate = ReviewGate::evaluate(&schema);
        // The stored artifact carries the gate's verdict, so repository and
        // response never disagree about the same version.
        schema.user_review_status = gate.review_status;
        let schema_summary = match self.synthesizer.store(&schema) {
            Ok(()) => {
                stages.insert(
                    STAGE_SCHEMA.into(),
                    StageOutcome::ok(stage_start.elapsed().as_millis() as u64),
                );
                Some(SchemaSummary::from_schema(&schema, &gate))
            }
            Err(e) => {
                stages.insert(
                    STAGE_SCHEMA.into(),
                    StageOutcome::failed(stage_start.elapsed().as_millis() as u64, e.to_string()),
                );
                errors.push(format!("Schema could not be published: {e}"));
                None
            }
        };

        let review_count = analysis.fields.iter().filter(|f| f.requires_review).count();
        if review_count > 0 {
            recommendations.push(format!(
                "{review_count} field(s) fell below the {REVIEW_THRESHOLD} confidence floor; review before use"
            ));
        }
        if !gate.production_ready && !gate.attention.is_empty() {
            recommendations.push(format!(
                "Schema needs review; start with '{}' (confidence {:.2})",
                gate.attention[0].display_name, gate.attention[0].confidence
            ));
        }
        if analysis.quality_score < 0.5 {
            recommendations
                .push("Low document quality; re-scanning at higher resolution may help".to_string());
        }

        let mut completed_doc = document;
        completed_doc.processing_status = ProcessingStatus::Completed;
        let success = schema_summary.is_some();

        info!(
            document_id = %completed_doc.id,
            analysis_id = %analysis.id,
            success,
            from_cache,
            elapsed_ms = total_start.elapsed().as_millis() as u64,
            "Pipeline complete"
        );

        AnalysisResponse {
            success,
            processing_stages: stages,
            document: Some(DocumentSummary::from(&completed_doc)),
            analysis: Some(AnalysisSummary::from(&analysis)),
            schema: schema_summary,
            confidence: Some(ConfidenceSummary::for_score(overall_confidence)),
            verification,
            recommendations,
            errors,
            total_processing_time: total_start.elapsed().as_secs_f64(),
        }
    }

    /// Run analyzer and verifier concurrently on blocking worker threads.
    /// Returns (analysis outcome, verification outcome), each with its
    /// elapsed milliseconds; the analysis outcome also says whether it was
    /// served from the content-hash cache.
    #[allow(clippy::type_complexity)]
    async fn run_model_pipelines(
        &self,
        document: &SampleDocument,
        prepared: &PreprocessedDocument,
        request: &AnalyzeRequest,
    ) -> (
        Result<(AnalysisResult, u64, bool), (String, u64)>,
        Result<(crate::pipeline::verifier::VerificationReport, u64), (String, u64)>,
    ) {
        let verifier = self.verifier.clone();
        let verifier_pages = prepared.pages.clone();
        let verifier_hint = request.model_hint.clone();
        let verify_task = tokio::task::spawn_blocking(move || {
            let start = Instant::now();
            let result = verifier.verify(&verifier_pages, verifier_hint.as_deref());
            (result, start.elapsed().as_millis() as u64)
        });

        let analysis_task = {
            let cached = self.cached_analysis(&prepared.content_hash);
            match cached {
                Some(_) => None,
                None => {
                    let analyzer = self.analyzer.clone();
                    let pages = prepared.pages.clone();
                    let model_hint = request.model_hint.clone();
                    let type_hint = request.document_type_hint.clone();
                    let document_id = document.id;
                    Some(tokio::task::spawn_blocking(move || {
                        let start = Instant::now();
                        let result = analyzer.analyze(
                            document_id,
                            &pages,
                            model_hint.as_deref(),
                            type_hint.as_deref(),
                        );
                        (result, start.elapsed().as_millis() as u64)
                    }))
                }
            }
        };

        let analysis_outcome = match analysis_task {
            None => {
                // Cached path: cached_analysis() only returns fresh hits.
                let result = self
                    .cached_analysis(&prepared.content_hash)
                    .map(|r| Ok((r, 0, true)))
                    .unwrap_or_else(|| Err(("analysis cache expired mid-request".to_string(), 0)));
                result
            }
            Some(task) => match task.await {
                Ok((Ok(result), elapsed_ms)) => {
                    self.cache_analysis(&prepared.content_hash, &result);
                    Ok((result, elapsed_ms, false))
                }
                Ok((Err(e), elapsed_ms)) => Err((e.to_string(), elapsed_ms)),
                Err(join_err) => Err((format!("analysis task panicked: {join_err}"), 0)),
            },
        };

        let verification_outcome = match verify_task.await {
            Ok((Ok(report), elapsed_ms)) => Ok((report, elapsed_ms)),
            Ok((Err(e), elapsed_ms)) => Err((e.to_string(), elapsed_ms)),
            Err(join_err) => Err((format!("verification task panicked: {join_err}"), 0)),
        };

        (analysis_outcome, verification_outcome)
    }

    fn cached_analysis(&self, content_hash: &str) -> Option<AnalysisResult> {
        let cache = self.cache.lock().ok()?;
        let entry = cache.get(content_hash)?;
        if entry.cached_at.elapsed().as_secs() <= self.config.cache_freshness_secs {
            Some(entry.result.clone())
        } else {
            None
        }
    }

    fn cache_analysis(&self, content_hash: &str, result: &AnalysisResult) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(
                content_hash.to_string(),
                CachedAnalysis {
                    result: result.clone(),
                    cached_at: Instant::now(),
                },
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::model::MockModelBackend;
    use crate::pipeline::preprocess::MockPageRenderer;
    use crate::pipeline::schema::InMemorySchemaRepository;

    const STAGE1: &str = r#"{"document_type": "invoice", "confidence": 0.92, "alternatives": []}"#;
    const STAGE2: &str = r#"{"fields": [
        {"name": "invoice_number", "value": "INV-0001", "source_text": "Invoice #: INV-0001",
         "field_type": "string", "confidence": 0.9, "legibility": 0.95, "group": null},
        {"name": "total", "value": "$150.00", "source_text": "Total: $150.00",
         "field_type": "number", "confidence": 0.85, "legibility": 0.9, "group": null}
    ]}"#;
    const STAGE3: &str = r#"{"fields": [
        {"name": "invoice_number", "display_name": "Invoice Number", "field_type": "string",
         "type_agreement": 0.95, "alternative_names": [], "alternative_types": []},
        {"name": "total", "display_name": "Total", "field_type": "number",
         "type_agreement": 0.9, "alternative_names": [], "alternative_types": []}
    ]}"#;
    const STAGE4: &str = r#"{"fields": [
        {"name": "invoice_number", "hints": [], "sample_values": ["INV-0001"]},
        {"name": "total", "hints": [], "sample_values": ["$150.00"]}
    ]}"#;
    const VERIFY: &str = r#"{"document_type_confidence": 0.9, "authenticity_score": 92,
        "indicators": {}, "notes": ["clean"]}"#;

    /// Backend scripted for one full request: 4 analyzer stages plus the
    /// verification call, dispatched by prompt content since the verifier
    /// runs concurrently with the analyzer.
    fn full_run_backend() -> Arc<MockModelBackend> {
        Arc::new(MockModelBackend::scripted_by_prompt(
            "mock-vision",
            vec![
                ("Classify this document", STAGE1),
                ("Extract every labeled", STAGE2),
                ("Refine each field", STAGE3),
                ("Produce extraction hints", STAGE4),
                ("Inspect this document for authenticity", VERIFY),
            ],
        ))
    }

    fn processor_with(backend: Arc<MockModelBackend>) -> DocumentProcessor {
        let router = ModelRouter::new(vec![backend]);
        DocumentProcessor::new(
            Arc::new(MockPageRenderer::new(1)),
            router,
            Arc::new(InMemorySchemaRepository::new()),
            PipelineConfig::default(),
        )
    }

    fn pdf_request() -> AnalyzeRequest {
        AnalyzeRequest {
            bytes: b"%PDF-1.4 fake invoice".to_vec(),
            filename: "invoice.pdf".into(),
            mime_type: "application/pdf".into(),
            model_hint: None,
            document_type_hint: None,
        }
    }

    #[tokio::test]
    async fn full_pipeline_produces_schema_and_verification() {
        let processor = processor_with(full_run_backend());
        let response = processor.process(pdf_request()).await;

        assert!(response.success, "errors: {:?}", response.errors);
        let analysis = response.analysis.as_ref().unwrap();
        assert_eq!(analysis.detected_document_type, "invoice");
        assert_eq!(analysis.total_fields_detected, 2);
        let schema = response.schema.as_ref().unwrap();
        assert_eq!(schema.version, "1.0.0");
        let verification = response.verification.as_ref().unwrap();
        assert_eq!(verification.authenticity_score, 92.0);
        for stage in [
            STAGE_PREPROCESSING,
            STAGE_ANALYSIS,
            STAGE_CONFIDENCE,
            STAGE_SCHEMA,
            STAGE_VERIFICATION,
        ] {
            assert!(
                response.processing_stages.get(stage).unwrap().success,
                "stage {stage}"
            );
        }
    }

    #[tokio::test]
    async fn unsupported_mime_fails_fast_with_zero_backend_calls() {
        let backend = full_run_backend();
        let processor = processor_with(backend.clone());
        let mut request = pdf_request();
        request.mime_type = "application/msword".into();
        request.bytes = b"PK\x03\x04docx".to_vec();

        let response = processor.process(request).await;
        assert!(!response.success);
        assert!(!response.processing_stages[STAGE_PREPROCESSING].success);
        assert!(response.processing_stages.get(STAGE_ANALYSIS).is_none());
        assert_eq!(backend.call_count(), 0);
        assert!(!response.errors.is_empty());
    }

    #[tokio::test]
    async fn verifier_failure_yields_null_verification_and_note() {
        let backend = Arc::new(MockModelBackend::scripted_by_prompt(
            "mock-vision",
            vec![
                ("Classify this document", STAGE1),
                ("Extract every labeled", STAGE2),
                ("Refine each field", STAGE3),
                ("Produce extraction hints", STAGE4),
                // No entry for the verification prompt: it answers prose.
            ],
        ));
        let processor = processor_with(backend);
        let response = processor.process(pdf_request()).await;

        assert!(response.success);
        assert!(response.verification.is_none());
        assert!(!response.processing_stages[STAGE_VERIFICATION].success);
        assert!(response
            .errors
            .iter()
            .any(|e| e.contains("Verification inconclusive")));
        assert!(response.schema.is_some());
    }

    #[tokio::test]
    async fn analyzer_failure_still_reports_verification() {
        let backend = Arc::new(MockModelBackend::scripted_by_prompt(
            "mock-vision",
            vec![("Inspect this document for authenticity", VERIFY)],
        ));
        let processor = processor_with(backend);
        let response = processor.process(pdf_request()).await;

        assert!(!response.success);
        assert!(response.analysis.is_none());
        assert!(response.schema.is_none());
        assert!(response.verification.is_some());
        assert!(!response.processing_stages[STAGE_ANALYSIS].success);
    }

    #[tokio::test]
    async fn identical_content_hash_reuses_the_cached_analysis() {
        let backend = Arc::new(MockModelBackend::scripted_by_prompt(
            "mock-vision",
            vec![
                ("Classify this document", STAGE1),
                ("Extract every labeled", STAGE2),
                ("Refine each field", STAGE3),
                ("Produce extraction hints", STAGE4),
                ("Inspect this document for authenticity", VERIFY),
            ],
        ));
        let processor = processor_with(backend.clone());

        let first = processor.process(pdf_request()).await;
        let calls_after_first = backend.call_count();
        let second = processor.process(pdf_request()).await;

        let first_id = first.analysis.as_ref().unwrap().id;
        let second_id = second.analysis.as_ref().unwrap().id;
        assert_eq!(first_id, second_id);
        // Only the verifier runs again; the four analyzer stages are cached.
        assert_eq!(backend.call_count(), calls_after_first + 1);
        assert!(second
            .recommendations
            .iter()
            .any(|r| r.contains("cached")));
    }

    #[tokio::test]
    async fn config_max_attempts_governs_backend_fallback() {
        // Timing-out primary, healthy fallback: the default attempt budget
        // of two lets the fallback rescue the request.
        let rescued = full_run_backend();
        let router = ModelRouter::new(vec![
            Arc::new(MockModelBackend::timing_out("primary")),
            rescued.clone(),
        ]);
        let processor = DocumentProcessor::new(
            Arc::new(MockPageRenderer::new(1)),
            router,
            Arc::new(InMemorySchemaRepository::new()),
            PipelineConfig::default(),
        );
        let response = processor.process(pdf_request()).await;
        assert!(response.success, "errors: {:?}", response.errors);

        // Cutting the budget to one attempt keeps the fallback unreached.
        let rescued = full_run_backend();
        let router = ModelRouter::new(vec![
            Arc::new(MockModelBackend::timing_out("primary")),
            rescued.clone(),
        ]);
        let processor = DocumentProcessor::new(
            Arc::new(MockPageRenderer::new(1)),
            router,
            Arc::new(InMemorySchemaRepository::new()),
            PipelineConfig {
                max_attempts: 1,
                ..PipelineConfig::default()
            },
        );
        let response = processor.process(pdf_request()).await;
        assert!(!response.success);
        assert!(!response.processing_stages[STAGE_ANALYSIS].success);
        assert_eq!(rescued.call_count(), 0);
    }

    #[tokio::test]
    async fn caller_filenames_are_stripped_of_path_components() {
        let processor = processor_with(full_run_backend());
        let mut request = pdf_request();
        request.filename = "../../uploads/invoice.pdf".into();
        let response = processor.process(request).await;
        let document = response.document.as_ref().unwrap();
        assert_eq!(document.filename, "invoice.pdf");
    }

    #[tokio::test]
    async fn stored_schema_carries_the_gate_status() {
        let repository = Arc::new(InMemorySchemaRepository::new());
        let router = ModelRouter::new(vec![full_run_backend()]);
        let processor = DocumentProcessor::new(
            Arc::new(MockPageRenderer::new(1)),
            router,
            repository.clone(),
            PipelineConfig::default(),
        );
        let response = processor.process(pdf_request()).await;
        let summary = response.schema.as_ref().unwrap();
        let stored = repository.load(summary.id, None).unwrap();
        assert_eq!(stored.user_review_status, summary.validation_status);
    }

    #[tokio::test]
    async fn weak_fields_surface_review_recommendations() {
        let weak_stage2 = r#"{"fields": [
            {"name": "smudge", "value": "???", "source_text": "",
             "field_type": "string", "confidence": 0.1, "legibility": 0.1, "group": null}
        ]}"#;
        let backend = Arc::new(MockModelBackend::scripted_by_prompt(
            "mock-vision",
            vec![
                ("Classify this document", STAGE1),
                ("Extract every labeled", weak_stage2),
                ("Refine each field", r#"{"fields": []}"#),
                ("Produce extraction hints", r#"{"fields": []}"#),
                ("Inspect this document for authenticity", VERIFY),
            ],
        ));
        let processor = processor_with(backend);
        let response = processor.process(pdf_request()).await;

        assert!(response.success);
        let schema = response.schema.as_ref().unwrap();
        assert!(!schema.production_ready);
        assert!(response
            .recommendations
            .iter()
            .any(|r| r.contains("review")));
    }
}
