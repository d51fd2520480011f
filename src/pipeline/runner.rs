use std::sync::Arc;
use std::time::Duration;

use tracing::info_span;

use crate::broadcast::RunPhase;
use crate::catalog::CatalogReader;
use crate::detector::{CustomerDetector, IdentitySignals};
use crate::extractor::ExtractorRegistry;
use crate::fingerprint::FingerprintCache;
use crate::llm::{build_extraction_prompt, ModelRequest, OrderModel};
use crate::matcher::{MappingStore, MatchEngine, SkuMatch, TraceEntry};
use crate::model::MatchStatus;
use crate::validator::{validate, ValidationWarning};
use crate::worker::job::JobResult;

use super::config::PipelineConfig;
use super::context::PipelineContext;
use super::error::PipelineError;
use super::progress::{ProgressEvent, ProgressReporter};

/// The per-document processing pipeline. One instance per worker thread;
/// all collaborators are shared behind `Arc`s.
pub struct Pipeline {
    config: Arc<PipelineConfig>,
    registry: ExtractorRegistry,
    model: Arc<dyn OrderModel>,
    catalog: Arc<dyn CatalogReader>,
    engine: MatchEngine,
    detector: CustomerDetector,
    fingerprints: FingerprintCache,
}

impl Pipeline {
    pub fn new(
        config: Arc<PipelineConfig>,
        model: Arc<dyn OrderModel>,
        catalog: Arc<dyn CatalogReader>,
        store: Arc<dyn MappingStore>,
        index: Option<Arc<dyn crate::embedding::EmbeddingIndex>>,
    ) -> Self {
        let engine = MatchEngine::new(config.matching.clone(), store, index);
        let detector = CustomerDetector::new(config.detection.clone());
        Self {
            config,
            registry: ExtractorRegistry::with_defaults(),
            model,
            catalog,
            engine,
            detector,
            fingerprints: FingerprintCache::default(),
        }
    }

    /// Runs the full pipeline for one job.
    ///
    /// Per-line defects never fail the run; the first per-document error
    /// aborts it. The context is returned alongside the result so the
    /// caller can persist intermediate state.
    pub fn run(
        &self,
        mut ctx: PipelineContext,
        progress: &dyn ProgressReporter,
    ) -> (JobResult, PipelineContext) {
        let _pipeline_span = info_span!(
            "pipeline",
            job_id = %ctx.job.id,
            document_id = %ctx.job.document_id
        )
        .entered();

        // Step 1: Extract canonical content
        {
            let _step = info_span!("extract").entered();
            progress.report(ProgressEvent::Phase {
                phase: RunPhase::Extracting,
                message: format!("Extracting text from {}", ctx.job.file_name),
            });
            if let Err(e) = self.step_extract(&mut ctx) {
                let code = e.code();
                let err_msg = e.to_string();
                progress.report(ProgressEvent::Failed {
                    error: err_msg.clone(),
                });
                return (JobResult::failure(&ctx.job, code, err_msg), ctx);
            }
        }

        // Step 2: Model call
        {
            let _step = info_span!("call_model").entered();
            progress.report(ProgressEvent::Phase {
                phase: RunPhase::Prompting,
                message: "Requesting structured order data...".to_string(),
            });
            if let Err(e) = self.step_call_model(&mut ctx) {
                let code = e.code();
                let err_msg = e.to_string();
                progress.report(ProgressEvent::Failed {
                    error: err_msg.clone(),
                });
                return (JobResult::failure(&ctx.job, code, err_msg), ctx);
            }
        }

        // Step 3: Validate and repair the payload
        {
            let _step = info_span!("validate").entered();
            progress.report(ProgressEvent::Phase {
                phase: RunPhase::Validating,
                message: "Validating model output...".to_string(),
            });
            if let Err(e) = self.step_validate(&mut ctx) {
                let code = e.code();
                let err_msg = e.to_string();
                progress.report(ProgressEvent::Failed {
                    error: err_msg.clone(),
                });
                return (JobResult::failure(&ctx.job, code, err_msg), ctx);
            }
        }

        // Step 4: Normalize units (never fails; unknown units become warnings)
        {
            let _step = info_span!("normalize_units").entered();
            progress.report(ProgressEvent::Phase {
                phase: RunPhase::NormalizingUnits,
                message: "Normalizing units of measure...".to_string(),
            });
            self.step_normalize_units(&mut ctx);
        }

        // Step 5: Layout fingerprint
        {
            let _step = info_span!("fingerprint").entered();
            progress.report(ProgressEvent::Phase {
                phase: RunPhase::Fingerprinting,
                message: "Computing layout fingerprint...".to_string(),
            });
            self.step_fingerprint(&mut ctx);
        }

        // Step 6: Match lines against the catalog
        {
            let _step = info_span!("match_lines").entered();
            progress.report(ProgressEvent::Phase {
                phase: RunPhase::Matching,
                message: "Matching SKUs...".to_string(),
            });
            if let Err(e) = self.step_match_lines(&mut ctx) {
                let code = e.code();
                let err_msg = e.to_string();
                progress.report(ProgressEvent::Failed {
                    error: err_msg.clone(),
                });
                return (JobResult::failure(&ctx.job, code, err_msg), ctx);
            }
        }

        // Step 7: Detect the ordering customer
        {
            let _step = info_span!("detect_customer").entered();
            progress.report(ProgressEvent::Phase {
                phase: RunPhase::Detecting,
                message: "Detecting customer...".to_string(),
            });
            if let Err(e) = self.step_detect(&mut ctx) {
                let code = e.code();
                let err_msg = e.to_string();
                progress.report(ProgressEvent::Failed {
                    error: err_msg.clone(),
                });
                return (JobResult::failure(&ctx.job, code, err_msg), ctx);
            }
        }

        // Completion (with the draft order id) is reported by the caller
        // once the order row exists.
        let result = JobResult::success(&ctx.job, ctx.line_count(), ctx.matched_count());
        (result, ctx)
    }

    fn step_extract(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        let extractor = self.registry.lookup(&ctx.job.mime_type)?;
        ctx.extractor_name = Some(extractor.name().to_string());
        ctx.extractor_version = Some(extractor.version().to_string());

        let content = self.registry.extract(&ctx.job.bytes, &ctx.job.mime_type)?;
        if content.text_coverage < 0.5 {
            tracing::warn!(
                document_id = %ctx.job.document_id,
                coverage = content.text_coverage,
                "low text coverage; document may be scanned without a text layer"
            );
        }
        ctx.content = Some(content);
        Ok(())
    }

    fn step_call_model(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        let content = ctx.content.as_ref().expect("step 1 completed");
        let prompt = build_extraction_prompt(&content.text, self.config.extraction.max_prompt_chars);
        let request = ModelRequest {
            prompt,
            timeout: Duration::from_secs(self.config.extraction.llm_timeout_secs),
        };
        let reply = self.model.complete(&request)?;
        tracing::debug!(
            prompt_tokens = reply.usage.prompt_tokens,
            completion_tokens = reply.usage.completion_tokens,
            latency_ms = reply.usage.latency_ms,
            "model call finished"
        );
        ctx.payload = Some(reply.payload);
        ctx.usage = Some(reply.usage);
        Ok(())
    }

    fn step_validate(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        let payload = ctx.payload.as_ref().expect("step 2 completed");
        let output = validate(payload, self.config.extraction.max_lines)?;
        ctx.output = Some(output);
        Ok(())
    }

    fn step_normalize_units(&self, ctx: &mut PipelineContext) {
        let output = ctx.output.as_mut().expect("step 3 completed");

        let mut units = Vec::with_capacity(output.lines.len());
        let mut warnings = Vec::new();
        for line in &output.lines {
            let raw = line.unit.as_deref().unwrap_or("");
            let unit = crate::uom::normalize(raw);
            if unit.is_none() && !raw.trim().is_empty() {
                warnings.push(ValidationWarning::UnknownUnit {
                    line: line.line_number,
                    value: raw.to_string(),
                });
            }
            units.push(unit);
        }
        output.warnings.extend(warnings);
        ctx.units = units;
    }

    fn step_fingerprint(&self, ctx: &mut PipelineContext) {
        let content = ctx.content.as_ref().expect("step 1 completed");
        // The heuristic only runs when the extractor doesn't already know.
        let has_tables = if content.is_tabular() { Some(true) } else { None };
        let digest = self.fingerprints.get_or_compute(
            &ctx.job.content_hash,
            content.page_count(),
            &content.text,
            has_tables,
        );
        ctx.fingerprint = Some(digest);
    }

    fn step_match_lines(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        let output = ctx.output.as_ref().expect("step 3 completed");
        let org_id = &ctx.job.org_id;
        let skus = self.catalog.skus(org_id)?;

        // No customer is confirmed yet, so only org-wide mappings apply.
        let mut matches = Vec::with_capacity(output.lines.len());
        for line in &output.lines {
            match self.engine.match_line(
                org_id,
                None,
                &line.customer_sku,
                line.description.as_deref(),
                &skus,
            ) {
                Ok(m) => matches.push(m),
                Err(e) => {
                    // A line-level infrastructure failure leaves the line
                    // unmatched; it never aborts the document.
                    tracing::warn!(
                        line = line.line_number,
                        sku = %line.customer_sku,
                        error = %e,
                        "line match failed; leaving unmatched"
                    );
                    matches.push(SkuMatch {
                        internal_sku: None,
                        confidence: 0.0,
                        method: None,
                        status: MatchStatus::Unmatched,
                        trace: vec![TraceEntry {
                            strategy: "error",
                            candidate: None,
                            score: None,
                            accepted: false,
                            note: Some(e.to_string()),
                        }],
                    });
                }
            }
        }
        ctx.matches = matches;
        Ok(())
    }

    fn step_detect(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        let output = ctx.output.as_ref().expect("step 3 completed");
        let customers = self.catalog.customers(&ctx.job.org_id)?;

        // ERP customer numbers are not part of the extraction contract yet,
        // so that signal stays empty here.
        let signals = IdentitySignals {
            customer_hint: output.header.customer_hint.clone(),
            email: ctx.job.sender_email.clone(),
            erp_number: None,
            ship_to: output.header.ship_to.clone(),
        };
        ctx.candidates = self.detector.score(&customers, &signals);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogSku, Customer, InMemoryCatalog};
    use crate::db::mapping_repo::SqliteMappingStore;
    use crate::db::Database;
    use crate::error::LlmError;
    use crate::llm::FixtureModel;
    use crate::pipeline::progress::NoopProgress;
    use crate::worker::job::Job;
    use serde_json::json;

    fn csv_job() -> Job {
        let bytes = b"Pos,Artikel,Menge\n1,AB-100,5\n".to_vec();
        Job::new("org-1", "d1", "order.csv", "text/csv", "hash-1", bytes)
            .with_sender("buyer@acme.example")
    }

    fn catalog() -> Arc<InMemoryCatalog> {
        let catalog = InMemoryCatalog::new();
        catalog.add_sku(CatalogSku {
            org_id: "org-1".to_string(),
            sku: "AB-100".to_string(),
            description: "Widget, blue".to_string(),
        });
        catalog.add_customer(Customer {
            id: "cust-1".to_string(),
            org_id: "org-1".to_string(),
            name: "Acme GmbH".to_string(),
            email: Some("buyer@acme.example".to_string()),
            erp_number: None,
            address: None,
        });
        Arc::new(catalog)
    }

    fn pipeline_with(model: FixtureModel) -> Pipeline {
        let config = Arc::new(PipelineConfig {
            org_id: "org-1".to_string(),
            extraction: Default::default(),
            matching: Default::default(),
            detection: Default::default(),
        });
        let db = Database::open_in_memory().expect("in-memory db");
        let store = Arc::new(SqliteMappingStore::new(db));
        Pipeline::new(config, Arc::new(model), catalog(), store, None)
    }

    fn payload() -> serde_json::Value {
        json!({
            "header": {
                "external_order_number": "PO-55",
                "customer_hint": "Acme GmbH",
                "currency": "EUR"
            },
            "lines": [
                {
                    "line_number": 1,
                    "customer_sku": "AB-100",
                    "description": "Widget blue",
                    "quantity": 5.0,
                    "unit": "Stück"
                },
                {
                    "line_number": 2,
                    "customer_sku": "ZZ-999",
                    "description": "Mystery part",
                    "quantity": 1.0,
                    "unit": "blorp"
                }
            ]
        })
    }

    #[test]
    fn test_successful_run_populates_context() {
        let pipeline = pipeline_with(FixtureModel::new(payload()));
        let ctx = PipelineContext::new(csv_job());

        let (result, ctx) = pipeline.run(ctx, &NoopProgress);

        assert!(result.success, "run failed: {:?}", result.error);
        assert_eq!(result.line_count, 2);
        assert!(ctx.fingerprint.is_some());
        assert_eq!(ctx.extractor_name.as_deref(), Some("csv"));
        assert_eq!(ctx.matches.len(), 2);

        // Line 1 resolves by trigram against the catalog.
        assert_eq!(ctx.matches[0].internal_sku.as_deref(), Some("AB-100"));
        // Line 2 has nothing close in the catalog.
        assert!(ctx.matches[1].internal_sku.is_none());

        // Units: "Stück" normalizes, "blorp" stays raw with a warning.
        assert_eq!(ctx.units, vec![Some("ST"), None]);
        let output = ctx.output.as_ref().unwrap();
        assert!(output
            .warnings
            .iter()
            .any(|w| matches!(w, ValidationWarning::UnknownUnit { line: 2, .. })));
    }

    #[test]
    fn test_sender_email_drives_detection() {
        let pipeline = pipeline_with(FixtureModel::new(payload()));
        let (result, ctx) = pipeline.run(PipelineContext::new(csv_job()), &NoopProgress);

        assert!(result.success);
        assert!(!ctx.candidates.is_empty());
        assert_eq!(ctx.candidates[0].customer_id, "cust-1");
    }

    #[test]
    fn test_model_timeout_fails_run() {
        let pipeline = pipeline_with(FixtureModel::failing(|| LlmError::Timeout { secs: 60 }));
        let (result, ctx) = pipeline.run(PipelineContext::new(csv_job()), &NoopProgress);

        assert!(!result.success);
        assert_eq!(result.error_code.as_deref(), Some("extraction_failed"));
        // The extraction itself finished before the model call failed.
        assert!(ctx.content.is_some());
        assert!(ctx.output.is_none());
    }

    #[test]
    fn test_unsupported_mime_fails_run() {
        let pipeline = pipeline_with(FixtureModel::new(payload()));
        let job = Job::new("org-1", "d1", "order.docx", "application/msword", "h", vec![]);
        let (result, _ctx) = pipeline.run(PipelineContext::new(job), &NoopProgress);

        assert!(!result.success);
        assert_eq!(result.error_code.as_deref(), Some("unsupported_format"));
    }

    #[test]
    fn test_envelope_violation_fails_run() {
        let pipeline = pipeline_with(FixtureModel::new(json!({"header": {}})));
        let (result, _ctx) = pipeline.run(PipelineContext::new(csv_job()), &NoopProgress);

        assert!(!result.success);
        assert_eq!(result.error_code.as_deref(), Some("schema_violation"));
    }
}
