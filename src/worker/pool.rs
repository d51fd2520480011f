use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender};
use log::{debug, error, info};

use crate::broadcast::RunProgressBroadcaster;
use crate::catalog::CatalogReader;
use crate::db::mapping_repo::SqliteMappingStore;
use crate::db::{candidate_repo, document_repo, order_repo, run_repo, stats_repo, Database};
use crate::embedding::EmbeddingIndex;
use crate::llm::OrderModel;
use crate::model::{DocumentStatus, RunStatus};
use crate::pipeline::progress::{BroadcastProgress, NoopProgress, ProgressReporter};
use crate::pipeline::{Pipeline, PipelineConfig, PipelineContext, ProgressEvent};
use crate::worker::job::{Job, JobResult};

/// Everything a worker thread needs to build its pipeline and persist
/// results. Cloned once per worker.
#[derive(Clone)]
pub struct WorkerDeps {
    pub db: Database,
    pub model: Arc<dyn OrderModel>,
    pub catalog: Arc<dyn CatalogReader>,
    pub index: Option<Arc<dyn EmbeddingIndex>>,
    pub broadcaster: Option<RunProgressBroadcaster>,
}

pub struct WorkerPool {
    job_sender: Sender<Job>,
    result_receiver: Receiver<JobResult>,
    workers: Vec<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl WorkerPool {
    /// Creates a pool of `worker_count` document workers.
    ///
    /// # Panics
    /// Panics if `worker_count` is 0.
    pub fn new(config: Arc<PipelineConfig>, deps: WorkerDeps, worker_count: usize) -> Self {
        assert!(worker_count > 0, "worker pool needs at least one worker");
        let (job_sender, job_receiver) = bounded::<Job>(worker_count * 2);
        let (result_sender, result_receiver) = bounded::<JobResult>(worker_count * 2);
        let shutdown = Arc::new(AtomicBool::new(false));

        let mut workers = Vec::with_capacity(worker_count);

        for worker_id in 0..worker_count {
            let job_rx = job_receiver.clone();
            let result_tx = result_sender.clone();
            let shutdown_flag = Arc::clone(&shutdown);
            let worker_config = Arc::clone(&config);
            let worker_deps = deps.clone();

            let handle = thread::spawn(move || {
                run_worker(worker_id, job_rx, result_tx, shutdown_flag, worker_config, worker_deps);
            });

            workers.push(handle);
        }

        info!("Spawned {} extraction workers", worker_count);

        Self {
            job_sender,
            result_receiver,
            workers,
            shutdown,
        }
    }

    pub fn submit(&self, job: Job) -> Result<(), crate::error::WorkerError> {
        if self.shutdown.load(Ordering::Relaxed) {
            return Err(crate::error::WorkerError::ChannelClosed);
        }

        self.job_sender
            .send(job)
            .map_err(|_| crate::error::WorkerError::ChannelClosed)
    }

    pub fn try_recv_result(&self) -> Option<JobResult> {
        self.result_receiver.try_recv().ok()
    }

    pub fn recv_result(&self) -> Option<JobResult> {
        self.result_receiver.recv().ok()
    }

    pub fn shutdown(&self) {
        info!("Stopping worker pool");
        self.shutdown.store(true, Ordering::Relaxed);
    }

    pub fn wait(self) {
        // Closing the job channel lets idle workers drain out
        drop(self.job_sender);

        for (i, worker) in self.workers.into_iter().enumerate() {
            if let Err(e) = worker.join() {
                error!("Worker {} exited with a panic: {:?}", i, e);
            } else {
                debug!("Worker {} joined", i);
            }
        }

        info!("Worker pool stopped");
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }
}

fn run_worker(
    worker_id: usize,
    job_receiver: Receiver<Job>,
    result_sender: Sender<JobResult>,
    shutdown: Arc<AtomicBool>,
    config: Arc<PipelineConfig>,
    deps: WorkerDeps,
) {
    debug!("Worker {} started", worker_id);

    let store = Arc::new(SqliteMappingStore::new(deps.db.clone()));
    let pipeline = Pipeline::new(
        config,
        Arc::clone(&deps.model),
        Arc::clone(&deps.catalog),
        store,
        deps.index.clone(),
    );

    loop {
        if shutdown.load(Ordering::Relaxed) {
            debug!("Worker {} saw the shutdown flag", worker_id);
            break;
        }

        match job_receiver.recv_timeout(std::time::Duration::from_millis(100)) {
            Ok(job) => {
                debug!("Worker {} processing document {}", worker_id, job.document_id);

                let result = process_job(&deps.db, &pipeline, deps.broadcaster.as_ref(), job);

                if let Err(e) = result_sender.send(result) {
                    error!("Worker {} could not deliver a result: {}", worker_id, e);
                    break;
                }
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                continue;
            }
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                debug!("Worker {} lost the job channel", worker_id);
                break;
            }
        }
    }

    debug!("Worker {} stopped", worker_id);
}

/// Runs the pipeline for one job and persists every state transition:
/// run lifecycle, document status, draft order, detection candidates and
/// daily stats.
fn process_job(
    db: &Database,
    pipeline: &Pipeline,
    broadcaster: Option<&RunProgressBroadcaster>,
    job: Job,
) -> JobResult {
    let run_id = job.id.clone();

    if let Err(e) = run_repo::create(db, &run_id, &job.document_id, &job.org_id) {
        error!("Failed to create run {}: {}", run_id, e);
        return JobResult::failure(&job, "db_error", e.to_string());
    }
    if let Err(e) = run_repo::mark_running(db, &run_id) {
        error!("Failed to mark run {} running: {}", run_id, e);
        return JobResult::failure(&job, "db_error", e.to_string());
    }
    if let Err(e) =
        document_repo::update_status(db, &job.document_id, DocumentStatus::Processing, None, None)
    {
        error!("Failed to mark document {} processing: {}", job.document_id, e);
        return JobResult::failure(&job, "db_error", e.to_string());
    }

    let progress: Box<dyn ProgressReporter> = match broadcaster {
        Some(b) => Box::new(BroadcastProgress::new(b.start_run(
            &run_id,
            &job.document_id,
            &job.file_name,
        ))),
        None => Box::new(NoopProgress),
    };

    let ctx = PipelineContext::new(job);
    let (mut result, ctx) = pipeline.run(ctx, progress.as_ref());
    let duration_ms = ctx.started_at.elapsed().as_millis() as i64;
    let today = chrono::Utc::now().format("%Y-%m-%d").to_string();

    // Whatever extraction learned about the document's shape is worth
    // keeping even when a later stage failed.
    if let Some(content) = &ctx.content {
        if let Err(e) = document_repo::record_extraction_profile(
            db,
            &ctx.job.document_id,
            content.page_count() as i64,
            content.text_coverage,
            ctx.fingerprint.as_deref(),
        ) {
            error!(
                "Failed to record extraction profile for document {}: {}",
                ctx.job.document_id, e
            );
        }
    }

    let mut outcome = run_repo::RunOutcome {
        extractor_name: ctx.extractor_name.clone(),
        extractor_version: ctx.extractor_version.clone(),
        fingerprint: ctx.fingerprint.clone(),
        duration_ms,
        line_count: ctx.line_count() as i64,
        matched_count: ctx.matched_count() as i64,
        ..Default::default()
    };
    if let Some(usage) = &ctx.usage {
        outcome.prompt_tokens = i64::from(usage.prompt_tokens);
        outcome.completion_tokens = i64::from(usage.completion_tokens);
        outcome.llm_latency_ms = usage.latency_ms as i64;
        outcome.llm_cost = usage.cost;
    }
    if let Some(output) = &ctx.output {
        outcome.warnings = serde_json::to_string(&output.warnings).ok();
        outcome.payload = serde_json::to_string(output).ok();
    }

    if result.success {
        match persist_draft_order(db, &ctx) {
            Ok(order_id) => {
                finish_run(db, &run_id, RunStatus::Succeeded, &outcome);
                set_document_status(db, &ctx.job.document_id, DocumentStatus::Extracted, None, None);
                record_stats(db, &ctx.job.org_id, &today, true, duration_ms, &outcome);
                progress.report(ProgressEvent::Completed {
                    draft_order_id: order_id.clone(),
                });
                result.draft_order_id = Some(order_id);
            }
            Err(e) => {
                error!("Failed to persist draft order for run {}: {}", run_id, e);
                let err_msg = e.to_string();
                outcome.error_code = Some("db_error".to_string());
                outcome.error_message = Some(err_msg.clone());
                finish_run(db, &run_id, RunStatus::Failed, &outcome);
                set_document_status(
                    db,
                    &ctx.job.document_id,
                    DocumentStatus::Failed,
                    Some("db_error"),
                    Some(&err_msg),
                );
                record_stats(db, &ctx.job.org_id, &today, false, duration_ms, &outcome);
                progress.report(ProgressEvent::Failed {
                    error: err_msg.clone(),
                });
                result = JobResult::failure(&ctx.job, "db_error", err_msg);
            }
        }
    } else {
        outcome.error_code = result.error_code.clone();
        outcome.error_message = result.error.clone();
        finish_run(db, &run_id, RunStatus::Failed, &outcome);
        set_document_status(
            db,
            &ctx.job.document_id,
            DocumentStatus::Failed,
            result.error_code.as_deref(),
            result.error.as_deref(),
        );
        record_stats(db, &ctx.job.org_id, &today, false, duration_ms, &outcome);
        // The pipeline already reported the Failed event.
    }

    result
}

/// Writes the draft order, its lines and the detection candidates in the
/// context. Returns the new order id.
fn persist_draft_order(db: &Database, ctx: &PipelineContext) -> Result<String, crate::db::DbError> {
    let output = ctx.output.as_ref().expect("successful run has output");
    let order_id = uuid::Uuid::new_v4().to_string();
    let created = crate::db::now();

    let order = order_repo::DraftOrderRow {
        id: order_id.clone(),
        org_id: ctx.job.org_id.clone(),
        document_id: ctx.job.document_id.clone(),
        run_id: ctx.job.id.clone(),
        external_order_number: output.header.external_order_number.clone(),
        order_date: output.header.order_date.map(|d| d.format("%Y-%m-%d").to_string()),
        currency: output.header.currency.clone(),
        customer_id: None,
        ship_to: output.header.ship_to.clone(),
        notes: output.header.notes.clone(),
        export_status: "pending".to_string(),
        created_at: created.clone(),
        updated_at: created,
    };

    let lines: Vec<order_repo::DraftLineRow> = output
        .lines
        .iter()
        .enumerate()
        .map(|(i, line)| {
            let m = &ctx.matches[i];
            order_repo::DraftLineRow {
                id: uuid::Uuid::new_v4().to_string(),
                draft_order_id: order_id.clone(),
                line_number: i64::from(line.line_number),
                customer_sku: line.customer_sku.clone(),
                description: line.description.clone(),
                quantity: line.quantity,
                unit_raw: line.unit.clone(),
                unit: ctx.units.get(i).copied().flatten().map(str::to_string),
                unit_price: line.unit_price,
                currency: line.currency.clone(),
                requested_delivery: line
                    .requested_delivery
                    .map(|d| d.format("%Y-%m-%d").to_string()),
                internal_sku: m.internal_sku.clone(),
                match_status: m.status.as_str().to_string(),
                match_method: m.method.map(|method| method.as_str().to_string()),
                match_confidence: m.internal_sku.as_ref().map(|_| m.confidence),
                match_trace: serde_json::to_string(&m.trace).ok(),
            }
        })
        .collect();

    order_repo::insert(db, &order, &lines)?;

    for candidate in &ctx.candidates {
        candidate_repo::upsert(
            db,
            &uuid::Uuid::new_v4().to_string(),
            &order_id,
            &candidate.customer_id,
            candidate.score,
            serde_json::to_string(&candidate.contributions).ok().as_deref(),
        )?;
    }

    Ok(order_id)
}

fn finish_run(db: &Database, run_id: &str, status: RunStatus, outcome: &run_repo::RunOutcome) {
    if let Err(e) = run_repo::finish(db, run_id, status, outcome) {
        error!("Failed to finish run {}: {}", run_id, e);
    }
}

fn set_document_status(
    db: &Database,
    document_id: &str,
    status: DocumentStatus,
    error_code: Option<&str>,
    error_message: Option<&str>,
) {
    if let Err(e) = document_repo::update_status(db, document_id, status, error_code, error_message)
    {
        error!("Failed to update document {} status: {}", document_id, e);
    }
}

fn record_stats(
    db: &Database,
    org_id: &str,
    date: &str,
    succeeded: bool,
    duration_ms: i64,
    outcome: &run_repo::RunOutcome,
) {
    if let Err(e) = stats_repo::record_completion(
        db,
        org_id,
        date,
        succeeded,
        duration_ms,
        outcome.line_count,
        outcome.matched_count,
        outcome.prompt_tokens + outcome.completion_tokens,
    ) {
        error!("Failed to record stats for org {}: {}", org_id, e);
    }
}
