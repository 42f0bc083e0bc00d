//! Concurrent extraction of many documents.
//!
//! Each job runs on a blocking worker (inference is synchronous) with at
//! most `concurrency` in flight. Jobs share the pipeline and its template
//! store but nothing else: cancelling or failing one job leaves the others
//! running.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use uuid::Uuid;

use super::cancel::CancelFlag;
use super::document::Document;
use super::orchestrator::ExtractionPipeline;
use super::schema::ExtractionResult;
use super::ExtractionError;

/// One document queued for batch extraction.
pub struct BatchJob {
    pub document: Document,
    pub source_hint: Option<String>,
    pub cancel: CancelFlag,
}

impl BatchJob {
    pub fn new(document: Document) -> Self {
        Self {
            document,
            source_hint: None,
            cancel: CancelFlag::new(),
        }
    }

    pub fn with_hint(mut self, hint: &str) -> Self {
        self.source_hint = Some(hint.to_string());
        self
    }

    /// Handle that cancels this job only.
    pub fn cancel_handle(&self) -> CancelFlag {
        self.cancel.clone()
    }
}

#[derive(Debug)]
pub struct BatchOutcome {
    pub document_id: Uuid,
    pub source_name: Option<String>,
    pub result: Result<ExtractionResult, ExtractionError>,
    pub duration_ms: u64,
}

/// Run every job and return the outcomes in submission order.
pub async fn extract_batch(
    pipeline: Arc<ExtractionPipeline>,
    jobs: Vec<BatchJob>,
    concurrency: usize,
) -> Vec<BatchOutcome> {
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let total = jobs.len();
    let mut set = JoinSet::new();
    let mut ids = Vec::with_capacity(total);

    for (index, job) in jobs.into_iter().enumerate() {
        let document_id = job.document.id;
        let source_name = job.document.source_name.clone();
        ids.push((document_id, source_name.clone()));
        let pipeline = pipeline.clone();
        let semaphore = semaphore.clone();
        set.spawn(async move {
            let _permit = semaphore.acquire_owned().await;
            let outcome = match tokio::task::spawn_blocking(move || run_job(&pipeline, job)).await
            {
                Ok(outcome) => outcome,
                Err(e) => worker_failure(document_id, source_name, e.to_string()),
            };
            (index, outcome)
        });
    }

    let mut slots: Vec<Option<BatchOutcome>> = (0..total).map(|_| None).collect();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((index, outcome)) => slots[index] = Some(outcome),
            Err(e) => tracing::error!(error = %e, "Batch task failed to join"),
        }
    }

    let outcomes: Vec<BatchOutcome> = slots
        .into_iter()
        .zip(ids)
        .map(|(slot, (id, name))| {
            slot.unwrap_or_else(|| worker_failure(id, name, "task did not complete".into()))
        })
        .collect();

    let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
    tracing::info!(total, failed, "Batch extraction complete");
    outcomes
}

fn worker_failure(document_id: Uuid, source_name: Option<String>, reason: String) -> BatchOutcome {
    tracing::error!(doc_id = %document_id, reason = %reason, "Extraction worker failed");
    BatchOutcome {
        document_id,
        source_name,
        result: Err(ExtractionError::Worker(reason)),
        duration_ms: 0,
    }
}

fn run_job(pipeline: &ExtractionPipeline, job: BatchJob) -> BatchOutcome {
    let started = Instant::now();
    let result =
        pipeline.extract_with_cancel(&job.document, job.source_hint.as_deref(), &job.cancel);
    if let Err(e) = &result {
        tracing::warn!(doc_id = %job.document.id, stage = %e.stage(), error = %e, "Document failed");
    }
    BatchOutcome {
        document_id: job.document.id,
        source_name: job.document.source_name,
        result,
        duration_ms: started.elapsed().as_millis() as u64,
    }
}
