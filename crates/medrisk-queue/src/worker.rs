//! Worker loop: dequeue, isolate, analyze, record, persist, clean up.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::FutureExt;
use tracing::{error, info, warn};

use medrisk_core::JobId;
use medrisk_core::analyzer::Analyzer;
use medrisk_core::job::JobFailure;
use medrisk_core::workspace::Workspace;
use medrisk_db::WriterHandle;

use crate::dispatch::{Dispatch, DispatchQueue};
use crate::registry::JobRegistry;
use crate::workspace;

/// How long a worker waits on the dispatch queue before re-checking
/// whether the pool is still running.
const DEQUEUE_TIMEOUT: Duration = Duration::from_secs(1);

/// One worker task in the pool.
///
/// A worker owns each job it dequeues from processing start to terminal
/// state; no other task mutates that record while it runs. A worker crash
/// at the process level leaves the job `processing` in the durable store.
/// There is no reaper for such rows; an external watchdog would have to
/// re-examine stale processing entries.
pub(crate) struct Worker {
    id: usize,
    registry: Arc<JobRegistry>,
    dispatch: Arc<DispatchQueue>,
    analyzer: Arc<dyn Analyzer>,
    writer: WriterHandle,
    workspace_root: PathBuf,
    running: Arc<AtomicBool>,
}

impl Worker {
    pub(crate) fn new(
        id: usize,
        registry: Arc<JobRegistry>,
        dispatch: Arc<DispatchQueue>,
        analyzer: Arc<dyn Analyzer>,
        writer: WriterHandle,
        workspace_root: PathBuf,
        running: Arc<AtomicBool>,
    ) -> Self {
        Self {
            id,
            registry,
            dispatch,
            analyzer,
            writer,
            workspace_root,
            running,
        }
    }

    /// Run the worker loop until a shutdown sentinel arrives or the
    /// running flag drops while the queue is idle.
    pub(crate) async fn run(self) {
        info!(worker_id = self.id, analyzer = %self.analyzer.name(), "Starting worker");

        loop {
            match self.dispatch.dequeue(DEQUEUE_TIMEOUT).await {
                Some(Dispatch::Job(id)) => self.process(id).await,
                Some(Dispatch::Shutdown) => break,
                None => {
                    if !self.running.load(Ordering::SeqCst) {
                        break;
                    }
                }
            }
        }

        info!(worker_id = self.id, "Worker stopped");
    }

    async fn process(&self, id: JobId) {
        let Some(record) = self.registry.get(id) else {
            warn!(worker_id = self.id, job_id = %id, "Dispatched job not in registry, skipping");
            return;
        };

        info!(worker_id = self.id, job_id = %id, "Processing job");
        if let Err(e) = self.registry.update(id, |record| record.mark_processing()) {
            warn!(worker_id = self.id, job_id = %id, error = %e, "Failed to start job");
            return;
        }
        self.persist(id);

        let workspace = Workspace::new(&self.workspace_root, id);
        let outcome = match workspace::prepare(&workspace, &record.request).await {
            Ok(()) => {
                AssertUnwindSafe(self.analyzer.analyze(&workspace, &record.request))
                    .catch_unwind()
                    .await
            }
            Err(e) => Ok(Err(e)),
        };
        workspace::remove(&workspace).await;

        let transition = match outcome {
            Ok(Ok(result)) => {
                info!(worker_id = self.id, job_id = %id, "Job completed");
                self.registry
                    .update(id, |record| record.mark_completed(result))
            }
            Ok(Err(e)) => {
                warn!(worker_id = self.id, job_id = %id, error = %e, "Job failed");
                let failure = JobFailure::new(e.to_string()).with_trace(format!("{e:?}"));
                self.registry
                    .update(id, |record| record.mark_failed(failure))
            }
            Err(panic) => {
                let trace = panic_message(panic.as_ref());
                error!(worker_id = self.id, job_id = %id, trace = %trace, "Analyzer panicked");
                let failure = JobFailure::new("analyzer panicked").with_trace(trace);
                self.registry
                    .update(id, |record| record.mark_failed(failure))
            }
        };
        if let Err(e) = transition {
            warn!(worker_id = self.id, job_id = %id, error = %e, "Failed to finish job");
        }
        self.persist(id);
    }

    /// Queue the current registry snapshot for background persistence.
    fn persist(&self, id: JobId) {
        if let Some(snapshot) = self.registry.get(id) {
            self.writer.enqueue(snapshot);
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
