//! The public job queue facade.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use medrisk_core::JobId;
use medrisk_core::analyzer::Analyzer;
use medrisk_core::job::{JobFailure, JobRecord, JobStatus};
use medrisk_core::request::AnalysisRequest;
use medrisk_db::{JobStore, StoreStats, StoreWriter, WriterHandle};

use crate::config::QueueConfig;
use crate::dispatch::DispatchQueue;
use crate::registry::{JobRegistry, StatusCounts};
use crate::worker::Worker;
use crate::{QueueError, QueueResult};

/// Poll interval of [`JobQueue::wait_for_terminal`].
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Where a status snapshot was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusSource {
    /// The in-memory registry: the job is still tracked by this process.
    Registry,
    /// The durable store: the registry no longer knows the id, e.g. after
    /// a restart or registry cleanup.
    Store,
}

/// Point-in-time view of one job, as returned by [`JobQueue::status`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobView {
    pub id: JobId,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Wall-clock seconds of processing, terminal jobs only.
    pub execution_secs: Option<f64>,
    /// The payload as submitted.
    pub request: serde_json::Value,
    pub result: Option<serde_json::Value>,
    pub error: Option<JobFailure>,
    pub source: StatusSource,
}

impl JobView {
    fn from_record(record: JobRecord, source: StatusSource) -> Self {
        Self {
            id: record.id,
            status: record.status,
            created_at: record.created_at,
            started_at: record.started_at,
            completed_at: record.completed_at,
            execution_secs: record.execution_time.map(|d| d.as_secs_f64()),
            request: record.request.into_value(),
            result: record.result,
            error: record.error,
            source,
        }
    }
}

/// Statistics snapshot combining live queue state with durable aggregates.
#[derive(Debug, Clone, Serialize)]
pub struct QueueStats {
    /// Registry counts per lifecycle state.
    pub jobs: StatusCounts,
    /// Job messages waiting on the dispatch queue.
    pub queue_depth: usize,
    /// Size of the worker pool.
    pub workers: usize,
    /// Aggregates over the durable store; `None` if the store read failed.
    pub store: Option<StoreStats>,
}

/// The job-processing core: accepts analysis requests, runs them on a
/// bounded worker pool, tracks lifecycle in memory, and persists snapshots
/// in the background.
///
/// Construct one per process with [`JobQueue::start`] and inject it where
/// it is needed; all collaborators are explicit, nothing is global. Call
/// [`JobQueue::shutdown`] to drain queued work, flush persistence, and
/// release the store.
pub struct JobQueue {
    config: QueueConfig,
    registry: Arc<JobRegistry>,
    dispatch: Arc<DispatchQueue>,
    store: Arc<dyn JobStore>,
    writer_handle: WriterHandle,
    writer: Mutex<Option<StoreWriter>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    worker_count: usize,
    running: Arc<AtomicBool>,
}

impl JobQueue {
    /// Spawn the worker pool and the persistence writer. Must be called on
    /// a tokio runtime. A `workers` setting of zero is raised to one.
    pub fn start(
        config: QueueConfig,
        store: Arc<dyn JobStore>,
        analyzer: Arc<dyn Analyzer>,
    ) -> Self {
        let worker_count = config.workers.max(1);
        let registry = Arc::new(JobRegistry::new());
        let dispatch = Arc::new(DispatchQueue::new());
        let running = Arc::new(AtomicBool::new(true));
        let writer = StoreWriter::spawn(store.clone());
        let writer_handle = writer.handle();

        let workers = (0..worker_count)
            .map(|index| {
                let worker = Worker::new(
                    index,
                    registry.clone(),
                    dispatch.clone(),
                    analyzer.clone(),
                    writer_handle.clone(),
                    config.workspace_root.clone(),
                    running.clone(),
                );
                tokio::spawn(worker.run())
            })
            .collect();

        info!(workers = worker_count, "Job queue started");

        Self {
            config,
            registry,
            dispatch,
            store,
            writer_handle,
            writer: Mutex::new(Some(writer)),
            workers: Mutex::new(workers),
            worker_count,
            running,
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Validate and accept a payload for analysis.
    ///
    /// Returns the job id as soon as the record is registered and queued;
    /// the analysis itself runs later on the worker pool. An invalid
    /// payload is rejected here and no job is created.
    pub fn submit(&self, payload: serde_json::Value) -> QueueResult<JobId> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(QueueError::ShuttingDown);
        }
        let request = AnalysisRequest::from_value(payload)?;
        let record = JobRecord::new(request);
        let id = record.id;
        self.registry.insert(record.clone())?;
        self.writer_handle.enqueue(record);
        self.dispatch.enqueue(id);
        info!(job_id = %id, "Job submitted");
        Ok(id)
    }

    /// Current view of a job: from the registry while the job is tracked
    /// there, falling back to the durable store otherwise. `None` when
    /// neither side knows the id.
    pub async fn status(&self, id: JobId) -> QueueResult<Option<JobView>> {
        if let Some(record) = self.registry.get(id) {
            return Ok(Some(JobView::from_record(record, StatusSource::Registry)));
        }
        let stored = self.store.get(id).await?;
        Ok(stored.map(|record| JobView::from_record(record, StatusSource::Store)))
    }

    /// Poll [`JobQueue::status`] until the job reaches a terminal state.
    /// `Ok(None)` means the timeout passed first; an id neither the
    /// registry nor the store knows is `UnknownJob`.
    pub async fn wait_for_terminal(
        &self,
        id: JobId,
        timeout: Duration,
    ) -> QueueResult<Option<JobView>> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            match self.status(id).await? {
                None => return Err(QueueError::UnknownJob(id)),
                Some(view) if view.status.is_terminal() => return Ok(Some(view)),
                Some(_) => {}
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(WAIT_POLL_INTERVAL).await;
        }
    }

    /// Live and durable statistics in one snapshot. A failing store read
    /// leaves the durable section empty instead of failing the call.
    pub async fn stats(&self) -> QueueStats {
        let store = match self.store.stats().await {
            Ok(stats) => Some(stats),
            Err(e) => {
                warn!(error = %e, "Store stats unavailable");
                None
            }
        };
        QueueStats {
            jobs: self.registry.counts(),
            queue_depth: self.dispatch.depth(),
            workers: self.worker_count,
            store,
        }
    }

    /// Evict terminal jobs older than `max_age` from the registry, making
    /// later status reads for them fall back to the durable store.
    /// Durable copies are untouched; `JobStore::delete_older_than` is the
    /// administrative path for those.
    pub fn cleanup(&self, max_age: Duration) -> usize {
        let removed = self.registry.evict_older_than(max_age);
        if removed > 0 {
            info!(removed, "Evicted old jobs from registry");
        }
        removed
    }

    /// Stop accepting submissions, drain already queued jobs, then stop
    /// the workers, flush the persistence backlog, and close the store.
    /// Safe to call more than once.
    pub async fn shutdown(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        info!("Shutting down job queue");

        for _ in 0..self.worker_count {
            self.dispatch.push_shutdown();
        }
        let handles: Vec<JoinHandle<()>> = {
            let mut workers = self
                .workers
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            workers.drain(..).collect()
        };
        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Worker task failed");
            }
        }

        let writer = self
            .writer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(writer) = writer {
            writer.shutdown().await;
        }
        self.store.close().await;

        info!("Job queue stopped");
    }
}
