//! Background persistence of job snapshots.
//!
//! A single writer task drains a FIFO of `JobRecord` snapshots and upserts
//! each one through the store. Submission and processing never wait on the
//! database; they hand a snapshot to the writer and move on.
//!
//! Durability is best-effort and at-most-once: a snapshot whose upsert
//! fails is logged and dropped, not retried. In-memory job state is never
//! affected by a write failure.

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use medrisk_core::job::JobRecord;

use crate::store::JobStore;

enum WriteMessage {
    Snapshot(JobRecord),
    Stop,
}

/// Cloneable handle for queueing snapshots onto the writer.
#[derive(Clone)]
pub struct WriterHandle {
    tx: mpsc::UnboundedSender<WriteMessage>,
}

impl WriterHandle {
    /// Queue one snapshot. Never blocks; after writer shutdown the
    /// snapshot is dropped with a warning.
    pub fn enqueue(&self, snapshot: JobRecord) {
        let job_id = snapshot.id;
        if self.tx.send(WriteMessage::Snapshot(snapshot)).is_err() {
            warn!(job_id = %job_id, "Persistence queue closed, snapshot dropped");
        }
    }
}

/// The persistence worker: owns the queue and the drain task.
pub struct StoreWriter {
    handle: WriterHandle,
    task: JoinHandle<()>,
}

impl StoreWriter {
    /// Start the writer task over the given store.
    pub fn spawn(store: Arc<dyn JobStore>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<WriteMessage>();
        let task = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                let snapshot = match message {
                    WriteMessage::Snapshot(snapshot) => snapshot,
                    WriteMessage::Stop => break,
                };
                let job_id = snapshot.id;
                let status = snapshot.status;
                match store.upsert(&snapshot).await {
                    Ok(()) => {
                        debug!(job_id = %job_id, status = %status, "Persisted job snapshot")
                    }
                    Err(e) => {
                        error!(job_id = %job_id, status = %status, error = %e,
                            "Failed to persist job snapshot, dropping")
                    }
                }
            }
            debug!("Persistence queue drained");
        });
        Self {
            handle: WriterHandle { tx },
            task,
        }
    }

    pub fn handle(&self) -> WriterHandle {
        self.handle.clone()
    }

    /// Stop after the backlog: a sentinel lines up behind every snapshot
    /// already queued, the task drains up to it, then the call waits for
    /// the task to finish.
    pub async fn shutdown(self) {
        let _ = self.handle.tx.send(WriteMessage::Stop);
        if let Err(e) = self.task.await {
            error!(error = %e, "Persistence writer task failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryJobStore;
    use crate::StoreResult;
    use async_trait::async_trait;
    use medrisk_core::JobId;
    use medrisk_core::job::JobStatus;
    use medrisk_core::request::AnalysisRequest;
    use serde_json::json;
    use std::sync::Mutex;
    use std::time::Duration;

    fn make_snapshot() -> JobRecord {
        let request = AnalysisRequest::from_value(json!({"medications": ["heparin"]})).unwrap();
        JobRecord::new(request)
    }

    /// Store double that records upsert order and fails on demand.
    #[derive(Default)]
    struct ProbeStore {
        seen: Mutex<Vec<JobId>>,
        fail: bool,
    }

    #[async_trait]
    impl JobStore for ProbeStore {
        async fn upsert(&self, record: &JobRecord) -> StoreResult<()> {
            self.seen.lock().unwrap().push(record.id);
            if self.fail {
                Err(crate::StoreError::InvalidRow("injected outage".to_string()))
            } else {
                Ok(())
            }
        }

        async fn get(&self, _id: JobId) -> StoreResult<Option<JobRecord>> {
            Ok(None)
        }

        async fn list_recent(
            &self,
            _limit: i64,
            _status: Option<JobStatus>,
        ) -> StoreResult<Vec<crate::JobSummary>> {
            Ok(Vec::new())
        }

        async fn stats(&self) -> StoreResult<crate::StoreStats> {
            unimplemented!()
        }

        async fn delete_older_than(&self, _age: Duration) -> StoreResult<u64> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn test_snapshots_apply_in_enqueue_order() {
        let store = Arc::new(ProbeStore::default());
        let writer = StoreWriter::spawn(store.clone());
        let handle = writer.handle();

        let snapshots: Vec<JobRecord> = (0..5).map(|_| make_snapshot()).collect();
        for snapshot in &snapshots {
            handle.enqueue(snapshot.clone());
        }
        writer.shutdown().await;

        let expected: Vec<JobId> = snapshots.iter().map(|s| s.id).collect();
        assert_eq!(*store.seen.lock().unwrap(), expected);
    }

    #[tokio::test]
    async fn test_failed_write_is_dropped_not_retried() {
        let store = Arc::new(ProbeStore {
            fail: true,
            ..Default::default()
        });
        let writer = StoreWriter::spawn(store.clone());
        let handle = writer.handle();

        handle.enqueue(make_snapshot());
        handle.enqueue(make_snapshot());
        writer.shutdown().await;

        // One attempt per snapshot: the failure neither retries nor stalls
        // the queue.
        assert_eq!(store.seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_shutdown_drains_backlog() {
        let store = Arc::new(MemoryJobStore::new());
        let writer = StoreWriter::spawn(store.clone());
        let handle = writer.handle();

        for _ in 0..50 {
            handle.enqueue(make_snapshot());
        }
        writer.shutdown().await;

        assert_eq!(store.len(), 50);
    }

    #[tokio::test]
    async fn test_enqueue_after_shutdown_does_not_panic() {
        let store = Arc::new(MemoryJobStore::new());
        let writer = StoreWriter::spawn(store.clone());
        let handle = writer.handle();
        writer.shutdown().await;

        handle.enqueue(make_snapshot());
        assert!(store.is_empty());
    }
}
