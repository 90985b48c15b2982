//! FIFO dispatch of submitted jobs to workers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::sync::mpsc;
use tracing::warn;

use medrisk_core::JobId;

/// A message on the dispatch queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Dispatch {
    /// Process this job next.
    Job(JobId),
    /// The receiving worker should exit its loop.
    Shutdown,
}

/// Unbounded FIFO connecting submission to the worker pool.
///
/// Workers share a single receiver behind an async mutex, so each message
/// is taken by exactly one worker and jobs start in submission order.
/// `depth` counts job messages only, not shutdown sentinels.
///
/// The queue grows without bound under sustained overload; rate limiting
/// belongs to the submitting layer.
pub(crate) struct DispatchQueue {
    tx: mpsc::UnboundedSender<Dispatch>,
    rx: Mutex<mpsc::UnboundedReceiver<Dispatch>>,
    depth: AtomicUsize,
}

impl DispatchQueue {
    pub(crate) fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(rx),
            depth: AtomicUsize::new(0),
        }
    }

    /// Queue a job for the next free worker.
    pub(crate) fn enqueue(&self, id: JobId) {
        self.depth.fetch_add(1, Ordering::SeqCst);
        if self.tx.send(Dispatch::Job(id)).is_err() {
            self.depth.fetch_sub(1, Ordering::SeqCst);
            warn!(job_id = %id, "Dispatch queue closed, job not scheduled");
        }
    }

    /// Queue one shutdown sentinel. Sentinels line up behind already
    /// queued jobs, so a worker drains pending work before it sees one.
    pub(crate) fn push_shutdown(&self) {
        if self.tx.send(Dispatch::Shutdown).is_err() {
            warn!("Dispatch queue closed, shutdown sentinel dropped");
        }
    }

    /// Take the next message, waiting at most `timeout`. `None` means the
    /// timeout elapsed and the caller should re-check its running flag.
    pub(crate) async fn dequeue(&self, timeout: Duration) -> Option<Dispatch> {
        let message = tokio::time::timeout(timeout, async {
            let mut rx = self.rx.lock().await;
            rx.recv().await
        })
        .await
        .ok()??;
        if matches!(message, Dispatch::Job(_)) {
            self.depth.fetch_sub(1, Ordering::SeqCst);
        }
        Some(message)
    }

    /// Job messages currently waiting.
    pub(crate) fn depth(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TICK: Duration = Duration::from_millis(50);

    #[tokio::test]
    async fn test_dequeue_preserves_fifo_order() {
        let queue = DispatchQueue::new();
        let ids: Vec<JobId> = (0..4).map(|_| JobId::new()).collect();
        for id in &ids {
            queue.enqueue(*id);
        }

        for expected in &ids {
            let message = queue.dequeue(TICK).await.expect("Should get a message");
            assert_eq!(message, Dispatch::Job(*expected));
        }
    }

    #[tokio::test]
    async fn test_depth_tracks_job_messages_only() {
        let queue = DispatchQueue::new();
        assert_eq!(queue.depth(), 0);

        queue.enqueue(JobId::new());
        queue.enqueue(JobId::new());
        queue.push_shutdown();
        assert_eq!(queue.depth(), 2);

        queue.dequeue(TICK).await.expect("Should get a job");
        assert_eq!(queue.depth(), 1);

        queue.dequeue(TICK).await.expect("Should get a job");
        let sentinel = queue.dequeue(TICK).await.expect("Should get the sentinel");
        assert_eq!(sentinel, Dispatch::Shutdown);
        assert_eq!(queue.depth(), 0);
    }

    #[tokio::test]
    async fn test_dequeue_times_out_when_empty() {
        let queue = DispatchQueue::new();
        let started = std::time::Instant::now();
        assert!(queue.dequeue(TICK).await.is_none());
        assert!(started.elapsed() >= TICK);
    }

    #[tokio::test]
    async fn test_each_message_goes_to_one_receiver() {
        let queue = std::sync::Arc::new(DispatchQueue::new());
        for _ in 0..20 {
            queue.enqueue(JobId::new());
        }

        let mut tasks = Vec::new();
        for _ in 0..4 {
            let queue = queue.clone();
            tasks.push(tokio::spawn(async move {
                let mut seen = 0;
                while queue.dequeue(Duration::from_millis(20)).await.is_some() {
                    seen += 1;
                }
                seen
            }));
        }

        let mut total = 0;
        for task in tasks {
            total += task.await.unwrap();
        }
        assert_eq!(total, 20);
        assert_eq!(queue.depth(), 0);
    }
}
