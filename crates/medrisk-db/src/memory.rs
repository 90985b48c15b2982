//! In-memory job store for tests and local development.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use medrisk_core::JobId;
use medrisk_core::job::{JobRecord, JobStatus};

use crate::StoreResult;
use crate::store::{JobStore, JobSummary, StoreStats};

/// `JobStore` backed by a mutex-guarded map.
///
/// Same observable contract as the PostgreSQL store, minus durability
/// across processes. Useful in tests and for running the queue without a
/// database at hand.
#[derive(Default)]
pub struct MemoryJobStore {
    jobs: Mutex<HashMap<JobId, JobRecord>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.jobs().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs().is_empty()
    }

    fn jobs(&self) -> MutexGuard<'_, HashMap<JobId, JobRecord>> {
        self.jobs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn summarize(record: &JobRecord) -> JobSummary {
    JobSummary {
        id: record.id,
        status: record.status,
        created_at: record.created_at,
        completed_at: record.completed_at,
        execution_time: record.execution_time,
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn upsert(&self, record: &JobRecord) -> StoreResult<()> {
        self.jobs().insert(record.id, record.clone());
        Ok(())
    }

    async fn get(&self, id: JobId) -> StoreResult<Option<JobRecord>> {
        Ok(self.jobs().get(&id).cloned())
    }

    async fn list_recent(
        &self,
        limit: i64,
        status: Option<JobStatus>,
    ) -> StoreResult<Vec<JobSummary>> {
        let mut summaries: Vec<JobSummary> = self
            .jobs()
            .values()
            .filter(|record| status.is_none_or(|wanted| record.status == wanted))
            .map(summarize)
            .collect();
        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        summaries.truncate(limit.max(0) as usize);
        Ok(summaries)
    }

    async fn stats(&self) -> StoreResult<StoreStats> {
        let jobs = self.jobs();
        let mut stats = StoreStats {
            total: jobs.len() as i64,
            queued: 0,
            processing: 0,
            completed: 0,
            failed: 0,
            avg_execution_secs: None,
            min_execution_secs: None,
            max_execution_secs: None,
        };
        let mut times = Vec::new();
        for record in jobs.values() {
            match record.status {
                JobStatus::Queued => stats.queued += 1,
                JobStatus::Processing => stats.processing += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed => stats.failed += 1,
            }
            if record.status == JobStatus::Completed {
                if let Some(elapsed) = record.execution_time {
                    times.push(elapsed.as_secs_f64());
                }
            }
        }
        if !times.is_empty() {
            stats.avg_execution_secs = Some(times.iter().sum::<f64>() / times.len() as f64);
            stats.min_execution_secs = times.iter().copied().reduce(f64::min);
            stats.max_execution_secs = times.iter().copied().reduce(f64::max);
        }
        Ok(stats)
    }

    async fn delete_older_than(&self, age: Duration) -> StoreResult<u64> {
        let Some(cutoff) = chrono::Duration::from_std(age)
            .ok()
            .and_then(|delta| Utc::now().checked_sub_signed(delta))
        else {
            return Ok(0);
        };
        let mut jobs = self.jobs();
        let before = jobs.len();
        jobs.retain(|_, record| !(record.is_terminal() && record.created_at < cutoff));
        Ok((before - jobs.len()) as u64)
    }
}
