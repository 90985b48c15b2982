//! In-memory job registry.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tracing::warn;

use medrisk_core::JobId;
use medrisk_core::job::{JobRecord, JobStatus};

use crate::{QueueError, QueueResult};

/// Number of registry jobs in each lifecycle state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub queued: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
}

impl StatusCounts {
    pub fn total(&self) -> usize {
        self.queued + self.processing + self.completed + self.failed
    }
}

/// The authoritative in-memory view of every job this process is tracking,
/// keyed by id.
///
/// One mutex, O(1) critical sections, never held across an await. Workers
/// are the only writers once a job is dispatched, so `update` is a plain
/// closure under the lock. Terminal records are absorbing: `update`
/// refuses to run a mutator on them.
pub struct JobRegistry {
    jobs: Mutex<HashMap<JobId, JobRecord>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
        }
    }

    /// Register a freshly submitted record. Ids are unique for the life of
    /// the registry, so a duplicate is an error.
    pub fn insert(&self, record: JobRecord) -> QueueResult<()> {
        let mut jobs = self.jobs();
        if jobs.contains_key(&record.id) {
            return Err(QueueError::AlreadyRegistered(record.id));
        }
        jobs.insert(record.id, record);
        Ok(())
    }

    /// Snapshot one record by id.
    pub fn get(&self, id: JobId) -> Option<JobRecord> {
        self.jobs().get(&id).cloned()
    }

    /// Apply a mutation to a tracked record under the lock.
    pub fn update(&self, id: JobId, mutate: impl FnOnce(&mut JobRecord)) -> QueueResult<()> {
        let mut jobs = self.jobs();
        let record = jobs.get_mut(&id).ok_or(QueueError::UnknownJob(id))?;
        if record.is_terminal() {
            warn!(job_id = %id, status = %record.status, "Refusing update of terminal job");
            return Ok(());
        }
        mutate(record);
        Ok(())
    }

    /// Evict terminal records that reached their terminal state more than
    /// `max_age` ago. Queued and processing jobs are never touched.
    /// Returns the number of evicted records.
    pub fn evict_older_than(&self, max_age: Duration) -> usize {
        let Some(cutoff) = chrono::Duration::from_std(max_age)
            .ok()
            .and_then(|delta| Utc::now().checked_sub_signed(delta))
        else {
            return 0;
        };
        let mut jobs = self.jobs();
        let before = jobs.len();
        jobs.retain(|_, record| {
            !(record.is_terminal() && record.completed_at.is_some_and(|at| at < cutoff))
        });
        before - jobs.len()
    }

    pub fn counts(&self) -> StatusCounts {
        let jobs = self.jobs();
        let mut counts = StatusCounts::default();
        for record in jobs.values() {
            match record.status {
                JobStatus::Queued => counts.queued += 1,
                JobStatus::Processing => counts.processing += 1,
                JobStatus::Completed => counts.completed += 1,
                JobStatus::Failed => counts.failed += 1,
            }
        }
        counts
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

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use medrisk_core::job::JobFailure;
    use medrisk_core::request::AnalysisRequest;
    use serde_json::json;

    fn make_record() -> JobRecord {
        let request = AnalysisRequest::from_value(json!({"medications": ["atorvastatin"]})).unwrap();
        JobRecord::new(request)
    }

    fn terminal_record(age: Duration) -> JobRecord {
        let mut record = make_record();
        record.mark_processing();
        record.mark_completed(json!({"risk_score": 0.3}));
        record.completed_at = Some(Utc::now() - chrono::Duration::from_std(age).unwrap());
        record
    }

    #[test]
    fn test_insert_and_get() {
        let registry = JobRegistry::new();
        let record = make_record();
        let id = record.id;
        registry.insert(record).unwrap();

        let fetched = registry.get(id).expect("Should find the record");
        assert_eq!(fetched.id, id);
        assert_eq!(fetched.status, JobStatus::Queued);
        assert!(registry.get(JobId::new()).is_none());
    }

    #[test]
    fn test_duplicate_insert_is_rejected() {
        let registry = JobRegistry::new();
        let record = make_record();
        registry.insert(record.clone()).unwrap();

        let err = registry.insert(record).unwrap_err();
        assert!(matches!(err, QueueError::AlreadyRegistered(_)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_update_unknown_job_is_an_error() {
        let registry = JobRegistry::new();
        let err = registry
            .update(JobId::new(), |record| record.mark_processing())
            .unwrap_err();
        assert!(matches!(err, QueueError::UnknownJob(_)));
    }

    #[test]
    fn test_terminal_records_absorb_updates() {
        let registry = JobRegistry::new();
        let record = terminal_record(Duration::ZERO);
        let id = record.id;
        registry.insert(record).unwrap();

        registry
            .update(id, |record| {
                record.mark_failed(JobFailure::new("should never apply"))
            })
            .unwrap();

        let fetched = registry.get(id).unwrap();
        assert_eq!(fetched.status, JobStatus::Completed);
        assert!(fetched.error.is_none());
    }

    #[test]
    fn test_evict_removes_only_old_terminal_records() {
        let registry = JobRegistry::new();

        let old_terminal: Vec<JobId> = (0..3)
            .map(|_| {
                let record = terminal_record(Duration::from_secs(7200));
                let id = record.id;
                registry.insert(record).unwrap();
                id
            })
            .collect();
        let fresh_terminal = terminal_record(Duration::ZERO);
        let fresh_id = fresh_terminal.id;
        registry.insert(fresh_terminal).unwrap();

        let mut old_queued = make_record();
        old_queued.created_at = Utc::now() - chrono::Duration::hours(48);
        let queued_id = old_queued.id;
        registry.insert(old_queued).unwrap();

        let removed = registry.evict_older_than(Duration::from_secs(3600));
        assert_eq!(removed, 3);
        for id in old_terminal {
            assert!(registry.get(id).is_none());
        }
        assert!(registry.get(fresh_id).is_some());
        assert!(registry.get(queued_id).is_some());
    }

    #[test]
    fn test_counts_by_status() {
        let registry = JobRegistry::new();
        registry.insert(make_record()).unwrap();
        registry.insert(make_record()).unwrap();
        registry
            .insert(terminal_record(Duration::ZERO))
            .unwrap();

        let counts = registry.counts();
        assert_eq!(counts.queued, 2);
        assert_eq!(counts.completed, 1);
        assert_eq!(counts.processing, 0);
        assert_eq!(counts.failed, 0);
        assert_eq!(counts.total(), 3);
    }
}
