//! Job lifecycle records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::JobId;
use crate::request::AnalysisRequest;

/// Lifecycle state of an analysis job.
///
/// Jobs move `Queued -> Processing -> Completed | Failed`. The two
/// terminal states are absorbing: a record never leaves them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Accepted and waiting for a worker.
    Queued,
    /// A worker is running the analysis.
    Processing,
    /// Analysis finished and produced a result.
    Completed,
    /// Analysis raised an error.
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Stable string form, used for persistence and log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a job failed: a short message plus an optional longer trace
/// (error chain, panic payload, collaborator diagnostics).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFailure {
    pub message: String,
    pub trace: Option<String>,
}

impl JobFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            trace: None,
        }
    }

    pub fn with_trace(mut self, trace: impl Into<String>) -> Self {
        self.trace = Some(trace.into());
        self
    }
}

impl std::fmt::Display for JobFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

/// One submitted unit of analysis work and everything known about it.
///
/// Records live in the in-memory registry while the job is of interest and
/// are snapshotted to the durable store on every transition. All mutation
/// goes through the transition methods below, which keep the
/// timestamp/result/error fields consistent with the status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    /// Unique identifier, generated at submission, never reused.
    pub id: JobId,
    /// The payload exactly as submitted; opaque to the queueing core.
    pub request: AnalysisRequest,
    /// Current lifecycle state.
    pub status: JobStatus,
    /// When the job was accepted.
    pub created_at: DateTime<Utc>,
    /// When a worker picked the job up.
    pub started_at: Option<DateTime<Utc>>,
    /// When the job reached a terminal state.
    pub completed_at: Option<DateTime<Utc>>,
    /// Wall-clock processing time, set together with `completed_at`.
    pub execution_time: Option<Duration>,
    /// Success payload; `Some` exactly when `Completed`.
    pub result: Option<serde_json::Value>,
    /// Failure description; `Some` exactly when `Failed`.
    pub error: Option<JobFailure>,
}

impl JobRecord {
    /// Create a fresh `Queued` record for a validated request.
    pub fn new(request: AnalysisRequest) -> Self {
        Self {
            id: JobId::new(),
            request,
            status: JobStatus::Queued,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            execution_time: None,
            result: None,
            error: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Transition `Queued -> Processing` and stamp `started_at`.
    pub fn mark_processing(&mut self) {
        self.status = JobStatus::Processing;
        self.started_at = Some(Utc::now());
    }

    /// Transition into `Completed` with the analyzer's result payload.
    pub fn mark_completed(&mut self, result: serde_json::Value) {
        let now = Utc::now();
        self.execution_time = self.elapsed_since_start(now);
        self.completed_at = Some(now);
        self.status = JobStatus::Completed;
        self.result = Some(result);
        self.error = None;
    }

    /// Transition into `Failed` with a failure description.
    pub fn mark_failed(&mut self, failure: JobFailure) {
        let now = Utc::now();
        self.execution_time = self.elapsed_since_start(now);
        self.completed_at = Some(now);
        self.status = JobStatus::Failed;
        self.error = Some(failure);
        self.result = None;
    }

    fn elapsed_since_start(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.started_at
            .map(|started| (now - started).to_std().unwrap_or_default())
    }
}
