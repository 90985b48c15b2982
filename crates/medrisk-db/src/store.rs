//! Job store trait and PostgreSQL implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use std::time::Duration;
use uuid::Uuid;

use medrisk_core::JobId;
use medrisk_core::job::{JobFailure, JobRecord, JobStatus};
use medrisk_core::request::AnalysisRequest;

use crate::{StoreError, StoreResult};

/// A job row in the database.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct JobRow {
    pub id: Uuid,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub execution_secs: Option<f64>,
    pub request: serde_json::Value,
    pub result: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub error_trace: Option<String>,
}

impl TryFrom<JobRow> for JobRecord {
    type Error = StoreError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let request = AnalysisRequest::from_value(row.request)
            .map_err(|e| StoreError::InvalidRow(format!("job {}: {}", row.id, e)))?;
        Ok(JobRecord {
            id: JobId::from_uuid(row.id),
            request,
            status: parse_status(&row.status)?,
            created_at: row.created_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
            execution_time: duration_from_secs(row.execution_secs),
            result: row.result,
            error: row.error_message.map(|message| JobFailure {
                message,
                trace: row.error_trace,
            }),
        })
    }
}

/// Listing row: the lifecycle columns without the JSONB payloads.
#[derive(Debug, Clone, sqlx::FromRow)]
struct SummaryRow {
    id: Uuid,
    status: String,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    execution_secs: Option<f64>,
}

/// One line of a recent-jobs listing.
#[derive(Debug, Clone, Serialize)]
pub struct JobSummary {
    pub id: JobId,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub execution_time: Option<Duration>,
}

impl TryFrom<SummaryRow> for JobSummary {
    type Error = StoreError;

    fn try_from(row: SummaryRow) -> Result<Self, Self::Error> {
        Ok(JobSummary {
            id: JobId::from_uuid(row.id),
            status: parse_status(&row.status)?,
            created_at: row.created_at,
            completed_at: row.completed_at,
            execution_time: duration_from_secs(row.execution_secs),
        })
    }
}

/// Aggregates over every job ever persisted.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct StoreStats {
    pub total: i64,
    pub queued: i64,
    pub processing: i64,
    pub completed: i64,
    pub failed: i64,
    /// Mean wall-clock seconds of completed analyses.
    pub avg_execution_secs: Option<f64>,
    pub min_execution_secs: Option<f64>,
    pub max_execution_secs: Option<f64>,
}

fn parse_status(value: &str) -> StoreResult<JobStatus> {
    match value {
        "queued" => Ok(JobStatus::Queued),
        "processing" => Ok(JobStatus::Processing),
        "completed" => Ok(JobStatus::Completed),
        "failed" => Ok(JobStatus::Failed),
        other => Err(StoreError::InvalidRow(format!(
            "unknown job status {other:?}"
        ))),
    }
}

fn duration_from_secs(secs: Option<f64>) -> Option<Duration> {
    secs.and_then(|secs| Duration::try_from_secs_f64(secs).ok())
}

/// Durable storage for job snapshots.
///
/// Writes go through `upsert`, keyed by job id, so replaying a snapshot or
/// writing transitions out of order converges on the latest state for that
/// job. Reads are served directly from the store and see whatever the
/// background writer has applied so far.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert the job or overwrite its mutable columns.
    async fn upsert(&self, record: &JobRecord) -> StoreResult<()>;

    /// Fetch one job by id.
    async fn get(&self, id: JobId) -> StoreResult<Option<JobRecord>>;

    /// Most recently created jobs, optionally filtered by status.
    async fn list_recent(
        &self,
        limit: i64,
        status: Option<JobStatus>,
    ) -> StoreResult<Vec<JobSummary>>;

    /// Aggregate counts and execution-time figures.
    async fn stats(&self) -> StoreResult<StoreStats>;

    /// Administrative cleanup: delete terminal jobs created before
    /// `now - age`. Returns the number of rows removed.
    async fn delete_older_than(&self, age: Duration) -> StoreResult<u64>;

    /// Release held resources (pooled connections).
    async fn close(&self) {}
}

/// PostgreSQL implementation of `JobStore`.
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn upsert(&self, record: &JobRecord) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO analysis_jobs (
                id, status, created_at, started_at, completed_at,
                execution_secs, request, result, error_message, error_trace
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (id) DO UPDATE SET
                status = EXCLUDED.status,
                started_at = EXCLUDED.started_at,
                completed_at = EXCLUDED.completed_at,
                execution_secs = EXCLUDED.execution_secs,
                result = EXCLUDED.result,
                error_message = EXCLUDED.error_message,
                error_trace = EXCLUDED.error_trace
            "#,
        )
        .bind(record.id.as_uuid())
        .bind(record.status.as_str())
        .bind(record.created_at)
        .bind(record.started_at)
        .bind(record.completed_at)
        .bind(record.execution_time.map(|d| d.as_secs_f64()))
        .bind(record.request.as_value())
        .bind(record.result.as_ref())
        .bind(record.error.as_ref().map(|f| f.message.as_str()))
        .bind(record.error.as_ref().and_then(|f| f.trace.as_deref()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: JobId) -> StoreResult<Option<JobRecord>> {
        let row = sqlx::query_as::<_, JobRow>("SELECT * FROM analysis_jobs WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.map(JobRecord::try_from).transpose()
    }

    async fn list_recent(
        &self,
        limit: i64,
        status: Option<JobStatus>,
    ) -> StoreResult<Vec<JobSummary>> {
        let rows = match status {
            Some(status) => {
                sqlx::query_as::<_, SummaryRow>(
                    r#"
                    SELECT id, status, created_at, completed_at, execution_secs
                    FROM analysis_jobs
                    WHERE status = $1
                    ORDER BY created_at DESC
                    LIMIT $2
                    "#,
                )
                .bind(status.as_str())
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, SummaryRow>(
                    r#"
                    SELECT id, status, created_at, completed_at, execution_secs
                    FROM analysis_jobs
                    ORDER BY created_at DESC
                    LIMIT $1
                    "#,
                )
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
        };
        rows.into_iter().map(JobSummary::try_from).collect()
    }

    async fn stats(&self) -> StoreResult<StoreStats> {
        let stats = sqlx::query_as::<_, StoreStats>(
            r#"
            SELECT
                COUNT(*) AS total,
                COUNT(*) FILTER (WHERE status = 'queued') AS queued,
                COUNT(*) FILTER (WHERE status = 'processing') AS processing,
                COUNT(*) FILTER (WHERE status = 'completed') AS completed,
                COUNT(*) FILTER (WHERE status = 'failed') AS failed,
                AVG(execution_secs) FILTER (WHERE status = 'completed') AS avg_execution_secs,
                MIN(execution_secs) FILTER (WHERE status = 'completed') AS min_execution_secs,
                MAX(execution_secs) FILTER (WHERE status = 'completed') AS max_execution_secs
            FROM analysis_jobs
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(stats)
    }

    async fn delete_older_than(&self, age: Duration) -> StoreResult<u64> {
        let Some(cutoff) = chrono::Duration::from_std(age)
            .ok()
            .and_then(|delta| Utc::now().checked_sub_signed(delta))
        else {
            return Ok(0);
        };
        let result = sqlx::query(
            r#"
            DELETE FROM analysis_jobs
            WHERE created_at < $1 AND status IN ('completed', 'failed')
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
