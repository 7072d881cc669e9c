use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::db_types::{Job, JobId, JobStatus, NewJob};

#[derive(Debug, Clone, Error)]
pub enum JobQueueError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Job {0} does not exist")]
    JobNotFound(JobId),
    #[error("Job payload could not be read. {0}")]
    InvalidPayload(String),
}

impl From<sqlx::Error> for JobQueueError {
    fn from(e: sqlx::Error) -> Self {
        JobQueueError::DatabaseError(e.to_string())
    }
}

/// A durable queue of background jobs, kept in the same store as the records the jobs act on, so that a job can be
/// enqueued in the same transaction that makes it necessary.
///
/// Delivery is at-least-once: a job whose worker disappears is handed out again once its lease expires, so job
/// handlers must be idempotent.
#[allow(async_fn_in_trait)]
pub trait JobQueue {
    async fn enqueue_job(&self, job: NewJob) -> Result<Job, JobQueueError>;

    /// Atomically claims up to `limit` jobs of the given kind that are due at `now`, as well as `running` jobs whose
    /// lease has expired. Claimed jobs are marked `running` and their attempt counter is incremented.
    async fn claim_jobs(
        &self,
        kind: &str,
        limit: i64,
        now: DateTime<Utc>,
        lease: Duration,
    ) -> Result<Vec<Job>, JobQueueError>;

    async fn complete_job(&self, id: JobId) -> Result<Job, JobQueueError>;

    /// Records a failure. The job is re-scheduled at `retry_at`, unless it has used up its attempts, in which case it
    /// is discarded. Returns the new status.
    async fn fail_job(&self, id: JobId, error: &str, retry_at: DateTime<Utc>) -> Result<JobStatus, JobQueueError>;

    async fn fetch_job(&self, id: JobId) -> Result<Option<Job>, JobQueueError>;
}
